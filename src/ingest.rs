use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;

use crate::config::Config;
use crate::export;
use crate::history_fetch::{self, HistoryBatch};
use crate::http_client::StatsSource;
use crate::match_fetch::{self, MatchBatch};
use crate::metrics;
use crate::normalize;
use crate::records::{MatchPlayerRecord, PlayerMonthRecord};
use crate::store::{self, TableKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestTarget {
    Matches,
    History,
    All,
}

impl IngestTarget {
    fn includes(self, kind: TableKind) -> bool {
        matches!(
            (self, kind),
            (IngestTarget::All, _)
                | (IngestTarget::Matches, TableKind::Matches)
                | (IngestTarget::History, TableKind::History)
        )
    }
}

#[derive(Debug, Clone)]
pub struct TableIngest {
    pub kind: TableKind,
    pub items_total: usize,
    pub items_succeeded: usize,
    pub rows_written: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub tables: Vec<TableIngest>,
    pub export_path: Option<PathBuf>,
}

/// Fetch, coerce, then derive. Derivation only starts once every match is in.
pub fn build_match_table(
    source: &dyn StatsSource,
    config: &Config,
) -> Result<(Vec<MatchPlayerRecord>, MatchBatch)> {
    let batch = match_fetch::fetch_matches(source, &config.match_ids, config.parallelism());
    let typed = normalize::coerce_matches(&batch.rows).context("match table coercion failed")?;
    Ok((metrics::derive_match_shares(&typed), batch))
}

pub fn build_history_table(
    source: &dyn StatsSource,
    config: &Config,
) -> Result<(Vec<PlayerMonthRecord>, HistoryBatch)> {
    let batch = history_fetch::fetch_history(
        source,
        &config.roster,
        &config.months,
        &config.stat_slots,
        config.parallelism(),
    );
    let typed = normalize::coerce_history(&batch.rows).context("history table coercion failed")?;
    Ok((metrics::derive_per_map_rates(&typed), batch))
}

fn nothing_fetched(total: usize, succeeded: usize) -> bool {
    total > 0 && succeeded == 0
}

/// Rebuilds the requested tables and swaps them into the store. A coercion
/// failure aborts before anything is written, leaving the previous tables.
/// A table whose every fetch failed is left as it was; the run is still
/// recorded with its errors.
pub fn run_ingest(
    source: &dyn StatsSource,
    config: &Config,
    conn: &mut Connection,
    target: IngestTarget,
    export_path: Option<&Path>,
) -> Result<IngestSummary> {
    let mut tables = Vec::new();

    if target.includes(TableKind::Matches) {
        let started_at = Utc::now().to_rfc3339();
        let (rows, batch) = build_match_table(source, config)?;
        let written = if nothing_fetched(batch.games_total, batch.games_succeeded) {
            tracing::warn!(
                games = batch.games_total,
                "no match fetched, keeping the stored match table"
            );
            0
        } else {
            let replaced = store::replace_match_table(conn, &rows)?;
            tracing::info!(rows = replaced, "match table replaced");
            replaced
        };
        store::record_run(
            conn,
            TableKind::Matches,
            &started_at,
            batch.games_total,
            batch.games_succeeded,
            written,
            &batch.errors,
        )?;
        tables.push(TableIngest {
            kind: TableKind::Matches,
            items_total: batch.games_total,
            items_succeeded: batch.games_succeeded,
            rows_written: written,
            errors: batch.errors,
        });
    }

    if target.includes(TableKind::History) {
        let started_at = Utc::now().to_rfc3339();
        let (rows, batch) = build_history_table(source, config)?;
        let written = if nothing_fetched(batch.requests_total, batch.requests_succeeded) {
            tracing::warn!(
                requests = batch.requests_total,
                "no history fetched, keeping the stored history table"
            );
            0
        } else {
            let replaced = store::replace_history_table(conn, &rows)?;
            tracing::info!(rows = replaced, "history table replaced");
            replaced
        };
        store::record_run(
            conn,
            TableKind::History,
            &started_at,
            batch.requests_total,
            batch.requests_succeeded,
            written,
            &batch.errors,
        )?;
        tables.push(TableIngest {
            kind: TableKind::History,
            items_total: batch.requests_total,
            items_succeeded: batch.requests_succeeded,
            rows_written: written,
            errors: batch.errors,
        });
    }

    let export_path = match export_path {
        Some(path) => {
            // Export from the store so a partial refresh still writes both sheets.
            let snapshot = store::load_snapshot(conn)?;
            let report = export::export_tables(path, &snapshot.matches, &snapshot.history)?;
            tracing::info!(
                path = %path.display(),
                matches = report.match_rows,
                history = report.history_rows,
                "workbook written"
            );
            Some(path.to_path_buf())
        }
        None => None,
    };

    Ok(IngestSummary {
        tables,
        export_path,
    })
}
