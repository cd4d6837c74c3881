use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::records::{MatchPlayerRecord, PlayerMonthRecord, Snapshot};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATE_FMT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Matches,
    History,
}

impl TableKind {
    pub fn label(self) -> &'static str {
        match self {
            TableKind::Matches => "matches",
            TableKind::History => "history",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestRun {
    pub run_id: i64,
    pub table: String,
    pub started_at: String,
    pub finished_at: String,
    pub items_total: i64,
    pub items_succeeded: i64,
    pub rows_written: i64,
    pub errors: Vec<String>,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS match_players (
            game_id INTEGER NOT NULL,
            nick TEXT NOT NULL,
            team TEXT NOT NULL,
            player_room TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            map_name TEXT NOT NULL,
            nb_kill INTEGER NOT NULL,
            assist INTEGER NOT NULL,
            death INTEGER NOT NULL,
            hs INTEGER NOT NULL,
            damage INTEGER NOT NULL,
            adr REAL NOT NULL,
            kdr REAL NOT NULL,
            phs REAL NOT NULL,
            firstkill INTEGER NOT NULL,
            pkast REAL NOT NULL,
            nb1kill INTEGER NOT NULL,
            nb2kill INTEGER NOT NULL,
            nb3kill INTEGER NOT NULL,
            nb4kill INTEGER NOT NULL,
            nb5kill INTEGER NOT NULL,
            defuse INTEGER NOT NULL,
            bombe INTEGER NOT NULL,
            hits INTEGER NOT NULL,
            level INTEGER NOT NULL,
            rating REAL NOT NULL,
            flash_assist INTEGER NOT NULL,
            multikills INTEGER NOT NULL,
            damage_share REAL NOT NULL,
            kills_share REAL NOT NULL,
            hits_share REAL NOT NULL,
            damage_per_hit REAL NOT NULL,
            row_order INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_match_players_game ON match_players(game_id);

        CREATE TABLE IF NOT EXISTS player_months (
            month TEXT NOT NULL,
            player_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            kdr REAL NOT NULL,
            adr REAL NOT NULL,
            kills INTEGER NOT NULL,
            deaths INTEGER NOT NULL,
            multikills INTEGER NOT NULL,
            first_kills INTEGER NOT NULL,
            headshot_rate REAL NOT NULL,
            bomb_planted INTEGER NOT NULL,
            bomb_defused INTEGER NOT NULL,
            matches INTEGER NOT NULL,
            wins INTEGER NOT NULL,
            losses INTEGER NOT NULL,
            kills_per_map REAL NOT NULL,
            deaths_per_map REAL NOT NULL,
            first_kills_per_map REAL NOT NULL,
            bomb_planted_per_map REAL NOT NULL,
            bomb_defused_per_map REAL NOT NULL,
            row_order INTEGER NOT NULL,
            PRIMARY KEY (player_id, month)
        );

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            items_total INTEGER NOT NULL,
            items_succeeded INTEGER NOT NULL,
            rows_written INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Replaces the whole match table in one transaction; readers see either the
/// old rows or the new ones.
pub fn replace_match_table(conn: &mut Connection, rows: &[MatchPlayerRecord]) -> Result<usize> {
    let tx = conn.transaction().context("begin match table transaction")?;
    tx.execute("DELETE FROM match_players", [])
        .context("clear match table")?;
    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO match_players (
                    game_id, nick, team, player_room, updated_at, map_name,
                    nb_kill, assist, death, hs, damage, adr, kdr, phs, firstkill, pkast,
                    nb1kill, nb2kill, nb3kill, nb4kill, nb5kill, defuse, bombe, hits,
                    level, rating, flash_assist, multikills,
                    damage_share, kills_share, hits_share, damage_per_hit, row_order
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6,
                    ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24,
                    ?25, ?26, ?27, ?28,
                    ?29, ?30, ?31, ?32, ?33
                )
                "#,
            )
            .context("prepare match insert")?;
        for (idx, r) in rows.iter().enumerate() {
            stmt.execute(params![
                r.game_id as i64,
                r.nick,
                r.team,
                r.player_room,
                r.updated_at.format(DATETIME_FMT).to_string(),
                r.map_name,
                r.nb_kill,
                r.assist,
                r.death,
                r.hs,
                r.damage,
                r.adr,
                r.kdr,
                r.phs,
                r.firstkill,
                r.pkast,
                r.nb1kill,
                r.nb2kill,
                r.nb3kill,
                r.nb4kill,
                r.nb5kill,
                r.defuse,
                r.bombe,
                r.hits,
                r.level,
                r.rating,
                r.flash_assist,
                r.multikills,
                r.damage_share,
                r.kills_share,
                r.hits_share,
                r.damage_per_hit,
                idx as i64,
            ])
            .with_context(|| format!("insert match {} player {}", r.game_id, r.nick))?;
        }
    }
    tx.commit().context("commit match table")?;
    Ok(rows.len())
}

pub fn replace_history_table(conn: &mut Connection, rows: &[PlayerMonthRecord]) -> Result<usize> {
    let tx = conn
        .transaction()
        .context("begin history table transaction")?;
    tx.execute("DELETE FROM player_months", [])
        .context("clear history table")?;
    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO player_months (
                    month, player_id, name, kdr, adr, kills, deaths, multikills,
                    first_kills, headshot_rate, bomb_planted, bomb_defused,
                    matches, wins, losses,
                    kills_per_map, deaths_per_map, first_kills_per_map,
                    bomb_planted_per_map, bomb_defused_per_map, row_order
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                    ?9, ?10, ?11, ?12,
                    ?13, ?14, ?15,
                    ?16, ?17, ?18,
                    ?19, ?20, ?21
                )
                "#,
            )
            .context("prepare history insert")?;
        for (idx, r) in rows.iter().enumerate() {
            stmt.execute(params![
                r.month.format(DATE_FMT).to_string(),
                r.player_id as i64,
                r.name,
                r.kdr,
                r.adr,
                r.kills,
                r.deaths,
                r.multikills,
                r.first_kills,
                r.headshot_rate,
                r.bomb_planted,
                r.bomb_defused,
                r.matches,
                r.wins,
                r.losses,
                r.kills_per_map,
                r.deaths_per_map,
                r.first_kills_per_map,
                r.bomb_planted_per_map,
                r.bomb_defused_per_map,
                idx as i64,
            ])
            .with_context(|| format!("insert history {} {}", r.name, r.month))?;
        }
    }
    tx.commit().context("commit history table")?;
    Ok(rows.len())
}

pub fn load_match_table(conn: &Connection) -> Result<Vec<MatchPlayerRecord>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                game_id, nick, team, player_room, updated_at, map_name,
                nb_kill, assist, death, hs, damage, adr, kdr, phs, firstkill, pkast,
                nb1kill, nb2kill, nb3kill, nb4kill, nb5kill, defuse, bombe, hits,
                level, rating, flash_assist, multikills,
                damage_share, kills_share, hits_share, damage_per_hit
            FROM match_players
            ORDER BY row_order ASC
            "#,
        )
        .context("prepare load match table")?;

    let rows = stmt
        .query_map([], |row| {
            let updated_at: String = row.get(4)?;
            Ok((
                updated_at,
                MatchPlayerRecord {
                    game_id: row.get::<_, i64>(0)? as u64,
                    nick: row.get(1)?,
                    team: row.get(2)?,
                    player_room: row.get(3)?,
                    updated_at: NaiveDateTime::default(),
                    map_name: row.get(5)?,
                    nb_kill: row.get(6)?,
                    assist: row.get(7)?,
                    death: row.get(8)?,
                    hs: row.get(9)?,
                    damage: row.get(10)?,
                    adr: row.get(11)?,
                    kdr: row.get(12)?,
                    phs: row.get(13)?,
                    firstkill: row.get(14)?,
                    pkast: row.get(15)?,
                    nb1kill: row.get(16)?,
                    nb2kill: row.get(17)?,
                    nb3kill: row.get(18)?,
                    nb4kill: row.get(19)?,
                    nb5kill: row.get(20)?,
                    defuse: row.get(21)?,
                    bombe: row.get(22)?,
                    hits: row.get(23)?,
                    level: row.get(24)?,
                    rating: row.get(25)?,
                    flash_assist: row.get(26)?,
                    multikills: row.get(27)?,
                    damage_share: row.get(28)?,
                    kills_share: row.get(29)?,
                    hits_share: row.get(30)?,
                    damage_per_hit: row.get(31)?,
                },
            ))
        })
        .context("query match table")?;

    let mut out = Vec::new();
    for row in rows {
        let (updated_at, mut record) = row.context("decode match row")?;
        record.updated_at = NaiveDateTime::parse_from_str(&updated_at, DATETIME_FMT)
            .with_context(|| format!("stored updated_at {updated_at:?}"))?;
        out.push(record);
    }
    Ok(out)
}

pub fn load_history_table(conn: &Connection) -> Result<Vec<PlayerMonthRecord>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                month, player_id, name, kdr, adr, kills, deaths, multikills,
                first_kills, headshot_rate, bomb_planted, bomb_defused,
                matches, wins, losses,
                kills_per_map, deaths_per_map, first_kills_per_map,
                bomb_planted_per_map, bomb_defused_per_map
            FROM player_months
            ORDER BY row_order ASC
            "#,
        )
        .context("prepare load history table")?;

    let rows = stmt
        .query_map([], |row| {
            let month: String = row.get(0)?;
            Ok((
                month,
                PlayerMonthRecord {
                    month: NaiveDate::default(),
                    player_id: row.get::<_, i64>(1)? as u64,
                    name: row.get(2)?,
                    kdr: row.get(3)?,
                    adr: row.get(4)?,
                    kills: row.get(5)?,
                    deaths: row.get(6)?,
                    multikills: row.get(7)?,
                    first_kills: row.get(8)?,
                    headshot_rate: row.get(9)?,
                    bomb_planted: row.get(10)?,
                    bomb_defused: row.get(11)?,
                    matches: row.get(12)?,
                    wins: row.get(13)?,
                    losses: row.get(14)?,
                    kills_per_map: row.get(15)?,
                    deaths_per_map: row.get(16)?,
                    first_kills_per_map: row.get(17)?,
                    bomb_planted_per_map: row.get(18)?,
                    bomb_defused_per_map: row.get(19)?,
                },
            ))
        })
        .context("query history table")?;

    let mut out = Vec::new();
    for row in rows {
        let (month, mut record) = row.context("decode history row")?;
        record.month = NaiveDate::parse_from_str(&month, DATE_FMT)
            .with_context(|| format!("stored month {month:?}"))?;
        out.push(record);
    }
    Ok(out)
}

pub fn load_snapshot(conn: &Connection) -> Result<Snapshot> {
    Ok(Snapshot {
        matches: load_match_table(conn)?,
        history: load_history_table(conn)?,
    })
}

/// Read side used by the dashboard: a missing file is an error, not an empty db.
pub fn load_snapshot_file(path: &Path) -> Result<Snapshot> {
    if !path.exists() {
        return Err(anyhow!(
            "no table store at {} (run gc_ingest first)",
            path.display()
        ));
    }
    let conn = open_db(path)?;
    load_snapshot(&conn)
}

pub fn record_run(
    conn: &Connection,
    table: TableKind,
    started_at: &str,
    items_total: usize,
    items_succeeded: usize,
    rows_written: usize,
    errors: &[String],
) -> Result<i64> {
    let errors_json = serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO ingest_runs(table_name, started_at, finished_at, items_total, items_succeeded, rows_written, errors_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            table.label(),
            started_at,
            Utc::now().to_rfc3339(),
            items_total as i64,
            items_succeeded as i64,
            rows_written as i64,
            errors_json,
        ],
    )
    .context("insert ingest run")?;
    Ok(conn.last_insert_rowid())
}

pub fn last_run(conn: &Connection, table: TableKind) -> Result<Option<IngestRun>> {
    conn.query_row(
        "SELECT run_id, table_name, started_at, finished_at, items_total, items_succeeded, rows_written, errors_json
         FROM ingest_runs WHERE table_name = ?1 ORDER BY run_id DESC LIMIT 1",
        params![table.label()],
        |row| {
            let errors_json: String = row.get(7)?;
            Ok(IngestRun {
                run_id: row.get(0)?,
                table: row.get(1)?,
                started_at: row.get(2)?,
                finished_at: row.get(3)?,
                items_total: row.get(4)?,
                items_succeeded: row.get(5)?,
                rows_written: row.get(6)?,
                errors: serde_json::from_str(&errors_json).unwrap_or_default(),
            })
        },
    )
    .optional()
    .context("query last ingest run")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_log_round_trip() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        init_schema(&conn).expect("schema");
        assert!(last_run(&conn, TableKind::Matches).unwrap().is_none());

        let errors = vec!["match 2: http 404".to_string()];
        record_run(&conn, TableKind::Matches, "2025-02-10T00:00:00Z", 3, 2, 20, &errors)
            .expect("record run");
        let run = last_run(&conn, TableKind::Matches)
            .unwrap()
            .expect("run should exist");
        assert_eq!(run.table, "matches");
        assert_eq!(run.items_succeeded, 2);
        assert_eq!(run.rows_written, 20);
        assert_eq!(run.errors, errors);
        assert!(last_run(&conn, TableKind::History).unwrap().is_none());
    }
}
