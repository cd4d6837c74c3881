use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::records::{MatchPlayerRecord, PlayerMonthRecord};

pub struct ExportReport {
    pub match_rows: usize,
    pub history_rows: usize,
}

enum Cell {
    Text(String),
    Number(f64),
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

const MATCH_HEADER: &[&str] = &[
    "game_id",
    "nick",
    "team",
    "updated_at",
    "map_name",
    "player_room",
    "nb_kill",
    "assist",
    "death",
    "hs",
    "damage",
    "adr",
    "kdr",
    "phs",
    "firstkill",
    "pkast",
    "nb1kill",
    "nb2kill",
    "nb3kill",
    "nb4kill",
    "nb5kill",
    "defuse",
    "bombe",
    "hits",
    "level",
    "rating",
    "flash_assist",
    "multikills",
    "damage_share",
    "kills_share",
    "hits_share",
    "damage_per_hit",
];

const HISTORY_HEADER: &[&str] = &[
    "mes",
    "id",
    "nome",
    "kdr",
    "adr",
    "matou",
    "morreu",
    "multikills",
    "firstkills",
    "headshotrate",
    "bomb_planted",
    "bomb_defused",
    "matches",
    "wins",
    "losses",
    "killsPerMap",
    "deathsPerMap",
    "firstKillsPerMap",
    "bombPlantedPerMap",
    "bombDefusedPerMap",
];

/// Writes both tables to one workbook, one sheet each, header in row 0.
pub fn export_tables(
    path: &Path,
    matches: &[MatchPlayerRecord],
    history: &[PlayerMonthRecord],
) -> Result<ExportReport> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Matches")?;
        write_header(sheet, MATCH_HEADER)?;
        let rows: Vec<Vec<Cell>> = matches.iter().map(match_row).collect();
        write_rows(sheet, &rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("PlayerMonths")?;
        write_header(sheet, HISTORY_HEADER)?;
        let rows: Vec<Vec<Cell>> = history.iter().map(history_row).collect();
        write_rows(sheet, &rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        match_rows: matches.len(),
        history_rows: history.len(),
    })
}

fn match_row(r: &MatchPlayerRecord) -> Vec<Cell> {
    vec![
        Cell::Number(r.game_id as f64),
        r.nick.as_str().into(),
        r.team.as_str().into(),
        r.updated_at.format("%Y-%m-%d %H:%M:%S%.f").to_string().into(),
        r.map_name.as_str().into(),
        r.player_room.as_str().into(),
        r.nb_kill.into(),
        r.assist.into(),
        r.death.into(),
        r.hs.into(),
        r.damage.into(),
        r.adr.into(),
        r.kdr.into(),
        r.phs.into(),
        r.firstkill.into(),
        r.pkast.into(),
        r.nb1kill.into(),
        r.nb2kill.into(),
        r.nb3kill.into(),
        r.nb4kill.into(),
        r.nb5kill.into(),
        r.defuse.into(),
        r.bombe.into(),
        r.hits.into(),
        r.level.into(),
        r.rating.into(),
        r.flash_assist.into(),
        r.multikills.into(),
        r.damage_share.into(),
        r.kills_share.into(),
        r.hits_share.into(),
        r.damage_per_hit.into(),
    ]
}

fn history_row(r: &PlayerMonthRecord) -> Vec<Cell> {
    vec![
        r.month.format("%Y-%m-%d").to_string().into(),
        Cell::Number(r.player_id as f64),
        r.name.as_str().into(),
        r.kdr.into(),
        r.adr.into(),
        r.kills.into(),
        r.deaths.into(),
        r.multikills.into(),
        r.first_kills.into(),
        r.headshot_rate.into(),
        r.bomb_planted.into(),
        r.bomb_defused.into(),
        r.matches.into(),
        r.wins.into(),
        r.losses.into(),
        r.kills_per_map.into(),
        r.deaths_per_map.into(),
        r.first_kills_per_map.into(),
        r.bomb_planted_per_map.into(),
        r.bomb_defused_per_map.into(),
    ]
}

fn write_header(worksheet: &mut Worksheet, header: &[&str]) -> Result<()> {
    for (col_idx, name) in header.iter().enumerate() {
        worksheet
            .write_string(0, col_idx as u16, *name)
            .with_context(|| format!("write header ({col_idx})"))?;
    }
    Ok(())
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<Cell>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        let sheet_row = (row_idx + 1) as u32;
        for (col_idx, value) in row.iter().enumerate() {
            let written = match value {
                Cell::Text(text) => worksheet.write_string(sheet_row, col_idx as u16, text),
                Cell::Number(n) => worksheet.write_number(sheet_row, col_idx as u16, *n),
            };
            written.with_context(|| format!("write cell ({sheet_row},{col_idx})"))?;
        }
    }
    Ok(())
}
