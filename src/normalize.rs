use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::records::{
    HistoryField, MatchPlayerRecord, PlayerMonthRecord, RawHistoryRow, RawMatchRow,
};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Strict whole-table coercion: one bad cell fails the batch.
pub fn coerce_matches(rows: &[RawMatchRow]) -> Result<Vec<MatchPlayerRecord>> {
    rows.iter()
        .map(|row| {
            coerce_match_row(row)
                .with_context(|| format!("coerce match {} player {}", row.game_id, row.nick))
        })
        .collect()
}

fn coerce_match_row(row: &RawMatchRow) -> Result<MatchPlayerRecord> {
    let int = |name: &str| -> Result<i64> {
        let value = row.fields.get(name).unwrap_or(&Value::Null);
        strict_int(value).with_context(|| format!("column {name}: {value}"))
    };
    let float = |name: &str| -> Result<f64> {
        let value = row.fields.get(name).unwrap_or(&Value::Null);
        strict_float(value).with_context(|| format!("column {name}: {value}"))
    };

    let updated_at = parse_datetime(&row.updated_at)
        .with_context(|| format!("column updated_at: {}", row.updated_at))?;
    let map_name = match &row.map_name {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let player_room = row
        .fields
        .get("player_room")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(MatchPlayerRecord {
        game_id: row.game_id,
        nick: row.nick.clone(),
        team: row.team.clone(),
        player_room,
        updated_at,
        map_name,
        nb_kill: int("nb_kill")?,
        assist: int("assist")?,
        death: int("death")?,
        hs: int("hs")?,
        damage: int("damage")?,
        adr: float("adr")?,
        kdr: float("kdr")?,
        phs: float("phs")?,
        firstkill: int("firstkill")?,
        pkast: float("pkast")?,
        nb1kill: int("nb1kill")?,
        nb2kill: int("nb2kill")?,
        nb3kill: int("nb3kill")?,
        nb4kill: int("nb4kill")?,
        nb5kill: int("nb5kill")?,
        defuse: int("defuse")?,
        bombe: int("bombe")?,
        hits: int("hits")?,
        level: int("level")?,
        rating: float("rating")?,
        flash_assist: int("flash_assist")?,
        multikills: int("multikills")?,
        damage_share: 0.0,
        kills_share: 0.0,
        hits_share: 0.0,
        damage_per_hit: 0.0,
    })
}

/// Lenient coercion: unparseable stat values become 0. Only an unparseable
/// month fails, and that is a configuration problem rather than a data one.
pub fn coerce_history(rows: &[RawHistoryRow]) -> Result<Vec<PlayerMonthRecord>> {
    rows.iter().map(coerce_history_row).collect()
}

fn coerce_history_row(row: &RawHistoryRow) -> Result<PlayerMonthRecord> {
    let month = parse_month(&row.month)?;
    let stat = |field: HistoryField| row.stat(field).map(lenient_number).unwrap_or(0.0);
    let count = |field: HistoryField| stat(field) as i64;

    Ok(PlayerMonthRecord {
        month,
        player_id: row.player_id,
        name: row.name.clone(),
        kdr: stat(HistoryField::Kdr),
        adr: stat(HistoryField::Adr),
        kills: count(HistoryField::Kills),
        deaths: count(HistoryField::Deaths),
        multikills: count(HistoryField::Multikills),
        first_kills: count(HistoryField::FirstKills),
        headshot_rate: stat(HistoryField::HeadshotRate),
        bomb_planted: count(HistoryField::BombPlanted),
        bomb_defused: count(HistoryField::BombDefused),
        matches: lenient_number(&row.matches) as i64,
        wins: lenient_number(&row.wins) as i64,
        losses: lenient_number(&row.losses) as i64,
        kills_per_map: 0.0,
        deaths_per_map: 0.0,
        first_kills_per_map: 0.0,
        bomb_planted_per_map: 0.0,
        bomb_defused_per_map: 0.0,
    })
}

/// "57%" -> 57.0, "1,5" -> 1.5, anything unusable -> 0.0. Never NaN.
pub fn parse_percent(raw: &str) -> f64 {
    let cleaned = raw.trim().trim_end_matches('%').trim().replace(',', ".");
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

pub fn lenient_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Value::String(s) => parse_percent(s),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

pub fn strict_int(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                return Ok(v);
            }
            let v = n.as_f64().ok_or_else(|| anyhow!("not an integer"))?;
            finite_to_int(v)
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(v) = trimmed.parse::<i64>() {
                return Ok(v);
            }
            let v = trimmed
                .parse::<f64>()
                .map_err(|_| anyhow!("not an integer"))?;
            finite_to_int(v)
        }
        _ => Err(anyhow!("not an integer")),
    }
}

pub fn strict_float(value: &Value) -> Result<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| anyhow!("not a number"))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| anyhow!("not a number"))?,
        _ => return Err(anyhow!("not a number")),
    };
    if v.is_finite() {
        Ok(v)
    } else {
        Err(anyhow!("not a finite number"))
    }
}

fn finite_to_int(v: f64) -> Result<i64> {
    if !v.is_finite() || v.abs() > i64::MAX as f64 {
        return Err(anyhow!("not an integer"));
    }
    Ok(v.trunc() as i64)
}

pub fn parse_datetime(value: &Value) -> Result<NaiveDateTime> {
    let raw = value
        .as_str()
        .map(str::trim)
        .ok_or_else(|| anyhow!("timestamp is not a string"))?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("invalid midnight for {raw}"));
    }
    Err(anyhow!("unrecognised timestamp {raw:?}"))
}

/// `YYYY-MM` -> first day of that month.
pub fn parse_month(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    let (year, month) = trimmed
        .split_once('-')
        .ok_or_else(|| anyhow!("month {trimmed:?} is not YYYY-MM"))?;
    let year = year
        .parse::<i32>()
        .map_err(|_| anyhow!("month {trimmed:?} has a bad year"))?;
    let month = month
        .parse::<u32>()
        .map_err(|_| anyhow!("month {trimmed:?} has a bad month"))?;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| anyhow!("month {trimmed:?} out of range"))
}
