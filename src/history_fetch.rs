use std::collections::HashSet;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RosterEntry;
use crate::http_client::StatsSource;
use crate::pool::fetch_all;
use crate::records::{HistoryField, RawHistoryRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatSlot {
    pub field: HistoryField,
    pub index: usize,
}

/// Position of each statistic inside the history document's `stat` array.
///
/// The upstream array is read by index, not by label. If the API ever reorders
/// it, this table is the one place to change; bump `version` when doing so.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatSlotMap {
    pub version: String,
    pub slots: Vec<StatSlot>,
}

impl Default for StatSlotMap {
    fn default() -> Self {
        use HistoryField::*;
        // Slot 4 (win rate) is present upstream but unused.
        let slots = [
            (Kdr, 0),
            (Adr, 1),
            (Kills, 2),
            (Deaths, 3),
            (Multikills, 5),
            (FirstKills, 6),
            (HeadshotRate, 7),
            (BombPlanted, 8),
            (BombDefused, 9),
        ]
        .into_iter()
        .map(|(field, index)| StatSlot { field, index })
        .collect();
        Self {
            version: "v1".to_string(),
            slots,
        }
    }
}

impl StatSlotMap {
    /// Every field must be mapped exactly once and no two fields may share a slot.
    pub fn validate(&self) -> Result<()> {
        let mut fields = HashSet::new();
        let mut indices = HashSet::new();
        for slot in &self.slots {
            if !fields.insert(slot.field) {
                return Err(anyhow!(
                    "stat slot map {}: {} mapped twice",
                    self.version,
                    slot.field.key()
                ));
            }
            if !indices.insert(slot.index) {
                return Err(anyhow!(
                    "stat slot map {}: index {} used twice",
                    self.version,
                    slot.index
                ));
            }
        }
        for field in HistoryField::ALL {
            if !fields.contains(&field) {
                return Err(anyhow!(
                    "stat slot map {}: {} not mapped",
                    self.version,
                    field.key()
                ));
            }
        }
        Ok(())
    }

    pub fn index_of(&self, field: HistoryField) -> Option<usize> {
        self.slots
            .iter()
            .find(|slot| slot.field == field)
            .map(|slot| slot.index)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryBatch {
    pub rows: Vec<RawHistoryRow>,
    pub requests_total: usize,
    pub requests_succeeded: usize,
    pub errors: Vec<String>,
}

/// One request per (month, player), months outermost. Failed pairs are
/// dropped rather than null-filled.
pub fn fetch_history(
    source: &dyn StatsSource,
    roster: &[RosterEntry],
    months: &[String],
    slots: &StatSlotMap,
    parallelism: usize,
) -> HistoryBatch {
    let pairs: Vec<(&String, &RosterEntry)> = months
        .iter()
        .flat_map(|month| roster.iter().map(move |player| (month, player)))
        .collect();
    let total = pairs.len();

    let results = fetch_all(&pairs, parallelism, |(month, player)| {
        source
            .player_history(player.id, month)
            .and_then(|body| parse_history_json(player, month, &body, slots))
    });

    let mut batch = HistoryBatch {
        requests_total: total,
        ..HistoryBatch::default()
    };
    for (idx, ((month, player), result)) in pairs.iter().zip(results).enumerate() {
        match result {
            Ok(row) => {
                tracing::info!(
                    player = %player.name,
                    month = %month,
                    "loaded {} of {}",
                    idx + 1,
                    total
                );
                batch.requests_succeeded += 1;
                batch.rows.push(row);
            }
            Err(err) => {
                tracing::warn!(player = %player.name, month = %month, "skipping history: {err:#}");
                batch
                    .errors
                    .push(format!("history {} ({}) {month}: {err:#}", player.name, player.id));
            }
        }
    }
    batch
}

pub fn parse_history_json(
    player: &RosterEntry,
    month: &str,
    raw: &str,
    slots: &StatSlotMap,
) -> Result<RawHistoryRow> {
    let root: Value = serde_json::from_str(raw.trim()).context("invalid history json")?;

    let matches = root
        .get("matches")
        .filter(|v| v.is_object())
        .ok_or_else(|| anyhow!("missing matches block"))?;
    let stat = root
        .get("stat")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("missing stat array"))?;

    let mut stats = Vec::with_capacity(slots.slots.len());
    for slot in &slots.slots {
        let entry = stat.get(slot.index).ok_or_else(|| {
            anyhow!(
                "stat[{}] ({}) absent, array has {} entries",
                slot.index,
                slot.field.key(),
                stat.len()
            )
        })?;
        let value = entry.get("value").cloned().unwrap_or(Value::Null);
        stats.push((slot.field, value));
    }

    Ok(RawHistoryRow {
        player_id: player.id,
        name: player.name.clone(),
        month: month.to_string(),
        stats,
        wins: matches.get("wins").cloned().unwrap_or(Value::Null),
        losses: matches.get("loss").cloned().unwrap_or(Value::Null),
        matches: matches.get("matches").cloned().unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn y4s() -> RosterEntry {
        RosterEntry {
            name: "y4s".to_string(),
            id: 225737,
        }
    }

    fn history_doc() -> String {
        json!({
            "matches": { "wins": 7, "loss": 5, "matches": 12 },
            "stat": [
                { "stat": "KDR", "value": "1.21" },
                { "stat": "ADR", "value": "88.4" },
                { "stat": "Kills", "value": 210 },
                { "stat": "Deaths", "value": 174 },
                { "stat": "% Win", "value": "58%" },
                { "stat": "Multi Kills", "value": 31 },
                { "stat": "First Kills", "value": 22 },
                { "stat": "HS", "value": "47%" },
                { "stat": "Bomb planted", "value": "9%" },
                { "stat": "Bomb defused", "value": "3%" }
            ]
        })
        .to_string()
    }

    #[test]
    fn default_map_is_valid() {
        let map = StatSlotMap::default();
        assert!(map.validate().is_ok());
        assert_eq!(map.index_of(HistoryField::Multikills), Some(5));
        assert_eq!(map.index_of(HistoryField::BombDefused), Some(9));
    }

    #[test]
    fn duplicate_slot_is_rejected() {
        let mut map = StatSlotMap::default();
        map.slots[1].index = 0;
        assert!(map.validate().is_err());
    }

    #[test]
    fn reads_stats_by_position() {
        let row = parse_history_json(&y4s(), "2024-01", &history_doc(), &StatSlotMap::default())
            .expect("doc should parse");
        assert_eq!(row.name, "y4s");
        assert_eq!(row.stat(HistoryField::Kdr), Some(&json!("1.21")));
        assert_eq!(row.stat(HistoryField::Multikills), Some(&json!(31)));
        assert_eq!(row.stat(HistoryField::HeadshotRate), Some(&json!("47%")));
        assert_eq!(row.matches, json!(12));
        assert_eq!(row.losses, json!(5));
    }

    #[test]
    fn remapped_slots_follow_the_table() {
        let mut map = StatSlotMap::default();
        map.version = "v2".to_string();
        for slot in &mut map.slots {
            if slot.field == HistoryField::Kills {
                slot.index = 3;
            } else if slot.field == HistoryField::Deaths {
                slot.index = 2;
            }
        }
        let row = parse_history_json(&y4s(), "2024-01", &history_doc(), &map)
            .expect("doc should parse");
        assert_eq!(row.stat(HistoryField::Kills), Some(&json!(174)));
        assert_eq!(row.stat(HistoryField::Deaths), Some(&json!(210)));
    }

    #[test]
    fn short_stat_array_is_shape_error() {
        let raw = json!({
            "matches": { "wins": 0, "loss": 0, "matches": 0 },
            "stat": [{ "value": "1.0" }]
        })
        .to_string();
        assert!(parse_history_json(&y4s(), "2024-01", &raw, &StatSlotMap::default()).is_err());
    }

    #[test]
    fn missing_matches_block_is_shape_error() {
        let raw = json!({ "stat": [] }).to_string();
        assert!(parse_history_json(&y4s(), "2024-01", &raw, &StatSlotMap::default()).is_err());
    }
}
