use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields copied verbatim from every player entry of a match document.
pub const MATCH_FIELDS: &[&str] = &[
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
];

pub const TEAM_A: &str = "Team A";
pub const TEAM_B: &str = "Team B";

/// One flattened player entry, before type coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMatchRow {
    pub game_id: u64,
    pub nick: String,
    pub team: String,
    pub updated_at: Value,
    pub map_name: Value,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPlayerRecord {
    pub game_id: u64,
    pub nick: String,
    pub team: String,
    pub player_room: String,
    pub updated_at: NaiveDateTime,
    pub map_name: String,
    pub nb_kill: i64,
    pub assist: i64,
    pub death: i64,
    pub hs: i64,
    pub damage: i64,
    pub adr: f64,
    pub kdr: f64,
    pub phs: f64,
    pub firstkill: i64,
    pub pkast: f64,
    pub nb1kill: i64,
    pub nb2kill: i64,
    pub nb3kill: i64,
    pub nb4kill: i64,
    pub nb5kill: i64,
    pub defuse: i64,
    pub bombe: i64,
    pub hits: i64,
    pub level: i64,
    // Kept fractional; the upstream value is not guaranteed to be integral.
    pub rating: f64,
    pub flash_assist: i64,
    pub multikills: i64,

    // Filled by `metrics::derive_match_shares` once the whole table is known.
    pub damage_share: f64,
    pub kills_share: f64,
    pub hits_share: f64,
    pub damage_per_hit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryField {
    Kdr,
    Adr,
    Kills,
    Deaths,
    Multikills,
    FirstKills,
    HeadshotRate,
    BombPlanted,
    BombDefused,
}

impl HistoryField {
    pub const ALL: [HistoryField; 9] = [
        HistoryField::Kdr,
        HistoryField::Adr,
        HistoryField::Kills,
        HistoryField::Deaths,
        HistoryField::Multikills,
        HistoryField::FirstKills,
        HistoryField::HeadshotRate,
        HistoryField::BombPlanted,
        HistoryField::BombDefused,
    ];

    pub fn key(self) -> &'static str {
        match self {
            HistoryField::Kdr => "kdr",
            HistoryField::Adr => "adr",
            HistoryField::Kills => "kills",
            HistoryField::Deaths => "deaths",
            HistoryField::Multikills => "multikills",
            HistoryField::FirstKills => "first_kills",
            HistoryField::HeadshotRate => "headshot_rate",
            HistoryField::BombPlanted => "bomb_planted",
            HistoryField::BombDefused => "bomb_defused",
        }
    }
}

/// One (player, month) history document reduced to the slots we read.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHistoryRow {
    pub player_id: u64,
    pub name: String,
    pub month: String,
    pub stats: Vec<(HistoryField, Value)>,
    pub wins: Value,
    pub losses: Value,
    pub matches: Value,
}

impl RawHistoryRow {
    pub fn stat(&self, field: HistoryField) -> Option<&Value> {
        self.stats
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMonthRecord {
    pub month: NaiveDate,
    pub player_id: u64,
    pub name: String,
    pub kdr: f64,
    pub adr: f64,
    pub kills: i64,
    pub deaths: i64,
    pub multikills: i64,
    pub first_kills: i64,
    pub headshot_rate: f64,
    pub bomb_planted: i64,
    pub bomb_defused: i64,
    pub matches: i64,
    pub wins: i64,
    pub losses: i64,

    // Filled by `metrics::derive_per_map_rates`.
    pub kills_per_map: f64,
    pub deaths_per_map: f64,
    pub first_kills_per_map: f64,
    pub bomb_planted_per_map: f64,
    pub bomb_defused_per_map: f64,
}

/// Both tables as handed to the dashboard. Never mutated after construction.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub matches: Vec<MatchPlayerRecord>,
    pub history: Vec<PlayerMonthRecord>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty() && self.history.is_empty()
    }
}

pub fn team_label(player_room: &str) -> &'static str {
    if player_room.trim().eq_ignore_ascii_case("a") {
        TEAM_A
    } else {
        TEAM_B
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_code_maps_to_team_label() {
        assert_eq!(team_label("a"), TEAM_A);
        assert_eq!(team_label(" A "), TEAM_A);
        assert_eq!(team_label("b"), TEAM_B);
    }
}
