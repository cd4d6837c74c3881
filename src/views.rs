use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::metrics::round2;
use crate::records::{MatchPlayerRecord, PlayerMonthRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryMetric {
    Kdr,
    Adr,
    Kills,
    Deaths,
    MultiKills,
    FirstKills,
    HeadshotRate,
    BombsPlanted,
    BombsDefused,
    MatchesPlayed,
    KillsPerMap,
    DeathsPerMap,
    FirstKillsPerMap,
    BombsPlantedPerMap,
    BombsDefusedPerMap,
}

impl HistoryMetric {
    pub const ALL: [HistoryMetric; 15] = [
        HistoryMetric::Kdr,
        HistoryMetric::Adr,
        HistoryMetric::Kills,
        HistoryMetric::Deaths,
        HistoryMetric::MultiKills,
        HistoryMetric::FirstKills,
        HistoryMetric::HeadshotRate,
        HistoryMetric::BombsPlanted,
        HistoryMetric::BombsDefused,
        HistoryMetric::MatchesPlayed,
        HistoryMetric::KillsPerMap,
        HistoryMetric::DeathsPerMap,
        HistoryMetric::FirstKillsPerMap,
        HistoryMetric::BombsPlantedPerMap,
        HistoryMetric::BombsDefusedPerMap,
    ];

    pub fn label(self) -> &'static str {
        match self {
            HistoryMetric::Kdr => "KDR",
            HistoryMetric::Adr => "ADR",
            HistoryMetric::Kills => "Kills",
            HistoryMetric::Deaths => "Deaths",
            HistoryMetric::MultiKills => "Multi Kills",
            HistoryMetric::FirstKills => "First Kills",
            HistoryMetric::HeadshotRate => "Headshot Rate",
            HistoryMetric::BombsPlanted => "Bombs Planted",
            HistoryMetric::BombsDefused => "Bombs Defused",
            HistoryMetric::MatchesPlayed => "Matches Played",
            HistoryMetric::KillsPerMap => "Kills Per Map",
            HistoryMetric::DeathsPerMap => "Deaths Per Map",
            HistoryMetric::FirstKillsPerMap => "First Kills Per Map",
            HistoryMetric::BombsPlantedPerMap => "Bombs Planted Per Map",
            HistoryMetric::BombsDefusedPerMap => "Bombs Defused Per Map",
        }
    }

    pub fn value(self, r: &PlayerMonthRecord) -> f64 {
        match self {
            HistoryMetric::Kdr => r.kdr,
            HistoryMetric::Adr => r.adr,
            HistoryMetric::Kills => r.kills as f64,
            HistoryMetric::Deaths => r.deaths as f64,
            HistoryMetric::MultiKills => r.multikills as f64,
            HistoryMetric::FirstKills => r.first_kills as f64,
            HistoryMetric::HeadshotRate => r.headshot_rate,
            HistoryMetric::BombsPlanted => r.bomb_planted as f64,
            HistoryMetric::BombsDefused => r.bomb_defused as f64,
            HistoryMetric::MatchesPlayed => r.matches as f64,
            HistoryMetric::KillsPerMap => r.kills_per_map,
            HistoryMetric::DeathsPerMap => r.deaths_per_map,
            HistoryMetric::FirstKillsPerMap => r.first_kills_per_map,
            HistoryMetric::BombsPlantedPerMap => r.bomb_planted_per_map,
            HistoryMetric::BombsDefusedPerMap => r.bomb_defused_per_map,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMetric {
    Kills,
    Assist,
    Deaths,
    Damage,
    Adr,
    Kdr,
    HeadshotRate,
    FirstKill,
    Kast,
    Hits,
    Level,
    Rating,
    FlashAssist,
    MultiKills,
    DamageShare,
    KillsShare,
    HitsShare,
    DamagePerHit,
}

impl MatchMetric {
    pub const ALL: [MatchMetric; 18] = [
        MatchMetric::Kills,
        MatchMetric::Assist,
        MatchMetric::Deaths,
        MatchMetric::Damage,
        MatchMetric::Adr,
        MatchMetric::Kdr,
        MatchMetric::HeadshotRate,
        MatchMetric::FirstKill,
        MatchMetric::Kast,
        MatchMetric::Hits,
        MatchMetric::Level,
        MatchMetric::Rating,
        MatchMetric::FlashAssist,
        MatchMetric::MultiKills,
        MatchMetric::DamageShare,
        MatchMetric::KillsShare,
        MatchMetric::HitsShare,
        MatchMetric::DamagePerHit,
    ];

    /// Stats summarised on the player match history screen.
    pub const PLAYER_SUMMARY: [MatchMetric; 13] = [
        MatchMetric::Kills,
        MatchMetric::Deaths,
        MatchMetric::Assist,
        MatchMetric::Damage,
        MatchMetric::Adr,
        MatchMetric::Kdr,
        MatchMetric::HeadshotRate,
        MatchMetric::Kast,
        MatchMetric::FirstKill,
        MatchMetric::MultiKills,
        MatchMetric::DamageShare,
        MatchMetric::KillsShare,
        MatchMetric::DamagePerHit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MatchMetric::Kills => "Kills",
            MatchMetric::Assist => "Assist",
            MatchMetric::Deaths => "Deaths",
            MatchMetric::Damage => "Damage",
            MatchMetric::Adr => "ADR",
            MatchMetric::Kdr => "KDR",
            MatchMetric::HeadshotRate => "Headshot Rate",
            MatchMetric::FirstKill => "First Kill",
            MatchMetric::Kast => "KAST",
            MatchMetric::Hits => "Hits",
            MatchMetric::Level => "Level",
            MatchMetric::Rating => "Rating",
            MatchMetric::FlashAssist => "Flash Assist",
            MatchMetric::MultiKills => "Multi Kills",
            MatchMetric::DamageShare => "Damage Share %",
            MatchMetric::KillsShare => "Kills Share %",
            MatchMetric::HitsShare => "Hits Share %",
            MatchMetric::DamagePerHit => "Damage Per Hit",
        }
    }

    pub fn value(self, r: &MatchPlayerRecord) -> f64 {
        match self {
            MatchMetric::Kills => r.nb_kill as f64,
            MatchMetric::Assist => r.assist as f64,
            MatchMetric::Deaths => r.death as f64,
            MatchMetric::Damage => r.damage as f64,
            MatchMetric::Adr => r.adr,
            MatchMetric::Kdr => r.kdr,
            MatchMetric::HeadshotRate => r.phs,
            MatchMetric::FirstKill => r.firstkill as f64,
            MatchMetric::Kast => r.pkast,
            MatchMetric::Hits => r.hits as f64,
            MatchMetric::Level => r.level as f64,
            MatchMetric::Rating => r.rating,
            MatchMetric::FlashAssist => r.flash_assist as f64,
            MatchMetric::MultiKills => r.multikills as f64,
            MatchMetric::DamageShare => r.damage_share,
            MatchMetric::KillsShare => r.kills_share,
            MatchMetric::HitsShare => r.hits_share,
            MatchMetric::DamagePerHit => r.damage_per_hit,
        }
    }
}

/// Rows keyed by `K`, one column per player, mean value per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot<K> {
    pub index: Vec<K>,
    pub columns: Vec<String>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl<K: Copy> Pivot<K> {
    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.columns.is_empty()
    }

    pub fn column_series(&self, column: usize) -> Vec<(K, f64)> {
        self.index
            .iter()
            .zip(&self.cells)
            .filter_map(|(key, row)| row.get(column).copied().flatten().map(|v| (*key, v)))
            .collect()
    }

    pub fn max_value(&self) -> f64 {
        self.cells
            .iter()
            .flatten()
            .flatten()
            .copied()
            .fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub label: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

pub fn summarize(label: &str, values: &[f64]) -> Option<SummaryRow> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(SummaryRow {
        label: label.to_string(),
        mean: round2(sum / values.len() as f64),
        min: round2(min),
        max: round2(max),
        count: values.len(),
    })
}

fn pivot_mean<K: Ord + Copy>(points: impl Iterator<Item = (K, String, f64)>) -> Pivot<K> {
    let mut groups: BTreeMap<(K, String), (f64, usize)> = BTreeMap::new();
    let mut keys = BTreeSet::new();
    let mut columns = BTreeSet::new();
    for (key, column, value) in points {
        keys.insert(key);
        columns.insert(column.clone());
        let slot = groups.entry((key, column)).or_insert((0.0, 0));
        slot.0 += value;
        slot.1 += 1;
    }

    let index: Vec<K> = keys.into_iter().collect();
    let columns: Vec<String> = columns.into_iter().collect();
    let cells = index
        .iter()
        .map(|key| {
            columns
                .iter()
                .map(|col| {
                    groups
                        .get(&(*key, col.clone()))
                        .map(|(sum, n)| sum / *n as f64)
                })
                .collect()
        })
        .collect();
    Pivot {
        index,
        columns,
        cells,
    }
}

fn selected(players: &[String], name: &str) -> bool {
    players.iter().any(|p| p == name)
}

pub fn history_players(rows: &[PlayerMonthRecord]) -> Vec<String> {
    let set: BTreeSet<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    set.into_iter().map(str::to_string).collect()
}

/// Month x player pivot of the per-(month, player) mean.
pub fn history_series(
    rows: &[PlayerMonthRecord],
    metric: HistoryMetric,
    players: &[String],
) -> Pivot<NaiveDate> {
    pivot_mean(
        rows.iter()
            .filter(|r| selected(players, &r.name))
            .map(|r| (r.month, r.name.clone(), metric.value(r))),
    )
}

pub fn history_summary(
    rows: &[PlayerMonthRecord],
    metric: HistoryMetric,
    players: &[String],
) -> Vec<SummaryRow> {
    let mut per_player: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for r in rows.iter().filter(|r| selected(players, &r.name)) {
        per_player
            .entry(r.name.as_str())
            .or_default()
            .push(metric.value(r));
    }
    per_player
        .into_iter()
        .filter_map(|(name, values)| summarize(name, &values))
        .collect()
}

pub fn game_ids(rows: &[MatchPlayerRecord]) -> Vec<u64> {
    let set: BTreeSet<u64> = rows.iter().map(|r| r.game_id).collect();
    set.into_iter().collect()
}

/// Nicks that appear in any of `games`.
pub fn match_players(rows: &[MatchPlayerRecord], games: &[u64]) -> Vec<String> {
    let set: BTreeSet<&str> = rows
        .iter()
        .filter(|r| games.contains(&r.game_id))
        .map(|r| r.nick.as_str())
        .collect();
    set.into_iter().map(str::to_string).collect()
}

pub fn match_pivot(
    rows: &[MatchPlayerRecord],
    metric: MatchMetric,
    games: &[u64],
    players: &[String],
) -> Pivot<u64> {
    pivot_mean(
        rows.iter()
            .filter(|r| games.contains(&r.game_id) && selected(players, &r.nick))
            .map(|r| (r.game_id, r.nick.clone(), metric.value(r))),
    )
}

/// Detail rows ordered by game, team, nick.
pub fn match_details<'a>(
    rows: &'a [MatchPlayerRecord],
    games: &[u64],
    players: &[String],
) -> Vec<&'a MatchPlayerRecord> {
    let mut out: Vec<&MatchPlayerRecord> = rows
        .iter()
        .filter(|r| games.contains(&r.game_id) && selected(players, &r.nick))
        .collect();
    out.sort_by(|a, b| {
        a.game_id
            .cmp(&b.game_id)
            .then_with(|| a.team.cmp(&b.team))
            .then_with(|| a.nick.cmp(&b.nick))
    });
    out
}

pub fn all_nicks(rows: &[MatchPlayerRecord]) -> Vec<String> {
    let set: BTreeSet<&str> = rows.iter().map(|r| r.nick.as_str()).collect();
    set.into_iter().map(str::to_string).collect()
}

pub fn player_games(rows: &[MatchPlayerRecord], nick: &str) -> Vec<u64> {
    let set: BTreeSet<u64> = rows
        .iter()
        .filter(|r| r.nick == nick)
        .map(|r| r.game_id)
        .collect();
    set.into_iter().collect()
}

/// The last `n` games of an ascending id list.
pub fn recent_games(games: &[u64], n: usize) -> Vec<u64> {
    games[games.len().saturating_sub(n)..].to_vec()
}

pub fn player_match_series(
    rows: &[MatchPlayerRecord],
    nick: &str,
    games: &[u64],
    metric: MatchMetric,
) -> Vec<(u64, f64)> {
    let pivot = match_pivot(rows, metric, games, &[nick.to_string()]);
    pivot.column_series(0)
}

/// Newest first, like the detail table on the player screen.
pub fn player_match_rows<'a>(
    rows: &'a [MatchPlayerRecord],
    nick: &str,
    games: &[u64],
) -> Vec<&'a MatchPlayerRecord> {
    let mut out: Vec<&MatchPlayerRecord> = rows
        .iter()
        .filter(|r| r.nick == nick && games.contains(&r.game_id))
        .collect();
    out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    out
}

pub fn player_match_summary(
    rows: &[MatchPlayerRecord],
    nick: &str,
    games: &[u64],
) -> Vec<SummaryRow> {
    let picked = player_match_rows(rows, nick, games);
    MatchMetric::PLAYER_SUMMARY
        .iter()
        .filter_map(|metric| {
            let values: Vec<f64> = picked.iter().map(|r| metric.value(r)).collect();
            summarize(metric.label(), &values)
        })
        .collect()
}
