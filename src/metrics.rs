use std::collections::HashMap;

use crate::records::{MatchPlayerRecord, PlayerMonthRecord};

/// Half away from zero, two decimals.
pub fn round2(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    (x * 100.0).round() / 100.0
}

/// `num / den`, or 0 when the denominator is 0 or the result is not finite.
pub fn safe_ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        return 0.0;
    }
    let v = num / den;
    if v.is_finite() { v } else { 0.0 }
}

pub fn share_pct(value: i64, total: i64) -> f64 {
    round2(safe_ratio(value as f64, total as f64) * 100.0)
}

#[derive(Debug, Clone, Copy, Default)]
struct MatchTotals {
    damage: i64,
    kills: i64,
    hits: i64,
}

/// Adds per-match share columns and damage per hit. Totals are taken from raw
/// columns only, so running this twice yields the same table.
pub fn derive_match_shares(rows: &[MatchPlayerRecord]) -> Vec<MatchPlayerRecord> {
    let mut totals: HashMap<u64, MatchTotals> = HashMap::new();
    for row in rows {
        let t = totals.entry(row.game_id).or_default();
        t.damage += row.damage;
        t.kills += row.nb_kill;
        t.hits += row.hits;
    }

    rows.iter()
        .map(|row| {
            let t = totals.get(&row.game_id).copied().unwrap_or_default();
            MatchPlayerRecord {
                damage_share: share_pct(row.damage, t.damage),
                kills_share: share_pct(row.nb_kill, t.kills),
                hits_share: share_pct(row.hits, t.hits),
                damage_per_hit: round2(safe_ratio(row.damage as f64, row.hits as f64)),
                ..row.clone()
            }
        })
        .collect()
}

pub fn derive_per_map_rates(rows: &[PlayerMonthRecord]) -> Vec<PlayerMonthRecord> {
    rows.iter()
        .map(|row| {
            let per_map = |v: i64| round2(safe_ratio(v as f64, row.matches as f64));
            PlayerMonthRecord {
                kills_per_map: per_map(row.kills),
                deaths_per_map: per_map(row.deaths),
                first_kills_per_map: per_map(row.first_kills),
                bomb_planted_per_map: per_map(row.bomb_planted),
                bomb_defused_per_map: per_map(row.bomb_defused),
                ..row.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_is_half_away_from_zero() {
        assert_eq!(round2(1.005_000_1), 1.01);
        assert_eq!(round2(2.344), 2.34);
        assert_eq!(round2(-2.345_000_1), -2.35);
        assert_eq!(round2(f64::NAN), 0.0);
    }

    #[test]
    fn safe_ratio_zero_denominator() {
        assert_eq!(safe_ratio(0.0, 0.0), 0.0);
        assert_eq!(safe_ratio(10.0, 0.0), 0.0);
        assert_eq!(safe_ratio(10.0, 4.0), 2.5);
    }

    #[test]
    fn share_of_empty_total_is_zero() {
        assert_eq!(share_pct(0, 0), 0.0);
        assert_eq!(share_pct(1, 3), 33.33);
    }
}
