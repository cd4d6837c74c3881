use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;

use gc_dashboard::match_fetch::parse_match_json;
use gc_dashboard::metrics::{derive_match_shares, derive_per_map_rates};
use gc_dashboard::normalize::coerce_matches;
use gc_dashboard::records::{MatchPlayerRecord, PlayerMonthRecord};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn two_matches() -> Vec<MatchPlayerRecord> {
    let raw = read_fixture("match_detail.json");
    let mut rows = parse_match_json(1, &raw).expect("fixture should parse");
    // Second match with one player only.
    let mut solo = parse_match_json(2, &raw).expect("fixture should parse");
    solo.truncate(1);
    rows.extend(solo);
    coerce_matches(&rows).expect("fixture should coerce")
}

fn month(kills: i64, matches: i64) -> PlayerMonthRecord {
    PlayerMonthRecord {
        month: NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date"),
        player_id: 591719,
        name: "noway".to_string(),
        kdr: 0.9,
        adr: 70.0,
        kills,
        deaths: 40,
        multikills: 5,
        first_kills: 9,
        headshot_rate: 38.0,
        bomb_planted: 3,
        bomb_defused: 1,
        matches,
        wins: 0,
        losses: 0,
        kills_per_map: 0.0,
        deaths_per_map: 0.0,
        first_kills_per_map: 0.0,
        bomb_planted_per_map: 0.0,
        bomb_defused_per_map: 0.0,
    }
}

#[test]
fn shares_sum_to_hundred_per_match() {
    let derived = derive_match_shares(&two_matches());
    for game_id in [1u64, 2] {
        let rows: Vec<&MatchPlayerRecord> =
            derived.iter().filter(|r| r.game_id == game_id).collect();
        let sum = |f: fn(&MatchPlayerRecord) -> f64| rows.iter().map(|r| f(r)).sum::<f64>();
        assert!((sum(|r| r.damage_share) - 100.0).abs() <= 0.05);
        assert!((sum(|r| r.kills_share) - 100.0).abs() <= 0.05);
        assert!((sum(|r| r.hits_share) - 100.0).abs() <= 0.05);
    }
    let solo = derived.iter().find(|r| r.game_id == 2).expect("solo row");
    assert_eq!(solo.damage_share, 100.0);
}

#[test]
fn derive_pass_is_idempotent() {
    let once = derive_match_shares(&two_matches());
    let twice = derive_match_shares(&once);
    assert_eq!(once, twice);

    let months = derive_per_map_rates(&[month(120, 8)]);
    assert_eq!(derive_per_map_rates(&months), months);
}

#[test]
fn zero_matches_gives_zero_rates() {
    let rows = derive_per_map_rates(&[month(120, 0)]);
    let r = &rows[0];
    assert_eq!(r.kills_per_map, 0.0);
    assert_eq!(r.deaths_per_map, 0.0);
    assert_eq!(r.first_kills_per_map, 0.0);
    assert_eq!(r.bomb_planted_per_map, 0.0);
    assert_eq!(r.bomb_defused_per_map, 0.0);
}

#[test]
fn per_map_rates_round_to_two_places() {
    let rows = derive_per_map_rates(&[month(100, 3)]);
    assert_eq!(rows[0].kills_per_map, 33.33);
    assert_eq!(rows[0].first_kills_per_map, 3.0);
}
