use std::fs;
use std::path::PathBuf;

use gc_dashboard::config::RosterEntry;
use gc_dashboard::history_fetch::{StatSlotMap, parse_history_json};
use gc_dashboard::match_fetch::parse_match_json;
use gc_dashboard::metrics::{derive_match_shares, derive_per_map_rates};
use gc_dashboard::normalize::{coerce_history, coerce_matches};
use gc_dashboard::records::{HistoryField, TEAM_A, TEAM_B};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn y4s() -> RosterEntry {
    RosterEntry {
        name: "y4s".to_string(),
        id: 225737,
    }
}

#[test]
fn parses_match_detail_fixture() {
    let raw = read_fixture("match_detail.json");
    let rows = parse_match_json(22697838, &raw).expect("fixture should parse");
    assert_eq!(rows.len(), 10);
    assert!(rows[..5].iter().all(|r| r.team == TEAM_A));
    assert!(rows[5..].iter().all(|r| r.team == TEAM_B));
    assert_eq!(rows[0].nick, "y4s");
    assert_eq!(rows[0].game_id, 22697838);
    assert_eq!(rows[5].nick, "kzn");
}

#[test]
fn match_fixture_coerces_and_derives() {
    let raw = read_fixture("match_detail.json");
    let rows = parse_match_json(22697838, &raw).expect("fixture should parse");
    let typed = coerce_matches(&rows).expect("fixture should coerce");
    let derived = derive_match_shares(&typed);

    let y4s = &derived[0];
    assert_eq!(y4s.map_name, "de_mirage");
    assert_eq!(y4s.updated_at.to_string(), "2025-02-08 21:14:03");
    assert_eq!(y4s.nb_kill, 25);
    assert_eq!(y4s.kdr, 1.47);
    assert_eq!(y4s.adr, 113.6);
    assert_eq!(y4s.rating, 1.43);
    assert_eq!(y4s.kills_share, 16.67);
    assert_eq!(y4s.damage_per_hit, 25.0);

    let damage_total: f64 = derived.iter().map(|r| r.damage_share).sum();
    let kills_total: f64 = derived.iter().map(|r| r.kills_share).sum();
    assert!((damage_total - 100.0).abs() <= 0.05);
    assert!((kills_total - 100.0).abs() <= 0.05);
}

#[test]
fn parses_history_fixture() {
    let raw = read_fixture("history_month.json");
    let row = parse_history_json(&y4s(), "2024-01", &raw, &StatSlotMap::default())
        .expect("fixture should parse");
    assert_eq!(row.player_id, 225737);
    assert_eq!(row.stats.len(), 9);
    assert_eq!(
        row.stat(HistoryField::Multikills).and_then(|v| v.as_str()),
        Some("36")
    );

    let typed = coerce_history(&[row]).expect("history should coerce");
    let derived = derive_per_map_rates(&typed);
    let month = &derived[0];
    assert_eq!(month.month.to_string(), "2024-01-01");
    assert_eq!(month.kills, 240);
    assert_eq!(month.headshot_rate, 47.0);
    assert_eq!(month.matches, 12);
    assert_eq!(month.wins, 7);
    assert_eq!(month.losses, 5);
    assert_eq!(month.kills_per_map, 20.0);
    assert_eq!(month.deaths_per_map, 16.5);
    assert_eq!(month.bomb_defused_per_map, 0.5);
}

#[test]
fn history_with_short_stat_array_is_rejected() {
    let raw = r#"{"matches":{"wins":1,"loss":0,"matches":1},"stat":[{"value":"1.0"}]}"#;
    let err = parse_history_json(&y4s(), "2024-01", raw, &StatSlotMap::default())
        .expect_err("short stat array should fail");
    assert!(err.to_string().contains("absent"));
}
