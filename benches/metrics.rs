use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use gc_dashboard::match_fetch::parse_match_json;
use gc_dashboard::metrics::derive_match_shares;
use gc_dashboard::normalize::coerce_matches;
use gc_dashboard::records::MatchPlayerRecord;
use gc_dashboard::views::{self, MatchMetric};

const MATCH_JSON: &str = include_str!("../tests/fixtures/match_detail.json");

fn season_table(games: u64) -> Vec<MatchPlayerRecord> {
    let mut raw = Vec::new();
    for game_id in 0..games {
        raw.extend(parse_match_json(22_600_000 + game_id, MATCH_JSON).expect("valid fixture json"));
    }
    coerce_matches(&raw).expect("fixture coerces")
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_match_json", |b| {
        b.iter(|| parse_match_json(black_box(22697838), black_box(MATCH_JSON)))
    });
}

fn bench_derive(c: &mut Criterion) {
    let table = season_table(500);
    c.bench_function("derive_match_shares_500", |b| {
        b.iter(|| derive_match_shares(black_box(&table)))
    });
}

fn bench_pivot(c: &mut Criterion) {
    let table = derive_match_shares(&season_table(500));
    let games = views::game_ids(&table);
    let players = views::all_nicks(&table);
    c.bench_function("match_pivot_500", |b| {
        b.iter(|| {
            views::match_pivot(
                black_box(&table),
                MatchMetric::DamageShare,
                black_box(&games),
                black_box(&players),
            )
        })
    });
}

criterion_group!(benches, bench_parse, bench_derive, bench_pivot);
criterion_main!(benches);
