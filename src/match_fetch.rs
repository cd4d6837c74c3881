use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};

use crate::http_client::StatsSource;
use crate::pool::fetch_all;
use crate::records::{MATCH_FIELDS, RawMatchRow, team_label};

#[derive(Debug, Clone, Default)]
pub struct MatchBatch {
    pub rows: Vec<RawMatchRow>,
    pub games_total: usize,
    pub games_succeeded: usize,
    pub errors: Vec<String>,
}

/// Fetches and flattens every match in `game_ids`. A failing id is logged,
/// recorded in `errors` and contributes no rows.
pub fn fetch_matches(
    source: &dyn StatsSource,
    game_ids: &[u64],
    parallelism: usize,
) -> MatchBatch {
    let results = fetch_all(game_ids, parallelism, |game_id| {
        let rows = source
            .match_detail(*game_id)
            .and_then(|body| parse_match_json(*game_id, &body));
        (*game_id, rows)
    });

    let mut batch = MatchBatch {
        games_total: game_ids.len(),
        ..MatchBatch::default()
    };
    for (game_id, result) in results {
        match result {
            Ok(rows) => {
                tracing::info!(game_id, players = rows.len(), "processed match");
                batch.games_succeeded += 1;
                batch.rows.extend(rows);
            }
            Err(err) => {
                tracing::warn!(game_id, "skipping match: {err:#}");
                batch.errors.push(format!("match {game_id}: {err:#}"));
            }
        }
    }
    batch
}

/// Flattens one match document into one row per player, team A first.
///
/// The live endpoint wraps the payload in a `jogos` object; a bare payload is
/// accepted too.
pub fn parse_match_json(game_id: u64, raw: &str) -> Result<Vec<RawMatchRow>> {
    let root: Value = serde_json::from_str(raw.trim()).context("invalid match json")?;
    let game = root.get("jogos").unwrap_or(&root);

    let players = game
        .get("players")
        .ok_or_else(|| anyhow!("missing players"))?;
    let team_a = team_entries(players, "team_a")?;
    let team_b = team_entries(players, "team_b")?;

    let updated_at = game
        .get("updated_at")
        .cloned()
        .ok_or_else(|| anyhow!("missing updated_at"))?;
    let map_name = game
        .get("map_name")
        .cloned()
        .ok_or_else(|| anyhow!("missing map_name"))?;

    let mut rows = Vec::with_capacity(team_a.len() + team_b.len());
    for (idx, entry) in team_a.iter().chain(team_b.iter()).enumerate() {
        rows.push(
            flatten_player(game_id, entry, &updated_at, &map_name)
                .with_context(|| format!("player entry {idx}"))?,
        );
    }
    Ok(rows)
}

fn team_entries<'a>(players: &'a Value, key: &str) -> Result<&'a Vec<Value>> {
    players
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("missing players.{key}"))
}

fn flatten_player(
    game_id: u64,
    entry: &Value,
    updated_at: &Value,
    map_name: &Value,
) -> Result<RawMatchRow> {
    let nick = entry
        .get("player")
        .and_then(|p| p.get("nick"))
        .or_else(|| entry.get("nick"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("missing player.nick"))?
        .to_string();

    let mut fields = Map::new();
    for name in MATCH_FIELDS {
        let value = entry
            .get(*name)
            .cloned()
            .ok_or_else(|| anyhow!("{nick}: missing field {name}"))?;
        fields.insert((*name).to_string(), value);
    }

    let room = fields
        .get("player_room")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let team = team_label(room).to_string();

    Ok(RawMatchRow {
        game_id,
        nick,
        team,
        updated_at: updated_at.clone(),
        map_name: map_name.clone(),
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::MemorySource;
    use serde_json::json;

    fn player(nick: &str, room: &str, kills: i64) -> Value {
        let mut entry = json!({ "player": { "nick": nick } });
        for name in MATCH_FIELDS {
            entry[*name] = json!(1);
        }
        entry["player_room"] = json!(room);
        entry["nb_kill"] = json!(kills);
        entry
    }

    fn doc(team_a: Vec<Value>, team_b: Vec<Value>) -> String {
        json!({
            "jogos": {
                "updated_at": "2025-02-10 21:14:03",
                "map_name": "de_mirage",
                "players": { "team_a": team_a, "team_b": team_b }
            }
        })
        .to_string()
    }

    #[test]
    fn flattens_both_teams_with_match_metadata() {
        let raw = doc(
            vec![player("a1", "a", 10), player("a2", "a", 5)],
            vec![player("b1", "b", 7)],
        );
        let rows = parse_match_json(42, &raw).expect("doc should parse");
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.game_id == 42));
        assert!(rows.iter().all(|r| r.map_name == json!("de_mirage")));
        assert!(rows.iter().all(|r| r.updated_at == json!("2025-02-10 21:14:03")));
        assert_eq!(rows[0].team, "Team A");
        assert_eq!(rows[2].team, "Team B");
        assert_eq!(rows[2].nick, "b1");
        assert_eq!(rows[0].fields["nb_kill"], json!(10));
    }

    #[test]
    fn accepts_bare_payload() {
        let raw = json!({
            "updated_at": "2025-02-10T21:14:03",
            "map_name": "de_nuke",
            "players": { "team_a": [player("x", "a", 1)], "team_b": [] }
        })
        .to_string();
        let rows = parse_match_json(7, &raw).expect("bare doc should parse");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn missing_team_is_shape_error() {
        let raw = json!({ "jogos": { "players": { "team_a": [] } } }).to_string();
        assert!(parse_match_json(1, &raw).is_err());
    }

    #[test]
    fn missing_player_field_is_shape_error() {
        let mut broken = player("x", "a", 1);
        if let Some(obj) = broken.as_object_mut() {
            obj.remove("damage");
        }
        let raw = doc(vec![broken], vec![]);
        let err = parse_match_json(1, &raw).expect_err("missing damage should fail");
        assert!(format!("{err:#}").contains("damage"));
    }

    #[test]
    fn failing_match_is_skipped_without_touching_others() {
        let good = doc(vec![player("a1", "a", 3)], vec![player("b1", "b", 4)]);
        let source = MemorySource::new()
            .with_match(1, good.clone())
            .with_match(2, "<html>maintenance</html>")
            .with_match(3, good);
        let batch = fetch_matches(&source, &[1, 2, 3, 4], 1);
        assert_eq!(batch.games_total, 4);
        assert_eq!(batch.games_succeeded, 2);
        assert_eq!(batch.errors.len(), 2);
        assert_eq!(batch.rows.len(), 4);
        assert_eq!(
            batch.rows.iter().map(|r| r.game_id).collect::<Vec<_>>(),
            vec![1, 1, 3, 3]
        );
    }
}
