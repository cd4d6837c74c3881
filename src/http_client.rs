use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;

use crate::config::Config;

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Where the two raw documents come from. The HTTP implementation is the only
/// one used in production; tests feed canned bodies through `MemorySource`.
pub trait StatsSource: Sync {
    fn match_detail(&self, game_id: u64) -> Result<String>;
    fn player_history(&self, player_id: u64, month: &str) -> Result<String>;
}

/// The first call fixes the timeout for the process.
pub fn http_client(timeout: Duration) -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")
    })
}

pub struct HttpSource {
    client: &'static Client,
    api_base: String,
    match_path: String,
    history_path: String,
}

impl HttpSource {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            client: http_client(config.request_timeout())?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            match_path: config.match_path.clone(),
            history_path: config.history_path.clone(),
        })
    }

    pub fn match_url(&self, game_id: u64) -> String {
        let path = self.match_path.replace("{id}", &game_id.to_string());
        format!("{}{}", self.api_base, path)
    }

    pub fn history_url(&self, player_id: u64, month: &str) -> String {
        let path = self
            .history_path
            .replace("{player_id}", &player_id.to_string())
            .replace("{month}", month);
        format!("{}{}", self.api_base, path)
    }

    fn get(&self, url: &str) -> Result<String> {
        tracing::debug!(url, "GET");
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, "Mozilla/5.0")
            .send()
            .context("request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {}: {}", status, truncate(&body, 200)));
        }
        Ok(body)
    }
}

impl StatsSource for HttpSource {
    fn match_detail(&self, game_id: u64) -> Result<String> {
        self.get(&self.match_url(game_id))
    }

    fn player_history(&self, player_id: u64, month: &str) -> Result<String> {
        self.get(&self.history_url(player_id, month))
    }
}

/// Canned documents keyed by match id and (player id, month).
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    matches: HashMap<u64, String>,
    history: HashMap<(u64, String), String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_match(mut self, game_id: u64, body: impl Into<String>) -> Self {
        self.matches.insert(game_id, body.into());
        self
    }

    pub fn with_history(mut self, player_id: u64, month: &str, body: impl Into<String>) -> Self {
        self.history
            .insert((player_id, month.to_string()), body.into());
        self
    }
}

impl StatsSource for MemorySource {
    fn match_detail(&self, game_id: u64) -> Result<String> {
        self.matches
            .get(&game_id)
            .cloned()
            .ok_or_else(|| anyhow!("http 404 Not Found: match {game_id}"))
    }

    fn player_history(&self, player_id: u64, month: &str) -> Result<String> {
        self.history
            .get(&(player_id, month.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("http 404 Not Found: history {player_id}/{month}"))
    }
}

fn truncate(raw: &str, max: usize) -> &str {
    match raw.char_indices().nth(max) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_configured_templates() {
        let config = Config {
            api_base: "https://api.example.test/".to_string(),
            match_path: "/match/{id}".to_string(),
            history_path: "/history/{player_id}/{month}".to_string(),
            ..Config::default()
        };
        let source = HttpSource::from_config(&config).expect("client should build");
        assert_eq!(
            source.match_url(22697838),
            "https://api.example.test/match/22697838"
        );
        assert_eq!(
            source.history_url(225737, "2024-01"),
            "https://api.example.test/history/225737/2024-01"
        );
    }

    #[test]
    fn memory_source_misses_are_errors() {
        let source = MemorySource::new().with_match(1, "{}");
        assert!(source.match_detail(1).is_ok());
        assert!(source.match_detail(2).is_err());
        assert!(source.player_history(1, "2024-01").is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
