use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::history_fetch::StatSlotMap;
use crate::normalize::parse_month;

const APP_DIR: &str = "gc_dashboard";
const DEFAULT_CONFIG_FILE: &str = "gc_dashboard.json";
const DEFAULT_API_BASE: &str = "https://gamersclub.com.br";
const DEFAULT_MATCH_PATH: &str = "/lobby/match/{id}/1";
const DEFAULT_HISTORY_PATH: &str = "/api/box/historyFilterDate/{player_id}/{month}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    #[serde(alias = "ID")]
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub match_path: String,
    pub history_path: String,
    pub match_ids: Vec<u64>,
    pub roster: Vec<RosterEntry>,
    pub months: Vec<String>,
    pub stat_slots: StatSlotMap,
    pub request_timeout_secs: u64,
    pub fetch_parallelism: usize,
    pub data_dir: Option<PathBuf>,
    pub cache_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            match_path: DEFAULT_MATCH_PATH.to_string(),
            history_path: DEFAULT_HISTORY_PATH.to_string(),
            match_ids: vec![
                22697838, 22696865, 22696257, 22690039, 22689221, 22681248, 22649868, 22649297,
                22648675,
            ],
            roster: vec![
                roster("y4s", 225737),
                roster("danoco", 133415),
                roster("Ratinho", 2122400),
                roster("noway", 591719),
                roster("Iron", 1188388),
            ],
            months: month_range(2024, 1, 14),
            stat_slots: StatSlotMap::default(),
            request_timeout_secs: 10,
            fetch_parallelism: 1,
            data_dir: None,
            cache_ttl_secs: 3600,
        }
    }
}

impl Config {
    /// Reads the config file (explicit path, `GC_CONFIG`, or `./gc_dashboard.json`
    /// when present), then applies environment overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| opt_env("GC_CONFIG").map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(&fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw.trim()).context("invalid config json")
    }

    fn apply_env(&mut self) {
        if let Some(base) = opt_env("GC_API_BASE") {
            self.api_base = base;
        }
        if let Some(dir) = opt_env("GC_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(n) = opt_env("GC_FETCH_PARALLELISM").and_then(|v| v.parse::<usize>().ok()) {
            self.fetch_parallelism = n;
        }
        if let Some(secs) =
            opt_env("GC_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok())
        {
            self.request_timeout_secs = secs;
        }
        if let Some(secs) = opt_env("GC_CACHE_TTL_SECS").and_then(|v| v.parse::<u64>().ok()) {
            self.cache_ttl_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base.trim().is_empty() {
            return Err(anyhow!("api_base is empty"));
        }
        if !self.match_path.contains("{id}") {
            return Err(anyhow!("match_path must contain {{id}}"));
        }
        if !self.history_path.contains("{player_id}") || !self.history_path.contains("{month}") {
            return Err(anyhow!("history_path must contain {{player_id}} and {{month}}"));
        }
        for month in &self.months {
            parse_month(month).with_context(|| format!("bad month in config: {month:?}"))?;
        }
        for (idx, id) in self.match_ids.iter().enumerate() {
            if self.match_ids[..idx].contains(id) {
                return Err(anyhow!("match id {id} listed twice"));
            }
        }
        for (idx, month) in self.months.iter().enumerate() {
            if self.months[..idx].contains(month) {
                return Err(anyhow!("month {month} listed twice"));
            }
        }
        for (idx, entry) in self.roster.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(anyhow!("roster entry {} has no name", entry.id));
            }
            if self.roster[..idx].iter().any(|other| other.id == entry.id) {
                return Err(anyhow!("player id {} listed twice in roster", entry.id));
            }
        }
        self.stat_slots.validate()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.clamp(1, 300))
    }

    pub fn parallelism(&self) -> usize {
        self.fetch_parallelism.clamp(1, 32)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.max(1))
    }

    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone().or_else(app_data_dir)
    }

    pub fn store_path(&self) -> Option<PathBuf> {
        self.resolved_data_dir().map(|dir| dir.join("tables.sqlite"))
    }

    pub fn export_path(&self) -> Option<PathBuf> {
        self.resolved_data_dir().map(|dir| dir.join("tables.xlsx"))
    }
}

pub fn app_data_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_DATA_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(APP_DIR));
        }
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".local").join("share").join(APP_DIR))
}

/// `count` consecutive `YYYY-MM` strings starting at `year`-`month`.
pub fn month_range(year: i32, month: u32, count: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(count);
    let (mut y, mut m) = (year, month.clamp(1, 12));
    for _ in 0..count {
        out.push(format!("{y:04}-{m:02}"));
        if m == 12 {
            y += 1;
            m = 1;
        } else {
            m += 1;
        }
    }
    out
}

fn roster(name: &str, id: u64) -> RosterEntry {
    RosterEntry {
        name: name.to_string(),
        id,
    }
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .and_then(|val| if val.trim().is_empty() { None } else { Some(val) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_range_rolls_over_year() {
        let months = month_range(2024, 11, 4);
        assert_eq!(months, vec!["2024-11", "2024-12", "2025-01", "2025-02"]);
    }

    #[test]
    fn defaults_cover_team_roster_and_months() {
        let config = Config::default();
        assert_eq!(config.roster.len(), 5);
        assert_eq!(config.months.len(), 14);
        assert_eq!(config.months.first().map(String::as_str), Some("2024-01"));
        assert_eq!(config.months.last().map(String::as_str), Some("2025-02"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = Config::from_json(
            r#"{"roster":[{"name":"y4s","ID":225737}],"months":["2024-01","2024-02"]}"#,
        )
        .expect("config should parse");
        assert_eq!(config.roster.len(), 1);
        assert_eq!(config.roster[0].id, 225737);
        assert_eq!(config.months.len(), 2);
        assert_eq!(config.match_ids.len(), 9);
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn rejects_repeated_match_id() {
        let config = Config {
            match_ids: vec![22697838, 22696865, 22697838],
            ..Config::default()
        };
        let err = config.validate().expect_err("repeated id should fail");
        assert!(err.to_string().contains("22697838"));
    }

    #[test]
    fn cache_ttl_has_a_floor() {
        let config = Config {
            cache_ttl_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.cache_ttl(), Duration::from_secs(1));
        assert_eq!(Config::default().cache_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_bad_month() {
        let config = Config {
            months: vec!["2024-13".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
