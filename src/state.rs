use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use chrono::NaiveDate;

use crate::records::{MatchPlayerRecord, Snapshot};
use crate::views::{self, HistoryMetric, MatchMetric, Pivot, SummaryRow};

const RECENT_GAMES: usize = 5;

#[derive(Debug, Clone)]
pub enum LoadState {
    NoData(String),
    Loaded(Arc<Snapshot>),
}

/// What a screen has to draw. `NoData` means the tables could not be loaded;
/// `EmptySelection` means they loaded but the current filter matches nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewResult<T> {
    NoData(String),
    EmptySelection(String),
    Ready(T),
}

/// Holds the last loaded snapshot and decides when to go back to disk.
#[derive(Debug, Clone)]
pub struct TableCache {
    ttl: Duration,
    last_loaded_at: Option<SystemTime>,
    state: LoadState,
}

impl TableCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last_loaded_at: None,
            state: LoadState::NoData("not loaded yet".to_string()),
        }
    }

    pub fn last_loaded_at(&self) -> Option<SystemTime> {
        self.last_loaded_at
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_stale(&self, now: SystemTime) -> bool {
        match self.last_loaded_at {
            None => true,
            Some(at) => now
                .duration_since(at)
                .map(|age| age >= self.ttl)
                .unwrap_or(false),
        }
    }

    /// Calls `loader` when forced, never loaded, or past the TTL. Returns true
    /// when a load was attempted. The snapshot is swapped whole, never patched.
    pub fn refresh(
        &mut self,
        force_reload: bool,
        now: SystemTime,
        loader: impl FnOnce() -> Result<Snapshot>,
    ) -> bool {
        if !force_reload && !self.is_stale(now) {
            return false;
        }
        self.state = match loader() {
            Ok(snapshot) if snapshot.is_empty() => {
                LoadState::NoData("tables are empty (run gc_ingest)".to_string())
            }
            Ok(snapshot) => LoadState::Loaded(Arc::new(snapshot)),
            Err(err) => LoadState::NoData(format!("could not load tables: {err:#}")),
        };
        self.last_loaded_at = Some(now);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    History,
    Matches,
    Player,
}

impl Screen {
    pub fn next(self) -> Self {
        match self {
            Screen::History => Screen::Matches,
            Screen::Matches => Screen::Player,
            Screen::Player => Screen::History,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Players,
    Games,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryView {
    pub series: Pivot<NaiveDate>,
    pub summary: Vec<SummaryRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchesView {
    pub pivot: Pivot<u64>,
    pub details: Vec<MatchPlayerRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerView {
    pub nick: String,
    pub series: Vec<(u64, f64)>,
    pub rows: Vec<MatchPlayerRecord>,
    pub summary: Vec<SummaryRow>,
}

/// One entry of the selection list shown beside each chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickItem {
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub screen: Screen,
    pub focus: Focus,
    pub cursor: usize,
    pub help_overlay: bool,
    pub cache: TableCache,

    pub history_metric: usize,
    pub history_players: Vec<String>,

    pub match_metric: usize,
    pub match_games: Vec<u64>,
    pub match_players: Vec<String>,

    pub player_nick: Option<String>,
    pub player_games: Vec<u64>,
    pub player_metric: usize,

    pub logs: VecDeque<String>,
}

impl AppState {
    pub fn new(ttl: Duration) -> Self {
        Self {
            screen: Screen::History,
            focus: Focus::Players,
            cursor: 0,
            help_overlay: false,
            cache: TableCache::new(ttl),
            history_metric: 0,
            history_players: Vec::new(),
            match_metric: 0,
            match_games: Vec::new(),
            match_players: Vec::new(),
            player_nick: None,
            player_games: Vec::new(),
            player_metric: 0,
            logs: VecDeque::new(),
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        const MAX_LOGS: usize = 200;
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        match self.cache.state() {
            LoadState::Loaded(snapshot) => Some(Arc::clone(snapshot)),
            LoadState::NoData(_) => None,
        }
    }

    /// Reloads through the cache and reconciles selections with the new data.
    pub fn reload(
        &mut self,
        force_reload: bool,
        now: SystemTime,
        loader: impl FnOnce() -> Result<Snapshot>,
    ) {
        if !self.cache.refresh(force_reload, now, loader) {
            return;
        }
        match self.cache.state().clone() {
            LoadState::Loaded(snapshot) => {
                self.push_log(format!(
                    "[INFO] Loaded {} match rows, {} history rows",
                    snapshot.matches.len(),
                    snapshot.history.len()
                ));
                self.reconcile_selection(&snapshot);
            }
            LoadState::NoData(reason) => self.push_log(format!("[WARN] {reason}")),
        }
    }

    fn reconcile_selection(&mut self, snapshot: &Snapshot) {
        let players = views::history_players(&snapshot.history);
        self.history_players.retain(|p| players.contains(p));
        if self.history_players.is_empty() {
            self.history_players = players;
        }

        let games = views::game_ids(&snapshot.matches);
        self.match_games.retain(|g| games.contains(g));
        if self.match_games.is_empty() {
            self.match_games = games.first().copied().into_iter().collect();
        }
        let in_games = views::match_players(&snapshot.matches, &self.match_games);
        self.match_players.retain(|p| in_games.contains(p));
        if self.match_players.is_empty() {
            self.match_players = in_games;
        }

        let nicks = views::all_nicks(&snapshot.matches);
        let keep_nick = self
            .player_nick
            .as_ref()
            .is_some_and(|nick| nicks.contains(nick));
        if !keep_nick {
            self.set_player(nicks.first().cloned(), snapshot);
        } else {
            let available = self
                .player_nick
                .as_deref()
                .map(|nick| views::player_games(&snapshot.matches, nick))
                .unwrap_or_default();
            self.player_games.retain(|g| available.contains(g));
            if self.player_games.is_empty() {
                self.player_games = views::recent_games(&available, RECENT_GAMES);
            }
        }
        self.cursor = 0;
    }

    fn set_player(&mut self, nick: Option<String>, snapshot: &Snapshot) {
        self.player_games = nick
            .as_deref()
            .map(|n| views::recent_games(&views::player_games(&snapshot.matches, n), RECENT_GAMES))
            .unwrap_or_default();
        self.player_nick = nick;
    }

    pub fn history_metric(&self) -> HistoryMetric {
        HistoryMetric::ALL[self.history_metric % HistoryMetric::ALL.len()]
    }

    pub fn match_metric(&self) -> MatchMetric {
        MatchMetric::ALL[self.match_metric % MatchMetric::ALL.len()]
    }

    pub fn player_metric(&self) -> MatchMetric {
        MatchMetric::ALL[self.player_metric % MatchMetric::ALL.len()]
    }

    pub fn cycle_metric(&mut self, forward: bool) {
        let (slot, len) = match self.screen {
            Screen::History => (&mut self.history_metric, HistoryMetric::ALL.len()),
            Screen::Matches => (&mut self.match_metric, MatchMetric::ALL.len()),
            Screen::Player => (&mut self.player_metric, MatchMetric::ALL.len()),
        };
        *slot = if forward {
            (*slot + 1) % len
        } else {
            (*slot + len - 1) % len
        };
    }

    pub fn next_screen(&mut self) {
        self.screen = self.screen.next();
        self.focus = Focus::Players;
        self.cursor = 0;
    }

    pub fn toggle_focus(&mut self) {
        if self.screen == Screen::History {
            return;
        }
        self.focus = match self.focus {
            Focus::Players => Focus::Games,
            Focus::Games => Focus::Players,
        };
        self.cursor = 0;
    }

    /// Entries of the list the cursor currently walks.
    pub fn pick_list(&self) -> Vec<PickItem> {
        let Some(snapshot) = self.snapshot() else {
            return Vec::new();
        };
        match (self.screen, self.focus) {
            (Screen::History, _) => pick_names(
                views::history_players(&snapshot.history),
                &self.history_players,
            ),
            (Screen::Matches, Focus::Games) => {
                pick_ids(views::game_ids(&snapshot.matches), &self.match_games)
            }
            (Screen::Matches, Focus::Players) => pick_names(
                views::match_players(&snapshot.matches, &self.match_games),
                &self.match_players,
            ),
            (Screen::Player, Focus::Players) => {
                let chosen: Vec<String> = self.player_nick.iter().cloned().collect();
                pick_names(views::all_nicks(&snapshot.matches), &chosen)
            }
            (Screen::Player, Focus::Games) => {
                let games = self
                    .player_nick
                    .as_deref()
                    .map(|nick| views::player_games(&snapshot.matches, nick))
                    .unwrap_or_default();
                pick_ids(games, &self.player_games)
            }
        }
    }

    pub fn move_cursor(&mut self, down: bool) {
        let len = self.pick_list().len();
        if len == 0 {
            self.cursor = 0;
            return;
        }
        self.cursor = if down {
            (self.cursor + 1).min(len - 1)
        } else {
            self.cursor.saturating_sub(1)
        };
    }

    /// Space on the pick list. On the player screen the player list is
    /// single-choice and resets the game selection to the latest games.
    pub fn toggle_at_cursor(&mut self) {
        let Some(snapshot) = self.snapshot() else {
            return;
        };
        let items = self.pick_list();
        let Some(item) = items.get(self.cursor) else {
            return;
        };
        match (self.screen, self.focus) {
            (Screen::History, _) => toggle(&mut self.history_players, item.label.clone()),
            (Screen::Matches, Focus::Players) => {
                toggle(&mut self.match_players, item.label.clone())
            }
            (Screen::Matches, Focus::Games) => {
                if let Ok(id) = item.label.parse::<u64>() {
                    toggle(&mut self.match_games, id);
                    self.match_games.sort_unstable();
                    self.match_players =
                        views::match_players(&snapshot.matches, &self.match_games);
                }
            }
            (Screen::Player, Focus::Players) => {
                self.set_player(Some(item.label.clone()), &snapshot);
            }
            (Screen::Player, Focus::Games) => {
                if let Ok(id) = item.label.parse::<u64>() {
                    toggle(&mut self.player_games, id);
                    self.player_games.sort_unstable();
                }
            }
        }
    }

    /// Select everything in the current list, or nothing if all are selected.
    pub fn toggle_all(&mut self) {
        let items = self.pick_list();
        let all_selected = !items.is_empty() && items.iter().all(|i| i.selected);
        match (self.screen, self.focus) {
            (Screen::History, _) => {
                self.history_players = if all_selected {
                    Vec::new()
                } else {
                    items.into_iter().map(|i| i.label).collect()
                };
            }
            (Screen::Matches, Focus::Players) => {
                self.match_players = if all_selected {
                    Vec::new()
                } else {
                    items.into_iter().map(|i| i.label).collect()
                };
            }
            (Screen::Matches, Focus::Games) => {
                self.match_games = if all_selected {
                    Vec::new()
                } else {
                    items.iter().filter_map(|i| i.label.parse().ok()).collect()
                };
                if let Some(snapshot) = self.snapshot() {
                    self.match_players =
                        views::match_players(&snapshot.matches, &self.match_games);
                }
            }
            (Screen::Player, Focus::Games) => {
                self.player_games = if all_selected {
                    Vec::new()
                } else {
                    items.iter().filter_map(|i| i.label.parse().ok()).collect()
                };
            }
            (Screen::Player, Focus::Players) => {}
        }
    }

    pub fn history_view(&self) -> ViewResult<HistoryView> {
        let snapshot = match self.cache.state() {
            LoadState::NoData(reason) => return ViewResult::NoData(reason.clone()),
            LoadState::Loaded(snapshot) => snapshot,
        };
        if snapshot.history.is_empty() {
            return ViewResult::NoData("player history table is empty".to_string());
        }
        let metric = self.history_metric();
        let series = views::history_series(&snapshot.history, metric, &self.history_players);
        if series.is_empty() {
            return ViewResult::EmptySelection("No players selected".to_string());
        }
        let summary = views::history_summary(&snapshot.history, metric, &self.history_players);
        ViewResult::Ready(HistoryView { series, summary })
    }

    pub fn matches_view(&self) -> ViewResult<MatchesView> {
        let snapshot = match self.cache.state() {
            LoadState::NoData(reason) => return ViewResult::NoData(reason.clone()),
            LoadState::Loaded(snapshot) => snapshot,
        };
        if snapshot.matches.is_empty() {
            return ViewResult::NoData("match table is empty".to_string());
        }
        if self.match_games.is_empty() {
            return ViewResult::EmptySelection("No matches selected".to_string());
        }
        let pivot = views::match_pivot(
            &snapshot.matches,
            self.match_metric(),
            &self.match_games,
            &self.match_players,
        );
        if pivot.is_empty() {
            return ViewResult::EmptySelection("No players selected for these matches".to_string());
        }
        let details = views::match_details(&snapshot.matches, &self.match_games, &self.match_players)
            .into_iter()
            .cloned()
            .collect();
        ViewResult::Ready(MatchesView { pivot, details })
    }

    pub fn player_view(&self) -> ViewResult<PlayerView> {
        let snapshot = match self.cache.state() {
            LoadState::NoData(reason) => return ViewResult::NoData(reason.clone()),
            LoadState::Loaded(snapshot) => snapshot,
        };
        if snapshot.matches.is_empty() {
            return ViewResult::NoData("match table is empty".to_string());
        }
        let Some(nick) = self.player_nick.clone() else {
            return ViewResult::EmptySelection("No player selected".to_string());
        };
        if self.player_games.is_empty() {
            return ViewResult::EmptySelection(format!("No matches selected for {nick}"));
        }
        let series = views::player_match_series(
            &snapshot.matches,
            &nick,
            &self.player_games,
            self.player_metric(),
        );
        if series.is_empty() {
            return ViewResult::EmptySelection(format!("{nick} played none of the selected matches"));
        }
        let rows = views::player_match_rows(&snapshot.matches, &nick, &self.player_games)
            .into_iter()
            .cloned()
            .collect();
        let summary = views::player_match_summary(&snapshot.matches, &nick, &self.player_games);
        ViewResult::Ready(PlayerView {
            nick,
            series,
            rows,
            summary,
        })
    }
}

fn pick_names(all: Vec<String>, chosen: &[String]) -> Vec<PickItem> {
    all.into_iter()
        .map(|label| PickItem {
            selected: chosen.contains(&label),
            label,
        })
        .collect()
}

fn pick_ids(all: Vec<u64>, chosen: &[u64]) -> Vec<PickItem> {
    all.into_iter()
        .map(|id| PickItem {
            label: id.to_string(),
            selected: chosen.contains(&id),
        })
        .collect()
}

fn toggle<T: PartialEq>(list: &mut Vec<T>, value: T) {
    if let Some(pos) = list.iter().position(|v| *v == value) {
        list.remove(pos);
    } else {
        list.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::NaiveDateTime;

    use crate::records::PlayerMonthRecord;

    fn match_row(game_id: u64, nick: &str, team: &str, kills: i64) -> MatchPlayerRecord {
        MatchPlayerRecord {
            game_id,
            nick: nick.to_string(),
            team: team.to_string(),
            player_room: "a".to_string(),
            updated_at: NaiveDateTime::parse_from_str(
                &format!("2024-05-{:02} 20:00:00", game_id),
                "%Y-%m-%d %H:%M:%S",
            )
            .unwrap(),
            map_name: "de_mirage".to_string(),
            nb_kill: kills,
            assist: 2,
            death: 10,
            hs: 5,
            damage: 1500,
            adr: 80.0,
            kdr: 1.2,
            phs: 40.0,
            firstkill: 3,
            pkast: 70.0,
            nb1kill: 5,
            nb2kill: 2,
            nb3kill: 1,
            nb4kill: 0,
            nb5kill: 0,
            defuse: 0,
            bombe: 1,
            hits: 60,
            level: 15,
            rating: 1.1,
            flash_assist: 1,
            multikills: 3,
            damage_share: 20.0,
            kills_share: 20.0,
            hits_share: 20.0,
            damage_per_hit: 25.0,
        }
    }

    fn month_row(month: u32, name: &str, kills: i64) -> PlayerMonthRecord {
        PlayerMonthRecord {
            month: NaiveDate::from_ymd_opt(2024, month, 1).unwrap(),
            player_id: 1,
            name: name.to_string(),
            kdr: 1.0,
            adr: 75.0,
            kills,
            deaths: 100,
            multikills: 10,
            first_kills: 12,
            headshot_rate: 45.0,
            bomb_planted: 4,
            bomb_defused: 2,
            matches: 10,
            wins: 6,
            losses: 4,
            kills_per_map: kills as f64 / 10.0,
            deaths_per_map: 10.0,
            first_kills_per_map: 1.2,
            bomb_planted_per_map: 0.4,
            bomb_defused_per_map: 0.2,
        }
    }

    fn snapshot() -> Snapshot {
        let mut matches = Vec::new();
        for game in 1..=7u64 {
            matches.push(match_row(game, "y4s", "Team A", 20 + game as i64));
            matches.push(match_row(game, "danoco", "Team B", 10));
        }
        matches.push(match_row(3, "noway", "Team A", 8));
        Snapshot {
            matches,
            history: vec![
                month_row(1, "y4s", 300),
                month_row(2, "y4s", 320),
                month_row(1, "danoco", 250),
            ],
        }
    }

    fn loaded() -> AppState {
        let mut state = AppState::new(Duration::from_secs(60));
        state.reload(false, SystemTime::UNIX_EPOCH, || Ok(snapshot()));
        state
    }

    #[test]
    fn cache_reloads_only_when_stale_or_forced() {
        let mut cache = TableCache::new(Duration::from_secs(60));
        let t0 = SystemTime::UNIX_EPOCH;
        assert!(cache.is_stale(t0));
        assert!(cache.refresh(false, t0, || Ok(snapshot())));
        assert!(!cache.refresh(false, t0 + Duration::from_secs(30), || Ok(snapshot())));
        assert!(cache.refresh(true, t0 + Duration::from_secs(30), || Ok(snapshot())));
        assert!(cache.refresh(false, t0 + Duration::from_secs(120), || Ok(snapshot())));
        assert!(matches!(cache.state(), LoadState::Loaded(_)));
    }

    #[test]
    fn failed_or_empty_load_reports_no_data() {
        let mut cache = TableCache::new(Duration::from_secs(60));
        cache.refresh(true, SystemTime::UNIX_EPOCH, || Err(anyhow!("no table store")));
        assert!(matches!(cache.state(), LoadState::NoData(msg) if msg.contains("no table store")));

        cache.refresh(true, SystemTime::UNIX_EPOCH, || Ok(Snapshot::default()));
        assert!(matches!(cache.state(), LoadState::NoData(_)));
    }

    #[test]
    fn views_without_tables_are_no_data() {
        let state = AppState::new(Duration::from_secs(60));
        assert!(matches!(state.history_view(), ViewResult::NoData(_)));
        assert!(matches!(state.matches_view(), ViewResult::NoData(_)));
        assert!(matches!(state.player_view(), ViewResult::NoData(_)));
    }

    #[test]
    fn defaults_after_load() {
        let state = loaded();
        assert_eq!(state.history_players, vec!["danoco", "y4s"]);
        assert_eq!(state.match_games, vec![1]);
        assert_eq!(state.match_players, vec!["danoco", "y4s"]);
        assert_eq!(state.player_nick.as_deref(), Some("danoco"));
        assert_eq!(state.player_games, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn empty_selection_is_distinct_from_no_data() {
        let mut state = loaded();
        state.history_players.clear();
        assert_eq!(
            state.history_view(),
            ViewResult::EmptySelection("No players selected".to_string())
        );

        state.match_games.clear();
        assert!(matches!(state.matches_view(), ViewResult::EmptySelection(_)));

        state.player_games.clear();
        assert!(matches!(state.player_view(), ViewResult::EmptySelection(_)));
    }

    #[test]
    fn history_view_pivots_selected_players() {
        let mut state = loaded();
        state.history_metric = HistoryMetric::ALL
            .iter()
            .position(|m| *m == HistoryMetric::Kills)
            .unwrap();
        let ViewResult::Ready(view) = state.history_view() else {
            panic!("expected a ready view");
        };
        assert_eq!(view.series.columns, vec!["danoco", "y4s"]);
        assert_eq!(view.series.index.len(), 2);
        assert_eq!(view.series.cells[1], vec![None, Some(320.0)]);
        let y4s = view.summary.iter().find(|r| r.label == "y4s").unwrap();
        assert_eq!(y4s.mean, 310.0);
    }

    #[test]
    fn toggling_games_refreshes_player_list() {
        let mut state = loaded();
        state.screen = Screen::Matches;
        state.toggle_focus();
        assert_eq!(state.focus, Focus::Games);
        // games 1..=7, cursor on game 3
        state.move_cursor(true);
        state.move_cursor(true);
        state.toggle_at_cursor();
        assert_eq!(state.match_games, vec![1, 3]);
        assert_eq!(state.match_players, vec!["danoco", "noway", "y4s"]);

        let ViewResult::Ready(view) = state.matches_view() else {
            panic!("expected a ready view");
        };
        assert_eq!(view.pivot.index, vec![1, 3]);
        assert_eq!(view.details.len(), 5);
        assert_eq!(view.details[0].game_id, 1);
        assert_eq!(view.details[0].team, "Team A");
    }

    #[test]
    fn picking_a_player_resets_recent_games() {
        let mut state = loaded();
        state.screen = Screen::Player;
        // nicks: danoco, noway, y4s
        state.move_cursor(true);
        state.toggle_at_cursor();
        assert_eq!(state.player_nick.as_deref(), Some("noway"));
        assert_eq!(state.player_games, vec![3]);

        let ViewResult::Ready(view) = state.player_view() else {
            panic!("expected a ready view");
        };
        assert_eq!(view.series, vec![(3, 8.0)]);
        assert_eq!(view.summary.len(), MatchMetric::PLAYER_SUMMARY.len());
    }

    #[test]
    fn reload_keeps_valid_selection() {
        let mut state = loaded();
        state.history_players = vec!["y4s".to_string(), "gone".to_string()];
        state.reload(true, SystemTime::UNIX_EPOCH, || Ok(snapshot()));
        assert_eq!(state.history_players, vec!["y4s"]);
    }

    #[test]
    fn metric_cycles_wrap() {
        let mut state = loaded();
        state.cycle_metric(false);
        assert_eq!(state.history_metric(), HistoryMetric::BombsDefusedPerMap);
        state.cycle_metric(true);
        assert_eq!(state.history_metric(), HistoryMetric::Kdr);
    }

    #[test]
    fn log_is_bounded() {
        let mut state = AppState::new(Duration::from_secs(1));
        for i in 0..250 {
            state.push_log(format!("[INFO] {i}"));
        }
        assert_eq!(state.logs.len(), 200);
        assert_eq!(state.logs.front().map(String::as_str), Some("[INFO] 50"));
    }
}
