use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::widgets::{
    Axis, Bar, BarChart, BarGroup, Block, Borders, Cell, Chart, Clear, Dataset, GraphType,
    Paragraph, Row, Table,
};

use gc_dashboard::config::Config;
use gc_dashboard::records::{MatchPlayerRecord, Snapshot};
use gc_dashboard::state::{AppState, Focus, PickItem, Screen, ViewResult};
use gc_dashboard::store;
use gc_dashboard::views::{Pivot, SummaryRow};

const PALETTE: [Color; 8] = [
    Color::Cyan,
    Color::Yellow,
    Color::Green,
    Color::Magenta,
    Color::Red,
    Color::Blue,
    Color::LightCyan,
    Color::LightYellow,
];

struct App {
    state: AppState,
    should_quit: bool,
    store_path: Option<PathBuf>,
    force_reload: bool,
}

impl App {
    fn new(config: &Config) -> Self {
        Self {
            state: AppState::new(config.cache_ttl()),
            should_quit: false,
            store_path: config.store_path(),
            force_reload: false,
        }
    }

    fn load(&self) -> Result<Snapshot> {
        let path = self
            .store_path
            .as_deref()
            .ok_or_else(|| anyhow!("no data directory (set GC_DATA_DIR)"))?;
        store::load_snapshot_file(path)
    }

    fn maybe_reload(&mut self) {
        let force = std::mem::take(&mut self.force_reload);
        let snapshot = self.load();
        self.state.reload(force, SystemTime::now(), || snapshot);
    }

    fn on_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('1') => self.set_screen(Screen::History),
            KeyCode::Char('2') => self.set_screen(Screen::Matches),
            KeyCode::Char('3') => self.set_screen(Screen::Player),
            KeyCode::Tab => self.state.next_screen(),
            KeyCode::Char('m') => self.state.cycle_metric(true),
            KeyCode::Char('M') => self.state.cycle_metric(false),
            KeyCode::Char('j') | KeyCode::Down => self.state.move_cursor(true),
            KeyCode::Char('k') | KeyCode::Up => self.state.move_cursor(false),
            KeyCode::Char(' ') => self.state.toggle_at_cursor(),
            KeyCode::Char('a') => self.state.toggle_all(),
            KeyCode::Char('f') => self.state.toggle_focus(),
            KeyCode::Char('r') => {
                self.force_reload = true;
                self.state.push_log("[INFO] Reload requested");
            }
            KeyCode::Char('?') => self.state.help_overlay = !self.state.help_overlay,
            KeyCode::Esc => self.state.help_overlay = false,
            _ => {}
        }
    }

    fn set_screen(&mut self, screen: Screen) {
        if self.state.screen != screen {
            self.state.screen = screen;
            self.state.focus = Focus::Players;
            self.state.cursor = 0;
        }
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let config = Config::load(None).context("failed to load configuration")?;
    let mut app = App::new(&config);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        if app.force_reload || app.state.cache.is_stale(SystemTime::now()) {
            app.maybe_reload();
        }

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.on_key(key);
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(1),
            Constraint::Length(4),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(&app.state))
        .style(Style::default().add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(24), Constraint::Min(1)])
        .split(chunks[1]);
    render_picker(frame, body[0], &app.state);

    match app.state.screen {
        Screen::History => render_history(frame, body[1], &app.state),
        Screen::Matches => render_matches(frame, body[1], &app.state),
        Screen::Player => render_player(frame, body[1], &app.state),
    }

    let console = Paragraph::new(console_text(&app.state))
        .block(Block::default().title("Console").borders(Borders::TOP));
    frame.render_widget(console, chunks[2]);

    let footer = Paragraph::new(footer_text(&app.state));
    frame.render_widget(footer, chunks[3]);

    if app.state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(state: &AppState) -> String {
    let (title, metric) = match state.screen {
        Screen::History => ("PLAYER HISTORY", state.history_metric().label()),
        Screen::Matches => ("MATCHES", state.match_metric().label()),
        Screen::Player => ("PLAYER MATCHES", state.player_metric().label()),
    };
    let loaded = match state.cache.last_loaded_at() {
        Some(at) => {
            let at: chrono::DateTime<chrono::Local> = at.into();
            format!("loaded {}", at.format("%H:%M:%S"))
        }
        None => "not loaded".to_string(),
    };
    format!("GC DASHBOARD | {title} | Metric: {metric} | {loaded}")
}

fn footer_text(state: &AppState) -> String {
    match state.screen {
        Screen::History => {
            "1/2/3 Screen | m/M Metric | j/k Move | Space Toggle | a All | r Reload | ? Help | q Quit"
                .to_string()
        }
        Screen::Matches | Screen::Player => {
            "1/2/3 Screen | m/M Metric | f Players/Games | j/k Move | Space Toggle | a All | r Reload | ? Help | q Quit"
                .to_string()
        }
    }
}

fn picker_title(state: &AppState) -> &'static str {
    match (state.screen, state.focus) {
        (Screen::History, _) => "Players",
        (Screen::Matches, Focus::Players) => "Players",
        (Screen::Matches, Focus::Games) => "Matches",
        (Screen::Player, Focus::Players) => "Player",
        (Screen::Player, Focus::Games) => "Matches",
    }
}

fn render_picker(frame: &mut Frame, area: Rect, state: &AppState) {
    let items = state.pick_list();
    let block = Block::default()
        .title(picker_title(state))
        .borders(Borders::ALL);
    if items.is_empty() {
        frame.render_widget(Paragraph::new("-").block(block), area);
        return;
    }

    let visible = area.height.saturating_sub(2) as usize;
    let (start, end) = visible_range(state.cursor, items.len(), visible);
    let lines: Vec<Line> = items[start..end]
        .iter()
        .enumerate()
        .map(|(offset, item)| picker_line(item, start + offset == state.cursor))
        .collect();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn picker_line(item: &PickItem, under_cursor: bool) -> Line<'static> {
    let mark = if item.selected { "[x]" } else { "[ ]" };
    let mut style = Style::default();
    if under_cursor {
        style = style.bg(Color::DarkGray);
    }
    if item.selected {
        style = style.fg(Color::Green);
    }
    Line::styled(format!("{mark} {}", item.label), style)
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn render_message(frame: &mut Frame, area: Rect, title: &str, text: &str, color: Color) {
    let paragraph = Paragraph::new(text.to_string())
        .style(Style::default().fg(color))
        .block(Block::default().title(title.to_string()).borders(Borders::ALL));
    frame.render_widget(paragraph, area);
}

/// Returns true when the view was a placeholder and has been drawn.
fn render_placeholder<T>(frame: &mut Frame, area: Rect, view: &ViewResult<T>) -> bool {
    match view {
        ViewResult::NoData(reason) => {
            render_message(frame, area, "No data", reason, Color::Red);
            true
        }
        ViewResult::EmptySelection(reason) => {
            render_message(frame, area, "Nothing selected", reason, Color::Yellow);
            true
        }
        ViewResult::Ready(_) => false,
    }
}

fn render_history(frame: &mut Frame, area: Rect, state: &AppState) {
    let view = state.history_view();
    if render_placeholder(frame, area, &view) {
        return;
    }
    let ViewResult::Ready(view) = view else {
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(summary_height(&view.summary))])
        .split(area);

    let series: Vec<Vec<(f64, f64)>> = (0..view.series.columns.len())
        .map(|col| {
            let points = view.series.column_series(col);
            points
                .into_iter()
                .filter_map(|(month, value)| {
                    view.series
                        .index
                        .iter()
                        .position(|m| *m == month)
                        .map(|x| (x as f64, value))
                })
                .collect()
        })
        .collect();

    let datasets: Vec<Dataset> = view
        .series
        .columns
        .iter()
        .zip(&series)
        .enumerate()
        .map(|(idx, (name, points))| {
            Dataset::default()
                .name(name.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(PALETTE[idx % PALETTE.len()]))
                .data(points)
        })
        .collect();

    let months = &view.series.index;
    let x_labels: Vec<Span> = match (months.first(), months.last()) {
        (Some(first), Some(last)) => vec![
            Span::raw(first.format("%Y-%m").to_string()),
            Span::raw(last.format("%Y-%m").to_string()),
        ],
        _ => Vec::new(),
    };
    let y_max = nice_max(view.series.max_value());
    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(format!("{} per month", state.history_metric().label()))
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .bounds([0.0, months.len().saturating_sub(1).max(1) as f64])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .bounds([0.0, y_max])
                .labels(vec![Span::raw("0"), Span::raw(format!("{y_max:.1}"))]),
        );
    frame.render_widget(chart, rows[0]);

    render_summary(frame, rows[1], "Summary", &view.summary);
}

fn render_matches(frame: &mut Frame, area: Rect, state: &AppState) {
    let view = state.matches_view();
    if render_placeholder(frame, area, &view) {
        return;
    }
    let ViewResult::Ready(view) = view else {
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let chart = pivot_bar_chart(
        &view.pivot,
        format!("{} by match", state.match_metric().label()),
    );
    frame.render_widget(chart, rows[0]);

    let header = Row::new(DETAIL_HEADER.into_iter().map(Cell::from))
        .style(Style::default().add_modifier(Modifier::BOLD));
    let body: Vec<Row> = view
        .details
        .iter()
        .map(|r| Row::new(detail_cells(r).into_iter().map(Cell::from)))
        .collect();
    let table = Table::new(
        body,
        [
            Constraint::Length(10),
            Constraint::Length(7),
            Constraint::Min(10),
            Constraint::Length(12),
            Constraint::Length(4),
            Constraint::Length(4),
            Constraint::Length(4),
            Constraint::Length(7),
            Constraint::Length(6),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Length(8),
            Constraint::Length(7),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(Block::default().title("Details").borders(Borders::ALL));
    frame.render_widget(table, rows[1]);
}

fn render_player(frame: &mut Frame, area: Rect, state: &AppState) {
    let view = state.player_view();
    if render_placeholder(frame, area, &view) {
        return;
    }
    let ViewResult::Ready(view) = view else {
        return;
    };

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(columns[0]);

    let metric = state.player_metric();
    let max = view.series.iter().map(|(_, v)| *v).fold(0.0, f64::max);
    let bars: Vec<Bar> = view
        .series
        .iter()
        .map(|(game, value)| {
            Bar::default()
                .label(Line::from(game.to_string()))
                .value(scaled(*value))
                .text_value(format!("{value:.2}"))
                .style(Style::default().fg(Color::Cyan))
        })
        .collect();
    let chart = BarChart::default()
        .block(
            Block::default()
                .title(format!("{} | {}", view.nick, metric.label()))
                .borders(Borders::ALL),
        )
        .data(BarGroup::default().bars(&bars))
        .bar_width(10)
        .bar_gap(2)
        .max(scaled(nice_max(max)));
    frame.render_widget(chart, left[0]);

    let header = Row::new(
        ["Match", "Played", "Map", "K", "D", "ADR", "KDR", "KAST"]
            .into_iter()
            .map(Cell::from),
    )
    .style(Style::default().add_modifier(Modifier::BOLD));
    let body: Vec<Row> = view
        .rows
        .iter()
        .map(|r| {
            Row::new(vec![
                Cell::from(r.game_id.to_string()),
                Cell::from(r.updated_at.format("%Y-%m-%d %H:%M").to_string()),
                Cell::from(r.map_name.clone()),
                Cell::from(r.nb_kill.to_string()),
                Cell::from(r.death.to_string()),
                Cell::from(format!("{:.1}", r.adr)),
                Cell::from(format!("{:.2}", r.kdr)),
                Cell::from(format!("{:.1}", r.pkast)),
            ])
        })
        .collect();
    let table = Table::new(
        body,
        [
            Constraint::Length(10),
            Constraint::Length(17),
            Constraint::Min(10),
            Constraint::Length(4),
            Constraint::Length(4),
            Constraint::Length(7),
            Constraint::Length(6),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(Block::default().title("Matches").borders(Borders::ALL));
    frame.render_widget(table, left[1]);

    render_summary(frame, columns[1], "Summary", &view.summary);
}

const DETAIL_HEADER: [&str; 14] = [
    "Match", "Team", "Nick", "Map", "K", "D", "A", "ADR", "KDR", "Rating", "Dmg %", "Kills %",
    "Hits %", "Dmg/Hit",
];

fn detail_cells(r: &MatchPlayerRecord) -> Vec<String> {
    vec![
        r.game_id.to_string(),
        r.team.clone(),
        r.nick.clone(),
        r.map_name.clone(),
        r.nb_kill.to_string(),
        r.death.to_string(),
        r.assist.to_string(),
        format!("{:.1}", r.adr),
        format!("{:.2}", r.kdr),
        format!("{:.2}", r.rating),
        format!("{:.2}", r.damage_share),
        format!("{:.2}", r.kills_share),
        format!("{:.2}", r.hits_share),
        format!("{:.2}", r.damage_per_hit),
    ]
}

/// One bar group per pivot row, one bar per player column.
fn pivot_bar_chart(pivot: &Pivot<u64>, title: String) -> BarChart<'static> {
    let max = pivot.max_value();
    let mut chart = BarChart::default()
        .block(Block::default().title(title).borders(Borders::ALL))
        .bar_width(4)
        .bar_gap(1)
        .group_gap(3)
        .max(scaled(nice_max(max)));
    for (key, row) in pivot.index.iter().zip(&pivot.cells) {
        let bars: Vec<Bar> = row
            .iter()
            .enumerate()
            .filter_map(|(col, cell)| cell.map(|value| (col, value)))
            .map(|(col, value)| {
                Bar::default()
                    .label(Line::from(short_label(&pivot.columns[col])))
                    .value(scaled(value))
                    .text_value(format!("{value:.1}"))
                    .style(Style::default().fg(PALETTE[col % PALETTE.len()]))
            })
            .collect();
        chart = chart.data(
            BarGroup::default()
                .label(Line::from(key.to_string()))
                .bars(&bars),
        );
    }
    chart
}

fn render_summary(frame: &mut Frame, area: Rect, title: &str, summary: &[SummaryRow]) {
    let header = Row::new(["", "Mean", "Min", "Max", "N"].into_iter().map(Cell::from))
        .style(Style::default().add_modifier(Modifier::BOLD));
    let body: Vec<Row> = summary
        .iter()
        .map(|row| {
            Row::new(vec![
                Cell::from(row.label.clone()),
                Cell::from(format!("{:.2}", row.mean)),
                Cell::from(format!("{:.2}", row.min)),
                Cell::from(format!("{:.2}", row.max)),
                Cell::from(row.count.to_string()),
            ])
        })
        .collect();
    let table = Table::new(
        body,
        [
            Constraint::Min(14),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(4),
        ],
    )
    .header(header)
    .block(Block::default().title(title.to_string()).borders(Borders::ALL));
    frame.render_widget(table, area);
}

fn summary_height(summary: &[SummaryRow]) -> u16 {
    (summary.len() as u16 + 3).min(12)
}

// BarChart only takes integers.
fn scaled(value: f64) -> u64 {
    (value.max(0.0) * 100.0).round() as u64
}

fn nice_max(value: f64) -> f64 {
    if value <= 0.0 { 1.0 } else { value * 1.1 }
}

fn short_label(name: &str) -> String {
    name.chars().take(4).collect()
}

fn console_text(state: &AppState) -> String {
    if state.logs.is_empty() {
        return "No messages yet".to_string();
    }
    state
        .logs
        .iter()
        .rev()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "GC Dashboard - Help",
        "",
        "Screens:",
        "  1            Player history by month",
        "  2            Match comparison",
        "  3            Player match history",
        "  Tab          Next screen",
        "",
        "Selection:",
        "  j/k or ↑/↓   Move",
        "  Space        Toggle item",
        "  a            Select all / none",
        "  f            Switch players / matches list",
        "  m / M        Next / previous metric",
        "",
        "  r            Reload tables from disk",
        "  ?            Toggle help",
        "  q            Quit",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_row_carries_every_share_column() {
        let raw = include_str!("../tests/fixtures/match_detail.json");
        let rows = gc_dashboard::match_fetch::parse_match_json(22697838, raw).expect("fixture");
        let typed = gc_dashboard::normalize::coerce_matches(&rows).expect("coerce");
        let derived = gc_dashboard::metrics::derive_match_shares(&typed);

        let cells = detail_cells(&derived[0]);
        assert_eq!(cells.len(), DETAIL_HEADER.len());
        let cell = |name: &str| {
            let idx = DETAIL_HEADER.iter().position(|h| *h == name).expect("column");
            cells[idx].clone()
        };
        assert_eq!(cell("Nick"), "y4s");
        assert_eq!(cell("Kills %"), "16.67");
        assert_eq!(cell("Dmg/Hit"), "25.00");
        assert_eq!(cell("Hits %"), format!("{:.2}", derived[0].hits_share));
    }

    #[test]
    fn visible_range_follows_cursor() {
        assert_eq!(visible_range(0, 3, 10), (0, 3));
        assert_eq!(visible_range(9, 20, 6), (6, 12));
        assert_eq!(visible_range(19, 20, 6), (14, 20));
    }
}
