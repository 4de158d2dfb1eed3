//! fjord-telemetry: terminal dashboard for a running fjord renderer.
//!
//! Listens on UDP `127.0.0.1:9100` for the JSON snapshots the renderer's
//! `diagnostics` feature sends (10 per second) and shows frame pacing, draw
//! counters, a per-pass breakdown and the captured log.
//!
//! Start a fjord app, then run `cargo run -p fjord-telemetry`.

use std::collections::VecDeque;
use std::io;
use std::net::UdpSocket;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Row, Sparkline, Table};
use serde::Deserialize;

const LISTEN_ADDR: &str = "127.0.0.1:9100";

// ── Wire types (must match fjord's diag snapshot) ───────────────────────

#[derive(Deserialize, Default, Clone)]
struct DiagSnapshot {
    fps: f32,
    delta_ms: f32,
    frame_count: u64,
    elapsed_secs: f32,
    #[serde(default)]
    render: RenderStats,
    #[serde(default)]
    passes: Vec<PassInfo>,
    #[serde(default)]
    logs: Vec<LogEntryInfo>,
}

#[derive(Deserialize, Default, Clone)]
struct RenderStats {
    draw_calls: u32,
    instanced_draws: u32,
    vertices: u32,
    mesh_binds: u32,
    texture_binds: u32,
    program_binds: u32,
    passes: usize,
    particles: usize,
    batches: usize,
    texts: usize,
}

#[derive(Deserialize, Default, Clone)]
struct PassInfo {
    name: String,
    draw_calls: u32,
    instances: u32,
    vertices: u32,
    texture_binds: u32,
}

#[derive(Deserialize, Clone)]
struct LogEntryInfo {
    level: String,
    #[allow(dead_code)]
    target: String,
    message: String,
    timestamp_secs: f32,
}

// ── Tabs ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Tab {
    Overview,
    Passes,
    Logs,
}

impl Tab {
    const ALL: [Tab; 3] = [Tab::Overview, Tab::Passes, Tab::Logs];

    fn next(self) -> Self {
        match self {
            Tab::Overview => Tab::Passes,
            Tab::Passes => Tab::Logs,
            Tab::Logs => Tab::Overview,
        }
    }

    fn prev(self) -> Self {
        match self {
            Tab::Overview => Tab::Logs,
            Tab::Passes => Tab::Overview,
            Tab::Logs => Tab::Passes,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::Passes => "Passes",
            Tab::Logs => "Logs",
        }
    }
}

// ── Log level filter ────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LogFilter {
    All,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogFilter {
    fn next(self) -> Self {
        match self {
            LogFilter::All => LogFilter::Debug,
            LogFilter::Debug => LogFilter::Info,
            LogFilter::Info => LogFilter::Warn,
            LogFilter::Warn => LogFilter::Error,
            LogFilter::Error => LogFilter::All,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LogFilter::All => "ALL",
            LogFilter::Debug => "DEBUG+",
            LogFilter::Info => "INFO+",
            LogFilter::Warn => "WARN+",
            LogFilter::Error => "ERROR",
        }
    }

    fn passes(self, level: &str) -> bool {
        match self {
            LogFilter::All => true,
            LogFilter::Debug => level != "TRACE",
            LogFilter::Info => matches!(level, "INFO" | "WARN" | "ERROR"),
            LogFilter::Warn => matches!(level, "WARN" | "ERROR"),
            LogFilter::Error => level == "ERROR",
        }
    }
}

// ── App state ────────────────────────────────────────────────────────────

const HISTORY_CAP: usize = 1200;
const LOG_CAP: usize = 2000;

struct App {
    latest: DiagSnapshot,
    fps_history: VecDeque<u64>,
    /// Frame time in microseconds.
    delta_history: VecDeque<u64>,
    draw_history: VecDeque<u64>,
    active_tab: Tab,
    paused: bool,
    connected: bool,

    log_entries: VecDeque<LogEntryInfo>,
    log_filter: LogFilter,
    log_auto_scroll: bool,
    log_scroll_offset: usize,
}

fn push_capped(history: &mut VecDeque<u64>, value: u64) {
    if history.len() >= HISTORY_CAP {
        history.pop_front();
    }
    history.push_back(value);
}

impl App {
    fn new() -> Self {
        Self {
            latest: DiagSnapshot::default(),
            fps_history: VecDeque::with_capacity(HISTORY_CAP),
            delta_history: VecDeque::with_capacity(HISTORY_CAP),
            draw_history: VecDeque::with_capacity(HISTORY_CAP),
            active_tab: Tab::Overview,
            paused: false,
            connected: false,
            log_entries: VecDeque::new(),
            log_filter: LogFilter::Info,
            log_auto_scroll: true,
            log_scroll_offset: 0,
        }
    }

    fn push_snapshot(&mut self, mut snap: DiagSnapshot) {
        if self.paused {
            return;
        }
        push_capped(&mut self.fps_history, snap.fps.round().max(0.0) as u64);
        push_capped(&mut self.delta_history, (snap.delta_ms * 1000.0).round().max(0.0) as u64);
        push_capped(&mut self.draw_history, snap.render.draw_calls as u64);

        for log in snap.logs.drain(..) {
            if self.log_entries.len() >= LOG_CAP {
                self.log_entries.pop_front();
            }
            self.log_entries.push_back(log);
        }

        self.latest = snap;
        self.connected = true;
    }

    fn filtered_logs(&self) -> Vec<&LogEntryInfo> {
        self.log_entries
            .iter()
            .filter(|e| self.log_filter.passes(&e.level))
            .collect()
    }

    /// Counts per level: trace, debug, info, warn, error.
    fn log_counts(&self) -> (usize, usize, usize, usize, usize) {
        let mut counts = (0, 0, 0, 0, 0);
        for e in &self.log_entries {
            match e.level.as_str() {
                "TRACE" => counts.0 += 1,
                "DEBUG" => counts.1 += 1,
                "INFO" => counts.2 += 1,
                "WARN" => counts.3 += 1,
                "ERROR" => counts.4 += 1,
                _ => {}
            }
        }
        counts
    }
}

// ── Main ─────────────────────────────────────────────────────────────────

fn main() -> io::Result<()> {
    let recv_socket = UdpSocket::bind(LISTEN_ADDR).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("cannot bind {LISTEN_ADDR} ({e}); is another fjord-telemetry running?"),
        )
    })?;
    recv_socket.set_nonblocking(true)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();
    let mut buf = [0u8; 65536];

    loop {
        while let Ok(n) = recv_socket.recv(&mut buf) {
            if let Ok(snap) = serde_json::from_slice::<DiagSnapshot>(&buf[..n]) {
                app.push_snapshot(snap);
            }
        }

        terminal.draw(|f| ui(f, &app))?;

        if event::poll(Duration::from_millis(50))?
            && let Event::Key(key) = event::read()?
            && handle_key(&mut app, key)
        {
            break;
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

// ── Key handling ─────────────────────────────────────────────────────────

/// Returns `true` if the app should quit.
fn handle_key(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
        KeyCode::Char('p') => app.paused = !app.paused,

        KeyCode::Char('1') => app.active_tab = Tab::Overview,
        KeyCode::Char('2') => app.active_tab = Tab::Passes,
        KeyCode::Char('3') => app.active_tab = Tab::Logs,
        KeyCode::Tab => app.active_tab = app.active_tab.next(),
        KeyCode::BackTab => app.active_tab = app.active_tab.prev(),

        KeyCode::Char('l') if app.active_tab == Tab::Logs => {
            app.log_filter = app.log_filter.next();
        }
        KeyCode::Char('g') if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = !app.log_auto_scroll;
        }
        KeyCode::Up if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = false;
            app.log_scroll_offset = app.log_scroll_offset.saturating_sub(1);
        }
        KeyCode::Down if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = false;
            app.log_scroll_offset += 1;
        }

        _ => {}
    }
    false
}

// ── UI rendering ─────────────────────────────────────────────────────────

fn ui(f: &mut ratatui::Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(1), // tab bar
            Constraint::Min(6),    // tab content
            Constraint::Length(3), // render counters
            Constraint::Length(1), // help bar
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    draw_tab_bar(f, app, chunks[1]);
    match app.active_tab {
        Tab::Overview => draw_sparklines(f, app, chunks[2]),
        Tab::Passes => draw_passes_tab(f, app, chunks[2]),
        Tab::Logs => draw_logs_tab(f, app, chunks[2]),
    }
    draw_render_panel(f, app, chunks[3]);
    draw_help_bar(f, app, chunks[4]);
}

fn draw_header(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let s = &app.latest;
    let (status, status_color) = if app.paused {
        (" PAUSED ", Color::Yellow)
    } else if app.connected {
        (" LIVE ", Color::Green)
    } else {
        (" WAITING ", Color::DarkGray)
    };

    let text = Line::from(vec![
        Span::styled(format!(" {status} "), Style::default().bg(status_color).fg(Color::Black)),
        Span::raw("  "),
        Span::styled("FPS: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{:.1}", s.fps),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled("Frame: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{}", s.frame_count), Style::default().fg(Color::White)),
        Span::raw("  |  "),
        Span::styled("\u{0394}: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{:.2}ms", s.delta_ms), Style::default().fg(Color::White)),
        Span::raw("  |  "),
        Span::styled("Up: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format_uptime(s.elapsed_secs), Style::default().fg(Color::White)),
    ]);

    let block = Block::default()
        .title(" fjord-telemetry ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_tab_bar(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::raw(" ")];
    for (i, tab) in Tab::ALL.iter().enumerate() {
        let (num_style, label_style) = if *tab == app.active_tab {
            (
                Style::default().bg(Color::Cyan).fg(Color::Black).add_modifier(Modifier::BOLD),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )
        } else {
            (Style::default().fg(Color::DarkGray), Style::default().fg(Color::DarkGray))
        };
        spans.push(Span::styled(format!(" {} ", i + 1), num_style));
        spans.push(Span::styled(format!("{} ", tab.label()), label_style));
        spans.push(Span::raw("  "));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ── Overview Tab ─────────────────────────────────────────────────────────

fn draw_sparklines(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[0]);

    let fps: Vec<u64> = app.fps_history.iter().copied().collect();
    let (lo, avg, hi) = stats(&fps);
    draw_history(
        f,
        top[0],
        " FPS History ",
        &fps,
        Color::Green,
        format!("min: {lo:.0}  avg: {avg:.0}  max: {hi:.0}"),
    );

    let delta: Vec<u64> = app.delta_history.iter().copied().collect();
    let (lo, avg, hi) = stats(&delta);
    draw_history(
        f,
        top[1],
        " Frame Time ",
        &delta,
        Color::Yellow,
        format!(
            "min: {:.2}ms  avg: {:.2}ms  max: {:.2}ms",
            lo / 1000.0,
            avg / 1000.0,
            hi / 1000.0
        ),
    );

    let draws: Vec<u64> = app.draw_history.iter().copied().collect();
    let (lo, avg, hi) = stats(&draws);
    draw_history(
        f,
        chunks[1],
        " Draw Calls ",
        &draws,
        Color::Magenta,
        format!("min: {lo:.0}  avg: {avg:.1}  max: {hi:.0}"),
    );
}

fn draw_history(f: &mut ratatui::Frame, area: Rect, title: &str, data: &[u64], colour: Color, summary: String) {
    let block = Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    f.render_widget(block, area);
    if inner.height < 2 {
        return;
    }
    let spark_area = Rect {
        height: inner.height - 1,
        ..inner
    };
    let stats_area = Rect {
        y: inner.y + inner.height - 1,
        height: 1,
        ..inner
    };
    // Newest samples on the right.
    let visible = data.len().saturating_sub(spark_area.width as usize);
    f.render_widget(
        Sparkline::default().data(&data[visible..]).style(Style::default().fg(colour)),
        spark_area,
    );
    f.render_widget(
        Paragraph::new(Span::styled(summary, Style::default().fg(Color::DarkGray))),
        stats_area,
    );
}

// ── Passes Tab ───────────────────────────────────────────────────────────

fn draw_passes_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(format!(" Passes ({}) ", app.latest.passes.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    if app.latest.passes.is_empty() {
        let text = Span::styled("  No pass data yet", Style::default().fg(Color::DarkGray));
        f.render_widget(Paragraph::new(text).block(block), area);
        return;
    }

    let total_draws: u32 = app.latest.passes.iter().map(|p| p.draw_calls).sum();
    let rows: Vec<Row> = app
        .latest
        .passes
        .iter()
        .map(|p| {
            Row::new(vec![
                p.name.clone(),
                p.draw_calls.to_string(),
                p.instances.to_string(),
                p.vertices.to_string(),
                p.texture_binds.to_string(),
                format!("{:>5.1}%", share(p.draw_calls, total_draws)),
            ])
        })
        .collect();
    let header = Row::new(vec!["pass", "draws", "instances", "vertices", "tex binds", "share"])
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    let widths = [
        Constraint::Length(12),
        Constraint::Length(8),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(8),
    ];
    let table = Table::new(rows, widths).header(header).block(block);
    f.render_widget(table, area);
}

// ── Logs Tab ─────────────────────────────────────────────────────────────

fn draw_logs_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let (t, d, i, w, e) = app.log_counts();
    let scroll_label = if app.log_auto_scroll { "auto" } else { "manual" };
    let block = Block::default()
        .title(format!(
            " Logs [{}]  T:{t} D:{d} I:{i} W:{w} E:{e}  scroll:{scroll_label} ",
            app.log_filter.label(),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let filtered = app.filtered_logs();
    if filtered.is_empty() {
        let text = Span::styled("  No log messages", Style::default().fg(Color::DarkGray));
        f.render_widget(Paragraph::new(text), inner);
        return;
    }

    let visible = inner.height as usize;
    let total = filtered.len();
    let offset = if app.log_auto_scroll {
        total.saturating_sub(visible)
    } else {
        app.log_scroll_offset.min(total.saturating_sub(visible))
    };

    let lines: Vec<Line> = filtered
        .iter()
        .skip(offset)
        .take(visible)
        .map(|entry| {
            let level_color = match entry.level.as_str() {
                "TRACE" => Color::DarkGray,
                "DEBUG" => Color::Gray,
                "INFO" => Color::Cyan,
                "WARN" => Color::Yellow,
                "ERROR" => Color::Red,
                _ => Color::White,
            };
            Line::from(vec![
                Span::styled(
                    format!("  [{:>6.1}s] ", entry.timestamp_secs),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("{:<5} ", entry.level),
                    Style::default().fg(level_color).add_modifier(Modifier::BOLD),
                ),
                Span::styled(entry.message.clone(), Style::default().fg(Color::White)),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

// ── Render counters + help bar ───────────────────────────────────────────

fn draw_render_panel(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Render ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let r = &app.latest.render;
    let mut spans = vec![Span::raw(" ")];
    for (label, value) in [
        ("Draws", r.draw_calls as usize),
        ("Instanced", r.instanced_draws as usize),
        ("Verts", r.vertices as usize),
        ("Programs", r.program_binds as usize),
        ("Meshes", r.mesh_binds as usize),
        ("Textures", r.texture_binds as usize),
        ("Passes", r.passes),
        ("Batches", r.batches),
        ("Particles", r.particles),
        ("Texts", r.texts),
    ] {
        spans.push(Span::styled(format!(" {label}: "), Style::default().fg(Color::DarkGray)));
        spans.push(Span::styled(value.to_string(), Style::default().fg(Color::White)));
    }
    f.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn draw_help_bar(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let key = Style::default().fg(Color::Cyan);
    let mut spans = vec![
        Span::styled(" [1-3]", key),
        Span::raw(" tab  "),
        Span::styled("[Tab]", key),
        Span::raw(" next  "),
    ];
    if app.active_tab == Tab::Logs {
        spans.push(Span::styled("[l]", key));
        spans.push(Span::raw(" filter  "));
        spans.push(Span::styled("[g]", key));
        spans.push(Span::raw(" auto-scroll  "));
        spans.push(Span::styled("[\u{2191}\u{2193}]", key));
        spans.push(Span::raw(" scroll  "));
    }
    spans.push(Span::styled("[p]", key));
    spans.push(Span::raw(" pause  "));
    spans.push(Span::styled("[q]", key));
    spans.push(Span::raw(" quit"));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn stats(data: &[u64]) -> (f64, f64, f64) {
    let (Some(min), Some(max)) = (data.iter().min(), data.iter().max()) else {
        return (0.0, 0.0, 0.0);
    };
    let avg = data.iter().sum::<u64>() as f64 / data.len() as f64;
    (*min as f64, avg, *max as f64)
}

fn share(part: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn format_uptime(secs: f32) -> String {
    let total = secs as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{secs:.1}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "fps": 59.6, "delta_ms": 16.7, "frame_count": 120, "elapsed_secs": 2.0,
        "render": {"draw_calls": 14, "instanced_draws": 1, "vertices": 900, "mesh_binds": 6,
                   "texture_binds": 20, "program_binds": 9, "passes": 7, "particles": 40,
                   "batches": 2, "texts": 1},
        "passes": [{"name": "main", "draw_calls": 5, "instances": 0, "vertices": 600, "texture_binds": 8}],
        "logs": [{"level": "WARN", "target": "fjord", "message": "slow", "timestamp_secs": 1.5}]
    }"#;

    #[test]
    fn snapshot_accumulates_history_and_logs() {
        let mut app = App::new();
        let snap: DiagSnapshot = serde_json::from_str(SNAPSHOT).unwrap();
        app.push_snapshot(snap.clone());
        app.push_snapshot(snap);

        assert!(app.connected);
        assert_eq!(app.fps_history, [60, 60]);
        assert_eq!(app.delta_history, [16_700, 16_700]);
        assert_eq!(app.draw_history, [14, 14]);
        assert_eq!(app.log_entries.len(), 2);
        assert_eq!(app.latest.passes[0].name, "main");
        assert_eq!(app.log_counts(), (0, 0, 0, 2, 0));
    }

    #[test]
    fn paused_ignores_snapshots() {
        let mut app = App::new();
        app.paused = true;
        app.push_snapshot(serde_json::from_str(SNAPSHOT).unwrap());
        assert!(!app.connected);
        assert!(app.fps_history.is_empty());
    }

    #[test]
    fn minimal_snapshot_parses() {
        let snap: DiagSnapshot =
            serde_json::from_str(r#"{"fps": 1.0, "delta_ms": 1.0, "frame_count": 1, "elapsed_secs": 1.0}"#).unwrap();
        assert!(snap.passes.is_empty());
        assert_eq!(snap.render.draw_calls, 0);
    }

    #[test]
    fn log_filter_thresholds() {
        assert!(LogFilter::Info.passes("WARN"));
        assert!(!LogFilter::Info.passes("DEBUG"));
        assert!(LogFilter::Debug.passes("DEBUG"));
        assert!(!LogFilter::Debug.passes("TRACE"));
        assert_eq!(LogFilter::Error.next(), LogFilter::All);
    }

    #[test]
    fn helpers() {
        assert_eq!(stats(&[]), (0.0, 0.0, 0.0));
        assert_eq!(stats(&[2, 4, 6]), (2.0, 4.0, 6.0));
        assert_eq!(share(1, 4), 25.0);
        assert_eq!(share(3, 0), 0.0);
        assert_eq!(format_uptime(3725.0), "1h2m5s");
        assert_eq!(format_uptime(65.0), "1m5s");
        assert_eq!(Tab::Logs.next(), Tab::Overview);
        assert_eq!(Tab::Overview.prev(), Tab::Logs);
    }
}
