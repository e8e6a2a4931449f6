//! TUI application state and event loop.
//!
//! Design: one dashboard over a shared session. The poller thread owns all
//! writes; every frame takes a single-lock snapshot and renders from it, so
//! the UI never blocks on the feed.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use ratatui::widgets::TableState;

use florios_core::{
    DeviceEntry, HistoryField, MonitorConfig, NO_DATA, Poller, PollerHandle, SessionSnapshot,
    SharedSession, TelemetrySource, lock_session,
};

// ---------------------------------------------------------------------------
// ChartMode
// ---------------------------------------------------------------------------

/// Which history series the trend chart plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartMode {
    #[default]
    RemainingVolume,
    InfusionRate,
}

impl ChartMode {
    pub fn next(self) -> Self {
        match self {
            Self::RemainingVolume => Self::InfusionRate,
            Self::InfusionRate => Self::RemainingVolume,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::RemainingVolume => "Remaining volume",
            Self::InfusionRate => "Infusion rate",
        }
    }

    pub fn y_label(self) -> &'static str {
        match self {
            Self::RemainingVolume => "ml",
            Self::InfusionRate => "ml/min",
        }
    }

    pub fn field(self) -> HistoryField {
        match self {
            Self::RemainingVolume => HistoryField::RemainingVolume,
            Self::InfusionRate => HistoryField::InfusionRate,
        }
    }

    /// Y axis bounds for the plotted values.
    pub fn y_bounds(self, min_val: f64, max_val: f64) -> (f64, f64) {
        match self {
            Self::RemainingVolume => (0.0, (max_val * 1.1).max(10.0)),
            Self::InfusionRate => {
                let low = if min_val < 0.0 { min_val * 1.2 } else { 0.0 };
                (low, (max_val * 1.2).max(1.0))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Text fill bar for a percentage, clamped to [0, 100].
pub fn fill_bar(pct: Option<f64>, width: usize) -> String {
    let filled = match pct {
        Some(p) if p.is_finite() => ((p.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize,
        _ => 0,
    };
    let mut bar = "█".repeat(filled.min(width));
    bar.push_str(&"░".repeat(width - filled.min(width)));
    bar
}

pub fn format_volume(ml: Option<f64>) -> String {
    match ml {
        Some(v) if v.is_finite() => format!("{v:.1} ml"),
        _ => NO_DATA.to_string(),
    }
}

/// Banner text naming every low-volume device, or `None` when all are fine.
pub fn low_volume_banner(snapshot: &SessionSnapshot) -> Option<String> {
    let low: Vec<String> = snapshot
        .devices
        .iter()
        .filter(|e| florios_core::low_volume_alert(&e.state, snapshot.low_volume_threshold))
        .map(|e| {
            format!(
                "{} ({})",
                e.state.device_id,
                format_volume(e.state.remaining_volume)
            )
        })
        .collect();
    if low.is_empty() {
        None
    } else {
        Some(format!("LOW VOLUME: {}", low.join(", ")))
    }
}

fn export_file_name(device_id: &str, epoch: i64) -> String {
    let safe: String = device_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("florios-{safe}-{epoch}.json")
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct App {
    session: SharedSession,
    poller: Option<PollerHandle>,
    source_name: String,
    config: MonitorConfig,
    cursor: usize,
    running: bool,
    chart_mode: ChartMode,
    show_history: bool,
    paused: bool,
    table_state: TableState,
    export_dir: PathBuf,
    last_export: Option<PathBuf>,
    export_error: Option<String>,
}

impl App {
    pub fn new(session: SharedSession, source_name: impl Into<String>, config: MonitorConfig) -> Self {
        Self {
            session,
            poller: None,
            source_name: source_name.into(),
            config,
            cursor: 0,
            running: true,
            chart_mode: ChartMode::default(),
            show_history: false,
            paused: false,
            table_state: TableState::default().with_selected(Some(0)),
            export_dir: PathBuf::from("."),
            last_export: None,
            export_error: None,
        }
    }

    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = dir.into();
        self
    }

    /// Start polling `source` and run the dashboard until the user quits.
    pub fn run(&mut self, source: Box<dyn TelemetrySource>) -> io::Result<()> {
        self.poller = Some(Poller::spawn(
            source,
            self.session.clone(),
            self.config.poll_interval,
        )?);

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Install panic hook that restores terminal before printing the panic.
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
            original_hook(info);
        }));

        let result = self.run_loop(&mut terminal);

        // Always restore terminal, even if the loop returned an error.
        let _ = std::panic::take_hook(); // remove our hook
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            crossterm::cursor::Show
        )?;

        if let Some(poller) = self.poller.take() {
            poller.stop();
        }

        if let Some(path) = &self.last_export {
            println!("Last snapshot exported to {}", path.display());
        }

        result
    }

    fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        while self.is_running() {
            let snapshot = self.snapshot();
            self.clamp_cursor(snapshot.devices.len());
            terminal.draw(|f| super::ui::draw(f, self, &snapshot))?;

            if event::poll(Duration::from_millis(50))?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                self.handle_key(key.code);
            }
        }

        Ok(())
    }

    fn clamp_cursor(&mut self, devices: usize) {
        let max = devices.saturating_sub(1);
        if self.cursor > max {
            self.cursor = max;
            self.table_state.select(Some(self.cursor));
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc if self.show_history => self.show_history = false,
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Up | KeyCode::Char('k') => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.table_state.select(Some(self.cursor));
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let devices = lock_session(&self.session).len();
                if self.cursor < devices.saturating_sub(1) {
                    self.cursor += 1;
                    self.table_state.select(Some(self.cursor));
                }
            }
            KeyCode::Char('g') => self.chart_mode = self.chart_mode.next(),
            KeyCode::Char('h') => self.show_history = !self.show_history,
            KeyCode::Char('p') => {
                self.paused = !self.paused;
                if let Some(poller) = &self.poller {
                    poller.set_paused(self.paused);
                }
            }
            KeyCode::Char('r') => {
                if let Some(poller) = &self.poller {
                    poller.refresh();
                }
            }
            KeyCode::Char('s') => self.export_snapshot(),
            _ => {}
        }
    }

    /// Write the selected device's state, derived view and history as JSON.
    fn export_snapshot(&mut self) {
        let snapshot = self.snapshot();
        let Some(entry) = self.selected(&snapshot) else {
            self.export_error = Some("no device to export".to_string());
            return;
        };

        let now = chrono::Utc::now().timestamp();
        let json = serde_json::json!({
            "source": self.source_name,
            "connectivity": snapshot.connectivity,
            "exported_at": now,
            "state": entry.state,
            "view": snapshot.view(entry, now),
            "history": entry.history.newest_first(),
        });

        let path = self
            .export_dir
            .join(export_file_name(&entry.state.device_id, now));
        let written = serde_json::to_string_pretty(&json)
            .map_err(|e| e.to_string())
            .and_then(|contents| std::fs::write(&path, contents).map_err(|e| e.to_string()));
        match written {
            Ok(()) => {
                self.last_export = Some(path);
                self.export_error = None;
            }
            Err(e) => self.export_error = Some(e),
        }
    }

    // --- Public accessors (non-shared state, no lock needed) ---

    pub fn cursor(&self) -> usize {
        self.cursor
    }
    pub fn source_name(&self) -> &str {
        &self.source_name
    }
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
    pub fn chart_mode(&self) -> ChartMode {
        self.chart_mode
    }
    pub fn show_history(&self) -> bool {
        self.show_history
    }
    pub fn is_paused(&self) -> bool {
        self.paused
    }
    pub fn is_running(&self) -> bool {
        self.running
    }
    pub fn table_state(&self) -> &TableState {
        &self.table_state
    }
    pub fn last_export(&self) -> Option<&PathBuf> {
        self.last_export.as_ref()
    }
    pub fn export_error(&self) -> Option<&str> {
        self.export_error.as_deref()
    }

    /// The device under the cursor in `snapshot`.
    pub fn selected<'a>(&self, snapshot: &'a SessionSnapshot) -> Option<&'a DeviceEntry> {
        let last = snapshot.devices.len().checked_sub(1)?;
        snapshot.devices.get(self.cursor.min(last))
    }

    /// Capture the session in a single mutex lock for one UI frame.
    pub fn snapshot(&self) -> SessionSnapshot {
        lock_session(&self.session).snapshot()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use florios_core::{MonitorSession, shared};
    use serde_json::json;

    fn app_with(records: serde_json::Value) -> App {
        let session = shared(MonitorSession::default());
        lock_session(&session).apply_snapshot(&records, 1_000);
        App::new(session, "test-feed", MonitorConfig::default())
    }

    fn three_devices() -> App {
        app_with(json!([
            {"bottle_id": "A", "timestamp": 1_000, "remaining_volume": 400.0, "fill_h": 500.0},
            {"bottle_id": "B", "timestamp": 1_000, "remaining_volume": 12.0, "fill_h": 500.0},
            {"bottle_id": "C", "timestamp": 1_000, "remaining_volume": 0.0, "fill_h": 500.0}
        ]))
    }

    #[test]
    fn chart_mode_toggles() {
        assert_eq!(ChartMode::default(), ChartMode::RemainingVolume);
        assert_eq!(ChartMode::RemainingVolume.next(), ChartMode::InfusionRate);
        assert_eq!(ChartMode::InfusionRate.next(), ChartMode::RemainingVolume);
    }

    #[test]
    fn chart_mode_labels() {
        assert_eq!(ChartMode::RemainingVolume.label(), "Remaining volume");
        assert_eq!(ChartMode::InfusionRate.label(), "Infusion rate");
        assert_eq!(ChartMode::RemainingVolume.y_label(), "ml");
        assert_eq!(ChartMode::InfusionRate.y_label(), "ml/min");
    }

    #[test]
    fn chart_mode_maps_history_field() {
        assert_eq!(
            ChartMode::RemainingVolume.field(),
            HistoryField::RemainingVolume
        );
        assert_eq!(ChartMode::InfusionRate.field(), HistoryField::InfusionRate);
    }

    #[test]
    fn chart_mode_y_bounds_volume_from_zero() {
        let (lo, hi) = ChartMode::RemainingVolume.y_bounds(200.0, 400.0);
        assert_eq!(lo, 0.0);
        assert!((hi - 440.0).abs() < 1e-9);
        assert_eq!(ChartMode::RemainingVolume.y_bounds(0.0, 2.0), (0.0, 10.0));
    }

    #[test]
    fn chart_mode_y_bounds_rate_allows_negative() {
        let (lo, hi) = ChartMode::InfusionRate.y_bounds(-1.0, 2.0);
        assert!(lo < -1.0);
        assert!(hi > 2.0);
        assert_eq!(ChartMode::InfusionRate.y_bounds(0.0, 0.1), (0.0, 1.0));
    }

    #[test]
    fn fill_bar_widths() {
        assert_eq!(fill_bar(Some(50.0), 10), "█████░░░░░");
        assert_eq!(fill_bar(Some(150.0), 4), "████");
        assert_eq!(fill_bar(Some(-3.0), 4), "░░░░");
        assert_eq!(fill_bar(None, 3), "░░░");
        assert_eq!(fill_bar(Some(f64::NAN), 2), "░░");
    }

    #[test]
    fn format_volume_handles_missing() {
        assert_eq!(format_volume(Some(12.345)), "12.3 ml");
        assert_eq!(format_volume(None), "--");
    }

    #[test]
    fn banner_lists_only_low_devices() {
        let app = three_devices();
        let banner = low_volume_banner(&app.snapshot()).unwrap();
        assert_eq!(banner, "LOW VOLUME: B (12.0 ml)");

        let fine = app_with(json!([{"bottle_id": "A", "timestamp": 1, "remaining_volume": 300.0}]));
        assert_eq!(low_volume_banner(&fine.snapshot()), None);
    }

    #[test]
    fn export_file_name_is_path_safe() {
        assert_eq!(export_file_name("B7", 5), "florios-B7-5.json");
        assert_eq!(export_file_name("ward 3/bed-2", 5), "florios-ward_3_bed-2-5.json");
    }

    #[test]
    fn navigation_stays_within_devices() {
        let mut app = three_devices();
        app.handle_key(KeyCode::Up);
        assert_eq!(app.cursor(), 0);
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Char('j'));
        app.handle_key(KeyCode::Down);
        assert_eq!(app.cursor(), 2);
        assert_eq!(app.table_state().selected(), Some(2));
        app.handle_key(KeyCode::Char('k'));
        assert_eq!(app.cursor(), 1);

        let snapshot = app.snapshot();
        assert_eq!(app.selected(&snapshot).unwrap().state.device_id, "B");
    }

    #[test]
    fn selection_empty_session() {
        let app = app_with(json!([]));
        assert!(app.selected(&app.snapshot()).is_none());
    }

    #[test]
    fn keys_toggle_view_state() {
        let mut app = three_devices();
        app.handle_key(KeyCode::Char('g'));
        assert_eq!(app.chart_mode(), ChartMode::InfusionRate);
        app.handle_key(KeyCode::Char('p'));
        assert!(app.is_paused());

        app.handle_key(KeyCode::Char('h'));
        assert!(app.show_history());
        // Esc closes the overlay before it quits.
        app.handle_key(KeyCode::Esc);
        assert!(!app.show_history());
        assert!(app.is_running());
        app.handle_key(KeyCode::Char('q'));
        assert!(!app.is_running());
    }

    #[test]
    fn export_writes_selected_device() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = three_devices().with_export_dir(dir.path());
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Char('s'));

        let path = app.last_export().unwrap().clone();
        assert!(path.starts_with(dir.path()));
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["state"]["device_id"], "B");
        assert_eq!(written["view"]["low_volume"], true);
        assert_eq!(written["history"].as_array().unwrap().len(), 1);
        assert_eq!(written["source"], "test-feed");
    }

    #[test]
    fn export_without_devices_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with(json!([])).with_export_dir(dir.path());
        app.handle_key(KeyCode::Char('s'));
        assert!(app.last_export().is_none());
        assert_eq!(app.export_error(), Some("no device to export"));
    }
}
