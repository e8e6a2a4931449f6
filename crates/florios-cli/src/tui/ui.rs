//! TUI rendering: one dashboard over the session snapshot.
//!
//! ┌──────────────────────────────────────────────┐
//! │  💧 Florios   ● Connected   3 devices  #42   │
//! ├──────────────────────────────────────────────┤
//! │  LOW VOLUME: B2 (12.0 ml)                    │
//! ├──────────────────────┬───────────────────────┤
//! │  Devices             │  B1                   │
//! │  ▸ B1  75% ████░ 2.5 │  Started   12:40:07   │
//! │    B2   3% ░░░░░ 1.0 │  Elapsed   1h 5m      │
//! │                      ├───────────────────────┤
//! │                      │  ╭ Remaining volume   │
//! │                      │  │  ~~~~~~            │
//! │                      │  ╰─────────────────── │
//! ├──────────────────────┴───────────────────────┤
//! │  last export / last error                    │
//! ├──────────────────────────────────────────────┤
//! │  ↑↓ navigate  g: graph  h: history  q: quit  │
//! └──────────────────────────────────────────────┘

use chrono::Local;
use florios_core::{
    DeviceEntry, NO_DATA, Rgb, SessionSnapshot, format_clock, percentage, rate_display,
};
use ratatui::{prelude::*, widgets::*};

use super::app::{App, fill_bar, format_volume, low_volume_banner};

pub fn draw(f: &mut Frame, app: &App, snapshot: &SessionSnapshot) {
    let banner = low_volume_banner(snapshot);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),                                    // title
            Constraint::Length(if banner.is_some() { 1 } else { 0 }), // alert
            Constraint::Min(10),                                      // main
            Constraint::Length(3),                                    // status
            Constraint::Length(1),                                    // keys
        ])
        .split(f.area());

    draw_title(f, rows[0], app, snapshot);
    if let Some(text) = banner {
        let p = Paragraph::new(format!(" ⚠ {text}"))
            .style(Style::default().bg(Color::Red).fg(Color::White).bold());
        f.render_widget(p, rows[1]);
    }
    draw_main(f, rows[2], app, snapshot);
    draw_status(f, rows[3], app, snapshot);
    draw_keys(f, rows[4]);

    if app.show_history() {
        draw_history(f, app, snapshot);
    }
}

fn color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.r, rgb.g, rgb.b)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn draw_title(f: &mut Frame, area: Rect, app: &App, snapshot: &SessionSnapshot) {
    let (badge, badge_color) = if snapshot.connectivity.is_connected() {
        ("● Connected", Color::Green)
    } else {
        ("● Disconnected", Color::Red)
    };
    let cycles = snapshot.stats.ok_cycles + snapshot.stats.failed_cycles;
    let paused = if app.is_paused() { "  PAUSED" } else { "" };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Line::from(vec![
            Span::styled(" 💧 Florios ", Style::default().bold().fg(Color::Cyan)),
            Span::styled(badge, Style::default().bold().fg(badge_color)),
            Span::raw(format!("  {} devices", snapshot.devices.len())),
            Span::styled(
                format!(
                    "  #{cycles}  every {:.1}s  {}",
                    app.config().poll_interval.as_secs_f64(),
                    app.source_name()
                ),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(paused, Style::default().bold().fg(Color::Yellow)),
            Span::raw(" "),
        ]));

    f.render_widget(block, area);
}

fn draw_main(f: &mut Frame, area: Rect, app: &App, snapshot: &SessionSnapshot) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    draw_device_table(f, cols[0], app, snapshot);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(10), Constraint::Min(6)])
        .split(cols[1]);

    let selected = app.selected(snapshot);
    draw_detail(f, right[0], snapshot, selected);
    draw_chart(f, right[1], app, selected);
}

fn draw_device_table(f: &mut Frame, area: Rect, app: &App, snapshot: &SessionSnapshot) {
    let now = now();
    let items: Vec<Row> = snapshot
        .devices
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let view = snapshot.view(entry, now);
            let pointer = if i == app.cursor() { "▸" } else { " " };
            let pct = view
                .percentage
                .map(|p| format!("{p:.0}%"))
                .unwrap_or_else(|| NO_DATA.to_string());
            let flag = if view.low_volume { "LOW" } else { "" };

            Row::new(vec![
                Cell::from(pointer),
                Cell::from(view.device_id.clone()),
                Cell::from(pct),
                Cell::from(fill_bar(view.percentage, 10)).style(Style::default().fg(color(view.color))),
                Cell::from(view.rate.clone()),
                Cell::from(view.time_remaining.clone()),
                Cell::from(flag).style(Style::default().fg(Color::Red).bold()),
            ])
        })
        .collect();

    let empty = items.is_empty();
    let table = Table::new(
        items,
        [
            Constraint::Length(2),  // pointer
            Constraint::Length(12), // device
            Constraint::Length(5),  // percent
            Constraint::Length(11), // bar
            Constraint::Length(7),  // rate
            Constraint::Length(9),  // time left
            Constraint::Length(4),  // low flag
        ],
    )
    .header(
        Row::new(vec!["", "Bottle", "Fill", "", "ml/min", "Left", ""])
            .style(Style::default().bold().fg(Color::DarkGray)),
    )
    .row_highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(if empty {
                " Devices (waiting for data) "
            } else {
                " Devices "
            }),
    );

    let mut state = app.table_state().clone();
    f.render_stateful_widget(table, area, &mut state);
}

fn draw_detail(f: &mut Frame, area: Rect, snapshot: &SessionSnapshot, entry: Option<&DeviceEntry>) {
    let Some(entry) = entry else {
        let block = Block::default().borders(Borders::ALL).title(" Device ");
        let p = Paragraph::new("No device selected")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(p, area);
        return;
    };

    let state = &entry.state;
    let view = snapshot.view(entry, now());
    let label = |s: &'static str| Span::styled(format!("{s:<11}"), Style::default().bold());

    let pct = percentage(state)
        .map(|p| format!("{p:.0}%"))
        .unwrap_or_else(|| NO_DATA.to_string());
    let lines = vec![
        Line::from(vec![
            label("Remaining"),
            Span::styled(
                format!("{}  {pct}", format_volume(state.remaining_volume)),
                Style::default().fg(color(view.color)).bold(),
            ),
        ]),
        Line::from(vec![label("Level"), Span::raw(format_volume(state.current_level))]),
        Line::from(vec![label("Capacity"), Span::raw(format_volume(state.fill_capacity))]),
        Line::from(vec![
            label("Rate"),
            Span::raw(format!("{} ml/min", rate_display(state.infusion_rate))),
        ]),
        Line::from(vec![label("Time left"), Span::raw(view.time_remaining.clone())]),
        Line::from(vec![label("Started"), Span::raw(format_clock(state.start_time, &Local))]),
        Line::from(vec![label("Updated"), Span::raw(format_clock(state.observed_at, &Local))]),
        Line::from(vec![label("Elapsed"), Span::raw(view.elapsed.clone())]),
    ];

    let border = if view.low_volume { Color::Red } else { Color::White };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(format!(" {} ", state.device_id));
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_chart(f: &mut Frame, area: Rect, app: &App, entry: Option<&DeviceEntry>) {
    let mode = app.chart_mode();
    let data = entry
        .map(|e| e.history.elapsed_series(e.state.start_time, mode.field()))
        .unwrap_or_default();

    if data.is_empty() {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", mode.label()));
        let p = Paragraph::new("No history for this device yet")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(p, area);
        return;
    }

    let latest = data.last().map(|p| p.1).unwrap_or(0.0);
    let min_val = data.iter().map(|p| p.1).fold(f64::MAX, f64::min);
    let max_val = data.iter().map(|p| p.1).fold(f64::MIN, f64::max);
    let x_max = data.last().map(|p| p.0).unwrap_or(0.0).max(1.0);
    let (y_min, y_max) = mode.y_bounds(min_val, max_val);

    let datasets = vec![
        Dataset::default()
            .name(format!("{latest:.1} {}", mode.y_label()))
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&data),
    ];

    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " {}  ({} points, g to switch) ",
            mode.label(),
            data.len()
        )))
        .x_axis(
            Axis::default()
                .title("min")
                .bounds([0.0, x_max])
                .labels(vec![Line::from("0"), Line::from(format!("{x_max:.1}"))]),
        )
        .y_axis(
            Axis::default()
                .title(mode.y_label())
                .bounds([y_min, y_max])
                .labels(vec![
                    Line::from(format!("{y_min:.1}")),
                    Line::from(format!("{y_max:.1}")),
                ]),
        );

    f.render_widget(chart, area);
}

fn draw_status(f: &mut Frame, area: Rect, app: &App, snapshot: &SessionSnapshot) {
    let mut spans = Vec::new();
    if let Some(err) = &snapshot.stats.last_error {
        spans.push(Span::styled(
            format!("feed: {err}  "),
            Style::default().fg(Color::Red),
        ));
    } else if let Some(ts) = snapshot.stats.last_success {
        spans.push(Span::raw(format!("last poll {}  ", format_clock(ts, &Local))));
    }
    if let Some(err) = app.export_error() {
        spans.push(Span::styled(
            format!("export failed: {err}"),
            Style::default().fg(Color::Red),
        ));
    } else if let Some(path) = app.last_export() {
        spans.push(Span::styled(
            format!("exported {}", path.display()),
            Style::default().fg(Color::Green),
        ));
    }

    let block = Block::default().borders(Borders::ALL).title(" Status ");
    f.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn draw_history(f: &mut Frame, app: &App, snapshot: &SessionSnapshot) {
    let area = centered(f.area(), 60, 70);
    f.render_widget(Clear, area);

    let Some(entry) = app.selected(snapshot) else {
        let block = Block::default().borders(Borders::ALL).title(" History ");
        f.render_widget(Paragraph::new("No device selected").block(block), area);
        return;
    };

    let rows: Vec<Row> = entry
        .history
        .newest_first()
        .iter()
        .map(|p| {
            Row::new(vec![
                format_clock(p.time, &Local),
                format_volume(Some(p.remaining_volume)),
                rate_display(p.infusion_rate),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(8),
        ],
    )
    .header(
        Row::new(vec!["Time", "Remaining", "ml/min"])
            .style(Style::default().bold().fg(Color::DarkGray)),
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!(
                " {} history ({}/{}, newest first, h to close) ",
                entry.state.device_id,
                entry.history.len(),
                entry.history.capacity()
            )),
    );

    f.render_widget(table, area);
}

fn centered(area: Rect, pct_x: u16, pct_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - pct_y) / 2),
            Constraint::Percentage(pct_y),
            Constraint::Percentage((100 - pct_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - pct_x) / 2),
            Constraint::Percentage(pct_x),
            Constraint::Percentage((100 - pct_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn draw_keys(f: &mut Frame, area: Rect) {
    let bar = Paragraph::new(
        " ↑↓ navigate   g: graph   h: history   p: pause   r: refresh   s: export   q: quit",
    )
    .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(bar, area);
}
