mod export;
mod help;
mod state;

use crate::channel::{self, ChannelEvent};
use crate::config::Settings;
use crate::model::OutboundMessage;
use crate::panel::state::{ConnectionStatus, LogLevel, RunState};
use crate::panel::ControlPanel;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph, Wrap},
    Terminal,
};
use state::{Focus, KeyOutcome, UiState};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(settings: Settings) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ChannelEvent>();
    let (outbound, channel_handle) = channel::spawn_channel(settings.channel_config(), event_tx);

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_settings = settings.clone();
    let ui_handle =
        std::thread::spawn(move || run_threaded(ui_settings, event_rx, outbound));

    let res = match tokio::task::spawn_blocking(move || ui_handle.join()).await {
        Ok(Ok(res)) => res,
        Ok(Err(_)) => Err(anyhow::anyhow!("TUI thread panicked")),
        Err(e) => Err(e).context("join TUI thread"),
    };

    // The panel is disposed by now; let the channel send its goodbye.
    if tokio::time::timeout(Duration::from_secs(2), channel_handle)
        .await
        .is_err()
    {
        tracing::warn!("channel did not close in time");
    }
    res
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    settings: Settings,
    mut event_rx: UnboundedReceiver<ChannelEvent>,
    outbound: UnboundedSender<OutboundMessage>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState::new(ControlPanel::new(outbound), settings.form.clone());
    let server = settings.server.to_string();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut redraw = true;

    let res = loop {
        // Drain channel events without blocking to keep the UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            state.panel.handle_channel_event(ev);
            state.settle_focus();
            redraw = true;
        }

        if redraw || last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state, &server)).ok();
            last_tick = Instant::now();
            redraw = false;
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if let KeyOutcome::Quit = state.handle_key(k) {
                    break Ok(());
                }
                state.settle_focus();
                redraw = true;
            }
        }
    };

    state.panel.dispose();
    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState, server: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(6),
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(area);

    draw_header(chunks[0], f, state, server);
    draw_form(chunks[1], f, state);
    draw_controls(chunks[2], f, state);
    if state.show_help {
        help::draw_help(chunks[3], f);
    } else {
        draw_log(chunks[3], f, state);
    }
    draw_footer(chunks[4], f, state);

    if let Some(notice) = state.panel.notice() {
        draw_notice(area, f, &notice.message);
    }
}

fn draw_header(area: Rect, f: &mut ratatui::Frame, state: &UiState, server: &str) {
    let (conn_text, conn_color) = match state.panel.connection() {
        ConnectionStatus::Connecting => ("Connecting…".to_string(), Color::Yellow),
        ConnectionStatus::Connected => ("Connected".to_string(), Color::Green),
        ConnectionStatus::Disconnected(reason) => (format!("Disconnected ({reason})"), Color::Red),
    };
    let (run_text, run_color) = match state.panel.run_state() {
        RunState::Running => ("Running", Color::Green),
        RunState::Idle => ("Idle", Color::Gray),
    };
    let line = Line::from(vec![
        Span::styled("Server: ", Style::default().fg(Color::Gray)),
        Span::raw(server.to_string()),
        Span::raw("   "),
        Span::styled(conn_text, Style::default().fg(conn_color)),
        Span::raw("   "),
        Span::styled("Run: ", Style::default().fg(Color::Gray)),
        Span::styled(run_text, Style::default().fg(run_color)),
    ]);
    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("cycle-panel"));
    f.render_widget(p, area);
}

fn draw_form(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(3)].as_ref())
        .split(area);
    let fields = [
        (Focus::Keywords, "Keywords"),
        (Focus::Website, "Target website"),
        (Focus::Cycles, "Cycles"),
        (Focus::Delay, "Delay"),
    ];
    for (row, pair) in rows.iter().zip(fields.chunks(2)) {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
            .split(*row);
        for (col, (focus, label)) in cols.iter().zip(pair) {
            draw_input(*col, f, state, *focus, label);
        }
    }
}

fn draw_input(area: Rect, f: &mut ratatui::Frame, state: &UiState, focus: Focus, label: &str) {
    let focused = state.focus == focus && state.panel.notice().is_none();
    let value = state.field(focus).unwrap_or_default();
    let mut spans = vec![Span::raw(value.to_string())];
    if focused {
        spans.push(Span::styled("▏", Style::default().fg(Color::Yellow)));
    }
    let border = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let p = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border)
            .title(label.to_string()),
    );
    f.render_widget(p, area);
}

fn draw_controls(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Length(20),
                Constraint::Length(12),
                Constraint::Min(10),
            ]
            .as_ref(),
        )
        .split(area);

    let buttons = state.panel.buttons();
    draw_button(
        cols[0],
        f,
        buttons.start_label,
        buttons.start_enabled,
        state.focus == Focus::Start,
    );
    draw_button(
        cols[1],
        f,
        "Stop",
        buttons.stop_enabled,
        state.focus == Focus::Stop,
    );

    let progress = state.panel.progress();
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(progress.ratio().unwrap_or(0.0))
        .label(format!("Cycle {} / {}", progress.current, progress.total));
    f.render_widget(gauge, cols[2]);
}

fn draw_button(area: Rect, f: &mut ratatui::Frame, label: &str, enabled: bool, focused: bool) {
    let style = match (enabled, focused) {
        (false, _) => Style::default().fg(Color::DarkGray),
        (true, true) => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        (true, false) => Style::default(),
    };
    let p = Paragraph::new(label.to_string())
        .style(style)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).border_style(style));
    f.render_widget(p, area);
}

fn draw_log(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let log = state.panel.log();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Status ({})", log.len()));
    if log.is_empty() {
        let p = Paragraph::new("Waiting for server...").block(block);
        f.render_widget(p, area);
        return;
    }
    let inner = block.inner(area);
    let width = inner.width.max(1) as usize;
    let height = inner.height as usize;

    let lines: Vec<Line> = log
        .entries()
        .map(|e| {
            let color = match e.level {
                LogLevel::Info => Color::White,
                LogLevel::Error => Color::Red,
            };
            Line::from(vec![
                Span::styled(format!("{} ", e.timestamp()), Style::default().fg(Color::DarkGray)),
                Span::styled(e.text.clone(), Style::default().fg(color)),
            ])
        })
        .collect();

    // Follow the newest entry: scroll past whatever no longer fits.
    let visual: usize = lines
        .iter()
        .map(|l| l.width().max(1).div_ceil(width))
        .sum();
    let scroll = visual.saturating_sub(height).min(u16::MAX as usize) as u16;

    let p = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    f.render_widget(p, area);
}

fn draw_footer(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let line = if state.info.is_empty() {
        Line::from(Span::styled(
            "Tab move · Enter press · F5 start · F6 stop · F2 copy log · F1 help · Ctrl-C quit",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from(Span::raw(state.info.clone()))
    };
    f.render_widget(Paragraph::new(line), area);
}

fn draw_notice(area: Rect, f: &mut ratatui::Frame, message: &str) {
    let popup = centered_rect(60, 7, area);
    f.render_widget(Clear, popup);
    let p = Paragraph::new(vec![
        Line::from(message.to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "Enter / Esc to dismiss",
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .wrap(Wrap { trim: true })
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title("Notice"),
    );
    f.render_widget(p, popup);
}

/// A rect `percent_x` wide and `height` tall, centered in `area`.
fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let width = area.width.saturating_mul(percent_x) / 100;
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_rect_stays_inside() {
        let area = Rect::new(0, 0, 100, 40);
        let r = centered_rect(60, 7, area);
        assert_eq!(r, Rect::new(20, 16, 60, 7));

        let tiny = Rect::new(0, 0, 10, 3);
        let r = centered_rect(60, 7, tiny);
        assert!(r.height <= tiny.height && r.width <= tiny.width);
    }
}
