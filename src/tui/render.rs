/// Ratatui draw entry-point for repochat.
/// Thin dispatcher: most rendering lives in chat.rs, sidebar.rs and overlays.rs.
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthStr;

use super::chat::{SPINNER_GLYPHS, truncate_end};
use super::{AppState, Mode};
use crate::session::Phase;
use crate::store::display_name;

// ── Layout ────────────────────────────────────────────────────────────────────

/// Screen regions for one frame. Shared by drawing and selection geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panes {
    pub sidebar: Option<Rect>,
    pub history: Rect,
    pub status: Rect,
    pub chip: Option<Rect>,
    pub input: Rect,
}

pub fn panes(area: Rect, state: &AppState) -> Panes {
    // Horizontal split when sidebar is visible
    let (sidebar, main_area) = if state.sidebar_visible {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(30), Constraint::Min(0)])
            .split(area);
        (Some(cols[0]), cols[1])
    } else {
        (None, area)
    };

    let has_chip = state.controller.session().pending_quote.is_some();
    let constraints = if has_chip {
        vec![
            Constraint::Min(0),     // transcript
            Constraint::Length(1),  // status bar
            Constraint::Length(1),  // quote chip
            Constraint::Length(3),  // input box
        ]
    } else {
        vec![
            Constraint::Min(0),     // transcript
            Constraint::Length(1),  // status bar
            Constraint::Length(3),  // input box
        ]
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(main_area);

    Panes {
        sidebar,
        history: chunks[0],
        status: chunks[1],
        chip: has_chip.then(|| chunks[2]),
        input: chunks[chunks.len() - 1],
    }
}

// ── Main draw entry point ─────────────────────────────────────────────────────

pub fn draw(f: &mut Frame, state: &AppState) {
    let area = f.area();
    let panes = panes(area, state);

    if let Some(sidebar) = panes.sidebar {
        super::sidebar::draw_sidebar(f, state, sidebar);
    }
    super::chat::draw_history(f, state, panes.history);
    draw_status_bar(f, state, panes.status);
    if let Some(chip) = panes.chip {
        super::chat::draw_quote_chip(f, state, chip);
    }
    draw_input(f, state, panes.input);

    if state.mode == Mode::Select {
        super::overlays::draw_quote_affordance(f, state, area);
    }
    if state.mode == Mode::SlashComplete {
        super::overlays::draw_slash_complete(f, state, area);
    }
    if state.mode == Mode::HistoryBrowser {
        if let Some(browser) = &state.history_browser {
            super::overlays::draw_history_browser(f, browser, area);
        }
    }
    if state.mode == Mode::ModelPicker {
        super::overlays::draw_model_picker(f, state, area);
    }
    if let Some(notice) = &state.notice {
        super::overlays::draw_notice(f, notice, area);
    }
}

// ── Status bar ────────────────────────────────────────────────────────────────

pub fn phase_label(phase: Phase) -> (&'static str, Color) {
    match phase {
        Phase::Idle           => ("idle",        Color::DarkGray),
        Phase::LoadingInitial => ("loading",     Color::Yellow),
        Phase::Ready          => ("ready",       Color::Rgb(0, 220, 120)),
        Phase::LoadingRefresh => ("re-indexing", Color::Yellow),
    }
}

fn draw_status_bar(f: &mut Frame, state: &AppState, area: Rect) {
    let session = state.controller.session();

    // Animated spinner glyph in status bar while a request is running
    let (status_glyph, status_color) = if state.is_busy() {
        let g = SPINNER_GLYPHS[(state.spinner_tick as usize) % SPINNER_GLYPHS.len()];
        (g, Color::Cyan)
    } else {
        ("▲", Color::White)
    };

    let repo = if session.url.is_empty() {
        "no repository".to_string()
    } else {
        truncate_end(display_name(&session.url), 32)
    };
    let (phase, phase_color) = phase_label(session.phase);

    let mut spans = vec![
        Span::raw(" "),
        Span::styled(status_glyph, Style::default().fg(status_color).add_modifier(Modifier::BOLD)),
        Span::styled(" repochat", Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(
            state.resolved.model_name(&state.resolved.model).to_string(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled("  ·  ", Style::default().fg(Color::DarkGray)),
        Span::styled(repo, Style::default().fg(Color::Rgb(100, 180, 220))),
        Span::raw("  "),
        Span::styled(phase, Style::default().fg(phase_color)),
    ];
    if let Some(status) = &state.status {
        spans.push(Span::styled("  ·  ", Style::default().fg(Color::DarkGray)));
        spans.push(Span::styled(status.clone(), Style::default().fg(Color::Rgb(150, 150, 180))));
    }
    if !state.sidebar_visible {
        spans.push(Span::styled(
            "  Ctrl+B sidebar  Ctrl+H history",
            Style::default().fg(Color::Rgb(55, 50, 90)),
        ));
    }

    let bar_style = if state.is_busy() {
        Style::default().bg(Color::Rgb(15, 15, 25))
    } else {
        Style::default().bg(Color::Rgb(10, 10, 18))
    };

    f.render_widget(Paragraph::new(Line::from(spans)).style(bar_style), area);
}

// ── Input box ─────────────────────────────────────────────────────────────────

fn draw_input(f: &mut Frame, state: &AppState, area: Rect) {
    let (border_color, prompt_color, prompt_char) = match state.mode {
        Mode::SlashComplete  => (Color::Cyan,              Color::Cyan,               "/"),
        Mode::Select         => (Color::Rgb(240, 200, 60), Color::Rgb(240, 200, 60), "❝"),
        Mode::HistoryBrowser => (Color::Rgb(110, 90, 200), Color::Rgb(110, 90, 200), "◈"),
        Mode::ModelPicker    => (Color::Cyan,              Color::Cyan,               "▸"),
        Mode::Normal         => (Color::Rgb(60, 60, 80),   Color::Cyan,               "❯"),
    };

    let prompt_span = Span::styled(
        format!("  {prompt_char} "),
        Style::default().fg(prompt_color).add_modifier(Modifier::BOLD),
    );

    let input_text = state.input();
    let content_span = if state.mode == Mode::Select {
        Span::styled(
            "↑↓ move  Shift+↑↓ extend  Enter quote  r resend  Esc cancel",
            Style::default().fg(Color::Rgb(140, 120, 50)),
        )
    } else if input_text.is_empty() {
        let hint = if state.controller.session().is_loading_answer {
            "waiting for the answer…"
        } else {
            "ask about the repository · / commands · Ctrl+S select · Ctrl+B sidebar"
        };
        Span::styled(hint, Style::default().fg(Color::Rgb(70, 70, 90)))
    } else {
        Span::styled(input_text.to_string(), Style::default().fg(Color::White))
    };

    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(border_color))
        .style(Style::default().bg(Color::Rgb(8, 8, 14)));

    let paragraph = Paragraph::new(Line::from(vec![prompt_span, content_span]))
        .block(block)
        .wrap(Wrap { trim: false });

    f.render_widget(paragraph, area);

    // Position cursor at the actual edit cursor, not end of string
    if matches!(state.mode, Mode::Normal | Mode::SlashComplete) && state.notice.is_none() {
        // prompt is "  ❯ ": total visible width is 4 cols
        let prompt_width: u16 = 4;
        let text_before_cursor = &input_text[..state.cursor.min(input_text.len())];
        let cursor_x = area.x + prompt_width + text_before_cursor.width() as u16;
        let cursor_y = area.y + 1; // +1 for top border
        if cursor_x < area.x + area.width {
            f.set_cursor_position((cursor_x, cursor_y));
        }
    }
}
