/// Transcript pane rendering: message layout, selection geometry, quote chip, spinner, utilities.
use std::ops::{Range, RangeInclusive};

use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, List, ListItem, Paragraph},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::AppState;
use crate::selection::SelectionBounds;
use crate::session::Phase;
use crate::transcript::Role;

// ── Spinner ────────────────────────────────────────────────────────────────────

pub const SPINNER_GLYPHS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const SPINNER_MSGS: &[(&str, Color)] = &[
    ("thinking…",               Color::Cyan),
    ("searching the code…",     Color::Cyan),
    ("reading the repository…", Color::Rgb(0, 200, 255)),
    ("crafting response…",      Color::Rgb(0, 220, 180)),
    ("almost there…",           Color::Rgb(100, 200, 255)),
];

pub fn spinner_frame(tick: u32) -> (&'static str, &'static str, Color) {
    let glyph = SPINNER_GLYPHS[(tick as usize) % SPINNER_GLYPHS.len()];
    // Message cycles more slowly: changes every ~2 seconds (120ms × 16 ticks)
    let msg_idx = (tick as usize / 16) % SPINNER_MSGS.len();
    let (msg, color) = SPINNER_MSGS[msg_idx];
    (glyph, msg, color)
}

const SELECT_FG: Color = Color::Rgb(240, 200, 60);

// ── Transcript layout ──────────────────────────────────────────────────────────

/// Build every transcript row for a pane `term_width` columns wide.
///
/// Alongside the items this returns, per message, the row range it occupies
/// (blank separators excluded). Selection geometry is derived from the same
/// ranges that get drawn, so the two cannot drift apart.
pub fn transcript_layout(state: &AppState, term_width: u16) -> (Vec<ListItem<'static>>, Vec<Range<usize>>) {
    let session = state.controller.session();
    let selected = state.selection.map(|s| s.range());
    let is_selected = |i: usize| selected.as_ref().is_some_and(|r| r.contains(&i));

    let mut items: Vec<ListItem<'static>> = Vec::new();
    let mut rows = Vec::with_capacity(session.transcript.len());

    for (i, msg) in session.transcript.iter().enumerate() {
        let start = items.len();
        match msg.role {
            Role::User => push_user_bubble(&mut items, &msg.text, term_width, is_selected(i)),
            Role::Bot => push_bot_message(&mut items, &msg.text, term_width, is_selected(i)),
        }
        rows.push(start..items.len());
        items.push(ListItem::new(Line::raw("")));
    }

    if session.transcript.is_empty() && !session.is_loading_repo {
        push_empty_hint(&mut items, &session.url);
    }

    if session.is_loading_repo {
        let glyph = SPINNER_GLYPHS[(state.spinner_tick as usize) % SPINNER_GLYPHS.len()];
        let verb = if session.phase == Phase::LoadingRefresh { "re-indexing" } else { "indexing" };
        items.push(ListItem::new(Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{glyph} "), Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            Span::styled(format!("{verb} {}…", session.url), Style::default().fg(Color::Yellow)),
        ])));
    }

    if session.is_loading_answer {
        let (glyph, msg, color) = spinner_frame(state.spinner_tick);
        items.push(ListItem::new(Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{glyph} "), Style::default().fg(color).add_modifier(Modifier::BOLD)),
            Span::styled(msg.to_string(), Style::default().fg(color)),
        ])));
    }

    (items, rows)
}

pub fn build_items(state: &AppState, term_width: u16) -> Vec<ListItem<'static>> {
    transcript_layout(state, term_width).0
}

/// Total row count plus the row range of each message.
pub fn message_rows(state: &AppState, term_width: u16) -> (usize, Vec<Range<usize>>) {
    let (items, rows) = transcript_layout(state, term_width);
    (items.len(), rows)
}

/// On-screen rectangle of the visible part of messages `range` inside the
/// history pane `area`. Degenerate when none of it is on screen.
pub fn selection_bounds(state: &AppState, area: Rect, range: RangeInclusive<usize>) -> SelectionBounds {
    let (total, rows) = message_rows(state, area.width);
    let visible = area.height as usize;
    let skip = if total > visible {
        (total - visible).saturating_sub(state.scroll)
    } else {
        0
    };
    let (Some(first), Some(last)) = (rows.get(*range.start()), rows.get(*range.end())) else {
        return SelectionBounds::default();
    };
    let top = first.start.max(skip);
    let bottom = last.end.min(skip + visible);
    if bottom <= top {
        return SelectionBounds::default();
    }
    SelectionBounds {
        top: area.y + (top - skip) as u16,
        left: area.x + 2,
        width: area.width.saturating_sub(3),
        height: (bottom - top) as u16,
    }
}

fn push_user_bubble(items: &mut Vec<ListItem<'static>>, text: &str, term_width: u16, selected: bool) {
    // Bubble colours
    let bg       = Color::Rgb(28, 26, 52);
    let border   = if selected { SELECT_FG } else { Color::Rgb(110, 90, 200) };
    let label_fg = Color::Rgb(160, 140, 255);
    let text_fg  = Color::Rgb(235, 232, 255);
    let body_style = Style::default().fg(text_fg).bg(bg);
    let edge_style = Style::default().fg(border).bg(bg);

    // 2 chars left margin, 1 right margin
    let inner_w = (term_width as usize).saturating_sub(3).max(10);
    // Top: "╭─ you ──...──╮"
    let dash_total = inner_w.saturating_sub(4 + 5);
    let top_dashes = "─".repeat(dash_total);
    items.push(ListItem::new(Line::from(vec![
        Span::raw("  "),
        Span::styled("╭─ ", edge_style),
        Span::styled("you", Style::default().fg(label_fg).bg(bg).add_modifier(Modifier::BOLD)),
        Span::styled(format!(" {top_dashes}╮"), edge_style),
    ])));

    let wrap_width = inner_w.saturating_sub(2).max(10);
    let raw_lines: Vec<&str> = if text.is_empty() { vec![""] } else { text.lines().collect() };
    for line in raw_lines.iter().flat_map(|line| wrap_text(line, wrap_width)) {
        items.push(ListItem::new(Line::from(vec![
            Span::raw("  "),
            Span::styled("│ ", edge_style),
            Span::styled(line, body_style),
        ])));
    }

    let bot_dashes = "─".repeat(inner_w.saturating_sub(2));
    items.push(ListItem::new(Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("╰{bot_dashes}╯"), edge_style),
    ])));
}

/// Assistant replies: label on the first row, 8-col indent after. Lines that
/// open with `**…**` get a bold lead, fenced code keeps its whitespace.
fn push_bot_message(items: &mut Vec<ListItem<'static>>, text: &str, term_width: u16, selected: bool) {
    let wrap_width = (term_width as usize).saturating_sub(8).max(20);
    let label_fg = Color::Rgb(0, 210, 210);
    let text_fg  = Color::Rgb(210, 230, 255);
    let code_fg  = Color::Rgb(170, 200, 150);
    let fence_fg = Color::Rgb(70, 70, 95);

    let margin = || {
        if selected {
            Span::styled("▌ ", Style::default().fg(SELECT_FG))
        } else {
            Span::raw("  ")
        }
    };

    let mut rows: Vec<Vec<Span<'static>>> = Vec::new();
    let mut in_code = false;
    let src_lines: Vec<&str> = if text.is_empty() { vec![""] } else { text.lines().collect() };

    for src_line in src_lines {
        if src_line.trim_start().starts_with("```") {
            in_code = !in_code;
            rows.push(vec![Span::styled(src_line.to_string(), Style::default().fg(fence_fg))]);
            continue;
        }
        if in_code {
            for w in hard_wrap(src_line, wrap_width) {
                rows.push(vec![Span::styled(w, Style::default().fg(code_fg))]);
            }
            continue;
        }

        let (lead, rest) = split_bold(src_line);
        let plain = format!("{lead}{rest}");
        for (n, w) in wrap_text(&plain, wrap_width).into_iter().enumerate() {
            if n == 0 && !lead.is_empty() && w.starts_with(lead) {
                let tail = w[lead.len()..].to_string();
                rows.push(vec![
                    Span::styled(lead.to_string(), Style::default().fg(text_fg).add_modifier(Modifier::BOLD)),
                    Span::styled(tail, Style::default().fg(text_fg)),
                ]);
            } else {
                rows.push(vec![Span::styled(w, Style::default().fg(text_fg))]);
            }
        }
    }

    for (n, body) in rows.into_iter().enumerate() {
        let mut spans = vec![margin()];
        if n == 0 {
            spans.push(Span::styled("bot", Style::default().fg(label_fg).add_modifier(Modifier::BOLD)));
            spans.push(Span::raw("   "));
        } else {
            spans.push(Span::raw("      "));
        }
        spans.extend(body);
        items.push(ListItem::new(Line::from(spans)));
    }
}

fn push_empty_hint(items: &mut Vec<ListItem<'static>>, url: &str) {
    let dim = Style::default().fg(Color::Rgb(90, 90, 120));
    let key = Style::default().fg(Color::Rgb(160, 140, 255));
    items.push(ListItem::new(Line::raw("")));
    if url.is_empty() {
        items.push(ListItem::new(Line::from(vec![
            Span::styled("  Open a repository to start:  ", dim),
            Span::styled("/open owner/name", key),
        ])));
        items.push(ListItem::new(Line::from(vec![
            Span::styled("  Continue an earlier conversation:  ", dim),
            Span::styled("Ctrl+H", key),
        ])));
    } else {
        items.push(ListItem::new(Line::from(vec![
            Span::styled("  Ask anything about ", dim),
            Span::styled(url.to_string(), key),
        ])));
    }
}

/// `("Error:", " rest")` for `"**Error:** rest"`, `("", line)` otherwise.
fn split_bold(line: &str) -> (&str, &str) {
    line.strip_prefix("**")
        .and_then(|rest| rest.find("**").map(|end| (&rest[..end], &rest[end + 2..])))
        .unwrap_or(("", line))
}

// ── Draw functions ─────────────────────────────────────────────────────────────

pub fn draw_history(f: &mut Frame, state: &AppState, area: Rect) {
    let all_items = build_items(state, area.width);
    let total = all_items.len();
    let visible = area.height as usize;

    let skip = if total > visible {
        (total - visible).saturating_sub(state.scroll)
    } else {
        0
    };

    let sliced: Vec<ListItem<'static>> = all_items.into_iter().skip(skip).collect();
    let list = List::new(sliced)
        .block(Block::default().style(Style::default().bg(Color::Rgb(8, 8, 14))));
    f.render_widget(list, area);
}

/// One-line chip for the pending quote.
pub fn draw_quote_chip(f: &mut Frame, state: &AppState, area: Rect) {
    let Some(quote) = state.controller.session().pending_quote.as_deref() else {
        return;
    };
    let hint = " Ctrl+X to drop ";
    let room = (area.width as usize).saturating_sub(4 + 4 + hint.width());
    let first = quote.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    let more = quote.lines().filter(|l| !l.trim().is_empty()).count() > 1;
    let mut preview = truncate_end(first, room);
    if more && preview.width() < room {
        preview.push('…');
    }
    let spans = vec![
        Span::styled(" ❝ ", Style::default().fg(SELECT_FG)),
        Span::styled(format!(" {preview} ✕ "), Style::default().fg(Color::Black).bg(Color::Rgb(200, 170, 80))),
        Span::styled(hint, Style::default().fg(Color::DarkGray)),
    ];
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ── Utilities ──────────────────────────────────────────────────────────────────

/// Word-wrap a single line of text to `max_width` columns.
/// Splits on whitespace; never truncates mid-word unless the word alone exceeds max_width.
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;

    for word in text.split_whitespace() {
        let word_width = word.width();
        if current_width == 0 {
            current.push_str(word);
            current_width = word_width;
        } else if current_width + 1 + word_width <= max_width {
            current.push(' ');
            current.push_str(word);
            current_width += 1 + word_width;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_width = word_width;
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Column-exact wrap that keeps whitespace (code blocks).
pub fn hard_wrap(text: &str, max_width: usize) -> Vec<String> {
    let mut lines = vec![String::new()];
    let mut width = 0usize;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if width + w > max_width && width > 0 {
            lines.push(String::new());
            width = 0;
        }
        if let Some(last) = lines.last_mut() {
            last.push(c);
        }
        width += w;
    }
    lines
}

/// Keep the head of `text` within `max` columns, ending in `…` when cut.
pub fn truncate_end(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut width = 1;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if width + w > max {
            break;
        }
        width += w;
        out.push(c);
    }
    out.push('…');
    out
}
