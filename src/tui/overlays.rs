/// Overlay/popup draw functions: slash-complete, history browser, model picker, notice, quote button.
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthStr;

use super::chat::truncate_end;
use super::{AppState, HistoryBrowserState, Notice, slash_filtered};
use crate::selection::AFFORDANCE_LABEL;

// ── Slash autocomplete ─────────────────────────────────────────────────────────

pub fn draw_slash_complete(f: &mut Frame, state: &AppState, area: Rect) {
    let matches = slash_filtered(state.input());
    if matches.is_empty() {
        return;
    }

    let count = matches.len() as u16;
    let height = (count + 2).min(18).min(area.height.saturating_sub(4));
    let width = 62u16.min(area.width.saturating_sub(4));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    // Anchor above the input box
    let y = area.y + area.height.saturating_sub(height + 4);
    let popup_area = Rect { x, y, width, height };

    f.render_widget(Clear, popup_area);

    let sel = state.slash_complete_selected;
    let items: Vec<ListItem<'static>> = matches
        .iter()
        .enumerate()
        .map(|(i, cmd)| {
            let (key_style, label_style) = if i == sel {
                (
                    Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD),
                    Style::default().fg(Color::Black).bg(Color::Cyan),
                )
            } else {
                (
                    Style::default().fg(Color::Cyan),
                    Style::default().fg(Color::DarkGray),
                )
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("  {:<16}", cmd.key), key_style),
                Span::styled(cmd.label.to_string(), label_style),
            ]))
        })
        .collect();

    let block = Block::default()
        .title(Span::styled(
            " Commands  ↑↓ navigate  Tab/Enter complete  Esc cancel ",
            Style::default().fg(Color::DarkGray),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(popup_area);
    f.render_widget(block, popup_area);

    // Scroll to keep selected visible
    let visible = inner.height as usize;
    let skip = if sel >= visible { sel - visible + 1 } else { 0 };

    let visible_items: Vec<ListItem<'static>> =
        items.into_iter().skip(skip).take(visible).collect();
    f.render_widget(List::new(visible_items), inner);
}

// ── History browser ────────────────────────────────────────────────────────────

pub fn draw_history_browser(f: &mut Frame, browser: &HistoryBrowserState, area: Rect) {
    let width = 72u16.min(area.width.saturating_sub(4));
    let height = 20u16.min(area.height.saturating_sub(4));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let popup_area = Rect { x, y, width, height };

    f.render_widget(Clear, popup_area);

    let block = Block::default()
        .title(Span::styled(
            " Repository History ",
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Rgb(110, 90, 200)));

    let inner = block.inner(popup_area);
    f.render_widget(block, popup_area);

    // Footer hint
    let hint_area = Rect {
        x: inner.x,
        y: inner.y + inner.height.saturating_sub(1),
        width: inner.width,
        height: 1,
    };
    let list_area = Rect {
        height: inner.height.saturating_sub(1),
        ..inner
    };

    if browser.entries.is_empty() {
        f.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled("  no repositories yet", Style::default().fg(Color::DarkGray)),
            ])),
            list_area,
        );
    } else {
        let name_width = (inner.width as usize).saturating_sub(36).max(12);
        let items: Vec<ListItem<'static>> = browser
            .entries
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let selected = i == browser.selected;
                let date_str = record
                    .last_accessed
                    .with_timezone(&chrono::Local)
                    .format("%b %d %H:%M")
                    .to_string();
                let name = truncate_end(record.display_name(), name_width);
                let pad = name_width.saturating_sub(name.width());

                let (bg, date_fg, name_fg, meta_fg) = if selected {
                    (
                        Color::Rgb(40, 35, 70),
                        Color::Rgb(160, 140, 255),
                        Color::White,
                        Color::Rgb(200, 195, 240),
                    )
                } else {
                    (
                        Color::Reset,
                        Color::Rgb(100, 90, 160),
                        Color::Rgb(180, 180, 220),
                        Color::DarkGray,
                    )
                };

                ListItem::new(Line::from(vec![
                    Span::styled(format!("  {date_str}  "), Style::default().fg(date_fg).bg(bg)),
                    Span::styled(
                        format!("{name}{}  ", " ".repeat(pad)),
                        Style::default().fg(name_fg).bg(bg).add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!("{} files  ", record.file_count),
                        Style::default().fg(Color::Rgb(110, 90, 200)).bg(bg),
                    ),
                    Span::styled(
                        format!("{} msgs", record.transcript.len()),
                        Style::default().fg(meta_fg).bg(bg),
                    ),
                ]))
            })
            .collect();

        // Scroll to keep selected in view
        let visible = list_area.height as usize;
        let skip = if browser.selected >= visible {
            browser.selected - visible + 1
        } else {
            0
        };
        let sliced: Vec<ListItem<'static>> = items.into_iter().skip(skip).collect();
        f.render_widget(List::new(sliced), list_area);
    }

    let key_fg = Color::Rgb(160, 140, 255);
    let hint = if browser.confirm_clear {
        Line::from(vec![
            Span::styled("  Delete all history?  ", Style::default().fg(Color::Rgb(220, 100, 60))),
            Span::styled("y", Style::default().fg(key_fg)),
            Span::styled(" yes  ", Style::default().fg(Color::DarkGray)),
            Span::styled("any key", Style::default().fg(key_fg)),
            Span::styled(" no", Style::default().fg(Color::DarkGray)),
        ])
    } else {
        Line::from(vec![
            Span::styled("  ↑↓ navigate  ", Style::default().fg(Color::DarkGray)),
            Span::styled("Enter", Style::default().fg(key_fg)),
            Span::styled(" open  ", Style::default().fg(Color::DarkGray)),
            Span::styled("c", Style::default().fg(key_fg)),
            Span::styled(" clear all  ", Style::default().fg(Color::DarkGray)),
            Span::styled("Esc", Style::default().fg(key_fg)),
            Span::styled(" close", Style::default().fg(Color::DarkGray)),
        ])
    };
    f.render_widget(Paragraph::new(hint), hint_area);
}

// ── Model picker ───────────────────────────────────────────────────────────────

pub fn draw_model_picker(f: &mut Frame, state: &AppState, area: Rect) {
    let entries = &state.resolved.models;
    if entries.is_empty() {
        return;
    }

    let count = entries.len() as u16;
    let height = (count + 2).min(16).min(area.height.saturating_sub(6));
    let width = 54u16.min(area.width.saturating_sub(4));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let popup_area = Rect { x, y, width, height };

    f.render_widget(Clear, popup_area);

    let sel = state.model_picker_selected;
    let items: Vec<ListItem<'static>> = entries
        .iter()
        .enumerate()
        .map(|(i, model)| {
            let active = model.id == state.resolved.model;
            let marker = if active { " ← " } else { "   " };
            let (name_style, id_style) = if i == sel {
                (
                    Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD),
                    Style::default().fg(Color::Black).bg(Color::Cyan),
                )
            } else if active {
                (
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    Style::default().fg(Color::Rgb(100, 180, 220)),
                )
            } else {
                (
                    Style::default().fg(Color::White),
                    Style::default().fg(Color::DarkGray),
                )
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("  {:<18}", model.name), name_style),
                Span::styled(model.id.clone(), id_style),
                Span::styled(marker.to_string(), name_style),
            ]))
        })
        .collect();

    let block = Block::default()
        .title(Span::styled(
            " Model  ↑↓ navigate  Enter select  Esc cancel ",
            Style::default().fg(Color::DarkGray),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(popup_area);
    f.render_widget(block, popup_area);

    let visible = inner.height as usize;
    let skip = if sel >= visible { sel - visible + 1 } else { 0 };

    let visible_items: Vec<ListItem<'static>> =
        items.into_iter().skip(skip).take(visible).collect();
    f.render_widget(List::new(visible_items), inner);
}

// ── Notice ─────────────────────────────────────────────────────────────────────

pub fn draw_notice(f: &mut Frame, notice: &Notice, area: Rect) {
    let width = 70u16.min(area.width.saturating_sub(4));
    let body_lines = notice.body.lines().count() as u16;
    let height = (body_lines + 4).min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let popup_area = Rect { x, y, width, height };

    f.render_widget(Clear, popup_area);

    let block = Block::default()
        .title(Span::styled(
            format!(" {} ", notice.title),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Rgb(110, 90, 200)));

    let inner = block.inner(popup_area);
    f.render_widget(block, popup_area);

    let hint_area = Rect {
        x: inner.x,
        y: inner.y + inner.height.saturating_sub(1),
        width: inner.width,
        height: 1,
    };
    let body_area = Rect {
        height: inner.height.saturating_sub(1),
        ..inner
    };

    let body: Vec<Line<'static>> = notice
        .body
        .lines()
        .map(|l| Line::from(Span::styled(format!(" {l}"), Style::default().fg(Color::Rgb(210, 210, 230)))))
        .collect();
    f.render_widget(Paragraph::new(body).wrap(Wrap { trim: false }), body_area);
    f.render_widget(
        Paragraph::new(Span::styled(" any key to close", Style::default().fg(Color::DarkGray))),
        hint_area,
    );
}

// ── Quote affordance ───────────────────────────────────────────────────────────

/// Floating button just above the live selection.
pub fn draw_quote_affordance(f: &mut Frame, state: &AppState, area: Rect) {
    let Some(anchor) = state.tracker.affordance() else {
        return;
    };
    let width = (AFFORDANCE_LABEL.width() as u16).min(area.width);
    let x = anchor.left.min(area.x + area.width.saturating_sub(width));
    let y = anchor.top.min(area.y + area.height.saturating_sub(1));
    let button = Rect { x, y, width, height: 1 };

    f.render_widget(Clear, button);
    f.render_widget(
        Paragraph::new(Span::styled(
            AFFORDANCE_LABEL,
            Style::default().fg(Color::Black).bg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
        button,
    );
}
