/// Repository sidebar: model, repository status, index stats and file tree.
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
};

use super::AppState;
use super::chat::{SPINNER_GLYPHS, truncate_end};
use super::render::phase_label;
use crate::session::StatsView;
use crate::store::display_name;
use crate::tree::DEFAULT_EXPANDED_DEPTH;

pub fn draw_sidebar(f: &mut Frame, state: &AppState, area: Rect) {
    let block = Block::default()
        .borders(Borders::RIGHT)
        .border_style(Style::default().fg(Color::Rgb(40, 38, 60)))
        .style(Style::default().bg(Color::Rgb(6, 6, 12)));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let w = inner.width as usize;
    let session = state.controller.session();
    let heading = Style::default().fg(Color::Rgb(100, 95, 150)).add_modifier(Modifier::BOLD);
    let meta = Style::default().fg(Color::Rgb(70, 67, 100));
    let divider = || {
        ListItem::new(Line::from(Span::styled(
            "─".repeat(w),
            Style::default().fg(Color::Rgb(35, 33, 55)),
        )))
    };

    let mut items: Vec<ListItem<'static>> = Vec::new();

    // Model
    items.push(ListItem::new(Line::from(Span::styled(" Model", heading))));
    items.push(ListItem::new(Line::from(Span::styled(
        format!("  {}", truncate_end(state.resolved.model_name(&state.resolved.model), w.saturating_sub(3))),
        Style::default().fg(Color::Cyan),
    ))));
    items.push(divider());

    // Repository
    items.push(ListItem::new(Line::from(Span::styled(" Repository", heading))));
    if session.url.is_empty() {
        items.push(ListItem::new(Line::from(Span::styled("  none · /open owner/name", meta))));
    } else {
        items.push(ListItem::new(Line::from(Span::styled(
            format!("  {}", truncate_end(display_name(&session.url), w.saturating_sub(3))),
            Style::default().fg(Color::Rgb(150, 145, 190)).add_modifier(Modifier::BOLD),
        ))));
        let (phase, phase_color) = phase_label(session.phase);
        let bullet = if session.is_loading_repo {
            SPINNER_GLYPHS[(state.spinner_tick as usize) % SPINNER_GLYPHS.len()]
        } else {
            "●"
        };
        items.push(ListItem::new(Line::from(vec![
            Span::styled(format!("  {bullet} "), Style::default().fg(phase_color)),
            Span::styled(phase, Style::default().fg(phase_color)),
        ])));
    }

    // Index stats
    if let Some(stats) = &session.stats {
        items.push(divider());
        let cached = if stats.is_speculative() { "  ~ cached" } else { "" };
        items.push(ListItem::new(Line::from(vec![
            Span::styled(format!("  {} files", stats.files_count()), Style::default().fg(Color::Rgb(180, 180, 220))),
            Span::styled(cached, meta),
        ])));
        if let StatsView::Confirmed(confirmed) = stats {
            items.push(ListItem::new(Line::from(Span::styled(
                format!("  {} chunks", confirmed.chunks_count),
                Style::default().fg(Color::Rgb(180, 180, 220)),
            ))));
        }
    }

    // File tree
    if !state.tree.is_empty() {
        items.push(divider());
        items.push(ListItem::new(Line::from(vec![
            Span::styled(" Files", heading),
            Span::styled(format!("  {}", state.tree.leaf_count()), meta),
        ])));
        for row in state.tree.flatten(DEFAULT_EXPANDED_DEPTH) {
            let indent = "  ".repeat(row.depth + 1);
            let (glyph, style) = if row.is_dir {
                let g = if row.expanded { "▾ " } else { "▸ " };
                (g, Style::default().fg(Color::Rgb(110, 90, 200)))
            } else {
                ("", Style::default().fg(Color::Rgb(150, 150, 170)))
            };
            let room = w.saturating_sub(indent.len() + glyph.chars().count());
            items.push(ListItem::new(Line::from(vec![
                Span::raw(indent),
                Span::styled(glyph, style),
                Span::styled(truncate_end(&row.name, room), style),
            ])));
        }
    }

    f.render_widget(List::new(items), inner);
}
