use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;
use unicode_width::UnicodeWidthStr;

use super::board_view::truncate;
use super::theme::Theme;
use crate::app::{AppState, Mode, NotificationLevel};
use crate::board::persist::BoardSession;
use crate::board::Board;

fn badge(text: String) -> Span<'static> {
    Span::styled(
        text,
        Style::default().fg(Theme::FG).add_modifier(Modifier::BOLD | Modifier::REVERSED),
    )
}

pub fn render_status_bar(f: &mut Frame, area: Rect, state: &AppState, session: &BoardSession) {
    // Input and Confirm take over the entire bar
    if let Some(line) = render_full_line_mode(state) {
        f.render_widget(Paragraph::new(line).style(Theme::status_style()), area);
        return;
    }

    let board = session.board();
    let left = build_left_zone(state, board);
    let right = build_right_zone(state, session);

    let left_width: usize = left.iter().map(|s| s.content.width()).sum();
    let right_width: usize = right.iter().map(|s| s.content.width()).sum();
    let center_avail = (area.width as usize).saturating_sub(left_width + right_width);

    let mut spans = left;
    spans.extend(build_center_zone(state, center_avail));
    spans.extend(right);
    f.render_widget(Paragraph::new(Line::from(spans)).style(Theme::status_style()), area);
}

/// Mode badge, project name, and the task in hand while carrying.
fn build_left_zone<'a>(state: &AppState, board: &'a Board) -> Vec<Span<'a>> {
    let mode_str = match &state.mode {
        Mode::Normal => "NORMAL",
        Mode::Carrying { .. } => "MOVE",
        Mode::TaskDetail { .. } => "DETAIL",
        Mode::Help => "HELP",
        Mode::Input { .. } | Mode::Confirm { .. } => "",
    };
    let mut spans = vec![
        badge(format!(" {mode_str} ")),
        Span::raw(" "),
        Span::styled(format!("{} ", board.name), Theme::dim_style()),
    ];
    if let Some(task) = state.carried().and_then(|id| board.task(id)) {
        spans.push(Span::styled(
            format!("[{}] ", truncate(&task.title, 24)),
            Style::default().fg(Theme::DROP_MARKER),
        ));
    }
    spans
}

/// Focused cell, position within it, and writes still in flight.
fn build_right_zone(state: &AppState, session: &BoardSession) -> Vec<Span<'static>> {
    let board = session.board();
    let mut spans = Vec::new();

    if let Some(cell) = state.focused_cell(board) {
        let count = state.visible_tasks(board, cell).len();
        let pos = if count > 0 && state.carried().is_none() {
            format!(" {}/{}", state.selected_task + 1, count)
        } else {
            format!(" {count}")
        };
        spans.push(Span::styled(board.cell_label(cell), Theme::dim_style()));
        spans.push(Span::raw(pos));
    }

    let pending = session.in_flight();
    if pending > 0 {
        spans.push(Span::styled(
            format!(" saving {pending}…"),
            Style::default().fg(Theme::SAVING),
        ));
    }

    spans.push(Span::raw(" "));
    spans
}

/// Notification text centered in the available width.
fn build_center_zone(state: &AppState, avail_width: usize) -> Vec<Span<'_>> {
    let Some(notif) = state.notification.as_deref() else {
        return vec![Span::raw(" ".repeat(avail_width))];
    };
    let color = match state.notification_level {
        NotificationLevel::Info => Theme::FG,
        NotificationLevel::Error => Theme::STATUS_ERROR,
    };
    let notif_width = notif.width();
    if notif_width >= avail_width {
        return vec![Span::styled(truncate(notif, avail_width), Style::default().fg(color))];
    }

    let pad_total = avail_width - notif_width;
    let pad_left = pad_total / 2;
    vec![
        Span::raw(" ".repeat(pad_left)),
        Span::styled(notif, Style::default().fg(color)),
        Span::raw(" ".repeat(pad_total - pad_left)),
    ]
}

fn render_full_line_mode(state: &AppState) -> Option<Line<'_>> {
    match &state.mode {
        Mode::Input { prompt, buf, .. } => Some(Line::from(vec![
            badge(format!(" {prompt} ")),
            Span::raw(format!(" {}", buf.input)),
            Span::raw("_"),
        ])),
        Mode::Confirm { prompt, .. } => Some(Line::from(badge(format!(" {prompt} (y/n) ")))),
        _ => None,
    }
}
