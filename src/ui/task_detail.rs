use ratatui::layout::{Margin, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Clear, Padding, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState,
    Wrap,
};
use ratatui::Frame;

use super::theme::Theme;
use crate::board::{Board, Task};

fn field<'a>(label: &'static str, value: impl Into<Span<'a>>) -> Line<'a> {
    Line::from(vec![Span::styled(label, Theme::dim_style()), value.into()])
}

fn detail_lines<'a>(board: &'a Board, task: &'a Task, width: u16) -> Vec<Line<'a>> {
    let mut lines = vec![
        Line::from(Span::styled(
            task.title.as_str(),
            Style::default().fg(Theme::FG).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    let priority = task.priority();
    lines.push(field(
        "Priority: ",
        Span::styled(
            priority.map_or("none", |p| p.as_str()),
            Style::default().fg(Theme::priority_color(priority)),
        ),
    ));
    let status = board
        .status_name(task.status_id)
        .map_or_else(|| format!("#{} (unknown)", task.status_id), str::to_string);
    lines.push(field("Status:   ", status));
    let assignee = board
        .member_name(task.assignee_id)
        .map_or_else(|| format!("#{} (not a member)", task.assignee_id), str::to_string);
    lines.push(field("Assignee: ", assignee));

    if !task.description.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("─".repeat(width as usize), Theme::dim_style())));
        lines.push(Line::from(""));
        lines.extend(task.description.lines().map(Line::from));
    }
    lines
}

pub fn render_task_detail(f: &mut Frame, area: Rect, board: &Board, task: &Task, scroll: u16) {
    let panel_area = super::centered_rect(area, 60, 70, 40, 12);
    f.render_widget(Clear, panel_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Theme::FG))
        .title(Span::styled(
            format!(" #{} ", task.id),
            Style::default().fg(Theme::FG).add_modifier(Modifier::BOLD),
        ))
        .padding(Padding::new(2, 2, 1, 1));

    let inner = block.inner(panel_area);
    f.render_widget(block, panel_area);
    if inner.height == 0 {
        return;
    }

    let lines = detail_lines(board, task, inner.width);
    let max_scroll = (lines.len() as u16).saturating_sub(inner.height);
    let scroll = scroll.min(max_scroll);

    f.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: false }).scroll((scroll, 0)),
        inner,
    );

    if max_scroll > 0 {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(None)
            .end_symbol(None);
        let mut scrollbar_state = ScrollbarState::new(max_scroll as usize + 1).position(scroll as usize);
        let scrollbar_area = panel_area.inner(Margin { vertical: 2, horizontal: 0 });
        f.render_stateful_widget(scrollbar, scrollbar_area, &mut scrollbar_state);
    }
}
