use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState};
use ratatui::Frame;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use super::theme::Theme;
use crate::app::AppState;
use crate::board::{Board, CellKey, Task};

/// Minimum height of a swimlane: borders plus two task rows.
const LANE_MIN_HEIGHT: u16 = 4;

/// Truncate `text` to `width` display columns, ending in `…` when cut.
/// Cuts on grapheme boundaries so wide and combined characters stay intact.
pub(crate) fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let avail = width.saturating_sub(1);
    let mut used = 0;
    let mut out: String = text
        .graphemes(true)
        .take_while(|g| {
            used += g.width();
            used <= avail
        })
        .collect();
    if width > 0 {
        out.push('…');
    }
    out
}

/// First lane to draw so that `focused` is inside a window of `visible`
/// lanes out of `total`.
pub(crate) fn lane_offset(total: usize, visible: usize, focused: usize) -> usize {
    if visible == 0 || total <= visible {
        return 0;
    }
    let max_offset = total - visible;
    focused.saturating_sub(visible - 1).min(max_offset)
}

pub fn render_board(f: &mut Frame, area: Rect, board: &Board, state: &AppState) {
    if board.members.is_empty() || board.statuses.is_empty() {
        let msg = if board.members.is_empty() {
            "This project has no members. Add one with `taskmatrix member add`."
        } else {
            "No statuses configured. Add [[statuses]] to config.toml."
        };
        f.render_widget(Paragraph::new(msg).style(Theme::dim_style()), area);
        return;
    }

    let index = board.index();
    let unplaced = index.unplaced();

    let mut constraints = vec![Constraint::Length(1), Constraint::Min(LANE_MIN_HEIGHT)];
    if !unplaced.is_empty() {
        constraints.push(Constraint::Length(1));
    }
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    render_status_header(f, chunks[0], board, state);

    let lanes_area = chunks[1];
    let visible = ((lanes_area.height / LANE_MIN_HEIGHT) as usize).clamp(1, board.members.len());
    let offset = lane_offset(board.members.len(), visible, state.focused_row);
    let lane_areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Ratio(1, visible as u32); visible])
        .split(lanes_area);

    for (slot, row) in (offset..offset + visible).enumerate() {
        render_lane(f, lane_areas[slot], board, state, row);
    }

    if board.members.len() > visible {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight);
        let mut scrollbar_state = ScrollbarState::new(board.members.len() - visible + 1).position(offset);
        f.render_stateful_widget(scrollbar, lanes_area, &mut scrollbar_state);
    }

    if let Some(&footer) = chunks.get(2) {
        let ids: Vec<String> = unplaced.iter().map(|t| format!("#{}", t.id)).collect();
        let text = format!(
            " {} task{} outside the board: {}",
            unplaced.len(),
            if unplaced.len() == 1 { "" } else { "s" },
            ids.join(" ")
        );
        let line = Line::from(Span::styled(
            truncate(&text, footer.width as usize),
            Style::default().fg(Theme::UNPLACED),
        ));
        f.render_widget(Paragraph::new(line), footer);
    }
}

fn status_columns(area: Rect, count: usize) -> std::rc::Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(vec![Constraint::Ratio(1, count as u32); count])
        .split(area)
}

fn render_status_header(f: &mut Frame, area: Rect, board: &Board, state: &AppState) {
    let cols = status_columns(area, board.statuses.len());
    for (i, status) in board.statuses.iter().enumerate() {
        let mut style = Style::default().fg(Theme::LANE_HEADER).add_modifier(Modifier::BOLD);
        if i == state.focused_col {
            style = style.add_modifier(Modifier::UNDERLINED);
        }
        let text = truncate(&status.name, cols[i].width.saturating_sub(1) as usize);
        f.render_widget(Paragraph::new(Line::from(Span::styled(format!(" {text}"), style))), cols[i]);
    }
}

fn render_lane(f: &mut Frame, area: Rect, board: &Board, state: &AppState, row: usize) {
    let member = &board.members[row];
    let is_focused = row == state.focused_row;
    let title_style = if is_focused {
        Style::default().fg(Theme::LANE_HEADER).add_modifier(Modifier::BOLD)
    } else {
        Theme::dim_style()
    };
    let cols = status_columns(area, board.statuses.len());
    for (col, status) in board.statuses.iter().enumerate() {
        let cell = CellKey::new(member.id, status.id);
        let focused = is_focused && col == state.focused_col;
        let title = (col == 0).then(|| Span::styled(format!(" {} ", member.name), title_style));
        render_cell(f, cols[col], state.visible_tasks(board, cell), state, focused, title);
    }
}

fn render_cell(
    f: &mut Frame,
    area: Rect,
    tasks: Vec<&Task>,
    state: &AppState,
    focused: bool,
    title: Option<Span<'_>>,
) {
    let carrying = state.carried().is_some();
    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_type(if focused { BorderType::Thick } else { BorderType::Rounded })
        .border_style(Style::default().fg(if focused { Theme::CELL_FOCUSED_BORDER } else { Theme::CELL_BORDER }));
    if let Some(title) = title {
        block = block.title(title);
    }
    if !tasks.is_empty() {
        block = block.title_bottom(Line::from(Span::styled(format!(" {} ", tasks.len()), Theme::dim_style())).right_aligned());
    }
    let inner = block.inner(area);
    f.render_widget(block, area);
    if inner.height == 0 || inner.width < 3 {
        return;
    }

    let width = inner.width as usize;
    let mut lines: Vec<Line> = Vec::with_capacity(tasks.len() + 1);
    let mut cursor_line = 0;
    for (i, task) in tasks.iter().enumerate() {
        if focused && carrying && i == state.selected_task {
            cursor_line = lines.len();
            lines.push(drop_marker(width));
        }
        let selected = focused && !carrying && i == state.selected_task;
        if selected {
            cursor_line = lines.len();
        }
        lines.push(task_line(task, width, selected));
    }
    if focused && carrying && state.selected_task >= tasks.len() {
        cursor_line = lines.len();
        lines.push(drop_marker(width));
    }

    let height = inner.height as usize;
    let scroll = cursor_line.saturating_sub(height.saturating_sub(1));
    f.render_widget(Paragraph::new(lines).scroll((scroll as u16, 0)), inner);
}

fn task_line(task: &Task, width: usize, selected: bool) -> Line<'static> {
    let priority = task.priority();
    let glyph = Span::styled(
        format!("{} ", Theme::priority_glyph(priority)),
        Style::default().fg(Theme::priority_color(priority)),
    );
    let mut style = Style::default().fg(Theme::TASK_TITLE);
    if selected {
        style = style.add_modifier(Modifier::REVERSED | Modifier::BOLD);
    }
    let title = truncate(&task.title, width.saturating_sub(2));
    Line::from(vec![glyph, Span::styled(title, style)])
}

fn drop_marker(width: usize) -> Line<'static> {
    let label = "▸ drop here ";
    let fill = width.saturating_sub(label.width());
    Line::from(Span::styled(
        format!("{label}{}", "─".repeat(fill)),
        Style::default().fg(Theme::DROP_MARKER).add_modifier(Modifier::BOLD),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Mode;
    use crate::board::test_support::{board, task};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn screen(board: &Board, state: &AppState, w: u16, h: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(w, h)).unwrap();
        terminal.draw(|f| render_board(f, f.area(), board, state)).unwrap();
        let buf = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..h {
            for x in 0..w {
                out.push_str(buf[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn truncate_short_text_unchanged() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 5), "hello");
    }

    #[test]
    fn truncate_adds_ellipsis() {
        assert_eq!(truncate("hello world", 6), "hello…");
    }

    #[test]
    fn truncate_wide_characters() {
        // Each CJK character is two columns wide.
        assert_eq!(truncate("日本語テキスト", 7), "日本語…");
    }

    #[test]
    fn truncate_zero_width() {
        assert_eq!(truncate("hello", 0), "");
    }

    #[test]
    fn lane_offset_keeps_focus_visible() {
        assert_eq!(lane_offset(3, 5, 2), 0);
        assert_eq!(lane_offset(10, 3, 0), 0);
        assert_eq!(lane_offset(10, 3, 2), 0);
        assert_eq!(lane_offset(10, 3, 3), 1);
        assert_eq!(lane_offset(10, 3, 9), 7);
    }

    #[test]
    fn renders_members_statuses_and_tasks() {
        let mut t = task(1, (1, 2));
        t.title = "Write docs".into();
        let b = board(&[1, 2], &[1, 2], vec![t]);
        let out = screen(&b, &AppState::new(), 60, 12);
        assert!(out.contains("status 1"));
        assert!(out.contains("member 2"));
        assert!(out.contains("Write docs"));
        assert!(!out.contains("outside the board"));
    }

    #[test]
    fn shows_drop_marker_while_carrying() {
        let b = board(&[1], &[1, 2], vec![task(1, (1, 1)), task(2, (1, 2))]);
        let mut state = AppState::new();
        state.mode = Mode::Carrying { task_id: 1, origin: CellKey::new(1, 1), origin_index: 0 };
        state.focused_col = 1;
        state.selected_task = 1;
        let out = screen(&b, &state, 60, 10);
        assert!(out.contains("drop here"));
        assert!(!out.contains("task 1"), "carried task is in hand:\n{out}");
        assert!(out.contains("task 2"));
    }

    #[test]
    fn lists_unplaced_tasks() {
        let b = board(&[1], &[1], vec![task(1, (1, 1)), task(7, (9, 1))]);
        let out = screen(&b, &AppState::new(), 60, 10);
        assert!(out.contains("1 task outside the board: #7"), "{out}");
    }

    #[test]
    fn empty_board_explains_itself() {
        let b = board(&[], &[1], vec![]);
        let out = screen(&b, &AppState::new(), 80, 3);
        assert!(out.contains("no members"));
    }
}
