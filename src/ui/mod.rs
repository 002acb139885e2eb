pub mod board_view;
pub mod help;
pub mod status_bar;
pub mod task_detail;
pub mod theme;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::Frame;

use crate::app::{AppState, Mode};
use crate::board::persist::BoardSession;

/// Create a centered rect within `area` using percentage-based sizing with minimums.
pub fn centered_rect(area: Rect, w_pct: u16, h_pct: u16, min_w: u16, min_h: u16) -> Rect {
    let width = (area.width * w_pct / 100).max(min_w).min(area.width);
    let height = (area.height * h_pct / 100).max(min_h).min(area.height);
    let x = area.x + (area.width - width) / 2;
    let y = area.y + (area.height - height) / 2;
    Rect::new(x, y, width, height)
}

pub fn render(f: &mut Frame, session: &BoardSession, state: &AppState) {
    let board = session.board();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(f.area());

    board_view::render_board(f, chunks[0], board, state);
    status_bar::render_status_bar(f, chunks[1], state, session);

    match &state.mode {
        Mode::TaskDetail { scroll } => {
            if let Some(task) = state.selected_task_ref(board) {
                task_detail::render_task_detail(f, f.area(), board, task, *scroll);
            }
        }
        Mode::Help => help::render_help(f, f.area()),
        _ => {}
    }
}
