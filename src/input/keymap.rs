use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::action::Action;
use crate::app::Mode;

/// Map a key event to a semantic action based on current mode.
pub fn map_key(key: KeyEvent, mode: &Mode) -> Action {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }
    match mode {
        Mode::Normal => map_normal(key),
        Mode::Carrying { .. } => map_carrying(key),
        Mode::Input { .. } => map_input(key),
        Mode::Confirm { .. } => map_confirm(key),
        Mode::TaskDetail { .. } => match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Enter => Action::ClosePanel,
            KeyCode::Char('p') => Action::CyclePriority,
            KeyCode::Char('j') | KeyCode::Down => Action::DetailScrollDown,
            KeyCode::Char('k') | KeyCode::Up => Action::DetailScrollUp,
            _ => Action::None,
        },
        Mode::Help => match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?') => Action::ClosePanel,
            _ => Action::None,
        },
    }
}

fn map_normal(key: KeyEvent) -> Action {
    match key.code {
        KeyCode::Char('h') | KeyCode::Left => Action::FocusPrevStatus,
        KeyCode::Char('l') | KeyCode::Right => Action::FocusNextStatus,
        KeyCode::Char('j') | KeyCode::Down => Action::SelectNextTask,
        KeyCode::Char('k') | KeyCode::Up => Action::SelectPrevTask,
        KeyCode::Tab => Action::FocusNextMember,
        KeyCode::BackTab => Action::FocusPrevMember,
        KeyCode::Char('m') | KeyCode::Char(' ') => Action::PickUp,
        KeyCode::Enter => Action::OpenTaskDetail,
        KeyCode::Char('n') => Action::NewTask,
        KeyCode::Char('d') => Action::DeleteTask,
        KeyCode::Char('p') => Action::CyclePriority,
        KeyCode::Char('r') => Action::ReloadBoard,
        KeyCode::Char('?') => Action::ShowHelp,
        KeyCode::Char('q') => Action::Quit,
        _ => Action::None,
    }
}

/// While a task is picked up the cursor is the drop target.
fn map_carrying(key: KeyEvent) -> Action {
    match key.code {
        KeyCode::Char('h') | KeyCode::Left => Action::FocusPrevStatus,
        KeyCode::Char('l') | KeyCode::Right => Action::FocusNextStatus,
        KeyCode::Char('j') | KeyCode::Down => Action::SelectNextTask,
        KeyCode::Char('k') | KeyCode::Up => Action::SelectPrevTask,
        KeyCode::Tab => Action::FocusNextMember,
        KeyCode::BackTab => Action::FocusPrevMember,
        KeyCode::Enter | KeyCode::Char('m') | KeyCode::Char(' ') => Action::Drop,
        KeyCode::Esc | KeyCode::Char('q') => Action::CancelMove,
        _ => Action::None,
    }
}

fn map_input(key: KeyEvent) -> Action {
    match key.code {
        KeyCode::Enter => Action::InputConfirm,
        KeyCode::Esc => Action::InputCancel,
        KeyCode::Char('a') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::InputHome,
        KeyCode::Char('e') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::InputEnd,
        KeyCode::Char('w') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Action::InputDeleteWord
        }
        KeyCode::Char(c) => Action::InputChar(c),
        KeyCode::Backspace => Action::InputBackspace,
        KeyCode::Left => Action::InputLeft,
        KeyCode::Right => Action::InputRight,
        KeyCode::Home => Action::InputHome,
        KeyCode::End => Action::InputEnd,
        _ => Action::None,
    }
}

fn map_confirm(key: KeyEvent) -> Action {
    match key.code {
        KeyCode::Char('y') | KeyCode::Enter => Action::Confirm,
        KeyCode::Char('n') | KeyCode::Esc => Action::Deny,
        _ => Action::None,
    }
}

// ---------------------------------------------------------------------------
// Binding registry, rendered by the help overlay.
// ---------------------------------------------------------------------------

pub struct Binding {
    pub key: &'static str,
    pub description: &'static str,
}

pub struct BindingGroup {
    pub name: &'static str,
    pub bindings: &'static [Binding],
}

pub const NORMAL_BINDINGS: &[Binding] = &[
    Binding { key: "h / l", description: "Previous/next status" },
    Binding { key: "j / k", description: "Next/previous task" },
    Binding { key: "Tab / S-Tab", description: "Next/previous member" },
    Binding { key: "m / Space", description: "Pick up task" },
    Binding { key: "Enter", description: "Task detail" },
    Binding { key: "n", description: "New task in this cell" },
    Binding { key: "d", description: "Delete task" },
    Binding { key: "p", description: "Cycle priority" },
    Binding { key: "r", description: "Reload board" },
    Binding { key: "?", description: "Help" },
    Binding { key: "q", description: "Quit" },
];

pub const CARRY_BINDINGS: &[Binding] = &[
    Binding { key: "h / l / Tab", description: "Choose target cell" },
    Binding { key: "j / k", description: "Choose position" },
    Binding { key: "Enter", description: "Drop here" },
    Binding { key: "Esc", description: "Put back" },
];

pub const DETAIL_BINDINGS: &[Binding] = &[
    Binding { key: "j / k", description: "Scroll" },
    Binding { key: "p", description: "Cycle priority" },
    Binding { key: "Esc", description: "Close" },
];

pub const HELP_GROUPS: &[BindingGroup] = &[
    BindingGroup { name: "Board", bindings: NORMAL_BINDINGS },
    BindingGroup { name: "Moving a task", bindings: CARRY_BINDINGS },
    BindingGroup { name: "Task Detail", bindings: DETAIL_BINDINGS },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{ConfirmTarget, InputTarget, TextBuffer};
    use crate::board::CellKey;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn carrying() -> Mode {
        Mode::Carrying { task_id: 1, origin: CellKey::new(1, 1), origin_index: 0 }
    }

    #[test]
    fn normal_navigation() {
        assert_eq!(map_key(key(KeyCode::Char('h')), &Mode::Normal), Action::FocusPrevStatus);
        assert_eq!(map_key(key(KeyCode::Right), &Mode::Normal), Action::FocusNextStatus);
        assert_eq!(map_key(key(KeyCode::Char('j')), &Mode::Normal), Action::SelectNextTask);
        assert_eq!(map_key(key(KeyCode::Up), &Mode::Normal), Action::SelectPrevTask);
        assert_eq!(map_key(key(KeyCode::Tab), &Mode::Normal), Action::FocusNextMember);
        assert_eq!(map_key(key(KeyCode::BackTab), &Mode::Normal), Action::FocusPrevMember);
    }

    #[test]
    fn normal_pick_up() {
        assert_eq!(map_key(key(KeyCode::Char('m')), &Mode::Normal), Action::PickUp);
        assert_eq!(map_key(key(KeyCode::Char(' ')), &Mode::Normal), Action::PickUp);
    }

    #[test]
    fn enter_depends_on_mode() {
        assert_eq!(map_key(key(KeyCode::Enter), &Mode::Normal), Action::OpenTaskDetail);
        assert_eq!(map_key(key(KeyCode::Enter), &carrying()), Action::Drop);
    }

    #[test]
    fn carrying_esc_cancels() {
        assert_eq!(map_key(key(KeyCode::Esc), &carrying()), Action::CancelMove);
        assert_eq!(map_key(key(KeyCode::Char('q')), &carrying()), Action::CancelMove);
    }

    #[test]
    fn carrying_ignores_task_commands() {
        for c in ['n', 'd', 'p', 'r'] {
            assert_eq!(map_key(key(KeyCode::Char(c)), &carrying()), Action::None, "{c}");
        }
    }

    #[test]
    fn ctrl_c_quits_everywhere() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_key(ctrl_c, &Mode::Normal), Action::Quit);
        assert_eq!(map_key(ctrl_c, &carrying()), Action::Quit);
        assert_eq!(map_key(ctrl_c, &Mode::Help), Action::Quit);
    }

    #[test]
    fn input_mode_types_characters() {
        let mode = Mode::Input {
            prompt: "New task",
            buf: TextBuffer::empty(),
            on_confirm: InputTarget::NewTask(CellKey::new(1, 1)),
        };
        assert_eq!(map_key(key(KeyCode::Char('q')), &mode), Action::InputChar('q'));
        assert_eq!(map_key(key(KeyCode::Enter), &mode), Action::InputConfirm);
        let ctrl_w = KeyEvent::new(KeyCode::Char('w'), KeyModifiers::CONTROL);
        assert_eq!(map_key(ctrl_w, &mode), Action::InputDeleteWord);
    }

    #[test]
    fn confirm_mode_y_n() {
        let mode = Mode::Confirm { prompt: "Delete task?", on_confirm: ConfirmTarget::DeleteTask(1) };
        assert_eq!(map_key(key(KeyCode::Char('y')), &mode), Action::Confirm);
        assert_eq!(map_key(key(KeyCode::Esc), &mode), Action::Deny);
        assert_eq!(map_key(key(KeyCode::Char('x')), &mode), Action::None);
    }

    #[test]
    fn detail_and_help_close() {
        assert_eq!(map_key(key(KeyCode::Esc), &Mode::TaskDetail { scroll: 0 }), Action::ClosePanel);
        assert_eq!(map_key(key(KeyCode::Char('j')), &Mode::TaskDetail { scroll: 0 }), Action::DetailScrollDown);
        assert_eq!(map_key(key(KeyCode::Char('?')), &Mode::Help), Action::ClosePanel);
    }

    #[test]
    fn help_groups_are_not_empty() {
        assert!(HELP_GROUPS.iter().all(|g| !g.bindings.is_empty()));
    }
}
