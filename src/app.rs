use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEventKind};
use ratatui::DefaultTerminal;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::api::{ApiClient, ApiError, ProjectTasks};
use crate::board::persist::{
    persist, Applied, BoardSession, PersistReport, PersistRequest, RollbackPolicy, Settlement, TaskStore,
};
use crate::board::resolve::MoveDescriptor;
use crate::board::{Board, CellKey, Priority, Status, Task, TaskPayload};
use crate::input::action::Action;
use crate::input::keymap::map_key;

/// Text editing buffer with cursor.
///
/// `cursor` is a char index, always in `0..=char_count`.
#[derive(Debug, Clone)]
pub struct TextBuffer {
    pub input: String,
    pub cursor: usize,
}

impl TextBuffer {
    pub fn empty() -> Self {
        Self { input: String::new(), cursor: 0 }
    }

    fn byte_offset(&self, char_idx: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_idx)
            .map_or(self.input.len(), |(i, _)| i)
    }

    pub fn insert(&mut self, c: char) {
        let at = self.byte_offset(self.cursor);
        self.input.insert(at, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            let at = self.byte_offset(self.cursor - 1);
            self.input.remove(at);
            self.cursor -= 1;
        }
    }

    /// Delete back to the start of the previous word.
    pub fn delete_word(&mut self) {
        let end = self.byte_offset(self.cursor);
        let start = self.input[..end]
            .trim_end()
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map_or(0, |(i, c)| i + c.len_utf8());
        self.input.drain(start..end);
        self.cursor = self.input[..start].chars().count();
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.input.chars().count();
    }
}

/// Current interaction mode.
#[derive(Debug, Clone)]
pub enum Mode {
    Normal,
    /// A task has been picked up; the cursor chooses where it lands.
    Carrying {
        task_id: i64,
        origin: CellKey,
        origin_index: usize,
    },
    Input {
        prompt: &'static str,
        buf: TextBuffer,
        on_confirm: InputTarget,
    },
    Confirm {
        prompt: &'static str,
        on_confirm: ConfirmTarget,
    },
    TaskDetail {
        scroll: u16,
    },
    Help,
}

#[derive(Debug, Clone)]
pub enum InputTarget {
    NewTask(CellKey),
}

#[derive(Debug, Clone)]
pub enum ConfirmTarget {
    DeleteTask(i64),
}

/// Notification severity for statusbar coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// UI state of the board view.
pub struct AppState {
    pub mode: Mode,
    /// Index into the board's members.
    pub focused_row: usize,
    /// Index into the board's statuses.
    pub focused_col: usize,
    /// Task within the focused cell; while carrying, the drop position.
    pub selected_task: usize,
    pub notification: Option<String>,
    pub notification_level: NotificationLevel,
    pub notification_expires: Option<Instant>,
    pub should_quit: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            mode: Mode::Normal,
            focused_row: 0,
            focused_col: 0,
            selected_task: 0,
            notification: None,
            notification_level: NotificationLevel::Info,
            notification_expires: None,
            should_quit: false,
        }
    }

    pub fn focused_cell(&self, board: &Board) -> Option<CellKey> {
        board.cell_at(self.focused_row, self.focused_col)
    }

    /// The task being carried, if any.
    pub fn carried(&self) -> Option<i64> {
        match self.mode {
            Mode::Carrying { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    /// Tasks of `cell` as shown: the carried task is in hand, not in a cell.
    pub fn visible_tasks<'a>(&self, board: &'a Board, cell: CellKey) -> Vec<&'a Task> {
        let carried = self.carried();
        board
            .tasks
            .iter()
            .filter(|t| t.cell() == cell && Some(t.id) != carried)
            .collect()
    }

    pub fn selected_task_ref<'a>(&self, board: &'a Board) -> Option<&'a Task> {
        let cell = self.focused_cell(board)?;
        self.visible_tasks(board, cell).get(self.selected_task).copied()
    }

    /// Positions the cursor can take in the focused cell. While carrying,
    /// the slot after the last task is a valid drop position.
    fn slot_count(&self, board: &Board) -> usize {
        let Some(cell) = self.focused_cell(board) else {
            return 0;
        };
        let len = self.visible_tasks(board, cell).len();
        if self.carried().is_some() { len + 1 } else { len }
    }

    /// Move the cursor to `cell`, at `index` within it.
    fn focus_cell(&mut self, board: &Board, cell: CellKey, index: usize) {
        if let Some(row) = board.members.iter().position(|m| m.id == cell.assignee_id) {
            self.focused_row = row;
        }
        if let Some(col) = board.statuses.iter().position(|s| s.id == cell.status_id) {
            self.focused_col = col;
        }
        self.selected_task = index;
        self.clamp_selection(board);
    }

    /// Show a transient notification.
    pub fn notify(&mut self, msg: impl Into<String>) {
        self.notification = Some(msg.into());
        self.notification_level = NotificationLevel::Info;
        self.notification_expires = Some(Instant::now() + Duration::from_secs(3));
    }

    /// Show a transient error notification. Errors stay up longer.
    pub fn notify_error(&mut self, msg: impl Into<String>) {
        self.notification = Some(msg.into());
        self.notification_level = NotificationLevel::Error;
        self.notification_expires = Some(Instant::now() + Duration::from_secs(5));
    }

    /// Clear expired notifications.
    pub fn tick_notification(&mut self) {
        if self.notification_expires.is_some_and(|at| Instant::now() >= at) {
            self.notification = None;
            self.notification_level = NotificationLevel::Info;
            self.notification_expires = None;
        }
    }

    /// Keep the focus inside the grid and the selection inside the cell.
    pub fn clamp_selection(&mut self, board: &Board) {
        self.focused_row = self.focused_row.min(board.members.len().saturating_sub(1));
        self.focused_col = self.focused_col.min(board.statuses.len().saturating_sub(1));
        self.selected_task = self.selected_task.min(self.slot_count(board).saturating_sub(1));
    }

    /// After the board changed underneath a carry, re-read where the
    /// carried task now sits so the eventual drop describes the live board.
    fn refresh_carry(&mut self, board: &Board) {
        let Mode::Carrying { task_id, origin, origin_index } = &mut self.mode else {
            return;
        };
        match board.index().locate(*task_id) {
            Some((cell, index)) => {
                *origin = cell;
                *origin_index = index;
            }
            None => {
                self.mode = Mode::Normal;
                self.notify_error("The task you were moving is gone");
            }
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// The service side of the board view.
///
/// Moves are persisted on the runtime in the background and report back
/// through a channel; everything else is a blocking round trip.
pub struct Remote {
    client: ApiClient,
    project_id: i64,
    statuses: Vec<Status>,
    store: Arc<dyn TaskStore>,
    handle: Handle,
    reports: UnboundedSender<PersistReport>,
}

impl Remote {
    pub fn new(
        client: ApiClient,
        project_id: i64,
        statuses: Vec<Status>,
        handle: Handle,
    ) -> (Self, UnboundedReceiver<PersistReport>) {
        let (tx, rx) = unbounded_channel();
        let store: Arc<dyn TaskStore> = Arc::new(ProjectTasks::new(client.clone(), project_id));
        (Self { client, project_id, statuses, store, handle, reports: tx }, rx)
    }

    fn spawn_persist(&self, request: PersistRequest) {
        let store = Arc::clone(&self.store);
        let reports = self.reports.clone();
        self.handle.spawn(async move {
            let report = persist(store.as_ref(), request).await;
            // The receiver is gone only when the view has shut down.
            let _ = reports.send(report);
        });
    }

    pub fn fetch_board(&self) -> Result<Board, ApiError> {
        let detail = self.handle.block_on(self.client.get_project(self.project_id))?;
        Ok(detail.into_board(self.statuses.clone()))
    }

    fn create_task(&self, payload: &TaskPayload) -> Result<Task, ApiError> {
        self.handle.block_on(self.client.create_task(self.project_id, payload))
    }

    fn update_task(&self, task: &Task) -> Result<(), ApiError> {
        let payload = TaskPayload::from(task);
        self.handle
            .block_on(self.client.update_task(self.project_id, task.id, &payload))
            .map(|_| ())
    }

    fn delete_task(&self, task_id: i64) -> Result<(), ApiError> {
        self.handle.block_on(self.client.delete_task(self.project_id, task_id))
    }
}

/// Everything the board view works on.
pub struct App {
    pub session: BoardSession,
    remote: Remote,
    reports: UnboundedReceiver<PersistReport>,
}

impl App {
    pub fn new(board: Board, policy: RollbackPolicy, remote: Remote, reports: UnboundedReceiver<PersistReport>) -> Self {
        Self { session: BoardSession::new(board, policy), remote, reports }
    }

    /// Give in-flight writes up to `limit` to finish before the view exits.
    fn finish_writes(&mut self, limit: Duration) {
        let deadline = Instant::now() + limit;
        while self.session.in_flight() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let next = self
                .remote
                .handle
                .block_on(tokio::time::timeout(remaining, self.reports.recv()));
            match next {
                Ok(Some(report)) => {
                    self.session.settle(report);
                }
                _ => break,
            }
        }
        if self.session.in_flight() > 0 {
            tracing::warn!(pending = self.session.in_flight(), "exiting with unsettled writes");
        }
    }
}

/// Main TUI loop.
pub fn run(terminal: &mut DefaultTerminal, mut app: App) -> color_eyre::Result<()> {
    let mut state = AppState::new();
    state.clamp_selection(app.session.board());
    tracing::info!(project_id = app.session.board().project_id, "board view opened");

    loop {
        state.tick_notification();
        drain_reports(&mut app, &mut state);

        terminal.draw(|f| crate::ui::render(f, &app.session, &state))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let action = map_key(key, &state.mode);
                process_action(&mut app, &mut state, action);

                if state.should_quit {
                    break;
                }
            }
        }
    }

    app.finish_writes(Duration::from_secs(3));
    Ok(())
}

fn drain_reports(app: &mut App, state: &mut AppState) {
    while let Ok(report) = app.reports.try_recv() {
        apply_report(app, state, report);
    }
}

/// Fold one finished write into the board and tell the user how it went.
fn apply_report(app: &mut App, state: &mut AppState, report: PersistReport) {
    let task_id = report.task_id;
    match app.session.settle(report) {
        Settlement::Confirmed | Settlement::Stale => {}
        Settlement::Kept(e) => state.notify_error(format!("{e} (left on board)")),
        Settlement::Restored(e) => state.notify_error(format!("{e}; move undone")),
        Settlement::Reverted(e) => state.notify_error(format!("{e}; task {task_id} moved back")),
        Settlement::Superseded(e) => state.notify_error(format!("{e}; a newer move is still saving")),
    }
    let board = app.session.board();
    state.refresh_carry(board);
    state.clamp_selection(board);
}

fn process_action(app: &mut App, state: &mut AppState, action: Action) {
    match action {
        Action::None => {}

        Action::FocusPrevStatus
        | Action::FocusNextStatus
        | Action::FocusPrevMember
        | Action::FocusNextMember
        | Action::SelectPrevTask
        | Action::SelectNextTask => {
            handle_navigation(app.session.board(), state, action);
        }

        Action::PickUp | Action::Drop | Action::CancelMove => {
            handle_move(app, state, action);
        }

        Action::NewTask
        | Action::DeleteTask
        | Action::CyclePriority
        | Action::OpenTaskDetail
        | Action::ClosePanel
        | Action::DetailScrollUp
        | Action::DetailScrollDown => {
            handle_task_action(app, state, action);
        }

        Action::InputChar(_)
        | Action::InputBackspace
        | Action::InputLeft
        | Action::InputRight
        | Action::InputHome
        | Action::InputEnd
        | Action::InputDeleteWord
        | Action::InputConfirm
        | Action::InputCancel => {
            handle_input(app, state, action);
        }

        Action::Confirm | Action::Deny => {
            handle_confirm(app, state, action);
        }

        Action::ReloadBoard => {
            state.mode = Mode::Normal;
            match app.remote.fetch_board() {
                Ok(board) => {
                    app.session.replace(board);
                    state.clamp_selection(app.session.board());
                    state.notify("Board reloaded");
                }
                Err(e) => state.notify_error(format!("Reload failed: {e}")),
            }
        }
        Action::ShowHelp => state.mode = Mode::Help,
        Action::Quit => match &state.mode {
            Mode::Normal => state.should_quit = true,
            Mode::Carrying { .. } => handle_move(app, state, Action::CancelMove),
            _ => state.mode = Mode::Normal,
        },
    }
}

// ---------------------------------------------------------------------------
// Handler: Navigation (member rows, status columns, task selection)
// ---------------------------------------------------------------------------

fn handle_navigation(board: &Board, state: &mut AppState, action: Action) {
    match action {
        Action::FocusPrevStatus => {
            state.focused_col = state.focused_col.saturating_sub(1);
        }
        Action::FocusNextStatus => {
            if state.focused_col + 1 < board.statuses.len() {
                state.focused_col += 1;
            }
        }
        Action::FocusPrevMember => {
            if state.focused_row > 0 {
                state.focused_row -= 1;
            } else {
                state.focused_row = board.members.len().saturating_sub(1);
            }
        }
        Action::FocusNextMember => {
            if state.focused_row + 1 < board.members.len() {
                state.focused_row += 1;
            } else {
                state.focused_row = 0;
            }
        }
        Action::SelectPrevTask => {
            state.selected_task = state.selected_task.saturating_sub(1);
        }
        Action::SelectNextTask => {
            if state.selected_task + 1 < state.slot_count(board) {
                state.selected_task += 1;
            }
        }
        _ => unreachable!(),
    }
    state.clamp_selection(board);
}

// ---------------------------------------------------------------------------
// Handler: Pick up / drop / cancel
// ---------------------------------------------------------------------------

fn handle_move(app: &mut App, state: &mut AppState, action: Action) {
    match action {
        Action::PickUp => {
            let board = app.session.board();
            let (Some(cell), Some(task)) = (state.focused_cell(board), state.selected_task_ref(board)) else {
                return;
            };
            let title = task.title.clone();
            state.mode = Mode::Carrying { task_id: task.id, origin: cell, origin_index: state.selected_task };
            state.notify(format!("Moving \"{title}\""));
        }
        Action::Drop => {
            let Mode::Carrying { task_id, origin, origin_index } = state.mode.clone() else {
                return;
            };
            let Some(target) = state.focused_cell(app.session.board()) else {
                return handle_move(app, state, Action::CancelMove);
            };
            state.mode = Mode::Normal;

            let mv = MoveDescriptor::new(task_id, origin, origin_index).to(target, state.selected_task);
            match app.session.apply_move(&mv) {
                Ok(Applied::Unchanged) => {}
                Ok(Applied::Reordered) => state.notify("Task reordered"),
                Ok(Applied::Reclassified(request)) => {
                    app.remote.spawn_persist(request);
                    state.notify(format!("Moved to {}", app.session.board().cell_label(target)));
                }
                Err(e) => state.notify_error(format!("Move failed: {e}")),
            }

            let board = app.session.board();
            match board.index().locate(task_id) {
                Some((cell, index)) => state.focus_cell(board, cell, index),
                None => state.clamp_selection(board),
            }
        }
        Action::CancelMove => {
            let Mode::Carrying { task_id, origin, origin_index } = state.mode.clone() else {
                return;
            };
            state.mode = Mode::Normal;
            // A drop outside any cell: resolves to no change.
            let mv = MoveDescriptor::new(task_id, origin, origin_index);
            if let Err(e) = app.session.apply_move(&mv) {
                state.notify_error(format!("Move failed: {e}"));
            } else {
                state.notify("Move cancelled");
            }
            state.focus_cell(app.session.board(), origin, origin_index);
        }
        _ => unreachable!(),
    }
}

// ---------------------------------------------------------------------------
// Handler: Task actions (create, delete, priority, detail view)
// ---------------------------------------------------------------------------

fn handle_task_action(app: &mut App, state: &mut AppState, action: Action) {
    match action {
        Action::NewTask => {
            if let Some(cell) = state.focused_cell(app.session.board()) {
                state.mode = Mode::Input {
                    prompt: "New task",
                    buf: TextBuffer::empty(),
                    on_confirm: InputTarget::NewTask(cell),
                };
            } else {
                state.notify_error("The board has no members or statuses");
            }
        }
        Action::DeleteTask => {
            if let Some(task) = state.selected_task_ref(app.session.board()) {
                state.mode = Mode::Confirm {
                    prompt: "Delete task?",
                    on_confirm: ConfirmTarget::DeleteTask(task.id),
                };
            }
        }
        Action::CyclePriority => {
            let Some(mut task) = state.selected_task_ref(app.session.board()).cloned() else {
                return;
            };
            let priority = task.priority().unwrap_or_default().next();
            task.priority_id = priority.id();
            match app.remote.update_task(&task) {
                Ok(()) => {
                    let id = task.id;
                    app.session.update_task(task);
                    // The update carried the task's current cell too.
                    app.session.confirm_task(id);
                    state.notify(format!("Priority: {priority}"));
                }
                Err(e) => state.notify_error(format!("Could not change priority: {e}")),
            }
        }
        Action::OpenTaskDetail => {
            if state.selected_task_ref(app.session.board()).is_some() {
                state.mode = Mode::TaskDetail { scroll: 0 };
            }
        }
        Action::ClosePanel => {
            state.mode = Mode::Normal;
        }
        Action::DetailScrollDown => {
            if let Mode::TaskDetail { scroll } = &mut state.mode {
                *scroll = scroll.saturating_add(1);
            }
        }
        Action::DetailScrollUp => {
            if let Mode::TaskDetail { scroll } = &mut state.mode {
                *scroll = scroll.saturating_sub(1);
            }
        }
        _ => unreachable!(),
    }
}

// ---------------------------------------------------------------------------
// Handler: Text input
// ---------------------------------------------------------------------------

fn handle_input(app: &mut App, state: &mut AppState, action: Action) {
    if let Action::InputConfirm = action {
        return handle_input_confirm(app, state);
    }
    if let Action::InputCancel = action {
        state.mode = Mode::Normal;
        return;
    }
    let Mode::Input { buf, .. } = &mut state.mode else {
        return;
    };
    match action {
        Action::InputChar(c) => buf.insert(c),
        Action::InputBackspace => buf.backspace(),
        Action::InputLeft => buf.move_left(),
        Action::InputRight => buf.move_right(),
        Action::InputHome => buf.home(),
        Action::InputEnd => buf.end(),
        Action::InputDeleteWord => buf.delete_word(),
        _ => unreachable!(),
    }
}

fn handle_input_confirm(app: &mut App, state: &mut AppState) {
    let old_mode = std::mem::replace(&mut state.mode, Mode::Normal);
    let Mode::Input { buf, on_confirm: InputTarget::NewTask(cell), .. } = old_mode else {
        return;
    };

    let title = buf.input.trim().to_string();
    if title.is_empty() {
        return;
    }
    let payload = TaskPayload {
        title,
        description: String::new(),
        priority_id: Priority::default().id(),
        status_id: cell.status_id,
        assignee_id: cell.assignee_id,
    };
    match app.remote.create_task(&payload) {
        Ok(task) => {
            let id = task.id;
            app.session.insert_task(task);
            let board = app.session.board();
            if let Some((cell, index)) = board.index().locate(id) {
                state.focus_cell(board, cell, index);
            }
            state.notify("Task created");
        }
        Err(e) => state.notify_error(format!("Could not create task: {e}")),
    }
}

// ---------------------------------------------------------------------------
// Handler: Confirmation
// ---------------------------------------------------------------------------

fn handle_confirm(app: &mut App, state: &mut AppState, action: Action) {
    let old_mode = std::mem::replace(&mut state.mode, Mode::Normal);
    if action != Action::Confirm {
        return;
    }
    if let Mode::Confirm { on_confirm: ConfirmTarget::DeleteTask(id), .. } = old_mode {
        match app.remote.delete_task(id) {
            Ok(()) => {
                app.session.remove_task(id);
                state.clamp_selection(app.session.board());
                state.notify("Task deleted");
            }
            Err(e) => state.notify_error(format!("Could not delete task: {e}")),
        }
    }
}
