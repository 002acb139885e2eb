//! Optimistic moves and their persistence.
//!
//! [`BoardSession`] owns the flat task list. A move is resolved and applied
//! synchronously; a cross-cell move also yields a [`PersistRequest`] that the
//! caller runs with [`persist`] wherever it likes (a spawned task in the TUI,
//! awaited inline on the CLI). The resulting [`PersistReport`] goes back
//! through [`BoardSession::settle`], which applies the [`RollbackPolicy`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::grouping::cell_members;
use super::resolve::{resolve_move, MoveDescriptor, MoveOutcome};
use super::{Board, BoardError, CellKey, Task, TaskPayload};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    #[error("server rejected the update of task {task_id}: {reason}")]
    Rejected { task_id: i64, reason: String },
    #[error("could not reach the server: {0}")]
    Unreachable(String),
}

/// Where task classification changes are written.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn update_classification(&self, task_id: i64, payload: &TaskPayload) -> Result<(), PersistError>;
}

/// What to do with the optimistic board state when a write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackPolicy {
    /// Leave the board as the user left it and only report the failure.
    Keep,
    /// Put the board back the way it was before the failed move.
    #[default]
    Restore,
}

impl std::fmt::Display for RollbackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keep => f.write_str("keep"),
            Self::Restore => f.write_str("restore"),
        }
    }
}

/// Identifies one in-flight write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MoveTicket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistRequest {
    pub ticket: MoveTicket,
    pub task_id: i64,
    pub payload: TaskPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub ticket: MoveTicket,
    pub task_id: i64,
    pub result: Result<(), PersistError>,
}

/// Run one write against the store. Never panics; failures are logged and
/// returned in the report.
pub async fn persist(store: &dyn TaskStore, request: PersistRequest) -> PersistReport {
    tracing::debug!(
        task_id = request.task_id,
        assignee_id = request.payload.assignee_id,
        status_id = request.payload.status_id,
        "persisting task classification"
    );
    let result = store.update_classification(request.task_id, &request.payload).await;
    match &result {
        Ok(()) => tracing::info!(task_id = request.task_id, "task classification saved"),
        Err(e) => tracing::warn!(task_id = request.task_id, error = %e, "task classification not saved"),
    }
    PersistReport { ticket: request.ticket, task_id: request.task_id, result }
}

/// Result of applying a move to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Unchanged,
    Reordered,
    Reclassified(PersistRequest),
}

/// How a finished write was folded back into the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Confirmed,
    /// Write failed; the optimistic state stays.
    Kept(PersistError),
    /// Write failed; the board is back to its pre-move state.
    Restored(PersistError),
    /// Write failed after later changes; only the task went back to its old cell.
    Reverted(PersistError),
    /// Write failed, but a newer move of the same task is still in flight.
    Superseded(PersistError),
    /// The board was replaced, or the task saved in full, since the write
    /// started; nothing to do.
    Stale,
}

#[derive(Debug)]
struct PendingMove {
    task_id: i64,
    /// Board before the move. `None` once an earlier unsaved move of the
    /// same task has been folded in; the snapshot would then hold that move.
    snapshot: Option<Vec<Task>>,
    generation: u64,
    from: CellKey,
    from_index: usize,
}

/// The board a view works on, plus the writes still in flight for it.
#[derive(Debug)]
pub struct BoardSession {
    board: Board,
    policy: RollbackPolicy,
    /// Bumped on every change to the task list.
    generation: u64,
    next_ticket: u64,
    pending: HashMap<MoveTicket, PendingMove>,
}

impl BoardSession {
    pub fn new(board: Board, policy: RollbackPolicy) -> Self {
        Self { board, policy, generation: 0, next_ticket: 0, pending: HashMap::new() }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn policy(&self) -> RollbackPolicy {
        self.policy
    }

    /// Number of writes not yet settled.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    fn set_tasks(&mut self, tasks: Vec<Task>) {
        self.board.tasks = tasks;
        self.generation += 1;
    }

    /// Resolve and apply a move. On error the board is left untouched.
    pub fn apply_move(&mut self, mv: &MoveDescriptor) -> Result<Applied, BoardError> {
        let outcome = resolve_move(&self.board.tasks, mv).inspect_err(|e| {
            tracing::error!(task_id = mv.task_id, error = %e, "move rejected");
        })?;

        match outcome {
            MoveOutcome::Unchanged => {
                tracing::debug!(task_id = mv.task_id, "drop outside any cell");
                Ok(Applied::Unchanged)
            }
            MoveOutcome::Reordered(tasks) => {
                self.set_tasks(tasks);
                Ok(Applied::Reordered)
            }
            MoveOutcome::Reclassified { tasks, change } => {
                let snapshot = std::mem::replace(&mut self.board.tasks, tasks);
                self.generation += 1;

                let payload = self
                    .board
                    .task(change.task_id)
                    .map(TaskPayload::from)
                    .ok_or_else(|| BoardError::Invariant(format!("task {} vanished", change.task_id)))?;

                let ticket = MoveTicket(self.next_ticket);
                self.next_ticket += 1;
                self.pending.insert(
                    ticket,
                    PendingMove {
                        task_id: change.task_id,
                        snapshot: Some(snapshot),
                        generation: self.generation,
                        from: change.from,
                        from_index: mv.source_index,
                    },
                );
                tracing::info!(
                    task_id = change.task_id,
                    from = %change.from,
                    to = %change.to,
                    "task moved to another cell"
                );
                Ok(Applied::Reclassified(PersistRequest { ticket, task_id: change.task_id, payload }))
            }
        }
    }

    /// Fold a finished write back into the board.
    pub fn settle(&mut self, report: PersistReport) -> Settlement {
        let Some(mut pending) = self.pending.remove(&report.ticket) else {
            tracing::debug!(task_id = report.task_id, "no pending move for settled write");
            return Settlement::Stale;
        };

        let err = match report.result {
            Ok(()) => return Settlement::Confirmed,
            Err(err) => err,
        };

        match self.policy {
            RollbackPolicy::Keep => Settlement::Kept(err),
            RollbackPolicy::Restore => {
                let next_write = self
                    .pending
                    .values_mut()
                    .filter(|p| p.task_id == pending.task_id && p.generation > pending.generation)
                    .min_by_key(|p| p.generation);
                if let Some(next) = next_write {
                    // The next write of this task now rolls back to where this one started.
                    next.from = pending.from;
                    next.from_index = pending.from_index;
                    next.snapshot = None;
                    return Settlement::Superseded(err);
                }

                if self.generation == pending.generation {
                    if let Some(snapshot) = pending.snapshot.take() {
                        tracing::info!(task_id = pending.task_id, "restoring board to pre-move state");
                        self.set_tasks(snapshot);
                        return Settlement::Restored(err);
                    }
                }

                match self.revert(&pending) {
                    Ok(true) => Settlement::Reverted(err),
                    Ok(false) => Settlement::Kept(err),
                    Err(e) => {
                        tracing::error!(task_id = pending.task_id, error = %e, "could not revert failed move");
                        Settlement::Kept(err)
                    }
                }
            }
        }
    }

    /// A full-payload write of `task_id` succeeded, so the server holds its
    /// current classification. Its pending moves no longer roll back; their
    /// reports will settle as [`Settlement::Stale`]. Returns how many were dropped.
    pub fn confirm_task(&mut self, task_id: i64) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| p.task_id != task_id);
        let dropped = before - self.pending.len();
        if dropped > 0 {
            tracing::debug!(task_id, dropped, "pending moves confirmed by task update");
        }
        dropped
    }

    /// Move a task back to the cell and index it left, keeping every later
    /// change to other tasks. Returns `false` if the task is gone.
    fn revert(&mut self, pending: &PendingMove) -> Result<bool, BoardError> {
        let Some(pos) = self.board.find_task(pending.task_id) else {
            return Ok(false);
        };
        let current = self.board.tasks[pos].cell();
        let index = cell_members(&self.board.tasks, current)
            .iter()
            .position(|&i| i == pos)
            .unwrap_or_default();

        let back = MoveDescriptor::new(pending.task_id, current, index).to(pending.from, pending.from_index);
        match resolve_move(&self.board.tasks, &back)? {
            MoveOutcome::Unchanged => Ok(false),
            MoveOutcome::Reordered(tasks) | MoveOutcome::Reclassified { tasks, .. } => {
                tracing::info!(task_id = pending.task_id, to = %pending.from, "reverted failed move");
                self.set_tasks(tasks);
                Ok(true)
            }
        }
    }

    /// Replace the board with a fresh fetch. Writes still in flight will
    /// settle as [`Settlement::Stale`].
    pub fn replace(&mut self, board: Board) {
        self.board = board;
        self.generation += 1;
        self.pending.clear();
    }

    /// Append a newly created task.
    pub fn insert_task(&mut self, task: Task) {
        let mut tasks = self.board.tasks.clone();
        tasks.push(task);
        self.set_tasks(tasks);
    }

    pub fn remove_task(&mut self, task_id: i64) -> Option<Task> {
        let pos = self.board.find_task(task_id)?;
        let mut tasks = self.board.tasks.clone();
        let removed = tasks.remove(pos);
        self.set_tasks(tasks);
        Some(removed)
    }

    /// Replace a task's payload in place, keeping its position.
    pub fn update_task(&mut self, task: Task) -> bool {
        let Some(pos) = self.board.find_task(task.id) else {
            return false;
        };
        let mut tasks = self.board.tasks.clone();
        tasks[pos] = task;
        self.set_tasks(tasks);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::board::test_support::{board, cell_ids, ids, task};

    /// Records every write; fails when `fail` is set.
    #[derive(Default)]
    struct FakeStore {
        calls: Mutex<Vec<(i64, TaskPayload)>>,
        fail: bool,
    }

    #[async_trait]
    impl TaskStore for FakeStore {
        async fn update_classification(&self, task_id: i64, payload: &TaskPayload) -> Result<(), PersistError> {
            self.calls.lock().unwrap().push((task_id, payload.clone()));
            if self.fail {
                Err(PersistError::Rejected { task_id, reason: "nope".into() })
            } else {
                Ok(())
            }
        }
    }

    fn key(a: i64, s: i64) -> CellKey {
        CellKey::new(a, s)
    }

    /// Members 1, 2; statuses 1, 2. Cell 1--1 = [1, 2], cell 2--2 = [3, 4].
    fn session(policy: RollbackPolicy) -> BoardSession {
        let tasks = vec![task(1, (1, 1)), task(3, (2, 2)), task(2, (1, 1)), task(4, (2, 2))];
        BoardSession::new(board(&[1, 2], &[1, 2], tasks), policy)
    }

    fn request(applied: Applied) -> PersistRequest {
        match applied {
            Applied::Reclassified(req) => req,
            other => panic!("expected a reclassification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reorder_never_persists() {
        let mut s = session(RollbackPolicy::Restore);
        let applied = s.apply_move(&MoveDescriptor::new(1, key(1, 1), 0).to(key(1, 1), 1)).unwrap();
        assert_eq!(applied, Applied::Reordered);
        assert_eq!(s.in_flight(), 0);
        assert_eq!(cell_ids(&s.board().tasks, (1, 1)), vec![2, 1]);
    }

    #[tokio::test]
    async fn cancelled_drop_has_no_side_effects() {
        let mut s = session(RollbackPolicy::Restore);
        let before = s.board().tasks.clone();
        let applied = s.apply_move(&MoveDescriptor::new(1, key(1, 1), 0)).unwrap();
        assert_eq!(applied, Applied::Unchanged);
        assert_eq!(s.board().tasks, before);
        assert_eq!(s.in_flight(), 0);
    }

    #[tokio::test]
    async fn cross_cell_move_persists_once_with_destination() {
        let store = FakeStore::default();
        let mut s = session(RollbackPolicy::Restore);
        let req = request(s.apply_move(&MoveDescriptor::new(1, key(1, 1), 0).to(key(2, 2), 1)).unwrap());
        assert_eq!(s.in_flight(), 1);

        let report = persist(&store, req).await;
        assert_eq!(s.settle(report), Settlement::Confirmed);
        assert_eq!(s.in_flight(), 0);

        let calls = store.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (task_id, payload) = &calls[0];
        assert_eq!(*task_id, 1);
        assert_eq!((payload.assignee_id, payload.status_id), (2, 2));
        assert_eq!(payload.title, "task 1");
        assert_eq!(cell_ids(&s.board().tasks, (2, 2)), vec![3, 1, 4]);
    }

    #[tokio::test]
    async fn keep_policy_leaves_optimistic_state() {
        let store = FakeStore { fail: true, ..Default::default() };
        let mut s = session(RollbackPolicy::Keep);
        let req = request(s.apply_move(&MoveDescriptor::new(1, key(1, 1), 0).to(key(2, 2), 0)).unwrap());
        let after_move = s.board().tasks.clone();

        let settled = s.settle(persist(&store, req).await);
        assert!(matches!(settled, Settlement::Kept(PersistError::Rejected { task_id: 1, .. })));
        assert_eq!(s.board().tasks, after_move);
    }

    #[tokio::test]
    async fn restore_policy_restores_snapshot() {
        let store = FakeStore { fail: true, ..Default::default() };
        let mut s = session(RollbackPolicy::Restore);
        let before = s.board().tasks.clone();
        let req = request(s.apply_move(&MoveDescriptor::new(2, key(1, 1), 1).to(key(2, 2), 2)).unwrap());

        let settled = s.settle(persist(&store, req).await);
        assert!(matches!(settled, Settlement::Restored(_)));
        assert_eq!(s.board().tasks, before);
    }

    #[tokio::test]
    async fn restore_after_later_moves_reverts_only_failed_task() {
        let store = FakeStore { fail: true, ..Default::default() };
        let mut s = session(RollbackPolicy::Restore);
        let req = request(s.apply_move(&MoveDescriptor::new(1, key(1, 1), 0).to(key(2, 2), 0)).unwrap());
        // A later reorder in the destination cell: [1, 3, 4] -> [1, 4, 3]
        s.apply_move(&MoveDescriptor::new(4, key(2, 2), 2).to(key(2, 2), 1)).unwrap();

        let settled = s.settle(persist(&store, req).await);
        assert!(matches!(settled, Settlement::Reverted(_)));
        assert_eq!(cell_ids(&s.board().tasks, (1, 1)), vec![1, 2]);
        assert_eq!(cell_ids(&s.board().tasks, (2, 2)), vec![4, 3]);
        let mut all = ids(&s.board().tasks);
        all.sort_unstable();
        assert_eq!(all, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn newer_write_of_same_task_supersedes_failure() {
        let store = FakeStore { fail: true, ..Default::default() };
        let mut s = session(RollbackPolicy::Restore);
        let first = request(s.apply_move(&MoveDescriptor::new(1, key(1, 1), 0).to(key(2, 2), 0)).unwrap());
        let _second = request(s.apply_move(&MoveDescriptor::new(1, key(2, 2), 0).to(key(2, 1), 0)).unwrap());
        assert_eq!(s.in_flight(), 2);

        let settled = s.settle(persist(&store, first).await);
        assert!(matches!(settled, Settlement::Superseded(_)));
        assert_eq!(cell_ids(&s.board().tasks, (2, 1)), vec![1]);
        assert_eq!(s.in_flight(), 1);
    }

    #[tokio::test]
    async fn failed_chain_of_moves_returns_to_last_saved_cell() {
        let store = FakeStore { fail: true, ..Default::default() };
        let mut s = session(RollbackPolicy::Restore);
        let first = request(s.apply_move(&MoveDescriptor::new(1, key(1, 1), 0).to(key(2, 2), 0)).unwrap());
        let second = request(s.apply_move(&MoveDescriptor::new(1, key(2, 2), 0).to(key(2, 1), 0)).unwrap());

        assert!(matches!(s.settle(persist(&store, first).await), Settlement::Superseded(_)));
        assert!(matches!(s.settle(persist(&store, second).await), Settlement::Reverted(_)));
        assert_eq!(s.in_flight(), 0);
        assert_eq!(cell_ids(&s.board().tasks, (1, 1)), vec![1, 2]);
        assert!(cell_ids(&s.board().tasks, (2, 1)).is_empty());
        assert_eq!(cell_ids(&s.board().tasks, (2, 2)), vec![3, 4]);
    }

    #[tokio::test]
    async fn saved_newer_move_outlives_failed_older_one() {
        let failing = FakeStore { fail: true, ..Default::default() };
        let ok = FakeStore::default();
        let mut s = session(RollbackPolicy::Restore);
        let first = request(s.apply_move(&MoveDescriptor::new(1, key(1, 1), 0).to(key(2, 2), 0)).unwrap());
        let second = request(s.apply_move(&MoveDescriptor::new(1, key(2, 2), 0).to(key(2, 1), 0)).unwrap());

        assert!(matches!(s.settle(persist(&failing, first).await), Settlement::Superseded(_)));
        assert_eq!(s.settle(persist(&ok, second).await), Settlement::Confirmed);
        assert_eq!(cell_ids(&s.board().tasks, (2, 1)), vec![1]);
    }

    #[tokio::test]
    async fn confirmed_task_skips_rollback() {
        let store = FakeStore { fail: true, ..Default::default() };
        let mut s = session(RollbackPolicy::Restore);
        let req = request(s.apply_move(&MoveDescriptor::new(1, key(1, 1), 0).to(key(2, 2), 0)).unwrap());

        assert_eq!(s.confirm_task(1), 1);
        assert_eq!(s.confirm_task(1), 0);
        assert_eq!(s.in_flight(), 0);
        assert_eq!(s.settle(persist(&store, req).await), Settlement::Stale);
        assert_eq!(cell_ids(&s.board().tasks, (2, 2)), vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn revert_of_deleted_task_keeps_state() {
        let store = FakeStore { fail: true, ..Default::default() };
        let mut s = session(RollbackPolicy::Restore);
        let req = request(s.apply_move(&MoveDescriptor::new(1, key(1, 1), 0).to(key(2, 2), 0)).unwrap());
        assert!(s.remove_task(1).is_some());

        let settled = s.settle(persist(&store, req).await);
        assert!(matches!(settled, Settlement::Kept(_)));
        assert_eq!(ids(&s.board().tasks).len(), 3);
    }

    #[tokio::test]
    async fn replaced_board_makes_reports_stale() {
        let store = FakeStore { fail: true, ..Default::default() };
        let mut s = session(RollbackPolicy::Restore);
        let req = request(s.apply_move(&MoveDescriptor::new(1, key(1, 1), 0).to(key(2, 2), 0)).unwrap());
        let fresh = board(&[1, 2], &[1, 2], vec![task(9, (1, 1))]);
        s.replace(fresh);
        assert_eq!(s.in_flight(), 0);

        assert_eq!(s.settle(persist(&store, req).await), Settlement::Stale);
        assert_eq!(ids(&s.board().tasks), vec![9]);
    }

    #[test]
    fn stale_move_leaves_board_untouched() {
        let mut s = session(RollbackPolicy::Restore);
        let before = s.board().tasks.clone();
        let err = s.apply_move(&MoveDescriptor::new(77, key(1, 1), 0).to(key(2, 2), 0)).unwrap_err();
        assert!(matches!(err, BoardError::Consistency { task_id: 77, .. }));
        assert_eq!(s.board().tasks, before);
    }

    #[test]
    fn insert_update_remove() {
        let mut s = session(RollbackPolicy::Keep);
        s.insert_task(task(5, (1, 2)));
        assert_eq!(ids(&s.board().tasks).last(), Some(&5));

        let mut edited = task(5, (1, 2));
        edited.title = "renamed".into();
        assert!(s.update_task(edited));
        assert_eq!(s.board().task(5).unwrap().title, "renamed");
        assert!(!s.update_task(task(99, (1, 1))));

        assert_eq!(s.remove_task(5).map(|t| t.id), Some(5));
        assert_eq!(s.remove_task(5), None);
    }

    #[test]
    fn policy_parses_from_config_text() {
        #[derive(Deserialize)]
        struct Wrapper {
            on_persist_failure: RollbackPolicy,
        }
        let w: Wrapper = toml::from_str("on_persist_failure = \"keep\"").unwrap();
        assert_eq!(w.on_persist_failure, RollbackPolicy::Keep);
        assert_eq!(RollbackPolicy::default(), RollbackPolicy::Restore);
    }
}
