use super::grouping::cell_members;
use super::reconcile::{reconcile, verify};
use super::{BoardError, CellKey, Task};

/// Where a carried task was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropTarget {
    pub cell: CellKey,
    /// Position within the destination cell; clamped to the cell's length.
    pub index: usize,
}

/// A completed drag: which task, where it came from, where it landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveDescriptor {
    pub task_id: i64,
    pub source: CellKey,
    pub source_index: usize,
    /// `None` when the task was released outside any cell.
    pub destination: Option<DropTarget>,
}

impl MoveDescriptor {
    /// A move that has not been dropped anywhere yet.
    pub fn new(task_id: i64, source: CellKey, source_index: usize) -> Self {
        Self { task_id, source, source_index, destination: None }
    }

    pub fn to(mut self, cell: CellKey, index: usize) -> Self {
        self.destination = Some(DropTarget { cell, index });
        self
    }
}

/// A task's change of cell, as produced by a cross-cell move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reclassification {
    pub task_id: i64,
    pub from: CellKey,
    pub to: CellKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Dropped outside any cell; the board is untouched.
    Unchanged,
    /// Reordered within one cell; nothing to persist.
    Reordered(Vec<Task>),
    /// Moved to another cell; the change must be persisted.
    Reclassified { tasks: Vec<Task>, change: Reclassification },
}

impl MoveOutcome {
    /// The new flat task list, if anything changed.
    pub fn tasks(&self) -> Option<&[Task]> {
        match self {
            Self::Unchanged => None,
            Self::Reordered(tasks) | Self::Reclassified { tasks, .. } => Some(tasks),
        }
    }

    pub fn change(&self) -> Option<Reclassification> {
        match self {
            Self::Reclassified { change, .. } => Some(*change),
            _ => None,
        }
    }
}

fn out_of_sync(task_id: i64, reason: impl Into<String>) -> BoardError {
    BoardError::Consistency { task_id, reason: reason.into() }
}

/// Resolve a move against the current flat task list.
///
/// Pure: `tasks` is never modified. The returned list holds every input task
/// exactly once, and at most the moved task changes classification.
pub fn resolve_move(tasks: &[Task], mv: &MoveDescriptor) -> Result<MoveOutcome, BoardError> {
    let Some(dest) = mv.destination else {
        return Ok(MoveOutcome::Unchanged);
    };

    let pos = tasks
        .iter()
        .position(|t| t.id == mv.task_id)
        .ok_or_else(|| out_of_sync(mv.task_id, "task is not on the board"))?;

    let current = tasks[pos].cell();
    if current != mv.source {
        return Err(out_of_sync(
            mv.task_id,
            format!("task is in {current} but the move started from {}", mv.source),
        ));
    }

    let source_members = cell_members(tasks, mv.source);
    if source_members.get(mv.source_index) != Some(&pos) {
        return Err(out_of_sync(
            mv.task_id,
            format!("position {} of {} does not hold this task", mv.source_index, mv.source),
        ));
    }

    if dest.cell == mv.source {
        let mut cell: Vec<Task> = source_members.iter().map(|&i| tasks[i].clone()).collect();
        let moved = cell.remove(mv.source_index);
        let at = dest.index.min(cell.len());
        cell.insert(at, moved);

        let out = reconcile(tasks.to_vec(), dest.cell, cell);
        verify(tasks, &out, None)?;
        return Ok(MoveOutcome::Reordered(out));
    }

    let mut rest = tasks.to_vec();
    let mut moved = rest.remove(pos);
    moved.set_cell(dest.cell);

    let mut cell: Vec<Task> = rest.iter().filter(|t| t.cell() == dest.cell).cloned().collect();
    let at = dest.index.min(cell.len());
    cell.insert(at, moved);

    let out = reconcile(rest, dest.cell, cell);
    verify(tasks, &out, Some(mv.task_id))?;
    Ok(MoveOutcome::Reclassified {
        tasks: out,
        change: Reclassification { task_id: mv.task_id, from: mv.source, to: dest.cell },
    })
}
