//! Rebuilding the flat task list after a move.
//!
//! Cell order is what users observe; where a cell's tasks sit in the flat
//! list is irrelevant as long as every other task keeps its relative order.
//! The affected cell is therefore always appended last.

use std::collections::{HashMap, HashSet};

use super::{BoardError, CellKey, Task};

/// Merge a newly ordered cell back into the flat list.
///
/// `rest` is the flat list with the moved task already removed (or still
/// present, for a pure reorder); any task it holds that belongs to `cell` is
/// dropped in favour of `ordered`, which must contain exactly those tasks in
/// their new order.
pub fn reconcile(rest: Vec<Task>, cell: CellKey, ordered: Vec<Task>) -> Vec<Task> {
    let mut out: Vec<Task> = rest.into_iter().filter(|t| t.cell() != cell).collect();
    out.extend(ordered);
    out
}

/// Check the post-move invariants.
///
/// The task id set must be unchanged with every id present once, and only
/// `moved` may have a different classification. A failure means the
/// resolver or reconciler is broken, not that the user did something wrong.
pub fn verify(before: &[Task], after: &[Task], moved: Option<i64>) -> Result<(), BoardError> {
    if before.len() != after.len() {
        return Err(BoardError::Invariant(format!(
            "task count changed from {} to {}",
            before.len(),
            after.len()
        )));
    }

    let previous: HashMap<i64, CellKey> = before.iter().map(|t| (t.id, t.cell())).collect();
    let mut seen = HashSet::with_capacity(after.len());
    for task in after {
        if !seen.insert(task.id) {
            return Err(BoardError::Invariant(format!("task {} appears twice", task.id)));
        }
        match previous.get(&task.id) {
            None => {
                return Err(BoardError::Invariant(format!("task {} appeared from nowhere", task.id)));
            }
            Some(cell) if *cell != task.cell() && Some(task.id) != moved => {
                return Err(BoardError::Invariant(format!(
                    "task {} was reclassified from {cell} to {}",
                    task.id,
                    task.cell()
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}
