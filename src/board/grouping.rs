use indexmap::IndexMap;

use super::{CellKey, Task};

/// Tasks grouped by cell, for every cell of the assignee × status grid.
///
/// Cells iterate assignee-major, status-minor in the order the ids were
/// supplied. Within a cell, tasks keep their relative order from the flat
/// list. Empty cells are present with an empty list.
#[derive(Debug, Clone)]
pub struct CellIndex<'a> {
    cells: IndexMap<CellKey, Vec<&'a Task>>,
    unplaced: Vec<&'a Task>,
}

impl<'a> CellIndex<'a> {
    /// Group `tasks` in a single pass.
    pub fn build(tasks: &'a [Task], assignees: &[i64], statuses: &[i64]) -> Self {
        let mut cells: IndexMap<CellKey, Vec<&'a Task>> =
            IndexMap::with_capacity(assignees.len() * statuses.len());
        for &assignee_id in assignees {
            for &status_id in statuses {
                cells.entry(CellKey::new(assignee_id, status_id)).or_default();
            }
        }

        let mut unplaced = Vec::new();
        for task in tasks {
            match cells.get_mut(&task.cell()) {
                Some(items) => items.push(task),
                None => unplaced.push(task),
            }
        }

        Self { cells, unplaced }
    }

    /// Tasks in `cell`, or `None` if the cell is not part of the grid.
    pub fn cell(&self, cell: CellKey) -> Option<&[&'a Task]> {
        self.cells.get(&cell).map(Vec::as_slice)
    }

    /// Number of tasks in `cell` (0 for cells outside the grid).
    pub fn len_of(&self, cell: CellKey) -> usize {
        self.cells.get(&cell).map_or(0, Vec::len)
    }

    /// Iterate every cell with its tasks, in grid order.
    pub fn iter(&self) -> impl Iterator<Item = (CellKey, &[&'a Task])> + '_ {
        self.cells.iter().map(|(key, items)| (*key, items.as_slice()))
    }

    /// Tasks whose classification lies outside the grid, e.g. assigned to
    /// someone who is no longer a member.
    pub fn unplaced(&self) -> &[&'a Task] {
        &self.unplaced
    }

    /// Locate a task: its cell and index within that cell.
    pub fn locate(&self, task_id: i64) -> Option<(CellKey, usize)> {
        self.cells.iter().find_map(|(key, items)| {
            items
                .iter()
                .position(|t| t.id == task_id)
                .map(|idx| (*key, idx))
        })
    }
}

/// Tasks in `cell`, in flat-list order, with their flat positions.
pub(crate) fn cell_members(tasks: &[Task], cell: CellKey) -> Vec<usize> {
    tasks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.cell() == cell)
        .map(|(i, _)| i)
        .collect()
}
