pub mod grouping;
pub mod persist;
pub mod reconcile;
pub mod resolve;

use serde::{Deserialize, Serialize};

use grouping::CellIndex;

/// Errors raised by the board engine.
///
/// These indicate a desync between the caller's view and the board, or a
/// broken engine contract. They are never expected under correct usage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("board out of sync for task {task_id}: {reason}")]
    Consistency { task_id: i64, reason: String },
    #[error("reconciliation broke a board invariant: {0}")]
    Invariant(String),
    #[error("invalid cell key {0:?} (expected <assignee>--<status>)")]
    InvalidCellKey(String),
}

/// The (assignee, status) pair a task is filed under.
///
/// Cells are a derived view of the task list; nothing stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub assignee_id: i64,
    pub status_id: i64,
}

impl CellKey {
    /// Separator used by the textual `<assignee>--<status>` form.
    pub const SEPARATOR: &'static str = "--";

    pub fn new(assignee_id: i64, status_id: i64) -> Self {
        Self { assignee_id, status_id }
    }
}

impl std::str::FromStr for CellKey {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BoardError::InvalidCellKey(s.to_string());
        let (assignee, status) = s.trim().split_once(Self::SEPARATOR).ok_or_else(invalid)?;
        let assignee_id = assignee.parse().map_err(|_| invalid())?;
        let status_id = status.parse().map_err(|_| invalid())?;
        Ok(Self { assignee_id, status_id })
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.assignee_id, Self::SEPARATOR, self.status_id)
    }
}

/// Priority levels known to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Self::Low, Self::Medium, Self::High];

    /// Map a service priority id. Unknown ids have no priority.
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            _ => None,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" | "1" => Ok(Self::Low),
            "medium" | "2" => Ok(Self::Medium),
            "high" | "3" => Ok(Self::High),
            other => Err(format!("unknown priority '{other}': use low, medium, high")),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task status column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: i64,
    pub name: String,
}

/// A project member; members are the board's assignees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub username: String,
}

/// A single task on the board.
///
/// Serialized flat. Deserializes either flat (`status_id`, `assignee_id`,
/// `priority_id`) or with the related records nested (`status`,
/// `assignee`, `priority`), as the project detail endpoint returns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireTask")]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority_id: i64,
    pub status_id: i64,
    pub assignee_id: i64,
}

/// A related record; only its id is read.
#[derive(Deserialize)]
struct IdRef {
    id: i64,
}

#[derive(Deserialize)]
struct WireTask {
    id: i64,
    title: String,
    #[serde(default)]
    description: String,
    priority_id: Option<i64>,
    priority: Option<IdRef>,
    status_id: Option<i64>,
    status: Option<IdRef>,
    assignee_id: Option<i64>,
    assignee: Option<IdRef>,
}

impl TryFrom<WireTask> for Task {
    type Error = String;

    fn try_from(wire: WireTask) -> Result<Self, Self::Error> {
        let status_id = wire
            .status_id
            .or(wire.status.map(|s| s.id))
            .ok_or_else(|| format!("task {} has no status", wire.id))?;
        let assignee_id = wire
            .assignee_id
            .or(wire.assignee.map(|a| a.id))
            .ok_or_else(|| format!("task {} has no assignee", wire.id))?;
        Ok(Self {
            id: wire.id,
            title: wire.title,
            description: wire.description,
            priority_id: wire.priority_id.or(wire.priority.map(|p| p.id)).unwrap_or_default(),
            status_id,
            assignee_id,
        })
    }
}

impl Task {
    /// The cell this task is currently filed under.
    pub fn cell(&self) -> CellKey {
        CellKey::new(self.assignee_id, self.status_id)
    }

    pub fn set_cell(&mut self, cell: CellKey) {
        self.assignee_id = cell.assignee_id;
        self.status_id = cell.status_id;
    }

    pub fn priority(&self) -> Option<Priority> {
        Priority::from_id(self.priority_id)
    }
}

/// Request body for task create/update calls.
///
/// The service replaces every field on update, so a classification change
/// must still carry the unchanged payload fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub title: String,
    pub description: String,
    pub priority_id: i64,
    pub status_id: i64,
    pub assignee_id: i64,
}

impl From<&Task> for TaskPayload {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            priority_id: task.priority_id,
            status_id: task.status_id,
            assignee_id: task.assignee_id,
        }
    }
}

/// A project's board: members (rows), statuses (columns) and the flat task list.
#[derive(Debug, Clone, Default)]
pub struct Board {
    pub project_id: i64,
    pub name: String,
    pub description: String,
    pub members: Vec<Member>,
    pub statuses: Vec<Status>,
    pub tasks: Vec<Task>,
}

impl Board {
    pub fn assignee_ids(&self) -> Vec<i64> {
        self.members.iter().map(|m| m.id).collect()
    }

    pub fn status_ids(&self) -> Vec<i64> {
        self.statuses.iter().map(|s| s.id).collect()
    }

    /// Group the current tasks by cell.
    pub fn index(&self) -> CellIndex<'_> {
        CellIndex::build(&self.tasks, &self.assignee_ids(), &self.status_ids())
    }

    /// The cell at a (member row, status column) position, if both exist.
    pub fn cell_at(&self, row: usize, col: usize) -> Option<CellKey> {
        let member = self.members.get(row)?;
        let status = self.statuses.get(col)?;
        Some(CellKey::new(member.id, status.id))
    }

    /// Find a task's position in the flat list.
    pub fn find_task(&self, task_id: i64) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == task_id)
    }

    pub fn task(&self, task_id: i64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn member_name(&self, assignee_id: i64) -> Option<&str> {
        self.members
            .iter()
            .find(|m| m.id == assignee_id)
            .map(|m| m.name.as_str())
    }

    pub fn status_name(&self, status_id: i64) -> Option<&str> {
        self.statuses
            .iter()
            .find(|s| s.id == status_id)
            .map(|s| s.name.as_str())
    }

    /// Human-readable label for a cell, e.g. `Ada / In Progress`.
    pub fn cell_label(&self, cell: CellKey) -> String {
        let member = self
            .member_name(cell.assignee_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", cell.assignee_id));
        let status = self
            .status_name(cell.status_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", cell.status_id));
        format!("{member} / {status}")
    }
}
