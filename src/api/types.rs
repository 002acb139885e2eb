//! Wire types exchanged with the task-matrix service.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use super::ApiError;
use crate::board::{Board, Member, Status, Task, TaskPayload};

/// The service encodes empty lists as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar_url: String,
}

impl From<User> for Member {
    fn from(user: User) -> Self {
        let name = if user.name.is_empty() { user.username.clone() } else { user.name };
        Member { id: user.id, name, username: user.username }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

impl LoginPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(ApiError::Invalid("username and password are required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupPayload {
    pub avatar_url: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignupPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.password != self.confirm_password {
            return Err(ApiError::Invalid("passwords do not match".into()));
        }
        if self.username.trim().is_empty() || self.email.trim().is_empty() || self.password.is_empty() {
            return Err(ApiError::Invalid("username, email and password are required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: String,
    pub status: Option<Status>,
    #[serde(default)]
    pub owner: Option<User>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub members: Vec<User>,
    #[serde(default)]
    pub tasks_completed: i64,
    #[serde(default)]
    pub total_tasks: i64,
}

/// A project with its members and tasks, as shown on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDetail {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub owner: Option<User>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub members: Vec<User>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tasks: Vec<Task>,
}

impl ProjectDetail {
    /// Build the board view: members become rows, `statuses` the columns.
    pub fn into_board(self, statuses: Vec<Status>) -> Board {
        Board {
            project_id: self.id,
            name: self.name,
            description: self.description,
            members: self.members.into_iter().map(Member::from).collect(),
            statuses,
            tasks: self.tasks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectPayload {
    pub name: String,
    pub description: String,
    pub due_date: String,
    pub status_id: i64,
}

impl ProjectPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() || self.due_date.trim().is_empty() {
            return Err(ApiError::Invalid("project name and due date are required".into()));
        }
        NaiveDate::parse_from_str(self.due_date.trim(), "%Y-%m-%d").map_err(|_| {
            ApiError::Invalid(format!("due date {:?} is not a YYYY-MM-DD date", self.due_date))
        })?;
        Ok(())
    }
}

/// Plain acknowledgement body, e.g. `{"message":"Task updated successfully"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

/// Body of a task creation response; only the id is relied upon.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreatedTask {
    pub id: i64,
}

pub fn validate_task(payload: &TaskPayload) -> Result<(), ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::Invalid("task title is required".into()));
    }
    Ok(())
}
