//! HTTP client for the task-matrix service.

pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::board::persist::{PersistError, TaskStore};
use crate::board::{Task, TaskPayload};
use types::{
    validate_task, AuthResponse, CreatedTask, LoginPayload, MessageResponse, Project, ProjectDetail,
    ProjectPayload, SignupPayload, User,
};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("not logged in")]
    NotLoggedIn,
}

impl ApiError {
    /// Translate a failed task update for the persistence bridge.
    pub fn into_persist(self, task_id: i64) -> PersistError {
        match self {
            Self::Status { status, message } => PersistError::Rejected {
                task_id,
                reason: if message.is_empty() { format!("HTTP {status}") } else { message },
            },
            Self::Invalid(reason) => PersistError::Rejected { task_id, reason },
            Self::NotLoggedIn => PersistError::Rejected { task_id, reason: "not logged in".into() },
            Self::Http(e) => PersistError::Unreachable(e.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Build a client. `timeout` bounds every request; `None` means no limit.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// A request to a route behind the service's auth middleware.
    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        if self.token.is_none() {
            return Err(ApiError::NotLoggedIn);
        }
        Ok(self.request(method, path))
    }

    /// Send and map non-2xx responses to [`ApiError::Status`]. The service
    /// answers errors with a plain-text body.
    async fn send(builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default().trim().to_string();
        tracing::debug!(status = status.as_u16(), %message, "request rejected");
        Err(ApiError::Status { status: status.as_u16(), message })
    }

    async fn json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ApiError> {
        Ok(Self::send(builder).await?.json::<T>().await?)
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    pub async fn login(&self, payload: &LoginPayload) -> Result<AuthResponse, ApiError> {
        payload.validate()?;
        Self::json(self.request(Method::POST, "/auth/login").json(payload)).await
    }

    pub async fn signup(&self, payload: &SignupPayload) -> Result<AuthResponse, ApiError> {
        payload.validate()?;
        Self::json(self.request(Method::POST, "/auth/signup").json(payload)).await
    }

    /// The user the current token belongs to.
    pub async fn validate(&self) -> Result<User, ApiError> {
        Self::json(self.authed(Method::GET, "/auth/validate")?).await
    }

    // -----------------------------------------------------------------------
    // Projects and members
    // -----------------------------------------------------------------------

    pub async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        let projects: Option<Vec<Project>> = Self::json(self.authed(Method::GET, "/projects")?).await?;
        Ok(projects.unwrap_or_default())
    }

    pub async fn get_project(&self, project_id: i64) -> Result<ProjectDetail, ApiError> {
        Self::json(self.authed(Method::GET, &format!("/projects/{project_id}"))?).await
    }

    pub async fn create_project(&self, payload: &ProjectPayload) -> Result<Project, ApiError> {
        payload.validate()?;
        Self::json(self.authed(Method::POST, "/projects")?.json(payload)).await
    }

    pub async fn update_project(&self, project_id: i64, payload: &ProjectPayload) -> Result<Project, ApiError> {
        payload.validate()?;
        Self::json(self.authed(Method::PUT, &format!("/projects/{project_id}"))?.json(payload)).await
    }

    pub async fn delete_project(&self, project_id: i64) -> Result<(), ApiError> {
        Self::send(self.authed(Method::DELETE, &format!("/projects/{project_id}"))?).await?;
        Ok(())
    }

    pub async fn add_member(&self, project_id: i64, username: &str) -> Result<User, ApiError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ApiError::Invalid("member username is required".into()));
        }
        let path = format!("/projects/{project_id}/members/{username}");
        Self::json(self.authed(Method::POST, &path)?).await
    }

    pub async fn remove_member(&self, project_id: i64, user_id: i64) -> Result<(), ApiError> {
        let path = format!("/projects/{project_id}/members/{user_id}");
        Self::send(self.authed(Method::DELETE, &path)?).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Create a task and return it as it will appear on the board.
    pub async fn create_task(&self, project_id: i64, payload: &TaskPayload) -> Result<Task, ApiError> {
        validate_task(payload)?;
        let path = format!("/projects/{project_id}/tasks");
        let created: CreatedTask = Self::json(self.authed(Method::POST, &path)?.json(payload)).await?;
        Ok(Task {
            id: created.id,
            title: payload.title.clone(),
            description: payload.description.clone(),
            priority_id: payload.priority_id,
            status_id: payload.status_id,
            assignee_id: payload.assignee_id,
        })
    }

    pub async fn update_task(
        &self,
        project_id: i64,
        task_id: i64,
        payload: &TaskPayload,
    ) -> Result<MessageResponse, ApiError> {
        validate_task(payload)?;
        let path = format!("/projects/{project_id}/tasks/{task_id}");
        Self::json(self.authed(Method::PUT, &path)?.json(payload)).await
    }

    pub async fn delete_task(&self, project_id: i64, task_id: i64) -> Result<(), ApiError> {
        let path = format!("/projects/{project_id}/tasks/{task_id}");
        Self::send(self.authed(Method::DELETE, &path)?).await?;
        Ok(())
    }
}

/// The task store of one project, backed by the service.
#[derive(Debug, Clone)]
pub struct ProjectTasks {
    client: ApiClient,
    project_id: i64,
}

impl ProjectTasks {
    pub fn new(client: ApiClient, project_id: i64) -> Self {
        Self { client, project_id }
    }
}

#[async_trait]
impl TaskStore for ProjectTasks {
    async fn update_classification(&self, task_id: i64, payload: &TaskPayload) -> Result<(), PersistError> {
        self.client
            .update_task(self.project_id, task_id, payload)
            .await
            .map(|_| ())
            .map_err(|e| e.into_persist(task_id))
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    const AUTH_BODY: &str = r#"{"token":"t0k","user":{"id":1,"name":"Ada","username":"ada","avatar_url":""}}"#;

    fn payload() -> TaskPayload {
        TaskPayload {
            title: "Ship it".into(),
            description: "soon".into(),
            priority_id: 3,
            status_id: 2,
            assignee_id: 5,
        }
    }

    #[tokio::test]
    async fn login_posts_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/login")
            .match_body(Matcher::Json(json!({"username": "ada", "password": "pw"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(AUTH_BODY)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), None).unwrap();
        let auth = client
            .login(&LoginPayload { username: "ada".into(), password: "pw".into() })
            .await
            .unwrap();
        assert_eq!(auth.token, "t0k");
        assert_eq!(auth.user.username, "ada");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_body_becomes_status_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(401)
            .with_body("Invalid username or password\n")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), None).unwrap();
        let err = client
            .login(&LoginPayload { username: "ada".into(), password: "bad".into() })
            .await
            .unwrap_err();
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid username or password");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let client = ApiClient::new("http://127.0.0.1:9", None).unwrap();
        assert!(matches!(client.list_projects().await, Err(ApiError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn get_project_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/projects/7")
            .match_header("authorization", "Bearer t0k")
            .with_status(200)
            .with_body(r#"{"id":7,"name":"Site","members":[{"id":1,"name":"Ada","username":"ada"}],"tasks":null}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), None).unwrap().with_token("t0k");
        let detail = client.get_project(7).await.unwrap();
        assert_eq!(detail.members.len(), 1);
        assert!(detail.tasks.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn list_projects_tolerates_null() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/projects").with_status(200).with_body("null").create_async().await;
        let client = ApiClient::new(&server.url(), None).unwrap().with_token("t0k");
        assert!(client.list_projects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_task_builds_board_task() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/projects/7/tasks")
            .match_body(Matcher::PartialJson(json!({"title": "Ship it", "assignee_id": 5})))
            .with_status(201)
            .with_body(r#"{"id":42,"title":"Ship it"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), None).unwrap().with_token("t0k");
        let task = client.create_task(7, &payload()).await.unwrap();
        assert_eq!(task.id, 42);
        assert_eq!(task.cell(), crate::board::CellKey::new(5, 2));
    }

    #[tokio::test]
    async fn task_store_puts_full_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/projects/7/tasks/42")
            .match_body(Matcher::Json(json!({
                "title": "Ship it",
                "description": "soon",
                "priority_id": 3,
                "status_id": 2,
                "assignee_id": 5
            })))
            .with_status(200)
            .with_body(r#"{"message":"Task updated successfully"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), None).unwrap().with_token("t0k");
        let store = ProjectTasks::new(client, 7);
        assert_eq!(store.update_classification(42, &payload()).await, Ok(()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn task_store_maps_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/projects/7/tasks/42")
            .with_status(500)
            .with_body("Failed to update task")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), None).unwrap().with_token("t0k");
        let store = ProjectTasks::new(client, 7);
        assert_eq!(
            store.update_classification(42, &payload()).await,
            Err(PersistError::Rejected { task_id: 42, reason: "Failed to update task".into() })
        );
    }

    #[tokio::test]
    async fn empty_title_is_rejected_before_sending() {
        let client = ApiClient::new("http://127.0.0.1:9", None).unwrap().with_token("t0k");
        let mut p = payload();
        p.title = String::new();
        assert!(matches!(client.create_task(1, &p).await, Err(ApiError::Invalid(_))));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:8000/", None).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }
}
