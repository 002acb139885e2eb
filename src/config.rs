use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_SERVER_URL;
use crate::board::persist::RollbackPolicy;
use crate::board::Status;

/// Client settings from `config.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    /// Per-request timeout; unset means requests may wait indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// What the board does when a move cannot be saved.
    pub on_persist_failure: RollbackPolicy,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Board columns, left to right.
    pub statuses: Vec<Status>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout_secs: None,
            on_persist_failure: RollbackPolicy::default(),
            log_level: "info".to_string(),
            statuses: default_statuses(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Option<std::time::Duration> {
        self.request_timeout_secs.map(std::time::Duration::from_secs)
    }
}

pub fn default_statuses() -> Vec<Status> {
    [(1, "TODO"), (2, "In Progress"), (3, "Review"), (4, "Completed")]
        .into_iter()
        .map(|(id, name)| Status { id, name: name.to_string() })
        .collect()
}
