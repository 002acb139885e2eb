use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::api::types::User;
use crate::config::ClientConfig;

/// Overrides the config directory, mainly for tests and multiple accounts.
pub const HOME_ENV: &str = "TASKMATRIX_HOME";

const CONFIG_FILE: &str = "config.toml";
const SESSION_FILE: &str = "session.toml";
pub const LOG_FILE: &str = "taskmatrix.log";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("invalid {path}: {source}")]
    TomlDe {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no config directory found; set {HOME_ENV}")]
    NoConfigDir,
}

/// The logged-in user and their token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

/// Resolve the client's directory: `$TASKMATRIX_HOME`, else
/// `<config_dir>/taskmatrix`. The directory is not created.
pub fn config_dir() -> Result<PathBuf, StorageError> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    dirs::config_dir()
        .map(|d| d.join("taskmatrix"))
        .ok_or(StorageError::NoConfigDir)
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    toml::from_str(&content)
        .map(Some)
        .map_err(|source| StorageError::TomlDe { path: path.to_path_buf(), source })
}

/// Load `config.toml`. A missing file yields the defaults.
pub fn load_config(dir: &Path) -> Result<ClientConfig, StorageError> {
    Ok(read_toml(&dir.join(CONFIG_FILE))?.unwrap_or_default())
}

pub fn save_config(dir: &Path, config: &ClientConfig) -> Result<(), StorageError> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(CONFIG_FILE), toml::to_string_pretty(config)?)?;
    Ok(())
}

/// Load the stored session, if someone is logged in.
pub fn load_session(dir: &Path) -> Result<Option<Session>, StorageError> {
    read_toml(&dir.join(SESSION_FILE))
}

/// Store a session. The file holds a bearer token, so on Unix it is made
/// readable by the owner only.
pub fn save_session(dir: &Path, session: &Session) -> Result<(), StorageError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(SESSION_FILE);
    fs::write(&path, toml::to_string_pretty(session)?)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Remove the stored session. Returns whether there was one.
pub fn clear_session(dir: &Path) -> Result<bool, StorageError> {
    match fs::remove_file(dir.join(SESSION_FILE)) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::persist::RollbackPolicy;

    fn session() -> Session {
        Session {
            token: "abc.def".into(),
            user: User { id: 3, name: "Ada".into(), username: "ada".into(), avatar_url: String::new() },
        }
    }

    #[test]
    fn missing_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(dir.path()).unwrap(), ClientConfig::default());
    }

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            server_url: "http://tasks.local:9000".into(),
            request_timeout_secs: Some(3),
            on_persist_failure: RollbackPolicy::Keep,
            ..Default::default()
        };
        save_config(dir.path(), &config).unwrap();
        assert_eq!(load_config(dir.path()).unwrap(), config);
    }

    #[test]
    fn broken_config_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.toml"), "server_url = ").unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::TomlDe { .. }));
        assert!(err.to_string().contains("config.toml"), "{err}");
    }

    #[test]
    fn session_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("nested");
        assert_eq!(load_session(&home).unwrap(), None);

        save_session(&home, &session()).unwrap();
        assert_eq!(load_session(&home).unwrap(), Some(session()));

        assert!(clear_session(&home).unwrap());
        assert!(!clear_session(&home).unwrap());
        assert_eq!(load_session(&home).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn session_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        save_session(dir.path(), &session()).unwrap();
        let mode = fs::metadata(dir.path().join("session.toml")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
