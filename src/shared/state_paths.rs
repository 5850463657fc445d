use crate::shared::errors::StateError;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_STATE_ROOT_DIR: &str = ".helmsman";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn engine_log_file(&self) -> PathBuf {
        self.root.join("logs/engine.log")
    }

    pub fn status_file(&self) -> PathBuf {
        self.root.join("state/deploy_status.json")
    }

    pub fn required_directories(&self) -> Vec<PathBuf> {
        vec![
            self.root.clone(),
            self.root.join("logs"),
            self.root.join("state"),
        ]
    }
}

pub fn default_state_root_path() -> Result<PathBuf, StateError> {
    let home = std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .ok_or(StateError::HomeDirectoryUnavailable)?;
    Ok(PathBuf::from(home).join(DEFAULT_STATE_ROOT_DIR))
}

pub fn bootstrap_state_root(paths: &StatePaths) -> Result<(), StateError> {
    for dir in paths.required_directories() {
        fs::create_dir_all(&dir).map_err(|source| StateError::CreateDir {
            path: dir.display().to_string(),
            source,
        })?;
    }
    Ok(())
}
