use serde::{Deserialize, Serialize};

/// Status of the remote asynchronous task. The server reports install runs
/// with `SUCCESSFUL` where precheck runs use `FINISHED`; both partition the
/// same way into not-done / done-ok / done-fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Finished,
    Failed,
    Successful,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Finished | TaskStatus::Failed | TaskStatus::Successful
        )
    }

    pub fn is_failed(self) -> bool {
        matches!(self, TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Finished => write!(f, "finished"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Successful => write!(f, "successful"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemStatus {
    Pending,
    Running,
    Finished,
}

/// Result of one finished item. Precheck items report `PASSED`, install
/// items report `SUCCESSFUL`; the engine only distinguishes failed from
/// not-failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemResult {
    Passed,
    Successful,
    Failed,
}

impl ItemResult {
    pub fn is_failed(self) -> bool {
        matches!(self, ItemResult::Failed)
    }
}

/// One discrete check or install unit reported by the server. `code`,
/// `description` and `advisement` are diagnostic payload the engine carries
/// through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckItem {
    pub name: String,
    pub server: String,
    pub status: ItemStatus,
    #[serde(default)]
    pub result: Option<ItemResult>,
    #[serde(default)]
    pub recoverable: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub advisement: Option<String>,
}

impl CheckItem {
    pub fn is_failed(&self) -> bool {
        self.result.map(ItemResult::is_failed).unwrap_or(false)
    }
}

/// One polled status snapshot. The server reissues the complete item list on
/// every poll; snapshots replace each other, they are never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    #[serde(default)]
    pub finished: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub all_passed: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "info")]
    pub items: Vec<CheckItem>,
}

impl TaskSnapshot {
    /// Authoritative completion fraction; a zero total displays as zero.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.finished as f64 / self.total as f64
    }

    /// Valid only once the task has reached a terminal, non-error state.
    pub fn passed(&self) -> bool {
        self.all_passed.unwrap_or(false)
    }
}

/// One configuration mutation performed by the remote auto-repair action. A
/// non-empty list means the canonical configuration must be re-fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverAction {
    pub name: String,
    #[serde(default)]
    pub old_value: Option<String>,
    #[serde(default)]
    pub new_value: Option<String>,
}
