use serde::{Deserialize, Serialize};

/// Request checks applied by the [`RevisionStore`](crate::RevisionStore)
/// before it writes anything.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevisionStoreConfig {
    /// Reject appends whose commit message is empty or whitespace.
    pub require_commit_message: bool,
    /// Largest accepted upload, in bytes. `None` means unbounded.
    pub max_content_bytes: Option<usize>,
}

impl Default for RevisionStoreConfig {
    fn default() -> Self {
        Self {
            require_commit_message: true,
            max_content_bytes: None,
        }
    }
}

impl RevisionStoreConfig {
    /// Accept every request shape.
    pub fn permissive() -> Self {
        Self {
            require_commit_message: false,
            max_content_bytes: None,
        }
    }
}
