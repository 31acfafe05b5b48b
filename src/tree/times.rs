//! The four timestamps every group and entry carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creation, modification, access, and expiry times.
///
/// `expires` is `None` for nodes that never expire (the legacy dialect
/// stores this as a zero timestamp).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Times {
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
}

impl Times {
    /// Fresh timestamps for a newly created node.
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created: now,
            modified: now,
            accessed: now,
            expires: None,
        }
    }

    /// Mark the node as modified (and accessed) now.
    pub fn touch_modified(&mut self) {
        let now = Utc::now();
        self.modified = now;
        self.accessed = now;
    }
}

impl Default for Times {
    fn default() -> Self {
        Self::now()
    }
}
