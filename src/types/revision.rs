// ABOUTME: A commit reference recorded for one component at a point in time.
// ABOUTME: Revision histories drive rollback target resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CommitRef, ComponentName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub component: ComponentName,
    pub commit: CommitRef,
    pub recorded_at: DateTime<Utc>,
}

impl Revision {
    pub fn new(component: ComponentName, commit: CommitRef) -> Self {
        Self {
            component,
            commit,
            recorded_at: Utc::now(),
        }
    }
}
