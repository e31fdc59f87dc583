//! File-backed approval gate for non-trivial goals.
//!
//! The engine writes a pending request under `.vigil/approvals/`; a human
//! answers it with `vigil approve`/`vigil reject` from any terminal. The
//! engine polls the decision each cycle — no IPC needed, and the gate
//! survives restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vigil_core::{io, paths, Result};

const APPROVAL_VERSION: u32 = 1;

/// Goals whose title starts with (or contains) one of these verbs are
/// read-only enough to skip approval.
const EXEMPT_KEYWORDS: &[&str] = &["research", "analyze", "analyse", "review", "monitor"];

/// Keyword heuristic: does this goal need a human sign-off before starting?
pub fn requires_approval(title: &str) -> bool {
    let lower = title.to_lowercase();
    !EXEMPT_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub version: u32,
    pub goal_id: String,
    pub title: String,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

pub struct ApprovalGate {
    root: PathBuf,
}

impl ApprovalGate {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn path(&self, goal_id: &str) -> PathBuf {
        paths::approval_path(&self.root, goal_id)
    }

    /// Create a pending request if none exists yet. Returns the current
    /// request either way.
    pub fn request(&self, goal_id: &str, title: &str) -> Result<ApprovalRequest> {
        if let Some(existing) = self.status(goal_id)? {
            return Ok(existing);
        }
        let request = ApprovalRequest {
            version: APPROVAL_VERSION,
            goal_id: goal_id.to_owned(),
            title: title.to_owned(),
            status: ApprovalStatus::Pending,
            requested_at: Utc::now(),
            decided_at: None,
        };
        io::save_yaml(&self.path(goal_id), &request)?;
        Ok(request)
    }

    pub fn status(&self, goal_id: &str) -> Result<Option<ApprovalRequest>> {
        io::load_yaml(&self.path(goal_id))
    }

    pub fn decide(&self, goal_id: &str, approved: bool) -> Result<Option<ApprovalRequest>> {
        let Some(mut request) = self.status(goal_id)? else {
            return Ok(None);
        };
        request.status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        request.decided_at = Some(Utc::now());
        io::save_yaml(&self.path(goal_id), &request)?;
        Ok(Some(request))
    }

    pub fn clear(&self, goal_id: &str) -> Result<()> {
        let path = self.path(goal_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}
