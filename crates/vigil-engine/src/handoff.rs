//! Cross-cycle handoff: a persisted "next task" instruction.
//!
//! When the orchestrator's free-text output contains a `NEXT_TASK:` line,
//! the stated intent is saved with an expiry so the following cycle — or a
//! restarted process — resumes it, keyed off the saved session id.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vigil_core::{io, paths, Result};

const HANDOFF_VERSION: u32 = 1;
const MARKER: &str = "NEXT_TASK:";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub version: u32,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub saved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Extract the stated next task from orchestrator output, if any.
/// The last `NEXT_TASK:` line wins.
pub fn extract_next_task(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix(MARKER))
        .map(str::trim)
        .filter(|task| !task.is_empty())
        .last()
        .map(str::to_owned)
}

pub struct HandoffStore {
    path: PathBuf,
}

impl HandoffStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: paths::handoff_path(root),
        }
    }

    pub fn save(&self, task: &str, session_id: Option<&str>, ttl: Duration) -> Result<Handoff> {
        let now = Utc::now();
        let handoff = Handoff {
            version: HANDOFF_VERSION,
            task: task.to_owned(),
            session_id: session_id.map(str::to_owned),
            saved_at: now,
            expires_at: now + ttl,
        };
        io::save_yaml(&self.path, &handoff)?;
        Ok(handoff)
    }

    /// Load the pending handoff. Expired records are removed and `None` is
    /// returned.
    pub fn load(&self) -> Result<Option<Handoff>> {
        let Some(handoff) = io::load_yaml::<Handoff>(&self.path)? else {
            return Ok(None);
        };
        if handoff.expires_at <= Utc::now() {
            self.clear()?;
            return Ok(None);
        }
        Ok(Some(handoff))
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn extracts_marker_line() {
        let output = "did some work\nNEXT_TASK: follow up on the draft\ndone";
        assert_eq!(
            extract_next_task(output).as_deref(),
            Some("follow up on the draft")
        );
    }

    #[test]
    fn last_marker_wins() {
        let output = "NEXT_TASK: first\nNEXT_TASK: second";
        assert_eq!(extract_next_task(output).as_deref(), Some("second"));
    }

    #[test]
    fn no_marker_is_none() {
        assert!(extract_next_task("plain output, nothing stated").is_none());
        assert!(extract_next_task("NEXT_TASK:   ").is_none());
    }

    #[test]
    fn save_load_within_ttl() {
        let dir = TempDir::new().unwrap();
        let store = HandoffStore::new(dir.path());
        store
            .save("resume the sync", Some("s-1"), Duration::hours(4))
            .unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.task, "resume the sync");
        assert_eq!(loaded.session_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn expired_handoff_is_dropped() {
        let dir = TempDir::new().unwrap();
        let store = HandoffStore::new(dir.path());
        store
            .save("stale intent", None, Duration::seconds(-1))
            .unwrap();

        assert!(store.load().unwrap().is_none());
        // And the file is gone, so a second load doesn't see it either.
        assert!(store.load().unwrap().is_none());
    }
}
