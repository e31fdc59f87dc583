//! Engine session persistence.
//!
//! A small versioned record saved every cycle so a restarted process knows
//! which orchestrator session and goal it was driving, and how many cycles
//! it has run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vigil_core::{io, paths, Result};

const SESSION_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSession {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    pub cycle_count: u64,
    pub saved_at: DateTime<Utc>,
}

impl Default for EngineSession {
    fn default() -> Self {
        Self {
            version: SESSION_VERSION,
            session_id: None,
            goal_id: None,
            cycle_count: 0,
            saved_at: Utc::now(),
        }
    }
}

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: paths::session_path(root),
        }
    }

    /// Load the previous session, or a fresh default if none exists.
    pub fn load(&self) -> Result<EngineSession> {
        Ok(io::load_yaml(&self.path)?.unwrap_or_default())
    }

    pub fn save(&self, session: &EngineSession) -> Result<()> {
        io::save_yaml(&self.path, session)
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
    fn load_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.load().unwrap();
        assert_eq!(session.cycle_count, 0);
        assert!(session.session_id.is_none());
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let session = EngineSession {
            session_id: Some("s-42".into()),
            goal_id: Some("g1".into()),
            cycle_count: 7,
            ..Default::default()
        };
        store.save(&session).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.session_id.as_deref(), Some("s-42"));
        assert_eq!(loaded.goal_id.as_deref(), Some("g1"));
        assert_eq!(loaded.cycle_count, 7);
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        store.clear().unwrap();
        store.save(&EngineSession::default()).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap().cycle_count, 0);
    }
}
