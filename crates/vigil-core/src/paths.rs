//! All `.vigil/` file locations in one place.

use std::path::{Path, PathBuf};

pub fn vigil_dir(root: &Path) -> PathBuf {
    root.join(".vigil")
}

pub fn config_path(root: &Path) -> PathBuf {
    vigil_dir(root).join("config.yaml")
}

/// Full scheduler snapshot (queue, scheduled, blocked, completed, context).
pub fn scheduler_path(root: &Path) -> PathBuf {
    vigil_dir(root).join("scheduler.yaml")
}

/// Engine session record (session id, goal id, cycle count).
pub fn session_path(root: &Path) -> PathBuf {
    vigil_dir(root).join("session.yaml")
}

/// Persisted cross-cycle handoff instruction.
pub fn handoff_path(root: &Path) -> PathBuf {
    vigil_dir(root).join("handoff.yaml")
}

/// Shared lease record contested by all instances.
pub fn lease_path(root: &Path) -> PathBuf {
    vigil_dir(root).join("lease.yaml")
}

/// Lock file guarding the lease read-modify-write critical section.
pub fn lease_lock_path(root: &Path) -> PathBuf {
    vigil_dir(root).join("lease.lock")
}

/// Local mirror of this instance's view of the lease.
pub fn lease_mirror_path(root: &Path) -> PathBuf {
    vigil_dir(root).join("lease-mirror.yaml")
}

pub fn approvals_dir(root: &Path) -> PathBuf {
    vigil_dir(root).join("approvals")
}

pub fn approval_path(root: &Path, goal_id: &str) -> PathBuf {
    approvals_dir(root).join(format!("{goal_id}.yaml"))
}
