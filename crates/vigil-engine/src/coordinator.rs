//! Lease-based worker election across daemon instances.
//!
//! All instances contest a single lease record on shared storage. The
//! holder runs in worker mode and renews the lease on a heartbeat; everyone
//! else watches in viewer mode and takes over once the heartbeat goes
//! stale. Every ownership change bumps a fence token, and every write is a
//! compare-and-swap against the fence last observed, so two instances that
//! both see a stale lease cannot both win.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vigil_core::config::LeaseConfig;
use vigil_core::events::{EngineEvent, EventBus};
use vigil_core::{io, paths, Result, VigilError};

/// A lock file untouched for this long belongs to a dead process.
const LOCK_STALE_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Lease record and store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub worker_id: String,
    pub hostname: String,
    /// Bumped on every ownership change, never on renewal.
    pub fence: u64,
    pub claimed_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl LeaseRecord {
    pub fn is_stale(&self, stale_after: Duration) -> bool {
        let age = Utc::now() - self.last_heartbeat;
        age >= chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::zero())
    }
}

/// Storage contract for the contested lease. `compare_and_swap` must be
/// atomic with respect to concurrent callers; `Ok(false)` means the fence
/// moved underneath us and the write was not applied.
#[async_trait::async_trait]
pub trait LeaseStore: Send + Sync {
    async fn read(&self) -> Result<Option<LeaseRecord>>;

    /// Write `record` only if the stored fence matches `expected`
    /// (`None` = no lease on disk).
    async fn compare_and_swap(&self, expected: Option<u64>, record: &LeaseRecord) -> Result<bool>;

    /// Remove the lease if `worker_id` still owns it. Returns whether a
    /// record was removed.
    async fn delete_if_owner(&self, worker_id: &str) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// FileLeaseStore
// ---------------------------------------------------------------------------

/// Lease store over a shared filesystem (NFS mount, synced directory).
///
/// A `create_new` lock file serializes the read-modify-write; the lease
/// itself is written with the atomic write-replace used for all state
/// files, so readers never observe a torn record.
pub struct FileLeaseStore {
    lease: PathBuf,
    lock: PathBuf,
}

impl FileLeaseStore {
    pub fn new(root: &Path) -> Self {
        Self {
            lease: paths::lease_path(root),
            lock: paths::lease_lock_path(root),
        }
    }

    fn acquire_lock(&self) -> Result<LockGuard> {
        if let Some(parent) = self.lock.parent() {
            io::ensure_dir(parent)?;
        }
        for attempt in 0..2 {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock)
            {
                Ok(_) => return Ok(LockGuard(self.lock.clone())),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt == 0 && self.lock_is_stale() {
                        warn!(lock = %self.lock.display(), "removing stale lease lock");
                        let _ = std::fs::remove_file(&self.lock);
                        continue;
                    }
                    return Err(VigilError::LeaseLockBusy(self.lock.display().to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(VigilError::LeaseLockBusy(self.lock.display().to_string()))
    }

    fn lock_is_stale(&self) -> bool {
        std::fs::metadata(&self.lock)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| mtime.elapsed().ok())
            .map(|age| age.as_secs() >= LOCK_STALE_SECS)
            .unwrap_or(false)
    }

    fn read_record(&self) -> Result<Option<LeaseRecord>> {
        io::load_yaml(&self.lease)
    }
}

/// Removes the lock file on drop so a panic inside the critical section
/// cannot wedge the store for longer than the stale-lock window.
struct LockGuard(PathBuf);

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[async_trait::async_trait]
impl LeaseStore for FileLeaseStore {
    async fn read(&self) -> Result<Option<LeaseRecord>> {
        self.read_record()
    }

    async fn compare_and_swap(&self, expected: Option<u64>, record: &LeaseRecord) -> Result<bool> {
        let _guard = self.acquire_lock()?;
        let current = self.read_record()?;
        if current.as_ref().map(|r| r.fence) != expected {
            return Ok(false);
        }
        io::save_yaml(&self.lease, record)?;
        Ok(true)
    }

    async fn delete_if_owner(&self, worker_id: &str) -> Result<bool> {
        let _guard = self.acquire_lock()?;
        match self.read_record()? {
            Some(r) if r.worker_id == worker_id => {
                std::fs::remove_file(&self.lease)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerCoordinator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Startup state, before the first election pass.
    Pending,
    Worker,
    Viewer,
}

impl WorkerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerMode::Pending => "pending",
            WorkerMode::Worker => "worker",
            WorkerMode::Viewer => "viewer",
        }
    }
}

/// Local snapshot of this instance's view of the election, written next to
/// the lease so `vigil status` works without touching the contested file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseMirror {
    worker_id: String,
    mode: String,
    fence: u64,
    updated_at: DateTime<Utc>,
}

pub struct WorkerCoordinator {
    instance_id: String,
    hostname: String,
    store: Arc<dyn LeaseStore>,
    config: LeaseConfig,
    events: EventBus,
    mode: Mutex<WorkerMode>,
    /// Fence under which we hold the lease; meaningless outside worker mode.
    fence: AtomicU64,
    mirror_path: PathBuf,
}

impl WorkerCoordinator {
    pub fn new(
        root: &Path,
        store: Arc<dyn LeaseStore>,
        config: LeaseConfig,
        events: EventBus,
    ) -> Self {
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_owned());
        Self {
            instance_id: Uuid::new_v4().to_string(),
            hostname,
            store,
            config,
            events,
            mode: Mutex::new(WorkerMode::Pending),
            fence: AtomicU64::new(0),
            mirror_path: paths::lease_mirror_path(root),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn mode(&self) -> WorkerMode {
        *self.mode.lock().unwrap()
    }

    pub fn should_execute(&self) -> bool {
        self.mode() == WorkerMode::Worker
    }

    pub fn is_viewer(&self) -> bool {
        self.mode() == WorkerMode::Viewer
    }

    /// First election pass. Store failures leave us in viewer mode rather
    /// than aborting startup.
    pub async fn initialize(&self) -> WorkerMode {
        match self.evaluate().await {
            Ok(mode) => mode,
            Err(e) => {
                warn!(error = %e, "lease store unavailable, staying in viewer mode");
                self.set_mode(WorkerMode::Viewer);
                WorkerMode::Viewer
            }
        }
    }

    /// One election step: claim an absent or stale lease, recognize our own,
    /// defer to a fresh foreign one.
    pub async fn evaluate(&self) -> Result<WorkerMode> {
        let current = self.store.read().await?;
        match current {
            None => self.attempt_claim(None, 1).await,
            Some(r) if r.worker_id == self.instance_id => {
                self.set_mode(WorkerMode::Worker);
                Ok(WorkerMode::Worker)
            }
            Some(r) if r.is_stale(self.stale_after()) => {
                info!(
                    previous = %r.worker_id,
                    fence = r.fence,
                    "lease heartbeat is stale, attempting takeover"
                );
                self.attempt_claim(Some(r.fence), r.fence + 1).await
            }
            Some(r) => {
                debug!(holder = %r.worker_id, "lease held by a live worker");
                self.set_mode(WorkerMode::Viewer);
                Ok(WorkerMode::Viewer)
            }
        }
    }

    /// Claim after a randomized delay, so simultaneous starters spread out
    /// and mostly observe the winner instead of racing the CAS.
    async fn attempt_claim(&self, expected: Option<u64>, new_fence: u64) -> Result<WorkerMode> {
        let jitter_max = self.config.election_jitter_max_secs;
        if jitter_max > 0 {
            let delay = rand::thread_rng().gen_range(0..=jitter_max * 1000);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let now = Utc::now();
        let record = LeaseRecord {
            worker_id: self.instance_id.clone(),
            hostname: self.hostname.clone(),
            fence: new_fence,
            claimed_at: now,
            last_heartbeat: now,
        };
        if self.store.compare_and_swap(expected, &record).await? {
            info!(fence = new_fence, "claimed the worker lease");
            self.fence.store(new_fence, Ordering::SeqCst);
            self.set_mode(WorkerMode::Worker);
            Ok(WorkerMode::Worker)
        } else {
            debug!("lost the lease race");
            self.set_mode(WorkerMode::Viewer);
            Ok(WorkerMode::Viewer)
        }
    }

    /// Periodic step. Workers renew their lease; viewers re-run the
    /// election. Any renewal failure demotes to viewer immediately.
    pub async fn heartbeat(&self) {
        match self.mode() {
            WorkerMode::Worker => {
                if let Err(e) = self.renew().await {
                    warn!(error = %e, "lease renewal failed, demoting to viewer");
                    self.set_mode(WorkerMode::Viewer);
                }
            }
            WorkerMode::Pending | WorkerMode::Viewer => {
                if let Err(e) = self.evaluate().await {
                    warn!(error = %e, "lease evaluation failed");
                    self.set_mode(WorkerMode::Viewer);
                }
            }
        }
    }

    async fn renew(&self) -> Result<()> {
        let fence = self.fence.load(Ordering::SeqCst);
        let now = Utc::now();
        let record = LeaseRecord {
            worker_id: self.instance_id.clone(),
            hostname: self.hostname.clone(),
            fence,
            claimed_at: now,
            last_heartbeat: now,
        };
        if self.store.compare_and_swap(Some(fence), &record).await? {
            debug!(fence, "lease renewed");
            Ok(())
        } else {
            // Someone took over under a new fence while we were away.
            Err(VigilError::LeaseStore(
                "fence moved during renewal".to_owned(),
            ))
        }
    }

    /// Background heartbeat loop at the configured interval.
    pub fn run(self: Arc<Self>) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.heartbeat_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.heartbeat().await;
            }
        })
    }

    /// Graceful release so a peer can take over without waiting out the
    /// staleness window.
    pub async fn shutdown(&self) {
        if self.mode() == WorkerMode::Worker {
            match self.store.delete_if_owner(&self.instance_id).await {
                Ok(true) => info!("released the worker lease"),
                Ok(false) => debug!("lease already gone at shutdown"),
                Err(e) => warn!(error = %e, "failed to release lease at shutdown"),
            }
        }
        self.set_mode(WorkerMode::Viewer);
    }

    fn set_mode(&self, mode: WorkerMode) {
        let mut current = self.mode.lock().unwrap();
        if *current != mode {
            info!(from = current.as_str(), to = mode.as_str(), "mode change");
            *current = mode;
            self.events.emit(EngineEvent::ModeChanged {
                mode: mode.as_str().to_owned(),
            });
        }
        drop(current);
        self.write_mirror(mode);
    }

    fn write_mirror(&self, mode: WorkerMode) {
        let mirror = LeaseMirror {
            worker_id: self.instance_id.clone(),
            mode: mode.as_str().to_owned(),
            fence: self.fence.load(Ordering::SeqCst),
            updated_at: Utc::now(),
        };
        if let Err(e) = io::save_yaml(&self.mirror_path, &mirror) {
            warn!(error = %e, "failed to write lease mirror");
        }
    }

    fn stale_after(&self) -> Duration {
        Duration::from_secs(self.config.stale_secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
