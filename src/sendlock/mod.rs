//! Cross-process send lock guarding the single outbound channel
//!
//! Monitors may run as independent OS processes, so the lock state lives in
//! a JSON file under the work directory and every read-modify-write happens
//! under an exclusive `fs2` lock on a sidecar guard file. There is no
//! implicit reset: state persists until an operator runs `weft lock reset`.
//!
//! A duplicate acquisition attempt is rejected outright rather than queued:
//! a second, redundant delivery on the shared channel is worse than a caller
//! giving up this cycle.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const STATE_FILE: &str = "send-lock.json";
const GUARD_FILE: &str = "send-lock.guard";

/// Bounded length of the recent-event ring.
const RECENT_EVENT_CAP: usize = 32;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to access lock state: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock state file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEventKind {
    Acquired,
    Released,
    DuplicateBlocked,
    ForcedRelease,
    MismatchedRelease,
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEvent {
    pub at: DateTime<Utc>,
    pub kind: LockEventKind,
    pub holder: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockMetrics {
    pub acquisitions: u64,
    pub releases: u64,
    pub duplicates_blocked: u64,
    pub forced_releases: u64,
    #[serde(default)]
    pub recent: VecDeque<LockEvent>,
}

impl LockMetrics {
    fn record(&mut self, at: DateTime<Utc>, kind: LockEventKind, holder: &str) {
        self.recent.push_back(LockEvent {
            at,
            kind,
            holder: holder.to_string(),
        });
        while self.recent.len() > RECENT_EVENT_CAP {
            self.recent.pop_front();
        }
    }

    /// Fraction of acquisitions that were matched by a clean release.
    pub fn efficiency(&self) -> f64 {
        if self.acquisitions == 0 {
            return 1.0;
        }
        self.releases as f64 / self.acquisitions as f64
    }

    /// Fraction of acquisition attempts rejected as duplicates.
    pub fn duplicate_rate(&self) -> f64 {
        let attempts = self.acquisitions + self.duplicates_blocked;
        if attempts == 0 {
            return 0.0;
        }
        self.duplicates_blocked as f64 / attempts as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockState {
    pub holder: Option<String>,
    pub acquired_at: Option<DateTime<Utc>>,
    pub cooldown_until: DateTime<Utc>,
    pub metrics: LockMetrics,
}

impl Default for LockState {
    fn default() -> Self {
        Self {
            holder: None,
            acquired_at: None,
            cooldown_until: DateTime::<Utc>::MIN_UTC,
            metrics: LockMetrics::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SendLockConfig {
    /// Quiescent window opened by every clean release.
    pub cooldown: Duration,
    /// Hold duration after which the next acquisition attempt evicts the
    /// holder. An order of magnitude above any legitimate hold.
    pub force_release_after: Duration,
}

impl Default for SendLockConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(3),
            force_release_after: Duration::from_secs(300),
        }
    }
}

/// File-backed mutual exclusion over the shared outbound channel.
///
/// One instance per work directory; instances in different processes pointed
/// at the same directory observe the same state.
pub struct SendLock {
    state_path: PathBuf,
    guard_path: PathBuf,
    config: SendLockConfig,
}

impl SendLock {
    pub fn new(work_dir: &Path, config: SendLockConfig) -> Result<Self, LockError> {
        fs::create_dir_all(work_dir)?;
        Ok(Self {
            state_path: work_dir.join(STATE_FILE),
            guard_path: work_dir.join(GUARD_FILE),
            config,
        })
    }

    /// Non-blocking acquisition attempt.
    ///
    /// Returns `true` only if no holder exists and the cooldown window has
    /// elapsed. Any other condition returns `false` immediately and counts as
    /// a blocked duplicate; callers must treat that as "skip this attempt".
    pub fn try_acquire(&self, holder_id: &str) -> Result<bool, LockError> {
        let force_after = self.config.force_release_after;
        self.with_state(|state| {
            let now = Utc::now();

            // Forced-release safety valve for a holder that leaked its lock.
            if let (Some(holder), Some(acquired_at)) = (state.holder.clone(), state.acquired_at) {
                let held = (now - acquired_at).to_std().unwrap_or(Duration::ZERO);
                if held >= force_after {
                    warn!(
                        stale_holder = %holder,
                        held_secs = held.as_secs(),
                        "forcing release of stale send lock holder"
                    );
                    state.holder = None;
                    state.acquired_at = None;
                    // The window is set (release invariant) but already
                    // elapsed, so this same attempt proceeds fresh.
                    state.cooldown_until = now;
                    state.metrics.forced_releases += 1;
                    state.metrics.record(now, LockEventKind::ForcedRelease, &holder);
                }
            }

            if state.holder.is_some() || now < state.cooldown_until {
                state.metrics.duplicates_blocked += 1;
                state
                    .metrics
                    .record(now, LockEventKind::DuplicateBlocked, holder_id);
                debug!(holder = %holder_id, "send lock busy or cooling down, attempt dropped");
                false
            } else {
                state.holder = Some(holder_id.to_string());
                state.acquired_at = Some(now);
                state.metrics.acquisitions += 1;
                state.metrics.record(now, LockEventKind::Acquired, holder_id);
                debug!(holder = %holder_id, "send lock acquired");
                true
            }
        })
    }

    /// Release by the current holder. A stale or duplicate release is a
    /// logged no-op, never an error. Every successful release opens a new
    /// cooldown window.
    pub fn release(&self, holder_id: &str) -> Result<bool, LockError> {
        let cooldown = chrono::Duration::from_std(self.config.cooldown)
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1_000));
        self.with_state(|state| {
            let now = Utc::now();
            match state.holder.as_deref() {
                Some(current) if current == holder_id => {
                    state.holder = None;
                    state.acquired_at = None;
                    state.cooldown_until = now + cooldown;
                    state.metrics.releases += 1;
                    state.metrics.record(now, LockEventKind::Released, holder_id);
                    debug!(holder = %holder_id, "send lock released");
                    true
                }
                Some(current) => {
                    warn!(
                        held_by = %current,
                        caller = %holder_id,
                        "release attempted by non-holder, ignoring"
                    );
                    state
                        .metrics
                        .record(now, LockEventKind::MismatchedRelease, holder_id);
                    false
                }
                None => {
                    warn!(caller = %holder_id, "release attempted while unlocked, ignoring");
                    state
                        .metrics
                        .record(now, LockEventKind::MismatchedRelease, holder_id);
                    false
                }
            }
        })
    }

    /// Acquire as an RAII permit that releases on every exit path.
    pub fn permit(&self, holder_id: &str) -> Result<Option<SendPermit<'_>>, LockError> {
        if self.try_acquire(holder_id)? {
            Ok(Some(SendPermit {
                lock: self,
                holder: holder_id.to_string(),
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Read-only view of the shared state.
    pub fn state(&self) -> Result<LockState, LockError> {
        self.with_state(|state| state.clone())
    }

    /// Explicit operator reset. Never called implicitly.
    pub fn reset(&self) -> Result<(), LockError> {
        self.with_state(|state| {
            let now = Utc::now();
            let mut fresh = LockState::default();
            fresh.metrics.record(now, LockEventKind::Reset, "operator");
            *state = fresh;
        })
    }

    /// Run `f` over the shared state under the exclusive file lock, then
    /// persist the result atomically.
    fn with_state<R>(&self, f: impl FnOnce(&mut LockState) -> R) -> Result<R, LockError> {
        let guard = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.guard_path)?;
        guard.lock_exclusive()?;

        let result: Result<R, LockError> = (|| {
            let mut state = self.load_state()?;
            let value = f(&mut state);
            self.persist_state(&state)?;
            Ok(value)
        })();

        let _ = FileExt::unlock(&guard);
        result
    }

    fn load_state(&self) -> Result<LockState, LockError> {
        match fs::read(&self.state_path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(LockState::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn persist_state(&self, state: &LockState) -> Result<(), LockError> {
        let tmp_path = self.state_path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(state)?;
        {
            let mut tmp = File::create(&tmp_path)?;
            use std::io::Write;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.state_path)?;
        Ok(())
    }
}

/// RAII guard over an acquired lock. Dropping it releases, so the guarded
/// operation releases on success, failure and panic alike; a leaked holder
/// from a dead process is covered by the forced-release valve.
pub struct SendPermit<'a> {
    lock: &'a SendLock,
    holder: String,
    released: bool,
}

impl SendPermit<'_> {
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Explicit release, surfacing any state-file error to the caller.
    pub fn release(mut self) -> Result<bool, LockError> {
        self.released = true;
        self.lock.release(&self.holder)
    }
}

impl Drop for SendPermit<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = self.lock.release(&self.holder) {
                warn!(holder = %self.holder, error = %err, "failed to release send lock on drop");
            }
        }
    }
}
