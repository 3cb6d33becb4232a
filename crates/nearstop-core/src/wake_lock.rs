//! Best-effort wake lock held while a session is armed.
//!
//! Failing to obtain a wake lock never stops monitoring; the session just
//! runs without one.

use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Why a wake lock could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WakeLockError {
    /// The platform has no wake lock capability.
    #[error("Wake lock not supported on this platform")]
    Unsupported,

    /// The platform refused or failed the request.
    #[error("Wake lock request failed: {0}")]
    RequestFailed(String),
}

/// Platform capability that can keep the device awake.
pub trait WakeLockProvider: Send + Sync {
    /// Request a wake lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the capability is missing or the request fails.
    fn request(&self) -> Result<Box<dyn WakeLockGuard>, WakeLockError>;
}

/// A held platform wake lock.
pub trait WakeLockGuard: Send {
    /// Give the wake lock back to the platform.
    fn release(&mut self);
}

/// Owned wake lock token. Released on [`release`](Self::release) or drop.
pub struct WakeLockHandle {
    guard: Option<Box<dyn WakeLockGuard>>,
}

impl WakeLockHandle {
    /// Release the wake lock. Further calls do nothing.
    pub fn release(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            guard.release();
            debug!("Wake lock released");
        }
    }

    /// Whether the wake lock is still held.
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.guard.is_some()
    }
}

impl Drop for WakeLockHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for WakeLockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeLockHandle")
            .field("held", &self.is_held())
            .finish()
    }
}

/// Acquires and releases wake locks on behalf of the monitoring session.
#[derive(Clone)]
pub struct WakeLockManager {
    provider: Option<Arc<dyn WakeLockProvider>>,
}

impl WakeLockManager {
    /// Manage wake locks from `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn WakeLockProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// A manager that never acquires anything.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { provider: None }
    }

    /// Try to acquire a wake lock. Returns `None` if unavailable.
    #[must_use]
    pub fn acquire(&self) -> Option<WakeLockHandle> {
        let Some(provider) = &self.provider else {
            debug!("Wake lock disabled");
            return None;
        };
        match provider.request() {
            Ok(guard) => {
                info!("Wake lock acquired");
                Some(WakeLockHandle { guard: Some(guard) })
            }
            Err(error) => {
                warn!(%error, "Wake lock unavailable; continuing without it");
                None
            }
        }
    }

    /// Release `handle` if there is one.
    pub fn release(&self, handle: Option<WakeLockHandle>) {
        if let Some(mut handle) = handle {
            handle.release();
        }
    }
}

impl Default for WakeLockManager {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Provider for platforms without any wake lock capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWakeLock;

impl WakeLockProvider for NoWakeLock {
    fn request(&self) -> Result<Box<dyn WakeLockGuard>, WakeLockError> {
        Err(WakeLockError::Unsupported)
    }
}

/// Holds a systemd idle/sleep inhibitor for as long as the lock is held.
///
/// Runs `systemd-inhibit … sleep infinity` and kills it on release.
#[derive(Debug, Clone)]
pub struct InhibitWakeLock {
    program: String,
    reason: String,
}

impl InhibitWakeLock {
    /// Use `systemd-inhibit` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("systemd-inhibit")
    }

    /// Use a specific inhibitor binary.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            reason: "Station proximity alarm armed".to_string(),
        }
    }
}

impl Default for InhibitWakeLock {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeLockProvider for InhibitWakeLock {
    fn request(&self) -> Result<Box<dyn WakeLockGuard>, WakeLockError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(WakeLockError::RequestFailed(
                "no async runtime to supervise the inhibitor".to_string(),
            ));
        }

        let mut child = Command::new(&self.program)
            .arg("--what=idle:sleep")
            .arg("--who=nearstop")
            .arg(format!("--why={}", self.reason))
            .arg("--mode=block")
            .args(["sleep", "infinity"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => WakeLockError::Unsupported,
                _ => WakeLockError::RequestFailed(e.to_string()),
            })?;

        if let Ok(Some(status)) = child.try_wait() {
            return Err(WakeLockError::RequestFailed(format!(
                "{} exited immediately with {status}",
                self.program
            )));
        }

        Ok(Box::new(InhibitGuard { child }))
    }
}

struct InhibitGuard {
    child: Child,
}

impl WakeLockGuard for InhibitGuard {
    fn release(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "Inhibitor already gone");
        }
    }
}
