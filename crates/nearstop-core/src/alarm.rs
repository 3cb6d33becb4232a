//! One-shot arrival alarm: vibration plus a system notification.
//!
//! Both channels are independent. A failure in one never prevents the other
//! from being attempted, and nothing here returns an error to the session.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::types::Target;

/// Title of the arrival notification.
pub const ALARM_TITLE: &str = "Arriving soon!";

/// Default vibration: pulse, pause, pulse.
pub const DEFAULT_VIBRATION_PATTERN: [Duration; 3] = [
    Duration::from_millis(1000),
    Duration::from_millis(500),
    Duration::from_millis(1000),
];

/// Haptic channel failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HapticError {
    /// The device cannot vibrate.
    #[error("Vibration not supported")]
    Unsupported,

    /// The vibration request failed.
    #[error("Vibration failed: {0}")]
    Failed(String),
}

/// Notification channel failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    /// Permission to show notifications is missing or was revoked.
    #[error("Notifications are blocked")]
    Blocked,

    /// The notification could not be shown.
    #[error("Notification failed: {0}")]
    Failed(String),
}

/// Current notification permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    /// Notifications may be shown.
    Granted,
    /// The user refused notifications.
    Denied,
    /// The user has not decided yet.
    Prompt,
}

/// A notification to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Headline.
    pub title: String,
    /// Body text.
    pub body: String,
}

impl Notification {
    /// The arrival notification for `target` at `distance_label`.
    #[must_use]
    pub fn arrival(target: &Target, distance_label: &str) -> Self {
        Self {
            title: ALARM_TITLE.to_string(),
            body: format!("{}: {distance_label} to go", target.name),
        }
    }
}

/// Device vibration.
pub trait HapticChannel: Send + Sync {
    /// Play `pattern`, alternating vibrate and pause durations.
    ///
    /// # Errors
    ///
    /// Returns [`HapticError::Unsupported`] when the device cannot vibrate.
    fn vibrate(&self, pattern: &[Duration]) -> Result<(), HapticError>;
}

/// System notifications.
pub trait NotificationChannel: Send + Sync {
    /// Current permission state.
    fn permission(&self) -> NotificationPermission;

    /// Show `notification`.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be shown.
    fn notify(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Fires the arrival alarm.
#[derive(Clone)]
pub struct AlarmDispatcher {
    haptics: Arc<dyn HapticChannel>,
    notifier: Arc<dyn NotificationChannel>,
    pattern: Vec<Duration>,
}

impl AlarmDispatcher {
    /// Dispatch through the given channels with the default vibration.
    #[must_use]
    pub fn new(haptics: Arc<dyn HapticChannel>, notifier: Arc<dyn NotificationChannel>) -> Self {
        Self {
            haptics,
            notifier,
            pattern: DEFAULT_VIBRATION_PATTERN.to_vec(),
        }
    }

    /// Replace the vibration pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: Vec<Duration>) -> Self {
        self.pattern = pattern;
        self
    }

    /// The notifier's current permission state.
    #[must_use]
    pub fn notification_permission(&self) -> NotificationPermission {
        self.notifier.permission()
    }

    /// Vibrate and notify. Never fails.
    pub fn fire(&self, target: &Target, distance_label: &str) {
        info!(station = %target.name, distance = distance_label, "Firing arrival alarm");

        match self.haptics.vibrate(&self.pattern) {
            Ok(()) | Err(HapticError::Unsupported) => {}
            Err(error) => warn!(%error, "Vibration failed"),
        }

        if self.notifier.permission() != NotificationPermission::Granted {
            debug!("Notification permission not granted; skipping notification");
            return;
        }
        let notification = Notification::arrival(target, distance_label);
        match self.notifier.notify(&notification) {
            Ok(()) => {}
            Err(NotificationError::Blocked) => debug!("Notification blocked"),
            Err(error) => warn!(%error, "Notification failed"),
        }
    }
}

/// Haptics for devices that cannot vibrate.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedHaptics;

impl HapticChannel for UnsupportedHaptics {
    fn vibrate(&self, _pattern: &[Duration]) -> Result<(), HapticError> {
        Err(HapticError::Unsupported)
    }
}

/// Desktop notifications through `notify-send`.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    program: String,
}

impl DesktopNotifier {
    /// Use `notify-send` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "notify-send".to_string(),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationChannel for DesktopNotifier {
    fn permission(&self) -> NotificationPermission {
        if find_in_path(&self.program).is_some() {
            NotificationPermission::Granted
        } else {
            NotificationPermission::Denied
        }
    }

    fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(NotificationError::Failed(
                "no async runtime to run the notifier".to_string(),
            ));
        }
        Command::new(&self.program)
            .args(["--urgency=critical", "--app-name=nearstop"])
            .arg(&notification.title)
            .arg(&notification.body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(drop)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    NotificationError::Blocked
                }
                _ => NotificationError::Failed(e.to_string()),
            })
    }
}

/// Notifications written to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationChannel for LogNotifier {
    fn permission(&self) -> NotificationPermission {
        NotificationPermission::Granted
    }

    fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(title = %notification.title, body = %notification.body, "Notification");
        Ok(())
    }
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHaptics {
        patterns: Mutex<Vec<Vec<Duration>>>,
    }

    impl HapticChannel for RecordingHaptics {
        fn vibrate(&self, pattern: &[Duration]) -> Result<(), HapticError> {
            self.patterns.lock().unwrap().push(pattern.to_vec());
            Ok(())
        }
    }

    struct RecordingNotifier {
        permission: NotificationPermission,
        fail: bool,
        shown: Mutex<Vec<Notification>>,
    }

    impl RecordingNotifier {
        fn new(permission: NotificationPermission) -> Self {
            Self {
                permission,
                fail: false,
                shown: Mutex::new(Vec::new()),
            }
        }
    }

    impl NotificationChannel for RecordingNotifier {
        fn permission(&self) -> NotificationPermission {
            self.permission
        }

        fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
            if self.fail {
                return Err(NotificationError::Failed("revoked".to_string()));
            }
            self.shown.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[test]
    fn test_fire_vibrates_and_notifies() {
        let haptics = Arc::new(RecordingHaptics::default());
        let notifier = Arc::new(RecordingNotifier::new(NotificationPermission::Granted));
        let dispatcher = AlarmDispatcher::new(haptics.clone(), notifier.clone());

        dispatcher.fire(&Target::station("Shibuya", 35.658, 139.701), "111m");

        assert_eq!(
            *haptics.patterns.lock().unwrap(),
            vec![DEFAULT_VIBRATION_PATTERN.to_vec()]
        );
        let shown = notifier.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, ALARM_TITLE);
        assert_eq!(shown[0].body, "Shibuya: 111m to go");
    }

    #[test]
    fn test_missing_permission_still_vibrates() {
        let haptics = Arc::new(RecordingHaptics::default());
        let notifier = Arc::new(RecordingNotifier::new(NotificationPermission::Denied));
        let dispatcher = AlarmDispatcher::new(haptics.clone(), notifier.clone());

        dispatcher.fire(&Target::simulated(), "490m");

        assert_eq!(haptics.patterns.lock().unwrap().len(), 1);
        assert!(notifier.shown.lock().unwrap().is_empty());
    }

    #[test]
    fn test_channel_failures_are_swallowed() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::new(NotificationPermission::Granted)
        });
        let dispatcher = AlarmDispatcher::new(Arc::new(UnsupportedHaptics), notifier.clone());

        dispatcher.fire(&Target::simulated(), "490m");
        assert!(notifier.shown.lock().unwrap().is_empty());
    }

    #[test]
    fn test_custom_pattern() {
        let haptics = Arc::new(RecordingHaptics::default());
        let pattern = vec![Duration::from_millis(200)];
        let dispatcher = AlarmDispatcher::new(haptics.clone(), Arc::new(LogNotifier))
            .with_pattern(pattern.clone());

        dispatcher.fire(&Target::simulated(), "490m");
        assert_eq!(*haptics.patterns.lock().unwrap(), vec![pattern]);
    }

    #[test]
    fn test_find_in_path_misses_unknown_program() {
        assert!(find_in_path("nearstop-definitely-not-installed").is_none());
    }
}
