//! `nearstop watch` and `nearstop demo`: run one monitoring session until
//! it triggers, the feed ends, or the user presses Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use anyhow::bail;
use nearstop_core::{
    AlarmDispatcher, Config, DesktopNotifier, InhibitWakeLock, JsonLinesPositionProvider,
    LogNotifier, Monitor, NotificationChannel, NotificationPermission, PositionProvider, Step,
    Target, UnsupportedHaptics, WakeLockManager,
};
use tracing::{info, warn};

use crate::output::EventPrinter;

/// How a session run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The alarm fired.
    Arrived,
    /// The location feed ended before the target was reached.
    FeedEnded,
    /// The user interrupted monitoring.
    Cancelled,
}

/// Watch live fixes from `input` (or stdin) against a station.
pub async fn watch(
    config: &Config,
    target: Target,
    input: Option<&Path>,
    json: bool,
) -> anyhow::Result<Outcome> {
    target.validate()?;

    let notifier = DesktopNotifier::new();
    if notifier.permission() != NotificationPermission::Granted {
        bail!("System notifications are unavailable (notify-send not found); refusing to arm the alarm");
    }

    let provider = match input {
        Some(path) => JsonLinesPositionProvider::open(path).await?,
        None => JsonLinesPositionProvider::stdin(),
    };

    let monitor = build_monitor(config, Arc::new(provider), Arc::new(notifier));
    run(monitor, target, json).await
}

/// Run the simulated countdown against the built-in test target.
pub async fn demo(config: &Config, json: bool) -> anyhow::Result<Outcome> {
    let desktop = DesktopNotifier::new();
    let notifier: Arc<dyn NotificationChannel> =
        if desktop.permission() == NotificationPermission::Granted {
            Arc::new(desktop)
        } else {
            info!("notify-send not found, alarm notifications go to the log");
            Arc::new(LogNotifier)
        };

    // Never watched; the simulated target drives its own feed.
    let provider = JsonLinesPositionProvider::new(tokio::io::empty());
    let monitor = build_monitor(config, Arc::new(provider), notifier);
    run(monitor, Target::simulated(), json).await
}

fn build_monitor(
    config: &Config,
    positions: Arc<dyn PositionProvider>,
    notifier: Arc<dyn NotificationChannel>,
) -> Monitor {
    let wake_lock = if config.wake_lock.enabled {
        WakeLockManager::new(Arc::new(InhibitWakeLock::new()))
    } else {
        WakeLockManager::disabled()
    };
    let alarm = AlarmDispatcher::new(Arc::new(UnsupportedHaptics), notifier)
        .with_pattern(config.alarm.vibration_pattern());

    Monitor::from_config(config, positions, wake_lock, alarm)
}

async fn run(mut monitor: Monitor, target: Target, json: bool) -> anyhow::Result<Outcome> {
    let mut printer = EventPrinter::new(monitor.subscribe(), json);
    let session_id = monitor.start(target)?;
    printer.flush()?;
    info!(%session_id, "Monitoring started");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            step = monitor.next_event() => {
                printer.flush()?;
                match step {
                    Some(Step::Continue) => {}
                    Some(Step::Triggered) => break Outcome::Arrived,
                    Some(Step::Exhausted) | None => break Outcome::FeedEnded,
                }
            }
            result = &mut ctrl_c => {
                result?;
                break Outcome::Cancelled;
            }
        }
    };

    monitor.stop();
    printer.flush()?;

    match outcome {
        Outcome::Arrived => info!(%session_id, "Arrival alarm fired"),
        Outcome::FeedEnded => warn!(%session_id, "Location feed ended before reaching the station"),
        Outcome::Cancelled => info!(%session_id, "Monitoring cancelled"),
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.wake_lock.enabled = false;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_run_arrives() {
        let provider = JsonLinesPositionProvider::new(tokio::io::empty());
        let monitor = build_monitor(&quiet_config(), Arc::new(provider), Arc::new(LogNotifier));
        let outcome = run(monitor, Target::simulated(), true).await.unwrap();
        assert_eq!(outcome, Outcome::Arrived);
    }

    #[tokio::test]
    async fn test_feed_end_stops_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fixes.jsonl");
        std::fs::write(&path, "{\"latitude\":35.01,\"longitude\":139.0}\n").unwrap();

        let provider = JsonLinesPositionProvider::open(&path).await.unwrap();
        let monitor = build_monitor(&quiet_config(), Arc::new(provider), Arc::new(LogNotifier));
        let outcome = run(monitor, Target::station("Test", 35.0, 139.0), true)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::FeedEnded);
    }

    #[tokio::test]
    async fn test_live_fixes_reach_station() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fixes.jsonl");
        std::fs::write(
            &path,
            "{\"latitude\":35.01,\"longitude\":139.0}\n{\"latitude\":35.001,\"longitude\":139.0}\n",
        )
        .unwrap();

        let provider = JsonLinesPositionProvider::open(&path).await.unwrap();
        let monitor = build_monitor(&quiet_config(), Arc::new(provider), Arc::new(LogNotifier));
        let outcome = run(monitor, Target::station("Test", 35.0, 139.0), false)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Arrived);
    }
}
