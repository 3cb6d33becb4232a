//! Renders monitor events to standard output.

use std::io::Write;

use nearstop_core::{MonitorEvent, StopReason, ALARM_TITLE};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;

/// Drains the monitor's event channel and prints each event.
pub struct EventPrinter {
    rx: broadcast::Receiver<MonitorEvent>,
    json: bool,
}

impl EventPrinter {
    pub const fn new(rx: broadcast::Receiver<MonitorEvent>, json: bool) -> Self {
        Self { rx, json }
    }

    /// Print every event received so far.
    pub fn flush(&mut self) -> anyhow::Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    let line = if self.json {
                        serde_json::to_string(&event)?
                    } else {
                        render(&event)
                    };
                    writeln!(out, "{line}")?;
                }
                Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "Dropped monitor events"),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        out.flush()?;
        Ok(())
    }
}

/// Human-readable one-line rendering of an event.
pub fn render(event: &MonitorEvent) -> String {
    match event {
        MonitorEvent::Started {
            target_name,
            simulated,
            ..
        } => {
            let mode = if *simulated { "simulated feed" } else { "live position" };
            format!("Monitoring {target_name} ({mode})")
        }
        MonitorEvent::Distance {
            target_name,
            distance_label,
            ..
        } => format!("{target_name}: {distance_label}"),
        MonitorEvent::Triggered {
            target_name,
            distance_label,
            ..
        } => format!("{ALARM_TITLE} {target_name}: {distance_label} to go"),
        MonitorEvent::SourceError { message, .. } => format!("Location error: {message}"),
        MonitorEvent::Stopped {
            target_name,
            reason,
            ..
        } => {
            let why = match reason {
                StopReason::Cancelled => "cancelled",
                StopReason::Triggered => "arrived",
                StopReason::Replaced => "replaced",
            };
            format!("Stopped monitoring {target_name} ({why})")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_render_distance() {
        let event = MonitorEvent::Distance {
            session_id: Uuid::nil(),
            target_name: "Shibuya".to_string(),
            distance_label: "1112m".to_string(),
            distance_m: Some(1111.95),
            at: Utc::now(),
        };
        assert_eq!(render(&event), "Shibuya: 1112m");
    }

    #[test]
    fn test_render_triggered_and_stopped() {
        let triggered = MonitorEvent::Triggered {
            session_id: Uuid::nil(),
            target_name: "Shibuya".to_string(),
            distance_label: "111m".to_string(),
            at: Utc::now(),
        };
        assert_eq!(render(&triggered), "Arriving soon! Shibuya: 111m to go");

        let stopped = MonitorEvent::Stopped {
            session_id: Uuid::nil(),
            target_name: "Shibuya".to_string(),
            reason: StopReason::Triggered,
            at: Utc::now(),
        };
        assert_eq!(render(&stopped), "Stopped monitoring Shibuya (arrived)");
    }

    #[test]
    fn test_render_started_simulated() {
        let event = MonitorEvent::Started {
            session_id: Uuid::nil(),
            target_name: "localhost (test)".to_string(),
            simulated: true,
            at: Utc::now(),
        };
        assert_eq!(render(&event), "Monitoring localhost (test) (simulated feed)");
    }
}
