//! The proximity monitoring state machine.
//!
//! A [`Monitor`] owns at most one [`MonitoringSession`]. Starting a session
//! acquires a wake lock and subscribes to a location source; each sample is
//! turned into a distance and compared with [`PROXIMITY_THRESHOLD_METERS`].
//! The first sample inside the threshold fires the alarm once and tears the
//! session down.
//!
//! ```text
//!   Idle ──start──▶ Armed ──distance < 500 m──▶ Triggered ──teardown──▶ Idle
//!                     │                                                  ▲
//!                     └────────────────────stop()────────────────────────┘
//! ```
//!
//! All methods take `&mut self`, so samples are processed one at a time in
//! delivery order. [`Monitor::next_event`] is cancel-safe and can be raced
//! against user input with `tokio::select!`.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alarm::AlarmDispatcher;
use crate::config::Config;
use crate::distance::format_distance;
use crate::error::Result;
use crate::events::{MonitorEvent, StopReason};
use crate::source::{
    LiveSource, LocationSource, PositionOptions, PositionProvider, SampleReceiver, SampleSink,
    SimulatedSource, SimulationSettings, SourceEvent, Subscription,
};
use crate::types::{LocationSample, SessionStatus, Target};
use crate::wake_lock::{WakeLockHandle, WakeLockManager};

/// Distance below which the alarm fires, in meters.
pub const PROXIMITY_THRESHOLD_METERS: f64 = 500.0;

/// Capacity of the observer channel. Slow observers lose the oldest events.
const EVENT_CAPACITY: usize = 256;

/// What processing one source event led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Still armed and waiting.
    Continue,
    /// The alarm fired and the session is back to idle.
    Triggered,
    /// The source will deliver nothing more; the session is still armed.
    Exhausted,
}

/// One monitoring attempt and the resources it holds.
///
/// Dropping a session releases its subscription and wake lock.
#[derive(Debug)]
pub struct MonitoringSession {
    id: Uuid,
    target: Target,
    status: SessionStatus,
    subscription: Option<Subscription>,
    samples: Option<SampleReceiver>,
    wake_lock: Option<WakeLockHandle>,
    last_distance: Option<f64>,
}

impl MonitoringSession {
    /// Session identifier, as carried by its events.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The monitored target.
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Most recent distance to the target, in meters.
    #[must_use]
    pub const fn last_distance(&self) -> Option<f64> {
        self.last_distance
    }

    /// Whether this session currently holds a wake lock.
    #[must_use]
    pub fn holds_wake_lock(&self) -> bool {
        self.wake_lock.as_ref().is_some_and(WakeLockHandle::is_held)
    }

    /// Whether this session still has a live subscription.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|subscription| !subscription.is_cancelled())
    }

    fn teardown(&mut self, wake_lock: &WakeLockManager) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.samples = None;
        wake_lock.release(self.wake_lock.take());
        self.status = SessionStatus::Idle;
    }
}

/// Owns the active session and everything needed to run one.
pub struct Monitor {
    positions: Arc<dyn PositionProvider>,
    live_options: PositionOptions,
    simulation: SimulationSettings,
    wake_lock: WakeLockManager,
    alarm: AlarmDispatcher,
    events: broadcast::Sender<MonitorEvent>,
    session: Option<MonitoringSession>,
}

impl Monitor {
    /// Create an idle monitor with default source options.
    #[must_use]
    pub fn new(
        positions: Arc<dyn PositionProvider>,
        wake_lock: WakeLockManager,
        alarm: AlarmDispatcher,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            positions,
            live_options: PositionOptions::default(),
            simulation: SimulationSettings::default(),
            wake_lock,
            alarm,
            events,
            session: None,
        }
    }

    /// Create an idle monitor using the source options from `config`.
    #[must_use]
    pub fn from_config(
        config: &Config,
        positions: Arc<dyn PositionProvider>,
        wake_lock: WakeLockManager,
        alarm: AlarmDispatcher,
    ) -> Self {
        Self::new(positions, wake_lock, alarm)
            .with_live_options(config.live.position_options())
            .with_simulation(config.simulation.settings())
    }

    /// Override the live watch options.
    #[must_use]
    pub fn with_live_options(mut self, options: PositionOptions) -> Self {
        self.live_options = options;
        self
    }

    /// Override the simulated feed parameters.
    #[must_use]
    pub fn with_simulation(mut self, settings: SimulationSettings) -> Self {
        self.simulation = settings;
        self
    }

    /// Subscribe to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.session
            .as_ref()
            .map_or(SessionStatus::Idle, MonitoringSession::status)
    }

    /// The active session, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&MonitoringSession> {
        self.session.as_ref()
    }

    /// Arm a new session for `target`.
    ///
    /// Any armed session is stopped first. The wake lock is best-effort; the
    /// session is armed without it if it cannot be acquired.
    ///
    /// # Errors
    ///
    /// Returns [`NearstopError::InvalidTarget`](crate::NearstopError::InvalidTarget)
    /// for a live target without usable coordinates, and
    /// [`NearstopError::SourceUnavailable`](crate::NearstopError::SourceUnavailable)
    /// if the location source cannot start. In both cases nothing stays
    /// acquired.
    pub fn start(&mut self, target: Target) -> Result<Uuid> {
        target.validate()?;

        if self.session.is_some() {
            self.stop_with(StopReason::Replaced);
        }

        let wake_lock = self.wake_lock.acquire();
        let mut source = self.select_source(&target);
        let (sink, samples) = SampleSink::channel();
        let subscription = match source.subscribe(sink) {
            Ok(subscription) => subscription,
            Err(error) => {
                warn!(station = %target.name, %error, "Cannot arm session");
                self.wake_lock.release(wake_lock);
                return Err(error.into());
            }
        };

        let id = Uuid::new_v4();
        info!(
            session = %id,
            station = %target.name,
            source = source.kind(),
            wake_lock = wake_lock.is_some(),
            "Session armed"
        );

        publish(
            &self.events,
            MonitorEvent::Started {
                session_id: id,
                target_name: target.name.clone(),
                simulated: target.is_simulated,
                at: Utc::now(),
            },
        );
        publish(
            &self.events,
            MonitorEvent::Distance {
                session_id: id,
                target_name: target.name.clone(),
                distance_label: format_distance(None),
                distance_m: None,
                at: Utc::now(),
            },
        );

        self.session = Some(MonitoringSession {
            id,
            target,
            status: SessionStatus::Armed,
            subscription: Some(subscription),
            samples: Some(samples),
            wake_lock,
            last_distance: None,
        });
        Ok(id)
    }

    /// Stop the active session and release everything it holds.
    ///
    /// Does nothing when idle.
    pub fn stop(&mut self) {
        self.stop_with(StopReason::Cancelled);
    }

    /// Wait for the next source event and process it.
    ///
    /// Returns `None` when idle or once the source is exhausted.
    pub async fn next_event(&mut self) -> Option<Step> {
        let event = {
            let samples = self.session.as_mut()?.samples.as_mut()?;
            samples.recv().await
        };
        Some(match event {
            Some(event) => self.handle(event),
            None => self.mark_exhausted(),
        })
    }

    /// Process one source event.
    pub fn handle(&mut self, event: SourceEvent) -> Step {
        let Some(session) = self.session.as_mut() else {
            return Step::Continue;
        };
        if session.status != SessionStatus::Armed {
            return Step::Continue;
        }

        match event {
            SourceEvent::Sample(sample) => {
                let distance = match sample {
                    LocationSample::Distance(meters) => meters,
                    LocationSample::Position(fix) => {
                        let Some(target) = session.target.position() else {
                            warn!(station = %session.target.name, "Position sample for a target without coordinates");
                            return Step::Continue;
                        };
                        target.distance_to(&fix.point())
                    }
                };
                if !distance.is_finite() {
                    warn!(session = %session.id, distance, "Discarding unusable location sample");
                    publish(
                        &self.events,
                        MonitorEvent::SourceError {
                            session_id: session.id,
                            target_name: session.target.name.clone(),
                            message: format!("Unusable distance {distance}"),
                            at: Utc::now(),
                        },
                    );
                    return Step::Continue;
                }
                session.last_distance = Some(distance);
                let label = format_distance(Some(distance));
                debug!(session = %session.id, distance, "Location sample");

                publish(
                    &self.events,
                    MonitorEvent::Distance {
                        session_id: session.id,
                        target_name: session.target.name.clone(),
                        distance_label: label.clone(),
                        distance_m: Some(distance),
                        at: Utc::now(),
                    },
                );

                let within_range = distance < PROXIMITY_THRESHOLD_METERS;
                if !within_range {
                    return Step::Continue;
                }

                session.status = SessionStatus::Triggered;
                info!(session = %session.id, station = %session.target.name, distance, "Target within range");
                publish(
                    &self.events,
                    MonitorEvent::Triggered {
                        session_id: session.id,
                        target_name: session.target.name.clone(),
                        distance_label: label.clone(),
                        at: Utc::now(),
                    },
                );
                self.alarm.fire(&session.target, &label);
                self.stop_with(StopReason::Triggered);
                Step::Triggered
            }
            SourceEvent::Error(error) => {
                warn!(session = %session.id, %error, "Location acquisition failed; still monitoring");
                publish(
                    &self.events,
                    MonitorEvent::SourceError {
                        session_id: session.id,
                        target_name: session.target.name.clone(),
                        message: error.to_string(),
                        at: Utc::now(),
                    },
                );
                Step::Continue
            }
            SourceEvent::Finished => self.mark_exhausted(),
        }
    }

    fn mark_exhausted(&mut self) -> Step {
        if let Some(session) = self.session.as_mut() {
            if session.samples.take().is_some() {
                info!(session = %session.id, "Location source finished; session stays armed");
            }
        }
        Step::Exhausted
    }

    fn select_source(&self, target: &Target) -> Box<dyn LocationSource> {
        if target.is_simulated {
            Box::new(SimulatedSource::new(
                self.simulation.clone(),
                PROXIMITY_THRESHOLD_METERS,
            ))
        } else {
            Box::new(LiveSource::new(
                Arc::clone(&self.positions),
                self.live_options.clone(),
            ))
        }
    }

    fn stop_with(&mut self, reason: StopReason) {
        let Some(mut session) = self.session.take() else {
            debug!("No active session to stop");
            return;
        };
        session.teardown(&self.wake_lock);
        info!(session = %session.id, station = %session.target.name, ?reason, "Session stopped");
        publish(
            &self.events,
            MonitorEvent::Stopped {
                session_id: session.id,
                target_name: session.target.name,
                reason,
                at: Utc::now(),
            },
        );
    }
}

fn publish(events: &broadcast::Sender<MonitorEvent>, event: MonitorEvent) {
    // No subscribers is fine.
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{LogNotifier, UnsupportedHaptics};
    use crate::source::{AcquisitionError, ChannelPositionProvider};
    use crate::types::PositionFix;

    fn monitor() -> Monitor {
        Monitor::new(
            Arc::new(ChannelPositionProvider::new()),
            WakeLockManager::disabled(),
            AlarmDispatcher::new(Arc::new(UnsupportedHaptics), Arc::new(LogNotifier)),
        )
    }

    fn drain(rx: &mut broadcast::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_start_publishes_started_and_unknown_distance() {
        let mut monitor = monitor();
        let mut rx = monitor.subscribe();

        let id = monitor.start(Target::simulated()).unwrap();
        assert_eq!(monitor.status(), SessionStatus::Armed);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], MonitorEvent::Started { session_id, simulated: true, .. } if *session_id == id));
        assert!(matches!(&events[1], MonitorEvent::Distance { distance_label, distance_m: None, .. } if distance_label == "--"));
    }

    #[tokio::test]
    async fn test_invalid_target_is_rejected_without_side_effects() {
        let mut monitor = monitor();
        monitor.start(Target::simulated()).unwrap();
        let mut rx = monitor.subscribe();

        let bad = Target {
            latitude: None,
            ..Target::station("Broken", 0.0, 0.0)
        };
        let err = monitor.start(bad).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TARGET");
        assert_eq!(monitor.status(), SessionStatus::Armed);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_start_without_runtime_reports_source_unavailable() {
        let mut monitor = monitor();
        let err = monitor.start(Target::simulated()).unwrap_err();
        assert!(err.is_source_error());
        assert_eq!(monitor.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut monitor = monitor();
        monitor.stop();
        monitor.start(Target::simulated()).unwrap();
        let mut rx = monitor.subscribe();

        monitor.stop();
        monitor.stop();
        assert_eq!(monitor.status(), SessionStatus::Idle);
        assert!(monitor.session().is_none());

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            MonitorEvent::Stopped {
                reason: StopReason::Cancelled,
                ..
            }
        ));
        assert!(monitor.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_distance_samples_trigger_once() {
        let mut monitor = monitor();
        monitor.start(Target::simulated()).unwrap();
        let mut rx = monitor.subscribe();

        let step = monitor.handle(SourceEvent::Sample(LocationSample::Distance(510.0)));
        assert_eq!(step, Step::Continue);
        assert_eq!(monitor.session().unwrap().last_distance(), Some(510.0));

        let step = monitor.handle(SourceEvent::Sample(LocationSample::Distance(499.0)));
        assert_eq!(step, Step::Triggered);
        assert_eq!(monitor.status(), SessionStatus::Idle);

        let step = monitor.handle(SourceEvent::Sample(LocationSample::Distance(300.0)));
        assert_eq!(step, Step::Continue);

        let triggered = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, MonitorEvent::Triggered { .. }))
            .count();
        assert_eq!(triggered, 1);
    }

    #[tokio::test]
    async fn test_threshold_is_strict() {
        let mut monitor = monitor();
        monitor.start(Target::simulated()).unwrap();
        let step = monitor.handle(SourceEvent::Sample(LocationSample::Distance(500.0)));
        assert_eq!(step, Step::Continue);
        assert_eq!(monitor.status(), SessionStatus::Armed);
    }

    #[tokio::test]
    async fn test_non_finite_samples_never_trigger() {
        let mut monitor = monitor();
        monitor
            .start(Target::station("Test", 35.0, 139.0))
            .unwrap();
        let mut rx = monitor.subscribe();

        let step = monitor.handle(SourceEvent::Sample(LocationSample::Position(
            PositionFix::now(f64::NAN, 139.0),
        )));
        assert_eq!(step, Step::Continue);
        let step = monitor.handle(SourceEvent::Sample(LocationSample::Distance(
            f64::NEG_INFINITY,
        )));
        assert_eq!(step, Step::Continue);

        assert_eq!(monitor.status(), SessionStatus::Armed);
        assert_eq!(monitor.session().unwrap().last_distance(), None);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, MonitorEvent::SourceError { .. })));
    }

    #[tokio::test]
    async fn test_source_error_keeps_session_armed() {
        let mut monitor = monitor();
        monitor
            .start(Target::station("Test", 35.0, 139.0))
            .unwrap();
        let mut rx = monitor.subscribe();

        let step = monitor.handle(SourceEvent::Error(AcquisitionError::PermissionDenied));
        assert_eq!(step, Step::Continue);
        assert_eq!(monitor.status(), SessionStatus::Armed);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [MonitorEvent::SourceError { .. }]
        ));
    }

    #[tokio::test]
    async fn test_position_samples_use_haversine() {
        let mut monitor = monitor();
        monitor
            .start(Target::station("Test", 35.0, 139.0))
            .unwrap();

        let step = monitor.handle(SourceEvent::Sample(LocationSample::Position(
            PositionFix::now(35.01, 139.0),
        )));
        assert_eq!(step, Step::Continue);
        let distance = monitor.session().unwrap().last_distance().unwrap();
        assert!((distance - 1112.0).abs() < 2.0);
    }

    #[tokio::test]
    async fn test_finished_source_leaves_session_armed() {
        let mut monitor = monitor();
        monitor
            .start(Target::station("Test", 35.0, 139.0))
            .unwrap();

        assert_eq!(monitor.handle(SourceEvent::Finished), Step::Exhausted);
        assert_eq!(monitor.status(), SessionStatus::Armed);
        assert!(monitor.next_event().await.is_none());

        monitor.stop();
        assert_eq!(monitor.status(), SessionStatus::Idle);
    }
}
