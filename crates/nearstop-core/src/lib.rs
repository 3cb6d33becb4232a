//! # nearstop-core
//!
//! Core engine for the nearstop station proximity alarm.
//!
//! This crate provides:
//! - Great-circle distance between the user and a target station
//! - Live and simulated location feeds behind one source abstraction
//! - A one-shot arrival alarm (vibration + system notification)
//! - A best-effort wake lock held while monitoring
//! - The monitoring state machine that ties them together
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`distance`] - Haversine distance and distance labels
//! - [`source`] - Location sources, subscriptions and positioning providers
//! - [`wake_lock`] - Best-effort wake lock management
//! - [`alarm`] - Haptic and notification channels and the alarm dispatcher
//! - [`session`] - The monitor and its session state machine
//! - [`events`] - Observer events published by the monitor
//! - [`config`] - Configuration loading, saving and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Targets, stations and location samples

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod alarm;
pub mod config;
pub mod distance;
pub mod error;
pub mod events;
pub mod session;
pub mod source;
pub mod types;
pub mod wake_lock;

// Re-export primary types for convenience
pub use alarm::{
    AlarmDispatcher, DesktopNotifier, HapticChannel, HapticError, LogNotifier, Notification,
    NotificationChannel, NotificationError, NotificationPermission, UnsupportedHaptics,
    ALARM_TITLE,
};
pub use config::{default_config_path, Config, ConfigError, ConfigResult};
pub use distance::{format_distance, haversine_distance, GeoPoint};
pub use error::{NearstopError, Result};
pub use events::{MonitorEvent, StopReason};
pub use session::{Monitor, MonitoringSession, Step, PROXIMITY_THRESHOLD_METERS};
pub use source::{
    AcquisitionError, ChannelPositionProvider, JsonLinesPositionProvider, LiveSource,
    LocationSource, PositionOptions, PositionProvider, SampleSink, SimulatedSource,
    SimulationSettings, SourceError, SourceEvent, Subscription,
};
pub use types::{
    station_choices, LocationSample, PositionFix, SessionStatus, Station, Target, TargetError,
};
pub use wake_lock::{
    InhibitWakeLock, NoWakeLock, WakeLockError, WakeLockGuard, WakeLockHandle, WakeLockManager,
    WakeLockProvider,
};
