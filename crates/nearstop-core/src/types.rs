//! Shared types: monitoring targets, station records and location samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::distance::GeoPoint;

/// Name of the built-in simulated target.
pub const SIMULATED_TARGET_NAME: &str = "localhost (test)";

/// A target that cannot be monitored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    /// A live target is missing its latitude or longitude.
    #[error("Target '{name}' has no coordinates; only simulated targets may omit them")]
    MissingCoordinates {
        /// Target name.
        name: String,
    },

    /// A live target has NaN or infinite coordinates.
    #[error("Target '{name}' has non-finite coordinates")]
    NonFiniteCoordinates {
        /// Target name.
        name: String,
    },
}

/// The destination being monitored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Name shown to the user.
    pub name: String,

    /// Latitude in degrees. Required unless `is_simulated`.
    #[serde(default)]
    pub latitude: Option<f64>,

    /// Longitude in degrees. Required unless `is_simulated`.
    #[serde(default)]
    pub longitude: Option<f64>,

    /// Selects the simulated feed instead of live positioning.
    #[serde(default)]
    pub is_simulated: bool,
}

impl Target {
    /// A real station at the given coordinates.
    pub fn station(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude: Some(latitude),
            longitude: Some(longitude),
            is_simulated: false,
        }
    }

    /// The fixed test target driven by the simulated feed.
    #[must_use]
    pub fn simulated() -> Self {
        Self {
            name: SIMULATED_TARGET_NAME.to_string(),
            latitude: None,
            longitude: None,
            is_simulated: true,
        }
    }

    /// Check the coordinate invariant.
    ///
    /// # Errors
    ///
    /// Returns an error if a non-simulated target lacks coordinates or has
    /// non-finite ones.
    pub fn validate(&self) -> Result<(), TargetError> {
        if self.is_simulated {
            return Ok(());
        }
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Ok(()),
            (Some(_), Some(_)) => Err(TargetError::NonFiniteCoordinates {
                name: self.name.clone(),
            }),
            _ => Err(TargetError::MissingCoordinates {
                name: self.name.clone(),
            }),
        }
    }

    /// Target position, if this is a real station.
    #[must_use]
    pub fn position(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if !self.is_simulated => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }
}

/// A station record as returned by the station-lookup service.
///
/// Note the service's axis naming: `x` is longitude and `y` is latitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Station name.
    pub name: String,

    /// Railway line serving the station.
    #[serde(default)]
    pub line: String,

    /// Distance label from the lookup, e.g. `"320m"`.
    #[serde(default)]
    pub distance: String,

    /// Longitude in degrees.
    pub x: f64,

    /// Latitude in degrees.
    pub y: f64,
}

impl Station {
    /// Convert into a monitoring target.
    #[must_use]
    pub fn to_target(&self) -> Target {
        Target::station(self.name.clone(), self.y, self.x)
    }
}

/// Selectable targets for a lookup result.
///
/// The simulated test target always comes first, including when the lookup
/// returned nothing or failed.
#[must_use]
pub fn station_choices(stations: &[Station]) -> Vec<Target> {
    std::iter::once(Target::simulated())
        .chain(stations.iter().map(Station::to_target))
        .collect()
}

/// A single position fix from a positioning provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,

    /// Horizontal accuracy radius in meters, if known.
    #[serde(default)]
    pub accuracy: Option<f64>,

    /// When the fix was taken. Defaults to the time it was parsed.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl PositionFix {
    /// A fix taken now.
    #[must_use]
    pub fn now(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            timestamp: Utc::now(),
        }
    }

    /// The fix as a geographic point.
    #[must_use]
    pub const fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// One observation from a location source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationSample {
    /// Raw coordinates from live positioning.
    Position(PositionFix),

    /// Precomputed distance to the target in meters (simulated feed).
    Distance(f64),
}

/// Lifecycle state of a monitoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No session is running.
    Idle,
    /// Subscribed and waiting for the target to come within range.
    Armed,
    /// The alarm has fired; teardown is in progress.
    Triggered,
}
