//! Error taxonomy for loading a sensor detail view.

use std::fmt;

// ---

/// Failures surfaced by the sensor data service and the detail loader.
///
/// Records with a malformed water level are not errors: they decode with an
/// absent level and are skipped when charting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailError {
    /// An identity lookup returned nothing for the sensor.
    NotFound { entity: &'static str, sensor_id: String },
    /// A fetch was rejected by the data service or the connection failed.
    Transport(String),
}

impl DetailError {
    // ---
    pub fn not_found(entity: &'static str, sensor_id: &str) -> Self {
        DetailError::NotFound {
            entity,
            sensor_id: sensor_id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DetailError::NotFound { .. })
    }
}

impl fmt::Display for DetailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetailError::NotFound { entity, sensor_id } => {
                write!(f, "Sensor not found: no {} for '{}'", entity, sensor_id)
            }
            DetailError::Transport(msg) => write!(f, "Failed to fetch sensor data: {}", msg),
        }
    }
}

impl std::error::Error for DetailError {}

impl From<sqlx::Error> for DetailError {
    fn from(e: sqlx::Error) -> Self {
        DetailError::Transport(e.to_string())
    }
}
