//! Bulk loader for a sensor detail view.
//!
//! Runs in two phases:
//! 1. status snapshot + static detail, in parallel. Either missing aborts
//!    the load before anything else is fetched.
//! 2. readings for the trailing window + full alert history, in parallel.
//!
//! Any failure aborts the whole load; there are no partial results.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::DetailError;
use crate::merge::retain_window;
use crate::models::{AlertRecord, SensorStaticDetail, SensorStatusSnapshot, WaterReading};
use crate::service::SensorDataService;
use crate::window::fetch_range;

// ---

/// Everything the detail view needs after a successful load.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    // ---
    pub status: SensorStatusSnapshot,
    pub detail: SensorStaticDetail,
    /// Ascending by reading time.
    pub readings: Vec<WaterReading>,
    /// Most recent first, as returned by the data service.
    pub alerts: Vec<AlertRecord>,
}

/// Fetch status, detail, windowed readings and alert history for a sensor.
#[instrument(skip_all, fields(sensor_id = %sensor_id))]
pub async fn load_sensor_detail(
    service: &dyn SensorDataService,
    sensor_id: &str,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<AggregateResult, DetailError> {
    // ---
    debug!("Loading sensor detail - Step 1");
    let (status, detail) = tokio::try_join!(
        service.get_status(sensor_id),
        service.get_static_detail(sensor_id)
    )?;

    debug!("Loading sensor detail - Step 2");
    let (start, end) = fetch_range(now, window);
    let (mut readings, alerts) = tokio::try_join!(
        service.get_readings_in_range(sensor_id, start, end),
        service.get_alert_history(sensor_id)
    )?;

    retain_window(&mut readings, end, window);

    if readings.is_empty() {
        if let Some(synthetic) = synthesize_reading(&status) {
            debug!("No readings in range, charting the latest status level");
            readings.push(synthetic);
        }
    }

    info!(
        "Loaded sensor detail: {} readings, {} alerts",
        readings.len(),
        alerts.len()
    );

    Ok(AggregateResult {
        status,
        detail,
        readings,
        alerts,
    })
}

/// Build a reading from the status snapshot when it carries both a level and
/// a timestamp.
///
/// The reading id is derived from the snapshot id, so it is stable across
/// loads; `sensor_id` is the snapshot id itself.
pub fn synthesize_reading(status: &SensorStatusSnapshot) -> Option<WaterReading> {
    // ---
    let level = status.water_level?;
    let at = status.last_reading_time?;

    Some(WaterReading {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, status.id.as_bytes()),
        sensor_id: status.id.clone(),
        water_level: Some(level),
        status: status.status,
        reading_time: at,
        created_at: at,
    })
}
