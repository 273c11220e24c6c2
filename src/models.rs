//! Data models for the sensor detail view.
//!
//! Records mirror the rows of the sensor data service (`sensor_status`,
//! `sensors`, `water_readings`, `alerts`) and double as the JSON payloads
//! carried by push-update events.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// ---

/// Water-level status classification, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    Normal,
    Warning,
    Siaga,
    Danger,
}

impl SensorStatus {
    // ---
    /// Classify a raw status string. Anything unrecognised is treated as
    /// `Danger`, the most severe class.
    pub fn classify(raw: &str) -> Self {
        // ---
        match raw.trim().to_ascii_lowercase().as_str() {
            "normal" => SensorStatus::Normal,
            "warning" | "waspada" => SensorStatus::Warning,
            "siaga" => SensorStatus::Siaga,
            _ => SensorStatus::Danger,
        }
    }

    /// Label shown to operators on the dashboard.
    pub fn display_label(&self) -> &'static str {
        // ---
        match self {
            SensorStatus::Normal => "Normal",
            SensorStatus::Warning => "Waspada",
            SensorStatus::Siaga => "Siaga",
            SensorStatus::Danger => "Bahaya",
        }
    }
}

impl From<String> for SensorStatus {
    fn from(raw: String) -> Self {
        SensorStatus::classify(&raw)
    }
}

impl<'de> Deserialize<'de> for SensorStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // ---
        let raw = String::deserialize(deserializer)?;
        Ok(SensorStatus::classify(&raw))
    }
}

/// Battery charge band shown on the detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryBand {
    Good,
    Low,
    Critical,
}

impl BatteryBand {
    // ---
    /// Above 60% is good, above 20% is low, anything else is critical.
    pub fn from_percent(level: i32) -> Self {
        match level {
            l if l > 60 => BatteryBand::Good,
            l if l > 20 => BatteryBand::Low,
            _ => BatteryBand::Critical,
        }
    }
}

/// Latest known point-in-time state of a sensor.
///
/// Replaced wholesale on every status update; fields are never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SensorStatusSnapshot {
    // ---
    pub id: String,
    pub name: String,
    pub location: String,
    #[serde(default, deserialize_with = "lenient_level")]
    pub water_level: Option<f64>,
    #[sqlx(try_from = "String")]
    pub status: SensorStatus,
    #[serde(default)]
    pub last_reading_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub battery_level: Option<i32>,
}

impl SensorStatusSnapshot {
    pub fn battery_band(&self) -> Option<BatteryBand> {
        self.battery_level.map(BatteryBand::from_percent)
    }
}

/// Installation and connectivity metadata. Fetched once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SensorStaticDetail {
    // ---
    pub id: String,
    pub network_connected: bool,
    pub network_type: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub sensor_type: Option<String>,
    pub installed_on: Option<NaiveDate>,
    pub last_calibrated_on: Option<NaiveDate>,
}

/// One timestamped water-level measurement, in centimetres.
///
/// `water_level` is `None` when the stored value is missing or not numeric;
/// such readings stay in the collection but never reach the chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WaterReading {
    // ---
    pub id: Uuid,
    pub sensor_id: String,
    #[serde(default, deserialize_with = "lenient_level")]
    pub water_level: Option<f64>,
    #[sqlx(try_from = "String")]
    pub status: SensorStatus,
    pub reading_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A notification sent when a status threshold was crossed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AlertRecord {
    // ---
    pub id: Uuid,
    pub sensor_id: String,
    #[serde(default, deserialize_with = "lenient_level")]
    pub water_level: Option<f64>,
    #[sqlx(try_from = "String")]
    pub status: SensorStatus,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

/// A single point handed to the charting surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartPoint {
    // ---
    /// `HH:MM` in the display offset.
    pub label: String,
    pub value: i64,
}

/// Accept any JSON value for a water level, keeping only finite numbers.
fn lenient_level<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| v.as_f64()).filter(|v| v.is_finite()))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_classification() {
        // ---
        assert_eq!(SensorStatus::classify("normal"), SensorStatus::Normal);
        assert_eq!(SensorStatus::classify("Waspada"), SensorStatus::Warning);
        assert_eq!(SensorStatus::classify("warning"), SensorStatus::Warning);
        assert_eq!(SensorStatus::classify("siaga"), SensorStatus::Siaga);
        assert_eq!(SensorStatus::classify("danger"), SensorStatus::Danger);

        // Unknown values fall through to the most severe class
        assert_eq!(SensorStatus::classify("offline"), SensorStatus::Danger);
    }

    #[test]
    fn test_status_severity_order() {
        // ---
        assert!(SensorStatus::Normal < SensorStatus::Warning);
        assert!(SensorStatus::Warning < SensorStatus::Siaga);
        assert!(SensorStatus::Siaga < SensorStatus::Danger);
        assert_eq!(SensorStatus::Siaga.display_label(), "Siaga");
        assert_eq!(SensorStatus::Danger.display_label(), "Bahaya");
    }

    #[test]
    fn test_battery_band_thresholds() {
        // ---
        assert_eq!(BatteryBand::from_percent(85), BatteryBand::Good);
        assert_eq!(BatteryBand::from_percent(61), BatteryBand::Good);
        assert_eq!(BatteryBand::from_percent(60), BatteryBand::Low);
        assert_eq!(BatteryBand::from_percent(21), BatteryBand::Low);
        assert_eq!(BatteryBand::from_percent(20), BatteryBand::Critical);
        assert_eq!(BatteryBand::from_percent(0), BatteryBand::Critical);
    }

    #[test]
    fn test_reading_with_non_numeric_level_decodes_as_absent() {
        // ---
        let payload = json!({
            "id": "5f0c6d3e-8a43-4c55-9a57-0d1c7f1f5a10",
            "sensor_id": "sensor1",
            "water_level": "n/a",
            "status": "normal",
            "reading_time": "2024-05-01T12:00:00+00:00",
            "created_at": "2024-05-01T12:00:01+00:00"
        });

        let reading: WaterReading = serde_json::from_value(payload).unwrap();
        assert_eq!(reading.water_level, None);
        assert_eq!(reading.sensor_id, "sensor1");
    }

    #[test]
    fn test_snapshot_missing_optional_fields() {
        // ---
        let payload = json!({
            "id": "sensor2",
            "name": "Sensor Kampung Pulo",
            "location": "Sungai Ciliwung, Jakarta Timur",
            "status": "warning"
        });

        let snapshot: SensorStatusSnapshot = serde_json::from_value(payload).unwrap();
        assert_eq!(snapshot.status, SensorStatus::Warning);
        assert_eq!(snapshot.water_level, None);
        assert_eq!(snapshot.last_reading_time, None);
        assert_eq!(snapshot.battery_band(), None);
        assert_eq!(snapshot.battery_level, None);
    }
}
