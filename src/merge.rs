//! Merge rules for the three live-update channels.
//!
//! Each function applies one event to the collection it owns and reports
//! whether anything changed. They hold no state of their own and are safe on
//! empty collections, since events may arrive before the bulk load settles.
//!
//! - status:   wholesale replace, last write wins
//! - readings: upsert by id, drop entries outside the window, sort ascending
//! - alerts:   prepend on INSERT only, arrival order is trusted

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::models::{AlertRecord, SensorStatusSnapshot, WaterReading};
use crate::service::{Channel, ChangeEvent, EventType};
use crate::window::is_within_window;

// ---

/// Replace the status snapshot with the event payload.
pub fn replace_status(
    current: &mut Option<SensorStatusSnapshot>,
    event: &ChangeEvent,
    sensor_id: &str,
) -> bool {
    // ---
    if event.event_type == EventType::Delete {
        return false;
    }
    let Some(snapshot) = decode::<SensorStatusSnapshot>(Channel::Status, event) else {
        return false;
    };
    if snapshot.id != sensor_id {
        debug!("Discarding status event for {} (active {})", snapshot.id, sensor_id);
        return false;
    }

    *current = Some(snapshot);
    true
}

/// Upsert a reading by id, then re-establish the window and ordering.
pub fn merge_reading(
    readings: &mut Vec<WaterReading>,
    event: &ChangeEvent,
    sensor_id: &str,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    // ---
    if event.event_type == EventType::Delete {
        return false;
    }
    let Some(reading) = decode::<WaterReading>(Channel::Readings, event) else {
        return false;
    };
    if reading.sensor_id != sensor_id {
        debug!("Discarding reading event for {} (active {})", reading.sensor_id, sensor_id);
        return false;
    }

    match readings.iter_mut().find(|r| r.id == reading.id) {
        Some(existing) => *existing = reading,
        None => readings.push(reading),
    }
    retain_window(readings, now, window);
    true
}

/// Drop readings outside the window ending at `now` and sort the rest by
/// reading time. Applying it twice is the same as applying it once.
pub fn retain_window(readings: &mut Vec<WaterReading>, now: DateTime<Utc>, window: Duration) {
    // ---
    readings.retain(|r| is_within_window(now, r.reading_time, window));
    readings.sort_by_key(|r| r.reading_time);
}

/// Prepend a newly inserted alert.
///
/// Inserts are assumed to arrive in non-decreasing `sent_at` order, so the
/// collection stays most-recent-first without re-sorting. An id that is
/// already present is ignored.
pub fn prepend_alert(alerts: &mut Vec<AlertRecord>, event: &ChangeEvent, sensor_id: &str) -> bool {
    // ---
    if event.event_type != EventType::Insert {
        return false;
    }
    let Some(alert) = decode::<AlertRecord>(Channel::Alerts, event) else {
        return false;
    };
    if alert.sensor_id != sensor_id {
        debug!("Discarding alert event for {} (active {})", alert.sensor_id, sensor_id);
        return false;
    }
    if alerts.iter().any(|a| a.id == alert.id) {
        return false;
    }

    alerts.insert(0, alert);
    true
}

fn decode<T: DeserializeOwned>(channel: Channel, event: &ChangeEvent) -> Option<T> {
    // ---
    match serde_json::from_value::<T>(event.new.clone()) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Dropping undecodable {} event: {} - Raw record: {}", channel, e, event.new);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::SensorStatus;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    fn day() -> Duration {
        Duration::hours(24)
    }

    fn reading(sensor_id: &str, level: f64, at: DateTime<Utc>) -> WaterReading {
        // ---
        WaterReading {
            id: Uuid::new_v4(),
            sensor_id: sensor_id.to_string(),
            water_level: Some(level),
            status: SensorStatus::Normal,
            reading_time: at,
            created_at: at,
        }
    }

    fn alert(sensor_id: &str, at: DateTime<Utc>) -> AlertRecord {
        // ---
        AlertRecord {
            id: Uuid::new_v4(),
            sensor_id: sensor_id.to_string(),
            water_level: Some(120.0),
            status: SensorStatus::Warning,
            message: "Ketinggian air waspada".to_string(),
            sent_at: at,
        }
    }

    fn snapshot(id: &str, level: f64) -> SensorStatusSnapshot {
        // ---
        SensorStatusSnapshot {
            id: id.to_string(),
            name: "Sensor Jembatan Merah".to_string(),
            location: "Sungai Ciliwung, Jakarta Barat".to_string(),
            water_level: Some(level),
            status: SensorStatus::Normal,
            last_reading_time: Some(fixed_now()),
            battery_level: Some(85),
        }
    }

    #[test]
    fn test_status_replaced_wholesale() {
        // ---
        let mut current = Some(snapshot("sensor1", 36.0));
        let mut next = snapshot("sensor1", 53.0);
        next.battery_level = None;

        assert!(replace_status(&mut current, &ChangeEvent::update(&next), "sensor1"));
        assert_eq!(current, Some(next));
    }

    #[test]
    fn test_status_for_other_sensor_is_discarded() {
        // ---
        let mut current = Some(snapshot("sensor1", 36.0));
        let other = snapshot("sensor2", 90.0);

        assert!(!replace_status(&mut current, &ChangeEvent::update(&other), "sensor1"));
        assert_eq!(current.unwrap().water_level, Some(36.0));
    }

    #[test]
    fn test_status_applies_before_bulk_load() {
        // ---
        let mut current = None;
        assert!(replace_status(
            &mut current,
            &ChangeEvent::insert(&snapshot("sensor1", 40.0)),
            "sensor1"
        ));
        assert!(current.is_some());
    }

    #[test]
    fn test_readings_sorted_regardless_of_arrival_order() {
        // ---
        let mut readings = Vec::new();
        for hours_ago in [1, 5, 3, 2, 4] {
            let r = reading("sensor1", 40.0, fixed_now() - Duration::hours(hours_ago));
            assert!(merge_reading(&mut readings, &ChangeEvent::insert(&r), "sensor1", fixed_now(), day()));
        }

        let times: Vec<_> = readings.iter().map(|r| r.reading_time).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
        assert_eq!(readings.len(), 5);
    }

    #[test]
    fn test_stale_readings_dropped_on_merge() {
        // ---
        let mut readings = vec![
            reading("sensor1", 30.0, fixed_now() - Duration::hours(30)),
            reading("sensor1", 31.0, fixed_now() - day()),
            reading("sensor1", 32.0, fixed_now() - Duration::hours(2)),
        ];
        let fresh = reading("sensor1", 33.0, fixed_now());

        merge_reading(&mut readings, &ChangeEvent::insert(&fresh), "sensor1", fixed_now(), day());

        assert_eq!(readings.len(), 2);
        assert!(readings
            .iter()
            .all(|r| r.reading_time > fixed_now() - day()));
    }

    #[test]
    fn test_stale_insert_is_not_retained() {
        // ---
        let mut readings = Vec::new();
        let old = reading("sensor1", 30.0, fixed_now() - Duration::hours(25));

        merge_reading(&mut readings, &ChangeEvent::insert(&old), "sensor1", fixed_now(), day());
        assert!(readings.is_empty());
    }

    #[test]
    fn test_duplicate_insert_is_idempotent() {
        // ---
        let r = reading("sensor1", 44.0, fixed_now() - Duration::minutes(10));
        let event = ChangeEvent::insert(&r);

        let mut once = Vec::new();
        merge_reading(&mut once, &event, "sensor1", fixed_now(), day());

        let mut twice = once.clone();
        merge_reading(&mut twice, &event, "sensor1", fixed_now(), day());

        assert_eq!(once, twice);
    }

    #[test]
    fn test_update_replaces_by_identity() {
        // ---
        let mut original = reading("sensor1", 44.0, fixed_now() - Duration::minutes(10));
        let mut readings = Vec::new();
        merge_reading(&mut readings, &ChangeEvent::insert(&original), "sensor1", fixed_now(), day());

        original.water_level = Some(47.0);
        merge_reading(&mut readings, &ChangeEvent::update(&original), "sensor1", fixed_now(), day());

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].water_level, Some(47.0));
    }

    #[test]
    fn test_reading_for_other_sensor_is_discarded() {
        // ---
        let mut readings = Vec::new();
        let r = reading("sensor2", 44.0, fixed_now());

        assert!(!merge_reading(&mut readings, &ChangeEvent::insert(&r), "sensor1", fixed_now(), day()));
        assert!(readings.is_empty());
    }

    #[test]
    fn test_reading_delete_is_ignored() {
        // ---
        let r = reading("sensor1", 44.0, fixed_now());
        let mut readings = vec![r.clone()];
        let event = ChangeEvent {
            event_type: EventType::Delete,
            new: serde_json::Value::Null,
            old: Some(serde_json::to_value(&r).unwrap()),
        };

        assert!(!merge_reading(&mut readings, &event, "sensor1", fixed_now(), day()));
        assert_eq!(readings.len(), 1);
    }

    #[test]
    fn test_retain_window_is_idempotent() {
        // ---
        let mut readings = vec![
            reading("sensor1", 1.0, fixed_now() - Duration::hours(26)),
            reading("sensor1", 2.0, fixed_now() - Duration::hours(1)),
            reading("sensor1", 3.0, fixed_now() - Duration::hours(3)),
        ];

        retain_window(&mut readings, fixed_now(), day());
        let first = readings.clone();
        retain_window(&mut readings, fixed_now(), day());

        assert_eq!(first, readings);
        assert_eq!(readings.len(), 2);
    }

    #[test]
    fn test_alerts_keep_arrival_order() {
        // ---
        let t1 = fixed_now() - Duration::hours(3);
        let t2 = fixed_now() - Duration::hours(2);
        let t3 = fixed_now() - Duration::hours(1);

        let mut alerts = Vec::new();
        for at in [t3, t1, t2] {
            assert!(prepend_alert(&mut alerts, &ChangeEvent::insert(&alert("sensor1", at)), "sensor1"));
        }

        // Strict prepend: the last alert delivered is first, whatever its sent_at.
        // T3, T1, T2 delivered in that order therefore reads T2, T1, T3.
        let sent: Vec<_> = alerts.iter().map(|a| a.sent_at).collect();
        assert_eq!(sent, vec![t2, t1, t3]);
    }

    #[test]
    fn test_alert_update_and_duplicates_ignored() {
        // ---
        let a = alert("sensor1", fixed_now());
        let mut alerts = Vec::new();

        assert!(!prepend_alert(&mut alerts, &ChangeEvent::update(&a), "sensor1"));
        assert!(prepend_alert(&mut alerts, &ChangeEvent::insert(&a), "sensor1"));
        assert!(!prepend_alert(&mut alerts, &ChangeEvent::insert(&a), "sensor1"));
        assert!(!prepend_alert(&mut alerts, &ChangeEvent::insert(&alert("sensor9", fixed_now())), "sensor1"));
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn test_undecodable_event_is_dropped() {
        // ---
        let mut readings = Vec::new();
        let event = ChangeEvent {
            event_type: EventType::Insert,
            new: serde_json::json!({ "sensor_id": "sensor1" }),
            old: None,
        };

        assert!(!merge_reading(&mut readings, &event, "sensor1", fixed_now(), day()));
        assert!(readings.is_empty());
    }
}
