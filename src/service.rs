//! Ports to the two upstream collaborators of the detail view.
//!
//! - [`SensorDataService`]: bulk lookups (status, static detail, readings in
//!   a time range, alert history).
//! - [`SubscriptionFacility`]: push-update channels scoped to one table and
//!   one filter value, delivering [`ChangeEvent`]s.
//!
//! The Postgres implementations live in `store`; tests use the in-memory
//! fakes from [`fakes`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DetailError;
use crate::models::{AlertRecord, SensorStaticDetail, SensorStatusSnapshot, WaterReading};

// ---

/// Kind of row change carried by a push event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Insert,
    Update,
    Delete,
}

/// A single push-update event: `{ eventType, new, old? }`.
///
/// `new` stays as raw JSON until the merger decodes it for its channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    // ---
    #[serde(rename = "eventType")]
    pub event_type: EventType,
    #[serde(default)]
    pub new: Value,
    #[serde(default)]
    pub old: Option<Value>,
}

impl ChangeEvent {
    // ---
    pub fn insert<T: Serialize>(record: &T) -> Self {
        Self::with_type(EventType::Insert, record)
    }

    pub fn update<T: Serialize>(record: &T) -> Self {
        Self::with_type(EventType::Update, record)
    }

    fn with_type<T: Serialize>(event_type: EventType, record: &T) -> Self {
        // ---
        ChangeEvent {
            event_type,
            new: serde_json::to_value(record).unwrap_or(Value::Null),
            old: None,
        }
    }
}

/// The three live-update channels of a detail view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Status,
    Readings,
    Alerts,
}

impl Channel {
    // ---
    pub const ALL: [Channel; 3] = [Channel::Status, Channel::Readings, Channel::Alerts];

    /// Source table of the channel.
    pub fn table(&self) -> &'static str {
        match self {
            Channel::Status => "sensor_status",
            Channel::Readings => "water_readings",
            Channel::Alerts => "alerts",
        }
    }

    /// Column holding the sensor id in the channel's records.
    pub fn filter_column(&self) -> &'static str {
        match self {
            Channel::Status => "id",
            Channel::Readings | Channel::Alerts => "sensor_id",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// `(table, column, value)` scope of one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelFilter {
    pub table: String,
    pub column: String,
    pub value: String,
}

impl ChannelFilter {
    // ---
    pub fn for_sensor(channel: Channel, sensor_id: &str) -> Self {
        ChannelFilter {
            table: channel.table().to_string(),
            column: channel.filter_column().to_string(),
            value: sensor_id.to_string(),
        }
    }

    /// Whether a record's filter column equals the filter value.
    pub fn matches(&self, record: &Value) -> bool {
        // ---
        match record.get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Number(n)) => n.to_string() == self.value,
            _ => false,
        }
    }
}

/// Callback invoked for every delivered event.
pub type EventSink = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Owned handle to a live subscription. Dropping it unsubscribes.
pub struct Subscription {
    filter: ChannelFilter,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    // ---
    pub fn new<F>(filter: ChannelFilter, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Subscription {
            filter,
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // ---
        if let Some(release) = self.release.take() {
            tracing::debug!(
                "Unsubscribing from {} where {} = {}",
                self.filter.table,
                self.filter.column,
                self.filter.value
            );
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("filter", &self.filter).finish()
    }
}

#[async_trait]
pub trait SensorDataService: Send + Sync {
    /// Latest status snapshot. `NotFound` if the sensor has none.
    async fn get_status(&self, sensor_id: &str) -> Result<SensorStatusSnapshot, DetailError>;

    /// Installation metadata. `NotFound` if the sensor is unknown.
    async fn get_static_detail(&self, sensor_id: &str) -> Result<SensorStaticDetail, DetailError>;

    /// Readings with `start <= reading_time <= end`.
    async fn get_readings_in_range(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WaterReading>, DetailError>;

    /// Full alert history, most recent first.
    async fn get_alert_history(&self, sensor_id: &str) -> Result<Vec<AlertRecord>, DetailError>;
}

#[async_trait]
pub trait SubscriptionFacility: Send + Sync {
    /// Start delivering events matching `filter` to `on_event` until the
    /// returned handle is dropped.
    async fn subscribe(&self, filter: ChannelFilter, on_event: EventSink) -> anyhow::Result<Subscription>;
}


#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_change_event_wire_format() {
        // ---
        let raw = json!({
            "eventType": "UPDATE",
            "new": { "id": "sensor1", "water_level": 53 },
            "old": { "id": "sensor1", "water_level": 50 }
        });

        let event: ChangeEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.event_type, EventType::Update);
        assert_eq!(event.new["water_level"], 53);
        assert!(event.old.is_some());
    }

    #[test]
    fn test_delete_event_without_new_record() {
        // ---
        let raw = json!({ "eventType": "DELETE", "old": { "id": "x" } });
        let event: ChangeEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.event_type, EventType::Delete);
        assert!(event.new.is_null());
    }

    #[test]
    fn test_filter_matches_on_column_value() {
        // ---
        let filter = ChannelFilter::for_sensor(Channel::Readings, "sensor1");
        assert_eq!(filter.table, "water_readings");
        assert_eq!(filter.column, "sensor_id");

        assert!(filter.matches(&json!({ "sensor_id": "sensor1" })));
        assert!(!filter.matches(&json!({ "sensor_id": "sensor2" })));
        assert!(!filter.matches(&json!({ "id": "sensor1" })));

        let status = ChannelFilter::for_sensor(Channel::Status, "sensor1");
        assert!(status.matches(&json!({ "id": "sensor1" })));
    }

    #[test]
    fn test_dropping_subscription_releases_it() {
        // ---
        use std::sync::atomic::{AtomicBool, Ordering};

        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let sub = Subscription::new(ChannelFilter::for_sensor(Channel::Alerts, "s"), move || {
            flag.store(true, Ordering::SeqCst);
        });

        assert!(!released.load(Ordering::SeqCst));
        drop(sub);
        assert!(released.load(Ordering::SeqCst));
    }
}
