//! Postgres-backed implementations of the sensor data service and the
//! push-update subscription facility.
//!
//! Bulk lookups are plain `sqlx` queries. Live updates ride on `LISTEN`
//! against the channels fed by the triggers from `schema`; each
//! subscription owns a dedicated listener connection and a forwarding task
//! that is aborted when the subscription is dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tracing::{debug, error, warn};

use crate::error::DetailError;
use crate::models::{AlertRecord, SensorStaticDetail, SensorStatusSnapshot, WaterReading};
use crate::schema::notify_channel;
use crate::service::{ChangeEvent, ChannelFilter, EventSink, SensorDataService, Subscription, SubscriptionFacility};

// ---

pub struct PgSensorStore {
    pool: PgPool,
}

impl PgSensorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SensorDataService for PgSensorStore {
    async fn get_status(&self, sensor_id: &str) -> Result<SensorStatusSnapshot, DetailError> {
        // ---
        debug!("Fetching status for {}", sensor_id);
        sqlx::query_as::<_, SensorStatusSnapshot>(
            r#"
            SELECT id, name, location, water_level, status, last_reading_time, battery_level
            FROM sensor_status
            WHERE id = $1
            "#,
        )
        .bind(sensor_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DetailError::not_found("status", sensor_id))
    }

    async fn get_static_detail(&self, sensor_id: &str) -> Result<SensorStaticDetail, DetailError> {
        // ---
        debug!("Fetching static detail for {}", sensor_id);
        sqlx::query_as::<_, SensorStaticDetail>(
            r#"
            SELECT id, network_connected, network_type, latitude, longitude,
                   sensor_type, installed_on, last_calibrated_on
            FROM sensors
            WHERE id = $1
            "#,
        )
        .bind(sensor_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DetailError::not_found("sensor detail", sensor_id))
    }

    async fn get_readings_in_range(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WaterReading>, DetailError> {
        // ---
        debug!("Fetching readings for {} between {} and {}", sensor_id, start, end);
        let readings = sqlx::query_as::<_, WaterReading>(
            r#"
            SELECT id, sensor_id, water_level, status, reading_time, created_at
            FROM water_readings
            WHERE sensor_id = $1
              AND reading_time >= $2
              AND reading_time <= $3
            ORDER BY reading_time ASC
            "#,
        )
        .bind(sensor_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(readings)
    }

    async fn get_alert_history(&self, sensor_id: &str) -> Result<Vec<AlertRecord>, DetailError> {
        // ---
        debug!("Fetching alert history for {}", sensor_id);
        let alerts = sqlx::query_as::<_, AlertRecord>(
            r#"
            SELECT id, sensor_id, water_level, status, message, sent_at
            FROM alerts
            WHERE sensor_id = $1
            ORDER BY sent_at DESC
            "#,
        )
        .bind(sensor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(alerts)
    }
}

pub struct PgSubscriptions {
    pool: PgPool,
}

impl PgSubscriptions {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionFacility for PgSubscriptions {
    async fn subscribe(&self, filter: ChannelFilter, on_event: EventSink) -> anyhow::Result<Subscription> {
        // ---
        let channel = notify_channel(&filter.table);
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&channel).await?;
        debug!("Listening on {} where {} = {}", channel, filter.column, filter.value);

        let scope = filter.clone();
        let task = tokio::spawn(async move {
            loop {
                let notification = match listener.recv().await {
                    Ok(n) => n,
                    Err(e) => {
                        error!("Listener on {} failed, live updates stopped: {}", channel, e);
                        break;
                    }
                };

                let event = match serde_json::from_str::<ChangeEvent>(notification.payload()) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Ignoring malformed notification on {}: {}", channel, e);
                        continue;
                    }
                };

                // DELETE events only carry the old row
                let record = if event.new.is_null() {
                    event.old.as_ref()
                } else {
                    Some(&event.new)
                };
                if record.is_some_and(|r| scope.matches(r)) {
                    on_event(event);
                }
            }
        });

        Ok(Subscription::new(filter, move || task.abort()))
    }
}
