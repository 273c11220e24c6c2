//! Database schema management for `ews-detail-sync`.
//!
//! Ensures the tables read by the detail view exist, and installs the
//! trigger that publishes row changes on `<table>_changes` NOTIFY channels.
//! Applied once on startup from `main.rs`.

use anyhow::Result;
use sqlx::PgPool;

/// Tables whose row changes are pushed to live subscribers.
pub const NOTIFY_TABLES: [&str; 3] = ["sensor_status", "water_readings", "alerts"];

// ---

/// NOTIFY channel carrying change events for `table`.
pub fn notify_channel(table: &str) -> String {
    format!("{}_changes", table)
}

/// Create or update the database schema (idempotent).
///
/// Safe to call on every startup; tables and indexes are only created when
/// missing, and the change triggers are replaced in place.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Installation metadata, one row per physical sensor
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensors (
            id                 TEXT PRIMARY KEY,
            network_connected  BOOLEAN NOT NULL DEFAULT FALSE,
            network_type       TEXT,
            latitude           DOUBLE PRECISION,
            longitude          DOUBLE PRECISION,
            sensor_type        TEXT,
            installed_on       DATE,
            last_calibrated_on DATE
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Latest known state, overwritten on every reading
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_status (
            id                TEXT PRIMARY KEY REFERENCES sensors (id),
            name              TEXT        NOT NULL,
            location          TEXT        NOT NULL,
            water_level       DOUBLE PRECISION,
            status            TEXT        NOT NULL DEFAULT 'normal',
            last_reading_time TIMESTAMPTZ,
            battery_level     INTEGER
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS water_readings (
            id           UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            sensor_id    TEXT        NOT NULL REFERENCES sensors (id),
            water_level  DOUBLE PRECISION,
            status       TEXT        NOT NULL DEFAULT 'normal',
            reading_time TIMESTAMPTZ NOT NULL,
            created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id          UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            sensor_id   TEXT        NOT NULL REFERENCES sensors (id),
            water_level DOUBLE PRECISION,
            status      TEXT        NOT NULL,
            message     TEXT        NOT NULL,
            sent_at     TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Range query for the chart window
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_water_readings_sensor_time
            ON water_readings (sensor_id, reading_time);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_sensor_sent
            ON alerts (sensor_id, sent_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Publishes {eventType, new, old} on <table>_changes
    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION notify_row_change() RETURNS trigger AS $$
        BEGIN
            PERFORM pg_notify(
                TG_TABLE_NAME || '_changes',
                json_build_object(
                    'eventType', TG_OP,
                    'new', CASE WHEN TG_OP = 'DELETE' THEN NULL ELSE row_to_json(NEW) END,
                    'old', CASE WHEN TG_OP = 'INSERT' THEN NULL ELSE row_to_json(OLD) END
                )::text
            );
            RETURN NULL;
        END;
        $$ LANGUAGE plpgsql;
        "#,
    )
    .execute(&mut *tx)
    .await?;

    for table in NOTIFY_TABLES {
        let trigger = format!("{}_notify_change", table);

        sqlx::query(&format!("DROP TRIGGER IF EXISTS {} ON {};", trigger, table))
            .execute(&mut *tx)
            .await?;

        sqlx::query(&format!(
            "CREATE TRIGGER {} AFTER INSERT OR UPDATE OR DELETE ON {} \
             FOR EACH ROW EXECUTE FUNCTION notify_row_change();",
            trigger, table
        ))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
