//! Authoritative state of the detail view and its single update entry point.
//!
//! Every mutation (sensor selection, bulk-load completion, live events)
//! goes through [`DetailState::apply`]. Each selection bumps a generation
//! counter; load results and events tagged with an older generation are
//! dropped, which keeps a late response for a previous sensor from leaking
//! into the current view.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregator::AggregateResult;
use crate::error::DetailError;
use crate::load_state::LoadState;
use crate::merge::{merge_reading, prepend_alert, replace_status, retain_window};
use crate::models::{AlertRecord, BatteryBand, ChartPoint, SensorStaticDetail, SensorStatusSnapshot, WaterReading};
use crate::normalize::{chart_points, summarize, ChartSummary};
use crate::service::{ChangeEvent, Channel};

// ---

#[derive(Debug)]
pub enum Action {
    /// Switch the view to a sensor and start loading it.
    Select { sensor_id: String },
    /// Outcome of the bulk load started by the selection `generation`.
    LoadFinished {
        generation: u64,
        result: Result<AggregateResult, DetailError>,
    },
    /// A live event from one of the channels opened for `generation`.
    Change {
        generation: u64,
        channel: Channel,
        event: ChangeEvent,
    },
    /// Leave the detail view.
    Close,
}

#[derive(Debug, Clone)]
pub struct DetailState {
    // ---
    pub sensor_id: Option<String>,
    pub generation: u64,
    pub load: LoadState,
    pub status: Option<SensorStatusSnapshot>,
    pub detail: Option<SensorStaticDetail>,
    /// Ascending by reading time, inside the window.
    pub readings: Vec<WaterReading>,
    /// Most recent first.
    pub alerts: Vec<AlertRecord>,
    window: Duration,
}

impl DetailState {
    // ---
    pub fn new(window: Duration) -> Self {
        DetailState {
            sensor_id: None,
            generation: 0,
            load: LoadState::Idle,
            status: None,
            detail: None,
            readings: Vec::new(),
            alerts: Vec::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Apply one action. Returns `true` if the state changed.
    pub fn apply(&mut self, action: Action, now: DateTime<Utc>) -> bool {
        // ---
        match action {
            Action::Select { sensor_id } => {
                self.clear();
                self.generation += 1;
                info!("Selected sensor {} (generation {})", sensor_id, self.generation);
                self.sensor_id = Some(sensor_id);
                self.load.start();
                true
            }
            Action::Close => {
                self.clear();
                self.generation += 1;
                self.sensor_id = None;
                self.load.reset();
                true
            }
            Action::LoadFinished { generation, result } => {
                if generation != self.generation {
                    debug!(
                        "Discarding load result for generation {} (current {})",
                        generation, self.generation
                    );
                    return false;
                }
                match result {
                    Ok(loaded) => self.accept_load(loaded, now),
                    Err(e) if e.is_not_found() => {
                        info!("Sensor detail unavailable: {}", e);
                        self.load.finish(Err(e))
                    }
                    Err(e) => {
                        warn!("Sensor detail load failed: {}", e);
                        self.load.finish(Err(e))
                    }
                }
            }
            Action::Change {
                generation,
                channel,
                event,
            } => {
                if generation != self.generation {
                    debug!("Discarding {} event from generation {}", channel, generation);
                    return false;
                }
                let Some(sensor_id) = self.sensor_id.as_deref() else {
                    return false;
                };
                match channel {
                    Channel::Status => replace_status(&mut self.status, &event, sensor_id),
                    Channel::Readings => {
                        merge_reading(&mut self.readings, &event, sensor_id, now, self.window)
                    }
                    Channel::Alerts => prepend_alert(&mut self.alerts, &event, sensor_id),
                }
            }
        }
    }

    /// Install a bulk-load result, keeping live events that arrived first.
    ///
    /// A live status wins over the fetched one. Live readings are upserted
    /// over the fetched ones and the window re-applied. Live alerts stay in
    /// front of the fetched history.
    fn accept_load(&mut self, loaded: AggregateResult, now: DateTime<Utc>) -> bool {
        // ---
        let AggregateResult {
            status,
            detail,
            readings,
            alerts,
        } = loaded;

        if self.status.is_none() {
            self.status = Some(status);
        }
        self.detail = Some(detail);

        let live_readings = std::mem::replace(&mut self.readings, readings);
        if !live_readings.is_empty() {
            for live in live_readings {
                match self.readings.iter_mut().find(|r| r.id == live.id) {
                    Some(existing) => *existing = live,
                    None => self.readings.push(live),
                }
            }
            retain_window(&mut self.readings, now, self.window);
        }

        let fetched: Vec<AlertRecord> = alerts
            .into_iter()
            .filter(|a| !self.alerts.iter().any(|live| live.id == a.id))
            .collect();
        self.alerts.extend(fetched);

        self.load.finish::<DetailError>(Ok(()))
    }

    fn clear(&mut self) {
        // ---
        self.status = None;
        self.detail = None;
        self.readings.clear();
        self.alerts.clear();
    }

    /// Build the view model, recomputing chart points from the readings.
    pub fn view(&self, offset: FixedOffset) -> DetailView {
        // ---
        let chart: Vec<ChartPoint> = chart_points(&self.readings, offset).collect();
        let summary = summarize(chart.iter().cloned());

        DetailView {
            sensor_id: self.sensor_id.clone(),
            load: self.load.clone(),
            status_label: self.status.as_ref().map(|s| s.status.display_label()),
            battery: self.status.as_ref().and_then(|s| s.battery_band()),
            status: self.status.clone(),
            detail: self.detail.clone(),
            alerts: self.alerts.clone(),
            chart,
            summary,
        }
    }
}

/// What the presentation layer renders for the detail page.
#[derive(Debug, Clone, Serialize)]
pub struct DetailView {
    // ---
    pub sensor_id: Option<String>,
    pub load: LoadState,
    pub status: Option<SensorStatusSnapshot>,
    pub status_label: Option<&'static str>,
    pub battery: Option<BatteryBand>,
    pub detail: Option<SensorStaticDetail>,
    pub alerts: Vec<AlertRecord>,
    pub chart: Vec<ChartPoint>,
    pub summary: Option<ChartSummary>,
}
