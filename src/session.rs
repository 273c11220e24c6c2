//! The live detail session: one selected sensor, its bulk load, and its
//! three push-update subscriptions.
//!
//! A single worker task owns the [`DetailState`]. Commands from the HTTP
//! layer and actions from the load task and subscription callbacks are all
//! funnelled into that task, so state updates never interleave. Readers get
//! a published copy through a `watch` channel.
//!
//! Selecting a sensor first releases everything held for the previous one
//! (aborts its load, drops its subscriptions), so subscriptions for two
//! different sensors never coexist.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{Duration, FixedOffset, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::aggregator::load_sensor_detail;
use crate::models::ChartPoint;
use crate::service::{Channel, ChannelFilter, EventSink, SensorDataService, Subscription, SubscriptionFacility};
use crate::state::{Action, DetailState, DetailView};

// ---

/// Tunables for a detail session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Width of the chart window.
    pub window: Duration,
    /// Offset used for chart labels.
    pub display_offset: FixedOffset,
}

enum Command {
    Select(String),
    Close,
}

/// Cloneable handle to the session worker.
#[derive(Clone)]
pub struct DetailSession {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<DetailState>,
    settings: SessionSettings,
}

impl DetailSession {
    // ---
    /// Start the worker task. It stops once every handle has been dropped.
    pub fn spawn(
        service: Arc<dyn SensorDataService>,
        facility: Arc<dyn SubscriptionFacility>,
        settings: SessionSettings,
    ) -> Self {
        // ---
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let initial = DetailState::new(settings.window);
        let (published, state) = watch::channel(initial.clone());

        let worker = Worker {
            state: initial,
            service,
            facility,
            published,
            actions_tx,
            active: None,
        };
        tokio::spawn(worker.run(commands_rx, actions_rx));

        DetailSession {
            commands: commands_tx,
            state,
            settings,
        }
    }

    /// Switch the view to `sensor_id`. Returns once the request is queued.
    pub async fn select(&self, sensor_id: &str) -> Result<()> {
        self.send(Command::Select(sensor_id.to_string())).await
    }

    /// Leave the detail view, releasing all subscriptions.
    pub async fn close(&self) -> Result<()> {
        self.send(Command::Close).await
    }

    /// Current view model.
    pub fn view(&self) -> DetailView {
        self.state.borrow().view(self.settings.display_offset)
    }

    /// Current chart points only.
    pub fn chart(&self) -> Vec<ChartPoint> {
        self.view().chart
    }

    /// Subscribe to state changes.
    pub fn watch(&self) -> watch::Receiver<DetailState> {
        self.state.clone()
    }

    async fn send(&self, command: Command) -> Result<()> {
        // ---
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("detail session worker has stopped"))
    }
}

/// Resources held for the selected sensor.
struct ActiveSensor {
    sensor_id: String,
    load: JoinHandle<()>,
    subscriptions: Vec<Subscription>,
}

struct Worker {
    state: DetailState,
    service: Arc<dyn SensorDataService>,
    facility: Arc<dyn SubscriptionFacility>,
    published: watch::Sender<DetailState>,
    actions_tx: mpsc::UnboundedSender<Action>,
    active: Option<ActiveSensor>,
}

impl Worker {
    // ---
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut actions: mpsc::UnboundedReceiver<Action>,
    ) {
        // ---
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Select(sensor_id)) => self.select(sensor_id).await,
                    Some(Command::Close) => {
                        self.release();
                        self.dispatch(Action::Close);
                    }
                    None => break,
                },
                Some(action) = actions.recv() => self.dispatch(action),
            }
        }

        self.release();
        info!("Detail session stopped");
    }

    async fn select(&mut self, sensor_id: String) {
        // ---
        self.release();
        self.dispatch(Action::Select {
            sensor_id: sensor_id.clone(),
        });
        let generation = self.state.generation;

        let load = {
            let service = self.service.clone();
            let tx = self.actions_tx.clone();
            let window = self.state.window();
            let sensor_id = sensor_id.clone();
            tokio::spawn(async move {
                let result = load_sensor_detail(service.as_ref(), &sensor_id, Utc::now(), window).await;
                let _ = tx.send(Action::LoadFinished { generation, result });
            })
        };

        let mut subscriptions = Vec::with_capacity(Channel::ALL.len());
        for channel in Channel::ALL {
            let tx = self.actions_tx.clone();
            let sink: EventSink = Arc::new(move |event| {
                let _ = tx.send(Action::Change {
                    generation,
                    channel,
                    event,
                });
            });

            match self
                .facility
                .subscribe(ChannelFilter::for_sensor(channel, &sensor_id), sink)
                .await
            {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => warn!("Live {} updates unavailable for {}: {:#}", channel, sensor_id, e),
            }
        }

        info!(
            "Watching sensor {} on {} live channels",
            sensor_id,
            subscriptions.len()
        );
        self.active = Some(ActiveSensor {
            sensor_id,
            load,
            subscriptions,
        });
    }

    /// Abort the in-flight load and drop the subscriptions of the current
    /// sensor, if any.
    fn release(&mut self) {
        // ---
        if let Some(active) = self.active.take() {
            info!("Releasing sensor {}", active.sensor_id);
            active.load.abort();
            drop(active.subscriptions);
        }
    }

    fn dispatch(&mut self, action: Action) {
        // ---
        if self.state.apply(action, Utc::now()) {
            self.published.send_replace(self.state.clone());
        }
    }
}
