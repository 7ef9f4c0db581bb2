//! Poll scheduler driving the evaluation pipeline.
//!
//! Every tick: fetch all entities, snapshot subscribers, run the proximity
//! and geofence engines over the immutable snapshot, then dispatch the
//! resulting alerts. At most one evaluation pass is in flight at a time; a
//! tick arriving while the previous pass still runs is skipped, since the
//! alert store is mutated non-atomically within a pass. Fetch failures are
//! logged and retried on the next tick; nothing terminates the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::dispatch::{self, Dispatcher};
use crate::feed::FeedClient;
use crate::model::EntitySnapshot;
use crate::registry::Registry;
use crate::state::AlertStore;
use crate::{geofence, proximity};

/// Tunables for the evaluation loop.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub radius_km: f64,
    pub cooldown: chrono::Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            radius_km: proximity::DEFAULT_RADIUS_KM,
            cooldown: chrono::Duration::milliseconds(proximity::DEFAULT_COOLDOWN_MS),
        }
    }
}

/// What one evaluation pass produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassSummary {
    pub entities: usize,
    pub proximity_alerts: usize,
    pub geofence_alerts: usize,
    pub running_alerts: usize,
    pub delivered: usize,
}

/// Owns the recurring evaluation pipeline.
pub struct Monitor {
    feed: FeedClient,
    registry: Registry,
    dispatcher: Arc<Dispatcher>,
    store: Arc<Mutex<AlertStore>>,
    config: MonitorConfig,
    in_flight: Mutex<()>,
}

impl Monitor {
    pub fn new(
        feed: FeedClient,
        registry: Registry,
        dispatcher: Arc<Dispatcher>,
        store: Arc<Mutex<AlertStore>>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            feed,
            registry,
            dispatcher,
            store,
            config,
            in_flight: Mutex::new(()),
        }
    }

    /// Run the evaluation loop forever.
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            radius_km = self.config.radius_km,
            "monitoring started"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            // Single-flight: never let two passes race on the alert store.
            let Ok(_guard) = self.in_flight.try_lock() else {
                warn!("previous evaluation pass still running, skipping tick");
                continue;
            };

            match self.run_once().await {
                Ok(summary) => {
                    if summary.proximity_alerts
                        + summary.geofence_alerts
                        + summary.running_alerts
                        > 0
                    {
                        info!(
                            entities = summary.entities,
                            proximity = summary.proximity_alerts,
                            geofence = summary.geofence_alerts,
                            running = summary.running_alerts,
                            delivered = summary.delivered,
                            "evaluation pass emitted alerts"
                        );
                    } else {
                        debug!(entities = summary.entities, "evaluation pass clean");
                    }
                }
                Err(error) => {
                    warn!(%error, "evaluation pass failed, will retry next tick");
                }
            }
        }
    }

    /// One fetch-evaluate-dispatch pass over the current world state.
    pub async fn run_once(&self) -> anyhow::Result<PassSummary> {
        let subscribers = self.registry.all().await?;
        let raw_entities = self.feed.fetch_entities().await?;
        let now = Utc::now();

        let entities: Vec<EntitySnapshot> = raw_entities
            .iter()
            .filter_map(|(id, entity)| entity.snapshot(id, now))
            .collect();

        // Engines run synchronously over the snapshot while holding the
        // store; delivery happens after the lock is released.
        let (proximity_alerts, geofence_alerts, running_alerts) = {
            let mut store = self.store.lock().await;
            (
                proximity::evaluate(
                    &subscribers,
                    &entities,
                    self.config.radius_km,
                    self.config.cooldown,
                    &mut store,
                    now,
                ),
                geofence::evaluate(&entities, &mut store),
                geofence::detect_running(&entities, &mut store, now),
            )
        };

        let mut delivered = self
            .dispatcher
            .send_proximity_batch(&proximity_alerts, now)
            .await;

        let destinations: Vec<String> = subscribers
            .iter()
            .map(|s| s.endpoint().to_string())
            .collect();

        for alert in &geofence_alerts {
            info!(
                entity = %alert.entity_id,
                event = %alert.event,
                created_by = alert.created_by.as_deref().unwrap_or("unknown"),
                "geofence transition"
            );
            let payload = dispatch::geofence_payload(alert, now);
            delivered += self
                .dispatcher
                .broadcast(&payload, destinations.clone())
                .await
                .delivered;
        }

        for alert in &running_alerts {
            info!(entity = %alert.entity_id, "running pattern detected");
            let payload = dispatch::running_payload(alert);
            delivered += self
                .dispatcher
                .broadcast(&payload, destinations.clone())
                .await
                .delivered;
        }

        Ok(PassSummary {
            entities: entities.len(),
            proximity_alerts: proximity_alerts.len(),
            geofence_alerts: geofence_alerts.len(),
            running_alerts: running_alerts.len(),
            delivered,
        })
    }
}
