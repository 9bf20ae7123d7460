//! Alarm dispatch task
//!
//! A single task owns the [`AlarmRegistry`] and multiplexes bus deliveries,
//! the countdown tick and shutdown. Device I/O never runs on this task; it
//! goes to the per-sensor lanes of the [`CommandDispatcher`].

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dispatcher::CommandDispatcher;
use super::registry::{ActiveSensor, AlarmRegistry};
use crate::cache::DeviceCache;
use crate::config::DispatchConfig;
use crate::domain::{parse_payload, AlarmMessage};
use crate::drivers::DriverTable;
use crate::error::{AlarmSrvError, Result};

const COMMAND_QUEUE_SIZE: usize = 256;

enum ServiceCommand {
    Deliver(Vec<AlarmMessage>),
    Snapshot(oneshot::Sender<Vec<ActiveSensor>>),
    Flush(oneshot::Sender<()>),
    /// Close lanes of sensors missing from the reloaded cache
    PruneLanes,
    LaneCount(oneshot::Sender<usize>),
}

pub struct AlarmService {
    registry: AlarmRegistry,
    dispatcher: CommandDispatcher,
    rx: mpsc::Receiver<ServiceCommand>,
    tick_interval: Duration,
    token: CancellationToken,
}

impl AlarmService {
    /// Start the dispatch task and return its handle
    pub fn spawn(
        config: &DispatchConfig,
        cache: Arc<DeviceCache>,
        drivers: DriverTable,
    ) -> AlarmServiceHandle {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let token = CancellationToken::new();

        let service = AlarmService {
            registry: AlarmRegistry::new(),
            dispatcher: CommandDispatcher::new(
                Arc::clone(&cache),
                drivers,
                config.lane_backlog_warn,
            ),
            rx,
            tick_interval: config.tick_interval(),
            token: token.clone(),
        };
        let task = tokio::spawn(service.run());

        AlarmServiceHandle {
            tx,
            cache,
            token,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;
        let elapsed_ms = self.tick_interval.as_millis() as i64;

        info!(
            "Alarm dispatch started (tick {} ms)",
            self.tick_interval.as_millis()
        );

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {
                    for command in self.registry.tick(elapsed_ms) {
                        self.dispatcher.dispatch(command);
                    }
                },
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }
        }

        self.shutdown().await;
    }

    fn handle(&mut self, cmd: ServiceCommand) {
        match cmd {
            ServiceCommand::Deliver(batch) => {
                for command in self.registry.apply_batch(batch) {
                    self.dispatcher.dispatch(command);
                }
            },
            ServiceCommand::Snapshot(reply) => {
                let _ = reply.send(self.registry.snapshot());
            },
            ServiceCommand::Flush(reply) => {
                let barriers = self.dispatcher.barriers();
                tokio::spawn(async move {
                    for barrier in barriers {
                        let _ = barrier.await;
                    }
                    let _ = reply.send(());
                });
            },
            ServiceCommand::LaneCount(reply) => {
                let _ = reply.send(self.dispatcher.lane_count());
            },
            ServiceCommand::PruneLanes => {
                let closed = self.dispatcher.prune_lanes();
                if closed > 0 {
                    info!("Closed {} command lanes of removed sensors", closed);
                }
            },
        }
    }

    async fn shutdown(&mut self) {
        let stops = self.registry.drain_all();
        if !stops.is_empty() {
            info!("Stopping {} active alarms", stops.len());
        }
        for command in stops {
            self.dispatcher.dispatch(command);
        }
        self.dispatcher.close().await;
        self.dispatcher.drivers().shutdown_all().await;
        info!("Alarm dispatch stopped");
    }
}

/// Cloneable front end of the dispatch task
#[derive(Clone)]
pub struct AlarmServiceHandle {
    tx: mpsc::Sender<ServiceCommand>,
    cache: Arc<DeviceCache>,
    token: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AlarmServiceHandle {
    /// Handle one raw `alarm.updated` payload; returns the number of messages accepted
    pub async fn deliver(&self, payload: &[u8]) -> Result<usize> {
        let batch = parse_payload(payload)?;
        if batch.is_empty() {
            warn!("alarm update received empty or invalid payload");
            return Ok(0);
        }
        let count = batch.len();
        self.submit(batch).await?;
        Ok(count)
    }

    /// Queue already-decoded messages
    pub async fn submit(&self, batch: Vec<AlarmMessage>) -> Result<()> {
        self.tx
            .send(ServiceCommand::Deliver(batch))
            .await
            .map_err(|_| AlarmSrvError::ServiceStopped)
    }

    /// Re-read sensor configuration; active alarms are untouched
    pub async fn reload_cache(&self) -> Result<()> {
        self.cache.reload().await?;
        if self.tx.send(ServiceCommand::PruneLanes).await.is_err() {
            debug!("Dispatch task stopped, skipping lane cleanup");
        }
        Ok(())
    }

    /// Number of per-sensor command lanes currently open
    pub async fn lane_count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ServiceCommand::LaneCount(reply))
            .await
            .map_err(|_| AlarmSrvError::ServiceStopped)?;
        rx.await.map_err(|_| AlarmSrvError::ServiceStopped)
    }

    pub fn cache(&self) -> &Arc<DeviceCache> {
        &self.cache
    }

    pub async fn active_alarms(&self) -> Result<Vec<ActiveSensor>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ServiceCommand::Snapshot(reply))
            .await
            .map_err(|_| AlarmSrvError::ServiceStopped)?;
        rx.await.map_err(|_| AlarmSrvError::ServiceStopped)
    }

    /// Wait until every device command issued so far has completed
    pub async fn flush(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ServiceCommand::Flush(reply))
            .await
            .map_err(|_| AlarmSrvError::ServiceStopped)?;
        rx.await.map_err(|_| AlarmSrvError::ServiceStopped)
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.tx.is_closed()
    }

    /// Stop all active alarms, drain the lanes and release driver resources
    pub async fn shutdown(&self) {
        self.token.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Alarm dispatch task ended abnormally: {}", e);
            }
        }
    }
}
