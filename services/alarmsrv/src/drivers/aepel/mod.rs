//! AEPEL IP speaker
//!
//! Each distinct `ip:port` endpoint gets one [`AlertManager`] and one
//! playback task, created on the first `send`. `send` only schedules; the
//! playback task pops the winning voice port, asks the speaker to play it
//! and pauses for the sensor's configured time.

pub mod scheduler;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{AlarmDevice, DeviceError, DeviceOutcome};
use crate::config::SpeakerConfig;
use crate::domain::{AlarmMessage, Protocol, SensorInfo};
pub use scheduler::{AlertManager, Rejection};

/// Fixed form boundary the speaker firmware accepts
pub const MULTIPART_BOUNDARY: &str = "----WebKitFormBoundary01234567891011121314";

/// Credential form sent as the body of the play request
pub fn credentials_body(username: &str, password: &str) -> String {
    let field = |name: &str, value: &str| {
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            MULTIPART_BOUNDARY, name, value
        )
    };
    format!(
        "{}{}--{}--\r\n",
        field("username", username),
        field("password", password),
        MULTIPART_BOUNDARY
    )
}

struct SpeakerEndpoint {
    manager: Arc<Mutex<AlertManager>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SpeakerEndpoint {
    /// Cancel the playback task and wait until it has exited
    async fn close(self, key: &str) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!("Speaker {} playback task panicked", key);
            }
        }
    }
}

/// Shared by every playback task of one driver
#[derive(Clone)]
struct Player {
    client: Client,
    body: Arc<str>,
    poll_interval: Duration,
}

impl Player {
    /// `GET /play/{port}/1` with the credential form as body
    async fn play(&self, key: &str, voice_port: &str) -> Result<(), DeviceError> {
        let url = format!("http://{}/play/{}/1", key, voice_port);
        let response = self
            .client
            .get(url)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(self.body.to_string())
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(DeviceError::Status(status.as_u16()));
        }
        Ok(())
    }

    async fn run(self, key: String, manager: Arc<Mutex<AlertManager>>, cancel: CancellationToken) {
        debug!("Speaker {} playback task started", key);
        loop {
            let next = {
                let mut m = manager.lock();
                m.has_pending().then(|| (m.pop_next(Instant::now()), m.pause_time()))
            };

            match next {
                Some((None, _)) => continue,
                Some((Some(voice_port), pause)) => {
                    let played = tokio::select! {
                        _ = cancel.cancelled() => break,
                        r = self.play(&key, &voice_port) => r,
                    };
                    match played {
                        Ok(()) => {
                            info!("Speaker {} played voice port {}", key, voice_port);
                            if !pause.is_zero() && !sleep_or_cancel(pause, &cancel).await {
                                break;
                            }
                        },
                        Err(e) => error!("Speaker {} play of port {} failed: {}", key, voice_port, e),
                    }
                },
                None => {},
            }

            if !sleep_or_cancel(self.poll_interval, &cancel).await {
                break;
            }
        }
        debug!("Speaker {} playback task stopped", key);
    }
}

/// `false` when cancelled
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

pub struct AepelSpeakerDriver {
    config: SpeakerConfig,
    player: Player,
    endpoints: AsyncMutex<HashMap<String, SpeakerEndpoint>>,
}

impl AepelSpeakerDriver {
    pub fn new(config: SpeakerConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_else(|e| {
                warn!("Speaker HTTP client fallback to defaults: {}", e);
                Client::new()
            });
        let player = Player {
            client,
            body: credentials_body(&config.username, &config.password).into(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        };
        Self {
            config,
            player,
            endpoints: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Number of endpoints with a live playback task
    pub async fn endpoint_count(&self) -> usize {
        self.endpoints.lock().await.len()
    }

    /// Scheduler of one endpoint, if tracked
    pub async fn manager(&self, endpoint: &str) -> Option<Arc<Mutex<AlertManager>>> {
        self.endpoints
            .lock()
            .await
            .get(endpoint)
            .map(|e| Arc::clone(&e.manager))
    }

    /// Get or lazily start the endpoint for `sensor`, refreshing its timing
    async fn endpoint_manager(&self, sensor: &SensorInfo) -> Arc<Mutex<AlertManager>> {
        let key = sensor.endpoint();
        let mut endpoints = self.endpoints.lock().await;
        let endpoint = endpoints.entry(key.clone()).or_insert_with(|| {
            let manager = Arc::new(Mutex::new(AlertManager::new(
                sensor.max_time_secs,
                sensor.pause_time_secs,
                Duration::from_millis(self.config.margin_ms),
            )));
            let cancel = CancellationToken::new();
            let task = tokio::spawn(self.player.clone().run(
                key.clone(),
                Arc::clone(&manager),
                cancel.clone(),
            ));
            info!("Speaker {} tracked ({})", key, sensor.name);
            SpeakerEndpoint {
                manager,
                cancel,
                task,
            }
        });

        endpoint
            .manager
            .lock()
            .set_settings(sensor.max_time_secs, sensor.pause_time_secs);
        Arc::clone(&endpoint.manager)
    }

    /// Cancel and await every playback task
    ///
    /// The endpoint map stays locked until every task has exited, so a
    /// concurrent `send` starts a fresh endpoint only after the old ones are gone.
    pub async fn evict_all(&self) {
        let mut endpoints = self.endpoints.lock().await;
        for endpoint in endpoints.values() {
            endpoint.cancel.cancel();
        }
        let drained: Vec<(String, SpeakerEndpoint)> = endpoints.drain().collect();
        for (key, endpoint) in drained {
            endpoint.close(&key).await;
        }
    }
}

#[async_trait]
impl AlarmDevice for AepelSpeakerDriver {
    fn protocol(&self) -> Protocol {
        Protocol::AepelSpeaker
    }

    async fn send(&self, sensor: &SensorInfo, alarms: &[AlarmMessage]) -> DeviceOutcome {
        if sensor.is_current_time_restricted() {
            if let Some(first) = alarms.first() {
                info!(
                    "Restricted time, request ignored port={} type={} sensor={}",
                    first.alarm_value, first.alarm_type, sensor.name
                );
            }
            return DeviceOutcome::skipped("inside restricted time window");
        }

        let manager = self.endpoint_manager(sensor).await;

        // The speaker has a single playback slot; only the first alarm competes
        let Some(alarm) = alarms.first() else {
            return DeviceOutcome::skipped("no alarm to schedule");
        };
        let interval = Duration::from_millis(alarm.regen_interval_ms.max(0) as u64);
        let verdict =
            manager
                .lock()
                .add_event(&alarm.alarm_value, alarm.priority, interval, Instant::now());

        // Outranked requests still count as detected and may win a later round
        match verdict {
            Ok(()) => DeviceOutcome::Success,
            Err(Rejection::MaxTimeExceeded) => {
                DeviceOutcome::skipped("voice port exceeded its max play time")
            },
            Err(Rejection::OutrankedByPriority) => {
                DeviceOutcome::skipped("pending voice port has higher priority")
            },
            Err(Rejection::OutrankedByRecency) => {
                DeviceOutcome::skipped("pending voice port has waited longer")
            },
        }
    }

    async fn stop(&self, sensor: &SensorInfo, _alarm: &AlarmMessage) -> DeviceOutcome {
        let tracked = self.endpoint_count().await;
        if tracked > self.config.max_endpoints {
            warn!(
                "{} speaker endpoints tracked (limit {}), evicting all (stop on {})",
                tracked, self.config.max_endpoints, sensor.name
            );
            self.evict_all().await;
        }
        DeviceOutcome::skipped("speaker playback ends when requests stop")
    }

    async fn shutdown(&self) {
        self.evict_all().await;
        info!("Speaker driver shut down");
    }
}
