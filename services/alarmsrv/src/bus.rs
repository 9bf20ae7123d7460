//! Redis Pub/Sub bus subscriber
//!
//! Alarm-state payloads on the alarm channel go to the dispatch service;
//! any message on the reload channel refreshes the device cache.

use futures::StreamExt;
use redis::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BusConfig;
use crate::error::Result;
use crate::service::AlarmServiceHandle;

/// What a single bus message did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusAction {
    Delivered(usize),
    Reloaded,
    Dropped,
}

pub struct BusSubscriber {
    config: BusConfig,
    service: AlarmServiceHandle,
}

impl BusSubscriber {
    pub fn new(config: BusConfig, service: AlarmServiceHandle) -> Self {
        Self { config, service }
    }

    /// Route one message by channel
    pub async fn handle_message(&self, channel: &str, payload: &[u8]) -> BusAction {
        if channel == self.config.reload_channel {
            return match self.service.reload_cache().await {
                Ok(()) => BusAction::Reloaded,
                Err(e) => {
                    error!("Sensor cache reload failed: {}", e);
                    BusAction::Dropped
                },
            };
        }

        if channel != self.config.alarm_channel {
            debug!("Ignoring message on channel {}", channel);
            return BusAction::Dropped;
        }

        match self.service.deliver(payload).await {
            Ok(0) => BusAction::Dropped,
            Ok(count) => BusAction::Delivered(count),
            Err(e) => {
                error!("Failed to process {} payload: {}", channel, e);
                BusAction::Dropped
            },
        }
    }

    /// Subscribe until cancelled, reconnecting after connection loss
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let client = Client::open(self.config.redis_url.as_str())?;
        let reconnect = Duration::from_millis(self.config.reconnect_delay_ms);

        loop {
            match self.listen(&client, &token).await {
                Ok(()) => break,
                Err(e) => error!("Bus connection lost: {}", e),
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(reconnect) => {},
            }
        }

        info!("Bus subscriber stopped");
        Ok(())
    }

    /// `Ok` only when cancelled
    async fn listen(&self, client: &Client, token: &CancellationToken) -> Result<()> {
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&self.config.alarm_channel).await?;
        if !self.config.reload_channel.is_empty() {
            pubsub.subscribe(&self.config.reload_channel).await?;
        }
        info!(
            "Bus subscribed: {} / {}",
            self.config.alarm_channel, self.config.reload_channel
        );

        let mut stream = pubsub.on_message();
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                msg = stream.next() => {
                    let Some(msg) = msg else {
                        warn!("Bus message stream ended");
                        return Err(redis::RedisError::from((
                            redis::ErrorKind::IoError,
                            "pubsub stream closed",
                        ))
                        .into());
                    };
                    let channel = msg.get_channel_name().to_string();
                    let payload = msg.get_payload_bytes().to_vec();
                    self.handle_message(&channel, &payload).await;
                },
            }
        }
    }
}
