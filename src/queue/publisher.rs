//! Durable publisher for the ingest server side of the queue (§4.3).
//!
//! Holds a single lazily-(re)established channel behind the shared
//! [`ConnectionStateMachine`] so a connection drop mid-publish is visible
//! to anything else inspecting connection state. Each publish attempt
//! checks the held channel is still connected and reconnects it if not,
//! then retries the publish itself a bounded number of times before
//! giving up and surfacing `AppError::PublishUnavailable`.

use std::sync::Arc;

use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::{BasicProperties, Channel, ChannelState, Connection, ConnectionProperties};
use tokio::sync::RwLock;

use crate::config::BrokerConfig;
use crate::models::VoteMessage;
use crate::queue::connection_state::ConnectionStateMachine;
use crate::queue::topology;
use crate::retry::{retry_with_backoff, BackoffPolicy};

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("not connected to broker")]
    NotConnected,

    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),
}

pub struct VotePublisher {
    config: BrokerConfig,
    channel: RwLock<Option<Channel>>,
    state: Arc<ConnectionStateMachine>,
    retry_policy: BackoffPolicy,
}

impl VotePublisher {
    pub fn new(config: BrokerConfig) -> Self {
        let retry_policy = BackoffPolicy::new(
            config.publish_retry_backoff,
            config.publish_retry_backoff * 10,
            config.publish_retry_attempts,
        );
        let reconnect_delay = config.reconnect_delay;
        Self {
            config,
            channel: RwLock::new(None),
            state: Arc::new(ConnectionStateMachine::new(reconnect_delay)),
            retry_policy,
        }
    }

    pub async fn connect(&self) -> Result<(), PublishError> {
        self.state.mark_connecting().await;
        let connection =
            Connection::connect(&self.config.url, ConnectionProperties::default()).await?;

        self.state.mark_channel_opening().await;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        topology::declare(&channel, &self.config).await?;

        *self.channel.write().await = Some(channel);
        self.state.mark_consuming().await;
        Ok(())
    }

    /// Serialize and publish with the configured retry budget. Every
    /// attempt re-checks the held channel is still there; a missing
    /// channel is treated the same as a publish failure so the same
    /// retry loop covers both "never connected" and "connection dropped".
    pub async fn publish(&self, message: &VoteMessage) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(message).expect("VoteMessage always serializes");

        retry_with_backoff(
            self.retry_policy,
            |attempt| {
                let payload = payload.clone();
                async move {
                    if attempt > 1 {
                        tracing::warn!(attempt, "retrying vote publish");
                    }
                    self.publish_once(&payload).await
                }
            },
            |_| true,
        )
        .await
    }

    async fn publish_once(&self, payload: &[u8]) -> Result<(), PublishError> {
        let channel = self.ensure_channel().await?;

        let confirm = channel
            .basic_publish(
                "",
                &self.config.queue_name,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?;
        confirm.await?;
        Ok(())
    }

    /// Return the held channel if it's still usable, otherwise reconnect.
    /// Called on every publish attempt, so a broker outage that drops the
    /// channel is repaired by the next attempt inside `publish`'s own
    /// retry loop rather than requiring a separate watchdog.
    async fn ensure_channel(&self) -> Result<Channel, PublishError> {
        {
            let guard = self.channel.read().await;
            if let Some(channel) = guard.as_ref() {
                if matches!(channel.status().state(), ChannelState::Connected) {
                    return Ok(channel.clone());
                }
            }
        }

        tracing::warn!("publisher channel not connected; reconnecting to broker");
        self.connect().await?;

        self.channel
            .read()
            .await
            .clone()
            .ok_or(PublishError::NotConnected)
    }

    pub fn connection_state(&self) -> Arc<ConnectionStateMachine> {
        self.state.clone()
    }
}
