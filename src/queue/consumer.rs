//! Worker-side consumer loop (§4.5): a manual-ack `basic_consume` stream
//! fanned out across a bounded pool of concurrent handlers so one slow
//! materialization doesn't stall the rest of the prefetched batch.

use std::sync::Arc;

use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::auth;
use crate::config::{BrokerConfig, JwtConfig};
use crate::materializer::VoteMaterializer;
use crate::models::VoteMessage;
use crate::queue::connection_state::ConnectionStateMachine;
use crate::queue::topology;

pub struct VoteConsumer {
    broker: BrokerConfig,
    jwt: JwtConfig,
    materializer: Arc<VoteMaterializer>,
    state: Arc<ConnectionStateMachine>,
}

impl VoteConsumer {
    pub fn new(broker: BrokerConfig, jwt: JwtConfig, materializer: Arc<VoteMaterializer>) -> Self {
        let reconnect_delay = broker.reconnect_delay;
        Self {
            broker,
            jwt,
            materializer,
            state: Arc::new(ConnectionStateMachine::new(reconnect_delay)),
        }
    }

    pub fn connection_state(&self) -> Arc<ConnectionStateMachine> {
        self.state.clone()
    }

    /// Reconnect-and-consume loop: on any connection-level error, mark
    /// `Reconnecting` and retry after the fixed broker delay until
    /// `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                self.state.mark_stopping().await;
                return;
            }

            match self.consume_until_dropped(cancel.clone()).await {
                Ok(()) => {
                    self.state.mark_stopping().await;
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "consumer connection lost");
                    self.state.mark_reconnecting().await;
                    while !self.state.is_ready_to_reconnect().await {
                        tokio::time::sleep(self.broker.reconnect_delay / 10).await;
                        if cancel.is_cancelled() {
                            self.state.mark_stopping().await;
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn consume_until_dropped(&self, cancel: CancellationToken) -> Result<(), lapin::Error> {
        self.state.mark_connecting().await;
        let connection =
            Connection::connect(&self.broker.url, ConnectionProperties::default()).await?;

        self.state.mark_channel_opening().await;
        let channel = connection.create_channel().await?;
        topology::declare(&channel, &self.broker).await?;
        channel
            .basic_qos(self.broker.prefetch_count, BasicQosOptions::default())
            .await?;

        let mut consumer = channel
            .basic_consume(
                &self.broker.queue_name,
                "votepipe-worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        self.state.mark_consuming().await;

        let permits = Arc::new(Semaphore::new(self.broker.prefetch_count.max(1) as usize));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = consumer.next() => {
                    let Some(delivery) = next else { return Ok(()) };
                    let delivery = delivery?;

                    let permit = permits.clone().acquire_owned().await.expect("semaphore not closed");
                    let materializer = self.materializer.clone();
                    let jwt = self.jwt.clone();
                    tokio::spawn(async move {
                        handle_delivery(delivery, &materializer, &jwt).await;
                        drop(permit);
                    });
                }
            }
        }
    }
}

async fn handle_delivery(delivery: Delivery, materializer: &VoteMaterializer, jwt: &JwtConfig) {
    let message: VoteMessage = match serde_json::from_slice(&delivery.data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "undecodable vote message; routing to dead-letter queue");
            reject(&delivery).await;
            return;
        }
    };

    // Expiry is ignored here: tokens are minted for a single request and
    // may legitimately expire while sitting in the queue. Only the
    // signature is re-checked to rule out a forged identifier.
    let user_identifier = match auth::verify_token(&message.user_token, &jwt.secret, &jwt.algorithm, false) {
        Ok(sub) => sub,
        Err(e) => {
            tracing::warn!(error = %e, "vote message carries an invalid token; routing to dead-letter queue");
            reject(&delivery).await;
            return;
        }
    };

    match materializer.materialize(&message, &user_identifier).await {
        Ok(_outcome) => ack(&delivery).await,
        Err(e) => {
            tracing::error!(error = %e, "vote materialization failed after retries; routing to dead-letter queue");
            reject(&delivery).await;
        }
    }
}

async fn ack(delivery: &Delivery) {
    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
        tracing::error!(error = %e, "failed to ack delivery");
    }
}

/// Nack without requeue: the dead-letter-exchange binding on the main
/// queue (declared in `topology::declare`) routes it to the DLQ instead
/// of discarding it.
async fn reject(delivery: &Delivery) {
    if let Err(e) = delivery
        .nack(BasicNackOptions {
            requeue: false,
            ..Default::default()
        })
        .await
    {
        tracing::error!(error = %e, "failed to nack delivery");
    }
}
