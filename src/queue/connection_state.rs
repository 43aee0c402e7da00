//! Connection state machine for the broker connection (§4.5).
//!
//! Both the publisher and the consumer hold one of these. It exists to
//! make the `Disconnected → Connecting → ChannelOpening → Consuming →
//! (Reconnecting|Stopping)` lifecycle explicit and to reject transitions
//! that would otherwise race (e.g. two tasks independently deciding to
//! reconnect after the same connection drop).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    ChannelOpening,
    Consuming,
    Reconnecting { attempt: u32, backoff_until: Instant },
    Stopping,
}

impl ConnectionState {
    pub fn is_consuming(&self) -> bool {
        matches!(self, ConnectionState::Consuming)
    }

    pub fn is_stopping(&self) -> bool {
        matches!(self, ConnectionState::Stopping)
    }

    pub fn attempt_number(&self) -> u32 {
        match self {
            ConnectionState::Reconnecting { attempt, .. } => *attempt,
            _ => 0,
        }
    }
}

pub struct ConnectionStateMachine {
    state: Arc<RwLock<ConnectionState>>,
    reconnect_delay: Duration,
}

impl ConnectionStateMachine {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            reconnect_delay,
        }
    }

    pub async fn get(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Attempt a transition, rejecting any pair not in the table below.
    /// Returns whether the transition was applied.
    pub async fn try_transition(&self, new_state: ConnectionState) -> bool {
        let mut guard = self.state.write().await;
        let current = *guard;

        let valid = matches!(
            (current, new_state),
            (ConnectionState::Disconnected, ConnectionState::Connecting)
                | (ConnectionState::Connecting, ConnectionState::ChannelOpening)
                | (ConnectionState::Connecting, ConnectionState::Reconnecting { .. })
                | (ConnectionState::Connecting, ConnectionState::Stopping)
                | (ConnectionState::ChannelOpening, ConnectionState::Consuming)
                | (ConnectionState::ChannelOpening, ConnectionState::Reconnecting { .. })
                | (ConnectionState::ChannelOpening, ConnectionState::Stopping)
                | (ConnectionState::Consuming, ConnectionState::Reconnecting { .. })
                | (ConnectionState::Consuming, ConnectionState::Stopping)
                | (ConnectionState::Reconnecting { .. }, ConnectionState::Connecting)
                | (ConnectionState::Reconnecting { .. }, ConnectionState::Stopping)
        );

        if valid {
            tracing::debug!(?current, ?new_state, "broker connection state transition");
            *guard = new_state;
        } else {
            tracing::warn!(?current, ?new_state, "rejected invalid state transition");
        }
        valid
    }

    pub async fn mark_connecting(&self) -> bool {
        self.try_transition(ConnectionState::Connecting).await
    }

    pub async fn mark_channel_opening(&self) -> bool {
        self.try_transition(ConnectionState::ChannelOpening).await
    }

    pub async fn mark_consuming(&self) -> bool {
        self.try_transition(ConnectionState::Consuming).await
    }

    pub async fn mark_stopping(&self) -> bool {
        self.try_transition(ConnectionState::Stopping).await
    }

    /// Schedule a reconnect using the configured fixed delay (§4.5 uses a
    /// fixed `WORKER_RECONNECT_DELAY_SECONDS` rather than exponential
    /// backoff for broker reconnects, unlike the materializer's DB retry).
    pub async fn mark_reconnecting(&self) -> bool {
        let attempt = self.get().await.attempt_number() + 1;
        self.try_transition(ConnectionState::Reconnecting {
            attempt,
            backoff_until: Instant::now() + self.reconnect_delay,
        })
        .await
    }

    pub async fn is_ready_to_reconnect(&self) -> bool {
        match self.get().await {
            ConnectionState::Reconnecting { backoff_until, .. } => Instant::now() >= backoff_until,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ConnectionStateMachine {
        ConnectionStateMachine::new(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn happy_path_lifecycle() {
        let m = machine();
        assert!(m.mark_connecting().await);
        assert!(m.mark_channel_opening().await);
        assert!(m.mark_consuming().await);
        assert!(m.get().await.is_consuming());
        assert!(m.mark_stopping().await);
        assert!(m.get().await.is_stopping());
    }

    #[tokio::test]
    async fn cannot_skip_straight_to_consuming() {
        let m = machine();
        assert!(!m.try_transition(ConnectionState::Consuming).await);
        assert_eq!(m.get().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn reconnect_after_consuming_then_back_to_connecting() {
        let m = machine();
        m.mark_connecting().await;
        m.mark_channel_opening().await;
        m.mark_consuming().await;

        assert!(m.mark_reconnecting().await);
        assert_eq!(m.get().await.attempt_number(), 1);
        assert!(!m.is_ready_to_reconnect().await);

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(m.is_ready_to_reconnect().await);

        assert!(m.mark_connecting().await);
    }

    #[tokio::test]
    async fn repeated_reconnects_increment_attempt() {
        let m = machine();
        m.mark_connecting().await;
        m.mark_reconnecting().await;
        assert_eq!(m.get().await.attempt_number(), 1);
        m.mark_connecting().await;
        m.mark_reconnecting().await;
        assert_eq!(m.get().await.attempt_number(), 2);
    }
}
