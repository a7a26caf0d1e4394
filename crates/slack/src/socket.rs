use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use henhouse_core::InterfaceError;

use crate::blocks::error_message;
use crate::commands::Notifier;
use crate::events::{EventContext, EventDispatcher, MessageEvent, SlackEnvelope, SlackEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopSocketTransport;

#[async_trait]
impl SocketTransport for NoopSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
    failure_notifier: Option<Arc<dyn Notifier>>,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy, failure_notifier: None }
    }

    /// Tells the sender of a message that could not be handled what went wrong.
    pub fn with_failure_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.failure_notifier = Some(notifier);
        self
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "socket mode transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "socket mode retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        info!(attempt, "socket mode transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let (workspace_id, channel_id) = correlation_fields(&envelope);

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                workspace_id = workspace_id.unwrap_or("unknown"),
                channel_id = channel_id.unwrap_or("unknown"),
                "received slack envelope"
            );

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            if let Err(error) = self.dispatcher.dispatch(&envelope, &context).await {
                let interface = error.into_interface(envelope.envelope_id.clone());
                warn!(
                    event_name = "ingress.slack.dispatch_failed",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %interface.correlation_id(),
                    workspace_id = workspace_id.unwrap_or("unknown"),
                    channel_id = channel_id.unwrap_or("unknown"),
                    error = %interface,
                    user_message = interface.user_message(),
                    "event dispatch failed; continuing socket loop"
                );
                self.notify_failure(&envelope, &interface).await;
            }

            // Acknowledged only once handled, including when handling failed.
            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "acknowledged slack envelope"
                );
            }
        }
    }
}

impl SocketModeRunner {
    async fn notify_failure(&self, envelope: &SlackEnvelope, interface: &InterfaceError) {
        let Some(notifier) = &self.failure_notifier else {
            return;
        };
        let SlackEvent::Message(MessageEvent { sender: Some(sender), workspace_id, .. }) =
            &envelope.event
        else {
            return;
        };

        let message = error_message(interface.user_message(), interface.correlation_id());
        if let Err(error) = notifier.send_direct_message(workspace_id, sender, message).await {
            warn!(
                event_name = "egress.slack.failure_notice",
                correlation_id = %interface.correlation_id(),
                user_id = %sender,
                error = %error,
                "could not tell user about the failure"
            );
        }
    }
}

fn correlation_fields(envelope: &SlackEnvelope) -> (Option<&str>, Option<&str>) {
    match &envelope.event {
        SlackEvent::Message(event) => {
            (Some(event.workspace_id.0.as_str()), Some(event.channel_id.as_str()))
        }
        SlackEvent::Unsupported { .. } => (None, None),
    }
}
