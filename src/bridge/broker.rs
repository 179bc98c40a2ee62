//! Broker side of the bridge: the per-broker event worker.

use crate::bridge::device::POLL_INTERVAL;
use crate::config::PipelineTable;
use crate::pipeline::{Dispatcher, Packet};
use crate::transport::BrokerEvent;
use crate::types::ReasonCode;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Worker that owns one broker's event channel.
pub struct BrokerSource {
    name: String,
    events: Receiver<BrokerEvent>,
    dispatcher: Dispatcher,
    pipelines: PipelineTable,
    running: Arc<AtomicBool>,
}

impl BrokerSource {
    pub fn new(
        name: impl Into<String>,
        events: Receiver<BrokerEvent>,
        dispatcher: Dispatcher,
        pipelines: PipelineTable,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            name: name.into(),
            events,
            dispatcher,
            pipelines,
            running,
        }
    }

    /// Run until the bridge stops.
    pub fn run(self) {
        tracing::debug!("Broker worker {} started", self.name);

        while self.running.load(Ordering::SeqCst) {
            match self.events.recv_timeout(POLL_INTERVAL) {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::debug!("Broker worker {} stopped", self.name);
    }

    fn handle_event(&self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected(reason) => {
                if reason.is_failure() {
                    tracing::error!("Broker {} refused connection: {}", self.name, reason);
                } else {
                    tracing::info!("Connected to broker {}: {}", self.name, reason);
                }
            }
            BrokerEvent::Message { topic, payload } => self.on_message(&topic, payload),
            BrokerEvent::Published { message_id, reason } => {
                if reason.is_failure() {
                    tracing::error!(
                        "Broker {} rejected message {}: {}",
                        self.name,
                        message_id,
                        reason
                    );
                } else {
                    tracing::debug!("Broker {} acknowledged message {}", self.name, message_id);
                }
            }
            BrokerEvent::Subscribed(reasons) => self.on_subscribed(&reasons),
        }
    }

    fn on_message(&self, topic: &str, payload: Vec<u8>) {
        let text = match String::from_utf8(payload) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    "Dropping non UTF-8 message on {} from broker {}: {}",
                    topic,
                    self.name,
                    e
                );
                return;
            }
        };
        tracing::debug!("Message on {} from broker {}: {}", topic, self.name, text);

        if self.pipelines.is_empty() {
            tracing::debug!(
                "No pipeline configured for broker {}; only the packet filter runs",
                self.name
            );
        }
        self.dispatcher
            .dispatch(&self.name, Packet::Text(text), &self.pipelines);
    }

    fn on_subscribed(&self, reasons: &[ReasonCode]) {
        for reason in reasons {
            if reason.is_failure() {
                tracing::error!("Broker {} rejected subscription: {}", self.name, reason);
            } else {
                tracing::info!("Subscribed on broker {}: {}", self.name, reason);
            }
        }
    }
}
