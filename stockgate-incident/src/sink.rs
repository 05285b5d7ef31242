//! Incident event delivery. The detector publishes lifecycle events through
//! an injected sink; alerting and paging live outside this crate.

use crate::incident::IncidentRecord;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "incident", rename_all = "snake_case")]
pub enum IncidentEvent {
    Created(IncidentRecord),
    Merged(IncidentRecord),
    Resolved(IncidentRecord),
}

impl IncidentEvent {
    pub fn record(&self) -> &IncidentRecord {
        match self {
            Self::Created(record) | Self::Merged(record) | Self::Resolved(record) => {
                record
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Merged(_) => "merged",
            Self::Resolved(_) => "resolved",
        }
    }
}

/// Publishing must never fail the metrics path; implementations log and
/// drop on delivery problems.
pub trait IncidentSink: Send + Sync {
    fn publish(&self, event: IncidentEvent);
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl IncidentSink for NoopSink {
    fn publish(&self, _event: IncidentEvent) {}
}

/// Forwards events over an unbounded channel so an external consumer can
/// drain them at its own pace.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<IncidentEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<IncidentEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<IncidentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl IncidentSink for ChannelSink {
    fn publish(&self, event: IncidentEvent) {
        if self.tx.send(event).is_err() {
            warn!("Incident event receiver dropped; event discarded");
        }
    }
}
