use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use drover_types::WorkflowEvent;

/// Per-subscriber buffer depth. A consumer that falls further behind than
/// this loses the oldest events instead of blocking publishers.
const CHANNEL_CAPACITY: usize = 2048;

/// In-process pub/sub for workflow progress. Publishing never blocks and
/// never fails: events published while nobody is connected are dropped,
/// which is safe because the event stream replays the store snapshot on
/// connect. Each publish is traced with its topic and sequence number.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WorkflowEvent>,
    published: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    /// Observers currently attached to the bus.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Events published over the bus lifetime, delivered or not.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn publish(&self, event: WorkflowEvent) {
        let seq = self.published.fetch_add(1, Ordering::Relaxed) + 1;
        let topic = event.topic();
        match self.tx.send(event) {
            Ok(receivers) => trace!(topic, seq, receivers, "bus event delivered"),
            Err(broadcast::error::SendError(_)) => {
                trace!(topic, seq, "bus event dropped, no subscribers");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
