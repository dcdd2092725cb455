//! Bounded MPSC queue between connection handlers and the forward
//! worker. Grounded on `original_source/app/services/bus.py`'s
//! process-wide `forward_queue`/`shutdown_event`, but made an explicit
//! `AppContext` field instead of a module global (see DESIGN.md's note
//! on spec.md §9's "process-wide queue" design note).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tracing::warn;

use sia_common::ForwardItem;

/// Producer handle shared by every connection task.
#[derive(Clone)]
pub struct ForwardQueue {
    sender: mpsc::Sender<ForwardItem>,
    depth: Arc<AtomicUsize>,
}

/// Consumer handle held by the single forward worker.
pub struct ForwardQueueReceiver {
    receiver: mpsc::Receiver<ForwardItem>,
    depth: Arc<AtomicUsize>,
}

/// Build a bounded queue pair. `capacity` should be at least 1024 per
/// the concurrency model's recommendation.
pub fn bounded(capacity: usize) -> (ForwardQueue, ForwardQueueReceiver) {
    let (sender, receiver) = mpsc::channel(capacity);
    let depth = Arc::new(AtomicUsize::new(0));
    (
        ForwardQueue { sender, depth: depth.clone() },
        ForwardQueueReceiver { receiver, depth },
    )
}

impl ForwardQueue {
    /// Non-blocking enqueue. Per §5's backpressure policy, a full queue
    /// drops the item rather than blocking the connection handler —
    /// the frame is still ACK'd to the panel.
    pub fn try_enqueue(&self, item: ForwardItem) -> bool {
        match self.sender.try_send(item) {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(err) => {
                warn!(error = %err, "forward queue full or closed, dropping event");
                false
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

impl ForwardQueueReceiver {
    pub async fn recv(&mut self) -> Option<ForwardItem> {
        let item = self.receiver.recv().await;
        if item.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        item
    }

    pub fn is_empty(&self) -> bool {
        self.depth.load(Ordering::Relaxed) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::collections::BTreeMap;

    fn sample_event(sequence: u32) -> sia_common::ParsedEvent {
        sia_common::ParsedEvent {
            account: "AAA".to_string(),
            sequence,
            receiver: Some("1".to_string()),
            line: "1".to_string(),
            message_type: 'N',
            code: "BA".to_string(),
            zone: Some("001".to_string()),
            partition: None,
            extras: BTreeMap::new(),
            timestamp: DateTime::parse_from_rfc3339("2025-10-20T07:52:50+00:00")
                .unwrap()
                .with_timezone(&Utc),
            timestamp_from_panel: true,
            remote_addr: "127.0.0.1:4000".to_string(),
            raw: String::new(),
        }
    }

    #[tokio::test]
    async fn enqueued_item_is_received_in_order() {
        let (queue, mut rx) = bounded(4);
        assert!(queue.try_enqueue(ForwardItem::new(sample_event(1))));
        assert!(queue.try_enqueue(ForwardItem::new(sample_event(2))));
        assert_eq!(queue.depth(), 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event.sequence, 1);
        assert_eq!(queue.depth(), 1);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (queue, _rx) = bounded(1);
        assert!(queue.try_enqueue(ForwardItem::new(sample_event(1))));
        assert!(!queue.try_enqueue(ForwardItem::new(sample_event(2))));
    }
}
