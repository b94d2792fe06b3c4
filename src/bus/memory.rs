//! In-process message bus over per-topic broadcast channels

use crate::bus::{BusConsumer, BusProducer, BusRecord, MessageBus};
use crate::error::BusError;
use crate::router::RoutedMessage;
use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

type TopicMap = Arc<RwLock<FxHashMap<String, broadcast::Sender<BusRecord>>>>;

/// In-process bus backed by one broadcast channel per topic
///
/// Topic handles are created on first use and cached for the bus lifetime.
/// Producing to a topic nobody reads succeeds, as with a real broker; a
/// consumer that falls more than the channel capacity behind observes
/// `BusError::Lagged`.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    capacity: usize,
    topics: TopicMap,
}

impl MemoryBus {
    /// Create a bus whose per-topic channels buffer `capacity` records
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            topics: Arc::new(RwLock::new(FxHashMap::default())),
        }
    }

    /// Subscribe to a topic; only records published afterwards are delivered
    #[must_use]
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusRecord> {
        topic_sender(&self.topics, self.capacity, topic).subscribe()
    }

    /// Publish a record, returning how many subscribers received it
    pub fn publish(&self, record: BusRecord) -> usize {
        let sender = topic_sender(&self.topics, self.capacity, &record.topic);
        sender.send(record).unwrap_or(0)
    }

    /// Topics with at least one handle created
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.topics.read().keys().cloned().collect()
    }
}

impl MessageBus for MemoryBus {
    fn consumer(&self, topic: &str) -> Result<Box<dyn BusConsumer>, BusError> {
        debug!(topic, "memory bus consumer subscribed");
        Ok(Box::new(MemoryConsumer {
            receiver: self.subscribe(topic),
        }))
    }

    fn producer(&self) -> Result<Arc<dyn BusProducer>, BusError> {
        Ok(Arc::new(MemoryProducer {
            capacity: self.capacity,
            topics: Arc::clone(&self.topics),
        }))
    }
}

struct MemoryConsumer {
    receiver: broadcast::Receiver<BusRecord>,
}

#[async_trait]
impl BusConsumer for MemoryConsumer {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<BusRecord>, BusError> {
        match tokio::time::timeout(timeout, self.receiver.recv()).await {
            Err(_) => Ok(None),
            Ok(Ok(record)) => Ok(Some(record)),
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                Err(BusError::Lagged(skipped))
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => Err(BusError::Closed),
        }
    }
}

struct MemoryProducer {
    capacity: usize,
    topics: TopicMap,
}

#[async_trait]
impl BusProducer for MemoryProducer {
    fn enqueue(&self, message: &RoutedMessage) -> Result<(), BusError> {
        let sender = topic_sender(&self.topics, self.capacity, &message.topic);
        let record = BusRecord {
            topic: message.topic.clone(),
            partition: message.partition,
            key: Some(message.key.clone()),
            payload: message.payload.clone().into_bytes(),
        };
        // A topic without subscribers drops the record, matching a broker
        // topic nobody consumes.
        let _ = sender.send(record);
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), BusError> {
        // Sends are synchronous; nothing is ever pending.
        Ok(())
    }
}

fn topic_sender(topics: &TopicMap, capacity: usize, topic: &str) -> broadcast::Sender<BusRecord> {
    {
        let topics = topics.read();
        if let Some(sender) = topics.get(topic) {
            return sender.clone();
        }
    }

    let mut topics = topics.write();
    if let Some(sender) = topics.get(topic) {
        return sender.clone();
    }
    let (sender, _) = broadcast::channel(capacity);
    topics.insert(topic.to_string(), sender.clone());
    sender
}
