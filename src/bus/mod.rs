//! Message bus abstraction
//!
//! The pipeline consumes the bus through these traits; the concrete client
//! library stays outside the core. `MemoryBus` is the in-process
//! implementation used by the binary and the test suite.

pub mod memory;

pub use memory::MemoryBus;

use crate::error::BusError;
use crate::router::RoutedMessage;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// One record delivered by or handed to the bus
#[derive(Debug, Clone)]
pub struct BusRecord {
    /// Topic the record belongs to
    pub topic: String,
    /// Partition, `None` when bus-assigned
    pub partition: Option<u32>,
    /// Message key
    pub key: Option<String>,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

/// Consumer side of the bus
#[async_trait]
pub trait BusConsumer: Send {
    /// Wait up to `timeout` for the next record
    ///
    /// `Ok(None)` means the timeout elapsed without a record, which is not an
    /// error.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<BusRecord>, BusError>;
}

/// Producer side of the bus
#[async_trait]
pub trait BusProducer: Send + Sync {
    /// Hand a message to the bus without waiting for delivery
    fn enqueue(&self, message: &RoutedMessage) -> Result<(), BusError>;

    /// Wait up to `timeout` for pending messages to drain
    async fn flush(&self, timeout: Duration) -> Result<(), BusError>;
}

/// Factory for bus handles, used by the pipeline during initialisation
pub trait MessageBus: Send + Sync {
    /// Create a consumer subscribed to `topic`
    fn consumer(&self, topic: &str) -> Result<Box<dyn BusConsumer>, BusError>;

    /// Create a producer handle
    fn producer(&self) -> Result<Arc<dyn BusProducer>, BusError>;
}
