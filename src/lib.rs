//! Market Depth Fan-out Service
//!
//! Ingests binary order-book snapshots from an upstream message bus,
//! maintains a per-symbol top-of-book view, and republishes depth-limited
//! JSON projections to downstream topics. Optionally derives a per-level
//! Change-Data-Capture stream by diffing successive snapshots of the same
//! symbol.
//!
//! The core pieces, in dependency order:
//! - [`codec`]: binary envelope decoding and JSON encoding
//! - [`book`]: per-symbol book state and the concurrent symbol registry
//! - [`router`]: deterministic topic/partition routing
//! - [`pipeline`]: the consume → process → fan-out loop with backpressure,
//!   graceful shutdown and performance accounting
//!
//! The message bus client is abstracted behind the traits in [`bus`]; the
//! in-process [`bus::MemoryBus`] backs the binary and the test suite.

pub mod book;
pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod router;
pub mod types;

pub use book::{BookRegistry, BookState, ProcessOutcome};
pub use bus::{BusConsumer, BusProducer, BusRecord, MemoryBus, MessageBus};
pub use codec::{Envelope, JsonEncoder, SnapshotView};
pub use config::{DepthConfig, JsonConfig, ProcessorConfig, ServiceConfig, TopicConfig};
pub use error::{BusError, ConfigError, DecodeError, InitError, ProcessError};
pub use pipeline::{MetricsSnapshot, Pipeline, PipelineMetrics, PipelineState};
pub use router::{fnv1a_64, MessageRouter, RoutedMessage};
pub use types::{BookSnapshot, CdcEvent, CdcEventKind, PriceLevel, ProcessingStats, Side};
