//! End-to-end processing pipeline
//!
//! Owns the bus handles, the book registry, the codec and the router, and
//! drives the consume → process → fan-out loop. Symbols are shard-pinned:
//! the consumer dispatches each snapshot to `fnv1a(symbol) % worker_count`,
//! so a given symbol is always processed by the same worker and no book
//! state ever sees concurrent writers.

pub mod metrics;

pub use metrics::{MetricsSnapshot, PipelineMetrics};

use crate::book::BookRegistry;
use crate::bus::{BusConsumer, BusProducer, MessageBus};
use crate::codec::wire::{self, Envelope, MSG_ORDER_BOOK_SNAPSHOT};
use crate::codec::JsonEncoder;
use crate::config::ServiceConfig;
use crate::error::{BusError, InitError};
use crate::router::{fnv1a_64, MessageRouter};
use crate::types::{BookSnapshot, CdcEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Bounded wait applied to every producer flush call
const FLUSH_WAIT: Duration = Duration::from_millis(100);

/// Symbols listed in the periodic statistics report
const TOP_SYMBOL_REPORT: usize = 5;

/// Pipeline lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed, bus handles not yet created
    Created,
    /// Bus handles created, ready to run
    Initialised,
    /// Processing loop active
    Running,
    /// Shutdown requested, draining
    Stopping,
    /// Fully stopped, producer flushed
    Stopped,
}

impl PipelineState {
    /// Human-readable state name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Initialised => "Initialised",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
        }
    }
}

/// Market depth processing pipeline
pub struct Pipeline {
    config: ServiceConfig,
    bus: Arc<dyn MessageBus>,
    state: Mutex<PipelineState>,
    shutdown: Arc<watch::Sender<bool>>,
    metrics: Arc<PipelineMetrics>,
    registry: Arc<BookRegistry>,
    encoder: Arc<JsonEncoder>,
    router: Arc<MessageRouter>,
    consumer: Mutex<Option<Box<dyn BusConsumer>>>,
    producer: Mutex<Option<Arc<dyn BusProducer>>>,
}

impl Pipeline {
    /// Create a pipeline over a validated configuration and a bus connector
    pub fn new(config: ServiceConfig, bus: Arc<dyn MessageBus>) -> Result<Self, InitError> {
        config.validate()?;
        let registry = Arc::new(BookRegistry::new(
            config.depth_config.clone(),
            config.json_config.exchange_name.clone(),
        ));
        let encoder = Arc::new(JsonEncoder::new(config.json_config.clone()));
        let router = Arc::new(MessageRouter::new(config.topic_config.clone()));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            bus,
            state: Mutex::new(PipelineState::Created),
            shutdown: Arc::new(shutdown),
            metrics: Arc::new(PipelineMetrics::new()),
            registry,
            encoder,
            router,
            consumer: Mutex::new(None),
            producer: Mutex::new(None),
        })
    }

    /// Create and subscribe the bus handles
    ///
    /// Fails with `InitError` if either handle cannot be created; no partial
    /// state is left behind.
    pub fn initialise(&self) -> Result<(), InitError> {
        {
            let state = self.state.lock();
            if *state != PipelineState::Created {
                return Err(InitError::InvalidState {
                    state: state.name(),
                    expected: PipelineState::Created.name(),
                });
            }
        }

        let consumer = self.bus.consumer(&self.config.processor.input_topic)?;
        let producer = self.bus.producer()?;
        *self.consumer.lock() = Some(consumer);
        *self.producer.lock() = Some(producer);
        *self.state.lock() = PipelineState::Initialised;

        info!(
            input_topic = %self.config.processor.input_topic,
            workers = self.config.processor.worker_count,
            depth_levels = ?self.config.depth_config.levels,
            enable_cdc = self.config.depth_config.enable_cdc,
            enable_snapshots = self.config.depth_config.enable_snapshots,
            "pipeline initialised"
        );
        Ok(())
    }

    /// Drive the processing loop until `stop` is called or the runtime cap
    /// elapses (`max_runtime_seconds`, 0 = unlimited)
    ///
    /// Returns after all tasks have been joined and the producer flushed.
    pub async fn run(&self, max_runtime_seconds: u64) -> Result<(), InitError> {
        {
            let mut state = self.state.lock();
            if *state != PipelineState::Initialised {
                return Err(InitError::InvalidState {
                    state: state.name(),
                    expected: PipelineState::Initialised.name(),
                });
            }
            *state = PipelineState::Running;
        }

        let consumer = self
            .consumer
            .lock()
            .take()
            .ok_or(InitError::InvalidState {
                state: PipelineState::Running.name(),
                expected: PipelineState::Initialised.name(),
            })?;
        let producer = self
            .producer
            .lock()
            .take()
            .ok_or(InitError::InvalidState {
                state: PipelineState::Running.name(),
                expected: PipelineState::Initialised.name(),
            })?;

        let deadline = (max_runtime_seconds > 0)
            .then(|| Instant::now() + Duration::from_secs(max_runtime_seconds));
        info!(max_runtime_seconds, "pipeline running");

        let worker_count = self.config.processor.worker_count.max(1);
        let context = Arc::new(WorkerContext {
            registry: Arc::clone(&self.registry),
            encoder: Arc::clone(&self.encoder),
            router: Arc::clone(&self.router),
            producer: Arc::clone(&producer),
            metrics: Arc::clone(&self.metrics),
            depth_levels: self.config.depth_config.levels.clone(),
            enable_snapshots: self.config.depth_config.enable_snapshots,
        });

        let mut shards = Vec::with_capacity(worker_count);
        let mut worker_handles = Vec::with_capacity(worker_count);
        for worker in 0..worker_count {
            let (tx, rx) = mpsc::channel::<Vec<u8>>(self.config.processor.queue_capacity);
            shards.push(tx);
            let ctx = Arc::clone(&context);
            worker_handles.push(tokio::spawn(worker_loop(worker, rx, ctx)));
        }

        let consumer_handle = tokio::spawn(consumer_loop(
            consumer,
            shards,
            Arc::clone(&self.shutdown),
            Arc::clone(&self.metrics),
            Duration::from_millis(self.config.processor.poll_timeout_ms),
            deadline,
        ));
        let flush_handle = tokio::spawn(flush_loop(
            Arc::clone(&producer),
            Arc::clone(&self.shutdown),
            Duration::from_millis(self.config.processor.flush_interval_ms),
        ));
        let stats_handle = tokio::spawn(stats_loop(
            Arc::clone(&self.metrics),
            Arc::clone(&self.registry),
            Arc::clone(&self.shutdown),
            Duration::from_secs(self.config.processor.stats_interval_s),
        ));

        // The consumer exits once the shutdown flag is observed; dropping its
        // shard senders lets the workers drain their queues and stop.
        if let Err(err) = consumer_handle.await {
            error!(error = %err, "consumer task failed");
        }
        for handle in worker_handles {
            if let Err(err) = handle.await {
                error!(error = %err, "worker task failed");
            }
        }

        self.shutdown.send_replace(true);
        if let Err(err) = stats_handle.await {
            error!(error = %err, "statistics task failed");
        }
        if let Err(err) = flush_handle.await {
            error!(error = %err, "flush task failed");
        }
        if let Err(err) = producer.flush(FLUSH_WAIT).await {
            warn!(error = %err, "final producer flush failed");
        }

        report_statistics(&self.metrics, &self.registry);
        *self.state.lock() = PipelineState::Stopped;
        info!("pipeline stopped");
        Ok(())
    }

    /// Request a graceful stop; `run` performs the drain, join and flush
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == PipelineState::Running {
                *state = PipelineState::Stopping;
            }
        }
        self.shutdown.send_replace(true);
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    /// Pipeline metrics handle
    #[must_use]
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Book registry handle
    #[must_use]
    pub fn registry(&self) -> Arc<BookRegistry> {
        Arc::clone(&self.registry)
    }
}

/// Shared state for the processing workers
struct WorkerContext {
    registry: Arc<BookRegistry>,
    encoder: Arc<JsonEncoder>,
    router: Arc<MessageRouter>,
    producer: Arc<dyn BusProducer>,
    metrics: Arc<PipelineMetrics>,
    depth_levels: Vec<u32>,
    enable_snapshots: bool,
}

impl WorkerContext {
    fn handle_record(&self, payload: &[u8]) {
        let started = Instant::now();

        let envelope = match Envelope::parse(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "failed to decode envelope");
                self.metrics.incr_decode_errors();
                return;
            }
        };
        let Some(view) = envelope.snapshot() else {
            self.metrics.incr_skipped();
            return;
        };

        let outcome = match self.registry.process_snapshot(&view) {
            Ok(outcome) => {
                self.metrics.incr_processed();
                outcome
            }
            Err(err) => {
                error!(symbol = view.symbol(), error = %err, "snapshot processing failed");
                self.metrics.incr_processing_errors();
                return;
            }
        };

        if self.enable_snapshots {
            self.publish_snapshots(&outcome.snapshot);
        }
        for event in &outcome.events {
            self.publish_cdc(event);
        }

        let elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.metrics.record_processing_time(elapsed_us);
    }

    fn publish_snapshots(&self, snapshot: &BookSnapshot) {
        let payloads = self.encoder.multi_depth_snapshots(snapshot, &self.depth_levels);
        for (depth, payload) in payloads {
            let message = self.router.route_snapshot(&snapshot.symbol, depth, payload);
            match self.producer.enqueue(&message) {
                Ok(()) => self.metrics.incr_snapshot_published(),
                Err(err) => {
                    warn!(topic = %message.topic, error = %err, "snapshot publish failed");
                    self.metrics.incr_publish_errors();
                }
            }
        }
    }

    fn publish_cdc(&self, event: &CdcEvent) {
        let payload = self.encoder.cdc_to_json(event);
        let message = self.router.route_cdc(&event.symbol, payload);
        match self.producer.enqueue(&message) {
            Ok(()) => self.metrics.incr_cdc_published(),
            Err(err) => {
                warn!(topic = %message.topic, error = %err, "cdc publish failed");
                self.metrics.incr_publish_errors();
            }
        }
    }
}

async fn consumer_loop(
    mut consumer: Box<dyn BusConsumer>,
    shards: Vec<mpsc::Sender<Vec<u8>>>,
    shutdown: Arc<watch::Sender<bool>>,
    metrics: Arc<PipelineMetrics>,
    poll_timeout: Duration,
    deadline: Option<Instant>,
) {
    let shutdown_rx = shutdown.subscribe();
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                info!("maximum runtime reached, stopping");
                shutdown.send_replace(true);
                break;
            }
        }

        match consumer.poll(poll_timeout).await {
            Ok(None) => {}
            Ok(Some(record)) => {
                metrics.incr_consumed();
                let shard = match wire::peek(&record.payload) {
                    Err(err) => {
                        warn!(error = %err, "failed to decode envelope header");
                        metrics.incr_decode_errors();
                        continue;
                    }
                    Ok(peeked) if peeked.msg_type != MSG_ORDER_BOOK_SNAPSHOT => {
                        metrics.incr_skipped();
                        continue;
                    }
                    Ok(peeked) => {
                        let symbol = peeked.symbol.unwrap_or_default();
                        (fnv1a_64(symbol.as_bytes()) % shards.len() as u64) as usize
                    }
                };
                if shards[shard].send(record.payload).await.is_err() {
                    error!("worker queue closed, stopping consumer");
                    shutdown.send_replace(true);
                    break;
                }
            }
            Err(BusError::Closed) => {
                error!("bus closed, stopping consumer");
                metrics.incr_bus_errors();
                shutdown.send_replace(true);
                break;
            }
            Err(err) => {
                warn!(error = %err, "bus poll failed");
                metrics.incr_bus_errors();
            }
        }
    }
    debug!("consumer stopped");
}

async fn worker_loop(worker: usize, mut queue: mpsc::Receiver<Vec<u8>>, context: Arc<WorkerContext>) {
    debug!(worker, "worker started");
    while let Some(payload) = queue.recv().await {
        context.handle_record(&payload);
    }
    debug!(worker, "worker stopped");
}

async fn flush_loop(
    producer: Arc<dyn BusProducer>,
    shutdown: Arc<watch::Sender<bool>>,
    every: Duration,
) {
    let mut shutdown_rx = shutdown.subscribe();
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = producer.flush(FLUSH_WAIT).await {
                    warn!(error = %err, "producer flush failed");
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

async fn stats_loop(
    metrics: Arc<PipelineMetrics>,
    registry: Arc<BookRegistry>,
    shutdown: Arc<watch::Sender<bool>>,
    every: Duration,
) {
    let mut shutdown_rx = shutdown.subscribe();
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => report_statistics(&metrics, &registry),
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

fn report_statistics(metrics: &PipelineMetrics, registry: &BookRegistry) {
    let snapshot = metrics.snapshot();
    let stats = registry.aggregate_stats();
    info!(
        uptime_s = snapshot.uptime_secs,
        consumed = snapshot.messages_consumed,
        processed = snapshot.messages_processed,
        published = snapshot.messages_published,
        skipped = snapshot.messages_skipped,
        rate_msg_s = format!("{:.1}", snapshot.message_rate()),
        "pipeline throughput"
    );
    info!(
        decode = snapshot.decode_errors,
        processing = snapshot.processing_errors,
        bus = snapshot.bus_errors,
        publish = snapshot.publish_errors,
        stale_sequences = stats.stale_sequences_observed,
        truncated = stats.truncated_snapshots,
        "pipeline errors"
    );
    info!(
        min_us = snapshot.min_processing_time_us,
        avg_us = format!("{:.1}", snapshot.avg_processing_time_us),
        max_us = snapshot.max_processing_time_us,
        "processing latency"
    );
    info!(
        active_symbols = registry.symbol_count(),
        top_symbols = ?stats.busiest_symbols(TOP_SYMBOL_REPORT),
        cdc_events = stats.cdc_events_generated,
        "book registry"
    );
}
