//! End-to-end pipeline tests over the in-process bus

use market_depth::codec::wire::{encode_message, encode_snapshot};
use market_depth::{
    BusRecord, InitError, MemoryBus, Pipeline, PipelineState, ServiceConfig,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const INPUT_TOPIC: &str = "market_depth_input";

fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.processor.poll_timeout_ms = 20;
    config.processor.flush_interval_ms = 50;
    config.processor.stats_interval_s = 1;
    config.depth_config.levels = vec![1, 5];
    config.json_config.compact_format = true;
    config
}

fn input_record(payload: Vec<u8>) -> BusRecord {
    BusRecord {
        topic: INPUT_TOPIC.to_string(),
        partition: None,
        key: None,
        payload,
    }
}

fn snapshot_payload(symbol: &str, seq: u64, bid_qty: u64) -> Vec<u8> {
    encode_snapshot(
        symbol,
        seq,
        0,
        0,
        &[(1_000_000, vec![bid_qty])],
        &[(1_010_000, vec![50])],
    )
}

async fn start(config: ServiceConfig, bus: &MemoryBus) -> (Arc<Pipeline>, JoinHandle<()>) {
    let pipeline = Arc::new(Pipeline::new(config, Arc::new(bus.clone())).expect("config valid"));
    pipeline.initialise().expect("initialise");
    let runner = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            pipeline.run(0).await.expect("run");
        })
    };
    (pipeline, runner)
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

async fn stop(pipeline: &Arc<Pipeline>, runner: JoinHandle<()>) {
    pipeline.stop();
    runner.await.expect("run task");
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[tokio::test]
async fn snapshot_flows_end_to_end() {
    let bus = MemoryBus::new(1024);
    let mut egress = bus.subscribe("market_depth_snapshot_1");
    let (pipeline, runner) = start(test_config(), &bus).await;

    bus.publish(input_record(snapshot_payload("ABC", 1, 100)));

    let record = tokio::time::timeout(Duration::from_secs(2), egress.recv())
        .await
        .expect("published in time")
        .expect("record");
    assert_eq!(record.key.as_deref(), Some("ABC"));
    assert!(record.partition.is_some());

    let parsed: Value = serde_json::from_slice(&record.payload).expect("valid json");
    assert_eq!(parsed["symbol"], "ABC");
    assert_eq!(parsed["message_type"], "snapshot");
    assert_eq!(parsed["depth"], 1);
    assert_eq!(parsed["bids"][0]["price"], "100.0000");

    let metrics = pipeline.metrics();
    assert!(wait_until(|| metrics.snapshot().messages_processed == 1).await);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.messages_consumed, 1);
    assert_eq!(snapshot.snapshots_published, 1); // depth 5 unmet, only depth 1
    assert_eq!(snapshot.processing_errors, 0);

    stop(&pipeline, runner).await;
}

#[tokio::test]
async fn cdc_events_reach_the_cdc_topic() {
    let bus = MemoryBus::new(1024);
    let mut cdc = bus.subscribe("market_depth_cdc");
    let (pipeline, runner) = start(test_config(), &bus).await;

    bus.publish(input_record(snapshot_payload("ABC", 1, 100)));
    bus.publish(input_record(snapshot_payload("ABC", 2, 150)));

    let record = tokio::time::timeout(Duration::from_secs(2), cdc.recv())
        .await
        .expect("published in time")
        .expect("record");
    let parsed: Value = serde_json::from_slice(&record.payload).expect("valid json");
    assert_eq!(parsed["message_type"], "cdc");
    assert_eq!(parsed["event_type"], "level_modified");
    assert_eq!(parsed["side"], "bid");
    assert_eq!(parsed["sequence"], 2);
    assert_eq!(parsed["level"]["quantity"], "1.50");

    let metrics = pipeline.metrics();
    assert!(wait_until(|| metrics.snapshot().cdc_events_published == 1).await);

    stop(&pipeline, runner).await;
}

#[tokio::test]
async fn non_snapshot_envelope_is_skipped() {
    let bus = MemoryBus::new(1024);
    let (pipeline, runner) = start(test_config(), &bus).await;
    let metrics = pipeline.metrics();

    bus.publish(input_record(encode_message(7)));

    assert!(wait_until(|| metrics.snapshot().messages_consumed == 1).await);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.messages_skipped, 1);
    assert_eq!(snapshot.messages_processed, 0);
    assert_eq!(snapshot.processing_errors, 0);
    assert_eq!(snapshot.messages_published, 0);

    stop(&pipeline, runner).await;
}

#[tokio::test]
async fn malformed_payload_is_counted_and_dropped() {
    let bus = MemoryBus::new(1024);
    let (pipeline, runner) = start(test_config(), &bus).await;
    let metrics = pipeline.metrics();

    bus.publish(input_record(vec![1, 200, 1, 2, 3]));
    bus.publish(input_record(snapshot_payload("ABC", 1, 100)));

    assert!(wait_until(|| metrics.snapshot().messages_processed == 1).await);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.messages_consumed, 2);
    assert_eq!(snapshot.decode_errors, 1);

    stop(&pipeline, runner).await;
}

#[tokio::test]
async fn symbols_fan_out_across_workers() {
    let mut config = test_config();
    config.processor.worker_count = 4;
    let bus = MemoryBus::new(1024);
    let (pipeline, runner) = start(config, &bus).await;
    let metrics = pipeline.metrics();

    let symbols = ["AAA", "BBB", "CCC", "DDD", "EEE", "FFF"];
    for (i, symbol) in symbols.iter().enumerate() {
        bus.publish(input_record(snapshot_payload(symbol, i as u64 + 1, 100)));
    }

    assert!(
        wait_until(|| metrics.snapshot().messages_processed == symbols.len() as u64).await
    );
    let registry = pipeline.registry();
    assert_eq!(registry.symbol_count(), symbols.len());
    let stats = registry.aggregate_stats();
    assert_eq!(stats.messages_processed, symbols.len() as u64);

    stop(&pipeline, runner).await;
}

#[tokio::test]
async fn per_symbol_sequencing_is_preserved() {
    let bus = MemoryBus::new(1024);
    let mut cdc = bus.subscribe("market_depth_cdc");
    let (pipeline, runner) = start(test_config(), &bus).await;

    for seq in 1..=5_u64 {
        bus.publish(input_record(snapshot_payload("ABC", seq, 100 + seq)));
    }

    // Four modifications, one per update after the first
    let mut sequences = Vec::new();
    for _ in 0..4 {
        let record = tokio::time::timeout(Duration::from_secs(2), cdc.recv())
            .await
            .expect("published in time")
            .expect("record");
        let parsed: Value = serde_json::from_slice(&record.payload).expect("valid json");
        sequences.push(parsed["sequence"].as_u64().expect("sequence"));
    }
    assert_eq!(sequences, vec![2, 3, 4, 5]);

    stop(&pipeline, runner).await;
}

#[tokio::test]
async fn lifecycle_enforces_state_order() {
    let bus = MemoryBus::new(64);
    let pipeline = Pipeline::new(test_config(), Arc::new(bus)).expect("config valid");
    assert_eq!(pipeline.state(), PipelineState::Created);

    // Running before initialising is a caller error
    let result = pipeline.run(0).await;
    assert!(matches!(result, Err(InitError::InvalidState { .. })));

    pipeline.initialise().expect("initialise");
    assert_eq!(pipeline.state(), PipelineState::Initialised);
    assert!(matches!(
        pipeline.initialise(),
        Err(InitError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn stop_before_run_exits_immediately() {
    let bus = MemoryBus::new(64);
    let pipeline = Arc::new(Pipeline::new(test_config(), Arc::new(bus)).expect("config valid"));
    pipeline.initialise().expect("initialise");

    pipeline.stop();
    tokio::time::timeout(Duration::from_secs(2), pipeline.run(0))
        .await
        .expect("run returns promptly")
        .expect("clean stop");
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[tokio::test]
async fn max_runtime_stops_the_pipeline() {
    let bus = MemoryBus::new(64);
    let pipeline = Arc::new(Pipeline::new(test_config(), Arc::new(bus)).expect("config valid"));
    pipeline.initialise().expect("initialise");

    tokio::time::timeout(Duration::from_secs(5), pipeline.run(1))
        .await
        .expect("deadline observed")
        .expect("clean stop");
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}
