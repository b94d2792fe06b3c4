//! Unit tests for the wire and JSON codecs

use market_depth::codec::wire::{encode_message, encode_snapshot, Envelope};
use market_depth::{BookState, DepthConfig, JsonConfig, JsonEncoder};
use rstest::*;
use serde_json::Value;

const TEST_SYMBOL: &str = "ABC";
const TEST_EXCHANGE: &str = "CXA";

/// Book state after the depth-five snapshot from the worked example:
/// five bids from 100.0000 down, five asks from 101.0000 up.
#[fixture]
fn five_deep_state() -> BookState {
    let bids: Vec<(u64, Vec<u64>)> = (0..5)
        .map(|i| (1_000_000 - i * 1_000, vec![1_000]))
        .collect();
    let asks: Vec<(u64, Vec<u64>)> = (0..5)
        .map(|i| (1_010_000 + i * 1_000, vec![2_000]))
        .collect();
    let payload = encode_snapshot(TEST_SYMBOL, 2, 0, 0, &bids, &asks);
    let envelope = Envelope::parse(&payload).expect("parse");

    let mut state = BookState::new(TEST_SYMBOL, DepthConfig::default(), TEST_EXCHANGE);
    state
        .process_snapshot(&envelope.snapshot().expect("view"))
        .expect("process");
    state
}

#[rstest]
fn depth_five_projection_values(five_deep_state: BookState) {
    let encoder = JsonEncoder::new(JsonConfig::default());
    let rendered = encoder.multi_depth_snapshots(five_deep_state.current_snapshot(), &[5]);
    assert_eq!(rendered.len(), 1);

    let parsed: Value = serde_json::from_str(&rendered[&5]).expect("valid json");
    assert_eq!(parsed["symbol"], TEST_SYMBOL);
    assert_eq!(parsed["sequence"], 2);
    assert_eq!(parsed["message_type"], "snapshot");
    assert_eq!(parsed["depth"], 5);
    assert_eq!(parsed["bids"][0]["price"], "100.0000");
    assert_eq!(parsed["bids"][0]["quantity"], "10.00");
    assert_eq!(parsed["bids"][0]["side"], "bid");
    assert_eq!(parsed["bids"][0]["exchanges"][0], TEST_EXCHANGE);
    assert_eq!(parsed["asks"][0]["price"], "101.0000");
    assert_eq!(parsed["market_stats"]["total_bid_levels"], 5);
    assert_eq!(parsed["market_stats"]["has_sufficient_depth"], true);
    assert_eq!(parsed["market_stats"]["spread"], "1.0000");
    assert_eq!(parsed["market_stats"]["mid_price"], "100.5000");
}

#[rstest]
fn insufficient_depth_omits_projection() {
    let payload = encode_snapshot(
        TEST_SYMBOL,
        1,
        0,
        0,
        &[(1_000_000, vec![100])],
        &[(1_010_000, vec![50])],
    );
    let envelope = Envelope::parse(&payload).expect("parse");
    let mut state = BookState::new(TEST_SYMBOL, DepthConfig::default(), TEST_EXCHANGE);
    state
        .process_snapshot(&envelope.snapshot().expect("view"))
        .expect("process");

    let encoder = JsonEncoder::new(JsonConfig::default());
    let rendered = encoder.multi_depth_snapshots(state.current_snapshot(), &[5]);
    assert!(rendered.is_empty());
}

#[rstest]
fn multi_depth_keys_are_subset_with_full_coverage(five_deep_state: BookState) {
    let encoder = JsonEncoder::new(JsonConfig::default());
    let requested = [1_u32, 3, 5, 10, 25];
    let rendered =
        encoder.multi_depth_snapshots(five_deep_state.current_snapshot(), &requested);

    let depths: Vec<u32> = rendered.keys().copied().collect();
    assert_eq!(depths, vec![1, 3, 5]);
    for (depth, payload) in &rendered {
        let parsed: Value = serde_json::from_str(payload).expect("valid json");
        let bids = parsed["bids"].as_array().expect("bids array");
        let asks = parsed["asks"].as_array().expect("asks array");
        assert_eq!(bids.len(), *depth as usize);
        assert_eq!(asks.len(), *depth as usize);
    }
}

#[rstest]
fn depth_limits_levels_not_stats(five_deep_state: BookState) {
    let encoder = JsonEncoder::new(JsonConfig::default());
    let rendered = encoder.snapshot_to_json(five_deep_state.current_snapshot(), 2);
    let parsed: Value = serde_json::from_str(&rendered).expect("valid json");

    assert_eq!(parsed["bids"].as_array().map(Vec::len), Some(2));
    assert_eq!(parsed["asks"].as_array().map(Vec::len), Some(2));
    // Totals still describe the whole book
    assert_eq!(parsed["market_stats"]["total_bid_levels"], 5);
    assert_eq!(parsed["market_stats"]["total_ask_levels"], 5);
}

#[test]
fn unknown_message_types_decode_without_view() {
    for msg_type in [0_u8, 2, 3, 200] {
        let encoded = encode_message(msg_type);
        let envelope = Envelope::parse(&encoded).expect("parse");
        assert_eq!(envelope.msg_type(), msg_type);
        assert!(envelope.snapshot().is_none());
    }
}

#[test]
fn garbage_payloads_are_rejected() {
    // A snapshot tag followed by nonsense lengths must not parse
    let garbage = vec![1_u8, 200, 1, 2, 3];
    assert!(Envelope::parse(&garbage).is_err());

    let truncated = encode_snapshot(TEST_SYMBOL, 1, 0, 0, &[(1, vec![1, 2, 3])], &[]);
    assert!(Envelope::parse(&truncated[..truncated.len() - 4]).is_err());
}
