//! Integration tests for the query engine against both key layouts.

use std::sync::Arc;
use std::time::Duration;

use pingrank::error::{PingRankError, StoreQueryError};
use pingrank::instant::parse_instant;
use pingrank::store::StoreRequest;
use pingrank::{
    Bounds, Direction, EngineConfig, FixedSide, IndexPath, MemoryStore, NoDataRecorded,
    PingEngine, PingQuery, PingsOutcome, RankOutcome, RankQuery, RawItem, Sample,
    SelfPairPolicy, Subject, TableConfig, TelemetryStore, Window,
};
use serde_json::json;

const R2R: &str = "r2r_pings";
const R2L: &str = "r2l_pings";

fn tables() -> Vec<TableConfig> {
    vec![
        TableConfig::composite(R2R),
        TableConfig::timestamp_sorted(R2L).with_peer_time_index("destination-timestamp-index"),
    ]
}

/// Loads the same samples into both tables.
fn engine(samples: &[(&str, &str, &str, f64)]) -> PingEngine<MemoryStore> {
    let mut store = MemoryStore::new();
    for table in tables() {
        store.create_table(&table.name);
        for (origin, peer, ts, latency) in samples {
            let sample = Sample::new(*origin, *peer, parse_instant(ts).unwrap(), *latency).unwrap();
            store.insert_sample(&table, &sample);
        }
    }
    PingEngine::new(Arc::new(store), EngineConfig::new(tables())).unwrap()
}

fn ranked(outcome: &RankOutcome) -> &Sample {
    match outcome {
        RankOutcome::Ranked(sample) => sample,
        other => panic!("expected a ranked sample, got {other:?}"),
    }
}

fn window(lo: &str, hi: &str) -> Window {
    Window::parse(Some(lo), Some(hi)).unwrap()
}

#[tokio::test]
async fn test_latest_sample_supersedes_lower_latency() {
    // Peer A was faster at 10:00 but its 11:00 sample is the one that counts.
    let engine = engine(&[
        ("us-east-1", "A", "2024-05-01T10:00:00Z", 10.0),
        ("us-east-1", "A", "2024-05-01T11:00:00Z", 50.0),
        ("us-east-1", "B", "2024-05-01T10:00:00Z", 5.0),
    ]);
    let w = window("2024-05-01T00:00:00Z", "2024-05-01T23:59:59Z");

    for table in [R2R, R2L] {
        let origin = FixedSide::Origin("us-east-1".to_string());
        let first = engine
            .get_nth_ping(&RankQuery::new(table, origin.clone(), w, 1, Direction::Lowest, SelfPairPolicy::Keep))
            .await
            .unwrap();
        assert_eq!(ranked(first.outcome()).peer, "B", "table {table}");

        let second = engine
            .get_nth_ping(&RankQuery::new(table, origin, w, 2, Direction::Lowest, SelfPairPolicy::Keep))
            .await
            .unwrap();
        let sample = ranked(second.outcome());
        assert_eq!(sample.peer, "A");
        assert_eq!(sample.latency_ms, 50.0);
    }
}

#[tokio::test]
async fn test_empty_window_echoes_bounds() {
    let engine = engine(&[("us-east-1", "A", "2024-05-01T10:00:00Z", 10.0)]);
    let w = window("2024-06-01T00:00:00Z", "2024-06-02T00:00:00Z");

    for rank in [1, 5] {
        let result = engine
            .get_nth_ping(&RankQuery::new(
                R2R,
                FixedSide::Origin("us-east-1".to_string()),
                w,
                rank,
                Direction::Highest,
                SelfPairPolicy::Keep,
            ))
            .await
            .unwrap();
        assert_eq!(
            result.outcome(),
            &RankOutcome::NoData(NoDataRecorded {
                subject: Subject::Side(FixedSide::Origin("us-east-1".to_string())),
                bounds: w.bounds(),
            })
        );
    }
}

#[tokio::test]
async fn test_rank_beyond_distinct_peers() {
    let engine = engine(&[
        ("us-east-1", "A", "2024-05-01T10:00:00Z", 10.0),
        ("us-east-1", "A", "2024-05-01T10:05:00Z", 11.0),
        ("us-east-1", "B", "2024-05-01T10:00:00Z", 20.0),
    ]);
    let result = engine
        .get_nth_ping(&RankQuery::new(
            R2L,
            FixedSide::Origin("us-east-1".to_string()),
            Window::all_time(),
            3,
            Direction::Lowest,
            SelfPairPolicy::Keep,
        ))
        .await
        .unwrap();

    assert_eq!(
        result.outcome(),
        &RankOutcome::InsufficientData {
            requested: 3,
            available: 2,
            direction: Direction::Lowest,
        }
    );
    assert_eq!(result.fetched(), 3);
}

#[tokio::test]
async fn test_latest_returns_exactly_one_sample() {
    // Two days of hourly samples for two peers.
    let stamps: Vec<(String, f64)> = (0u32..48)
        .map(|h| (format!("2024-05-{:02}T{:02}:00:00Z", 1 + h / 24, h % 24), 60.0 + f64::from(h)))
        .collect();
    let mut samples = Vec::new();
    for (ts, latency) in &stamps {
        samples.push(("us-east-1", "eu-west-1", ts.as_str(), *latency));
        samples.push(("us-east-1", "us-west-2", ts.as_str(), 1.0));
    }
    let engine = engine(&samples);

    for (table, path) in [(R2R, IndexPath::SortKeyPrefix), (R2L, IndexPath::PartitionFilteredDescending)] {
        let result = engine
            .get_pings(&PingQuery::latest(table, "us-east-1", "eu-west-1"))
            .await
            .unwrap();
        assert_eq!(result.index_path(), &path);
        assert_eq!(result.fetched(), 1);
        match result.outcome() {
            PingsOutcome::Found { samples } => {
                assert_eq!(samples.len(), 1);
                assert_eq!(samples[0].latency_ms, 107.0);
                assert_eq!(samples[0].timestamp, parse_instant("2024-05-02T23:00:00Z").unwrap());
            }
            other => panic!("expected one sample, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_latest_with_sub_second_sample_in_same_second() {
    let engine = engine(&[
        ("us-east-1", "eu-west-1", "2024-05-01T12:00:00Z", 10.0),
        ("us-east-1", "eu-west-1", "2024-05-01T12:00:00.500Z", 99.0),
        ("us-east-1", "eu-west-1", "2024-05-01T11:59:59.999Z", 5.0),
    ]);

    for table in [R2R, R2L] {
        let result = engine
            .get_pings(&PingQuery::latest(table, "us-east-1", "eu-west-1"))
            .await
            .unwrap();
        match result.outcome() {
            PingsOutcome::Found { samples } => {
                assert_eq!(samples.len(), 1, "table {table}");
                assert_eq!(samples[0].latency_ms, 99.0, "table {table}");
                assert_eq!(samples[0].timestamp, parse_instant("2024-05-01T12:00:00.5Z").unwrap());
            }
            other => panic!("expected one sample, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_latest_for_unknown_pair_is_no_data() {
    let engine = engine(&[("us-east-1", "eu-west-1", "2024-05-01T10:00:00Z", 70.0)]);
    let result = engine
        .get_pings(&PingQuery::latest(R2R, "us-east-1", "Paris"))
        .await
        .unwrap();
    match result.outcome() {
        PingsOutcome::NoData(no_data) => {
            assert_eq!(no_data.bounds, Bounds::Unbounded);
            assert_eq!(no_data.to_string(), "No ping data recorded between us-east-1 and Paris.");
        }
        other => panic!("expected no data, got {other:?}"),
    }
}

#[tokio::test]
async fn test_window_is_reconciled_exactly() {
    // The store range is widened to whole seconds; 12:00:00.500 must still be dropped.
    let engine = engine(&[
        ("us-east-1", "eu-west-1", "2024-05-01T11:59:59Z", 70.0),
        ("us-east-1", "eu-west-1", "2024-05-01T12:00:00.250Z", 71.0),
        ("us-east-1", "eu-west-1", "2024-05-01T12:00:00.500Z", 72.0),
    ]);
    let query = PingQuery::from_args(
        "us-east-1",
        "eu-west-1",
        R2R,
        false,
        Some("2024-05-01T12:00:00Z"),
        Some("2024-05-01T12:00:00.250Z"),
    )
    .unwrap();

    let result = engine.get_pings(&query).await.unwrap();
    match result.outcome() {
        PingsOutcome::Found { samples } => {
            assert_eq!(samples.len(), 1);
            assert_eq!(samples[0].latency_ms, 71.0);
        }
        other => panic!("expected one sample, got {other:?}"),
    }
}

#[tokio::test]
async fn test_offset_bounds_are_converted_to_utc() {
    let engine = engine(&[
        ("us-east-1", "Paris", "2024-05-01T09:30:00Z", 80.0),
        ("us-east-1", "Paris", "2024-05-01T11:30:00Z", 82.0),
    ]);
    // 10:00+02:00 is 08:00Z, 12:00+02:00 is 10:00Z.
    let query = PingQuery::from_args(
        "us-east-1",
        "Paris",
        R2L,
        false,
        Some("2024-05-01T10:00:00+02:00"),
        Some("2024-05-01T12:00:00+02:00"),
    )
    .unwrap();

    let result = engine.get_pings(&query).await.unwrap();
    assert_eq!(result.index_path(), &IndexPath::PartitionRange);
    match result.into_outcome() {
        PingsOutcome::Found { samples } => {
            assert_eq!(samples.iter().map(|s| s.latency_ms).collect::<Vec<_>>(), vec![80.0]);
        }
        other => panic!("expected one sample, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rank_given_destination() {
    let engine = engine(&[
        ("us-east-1", "eu-west-1", "2024-05-01T10:00:00Z", 75.0),
        ("eu-central-1", "eu-west-1", "2024-05-01T10:00:00Z", 12.0),
        ("ap-south-1", "eu-west-1", "2024-05-01T10:00:00Z", 120.0),
        ("ap-south-1", "eu-west-1", "2024-05-01T10:10:00Z", 115.0),
        ("eu-west-1", "eu-west-1", "2024-05-01T10:00:00Z", 0.3),
        ("us-east-1", "Paris", "2024-05-01T10:00:00Z", 1.0),
    ]);
    let peer = FixedSide::Peer("eu-west-1".to_string());

    // Composite table without a peer index scans; the other one uses its index.
    for (table, scan) in [(R2R, true), (R2L, false)] {
        let result = engine
            .get_nth_ping(&RankQuery::new(
                table,
                peer.clone(),
                Window::all_time(),
                1,
                Direction::Highest,
                SelfPairPolicy::Exclude,
            ))
            .await
            .unwrap();
        assert_eq!(result.index_path().is_scan(), scan);
        let sample = ranked(result.outcome());
        assert_eq!(sample.origin, "ap-south-1");
        assert_eq!(sample.latency_ms, 115.0);

        let lowest = engine
            .get_nth_ping(&RankQuery::new(
                table,
                peer.clone(),
                Window::all_time(),
                1,
                Direction::Lowest,
                SelfPairPolicy::Keep,
            ))
            .await
            .unwrap();
        assert_eq!(ranked(lowest.outcome()).origin, "eu-west-1");
    }
}

#[tokio::test]
async fn test_unbounded_origin_rank_needs_opt_in() {
    let engine = engine(&[("us-east-1", "A", "2024-05-01T10:00:00Z", 10.0)]);
    let err = engine
        .get_nth_ping(&RankQuery::new(
            R2R,
            FixedSide::Origin("us-east-1".to_string()),
            Window::unbounded(),
            1,
            Direction::Lowest,
            SelfPairPolicy::Keep,
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PingRankError::Store(StoreQueryError::UnboundedWindow { .. })
    ));
}

#[tokio::test]
async fn test_unbounded_destination_rank_needs_opt_in() {
    let engine = engine(&[("us-east-1", "eu-west-1", "2024-05-01T10:00:00Z", 75.0)]);

    // Refused with or without a peer index; neither path is bounded by time.
    for table in [R2R, R2L] {
        let err = engine
            .get_nth_ping(&RankQuery::new(
                table,
                FixedSide::Peer("eu-west-1".to_string()),
                Window::unbounded(),
                1,
                Direction::Lowest,
                SelfPairPolicy::Keep,
            ))
            .await
            .unwrap_err();
        match err {
            PingRankError::Store(StoreQueryError::UnboundedWindow { subject }) => {
                assert_eq!(subject, "eu-west-1", "table {table}");
            }
            other => panic!("expected UnboundedWindow, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_malformed_latency_fails_whole_query() {
    let store = MemoryStore::from_json(json!({
        "r2l_pings": [
            { "origin": "us-east-1", "destination": "A", "timestamp": "2024-05-01T10:00:00Z", "latency": "10" },
            { "origin": "us-east-1", "destination": "B", "timestamp": "2024-05-01T10:00:00Z", "latency": "timeout" },
        ]
    }))
    .unwrap();
    let engine = PingEngine::new(
        Arc::new(store),
        EngineConfig::new(vec![TableConfig::timestamp_sorted(R2L)]),
    )
    .unwrap();

    let err = engine
        .get_nth_ping(&RankQuery::new(
            R2L,
            FixedSide::Origin("us-east-1".to_string()),
            Window::all_time(),
            1,
            Direction::Lowest,
            SelfPairPolicy::Keep,
        ))
        .await
        .unwrap_err();
    match err {
        PingRankError::MalformedSample(e) => assert!(e.to_string().contains("timeout")),
        other => panic!("expected MalformedSample, got {other:?}"),
    }
}

#[tokio::test]
async fn test_repeated_queries_are_identical() {
    let engine = engine(&[
        ("us-east-1", "A", "2024-05-01T10:00:00Z", 10.0),
        ("us-east-1", "B", "2024-05-01T10:00:00Z", 10.0),
        ("us-east-1", "C", "2024-05-01T10:00:00Z", 10.0),
    ]);
    let query = RankQuery::new(
        R2R,
        FixedSide::Origin("us-east-1".to_string()),
        Window::all_time(),
        2,
        Direction::Lowest,
        SelfPairPolicy::Keep,
    );

    let first = engine.get_nth_ping(&query).await.unwrap();
    for _ in 0..5 {
        assert_eq!(engine.get_nth_ping(&query).await.unwrap(), first);
    }
}

/// A store that never answers in time.
struct SlowStore;

impl TelemetryStore for SlowStore {
    async fn query(&self, _request: &StoreRequest) -> Result<Vec<RawItem>, StoreQueryError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(vec![])
    }
}

/// A store whose backend is down.
struct DownStore;

impl TelemetryStore for DownStore {
    async fn query(&self, request: &StoreRequest) -> Result<Vec<RawItem>, StoreQueryError> {
        Err(StoreQueryError::Unavailable {
            table: request.table.clone(),
            source: "connection refused".into(),
        })
    }
}

#[tokio::test]
async fn test_slow_store_times_out() {
    let mut config = EngineConfig::new(vec![TableConfig::composite(R2R)]);
    config.store_timeout_ms = 20;
    let engine = PingEngine::new(Arc::new(SlowStore), config).unwrap();

    let err = engine
        .get_pings(&PingQuery::latest(R2R, "us-east-1", "eu-west-1"))
        .await
        .unwrap_err();
    match err {
        PingRankError::Store(StoreQueryError::Timeout { table, elapsed }) => {
            assert_eq!(table, R2R);
            assert_eq!(elapsed, Duration::from_millis(20));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unavailable_store_surfaces_cause() {
    let engine = PingEngine::new(
        Arc::new(DownStore),
        EngineConfig::new(vec![TableConfig::composite(R2R)]),
    )
    .unwrap();

    let err = engine
        .get_pings(&PingQuery::latest(R2R, "us-east-1", "eu-west-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, PingRankError::Store(StoreQueryError::Unavailable { .. })));
    assert_eq!(
        err.to_string(),
        "error querying store: table 'r2r_pings' is unavailable: connection refused"
    );
}
