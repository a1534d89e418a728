use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use cachet::cache::{
    CacheAside, CacheConfig, FetchError, FetchRequest, ManualClock, METRIC_ENTRIES,
    METRIC_EVICTED_TOTAL, METRIC_FETCH_FAILED_TOTAL, METRIC_FETCH_TOTAL, METRIC_INVALIDATED_TOTAL,
    METRIC_LOOKUP_MS, METRIC_LOOKUP_TOTAL, METRIC_PURGED_TOTAL, Ttl,
};
use cachet::infra::telemetry;
use metrics::Unit;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serial_test::serial;

fn snapshotter() -> &'static Snapshotter {
    static SNAPSHOTTER: OnceLock<Snapshotter> = OnceLock::new();
    SNAPSHOTTER.get_or_init(|| {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        recorder
            .install()
            .expect("debug metrics recorder should install in this test process");
        telemetry::describe_metrics();
        snapshotter
    })
}

/// Sum of a counter across label sets matching `label`.
fn counter(name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshotter()
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| key.key().name() == name)
        .filter(|(key, _, _, _)| match label {
            Some((label_key, label_value)) => key
                .key()
                .labels()
                .any(|label| label.key() == label_key && label.value() == label_value),
            None => true,
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(count) => count,
            _ => 0,
        })
        .sum()
}

fn request(key: &str, tags: &[&str]) -> FetchRequest {
    FetchRequest::new(key, Ttl::seconds(60), Duration::from_secs(1)).with_tags(tags.iter().copied())
}

async fn populate(cache: &CacheAside, key: &str, tags: &[&str]) {
    cache
        .get_or_fetch(request(key, tags), || async {
            Ok::<_, FetchError>(Bytes::from_static(b"payload"))
        })
        .await
        .expect("populate");
}

#[tokio::test]
#[serial]
async fn lookups_emit_counters_by_served_path() {
    let _ = snapshotter();
    let fallback_before = counter(METRIC_LOOKUP_TOTAL, Some(("served_from", "fallback")));
    let store_before = counter(METRIC_LOOKUP_TOTAL, Some(("served_from", "store")));
    let fetch_before = counter(METRIC_FETCH_TOTAL, None);

    let cache = CacheAside::in_memory(CacheConfig::strict(), Arc::new(ManualClock::at_epoch()));
    populate(&cache, "k", &["a"]).await;
    populate(&cache, "k", &["a"]).await;
    populate(&cache, "k", &["a"]).await;

    assert_eq!(
        counter(METRIC_LOOKUP_TOTAL, Some(("served_from", "fallback"))) - fallback_before,
        1
    );
    assert_eq!(
        counter(METRIC_LOOKUP_TOTAL, Some(("served_from", "store"))) - store_before,
        2
    );
    assert_eq!(counter(METRIC_FETCH_TOTAL, None) - fetch_before, 1);

    let snapshot = snapshotter().snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(key, _, _, _)| key.key().name().to_string())
        .collect();
    assert!(names.contains(METRIC_LOOKUP_MS), "missing metric: {METRIC_LOOKUP_MS}");
    assert!(names.contains(METRIC_ENTRIES), "missing metric: {METRIC_ENTRIES}");

    let lookup_unit = snapshot
        .iter()
        .find(|(key, _, _, _)| key.key().name() == METRIC_LOOKUP_TOTAL)
        .and_then(|(_, unit, _, _)| *unit);
    assert_eq!(lookup_unit, Some(Unit::Count));
}

#[tokio::test(start_paused = true)]
#[serial]
async fn failures_carry_their_reason() {
    let _ = snapshotter();
    let timeout_before = counter(METRIC_FETCH_FAILED_TOTAL, Some(("reason", "timeout")));
    let source_before = counter(METRIC_FETCH_FAILED_TOTAL, Some(("reason", "source")));

    let cache = CacheAside::in_memory(CacheConfig::strict(), Arc::new(ManualClock::at_epoch()));
    cache
        .get_or_fetch(request("slow", &[]), || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, FetchError>(Bytes::new())
        })
        .await
        .expect_err("timeout");
    cache
        .get_or_fetch(request("broken", &[]), || async { Err::<Bytes, _>("502") })
        .await
        .expect_err("source failure");

    assert_eq!(
        counter(METRIC_FETCH_FAILED_TOTAL, Some(("reason", "timeout"))) - timeout_before,
        1
    );
    assert_eq!(
        counter(METRIC_FETCH_FAILED_TOTAL, Some(("reason", "source"))) - source_before,
        1
    );
}

#[tokio::test]
#[serial]
async fn removals_are_counted_by_cause() {
    let _ = snapshotter();
    let tags_before = counter(METRIC_INVALIDATED_TOTAL, Some(("via", "tags")));
    let key_before = counter(METRIC_INVALIDATED_TOTAL, Some(("via", "key")));
    let evicted_before = counter(METRIC_EVICTED_TOTAL, None);
    let purged_before = counter(METRIC_PURGED_TOTAL, None);

    let clock = Arc::new(ManualClock::at_epoch());
    let config = CacheConfig {
        max_entries: 2,
        ..CacheConfig::strict()
    };
    let cache = CacheAside::in_memory(config, clock.clone());
    populate(&cache, "k1", &["a"]).await;
    populate(&cache, "k2", &["a"]).await;
    populate(&cache, "k3", &["b"]).await;

    assert_eq!(cache.invalidate_by_tags(["a"]).expect("invalidate"), 1);
    populate(&cache, "k4", &["c"]).await;
    assert!(cache.invalidate_key("k4").expect("invalidate key"));
    clock.advance(Duration::from_secs(61));
    assert_eq!(cache.purge_expired().expect("purge"), 1);

    assert_eq!(counter(METRIC_EVICTED_TOTAL, None) - evicted_before, 1);
    assert_eq!(
        counter(METRIC_INVALIDATED_TOTAL, Some(("via", "tags"))) - tags_before,
        1
    );
    assert_eq!(
        counter(METRIC_INVALIDATED_TOTAL, Some(("via", "key"))) - key_before,
        1
    );
    assert_eq!(counter(METRIC_PURGED_TOTAL, None) - purged_before, 1);
}
