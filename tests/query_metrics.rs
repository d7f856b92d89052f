use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use folio::query::{QueryCache, QueryCacheConfig, QueryError, QueryKey, QueryOptions};
use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let cache = QueryCache::init(QueryCacheConfig::with_gc_idle(Duration::from_secs(5)))
        .expect("runtime is running");

    // Fetch, hit and superseded fetch
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = {
        let calls = Arc::clone(&calls);
        move || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(if call == 0 { 50 } else { 5 })).await;
                Ok::<_, Infallible>(call)
            }
        }
    };
    let mut first = cache
        .subscribe(json!(["apps"]), fetch.clone(), QueryOptions::default())
        .expect("subscribe");
    cache.refetch(json!(["apps"])).expect("refetch");
    first.settled().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = cache
        .subscribe(json!(["apps"]), fetch, QueryOptions::default())
        .expect("subscribe");

    // Failed fetch
    let mut failing = cache
        .subscribe(
            json!(["site-stats"]),
            || async { Err::<u32, _>(std::io::Error::other("backend unavailable")) },
            QueryOptions::default(),
        )
        .expect("subscribe");
    failing.settled().await;

    // Mutations, both outcomes, and the invalidation they trigger
    let ok: Result<(), QueryError> = cache
        .mutate(|| async { Ok(()) }, &[QueryKey::root("apps")])
        .await;
    assert!(ok.is_ok());
    let failed: Result<(), QueryError> = cache
        .mutate(
            || async { Err(QueryError::invalid_key("rejected")) },
            &[QueryKey::root("apps")],
        )
        .await;
    assert!(failed.is_err());

    // Eviction after the idle window
    drop(first);
    drop(second);
    drop(failing);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(cache.is_empty());

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "folio_query_fetch_total",
        "folio_query_fetch_failed_total",
        "folio_query_fetch_discarded_total",
        "folio_query_fetch_ms",
        "folio_query_hit_total",
        "folio_query_invalidated_total",
        "folio_query_evict_total",
        "folio_query_entries",
        "folio_mutation_total",
        "folio_mutation_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
