use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use folio::query::{QueryCache, QueryCacheConfig, QueryError, QueryKey, QueryOptions, QueryStatus};
use serde_json::json;

fn create_cache(gc_idle: Duration) -> QueryCache {
    QueryCache::init(QueryCacheConfig::with_gc_idle(gc_idle)).expect("runtime is running")
}

/// Fetch function that counts calls and answers `value` after `delay`.
fn counted(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
    value: &'static str,
) -> impl Fn() -> futures::future::BoxFuture<'static, Result<String, Infallible>> + Send + Sync + 'static
{
    let calls = Arc::clone(calls);
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(value.to_string())
        })
    }
}

#[tokio::test(start_paused = true)]
async fn structurally_equal_keys_share_one_fetch() {
    let cache = create_cache(Duration::from_secs(300));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut first = cache
        .subscribe(
            json!(["app", "clock"]),
            counted(&calls, Duration::from_millis(50), "clock"),
            QueryOptions::default(),
        )
        .expect("subscribe");
    let mut second = cache
        .subscribe(
            QueryKey::root("app").with("clock"),
            counted(&calls, Duration::from_millis(50), "clock"),
            QueryOptions::default(),
        )
        .expect("subscribe");

    let (a, b) = tokio::join!(first.settled(), second.settled());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.status, QueryStatus::Success);
    assert_eq!(a.data.as_deref(), Some(&"clock".to_string()));
    assert_eq!(a.data, b.data);
    assert_eq!(cache.subscriber_count(first.key()), 2);
}

#[tokio::test(start_paused = true)]
async fn later_fetch_is_not_overwritten_by_an_earlier_one() {
    let cache = create_cache(Duration::from_secs(300));
    let calls = Arc::new(AtomicUsize::new(0));

    let fetch = {
        let calls = Arc::clone(&calls);
        move || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                // First fetch is slow, the forced refetch answers quickly.
                let (delay, value) = if call == 0 {
                    (Duration::from_millis(200), "older")
                } else {
                    (Duration::from_millis(10), "newer")
                };
                tokio::time::sleep(delay).await;
                Ok::<_, Infallible>(value.to_string())
            }
        }
    };

    let mut handle = cache
        .subscribe(json!(["apps"]), fetch, QueryOptions::default())
        .expect("subscribe");
    assert_eq!(cache.refetch(json!(["apps"])).expect("refetch"), 1);

    let settled = handle.settled().await;
    assert_eq!(settled.data.as_deref(), Some(&"newer".to_string()));

    tokio::time::sleep(Duration::from_millis(500)).await;
    let after = handle.state();
    assert_eq!(after.status, QueryStatus::Success);
    assert_eq!(after.data.as_deref(), Some(&"newer".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn prefix_invalidation_leaves_other_families_alone() {
    let cache = create_cache(Duration::from_secs(300));
    let apps_calls = Arc::new(AtomicUsize::new(0));
    let app_calls = Arc::new(AtomicUsize::new(0));
    let project_calls = Arc::new(AtomicUsize::new(0));

    let mut apps = cache
        .subscribe(
            json!(["apps"]),
            counted(&apps_calls, Duration::ZERO, "all"),
            QueryOptions::default(),
        )
        .expect("subscribe");
    let mut one = cache
        .subscribe(
            json!(["apps", "clock"]),
            counted(&app_calls, Duration::ZERO, "clock"),
            QueryOptions::default(),
        )
        .expect("subscribe");
    let mut projects = cache
        .subscribe(
            json!(["projects"]),
            counted(&project_calls, Duration::ZERO, "projects"),
            QueryOptions::default(),
        )
        .expect("subscribe");
    apps.settled().await;
    one.settled().await;
    projects.settled().await;

    assert_eq!(cache.invalidate(json!(["apps"])).expect("invalidate"), 2);
    assert!(apps.state().is_loading());
    assert!(one.state().is_loading());
    assert_eq!(projects.state().status, QueryStatus::Success);

    apps.settled().await;
    one.settled().await;
    assert_eq!(apps_calls.load(Ordering::SeqCst), 2);
    assert_eq!(app_calls.load(Ordering::SeqCst), 2);
    assert_eq!(project_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn unobserved_entry_refetches_on_next_subscription() {
    let cache = create_cache(Duration::from_secs(300));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handle = cache
        .subscribe(
            json!(["blog-posts"]),
            counted(&calls, Duration::ZERO, "posts"),
            QueryOptions::default(),
        )
        .expect("subscribe");
    handle.settled().await;
    drop(handle);

    cache.invalidate(json!(["blog-posts"])).expect("invalidate");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let key = QueryKey::root("blog-posts");
    let stale = cache.peek::<String>(&key).expect("entry kept");
    assert!(stale.is_stale);

    let mut again = cache
        .subscribe(
            json!(["blog-posts"]),
            counted(&calls, Duration::ZERO, "posts"),
            QueryOptions::default(),
        )
        .expect("subscribe");
    again.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn resubscribing_within_idle_window_reuses_data() {
    let cache = create_cache(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::root("projects");

    let mut handle = cache
        .subscribe(
            &key,
            counted(&calls, Duration::ZERO, "projects"),
            QueryOptions::default(),
        )
        .expect("subscribe");
    handle.settled().await;
    cache.unsubscribe(handle);

    tokio::time::sleep(Duration::from_secs(30)).await;
    let again = cache
        .subscribe(
            &key,
            counted(&calls, Duration::ZERO, "projects"),
            QueryOptions::default(),
        )
        .expect("subscribe");
    let state = again.state();
    assert_eq!(state.status, QueryStatus::Success);
    assert_eq!(state.data.as_deref(), Some(&"projects".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The new subscriber cancelled the first eviction timer.
    tokio::time::sleep(Duration::from_secs(45)).await;
    assert!(cache.contains(&key));

    drop(again);
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(!cache.contains(&key));
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_keeps_previous_data_and_is_not_retried() {
    let cache = create_cache(Duration::from_secs(300));
    let calls = Arc::new(AtomicUsize::new(0));

    let fetch = {
        let calls = Arc::clone(&calls);
        move || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Ok("first".to_string())
                } else {
                    Err(std::io::Error::other("backend unavailable"))
                }
            }
        }
    };

    let mut handle = cache
        .subscribe(json!(["site-stats"]), fetch, QueryOptions::default())
        .expect("subscribe");
    handle.settled().await;

    cache.invalidate(json!(["site-stats"])).expect("invalidate");
    let failed = handle.settled().await;
    assert_eq!(failed.status, QueryStatus::Error);
    assert_eq!(failed.data.as_deref(), Some(&"first".to_string()));
    assert_eq!(
        failed.error_as::<std::io::Error>().map(ToString::to_string),
        Some("backend unavailable".to_string())
    );

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn write_during_fetch_is_shown_to_mounted_subscribers() {
    let cache = create_cache(Duration::from_secs(300));
    let calls = Arc::new(AtomicUsize::new(0));
    let rows = Arc::new(AtomicUsize::new(0));

    let fetch = {
        let calls = Arc::clone(&calls);
        let rows = Arc::clone(&rows);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let seen = rows.load(Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, Infallible>(seen)
            }
        }
    };
    let mut handle = cache
        .subscribe(json!(["apps"]), fetch, QueryOptions::default())
        .expect("subscribe");

    tokio::time::sleep(Duration::from_millis(10)).await;
    let inserted: Result<(), QueryError> = cache
        .mutate(
            || {
                rows.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
            &[QueryKey::root("apps")],
        )
        .await;
    inserted.expect("mutation");
    assert!(handle.state().is_loading());

    let settled = handle.settled().await;
    assert_eq!(settled.status, QueryStatus::Success);
    assert_eq!(settled.data.as_deref(), Some(&1));
    assert!(!settled.is_stale);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn invalidation_during_unobserved_fetch_leaves_entry_stale() {
    let cache = create_cache(Duration::from_secs(300));
    let calls = Arc::new(AtomicUsize::new(0));

    let handle = cache
        .subscribe(
            json!(["admin-apps"]),
            counted(&calls, Duration::from_millis(100), "rows"),
            QueryOptions::default(),
        )
        .expect("subscribe");
    let key = handle.key().clone();
    drop(handle);
    cache.invalidate(json!(["admin-apps"])).expect("invalidate");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let entry = cache.peek::<String>(&key).expect("entry kept for the idle window");
    assert_eq!(entry.status, QueryStatus::Success);
    assert!(entry.is_stale);
}

#[tokio::test(start_paused = true)]
async fn mutate_invalidates_only_on_success() {
    let cache = create_cache(Duration::from_secs(300));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handle = cache
        .subscribe(
            json!(["apps"]),
            counted(&calls, Duration::ZERO, "rows"),
            QueryOptions::default(),
        )
        .expect("subscribe");
    handle.settled().await;

    let failed: Result<(), QueryError> = cache
        .mutate(
            || async { Err(QueryError::invalid_key("write rejected")) },
            &[QueryKey::root("apps")],
        )
        .await;
    assert!(failed.is_err());
    assert_eq!(handle.state().status, QueryStatus::Success);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let written: Result<u32, QueryError> = cache
        .mutate(|| async { Ok(7) }, &[QueryKey::root("apps")])
        .await;
    assert_eq!(written.expect("mutation"), 7);
    assert!(handle.state().is_loading());
    handle.settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn malformed_keys_are_rejected() {
    let cache = create_cache(Duration::from_secs(300));
    let noop = || async { Ok::<_, Infallible>(()) };

    for key in [json!([]), json!({"apps": true}), json!("apps")] {
        let err = cache
            .subscribe(key, noop, QueryOptions::default())
            .err()
            .expect("key should be rejected");
        assert!(matches!(err, QueryError::InvalidKey { .. }));
    }
}

#[tokio::test]
async fn dispose_closes_channels_and_rejects_calls() {
    let cache = create_cache(Duration::from_secs(300));
    let mut handle = cache
        .subscribe(
            json!(["apps"]),
            || async { Ok::<_, Infallible>(1_u32) },
            QueryOptions::default(),
        )
        .expect("subscribe");
    handle.settled().await;

    cache.dispose();
    // Notifications sent before disposal are still delivered; then the channel closes.
    while handle.changed().await.is_some() {}
    assert_eq!(handle.state().status, QueryStatus::Idle);
    assert!(matches!(
        cache.invalidate(json!(["apps"])),
        Err(QueryError::Disposed)
    ));
    assert!(matches!(
        cache
            .subscribe(
                json!(["apps"]),
                || async { Ok::<_, Infallible>(1_u32) },
                QueryOptions::default()
            )
            .err(),
        Some(QueryError::Disposed)
    ));
}
