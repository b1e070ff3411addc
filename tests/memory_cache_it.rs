// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use time::{Duration, OffsetDateTime};
// self
use oauth2_token_cache::{
	auth::Secret,
	error::{CacheError, Error, StatusError},
	store::{CacheSettings, CachedValue, KeyedCache, Loader, MemoryCache},
};

fn quiet_cache() -> MemoryCache {
	MemoryCache::new(CacheSettings { sweep_interval_secs: None, ..Default::default() })
}

fn counting_loader(
	calls: &Arc<AtomicUsize>,
	value: &'static str,
	delay: StdDuration,
	expires_at: Option<OffsetDateTime>,
) -> Loader {
	let calls = Arc::clone(calls);

	Box::pin(async move {
		calls.fetch_add(1, Ordering::SeqCst);
		tokio::time::sleep(delay).await;

		Ok(CachedValue { value: Secret::new(value), expires_at })
	})
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_gets_for_one_key_share_a_single_load() {
	let cache = quiet_cache();
	let calls = Arc::new(AtomicUsize::new(0));
	let handles = (0..32)
		.map(|_| {
			let cache = cache.clone();
			let loader = counting_loader(&calls, "shared", StdDuration::from_millis(200), None);

			tokio::spawn(async move { cache.get_or_load("client", loader).await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let value = handle
			.await
			.expect("Waiter task should not panic.")
			.expect("Every waiter should observe the shared value.");

		assert_eq!(value.value.expose(), "shared");
	}

	assert_eq!(calls.load(Ordering::SeqCst), 1);

	let stats = cache.stats();

	assert_eq!(stats.loads, 1);
	assert_eq!(stats.gets, 32);
	assert_eq!(stats.hits + stats.coalesced, 31);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_keys_load_in_parallel() {
	let cache = quiet_cache();
	let calls = Arc::new(AtomicUsize::new(0));
	let started = std::time::Instant::now();
	let (a, b) = tokio::join!(
		cache.get_or_load("a", counting_loader(&calls, "a", StdDuration::from_millis(300), None)),
		cache.get_or_load("b", counting_loader(&calls, "b", StdDuration::from_millis(300), None)),
	);

	assert_eq!(a.expect("Key a should load.").value.expose(), "a");
	assert_eq!(b.expect("Key b should load.").value.expose(), "b");
	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert!(started.elapsed() < StdDuration::from_millis(550), "Loads must not serialize.");
}

#[tokio::test]
async fn failed_loads_are_shared_but_not_cached() {
	let cache = quiet_cache();
	let calls = Arc::new(AtomicUsize::new(0));
	let failing = |calls: &Arc<AtomicUsize>| -> Loader {
		let calls = Arc::clone(calls);

		Box::pin(async move {
			calls.fetch_add(1, Ordering::SeqCst);
			tokio::time::sleep(StdDuration::from_millis(100)).await;

			Err(StatusError { status: 503, body: "busy".into() }.into())
		})
	};
	let (first, second) = tokio::join!(
		cache.get_or_load("client", failing(&calls)),
		cache.get_or_load("client", failing(&calls)),
	);

	for result in [first, second] {
		assert!(matches!(result, Err(Error::Status(ref e)) if e.status == 503));
	}

	assert_eq!(calls.load(Ordering::SeqCst), 1, "Concurrent failures collapse into one load.");

	let third = cache.get_or_load("client", failing(&calls)).await;

	assert!(third.is_err());
	assert_eq!(calls.load(Ordering::SeqCst), 2, "A later call retries the load.");
}

#[tokio::test]
async fn cancelled_waiter_does_not_cancel_the_shared_load() {
	let cache = quiet_cache();
	let calls = Arc::new(AtomicUsize::new(0));
	let impatient = tokio::time::timeout(
		StdDuration::from_millis(50),
		cache.get_or_load("client", counting_loader(&calls, "v", StdDuration::from_millis(300), None)),
	);
	let patient =
		cache.get_or_load("client", counting_loader(&calls, "other", StdDuration::ZERO, None));
	let (impatient, patient) = tokio::join!(impatient, patient);

	assert!(impatient.is_err(), "The impatient caller observes its own timeout.");
	assert_eq!(patient.expect("The patient caller receives the value.").value.expose(), "v");
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn load_started_by_a_dropped_caller_still_populates_the_cache() {
	let cache = quiet_cache();
	let calls = Arc::new(AtomicUsize::new(0));
	let abandoned = tokio::time::timeout(
		StdDuration::from_millis(20),
		cache.get_or_load("client", counting_loader(&calls, "v", StdDuration::from_millis(100), None)),
	)
	.await;

	assert!(abandoned.is_err());

	tokio::time::sleep(StdDuration::from_millis(200)).await;

	let value = cache
		.get_or_load("client", counting_loader(&calls, "unused", StdDuration::ZERO, None))
		.await
		.expect("The finished load should be cached.");

	assert_eq!(value.value.expose(), "v");
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn remove_during_a_load_keeps_the_cache_consistent() {
	let cache = quiet_cache();
	let calls = Arc::new(AtomicUsize::new(0));
	let load =
		cache.get_or_load("client", counting_loader(&calls, "v", StdDuration::from_millis(100), None));
	let remove = async {
		tokio::time::sleep(StdDuration::from_millis(20)).await;
		cache.remove("client").await
	};
	let (value, removed) = tokio::join!(load, remove);

	assert_eq!(value.expect("The in-flight load completes.").value.expose(), "v");
	removed.expect("Removal during a load succeeds.");
	assert_eq!(cache.len(), 1, "The load populated the cache after the removal.");

	cache.remove("client").await.expect("A later removal succeeds.");

	assert!(cache.is_empty());
}

#[tokio::test]
async fn panicking_loader_reports_an_aborted_load() {
	let cache = quiet_cache();
	let err = cache
		.get_or_load("client", Box::pin(async { panic!("fetch exploded") }))
		.await
		.expect_err("The waiter must not hang.");

	assert!(matches!(err, Error::Cache(CacheError::LoaderAborted { ref key }) if key == "client"));
	assert!(err.is_transient());
}

#[tokio::test]
async fn expired_entries_give_way_before_live_ones() {
	// Each entry accounts a 2 byte key plus a 4 byte value.
	let cache = MemoryCache::new(CacheSettings {
		size_limit_bytes: 12,
		sweep_interval_secs: None,
		..Default::default()
	});
	let calls = Arc::new(AtomicUsize::new(0));
	let past = Some(OffsetDateTime::now_utc() - Duration::seconds(1));

	cache
		.get_or_load("k1", counting_loader(&calls, "dead", StdDuration::ZERO, past))
		.await
		.expect("Expired entry loads.");
	cache
		.get_or_load("k2", counting_loader(&calls, "live", StdDuration::ZERO, None))
		.await
		.expect("Live entry loads.");
	cache
		.get_or_load("k3", counting_loader(&calls, "next", StdDuration::ZERO, None))
		.await
		.expect("Third entry loads.");

	let stats = cache.stats();

	assert_eq!(stats.items, 2);
	assert_eq!(stats.bytes, 12);
	assert_eq!(stats.expired_purges + stats.capacity_evictions, 1);

	for key in ["k2", "k3"] {
		cache
			.get_or_load(key, counting_loader(&calls, "miss", StdDuration::ZERO, None))
			.await
			.expect("Live entries survive.");
	}

	assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn background_sweep_drops_expired_keys() {
	let cache = MemoryCache::new(CacheSettings { sweep_interval_secs: Some(1), ..Default::default() });
	let calls = Arc::new(AtomicUsize::new(0));
	let soon = Some(OffsetDateTime::now_utc() + Duration::milliseconds(200));

	cache
		.get_or_load("client", counting_loader(&calls, "v", StdDuration::ZERO, soon))
		.await
		.expect("Entry loads.");

	assert_eq!(cache.len(), 1);

	tokio::time::sleep(StdDuration::from_millis(1_300)).await;

	assert!(cache.is_empty(), "The sweep removed the expired key.");
	assert_eq!(cache.stats().expired_purges, 1);
}
