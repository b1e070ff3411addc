//! In-process [`KeyedCache`] with per-key single-flight loads on top of a [`moka`] cache.
//!
//! A miss spawns the loader on the tokio runtime and publishes its outcome through a watch
//! channel. Callers asking for the same key while the load runs subscribe to that channel
//! instead of starting another load, and dropping any caller (including the one that started
//! the load) leaves the load running for everybody else. Storage, byte-weighted LRU eviction,
//! and per-entry expiry are delegated to moka.

// std
use std::{
	sync::{
		Weak,
		atomic::{AtomicBool, Ordering},
	},
	time::Instant,
};
// crates.io
use moka::{Expiry, notification::RemovalCause, policy::EvictionPolicy, sync::Cache};
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	error::CacheError,
	store::{CacheCounters, CacheFuture, CacheSettings, CacheStats, CachedValue, KeyedCache, Loader},
};

type LoadOutcome = Option<Result<CachedValue>>;

struct InFlight {
	id: u64,
	outcome: watch::Receiver<LoadOutcome>,
}

#[derive(Default)]
struct State {
	in_flight: HashMap<String, InFlight>,
	next_load: u64,
}
impl State {
	fn finish_load(&mut self, key: &str, id: u64) {
		if self.in_flight.get(key).is_some_and(|load| load.id == id) {
			self.in_flight.remove(key);
		}
	}
}

/// Expires each entry at its own [`CachedValue::expires_at`].
struct ExpiresAt;
impl ExpiresAt {
	fn remaining(value: &CachedValue) -> Option<std::time::Duration> {
		value.expires_at.map(|at| {
			std::time::Duration::try_from(at - OffsetDateTime::now_utc())
				.unwrap_or(std::time::Duration::ZERO)
		})
	}
}
impl Expiry<String, CachedValue> for ExpiresAt {
	fn expire_after_create(
		&self,
		_: &String,
		value: &CachedValue,
		_: Instant,
	) -> Option<std::time::Duration> {
		Self::remaining(value)
	}

	fn expire_after_update(
		&self,
		_: &String,
		value: &CachedValue,
		_: Instant,
		_: Option<std::time::Duration>,
	) -> Option<std::time::Duration> {
		Self::remaining(value)
	}
}

fn weigh(key: &str, value: &CachedValue) -> u64 {
	(key.len() + value.value.len()) as u64
}

struct Inner {
	settings: CacheSettings,
	entries: Cache<String, CachedValue>,
	state: Mutex<State>,
	counters: Arc<CacheCounters>,
	sweeper_started: AtomicBool,
}
impl Inner {
	fn store(&self, key: &str, value: CachedValue) {
		let size = weigh(key, &value);
		let limit = self.settings.size_limit_bytes;

		if size > limit {
			self.entries.invalidate(key);

			tracing::debug!(
				cache = %self.settings.name,
				key,
				size,
				limit,
				"Value exceeds the cache size limit; serving it without storing."
			);

			return;
		}

		self.entries.insert(key.to_owned(), value);
	}

	fn remove(&self, key: &str) {
		if self.entries.remove(key).is_some() {
			self.counters.record_removal();
		}
	}

	fn sweep(&self) {
		self.entries.run_pending_tasks();
	}
}

/// Publishes a load's outcome and clears its in-flight marker, even when the load never
/// finishes.
struct LoadGuard {
	inner: Arc<Inner>,
	key: String,
	id: u64,
	finished: bool,
}
impl LoadGuard {
	fn finish(mut self, result: Result<CachedValue>, outcome: watch::Sender<LoadOutcome>) {
		{
			let mut state = self.inner.state.lock();

			match &result {
				Ok(value) => self.inner.store(&self.key, value.clone()),
				Err(e) => {
					self.inner.counters.record_load_error();

					tracing::debug!(cache = %self.inner.settings.name, key = %self.key, error = %e, "Cache load failed.");
				},
			}

			state.finish_load(&self.key, self.id);
		}

		self.finished = true;

		outcome.send_replace(Some(result));
	}
}
impl Drop for LoadGuard {
	fn drop(&mut self) {
		if !self.finished {
			self.inner.state.lock().finish_load(&self.key, self.id);

			tracing::warn!(cache = %self.inner.settings.name, key = %self.key, "Cache load was aborted.");
		}
	}
}

/// Re-arms the sweeper once its task stops, e.g. when the hosting runtime shuts down.
struct SweeperReset(Weak<Inner>);
impl Drop for SweeperReset {
	fn drop(&mut self) {
		if let Some(inner) = self.0.upgrade() {
			inner.sweeper_started.store(false, Ordering::Release);
		}
	}
}

enum Lookup<F> {
	Hit(CachedValue),
	Wait(watch::Receiver<LoadOutcome>),
	Start(watch::Receiver<LoadOutcome>, F),
}

/// Thread-safe in-memory cache engine for a single process.
#[derive(Clone)]
pub struct MemoryCache(Arc<Inner>);
impl MemoryCache {
	/// Creates an empty cache. The sweep task, if enabled, starts on first use.
	pub fn new(settings: CacheSettings) -> Self {
		let counters = Arc::new(CacheCounters::default());
		let listener_counters = Arc::clone(&counters);
		let entries = Cache::builder()
			.name(&settings.name)
			.max_capacity(settings.size_limit_bytes)
			.weigher(|key: &String, value: &CachedValue| {
				u32::try_from(weigh(key, value)).unwrap_or(u32::MAX)
			})
			.expire_after(ExpiresAt)
			.eviction_policy(EvictionPolicy::lru())
			.eviction_listener(move |_, _, cause| match cause {
				RemovalCause::Size => listener_counters.record_capacity_evictions(1),
				RemovalCause::Expired => listener_counters.record_expired_purges(1),
				_ => {},
			})
			.build();

		Self(Arc::new(Inner {
			settings,
			entries,
			state: Default::default(),
			counters,
			sweeper_started: AtomicBool::new(false),
		}))
	}

	/// Settings the cache was built with.
	pub fn settings(&self) -> &CacheSettings {
		&self.0.settings
	}

	/// Snapshot of the cache counters and gauges, taken after pending maintenance ran.
	pub fn stats(&self) -> CacheStats {
		self.0.sweep();

		self.0.counters.snapshot(self.0.entries.entry_count(), self.0.entries.weighted_size())
	}

	/// Number of stored entries once pending maintenance ran.
	pub fn len(&self) -> usize {
		self.0.sweep();

		self.0.entries.entry_count() as usize
	}

	/// Returns `true` if nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Runs pending maintenance now, dropping expired entries and applying size evictions.
	pub fn purge_expired(&self) {
		self.0.sweep();
	}

	fn ensure_sweeper(&self) {
		let Some(period) = self.0.settings.sweep_interval() else { return };

		if self.0.sweeper_started.swap(true, Ordering::AcqRel) {
			return;
		}

		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			self.0.sweeper_started.store(false, Ordering::Release);

			return;
		};
		let inner = Arc::downgrade(&self.0);
		let reset = SweeperReset(inner.clone());

		runtime.spawn(async move {
			let _reset = reset;
			let mut ticker = tokio::time::interval(period);

			// The first tick completes immediately.
			ticker.tick().await;

			loop {
				ticker.tick().await;

				let Some(inner) = inner.upgrade() else { break };

				inner.sweep();

				tracing::debug!(cache = %inner.settings.name, "Swept expired keys.");
			}
		});
	}

	fn lookup(
		&self,
		key: &str,
		loader: Loader,
	) -> Lookup<impl Future<Output = ()> + Send + 'static> {
		let now = OffsetDateTime::now_utc();
		let mut state = self.0.state.lock();

		if let Some(value) = self.0.entries.get(key)
			&& value.is_live_at(now)
		{
			self.0.counters.record_hit();

			return Lookup::Hit(value);
		}
		if let Some(load) = state.in_flight.get(key) {
			self.0.counters.record_coalesced();

			return Lookup::Wait(load.outcome.clone());
		}

		let (sender, receiver) = watch::channel(None);

		state.next_load += 1;

		let id = state.next_load;

		state.in_flight.insert(key.to_owned(), InFlight { id, outcome: receiver.clone() });

		drop(state);

		self.0.counters.record_load();

		let load_guard =
			LoadGuard { inner: Arc::clone(&self.0), key: key.to_owned(), id, finished: false };
		let task = async move {
			let result = loader.await;

			load_guard.finish(result, sender);
		};

		Lookup::Start(receiver, task)
	}
}
impl Default for MemoryCache {
	fn default() -> Self {
		Self::new(CacheSettings::default())
	}
}
impl Debug for MemoryCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryCache")
			.field("settings", &self.0.settings)
			.field("stats", &self.stats())
			.finish()
	}
}
impl KeyedCache for MemoryCache {
	fn get_or_load<'a>(&'a self, key: &'a str, loader: Loader) -> CacheFuture<'a, CachedValue> {
		Box::pin(async move {
			self.ensure_sweeper();
			self.0.counters.record_get();

			let mut outcome = match self.lookup(key, loader) {
				Lookup::Hit(value) => return Ok(value),
				Lookup::Wait(outcome) => outcome,
				Lookup::Start(outcome, task) => {
					match tokio::runtime::Handle::try_current() {
						Ok(runtime) => drop(runtime.spawn(task)),
						// Without a tokio runtime the load runs on the caller's task and shares
						// its fate.
						Err(_) => task.await,
					}

					outcome
				},
			};
			let ready = outcome
				.wait_for(Option::is_some)
				.await
				.ok()
				.and_then(|ready| (*ready).clone());

			ready.unwrap_or_else(|| Err(CacheError::LoaderAborted { key: key.to_owned() }.into()))
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			self.0.remove(key);

			Ok(())
		})
	}

	fn remove_now(&self, key: &str) -> Option<Result<()>> {
		self.0.remove(key);

		Some(Ok(()))
	}
}
