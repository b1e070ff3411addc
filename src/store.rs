//! Keyed cache contract consumed by the token cache, plus the built-in in-memory engine.
//!
//! A [`KeyedCache`] owns storage, expiry enforcement, and per-key single-flight loading. The
//! token cache only hands it a key and a loader; the loader future carries whatever context
//! (such as the client secret) the fetch needs, so nothing but the key and the loaded value
//! is ever stored.

pub mod memory;
pub mod stats;

pub use memory::MemoryCache;
pub use stats::*;

// self
use crate::{_prelude::*, auth::Secret};

/// Default cache name.
pub const DEFAULT_CACHE_NAME: &str = "oauth2";
/// Default cache size limit in bytes.
pub const DEFAULT_CACHE_SIZE_BYTES: u64 = 10_000_000;
/// Default interval between sweeps of expired keys.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30 * 60;

/// Boxed future returned by [`KeyedCache`] operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;
/// Loader invoked on a miss. It must own its context because it may outlive the caller.
pub type Loader = Pin<Box<dyn Future<Output = Result<CachedValue>> + 'static + Send>>;

/// Storage contract with per-key single-flight loading.
pub trait KeyedCache
where
	Self: Send + Sync,
{
	/// Returns the live value for `key`, running `loader` on a miss.
	///
	/// Concurrent calls for one key collapse into a single load whose outcome (value or error)
	/// every caller observes. Implementations must let an in-flight load finish even when the
	/// caller that started it is cancelled. `loader` is dropped unpolled on a hit or when a load
	/// is already in flight.
	fn get_or_load<'a>(&'a self, key: &'a str, loader: Loader) -> CacheFuture<'a, CachedValue>;

	/// Removes `key` regardless of its expiry state. Removing an absent key succeeds.
	fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;

	/// Removes `key` without suspending when the backend can.
	///
	/// Returns `None` when removal needs I/O; callers then fall back to [`KeyedCache::remove`].
	fn remove_now(&self, key: &str) -> Option<Result<()>> {
		let _ = key;

		None
	}
}

/// Value stored for a key together with its absolute expiry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedValue {
	/// Cached access token.
	pub value: Secret,
	/// Instant from which the entry counts as expired; `None` never expires by time.
	pub expires_at: Option<OffsetDateTime>,
}
impl CachedValue {
	/// Returns `true` if the entry is still usable at `now`.
	pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_none_or(|expires_at| now < expires_at)
	}
}

/// Sizing and expiry behavior of the built-in [`MemoryCache`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
	/// Name used in logs and metrics.
	pub name: String,
	/// Upper bound for the summed key and value bytes.
	pub size_limit_bytes: u64,
	/// Period of the background sweep for expired keys; `None` disables it.
	pub sweep_interval_secs: Option<u64>,
}
impl CacheSettings {
	/// Sweep period as a [`std::time::Duration`].
	pub fn sweep_interval(&self) -> Option<std::time::Duration> {
		self.sweep_interval_secs.filter(|secs| *secs > 0).map(std::time::Duration::from_secs)
	}
}
impl Default for CacheSettings {
	fn default() -> Self {
		Self {
			name: DEFAULT_CACHE_NAME.into(),
			size_limit_bytes: DEFAULT_CACHE_SIZE_BYTES,
			sweep_interval_secs: Some(DEFAULT_SWEEP_INTERVAL_SECS),
		}
	}
}
