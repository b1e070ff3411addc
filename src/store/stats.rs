//! Counters kept by the built-in cache.

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters kept by [`MemoryCache`](crate::store::MemoryCache).
#[derive(Debug, Default)]
pub struct CacheCounters {
	gets: AtomicU64,
	hits: AtomicU64,
	loads: AtomicU64,
	load_errors: AtomicU64,
	coalesced: AtomicU64,
	removals: AtomicU64,
	capacity_evictions: AtomicU64,
	expired_purges: AtomicU64,
}
impl CacheCounters {
	pub(crate) fn record_get(&self) {
		self.gets.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_hit(&self) {
		self.hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_load(&self) {
		self.loads.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_load_error(&self) {
		self.load_errors.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_coalesced(&self) {
		self.coalesced.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_removal(&self) {
		self.removals.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_capacity_evictions(&self, count: u64) {
		self.capacity_evictions.fetch_add(count, Ordering::Relaxed);
	}

	pub(crate) fn record_expired_purges(&self, count: u64) {
		self.expired_purges.fetch_add(count, Ordering::Relaxed);
	}

	pub(crate) fn snapshot(&self, items: u64, bytes: u64) -> CacheStats {
		CacheStats {
			gets: self.gets.load(Ordering::Relaxed),
			hits: self.hits.load(Ordering::Relaxed),
			loads: self.loads.load(Ordering::Relaxed),
			load_errors: self.load_errors.load(Ordering::Relaxed),
			coalesced: self.coalesced.load(Ordering::Relaxed),
			removals: self.removals.load(Ordering::Relaxed),
			capacity_evictions: self.capacity_evictions.load(Ordering::Relaxed),
			expired_purges: self.expired_purges.load(Ordering::Relaxed),
			items,
			bytes,
		}
	}
}

/// Point-in-time view of cache activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
	/// Lookups served, hits and misses alike.
	pub gets: u64,
	/// Lookups answered from a live entry.
	pub hits: u64,
	/// Loader runs started.
	pub loads: u64,
	/// Loader runs that ended in an error.
	pub load_errors: u64,
	/// Lookups that joined a load already in flight.
	pub coalesced: u64,
	/// Explicit removals.
	pub removals: u64,
	/// Live entries dropped to stay under the size limit.
	pub capacity_evictions: u64,
	/// Expired entries dropped by purges and sweeps.
	pub expired_purges: u64,
	/// Entries currently stored.
	pub items: u64,
	/// Bytes currently accounted to stored entries.
	pub bytes: u64,
}
impl CacheStats {
	/// Lookups that needed a load or joined one.
	pub fn misses(&self) -> u64 {
		self.gets.saturating_sub(self.hits)
	}
}
