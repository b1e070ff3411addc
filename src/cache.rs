//! Per-identity token cache built on a [`KeyedCache`] collaborator.
//!
//! The cache owns the key space (see [`CacheKeyStrategy`]), the fetch-on-miss loader, and the
//! expiry computation. Storage, expiry enforcement, and single-flight coalescing belong to the
//! collaborator.

// self
use crate::{
	_prelude::*,
	auth::{CacheKeyStrategy, Identity, Secret},
	error::ConfigError,
	fetch::TokenFetcher,
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::{CachedValue, KeyedCache, Loader},
};

/// Soft expire applied when the configured value is `0`.
pub const DEFAULT_SOFT_EXPIRE: Duration = Duration::seconds(10);
/// Configured soft-expire value that disables the safety margin.
pub const NO_SOFT_EXPIRE: i64 = -1;

/// Shares one access token per identity across every caller in the process.
#[derive(Clone)]
pub struct TokenCache {
	store: Arc<dyn KeyedCache>,
	fetcher: Arc<TokenFetcher>,
	soft_expire: Duration,
	key_strategy: CacheKeyStrategy,
}
impl TokenCache {
	/// Creates a cache with the default soft expire and key strategy.
	pub fn new(store: Arc<dyn KeyedCache>, fetcher: Arc<TokenFetcher>) -> Self {
		Self {
			store,
			fetcher,
			soft_expire: DEFAULT_SOFT_EXPIRE,
			key_strategy: CacheKeyStrategy::default(),
		}
	}

	/// Sets the margin subtracted from each declared token lifetime.
	pub fn with_soft_expire(mut self, soft_expire: Duration) -> Self {
		self.soft_expire = soft_expire;

		self
	}

	/// Sets how identities map onto cache keys.
	pub fn with_key_strategy(mut self, key_strategy: CacheKeyStrategy) -> Self {
		self.key_strategy = key_strategy;

		self
	}

	/// Margin subtracted from each declared token lifetime.
	pub fn soft_expire(&self) -> Duration {
		self.soft_expire
	}

	/// Key strategy in effect.
	pub fn key_strategy(&self) -> CacheKeyStrategy {
		self.key_strategy
	}

	/// Cache key used for `identity`.
	pub fn key_for(&self, identity: &Identity) -> String {
		self.key_strategy.key_for(identity)
	}

	/// Returns the cached access token for `identity`, fetching one on a miss.
	///
	/// Concurrent calls for the same key share one fetch and observe the same outcome. Fetch
	/// errors are returned unchanged and never cached.
	pub async fn get(&self, identity: &Identity) -> Result<Secret> {
		let key = self.key_for(identity);
		let cached = self.store.get_or_load(&key, self.loader(identity)).await?;

		Ok(cached.value)
	}

	/// Removes the cached token for `identity` regardless of its expiry state.
	pub async fn evict(&self, identity: &Identity) -> Result<()> {
		const KIND: OpKind = OpKind::Evict;

		let key = self.key_for(identity);
		let span = OpSpan::new(KIND, "evict");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.store.remove(&key)).await;

		obs::record_op_outcome(KIND, OpOutcome::of(&result));

		result
	}

	/// Evicts the token for `identity` without holding up the caller.
	///
	/// Backends that can remove synchronously do so before this returns, so the next `get`
	/// refetches. Otherwise the removal runs on a spawned task. Failures are logged and never
	/// returned.
	pub async fn evict_detached(&self, identity: &Identity) {
		let key = self.key_for(identity);

		if let Some(result) = self.store.remove_now(&key) {
			obs::record_op_outcome(OpKind::Evict, OpOutcome::Attempt);
			obs::record_op_outcome(OpKind::Evict, OpOutcome::of(&result));
			log_eviction_failure(&identity.client_id, result);

			return;
		}

		match tokio::runtime::Handle::try_current() {
			Ok(runtime) => {
				let cache = self.clone();
				let identity = identity.clone();

				drop(runtime.spawn(async move {
					let result = cache.evict(&identity).await;

					log_eviction_failure(&identity.client_id, result);
				}));
			},
			// Without a tokio runtime there is nothing to hand the removal to.
			Err(_) => log_eviction_failure(&identity.client_id, self.evict(identity).await),
		}
	}

	fn loader(&self, identity: &Identity) -> Loader {
		let fetcher = Arc::clone(&self.fetcher);
		let identity = identity.clone();
		let soft_expire = self.soft_expire;

		Box::pin(async move {
			let token = fetcher.fetch(&identity).await?;
			let expires_at = token.renew_at(OffsetDateTime::now_utc(), soft_expire);

			tracing::debug!(
				client_id = %identity.client_id,
				ttl_secs = token.time_to_live.whole_seconds(),
				?expires_at,
				"Cached a fresh access token."
			);

			Ok(CachedValue { value: token.access_token, expires_at })
		})
	}
}
impl Debug for TokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCache")
			.field("fetcher", &self.fetcher)
			.field("soft_expire", &self.soft_expire)
			.field("key_strategy", &self.key_strategy)
			.finish_non_exhaustive()
	}
}

fn log_eviction_failure(client_id: &str, result: Result<()>) {
	if let Err(e) = result {
		tracing::warn!(client_id, error = %e, "Failed to evict a rejected token.");
	}
}

/// Resolves a configured soft-expire value in seconds.
///
/// `0` selects [`DEFAULT_SOFT_EXPIRE`], [`NO_SOFT_EXPIRE`] disables the margin, and anything
/// below it is rejected.
pub fn soft_expire_from_secs(seconds: i64) -> Result<Duration, ConfigError> {
	match seconds {
		0 => Ok(DEFAULT_SOFT_EXPIRE),
		NO_SOFT_EXPIRE => Ok(Duration::ZERO),
		s if s > 0 => Ok(Duration::seconds(s)),
		s => Err(ConfigError::InvalidSoftExpire { seconds: s }),
	}
}
