//! Builder that validates configuration and produces a [`Client`](crate::client::Client).

// std
use std::ops::RangeInclusive;
// self
use crate::{
	_prelude::*,
	auth::{CacheKeyStrategy, CredentialResolver, HeaderCredentials, Identity, Secret},
	cache::{self, TokenCache},
	client::{BadTokenPredicate, Client, ClientConfig},
	error::ConfigError,
	fetch::{DEFAULT_ACCEPTED_STATUS, TokenFetcher},
	http::HttpTransport,
	store::{CacheSettings, KeyedCache, MemoryCache},
};

/// Builder for [`Client`] values.
///
/// Every default is applied here once; the resulting [`ClientConfig`] is read-only.
pub struct ClientBuilder {
	token_url: Option<String>,
	client_id: String,
	client_secret: Secret,
	scope: String,
	transport: Option<Arc<dyn HttpTransport>>,
	accepted_status: RangeInclusive<u16>,
	soft_expire_secs: i64,
	bad_token: BadTokenPredicate,
	cache: CacheSettings,
	headers: HeaderCredentials,
	key_strategy: CacheKeyStrategy,
	store: Option<Arc<dyn KeyedCache>>,
}
impl ClientBuilder {
	/// Creates a builder with every default applied.
	pub fn new() -> Self {
		Self {
			token_url: None,
			client_id: String::new(),
			client_secret: Secret::default(),
			scope: String::new(),
			transport: None,
			accepted_status: DEFAULT_ACCEPTED_STATUS,
			soft_expire_secs: 0,
			bad_token: Arc::new(|status: StatusCode| status == StatusCode::UNAUTHORIZED),
			cache: CacheSettings::default(),
			headers: HeaderCredentials::default(),
			key_strategy: CacheKeyStrategy::default(),
			store: None,
		}
	}

	/// Sets the token endpoint.
	pub fn token_url(mut self, url: impl Into<String>) -> Self {
		self.token_url = Some(url.into());

		self
	}

	/// Sets the static client id and secret.
	pub fn client_credentials(
		mut self,
		client_id: impl Into<String>,
		client_secret: impl Into<Secret>,
	) -> Self {
		self.client_id = client_id.into();
		self.client_secret = client_secret.into();

		self
	}

	/// Sets the scope sent with every exchange.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();

		self
	}

	/// Sets the transport used for both token exchanges and decorated requests.
	pub fn transport<T>(mut self, transport: T) -> Self
	where
		T: HttpTransport,
	{
		self.transport = Some(Arc::new(transport));

		self
	}

	/// Sets the inclusive status range accepted from the token endpoint.
	pub fn accepted_status(mut self, accepted_status: RangeInclusive<u16>) -> Self {
		self.accepted_status = accepted_status;

		self
	}

	/// Sets the soft expire in seconds: `0` keeps the 10 second default and `-1` disables it.
	pub fn soft_expire_secs(mut self, seconds: i64) -> Self {
		self.soft_expire_secs = seconds;

		self
	}

	/// Replaces the status predicate that triggers eviction (default: `401`).
	pub fn bad_token_status<F>(mut self, predicate: F) -> Self
	where
		F: 'static + Send + Sync + Fn(StatusCode) -> bool,
	{
		self.bad_token = Arc::new(predicate);

		self
	}

	/// Sets the built-in cache settings.
	pub fn cache_settings(mut self, cache: CacheSettings) -> Self {
		self.cache = cache;

		self
	}

	/// Sets the header-based credential settings.
	pub fn header_credentials(mut self, headers: HeaderCredentials) -> Self {
		self.headers = headers;

		self
	}

	/// Sets how identities map onto cache keys.
	pub fn key_strategy(mut self, key_strategy: CacheKeyStrategy) -> Self {
		self.key_strategy = key_strategy;

		self
	}

	/// Uses an external cache instead of the built-in [`MemoryCache`].
	pub fn cache(mut self, store: Arc<dyn KeyedCache>) -> Self {
		self.store = Some(store);

		self
	}

	/// Validates the configuration and builds the client.
	pub fn build(self) -> Result<Client, ConfigError> {
		let raw_url =
			self.token_url.filter(|url| !url.is_empty()).ok_or(ConfigError::MissingTokenUrl)?;
		let token_url = Url::parse(&raw_url).map_err(|e| ConfigError::InvalidTokenUrl {
			url: raw_url.clone(),
			reason: e.to_string(),
		})?;
		let (min, max) = (*self.accepted_status.start(), *self.accepted_status.end());

		if min > max || min < 100 || max > 999 {
			return Err(ConfigError::InvalidStatusRange { min, max });
		}

		let soft_expire = cache::soft_expire_from_secs(self.soft_expire_secs)?;
		let transport = match self.transport {
			Some(transport) => transport,
			None => default_transport()?,
		};
		let (store, memory) = match self.store {
			Some(store) => (store, None),
			None => {
				if self.cache.size_limit_bytes == 0 {
					return Err(ConfigError::ZeroCacheSize { name: self.cache.name });
				}

				let memory = MemoryCache::new(self.cache.clone());

				(Arc::new(memory.clone()) as Arc<dyn KeyedCache>, Some(memory))
			},
		};
		let static_identity = Identity::new(self.client_id, self.client_secret);
		let resolver = CredentialResolver::new(static_identity.clone(), self.headers.clone())?;
		let fetcher = TokenFetcher::new(token_url.clone(), Arc::clone(&transport))
			.with_scope(self.scope.clone())
			.with_accepted_status(self.accepted_status.clone());
		let cache = TokenCache::new(store, Arc::new(fetcher))
			.with_soft_expire(soft_expire)
			.with_key_strategy(self.key_strategy);
		let config = ClientConfig {
			token_url,
			static_identity,
			scope: self.scope,
			accepted_status: self.accepted_status,
			soft_expire,
			bad_token: self.bad_token,
			cache: self.cache,
			headers: self.headers,
			key_strategy: self.key_strategy,
		};

		Ok(Client { config: Arc::new(config), resolver, cache, transport, memory })
	}
}
impl Default for ClientBuilder {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for ClientBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientBuilder")
			.field("token_url", &self.token_url)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &!self.client_secret.is_empty())
			.field("scope", &self.scope)
			.field("transport_set", &self.transport.is_some())
			.field("accepted_status", &self.accepted_status)
			.field("soft_expire_secs", &self.soft_expire_secs)
			.field("cache", &self.cache)
			.field("headers", &self.headers)
			.field("key_strategy", &self.key_strategy)
			.field("external_cache", &self.store.is_some())
			.finish()
	}
}

#[cfg(feature = "reqwest")]
fn default_transport() -> Result<Arc<dyn HttpTransport>, ConfigError> {
	let client = reqwest::Client::builder()
		.build()
		.map_err(|e| ConfigError::HttpClientBuild { reason: e.to_string() })?;

	Ok(Arc::new(crate::http::ReqwestTransport::with_client(client)))
}

#[cfg(not(feature = "reqwest"))]
fn default_transport() -> Result<Arc<dyn HttpTransport>, ConfigError> {
	Err(ConfigError::MissingTransport)
}
