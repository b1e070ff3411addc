//! Request authorizer: resolves the identity, attaches a cached bearer token, sends the
//! request, and evicts the token when the resource server rejects it.
//!
//! The rejected call is never retried. Its response is returned as-is, and only the next call
//! for the same identity fetches a fresh token.

pub mod builder;

pub use builder::*;

// std
use std::ops::RangeInclusive;
// self
use crate::{
	_prelude::*,
	auth::{
		CacheKeyStrategy, CredentialResolver, CredentialSource, HeaderCredentials, Identity,
		ResolvedCredentials, Secret,
	},
	cache::TokenCache,
	error::TransportError,
	http::{HttpRequest, HttpResponse, HttpTransport},
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::{CacheSettings, CacheStats, MemoryCache},
};

/// Decides whether a resource server status means the presented token was rejected.
pub type BadTokenPredicate = Arc<dyn Fn(StatusCode) -> bool + Send + Sync>;

/// Immutable configuration snapshot resolved by [`ClientBuilder::build`].
#[derive(Clone)]
pub struct ClientConfig {
	/// Token endpoint.
	pub token_url: Url,
	/// Identity used when header resolution is off or falls back.
	pub static_identity: Identity,
	/// Scope sent with every exchange; empty means omitted.
	pub scope: String,
	/// Inclusive status range accepted from the token endpoint.
	pub accepted_status: RangeInclusive<u16>,
	/// Margin subtracted from every declared token lifetime.
	pub soft_expire: Duration,
	/// Predicate that triggers eviction after a response.
	pub bad_token: BadTokenPredicate,
	/// Settings of the built-in cache (unused with an external cache).
	pub cache: CacheSettings,
	/// Header-based credential settings.
	pub headers: HeaderCredentials,
	/// How identities map onto cache keys.
	pub key_strategy: CacheKeyStrategy,
}
impl Debug for ClientConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientConfig")
			.field("token_url", &self.token_url.as_str())
			.field("static_identity", &self.static_identity)
			.field("scope", &self.scope)
			.field("accepted_status", &self.accepted_status)
			.field("soft_expire", &self.soft_expire)
			.field("cache", &self.cache)
			.field("headers", &self.headers)
			.field("key_strategy", &self.key_strategy)
			.finish_non_exhaustive()
	}
}

/// Result of [`Client::execute_with_output`].
#[derive(Debug)]
pub struct ExecuteOutput {
	/// Client id the call resolved to, reported even when the call failed.
	pub client_id: String,
	/// Where the identity came from.
	pub source: CredentialSource,
	/// Response from the resource server, or the failure that prevented one.
	pub result: Result<HttpResponse>,
}

/// Decorates outbound requests with a shared, cached bearer token.
#[derive(Clone)]
pub struct Client {
	config: Arc<ClientConfig>,
	resolver: CredentialResolver,
	cache: TokenCache,
	transport: Arc<dyn HttpTransport>,
	memory: Option<MemoryCache>,
}
impl Client {
	/// Starts a [`ClientBuilder`] with every default applied.
	pub fn builder() -> ClientBuilder {
		ClientBuilder::new()
	}

	/// Configuration snapshot the client was built with.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Resolver applied to every request.
	pub fn resolver(&self) -> &CredentialResolver {
		&self.resolver
	}

	/// Token cache shared by every call.
	pub fn token_cache(&self) -> &TokenCache {
		&self.cache
	}

	/// Sends `request` with an `Authorization: Bearer` header and returns the response.
	///
	/// A response with a bad-token status is still returned unchanged; the cached token is
	/// evicted so the next call fetches a fresh one.
	pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
		self.execute_with_output(request).await.result
	}

	/// Same as [`Client::execute`] but also reports the resolved client id and its source.
	pub async fn execute_with_output(&self, request: HttpRequest) -> ExecuteOutput {
		const KIND: OpKind = OpKind::Authorize;

		let span = OpSpan::new(KIND, "execute");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let resolved = self.resolver.resolve(request.headers());
		let client_id = resolved.identity.client_id.clone();
		let source = resolved.source;
		let result = span.instrument(self.authorize_and_send(resolved, request)).await;

		obs::record_op_outcome(KIND, OpOutcome::of(&result));

		ExecuteOutput { client_id, source, result }
	}

	/// Runs [`Client::execute`] under a deadline covering both the token wait and the send.
	///
	/// An elapsed deadline yields [`TransportError::Timeout`]. A token fetch shared with other
	/// callers keeps running for them.
	pub async fn execute_within(
		&self,
		request: HttpRequest,
		timeout: std::time::Duration,
	) -> Result<HttpResponse> {
		tokio::time::timeout(timeout, self.execute(request))
			.await
			.map_err(|_| Error::from(TransportError::Timeout))?
	}

	/// Returns the cached access token for `identity`, fetching one on a miss.
	pub async fn token(&self, identity: &Identity) -> Result<Secret> {
		self.cache.get(identity).await
	}

	/// Drops the cached token for `identity`.
	pub async fn evict(&self, identity: &Identity) -> Result<()> {
		self.cache.evict(identity).await
	}

	/// Statistics of the built-in cache; `None` when an external cache was supplied.
	pub fn cache_stats(&self) -> Option<CacheStats> {
		self.memory.as_ref().map(MemoryCache::stats)
	}

	async fn authorize_and_send(
		&self,
		resolved: ResolvedCredentials,
		mut request: HttpRequest,
	) -> Result<HttpResponse> {
		let token = self.cache.get(&resolved.identity).await?;

		if resolved.source.uses_headers() {
			self.resolver.strip(request.headers_mut());

			tracing::debug!(source = resolved.source.as_str(), "Stripped credential headers.");
		}

		let mut bearer = HeaderValue::try_from(format!("Bearer {}", token.expose()))
			.map_err(TransportError::request)?;

		bearer.set_sensitive(true);
		request.headers_mut().insert(::http::header::AUTHORIZATION, bearer);

		let response = self.transport.send(request).await?;
		let status = response.status();

		if (self.config.bad_token)(status) {
			tracing::debug!(
				client_id = %resolved.identity.client_id,
				status = status.as_u16(),
				"Resource server rejected the token; evicting it."
			);

			self.cache.evict_detached(&resolved.identity).await;
		}

		Ok(response)
	}
}
impl Debug for Client {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Client")
			.field("config", &self.config)
			.field("cache_stats", &self.cache_stats())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	fn client(transport: StaticTransport) -> Client {
		Client::builder()
			.token_url("https://auth.example.com/token")
			.client_credentials("clientID", "clientSecret")
			.transport(transport)
			.cache_settings(quiet_cache_settings())
			.build()
			.expect("Client fixture should build.")
	}

	fn get(url: &str) -> HttpRequest {
		::http::Request::get(url).body(Vec::new()).expect("Request fixture should build.")
	}

	#[tokio::test]
	async fn attaches_bearer_and_reuses_token() {
		let transport = StaticTransport::new(200, r#"{"access_token":"abc","expires_in":300}"#);
		let client = client(transport.clone());

		for _ in 0..2 {
			let response =
				client.execute(get("https://api.example.com/")).await.expect("Call succeeds.");

			assert_eq!(response.status(), StatusCode::OK);
		}

		let requests = transport.requests();

		// One token exchange followed by two resource calls.
		assert_eq!(requests.len(), 3);
		assert_eq!(requests[1].headers()[::http::header::AUTHORIZATION], "Bearer abc");
		assert!(requests[1].headers()[::http::header::AUTHORIZATION].is_sensitive());
		assert_eq!(client.cache_stats().map(|stats| stats.loads), Some(1));
	}

	#[derive(Debug)]
	struct SlowTransport;
	impl HttpTransport for SlowTransport {
		fn send(&self, _: HttpRequest) -> crate::http::TransportFuture<'_> {
			Box::pin(async {
				tokio::time::sleep(std::time::Duration::from_secs(5)).await;

				Ok(HttpResponse::new(Vec::new()))
			})
		}
	}

	#[tokio::test]
	async fn execute_within_maps_deadline_to_timeout() {
		let client = Client::builder()
			.token_url("https://auth.example.com/token")
			.client_credentials("clientID", "clientSecret")
			.transport(SlowTransport)
			.cache_settings(quiet_cache_settings())
			.build()
			.expect("Client fixture should build.");
		let err = client
			.execute_within(get("https://api.example.com/"), std::time::Duration::from_millis(50))
			.await
			.expect_err("The token fetch cannot finish in time.");

		assert!(matches!(err, Error::Transport(TransportError::Timeout)));
	}

	#[tokio::test]
	async fn output_reports_client_id_on_failure() {
		let client = client(StaticTransport::new(500, "down"));
		let output = client.execute_with_output(get("https://api.example.com/")).await;

		assert_eq!(output.client_id, "clientID");
		assert_eq!(output.source, CredentialSource::Static);
		assert!(matches!(output.result, Err(Error::Status(ref e)) if e.status == 500));
	}

	#[tokio::test]
	async fn custom_bad_token_predicate_triggers_eviction() {
		let transport = StaticTransport::new(200, r#"{"access_token":"abc"}"#);
		let client = Client::builder()
			.token_url("https://auth.example.com/token")
			.client_credentials("clientID", "clientSecret")
			.transport(transport.clone())
			.bad_token_status(|status| status == StatusCode::OK)
			.cache_settings(quiet_cache_settings())
			.build()
			.expect("Client fixture should build.");

		client.execute(get("https://api.example.com/")).await.expect("First call succeeds.");
		client.execute(get("https://api.example.com/")).await.expect("Second call succeeds.");

		let stats = client.cache_stats().expect("Built-in cache is in use.");

		assert_eq!(stats.loads, 2);
		assert_eq!(stats.removals, 2);
		assert_eq!(transport.requests().len(), 4);
	}

	#[tokio::test]
	async fn header_credentials_are_stripped_before_forwarding() {
		let transport = StaticTransport::new(200, r#"{"access_token":"abc"}"#);
		let client = Client::builder()
			.token_url("https://auth.example.com/token")
			.client_credentials("clientID", "clientSecret")
			.transport(transport.clone())
			.header_credentials(HeaderCredentials { enabled: true, ..Default::default() })
			.cache_settings(quiet_cache_settings())
			.build()
			.expect("Client fixture should build.");
		let request = ::http::Request::get("https://api.example.com/")
			.header("oauth2-client-id", "header-id")
			.header("oauth2-client-secret", "header-secret")
			.body(Vec::new())
			.expect("Request fixture should build.");
		let output = client.execute_with_output(request).await;

		assert_eq!(output.client_id, "header-id");
		assert_eq!(output.source, CredentialSource::Headers);

		let requests = transport.requests();

		assert!(String::from_utf8_lossy(requests[0].body()).contains("client_secret=header-secret"));
		assert_eq!(requests[1].headers()["oauth2-client-id"], "header-id");
		assert!(!requests[1].headers().contains_key("oauth2-client-secret"));
	}

	#[tokio::test]
	async fn token_and_evict_expose_the_cache() {
		let transport = StaticTransport::new(200, r#"{"access_token":"abc"}"#);
		let client = client(transport.clone());
		let identity = test_identity();

		assert_eq!(client.token(&identity).await.expect("Token is fetched.").expose(), "abc");

		client.evict(&identity).await.expect("Eviction succeeds.");
		client.token(&identity).await.expect("Token is refetched.");

		assert_eq!(transport.requests().len(), 2);
	}
}
