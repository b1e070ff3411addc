//! Client-credentials exchange against the token endpoint.

// std
use std::{ops::RangeInclusive, time::Instant};
// self
use crate::{
	_prelude::*,
	auth::{Identity, Token, parse_token},
	error::StatusError,
	http::{self, HttpTransport},
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Inclusive status range accepted from the token endpoint by default.
pub const DEFAULT_ACCEPTED_STATUS: RangeInclusive<u16> = 200..=299;

/// Performs the form-encoded `client_credentials` POST and parses the reply.
#[derive(Clone)]
pub struct TokenFetcher {
	token_url: Url,
	scope: String,
	accepted_status: RangeInclusive<u16>,
	transport: Arc<dyn HttpTransport>,
}
impl TokenFetcher {
	/// Creates a fetcher that posts to `token_url` through `transport`.
	pub fn new(token_url: Url, transport: Arc<dyn HttpTransport>) -> Self {
		Self { token_url, scope: String::new(), accepted_status: DEFAULT_ACCEPTED_STATUS, transport }
	}

	/// Sets the scope sent with every exchange; an empty scope is omitted from the body.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();

		self
	}

	/// Overrides the inclusive status range treated as a successful exchange.
	pub fn with_accepted_status(mut self, accepted_status: RangeInclusive<u16>) -> Self {
		self.accepted_status = accepted_status;

		self
	}

	/// Token endpoint in use.
	pub fn token_url(&self) -> &Url {
		&self.token_url
	}

	/// Scope sent with every exchange.
	pub fn scope(&self) -> &str {
		&self.scope
	}

	/// Inclusive status range accepted from the token endpoint.
	pub fn accepted_status(&self) -> &RangeInclusive<u16> {
		&self.accepted_status
	}

	/// Exchanges `identity` for a fresh token.
	///
	/// Transport failures, statuses outside the accepted range, and unparsable bodies surface
	/// as [`Error::Transport`], [`Error::Status`], and [`Error::Parse`] respectively.
	pub async fn fetch(&self, identity: &Identity) -> Result<Token> {
		const KIND: OpKind = OpKind::TokenFetch;

		let span = OpSpan::new(KIND, "fetch");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.exchange(identity)).await;

		obs::record_op_outcome(KIND, OpOutcome::of(&result));

		result
	}

	async fn exchange(&self, identity: &Identity) -> Result<Token> {
		let mut form = vec![
			("grant_type", "client_credentials"),
			("client_id", identity.client_id.as_str()),
			("client_secret", identity.client_secret.expose()),
		];

		if !self.scope.is_empty() {
			form.push(("scope", self.scope.as_str()));
		}

		let request = http::form_post(&self.token_url, &form)?;
		let started = Instant::now();
		let response = self.transport.send(request).await;
		let elapsed_ms = started.elapsed().as_millis() as u64;
		let response = match response {
			Ok(response) => response,
			Err(e) => {
				tracing::debug!(client_id = %identity.client_id, elapsed_ms, error = %e, "Token request failed.");

				return Err(e.into());
			},
		};
		let status = response.status().as_u16();

		tracing::debug!(client_id = %identity.client_id, elapsed_ms, status, "Token request finished.");

		if !self.accepted_status.contains(&status) {
			let body = String::from_utf8_lossy(response.body()).into_owned();

			return Err(StatusError { status, body }.into());
		}

		Ok(parse_token(response.body())?)
	}
}
impl Debug for TokenFetcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenFetcher")
			.field("token_url", &self.token_url.as_str())
			.field("scope", &self.scope)
			.field("accepted_status", &self.accepted_status)
			.finish_non_exhaustive()
	}
}
