//! Crate-level error types shared by the fetcher, cache, and request authorizer.
//!
//! Every error is `Clone` so a single token fetch can hand the very same outcome to all
//! callers that were coalesced onto it; foreign sources are therefore held behind [`Arc`].

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Local configuration problem detected at construction.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Token endpoint answered outside the accepted status range.
	#[error(transparent)]
	Status(#[from] StatusError),
	/// Token endpoint body could not be turned into a token.
	#[error("Token endpoint response could not be parsed: {0}.")]
	Parse(#[from] ParseError),
	/// Cache collaborator failure.
	#[error(transparent)]
	Cache(#[from] CacheError),
}
impl Error {
	/// Returns `true` when retrying the same call later may succeed.
	///
	/// Transport failures, throttling, server-side token endpoint failures, and aborted cache
	/// loads are transient. Configuration, parse, and client-side status failures are terminal.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Config(_) | Self::Parse(_) => false,
			Self::Transport(_) => true,
			Self::Status(e) => e.status == 429 || e.status >= 500,
			Self::Cache(e) => matches!(e, CacheError::LoaderAborted { .. }),
		}
	}
}

/// Configuration and validation failures raised while building a client.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// No token endpoint was configured.
	#[error("Token URL is required.")]
	MissingTokenUrl,
	/// The token endpoint could not be parsed.
	#[error("Token URL `{url}` is invalid: {reason}.")]
	InvalidTokenUrl {
		/// Raw value supplied by the caller.
		url: String,
		/// Parser message.
		reason: String,
	},
	/// No HTTP transport was supplied and no default is compiled in.
	#[error("An HTTP transport is required when the `reqwest` feature is disabled.")]
	MissingTransport,
	/// The built-in reqwest transport could not be constructed.
	#[error("HTTP client could not be constructed: {reason}.")]
	HttpClientBuild {
		/// Builder message.
		reason: String,
	},
	/// Accepted status range is inverted or outside the HTTP status space.
	#[error("Accepted status range {min}..={max} is invalid.")]
	InvalidStatusRange {
		/// Lower bound (inclusive).
		min: u16,
		/// Upper bound (inclusive).
		max: u16,
	},
	/// Soft expire must be `-1` (disabled), `0` (default), or positive.
	#[error("Soft expire of {seconds} seconds is invalid; use -1 to disable it.")]
	InvalidSoftExpire {
		/// Rejected value.
		seconds: i64,
	},
	/// Cache size limit must be positive.
	#[error("Cache `{name}` must have a positive size limit.")]
	ZeroCacheSize {
		/// Cache name.
		name: String,
	},
	/// A credential header name is not a valid HTTP header name.
	#[error("Header name `{name}` is invalid.")]
	InvalidHeaderName {
		/// Rejected header name.
		name: String,
	},
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// The request could not be turned into something the transport can send.
	#[error("Request is invalid for the transport.")]
	Request {
		/// Transport-specific conversion error.
		#[source]
		source: SharedError,
	},
	/// The request did not finish before its deadline.
	#[error("Request timed out.")]
	Timeout,
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}

	/// Wraps a request conversion error.
	pub fn request(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Request { source: Arc::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for TransportError {
	fn from(e: reqwest::Error) -> Self {
		if e.is_timeout() {
			Self::Timeout
		} else if e.is_builder() {
			Self::request(e)
		} else {
			Self::network(e)
		}
	}
}

/// Token endpoint replied with a status outside the accepted range.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Bad token server response http status: status:{status} body:{body}")]
pub struct StatusError {
	/// HTTP status code returned by the token endpoint.
	pub status: u16,
	/// Raw response body, lossily decoded as UTF-8.
	pub body: String,
}

/// Reasons a token endpoint body is rejected.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ParseError {
	/// Body is not a JSON object.
	#[error("invalid json: {reason}")]
	InvalidJson {
		/// Decoder message.
		reason: String,
	},
	/// `access_token` is absent.
	#[error("missing access_token field in token response")]
	MissingAccessToken,
	/// `access_token` is present but not a string.
	#[error("non-string value for access_token field in token response")]
	AccessTokenNotString,
	/// `access_token` is an empty string.
	#[error("empty access_token in token response")]
	EmptyAccessToken,
	/// `expires_in` is neither a number nor a string.
	#[error("unexpected type for expires_in field in token response: {found}")]
	UnexpectedExpiresInType {
		/// JSON type that was found.
		found: &'static str,
	},
	/// `expires_in` is a string that does not hold an integer.
	#[error("cannot convert expires_in string '{value}' to integer")]
	ExpiresInNotInteger {
		/// Offending string.
		value: String,
	},
}

/// Failures raised by a cache collaborator.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CacheError {
	/// The shared load for a key ended without publishing an outcome (panic or runtime
	/// shutdown).
	#[error("Cache load for key `{key}` was aborted before completing.")]
	LoaderAborted {
		/// Key whose load was aborted.
		key: String,
	},
	/// Backend-level failure for an external cache engine.
	#[error("Cache backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
