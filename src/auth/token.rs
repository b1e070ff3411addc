//! Token model and the token endpoint body parser.

// crates.io
use serde_json::{Map, Value};
// self
use crate::{_prelude::*, auth::Secret, error::ParseError};

/// Access token issued by a successful client-credentials exchange.
///
/// Tokens are immutable; a later fetch for the same identity supersedes rather than mutates
/// them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
	/// Opaque bearer value.
	pub access_token: Secret,
	/// Lifetime declared by the endpoint; [`Duration::ZERO`] when `expires_in` was absent.
	pub time_to_live: Duration,
}
impl Token {
	/// Lifetime declared by the token endpoint, if any.
	pub fn declared_lifetime(&self) -> Option<Duration> {
		if self.time_to_live.is_zero() { None } else { Some(self.time_to_live) }
	}

	/// Absolute instant after which the token should be renewed.
	///
	/// `soft_expire` is subtracted from the declared lifetime so renewal happens slightly before
	/// the server's hard expiry. Tokens without a declared lifetime never expire by time.
	pub fn renew_at(&self, issued_at: OffsetDateTime, soft_expire: Duration) -> Option<OffsetDateTime> {
		let remaining = self.declared_lifetime()?.saturating_sub(soft_expire);

		// Already expired; never let a huge negative lifetime overflow into "no expiry".
		if remaining.is_negative() {
			return Some(issued_at);
		}

		issued_at.checked_add(remaining)
	}
}

/// `expires_in` as it appears on the wire.
#[derive(Clone, Debug, PartialEq)]
enum ExpiresIn {
	Seconds(f64),
	Text(String),
}
impl ExpiresIn {
	fn decode(value: &Value) -> Result<Self, ParseError> {
		match value {
			Value::Number(number) => number
				.as_f64()
				.map(Self::Seconds)
				.ok_or(ParseError::UnexpectedExpiresInType { found: "number" }),
			Value::String(text) => Ok(Self::Text(text.clone())),
			other => Err(ParseError::UnexpectedExpiresInType { found: json_type(other) }),
		}
	}

	fn into_duration(self) -> Result<Duration, ParseError> {
		match self {
			// `as` saturates, and truncation toward zero matches second granularity.
			Self::Seconds(seconds) => Ok(Duration::seconds(seconds as i64)),
			Self::Text(text) => text
				.parse::<i64>()
				.map(Duration::seconds)
				.map_err(|_| ParseError::ExpiresInNotInteger { value: text }),
		}
	}
}

/// Decodes a token endpoint response body.
pub fn parse_token(body: &[u8]) -> Result<Token, ParseError> {
	let object = serde_json::from_slice::<Map<String, Value>>(body)
		.map_err(|e| ParseError::InvalidJson { reason: e.to_string() })?;
	let access_token = match object.get("access_token") {
		None => return Err(ParseError::MissingAccessToken),
		Some(Value::String(value)) if value.is_empty() => return Err(ParseError::EmptyAccessToken),
		Some(Value::String(value)) => Secret::new(value.clone()),
		Some(_) => return Err(ParseError::AccessTokenNotString),
	};
	let time_to_live = match object.get("expires_in") {
		Some(raw) => ExpiresIn::decode(raw)?.into_duration()?,
		None => Duration::ZERO,
	};

	Ok(Token { access_token, time_to_live })
}

fn json_type(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "bool",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}
