//! Picks the client identity that applies to an outbound request.
//!
//! Resolution is either static (the configured pair) or header-driven, where the caller
//! names the identity per request through two headers. Resolution itself never fails; an
//! unusable pair surfaces later as a token endpoint rejection.

// self
use crate::{_prelude::*, auth::Identity, error::ConfigError};

/// Default header carrying the per-request client id.
pub const DEFAULT_CLIENT_ID_HEADER: &str = "oauth2-client-id";
/// Default header carrying the per-request client secret.
pub const DEFAULT_CLIENT_SECRET_HEADER: &str = "oauth2-client-secret";

/// Header-based credential settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderCredentials {
	/// Reads credentials from request headers when `true`.
	pub enabled: bool,
	/// Header carrying the client id.
	pub client_id_header: String,
	/// Header carrying the client secret.
	pub client_secret_header: String,
	/// Substitutes the static value for an empty or missing header, per field.
	pub fallback_to_static: bool,
	/// Keeps the client id header on the forwarded request.
	pub forward_client_id: bool,
	/// Keeps the client secret header on the forwarded request.
	pub forward_client_secret: bool,
}
impl Default for HeaderCredentials {
	fn default() -> Self {
		Self {
			enabled: false,
			client_id_header: DEFAULT_CLIENT_ID_HEADER.into(),
			client_secret_header: DEFAULT_CLIENT_SECRET_HEADER.into(),
			fallback_to_static: true,
			forward_client_id: true,
			forward_client_secret: false,
		}
	}
}

/// Where a resolved identity came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialSource {
	/// Header resolution is disabled; the static pair was used.
	Static,
	/// Both fields were read from request headers.
	Headers,
	/// Header resolution is enabled but at least one field fell back to the static value.
	Fallback,
}
impl CredentialSource {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Static => "static",
			Self::Headers => "headers",
			Self::Fallback => "fallback",
		}
	}

	/// Returns `true` when header resolution was in effect for the request.
	pub const fn uses_headers(self) -> bool {
		!matches!(self, Self::Static)
	}
}

/// Resolved identity together with the source that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedCredentials {
	/// Identity to authenticate with.
	pub identity: Identity,
	/// How the identity was obtained.
	pub source: CredentialSource,
}

/// Resolves the identity for each request from static configuration and, optionally, headers.
#[derive(Clone, Debug)]
pub struct CredentialResolver {
	static_identity: Identity,
	headers: HeaderCredentials,
	client_id_header: HeaderName,
	client_secret_header: HeaderName,
}
impl CredentialResolver {
	/// Creates a resolver; fails when a configured header name is not a valid HTTP header.
	pub fn new(static_identity: Identity, headers: HeaderCredentials) -> Result<Self, ConfigError> {
		let client_id_header = header_name(&headers.client_id_header)?;
		let client_secret_header = header_name(&headers.client_secret_header)?;

		Ok(Self { static_identity, headers, client_id_header, client_secret_header })
	}

	/// Statically configured identity.
	pub fn static_identity(&self) -> &Identity {
		&self.static_identity
	}

	/// Header-based settings in effect.
	pub fn settings(&self) -> &HeaderCredentials {
		&self.headers
	}

	/// Resolves the identity for a request carrying `request_headers`.
	pub fn resolve(&self, request_headers: &HeaderMap) -> ResolvedCredentials {
		if !self.headers.enabled {
			return ResolvedCredentials {
				identity: self.static_identity.clone(),
				source: CredentialSource::Static,
			};
		}

		let fallback = self.headers.fallback_to_static;
		let mut fell_back = false;
		let mut pick = |name: &HeaderName, static_value: &str| -> String {
			let value = header_value(request_headers, name);

			if value.is_empty() && fallback {
				fell_back = true;

				static_value.to_owned()
			} else {
				value
			}
		};
		let client_id = pick(&self.client_id_header, &self.static_identity.client_id);
		let client_secret =
			pick(&self.client_secret_header, self.static_identity.client_secret.expose());
		let source = if fell_back { CredentialSource::Fallback } else { CredentialSource::Headers };

		ResolvedCredentials { identity: Identity::new(client_id, client_secret), source }
	}

	/// Removes the credential headers the configuration does not forward.
	///
	/// Only applies when header resolution is enabled; statically configured clients never
	/// touch caller headers.
	pub fn strip(&self, request_headers: &mut HeaderMap) {
		if !self.headers.enabled {
			return;
		}
		if !self.headers.forward_client_secret {
			request_headers.remove(&self.client_secret_header);
		}
		if !self.headers.forward_client_id {
			request_headers.remove(&self.client_id_header);
		}
	}
}

fn header_name(name: &str) -> Result<HeaderName, ConfigError> {
	HeaderName::from_bytes(name.as_bytes())
		.map_err(|_| ConfigError::InvalidHeaderName { name: name.to_owned() })
}

fn header_value(headers: &HeaderMap, name: &HeaderName) -> String {
	headers.get(name).and_then(|value| value.to_str().ok()).unwrap_or_default().to_owned()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn resolver(headers: HeaderCredentials) -> CredentialResolver {
		CredentialResolver::new(Identity::new("static-id", "static-secret"), headers)
			.expect("Resolver fixture should build.")
	}

	fn request_headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
		let mut map = HeaderMap::new();

		for &(name, value) in pairs {
			map.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
		}

		map
	}

	#[test]
	fn disabled_resolution_uses_static_pair() {
		let resolved = resolver(HeaderCredentials::default())
			.resolve(&request_headers(&[("oauth2-client-id", "header-id")]));

		assert_eq!(resolved.source, CredentialSource::Static);
		assert_eq!(resolved.identity, Identity::new("static-id", "static-secret"));
	}

	#[test]
	fn headers_take_precedence_when_enabled() {
		let resolver = resolver(HeaderCredentials { enabled: true, ..Default::default() });
		let resolved = resolver.resolve(&request_headers(&[
			("oauth2-client-id", "header-id"),
			("oauth2-client-secret", "header-secret"),
		]));

		assert_eq!(resolved.source, CredentialSource::Headers);
		assert_eq!(resolved.identity, Identity::new("header-id", "header-secret"));
	}

	#[test]
	fn fields_fall_back_independently() {
		let resolver = resolver(HeaderCredentials { enabled: true, ..Default::default() });
		let resolved = resolver.resolve(&request_headers(&[("oauth2-client-id", "header-id")]));

		assert_eq!(resolved.source, CredentialSource::Fallback);
		assert_eq!(resolved.identity, Identity::new("header-id", "static-secret"));

		let resolved = resolver.resolve(&HeaderMap::new());

		assert_eq!(resolved.identity, Identity::new("static-id", "static-secret"));
	}

	#[test]
	fn disabled_fallback_passes_empty_values_through() {
		let resolver = resolver(HeaderCredentials {
			enabled: true,
			fallback_to_static: false,
			..Default::default()
		});
		let resolved = resolver.resolve(&HeaderMap::new());

		assert_eq!(resolved.source, CredentialSource::Headers);
		assert_eq!(resolved.identity, Identity::new("", ""));
	}

	#[test]
	fn custom_header_names_are_honored() {
		let resolver = resolver(HeaderCredentials {
			enabled: true,
			client_id_header: "x-client".into(),
			client_secret_header: "x-secret".into(),
			..Default::default()
		});
		let resolved =
			resolver.resolve(&request_headers(&[("x-client", "custom"), ("x-secret", "pw")]));

		assert_eq!(resolved.identity, Identity::new("custom", "pw"));
	}

	#[test]
	fn strip_follows_forwarding_toggles() {
		let pairs = [("oauth2-client-id", "id"), ("oauth2-client-secret", "secret")];
		let defaults = resolver(HeaderCredentials { enabled: true, ..Default::default() });
		let mut headers = request_headers(&pairs);

		defaults.strip(&mut headers);

		assert!(headers.contains_key("oauth2-client-id"));
		assert!(!headers.contains_key("oauth2-client-secret"));

		let strip_both = resolver(HeaderCredentials {
			enabled: true,
			forward_client_id: false,
			..Default::default()
		});
		let mut headers = request_headers(&pairs);

		strip_both.strip(&mut headers);

		assert!(headers.is_empty());

		let disabled = resolver(HeaderCredentials::default());
		let mut headers = request_headers(&pairs);

		disabled.strip(&mut headers);

		assert_eq!(headers.len(), 2);
	}

	#[test]
	fn invalid_header_name_is_a_config_error() {
		let err = CredentialResolver::new(
			Identity::new("id", "secret"),
			HeaderCredentials { client_id_header: "bad header".into(), ..Default::default() },
		)
		.expect_err("Header names with spaces must be rejected.");

		assert_eq!(err, ConfigError::InvalidHeaderName { name: "bad header".into() });
	}
}
