//! Client identities and the cache keys derived from them.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::Secret};

/// The `(client_id, client_secret)` pair used against the token endpoint.
///
/// Only the client id takes part in the default cache key; the secret rides along as loader
/// context and is read solely when a cache miss triggers a fetch.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Client secret sent in the token request body.
	pub client_secret: Secret,
}
impl Identity {
	/// Creates an identity from an id/secret pair.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<Secret>) -> Self {
		Self { client_id: client_id.into(), client_secret: client_secret.into() }
	}
}
impl Debug for Identity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Identity")
			.field("client_id", &self.client_id)
			.field("client_secret_set", &!self.client_secret.is_empty())
			.finish()
	}
}

/// Controls how an [`Identity`] maps onto a cache key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKeyStrategy {
	/// Key by client id alone. Two identities sharing an id but holding different secrets share
	/// one cache slot, and whichever secret fetched first wins until the slot is evicted.
	#[default]
	ClientId,
	/// Key by client id plus a SHA-256 digest of the secret so distinct credential pairs never
	/// collide.
	ClientIdAndSecretDigest,
}
impl CacheKeyStrategy {
	/// Derives the cache key for `identity`.
	pub fn key_for(self, identity: &Identity) -> String {
		match self {
			Self::ClientId => identity.client_id.clone(),
			Self::ClientIdAndSecretDigest => {
				let mut hasher = Sha256::new();

				hasher.update(identity.client_secret.expose().as_bytes());

				let digest = STANDARD_NO_PAD.encode(hasher.finalize());

				format!("{}#{digest}", identity.client_id)
			},
		}
	}
}
