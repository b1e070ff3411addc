//! OAuth 2.0 client-credentials token cache: one shared bearer token per client identity,
//! single-flight refresh, soft expiry, and self-healing eviction when a resource server rejects
//! a cached token.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod client;
pub mod error;
pub mod fetch;
pub mod http;
pub mod obs;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::Identity,
		http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
		store::CacheSettings,
	};

	/// Transport double that answers every request with a canned response and records the
	/// requests it has seen.
	#[derive(Clone, Debug)]
	pub struct StaticTransport {
		status: u16,
		body: String,
		seen: Arc<Mutex<Vec<HttpRequest>>>,
	}
	impl StaticTransport {
		/// Creates a transport that always replies with `status` and `body`.
		pub fn new(status: u16, body: impl Into<String>) -> Self {
			Self { status, body: body.into(), seen: Default::default() }
		}

		/// Returns the requests observed so far.
		pub fn requests(&self) -> Vec<HttpRequest> {
			self.seen.lock().clone()
		}
	}
	impl HttpTransport for StaticTransport {
		fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
			self.seen.lock().push(request);

			let mut response = HttpResponse::new(self.body.clone().into_bytes());

			*response.status_mut() =
				StatusCode::from_u16(self.status).expect("Test status code should be valid.");

			Box::pin(async move { Ok(response) })
		}
	}

	/// Identity fixture shared by unit tests.
	pub fn test_identity() -> Identity {
		Identity::new("clientID", "clientSecret")
	}

	/// Cache settings with the periodic sweep disabled so tests never leave timers behind.
	pub fn quiet_cache_settings() -> CacheSettings {
		CacheSettings { sweep_interval_secs: None, ..CacheSettings::default() }
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
	pub use parking_lot::Mutex;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use ::http as http_types;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
