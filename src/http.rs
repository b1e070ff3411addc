//! Transport primitives shared by the token fetcher and the request authorizer.
//!
//! The crate depends on an HTTP stack only through [`HttpTransport`]. Requests and responses
//! are plain [`http`](::http) values with fully buffered bodies so the same transport serves
//! both the form-encoded token exchange and the decorated outbound call.

// self
use crate::{_prelude::*, error::TransportError};

/// Outbound request with a buffered body.
pub type HttpRequest = ::http::Request<Vec<u8>>;
/// Response with a buffered body.
pub type HttpResponse = ::http::Response<Vec<u8>>;
/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Pluggable sender used for both token fetches and decorated requests.
///
/// Implementations must be `Send + Sync + 'static` so a single transport can be shared by
/// the client and by token loads running on background tasks. Any response that arrives,
/// whatever its status, is returned as `Ok`; only failures to obtain a response are errors.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and buffers the response body.
	fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}
impl<T> HttpTransport for Arc<T>
where
	T: ?Sized + HttpTransport,
{
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		(**self).send(request)
	}
}

/// Thin wrapper around [`reqwest::Client`] so shared HTTP behavior lives in one place.
///
/// Configure timeouts, proxies, and TLS on the wrapped client; the transport only converts
/// between [`http`](::http) values and reqwest's request/response types.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub reqwest::Client);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest client.
	pub fn with_client(client: reqwest::Client) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<reqwest::Client> for ReqwestTransport {
	fn as_ref(&self) -> &reqwest::Client {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let request = reqwest::Request::try_from(request).map_err(TransportError::from)?;
			let response = self.0.execute(request).await?;
			let status = response.status();
			let version = response.version();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?.to_vec();
			let mut buffered = HttpResponse::new(body);

			*buffered.status_mut() = status;
			*buffered.version_mut() = version;
			*buffered.headers_mut() = headers;

			Ok(buffered)
		})
	}
}

/// Builds the form-encoded POST used for the client-credentials exchange.
pub(crate) fn form_post(
	url: &Url,
	fields: &[(&str, &str)],
) -> Result<HttpRequest, TransportError> {
	let body = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(fields).finish();

	::http::Request::post(url.as_str())
		.header(::http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
		.body(body.into_bytes())
		.map_err(TransportError::request)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn form_post_encodes_fields() {
		let url = Url::parse("https://auth.example.com/oauth/token").expect("Fixture URL parses.");
		let request = form_post(
			&url,
			&[("grant_type", "client_credentials"), ("client_id", "a b"), ("client_secret", "s&t")],
		)
		.expect("Form request should build.");

		assert_eq!(request.method(), ::http::Method::POST);
		assert_eq!(request.uri(), "https://auth.example.com/oauth/token");
		assert_eq!(
			request.headers()[::http::header::CONTENT_TYPE],
			"application/x-www-form-urlencoded"
		);
		assert_eq!(
			String::from_utf8_lossy(request.body()),
			"grant_type=client_credentials&client_id=a+b&client_secret=s%26t"
		);
	}

	#[cfg(feature = "reqwest")]
	#[tokio::test]
	async fn reqwest_transport_reports_unreachable_hosts() {
		let transport = ReqwestTransport::default();
		let request = ::http::Request::get("http://127.0.0.1:1/unreachable")
			.body(Vec::new())
			.expect("Request fixture should build.");
		let err = transport.send(request).await.expect_err("Port 1 should refuse connections.");

		assert!(matches!(err, TransportError::Network { .. } | TransportError::Timeout));
	}
}
