//! Demonstrates sharing one cached client-credentials token across sequential and concurrent
//! requests, using the default reqwest transport against mock token and resource servers.

// std
use std::time::Duration;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use oauth2_token_cache::{client::Client, http_types::Request, store::CacheSettings};

const REQUESTS: usize = 8;

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.delay(Duration::from_millis(100))
				.header("content-type", "application/json")
				.body(r#"{"access_token":"demo-access","token_type":"bearer","expires_in":900}"#);
		})
		.await;
	let resource_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/orders").header("authorization", "Bearer demo-access");
			then.status(200).body("[]");
		})
		.await;
	let client = Client::builder()
		.token_url(server.url("/token"))
		.client_credentials("demo-client", "super-secret")
		.scope("orders.read")
		.cache_settings(CacheSettings { name: "demo".into(), ..Default::default() })
		.build()?;

	for _ in 0..REQUESTS {
		let response = client.execute(Request::get(server.url("/orders")).body(Vec::new())?).await?;

		println!("Sequential call answered {}.", response.status());
	}

	let calls = (0..REQUESTS).map(|_| {
		let client = client.clone();
		let request = Request::get(server.url("/orders")).body(Vec::new());

		tokio::spawn(async move { client.execute(request?).await.map_err(color_eyre::Report::from) })
	});

	for call in calls.collect::<Vec<_>>() {
		let response = call.await??;

		println!("Concurrent call answered {}.", response.status());
	}

	token_mock.assert_calls_async(1).await;
	resource_mock.assert_calls_async(REQUESTS * 2).await;

	println!("Cache stats: {:?}.", client.cache_stats());

	Ok(())
}
