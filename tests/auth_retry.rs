//! Integration tests for token caching, re-authentication, and slot separation.

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use cloud_exporter::{Exporter, ExporterConfig, Result};
use url::Url;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{body_string_contains, header, method, path},
};

const SERVERS_BODY: &str = r#"{
	"servers": [
		{ "id": "srv-1", "name": "web", "status": "ACTIVE", "flavor": { "id": "m1" } }
	]
}"#;

fn config(server: &MockServer) -> ExporterConfig {
	let base = Url::parse(&server.uri()).expect("mock url");
	let mut config = ExporterConfig {
		identity_url: Url::parse(&format!("{}/v2.0", server.uri())).expect("mock url"),
		tenant_id: "tenant-1".into(),
		username: "ops".into(),
		password: "standard-secret".into(),
		..ExporterConfig::default()
	};

	config.services.gslb.enabled = false;
	config.services.loadbalancer.enabled = false;
	config.services.rds.enabled = false;
	config.services.cdn.enabled = false;
	config.services.storage.enabled = false;
	config.services.instance.enabled = false;
	config.services.operations.enabled = false;
	config.services.storage.api_url = base.clone();
	config.services.instance.api_url = base;

	config
}

fn token_body(token: &str) -> String {
	format!(
		r#"{{
			"access": {{
				"token": {{ "id": "{token}", "expires": "2030-01-01T00:00:00Z" }},
				"serviceCatalog": []
			}}
		}}"#
	)
}

#[tokio::test]
async fn rejected_token_is_invalidated_and_retried_exactly_once() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let issued = Arc::new(AtomicUsize::new(0));
	let issue_counter = issued.clone();
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/v2.0/tokens"))
		.respond_with(move |_: &wiremock::Request| {
			let index = issue_counter.fetch_add(1, Ordering::SeqCst);

			ResponseTemplate::new(200)
				.set_body_string(token_body(&format!("tok-{index}")))
				.insert_header("content-type", "application/json")
		})
		.expect(2)
		.mount(&server)
		.await;

	let listings = Arc::new(AtomicUsize::new(0));
	let listing_counter = listings.clone();

	Mock::given(method("GET"))
		.and(path("/v2.0/servers"))
		.respond_with(move |request: &wiremock::Request| {
			match listing_counter.fetch_add(1, Ordering::SeqCst) {
				// The cached token is stale from the upstream's point of view.
				0 => ResponseTemplate::new(401),
				_ => {
					assert_eq!(
						request.headers.get("x-auth-token").map(|value| value.to_str().unwrap()),
						Some("tok-1"),
						"retry must carry the re-issued token"
					);

					ResponseTemplate::new(200)
						.set_body_string(SERVERS_BODY)
						.insert_header("content-type", "application/json")
				},
			}
		})
		.expect(2)
		.mount(&server)
		.await;

	let mut config = config(&server);

	config.services.instance.enabled = true;

	let exporter = Exporter::new(config)?;
	let body = exporter.render().await?;

	assert!(body.contains("cloud_instance_status"));
	assert_eq!(listings.load(Ordering::SeqCst), 2);

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn persistent_rejection_degrades_to_empty_without_retry_storm() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/v2.0/tokens"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(token_body("tok-std"))
				.insert_header("content-type", "application/json"),
		)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/servers"))
		.respond_with(ResponseTemplate::new(401))
		.expect(2)
		.mount(&server)
		.await;

	let mut config = config(&server);

	config.services.instance.enabled = true;

	let exporter = Exporter::new(config)?;
	let body = exporter.render().await?;

	assert!(body.is_empty(), "collector degrades to an empty contribution");

	let status = exporter.status();
	let instance =
		status.iter().find(|status| status.name == "instance").expect("registered collector");

	assert_eq!(instance.failures, 1);

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn storage_collector_authenticates_through_the_restricted_slot() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	// Catalog advertises the object-store endpoint, which takes precedence over the
	// configured base URL.
	let storage_token = format!(
		r#"{{
			"access": {{
				"token": {{ "id": "tok-storage", "expires": "2030-01-01T00:00:00Z" }},
				"serviceCatalog": [
					{{
						"type": "object-store",
						"endpoints": [{{ "publicURL": "{}/v1/AUTH_tenant-1" }}]
					}}
				]
			}}
		}}"#,
		server.uri()
	);

	Mock::given(method("POST"))
		.and(path("/v2.0/tokens"))
		.and(body_string_contains("storage-secret"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(storage_token)
				.insert_header("content-type", "application/json"),
		)
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/v2.0/tokens"))
		.respond_with(ResponseTemplate::new(500))
		.expect(0)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v1/AUTH_tenant-1"))
		.and(header("x-auth-token", "tok-storage"))
		.respond_with(ResponseTemplate::new(200).set_body_string("photos\n"))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("HEAD"))
		.and(path("/v1/AUTH_tenant-1/photos"))
		.and(header("x-auth-token", "tok-storage"))
		.respond_with(
			ResponseTemplate::new(204)
				.insert_header("X-Container-Bytes-Used", "2048")
				.insert_header("X-Container-Object-Count", "3"),
		)
		.expect(1)
		.mount(&server)
		.await;

	let mut config = config(&server);

	config.storage_password = "storage-secret".into();
	config.services.storage.enabled = true;

	let exporter = Exporter::new(config)?;
	let body = exporter.render().await?;

	assert!(body.contains(
		"cloud_storage_container_bytes{container_name=\"photos\",account=\"AUTH_tenant-1\"} 2048"
	));
	assert!(body.contains(
		"cloud_storage_container_object_count{container_name=\"photos\",account=\"AUTH_tenant-1\"} 3"
	));

	server.verify().await;
	Ok(())
}
