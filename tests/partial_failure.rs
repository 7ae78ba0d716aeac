//! Integration tests for failure isolation, ratio edge cases, and the background
//! refresher.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use cloud_exporter::{Exporter, ExporterConfig, Result};
use url::Url;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path, query_param},
};

const TOKEN_BODY: &str = r#"{
	"access": {
		"token": { "id": "tok-std", "expires": "2030-01-01T00:00:00Z" },
		"serviceCatalog": []
	}
}"#;

fn config(server: &MockServer) -> ExporterConfig {
	let base = Url::parse(&server.uri()).expect("mock url");
	let mut config = ExporterConfig {
		identity_url: Url::parse(&format!("{}/v2.0", server.uri())).expect("mock url"),
		tenant_id: "tenant-1".into(),
		username: "ops".into(),
		password: "secret".into(),
		..ExporterConfig::default()
	};

	config.services.gslb.enabled = false;
	config.services.loadbalancer.enabled = false;
	config.services.rds.enabled = false;
	config.services.cdn.enabled = false;
	config.services.storage.enabled = false;
	config.services.instance.enabled = false;
	config.services.operations.enabled = false;
	config.services.loadbalancer.api_url = base.clone();
	config.services.rds.api_url = base.clone();
	config.services.storage.api_url = base.clone();
	config.services.instance.api_url = base;

	config
}

async fn mount_token(server: &MockServer) {
	Mock::given(method("POST"))
		.and(path("/v2.0/tokens"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(TOKEN_BODY)
				.insert_header("content-type", "application/json"),
		)
		.mount(server)
		.await;
}

fn json(body: &str) -> ResponseTemplate {
	ResponseTemplate::new(200)
		.set_body_string(body)
		.insert_header("content-type", "application/json")
}

#[tokio::test]
async fn failed_child_fetch_degrades_only_that_branch() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_token(&server).await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/loadbalancers"))
		.respond_with(json(
			r#"{
				"loadbalancers": [
					{ "id": "lb-1", "name": "edge", "vip_address": "10.0.0.1",
					  "operating_status": "ONLINE", "provisioning_status": "ACTIVE" },
					{ "id": "lb-2", "name": "api", "vip_address": "10.0.0.2",
					  "operating_status": "OFFLINE", "provisioning_status": "ACTIVE" }
				]
			}"#,
		))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/listeners"))
		.and(query_param("loadbalancer_id", "lb-1"))
		.respond_with(ResponseTemplate::new(500))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/listeners"))
		.and(query_param("loadbalancer_id", "lb-2"))
		.respond_with(json(
			r#"{
				"listeners": [
					{ "id": "lsn-1", "name": "https", "protocol": "TERMINATED_HTTPS",
					  "protocol_port": 443, "operating_status": "ONLINE" }
				]
			}"#,
		))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/pools"))
		.respond_with(json(r#"{ "pools": [] }"#))
		.mount(&server)
		.await;

	let mut config = config(&server);

	config.services.loadbalancer.enabled = true;

	let exporter = Exporter::new(config)?;
	let body = exporter.render().await?;

	// Both parents survive; only the failed child branch is missing.
	assert!(body.contains(
		"cloud_lb_operating_status{lb_id=\"lb-1\",lb_name=\"edge\",vip_address=\"10.0.0.1\"} 1"
	));
	assert!(body.contains(
		"cloud_lb_operating_status{lb_id=\"lb-2\",lb_name=\"api\",vip_address=\"10.0.0.2\"} 0"
	));
	assert!(body.contains("listener_id=\"lsn-1\""));
	assert!(!body.contains("lb_id=\"lb-1\",listener_id"));

	Ok(())
}

#[tokio::test]
async fn failing_collector_does_not_poison_the_cycle() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_token(&server).await;
	Mock::given(method("GET"))
		.and(path("/v2.0/servers"))
		.respond_with(ResponseTemplate::new(500))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/loadbalancers"))
		.respond_with(json(
			r#"{
				"loadbalancers": [
					{ "id": "lb-1", "name": "edge", "vip_address": "10.0.0.1",
					  "operating_status": "ONLINE", "provisioning_status": "ACTIVE" }
				]
			}"#,
		))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/listeners"))
		.respond_with(json(r#"{ "listeners": [] }"#))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/pools"))
		.respond_with(json(r#"{ "pools": [] }"#))
		.mount(&server)
		.await;

	let mut config = config(&server);

	config.services.loadbalancer.enabled = true;
	config.services.instance.enabled = true;

	let exporter = Exporter::new(config)?;
	let body = exporter.render().await?;

	assert!(body.contains("cloud_lb_operating_status"));
	assert!(!body.contains("cloud_instance_status"));

	let status = exporter.status();
	let instance =
		status.iter().find(|status| status.name == "instance").expect("registered collector");
	let loadbalancer =
		status.iter().find(|status| status.name == "loadbalancer").expect("registered collector");

	assert_eq!(instance.failures, 1);
	assert_eq!(loadbalancer.failures, 0);
	assert!(loadbalancer.samples > 0);

	Ok(())
}

#[tokio::test]
async fn malformed_upstream_json_degrades_only_that_collector() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_token(&server).await;
	Mock::given(method("GET"))
		.and(path("/v2.0/servers"))
		.respond_with(json(r#"{ "servers": [ { "id": "#))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/loadbalancers"))
		.respond_with(json(
			r#"{
				"loadbalancers": [
					{ "id": "lb-1", "name": "edge", "vip_address": "10.0.0.1",
					  "operating_status": "ONLINE", "provisioning_status": "ACTIVE" }
				]
			}"#,
		))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/listeners"))
		.respond_with(json(r#"{ "listeners": [] }"#))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/pools"))
		.respond_with(json(r#"{ "pools": [] }"#))
		.mount(&server)
		.await;

	let mut config = config(&server);

	config.services.loadbalancer.enabled = true;
	config.services.instance.enabled = true;

	let exporter = Exporter::new(config)?;
	let body = exporter.render().await?;

	assert!(body.contains("cloud_lb_operating_status"));
	assert!(!body.contains("cloud_instance_status"));

	let status = exporter.status();
	let instance =
		status.iter().find(|status| status.name == "instance").expect("registered collector");

	assert_eq!(instance.failures, 1);

	Ok(())
}

#[tokio::test]
async fn upstream_timeout_degrades_only_that_collector() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_token(&server).await;
	Mock::given(method("GET"))
		.and(path("/v2.0/servers"))
		.respond_with(
			json(r#"{ "servers": [] }"#).set_delay(Duration::from_secs(5)),
		)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/loadbalancers"))
		.respond_with(json(
			r#"{
				"loadbalancers": [
					{ "id": "lb-1", "name": "edge", "vip_address": "10.0.0.1",
					  "operating_status": "ONLINE", "provisioning_status": "ACTIVE" }
				]
			}"#,
		))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/listeners"))
		.respond_with(json(r#"{ "listeners": [] }"#))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/pools"))
		.respond_with(json(r#"{ "pools": [] }"#))
		.mount(&server)
		.await;

	let mut config = config(&server);

	config.http_timeout = Duration::from_millis(500);
	config.services.loadbalancer.enabled = true;
	config.services.instance.enabled = true;

	let exporter = Exporter::new(config)?;
	let body = exporter.render().await?;

	assert!(body.contains("cloud_lb_operating_status"));
	assert!(!body.contains("cloud_instance_status"));

	let status = exporter.status();
	let instance =
		status.iter().find(|status| status.name == "instance").expect("registered collector");

	assert_eq!(instance.failures, 1);

	Ok(())
}

#[tokio::test]
async fn pool_with_no_members_emits_no_ratio_sample() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_token(&server).await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/loadbalancers/lb-1"))
		.respond_with(json(r#"{ "loadbalancer": { "name": "edge" } }"#))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/pools"))
		.and(query_param("loadbalancer_id", "lb-1"))
		.respond_with(json(
			r#"{
				"pools": [
					{ "id": "pool-empty", "name": "drained" },
					{ "id": "pool-live", "name": "web" }
				]
			}"#,
		))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/pools/pool-empty/members"))
		.respond_with(json(r#"{ "members": [] }"#))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/v2.0/lbaas/pools/pool-live/members"))
		.respond_with(json(
			r#"{
				"members": [
					{ "monitor_status": "ONLINE" },
					{ "monitor_status": "ERROR" }
				]
			}"#,
		))
		.mount(&server)
		.await;

	let mut config = config(&server);

	config.services.operations.enabled = true;
	config.services.operations.loadbalancer_ids = "lb-1".into();

	let exporter = Exporter::new(config)?;
	let body = exporter.render().await?;

	assert!(!body.contains("pool_id=\"pool-empty\""), "zero denominator must emit no sample");
	assert!(body.contains(
		"cloud_ops_lb_pool_member_health_ratio{lb_id=\"lb-1\",lb_name=\"edge\",pool_id=\"pool-live\",pool_name=\"web\"} 0.5"
	));

	Ok(())
}

#[tokio::test]
async fn designated_instance_reports_query_performance_gauges() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_token(&server).await;
	Mock::given(method("GET"))
		.and(path("/rds/api/v2.0/metric-statistics"))
		.and(query_param("dbInstanceId", "db-1"))
		.respond_with(json(
			r#"{
				"metricStatistics": [
					{ "metricName": "QPS", "value": 120.5 },
					{ "metricName": "SLOW_QUERY_COUNT", "value": 3 },
					{ "metricName": "CURRENT_CONNECTIONS", "value": 42 }
				]
			}"#,
		))
		.expect(1)
		.mount(&server)
		.await;

	let mut config = config(&server);

	config.services.operations.enabled = true;
	config.services.operations.rds_instance_id = "db-1".into();

	let exporter = Exporter::new(config)?;
	let body = exporter.render().await?;

	assert!(body.contains("cloud_ops_rds_qps{instance_id=\"db-1\"} 120.5"));
	assert!(body.contains("cloud_ops_rds_slow_query_count{instance_id=\"db-1\"} 3"));
	assert!(body.contains("cloud_ops_rds_current_connections{instance_id=\"db-1\"} 42"));

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn designated_container_reports_usage_trend() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_token(&server).await;
	Mock::given(method("HEAD"))
		.and(path("/v1/AUTH_tenant-1/assets"))
		.respond_with(
			ResponseTemplate::new(204)
				.insert_header("X-Container-Bytes-Used", "4096")
				.insert_header("X-Container-Object-Count", "7"),
		)
		.expect(1)
		.mount(&server)
		.await;

	let mut config = config(&server);

	config.services.operations.enabled = true;
	config.services.operations.storage_container = "assets".into();

	let exporter = Exporter::new(config)?;
	let body = exporter.render().await?;

	assert!(body.contains("cloud_ops_storage_container_bytes{container_name=\"assets\"} 4096"));
	assert!(
		body.contains("cloud_ops_storage_container_object_count{container_name=\"assets\"} 7")
	);

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn background_refresher_replaces_the_snapshot() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_token(&server).await;

	let listings = Arc::new(AtomicUsize::new(0));
	let counter = listings.clone();

	Mock::given(method("GET"))
		.and(path("/v2.0/servers"))
		.respond_with(move |_: &wiremock::Request| {
			let status = if counter.fetch_add(1, Ordering::SeqCst) == 0 { "ACTIVE" } else { "SHUTOFF" };

			json(&format!(
				r#"{{ "servers": [ {{ "id": "srv-1", "name": "web", "status": "{status}", "flavor": {{ "id": "m1" }} }} ] }}"#
			))
		})
		.mount(&server)
		.await;

	let mut config = config(&server);

	config.services.instance.enabled = true;
	config.collection_interval = Duration::from_secs(1);

	let exporter = Exporter::new(config)?;
	let body = exporter.render().await?;

	assert!(body.contains("status=\"ACTIVE\"} 1"));

	let refresher = exporter.spawn_refresher();

	// The long default TTL keeps the scrape path on the cache; only the refresher
	// can move the snapshot forward.
	tokio::time::sleep(Duration::from_millis(1500)).await;

	let body = exporter.render().await?;

	assert!(body.contains("status=\"SHUTOFF\"} 0"));
	assert!(listings.load(Ordering::SeqCst) >= 2);

	refresher.shutdown().await;
	Ok(())
}
