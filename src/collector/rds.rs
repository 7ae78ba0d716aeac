//! Managed database (MySQL) collector.
//!
//! Prefers the access-keypair header scheme when keys are configured, falling back to
//! the token scheme. The instance listing feeds a status gauge; each instance is then
//! queried for recent metric statistics (CPU, network), and a failed statistics fetch
//! degrades only that instance.

// crates.io
use async_trait::async_trait;
use serde::{Deserialize, de::DeserializeOwned};
use url::Url;
// self
use crate::{
	_prelude::*,
	auth::{AuthScheme, CredentialSlot},
	collector::{Collector, Shared, TokenFetch},
	config::{id_allowed, id_list},
	http,
	metric::{MetricFamily, status_value},
};

const SERVICE: &str = "rds";
const HEALTHY: &str = "available";

pub(crate) struct RdsCollector {
	shared: Shared,
}
impl RdsCollector {
	pub fn new(shared: Shared) -> Self {
		Self { shared }
	}

	async fn fetch_json<T>(&self, url: Url) -> Result<T>
	where
		T: DeserializeOwned,
	{
		if self.shared.credentials.keypair_configured() {
			let headers = self.shared.credentials.headers(AuthScheme::Keypair(SERVICE)).await?;

			http::get_json(&self.shared.client, url, &headers).await
		} else {
			TokenFetch::new(&self.shared, CredentialSlot::Standard).get_json(url).await
		}
	}
}
#[async_trait]
impl Collector for RdsCollector {
	fn name(&self) -> &'static str {
		SERVICE
	}

	fn enabled(&self) -> bool {
		self.shared.config.services.rds.enabled
	}

	async fn collect(&self) -> Result<Vec<MetricFamily>> {
		let settings = &self.shared.config.services.rds;
		let base = &settings.api_url;
		let filter = id_list(&settings.instance_ids);
		let listing = self
			.fetch_json::<InstanceListing>(http::join_url(base, "rds/api/v3.0/db-instances")?)
			.await?;
		let mut status = MetricFamily::gauge(
			"cloud_rds_instance_status",
			"Managed database instance status (1=available, 0=other)",
			&["instance_id", "instance_name", "db_engine", "status"],
		);
		let mut cpu = MetricFamily::gauge(
			"cloud_rds_cpu_usage_percent",
			"Managed database CPU usage percentage",
			&["instance_id", "instance_name"],
		);
		let mut network_recv = MetricFamily::gauge(
			"cloud_rds_network_receive_bytes",
			"Managed database network receive bytes",
			&["instance_id", "instance_name"],
		);
		let mut network_sent = MetricFamily::gauge(
			"cloud_rds_network_send_bytes",
			"Managed database network send bytes",
			&["instance_id", "instance_name"],
		);

		for instance in listing.db_instances {
			if !id_allowed(&filter, &instance.db_instance_id) {
				continue;
			}

			status.push(
				vec![
					instance.db_instance_id.clone(),
					instance.db_instance_name.clone(),
					instance.db_engine,
					instance.db_instance_status.clone(),
				],
				status_value(&instance.db_instance_status, HEALTHY),
			);

			let statistics_url = http::join_url(
				base,
				&format!(
					"rds/api/v2.0/metric-statistics?dbInstanceId={}&metricName=CPU_USAGE,NETWORK_RECV,NETWORK_SENT&period=1m",
					instance.db_instance_id
				),
			)?;

			match self.fetch_json::<StatisticListing>(statistics_url).await {
				Ok(listing) =>
					for statistic in listing.metric_statistics {
						let labels = vec![
							instance.db_instance_id.clone(),
							instance.db_instance_name.clone(),
						];

						match statistic.metric_name.as_str() {
							"CPU_USAGE" => cpu.push(labels, statistic.value),
							"NETWORK_RECV" => network_recv.push(labels, statistic.value),
							"NETWORK_SENT" => network_sent.push(labels, statistic.value),
							_ => {},
						}
					},
				Err(err) => {
					tracing::warn!(
						instance = %instance.db_instance_id,
						?err,
						"metric statistics fetch failed"
					);
				},
			}
		}

		Ok(vec![status, cpu, network_recv, network_sent])
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceListing {
	#[serde(default)]
	db_instances: Vec<DbInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DbInstance {
	#[serde(default)]
	db_instance_id: String,
	#[serde(default)]
	db_instance_name: String,
	#[serde(default)]
	db_engine: String,
	#[serde(default)]
	db_instance_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatisticListing {
	#[serde(default)]
	metric_statistics: Vec<Statistic>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistic {
	#[serde(default)]
	metric_name: String,
	#[serde(default)]
	value: f64,
}
