//! Compute instance collector.

// crates.io
use async_trait::async_trait;
use serde::Deserialize;
// self
use crate::{
	_prelude::*,
	auth::CredentialSlot,
	collector::{Collector, Shared, TokenFetch},
	config::{id_allowed, id_list},
	http,
	metric::{MetricFamily, status_value},
};

const HEALTHY: &str = "ACTIVE";

pub(crate) struct InstanceCollector {
	shared: Shared,
}
impl InstanceCollector {
	pub fn new(shared: Shared) -> Self {
		Self { shared }
	}
}
#[async_trait]
impl Collector for InstanceCollector {
	fn name(&self) -> &'static str {
		"instance"
	}

	fn enabled(&self) -> bool {
		self.shared.config.services.instance.enabled
	}

	async fn collect(&self) -> Result<Vec<MetricFamily>> {
		let settings = &self.shared.config.services.instance;
		let fetch = TokenFetch::new(&self.shared, CredentialSlot::Standard);
		let listing = fetch
			.get_json::<ServerListing>(http::join_url(&settings.api_url, "v2.0/servers")?)
			.await?;
		let filter = id_list(&settings.ids);
		let mut status = MetricFamily::gauge(
			"cloud_instance_status",
			"Compute instance status (1=ACTIVE, 0=other)",
			&["instance_id", "instance_name", "status", "flavor_id"],
		);

		for server in listing.servers {
			if !id_allowed(&filter, &server.id) {
				continue;
			}

			status.push(
				vec![server.id, server.name, server.status.clone(), server.flavor.id],
				status_value(&server.status, HEALTHY),
			);
		}

		Ok(vec![status])
	}
}

#[derive(Debug, Deserialize)]
struct ServerListing {
	#[serde(default)]
	servers: Vec<Server>,
}

#[derive(Debug, Deserialize)]
struct Server {
	#[serde(default)]
	id: String,
	#[serde(default)]
	name: String,
	#[serde(default)]
	status: String,
	#[serde(default)]
	flavor: Flavor,
}

#[derive(Debug, Default, Deserialize)]
struct Flavor {
	#[serde(default)]
	id: String,
}
