//! Content delivery collector.
//!
//! Keyed by application key. A 404 from the service listing means the account simply
//! does not use the service and yields an empty contribution rather than an error.

// crates.io
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
// self
use crate::{
	_prelude::*,
	auth::AuthScheme,
	collector::{Collector, Shared},
	config::{id_allowed, id_list},
	http,
	metric::{MetricFamily, status_value},
};

const SERVICE: &str = "cdn";
const HEALTHY: &str = "ACTIVE";

pub(crate) struct CdnCollector {
	shared: Shared,
}
impl CdnCollector {
	pub fn new(shared: Shared) -> Self {
		Self { shared }
	}
}
#[async_trait]
impl Collector for CdnCollector {
	fn name(&self) -> &'static str {
		SERVICE
	}

	fn enabled(&self) -> bool {
		self.shared.config.services.cdn.enabled
	}

	async fn collect(&self) -> Result<Vec<MetricFamily>> {
		let Shared { config, credentials, client } = &self.shared;
		let settings = &config.services.cdn;
		let app_key = credentials.app_key(SERVICE)?;
		let headers = credentials.headers(AuthScheme::AppKey(SERVICE)).await?;
		let url = http::join_url(&settings.api_url, &format!("v2.0/appKeys/{app_key}/services"))?;
		let listing = match http::get_json::<ServiceListing>(client, url, &headers).await {
			Ok(listing) => listing,
			Err(Error::HttpStatus { status, .. }) if status == StatusCode::NOT_FOUND => {
				tracing::warn!("service listing returned 404; normal when the CDN is unused");

				return Ok(Vec::new());
			},
			Err(err) => return Err(err),
		};
		let filter = id_list(&settings.service_ids);
		let mut status = MetricFamily::gauge(
			"cloud_cdn_service_status",
			"CDN service status (1=ACTIVE, 0=other)",
			&["service_id", "service_name", "domain"],
		);

		for service in listing.services {
			if !id_allowed(&filter, &service.service_id) {
				continue;
			}

			status.push(
				vec![service.service_id, service.service_name, service.domain],
				status_value(&service.status, HEALTHY),
			);
		}

		Ok(vec![status])
	}
}

#[derive(Debug, Deserialize)]
struct ServiceListing {
	#[serde(default)]
	services: Vec<Service>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Service {
	#[serde(default)]
	service_id: String,
	#[serde(default)]
	service_name: String,
	#[serde(default)]
	domain: String,
	#[serde(default)]
	status: String,
}
