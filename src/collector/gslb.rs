//! Global traffic director (DNS-based load balancing) collector.
//!
//! The service is keyed by application key rather than token. The resource hierarchy
//! is GSLB, then pools per GSLB (members arrive inline with each pool), plus a flat
//! health-check listing. A failed child fetch degrades only that branch.

// crates.io
use async_trait::async_trait;
use serde::Deserialize;
// self
use crate::{
	_prelude::*,
	auth::AuthScheme,
	collector::{Collector, Shared},
	http,
	metric::{MetricFamily, status_value},
};

const SERVICE: &str = "gslb";
const HEALTHY: &str = "ONLINE";

pub(crate) struct GslbCollector {
	shared: Shared,
}
impl GslbCollector {
	pub fn new(shared: Shared) -> Self {
		Self { shared }
	}
}
#[async_trait]
impl Collector for GslbCollector {
	fn name(&self) -> &'static str {
		SERVICE
	}

	fn enabled(&self) -> bool {
		self.shared.config.services.gslb.enabled
	}

	async fn collect(&self) -> Result<Vec<MetricFamily>> {
		let Shared { config, credentials, client } = &self.shared;
		let app_key = credentials.app_key(SERVICE)?;
		let headers = credentials.headers(AuthScheme::AppKey(SERVICE)).await?;
		let base = &config.services.gslb.api_url;
		let list_url = http::join_url(base, &format!("dnsplus/v1.0/appkeys/{app_key}/gslbs"))?;
		let listing = http::get_json::<GslbListing>(client, list_url, &headers).await?;
		let mut gslb_status = MetricFamily::gauge(
			"cloud_gslb_status",
			"GSLB operating status (1=ONLINE, 0=OFFLINE)",
			&["gslb_id", "gslb_name"],
		);
		let mut pool_status = MetricFamily::gauge(
			"cloud_gslb_pool_status",
			"GSLB pool operating status (1=ONLINE, 0=OFFLINE)",
			&["gslb_id", "pool_id", "pool_name"],
		);
		let mut member_status = MetricFamily::gauge(
			"cloud_gslb_pool_member_status",
			"GSLB pool member operating status (1=ONLINE, 0=OFFLINE)",
			&["gslb_id", "pool_id", "member_id", "member_name"],
		);
		let mut health_check_status = MetricFamily::gauge(
			"cloud_gslb_health_check_status",
			"GSLB health check registration (1=registered)",
			&["health_check_id", "health_check_name"],
		);

		for gslb in listing.gslbs {
			gslb_status.push(
				vec![gslb.gslb_id.clone(), gslb.gslb_name.clone()],
				status_value(&gslb.operating_status, HEALTHY),
			);

			let pools_url = http::join_url(
				base,
				&format!("dnsplus/v1.0/appkeys/{app_key}/gslbs/{}/pools", gslb.gslb_id),
			)?;

			match http::get_json::<PoolListing>(client, pools_url, &headers).await {
				Ok(listing) =>
					for pool in listing.pools {
						pool_status.push(
							vec![gslb.gslb_id.clone(), pool.pool_id.clone(), pool.pool_name.clone()],
							status_value(&pool.operating_status, HEALTHY),
						);

						for member in pool.members {
							member_status.push(
								vec![
									gslb.gslb_id.clone(),
									pool.pool_id.clone(),
									member.member_id,
									member.member_name,
								],
								status_value(&member.operating_status, HEALTHY),
							);
						}
					},
				Err(err) => {
					tracing::warn!(gslb = %gslb.gslb_id, ?err, "pool listing failed");
				},
			}
		}

		let health_checks_url =
			http::join_url(base, &format!("dnsplus/v1.0/appkeys/{app_key}/health-checks"))?;

		match http::get_json::<HealthCheckListing>(client, health_checks_url, &headers).await {
			Ok(listing) =>
				for check in listing.health_checks {
					// The listing carries no per-check health; registration itself is the
					// signal.
					health_check_status
						.push(vec![check.health_check_id, check.health_check_name], 1.0);
				},
			Err(err) => {
				tracing::warn!(?err, "health check listing failed");
			},
		}

		Ok(vec![gslb_status, pool_status, member_status, health_check_status])
	}
}

#[derive(Debug, Deserialize)]
struct GslbListing {
	#[serde(default)]
	gslbs: Vec<Gslb>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Gslb {
	#[serde(default)]
	gslb_id: String,
	#[serde(default)]
	gslb_name: String,
	#[serde(default)]
	operating_status: String,
}

#[derive(Debug, Deserialize)]
struct PoolListing {
	#[serde(default)]
	pools: Vec<Pool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pool {
	#[serde(default)]
	pool_id: String,
	#[serde(default)]
	pool_name: String,
	#[serde(default)]
	operating_status: String,
	#[serde(default)]
	members: Vec<PoolMember>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolMember {
	#[serde(default)]
	member_id: String,
	#[serde(default)]
	member_name: String,
	#[serde(default)]
	operating_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthCheckListing {
	#[serde(default)]
	health_checks: Vec<HealthCheck>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthCheck {
	#[serde(default)]
	health_check_id: String,
	#[serde(default)]
	health_check_name: String,
}
