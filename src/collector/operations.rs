//! Derived operations collector.
//!
//! Computes service-health indicators on top of the raw listings: healthy-member
//! fractions per load balancer pool, member failure rates per traffic-director pool,
//! CDN cache-hit efficiency, query-performance gauges for a designated database
//! instance, and the usage trend of a designated storage container. Each part is
//! gated on its own configured identifier and failure-isolated from the others, so a
//! broken upstream only silences the indicators derived from it. A group with zero
//! children emits no ratio sample.

// crates.io
use async_trait::async_trait;
use chrono::{SecondsFormat, TimeDelta};
use reqwest::StatusCode;
use serde::Deserialize;
// self
use crate::{
	_prelude::*,
	auth::{AuthScheme, CredentialSlot},
	collector::{Collector, Shared, TokenFetch, storage},
	config::id_list,
	http,
	metric::MetricFamily,
};

const HEALTHY: &str = "ONLINE";

pub(crate) struct OperationsCollector {
	shared: Shared,
}
impl OperationsCollector {
	pub fn new(shared: Shared) -> Self {
		Self { shared }
	}

	/// Healthy-member fraction per pool, for the explicitly listed load balancers.
	async fn loadbalancer_ratios(&self) -> Result<MetricFamily> {
		let base = &self.shared.config.services.loadbalancer.api_url;
		let fetch = TokenFetch::new(&self.shared, CredentialSlot::Standard);
		let mut health_ratio = MetricFamily::gauge(
			"cloud_ops_lb_pool_member_health_ratio",
			"Fraction of load balancer pool members reporting healthy (1=all healthy)",
			&["lb_id", "lb_name", "pool_id", "pool_name"],
		);

		for lb_id in id_list(&self.shared.config.services.operations.loadbalancer_ids) {
			let detail_url =
				http::join_url(base, &format!("v2.0/lbaas/loadbalancers/{lb_id}"))?;
			let lb_name = match fetch.get_json::<LoadBalancerDetail>(detail_url).await {
				Ok(detail) => detail.loadbalancer.name,
				Err(err) => {
					tracing::warn!(lb = %lb_id, ?err, "load balancer lookup failed");

					continue;
				},
			};
			let pools_url =
				http::join_url(base, &format!("v2.0/lbaas/pools?loadbalancer_id={lb_id}"))?;
			let pools = match fetch.get_json::<PoolListing>(pools_url).await {
				Ok(listing) => listing.pools,
				Err(err) => {
					tracing::warn!(lb = %lb_id, ?err, "pool listing failed");

					continue;
				},
			};

			for pool in pools {
				let members_url =
					http::join_url(base, &format!("v2.0/lbaas/pools/{}/members", pool.id))?;
				let members = match fetch.get_json::<MemberListing>(members_url).await {
					Ok(listing) => listing.members,
					Err(err) => {
						tracing::warn!(pool = %pool.id, ?err, "member listing failed");

						continue;
					},
				};

				if members.is_empty() {
					continue;
				}

				let healthy =
					members.iter().filter(|member| member.monitor_status == HEALTHY).count();

				health_ratio.push(
					vec![lb_id.clone(), lb_name.clone(), pool.id, pool.name],
					healthy as f64 / members.len() as f64,
				);
			}
		}

		Ok(health_ratio)
	}

	/// Member failure rate per traffic-director pool (0 means all healthy).
	async fn gslb_ratios(&self) -> Result<MetricFamily> {
		let Shared { config, credentials, client } = &self.shared;
		let app_key = credentials.app_key("gslb")?;
		let headers = credentials.headers(AuthScheme::AppKey("gslb")).await?;
		let base = &config.services.gslb.api_url;
		let gslbs_url =
			http::join_url(base, &format!("dnsplus/v1.0/appkeys/{app_key}/gslbs"))?;
		let listing = http::get_json::<GslbListing>(client, gslbs_url, &headers).await?;
		let mut failure_rate = MetricFamily::gauge(
			"cloud_ops_gslb_pool_member_failure_rate",
			"Fraction of traffic-director pool members failing health checks (0=all healthy)",
			&["gslb_id", "gslb_name", "pool_id", "pool_name"],
		);

		for gslb in listing.gslbs {
			let pools_url = http::join_url(
				base,
				&format!("dnsplus/v1.0/appkeys/{app_key}/gslbs/{}/pools", gslb.gslb_id),
			)?;
			let pools = match http::get_json::<GslbPoolListing>(client, pools_url, &headers).await
			{
				Ok(listing) => listing.pools,
				Err(err) => {
					tracing::warn!(gslb = %gslb.gslb_id, ?err, "pool listing failed");

					continue;
				},
			};

			for pool in pools {
				if pool.members.is_empty() {
					continue;
				}

				let unhealthy =
					pool.members.iter().filter(|member| member.operating_status != HEALTHY).count();

				failure_rate.push(
					vec![
						gslb.gslb_id.clone(),
						gslb.gslb_name.clone(),
						pool.pool_id,
						pool.pool_name,
					],
					unhealthy as f64 / pool.members.len() as f64,
				);
			}
		}

		Ok(failure_rate)
	}

	/// CDN cache efficiency for the service identified by the configured application
	/// key: hit fraction, bandwidth, and hit/miss request counters.
	async fn cdn_ratios(&self) -> Result<Vec<MetricFamily>> {
		let Shared { config, credentials, client } = &self.shared;
		let target_key = &config.services.operations.cdn_app_key;
		let app_key = credentials.app_key("cdn")?;
		let headers = credentials.headers(AuthScheme::AppKey("cdn")).await?;
		let base = &config.services.cdn.api_url;
		let services_url =
			http::join_url(base, &format!("v2.0/appKeys/{app_key}/services"))?;
		let listing = match http::get_json::<ServiceListing>(client, services_url, &headers).await
		{
			Ok(listing) => listing,
			Err(Error::HttpStatus { status, .. }) if status == StatusCode::NOT_FOUND => {
				tracing::warn!("service listing returned 404; normal when the CDN is unused");

				return Ok(Vec::new());
			},
			Err(err) => return Err(err),
		};
		let Some(service) =
			listing.services.into_iter().find(|service| &service.app_key == target_key)
		else {
			tracing::warn!(app_key = %target_key, "no CDN service matches the configured key");

			return Ok(Vec::new());
		};
		let service_id =
			if service.service_id.is_empty() { target_key.clone() } else { service.service_id };
		let service_name =
			if service.service_name.is_empty() { service_id.clone() } else { service.service_name };
		let end = Utc::now();
		let start = end - TimeDelta::hours(1);
		let statistics_url = http::join_url(
			base,
			&format!(
				"v2.0/appKeys/{app_key}/services/{service_id}/statistics?startTime={}&endTime={}&interval=1h",
				start.to_rfc3339_opts(SecondsFormat::Secs, true),
				end.to_rfc3339_opts(SecondsFormat::Secs, true),
			),
		)?;
		let listing =
			match http::get_json::<StatisticListing>(client, statistics_url, &headers).await {
				Ok(listing) => listing,
				Err(Error::HttpStatus { status, .. }) if status == StatusCode::NOT_FOUND => {
					tracing::debug!("statistics endpoint unavailable for this service");

					return Ok(Vec::new());
				},
				Err(err) => return Err(err),
			};
		let mut hit_ratio = MetricFamily::gauge(
			"cloud_ops_cdn_cache_hit_ratio",
			"CDN cache hit fraction over the last hour (0-1)",
			&["service_id", "service_name"],
		);
		let mut bandwidth = MetricFamily::gauge(
			"cloud_ops_cdn_bandwidth_bytes",
			"CDN bandwidth over the last hour in bytes",
			&["service_id", "service_name", "direction"],
		);
		let mut requests = MetricFamily::counter(
			"cloud_ops_cdn_requests_total",
			"CDN requests by cache outcome",
			&["service_id", "service_name", "status"],
		);

		for window in listing.statistics {
			let total = window.cache_hits + window.cache_misses;

			if total > 0. {
				hit_ratio.push(
					vec![service_id.clone(), service_name.clone()],
					window.cache_hits / total,
				);
			}

			bandwidth.push(
				vec![service_id.clone(), service_name.clone(), "in".into()],
				window.bandwidth_in,
			);
			bandwidth.push(
				vec![service_id.clone(), service_name.clone(), "out".into()],
				window.bandwidth_out,
			);
			requests.push(
				vec![service_id.clone(), service_name.clone(), "hit".into()],
				window.cache_hits,
			);
			requests.push(
				vec![service_id.clone(), service_name.clone(), "miss".into()],
				window.cache_misses,
			);
		}

		Ok(vec![hit_ratio, bandwidth, requests])
	}

	/// Query-performance gauges for the designated database instance: queries per
	/// second, slow-query count, and current connections.
	async fn rds_query_performance(&self) -> Result<Vec<MetricFamily>> {
		let Shared { config, credentials, client } = &self.shared;
		let instance_id = config.services.operations.rds_instance_id.trim();
		let url = http::join_url(
			&config.services.rds.api_url,
			&format!(
				"rds/api/v2.0/metric-statistics?dbInstanceId={instance_id}&metricName=QPS,SLOW_QUERY_COUNT,CURRENT_CONNECTIONS&period=1m"
			),
		)?;
		let listing: RdsStatisticListing = if credentials.keypair_configured() {
			let headers = credentials.headers(AuthScheme::Keypair("rds")).await?;

			http::get_json(client, url, &headers).await?
		} else {
			TokenFetch::new(&self.shared, CredentialSlot::Standard).get_json(url).await?
		};
		let mut qps = MetricFamily::gauge(
			"cloud_ops_rds_qps",
			"Designated database queries per second",
			&["instance_id"],
		);
		let mut slow_queries = MetricFamily::gauge(
			"cloud_ops_rds_slow_query_count",
			"Designated database slow query count",
			&["instance_id"],
		);
		let mut connections = MetricFamily::gauge(
			"cloud_ops_rds_current_connections",
			"Designated database current connections",
			&["instance_id"],
		);

		for statistic in listing.metric_statistics {
			let labels = vec![instance_id.to_owned()];

			match statistic.metric_name.as_str() {
				"QPS" => qps.push(labels, statistic.value),
				"SLOW_QUERY_COUNT" => slow_queries.push(labels, statistic.value),
				"CURRENT_CONNECTIONS" => connections.push(labels, statistic.value),
				_ => {},
			}
		}

		Ok(vec![qps, slow_queries, connections])
	}

	/// Usage trend for the designated storage container, independent of the account
	/// wide storage collector and its allow-list.
	async fn storage_trend(&self) -> Result<Vec<MetricFamily>> {
		let container = self.shared.config.services.operations.storage_container.trim();
		let slot = self.shared.credentials.storage_slot();
		let account_url = storage::account_url(&self.shared).await?;
		let container_url = http::join_url(&account_url, container)?;
		let headers = match TokenFetch::new(&self.shared, slot).head(container_url).await {
			Ok(headers) => headers,
			Err(Error::HttpStatus { status, .. })
				if status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND =>
			{
				tracing::warn!(
					container,
					%status,
					"designated container unavailable; check the storage password and name"
				);

				return Ok(Vec::new());
			},
			Err(err) => return Err(err),
		};
		let mut bytes_used = MetricFamily::gauge(
			"cloud_ops_storage_container_bytes",
			"Designated storage container usage in bytes",
			&["container_name"],
		);
		let mut object_count = MetricFamily::gauge(
			"cloud_ops_storage_container_object_count",
			"Designated storage container object count",
			&["container_name"],
		);

		bytes_used.push(
			vec![container.to_owned()],
			storage::header_number(&headers, "X-Container-Bytes-Used"),
		);
		object_count.push(
			vec![container.to_owned()],
			storage::header_number(&headers, "X-Container-Object-Count"),
		);

		Ok(vec![bytes_used, object_count])
	}
}
#[async_trait]
impl Collector for OperationsCollector {
	fn name(&self) -> &'static str {
		"operations"
	}

	fn enabled(&self) -> bool {
		self.shared.config.services.operations.enabled
	}

	async fn collect(&self) -> Result<Vec<MetricFamily>> {
		let settings = &self.shared.config.services.operations;
		let mut families = Vec::new();

		if !settings.loadbalancer_ids.trim().is_empty() {
			match self.loadbalancer_ratios().await {
				Ok(family) => families.push(family),
				Err(err) => {
					tracing::warn!(?err, "load balancer ratios failed");
				},
			}
		}
		if self.shared.config.services.gslb.enabled {
			match self.gslb_ratios().await {
				Ok(family) => families.push(family),
				Err(err) => {
					tracing::warn!(?err, "traffic-director ratios failed");
				},
			}
		}
		if !settings.cdn_app_key.trim().is_empty() {
			match self.cdn_ratios().await {
				Ok(cdn_families) => families.extend(cdn_families),
				Err(err) => {
					tracing::warn!(?err, "CDN cache ratios failed");
				},
			}
		}
		if !settings.rds_instance_id.trim().is_empty() {
			match self.rds_query_performance().await {
				Ok(rds_families) => families.extend(rds_families),
				Err(err) => {
					tracing::warn!(?err, "database query-performance gauges failed");
				},
			}
		}
		if !settings.storage_container.trim().is_empty() {
			match self.storage_trend().await {
				Ok(storage_families) => families.extend(storage_families),
				Err(err) => {
					tracing::warn!(?err, "storage usage trend failed");
				},
			}
		}

		Ok(families)
	}
}

#[derive(Debug, Deserialize)]
struct LoadBalancerDetail {
	#[serde(default)]
	loadbalancer: LoadBalancer,
}

#[derive(Debug, Default, Deserialize)]
struct LoadBalancer {
	#[serde(default)]
	name: String,
}

#[derive(Debug, Deserialize)]
struct PoolListing {
	#[serde(default)]
	pools: Vec<Pool>,
}

#[derive(Debug, Deserialize)]
struct Pool {
	#[serde(default)]
	id: String,
	#[serde(default)]
	name: String,
}

#[derive(Debug, Deserialize)]
struct MemberListing {
	#[serde(default)]
	members: Vec<Member>,
}

#[derive(Debug, Deserialize)]
struct Member {
	#[serde(default)]
	monitor_status: String,
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
}

#[derive(Debug, Deserialize)]
struct GslbPoolListing {
	#[serde(default)]
	pools: Vec<GslbPool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GslbPool {
	#[serde(default)]
	pool_id: String,
	#[serde(default)]
	pool_name: String,
	#[serde(default)]
	members: Vec<GslbMember>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GslbMember {
	#[serde(default)]
	operating_status: String,
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
	app_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdsStatisticListing {
	#[serde(default)]
	metric_statistics: Vec<RdsStatistic>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdsStatistic {
	#[serde(default)]
	metric_name: String,
	#[serde(default)]
	value: f64,
}

#[derive(Debug, Deserialize)]
struct StatisticListing {
	#[serde(default)]
	statistics: Vec<StatisticWindow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatisticWindow {
	#[serde(default)]
	cache_hits: f64,
	#[serde(default)]
	cache_misses: f64,
	#[serde(default)]
	bandwidth_in: f64,
	#[serde(default)]
	bandwidth_out: f64,
}
