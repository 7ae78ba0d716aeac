//! Load balancer collector.
//!
//! Token-authenticated. The hierarchy is load balancer, then listeners and pools per
//! load balancer, then members per pool; each child fetch degrades independently.

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

const HEALTHY: &str = "ONLINE";
const PROVISIONED: &str = "ACTIVE";

pub(crate) struct LoadBalancerCollector {
	shared: Shared,
}
impl LoadBalancerCollector {
	pub fn new(shared: Shared) -> Self {
		Self { shared }
	}
}
#[async_trait]
impl Collector for LoadBalancerCollector {
	fn name(&self) -> &'static str {
		"loadbalancer"
	}

	fn enabled(&self) -> bool {
		self.shared.config.services.loadbalancer.enabled
	}

	async fn collect(&self) -> Result<Vec<MetricFamily>> {
		let settings = &self.shared.config.services.loadbalancer;
		let fetch = TokenFetch::new(&self.shared, CredentialSlot::Standard);
		let base = &settings.api_url;
		let filter = id_list(&settings.ids);
		let listing = fetch
			.get_json::<LoadBalancerListing>(http::join_url(base, "v2.0/lbaas/loadbalancers")?)
			.await?;
		let mut operating = MetricFamily::gauge(
			"cloud_lb_operating_status",
			"Load balancer operating status (1=ONLINE, 0=OFFLINE)",
			&["lb_id", "lb_name", "vip_address"],
		);
		let mut provisioning = MetricFamily::gauge(
			"cloud_lb_provisioning_status",
			"Load balancer provisioning status (1=ACTIVE, 0=other)",
			&["lb_id", "lb_name", "status"],
		);
		let mut listener_status = MetricFamily::gauge(
			"cloud_lb_listener_status",
			"Load balancer listener operating status (1=ONLINE, 0=OFFLINE)",
			&["lb_id", "listener_id", "listener_name", "protocol", "port"],
		);
		let mut pool_status = MetricFamily::gauge(
			"cloud_lb_pool_status",
			"Load balancer pool operating status (1=ONLINE, 0=OFFLINE)",
			&["lb_id", "pool_id", "pool_name", "protocol"],
		);
		let mut member_status = MetricFamily::gauge(
			"cloud_lb_pool_member_status",
			"Load balancer pool member monitor status (1=ONLINE, 0=OFFLINE)",
			&["lb_id", "pool_id", "member_id", "member_address", "member_port"],
		);

		for lb in listing.loadbalancers {
			if !id_allowed(&filter, &lb.id) {
				continue;
			}

			operating.push(
				vec![lb.id.clone(), lb.name.clone(), lb.vip_address],
				status_value(&lb.operating_status, HEALTHY),
			);
			provisioning.push(
				vec![lb.id.clone(), lb.name.clone(), lb.provisioning_status.clone()],
				status_value(&lb.provisioning_status, PROVISIONED),
			);

			let listeners_url = http::join_url(
				base,
				&format!("v2.0/lbaas/listeners?loadbalancer_id={}", lb.id),
			)?;

			match fetch.get_json::<ListenerListing>(listeners_url).await {
				Ok(listing) =>
					for listener in listing.listeners {
						listener_status.push(
							vec![
								lb.id.clone(),
								listener.id,
								listener.name,
								listener.protocol,
								listener.protocol_port.to_string(),
							],
							status_value(&listener.operating_status, HEALTHY),
						);
					},
				Err(err) => {
					tracing::warn!(lb = %lb.id, ?err, "listener listing failed");
				},
			}

			let pools_url =
				http::join_url(base, &format!("v2.0/lbaas/pools?loadbalancer_id={}", lb.id))?;
			let pools = match fetch.get_json::<PoolListing>(pools_url).await {
				Ok(listing) => listing.pools,
				Err(err) => {
					tracing::warn!(lb = %lb.id, ?err, "pool listing failed");

					continue;
				},
			};

			for pool in pools {
				pool_status.push(
					vec![lb.id.clone(), pool.id.clone(), pool.name, pool.protocol],
					status_value(&pool.operating_status, HEALTHY),
				);

				let members_url =
					http::join_url(base, &format!("v2.0/lbaas/pools/{}/members", pool.id))?;

				match fetch.get_json::<MemberListing>(members_url).await {
					Ok(listing) =>
						for member in listing.members {
							member_status.push(
								vec![
									lb.id.clone(),
									pool.id.clone(),
									member.id,
									member.address,
									member.protocol_port.to_string(),
								],
								status_value(&member.monitor_status, HEALTHY),
							);
						},
					Err(err) => {
						tracing::warn!(pool = %pool.id, ?err, "member listing failed");
					},
				}
			}
		}

		Ok(vec![operating, provisioning, listener_status, pool_status, member_status])
	}
}

#[derive(Debug, Deserialize)]
struct LoadBalancerListing {
	#[serde(default)]
	loadbalancers: Vec<LoadBalancer>,
}

#[derive(Debug, Deserialize)]
struct LoadBalancer {
	#[serde(default)]
	id: String,
	#[serde(default)]
	name: String,
	#[serde(default)]
	vip_address: String,
	#[serde(default)]
	operating_status: String,
	#[serde(default)]
	provisioning_status: String,
}

#[derive(Debug, Deserialize)]
struct ListenerListing {
	#[serde(default)]
	listeners: Vec<Listener>,
}

#[derive(Debug, Deserialize)]
struct Listener {
	#[serde(default)]
	id: String,
	#[serde(default)]
	name: String,
	#[serde(default)]
	protocol: String,
	#[serde(default)]
	protocol_port: u16,
	#[serde(default)]
	operating_status: String,
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
	#[serde(default)]
	protocol: String,
	#[serde(default)]
	operating_status: String,
}

#[derive(Debug, Deserialize)]
struct MemberListing {
	#[serde(default)]
	members: Vec<Member>,
}

#[derive(Debug, Deserialize)]
struct Member {
	#[serde(default)]
	id: String,
	#[serde(default)]
	address: String,
	#[serde(default)]
	protocol_port: u16,
	#[serde(default)]
	monitor_status: String,
}
