//! Configuration surface consumed by the exporter core.
//!
//! An external loader (env, file, flags) is expected to produce these structs; every field
//! carries a serde default so partial documents deserialize into a runnable configuration.

// crates.io
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::_prelude::*;

/// Default timeout applied to every upstream HTTP call.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Default staleness window for the aggregated snapshot.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
/// Default background collection interval.
pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(60);

/// Top-level exporter configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExporterConfig {
	/// Identity service base URL used for token issuance.
	#[serde(default = "default_identity_url")]
	pub identity_url: Url,
	/// Tenant identifier sent with password credentials.
	#[serde(default)]
	pub tenant_id: String,
	/// Username for the identity service.
	#[serde(default)]
	pub username: String,
	/// Password backing the standard credential slot.
	#[serde(default)]
	pub password: String,
	/// Optional distinct password backing the restricted credential slot.
	///
	/// When empty the object-storage collector shares the standard slot.
	#[serde(default)]
	pub storage_password: String,
	/// Default application key, used when a service omits its own.
	#[serde(default)]
	pub app_key: String,
	/// Access key identifier for the keypair header scheme.
	#[serde(default)]
	pub access_key_id: String,
	/// Access key secret for the keypair header scheme.
	#[serde(default)]
	pub access_key_secret: String,
	/// Timeout applied to each upstream HTTP call.
	#[serde(default = "default_http_timeout")]
	pub http_timeout: Duration,
	/// Staleness window for serving the cached snapshot.
	#[serde(default = "default_cache_ttl")]
	pub cache_ttl: Duration,
	/// Interval between unconditional background collection cycles.
	#[serde(default = "default_collection_interval")]
	pub collection_interval: Duration,
	/// Per-service collector settings.
	#[serde(default)]
	pub services: ServiceSettings,
}
impl ExporterConfig {
	/// Validate the configuration against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		if self.http_timeout < Duration::from_millis(100) {
			return Err(Error::Validation {
				field: "http_timeout",
				reason: "Must be at least 100 ms.".into(),
			});
		}
		if self.cache_ttl.is_zero() {
			return Err(Error::Validation {
				field: "cache_ttl",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.collection_interval < Duration::from_secs(1) {
			return Err(Error::Validation {
				field: "collection_interval",
				reason: "Must be at least 1 second.".into(),
			});
		}

		Ok(())
	}
}
impl Default for ExporterConfig {
	fn default() -> Self {
		Self {
			identity_url: default_identity_url(),
			tenant_id: String::new(),
			username: String::new(),
			password: String::new(),
			storage_password: String::new(),
			app_key: String::new(),
			access_key_id: String::new(),
			access_key_secret: String::new(),
			http_timeout: DEFAULT_HTTP_TIMEOUT,
			cache_ttl: DEFAULT_CACHE_TTL,
			collection_interval: DEFAULT_COLLECTION_INTERVAL,
			services: ServiceSettings::default(),
		}
	}
}

/// Per-service collector settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServiceSettings {
	/// Global traffic director (DNS-based) service.
	#[serde(default)]
	pub gslb: GslbSettings,
	/// Load balancer service.
	#[serde(default)]
	pub loadbalancer: LoadBalancerSettings,
	/// Managed database service.
	#[serde(default)]
	pub rds: RdsSettings,
	/// Content delivery service.
	#[serde(default)]
	pub cdn: CdnSettings,
	/// Object storage service.
	#[serde(default)]
	pub storage: StorageSettings,
	/// Compute instance service.
	#[serde(default)]
	pub instance: InstanceSettings,
	/// Derived operations metrics (ratios across the services above).
	#[serde(default)]
	pub operations: OperationsSettings,
}

/// GSLB collector settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GslbSettings {
	/// Whether the collector runs at all.
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Service-specific application key; falls back to the default app key.
	#[serde(default)]
	pub app_key: String,
	/// API base URL.
	#[serde(default = "default_gslb_url")]
	pub api_url: Url,
}
impl Default for GslbSettings {
	fn default() -> Self {
		Self { enabled: true, app_key: String::new(), api_url: default_gslb_url() }
	}
}

/// Load balancer collector settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoadBalancerSettings {
	/// Whether the collector runs at all.
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Comma-separated allow-list of load balancer IDs; empty means all.
	#[serde(default)]
	pub ids: String,
	/// API base URL.
	#[serde(default = "default_loadbalancer_url")]
	pub api_url: Url,
}
impl Default for LoadBalancerSettings {
	fn default() -> Self {
		Self { enabled: true, ids: String::new(), api_url: default_loadbalancer_url() }
	}
}

/// Managed database collector settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RdsSettings {
	/// Whether the collector runs at all.
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Comma-separated allow-list of DB instance IDs; empty means all.
	#[serde(default)]
	pub instance_ids: String,
	/// Service-specific application key; falls back to the default app key.
	#[serde(default)]
	pub app_key: String,
	/// API base URL.
	#[serde(default = "default_rds_url")]
	pub api_url: Url,
}
impl Default for RdsSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			instance_ids: String::new(),
			app_key: String::new(),
			api_url: default_rds_url(),
		}
	}
}

/// CDN collector settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CdnSettings {
	/// Whether the collector runs at all.
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Comma-separated allow-list of CDN service IDs; empty means all.
	#[serde(default)]
	pub service_ids: String,
	/// Service-specific application key; falls back to the default app key.
	#[serde(default)]
	pub app_key: String,
	/// API base URL.
	#[serde(default = "default_cdn_url")]
	pub api_url: Url,
}
impl Default for CdnSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			service_ids: String::new(),
			app_key: String::new(),
			api_url: default_cdn_url(),
		}
	}
}

/// Object storage collector settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageSettings {
	/// Whether the collector runs at all.
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Comma-separated allow-list of container names; empty means all.
	#[serde(default)]
	pub containers: String,
	/// API base URL, used when the token catalog does not advertise one.
	#[serde(default = "default_storage_url")]
	pub api_url: Url,
}
impl Default for StorageSettings {
	fn default() -> Self {
		Self { enabled: true, containers: String::new(), api_url: default_storage_url() }
	}
}

/// Compute instance collector settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceSettings {
	/// Whether the collector runs at all.
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Comma-separated allow-list of instance IDs; empty means all.
	#[serde(default)]
	pub ids: String,
	/// API base URL.
	#[serde(default = "default_instance_url")]
	pub api_url: Url,
}
impl Default for InstanceSettings {
	fn default() -> Self {
		Self { enabled: true, ids: String::new(), api_url: default_instance_url() }
	}
}

/// Derived operations collector settings.
///
/// Each ratio family is gated on its own identifier; an empty identifier skips that
/// family without diagnostics since the operator simply has not opted in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationsSettings {
	/// Whether the collector runs at all.
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Application key identifying the CDN service to derive cache-hit ratios for.
	#[serde(default)]
	pub cdn_app_key: String,
	/// Comma-separated load balancer IDs to derive member-health ratios for.
	#[serde(default)]
	pub loadbalancer_ids: String,
	/// Managed database instance ID to derive query-performance gauges for.
	#[serde(default)]
	pub rds_instance_id: String,
	/// Object storage container whose usage trend is tracked.
	#[serde(default)]
	pub storage_container: String,
}
impl Default for OperationsSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			cdn_app_key: String::new(),
			loadbalancer_ids: String::new(),
			rds_instance_id: String::new(),
			storage_container: String::new(),
		}
	}
}

/// Split a comma-separated identifier list into trimmed, non-empty entries.
pub fn id_list(raw: &str) -> Vec<String> {
	raw.split(',').map(str::trim).filter(|id| !id.is_empty()).map(str::to_owned).collect()
}

/// Whether an identifier passes an allow-list; an empty list allows everything.
pub fn id_allowed(filter: &[String], id: &str) -> bool {
	filter.is_empty() || filter.iter().any(|allowed| allowed == id)
}

fn default_true() -> bool {
	true
}

fn default_http_timeout() -> Duration {
	DEFAULT_HTTP_TIMEOUT
}

fn default_cache_ttl() -> Duration {
	DEFAULT_CACHE_TTL
}

fn default_collection_interval() -> Duration {
	DEFAULT_COLLECTION_INTERVAL
}

fn default_identity_url() -> Url {
	static_url("https://api-identity-infrastructure.nhncloudservice.com/v2.0")
}

fn default_gslb_url() -> Url {
	static_url("https://dnsplus.api.nhncloudservice.com")
}

fn default_loadbalancer_url() -> Url {
	static_url("https://kr1-api-network-infrastructure.nhncloudservice.com")
}

fn default_rds_url() -> Url {
	static_url("https://kr1-rds-mysql.api.nhncloudservice.com")
}

fn default_cdn_url() -> Url {
	static_url("https://cdn.api.nhncloudservice.com")
}

fn default_storage_url() -> Url {
	static_url("https://kr1-api-object-storage.nhncloudservice.com")
}

fn default_instance_url() -> Url {
	static_url("https://kr1-api-compute.infrastructure.nhncloudservice.com")
}

fn static_url(raw: &str) -> Url {
	Url::parse(raw).expect("static default URL is well-formed")
}
