//! Credential acquisition, caching, and service-endpoint discovery.
//!
//! Two independent credential slots exist: the standard slot and a restricted slot for
//! the object-storage service, whose operator may configure a distinct API password.
//! Refreshing one slot never touches the other.

// std
use std::collections::HashMap;
// crates.io
use chrono::TimeDelta;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use url::Url;
// self
use crate::{_prelude::*, config::ExporterConfig, http};

/// Fixed buffer subtracted from a token's expiry when judging cached validity, so a
/// token can never expire mid-request.
pub const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(300);

/// Selector for one of the two independent credential caches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialSlot {
	/// Default identity password.
	Standard,
	/// Distinct object-storage API password.
	Restricted,
}

/// Header delivery scheme for a downstream service call.
#[derive(Clone, Copy, Debug)]
pub enum AuthScheme {
	/// Token header (`X-Auth-Token`) backed by a credential slot.
	Token(CredentialSlot),
	/// Application-key header (`X-TC-APP-KEY`) for the named service.
	AppKey(&'static str),
	/// Application-key plus access-keypair headers for the named service.
	Keypair(&'static str),
}

/// A cached, time-limited authentication token with discovered service endpoints.
#[derive(Clone, Debug)]
pub struct Credential {
	/// Opaque token value delivered in the token header.
	pub token: String,
	/// Wall-clock time the token was issued (local observation).
	pub issued_at: DateTime<Utc>,
	/// Absolute expiry reported by the identity endpoint.
	pub expires_at: DateTime<Utc>,
	/// Service endpoints discovered from the token's service catalog.
	pub endpoints: HashMap<String, Url>,
}
impl Credential {
	/// Whether the credential is still valid at `now`, honoring the safety margin.
	pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
		now < self.expires_at - safety_margin()
	}

	/// Look up a discovered base URL by service-catalog type.
	pub fn endpoint(&self, service_type: &str) -> Option<&Url> {
		self.endpoints.get(service_type)
	}
}

/// Issues, caches, and refreshes tokens; resolves per-service application keys.
#[derive(Debug)]
pub struct CredentialManager {
	config: Arc<ExporterConfig>,
	client: Client,
	standard: Mutex<Option<Credential>>,
	restricted: Mutex<Option<Credential>>,
}
impl CredentialManager {
	/// Build a manager over the shared HTTP client.
	pub fn new(config: Arc<ExporterConfig>, client: Client) -> Self {
		Self { config, client, standard: Mutex::new(None), restricted: Mutex::new(None) }
	}

	/// Return a valid credential for the slot, issuing a fresh token when the cached
	/// one is absent or inside the safety margin.
	///
	/// The slot mutex is held across issuance, so concurrent callers wait on a single
	/// upstream request instead of racing redundant refreshes.
	pub async fn acquire(&self, slot: CredentialSlot) -> Result<Credential> {
		let slot = self.effective_slot(slot);
		let mut guard = self.cell(slot).lock().await;

		if let Some(credential) = guard.as_ref()
			&& credential.is_valid(Utc::now())
		{
			return Ok(credential.clone());
		}

		let credential = self.issue(slot).await?;

		*guard = Some(credential.clone());

		Ok(credential)
	}

	/// Discard the cached credential for a slot so the next `acquire` performs a
	/// fresh issuance; called after a downstream authorization rejection.
	pub async fn invalidate(&self, slot: CredentialSlot) {
		let slot = self.effective_slot(slot);

		tracing::debug!(?slot, "invalidating cached credential");

		*self.cell(slot).lock().await = None;
	}

	/// Slot the object-storage collector should use: restricted when a distinct
	/// password is configured, otherwise the standard slot (and its cache).
	pub fn storage_slot(&self) -> CredentialSlot {
		if self.config.storage_password.trim().is_empty() {
			tracing::warn!(
				"no distinct storage password configured; storage requests use the standard \
				 credential and may be rejected with 403"
			);

			CredentialSlot::Standard
		} else {
			CredentialSlot::Restricted
		}
	}

	/// Resolve the application key for a service, falling back to the default key.
	pub fn app_key(&self, service: &'static str) -> Result<String> {
		let services = &self.config.services;
		let specific = match service {
			"gslb" => services.gslb.app_key.as_str(),
			"cdn" => services.cdn.app_key.as_str(),
			"rds" => services.rds.app_key.as_str(),
			_ => "",
		};
		let key = if specific.is_empty() { self.config.app_key.as_str() } else { specific };

		if key.is_empty() {
			return Err(Error::Config {
				field: "app_key",
				reason: format!("No application key configured for service '{service}'."),
			});
		}

		Ok(key.to_owned())
	}

	/// Whether the access keypair for the keypair header scheme is configured.
	pub fn keypair_configured(&self) -> bool {
		!self.config.access_key_id.is_empty() && !self.config.access_key_secret.is_empty()
	}

	/// Build request headers for the given delivery scheme.
	pub(crate) async fn headers(&self, scheme: AuthScheme) -> Result<http::Headers> {
		match scheme {
			AuthScheme::Token(slot) => {
				let credential = self.acquire(slot).await?;

				Ok(vec![
					("X-Auth-Token", credential.token),
					("Accept", "application/json".into()),
				])
			},
			AuthScheme::AppKey(service) => Ok(vec![
				("X-TC-APP-KEY", self.app_key(service)?),
				("Accept", "application/json".into()),
			]),
			AuthScheme::Keypair(service) => {
				if !self.keypair_configured() {
					return Err(Error::Config {
						field: "access_key_id",
						reason: "Keypair scheme requested without configured access keys.".into(),
					});
				}

				Ok(vec![
					("X-TC-APP-KEY", self.app_key(service)?),
					("X-TC-AUTHENTICATION-ID", self.config.access_key_id.clone()),
					("X-TC-AUTHENTICATION-SECRET", self.config.access_key_secret.clone()),
					("Accept", "application/json".into()),
				])
			},
		}
	}

	fn cell(&self, slot: CredentialSlot) -> &Mutex<Option<Credential>> {
		match slot {
			CredentialSlot::Standard => &self.standard,
			CredentialSlot::Restricted => &self.restricted,
		}
	}

	fn effective_slot(&self, slot: CredentialSlot) -> CredentialSlot {
		if slot == CredentialSlot::Restricted && self.config.storage_password.trim().is_empty() {
			CredentialSlot::Standard
		} else {
			slot
		}
	}

	async fn issue(&self, slot: CredentialSlot) -> Result<Credential> {
		if self.config.username.is_empty() {
			return Err(Error::Config {
				field: "username",
				reason: "Identity credentials are required for token issuance.".into(),
			});
		}

		let password = match slot {
			CredentialSlot::Standard => self.config.password.as_str(),
			CredentialSlot::Restricted => self.config.storage_password.as_str(),
		};

		if password.is_empty() {
			return Err(Error::Config {
				field: "password",
				reason: "Identity credentials are required for token issuance.".into(),
			});
		}

		let url = http::join_url(&self.config.identity_url, "tokens")?;
		let body = json!({
			"auth": {
				"tenantId": self.config.tenant_id,
				"passwordCredentials": {
					"username": self.config.username,
					"password": password,
				},
			},
		});
		let response = self.client.post(url).json(&body).send().await?;
		let status = response.status();

		if !status.is_success() {
			let message = response.text().await.unwrap_or_default();

			return Err(Error::Auth { status: Some(status), message });
		}

		let envelope: TokenEnvelope = serde_json::from_slice(&response.bytes().await?)?;
		let credential = parse_credential(envelope)?;

		tracing::info!(
			?slot,
			expires_at = %credential.expires_at,
			endpoints = credential.endpoints.len(),
			"issued identity token"
		);

		Ok(credential)
	}
}

fn parse_credential(envelope: TokenEnvelope) -> Result<Credential> {
	let access = envelope.access.ok_or_else(malformed)?;
	let token = access.token.ok_or_else(malformed)?;
	let (id, expires) = match (token.id, token.expires) {
		(Some(id), Some(expires)) if !id.is_empty() => (id, expires),
		_ => return Err(malformed()),
	};
	let expires_at = DateTime::parse_from_rfc3339(&expires)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|_| malformed())?;
	// Catalog discovery is best effort; a missing or partial catalog is not an error
	// since every service has a statically configured fallback URL.
	let endpoints = access
		.service_catalog
		.into_iter()
		.filter_map(|entry| {
			let raw = entry
				.endpoints
				.into_iter()
				.find_map(|endpoint| endpoint.public_url.or(endpoint.internal_url))?;

			Some((entry.kind, Url::parse(&raw).ok()?))
		})
		.collect();

	Ok(Credential { token: id, issued_at: Utc::now(), expires_at, endpoints })
}

fn malformed() -> Error {
	Error::Auth { status: None, message: "Malformed token response.".into() }
}

fn safety_margin() -> TimeDelta {
	TimeDelta::seconds(TOKEN_SAFETY_MARGIN.as_secs() as i64)
}

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
	access: Option<AccessSection>,
}

#[derive(Debug, Deserialize)]
struct AccessSection {
	token: Option<TokenSection>,
	#[serde(default, rename = "serviceCatalog")]
	service_catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct TokenSection {
	id: Option<String>,
	expires: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
	#[serde(default, rename = "type")]
	kind: String,
	#[serde(default)]
	endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
	#[serde(rename = "publicURL")]
	public_url: Option<String>,
	#[serde(rename = "internalURL")]
	internal_url: Option<String>,
}
