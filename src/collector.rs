//! Collector contract and per-service implementations.
//!
//! Each collector translates one provider service's REST responses into normalized
//! metric families. Ordinary upstream failures never cross the orchestrator boundary:
//! a collector returns `Err` and the orchestrator uniformly resolves it to an empty
//! contribution.

pub(crate) mod cdn;
pub(crate) mod gslb;
pub(crate) mod instance;
pub(crate) mod loadbalancer;
pub(crate) mod operations;
pub(crate) mod rds;
pub(crate) mod storage;

// crates.io
use async_trait::async_trait;
use reqwest::{Client, header::HeaderMap};
use serde::de::DeserializeOwned;
use url::Url;
// self
use crate::{
	_prelude::*,
	auth::{AuthScheme, CredentialManager, CredentialSlot},
	config::ExporterConfig,
	http,
	metric::MetricFamily,
};

/// A unit translating one provider service's API responses into metric samples.
#[async_trait]
pub trait Collector: Send + Sync {
	/// Stable collector identity used in logs and status reporting.
	fn name(&self) -> &'static str;

	/// Whether the collector is enabled; disabled collectors make zero outbound calls.
	fn enabled(&self) -> bool;

	/// Fetch and map the service's resources into metric families.
	async fn collect(&self) -> Result<Vec<MetricFamily>>;
}

/// Dependencies shared by every collector.
#[derive(Clone, Debug)]
pub(crate) struct Shared {
	pub config: Arc<ExporterConfig>,
	pub credentials: Arc<CredentialManager>,
	pub client: Client,
}

/// Token-scheme fetch helper implementing the single post-invalidation retry.
///
/// On an authorization rejection from the upstream call, the cached credential for
/// the slot is invalidated and the request is retried exactly once with a freshly
/// issued token.
pub(crate) struct TokenFetch<'a> {
	credentials: &'a CredentialManager,
	client: &'a Client,
	slot: CredentialSlot,
}
impl<'a> TokenFetch<'a> {
	pub fn new(shared: &'a Shared, slot: CredentialSlot) -> Self {
		Self { credentials: &shared.credentials, client: &shared.client, slot }
	}

	pub async fn get_json<T>(&self, url: Url) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let headers = self.credentials.headers(AuthScheme::Token(self.slot)).await?;

		match http::get_json(self.client, url.clone(), &headers).await {
			Err(err) if err.is_auth_rejection() => {
				self.reauth(&url).await?;

				let headers = self.credentials.headers(AuthScheme::Token(self.slot)).await?;

				http::get_json(self.client, url, &headers).await
			},
			other => other,
		}
	}

	pub async fn get_text(&self, url: Url) -> Result<String> {
		let headers = self.credentials.headers(AuthScheme::Token(self.slot)).await?;

		match http::get_text(self.client, url.clone(), &headers).await {
			Err(err) if err.is_auth_rejection() => {
				self.reauth(&url).await?;

				let headers = self.credentials.headers(AuthScheme::Token(self.slot)).await?;

				http::get_text(self.client, url, &headers).await
			},
			other => other,
		}
	}

	pub async fn head(&self, url: Url) -> Result<HeaderMap> {
		let headers = self.credentials.headers(AuthScheme::Token(self.slot)).await?;

		match http::head(self.client, url.clone(), &headers).await {
			Err(err) if err.is_auth_rejection() => {
				self.reauth(&url).await?;

				let headers = self.credentials.headers(AuthScheme::Token(self.slot)).await?;

				http::head(self.client, url, &headers).await
			},
			other => other,
		}
	}

	async fn reauth(&self, url: &Url) -> Result<()> {
		tracing::warn!(%url, "authorization rejected; invalidating credential and retrying once");

		self.credentials.invalidate(self.slot).await;

		Ok(())
	}
}
