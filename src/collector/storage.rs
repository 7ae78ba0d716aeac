//! Object storage collector.
//!
//! Authenticates through the restricted credential slot so a distinct storage API
//! password never pollutes the standard token cache. The account URL comes from the
//! token's service catalog when advertised, otherwise from the configured base URL
//! plus the tenant-derived account segment. Container listings are plain text, one
//! name per line; per-container usage comes from HEAD response headers.

// crates.io
use async_trait::async_trait;
use reqwest::{StatusCode, header::HeaderMap};
use url::Url;
// self
use crate::{
	_prelude::*,
	collector::{Collector, Shared, TokenFetch},
	config::{id_allowed, id_list},
	http,
	metric::MetricFamily,
};

const CATALOG_TYPE: &str = "object-store";

pub(crate) struct StorageCollector {
	shared: Shared,
}
impl StorageCollector {
	pub fn new(shared: Shared) -> Self {
		Self { shared }
	}
}
#[async_trait]
impl Collector for StorageCollector {
	fn name(&self) -> &'static str {
		"storage"
	}

	fn enabled(&self) -> bool {
		self.shared.config.services.storage.enabled
	}

	async fn collect(&self) -> Result<Vec<MetricFamily>> {
		let slot = self.shared.credentials.storage_slot();
		let fetch = TokenFetch::new(&self.shared, slot);
		let account_url = account_url(&self.shared).await?;
		let account = account_segment(&account_url);
		let body = match fetch.get_text(account_url.clone()).await {
			Ok(body) => body,
			Err(Error::HttpStatus { status, .. }) if status == StatusCode::FORBIDDEN => {
				tracing::warn!(
					"container listing rejected with 403; check the storage API password and \
					 project permissions"
				);

				return Ok(Vec::new());
			},
			Err(err) => return Err(err),
		};
		let filter = id_list(&self.shared.config.services.storage.containers);
		let mut bytes_used = MetricFamily::gauge(
			"cloud_storage_container_bytes",
			"Object storage container usage in bytes",
			&["container_name", "account"],
		);
		let mut object_count = MetricFamily::gauge(
			"cloud_storage_container_object_count",
			"Object storage container object count",
			&["container_name", "account"],
		);

		for container in parse_container_listing(&body) {
			if !id_allowed(&filter, container) {
				continue;
			}

			let container_url = http::join_url(&account_url, container)?;

			match fetch.head(container_url).await {
				Ok(headers) => {
					bytes_used.push(
						vec![container.to_owned(), account.clone()],
						header_number(&headers, "X-Container-Bytes-Used"),
					);
					object_count.push(
						vec![container.to_owned(), account.clone()],
						header_number(&headers, "X-Container-Object-Count"),
					);
				},
				Err(err) => {
					tracing::warn!(container, ?err, "container inspection failed");
				},
			}
		}

		Ok(vec![bytes_used, object_count])
	}
}

/// Account URL: the catalog's object-store endpoint when advertised, otherwise the
/// configured base plus the tenant-derived account segment.
pub(crate) async fn account_url(shared: &Shared) -> Result<Url> {
	let slot = shared.credentials.storage_slot();
	let credential = shared.credentials.acquire(slot).await?;

	if let Some(url) = credential.endpoint(CATALOG_TYPE) {
		return Ok(url.clone());
	}

	http::join_url(
		&shared.config.services.storage.api_url,
		&format!("v1/AUTH_{}", shared.config.tenant_id),
	)
}

pub(crate) fn header_number(headers: &HeaderMap, name: &str) -> f64 {
	headers
		.get(name)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.parse::<f64>().ok())
		.unwrap_or(0.)
}

/// Split a plain-text listing into container names, dropping blank lines and stray
/// bracket artifacts some gateways emit.
fn parse_container_listing(body: &str) -> Vec<&str> {
	body.lines()
		.map(str::trim)
		.filter(|line| {
			!line.is_empty() && !line.starts_with(['[', '{']) && !line.ends_with([']', '}'])
		})
		.collect()
}

fn account_segment(url: &Url) -> String {
	url.path_segments()
		.and_then(|mut segments| segments.next_back())
		.filter(|segment| !segment.is_empty())
		.unwrap_or("default")
		.to_owned()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn container_listing_drops_blanks_and_brackets() {
		let body = "photos\n\n  videos  \n[]\n{}\nbackups\n";

		assert_eq!(parse_container_listing(body), vec!["photos", "videos", "backups"]);
	}

	#[test]
	fn account_segment_is_last_path_component() {
		let url = Url::parse("https://storage.example.com/v1/AUTH_tenant-1").expect("url");

		assert_eq!(account_segment(&url), "AUTH_tenant-1");
	}
}
