//! Thin HTTP helpers shared by the credential manager and collectors.

// crates.io
use reqwest::{Client, header::HeaderMap};
use serde::de::DeserializeOwned;
use url::Url;
// self
use crate::_prelude::*;

/// Header list carried by outbound requests; names are static, values are owned
/// because they usually come from a freshly acquired credential.
pub(crate) type Headers = Vec<(&'static str, String)>;

/// Issue a GET request and decode the JSON body, mapping non-2xx statuses onto
/// [`Error::HttpStatus`] with the response body captured for diagnostics.
pub(crate) async fn get_json<T>(client: &Client, url: Url, headers: &Headers) -> Result<T>
where
	T: DeserializeOwned,
{
	let response = request(client, url, headers).await?;
	let bytes = response.bytes().await?;

	Ok(serde_json::from_slice(&bytes)?)
}

/// Issue a GET request and return the plain-text body.
pub(crate) async fn get_text(client: &Client, url: Url, headers: &Headers) -> Result<String> {
	let response = request(client, url, headers).await?;

	Ok(response.text().await?)
}

/// Issue a HEAD request and return the response headers.
pub(crate) async fn head(client: &Client, url: Url, headers: &Headers) -> Result<HeaderMap> {
	let mut builder = client.head(url.clone());

	for (name, value) in headers {
		builder = builder.header(*name, value);
	}

	let response = builder.send().await?;
	let status = response.status();

	if !status.is_success() {
		return Err(Error::HttpStatus { status, url, body: None });
	}

	Ok(response.headers().clone())
}

/// Join a path onto a base URL without `Url::join`'s last-segment replacement.
pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url> {
	let base = base.as_str().trim_end_matches('/');
	let path = path.trim_start_matches('/');

	Ok(Url::parse(&format!("{base}/{path}"))?)
}

async fn request(client: &Client, url: Url, headers: &Headers) -> Result<reqwest::Response> {
	let mut builder = client.get(url.clone());

	for (name, value) in headers {
		builder = builder.header(*name, value);
	}

	let response = builder.send().await?;
	let status = response.status();

	if !status.is_success() {
		let body = response.text().await.ok();

		return Err(Error::HttpStatus { status, url, body });
	}

	Ok(response)
}
