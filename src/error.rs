//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the exporter crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Identity endpoint rejected credentials{}: {message}", fmt_status(.status))]
	Auth { status: Option<reqwest::StatusCode>, message: String },
	#[error("Upstream HTTP status {status} from {url}: {body:?}")]
	HttpStatus { status: reqwest::StatusCode, url: url::Url, body: Option<String> },
	#[error("Missing configuration for {field}: {reason}")]
	Config { field: &'static str, reason: String },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// Whether this error is an authorization rejection from a dependent service call.
	///
	/// Collectors use this to decide when to force-invalidate the cached credential
	/// and retry the primary fetch exactly once.
	pub fn is_auth_rejection(&self) -> bool {
		matches!(
			self,
			Self::HttpStatus { status, .. }
				if *status == reqwest::StatusCode::UNAUTHORIZED
		)
	}
}

fn fmt_status(status: &Option<reqwest::StatusCode>) -> String {
	status.map(|s| format!(" ({s})")).unwrap_or_default()
}
