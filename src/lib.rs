//! Pull-based cloud infrastructure metrics exporter core — credential caching, per-service
//! collectors, and a TTL'd aggregation cache for Prometheus-style scraping.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod collector;
pub mod config;
pub mod metric;

mod error;
mod exporter;
mod http;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

pub use crate::{
	auth::{AuthScheme, Credential, CredentialManager, CredentialSlot, TOKEN_SAFETY_MARGIN},
	cache::{AggregateSnapshot, ResultCache},
	collector::Collector,
	config::{ExporterConfig, ServiceSettings},
	error::{Error, Result},
	exporter::{CollectorStatus, Exporter, RefresherHandle},
	metric::{MetricFamily, MetricKind, render},
};
