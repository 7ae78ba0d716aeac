//! Time-windowed cache over the aggregated snapshot.
//!
//! Readers inside the staleness window share the cached snapshot without blocking
//! each other. When the window lapses, refreshes serialize through a single-flight
//! gate with a re-check after acquiring it, so one expiry triggers exactly one
//! collection cycle no matter how many readers race it.

// std
use std::future::Future;
// crates.io
use tokio::sync::{Mutex, RwLock};
// self
use crate::{_prelude::*, metric::MetricFamily};

/// The complete, atomically replaced result of one collection cycle.
#[derive(Clone, Debug)]
pub struct AggregateSnapshot {
	/// Metric families in collector registration order, shared between readers.
	pub families: Arc<Vec<MetricFamily>>,
	/// Monotonic capture time driving the staleness window.
	pub captured_at: Instant,
	/// Wall-clock capture time for display and logging.
	pub captured_at_utc: DateTime<Utc>,
}
impl AggregateSnapshot {
	/// Wrap a cycle's families with the current capture times.
	pub fn new(families: Vec<MetricFamily>) -> Self {
		Self { families: Arc::new(families), captured_at: Instant::now(), captured_at_utc: Utc::now() }
	}

	/// Whether the snapshot is still inside the staleness window.
	pub fn is_fresh(&self, ttl: Duration) -> bool {
		self.captured_at.elapsed() < ttl
	}
}

/// Staleness-window cache with single-flight refresh.
#[derive(Debug)]
pub struct ResultCache {
	ttl: Duration,
	snapshot: RwLock<Option<AggregateSnapshot>>,
	refresh_gate: Mutex<()>,
}
impl ResultCache {
	/// Create an empty cache with the given staleness window.
	pub fn new(ttl: Duration) -> Self {
		Self { ttl, snapshot: RwLock::new(None), refresh_gate: Mutex::new(()) }
	}

	/// Return the cached snapshot while fresh, otherwise run `refresh` and cache its
	/// result.
	///
	/// Concurrent expired readers queue on the gate; whoever wins re-checks and the
	/// rest observe the winner's snapshot without refreshing again.
	pub async fn get<F, Fut>(&self, refresh: F) -> AggregateSnapshot
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = AggregateSnapshot>,
	{
		if let Some(snapshot) = self.snapshot.read().await.as_ref()
			&& snapshot.is_fresh(self.ttl)
		{
			return snapshot.clone();
		}

		let _gate = self.refresh_gate.lock().await;

		if let Some(snapshot) = self.snapshot.read().await.as_ref()
			&& snapshot.is_fresh(self.ttl)
		{
			return snapshot.clone();
		}

		let snapshot = refresh().await;

		*self.snapshot.write().await = Some(snapshot.clone());

		snapshot
	}

	/// Current snapshot regardless of freshness.
	pub async fn current(&self) -> Option<AggregateSnapshot> {
		self.snapshot.read().await.clone()
	}

	/// Replace the snapshot wholesale; used by the background refresher.
	pub async fn replace(&self, snapshot: AggregateSnapshot) {
		*self.snapshot.write().await = Some(snapshot);
	}
}
