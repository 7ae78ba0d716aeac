//! Orchestration over the registered collectors, the snapshot cache, and the
//! background refresher.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use reqwest::Client;
use tokio::{sync::watch, task::JoinHandle};
// self
use crate::{
	_prelude::*,
	auth::CredentialManager,
	cache::{AggregateSnapshot, ResultCache},
	collector::{
		Collector, Shared, cdn::CdnCollector, gslb::GslbCollector, instance::InstanceCollector,
		loadbalancer::LoadBalancerCollector, operations::OperationsCollector, rds::RdsCollector,
		storage::StorageCollector,
	},
	config::ExporterConfig,
	metric,
};

/// Exporter core: runs collection cycles, caches the aggregated snapshot, and
/// renders it for scraping.
///
/// Cloning is cheap; clones share the cache, credential slots, and per-collector
/// counters.
#[derive(Clone)]
pub struct Exporter {
	config: Arc<ExporterConfig>,
	collectors: Arc<Vec<Registered>>,
	cache: Arc<ResultCache>,
	credentials: Arc<CredentialManager>,
}
impl Exporter {
	/// Build an exporter with a default HTTP client honoring the configured timeout.
	pub fn new(config: ExporterConfig) -> Result<Self> {
		let client = Client::builder()
			.timeout(config.http_timeout)
			.user_agent(format!("cloud-exporter/{}", env!("CARGO_PKG_VERSION")))
			.build()?;

		Self::with_client(config, client)
	}

	/// Build an exporter using the supplied HTTP client (primarily for tests).
	pub fn with_client(config: ExporterConfig, client: Client) -> Result<Self> {
		config.validate()?;

		let config = Arc::new(config);
		let credentials =
			Arc::new(CredentialManager::new(config.clone(), client.clone()));
		let shared = Shared { config: config.clone(), credentials: credentials.clone(), client };
		let collectors = vec![
			Registered::new(Box::new(GslbCollector::new(shared.clone()))),
			Registered::new(Box::new(LoadBalancerCollector::new(shared.clone()))),
			Registered::new(Box::new(RdsCollector::new(shared.clone()))),
			Registered::new(Box::new(CdnCollector::new(shared.clone()))),
			Registered::new(Box::new(StorageCollector::new(shared.clone()))),
			Registered::new(Box::new(InstanceCollector::new(shared.clone()))),
			Registered::new(Box::new(OperationsCollector::new(shared))),
		];

		Ok(Self {
			cache: Arc::new(ResultCache::new(config.cache_ttl)),
			config,
			collectors: Arc::new(collectors),
			credentials,
		})
	}

	/// Access the credential manager shared by the collectors.
	pub fn credentials(&self) -> Arc<CredentialManager> {
		self.credentials.clone()
	}

	/// Run one collection cycle across every enabled collector.
	///
	/// Each collector runs on its own task; failures and panics degrade that
	/// collector's contribution to empty and are logged with its identity, so the
	/// cycle itself always yields a snapshot.
	pub async fn run_cycle(&self) -> AggregateSnapshot {
		let mut pending = Vec::new();

		for (index, registered) in self.collectors.iter().enumerate() {
			if !registered.collector.enabled() {
				tracing::debug!(collector = registered.collector.name(), "disabled; skipping");

				continue;
			}

			let collectors = self.collectors.clone();

			pending.push((
				index,
				tokio::spawn(async move { collectors[index].collector.collect().await }),
			));
		}

		let mut families = Vec::new();

		for (index, handle) in pending {
			let registered = &self.collectors[index];
			let name = registered.collector.name();

			registered.stats.cycles.fetch_add(1, Ordering::Relaxed);

			match handle.await {
				Ok(Ok(collected)) => {
					let samples =
						collected.iter().map(|family| family.samples.len() as u64).sum::<u64>();

					registered.stats.samples.fetch_add(samples, Ordering::Relaxed);
					families.extend(collected.into_iter().filter(|family| !family.is_empty()));
				},
				Ok(Err(err)) => {
					registered.stats.failures.fetch_add(1, Ordering::Relaxed);

					tracing::warn!(collector = name, ?err, "collection failed");
				},
				Err(err) => {
					registered.stats.failures.fetch_add(1, Ordering::Relaxed);

					tracing::error!(collector = name, ?err, "collection task panicked");
				},
			}
		}

		tracing::debug!(families = families.len(), "collection cycle complete");

		AggregateSnapshot::new(families)
	}

	/// Current snapshot per the cache contract: cached while fresh, otherwise one
	/// synchronous cycle shared by concurrent callers.
	pub async fn snapshot(&self) -> AggregateSnapshot {
		self.cache.get(|| self.run_cycle()).await
	}

	/// Render the current snapshot in the text exposition format.
	///
	/// The `Err` arm is reserved for a serving layer contract: a front end maps it
	/// to a placeholder error response when no snapshot can be produced at all.
	/// Cycles themselves are infallible, so today this always returns `Ok`.
	pub async fn render(&self) -> Result<String> {
		let snapshot = self.snapshot().await;

		Ok(metric::render(&snapshot.families))
	}

	/// Per-collector counters for status reporting.
	pub fn status(&self) -> Vec<CollectorStatus> {
		self.collectors
			.iter()
			.map(|registered| CollectorStatus {
				name: registered.collector.name(),
				enabled: registered.collector.enabled(),
				cycles: registered.stats.cycles.load(Ordering::Relaxed),
				samples: registered.stats.samples.load(Ordering::Relaxed),
				failures: registered.stats.failures.load(Ordering::Relaxed),
			})
			.collect()
	}

	/// Spawn the background refresher: every collection interval it runs a cycle and
	/// replaces the cached snapshot unconditionally.
	pub fn spawn_refresher(&self) -> RefresherHandle {
		let exporter = self.clone();
		let interval = self.config.collection_interval;
		let (shutdown, mut signal) = watch::channel(false);
		let task = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = signal.changed() => break,
					_ = tokio::time::sleep(interval) => {
						let snapshot = exporter.run_cycle().await;

						exporter.cache.replace(snapshot).await;
					},
				}
			}

			tracing::info!("background refresher stopped");
		});

		RefresherHandle { shutdown, task }
	}
}

/// Handle over the background refresher task.
pub struct RefresherHandle {
	shutdown: watch::Sender<bool>,
	task: JoinHandle<()>,
}
impl RefresherHandle {
	/// Signal the refresher to stop and wait for it to finish.
	pub async fn shutdown(self) {
		let _ = self.shutdown.send(true);
		let _ = self.task.await;
	}
}

/// Point-in-time counters for one registered collector.
#[derive(Clone, Debug)]
pub struct CollectorStatus {
	/// Collector identity.
	pub name: &'static str,
	/// Whether the collector currently participates in cycles.
	pub enabled: bool,
	/// Cycles the collector took part in.
	pub cycles: u64,
	/// Samples contributed across all cycles.
	pub samples: u64,
	/// Cycles that ended in a failure or panic.
	pub failures: u64,
}

struct Registered {
	collector: Box<dyn Collector>,
	stats: CollectorStats,
}
impl Registered {
	fn new(collector: Box<dyn Collector>) -> Self {
		Self { collector, stats: CollectorStats::default() }
	}
}

#[derive(Default)]
struct CollectorStats {
	cycles: AtomicU64,
	samples: AtomicU64,
	failures: AtomicU64,
}
