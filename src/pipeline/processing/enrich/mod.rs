//! Postcode to coordinate enrichment.
//!
//! Lookups go through a [`GeocodePort`] and are fanned out over a bounded
//! pool of workers. Each worker paces its own requests, every call carries a
//! timeout, and a per-run single-flight cache guarantees at most one
//! outbound lookup per postcode. A failed lookup becomes
//! [`Coordinate::Absent`]; enrichment itself never fails.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::app::ports::GeocodePort;
use crate::domain::{Coordinate, EnrichedPostcode, PostcodeKey};
use crate::error::EnrichmentFailure;
use crate::observability::metrics;
use crate::retry::RetryPolicy;

pub mod pacer;
pub mod single_flight;

pub use pacer::RequestPacer;
pub use single_flight::SingleFlight;

#[derive(Debug, Clone)]
pub struct EnricherSettings {
    /// Concurrent request streams. One reproduces a plain sequential loop.
    pub workers: usize,
    /// Minimum gap between consecutive requests of one worker.
    pub min_delay: Duration,
    /// Upper bound on a single lookup; expiry counts as a failure.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for EnricherSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            min_delay: Duration::from_millis(crate::constants::DEFAULT_MIN_DELAY_MS),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::none(),
        }
    }
}

/// Counters describing one enrichment call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentStats {
    pub requested: usize,
    pub resolved: usize,
    pub absent: usize,
    pub cache_hits: usize,
    pub outbound_requests: usize,
    /// Absent results by failure kind.
    pub failures: BTreeMap<String, usize>,
}

impl EnrichmentStats {
    fn record_failure(&mut self, failure: &EnrichmentFailure) {
        *self.failures.entry(failure.kind().to_string()).or_insert(0) += 1;
    }

    fn merge(&mut self, other: EnrichmentStats) {
        self.cache_hits += other.cache_hits;
        self.outbound_requests += other.outbound_requests;
        for (kind, count) in other.failures {
            *self.failures.entry(kind).or_insert(0) += count;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnrichmentOutcome {
    /// One entry per distinct requested postcode.
    pub coordinates: BTreeMap<PostcodeKey, Coordinate>,
    pub stats: EnrichmentStats,
}

impl EnrichmentOutcome {
    /// Resolved postcodes in the order given, skipping absent ones and
    /// postcodes that were never requested.
    pub fn enriched_in_order(&self, order: &[PostcodeKey]) -> Vec<EnrichedPostcode> {
        order
            .iter()
            .filter_map(|key| {
                self.coordinates
                    .get(key)
                    .and_then(Coordinate::point)
                    .map(|point| EnrichedPostcode {
                        postcode: key.clone(),
                        point,
                    })
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct GeoEnricher {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn GeocodePort>,
    settings: EnricherSettings,
    cache: SingleFlight<PostcodeKey, Coordinate>,
    // Request stream used by ad-hoc `lookup` calls outside a worker pool.
    shared_pacer: tokio::sync::Mutex<RequestPacer>,
}

impl GeoEnricher {
    pub fn new(client: Arc<dyn GeocodePort>, settings: EnricherSettings) -> Self {
        let shared_pacer = tokio::sync::Mutex::new(RequestPacer::new(settings.min_delay));
        Self {
            inner: Arc::new(Inner {
                client,
                settings,
                cache: SingleFlight::new(),
                shared_pacer,
            }),
        }
    }

    pub fn settings(&self) -> &EnricherSettings {
        &self.inner.settings
    }

    /// Resolves every distinct postcode. The returned mapping does not
    /// depend on request order or on the number of workers.
    #[instrument(skip(self, postcodes))]
    pub async fn enrich<I>(&self, postcodes: I) -> EnrichmentOutcome
    where
        I: IntoIterator<Item = PostcodeKey>,
    {
        let keys: BTreeSet<PostcodeKey> = postcodes.into_iter().collect();
        let requested = keys.len();
        let queue = Arc::new(Mutex::new(keys.iter().cloned().collect::<VecDeque<_>>()));
        let workers = self.inner.settings.workers.max(1).min(requested);

        info!(postcodes = requested, workers, "starting postcode enrichment");
        let started = Instant::now();

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let this = self.clone();
            let queue = queue.clone();
            pool.spawn(async move { this.run_worker(worker, queue).await });
        }

        let mut coordinates = BTreeMap::new();
        let mut stats = EnrichmentStats::default();
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok((found, worker_stats)) => {
                    coordinates.extend(found);
                    stats.merge(worker_stats);
                }
                Err(e) => warn!("enrichment worker aborted: {}", e),
            }
        }
        // Postcodes lost with an aborted worker still get an entry.
        for key in keys {
            coordinates.entry(key).or_insert(Coordinate::Absent);
        }

        stats.requested = requested;
        stats.absent = coordinates.values().filter(|c| c.is_absent()).count();
        stats.resolved = requested - stats.absent;

        info!(
            resolved = stats.resolved,
            absent = stats.absent,
            outbound = stats.outbound_requests,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "postcode enrichment finished"
        );
        EnrichmentOutcome { coordinates, stats }
    }

    /// Resolves one postcode, sharing the run cache with `enrich`. Ad-hoc
    /// lookups share a single paced request stream.
    pub async fn lookup(&self, postcode: &PostcodeKey) -> Coordinate {
        let mut stats = EnrichmentStats::default();
        self.resolve(postcode, None, &mut stats).await
    }

    /// Coordinate already resolved in this run, without any network call.
    pub fn cached(&self, postcode: &PostcodeKey) -> Option<Coordinate> {
        self.inner.cache.peek(postcode)
    }

    async fn run_worker(
        &self,
        worker: usize,
        queue: Arc<Mutex<VecDeque<PostcodeKey>>>,
    ) -> (Vec<(PostcodeKey, Coordinate)>, EnrichmentStats) {
        let mut pacer = RequestPacer::new(self.inner.settings.min_delay);
        let mut stats = EnrichmentStats::default();
        let mut found = Vec::new();
        loop {
            let next = queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(key) = next else { break };
            let coordinate = self.resolve(&key, Some(&mut pacer), &mut stats).await;
            found.push((key, coordinate));
        }
        debug!(worker, handled = found.len(), "enrichment worker drained queue");
        (found, stats)
    }

    async fn resolve(
        &self,
        key: &PostcodeKey,
        pacer: Option<&mut RequestPacer>,
        stats: &mut EnrichmentStats,
    ) -> Coordinate {
        let mut fetched = false;
        let coordinate = {
            let fetched = &mut fetched;
            let stats = &mut *stats;
            self.inner
                .cache
                .get_or_fetch(key, move || async move {
                    *fetched = true;
                    match pacer {
                        Some(pacer) => self.fetch(key, pacer, stats).await,
                        None => {
                            let mut pacer = self.inner.shared_pacer.lock().await;
                            self.fetch(key, &mut pacer, stats).await
                        }
                    }
                })
                .await
        };
        if !fetched {
            stats.cache_hits += 1;
            metrics::enrich::cache_hit();
        }
        coordinate
    }

    async fn fetch(
        &self,
        key: &PostcodeKey,
        pacer: &mut RequestPacer,
        stats: &mut EnrichmentStats,
    ) -> Coordinate {
        let settings = &self.inner.settings;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            pacer.wait().await;
            stats.outbound_requests += 1;

            let started = Instant::now();
            let lookup = self.inner.client.locate(key);
            let result = match tokio::time::timeout(settings.timeout, lookup).await {
                Ok(result) => result,
                Err(_) => Err(EnrichmentFailure::Timeout),
            };
            metrics::enrich::request_duration(started.elapsed().as_secs_f64());

            match result {
                Ok(point) => {
                    metrics::enrich::lookup_resolved();
                    return Coordinate::Present(point);
                }
                Err(failure)
                    if failure.is_transient() && settings.retry.allows_retry_after(attempt) =>
                {
                    debug!(postcode = %key, attempt, error = %failure, "retrying postcode lookup");
                    tokio::time::sleep(settings.retry.backoff(attempt)).await;
                }
                Err(failure) => {
                    warn!(
                        postcode = %key,
                        kind = failure.kind(),
                        error = %failure,
                        "postcode lookup failed"
                    );
                    stats.record_failure(&failure);
                    metrics::enrich::lookup_absent(failure.kind());
                    return Coordinate::Absent;
                }
            }
        }
    }
}
