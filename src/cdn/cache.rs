//! Time-bounded cache of the CDN's published IPv4 ranges.
//!
//! Serves the last good list for [`DEFAULT_RANGES_TTL`], refreshes on the
//! first call after expiry, and keeps serving the stale list if a refresh
//! fails. After a failure the stale list is served without retrying for
//! [`DEFAULT_RETRY_BACKOFF`].

use crate::cdn::classifier::is_in_ranges;
use crate::cdn::source::RangeSource;
use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use parking_lot::{Mutex, RwLock};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default freshness window for the range list.
pub const DEFAULT_RANGES_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Default quiet period after a failed fetch.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Shared, cheaply clonable range list.
pub type Ranges = Arc<[Ipv4Net]>;

#[derive(Debug)]
struct Snapshot {
    ranges: Ranges,
    fetched_at: Option<Instant>,
    failed_at: Option<Instant>,
    /// Fetch attempts so far, successful or not.
    generation: u64,
}

impl Snapshot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        !self.ranges.is_empty() && self.fetched_at.is_some_and(|at| at.elapsed() < ttl)
    }

    fn in_backoff(&self, backoff: Duration) -> bool {
        self.failed_at.is_some_and(|at| at.elapsed() < backoff)
    }
}

/// What a caller found before deciding whether to fetch.
enum Lookup {
    Hit(Ranges),
    Stale(Ranges),
    Miss { generation: u64 },
}

/// Cache statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Calls answered from the cached list.
    pub hits: u64,
    /// Calls that found the list expired or empty.
    pub misses: u64,
    /// Successful fetches.
    pub refreshes: u64,
    /// Failed fetches (stale list served instead).
    pub failures: u64,
    /// Wall-clock time of the last successful fetch.
    pub last_refresh: Option<DateTime<Utc>>,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// CDN range cache with serve-stale-on-error refresh.
///
/// Reads take a short read lock on the current snapshot. A refresh swaps in
/// a whole new snapshot under the write lock, so readers see either the old
/// list or the new one. Refreshes are single-flight: callers that miss
/// queue on `refresh`; if an attempt completed while they waited they take
/// its result instead of fetching again, whether it succeeded or not.
pub struct CidrRangeCache {
    source: Arc<dyn RangeSource>,
    ttl: Duration,
    retry_backoff: Duration,
    snapshot: RwLock<Snapshot>,
    refresh: tokio::sync::Mutex<()>,
    stats: Mutex<CacheStats>,
}

impl CidrRangeCache {
    /// Create a cache over `source` with the default 6 hour TTL.
    #[must_use]
    pub fn new(source: Arc<dyn RangeSource>) -> Self {
        Self::with_ttl(source, DEFAULT_RANGES_TTL)
    }

    /// Create a cache with a custom TTL.
    #[must_use]
    pub fn with_ttl(source: Arc<dyn RangeSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            snapshot: RwLock::new(Snapshot {
                ranges: Arc::from(Vec::new()),
                fetched_at: None,
                failed_at: None,
                generation: 0,
            }),
            refresh: tokio::sync::Mutex::new(()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Set the quiet period after a failed fetch.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Current range list, refreshing it first if it is stale or empty.
    ///
    /// Never fails. If the refresh fails the previous list is returned,
    /// which is empty only if no fetch has ever succeeded.
    pub async fn get_ranges(&self) -> Ranges {
        let generation = match self.lookup() {
            Lookup::Hit(ranges) => {
                self.stats.lock().hits += 1;
                return ranges;
            }
            Lookup::Stale(ranges) => {
                self.stats.lock().misses += 1;
                debug!(
                    "CDN range refresh backing off, serving {} cached ranges",
                    ranges.len()
                );
                return ranges;
            }
            Lookup::Miss { generation } => generation,
        };
        self.stats.lock().misses += 1;

        let _guard = self.refresh.lock().await;

        // An attempt finished while we waited: take its outcome.
        if let Some(ranges) = self.settled_since(generation) {
            return ranges;
        }

        let result = self.source.fetch().await;

        let mut snapshot = self.snapshot.write();
        snapshot.generation += 1;
        match result {
            Ok(fetched) => {
                let ranges: Ranges = Arc::from(fetched);
                snapshot.ranges = Arc::clone(&ranges);
                snapshot.fetched_at = Some(Instant::now());
                snapshot.failed_at = None;
                drop(snapshot);

                info!("Fetched {} CDN ranges", ranges.len());
                let mut stats = self.stats.lock();
                stats.refreshes += 1;
                stats.last_refresh = Some(Utc::now());
                ranges
            }
            Err(e) => {
                snapshot.failed_at = Some(Instant::now());
                let stale = Arc::clone(&snapshot.ranges);
                drop(snapshot);

                warn!(
                    "CDN range refresh failed, serving {} cached ranges for {:?}: {}",
                    stale.len(),
                    self.retry_backoff,
                    e
                );
                self.stats.lock().failures += 1;
                stale
            }
        }
    }

    /// Returns `true` if `ip` falls in the CDN's published ranges.
    pub async fn contains(&self, ip: Ipv4Addr) -> bool {
        let ranges = self.get_ranges().await;
        let found = is_in_ranges(ip, &ranges);
        debug!("{} in CDN ranges: {}", ip, found);
        found
    }

    fn lookup(&self) -> Lookup {
        let snapshot = self.snapshot.read();
        if snapshot.is_fresh(self.ttl) {
            Lookup::Hit(Arc::clone(&snapshot.ranges))
        } else if snapshot.in_backoff(self.retry_backoff) {
            Lookup::Stale(Arc::clone(&snapshot.ranges))
        } else {
            Lookup::Miss {
                generation: snapshot.generation,
            }
        }
    }

    fn settled_since(&self, generation: u64) -> Option<Ranges> {
        let snapshot = self.snapshot.read();
        (snapshot.generation != generation || snapshot.is_fresh(self.ttl))
            .then(|| Arc::clone(&snapshot.ranges))
    }

    /// Configured time-to-live.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of ranges currently held (fresh or stale).
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.read().ranges.len()
    }

    /// Check if no ranges are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.read().ranges.is_empty()
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }
}
