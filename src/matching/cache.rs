use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;
use uuid::Uuid;

use crate::config::MatchingConfig;
use crate::entities::{Driver, Job};
use crate::matching::MatchResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchScope {
    /// Ranked drivers for one job.
    Job(Uuid),
    /// Ranked open jobs for one driver.
    Driver(Uuid),
}

/// Cache key: the scope plus a fingerprint of the state that feeds the
/// ranking, so an edit that slips past invalidation still misses.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub scope: MatchScope,
    pub fingerprint: u64,
}

impl MatchKey {
    pub fn for_job(job: &Job) -> Self {
        let mut hasher = DefaultHasher::new();
        job.id.hash(&mut hasher);
        job.requirements.hash(&mut hasher);
        job.wheelchair_users.hash(&mut hasher);
        job.status.name().hash(&mut hasher);
        job.pickup.coordinates.lat.to_bits().hash(&mut hasher);
        job.pickup.coordinates.lng.to_bits().hash(&mut hasher);

        Self {
            scope: MatchScope::Job(job.id),
            fingerprint: hasher.finish(),
        }
    }

    pub fn for_driver(driver: &Driver) -> Self {
        let mut hasher = DefaultHasher::new();
        driver.id.hash(&mut hasher);
        driver.capabilities.hash(&mut hasher);
        driver.approved.hash(&mut hasher);
        driver.wheelchair_capacity.hash(&mut hasher);
        driver.service_radius_miles.to_bits().hash(&mut hasher);
        driver.organizations.hash(&mut hasher);
        if let Some(base) = &driver.base {
            base.coordinates.lat.to_bits().hash(&mut hasher);
            base.coordinates.lng.to_bits().hash(&mut hasher);
        }

        Self {
            scope: MatchScope::Driver(driver.id),
            fingerprint: hasher.finish(),
        }
    }

    /// Whether a change to `job_id` can alter this entry. Driver-scoped
    /// entries rank every open job, so any job change touches them.
    fn touches_job(&self, job_id: Uuid) -> bool {
        match self.scope {
            MatchScope::Job(id) => id == job_id,
            MatchScope::Driver(_) => true,
        }
    }
}

pub type Matches = Arc<Vec<MatchResult>>;

/// Memoized matching output. Never authoritative: callers invalidate after
/// every store mutation that could change a ranking, and over-invalidate
/// when unsure.
pub struct MatchCache {
    entries: Cache<MatchKey, Matches>,
    epoch: AtomicU64,
}

impl MatchCache {
    pub fn new(config: &MatchingConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(config.cache_ttl)
            .support_invalidation_closures()
            .build();

        Self {
            entries,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &MatchKey) -> Option<Matches> {
        self.entries.get(key)
    }

    /// Snapshot to take before reading the store for a computation that will
    /// be passed to [`MatchCache::insert`].
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Stores a computed ranking unless an invalidation ran since `epoch`.
    /// Returns whether the entry was kept.
    pub fn insert(&self, key: MatchKey, matches: Matches, epoch: u64) -> bool {
        if self.epoch() != epoch {
            return false;
        }

        self.entries.insert(key.clone(), matches);

        // an invalidation that began after the check above may have missed
        // the entry just written
        if self.epoch() != epoch {
            self.entries.invalidate(&key);
            return false;
        }

        true
    }

    /// Drops every entry that ranks `job_id`, including all driver-scoped
    /// entries.
    #[tracing::instrument(skip(self))]
    pub fn invalidate(&self, job_id: Uuid) {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Err(err) = self
            .entries
            .invalidate_entries_if(move |key, _| key.touches_job(job_id))
        {
            tracing::warn!(?err, "predicate invalidation failed, clearing match cache");
            self.entries.invalidate_all();
        }
    }

    /// A driver profile change can move that driver into or out of any
    /// job's candidate list, so everything goes.
    #[tracing::instrument(skip(self))]
    pub fn invalidate_driver(&self, driver_id: Uuid) {
        self.invalidate_all();
    }

    pub fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.invalidate_all();
    }
}
