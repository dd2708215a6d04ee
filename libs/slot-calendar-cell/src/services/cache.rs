use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{DateAvailabilityStatus, DateRange};

pub type MonthProjection = BTreeMap<NaiveDate, DateAvailabilityStatus>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectionKey {
    pub facility_id: String,
    pub doctor_id: Option<String>,
    pub range: DateRange,
}

impl ProjectionKey {
    pub fn new(facility_id: &str, doctor_id: Option<&str>, range: DateRange) -> Self {
        Self {
            facility_id: facility_id.to_string(),
            doctor_id: doctor_id.map(str::to_string),
            range,
        }
    }
}

struct CachedProjection {
    statuses: MonthProjection,
    stored_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<ProjectionKey, CachedProjection>,
    // Bumped on every invalidation of a facility.
    generations: HashMap<String, u64>,
}

/// Short-lived memo of calendar colourings. Every write for a facility
/// drops that facility's entries and bumps its generation, so a projection
/// computed before the write can no longer be stored.
pub struct ProjectionCache {
    state: RwLock<CacheState>,
    ttl: Duration,
}

impl ProjectionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            ttl,
        }
    }

    pub async fn get(&self, key: &ProjectionKey) -> Option<MonthProjection> {
        if self.ttl.is_zero() {
            return None;
        }

        let mut state = self.state.write().await;
        match state.entries.get(key) {
            Some(cached) if cached.stored_at.elapsed() <= self.ttl => {
                debug!("Projection cache hit for facility {}", key.facility_id);
                Some(cached.statuses.clone())
            }
            Some(_) => {
                state.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Current invalidation generation of `facility_id`. Read it before
    /// fetching the inputs of a projection and hand it back to `put`.
    pub async fn generation(&self, facility_id: &str) -> u64 {
        self.state
            .read()
            .await
            .generations
            .get(facility_id)
            .copied()
            .unwrap_or(0)
    }

    /// Stores `statuses` unless the facility was invalidated after
    /// `generation` was read. Returns whether the entry was stored.
    pub async fn put(&self, key: ProjectionKey, statuses: MonthProjection, generation: u64) -> bool {
        if self.ttl.is_zero() {
            return false;
        }

        let mut state = self.state.write().await;
        let current = state.generations.get(&key.facility_id).copied().unwrap_or(0);
        if current != generation {
            debug!(
                "Dropping projection for facility {} computed before a write",
                key.facility_id
            );
            return false;
        }

        state.entries.insert(
            key,
            CachedProjection {
                statuses,
                stored_at: Instant::now(),
            },
        );
        true
    }

    pub async fn invalidate_facility(&self, facility_id: &str) {
        let mut state = self.state.write().await;
        *state.generations.entry(facility_id.to_string()).or_insert(0) += 1;

        let before = state.entries.len();
        state.entries.retain(|key, _| key.facility_id != facility_id);
        debug!(
            "Invalidated {} cached projections for facility {}",
            before - state.entries.len(),
            facility_id
        );
    }
}
