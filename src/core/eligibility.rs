use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::age::age_on;
use crate::core::clock::Clock;
use crate::core::distance::{calculate_bounding_box, distance_km};
use crate::core::error::{CoreError, CoreResult};
use crate::core::filters::{build_candidate_query, is_eligible};
use crate::models::User;
use crate::services::store::Store;

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 50;
pub const DEFAULT_NEARBY_RADIUS_KM: u16 = 50;
pub const MAX_NEARBY_RADIUS_KM: u16 = 500;

/// Tunables for the discovery queue
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryPolicy {
    pub default_limit: usize,
    /// Requests above this are clamped, not rejected
    pub max_limit: usize,
    /// Also require the candidate's preferences to accept the requester
    pub reciprocal: bool,
    /// Storage page size as a multiple of the requested limit
    pub prefetch_factor: usize,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
            reciprocal: false,
            prefetch_factor: 5,
        }
    }
}

impl DiscoveryPolicy {
    /// Pull the limits into `1..=MAX_LIMIT` with the default no larger than
    /// the ceiling
    pub fn clamped(self) -> Self {
        let max_limit = self.max_limit.clamp(1, MAX_LIMIT);
        Self {
            default_limit: self.default_limit.clamp(1, max_limit),
            max_limit,
            prefetch_factor: self.prefetch_factor.max(1),
            ..self
        }
    }
}

/// A user surfaced in a discovery queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub user: User,
    pub age: u32,
    pub distance_km: Option<f64>,
}

/// Result of a discovery query
#[derive(Debug)]
pub struct DiscoveryResult {
    pub candidates: Vec<Candidate>,
    /// How many prefiltered rows were examined
    pub scanned: usize,
}

/// Computes who appears in whose discovery queue.
///
/// # Pipeline Stages
/// 1. Storage prefilter: self, prior decisions, blocks, moderation flag,
///    gender, birth-date window and bounding box
/// 2. Exact filter: whole-year age on the clock's date, great-circle distance,
///    optional reciprocal preferences
/// 3. Recency order (done by storage) and truncation to the limit
pub struct EligibilityFilter<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    policy: DiscoveryPolicy,
}

impl<S: Store> EligibilityFilter<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, policy: DiscoveryPolicy) -> Self {
        Self { store, clock, policy: policy.clamped() }
    }

    pub fn policy(&self) -> DiscoveryPolicy {
        self.policy
    }

    /// Apply the default and the hard ceiling to a requested limit
    pub fn resolve_limit(&self, requested: Option<usize>) -> CoreResult<usize> {
        match requested {
            None => Ok(self.policy.default_limit),
            Some(0) => Err(CoreError::invalid("limit must be at least 1")),
            Some(n) => Ok(n.min(self.policy.max_limit)),
        }
    }

    /// Discovery queue for `requester_id`, most recently active first.
    ///
    /// Pure read: calling again with no intervening writes returns the same
    /// sequence.
    pub async fn get_candidates(
        &self,
        requester_id: Uuid,
        limit: Option<usize>,
    ) -> CoreResult<DiscoveryResult> {
        let limit = self.resolve_limit(limit)?;
        let requester = self
            .store
            .get_user(requester_id)
            .await?
            .ok_or_else(|| CoreError::user_not_found(requester_id))?;

        let today = self.clock.now().date_naive();
        let query = build_candidate_query(&requester, today);
        let page_size = limit * self.policy.prefetch_factor;

        let mut candidates = Vec::with_capacity(limit);
        let mut offset = 0;
        let mut scanned = 0;

        loop {
            let page = self.store.candidates(&query, offset, page_size).await?;
            let fetched = page.len();
            scanned += fetched;
            offset += fetched;

            for user in page {
                if !is_eligible(&requester, &user, today, self.policy.reciprocal) {
                    continue;
                }
                let distance_km = requester
                    .location
                    .zip(user.location)
                    .map(|(from, to)| distance_km(from, to));
                candidates.push(Candidate {
                    age: age_on(user.date_of_birth, today),
                    distance_km,
                    user,
                });
                if candidates.len() >= limit {
                    break;
                }
            }

            if candidates.len() >= limit || fetched < page_size {
                break;
            }
        }

        tracing::debug!(
            "Discovery for {}: {} candidates from {} scanned",
            requester_id,
            candidates.len(),
            scanned
        );

        Ok(DiscoveryResult { candidates, scanned })
    }

    /// Users within `radius_km` of the requester, nearest first.
    ///
    /// Bounding-box prefilter in storage, exact Haversine here. A requester
    /// without a location gets an empty list.
    pub async fn nearby(&self, requester_id: Uuid, radius_km: Option<u16>) -> CoreResult<Vec<Candidate>> {
        let radius = radius_km.unwrap_or(DEFAULT_NEARBY_RADIUS_KM);
        if radius == 0 || radius > MAX_NEARBY_RADIUS_KM {
            return Err(CoreError::invalid(format!(
                "radius must be between 1 and {} km",
                MAX_NEARBY_RADIUS_KM
            )));
        }

        let requester = self
            .store
            .get_user(requester_id)
            .await?
            .ok_or_else(|| CoreError::user_not_found(requester_id))?;

        let Some(origin) = requester.location else {
            return Ok(Vec::new());
        };

        let today = self.clock.now().date_naive();
        let bbox = calculate_bounding_box(origin.latitude, origin.longitude, f64::from(radius));

        let mut found: Vec<Candidate> = self
            .store
            .within_box(requester_id, bbox)
            .await?
            .into_iter()
            .filter_map(|user| {
                let km = distance_km(origin, user.location?);
                (km <= f64::from(radius)).then(|| Candidate {
                    age: age_on(user.date_of_birth, today),
                    distance_km: Some(km),
                    user,
                })
            })
            .collect();

        found.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.user.id.cmp(&b.user.id))
        });

        Ok(found)
    }
}
