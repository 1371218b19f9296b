use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MatchingConfig;
use crate::entities::{Driver, Job, Requirement};
use crate::matching::accessibility::{hard_exclusion, score};
use crate::matching::distance::{distance_miles, BoundingBox};
use crate::matching::Exclusion;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub driver_id: Uuid,
    pub job_id: Uuid,
    pub distance: f64,
    pub accessibility_score: f64,
    pub missing_requirements: Vec<Requirement>,
    pub overall_score: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct MatchWeights {
    distance: f64,
    compatibility: f64,
}

impl MatchWeights {
    /// Normalizes the weights so they sum to one. Falls back to equal
    /// weighting when both are zero or invalid.
    pub fn new(distance: f64, compatibility: f64) -> Self {
        let distance = if distance.is_finite() { distance.max(0.0) } else { 0.0 };
        let compatibility = if compatibility.is_finite() { compatibility.max(0.0) } else { 0.0 };
        let total = distance + compatibility;

        if total <= 0.0 {
            return Self {
                distance: 0.5,
                compatibility: 0.5,
            };
        }

        Self {
            distance: distance / total,
            compatibility: compatibility / total,
        }
    }
}

impl From<&MatchingConfig> for MatchWeights {
    fn from(config: &MatchingConfig) -> Self {
        Self::new(config.distance_weight, config.compatibility_weight)
    }
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self::from(&MatchingConfig::default())
    }
}

/// Scores a single (driver, job) pair, or reports why the driver is not a
/// candidate at all.
pub fn evaluate(job: &Job, driver: &Driver, weights: MatchWeights) -> Result<MatchResult, Exclusion> {
    if let Some(exclusion) = hard_exclusion(job, driver) {
        return Err(exclusion);
    }

    let base = driver.base.as_ref().ok_or(Exclusion::NoBaseLocation)?;
    let radius = driver.service_radius_miles;

    if !BoundingBox::around(base.coordinates, radius).contains(job.pickup.coordinates) {
        return Err(Exclusion::OutsideRadius { distance: None, radius });
    }

    let distance = distance_miles(base.coordinates, job.pickup.coordinates);
    if distance > radius {
        return Err(Exclusion::OutsideRadius {
            distance: Some(distance),
            radius,
        });
    }

    let compatibility = score(&job.requirements, &driver.capabilities);
    let proximity = if radius > 0.0 {
        (1.0 - distance / radius).clamp(0.0, 1.0)
    } else {
        1.0
    };

    Ok(MatchResult {
        driver_id: driver.id,
        job_id: job.id,
        distance,
        accessibility_score: compatibility.score,
        missing_requirements: compatibility.missing,
        overall_score: weights.distance * proximity + weights.compatibility * compatibility.score,
    })
}

/// Ranks candidate drivers for one job. Excluded drivers are omitted.
#[tracing::instrument(skip_all, fields(job_id = %job.id, candidates = drivers.len()))]
pub fn rank_drivers(job: &Job, drivers: &[Driver], weights: MatchWeights) -> Vec<MatchResult> {
    let mut results: Vec<MatchResult> = drivers
        .iter()
        .filter_map(|driver| match evaluate(job, driver, weights) {
            Ok(result) => Some(result),
            Err(exclusion) => {
                tracing::debug!(driver_id = %driver.id, ?exclusion, "driver excluded");
                None
            }
        })
        .collect();

    sort_ranked(&mut results);
    results
}

/// Ranks candidate jobs for one driver. Jobs the driver cannot see or bid on
/// are omitted along with jobs the driver is excluded from.
#[tracing::instrument(skip_all, fields(driver_id = %driver.id, candidates = jobs.len()))]
pub fn rank_jobs(driver: &Driver, jobs: &[Job], weights: MatchWeights) -> Vec<MatchResult> {
    let mut results: Vec<MatchResult> = jobs
        .iter()
        .filter(|job| job.accepts_bids() && job.is_visible_to(&driver.organizations))
        .filter_map(|job| evaluate(job, driver, weights).ok())
        .collect();

    sort_ranked(&mut results);
    results
}

/// Overall score descending, then distance ascending. Remaining ties fall
/// back to ids so equal inputs always rank identically.
fn sort_ranked(results: &mut [MatchResult]) {
    results.sort_by(|a, b| {
        b.overall_score
            .total_cmp(&a.overall_score)
            .then_with(|| a.distance.total_cmp(&b.distance))
            .then_with(|| a.driver_id.cmp(&b.driver_id))
            .then_with(|| a.job_id.cmp(&b.job_id))
    });
}
