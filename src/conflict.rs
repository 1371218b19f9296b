use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::{BiddingConfig, EstimatorConfig};
use crate::entities::{Bid, Driver, Job};
use crate::matching::distance::distance_miles;

/// One of a driver's bids together with the job it was placed on.
#[derive(Clone, Debug)]
pub struct Commitment {
    pub bid: Bid,
    pub job: Job,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub bid_id: Uuid,
    pub job_id: Uuid,
    pub bid_status: String,
    pub pickup_at: DateTime<Utc>,
    pub minutes_apart: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCapacity {
    pub date: NaiveDate,
    pub hours_used: f64,
    pub hours_remaining: f64,
    pub ceiling_hours: f64,
    pub exceeded: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    /// Advisory: the caller decides whether overlapping bids block anything.
    pub conflicts: Vec<Conflict>,
    pub capacity: DailyCapacity,
    pub job_hours: f64,
    /// Whether the job still fits under the ceiling on top of `capacity`.
    pub fits: bool,
}

pub struct ConflictDetector {
    window: Duration,
    default_ceiling_hours: f64,
    estimator: EstimatorConfig,
}

impl ConflictDetector {
    pub fn new(config: &BiddingConfig) -> Self {
        Self {
            window: config.conflict_window,
            default_ceiling_hours: config.daily_capacity_hours,
            estimator: config.estimator.clone(),
        }
    }

    /// Estimated hours a job occupies a driver.
    ///
    /// Straight-line approximation: base time, a buffer per wheelchair user,
    /// a buffer for large parties, and travel at a fixed average speed over
    /// the pickup-to-dropoff great-circle distance (a fixed default when no
    /// dropoff is known). A return leg doubles the total.
    pub fn estimate_hours(&self, job: &Job) -> f64 {
        let e = &self.estimator;

        let travel_minutes = match &job.dropoff {
            Some(dropoff) if e.average_speed_mph > 0.0 => {
                distance_miles(job.pickup.coordinates, dropoff.coordinates) / e.average_speed_mph * 60.0
            }
            _ => e.default_travel_minutes,
        };

        let mut minutes = e.base_minutes
            + e.per_wheelchair_minutes * job.wheelchair_users as f64
            + travel_minutes;

        if job.passengers > e.large_party_threshold {
            minutes += e.large_party_minutes;
        }

        if job.return_at.is_some() {
            minutes *= 2.0;
        }

        minutes / 60.0
    }

    /// Bids still holding the driver's time whose pickup falls within the
    /// window around `pickup_at`. Bids on `exclude_job` are ignored.
    pub fn conflicts(
        &self,
        pickup_at: DateTime<Utc>,
        commitments: &[Commitment],
        exclude_job: Option<Uuid>,
    ) -> Vec<Conflict> {
        let mut conflicts: Vec<Conflict> = commitments
            .iter()
            .filter(|c| c.bid.holds_time() && Some(c.job.id) != exclude_job)
            .filter_map(|c| {
                let apart = (c.job.pickup_at - pickup_at).abs();
                (apart <= self.window).then(|| Conflict {
                    bid_id: c.bid.id,
                    job_id: c.job.id,
                    bid_status: c.bid.status.name(),
                    pickup_at: c.job.pickup_at,
                    minutes_apart: apart.num_minutes(),
                })
            })
            .collect();

        conflicts.sort_by_key(|c| c.minutes_apart);
        conflicts
    }

    /// Hours already committed (accepted or confirmed) on `date`.
    pub fn daily_capacity(
        &self,
        driver: &Driver,
        date: NaiveDate,
        commitments: &[Commitment],
        exclude_job: Option<Uuid>,
    ) -> DailyCapacity {
        let ceiling_hours = driver.capacity_ceiling(self.default_ceiling_hours);

        let hours_used: f64 = commitments
            .iter()
            .filter(|c| c.bid.is_committed() && Some(c.job.id) != exclude_job)
            .filter(|c| c.job.pickup_at.date_naive() == date)
            .map(|c| self.estimate_hours(&c.job))
            .sum();

        DailyCapacity {
            date,
            hours_used,
            hours_remaining: (ceiling_hours - hours_used).max(0.0),
            ceiling_hours,
            exceeded: hours_used > ceiling_hours,
        }
    }

    #[tracing::instrument(skip_all, fields(driver_id = %driver.id, job_id = %job.id))]
    pub fn check(&self, driver: &Driver, job: &Job, commitments: &[Commitment]) -> ConflictReport {
        let conflicts = self.conflicts(job.pickup_at, commitments, Some(job.id));
        let capacity = self.daily_capacity(driver, job.pickup_at.date_naive(), commitments, Some(job.id));
        let job_hours = self.estimate_hours(job);
        let fits = capacity.hours_used + job_hours <= capacity.ceiling_hours;

        if !conflicts.is_empty() {
            tracing::info!(conflicts = conflicts.len(), "driver has overlapping bids");
        }

        ConflictReport {
            conflicts,
            capacity,
            job_hours,
            fits,
        }
    }
}
