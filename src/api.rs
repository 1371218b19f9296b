use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::User;
use crate::conflict::ConflictReport;
use crate::entities::{Acceptance, Bid, Driver, DriverProfile, Job, JobDraft, RequirementSet, Withdrawal};
use crate::error::Error;
use crate::matching::MatchResult;

/// A freshly placed bid with the advisory conflict report computed for it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidReceipt {
    pub bid: Bid,
    pub conflicts: ConflictReport,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepOutcome {
    pub processed_count: usize,
    pub total_found: usize,
}

#[async_trait]
pub trait JobAPI {
    async fn create_job(&self, user: User, draft: JobDraft) -> Result<Job, Error>;

    async fn find_job(&self, user: User, id: Uuid) -> Result<Job, Error>;

    async fn update_job_requirements(
        &self,
        user: User,
        id: Uuid,
        requirements: RequirementSet,
    ) -> Result<Job, Error>;

    async fn cancel_job(&self, user: User, id: Uuid) -> Result<Job, Error>;

    async fn start_job(&self, user: User, id: Uuid) -> Result<Job, Error>;

    async fn complete_job(&self, user: User, id: Uuid) -> Result<Job, Error>;

    async fn delete_job(&self, user: User, id: Uuid) -> Result<Job, Error>;
}

#[async_trait]
pub trait DriverAPI {
    async fn create_driver(&self, user: User, profile: DriverProfile) -> Result<Driver, Error>;

    async fn find_driver(&self, user: User, id: Uuid) -> Result<Driver, Error>;

    async fn update_driver(&self, user: User, id: Uuid, profile: DriverProfile) -> Result<Driver, Error>;

    async fn approve_driver(&self, user: User, id: Uuid, approved: bool) -> Result<Driver, Error>;
}

#[async_trait]
pub trait BidAPI {
    async fn create_bid(&self, user: User, job_id: Uuid, amount: i64) -> Result<BidReceipt, Error>;

    async fn find_bid(&self, user: User, id: Uuid) -> Result<Bid, Error>;

    async fn accept_bid(&self, user: User, id: Uuid) -> Result<Acceptance, Error>;

    async fn confirm_bid(&self, user: User, id: Uuid) -> Result<Bid, Error>;

    async fn withdraw_bid(&self, user: User, id: Uuid) -> Result<Withdrawal, Error>;

    async fn preview_conflicts(
        &self,
        user: User,
        driver_id: Uuid,
        job_id: Uuid,
    ) -> Result<ConflictReport, Error>;
}

#[async_trait]
pub trait MatchAPI {
    async fn find_drivers_for_job(&self, user: User, job_id: Uuid) -> Result<Vec<MatchResult>, Error>;

    async fn find_jobs_for_driver(&self, user: User, driver_id: Uuid) -> Result<Vec<MatchResult>, Error>;
}

#[async_trait]
pub trait SweepAPI {
    async fn trigger_sweep(&self, user: User) -> Result<SweepOutcome, Error>;
}

pub trait API: JobAPI + DriverAPI + BidAPI + MatchAPI + SweepAPI {}

pub type DynAPI = Arc<dyn API + Send + Sync>;
