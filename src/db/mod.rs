mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::conflict::Commitment;
use crate::entities::{Bid, Driver, Job, JobLedger};
use crate::error::Error;

/// The single source of truth for jobs, drivers and bids.
///
/// Every job or bid mutation goes through [`Store::with_ledger`]: the job and
/// all of its bids are loaded under a lock, the closure transitions them, and
/// the result is written back as one unit. If the closure fails nothing is
/// written.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn insert_job(&self, job: &Job) -> Result<(), Error>;

    async fn find_job(&self, id: Uuid) -> Result<Job, Error>;

    /// Jobs that take bids and are not deleted.
    async fn open_jobs(&self) -> Result<Vec<Job>, Error>;

    async fn insert_driver(&self, driver: &Driver) -> Result<(), Error>;

    async fn find_driver(&self, id: Uuid) -> Result<Driver, Error>;

    /// Approved drivers with a base location: the matching candidate pool.
    async fn approved_drivers(&self) -> Result<Vec<Driver>, Error>;

    async fn find_bid(&self, id: Uuid) -> Result<Bid, Error>;

    /// The driver's pending, accepted and confirmed bids with their jobs.
    async fn driver_commitments(&self, driver_id: Uuid) -> Result<Vec<Commitment>, Error>;

    /// Accepted bids whose confirmation window closed at or before `now`.
    async fn lapsed_bids(&self, now: DateTime<Utc>) -> Result<Vec<Bid>, Error>;

    async fn with_ledger<T, F>(&self, job_id: Uuid, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut JobLedger) -> Result<T, Error> + Send,
        T: Send;

    async fn with_driver<T, F>(&self, driver_id: Uuid, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Driver) -> Result<T, Error> + Send,
        T: Send;
}
