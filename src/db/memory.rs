use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::Store;
use crate::conflict::Commitment;
use crate::entities::{Bid, Driver, Job, JobLedger};
use crate::error::Error;

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, Job>,
    drivers: HashMap<Uuid, Driver>,
    bids: HashMap<Uuid, Bid>,
}

impl State {
    fn bids_for_job(&self, job_id: Uuid) -> Vec<Bid> {
        let mut bids: Vec<Bid> = self
            .bids
            .values()
            .filter(|bid| bid.job_id == job_id)
            .cloned()
            .collect();
        bids.sort_by_key(|bid| (bid.created_at, bid.id));
        bids
    }
}

/// In-process store. One lock guards all state, which makes every ledger
/// transition serializable. Used by tests and single-node local runs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_job(&self, job: &Job) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&job.id) {
            return Err(Error::invalid_input_error("job already exists"));
        }
        state.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_job(&self, id: Uuid) -> Result<Job, Error> {
        let state = self.state.lock().await;
        state.jobs.get(&id).cloned().ok_or_else(Error::job_not_found_error)
    }

    async fn open_jobs(&self) -> Result<Vec<Job>, Error> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .filter(|job| job.accepts_bids())
            .cloned()
            .collect())
    }

    async fn insert_driver(&self, driver: &Driver) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if state.drivers.contains_key(&driver.id) {
            return Err(Error::invalid_input_error("driver already exists"));
        }
        state.drivers.insert(driver.id, driver.clone());
        Ok(())
    }

    async fn find_driver(&self, id: Uuid) -> Result<Driver, Error> {
        let state = self.state.lock().await;
        state
            .drivers
            .get(&id)
            .cloned()
            .ok_or_else(Error::driver_not_found_error)
    }

    async fn approved_drivers(&self) -> Result<Vec<Driver>, Error> {
        let state = self.state.lock().await;
        Ok(state
            .drivers
            .values()
            .filter(|driver| driver.approved && driver.base.is_some())
            .cloned()
            .collect())
    }

    async fn find_bid(&self, id: Uuid) -> Result<Bid, Error> {
        let state = self.state.lock().await;
        state.bids.get(&id).cloned().ok_or_else(Error::bid_not_found_error)
    }

    async fn driver_commitments(&self, driver_id: Uuid) -> Result<Vec<Commitment>, Error> {
        let state = self.state.lock().await;
        Ok(state
            .bids
            .values()
            .filter(|bid| bid.driver_id == driver_id && bid.holds_time())
            .filter_map(|bid| {
                let job = state.jobs.get(&bid.job_id)?;
                (!job.is_deleted()).then(|| Commitment {
                    bid: bid.clone(),
                    job: job.clone(),
                })
            })
            .collect())
    }

    async fn lapsed_bids(&self, now: DateTime<Utc>) -> Result<Vec<Bid>, Error> {
        let state = self.state.lock().await;
        let mut bids: Vec<Bid> = state
            .bids
            .values()
            .filter(|bid| bid.is_lapsed(now))
            .cloned()
            .collect();
        bids.sort_by_key(|bid| bid.expires_at());
        Ok(bids)
    }

    async fn with_ledger<T, F>(&self, job_id: Uuid, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut JobLedger) -> Result<T, Error> + Send,
        T: Send,
    {
        let mut state = self.state.lock().await;

        let job = state
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or_else(Error::job_not_found_error)?;
        let mut ledger = JobLedger::new(job, state.bids_for_job(job_id));

        let result = f(&mut ledger)?;

        state.jobs.insert(job_id, ledger.job);
        for bid in ledger.bids {
            state.bids.insert(bid.id, bid);
        }

        Ok(result)
    }

    async fn with_driver<T, F>(&self, driver_id: Uuid, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Driver) -> Result<T, Error> + Send,
        T: Send,
    {
        let mut state = self.state.lock().await;

        let mut driver = state
            .drivers
            .get(&driver_id)
            .cloned()
            .ok_or_else(Error::driver_not_found_error)?;

        let result = f(&mut driver)?;
        state.drivers.insert(driver_id, driver);

        Ok(result)
    }
}
