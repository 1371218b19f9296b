use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::{Bid, Job};
use crate::error::Error;

/// A job together with every bid placed on it. The store loads and writes a
/// ledger as one transactional unit, so every transition below is atomic
/// with respect to other transitions on the same job.
#[derive(Clone, Debug)]
pub struct JobLedger {
    pub job: Job,
    pub bids: Vec<Bid>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Acceptance {
    pub accepted: Bid,
    pub declined: Vec<Bid>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Withdrawal {
    pub bid: Bid,
    pub job_reopened: bool,
}

#[derive(Clone, Debug)]
pub struct Expiry {
    pub bid: Bid,
    pub declined_driver_ids: Vec<Uuid>,
}

impl JobLedger {
    pub fn new(job: Job, bids: Vec<Bid>) -> Self {
        Self { job, bids }
    }

    pub fn bid(&self, bid_id: Uuid) -> Result<&Bid, Error> {
        self.bids
            .iter()
            .find(|bid| bid.id == bid_id)
            .ok_or_else(Error::bid_not_found_error)
    }

    fn bid_mut(&mut self, bid_id: Uuid) -> Result<&mut Bid, Error> {
        self.bids
            .iter_mut()
            .find(|bid| bid.id == bid_id)
            .ok_or_else(Error::bid_not_found_error)
    }

    pub fn committed_bid(&self) -> Option<&Bid> {
        self.bids.iter().find(|bid| bid.is_committed())
    }

    #[tracing::instrument(skip(self), fields(job_id = %self.job.id))]
    pub fn place_bid(&mut self, driver_id: Uuid, amount: i64, now: DateTime<Utc>) -> Result<Bid, Error> {
        let bid = Bid::new(self.job.id, driver_id, amount, now)?;

        if !self.job.accepts_bids() {
            return Err(Error::job_not_open_error());
        }

        if self
            .bids
            .iter()
            .any(|existing| existing.driver_id == driver_id && existing.is_open())
        {
            return Err(Error::duplicate_bid_error());
        }

        self.bids.push(bid.clone());
        Ok(bid)
    }

    /// Accepts one pending bid, declines every other pending bid and moves the
    /// job to `BidAccepted`. Leaves the ledger untouched on error.
    #[tracing::instrument(skip(self), fields(job_id = %self.job.id))]
    pub fn accept_bid(
        &mut self,
        bid_id: Uuid,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Acceptance, Error> {
        if !self.bid(bid_id)?.is_pending() {
            return Err(Error::already_decided_error());
        }

        if self.job.accepted_bid_id.is_some() || self.committed_bid().is_some() {
            return Err(Error::already_decided_error());
        }

        let mut job = self.job.clone();
        job.mark_bid_accepted(bid_id)?;

        let mut bids = self.bids.clone();
        let mut accepted = None;
        let mut declined = vec![];

        for bid in bids.iter_mut() {
            if bid.id == bid_id {
                bid.accept(now, window)?;
                accepted = Some(bid.clone());
            } else if bid.is_pending() {
                bid.decline(now)?;
                declined.push(bid.clone());
            }
        }

        let accepted = accepted.ok_or_else(Error::bid_not_found_error)?;

        self.job = job;
        self.bids = bids;

        tracing::info!(
            bid_id = %accepted.id,
            declined = declined.len(),
            "bid accepted"
        );

        Ok(Acceptance { accepted, declined })
    }

    #[tracing::instrument(skip(self), fields(job_id = %self.job.id))]
    pub fn confirm_bid(&mut self, bid_id: Uuid, now: DateTime<Utc>) -> Result<Bid, Error> {
        let mut bid = self.bid(bid_id)?.clone();
        bid.confirm(now)?;

        let mut job = self.job.clone();
        job.confirm(bid_id)?;

        self.job = job;
        *self.bid_mut(bid_id)? = bid.clone();

        Ok(bid)
    }

    #[tracing::instrument(skip(self), fields(job_id = %self.job.id))]
    pub fn withdraw_bid(&mut self, bid_id: Uuid, now: DateTime<Utc>) -> Result<Withdrawal, Error> {
        let mut bid = self.bid(bid_id)?.clone();
        let was_accepted = bid.withdraw(now)?;

        let mut job = self.job.clone();
        if was_accepted {
            job.reopen()?;
        }

        self.job = job;
        *self.bid_mut(bid_id)? = bid.clone();

        Ok(Withdrawal {
            bid,
            job_reopened: was_accepted,
        })
    }

    /// Expires an accepted bid whose confirmation window lapsed and reopens
    /// the job. Returns `None` when the bid no longer qualifies, so repeated
    /// sweeps are harmless.
    #[tracing::instrument(skip(self), fields(job_id = %self.job.id))]
    pub fn expire_bid(&mut self, bid_id: Uuid, now: DateTime<Utc>) -> Result<Option<Expiry>, Error> {
        let mut bid = self.bid(bid_id)?.clone();
        if !bid.is_lapsed(now) {
            return Ok(None);
        }

        bid.expire(now)?;

        let mut job = self.job.clone();
        if job.accepted_bid_id == Some(bid_id) {
            job.reopen()?;
        }

        self.job = job;
        *self.bid_mut(bid_id)? = bid.clone();

        let declined_driver_ids = self
            .bids
            .iter()
            .filter(|other| other.is_declined())
            .map(|other| other.driver_id)
            .collect();

        Ok(Some(Expiry {
            bid,
            declined_driver_ids,
        }))
    }

    /// Cancels an open job and declines its pending bids.
    pub fn cancel_job(&mut self, now: DateTime<Utc>) -> Result<Vec<Bid>, Error> {
        let mut job = self.job.clone();
        job.cancel()?;

        let mut declined = vec![];
        for bid in self.bids.iter_mut().filter(|bid| bid.is_pending()) {
            bid.decline(now)?;
            declined.push(bid.clone());
        }

        self.job = job;
        Ok(declined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::job::fixtures::job_at;
    use crate::entities::{BidStatus, Coordinates, JobStatus};
    use crate::error::ErrorKind;

    fn ledger() -> JobLedger {
        JobLedger::new(job_at(Coordinates::new(53.4, -2.16)), vec![])
    }

    #[test]
    fn second_bid_by_same_driver_is_a_duplicate() {
        let mut ledger = ledger();
        let driver_id = Uuid::new_v4();
        ledger.place_bid(driver_id, 3000, Utc::now()).unwrap();

        let err = ledger.place_bid(driver_id, 2800, Utc::now()).unwrap_err();
        assert!(err.is(ErrorKind::DuplicateBid));
    }

    #[test]
    fn driver_may_rebid_after_withdrawing() {
        let mut ledger = ledger();
        let driver_id = Uuid::new_v4();
        let bid = ledger.place_bid(driver_id, 3000, Utc::now()).unwrap();
        ledger.withdraw_bid(bid.id, Utc::now()).unwrap();

        assert!(ledger.place_bid(driver_id, 2900, Utc::now()).is_ok());
    }

    #[test]
    fn accept_declines_competitors_and_is_exclusive() {
        let now = Utc::now();
        let mut ledger = ledger();
        let b1 = ledger.place_bid(Uuid::new_v4(), 3000, now).unwrap();
        let b2 = ledger.place_bid(Uuid::new_v4(), 3200, now).unwrap();

        let acceptance = ledger.accept_bid(b1.id, now, Duration::hours(24)).unwrap();
        assert_eq!(acceptance.accepted.id, b1.id);
        assert_eq!(acceptance.declined.len(), 1);
        assert_eq!(ledger.job.status, JobStatus::BidAccepted);
        assert_eq!(ledger.job.accepted_bid_id, Some(b1.id));

        let accepted = ledger.bids.iter().filter(|b| b.is_committed()).count();
        let declined = ledger.bids.iter().filter(|b| b.is_declined()).count();
        assert_eq!((accepted, declined), (1, 1));

        let err = ledger.accept_bid(b2.id, now, Duration::hours(24)).unwrap_err();
        assert!(err.is(ErrorKind::AlreadyDecided));
    }

    #[test]
    fn failed_accept_leaves_ledger_untouched() {
        let now = Utc::now();
        let mut ledger = ledger();
        let b1 = ledger.place_bid(Uuid::new_v4(), 3000, now).unwrap();
        ledger.place_bid(Uuid::new_v4(), 3100, now).unwrap();

        let err = ledger.accept_bid(b1.id, now, Duration::zero()).unwrap_err();
        assert!(err.is(ErrorKind::Configuration));
        assert_eq!(ledger.job.status, JobStatus::Open);
        assert!(ledger.bids.iter().all(|bid| bid.is_pending()));
    }

    #[test]
    fn accept_unknown_bid_is_not_found() {
        let mut ledger = ledger();
        let err = ledger
            .accept_bid(Uuid::new_v4(), Utc::now(), Duration::hours(24))
            .unwrap_err();
        assert!(err.is(ErrorKind::BidNotFound));
    }

    #[test]
    fn accept_on_canceled_job_is_not_open() {
        let now = Utc::now();
        let mut ledger = ledger();
        let bid = ledger.place_bid(Uuid::new_v4(), 3000, now).unwrap();
        ledger.job.status = JobStatus::Canceled;

        let err = ledger.accept_bid(bid.id, now, Duration::hours(24)).unwrap_err();
        assert!(err.is(ErrorKind::JobNotOpen));
    }

    #[test]
    fn confirm_moves_job_to_confirmed() {
        let now = Utc::now();
        let mut ledger = ledger();
        let bid = ledger.place_bid(Uuid::new_v4(), 3000, now).unwrap();
        ledger.accept_bid(bid.id, now, Duration::hours(24)).unwrap();

        let confirmed = ledger.confirm_bid(bid.id, now + Duration::hours(2)).unwrap();
        assert!(matches!(confirmed.status, BidStatus::Confirmed { .. }));
        assert_eq!(ledger.job.status, JobStatus::Confirmed);
    }

    #[test]
    fn withdrawing_pending_bid_keeps_job_status() {
        let now = Utc::now();
        let mut ledger = ledger();
        let bid = ledger.place_bid(Uuid::new_v4(), 3000, now).unwrap();

        let withdrawal = ledger.withdraw_bid(bid.id, now).unwrap();
        assert!(!withdrawal.job_reopened);
        assert_eq!(withdrawal.bid.status, BidStatus::Withdrawn);
        assert_eq!(ledger.job.status, JobStatus::Open);
    }

    #[test]
    fn withdrawing_accepted_bid_reopens_job() {
        let now = Utc::now();
        let mut ledger = ledger();
        let bid = ledger.place_bid(Uuid::new_v4(), 3000, now).unwrap();
        ledger.accept_bid(bid.id, now, Duration::hours(24)).unwrap();

        let withdrawal = ledger.withdraw_bid(bid.id, now).unwrap();
        assert!(withdrawal.job_reopened);
        assert_eq!(ledger.job.status, JobStatus::Open);
        assert!(ledger.job.accepted_bid_id.is_none());
    }

    #[test]
    fn expiry_reopens_job_and_lists_declined_drivers() {
        let now = Utc::now();
        let mut ledger = ledger();
        let winner = ledger.place_bid(Uuid::new_v4(), 3000, now).unwrap();
        let loser = ledger.place_bid(Uuid::new_v4(), 3300, now).unwrap();
        ledger.accept_bid(winner.id, now, Duration::hours(24)).unwrap();

        assert!(ledger.expire_bid(winner.id, now).unwrap().is_none());

        let expiry = ledger
            .expire_bid(winner.id, now + Duration::hours(25))
            .unwrap()
            .unwrap();
        assert_eq!(expiry.bid.status, BidStatus::Expired);
        assert_eq!(expiry.declined_driver_ids, vec![loser.driver_id]);
        assert_eq!(ledger.job.status, JobStatus::Open);
        assert!(ledger.job.accepted_bid_id.is_none());

        // a second sweep over the same bid is a no-op
        assert!(ledger
            .expire_bid(winner.id, now + Duration::hours(26))
            .unwrap()
            .is_none());
    }

    #[test]
    fn cancel_declines_pending_bids() {
        let now = Utc::now();
        let mut ledger = ledger();
        ledger.place_bid(Uuid::new_v4(), 3000, now).unwrap();

        let declined = ledger.cancel_job(now).unwrap();
        assert_eq!(declined.len(), 1);
        assert_eq!(ledger.job.status, JobStatus::Canceled);
        assert!(ledger.place_bid(Uuid::new_v4(), 3000, now).is_err());
    }
}
