use super::Engine;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    api::{BidAPI, BidReceipt},
    auth::User,
    conflict::ConflictReport,
    db::Store,
    entities::{Acceptance, Bid, Withdrawal},
    error::Error,
    matching::{ranking::evaluate, Exclusion},
    notifier::Notification,
};

fn describe(exclusion: Exclusion) -> String {
    match exclusion {
        Exclusion::NotApproved => "driver is not approved".into(),
        Exclusion::NoBaseLocation => "driver has no base location".into(),
        Exclusion::WheelchairCapacity { needed, available } => format!(
            "job needs {} wheelchair spaces, driver has {}",
            needed, available
        ),
        Exclusion::OutsideRadius { radius, .. } => {
            format!("job is outside the {} mile service radius", radius)
        }
    }
}

#[async_trait]
impl<S: Store> BidAPI for Engine<S> {
    #[tracing::instrument(skip(self))]
    async fn create_bid(&self, user: User, job_id: Uuid, amount: i64) -> Result<BidReceipt, Error> {
        if amount <= 0 {
            return Err(Error::invalid_amount_error());
        }

        let driver = self.store.find_driver(user.id).await?;
        self.authorize(user, "bid", driver.clone())?;

        let job = self.find_live_job(job_id).await?;

        // jobs scoped to another organization are indistinguishable from
        // missing ones
        if !job.is_visible_to(&driver.organizations) {
            return Err(Error::job_not_found_error());
        }

        if let Err(exclusion) = evaluate(&job, &driver, self.weights) {
            return Err(Error::driver_not_eligible_error(describe(exclusion)));
        }

        let conflicts = self.check_capacity(&driver, &job).await?;

        let driver_id = driver.id;
        let now = Utc::now();
        let bid = self
            .store
            .with_ledger(job_id, move |ledger| ledger.place_bid(driver_id, amount, now))
            .await?;

        self.cache.invalidate(job_id);

        tracing::info!(bid_id = %bid.id, %job_id, "bid placed");

        Ok(BidReceipt { bid, conflicts })
    }

    #[tracing::instrument(skip(self))]
    async fn find_bid(&self, user: User, id: Uuid) -> Result<Bid, Error> {
        let bid = self.store.find_bid(id).await?;

        // the bidding driver, or anyone who may read the job
        if self.authorize(user.clone(), "read", bid.clone()).is_err() {
            let job = self.store.find_job(bid.job_id).await?;
            self.authorize(user, "read", job)?;
        }

        Ok(bid)
    }

    #[tracing::instrument(skip(self))]
    async fn accept_bid(&self, user: User, id: Uuid) -> Result<Acceptance, Error> {
        let bid = self.store.find_bid(id).await?;
        let job = self.find_live_job(bid.job_id).await?;

        self.authorize(user, "accept_bid", job.clone())?;

        // a pending bid may have been placed while the driver still had room
        let driver = self.store.find_driver(bid.driver_id).await?;
        self.check_capacity(&driver, &job).await?;

        let now = Utc::now();
        let window = self.confirmation_window;
        let acceptance = self
            .store
            .with_ledger(job.id, move |ledger| ledger.accept_bid(id, now, window))
            .await?;

        self.cache.invalidate(job.id);

        let mut notifications = vec![Notification::new(
            acceptance.accepted.driver_id,
            "Bid accepted",
            "Your bid was accepted. Confirm it before the confirmation window closes.",
            job.id,
        )];
        notifications.extend(acceptance.declined.iter().map(|declined| {
            Notification::new(
                declined.driver_id,
                "Bid declined",
                "Another bid was accepted for this job.",
                job.id,
            )
        }));
        self.notify_all(notifications).await;

        Ok(acceptance)
    }

    #[tracing::instrument(skip(self))]
    async fn confirm_bid(&self, user: User, id: Uuid) -> Result<Bid, Error> {
        let bid = self.store.find_bid(id).await?;
        self.authorize(user, "confirm", bid.clone())?;

        let now = Utc::now();
        let (bid, owner_id) = self
            .store
            .with_ledger(bid.job_id, move |ledger| {
                let bid = ledger.confirm_bid(id, now)?;
                Ok((bid, ledger.job.created_by))
            })
            .await?;

        self.cache.invalidate(bid.job_id);

        tracing::info!(bid_id = %bid.id, job_id = %bid.job_id, "bid confirmed");

        self.notify(
            owner_id,
            "Booking confirmed",
            "The driver confirmed your job.",
            bid.job_id,
        )
        .await;

        Ok(bid)
    }

    #[tracing::instrument(skip(self))]
    async fn withdraw_bid(&self, user: User, id: Uuid) -> Result<Withdrawal, Error> {
        let bid = self.store.find_bid(id).await?;
        self.authorize(user, "withdraw", bid.clone())?;

        let now = Utc::now();
        let (withdrawal, owner_id) = self
            .store
            .with_ledger(bid.job_id, move |ledger| {
                let withdrawal = ledger.withdraw_bid(id, now)?;
                Ok((withdrawal, ledger.job.created_by))
            })
            .await?;

        self.cache.invalidate(bid.job_id);

        if withdrawal.job_reopened {
            tracing::info!(job_id = %bid.job_id, "accepted bid withdrawn, job reopened");

            self.notify(
                owner_id,
                "Driver withdrew",
                "The accepted driver withdrew. Your job is open for bids again.",
                bid.job_id,
            )
            .await;
        }

        Ok(withdrawal)
    }

    #[tracing::instrument(skip(self))]
    async fn preview_conflicts(
        &self,
        user: User,
        driver_id: Uuid,
        job_id: Uuid,
    ) -> Result<ConflictReport, Error> {
        let driver = self.store.find_driver(driver_id).await?;
        self.authorize(user, "read", driver.clone())?;

        let job = self.find_live_job(job_id).await?;
        let commitments = self.store.driver_commitments(driver_id).await?;

        Ok(self.detector.check(&driver, &job, &commitments))
    }
}
