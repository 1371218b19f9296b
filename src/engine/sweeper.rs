use super::Engine;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time;

use crate::{
    api::{DynAPI, SweepAPI, SweepOutcome},
    auth::{Platform, User},
    db::Store,
    entities::Bid,
    error::Error,
    notifier::Notification,
};

impl<S: Store> Engine<S> {
    /// Expires every accepted bid whose confirmation window lapsed by `now`
    /// and reopens its job.
    ///
    /// Each bid is handled in its own ledger transaction that re-checks the
    /// bid, so overlapping sweeps never expire a bid twice. A failure on one
    /// bid is logged and the sweep moves on.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepOutcome, Error> {
        let lapsed = self.store.lapsed_bids(now).await?;

        let mut outcome = SweepOutcome {
            processed_count: 0,
            total_found: lapsed.len(),
        };

        for bid in lapsed {
            match self.expire(&bid, now).await {
                Ok(true) => outcome.processed_count += 1,
                Ok(false) => tracing::debug!(bid_id = %bid.id, "bid no longer lapsed, skipping"),
                Err(err) => tracing::warn!(bid_id = %bid.id, ?err, "failed to expire bid"),
            }
        }

        tracing::info!(
            processed = outcome.processed_count,
            found = outcome.total_found,
            "sweep finished"
        );

        Ok(outcome)
    }

    async fn expire(&self, bid: &Bid, now: DateTime<Utc>) -> Result<bool, Error> {
        let bid_id = bid.id;
        let job_id = bid.job_id;

        let expired = self
            .store
            .with_ledger(job_id, move |ledger| {
                let expiry = ledger.expire_bid(bid_id, now)?;
                Ok(expiry.map(|expiry| (expiry, ledger.job.created_by)))
            })
            .await?;

        let (expiry, owner_id) = match expired {
            Some(expired) => expired,
            None => return Ok(false),
        };

        self.cache.invalidate(job_id);

        tracing::info!(%bid_id, %job_id, "accepted bid expired, job reopened");

        let mut notifications = vec![Notification::new(
            owner_id,
            "Confirmation lapsed",
            "The accepted driver did not confirm in time. Your job is open for bids again.",
            job_id,
        )];
        notifications.extend(expiry.declined_driver_ids.iter().map(|driver_id| {
            Notification::new(
                *driver_id,
                "Job reopened",
                "A job you bid on is open for bids again.",
                job_id,
            )
        }));
        self.notify_all(notifications).await;

        Ok(true)
    }
}

#[async_trait]
impl<S: Store> SweepAPI for Engine<S> {
    #[tracing::instrument(skip(self))]
    async fn trigger_sweep(&self, user: User) -> Result<SweepOutcome, Error> {
        self.authorize(user, "sweep", Platform::default())?;

        self.sweep(Utc::now()).await
    }
}

/// Runs the sweep on a fixed interval until the process exits. Failed runs
/// are logged and retried on the next tick.
pub async fn run_forever(api: DynAPI, every: Duration) -> ! {
    let mut interval = time::interval(every);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        match api.trigger_sweep(User::new_system_user()).await {
            Ok(outcome) => tracing::debug!(
                processed = outcome.processed_count,
                found = outcome.total_found,
                "scheduled sweep done"
            ),
            Err(err) => tracing::warn!(?err, "scheduled sweep failed"),
        }
    }
}
