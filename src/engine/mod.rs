mod bid_api;
mod driver_api;
mod job_api;
mod match_api;
pub mod sweeper;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::Duration;
use futures::future::join_all;
use oso::Oso;
use uuid::Uuid;

use crate::{
    api::API,
    auth::authorizor,
    config::{BiddingConfig, MatchingConfig},
    conflict::{ConflictDetector, ConflictReport},
    db::Store,
    entities::{Driver, Job},
    error::Error,
    geocoder::Geocoder,
    matching::{MatchCache, MatchWeights},
    notifier::{notify_best_effort, Notification, Notifier},
};

pub struct Engine<S: Store> {
    store: S,
    geocoder: Geocoder,
    notifier: Arc<dyn Notifier>,
    cache: MatchCache,
    detector: ConflictDetector,
    weights: MatchWeights,
    confirmation_window: Duration,
    authorizor: Oso,
}

impl<S: Store> Engine<S> {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub fn new(
        store: S,
        geocoder: Geocoder,
        notifier: Arc<dyn Notifier>,
        matching: &MatchingConfig,
        bidding: &BiddingConfig,
    ) -> Result<Self, Error> {
        if bidding.confirmation_window <= Duration::zero() {
            return Err(Error::configuration_error(
                "confirmation window must be positive",
            ));
        }

        Ok(Self {
            store,
            geocoder,
            notifier,
            cache: MatchCache::new(matching),
            detector: ConflictDetector::new(bidding),
            weights: MatchWeights::from(matching),
            confirmation_window: bidding.confirmation_window,
            authorizor: authorizor::new()?,
        })
    }

    pub fn authorize<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        if self.authorizor.is_allowed(actor, action, resource)? {
            return Ok(());
        }

        Err(Error::not_owner_error())
    }

    /// Capacity check shared by bid creation and acceptance: refuses when the
    /// job would push the driver's day past the ceiling.
    async fn check_capacity(&self, driver: &Driver, job: &Job) -> Result<ConflictReport, Error> {
        let commitments = self.store.driver_commitments(driver.id).await?;
        let report = self.detector.check(driver, job, &commitments);

        if !report.fits {
            return Err(Error::capacity_exceeded_error(
                report.capacity.hours_used + report.job_hours,
                report.capacity.ceiling_hours,
            ));
        }

        Ok(report)
    }

    async fn notify_all(&self, notifications: Vec<Notification>) {
        join_all(
            notifications
                .into_iter()
                .map(|notification| notify_best_effort(self.notifier.as_ref(), notification)),
        )
        .await;
    }

    async fn notify(&self, recipient_id: Uuid, title: &str, body: &str, job_id: Uuid) {
        notify_best_effort(
            self.notifier.as_ref(),
            Notification::new(recipient_id, title, body, job_id),
        )
        .await;
    }
}

impl<S: Store> API for Engine<S> {}
