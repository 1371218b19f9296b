use super::Engine;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    api::JobAPI,
    auth::{Platform, User},
    db::Store,
    entities::{Job, JobDraft, RequirementSet},
    error::Error,
    notifier::Notification,
};

impl<S: Store> Engine<S> {
    /// Reads a job that has not been soft deleted.
    pub(super) async fn find_live_job(&self, id: Uuid) -> Result<Job, Error> {
        let job = self.store.find_job(id).await?;

        if job.is_deleted() {
            return Err(Error::job_not_found_error());
        }

        Ok(job)
    }

    /// Runs a transition on the job's committed bid. Only the driver holding
    /// that bid may start or complete the job.
    async fn transition_committed_job<F>(
        &self,
        user: User,
        id: Uuid,
        action: &str,
        transition: F,
    ) -> Result<Job, Error>
    where
        F: FnOnce(&mut Job) -> Result<(), Error> + Send + 'static,
    {
        let job = self.find_live_job(id).await?;
        let bid_id = job.accepted_bid_id.ok_or_else(Error::invalid_state_error)?;
        let bid = self.store.find_bid(bid_id).await?;

        self.authorize(user, action, bid)?;

        let job = self
            .store
            .with_ledger(id, move |ledger| {
                if ledger.job.accepted_bid_id != Some(bid_id) {
                    return Err(Error::invalid_state_error());
                }

                transition(&mut ledger.job)?;
                Ok(ledger.job.clone())
            })
            .await?;

        self.cache.invalidate(id);

        Ok(job)
    }
}

#[async_trait]
impl<S: Store> JobAPI for Engine<S> {
    #[tracing::instrument(skip(self))]
    async fn create_job(&self, user: User, draft: JobDraft) -> Result<Job, Error> {
        self.authorize(user.clone(), "create_job", Platform::default())?;

        let organization_id = user.primary_organization().ok_or_else(Error::not_owner_error)?;

        // fail fast on bad input before spending geocoder calls
        draft.validate()?;

        let pickup = self.geocoder.geocode(&draft.pickup_postcode).await?;
        let dropoff = match &draft.dropoff_postcode {
            Some(postcode) => Some(self.geocoder.geocode(postcode).await?),
            None => None,
        };

        let job = Job::new(organization_id, user.id, draft, pickup, dropoff)?;

        self.store.insert_job(&job).await?;
        self.cache.invalidate(job.id);

        tracing::info!(job_id = %job.id, "job created");

        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    async fn find_job(&self, user: User, id: Uuid) -> Result<Job, Error> {
        let job = self.find_live_job(id).await?;

        self.authorize(user, "read", job.clone())?;

        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    async fn update_job_requirements(
        &self,
        user: User,
        id: Uuid,
        requirements: RequirementSet,
    ) -> Result<Job, Error> {
        // the owning organization never changes, so checking it before taking
        // the lock is safe
        let job = self.find_live_job(id).await?;
        self.authorize(user, "update", job)?;

        let job = self
            .store
            .with_ledger(id, move |ledger| {
                ledger.job.update_requirements(requirements)?;
                Ok(ledger.job.clone())
            })
            .await?;

        self.cache.invalidate(id);

        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_job(&self, user: User, id: Uuid) -> Result<Job, Error> {
        let job = self.find_live_job(id).await?;
        self.authorize(user, "cancel", job)?;

        let now = Utc::now();
        let (job, declined) = self
            .store
            .with_ledger(id, move |ledger| {
                let declined = ledger.cancel_job(now)?;
                Ok((ledger.job.clone(), declined))
            })
            .await?;

        self.cache.invalidate(id);

        tracing::info!(job_id = %id, declined = declined.len(), "job canceled");

        self.notify_all(
            declined
                .iter()
                .map(|bid| {
                    Notification::new(
                        bid.driver_id,
                        "Job canceled",
                        "A job you bid on was canceled by its owner.",
                        id,
                    )
                })
                .collect(),
        )
        .await;

        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    async fn start_job(&self, user: User, id: Uuid) -> Result<Job, Error> {
        self.transition_committed_job(user, id, "start", |job| job.start())
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn complete_job(&self, user: User, id: Uuid) -> Result<Job, Error> {
        self.transition_committed_job(user, id, "complete", |job| job.complete())
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_job(&self, user: User, id: Uuid) -> Result<Job, Error> {
        let job = self.find_live_job(id).await?;
        self.authorize(user, "delete", job)?;

        let now = Utc::now();
        let job = self
            .store
            .with_ledger(id, move |ledger| {
                ledger.job.soft_delete(now)?;
                Ok(ledger.job.clone())
            })
            .await?;

        self.cache.invalidate(id);

        Ok(job)
    }
}
