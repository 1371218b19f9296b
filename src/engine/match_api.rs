use super::Engine;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::MatchAPI,
    auth::User,
    db::Store,
    error::Error,
    matching::{rank_drivers, rank_jobs, MatchKey, MatchResult},
};

#[async_trait]
impl<S: Store> MatchAPI for Engine<S> {
    #[tracing::instrument(skip(self))]
    async fn find_drivers_for_job(&self, user: User, job_id: Uuid) -> Result<Vec<MatchResult>, Error> {
        // taken before any read so a racing invalidation discards this result
        let epoch = self.cache.epoch();

        let job = self.find_live_job(job_id).await?;
        self.authorize(user, "list_matches", job.clone())?;

        let key = MatchKey::for_job(&job);
        if let Some(matches) = self.cache.get(&key) {
            tracing::debug!(%job_id, "match cache hit");
            return Ok(matches.as_ref().clone());
        }

        let drivers = self.store.approved_drivers().await?;
        let matches = rank_drivers(&job, &drivers, self.weights);

        tracing::info!(%job_id, candidates = drivers.len(), matches = matches.len(), "ranked drivers");

        self.cache.insert(key, Arc::new(matches.clone()), epoch);

        Ok(matches)
    }

    #[tracing::instrument(skip(self))]
    async fn find_jobs_for_driver(&self, user: User, driver_id: Uuid) -> Result<Vec<MatchResult>, Error> {
        let epoch = self.cache.epoch();

        let driver = self.store.find_driver(driver_id).await?;
        self.authorize(user, "list_matches", driver.clone())?;

        let key = MatchKey::for_driver(&driver);
        if let Some(matches) = self.cache.get(&key) {
            tracing::debug!(%driver_id, "match cache hit");
            return Ok(matches.as_ref().clone());
        }

        let jobs = self.store.open_jobs().await?;
        let matches = rank_jobs(&driver, &jobs, self.weights);

        tracing::info!(%driver_id, candidates = jobs.len(), matches = matches.len(), "ranked jobs");

        self.cache.insert(key, Arc::new(matches.clone()), epoch);

        Ok(matches)
    }
}
