use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::DriverAPI,
    auth::User,
    db::Store,
    entities::{Driver, DriverProfile, Location},
    error::Error,
};

impl<S: Store> Engine<S> {
    async fn geocode_base(&self, profile: &DriverProfile) -> Result<Option<Location>, Error> {
        match &profile.base_postcode {
            Some(postcode) => Ok(Some(self.geocoder.geocode(postcode).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<S: Store> DriverAPI for Engine<S> {
    #[tracing::instrument(skip(self))]
    async fn create_driver(&self, user: User, profile: DriverProfile) -> Result<Driver, Error> {
        profile.validate()?;

        let mut driver = Driver::new(user.id);
        if profile.organizations.is_some() {
            self.authorize(user.clone(), "assign_organizations", driver.clone())?;
        }

        let base = self.geocode_base(&profile).await?;

        // membership comes from the gateway unless the system sets it
        driver.organizations = user.organizations;
        driver.apply(profile, base)?;

        self.store.insert_driver(&driver).await?;
        self.cache.invalidate_driver(driver.id);

        tracing::info!(driver_id = %driver.id, "driver registered");

        Ok(driver)
    }

    #[tracing::instrument(skip(self))]
    async fn find_driver(&self, user: User, id: Uuid) -> Result<Driver, Error> {
        let driver = self.store.find_driver(id).await?;

        self.authorize(user, "read", driver.clone())?;

        Ok(driver)
    }

    #[tracing::instrument(skip(self))]
    async fn update_driver(&self, user: User, id: Uuid, profile: DriverProfile) -> Result<Driver, Error> {
        let driver = self.store.find_driver(id).await?;
        if profile.organizations.is_some() {
            self.authorize(user.clone(), "assign_organizations", driver.clone())?;
        }
        self.authorize(user, "update", driver)?;

        profile.validate()?;
        let base = self.geocode_base(&profile).await?;

        let driver = self
            .store
            .with_driver(id, move |driver| {
                driver.apply(profile, base)?;
                Ok(driver.clone())
            })
            .await?;

        self.cache.invalidate_driver(id);

        Ok(driver)
    }

    #[tracing::instrument(skip(self))]
    async fn approve_driver(&self, user: User, id: Uuid, approved: bool) -> Result<Driver, Error> {
        let driver = self.store.find_driver(id).await?;
        self.authorize(user, "approve", driver)?;

        let driver = self
            .store
            .with_driver(id, move |driver| {
                driver.set_approved(approved);
                Ok(driver.clone())
            })
            .await?;

        self.cache.invalidate_driver(id);

        tracing::info!(driver_id = %id, approved, "driver approval changed");

        Ok(driver)
    }
}
