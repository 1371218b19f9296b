use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Location, RequirementSet};
use crate::error::Error;

const DEFAULT_SERVICE_RADIUS_MILES: f64 = 10.0;

#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Driver {
    #[polar(attribute)]
    pub id: Uuid,
    pub base: Option<Location>,
    pub service_radius_miles: f64,
    pub capabilities: RequirementSet,
    pub wheelchair_capacity: u8,
    pub approved: bool,
    pub daily_capacity_hours: Option<f64>,
    pub organizations: Vec<Uuid>,
    pub updated_at: DateTime<Utc>,
}

/// Partial profile edit. `None` leaves the field untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DriverProfile {
    pub base_postcode: Option<String>,
    pub service_radius_miles: Option<f64>,
    pub capabilities: Option<RequirementSet>,
    pub wheelchair_capacity: Option<u8>,
    pub daily_capacity_hours: Option<f64>,
    pub organizations: Option<Vec<Uuid>>,
}

impl DriverProfile {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(radius) = self.service_radius_miles {
            if !(radius.is_finite() && radius > 0.0) {
                return Err(Error::invalid_input_error(
                    "service radius must be a positive number of miles",
                ));
            }
        }

        if let Some(hours) = self.daily_capacity_hours {
            if !(hours.is_finite() && hours > 0.0 && hours <= 24.0) {
                return Err(Error::invalid_input_error(
                    "daily capacity must be between 0 and 24 hours",
                ));
            }
        }

        Ok(())
    }
}

impl Driver {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            id: user_id,
            base: None,
            service_radius_miles: DEFAULT_SERVICE_RADIUS_MILES,
            capabilities: RequirementSet::new(),
            wheelchair_capacity: 0,
            approved: false,
            daily_capacity_hours: None,
            organizations: vec![],
            updated_at: Utc::now(),
        }
    }

    /// Applies a validated profile edit. The base location must already be
    /// geocoded by the caller.
    #[tracing::instrument(skip(self), fields(driver_id = %self.id))]
    pub fn apply(&mut self, profile: DriverProfile, base: Option<Location>) -> Result<(), Error> {
        profile.validate()?;

        if let Some(base) = base {
            self.base = Some(base);
        }
        if let Some(radius) = profile.service_radius_miles {
            self.service_radius_miles = radius;
        }
        if let Some(capabilities) = profile.capabilities {
            self.capabilities = capabilities;
        }
        if let Some(capacity) = profile.wheelchair_capacity {
            self.wheelchair_capacity = capacity;
        }
        if let Some(hours) = profile.daily_capacity_hours {
            self.daily_capacity_hours = Some(hours);
        }
        if let Some(organizations) = profile.organizations {
            self.organizations = organizations;
        }

        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_approved(&mut self, approved: bool) {
        self.approved = approved;
        self.updated_at = Utc::now();
    }

    pub fn capacity_ceiling(&self, default_hours: f64) -> f64 {
        self.daily_capacity_hours.unwrap_or(default_hours)
    }
}
