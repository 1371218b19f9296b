use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Location, RequirementSet};
use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Job {
    #[polar(attribute)]
    pub id: Uuid,
    #[polar(attribute)]
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub pickup: Location,
    pub dropoff: Option<Location>,
    pub pickup_at: DateTime<Utc>,
    pub return_at: Option<DateTime<Utc>>,
    pub passengers: u8,
    pub wheelchair_users: u8,
    pub requirements: RequirementSet,
    pub status: Status,
    pub accepted_bid_id: Option<Uuid>,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Open,
    BidAccepted,
    Confirmed,
    InProgress,
    Completed,
    Canceled,
    ExpiredReopened,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Open => "open".into(),
            Self::BidAccepted => "bid_accepted".into(),
            Self::Confirmed => "confirmed".into(),
            Self::InProgress => "in_progress".into(),
            Self::Completed => "completed".into(),
            Self::Canceled => "canceled".into(),
            Self::ExpiredReopened => "expired_reopened".into(),
        }
    }

    /// Statuses in which the job takes new bids.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open | Self::ExpiredReopened)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Organization { organization_id: Uuid },
}

/// Caller-supplied job fields before the postcodes are geocoded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobDraft {
    pub pickup_postcode: String,
    pub dropoff_postcode: Option<String>,
    pub pickup_at: DateTime<Utc>,
    pub return_at: Option<DateTime<Utc>>,
    pub passengers: u8,
    #[serde(default)]
    pub wheelchair_users: u8,
    #[serde(default)]
    pub requirements: RequirementSet,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

impl JobDraft {
    pub fn validate(&self) -> Result<(), Error> {
        if self.passengers == 0 {
            return Err(Error::invalid_input_error(
                "a job needs at least one passenger",
            ));
        }

        if self.wheelchair_users > self.passengers {
            return Err(Error::invalid_input_error(
                "wheelchair users cannot exceed passengers",
            ));
        }

        if let Some(return_at) = self.return_at {
            if return_at <= self.pickup_at {
                return Err(Error::invalid_input_error(
                    "return time must be after pickup time",
                ));
            }
        }

        Ok(())
    }
}

impl Job {
    pub fn new(
        organization_id: Uuid,
        created_by: Uuid,
        draft: JobDraft,
        pickup: Location,
        dropoff: Option<Location>,
    ) -> Result<Self, Error> {
        draft.validate()?;

        Ok(Self {
            id: Uuid::new_v4(),
            organization_id,
            created_by,
            pickup,
            dropoff,
            pickup_at: draft.pickup_at,
            return_at: draft.return_at,
            passengers: draft.passengers,
            wheelchair_users: draft.wheelchair_users,
            requirements: draft.requirements,
            status: Status::Open,
            accepted_bid_id: None,
            visibility: draft.visibility,
            created_at: Utc::now(),
            deleted_at: None,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn accepts_bids(&self) -> bool {
        self.status.is_open() && !self.is_deleted()
    }

    pub fn is_visible_to(&self, organizations: &[Uuid]) -> bool {
        match self.visibility {
            Visibility::Public => true,
            Visibility::Organization { organization_id } => organizations.contains(&organization_id),
        }
    }

    pub fn update_requirements(&mut self, requirements: RequirementSet) -> Result<(), Error> {
        if !self.accepts_bids() {
            return Err(Error::job_not_open_error());
        }

        self.requirements = requirements;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(job_id = %self.id))]
    pub fn mark_bid_accepted(&mut self, bid_id: Uuid) -> Result<(), Error> {
        if self.accepted_bid_id.is_some() {
            return Err(Error::already_decided_error());
        }

        if !self.accepts_bids() {
            return Err(Error::job_not_open_error());
        }

        self.status = Status::BidAccepted;
        self.accepted_bid_id = Some(bid_id);
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(job_id = %self.id))]
    pub fn confirm(&mut self, bid_id: Uuid) -> Result<(), Error> {
        match (self.status, self.accepted_bid_id) {
            (Status::BidAccepted, Some(accepted)) if accepted == bid_id => {
                self.status = Status::Confirmed;
                Ok(())
            }
            _ => Err(Error::invalid_state_error()),
        }
    }

    /// Returns the job to bidding after its accepted bid was withdrawn or
    /// expired.
    #[tracing::instrument(skip(self), fields(job_id = %self.id))]
    pub fn reopen(&mut self) -> Result<(), Error> {
        match self.status {
            Status::BidAccepted => {
                self.status = Status::Open;
                self.accepted_bid_id = None;
                Ok(())
            }
            _ => Err(Error::invalid_state_error()),
        }
    }

    pub fn cancel(&mut self) -> Result<(), Error> {
        if !self.accepts_bids() {
            return Err(Error::job_not_open_error());
        }

        self.status = Status::Canceled;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Confirmed => {
                self.status = Status::InProgress;
                Ok(())
            }
            _ => Err(Error::invalid_state_error()),
        }
    }

    pub fn complete(&mut self) -> Result<(), Error> {
        match self.status {
            Status::InProgress => {
                self.status = Status::Completed;
                Ok(())
            }
            _ => Err(Error::invalid_state_error()),
        }
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        match self.status {
            Status::Open | Status::ExpiredReopened | Status::Canceled | Status::Completed => {
                if self.deleted_at.is_none() {
                    self.deleted_at = Some(now);
                }
                Ok(())
            }
            _ => Err(Error::invalid_state_error()),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::entities::Coordinates;
    use chrono::Duration;

    pub fn draft() -> JobDraft {
        JobDraft {
            pickup_postcode: "SK3 0AA".into(),
            dropoff_postcode: None,
            pickup_at: Utc::now() + Duration::days(2),
            return_at: None,
            passengers: 1,
            wheelchair_users: 0,
            requirements: RequirementSet::new(),
            visibility: Visibility::Public,
        }
    }

    pub fn job_at(coordinates: Coordinates) -> Job {
        let pickup = Location::new("SK3 0AA".into(), coordinates);
        Job::new(Uuid::new_v4(), Uuid::new_v4(), draft(), pickup, None).unwrap()
    }
}
