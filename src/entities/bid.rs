use chrono::{DateTime, Duration, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Bid {
    #[polar(attribute)]
    pub id: Uuid,
    #[polar(attribute)]
    pub job_id: Uuid,
    #[polar(attribute)]
    pub driver_id: Uuid,
    pub amount: i64,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Status {
    Pending,
    Accepted { expires_at: DateTime<Utc> },
    Confirmed { confirmed_at: DateTime<Utc> },
    Declined,
    Withdrawn,
    Expired,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Pending => "pending".into(),
            Self::Accepted { expires_at: _ } => "accepted".into(),
            Self::Confirmed { confirmed_at: _ } => "confirmed".into(),
            Self::Declined => "declined".into(),
            Self::Withdrawn => "withdrawn".into(),
            Self::Expired => "expired".into(),
        }
    }
}

impl Bid {
    pub fn new(job_id: Uuid, driver_id: Uuid, amount: i64, now: DateTime<Utc>) -> Result<Self, Error> {
        if amount <= 0 {
            return Err(Error::invalid_amount_error());
        }

        Ok(Bid {
            id: Uuid::new_v4(),
            job_id,
            driver_id,
            amount,
            status: Status::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            Status::Accepted { expires_at } => Some(expires_at),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, Status::Pending)
    }

    pub fn is_declined(&self) -> bool {
        matches!(self.status, Status::Declined)
    }

    /// Pending or accepted: the driver may still act on the bid.
    pub fn is_open(&self) -> bool {
        matches!(self.status, Status::Pending | Status::Accepted { .. })
    }

    /// Accepted or confirmed: the bid holds the job.
    pub fn is_committed(&self) -> bool {
        matches!(self.status, Status::Accepted { .. } | Status::Confirmed { .. })
    }

    /// Pending, accepted or confirmed: the driver's time is spoken for.
    pub fn holds_time(&self) -> bool {
        self.is_open() || self.is_committed()
    }

    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            Status::Accepted { expires_at } => expires_at <= now,
            _ => false,
        }
    }

    #[tracing::instrument(skip(self), fields(bid_id = %self.id))]
    pub fn accept(&mut self, now: DateTime<Utc>, window: Duration) -> Result<(), Error> {
        match self.status {
            Status::Pending => {
                if window <= Duration::zero() {
                    return Err(Error::configuration_error(
                        "confirmation window must be positive",
                    ));
                }

                self.status = Status::Accepted {
                    expires_at: now + window,
                };
                self.updated_at = now;
                Ok(())
            }
            _ => Err(Error::already_decided_error()),
        }
    }

    pub fn decline(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        match self.status {
            Status::Pending => {
                self.status = Status::Declined;
                self.updated_at = now;
                Ok(())
            }
            _ => Err(Error::already_decided_error()),
        }
    }

    #[tracing::instrument(skip(self), fields(bid_id = %self.id))]
    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        match self.status {
            Status::Accepted { expires_at } if now < expires_at => {
                self.status = Status::Confirmed { confirmed_at: now };
                self.updated_at = now;
                Ok(())
            }
            Status::Accepted { expires_at: _ } => Err(Error::confirmation_expired_error()),
            _ => Err(Error::invalid_state_error()),
        }
    }

    /// Withdraws the bid. Returns whether the bid had been accepted, in which
    /// case the job must be reopened.
    #[tracing::instrument(skip(self), fields(bid_id = %self.id))]
    pub fn withdraw(&mut self, now: DateTime<Utc>) -> Result<bool, Error> {
        let was_accepted = match self.status {
            Status::Pending => false,
            Status::Accepted { expires_at } if now < expires_at => true,
            Status::Accepted { expires_at: _ } => return Err(Error::confirmation_expired_error()),
            _ => return Err(Error::already_decided_error()),
        };

        self.status = Status::Withdrawn;
        self.updated_at = now;
        Ok(was_accepted)
    }

    #[tracing::instrument(skip(self), fields(bid_id = %self.id))]
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        if !self.is_lapsed(now) {
            return Err(Error::invalid_state_error());
        }

        self.status = Status::Expired;
        self.updated_at = now;
        Ok(())
    }
}
