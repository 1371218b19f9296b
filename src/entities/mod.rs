mod bid;
mod driver;
pub(crate) mod job;
mod ledger;
mod location;
mod requirement;

pub use bid::{Bid, Status as BidStatus};
pub use driver::{Driver, DriverProfile};
pub use job::{Job, JobDraft, Status as JobStatus, Visibility};
pub use ledger::{Acceptance, Expiry, JobLedger, Withdrawal};
pub use location::{Coordinates, Location};
pub use requirement::{Requirement, RequirementSet};
