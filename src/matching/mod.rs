pub mod accessibility;
pub mod cache;
pub mod distance;
pub mod ranking;

pub use cache::{MatchCache, MatchKey, MatchScope};
pub use ranking::{rank_drivers, rank_jobs, MatchResult, MatchWeights};

/// Why a driver was left out of a candidate list.
#[derive(Clone, Debug, PartialEq)]
pub enum Exclusion {
    NotApproved,
    NoBaseLocation,
    WheelchairCapacity { needed: u8, available: u8 },
    OutsideRadius { distance: Option<f64>, radius: f64 },
}
