use serde::Serialize;

use crate::entities::{Driver, Job, Requirement, RequirementSet};
use crate::matching::Exclusion;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Compatibility {
    pub score: f64,
    pub missing: Vec<Requirement>,
}

/// Scores how many of the asserted `requirements` the `capabilities` meet.
/// A job asserting nothing is fully compatible with every driver.
pub fn score(requirements: &RequirementSet, capabilities: &RequirementSet) -> Compatibility {
    let asserted = requirements.len();
    if asserted == 0 {
        return Compatibility {
            score: 1.0,
            missing: vec![],
        };
    }

    let missing: Vec<Requirement> = requirements
        .iter()
        .filter(|requirement| !capabilities.contains(*requirement))
        .collect();

    let met = asserted - missing.len();

    Compatibility {
        score: met as f64 / asserted as f64,
        missing,
    }
}

/// Requirements that remove a driver outright instead of lowering the score.
/// Evaluated before [`score`].
pub fn hard_exclusion(job: &Job, driver: &Driver) -> Option<Exclusion> {
    if !driver.approved {
        return Some(Exclusion::NotApproved);
    }

    if job.wheelchair_users > driver.wheelchair_capacity {
        return Some(Exclusion::WheelchairCapacity {
            needed: job.wheelchair_users,
            available: driver.wheelchair_capacity,
        });
    }

    None
}
