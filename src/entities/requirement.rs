use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed vocabulary shared by job requirements and driver capabilities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    WheelchairAccessible,
    StepFreeAccess,
    QuietRide,
    FemaleDriver,
    AssistanceAnimal,
    OxygenEquipment,
    CarerSeat,
}

impl Requirement {
    pub const ALL: [Requirement; 7] = [
        Requirement::WheelchairAccessible,
        Requirement::StepFreeAccess,
        Requirement::QuietRide,
        Requirement::FemaleDriver,
        Requirement::AssistanceAnimal,
        Requirement::OxygenEquipment,
        Requirement::CarerSeat,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::WheelchairAccessible => "wheelchair_accessible",
            Self::StepFreeAccess => "step_free_access",
            Self::QuietRide => "quiet_ride",
            Self::FemaleDriver => "female_driver",
            Self::AssistanceAnimal => "assistance_animal",
            Self::OxygenEquipment => "oxygen_equipment",
            Self::CarerSeat => "carer_seat",
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of [`Requirement`]s. Used as a job's requirement set and as a
/// driver's capability set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementSet(BTreeSet<Requirement>);

impl RequirementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, requirement: Requirement) -> bool {
        self.0.contains(&requirement)
    }

    pub fn insert(&mut self, requirement: Requirement) -> bool {
        self.0.insert(requirement)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the set in the fixed declaration order of [`Requirement::ALL`].
    pub fn iter(&self) -> impl Iterator<Item = Requirement> + '_ {
        Requirement::ALL
            .into_iter()
            .filter(move |requirement| self.contains(*requirement))
    }
}

impl FromIterator<Requirement> for RequirementSet {
    fn from_iter<I: IntoIterator<Item = Requirement>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Requirement; N]> for RequirementSet {
    fn from(requirements: [Requirement; N]) -> Self {
        requirements.into_iter().collect()
    }
}
