use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resource standing for platform-wide actions that have no entity of their
/// own, such as creating a job or running a sweep.
#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Platform {
    #[polar(attribute)]
    pub id: Uuid,
}

impl Platform {
    pub fn default() -> Self {
        Self { id: Uuid::nil() }
    }
}
