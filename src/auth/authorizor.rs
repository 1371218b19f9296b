use oso::{Oso, PolarClass};

use crate::auth::{Platform, User};
use crate::entities::{Bid, Driver, Job};
use crate::error::Error;

pub fn new() -> Result<Oso, Error> {
    let mut o = Oso::new();

    o.register_class(Platform::get_polar_class())?;
    o.register_class(User::get_polar_class())?;
    o.register_class(Job::get_polar_class())?;
    o.register_class(Bid::get_polar_class())?;
    o.register_class(Driver::get_polar_class())?;

    o.load_str(include_str!("rules.polar"))?;

    Ok(o)
}

#[cfg(test)]
fn job_for(organization_id: uuid::Uuid) -> Job {
    use crate::entities::Coordinates;

    let mut job = crate::entities::job::fixtures::job_at(Coordinates::new(53.4, -2.16));
    job.organization_id = organization_id;
    job
}

#[test]
fn platform_role_test() {
    use uuid::Uuid;

    let authorizor = new().unwrap();

    let system = User::new_system_user();
    let organizer = User::new(Uuid::new_v4()).with_organization(Uuid::new_v4());
    let stranger = User::new(Uuid::new_v4());

    let result = authorizor.is_allowed(system.clone(), "sweep", Platform::default());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(organizer.clone(), "sweep", Platform::default());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(organizer.clone(), "create_job", Platform::default());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(stranger.clone(), "create_job", Platform::default());
    assert_eq!(result.unwrap(), false);
}

#[test]
fn job_member_role_test() {
    use uuid::Uuid;

    let authorizor = new().unwrap();

    let organization_id = Uuid::new_v4();
    let job = job_for(organization_id);

    let member = User::new(Uuid::new_v4()).with_organization(organization_id);
    let outsider = User::new(Uuid::new_v4()).with_organization(Uuid::new_v4());

    let result = authorizor.query_rule("has_role", (member.clone(), "member", job.clone()));
    assert!(result.unwrap().next().unwrap().is_ok());

    let result = authorizor.query_rule("has_role", (outsider.clone(), "member", job.clone()));
    assert!(result.unwrap().next().is_none());

    for action in ["read", "accept_bid", "cancel", "delete"] {
        let result = authorizor.is_allowed(member.clone(), action, job.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(outsider.clone(), action, job.clone());
        assert_eq!(result.unwrap(), false);
    }

    let result = authorizor.is_allowed(User::new_system_user(), "accept_bid", job.clone());
    assert_eq!(result.unwrap(), true);
}

#[test]
fn bid_bidder_role_test() {
    use chrono::Utc;
    use uuid::Uuid;

    let authorizor = new().unwrap();

    let driver = User::new(Uuid::new_v4());
    let other = User::new(Uuid::new_v4());
    let bid = Bid::new(Uuid::new_v4(), driver.id, 4200, Utc::now()).unwrap();

    for action in ["confirm", "withdraw", "start", "complete"] {
        let result = authorizor.is_allowed(driver.clone(), action, bid.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(other.clone(), action, bid.clone());
        assert_eq!(result.unwrap(), false);
    }

    // the system may look but not act for the driver
    let result = authorizor.is_allowed(User::new_system_user(), "read", bid.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(User::new_system_user(), "confirm", bid.clone());
    assert_eq!(result.unwrap(), false);
}

#[test]
fn driver_owner_and_system_role_test() {
    use uuid::Uuid;

    let authorizor = new().unwrap();

    let user = User::new(Uuid::new_v4());
    let driver = Driver::new(user.id);

    let result = authorizor.is_allowed(user.clone(), "bid", driver.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(user.clone(), "approve", driver.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(User::new_system_user(), "approve", driver.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(User::new_system_user(), "bid", driver.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(user.clone(), "assign_organizations", driver.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(User::new_system_user(), "assign_organizations", driver);
    assert_eq!(result.unwrap(), true);
}
