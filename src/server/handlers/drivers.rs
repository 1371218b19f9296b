use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::DynAPI;
use crate::auth::User;
use crate::conflict::ConflictReport;
use crate::entities::{Driver, DriverProfile};
use crate::error::Error;
use crate::matching::MatchResult;

#[derive(Serialize, Deserialize)]
pub struct ApproveParams {
    approved: bool,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(profile): Json<DriverProfile>,
) -> Result<Json<Driver>, Error> {
    let driver = api.create_driver(user, profile).await?;

    Ok(driver.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, Error> {
    let driver = api.find_driver(user, id).await?;

    Ok(driver.into())
}

pub async fn update(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(profile): Json<DriverProfile>,
) -> Result<Json<Driver>, Error> {
    let driver = api.update_driver(user, id, profile).await?;

    Ok(driver.into())
}

pub async fn approve(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<ApproveParams>,
) -> Result<Json<Driver>, Error> {
    let driver = api.approve_driver(user, id, params.approved).await?;

    Ok(driver.into())
}

pub async fn matches(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MatchResult>>, Error> {
    let matches = api.find_jobs_for_driver(user, id).await?;

    Ok(matches.into())
}

pub async fn conflicts(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path((id, job_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ConflictReport>, Error> {
    let report = api.preview_conflicts(user, id, job_id).await?;

    Ok(report.into())
}
