use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::DynAPI;
use crate::auth::User;
use crate::entities::{Job, JobDraft, RequirementSet};
use crate::error::Error;
use crate::matching::MatchResult;

#[derive(Serialize, Deserialize)]
pub struct UpdateRequirementsParams {
    requirements: RequirementSet,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(draft): Json<JobDraft>,
) -> Result<Json<Job>, Error> {
    let job = api.create_job(user, draft).await?;

    Ok(job.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, Error> {
    let job = api.find_job(user, id).await?;

    Ok(job.into())
}

pub async fn update_requirements(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<UpdateRequirementsParams>,
) -> Result<Json<Job>, Error> {
    let job = api.update_job_requirements(user, id, params.requirements).await?;

    Ok(job.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, Error> {
    let job = api.cancel_job(user, id).await?;

    Ok(job.into())
}

pub async fn start(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, Error> {
    let job = api.start_job(user, id).await?;

    Ok(job.into())
}

pub async fn complete(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, Error> {
    let job = api.complete_job(user, id).await?;

    Ok(job.into())
}

pub async fn delete(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, Error> {
    let job = api.delete_job(user, id).await?;

    Ok(job.into())
}

pub async fn matches(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MatchResult>>, Error> {
    let matches = api.find_drivers_for_job(user, id).await?;

    Ok(matches.into())
}
