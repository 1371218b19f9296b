use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{BidReceipt, DynAPI};
use crate::auth::User;
use crate::entities::{Acceptance, Bid, Withdrawal};
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct CreateParams {
    amount: i64,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(job_id): Path<Uuid>,
    Json(params): Json<CreateParams>,
) -> Result<Json<BidReceipt>, Error> {
    let receipt = api.create_bid(user, job_id, params.amount).await?;

    Ok(receipt.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Bid>, Error> {
    let bid = api.find_bid(user, id).await?;

    Ok(bid.into())
}

pub async fn accept(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Acceptance>, Error> {
    let acceptance = api.accept_bid(user, id).await?;

    Ok(acceptance.into())
}

pub async fn confirm(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Bid>, Error> {
    let bid = api.confirm_bid(user, id).await?;

    Ok(bid.into())
}

pub async fn withdraw(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Withdrawal>, Error> {
    let withdrawal = api.withdraw_bid(user, id).await?;

    Ok(withdrawal.into())
}
