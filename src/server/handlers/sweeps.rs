use axum::extract::{Extension, Json};
use axum::http::HeaderMap;

use crate::api::{DynAPI, SweepOutcome};
use crate::auth::User;
use crate::error::Error;
use crate::server::SweeperSecret;

pub const SWEEPER_SECRET_HEADER: &str = "x-sweeper-secret";

/// Whether the presented header matches the configured secret. With no
/// secret configured the trigger is closed.
fn is_authorized(headers: &HeaderMap, secret: &SweeperSecret) -> bool {
    let expected = match &secret.0 {
        Some(expected) if !expected.is_empty() => expected,
        _ => return false,
    };

    headers
        .get(SWEEPER_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|presented| presented == expected)
        .unwrap_or(false)
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    Extension(secret): Extension<SweeperSecret>,
    headers: HeaderMap,
) -> Result<Json<SweepOutcome>, Error> {
    if !is_authorized(&headers, &secret) {
        tracing::warn!("sweep trigger rejected");
        return Err(Error::not_owner_error());
    }

    let outcome = api.trigger_sweep(User::new_system_user()).await?;

    Ok(outcome.into())
}
