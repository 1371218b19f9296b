mod handlers;

use std::net::SocketAddr;
use axum::{
    extract::Extension,
    routing::{get, patch, post},
    Router,
};

use crate::api::DynAPI;
use crate::error::Error;
use crate::server::handlers::{bids, drivers, jobs, sweeps};

/// Shared secret the sweep trigger must present.
#[derive(Clone)]
pub struct SweeperSecret(pub Option<String>);

pub fn router(api: DynAPI, sweeper_secret: SweeperSecret) -> Router {
    Router::new()
        .route("/jobs", post(jobs::create))
        .route("/jobs/:id", get(jobs::find).delete(jobs::delete))
        .route("/jobs/:id/requirements", patch(jobs::update_requirements))
        .route("/jobs/:id/cancel", patch(jobs::cancel))
        .route("/jobs/:id/start", patch(jobs::start))
        .route("/jobs/:id/complete", patch(jobs::complete))
        .route("/jobs/:id/matches", get(jobs::matches))
        .route("/jobs/:id/bids", post(bids::create))
        .route("/drivers", post(drivers::create))
        .route("/drivers/:id", get(drivers::find).patch(drivers::update))
        .route("/drivers/:id/approval", patch(drivers::approve))
        .route("/drivers/:id/matches", get(drivers::matches))
        .route("/drivers/:id/conflicts/:job_id", get(drivers::conflicts))
        .route("/bids/:id", get(bids::find))
        .route("/bids/:id/accept", patch(bids::accept))
        .route("/bids/:id/confirm", patch(bids::confirm))
        .route("/bids/:id/withdraw", patch(bids::withdraw))
        .route("/sweeps", post(sweeps::create))
        .layer(Extension(api))
        .layer(Extension(sweeper_secret))
}

pub async fn serve(api: DynAPI, addr: SocketAddr, sweeper_secret: SweeperSecret) -> Result<(), Error> {
    let app = router(api, sweeper_secret);

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|err| {
            tracing::error!(?err, "server stopped");
            Error::unexpected_error()
        })
}
