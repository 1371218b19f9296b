use std::sync::Arc;

use accessride::api::DynAPI;
use accessride::config::Config;
use accessride::db::PgStore;
use accessride::engine::{sweeper, Engine};
use accessride::error::Error;
use accessride::external::{postcodes_io::PostcodesIo, webhook::WebhookNotifier};
use accessride::geocoder::Geocoder;
use accessride::notifier::{LogNotifier, Notifier};
use accessride::server::{serve, SweeperSecret};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    let store = PgStore::new(&config.database_url, config.database_max_connections).await?;

    let geocoder = Geocoder::new(Arc::new(PostcodesIo::new(&config.geocoder)?), &config.geocoder);

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
        None => {
            tracing::info!("no webhook configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    };

    let engine = Engine::new(store, geocoder, notifier, &config.matching, &config.bidding)?;
    let api = Arc::new(engine) as DynAPI;

    if let Some(every) = config.sweep_interval {
        tokio::spawn(sweeper::run_forever(api.clone(), every));
    }

    if config.sweeper_secret.is_none() {
        tracing::warn!("SWEEPER_SECRET is not set, the sweep trigger is disabled");
    }

    serve(api, config.listen_addr, SweeperSecret(config.sweeper_secret)).await
}
