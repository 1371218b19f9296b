use std::time::Duration;

use async_trait::async_trait;

use crate::{
    error::Error,
    notifier::{Notification, Notifier},
};

/// Posts each notification as JSON to a delivery service.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[tracing::instrument(skip(self, notification), fields(recipient_id = %notification.recipient_id))]
    async fn notify(&self, notification: Notification) -> Result<(), Error> {
        let res = self.client.post(&self.url).json(&notification).send().await?;

        if !res.status().is_success() {
            tracing::warn!(status = %res.status(), "notification webhook rejected delivery");
            return Err(Error::upstream_error());
        }

        Ok(())
    }
}
