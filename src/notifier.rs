use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient_id: Uuid,
    pub title_text: String,
    pub body_text: String,
    pub related_job_id: Option<Uuid>,
}

impl Notification {
    pub fn new(recipient_id: Uuid, title: &str, body: &str, related_job_id: Uuid) -> Self {
        Self {
            recipient_id,
            title_text: title.into(),
            body_text: body.into(),
            related_job_id: Some(related_job_id),
        }
    }
}

/// Outbound notification delivery. Callers treat delivery as best effort: a
/// failed notification never rolls back the state change that produced it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), Error>;
}

/// Writes notifications to the log. Used when no webhook is configured.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), Error> {
        tracing::info!(
            recipient_id = %notification.recipient_id,
            related_job_id = ?notification.related_job_id,
            title = %notification.title_text,
            "notification"
        );

        Ok(())
    }
}

/// Delivers a notification and logs, rather than returns, any failure.
pub async fn notify_best_effort(notifier: &dyn Notifier, notification: Notification) {
    let recipient_id = notification.recipient_id;

    if let Err(err) = notifier.notify(notification).await {
        tracing::warn!(%recipient_id, ?err, "failed to deliver notification");
    }
}
