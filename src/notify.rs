//! User notifications about newly detected trips.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::NotificationConfig;
use crate::db::sqlite::SqliteDb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Single,
    Multiple,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Single => "single",
            NotificationKind::Multiple => "multiple",
        }
    }
}

/// Summary of a trip created during a detection run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedTrip {
    pub id: i64,
    pub name: String,
    pub photo_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub subject: String,
    pub message: String,
    pub payload: serde_json::Value,
}

impl Notification {
    /// Build the notification for the trips one run created, `None` when
    /// nothing was created.
    pub fn for_trips(user_id: &str, trips: &[CreatedTrip]) -> Option<Self> {
        let notification = match trips {
            [] => return None,
            [trip] => Notification {
                user_id: user_id.to_string(),
                kind: NotificationKind::Single,
                subject: format!("New trip detected: {}", trip.name),
                message: format!(
                    "A new trip with {} photos was detected and added to your Memories.",
                    trip.photo_count
                ),
                payload: json!({
                    "trip_id": trip.id,
                    "trip_name": trip.name,
                    "photo_count": trip.photo_count,
                }),
            },
            _ => {
                let total: usize = trips.iter().map(|t| t.photo_count).sum();
                Notification {
                    user_id: user_id.to_string(),
                    kind: NotificationKind::Multiple,
                    subject: format!("{} new trips detected", trips.len()),
                    message: format!(
                        "Found {} new trips with a total of {} photos in your Memories.",
                        trips.len(),
                        total
                    ),
                    payload: json!({
                        "trip_count": trips.len(),
                        "total_photos": total,
                        "trips": trips,
                    }),
                }
            }
        };
        Some(notification)
    }
}

/// Destination for notifications. Delivery is best effort: callers log
/// and drop errors.
pub trait NotificationSink {
    fn notify(&self, notification: &Notification) -> Result<()>;
}

impl<T: NotificationSink + ?Sized> NotificationSink for &T {
    fn notify(&self, notification: &Notification) -> Result<()> {
        (**self).notify(notification)
    }
}

/// Stores notifications in the database inbox.
pub struct DatabaseNotifier<'a> {
    db: &'a SqliteDb,
}

impl<'a> DatabaseNotifier<'a> {
    pub fn new(db: &'a SqliteDb) -> Self {
        Self { db }
    }
}

impl NotificationSink for DatabaseNotifier<'_> {
    fn notify(&self, notification: &Notification) -> Result<()> {
        let payload = serde_json::to_string(&notification.payload)?;
        let id = self
            .db
            .insert_notification(
                &notification.user_id,
                notification.kind.as_str(),
                &notification.subject,
                &notification.message,
                Some(&payload),
            )
            .context("Failed to store notification")?;
        debug!("Stored notification {} for {}", id, notification.user_id);
        Ok(())
    }
}

/// POSTs notifications as JSON to a webhook.
pub struct WebhookNotifier {
    url: String,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

impl NotificationSink for WebhookNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();

        agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_json(notification)
            .map_err(|e| anyhow!("Webhook request to {} failed: {}", self.url, e))?;

        debug!("Delivered notification for {} to {}", notification.user_id, self.url);
        Ok(())
    }
}

/// Fans a notification out to several sinks. Every sink is tried; the
/// first failure is reported.
#[derive(Default)]
pub struct NotifierSet<'a> {
    sinks: Vec<Box<dyn NotificationSink + 'a>>,
}

impl<'a> NotifierSet<'a> {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn push(&mut self, sink: impl NotificationSink + 'a) {
        self.sinks.push(Box::new(sink));
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl NotificationSink for NotifierSet<'_> {
    fn notify(&self, notification: &Notification) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.notify(notification) {
                warn!("Notification sink failed: {:#}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Sinks enabled by the configuration. Empty when notifications are off.
pub fn from_config<'a>(config: &NotificationConfig, db: &'a SqliteDb) -> NotifierSet<'a> {
    let mut sinks = NotifierSet::new();
    if !config.enabled {
        return sinks;
    }
    if config.store_in_db {
        sinks.push(DatabaseNotifier::new(db));
    }
    if let Some(url) = config.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
        sinks.push(WebhookNotifier::new(url, Duration::from_secs(config.timeout_secs)));
    }
    sinks
}
