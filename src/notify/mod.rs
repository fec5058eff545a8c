//! Notification dispatch
//!
//! A notice is rendered once and handed to every configured sink. Delivery
//! runs on a spawned task; a failing sink is logged and never affects the
//! other sinks or the request that triggered it.

pub mod mail;
pub mod render;
pub mod store;

use async_trait::async_trait;
use futures::future::join_all;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::sync::Arc;

use crate::config::MailConfig;
use crate::entity::user;

pub use render::{render_change, render_share, ChangeType, NotificationKind, RenderedNotification};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: i64,
    pub name: String,
    pub email: String,
}

impl From<user::Model> for Recipient {
    fn from(model: user::Model) -> Self {
        Self {
            user_id: model.id,
            name: model.name,
            email: model.email,
        }
    }
}

/// A delivery channel
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, recipient: &Recipient, notice: &RenderedNotification) -> anyhow::Result<()>;
}

#[derive(Clone, Default)]
pub struct Notifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// In-app store always, mail when enabled and configured correctly
    pub fn from_config(db: DatabaseConnection, mail: &MailConfig) -> Self {
        let notifier = Self::new().with_sink(Arc::new(store::DatabaseSink::new(db)));
        if !mail.enabled {
            return notifier;
        }
        match mail::MailSink::from_config(mail) {
            Ok(sink) => {
                tracing::info!("Mail notifications enabled via {}:{}", mail.smtp_host, mail.smtp_port);
                notifier.with_sink(Arc::new(sink))
            }
            Err(e) => {
                tracing::error!("Mail notifications disabled, bad configuration: {}", e);
                notifier
            }
        }
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Deliver to every sink and wait for all of them
    pub async fn deliver(&self, recipient: &Recipient, notice: &RenderedNotification) {
        let results = join_all(self.sinks.iter().map(|sink| async move {
            (sink.name(), sink.deliver(recipient, notice).await)
        }))
        .await;

        for (name, result) in results {
            if let Err(e) = result {
                tracing::warn!(
                    "Notification sink '{}' failed for user {}: {:#}",
                    name,
                    recipient.user_id,
                    e
                );
            }
        }
    }

    /// Fire and forget
    pub fn dispatch(&self, recipient: Recipient, notice: RenderedNotification) {
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.deliver(&recipient, &notice).await;
        });
    }

    /// Look up live users by id and dispatch to each, skipping `exclude`
    pub fn notify_users(
        &self,
        db: &DatabaseConnection,
        user_ids: Vec<i64>,
        exclude: Option<i64>,
        notice: RenderedNotification,
    ) {
        let notifier = self.clone();
        let db = db.clone();
        tokio::spawn(async move {
            for user_id in user_ids {
                if Some(user_id) == exclude {
                    continue;
                }
                match user::Entity::find_by_id(user_id).one(&db).await {
                    Ok(Some(model)) if !model.is_deleted() => {
                        notifier.deliver(&Recipient::from(model), &notice).await;
                    }
                    Ok(_) => tracing::debug!("Skipping notification for missing user {}", user_id),
                    Err(e) => tracing::error!("Failed to load notification recipient {}: {}", user_id, e),
                }
            }
        });
    }
}
