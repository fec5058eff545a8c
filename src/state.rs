use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::activity::ActivityLog;
use crate::config::Config;
use crate::convert::{Converter, OfficeConverter};
use crate::notify::Notifier;
use crate::storage::FileStore;
use crate::versioning::VersionLocks;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: DatabaseConnection,
    /// Application configuration
    pub config: Arc<Config>,
    /// Document file store
    pub store: FileStore,
    /// Office to PDF converter (None when disabled)
    pub converter: Option<Arc<dyn Converter>>,
    pub activity: ActivityLog,
    pub notifier: Notifier,
    /// Per-document version numbering locks
    pub version_locks: VersionLocks,
}

impl AppState {
    /// Create new application state
    pub fn new(db: DatabaseConnection, config: Config) -> Self {
        let store = FileStore::new(config.storage.root_dir.clone(), config.max_upload_size);
        let converter = OfficeConverter::from_config(&config.converter)
            .map(|c| Arc::new(c) as Arc<dyn Converter>);
        let notifier = Notifier::from_config(db.clone(), &config.mail);

        Self {
            activity: ActivityLog::new(db.clone()),
            db,
            config: Arc::new(config),
            store,
            converter,
            notifier,
            version_locks: VersionLocks::default(),
        }
    }

    pub fn with_converter(mut self, converter: Option<Arc<dyn Converter>>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn converter(&self) -> Option<&dyn Converter> {
        self.converter.as_deref()
    }
}
