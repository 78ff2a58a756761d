use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::Config;
use crate::credential::PasswordHasher;
use crate::mail::MailDispatcher;
use crate::service::Drive;
use crate::storage::BlobStore;
use crate::ws::Hub;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Portal operations
    pub drive: Drive,
    /// Live notification connections
    pub hub: Arc<Hub>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        db: DatabaseConnection,
        config: Config,
        blobs: Arc<dyn BlobStore>,
        mailer: Arc<dyn MailDispatcher>,
        hasher: PasswordHasher,
    ) -> Self {
        let config = Arc::new(config);
        let hub = Arc::new(Hub::new());
        let drive = Drive::new(db, config.clone(), blobs, hub.clone(), mailer, hasher);

        Self { config, drive, hub }
    }
}
