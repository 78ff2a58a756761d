//! Shared fixtures for database-backed tests

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::Config;
use crate::credential::PasswordHasher;
use crate::db::auto_migrate;
use crate::entity::user::{self, Role};
use crate::error::{AppError, AppResult};
use crate::mail::LogDispatcher;
use crate::service::Drive;
use crate::storage::{BlobStore, BlobStream, LocalBlobStore};
use crate::ws::Hub;

/// Fresh SQLite file database with the schema applied
pub async fn test_db() -> (DatabaseConnection, TempDir) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("test.db").display());
    let db = Database::connect(&url).await.unwrap();
    auto_migrate(&db).await.unwrap();
    (db, dir)
}

/// Switches that make the fixture's blob store fail on demand
#[derive(Debug, Default)]
pub struct BlobFaults {
    save: AtomicBool,
    delete: AtomicBool,
}

impl BlobFaults {
    pub fn fail_saves(&self, on: bool) {
        self.save.store(on, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, on: bool) {
        self.delete.store(on, Ordering::SeqCst);
    }
}

/// `LocalBlobStore` that honours `BlobFaults`
struct FaultyBlobStore {
    inner: LocalBlobStore,
    faults: Arc<BlobFaults>,
}

#[async_trait]
impl BlobStore for FaultyBlobStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> AppResult<()> {
        if self.faults.save.load(Ordering::SeqCst) {
            return Err(AppError::Storage(format!("injected write failure for {}", key)));
        }
        self.inner.save(key, bytes).await
    }

    async fn read(&self, key: &str) -> AppResult<Vec<u8>> {
        self.inner.read(key).await
    }

    async fn stream(&self, key: &str) -> AppResult<BlobStream> {
        self.inner.stream(key).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        if self.faults.delete.load(Ordering::SeqCst) {
            return Err(AppError::Storage(format!("injected delete failure for {}", key)));
        }
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        self.inner.exists(key).await
    }
}

pub struct Fixture {
    pub drive: Drive,
    /// Direct view of the blob directory, bypassing injected faults
    pub blobs: LocalBlobStore,
    pub faults: Arc<BlobFaults>,
    pub hub: Arc<Hub>,
    _dir: TempDir,
}

pub async fn fixture() -> Fixture {
    fixture_with(Config::default()).await
}

pub async fn fixture_with(mut config: Config) -> Fixture {
    let (db, dir) = test_db().await;
    config.upload_dir = dir.path().join("uploads");
    let blobs = LocalBlobStore::new(&config.upload_dir).await.unwrap();
    let faults = Arc::new(BlobFaults::default());
    let store = FaultyBlobStore {
        inner: blobs.clone(),
        faults: faults.clone(),
    };
    let hub = Arc::new(Hub::new());
    let drive = Drive::new(
        db,
        Arc::new(config),
        Arc::new(store),
        hub.clone(),
        Arc::new(LogDispatcher),
        PasswordHasher::new(4),
    );
    Fixture {
        drive,
        blobs,
        faults,
        hub,
        _dir: dir,
    }
}

impl Fixture {
    pub fn db(&self) -> &DatabaseConnection {
        self.drive.db()
    }

    /// Insert an active account directly
    pub async fn user(&self, name: &str, role: Role) -> user::Model {
        user::ActiveModel {
            email: Set(format!("{}@portal.test", name)),
            password: Set(String::new()),
            name: Set(name.to_string()),
            role: Set(role.as_str().to_string()),
            active: Set(true),
            created_by: Set(None),
            created_at: Set(0),
            last_login: Set(None),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .unwrap()
    }
}
