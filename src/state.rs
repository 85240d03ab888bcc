use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::ocr::{OcrEngine, TesseractEngine};
use crate::storage::UploadStore;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub uploads: UploadStore,
    pub ocr: Arc<dyn OcrEngine>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let options = SqliteConnectOptions::from_str(&config.database_url)
            .context("parse DATABASE_URL")?
            .create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("connect to database")?;

        let uploads = UploadStore::new(&config.upload_dir);
        uploads.ensure_root().await?;

        Ok(Self {
            db,
            config,
            uploads,
            ocr: Arc::new(TesseractEngine),
        })
    }

    pub fn from_parts(
        db: SqlitePool,
        config: Arc<AppConfig>,
        uploads: UploadStore,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        Self {
            db,
            config,
            uploads,
            ocr,
        }
    }

    /// State with a lazy in-memory pool and a canned OCR engine. The pool is
    /// unusable until migrated; tests that touch the database go through
    /// `test_state` instead.
    pub fn fake() -> Self {
        struct FakeOcr;
        impl OcrEngine for FakeOcr {
            fn recognize_digits(&self, _image: &image::GrayImage) -> anyhow::Result<String> {
                Ok("00045231".into())
            }
        }

        let db = SqlitePoolOptions::new()
            .connect_lazy("sqlite::memory:")
            .expect("lazy pool ok");

        let config = Arc::new(AppConfig {
            database_url: "sqlite::memory:".into(),
            upload_dir: std::env::temp_dir().join("meterlog-fake-uploads"),
            jwt: crate::config::JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                pending_ttl_minutes: 5,
            },
        });

        let uploads = UploadStore::new(&config.upload_dir);
        Self {
            db,
            config,
            uploads,
            ocr: Arc::new(FakeOcr),
        }
    }
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    // One connection so every query sees the same in-memory database.
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("apply schema");
    db
}

#[cfg(test)]
pub(crate) async fn test_state() -> AppState {
    let fake = AppState::fake();
    let dir = std::env::temp_dir().join(format!("meterlog-test-{}", uuid::Uuid::new_v4()));
    let uploads = UploadStore::new(dir);
    uploads.ensure_root().await.expect("create upload dir");
    AppState::from_parts(test_pool().await, fake.config.clone(), uploads, fake.ocr.clone())
}
