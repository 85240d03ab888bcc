use std::path::PathBuf;

use serde::Deserialize;

/// Hard cap on an upload request body. Enforced at the router boundary,
/// not inside the ingestion pipeline.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub pending_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://meterlog.sqlite".into());
        let upload_dir: PathBuf = std::env::var("UPLOAD_DIR")
            .unwrap_or_else(|_| "./uploads".into())
            .into();
        let jwt = JwtConfig {
            secret: std::env::var("SECRET_KEY")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "meterlog".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "meterlog-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            pending_ttl_minutes: std::env::var("PENDING_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(30),
        };
        Ok(Self {
            database_url,
            upload_dir,
            jwt,
        })
    }
}
