use dotenvy::dotenv;
use std::env;

use crate::error::AppError;

/// How long a presence entry is trusted before readers treat it as idle.
/// Clients clear their own entries, but a vanished client must not leave a
/// peer staring at a stale "typing..." indicator.
pub const DEFAULT_PRESENCE_TTL_SECONDS: i64 = 5;

#[derive(Debug, Clone)]
pub struct BlobConfig {
    pub bucket: String,
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub port: u16,
    pub presence_ttl_seconds: i64,
    pub blob: Option<BlobConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty());
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let presence_ttl_seconds = env::var("PRESENCE_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PRESENCE_TTL_SECONDS);

        let blob = match env::var("BLOB_BUCKET") {
            Ok(bucket) if !bucket.trim().is_empty() => {
                let public_base_url = env::var("BLOB_PUBLIC_BASE_URL")
                    .unwrap_or_else(|_| format!("https://{bucket}.s3.amazonaws.com"));
                Some(BlobConfig {
                    bucket,
                    public_base_url,
                })
            }
            _ => None,
        };

        Ok(Self {
            database_url,
            redis_url,
            port,
            presence_ttl_seconds,
            blob,
        })
    }

    pub fn presence_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.presence_ttl_seconds)
    }

    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            redis_url: None,
            port: 3000,
            presence_ttl_seconds: DEFAULT_PRESENCE_TTL_SECONDS,
            blob: None,
        }
    }
}
