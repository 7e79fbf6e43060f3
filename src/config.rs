use std::env;

use crate::clients::sigv4::Credentials;
use crate::clients::storage::StorageSettings;

pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = "MadagouListingService/0.1 (contact@madagou.mg)";

/// Settings read from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub geocoder_url: String,
    pub geocoder_user_agent: String,
    pub s3_endpoint: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub storage_internal_base_url: Option<String>,
    pub storage_public_base_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> std::io::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> std::io::Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = var("DATABASE_URL").ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "DATABASE_URL must be set in environment",
            )
        })?;

        let port = match var("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("PORT must be a valid port number, got '{raw}'"),
                )
            })?,
            None => 3002,
        };

        let s3_endpoint = var("S3_ENDPOINT").or_else(|| var("AWS_ENDPOINT"));

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            database_url,
            geocoder_url: var("GEOCODER_URL").unwrap_or_else(|| DEFAULT_GEOCODER_URL.to_string()),
            geocoder_user_agent: var("GEOCODER_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            storage_internal_base_url: var("MINIO_INTERNAL_BASE_URL")
                .or_else(|| s3_endpoint.clone()),
            storage_public_base_url: var("MINIO_PUBLIC_BASE_URL"),
            s3_bucket: var("S3_BUCKET_NAME"),
            s3_region: var("AWS_REGION"),
            s3_access_key_id: var("AWS_ACCESS_KEY_ID"),
            s3_secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
            s3_endpoint,
        })
    }

    /// Credentials are used only when both halves of the key pair are set.
    pub fn storage_settings(&self) -> StorageSettings {
        let credentials = match (&self.s3_access_key_id, &self.s3_secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Some(Credentials {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
            }),
            _ => None,
        };
        StorageSettings {
            endpoint: self.s3_endpoint.clone(),
            bucket: self.s3_bucket.clone(),
            region: self.s3_region.clone(),
            credentials,
            internal_base_url: self.storage_internal_base_url.clone(),
            public_base_url: self.storage_public_base_url.clone(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
