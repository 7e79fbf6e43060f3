use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use thiserror::Error;
use uuid::Uuid;

use super::sigv4::{self, CanonicalRequest, Credentials, SigningError};
use crate::form::PhotoFile;

pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object storage is not configured (set S3_ENDPOINT and S3_BUCKET_NAME)")]
    NotConfigured,
    #[error("could not sign upload of {key}: {source}")]
    Signing {
        key: String,
        #[source]
        source: SigningError,
    },
    #[error("upload of {key} failed: {source}")]
    Request {
        key: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("upload of {key} was rejected with status {status}")]
    Rejected {
        key: String,
        status: reqwest::StatusCode,
    },
}

#[derive(Debug, Clone, Default)]
pub struct StorageSettings {
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub credentials: Option<Credentials>,
    pub internal_base_url: Option<String>,
    pub public_base_url: Option<String>,
}

/// S3-compatible bucket addressed path-style (`<endpoint>/<bucket>/<key>`).
/// Uploads are SigV4-signed when credentials are configured.
#[derive(Clone)]
pub struct ObjectStorage {
    client: reqwest::Client,
    endpoint: Option<String>,
    bucket: Option<String>,
    region: String,
    credentials: Option<Credentials>,
    internal_base_url: Option<String>,
    public_base_url: Option<String>,
}

impl ObjectStorage {
    pub fn new(settings: StorageSettings) -> Self {
        let endpoint = settings
            .endpoint
            .map(|url| trim_slashes(&url))
            .filter(|url| !url.is_empty());
        Self {
            client: reqwest::Client::new(),
            internal_base_url: settings
                .internal_base_url
                .map(|url| trim_slashes(&url))
                .or_else(|| endpoint.clone()),
            public_base_url: settings.public_base_url.map(|url| trim_slashes(&url)),
            bucket: settings.bucket.filter(|name| !name.trim().is_empty()),
            region: settings
                .region
                .filter(|region| !region.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            credentials: settings.credentials,
            endpoint,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.bucket.is_some()
    }

    /// Uploads every photo concurrently and returns their public URLs in
    /// submission order. The first failure aborts the batch.
    pub async fn upload_photos(&self, photos: &[PhotoFile]) -> Result<Vec<String>, StorageError> {
        if photos.is_empty() {
            return Ok(Vec::new());
        }
        try_join_all(photos.iter().map(|photo| self.upload(photo))).await
    }

    async fn upload(&self, photo: &PhotoFile) -> Result<String, StorageError> {
        let key = object_key(&photo.file_name);
        let request = self.put_request(&key, photo, Utc::now())?;
        let url = request.url().to_string();

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|source| StorageError::Request {
                key: key.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(StorageError::Rejected {
                key,
                status: response.status(),
            });
        }

        log::debug!("Uploaded {key}");
        Ok(self.public_url(&url))
    }

    fn put_request(
        &self,
        key: &str,
        photo: &PhotoFile,
        at: DateTime<Utc>,
    ) -> Result<reqwest::Request, StorageError> {
        let (endpoint, bucket) = match (&self.endpoint, &self.bucket) {
            (Some(endpoint), Some(bucket)) => (endpoint, bucket),
            _ => return Err(StorageError::NotConfigured),
        };

        let mut request = self
            .client
            .put(format!("{endpoint}/{bucket}/{key}"))
            .header(CONTENT_TYPE, photo.content_type.as_str())
            .body(photo.bytes.clone())
            .build()
            .map_err(|source| StorageError::Request {
                key: key.to_string(),
                source,
            })?;

        if let Some(credentials) = &self.credentials {
            self.sign(&mut request, credentials, &photo.bytes, at)
                .map_err(|source| StorageError::Signing {
                    key: key.to_string(),
                    source,
                })?;
        }
        Ok(request)
    }

    fn sign(
        &self,
        request: &mut reqwest::Request,
        credentials: &Credentials,
        body: &[u8],
        at: DateTime<Utc>,
    ) -> Result<(), SigningError> {
        let payload_hash = sigv4::sha256_hex(body);
        let amz_date = sigv4::amz_date(at);
        let authorization = sigv4::authorization(
            credentials,
            &self.region,
            &CanonicalRequest {
                method: request.method().as_str(),
                path: request.url().path(),
                headers: vec![
                    ("host", host_header(request.url())),
                    ("x-amz-content-sha256", payload_hash.clone()),
                    ("x-amz-date", amz_date.clone()),
                ],
                payload_hash: &payload_hash,
            },
            at,
        )?;

        let headers = request.headers_mut();
        headers.insert("x-amz-date", HeaderValue::from_str(&amz_date)?);
        headers.insert("x-amz-content-sha256", HeaderValue::from_str(&payload_hash)?);
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&authorization)?);
        Ok(())
    }

    pub fn public_url(&self, url: &str) -> String {
        rewrite_public_url(
            url,
            self.internal_base_url.as_deref(),
            self.public_base_url.as_deref(),
        )
    }
}

/// `Host` as the client sends it: the port only when it is not the default.
fn host_header(url: &reqwest::Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// `properties/<millis>-<uuid>-<file name>`. The name is reduced to
/// `[A-Za-z0-9._-]` so the key needs no escaping in the signed path.
pub fn object_key(file_name: &str) -> String {
    let safe_name: String = file_name
        .trim()
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '-',
        })
        .collect();
    format!(
        "properties/{}-{}-{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4(),
        safe_name
    )
}

/// Swaps the internal object-store origin for the public one.
pub fn rewrite_public_url(url: &str, internal: Option<&str>, public: Option<&str>) -> String {
    match (internal, public) {
        (Some(internal), Some(public)) if !internal.is_empty() && !public.is_empty() => url
            .strip_prefix(internal)
            .map(|rest| format!("{public}{rest}"))
            .unwrap_or_else(|| url.to_string()),
        _ => url.to_string(),
    }
}

fn trim_slashes(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
