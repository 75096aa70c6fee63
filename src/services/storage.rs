use anyhow::Context;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};

use crate::core::config::Settings;

/// Media seam used by evaluation: rendered overlays go in, source pages come
/// out. References are opaque to the engine.
#[async_trait]
pub(crate) trait ImageStore: Send + Sync {
    async fn store_image(&self, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<String>;

    async fn fetch_image(&self, reference: &str) -> anyhow::Result<Vec<u8>>;
}

/// Content-addressed key for a rendered overlay.
pub(crate) fn evaluation_key(bytes: &[u8], content_type: &str) -> String {
    let hash_hex = hex::encode(Sha256::digest(bytes));
    let extension = match content_type {
        "image/jpeg" => "jpg",
        _ => "png",
    };
    format!("evaluations/{hash_hex}.{extension}")
}

#[derive(Debug, Clone)]
pub(crate) struct StorageService {
    client: Client,
    bucket: String,
}

impl StorageService {
    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        let s3 = settings.s3();
        if !s3.is_configured() {
            return Ok(None);
        }

        let creds = Credentials::new(
            s3.access_key.clone(),
            s3.secret_key.clone(),
            None,
            None,
            "exam-evaluation-static",
        );

        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(s3.endpoint.clone())
            .region(aws_config::Region::new(s3.region.clone()))
            .credentials_provider(creds)
            .load()
            .await;

        let client = Client::new(&config);

        Ok(Some(Self { client, bucket: s3.bucket.clone() }))
    }
}

#[async_trait]
impl ImageStore for StorageService {
    async fn store_image(&self, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<String> {
        let key = evaluation_key(&bytes, content_type);
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("Failed to upload {key}"))?;

        tracing::debug!(key = %key, size, "Stored evaluated page");
        Ok(key)
    }

    async fn fetch_image(&self, reference: &str) -> anyhow::Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(reference)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {reference}"))?;

        let body = object
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read body of {reference}"))?;

        Ok(body.into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::evaluation_key;

    #[test]
    fn evaluation_key_is_content_addressed() {
        let first = evaluation_key(b"page-one", "image/png");
        let again = evaluation_key(b"page-one", "image/png");
        let other = evaluation_key(b"page-two", "image/png");

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert!(first.starts_with("evaluations/"));
        assert!(first.ends_with(".png"));
        assert!(evaluation_key(b"x", "image/jpeg").ends_with(".jpg"));
    }
}
