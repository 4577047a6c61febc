use std::env;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream, Client};
use bytes::Bytes;

use super::{ObjectBackend, ObjectEntry, ProgressSink, PutOutcome};
use crate::{MediaError, MediaResult, UploadPart};

/// Connection settings for an S3-compatible bucket service
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    /// Set for non-AWS S3-compatible services
    pub endpoint_url: Option<String>,
    /// Required by most S3-compatible services
    pub force_path_style: bool,
}

impl S3Config {
    /// Read connection settings from `MEDIA_S3_*` environment variables
    pub fn from_env() -> MediaResult<Self> {
        fn get_env(key: &str) -> MediaResult<String> {
            env::var(key).map_err(|_| MediaError::TransportConfig {
                name: format!("{} environment variable required", key),
            })
        }

        Ok(Self {
            region: get_env("MEDIA_S3_REGION")?,
            access_key_id: get_env("MEDIA_S3_ACCESS_KEY_ID")?,
            secret_access_key: get_env("MEDIA_S3_SECRET_ACCESS_KEY")?,
            bucket: get_env("MEDIA_S3_BUCKET")?,
            endpoint_url: env::var("MEDIA_S3_ENDPOINT_URL").ok(),
            force_path_style: true,
        })
    }
}

/// Bucket-service backend over the AWS SDK.
///
/// Progress granularity is per part: the SDK does not surface transfer
/// progress, so the sink fires once when a part lands.
#[derive(Clone, Debug)]
pub struct S3Backend {
    client: Client,
    bucket: String,
}

impl S3Backend {
    pub async fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "mediakit",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);
        if let Some(endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let aws_config = loader.load().await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(config.force_path_style)
                .build(),
        );

        Self {
            client,
            bucket: config.bucket,
        }
    }

    /// Build from `MEDIA_S3_*` environment variables
    pub async fn from_env() -> MediaResult<Self> {
        Ok(Self::new(S3Config::from_env()?).await)
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    async fn put(&self, part: &UploadPart, progress: ProgressSink<'_>) -> MediaResult<PutOutcome> {
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&part.key)
            .content_type(&part.content_type)
            .content_length(part.content_length as i64)
            .body(ByteStream::from(part.body.to_vec()))
            .send()
            .await
            .map_err(|e| MediaError::transport(&part.key, e.to_string()))?;

        progress(part.content_length);

        Ok(PutOutcome {
            etag: result.e_tag,
            size: part.content_length,
        })
    }

    async fn list(&self, prefix: &str) -> MediaResult<Vec<ObjectEntry>> {
        let result = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .send()
            .await
            .map_err(|e| MediaError::backend(e.into_service_error()))?;

        Ok(result
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|object| {
                object.key.map(|key| ObjectEntry {
                    key,
                    size: object.size.unwrap_or(0).max(0) as u64,
                    etag: object.e_tag,
                })
            })
            .collect())
    }

    async fn get(&self, key: &str) -> MediaResult<Bytes> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    MediaError::not_found(key)
                } else {
                    MediaError::backend(service)
                }
            })?;

        let body = result
            .body
            .collect()
            .await
            .map_err(MediaError::backend)?;
        Ok(body.into_bytes())
    }

    async fn delete(&self, key: &str) -> MediaResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| MediaError::backend(e.into_service_error()))?;
        Ok(())
    }
}
