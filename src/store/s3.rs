//! S3 backend built on the AWS SDK for Rust.

use super::{ObjectStore, StoreError, StoredObject};
use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::ByteStream as SdkByteStream;
use futures::StreamExt;
use std::path::Path;

/// [`ObjectStore`] over a single S3 bucket.
pub struct S3Store {
    client: S3Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from storage settings.
    ///
    /// Static credentials are used when configured; otherwise the default
    /// AWS credential chain applies. A custom endpoint switches to
    /// path-style addressing, which most S3-compatible stores require.
    pub async fn new(settings: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(settings.region.clone()));

        if let (Some(key_id), Some(secret)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                key_id,
                secret,
                None,
                None,
                "pixcache-config",
            ));
        }

        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: S3Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
        }
    }

    fn not_found(&self, key: &str) -> StoreError {
        StoreError::NotFound {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head(&self, key: &str) -> Result<bool, StoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StoreError::Network {
                        message: service_err.to_string(),
                    })
                }
            }
        }
    }

    async fn get(&self, key: &str) -> Result<StoredObject, StoreError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let service_err = err.into_service_error();
                return Err(if service_err.is_no_such_key() {
                    self.not_found(key)
                } else {
                    StoreError::Network {
                        message: service_err.to_string(),
                    }
                });
            }
        };

        let content_type = output.content_type().map(str::to_string);
        let content_length = output
            .content_length()
            .and_then(|len| u64::try_from(len).ok());
        let body = futures::stream::unfold(output.body, |mut body| async move {
            body.next().await.map(|chunk| {
                let chunk = chunk.map_err(|e| StoreError::Network {
                    message: e.to_string(),
                });
                (chunk, body)
            })
        })
        .boxed();

        Ok(StoredObject {
            content_type,
            content_length,
            body,
        })
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<String, StoreError> {
        let body = SdkByteStream::from_path(path)
            .await
            .map_err(|e| StoreError::Io {
                path: path.display().to_string(),
                source: std::io::Error::other(e),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|err| StoreError::Network {
                message: err.into_service_error().to_string(),
            })?;

        Ok(format!("s3://{}/{}", self.bucket, key))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| StoreError::Network {
                message: err.into_service_error().to_string(),
            })?;
        Ok(())
    }
}
