//! S3 adapter built on aws-sdk-s3: small objects go through a single
//! PutObject, large uploads use multipart. Transient failures are retried
//! here with exponential backoff; the handle layer never retries.

use super::client::{
    ContentMeta, FetchedObject, ListPage, ListRequest, ObjectBackend, ObjectMeta, ObjectSummary,
    PutAck, PutSource,
};
use super::transfer::Transfer;
use crate::error::StoreError;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::{
    io::AsyncWriteExt,
    sync::Semaphore,
    time::{Duration, sleep},
};
use tracing::{debug, warn};

/// S3 backend configuration.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Endpoint override for S3-compatible services (MinIO, rustfs, ...).
    pub endpoint: Option<String>,
    pub region: String,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`.
    pub force_path_style: bool,
    /// Multipart part size in bytes; bodies up to this size use a single put.
    pub part_size: usize,
    /// Maximum number of parts uploaded concurrently.
    pub max_concurrency: usize,
    pub max_retries: u32,
    /// Initial retry delay in milliseconds, doubled on every attempt.
    pub initial_retry_delay_ms: u64,
    pub timeout: Duration,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            force_path_style: false,
            part_size: 8 * 1024 * 1024, // 8MB
            max_concurrency: 8,
            max_retries: 3,
            initial_retry_delay_ms: 100,
            timeout: Duration::from_secs(30),
        }
    }
}

impl S3Config {
    /// Defaults overlaid with `BUCKETFS_S3_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(endpoint) = lookup("BUCKETFS_S3_ENDPOINT").filter(|s| !s.is_empty()) {
            config.endpoint = Some(endpoint);
            config.force_path_style = true;
        }
        if let Some(region) = lookup("BUCKETFS_S3_REGION").filter(|s| !s.is_empty()) {
            config.region = region;
        }
        if let Some(size) = lookup("BUCKETFS_S3_PART_SIZE").and_then(|s| s.parse().ok()) {
            config.part_size = size;
        }
        if let Some(retries) = lookup("BUCKETFS_S3_MAX_RETRIES").and_then(|s| s.parse().ok()) {
            config.max_retries = retries;
        }
        config
    }
}

pub struct S3Backend {
    client: Client,
    bucket: String,
    config: S3Config,
}

impl S3Backend {
    pub async fn new(bucket: impl Into<String>, config: S3Config) -> Self {
        let mut loader = aws_config::ConfigLoader::default()
            .credentials_provider(
                aws_config::environment::EnvironmentVariableCredentialsProvider::new(),
            )
            .region(aws_config::Region::new(config.region.clone()))
            .timeout_config(
                aws_config::timeout::TimeoutConfig::builder()
                    .operation_timeout(config.timeout)
                    .build(),
            );
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();
        Self::with_client(Client::from_conf(s3_config), bucket, config)
    }

    pub fn with_client(client: Client, bucket: impl Into<String>, config: S3Config) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            config,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn md5_base64(data: &[u8]) -> String {
        let sum = md5::compute(data);
        B64.encode(sum.0)
    }

    /// Runs `operation`, retrying transient failures. Errors classified as
    /// "no such key" are returned immediately.
    async fn execute_with_retry<T, F, Fut>(
        &self,
        operation: F,
        operation_name: &'static str,
    ) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        let max_retries = self.config.max_retries;
        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_not_found() => return Err(e),
                Err(e) => {
                    if attempt > max_retries {
                        warn!(operation_name, attempt, error = %e, "giving up");
                        return Err(e);
                    }
                    let delay_ms = self.config.initial_retry_delay_ms * 2u64.pow(attempt - 1);
                    debug!(operation_name, attempt, delay_ms, error = %e, "retrying");
                    sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    async fn put_single(
        &self,
        key: &str,
        data: Bytes,
        meta: Option<&ContentMeta>,
    ) -> Result<PutAck, StoreError> {
        let checksum = Self::md5_base64(&data);
        let content_type = meta.and_then(|m| m.content_type.clone());
        let size = data.len() as u64;
        let operation = || async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(data.clone()))
                .content_md5(checksum.clone())
                .set_content_type(content_type.clone())
                .send()
                .await
                .map_err(StoreError::backend)
        };
        let out = self.execute_with_retry(operation, "put_object").await?;
        Ok(PutAck {
            etag: out.e_tag().map(str::to_string),
            size: Some(size),
            // PutObject does not report a modification time
            last_modified: None,
        })
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
        semaphore: Arc<Semaphore>,
    ) -> Result<CompletedPart, StoreError> {
        let _permit = semaphore.acquire().await.map_err(StoreError::backend)?;
        let checksum = Self::md5_base64(&data);

        let operation = || async {
            self.client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .content_md5(checksum.clone())
                .body(ByteStream::from(data.clone()))
                .send()
                .await
                .map_err(StoreError::backend)
        };

        let resp = self.execute_with_retry(operation, "upload_part").await?;
        Ok(CompletedPart::builder()
            .part_number(part_number)
            .set_e_tag(resp.e_tag().map(str::to_string))
            .build())
    }

    async fn put_multipart(&self, key: &str, data: Bytes) -> Result<PutAck, StoreError> {
        let create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(StoreError::backend)?;
        let upload_id = create.upload_id().unwrap_or_default().to_string();
        let sem = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        let mut parts = Vec::new();
        let total = data.len();
        let mut idx = 0usize;
        let mut part_number = 1i32;
        while idx < total {
            let end = (idx + self.config.part_size).min(total);
            parts.push(self.upload_part(
                key,
                &upload_id,
                part_number,
                data.slice(idx..end),
                sem.clone(),
            ));
            idx = end;
            part_number += 1;
        }

        let completed_parts = match futures::future::try_join_all(parts).await {
            Ok(v) => v,
            Err(e) => {
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key, error = %abort, "failed to abort multipart upload");
                }
                return Err(e);
            }
        };

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();
        let out = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(StoreError::backend)?;

        Ok(PutAck {
            etag: out.e_tag().map(str::to_string),
            size: Some(total as u64),
            last_modified: None,
        })
    }
}

fn to_chrono(dt: Option<&aws_sdk_s3::primitives::DateTime>) -> DateTime<Utc> {
    dt.and_then(|d| DateTime::from_timestamp(d.secs(), d.subsec_nanos()))
        .unwrap_or_default()
}

fn not_found_or<E>(key: &str, err: SdkError<E>, is_missing: impl Fn(&E) -> bool) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    match err {
        SdkError::ServiceError(ctx) if is_missing(ctx.err()) => StoreError::NoSuchKey {
            key: key.to_string(),
        },
        other => StoreError::backend(other),
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    async fn fetch_object(&self, key: &str) -> Result<FetchedObject, StoreError> {
        let operation = || async {
            let out = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| not_found_or(key, e, |e| e.is_no_such_key()))?;
            let meta = ObjectMeta {
                key: key.to_string(),
                etag: out.e_tag().unwrap_or_default().to_string(),
                size: out.content_length().unwrap_or_default().max(0) as u64,
                last_modified: to_chrono(out.last_modified()),
                content_type: out.content_type().map(str::to_string),
            };
            let content = out
                .body
                .collect()
                .await
                .map_err(StoreError::backend)?
                .into_bytes();
            Ok(FetchedObject { meta, content })
        };
        self.execute_with_retry(operation, "get_object").await
    }

    async fn fetch_metadata(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        let operation = || async {
            let out = self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| not_found_or(key, e, |e| e.is_not_found()))?;
            Ok(ObjectMeta {
                key: key.to_string(),
                etag: out.e_tag().unwrap_or_default().to_string(),
                size: out.content_length().unwrap_or_default().max(0) as u64,
                last_modified: to_chrono(out.last_modified()),
                content_type: out.content_type().map(str::to_string),
            })
        };
        self.execute_with_retry(operation, "head_object").await
    }

    async fn put_object(
        &self,
        key: &str,
        source: PutSource,
        meta: Option<ContentMeta>,
    ) -> Result<PutAck, StoreError> {
        let data = source.into_bytes().await?;
        if data.len() <= self.config.part_size {
            self.put_single(key, data, meta.as_ref()).await
        } else {
            self.put_multipart(key, data).await
        }
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        let operation = || async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(StoreError::backend)
        };
        self.execute_with_retry(operation, "delete_object").await?;
        Ok(())
    }

    async fn list(&self, request: &ListRequest) -> Result<ListPage, StoreError> {
        let operation = || async {
            self.client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(request.prefix.clone())
                .set_delimiter(request.delimiter.clone())
                .set_start_after(request.start_after.clone())
                .set_continuation_token(request.continuation_token.clone())
                .set_max_keys(request.max_keys.map(|m| m as i32))
                .send()
                .await
                .map_err(StoreError::backend)
        };
        let out = self.execute_with_retry(operation, "list_objects_v2").await?;

        let objects = out
            .contents()
            .iter()
            .map(|o| ObjectSummary {
                key: o.key().unwrap_or_default().to_string(),
                etag: o.e_tag().unwrap_or_default().to_string(),
                size: o.size().unwrap_or_default().max(0) as u64,
                last_modified: to_chrono(o.last_modified()),
            })
            .collect();
        let common_prefixes = out
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();
        Ok(ListPage {
            objects,
            common_prefixes,
            is_truncated: out.is_truncated().unwrap_or(false),
            next_continuation_token: out.next_continuation_token().map(str::to_string),
        })
    }

    fn begin_download(self: Arc<Self>, key: &str, destination: PathBuf) -> Transfer {
        let key = key.to_string();
        Transfer::spawn(key.clone(), async move {
            let out = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| not_found_or(&key, e, |e| e.is_no_such_key()))?;
            if let Some(dir) = destination.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            let mut file = tokio::fs::File::create(&destination).await?;
            let mut body = out.body;
            while let Some(chunk) = body.try_next().await.map_err(StoreError::backend)? {
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_from_env_overrides_defaults() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BUCKETFS_S3_ENDPOINT", "http://127.0.0.1:9000/"),
            ("BUCKETFS_S3_REGION", "zh-cn"),
            ("BUCKETFS_S3_PART_SIZE", "1048576"),
            ("BUCKETFS_S3_MAX_RETRIES", "not-a-number"),
        ]);
        let config = S3Config::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.endpoint.as_deref(), Some("http://127.0.0.1:9000/"));
        assert!(config.force_path_style);
        assert_eq!(config.region, "zh-cn");
        assert_eq!(config.part_size, 1024 * 1024);
        assert_eq!(config.max_retries, S3Config::default().max_retries);
    }

    #[test]
    fn test_md5_base64() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(S3Backend::md5_base64(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn test_to_chrono() {
        let dt = aws_sdk_s3::primitives::DateTime::from_secs(1_700_000_000);
        assert_eq!(to_chrono(Some(&dt)).timestamp(), 1_700_000_000);
        assert_eq!(to_chrono(None).timestamp(), 0);
    }
}
