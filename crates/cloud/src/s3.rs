//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from dt-core.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use jiff::Timestamp;

use dt_core::config::S3Settings;
use dt_core::{CloudPath, Error, ObjectInfo, ObjectStore, Result};

/// Static credentials passed straight to the SDK
#[derive(Clone)]
pub struct StaticCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

/// Connection options for [`S3Client`]
///
/// Unset values fall back to the AWS default provider chain (environment,
/// profile, instance metadata).
#[derive(Debug, Clone, Default)]
pub struct S3Options {
    /// Endpoint for S3-compatible services such as MinIO
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub force_path_style: bool,
    pub credentials: Option<StaticCredentials>,
}

impl From<&S3Settings> for S3Options {
    fn from(settings: &S3Settings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            region: settings.region.clone(),
            force_path_style: settings.force_path_style,
            credentials: None,
        }
    }
}

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
}

impl S3Client {
    /// Create a new S3 client
    pub async fn new(options: S3Options) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = options.region {
            loader = loader.region(aws_config::Region::new(region));
        }
        if let Some(endpoint) = &options.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some(creds) = options.credentials {
            let credentials = aws_credential_types::Credentials::new(
                creds.access_key,
                creds.secret_key,
                None, // session token
                None, // expiry
                "dt-static-credentials",
            );
            loader = loader.credentials_provider(credentials);
        }

        let config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(options.force_path_style)
            .build();

        tracing::debug!(
            endpoint = ?options.endpoint,
            path_style = options.force_path_style,
            "S3 client configured"
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    /// Format AWS SDK error into a detailed error message
    fn format_sdk_error<E: std::fmt::Display>(error: &SdkError<E>) -> String {
        match error {
            SdkError::ServiceError(service_err) => {
                let err = service_err.err();
                let meta = service_err.raw();
                let mut msg = format!("Service error: {err}");
                if let Some(code) = meta.headers().get("x-amz-error-code")
                    && let Ok(code_str) = std::str::from_utf8(code.as_bytes())
                {
                    msg.push_str(&format!(" (code: {code_str})"));
                }
                msg
            }
            SdkError::ConstructionFailure(err) => {
                format!("Request construction failed: {err:?}")
            }
            SdkError::TimeoutError(_) => "Request timeout".to_string(),
            SdkError::DispatchFailure(err) => format!("Network dispatch error: {err:?}"),
            SdkError::ResponseError(err) => format!("Response error: {err:?}"),
            _ => error.to_string(),
        }
    }

    /// Map an SDK error for `path`, treating missing keys and buckets as
    /// [`Error::NotFound`]
    fn map_error<E: std::fmt::Display>(
        error: SdkError<E>,
        path: &CloudPath,
        is_missing: impl FnOnce(&E) -> bool,
    ) -> Error {
        if error.as_service_error().is_some_and(is_missing) {
            return Error::NotFound(path.to_string());
        }
        let msg = Self::format_sdk_error(&error);
        if msg.contains("NotFound") || msg.contains("NoSuchKey") || msg.contains("NoSuchBucket")
        {
            Error::NotFound(path.to_string())
        } else {
            Error::Network(msg)
        }
    }
}

fn content_type_for(path: &CloudPath) -> String {
    mime_guess::from_path(&path.key)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// `bucket/key` for the CopySource header, percent-encoded per segment
fn copy_source(path: &CloudPath) -> String {
    let key: Vec<_> = path
        .key
        .split('/')
        .map(urlencoding::encode)
        .collect();
    format!("{}/{}", path.bucket, key.join("/"))
}

fn timestamp(dt: &aws_sdk_s3::primitives::DateTime) -> Option<Timestamp> {
    Timestamp::from_second(dt.secs()).ok()
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn head_object(&self, path: &CloudPath) -> Result<ObjectInfo> {
        let response = self
            .inner
            .head_object()
            .bucket(&path.bucket)
            .key(&path.key)
            .send()
            .await
            .map_err(|e| Self::map_error(e, path, |err| err.is_not_found()))?;

        let size = response.content_length().unwrap_or(0);
        let mut info = ObjectInfo::file(&path.key, size);
        info.last_modified = response.last_modified().and_then(timestamp);
        info.etag = response.e_tag().map(|etag| etag.trim_matches('"').to_string());
        info.content_type = response.content_type().map(str::to_string);

        Ok(info)
    }

    async fn get_object(&self, path: &CloudPath) -> Result<Vec<u8>> {
        let response = self
            .inner
            .get_object()
            .bucket(&path.bucket)
            .key(&path.key)
            .send()
            .await
            .map_err(|e| Self::map_error(e, path, |err| err.is_no_such_key()))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn put_object(&self, path: &CloudPath, data: Vec<u8>) -> Result<ObjectInfo> {
        let size = data.len() as i64;
        let content_type = content_type_for(path);

        let response = self
            .inner
            .put_object()
            .bucket(&path.bucket)
            .key(&path.key)
            .content_type(&content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| Self::map_error(e, path, |_| false))?;

        let mut info = ObjectInfo::file(&path.key, size);
        info.etag = response.e_tag().map(|etag| etag.trim_matches('"').to_string());
        info.last_modified = Some(Timestamp::now());
        info.content_type = Some(content_type);

        Ok(info)
    }

    async fn delete_object(&self, path: &CloudPath) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(&path.bucket)
            .key(&path.key)
            .send()
            .await
            .map_err(|e| Self::map_error(e, path, |_| false))?;

        Ok(())
    }

    async fn copy_object(&self, src: &CloudPath, dst: &CloudPath) -> Result<ObjectInfo> {
        let copy_source = copy_source(src);

        let response = self
            .inner
            .copy_object()
            .copy_source(&copy_source)
            .bucket(&dst.bucket)
            .key(&dst.key)
            .send()
            .await
            .map_err(|e| Self::map_error(e, src, |_| false))?;

        // Copy does not report the size
        let mut info = self.head_object(dst).await?;
        if let Some(copy_result) = response.copy_object_result()
            && let Some(etag) = copy_result.e_tag()
        {
            info.etag = Some(etag.trim_matches('"').to_string());
        }

        Ok(info)
    }

    async fn prefix_exists(&self, path: &CloudPath, prefix: &str) -> Result<bool> {
        let mut request = self.inner.list_objects_v2().bucket(&path.bucket).max_keys(1);
        if !prefix.is_empty() {
            request = request.prefix(prefix);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_error(e, path, |err| err.is_no_such_bucket()))?;

        Ok(!response.contents().is_empty())
    }

    async fn upload_file(&self, local: &Path, dst: &CloudPath) -> Result<ObjectInfo> {
        let body = ByteStream::from_path(local)
            .await
            .map_err(|e| Error::General(format!("Failed to open {}: {e}", local.display())))?;
        let size = body.size_hint().1.map(|n| n as i64).unwrap_or(0);
        let content_type = content_type_for(dst);

        tracing::debug!(local = %local.display(), %dst, size, "Uploading file to S3");

        let response = self
            .inner
            .put_object()
            .bucket(&dst.bucket)
            .key(&dst.key)
            .content_type(&content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| Self::map_error(e, dst, |_| false))?;

        let mut info = ObjectInfo::file(&dst.key, size);
        info.etag = response.e_tag().map(|etag| etag.trim_matches('"').to_string());
        info.last_modified = Some(Timestamp::now());
        info.content_type = Some(content_type);

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dt_core::CloudScheme;

    #[test]
    fn test_content_type_guess() {
        let csv = CloudPath::new(CloudScheme::S3, "bucket", "data/report.csv");
        assert_eq!(content_type_for(&csv), "text/csv");

        let unknown = CloudPath::new(CloudScheme::S3, "bucket", "blob");
        assert_eq!(content_type_for(&unknown), "application/octet-stream");
    }

    #[test]
    fn test_copy_source_is_encoded() {
        let plain = CloudPath::new(CloudScheme::S3, "a", "dir/file.txt");
        assert_eq!(copy_source(&plain), "a/dir/file.txt");

        let odd = CloudPath::new(CloudScheme::S3, "a", "my dir/a+b 100%/été.txt");
        assert_eq!(copy_source(&odd), "a/my%20dir/a%2Bb%20100%25/%C3%A9t%C3%A9.txt");
    }

    #[test]
    fn test_options_from_settings() {
        let settings = S3Settings {
            endpoint: Some("http://localhost:9000".to_string()),
            region: Some("eu-west-1".to_string()),
            force_path_style: true,
        };
        let options = S3Options::from(&settings);
        assert_eq!(options.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(options.force_path_style);
        assert!(options.credentials.is_none());
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let creds = StaticCredentials {
            access_key: "AKIA".to_string(),
            secret_key: "very-secret".to_string(),
        };
        assert!(!format!("{creds:?}").contains("very-secret"));
    }

    #[tokio::test]
    async fn test_client_builds_without_network() {
        let client = S3Client::new(S3Options {
            endpoint: Some("http://localhost:9000".to_string()),
            region: Some("us-east-1".to_string()),
            force_path_style: true,
            credentials: Some(StaticCredentials {
                access_key: "access".to_string(),
                secret_key: "secret".to_string(),
            }),
        })
        .await
        .unwrap();
        assert!(client.inner().config().region().is_some());
    }
}
