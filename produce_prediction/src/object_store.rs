use crate::config::{Credentials, StorageConfig};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{http::HttpResponse, timeout::TimeoutConfig, BehaviorVersion, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    Client,
};
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Error codes S3 answers with when the request signature or the
/// identity behind it is not accepted.
const AUTH_ERROR_CODES: [&str; 6] = [
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "AccessDenied",
    "ExpiredToken",
    "InvalidToken",
    "AuthorizationHeaderMalformed",
];

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("Object store rejected the credentials: {0}")]
    Unauthenticated(String),
    #[error("Bucket `{0}` contains no objects")]
    EmptyBucket(String),
    #[error("Object store request failed: {0}")]
    Storage(String),
    #[error("Failed to pre-sign object URL: {0}")]
    Presign(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalReference {
    pub key: String,
    pub url: String,
    pub expires_in: Duration,
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn list_objects(&self, bucket: &str) -> Result<Vec<StoredObject>, LocatorError>;

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, LocatorError>;
}

/// Newest object first; identical timestamps fall back to the smallest key.
pub fn select_latest(objects: &[StoredObject]) -> Option<&StoredObject> {
    objects.iter().max_by(|a, b| {
        a.last_modified
            .cmp(&b.last_modified)
            .then_with(|| b.key.cmp(&a.key))
    })
}

pub struct ObjectLocator<S: ObjectStore> {
    store: S,
    bucket: String,
    expires_in: Duration,
}

impl<S: ObjectStore> ObjectLocator<S> {
    pub fn new(store: S, bucket: &str, expires_in: Duration) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            expires_in,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn locate_latest(&self) -> Result<RetrievalReference, LocatorError> {
        let objects = self.store.list_objects(&self.bucket).await?;
        tracing::debug!("Listed {} objects", objects.len());

        let latest = select_latest(&objects)
            .ok_or_else(|| LocatorError::EmptyBucket(self.bucket.clone()))?;
        tracing::info!(
            key = %latest.key,
            last_modified = %latest.last_modified,
            "Selected most recent object"
        );

        let url = self
            .store
            .presign_get(&self.bucket, &latest.key, self.expires_in)
            .await?;

        Ok(RetrievalReference {
            key: latest.key.clone(),
            url,
            expires_in: self.expires_in,
        })
    }
}

pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(credentials: &Credentials, storage_config: &StorageConfig) -> Self {
        let static_credentials = aws_sdk_s3::config::Credentials::new(
            credentials.access_key.clone(),
            credentials.secret_key.clone(),
            None,
            None,
            "environment",
        );
        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(storage_config.timeout())
            .build();

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(credentials.region.clone()))
            .credentials_provider(static_credentials)
            .timeout_config(timeout_config);

        if let Some(endpoint_url) = &storage_config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

/// Maps an SDK failure to a short client-safe error; the full context is logged.
fn map_sdk_error<E>(err: SdkError<E, HttpResponse>) -> LocatorError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let code = err.as_service_error().and_then(|e| e.code()).map(str::to_string);
    let status = err.raw_response().map(|response| response.status().as_u16());
    tracing::error!(
        code = code.as_deref(),
        status,
        "Object store request failed: {}",
        DisplayErrorContext(&err)
    );

    let summary = match &err {
        SdkError::TimeoutError(_) => "request timed out",
        SdkError::DispatchFailure(_) => "object store unreachable",
        SdkError::ConstructionFailure(_) => "request could not be built",
        SdkError::ResponseError(_) => "unreadable response",
        _ => "request rejected",
    };
    let message = match (&code, status) {
        (Some(code), Some(status)) => format!("{} (HTTP {})", code, status),
        (Some(code), None) => code.clone(),
        (None, Some(status)) => format!("{} (HTTP {})", summary, status),
        (None, None) => summary.to_string(),
    };

    match code {
        Some(code) if AUTH_ERROR_CODES.contains(&code.as_str()) => {
            LocatorError::Unauthenticated(message)
        }
        _ if status == Some(403) => LocatorError::Unauthenticated(message),
        _ => LocatorError::Storage(message),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_objects(&self, bucket: &str) -> Result<Vec<StoredObject>, LocatorError> {
        let mut objects = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(map_sdk_error)?;
            for object in page.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                let last_modified = object
                    .last_modified()
                    .and_then(|ts| DateTime::from_timestamp(ts.secs(), ts.subsec_nanos()))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);

                objects.push(StoredObject {
                    key: key.to_string(),
                    last_modified,
                });
            }
        }

        Ok(objects)
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, LocatorError> {
        let presigning_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| LocatorError::Presign(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| match map_sdk_error(e) {
                LocatorError::Storage(message) => LocatorError::Presign(message),
                other => other,
            })?;

        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use aws_sdk_s3::{error::ErrorMetadata, operation::list_objects_v2::ListObjectsV2Error};
    use aws_smithy_types::body::SdkBody;
    use chrono::TimeZone;
    use std::sync::Mutex;

    pub(crate) fn object(key: &str, secs: i64) -> StoredObject {
        StoredObject {
            key: key.to_string(),
            last_modified: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    pub(crate) enum ListOutcome {
        Objects(Vec<StoredObject>),
        Unauthenticated,
        Unreachable,
    }

    pub(crate) struct MockObjectStore {
        outcome: ListOutcome,
        url_base: String,
        presigned: Mutex<Vec<(String, Duration)>>,
    }

    impl MockObjectStore {
        pub(crate) fn new(outcome: ListOutcome, url_base: &str) -> Self {
            Self {
                outcome,
                url_base: url_base.to_string(),
                presigned: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn with_objects(objects: Vec<StoredObject>, url_base: &str) -> Self {
            Self::new(ListOutcome::Objects(objects), url_base)
        }
    }

    #[async_trait]
    impl ObjectStore for MockObjectStore {
        async fn list_objects(&self, _bucket: &str) -> Result<Vec<StoredObject>, LocatorError> {
            match &self.outcome {
                ListOutcome::Objects(objects) => Ok(objects.clone()),
                ListOutcome::Unauthenticated => Err(LocatorError::Unauthenticated(
                    "InvalidAccessKeyId".to_string(),
                )),
                ListOutcome::Unreachable => {
                    Err(LocatorError::Storage("connection refused".to_string()))
                }
            }
        }

        async fn presign_get(
            &self,
            bucket: &str,
            key: &str,
            expires_in: Duration,
        ) -> Result<String, LocatorError> {
            self.presigned
                .lock()
                .unwrap()
                .push((key.to_string(), expires_in));
            Ok(format!("{}/{}/{}", self.url_base, bucket, key))
        }
    }

    #[test]
    fn test_select_latest_picks_newest() {
        let objects = vec![object("old.jpg", 100), object("new.jpg", 200), object("mid.jpg", 150)];

        let latest = select_latest(&objects).unwrap();

        assert_eq!(latest.key, "new.jpg");
    }

    #[test]
    fn test_select_latest_ties_use_smallest_key() {
        let objects = vec![object("b.jpg", 200), object("c.jpg", 200), object("a.jpg", 200)];

        assert_eq!(select_latest(&objects).unwrap().key, "a.jpg");

        let reversed: Vec<_> = objects.into_iter().rev().collect();
        assert_eq!(select_latest(&reversed).unwrap().key, "a.jpg");
    }

    #[test]
    fn test_select_latest_empty() {
        assert!(select_latest(&[]).is_none());
    }

    #[tokio::test]
    async fn test_locate_latest_presigns_newest_for_one_hour() {
        let store = MockObjectStore::with_objects(
            vec![object("t1.jpg", 1_700_000_000), object("t2.jpg", 1_700_000_100)],
            "http://store",
        );
        let locator = ObjectLocator::new(store, "frubucket", Duration::from_secs(3600));

        let reference = locator.locate_latest().await.unwrap();

        assert_eq!(reference.key, "t2.jpg");
        assert_eq!(reference.url, "http://store/frubucket/t2.jpg");
        assert_eq!(reference.expires_in, Duration::from_secs(3600));
        let presigned = locator.store.presigned.lock().unwrap();
        assert_eq!(
            presigned.as_slice(),
            &[("t2.jpg".to_string(), Duration::from_secs(3600))]
        );
    }

    #[tokio::test]
    async fn test_s3_presigned_url_is_path_style_with_expiry() {
        let credentials = Credentials {
            access_key: "AKIDEXAMPLE".to_string(),
            secret_key: "wJalrXUtnFEMI".to_string(),
            region: "us-east-1".to_string(),
        };
        let storage_config = StorageConfig {
            bucket: "frubucket".to_string(),
            presign_expiry_secs: 3600,
            timeout_secs: 5,
            endpoint_url: Some("http://localhost:9000".to_string()),
        };
        let store = S3ObjectStore::new(&credentials, &storage_config);

        let url = store
            .presign_get("frubucket", "banana.jpg", storage_config.presign_expiry())
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:9000/frubucket/banana.jpg?"));
        assert!(url.contains("X-Amz-Expires=3600"));
        assert!(url.contains("X-Amz-Signature="));
    }

    fn list_failure(
        code: Option<&str>,
        status: u16,
    ) -> SdkError<ListObjectsV2Error, HttpResponse> {
        let mut metadata = ErrorMetadata::builder();
        if let Some(code) = code {
            metadata = metadata.code(code);
        }
        SdkError::service_error(
            ListObjectsV2Error::generic(metadata.build()),
            HttpResponse::new(status.try_into().unwrap(), SdkBody::empty()),
        )
    }

    #[test]
    fn test_credential_rejections_map_to_unauthenticated() {
        let cases = [
            (Some("AccessDenied"), 403),
            (Some("InvalidAccessKeyId"), 400),
            (Some("SignatureDoesNotMatch"), 403),
            (None, 403),
        ];

        for (code, status) in cases {
            let err = map_sdk_error(list_failure(code, status));
            assert!(
                matches!(err, LocatorError::Unauthenticated(_)),
                "{:?}/{} mapped to {:?}",
                code,
                status,
                err
            );
        }
    }

    #[test]
    fn test_other_service_errors_map_to_storage() {
        for (code, status) in [("NoSuchBucket", 404), ("PermanentRedirect", 301)] {
            let err = map_sdk_error(list_failure(Some(code), status));
            assert!(matches!(err, LocatorError::Storage(_)), "{} mapped to {:?}", code, err);
        }
    }

    #[test]
    fn test_sdk_error_message_is_short() {
        let err = map_sdk_error(list_failure(Some("AccessDenied"), 403));

        assert_eq!(
            err.to_string(),
            "Object store rejected the credentials: AccessDenied (HTTP 403)"
        );

        let err = map_sdk_error(list_failure(None, 500));
        match err {
            LocatorError::Storage(message) => assert_eq!(message, "request rejected (HTTP 500)"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_locate_latest_empty_bucket() {
        let store = MockObjectStore::with_objects(vec![], "http://store");
        let locator = ObjectLocator::new(store, "frubucket", Duration::from_secs(3600));

        let err = locator.locate_latest().await.unwrap_err();

        assert!(matches!(err, LocatorError::EmptyBucket(ref bucket) if bucket == "frubucket"));
        assert!(locator.store.presigned.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_locate_latest_propagates_unauthenticated() {
        let store = MockObjectStore::new(ListOutcome::Unauthenticated, "http://store");
        let locator = ObjectLocator::new(store, "frubucket", Duration::from_secs(3600));

        let err = locator.locate_latest().await.unwrap_err();

        assert!(matches!(err, LocatorError::Unauthenticated(_)));
    }
}
