use std::{path::Path, sync::Arc};

use futures_util::StreamExt;
use object_store::{
    aws::AmazonS3Builder, path::Path as ObjectPath, Attribute, Attributes, PutMultipartOpts,
    WriteMultipart,
};
use tokio_util::io::ReaderStream;
use url::Url;

use crate::{
    config::primitives::ObjectStorage,
    error_code::ErrorCode,
    future::WithMetrics,
    init_metrics::{
        OBJECT_STORAGE_COMPLETE_MULTIPART_REQUEST, OBJECT_STORAGE_CREATE_MULTIPART_REQUEST,
        OBJECT_STORAGE_DELETE_OBJECT_REQUEST, OBJECT_STORAGE_HEAD_OBJECT_REQUEST,
    },
    store::{Store, StoreError},
};

// 8MB parts, the smallest size S3 is comfortable with is 5MB
const CHUNK_SIZE: usize = 8 * 1024 * 1024;
const MAX_CONCURRENT_PARTS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ObjectError {
    #[error("Failed to build object storage client")]
    BuildClient(#[source] object_store::Error),

    #[error("Invalid public endpoint")]
    PublicEndpoint(#[source] url::ParseError),

    #[error("Invalid object key")]
    Key(#[source] object_store::path::Error),

    #[error("Error making request")]
    Request(#[source] object_store::Error),

    #[error("IO Error")]
    IO(#[source] std::io::Error),
}

impl ObjectError {
    pub(super) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::BuildClient(_) | Self::PublicEndpoint(_) | Self::Request(_) => {
                ErrorCode::OBJECT_REQUEST_ERROR
            }
            Self::Key(_) => ErrorCode::INVALID_OBJECT_KEY,
            Self::IO(_) => ErrorCode::OBJECT_IO_ERROR,
        }
    }

    pub(super) const fn is_not_found(&self) -> bool {
        matches!(self, Self::Request(object_store::Error::NotFound { .. }))
    }
}

#[derive(Clone)]
pub(crate) struct ObjectStore {
    inner: Arc<dyn object_store::ObjectStore>,
    public_endpoint: Url,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("inner", &self.inner.to_string())
            .field("public_endpoint", &self.public_endpoint.as_str())
            .finish()
    }
}

impl ObjectStore {
    pub(crate) fn build(
        ObjectStorage {
            endpoint,
            use_path_style,
            bucket_name,
            region,
            access_key,
            secret_key,
            session_token,
            public_endpoint,
        }: ObjectStorage,
    ) -> Result<Self, StoreError> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&bucket_name)
            .with_region(&region);

        if let Some(endpoint) = &endpoint {
            builder = builder
                .with_endpoint(endpoint.as_str().trim_end_matches('/'))
                .with_allow_http(endpoint.scheme() == "http")
                .with_virtual_hosted_style_request(!use_path_style);
        }

        if let Some(access_key) = access_key {
            builder = builder.with_access_key_id(access_key);
        }

        if let Some(secret_key) = secret_key {
            builder = builder.with_secret_access_key(secret_key);
        }

        if let Some(session_token) = session_token {
            builder = builder.with_token(session_token);
        }

        let inner = builder.build().map_err(ObjectError::BuildClient)?;

        let public_endpoint = match public_endpoint {
            Some(public_endpoint) => public_endpoint,
            None => Url::parse(&format!("https://{bucket_name}.s3.{region}.amazonaws.com"))
                .map_err(ObjectError::PublicEndpoint)?,
        };

        Ok(ObjectStore {
            inner: Arc::new(inner),
            public_endpoint,
        })
    }

    #[cfg(test)]
    pub(crate) fn memory(public_endpoint: Url) -> Self {
        ObjectStore {
            inner: Arc::new(object_store::memory::InMemory::new()),
            public_endpoint,
        }
    }

    #[cfg(test)]
    pub(crate) async fn head(
        &self,
        key: &str,
    ) -> Result<object_store::ObjectMeta, object_store::Error> {
        self.inner.head(&ObjectPath::from(key)).await
    }

    fn base_url(&self) -> &str {
        self.public_endpoint.as_str().trim_end_matches('/')
    }
}

fn object_path(key: &str) -> Result<ObjectPath, ObjectError> {
    ObjectPath::parse(key).map_err(ObjectError::Key)
}

#[async_trait::async_trait(?Send)]
impl Store for ObjectStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        let res = self
            .inner
            .head(&ObjectPath::from("healthz"))
            .with_metrics(OBJECT_STORAGE_HEAD_OBJECT_REQUEST)
            .await;

        match res {
            Ok(_) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(ObjectError::Request(e).into()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn save_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &mime::Mime,
    ) -> Result<(), StoreError> {
        let location = object_path(key)?;

        let file = tokio::fs::File::open(path).await.map_err(ObjectError::IO)?;

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());

        let upload = self
            .inner
            .put_multipart_opts(
                &location,
                PutMultipartOpts {
                    attributes,
                    ..Default::default()
                },
            )
            .with_metrics(OBJECT_STORAGE_CREATE_MULTIPART_REQUEST)
            .await
            .map_err(ObjectError::Request)?;

        let mut writer = WriteMultipart::new_with_chunk_size(upload, CHUNK_SIZE);
        let mut stream = ReaderStream::with_capacity(file, CHUNK_SIZE);

        while let Some(res) = stream.next().await {
            let bytes = match res {
                Ok(bytes) => bytes,
                Err(e) => {
                    if let Err(abort) = writer.abort().await {
                        tracing::warn!("Failed to abort multipart upload: {abort}");
                    }
                    return Err(ObjectError::IO(e).into());
                }
            };

            if let Err(e) = writer.wait_for_capacity(MAX_CONCURRENT_PARTS).await {
                if let Err(abort) = writer.abort().await {
                    tracing::warn!("Failed to abort multipart upload: {abort}");
                }
                return Err(ObjectError::Request(e).into());
            }

            writer.put(bytes);
        }

        writer
            .finish()
            .with_metrics(OBJECT_STORAGE_COMPLETE_MULTIPART_REQUEST)
            .await
            .map_err(ObjectError::Request)?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let location = object_path(key)?;

        self.inner
            .delete(&location)
            .with_metrics(OBJECT_STORAGE_DELETE_OBJECT_REQUEST)
            .await
            .map_err(ObjectError::Request)?;

        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.base_url())
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        let key = url.strip_prefix(self.base_url())?.strip_prefix('/')?;

        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectStore;
    use crate::store::Store;

    fn store() -> ObjectStore {
        ObjectStore::memory(
            "https://tubely-test.s3.us-east-1.amazonaws.com"
                .parse()
                .expect("Valid url"),
        )
    }

    #[test]
    fn public_url_round_trips_key() {
        let store = store();

        let url = store.public_url("landscape/abcd.mp4");
        assert_eq!(
            url,
            "https://tubely-test.s3.us-east-1.amazonaws.com/landscape/abcd.mp4"
        );
        assert_eq!(
            store.key_from_url(&url).as_deref(),
            Some("landscape/abcd.mp4")
        );
    }

    #[test]
    fn foreign_url_has_no_key() {
        let store = store();

        assert_eq!(store.key_from_url("https://example.com/other.mp4"), None);
        assert_eq!(
            store.key_from_url("https://tubely-test.s3.us-east-1.amazonaws.com/"),
            None
        );
    }

    #[tokio::test]
    async fn save_and_remove() {
        let store = store();

        let path = std::env::temp_dir().join(format!("tubely-store-{}.mp4", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, vec![7u8; 1024])
            .await
            .expect("Wrote file");

        store
            .save_file("other/saved.mp4", &path, &"video/mp4".parse().expect("mime"))
            .await
            .expect("Saved file");

        let meta = store.head("other/saved.mp4").await.expect("Object exists");
        assert_eq!(meta.size, 1024);

        store.remove("other/saved.mp4").await.expect("Removed");
        assert!(store.head("other/saved.mp4").await.is_err());

        store.health_check().await.expect("Healthy");

        tokio::fs::remove_file(&path).await.expect("Removed tmp");
    }
}
