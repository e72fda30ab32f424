use std::{fmt::Debug, path::Path};

use crate::error_code::ErrorCode;

pub(crate) mod object_store;

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    #[error("Error in object store")]
    ObjectStore(#[source] crate::store::object_store::ObjectError),

    #[error("Requested object is not found")]
    ObjectNotFound(#[source] crate::store::object_store::ObjectError),
}

impl StoreError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::ObjectStore(e) => e.error_code(),
            Self::ObjectNotFound(_) => ErrorCode::OBJECT_REQUEST_ERROR,
        }
    }

    pub(crate) const fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound(_))
    }
}

impl From<crate::store::object_store::ObjectError> for StoreError {
    fn from(value: crate::store::object_store::ObjectError) -> Self {
        if value.is_not_found() {
            Self::ObjectNotFound(value)
        } else {
            Self::ObjectStore(value)
        }
    }
}

/// Where uploaded video files end up
#[async_trait::async_trait(?Send)]
pub(crate) trait Store: Clone + Debug {
    async fn health_check(&self) -> Result<(), StoreError>;

    async fn save_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &mime::Mime,
    ) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// The URL clients fetch a stored key from
    fn public_url(&self, key: &str) -> String;

    /// Recover the key from a URL produced by `public_url`
    fn key_from_url(&self, url: &str) -> Option<String>;
}
