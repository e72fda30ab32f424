use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use color_eyre::Report;

use crate::error_code::ErrorCode;

pub(crate) struct Error {
    inner: color_eyre::Report,
}

impl Error {
    fn kind(&self) -> Option<&UploadError> {
        self.inner.downcast_ref()
    }

    pub(crate) fn root_cause(&self) -> &(dyn std::error::Error + 'static) {
        self.inner.root_cause()
    }

    pub(crate) fn error_code(&self) -> ErrorCode {
        self.kind()
            .map(|e| e.error_code())
            .unwrap_or(ErrorCode::UNKNOWN_ERROR)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.inner, f)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl<T> From<T> for Error
where
    UploadError: From<T>,
{
    fn from(error: T) -> Self {
        Error {
            inner: Report::from(UploadError::from(error)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum UploadError {
    #[error("Couldn't upload file")]
    Upload(#[from] actix_form_data::Error),

    #[error("Error in DB")]
    Repo(#[from] crate::repo::RepoError),

    #[error("Error interacting with filesystem")]
    Io(#[from] std::io::Error),

    #[error("Error in store")]
    Store(#[from] crate::store::StoreError),

    #[error("Error probing media")]
    Probe(#[from] crate::ffprobe::FfProbeError),

    #[error("Unable to classify media")]
    Dimensions(#[from] crate::aspect_ratio::InvalidDimensions),

    #[error("Request was not authorized")]
    Auth(#[from] crate::auth::AuthError),

    #[error("Invalid JSON body")]
    Json(#[source] serde_json::Error),

    #[error("No video present in upload")]
    NoFiles,

    #[error("Invalid media type {0}, only video/mp4 is accepted")]
    InvalidMediaType(String),

    #[error("Invalid video id")]
    InvalidVideoId(#[source] uuid::Error),

    #[error("Requested a video that doesn't exist")]
    VideoNotFound,

    #[error("Requested a video owned by someone else")]
    NotVideoOwner,
}

impl UploadError {
    const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Upload(_) => ErrorCode::FILE_UPLOAD_ERROR,
            Self::Repo(e) => e.error_code(),
            Self::Io(_) => ErrorCode::IO_ERROR,
            Self::Store(e) => e.error_code(),
            Self::Probe(e) => e.error_code(),
            Self::Dimensions(e) => e.error_code(),
            Self::Auth(e) => e.error_code(),
            Self::Json(_) => ErrorCode::INVALID_JSON,
            Self::NoFiles => ErrorCode::VALIDATE_NO_FILES,
            Self::InvalidMediaType(_) => ErrorCode::INVALID_MEDIA_TYPE,
            Self::InvalidVideoId(_) => ErrorCode::INVALID_VIDEO_ID,
            Self::VideoNotFound => ErrorCode::VIDEO_NOT_FOUND,
            Self::NotVideoOwner => ErrorCode::NOT_VIDEO_OWNER,
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            Some(
                UploadError::Upload(_)
                | UploadError::Dimensions(_)
                | UploadError::Json(_)
                | UploadError::NoFiles
                | UploadError::InvalidMediaType(_)
                | UploadError::InvalidVideoId(_),
            ) => StatusCode::BAD_REQUEST,
            Some(UploadError::Probe(e)) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Some(UploadError::Auth(e)) if !e.is_server_error() => StatusCode::UNAUTHORIZED,
            Some(UploadError::NotVideoOwner) => StatusCode::FORBIDDEN,
            Some(UploadError::VideoNotFound) => StatusCode::NOT_FOUND,
            Some(UploadError::Repo(e)) if e.is_disconnected() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("application/json")
            .body(
                serde_json::to_string(&serde_json::json!({
                    "msg": self.root_cause().to_string(),
                    "code": self.error_code()
                }))
                .unwrap_or_else(|_| {
                    r#"{"msg":"Request failed","code":"unknown-error"}"#.to_string()
                }),
            )
    }
}
