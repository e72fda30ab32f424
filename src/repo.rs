pub(crate) mod postgres;
pub(crate) mod sled;

use std::{fmt::Debug, sync::Arc};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{config, error_code::ErrorCode};

pub(crate) type ArcRepo = Arc<dyn VideoRepo>;

#[derive(Clone, Debug)]
pub(crate) enum Repo {
    Sled(self::sled::SledRepo),
    Postgres(self::postgres::PostgresRepo),
}

/// A cataloged video, owned by the user who created it
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub(crate) struct Video {
    pub(crate) id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) updated_at: OffsetDateTime,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) video_url: Option<String>,
    pub(crate) user_id: Uuid,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub(crate) struct CreateVideoParams {
    pub(crate) title: String,
    pub(crate) description: String,
}

impl Video {
    pub(crate) fn new(
        CreateVideoParams { title, description }: CreateVideoParams,
        user_id: Uuid,
    ) -> Self {
        let now = truncated_now();

        Video {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            title,
            description,
            video_url: None,
            user_id,
        }
    }

    pub(crate) fn set_video_url(&mut self, video_url: String) {
        self.video_url = Some(video_url);
        self.updated_at = truncated_now();
    }
}

// postgres keeps microseconds, match it everywhere
fn truncated_now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();

    now.replace_microsecond(now.microsecond()).unwrap_or(now)
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum RepoError {
    #[error("Error in sled")]
    SledError(#[from] crate::repo::sled::SledError),

    #[error("Error in postgres")]
    PostgresError(#[from] crate::repo::postgres::PostgresError),
}

impl RepoError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::SledError(e) => e.error_code(),
            Self::PostgresError(e) => e.error_code(),
        }
    }

    pub(crate) const fn is_disconnected(&self) -> bool {
        match self {
            Self::PostgresError(e) => e.is_disconnected(),
            _ => false,
        }
    }
}

/// Metadata storage for videos
#[async_trait::async_trait(?Send)]
pub(crate) trait VideoRepo: Send + Sync + Debug {
    async fn health_check(&self) -> Result<(), RepoError>;

    async fn create_video(&self, video: &Video) -> Result<(), RepoError>;

    async fn video(&self, id: Uuid) -> Result<Option<Video>, RepoError>;

    /// All videos owned by `user_id`, newest first
    async fn videos_for_user(&self, user_id: Uuid) -> Result<Vec<Video>, RepoError>;

    async fn update_video(&self, video: &Video) -> Result<(), RepoError>;

    async fn delete_video(&self, id: Uuid) -> Result<(), RepoError>;
}

impl Repo {
    #[tracing::instrument(skip(config))]
    pub(crate) async fn open(config: config::Repo) -> color_eyre::Result<Self> {
        match config {
            config::Repo::Sled(config::Sled {
                path,
                cache_capacity,
            }) => {
                let path = path.join("v0.1");

                let db = ::sled::Config::new()
                    .cache_capacity(cache_capacity)
                    .path(path)
                    .open()?;

                Ok(Self::Sled(self::sled::SledRepo::build(db)?))
            }
            config::Repo::Postgres(config::Postgres { url }) => {
                let repo = self::postgres::PostgresRepo::connect(url).await?;

                Ok(Self::Postgres(repo))
            }
        }
    }

    pub(crate) fn to_arc(&self) -> ArcRepo {
        match self {
            Self::Sled(sled_repo) => Arc::new(sled_repo.clone()),
            Self::Postgres(postgres_repo) => Arc::new(postgres_repo.clone()),
        }
    }
}
