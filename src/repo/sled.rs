use sled::{Db, IVec, Tree};
use uuid::Uuid;

use crate::{
    error_code::ErrorCode,
    future::WithMetrics,
    repo::{RepoError, Video, VideoRepo},
};

macro_rules! b {
    ($self:ident.$ident:ident, $expr:expr) => {{
        let $ident = $self.$ident.clone();

        actix_web::rt::task::spawn_blocking(move || $expr)
            .await
            .map_err(SledError::from)??
    }};
    ($self:ident.($($ident:ident),+), $expr:expr) => {{
        $(let $ident = $self.$ident.clone();)+

        actix_web::rt::task::spawn_blocking(move || $expr)
            .await
            .map_err(SledError::from)??
    }};
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SledError {
    #[error("Error in database")]
    Sled(#[from] sled::Error),

    #[error("Invalid video json")]
    Video(#[source] serde_json::Error),

    #[error("Operation panicked")]
    Panic,
}

impl SledError {
    pub(super) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Sled(_) => ErrorCode::SLED_ERROR,
            Self::Video(_) => ErrorCode::EXTRACT_VIDEO,
            Self::Panic => ErrorCode::PANIC,
        }
    }
}

impl From<actix_web::rt::task::JoinError> for SledError {
    fn from(_: actix_web::rt::task::JoinError) -> Self {
        SledError::Panic
    }
}

// - videos tree
//   - video id -> video json
// - user videos tree
//   - user id ++ video id -> ()
#[derive(Clone)]
pub(crate) struct SledRepo {
    healthz: Tree,
    videos: Tree,
    user_videos: Tree,
}

impl std::fmt::Debug for SledRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledRepo").finish()
    }
}

impl SledRepo {
    pub(crate) fn build(db: Db) -> Result<Self, SledError> {
        Ok(SledRepo {
            healthz: db.open_tree("tubely-healthz-tree")?,
            videos: db.open_tree("tubely-videos-tree")?,
            user_videos: db.open_tree("tubely-user-videos-tree")?,
        })
    }
}

fn user_video_key(user_id: Uuid, video_id: Uuid) -> Vec<u8> {
    let mut key = user_id.as_bytes().to_vec();
    key.extend_from_slice(video_id.as_bytes());
    key
}

fn video_from_ivec(ivec: &IVec) -> Result<Video, SledError> {
    serde_json::from_slice(ivec).map_err(SledError::Video)
}

fn video_to_vec(video: &Video) -> Result<Vec<u8>, SledError> {
    serde_json::to_vec(video).map_err(SledError::Video)
}

#[async_trait::async_trait(?Send)]
impl VideoRepo for SledRepo {
    async fn health_check(&self) -> Result<(), RepoError> {
        b!(self.healthz, {
            healthz.update_and_fetch("healthz", |old| {
                let value = old.map_or(0u64, |value| {
                    <[u8; 8]>::try_from(value).map_or(0, u64::from_be_bytes)
                });

                Some(value.wrapping_add(1).to_be_bytes().to_vec())
            })?;

            healthz.flush()?;

            Ok(()) as Result<(), SledError>
        });

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, video), fields(id = %video.id))]
    async fn create_video(&self, video: &Video) -> Result<(), RepoError> {
        let id = video.id;
        let index_key = user_video_key(video.user_id, video.id);
        let value = video_to_vec(video)?;

        async {
            b!(self.(videos, user_videos), {
                videos.insert(id.as_bytes(), value)?;
                user_videos.insert(index_key, IVec::default())?;

                Ok(()) as Result<(), SledError>
            });

            Ok::<_, RepoError>(())
        }
        .with_metrics(crate::init_metrics::SLED_VIDEOS_CREATE)
        .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn video(&self, id: Uuid) -> Result<Option<Video>, RepoError> {
        async {
            let opt = b!(self.videos, {
                videos
                    .get(id.as_bytes())?
                    .as_ref()
                    .map(video_from_ivec)
                    .transpose()
            });

            Ok::<_, RepoError>(opt)
        }
        .with_metrics(crate::init_metrics::SLED_VIDEOS_GET)
        .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn videos_for_user(&self, user_id: Uuid) -> Result<Vec<Video>, RepoError> {
        async {
            let mut vec = b!(self.(videos, user_videos), {
                let mut vec = Vec::new();

                for res in user_videos.scan_prefix(user_id.as_bytes()).keys() {
                    let key = res?;

                    let Some(video_id) = key.get(16..) else {
                        continue;
                    };

                    if let Some(ivec) = videos.get(video_id)? {
                        vec.push(video_from_ivec(&ivec)?);
                    }
                }

                Ok(vec) as Result<Vec<Video>, SledError>
            });

            vec.sort_by(|a, b| b.created_at.cmp(&a.created_at));

            Ok::<_, RepoError>(vec)
        }
        .with_metrics(crate::init_metrics::SLED_VIDEOS_FOR_USER)
        .await
    }

    #[tracing::instrument(level = "debug", skip(self, video), fields(id = %video.id))]
    async fn update_video(&self, video: &Video) -> Result<(), RepoError> {
        let id = video.id;
        let value = video_to_vec(video)?;

        async {
            b!(self.videos, {
                videos.insert(id.as_bytes(), value)?;

                Ok(()) as Result<(), SledError>
            });

            Ok::<_, RepoError>(())
        }
        .with_metrics(crate::init_metrics::SLED_VIDEOS_UPDATE)
        .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_video(&self, id: Uuid) -> Result<(), RepoError> {
        async {
            b!(self.(videos, user_videos), {
                if let Some(ivec) = videos.remove(id.as_bytes())? {
                    let video = video_from_ivec(&ivec)?;

                    user_videos.remove(user_video_key(video.user_id, video.id))?;
                }

                Ok(()) as Result<(), SledError>
            });

            Ok::<_, RepoError>(())
        }
        .with_metrics(crate::init_metrics::SLED_VIDEOS_DELETE)
        .await
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::SledRepo;
    use crate::repo::{CreateVideoParams, Video, VideoRepo};

    fn repo() -> SledRepo {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .expect("Opened temporary db");

        SledRepo::build(db).expect("Built repo")
    }

    fn video(user_id: Uuid, title: &str) -> Video {
        Video::new(
            CreateVideoParams {
                title: title.to_string(),
                description: String::from("description"),
            },
            user_id,
        )
    }

    #[actix_web::test]
    async fn create_and_get() {
        let repo = repo();
        let video = video(Uuid::new_v4(), "first");

        repo.create_video(&video).await.expect("Created");

        let found = repo.video(video.id).await.expect("Fetched");
        assert_eq!(found, Some(video));

        let missing = repo.video(Uuid::new_v4()).await.expect("Fetched");
        assert_eq!(missing, None);
    }

    #[actix_web::test]
    async fn list_only_owned_newest_first() {
        let repo = repo();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut older = video(owner, "older");
        older.created_at -= time::Duration::minutes(5);
        let newer = video(owner, "newer");
        let foreign = video(other, "foreign");

        for v in [&older, &newer, &foreign] {
            repo.create_video(v).await.expect("Created");
        }

        let listed = repo.videos_for_user(owner).await.expect("Listed");
        let titles = listed.iter().map(|v| v.title.as_str()).collect::<Vec<_>>();

        assert_eq!(titles, ["newer", "older"]);
    }

    #[actix_web::test]
    async fn update_sets_url() {
        let repo = repo();
        let mut video = video(Uuid::new_v4(), "upload me");

        repo.create_video(&video).await.expect("Created");

        video.set_video_url(String::from("https://example.com/portrait/abc.mp4"));
        repo.update_video(&video).await.expect("Updated");

        let found = repo
            .video(video.id)
            .await
            .expect("Fetched")
            .expect("Exists");

        assert_eq!(
            found.video_url.as_deref(),
            Some("https://example.com/portrait/abc.mp4")
        );
    }

    #[actix_web::test]
    async fn delete_removes_index() {
        let repo = repo();
        let owner = Uuid::new_v4();
        let video = video(owner, "doomed");

        repo.create_video(&video).await.expect("Created");
        repo.delete_video(video.id).await.expect("Deleted");

        assert_eq!(repo.video(video.id).await.expect("Fetched"), None);
        assert!(repo
            .videos_for_user(owner)
            .await
            .expect("Listed")
            .is_empty());

        // deleting twice is fine
        repo.delete_video(video.id).await.expect("Deleted again");
        repo.health_check().await.expect("Healthy");
    }
}
