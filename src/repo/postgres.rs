mod embedded;
mod schema;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bb8::CustomizeConnection;
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{
        bb8::{Pool, PooledConnection, RunError},
        AsyncDieselConnectionManager, PoolError,
    },
    AsyncPgConnection, RunQueryDsl,
};
use time::OffsetDateTime;
use tokio_postgres::NoTls;
use url::Url;
use uuid::Uuid;

use crate::{
    error_code::ErrorCode,
    future::{WithMetrics, WithTimeout},
};

use super::{RepoError, Video, VideoRepo};

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub(crate) struct PostgresRepo {
    inner: Arc<Inner>,
}

struct Inner {
    pool: Pool<AsyncPgConnection>,
}

impl std::fmt::Debug for PostgresRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresRepo").finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConnectPostgresError {
    #[error("Failed to connect to postgres for migrations")]
    ConnectForMigration(#[source] tokio_postgres::Error),

    #[error("Failed to run migrations")]
    Migration(#[source] Box<refinery::Error>),

    #[error("Failed to build postgres connection pool")]
    BuildPool(#[source] PoolError),
}

#[derive(Debug)]
pub(crate) enum PostgresError {
    Pool(RunError),
    Diesel(diesel::result::Error),
    DbTimeout,
}

impl std::fmt::Display for PostgresError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pool(_) => write!(f, "Error in db pool"),
            Self::Diesel(e) => match e {
                diesel::result::Error::DatabaseError(kind, _) => {
                    write!(f, "Error in diesel: {kind:?}")
                }
                diesel::result::Error::NotFound => write!(f, "Error in diesel: Not found"),
                diesel::result::Error::SerializationError(_) => {
                    write!(f, "Error in diesel: Serialization")
                }
                diesel::result::Error::DeserializationError(_) => {
                    write!(f, "Error in diesel: Deserialization")
                }
                _ => write!(f, "Error in diesel"),
            },
            Self::DbTimeout => write!(f, "Timed out waiting for postgres"),
        }
    }
}

impl std::error::Error for PostgresError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pool(e) => Some(e),
            Self::Diesel(e) => Some(e),
            Self::DbTimeout => None,
        }
    }
}

impl From<diesel::result::Error> for PostgresError {
    fn from(value: diesel::result::Error) -> Self {
        Self::Diesel(value)
    }
}

impl PostgresError {
    pub(super) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Diesel(diesel::result::Error::DeserializationError(_)) => {
                ErrorCode::EXTRACT_VIDEO
            }
            Self::Pool(_) | Self::Diesel(_) | Self::DbTimeout => ErrorCode::POSTGRES_ERROR,
        }
    }

    pub(super) const fn is_disconnected(&self) -> bool {
        matches!(
            self,
            Self::Pool(RunError::User(PoolError::ConnectionError(_)))
                | Self::Diesel(diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::ClosedConnection,
                    _,
                ))
        )
    }
}

#[derive(Debug)]
struct OnConnect;

impl<C, E> CustomizeConnection<C, E> for OnConnect
where
    C: Send + 'static,
    E: 'static,
{
    fn on_acquire<'life0, 'life1, 'async_trait>(
        &'life0 self,
        _connection: &'life1 mut C,
    ) -> core::pin::Pin<
        Box<dyn core::future::Future<Output = Result<(), E>> + core::marker::Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async {
            metrics::counter!(crate::init_metrics::POSTGRES_POOL_CONNECTION_CREATE).increment(1);
            Ok(())
        })
    }
}

async fn run_migrations(postgres_url: &Url) -> Result<(), ConnectPostgresError> {
    let (mut client, conn) = tokio_postgres::connect(postgres_url.as_str(), NoTls)
        .await
        .map_err(ConnectPostgresError::ConnectForMigration)?;

    let handle = actix_web::rt::spawn(async move {
        if let Err(e) = conn.await {
            tracing::warn!("Migration connection closed with error: {e}");
        }
    });

    let res = embedded::migrations::runner()
        .run_async(&mut client)
        .await
        .map_err(Box::new)
        .map_err(ConnectPostgresError::Migration);

    handle.abort();
    let _ = handle.await;

    res.map(|_| ())
}

async fn build_pool(
    postgres_url: &Url,
    max_size: u32,
) -> Result<Pool<AsyncPgConnection>, ConnectPostgresError> {
    let mgr = AsyncDieselConnectionManager::<AsyncPgConnection>::new(postgres_url.as_str());

    let pool = Pool::builder()
        .max_size(max_size)
        .connection_timeout(Duration::from_secs(10))
        .connection_customizer(Box::new(OnConnect))
        .build(mgr)
        .await
        .map_err(ConnectPostgresError::BuildPool)?;

    Ok(pool)
}

impl PostgresRepo {
    pub(crate) async fn connect(postgres_url: Url) -> Result<Self, ConnectPostgresError> {
        run_migrations(&postgres_url).await?;

        let parallelism = std::thread::available_parallelism()
            .map(|u| u.into())
            .unwrap_or(1_usize);

        let pool = build_pool(&postgres_url, parallelism as u32 * 8).await?;

        Ok(PostgresRepo {
            inner: Arc::new(Inner { pool }),
        })
    }

    async fn get_connection(
        &self,
    ) -> Result<PooledConnection<'_, AsyncPgConnection>, PostgresError> {
        self.inner.get_connection().await
    }
}

struct GetConnectionMetricsGuard {
    start: Instant,
    armed: bool,
}

impl GetConnectionMetricsGuard {
    fn guard() -> Self {
        GetConnectionMetricsGuard {
            start: Instant::now(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for GetConnectionMetricsGuard {
    fn drop(&mut self) {
        metrics::counter!(crate::init_metrics::POSTGRES_POOL_GET, "completed" => (!self.armed).to_string())
            .increment(1);
        metrics::histogram!(crate::init_metrics::POSTGRES_POOL_GET_DURATION, "completed" => (!self.armed).to_string()).record(self.start.elapsed().as_secs_f64());
    }
}

impl Inner {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn get_connection(
        &self,
    ) -> Result<PooledConnection<'_, AsyncPgConnection>, PostgresError> {
        let guard = GetConnectionMetricsGuard::guard();

        let obj = self.pool.get().await.map_err(PostgresError::Pool)?;

        guard.disarm();

        Ok(obj)
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = schema::videos)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct VideoRow {
    id: Uuid,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    title: String,
    description: String,
    video_url: Option<String>,
    user_id: Uuid,
}

impl From<VideoRow> for Video {
    fn from(
        VideoRow {
            id,
            created_at,
            updated_at,
            title,
            description,
            video_url,
            user_id,
        }: VideoRow,
    ) -> Self {
        Video {
            id,
            created_at,
            updated_at,
            title,
            description,
            video_url,
            user_id,
        }
    }
}

#[async_trait::async_trait(?Send)]
impl VideoRepo for PostgresRepo {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn health_check(&self) -> Result<(), RepoError> {
        let mut conn = self.get_connection().await?;

        diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .with_timeout(QUERY_TIMEOUT)
            .await
            .map_err(|_| PostgresError::DbTimeout)?
            .map_err(PostgresError::Diesel)?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, input_video), fields(id = %input_video.id))]
    async fn create_video(&self, input_video: &Video) -> Result<(), RepoError> {
        use schema::videos::dsl::*;

        let mut conn = self.get_connection().await?;

        diesel::insert_into(videos)
            .values((
                id.eq(input_video.id),
                created_at.eq(input_video.created_at),
                updated_at.eq(input_video.updated_at),
                title.eq(&input_video.title),
                description.eq(&input_video.description),
                video_url.eq(input_video.video_url.as_deref()),
                user_id.eq(input_video.user_id),
            ))
            .execute(&mut conn)
            .with_metrics(crate::init_metrics::POSTGRES_VIDEOS_CREATE)
            .with_timeout(QUERY_TIMEOUT)
            .await
            .map_err(|_| PostgresError::DbTimeout)?
            .map_err(PostgresError::Diesel)?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn video(&self, input_id: Uuid) -> Result<Option<Video>, RepoError> {
        use schema::videos::dsl::*;

        let mut conn = self.get_connection().await?;

        let opt = videos
            .select(VideoRow::as_select())
            .filter(id.eq(input_id))
            .get_result::<VideoRow>(&mut conn)
            .with_metrics(crate::init_metrics::POSTGRES_VIDEOS_GET)
            .with_timeout(QUERY_TIMEOUT)
            .await
            .map_err(|_| PostgresError::DbTimeout)?
            .optional()
            .map_err(PostgresError::Diesel)?
            .map(Video::from);

        Ok(opt)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn videos_for_user(&self, input_user_id: Uuid) -> Result<Vec<Video>, RepoError> {
        use schema::videos::dsl::*;

        let mut conn = self.get_connection().await?;

        let vec = videos
            .select(VideoRow::as_select())
            .filter(user_id.eq(input_user_id))
            .order(created_at.desc())
            .get_results::<VideoRow>(&mut conn)
            .with_metrics(crate::init_metrics::POSTGRES_VIDEOS_FOR_USER)
            .with_timeout(QUERY_TIMEOUT)
            .await
            .map_err(|_| PostgresError::DbTimeout)?
            .map_err(PostgresError::Diesel)?
            .into_iter()
            .map(Video::from)
            .collect();

        Ok(vec)
    }

    #[tracing::instrument(level = "debug", skip(self, input_video), fields(id = %input_video.id))]
    async fn update_video(&self, input_video: &Video) -> Result<(), RepoError> {
        use schema::videos::dsl::*;

        let mut conn = self.get_connection().await?;

        diesel::update(videos)
            .filter(id.eq(input_video.id))
            .set((
                updated_at.eq(input_video.updated_at),
                title.eq(&input_video.title),
                description.eq(&input_video.description),
                video_url.eq(input_video.video_url.as_deref()),
            ))
            .execute(&mut conn)
            .with_metrics(crate::init_metrics::POSTGRES_VIDEOS_UPDATE)
            .with_timeout(QUERY_TIMEOUT)
            .await
            .map_err(|_| PostgresError::DbTimeout)?
            .map_err(PostgresError::Diesel)?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_video(&self, input_id: Uuid) -> Result<(), RepoError> {
        use schema::videos::dsl::*;

        let mut conn = self.get_connection().await?;

        diesel::delete(videos)
            .filter(id.eq(input_id))
            .execute(&mut conn)
            .with_metrics(crate::init_metrics::POSTGRES_VIDEOS_DELETE)
            .with_timeout(QUERY_TIMEOUT)
            .await
            .map_err(|_| PostgresError::DbTimeout)?
            .map_err(PostgresError::Diesel)?;

        Ok(())
    }
}
