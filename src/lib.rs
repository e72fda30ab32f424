mod aspect_ratio;
mod auth;
mod config;
mod error;
mod error_code;
mod ffprobe;
mod future;
mod init_metrics;
mod init_tracing;
mod middleware;
mod process;
mod repo;
mod store;
mod tmp_file;

use actix_form_data::{Field, Form, FormData, Multipart, Value};
use actix_web::{
    dev::Payload, error::JsonPayloadError, web, App, FromRequest, HttpRequest, HttpResponse,
    HttpServer,
};
use color_eyre::eyre::eyre;
use futures_core::Stream;
use futures_util::{StreamExt, TryStreamExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use middleware::Metrics;
use rand::RngCore;
use std::{
    future::{ready, Ready},
    path::Path,
    sync::Arc,
};
use tokio::io::AsyncWriteExt;
use tracing::Instrument;
use tracing_actix_web::TracingLogger;
use uuid::Uuid;

use self::{
    aspect_ratio::AspectRatio,
    auth::{Authenticated, JwtValidator},
    config::{Configuration, Operation},
    error::{Error, UploadError},
    error_code::ErrorCode,
    ffprobe::{ArcProber, Dimensions, FfProbe},
    init_tracing::init_tracing,
    repo::{ArcRepo, CreateVideoParams, Repo, Video},
    store::{object_store::ObjectStore, Store},
    tmp_file::{ArcTmpDir, TmpDir, TmpFile},
};

pub use self::config::TubelyConfiguration;

const MEGABYTES: usize = 1024 * 1024;

/// The `{video_id}` path segment, parsed
#[derive(Clone, Copy, Debug)]
struct VideoId(Uuid);

impl FromRequest for VideoId {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let res = Uuid::parse_str(req.match_info().query("video_id"))
            .map(VideoId)
            .map_err(|e| Error::from(UploadError::InvalidVideoId(e)));

        ready(res)
    }
}

struct VideoUpload(Value<TmpFile>);

impl FormData for VideoUpload {
    type Item = TmpFile;
    type Error = Error;

    fn form(req: &HttpRequest) -> Result<Form<Self::Item, Self::Error>, Self::Error> {
        // This form is expecting a single file field, 'video'
        let tmp_dir = req
            .app_data::<web::Data<ArcTmpDir>>()
            .expect("No TmpDir in request")
            .clone();
        let media = req
            .app_data::<web::Data<config::Media>>()
            .expect("No media configuration in request")
            .clone();

        Ok(Form::new()
            .max_files(1)
            .max_file_size(media.max_file_size * MEGABYTES)
            .transform_error(transform_error)
            .field(
                "video",
                Field::file(async move |filename, _, stream| {
                    let span = tracing::info_span!("video-upload", ?filename);

                    let stream = stream.map_err(Error::from);

                    write_tmp_file(&tmp_dir, stream).instrument(span).await
                }),
            ))
    }

    fn extract(value: Value<Self::Item>) -> Result<Self, Self::Error> {
        Ok(VideoUpload(value))
    }
}

async fn write_tmp_file<S>(tmp_dir: &TmpDir, stream: S) -> Result<TmpFile, Error>
where
    S: Stream<Item = Result<web::Bytes, Error>>,
{
    let tmp_file = tmp_dir.tmp_file(Some(".mp4"));

    let mut file = tokio::fs::File::create(&*tmp_file).await?;

    let mut stream = std::pin::pin!(stream);

    while let Some(bytes) = stream.next().await {
        file.write_all(&bytes?).await?;
    }

    file.flush().await?;

    Ok(tmp_file)
}

/// `<aspect ratio>/<64 hex characters>.mp4`
fn storage_key(aspect_ratio: AspectRatio) -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);

    format!("{aspect_ratio}/{}.mp4", hex::encode(bytes))
}

#[tracing::instrument(name = "Creating video", skip(repo, params))]
async fn create_video(
    Authenticated(user_id): Authenticated,
    repo: web::Data<ArcRepo>,
    params: web::Json<CreateVideoParams>,
) -> Result<HttpResponse, Error> {
    let video = Video::new(params.into_inner(), user_id);

    repo.create_video(&video).await?;

    metrics::counter!(crate::init_metrics::VIDEOS_CREATED).increment(1);

    Ok(HttpResponse::Created().json(&video))
}

#[tracing::instrument(name = "Listing videos", skip(repo))]
async fn list_videos(
    Authenticated(user_id): Authenticated,
    repo: web::Data<ArcRepo>,
) -> Result<HttpResponse, Error> {
    let videos = repo.videos_for_user(user_id).await?;

    Ok(HttpResponse::Ok().json(&videos))
}

#[tracing::instrument(name = "Fetching video", skip(repo))]
async fn get_video(
    VideoId(video_id): VideoId,
    repo: web::Data<ArcRepo>,
) -> Result<HttpResponse, Error> {
    let video = repo
        .video(video_id)
        .await?
        .ok_or(UploadError::VideoNotFound)?;

    Ok(HttpResponse::Ok().json(&video))
}

#[tracing::instrument(name = "Deleting video", skip(repo, store))]
async fn delete_video<S: Store + 'static>(
    VideoId(video_id): VideoId,
    Authenticated(user_id): Authenticated,
    repo: web::Data<ArcRepo>,
    store: web::Data<S>,
) -> Result<HttpResponse, Error> {
    let video = repo
        .video(video_id)
        .await?
        .ok_or(UploadError::VideoNotFound)?;

    if video.user_id != user_id {
        return Err(UploadError::NotVideoOwner.into());
    }

    repo.delete_video(video_id).await?;

    metrics::counter!(crate::init_metrics::VIDEOS_DELETED).increment(1);

    if let Some(key) = video
        .video_url
        .as_deref()
        .and_then(|url| store.key_from_url(url))
    {
        if let Err(e) = store.remove(&key).await {
            tracing::warn!("Failed to remove stored video {key}: {e}");
        }
    }

    Ok(HttpResponse::NoContent().finish())
}

/// Check ownership, then receive, classify, store, and attach an uploaded video file
#[tracing::instrument(name = "Uploading video", skip(req, payload, repo, store, prober))]
async fn upload_video<S: Store + 'static>(
    VideoId(video_id): VideoId,
    Authenticated(user_id): Authenticated,
    repo: web::Data<ArcRepo>,
    store: web::Data<S>,
    prober: web::Data<ArcProber>,
    req: HttpRequest,
    payload: web::Payload,
) -> Result<HttpResponse, actix_web::Error> {
    let res = async {
        let video = owned_video(&repo, video_id, user_id).await?;

        // the body is only read once the caller is known to own the video
        let Multipart(VideoUpload(value)) =
            Multipart::<VideoUpload>::from_request(&req, &mut payload.into_inner()).await?;

        let file = value
            .map()
            .and_then(|mut m| m.remove("video"))
            .and_then(|video| video.file())
            .ok_or(Error::from(UploadError::NoFiles))?;

        let tmp_file = file.result;

        let res = attach_upload(
            video,
            file.content_type.as_ref(),
            &tmp_file,
            &repo,
            &**store,
            &prober,
        )
        .await;

        if let Err(e) = tmp_file.cleanup().await {
            tracing::warn!("Failed to remove temporary upload: {e}");
        }

        Ok::<_, actix_web::Error>(res?)
    }
    .await;

    match res {
        Ok(video) => Ok(HttpResponse::Ok().json(&video)),
        Err(e) => {
            // form errors arrive wrapped, but they were built from our own errors
            let code = e
                .as_error::<Error>()
                .map(Error::error_code)
                .unwrap_or(ErrorCode::FILE_UPLOAD_ERROR);

            metrics::counter!(crate::init_metrics::UPLOADS_REJECTED, "code" => code.as_str())
                .increment(1);
            Err(e)
        }
    }
}

async fn owned_video(repo: &ArcRepo, video_id: Uuid, user_id: Uuid) -> Result<Video, Error> {
    let video = repo
        .video(video_id)
        .await?
        .ok_or(UploadError::VideoNotFound)?;

    if video.user_id != user_id {
        return Err(UploadError::NotVideoOwner.into());
    }

    Ok(video)
}

async fn attach_upload<S: Store>(
    mut video: Video,
    content_type: Option<&mime::Mime>,
    path: &Path,
    repo: &ArcRepo,
    store: &S,
    prober: &ArcProber,
) -> Result<Video, Error> {
    let content_type = match content_type {
        Some(content_type) if content_type.essence_str() == "video/mp4" => content_type,
        Some(content_type) => {
            return Err(UploadError::InvalidMediaType(content_type.to_string()).into())
        }
        None => return Err(UploadError::InvalidMediaType(String::from("none")).into()),
    };

    let Dimensions { width, height } = prober.probe(path).await?;
    let aspect_ratio = aspect_ratio::classify(width, height)?;

    tracing::debug!("Classified {width}x{height} as {aspect_ratio}");

    let key = storage_key(aspect_ratio);
    store.save_file(&key, path, content_type).await?;

    video.set_video_url(store.public_url(&key));
    repo.update_video(&video).await?;

    metrics::counter!(crate::init_metrics::UPLOADS, "aspect_ratio" => aspect_ratio.as_str())
        .increment(1);

    Ok(video)
}

async fn healthz<S: Store>(
    repo: web::Data<ArcRepo>,
    store: web::Data<S>,
) -> Result<HttpResponse, Error> {
    repo.health_check().await?;
    store.health_check().await?;
    Ok(HttpResponse::Ok().finish())
}

fn transform_error(error: actix_form_data::Error) -> actix_web::Error {
    let error: Error = error.into();
    let error: actix_web::Error = error.into();
    error
}

fn json_error(error: JsonPayloadError, _: &HttpRequest) -> actix_web::Error {
    match error {
        JsonPayloadError::Deserialize(e) => Error::from(UploadError::Json(e)).into(),
        e => e.into(),
    }
}

fn configure_endpoints<S: Store + 'static>(
    config: &mut web::ServiceConfig,
    repo: ArcRepo,
    store: S,
    prober: ArcProber,
    tmp_dir: ArcTmpDir,
    validator: JwtValidator,
    media: config::Media,
) {
    config
        .app_data(web::Data::new(repo))
        .app_data(web::Data::new(store))
        .app_data(web::Data::new(prober))
        .app_data(web::Data::new(tmp_dir))
        .app_data(web::Data::new(validator))
        .app_data(web::Data::new(media))
        .app_data(web::JsonConfig::default().error_handler(json_error))
        .route("/healthz", web::get().to(healthz::<S>))
        .service(
            web::scope("/api")
                .service(
                    web::resource("/videos")
                        .route(web::post().to(create_video))
                        .route(web::get().to(list_videos)),
                )
                .service(
                    web::resource("/videos/{video_id}")
                        .route(web::get().to(get_video))
                        .route(web::delete().to(delete_video::<S>)),
                )
                .service(
                    web::resource("/video_upload/{video_id}")
                        .route(web::post().to(upload_video::<S>)),
                ),
        );
}

async fn launch(
    repo: ArcRepo,
    store: ObjectStore,
    prober: ArcProber,
    tmp_dir: ArcTmpDir,
    validator: JwtValidator,
    config: Configuration,
) -> std::io::Result<()> {
    let address = config.server.address;

    tracing::info!("Starting tubely on {address}");

    HttpServer::new(move || {
        let repo = repo.clone();
        let store = store.clone();
        let prober = prober.clone();
        let tmp_dir = tmp_dir.clone();
        let validator = validator.clone();
        let media = config.media.clone();

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Metrics)
            .configure(move |sc| {
                configure_endpoints(sc, repo, store, prober, tmp_dir, validator, media)
            })
    })
    .bind(address)?
    .run()
    .await
}

impl TubelyConfiguration {
    /// Build the tubely configuration from commandline arguments
    pub fn build_default() -> color_eyre::Result<Self> {
        config::configure()
    }

    /// Install the default tubely tracer
    pub fn install_tracing(self) -> color_eyre::Result<Self> {
        init_tracing(&self.config.tracing)?;
        Ok(self)
    }

    pub fn install_metrics(self) -> color_eyre::Result<Self> {
        if let Some(addr) = self.config.metrics.prometheus_address {
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()?;

            init_metrics::init_metrics();
        }

        Ok(self)
    }

    /// Run the requested tubely operation
    pub async fn run(self) -> color_eyre::Result<()> {
        let TubelyConfiguration { config, operation } = self;

        let prober: ArcProber = Arc::new(FfProbe::new(
            config.media.ffprobe_path.clone(),
            config.media.process_timeout,
        ));

        match operation {
            Operation::Run => (),
            Operation::Probe { file } => {
                let Dimensions { width, height } = prober.probe(&file).await?;
                let aspect_ratio = aspect_ratio::classify(width, height)?;

                println!("{}: {width}x{height} {aspect_ratio}", file.display());

                return Ok(());
            }
        }

        let Some(jwt_secret) = config.server.jwt_secret.as_deref() else {
            return Err(eyre!(
                "No token secret configured, set server.jwt_secret or pass --jwt-secret"
            ));
        };
        let validator = JwtValidator::new(jwt_secret, &config.server.jwt_issuer);

        let Some(config::Store::ObjectStorage(storage)) = config.store.clone() else {
            return Err(eyre!(
                "No store configured, set store.type = \"object_storage\" or pass object-storage"
            ));
        };
        let store = ObjectStore::build(storage)?;

        let repo = Repo::open(config.repo.clone()).await?;

        let tmp_dir = TmpDir::init(&config.server.temporary_directory).await?;

        launch(
            repo.to_arc(),
            store,
            prober,
            tmp_dir.clone(),
            validator,
            config,
        )
        .await?;

        tmp_dir.cleanup().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests;
