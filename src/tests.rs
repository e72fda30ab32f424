use std::{path::Path, sync::Arc};

use actix_web::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        StatusCode,
    },
    test, App,
};
use jsonwebtoken::{EncodingKey, Header};
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::{
    auth::JwtValidator,
    config,
    ffprobe::{ArcProber, Dimensions, FfProbeError, MediaProber},
    repo::{sled::SledRepo, ArcRepo},
    store::object_store::ObjectStore,
    tmp_file::{ArcTmpDir, TmpDir},
};

const SECRET: &str = "tubely test secret";
const ISSUER: &str = "tubely-access";
const PUBLIC_ENDPOINT: &str = "https://videos.example.com";

#[derive(Debug)]
struct StubProber(Dimensions);

#[async_trait::async_trait(?Send)]
impl MediaProber for StubProber {
    async fn probe(&self, path: &Path) -> Result<Dimensions, FfProbeError> {
        assert!(path.exists(), "Upload should be on disk while probing");

        Ok(self.0)
    }
}

struct Harness {
    repo: ArcRepo,
    store: ObjectStore,
    prober: ArcProber,
    tmp_dir: ArcTmpDir,
}

impl Harness {
    async fn new(width: i64, height: i64) -> Self {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .expect("Opened temporary db");

        let tmp_dir = TmpDir::init(std::env::temp_dir().join("tubely-handler-tests"))
            .await
            .expect("Created tmp dir");

        Harness {
            repo: Arc::new(SledRepo::build(db).expect("Built repo")),
            store: ObjectStore::memory(Url::parse(PUBLIC_ENDPOINT).expect("Valid url")),
            prober: Arc::new(StubProber(Dimensions { width, height })),
            tmp_dir,
        }
    }
}

macro_rules! init_app {
    ($harness:expr) => {{
        let repo = $harness.repo.clone();
        let store = $harness.store.clone();
        let prober = $harness.prober.clone();
        let tmp_dir = $harness.tmp_dir.clone();

        test::init_service(App::new().configure(move |sc| {
            crate::configure_endpoints(
                sc,
                repo,
                store,
                prober,
                tmp_dir,
                JwtValidator::new(SECRET, ISSUER),
                config::Media {
                    max_file_size: 1,
                    process_timeout: 30,
                    ffprobe_path: String::from("ffprobe"),
                },
            )
        }))
        .await
    }};
}

fn bearer(user_id: Uuid) -> String {
    let now = OffsetDateTime::now_utc().unix_timestamp();

    let claims = serde_json::json!({
        "iss": ISSUER,
        "sub": user_id.to_string(),
        "iat": now,
        "exp": now + 3600,
    });

    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("Encoded token");

    format!("Bearer {token}")
}

fn multipart(content_type: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "tubely-test-boundary";

    let mut body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"video\"; filename=\"boots.mp4\"\r\n\
         Content-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    (format!("multipart/form-data; boundary={boundary}"), body)
}

fn new_video(owner: Uuid) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/videos")
        .insert_header((AUTHORIZATION, bearer(owner)))
        .set_json(serde_json::json!({
            "title": "Boots",
            "description": "A review of some boots",
        }))
}

fn upload(video_id: &str, owner: Uuid, content_type: &str) -> test::TestRequest {
    let (header, body) = multipart(content_type, b"not really an mp4");

    test::TestRequest::post()
        .uri(&format!("/api/video_upload/{video_id}"))
        .insert_header((AUTHORIZATION, bearer(owner)))
        .insert_header((CONTENT_TYPE, header))
        .set_payload(body)
}

fn error_code(body: &serde_json::Value) -> &str {
    body["code"].as_str().expect("Error code")
}

#[actix_web::test]
async fn healthz() {
    let harness = Harness::new(1920, 1080).await;
    let app = init_app!(harness);

    let req = test::TestRequest::get().uri("/healthz").to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::OK);
}

#[actix_web::test]
async fn create_requires_token() {
    let harness = Harness::new(1920, 1080).await;
    let app = init_app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/videos")
        .set_json(serde_json::json!({ "title": "t", "description": "d" }))
        .to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(error_code(&body), "missing-token");

    let req = test::TestRequest::post()
        .uri("/api/videos")
        .insert_header((AUTHORIZATION, "Bearer not.a.token"))
        .set_json(serde_json::json!({ "title": "t", "description": "d" }))
        .to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(error_code(&body), "invalid-token");
}

#[actix_web::test]
async fn create_rejects_bad_json() {
    let harness = Harness::new(1920, 1080).await;
    let app = init_app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/videos")
        .insert_header((AUTHORIZATION, bearer(Uuid::new_v4())))
        .set_json(serde_json::json!({ "title": 5 }))
        .to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(error_code(&body), "invalid-json");
}

#[actix_web::test]
async fn create_get_and_list() {
    let harness = Harness::new(1920, 1080).await;
    let app = init_app!(harness);
    let owner = Uuid::new_v4();

    let res = test::call_service(&app, new_video(owner).to_request()).await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let created: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(created["title"], "Boots");
    assert_eq!(created["user_id"], owner.to_string());
    assert!(created["video_url"].is_null());

    let id = created["id"].as_str().expect("Video id");

    let req = test::TestRequest::get()
        .uri(&format!("/api/videos/{id}"))
        .to_request();
    let fetched: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(fetched, created);

    let req = test::TestRequest::get()
        .uri("/api/videos")
        .insert_header((AUTHORIZATION, bearer(owner)))
        .to_request();
    let listed: Vec<serde_json::Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed, vec![created]);

    let req = test::TestRequest::get()
        .uri("/api/videos")
        .insert_header((AUTHORIZATION, bearer(Uuid::new_v4())))
        .to_request();
    let listed: Vec<serde_json::Value> = test::call_and_read_body_json(&app, req).await;
    assert!(listed.is_empty());
}

#[actix_web::test]
async fn get_missing_or_invalid() {
    let harness = Harness::new(1920, 1080).await;
    let app = init_app!(harness);

    let req = test::TestRequest::get()
        .uri(&format!("/api/videos/{}", Uuid::new_v4()))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri("/api/videos/not-a-uuid")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(error_code(&body), "invalid-video-id");
}

#[actix_web::test]
async fn delete_checks_owner() {
    let harness = Harness::new(1920, 1080).await;
    let app = init_app!(harness);
    let owner = Uuid::new_v4();

    let created: serde_json::Value =
        test::call_and_read_body_json(&app, new_video(owner).to_request()).await;
    let id = created["id"].as_str().expect("Video id");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/videos/{id}"))
        .insert_header((AUTHORIZATION, bearer(Uuid::new_v4())))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/videos/{id}"))
        .insert_header((AUTHORIZATION, bearer(owner)))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/videos/{id}"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn upload_landscape() {
    let harness = Harness::new(1920, 1080).await;
    let app = init_app!(harness);
    let owner = Uuid::new_v4();

    let created: serde_json::Value =
        test::call_and_read_body_json(&app, new_video(owner).to_request()).await;
    let id = created["id"].as_str().expect("Video id");

    let res = test::call_service(&app, upload(id, owner, "video/mp4").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);

    let uploaded: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(uploaded["id"], created["id"]);

    let url = uploaded["video_url"].as_str().expect("Video url");
    let key = url
        .strip_prefix("https://videos.example.com/")
        .expect("Public url");

    let hex = key
        .strip_prefix("landscape/")
        .and_then(|rest| rest.strip_suffix(".mp4"))
        .expect("Landscape key");
    assert_eq!(hex.len(), 64);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));

    let meta = harness.store.head(key).await.expect("Stored object");
    assert_eq!(meta.size, b"not really an mp4".len());

    let req = test::TestRequest::get()
        .uri(&format!("/api/videos/{id}"))
        .to_request();
    let fetched: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(fetched["video_url"], url);

    // deleting the video drops the stored object too
    let req = test::TestRequest::delete()
        .uri(&format!("/api/videos/{id}"))
        .insert_header((AUTHORIZATION, bearer(owner)))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(harness.store.head(key).await.is_err());
}

#[actix_web::test]
async fn upload_portrait() {
    let harness = Harness::new(1080, 1920).await;
    let app = init_app!(harness);
    let owner = Uuid::new_v4();

    let created: serde_json::Value =
        test::call_and_read_body_json(&app, new_video(owner).to_request()).await;
    let id = created["id"].as_str().expect("Video id");

    let uploaded: serde_json::Value =
        test::call_and_read_body_json(&app, upload(id, owner, "video/mp4").to_request()).await;

    let url = uploaded["video_url"].as_str().expect("Video url");
    assert!(url.starts_with("https://videos.example.com/portrait/"));
}

#[actix_web::test]
async fn upload_rejections() {
    let harness = Harness::new(1920, 1080).await;
    let app = init_app!(harness);
    let owner = Uuid::new_v4();

    let created: serde_json::Value =
        test::call_and_read_body_json(&app, new_video(owner).to_request()).await;
    let id = created["id"].as_str().expect("Video id");

    let res = test::call_service(
        &app,
        upload(id, Uuid::new_v4(), "video/mp4").to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = test::call_service(&app, upload(id, owner, "image/png").to_request()).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(error_code(&body), "invalid-media-type");

    let missing = Uuid::new_v4().to_string();
    let res = test::call_service(&app, upload(&missing, owner, "video/mp4").to_request()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = test::call_service(&app, upload("nope", owner, "video/mp4").to_request()).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri(&format!("/api/videos/{id}"))
        .to_request();
    let fetched: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert!(fetched["video_url"].is_null());
}

#[actix_web::test]
async fn upload_rejects_zero_dimensions() {
    let harness = Harness::new(0, 0).await;
    let app = init_app!(harness);
    let owner = Uuid::new_v4();

    let created: serde_json::Value =
        test::call_and_read_body_json(&app, new_video(owner).to_request()).await;
    let id = created["id"].as_str().expect("Video id");

    let res = test::call_service(&app, upload(id, owner, "video/mp4").to_request()).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(error_code(&body), "invalid-dimensions");
}

#[actix_web::test]
async fn upload_checks_owner_before_reading_body() {
    let harness = Harness::new(1920, 1080).await;
    let app = init_app!(harness);
    let owner = Uuid::new_v4();

    let created: serde_json::Value =
        test::call_and_read_body_json(&app, new_video(owner).to_request()).await;
    let id = created["id"].as_str().expect("Video id");

    // larger than the 1MB limit, so reading it would fail the upload
    let oversized = vec![0u8; 2 * crate::MEGABYTES];

    let oversized_upload = |user_id| {
        let (header, body) = multipart("video/mp4", &oversized);

        test::TestRequest::post()
            .uri(&format!("/api/video_upload/{id}"))
            .insert_header((AUTHORIZATION, bearer(user_id)))
            .insert_header((CONTENT_TYPE, header))
            .set_payload(body)
            .to_request()
    };

    let res = test::call_service(&app, oversized_upload(Uuid::new_v4())).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(error_code(&body), "not-video-owner");

    let req = test::TestRequest::post()
        .uri(&format!("/api/video_upload/{id}"))
        .insert_header((AUTHORIZATION, bearer(Uuid::new_v4())))
        .insert_header((CONTENT_TYPE, "multipart/form-data; boundary=tubely-test-boundary"))
        .set_payload("this is not a multipart body")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = test::call_service(&app, oversized_upload(owner)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(error_code(&body), "file-upload-error");
}

#[actix_web::test]
async fn upload_without_video_field() {
    let harness = Harness::new(1920, 1080).await;
    let app = init_app!(harness);
    let owner = Uuid::new_v4();

    let created: serde_json::Value =
        test::call_and_read_body_json(&app, new_video(owner).to_request()).await;
    let id = created["id"].as_str().expect("Video id");

    let boundary = "tubely-test-boundary";
    let body = format!("--{boundary}--\r\n");

    let req = test::TestRequest::post()
        .uri(&format!("/api/video_upload/{id}"))
        .insert_header((AUTHORIZATION, bearer(owner)))
        .insert_header((
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        ))
        .set_payload(body)
        .to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
