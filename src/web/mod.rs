//! HTTP surface: the page, gallery search, generation and static files.

use std::num::NonZeroU16;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::classify::{UpstreamResponse, classify};
use crate::config::AppConfig;
use crate::constants::{GALLERY_SUBDIR, GENERATED_PREFIX, PROMPT_LOG_CHARS, STATIC_URL_PREFIX};
use crate::error::ApiError;

mod images;
mod views;

use images::static_file_handler;
use views::index_handler;

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    config: Arc<AppConfig>,
}

impl AppState {
    fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn gallery_dir(&self) -> PathBuf {
        self.config.static_dir.join(GALLERY_SUBDIR)
    }
}

#[derive(Serialize, Debug)]
pub(crate) struct GalleryResponse {
    success: bool,
    images: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct GenerateRequest {
    #[serde(default)]
    keyword: Option<String>,
}

#[derive(Serialize, Debug)]
pub(crate) struct GenerateResponse {
    success: bool,
    image_url: String,
}

/// handles GET /get_gallery
async fn gallery_handler(
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Json<GalleryResponse> {
    // repeated keys are fine, the first keyword wins
    let keyword = match query {
        Ok(Query(pairs)) => pairs
            .into_iter()
            .find_map(|(key, value)| (key == "keyword").then_some(value)),
        Err(rejection) => {
            debug!("Ignoring unparseable gallery query: {}", rejection);
            None
        }
    };
    let gallery_dir = state.gallery_dir();
    let images = state
        .config
        .catalog
        .search(&gallery_dir, keyword.as_deref())
        .await
        .into_iter()
        .map(|entry| format!("{STATIC_URL_PREFIX}/{GALLERY_SUBDIR}/{}", entry.filename))
        .collect::<Vec<_>>();
    debug!(
        "Gallery query {:?} matched {} images",
        keyword,
        images.len()
    );

    Json(GalleryResponse {
        success: true,
        images,
    })
}

/// handles POST /generate
async fn generate_handler(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::Internal(rejection.body_text()))?;
    let keyword = request.keyword.as_deref().map(str::trim).unwrap_or_default();
    if keyword.is_empty() {
        return Err(ApiError::EmptyKeyword);
    }

    let config = &state.config;
    let prompt = config.prompts.build(keyword);
    info!("Requesting image, prompt: {}...", prompt.preview(PROMPT_LOG_CHARS));

    let body = config.inference.query(&prompt, &config.parameters).await?;
    let image = match classify(body) {
        UpstreamResponse::Image(image) => image,
        UpstreamResponse::Error { message, kind } => {
            return Err(ApiError::from_upstream(message, kind));
        }
    };

    let filename = generated_filename(Utc::now().timestamp(), &image);
    let path = config.static_dir.join(&filename);
    tokio::fs::write(&path, &image).await.inspect_err(|err| {
        error!("Failed to write {}: {}", path.display(), err);
    })?;
    info!("Saved {} ({} bytes)", path.display(), image.len());

    Ok(Json(GenerateResponse {
        success: true,
        image_url: format!("{STATIC_URL_PREFIX}/{filename}"),
    }))
}

/// `gen_<timestamp>.<ext>`, png unless the bytes say otherwise
fn generated_filename(timestamp: i64, bytes: &[u8]) -> String {
    let extension = image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("png");
    format!("{GENERATED_PREFIX}{timestamp}.{extension}")
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::get(index_handler))
        .route("/get_gallery", axum::routing::get(gallery_handler))
        .route("/generate", axum::routing::post(generate_handler))
        .route("/static/{*path}", axum::routing::get(static_file_handler))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
    }
    info!("Shutting down");
}

/// Creates the static dir if needed and serves until ctrl-c.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    config: AppConfig,
) -> Result<(), anyhow::Error> {
    tokio::fs::create_dir_all(&config.static_dir).await?;
    info!(
        "Writing images to {}, catalog has {} entries",
        config.static_dir.display(),
        config.catalog.entries().len()
    );

    let app = create_router().with_state(AppState::new(config));

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
    use axum::http::{HeaderMap, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;
    use url::Url;

    use crate::catalog::Catalog;
    use crate::inference::{GenerationParameters, InferenceClient};
    use crate::prompt::PromptBuilder;

    const PNG_BYTES: &[u8] = &[
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D',
        b'R',
    ];

    const TEST_CATALOG: &str = r#"[
        {"filename": "flower.jpg", "tags": ["岩墙花", "red"]},
        {"filename": "bird.jpg", "tags": ["阳雀", "Yellow"]},
        {"filename": "missing.jpg", "tags": ["red"]}
    ]"#;

    #[derive(Clone)]
    struct FakeUpstream {
        calls: Arc<AtomicUsize>,
        last_request: Arc<Mutex<Option<(String, Value)>>>,
        body: Arc<Vec<u8>>,
    }

    async fn fake_inference(
        State(upstream): State<FakeUpstream>,
        headers: HeaderMap,
        Json(request): Json<Value>,
    ) -> Vec<u8> {
        upstream.calls.fetch_add(1, Ordering::SeqCst);
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        *upstream.last_request.lock().expect("lock") = Some((auth, request));
        upstream.body.as_ref().clone()
    }

    async fn spawn_upstream(body: &[u8]) -> (Url, FakeUpstream) {
        let upstream = FakeUpstream {
            calls: Arc::new(AtomicUsize::new(0)),
            last_request: Arc::new(Mutex::new(None)),
            body: Arc::new(body.to_vec()),
        };
        let app = Router::new()
            .route("/models/sdxl", axum::routing::post(fake_inference))
            .with_state(upstream.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake upstream");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        let url = Url::parse(&format!("http://{addr}/models/sdxl")).expect("url");
        (url, upstream)
    }

    fn setup_state(static_dir: &std::path::Path, endpoint: Url) -> AppState {
        let gallery = static_dir.join(GALLERY_SUBDIR);
        std::fs::create_dir_all(&gallery).expect("create gallery");
        std::fs::write(gallery.join("flower.jpg"), b"flower").expect("write flower");
        std::fs::write(gallery.join("bird.jpg"), b"bird").expect("write bird");

        AppState::new(AppConfig {
            static_dir: static_dir.to_path_buf(),
            catalog: Catalog::from_json(TEST_CATALOG).expect("catalog"),
            prompts: PromptBuilder::default(),
            parameters: GenerationParameters::default(),
            inference: InferenceClient::with_client(
                reqwest::Client::builder()
                    .no_proxy()
                    .timeout(Duration::from_secs(5))
                    .build()
                    .expect("client"),
                endpoint,
                "test-token".to_string(),
            ),
        })
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn generate_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/generate")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn index_renders_with_suggestions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (url, _) = spawn_upstream(PNG_BYTES).await;
        let app = create_router().with_state(setup_state(dir.path(), url));

        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8_lossy(&bytes);
        assert!(body.contains("土家织锦"));
        assert!(body.contains("岩墙花"));
    }

    #[tokio::test]
    async fn gallery_lists_present_images() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (url, _) = spawn_upstream(PNG_BYTES).await;
        let app = create_router().with_state(setup_state(dir.path(), url));

        let response = app.clone().oneshot(get("/get_gallery")).await.unwrap();
        let body = read_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(
            body["images"],
            serde_json::json!(["static/images/flower.jpg", "static/images/bird.jpg"])
        );

        let response = app.oneshot(get("/get_gallery?keyword=RED")).await.unwrap();
        let body = read_json(response).await;
        assert_eq!(body["images"], serde_json::json!(["static/images/flower.jpg"]));
    }

    #[tokio::test]
    async fn gallery_takes_the_first_of_repeated_keywords() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (url, _) = spawn_upstream(PNG_BYTES).await;
        let app = create_router().with_state(setup_state(dir.path(), url));

        let response = app
            .oneshot(get("/get_gallery?keyword=red&keyword=x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["images"], serde_json::json!(["static/images/flower.jpg"]));
    }

    #[tokio::test]
    async fn gallery_handles_cjk_queries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (url, _) = spawn_upstream(PNG_BYTES).await;
        let app = create_router().with_state(setup_state(dir.path(), url));

        // 阳雀, percent-encoded
        let response = app
            .oneshot(get("/get_gallery?keyword=%E9%98%B3%E9%9B%80"))
            .await
            .unwrap();
        let body = read_json(response).await;
        assert_eq!(body["images"], serde_json::json!(["static/images/bird.jpg"]));
    }

    #[tokio::test]
    async fn empty_keyword_makes_no_upstream_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (url, upstream) = spawn_upstream(PNG_BYTES).await;
        let app = create_router().with_state(setup_state(dir.path(), url));

        for body in [r#"{"keyword": ""}"#, r#"{"keyword": "   "}"#, "{}"] {
            let response = app.clone().oneshot(generate_request(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = read_json(response).await;
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], "请输入关键词");
        }
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generate_saves_the_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (url, upstream) = spawn_upstream(PNG_BYTES).await;
        let app = create_router().with_state(setup_state(dir.path(), url));

        let response = app
            .oneshot(generate_request(r#"{"keyword": " 岩墙花 "}"#))
            .await
            .unwrap();
        let body = read_json(response).await;
        assert_eq!(body["success"], true);

        let image_url = body["image_url"].as_str().expect("image_url");
        assert!(image_url.starts_with("static/gen_"));
        assert!(image_url.ends_with(".png"));
        let filename = image_url.trim_start_matches("static/");
        let saved = std::fs::read(dir.path().join(filename)).expect("saved image");
        assert_eq!(saved, PNG_BYTES);

        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
        let (auth, request) = upstream
            .last_request
            .lock()
            .expect("lock")
            .clone()
            .expect("request recorded");
        assert_eq!(auth, "Bearer test-token");
        assert!(
            request["inputs"]
                .as_str()
                .expect("inputs")
                .contains("Eight-Hook")
        );
        assert_eq!(request["parameters"]["height"], 1024);
    }

    #[tokio::test]
    async fn warming_upstream_asks_for_a_retry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (url, _) = spawn_upstream(
            br#"{"error": "Model stabilityai/stable-diffusion-xl-base-1.0 is currently loading", "estimated_time": 20.0}"#,
        )
        .await;
        let app = create_router().with_state(setup_state(dir.path(), url));

        let response = app
            .oneshot(generate_request(r#"{"keyword": "阳雀"}"#))
            .await
            .unwrap();
        let body = read_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "模型正在唤醒中，请等待 20 秒后再次点击生成...");

        let generated = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(GENERATED_PREFIX))
            .count();
        assert_eq!(generated, 0);
    }

    #[tokio::test]
    async fn upstream_errors_are_echoed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (url, _) = spawn_upstream(br#"{"error": "bad request"}"#).await;
        let app = create_router().with_state(setup_state(dir.path(), url));

        let response = app
            .oneshot(generate_request(r#"{"keyword": "雷纹"}"#))
            .await
            .unwrap();
        let body = read_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "API 报错: bad request");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_transport_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = Url::parse("http://127.0.0.1:9/models/sdxl").expect("url");
        let app = create_router().with_state(setup_state(dir.path(), url));

        let response = app
            .oneshot(generate_request(r#"{"keyword": "雷纹"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "网络连接失败，请检查网络设置。");
    }

    #[tokio::test]
    async fn malformed_body_gets_the_envelope() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (url, upstream) = spawn_upstream(PNG_BYTES).await;
        let app = create_router().with_state(setup_state(dir.path(), url));

        let response = app
            .oneshot(generate_request("{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().is_some_and(|error| !error.is_empty()));
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn static_files_are_served_with_validators() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (url, _) = spawn_upstream(PNG_BYTES).await;
        let app = create_router().with_state(setup_state(dir.path(), url));
        std::fs::write(dir.path().join("gen_1.png"), PNG_BYTES).expect("write image");

        let response = app.clone().oneshot(get("/static/gen_1.png")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "image/png");
        let etag = response.headers().get(ETAG).expect("etag").clone();

        let request = Request::builder()
            .method("GET")
            .uri("/static/gen_1.png")
            .header(IF_NONE_MATCH, etag)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

        let response = app
            .clone()
            .oneshot(get("/static/images/flower.jpg"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "image/jpeg");

        let response = app.clone().oneshot(get("/static/nope.png")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(get("/static/images/../../secret"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn filenames_follow_the_image_format() {
        assert_eq!(generated_filename(1700000000, PNG_BYTES), "gen_1700000000.png");
        assert_eq!(
            generated_filename(1, &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]),
            "gen_1.jpg"
        );
        assert_eq!(generated_filename(2, b"????"), "gen_2.png");
    }
}
