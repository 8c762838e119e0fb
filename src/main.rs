mod config;
mod http;
mod models;
mod pipeline;
mod services;
mod telemetry;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, OrchestrationResponse, WebhookPayload};
use once_cell::sync::Lazy;
use pipeline::{Pipeline, PipelineError, PipelineErrorKind};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

const WEBHOOK_ROUTE: &str = "/api/v1/products/create_from_webhook";

static OPENAPI: Lazy<serde_json::Value> = Lazy::new(|| {
    serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or_else(|_| json!({"openapi": "3.0.3"}))
});

#[tokio::main]
async fn main() -> eyre::Result<()> {
    run()
        .await
        .inspect_err(|err| error!(target = "orchestrator.api", "server crashed: {err}"))
}

async fn run() -> eyre::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let pipeline = Pipeline::from_env();
    // Fail at boot rather than on the first webhook if the client cannot be configured.
    http::build_client(&pipeline.endpoints)?;
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    let state = AppState {
        pipeline,
        prometheus_handle,
        docs_key: config::secret_from_env("OPENAPI_KEY"),
        metrics_key: config::secret_from_env("METRICS_KEY"),
    };
    let app = build_router(state, config::body_limit_from_env());

    let addr: SocketAddr = ([0, 0, 0, 0], config::port_from_env()).into();
    info!(target = "orchestrator.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    prometheus_handle: PrometheusHandle,
    docs_key: Option<String>,
    metrics_key: Option<String>,
}

fn build_router(state: AppState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let api = Router::new().route(
        "/products/create_from_webhook",
        post(create_product_from_webhook),
    );

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .nest("/api/v1", api)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "product-orchestrator",
    }))
}

/// Create a product from a relayed webhook.
///
/// - Method: `POST`
/// - Path: `/api/v1/products/create_from_webhook`
/// - Body: `WebhookPayload`
/// - Response: `OrchestrationResponse` (submitted draft + Basalam response)
///
/// Deliveries are not deduplicated; a repeated webhook creates another product.
async fn create_product_from_webhook(
    State(state): State<AppState>,
    payload: Result<Json<WebhookPayload>, JsonRejection>,
) -> Result<Json<OrchestrationResponse>, AppError> {
    telemetry::record_request(WEBHOOK_ROUTE);
    let Json(payload) = payload.map_err(|rejection| AppError::Unprocessable(rejection.body_text()))?;
    payload.validate().map_err(AppError::Unprocessable)?;

    info!(target = "orchestrator.api", photos = payload.photo_links().len(), "webhook_received");
    let response = state.pipeline.run(payload).await?;
    Ok(Json(response))
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(key) = state.docs_key.as_deref()
        && presented_key(&headers, "X-Docs-Key") != key
    {
        return Err(AppError::Unauthorized("docs"));
    }
    Ok(Json((*OPENAPI).clone()))
}

async fn swagger_ui() -> Response {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Product Orchestrator Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
        .into_response()
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(secret) = state.metrics_key.as_deref()
        && presented_key(&headers, "X-Metrics-Key") != secret
    {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

fn presented_key<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
    Unprocessable(String),
    Unauthorized(&'static str),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, payload) = match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::Authentication => StatusCode::UNAUTHORIZED,
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::BadGateway => StatusCode::BAD_GATEWAY,
                    PipelineErrorKind::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
                    PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let payload = ApiError {
                    error: err.stage().to_string(),
                    detail: Some(err.detail().to_string()),
                };
                (status, payload)
            }
            AppError::Unprocessable(detail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiError {
                    error: "webhook".to_string(),
                    detail: Some(detail),
                },
            ),
            AppError::Unauthorized(scope) => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    error: scope.to_string(),
                    detail: Some("unauthorized".to_string()),
                },
            ),
        };
        (status, Json(payload)).into_response()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceEndpoints;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use mockito::{Matcher, Server};
    use serde_json::Value;
    use tower::ServiceExt;

    fn endpoints(base: &str) -> ServiceEndpoints {
        ServiceEndpoints {
            smart_uploader_url: format!("{base}/process-images"),
            video_check_url: format!("{base}/video-check"),
            description_service_url: format!("{base}/generate-description"),
            basalam_core_url: base.to_string(),
            timeout_secs: 5,
            connect_timeout_secs: 2,
        }
    }

    // The metrics macros only reach a globally installed recorder, shared by every test here.
    static RECORDER: Lazy<PrometheusHandle> = Lazy::new(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("install prometheus recorder")
    });

    fn state(endpoints: ServiceEndpoints) -> AppState {
        AppState {
            pipeline: Pipeline::new(endpoints),
            prometheus_handle: RECORDER.clone(),
            docs_key: None,
            metrics_key: None,
        }
    }

    fn app(endpoints: ServiceEndpoints) -> Router {
        build_router(state(endpoints), 256 * 1024)
    }

    async fn read_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    fn webhook(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(WEBHOOK_ROUTE)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn sample_body() -> Value {
        json!({
            "raw_data_json": {
                "raw_message": { "message": "shirt" },
                "photos": ["https://cdn.test/a.jpg", "https://cdn.test/b.jpg"],
                "stock": 5,
                "video": null,
            },
            "access_token": "tok",
        })
    }

    async fn read_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app(endpoints("http://127.0.0.1:1"))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], json!("ok"));
    }

    #[tokio::test]
    async fn webhook_submits_product() {
        let mut server = Server::new_async().await;
        let _vendor = server
            .mock("GET", "/v3/users/me")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_body(r#"{"vendor":{"id":42}}"#)
            .create_async()
            .await;
        let _images = server
            .mock("POST", "/process-images")
            .with_status(200)
            .with_body(r#"{"processed_images":[{"id":101},{"id":102}]}"#)
            .create_async()
            .await;
        let _description = server
            .mock("POST", "/generate-description")
            .match_body(Matcher::Json(json!({ "raw_text": "shirt" })))
            .with_status(200)
            .with_body(r#"{"data":{"name":"Shirt"}}"#)
            .create_async()
            .await;
        let _submission = server
            .mock("POST", "/v3/vendors/42/products")
            .with_status(201)
            .with_body(r#"{"id":555}"#)
            .create_async()
            .await;

        let response = app(endpoints(&server.url()))
            .oneshot(webhook(sample_body()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["status"], json!("success"));
        assert_eq!(body["submitted_payload"]["photo"], json!(101));
        assert_eq!(body["submitted_payload"]["photos"], json!([102]));
        assert_eq!(body["submitted_payload"]["vendor_id"], json!(42));
        assert_eq!(body["basalam_response"], json!({ "id": 555 }));
    }

    #[tokio::test]
    async fn rejected_token_maps_to_401() {
        let mut server = Server::new_async().await;
        let _vendor = server
            .mock("GET", "/v3/users/me")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let response = app(endpoints(&server.url()))
            .oneshot(webhook(sample_body()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = read_json(response).await;
        assert_eq!(body["error"], json!("resolve_vendor"));
        assert_eq!(body["detail"], json!("Authentication failed: forbidden"));
    }

    #[tokio::test]
    async fn empty_image_ids_map_to_400() {
        let mut server = Server::new_async().await;
        let _vendor = server
            .mock("GET", "/v3/users/me")
            .with_status(200)
            .with_body(r#"{"vendor":{"id":42}}"#)
            .create_async()
            .await;
        let _images = server
            .mock("POST", "/process-images")
            .with_status(200)
            .with_body(r#"{"processed_images":[]}"#)
            .create_async()
            .await;

        let response = app(endpoints(&server.url()))
            .oneshot(webhook(sample_body()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unreachable_uploader_maps_to_504() {
        let mut server = Server::new_async().await;
        let _vendor = server
            .mock("GET", "/v3/users/me")
            .with_status(200)
            .with_body(r#"{"vendor":{"id":42}}"#)
            .create_async()
            .await;
        let mut endpoints = endpoints(&server.url());
        endpoints.smart_uploader_url = "http://127.0.0.1:1/process-images".into();

        let response = app(endpoints).oneshot(webhook(sample_body())).await.unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = read_json(response).await;
        assert_eq!(
            body["detail"],
            json!("Network error for http://127.0.0.1:1/process-images")
        );
    }

    #[tokio::test]
    async fn malformed_body_is_unprocessable() {
        let response = app(endpoints("http://127.0.0.1:1"))
            .oneshot(webhook(json!({ "access_token": "tok" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(read_json(response).await["error"], json!("webhook"));
    }

    #[tokio::test]
    async fn non_http_photo_is_unprocessable() {
        let mut body = sample_body();
        body["raw_data_json"]["photos"] = json!(["file:///etc/passwd"]);

        let response = app(endpoints("http://127.0.0.1:1"))
            .oneshot(webhook(body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn openapi_document_lists_webhook_route() {
        let response = app(endpoints("http://127.0.0.1:1"))
            .oneshot(Request::get("/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let doc = read_json(response).await;
        assert!(doc["paths"].get(WEBHOOK_ROUTE).is_some());
    }

    #[tokio::test]
    async fn docs_key_gates_openapi_document() {
        let mut state = state(endpoints("http://127.0.0.1:1"));
        state.docs_key = Some("letmein".into());
        let router = build_router(state, 256 * 1024);

        let denied = router
            .clone()
            .oneshot(Request::get("/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = router
            .oneshot(
                Request::get("/openapi.json")
                    .header("X-Docs-Key", "letmein")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_expose_webhook_requests() {
        let router = app(endpoints("http://127.0.0.1:1"));
        let rejected = router
            .clone()
            .oneshot(webhook(json!({ "access_token": "tok" })))
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_text(response).await;
        assert!(body.contains(telemetry::REQUESTS_TOTAL), "metrics body: {body}");
        assert!(body.contains(WEBHOOK_ROUTE), "metrics body: {body}");
    }

    #[tokio::test]
    async fn metrics_key_gates_exporter() {
        let mut state = state(endpoints("http://127.0.0.1:1"));
        state.metrics_key = Some("scrape".into());
        let response = build_router(state, 256 * 1024)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn blank_video_is_unprocessable() {
        let mut body = sample_body();
        body["raw_data_json"]["video"] = json!("");

        let response = app(endpoints("http://127.0.0.1:1"))
            .oneshot(webhook(body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
