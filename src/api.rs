//! REST API for the box packing service.
//!
//! Exposes order packing over HTTP using Axum, with CORS enabled and an
//! OpenAPI document served under `/docs`.

use std::any::Any;
use std::sync::{Arc, OnceLock};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::{
    Router,
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};

use crate::config::ApiConfig;
use crate::model::{BoxResult, BoxTemplate, OrderPackingResult, OrderRequest, Product, validate_orders};
use crate::optimizer::FirstFitDecreasing;
use crate::orchestrator::{BatchStatus, OrderPackingService, ProcessOrdersError};
use crate::repository::BoxCatalog;
use crate::store::SqliteStore;

/// Service type wired into the HTTP layer.
pub type PackingService = OrderPackingService<SqliteStore, FirstFitDecreasing>;

/// Header carrying the id of the authenticated order owner.
pub const OWNER_ID_HEADER: &str = "x-owner-id";

#[derive(Clone)]
struct ApiState {
    service: Arc<PackingService>,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>box-packer API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                window.ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                });
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        "Invalid input data",
        details,
    )
}

fn internal_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
        details,
    )
}

/// Turns a panic inside a handler into a JSON 500 instead of a dropped connection.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = message, "request handler panicked");
    internal_error("An unexpected error occurred")
}

fn catch_panic_layer() -> CatchPanicLayer<fn(Box<dyn Any + Send + 'static>) -> Response> {
    CatchPanicLayer::custom(panic_response as fn(Box<dyn Any + Send + 'static>) -> Response)
}

/// Reads the owner id set by the authentication layer in front of the service.
fn owner_id_from_headers(headers: &HeaderMap) -> Result<i64, Response> {
    headers
        .get(OWNER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| {
            error_response(
                StatusCode::UNAUTHORIZED,
                "Unauthenticated",
                "Missing or invalid owner id",
            )
        })
}

fn parse_orders(
    payload: Result<Json<Vec<OrderRequest>>, JsonRejection>,
) -> Result<Vec<OrderRequest>, Response> {
    let Json(orders) = payload.map_err(json_deserialize_error)?;
    validate_orders(&orders).map_err(|err| {
        warn!(error = %err, "pack request rejected");
        validation_error(err.to_string())
    })?;
    Ok(orders)
}

/// Maps a batch outcome to its HTTP status.
///
/// A batch in which every order failed is answered like a partial one; the
/// per-order ids tell the two apart.
fn status_for(status: BatchStatus) -> StatusCode {
    match status {
        BatchStatus::Complete => StatusCode::OK,
        BatchStatus::Partial | BatchStatus::Failed => StatusCode::MULTI_STATUS,
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_pack_orders, handle_list_boxes),
    components(
        schemas(
            OrderRequest,
            Product,
            OrderPackingResult,
            BoxResult,
            BoxTemplate,
            ErrorResponse
        )
    ),
    tags((name = "packing", description = "Endpoints for packing orders into boxes"))
)]
struct ApiDoc;

fn router(service: Arc<PackingService>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(cors::Any)
        .allow_origin(cors::Any)
        .allow_headers(cors::Any);

    let state = ApiState { service };

    Router::new()
        .route("/pack-orders", post(handle_pack_orders))
        .route("/boxes", get(handle_list_boxes))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .layer(catch_panic_layer())
        .with_state(state)
}

/// Starts the API server and blocks until it terminates.
pub async fn start_api_server(config: ApiConfig, service: PackingService) -> std::io::Result<()> {
    let app = router(Arc::new(service));

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        "🚀 Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        info!("💡 Local access: http://localhost:{}", config.port());
    }
    info!("📦 API endpoints: POST /pack-orders, GET /boxes");
    info!("📑 Documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /pack-orders endpoint.
///
/// Packs every order into boxes and records it. Orders whose persistence
/// failed come back with `order_id` 0 and turn the response into 207.
#[utoipa::path(
    post,
    path = "/pack-orders",
    request_body = Vec<OrderRequest>,
    params(
        ("x-owner-id" = i64, Header, description = "Id of the authenticated owner")
    ),
    responses(
        (status = 200, description = "All orders packed and persisted", body = Vec<OrderPackingResult>),
        (
            status = 207,
            description = "Some or all orders could not be persisted (order_id 0)",
            body = Vec<OrderPackingResult>
        ),
        (status = UNAUTHORIZED, description = "Missing or invalid owner id", body = ErrorResponse),
        (status = BAD_REQUEST, description = "Invalid orders", body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Unexpected failure", body = ErrorResponse)
    ),
    tag = "packing"
)]
async fn handle_pack_orders(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<Vec<OrderRequest>>, JsonRejection>,
) -> Response {
    let orders = match parse_orders(payload) {
        Ok(orders) => orders,
        Err(response) => return response,
    };
    let owner_id = match owner_id_from_headers(&headers) {
        Ok(owner_id) => owner_id,
        Err(response) => return response,
    };

    info!(orders = orders.len(), owner_id, "📥 New pack request");

    match state.service.process_orders(&orders, owner_id).await {
        Ok(results) => {
            let batch = BatchStatus::from_results(&results);
            let persisted = results.iter().filter(|r| r.is_persisted()).count();
            info!(
                ?batch,
                persisted,
                failed = results.len() - persisted,
                "📦 Pack request finished"
            );
            (status_for(batch), Json(results)).into_response()
        }
        Err(ProcessOrdersError::Packing(err)) => validation_error(err.to_string()),
        Err(err @ ProcessOrdersError::Catalog(_)) => {
            error!(error = %err, "pack request failed");
            internal_error(err.to_string())
        }
    }
}

/// Handler for GET /boxes endpoint.
///
/// Lists the box catalog used for packing.
#[utoipa::path(
    get,
    path = "/boxes",
    responses(
        (status = 200, description = "Available box templates", body = Vec<BoxTemplate>),
        (status = INTERNAL_SERVER_ERROR, description = "Catalog could not be read", body = ErrorResponse)
    ),
    tag = "packing"
)]
async fn handle_list_boxes(State(state): State<ApiState>) -> Response {
    match state.service.repository().list_box_templates().await {
        Ok(templates) => (StatusCode::OK, Json(templates)).into_response(),
        Err(err) => {
            error!(error = %err, "could not list box templates");
            internal_error(err.to_string())
        }
    }
}

async fn serve_openapi_json() -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}
