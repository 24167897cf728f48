use axum::{Router, extract::FromRef, http::HeaderName};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod seed;

// Routers grouped by the gate that guards them.
pub mod routes;
use routes::{admin, manager, public, staff};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// The OpenAPI document, served at `/api-docs/openapi.json` and rendered by
/// Swagger UI at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::login,
        handlers::admin_me, handlers::admin_logout, handlers::get_stats,
        handlers::list_users, handlers::get_user, handlers::create_user,
        handlers::update_user, handlers::delete_user,
        handlers::list_branches, handlers::get_branch, handlers::create_branch,
        handlers::update_branch, handlers::delete_branch,
        handlers::manager_staff, handlers::manager_attendance,
        handlers::me, handlers::logout,
        handlers::clock_in, handlers::clock_out, handlers::my_attendance
    ),
    components(
        schemas(
            models::Role, models::User, models::Branch, models::Attendance,
            models::LoginRequest, models::LoginResponse,
            models::CreateUserRequest, models::UpdateUserRequest,
            models::CreateBranchRequest, models::UpdateBranchRequest,
            models::DashboardStats, models::HealthResponse, error::ErrorBody,
        )
    ),
    tags(
        (name = "cafe-backoffice", description = "Coffee-shop back-office API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container for application services and configuration,
/// cloned cheaply into every request.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: users, branches and attendance.
    pub repo: RepositoryState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

/// create_router
///
/// Assembles the routing tree, gates each route group and applies the
/// observability layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: no gate.
        .merge(public::public_routes())
        // Branch staff routes at the root: `/me`, `/logout`, `/attendance/*`.
        .merge(staff::staff_routes(state.repo.clone()))
        // Head-office and branch-manager groups carry their own gates.
        .nest("/admin", admin::admin_routes(state.repo.clone()))
        .nest("/manager", manager::manager_routes(state.repo.clone()))
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing: one span per request, tagged with the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id` header, so
/// every log line of one request can be correlated. Headers other than the
/// request ID (notably `Authorization`) are not recorded.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
