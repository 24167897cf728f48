use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a bearer token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers and monitoring.
        .route("/health", get(handlers::health))
        // POST /login
        // Verifies email and password, rotates the account's remember token and
        // returns it. This is the only way a token comes into existence.
        .route("/login", post(handlers::login))
}
