use super::gated;
use crate::{AppState, auth::GatePolicy, handlers, repository::RepositoryState};
use axum::{
    Router,
    routing::{get, post},
};

/// Staff Router Module
///
/// Routes for anyone working a branch: Branch Manager, Cashier or Barista,
/// always with a branch assignment. Handlers receive the principal through
/// `CurrentUser`.
pub fn staff_routes(repo: RepositoryState) -> Router<AppState> {
    let router = Router::new()
        // GET /me, POST /logout
        .route("/me", get(handlers::me))
        .route("/logout", post(handlers::logout))
        // --- Attendance ---
        // Clock-in opens a shift at the caller's own branch; one open shift at a time.
        .route("/attendance", get(handlers::my_attendance))
        .route("/attendance/clock-in", post(handlers::clock_in))
        .route("/attendance/clock-out", post(handlers::clock_out));

    gated(router, repo, GatePolicy::USER)
}
