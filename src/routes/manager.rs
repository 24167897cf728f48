use super::gated;
use crate::{AppState, auth::GatePolicy, handlers, repository::RepositoryState};
use axum::{Router, routing::get};

/// Manager Router Module
///
/// Nested under `/manager`. Only a `Branch Manager` with a branch assignment
/// passes; every listing is scoped to that branch.
pub fn manager_routes(repo: RepositoryState) -> Router<AppState> {
    let router = Router::new()
        // GET /manager/staff
        .route("/staff", get(handlers::manager_staff))
        // GET /manager/attendance?date=YYYY-MM-DD
        .route("/attendance", get(handlers::manager_attendance));

    gated(router, repo, GatePolicy::BRANCH_MANAGER)
}
