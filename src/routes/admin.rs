use super::gated;
use crate::{AppState, auth::GatePolicy, handlers, repository::RepositoryState};
use axum::{
    Router,
    routing::{get, post},
};

/// Admin Router Module
///
/// Head-office administration, nested under `/admin`. Every route passes the
/// admin gate (`Super Admin` or `Owner`, no branch requirement) and receives
/// the principal through `CurrentAdmin`.
pub fn admin_routes(repo: RepositoryState) -> Router<AppState> {
    let router = Router::new()
        // GET /admin/me, POST /admin/logout
        // Session endpoints for the head-office client.
        .route("/me", get(handlers::admin_me))
        .route("/logout", post(handlers::admin_logout))
        // GET /admin/stats
        // Dashboard counters: users, branches, staff on shift, today's attendance.
        .route("/stats", get(handlers::get_stats))
        // --- Staff Accounts ---
        .route("/users", get(handlers::list_users).post(handlers::create_user))
        .route(
            "/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        // --- Branches ---
        .route(
            "/branches",
            get(handlers::list_branches).post(handlers::create_branch),
        )
        .route(
            "/branches/{id}",
            get(handlers::get_branch)
                .put(handlers::update_branch)
                .delete(handlers::delete_branch),
        );

    gated(router, repo, GatePolicy::ADMIN)
}
