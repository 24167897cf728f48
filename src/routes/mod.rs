//! Router Module Index
//!
//! Splits the API by who may call it. Each gated module wraps its own router
//! in `auth::token_gate` with the matching `GatePolicy`, so a route can only be
//! exposed by putting it in the module whose gate should guard it.

/// Routes open to anonymous clients: health and login.
pub mod public;

/// Head-office routes behind the admin gate (Super Admin, Owner).
pub mod admin;

/// Branch management routes behind the branch-manager gate.
pub mod manager;

/// Day-to-day routes behind the generic branch-user gate
/// (Branch Manager, Cashier, Barista).
pub mod staff;

use crate::{
    auth::{GatePolicy, GateState, token_gate},
    repository::RepositoryState,
};
use axum::{Router, middleware};

/// Wraps every route of `router` in a token gate configured with `policy`.
fn gated<S>(router: Router<S>, repo: RepositoryState, policy: GatePolicy) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(
        GateState::new(repo, policy),
        token_gate,
    ))
}
