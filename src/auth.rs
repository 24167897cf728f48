use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    error::{ErrorBody, RepoError},
    models::{Role, User},
    repository::{Repository, RepositoryState},
};

/// AuthError
///
/// The gate's rejection kinds. The first three are client-facing and terminal;
/// `Storage` covers an unreachable database and is answered as a plain 500.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthenticated. Bearer token required.")]
    MissingCredential,
    #[error("Invalid token.")]
    InvalidCredential,
    #[error("Forbidden. {0}")]
    Forbidden(String),
    #[error("Internal server error")]
    Storage(#[from] RepoError),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingCredential | AuthError::InvalidCredential => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Storage(e) = &self {
            tracing::error!("principal lookup failed: {}", e);
        }
        let status = self.status_code();
        let body = Json(ErrorBody {
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

/// ContextKey
///
/// Where an authorized principal is attached: admin routes read `AdminContext`,
/// branch routes read `UserContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKey {
    Admin,
    User,
}

/// GatePolicy
///
/// Configuration of one token gate instance: who may pass, whether a branch
/// assignment is mandatory, and which context key receives the principal.
#[derive(Debug, Clone, Copy)]
pub struct GatePolicy {
    /// Used in the forbidden message, e.g. "Admin access required."
    pub audience: &'static str,
    pub allowed_roles: &'static [Role],
    pub require_branch: bool,
    pub context: ContextKey,
}

impl GatePolicy {
    /// Head-office administration.
    pub const ADMIN: GatePolicy = GatePolicy {
        audience: "Admin",
        allowed_roles: &[Role::SuperAdmin, Role::Owner],
        require_branch: false,
        context: ContextKey::Admin,
    };

    /// Management screens scoped to the manager's own branch.
    pub const BRANCH_MANAGER: GatePolicy = GatePolicy {
        audience: "Branch manager",
        allowed_roles: &[Role::BranchManager],
        require_branch: true,
        context: ContextKey::User,
    };

    /// Any branch staff member.
    pub const USER: GatePolicy = GatePolicy {
        audience: "Branch staff",
        allowed_roles: &[Role::BranchManager, Role::Cashier, Role::Barista],
        require_branch: true,
        context: ContextKey::User,
    };

    pub fn permits(&self, role: Role) -> bool {
        self.allowed_roles.contains(&role)
    }

    /// check
    ///
    /// Role allow-list first, then the branch requirement. A principal that
    /// fails the role check never reaches the branch check.
    pub fn check(&self, user: &User) -> Result<(), AuthError> {
        if !self.permits(user.role) {
            return Err(AuthError::Forbidden(format!(
                "{} access required.",
                self.audience
            )));
        }
        if self.require_branch && user.branch_id.is_none() {
            return Err(AuthError::Forbidden(
                "User is not assigned to a branch.".to_string(),
            ));
        }
        Ok(())
    }
}

/// bearer_token
///
/// Extracts `<token>` from `Authorization: Bearer <token>`, exactly as sent.
/// A missing header, a non-UTF-8 value, another scheme or an empty token all
/// yield `None`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

/// authorize
///
/// Resolves the request's bearer token to a principal and applies `policy`.
///
/// The token is compared by exact equality with the stored remember token.
/// There is no expiry or revocation list: a token is valid until login rotates
/// it or logout clears it. Malformed and unknown tokens are indistinguishable.
pub async fn authorize(
    repo: &dyn Repository,
    headers: &HeaderMap,
    policy: &GatePolicy,
) -> Result<User, AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::MissingCredential)?;

    let user = repo
        .find_user_by_token(token)
        .await?
        .ok_or(AuthError::InvalidCredential)?;

    policy.check(&user)?;
    Ok(user)
}

/// GateState
///
/// State handed to `token_gate` through `middleware::from_fn_with_state`.
#[derive(Clone)]
pub struct GateState {
    pub repo: RepositoryState,
    pub policy: GatePolicy,
}

impl GateState {
    pub fn new(repo: RepositoryState, policy: GatePolicy) -> Self {
        Self { repo, policy }
    }
}

/// AdminContext / UserContext
///
/// Request extensions carrying the authorized principal to downstream handlers.
#[derive(Debug, Clone)]
pub struct AdminContext(pub User);

#[derive(Debug, Clone)]
pub struct UserContext(pub User);

/// token_gate
///
/// The single middleware behind all three route groups. On success the
/// principal is inserted into the request extensions and the request continues;
/// every rejection is terminal and answered with `{"message": ...}`.
pub async fn token_gate(
    State(gate): State<GateState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let outcome = authorize(gate.repo.as_ref(), &parts.headers, &gate.policy).await;
    match outcome {
        Ok(user) => {
            tracing::debug!(
                user_id = %user.id,
                role = %user.role,
                audience = gate.policy.audience,
                "token accepted"
            );
            match gate.policy.context {
                ContextKey::Admin => {
                    parts.extensions.insert(AdminContext(user));
                }
                ContextKey::User => {
                    parts.extensions.insert(UserContext(user));
                }
            }
            next.run(Request::from_parts(parts, body)).await
        }
        Err(rejection) => {
            // Token values are never logged.
            tracing::debug!(
                audience = gate.policy.audience,
                status = rejection.status_code().as_u16(),
                "token rejected: {}",
                rejection
            );
            rejection.into_response()
        }
    }
}

/// CurrentAdmin Extractor
///
/// Hands the principal attached by an admin gate to a handler. Reaching a
/// handler without one means the route was mounted outside the gate, which is
/// answered like a missing credential.
#[derive(Debug, Clone)]
pub struct CurrentAdmin(pub User);

impl<S> FromRequestParts<S> for CurrentAdmin
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminContext>()
            .map(|AdminContext(user)| CurrentAdmin(user.clone()))
            .ok_or(AuthError::MissingCredential)
    }
}

/// CurrentUser Extractor
///
/// Branch-side counterpart of `CurrentAdmin`, filled by the branch-manager and
/// generic user gates.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserContext>()
            .map(|UserContext(user)| CurrentUser(user.clone()))
            .ok_or(AuthError::MissingCredential)
    }
}
