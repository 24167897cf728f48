use crate::{
    AppState,
    auth::{CurrentAdmin, CurrentUser},
    error::{ApiError, ErrorBody, RepoError},
    models::{
        Attendance, AttendanceFilter, Branch, CreateBranchRequest, CreateUserRequest,
        DashboardStats, HealthResponse, LoginRequest, LoginResponse, NewUser, Role,
        UpdateBranchRequest, UpdateUserRequest, User, UserChanges,
    },
    password,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

// --- Validation Helpers ---

const MIN_PASSWORD_LEN: usize = 8;

fn required(field: &str, value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::unprocessable(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn valid_email(value: &str) -> Result<String, ApiError> {
    let email = required("email", value)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(ApiError::unprocessable("email is invalid")),
    }
}

fn valid_password(value: &str) -> Result<&str, ApiError> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::unprocessable(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(value)
}

/// Trims a phone number; blank input counts as absent.
fn normalize_phone(phone: Option<String>) -> Option<String> {
    phone
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
}

/// Checks the role/branch pairing and that a referenced branch exists.
async fn check_assignment(
    state: &AppState,
    role: Role,
    branch_id: Option<Uuid>,
) -> Result<(), ApiError> {
    match branch_id {
        Some(id) => {
            if state.repo.get_branch(id).await?.is_none() {
                return Err(ApiError::unprocessable("branch_id does not reference a branch"));
            }
            Ok(())
        }
        None if role.is_branch_scoped() => Err(ApiError::unprocessable(format!(
            "role {role} requires a branch_id"
        ))),
        None => Ok(()),
    }
}

/// The branch a gated branch user works in. The gate guarantees one exists.
fn assigned_branch(user: &User) -> Result<Uuid, ApiError> {
    user.branch_id
        .ok_or_else(|| ApiError::new(StatusCode::FORBIDDEN, "User is not assigned to a branch."))
}

// --- Public Handlers ---

/// health
///
/// [Public Route] Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// login
///
/// [Public Route] Exchanges email and password for a bearer token.
///
/// Every successful login rotates the stored remember token, so the previous
/// token of the same account stops working.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Bad credentials", body = ErrorBody),
        (status = 422, description = "Missing fields", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = payload.email.trim();
    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::unprocessable("Email and password are required"));
    }

    let invalid = || ApiError::unauthorized("Invalid email or password");

    let user = state
        .repo
        .find_user_by_email(email)
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&payload.password, &user.password_hash) {
        tracing::info!(user_id = %user.id, "login rejected: wrong password");
        return Err(invalid());
    }

    let token = password::generate_token();
    if !state.repo.set_remember_token(user.id, Some(&token)).await? {
        // Deleted between the lookup and the update.
        return Err(invalid());
    }

    tracing::info!(user_id = %user.id, role = %user.role, "login succeeded");
    Ok(Json(LoginResponse {
        token: token.clone(),
        user: User {
            remember_token: Some(token),
            ..user
        },
    }))
}

// --- Admin Handlers ---

/// admin_me
///
/// [Admin Route] The authenticated head-office principal.
#[utoipa::path(
    get,
    path = "/admin/me",
    responses((status = 200, description = "Current admin", body = User))
)]
pub async fn admin_me(CurrentAdmin(admin): CurrentAdmin) -> Json<User> {
    Json(admin)
}

/// admin_logout
///
/// [Admin Route] Clears the stored token; the presented token stops working.
#[utoipa::path(
    post,
    path = "/admin/logout",
    responses((status = 204, description = "Logged out"))
)]
pub async fn admin_logout(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.repo.set_remember_token(admin.id, None).await?;
    tracing::info!(user_id = %admin.id, "admin logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// list_users
///
/// [Admin Route] Every staff account, ordered by name.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "All users", body = [User]))
)]
pub async fn list_users(
    _admin: CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.repo.list_users().await?))
}

#[utoipa::path(
    get,
    path = "/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = User),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_user(
    _admin: CurrentAdmin,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    state
        .repo
        .get_user(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// create_user
///
/// [Admin Route] Opens a staff account. The account has no token until its
/// first login.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = User),
        (status = 409, description = "Email taken", body = ErrorBody),
        (status = 422, description = "Invalid payload", body = ErrorBody)
    )
)]
pub async fn create_user(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let name = required("name", &payload.name)?;
    let email = valid_email(&payload.email)?;
    let plain = valid_password(&payload.password)?;
    check_assignment(&state, payload.role, payload.branch_id).await?;

    let user = state
        .repo
        .create_user(NewUser {
            name,
            email,
            password_hash: password::hash_password(plain)?,
            role: payload.role,
            branch_id: payload.branch_id,
        })
        .await?;

    tracing::info!(created_by = %admin.id, user_id = %user.id, role = %user.role, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// update_user
///
/// [Admin Route] Partial update. The role/branch pairing is validated against
/// the merged result, so moving a Cashier to `Owner` needs no branch while
/// promoting an Owner to `Cashier` needs one.
#[utoipa::path(
    put,
    path = "/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 404, description = "Not Found", body = ErrorBody),
        (status = 409, description = "Email taken", body = ErrorBody),
        (status = 422, description = "Invalid payload", body = ErrorBody)
    )
)]
pub async fn update_user(
    _admin: CurrentAdmin,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let existing = state
        .repo
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let changes = UserChanges {
        name: payload.name.as_deref().map(|n| required("name", n)).transpose()?,
        email: payload.email.as_deref().map(valid_email).transpose()?,
        password_hash: match payload.password.as_deref() {
            Some(plain) => Some(password::hash_password(valid_password(plain)?)?),
            None => None,
        },
        role: payload.role,
        branch_id: payload.branch_id,
    };

    let role = changes.role.unwrap_or(existing.role);
    check_assignment(&state, role, changes.branch_id.or(existing.branch_id)).await?;

    state
        .repo
        .update_user(id, changes)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// delete_user
///
/// [Admin Route] Removes an account and its attendance history. An admin
/// cannot delete the account they are signed in with.
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found", body = ErrorBody),
        (status = 422, description = "Self-deletion", body = ErrorBody)
    )
)]
pub async fn delete_user(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if admin.id == id {
        return Err(ApiError::unprocessable("You cannot delete your own account"));
    }
    if state.repo.delete_user(id).await? {
        tracing::info!(deleted_by = %admin.id, user_id = %id, "user deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("User not found"))
    }
}

#[utoipa::path(
    get,
    path = "/admin/branches",
    responses((status = 200, description = "All branches", body = [Branch]))
)]
pub async fn list_branches(
    _admin: CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<Branch>>, ApiError> {
    Ok(Json(state.repo.list_branches().await?))
}

#[utoipa::path(
    get,
    path = "/admin/branches/{id}",
    params(("id" = Uuid, Path, description = "Branch ID")),
    responses(
        (status = 200, description = "Found", body = Branch),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_branch(
    _admin: CurrentAdmin,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Branch>, ApiError> {
    state
        .repo
        .get_branch(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Branch not found"))
}

#[utoipa::path(
    post,
    path = "/admin/branches",
    request_body = CreateBranchRequest,
    responses(
        (status = 201, description = "Created", body = Branch),
        (status = 422, description = "Invalid payload", body = ErrorBody)
    )
)]
pub async fn create_branch(
    _admin: CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<CreateBranchRequest>,
) -> Result<(StatusCode, Json<Branch>), ApiError> {
    let req = CreateBranchRequest {
        name: required("name", &payload.name)?,
        address: required("address", &payload.address)?,
        phone: normalize_phone(payload.phone),
    };
    let branch = state.repo.create_branch(req).await?;
    tracing::info!(branch_id = %branch.id, "branch created");
    Ok((StatusCode::CREATED, Json(branch)))
}

/// update_branch
///
/// [Admin Route] Partial update. A blank phone is treated like an absent one.
#[utoipa::path(
    put,
    path = "/admin/branches/{id}",
    params(("id" = Uuid, Path, description = "Branch ID")),
    request_body = UpdateBranchRequest,
    responses(
        (status = 200, description = "Updated", body = Branch),
        (status = 404, description = "Not Found", body = ErrorBody),
        (status = 422, description = "Invalid payload", body = ErrorBody)
    )
)]
pub async fn update_branch(
    _admin: CurrentAdmin,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBranchRequest>,
) -> Result<Json<Branch>, ApiError> {
    let req = UpdateBranchRequest {
        name: payload.name.as_deref().map(|n| required("name", n)).transpose()?,
        address: payload
            .address
            .as_deref()
            .map(|a| required("address", a))
            .transpose()?,
        phone: normalize_phone(payload.phone),
    };
    state
        .repo
        .update_branch(id, req)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Branch not found"))
}

/// delete_branch
///
/// [Admin Route] Refused with 409 while staff or attendance records reference it.
#[utoipa::path(
    delete,
    path = "/admin/branches/{id}",
    params(("id" = Uuid, Path, description = "Branch ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found", body = ErrorBody),
        (status = 409, description = "Branch in use", body = ErrorBody)
    )
)]
pub async fn delete_branch(
    _admin: CurrentAdmin,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    match state.repo.delete_branch(id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(ApiError::not_found("Branch not found")),
        Err(RepoError::Referenced(_)) => Err(ApiError::conflict("Branch is still in use")),
        Err(e) => Err(e.into()),
    }
}

/// get_stats
///
/// [Admin Route] Dashboard counters.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses((status = 200, description = "Stats", body = DashboardStats))
)]
pub async fn get_stats(
    _admin: CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.repo.get_stats().await?))
}

// --- Branch Manager Handlers ---

/// manager_staff
///
/// [Manager Route] Staff assigned to the manager's own branch.
#[utoipa::path(
    get,
    path = "/manager/staff",
    responses((status = 200, description = "Branch staff", body = [User]))
)]
pub async fn manager_staff(
    CurrentUser(manager): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, ApiError> {
    let branch_id = assigned_branch(&manager)?;
    Ok(Json(state.repo.list_branch_staff(branch_id).await?))
}

/// manager_attendance
///
/// [Manager Route] Attendance recorded at the manager's branch, optionally for
/// a single UTC date.
#[utoipa::path(
    get,
    path = "/manager/attendance",
    params(AttendanceFilter),
    responses((status = 200, description = "Branch attendance", body = [Attendance]))
)]
pub async fn manager_attendance(
    CurrentUser(manager): CurrentUser,
    State(state): State<AppState>,
    Query(filter): Query<AttendanceFilter>,
) -> Result<Json<Vec<Attendance>>, ApiError> {
    let branch_id = assigned_branch(&manager)?;
    Ok(Json(
        state
            .repo
            .list_branch_attendance(branch_id, filter.date)
            .await?,
    ))
}

// --- Branch Staff Handlers ---

/// me
///
/// [Staff Route] The authenticated branch principal.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Current user", body = User))
)]
pub async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

#[utoipa::path(
    post,
    path = "/logout",
    responses((status = 204, description = "Logged out"))
)]
pub async fn logout(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.repo.set_remember_token(user.id, None).await?;
    tracing::info!(user_id = %user.id, "user logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// clock_in
///
/// [Staff Route] Opens a shift at the caller's branch. 409 while one is open.
#[utoipa::path(
    post,
    path = "/attendance/clock-in",
    responses(
        (status = 201, description = "Shift opened", body = Attendance),
        (status = 409, description = "Already clocked in", body = ErrorBody)
    )
)]
pub async fn clock_in(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Attendance>), ApiError> {
    let branch_id = assigned_branch(&user)?;
    match state.repo.clock_in(user.id, branch_id).await? {
        Some(record) => {
            tracing::info!(user_id = %user.id, attendance_id = %record.id, "clocked in");
            Ok((StatusCode::CREATED, Json(record)))
        }
        None => Err(ApiError::conflict("Already clocked in")),
    }
}

/// clock_out
///
/// [Staff Route] Closes the caller's open shift. 404 when none is open.
#[utoipa::path(
    post,
    path = "/attendance/clock-out",
    responses(
        (status = 200, description = "Shift closed", body = Attendance),
        (status = 404, description = "No open shift", body = ErrorBody)
    )
)]
pub async fn clock_out(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Attendance>, ApiError> {
    match state.repo.clock_out(user.id).await? {
        Some(record) => {
            tracing::info!(user_id = %user.id, attendance_id = %record.id, "clocked out");
            Ok(Json(record))
        }
        None => Err(ApiError::not_found("No open shift")),
    }
}

#[utoipa::path(
    get,
    path = "/attendance",
    responses((status = 200, description = "My attendance", body = [Attendance]))
)]
pub async fn my_attendance(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Attendance>>, ApiError> {
    Ok(Json(state.repo.list_user_attendance(user.id).await?))
}
