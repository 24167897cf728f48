use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// --- Roles ---

/// Role
///
/// The closed set of staff roles. The serialized form (JSON and the `users.role`
/// column) is the human-readable label, e.g. `"Branch Manager"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum Role {
    #[serde(rename = "Super Admin")]
    SuperAdmin,
    Owner,
    Admin,
    #[serde(rename = "Branch Manager")]
    BranchManager,
    Cashier,
    Barista,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::SuperAdmin,
        Role::Owner,
        Role::Admin,
        Role::BranchManager,
        Role::Cashier,
        Role::Barista,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "Super Admin",
            Role::Owner => "Owner",
            Role::Admin => "Admin",
            Role::BranchManager => "Branch Manager",
            Role::Cashier => "Cashier",
            Role::Barista => "Barista",
        }
    }

    /// Roles whose holders work inside a single branch and must be assigned to one.
    pub fn is_branch_scoped(&self) -> bool {
        matches!(self, Role::BranchManager | Role::Cashier | Role::Barista)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

// Lets `#[sqlx(try_from = "String")]` decode the TEXT column.
impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// --- Core Schemas (Mapped to Database) ---

/// User
///
/// A staff account and the principal resolved by the token gate. The credential
/// columns are loaded for authentication but never serialized to clients.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    // Null for admin-family roles.
    pub branch_id: Option<Uuid>,

    #[serde(skip)]
    pub password_hash: String,
    // Opaque bearer token set at login, cleared at logout.
    #[serde(skip)]
    pub remember_token: Option<String>,

    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Branch
///
/// An operational location. Branch-scoped staff reference exactly one branch.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Branch {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Attendance
///
/// One shift record. `clock_out` stays null while the shift is open; a user has
/// at most one open record at a time.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Attendance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub branch_id: Uuid,
    #[ts(type = "string")]
    pub clock_in: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub clock_out: Option<DateTime<Utc>>,
}

// --- Request Payloads (Input Schemas) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// CreateUserRequest
///
/// Admin payload for opening a staff account. `branch_id` is mandatory for
/// branch-scoped roles; admin-family roles may omit it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub branch_id: Option<Uuid>,
}

/// UpdateUserRequest
///
/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateBranchRequest {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateBranchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// AttendanceFilter
///
/// Query parameters for the branch attendance listing (GET /manager/attendance).
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
pub struct AttendanceFilter {
    /// Only records whose clock-in falls on this UTC date.
    pub date: Option<NaiveDate>,
}

// --- Persistence Inputs ---

/// NewUser
///
/// A validated account ready for insertion; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub branch_id: Option<Uuid>,
}

/// UserChanges
///
/// Column-level changes produced from an `UpdateUserRequest` after validation.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
    pub branch_id: Option<Uuid>,
}

// --- Output Schemas ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// DashboardStats
///
/// Output schema for the administrative dashboard (GET /admin/stats).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_branches: i64,
    /// Users with an open attendance record.
    pub staff_on_shift: i64,
    /// Attendance records whose clock-in falls on the current UTC date.
    pub attendance_today: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}
