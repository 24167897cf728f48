use crate::error::RepoError;
use crate::models::{
    Attendance, Branch, CreateBranchRequest, DashboardStats, NewUser, UpdateBranchRequest, User,
    UserChanges,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Repository Trait
///
/// The persistence contract shared by handlers and the token gate. Handlers only
/// see this trait, so the Postgres implementation can be swapped for the
/// in-memory one in tests.
///
/// **Send + Sync + async_trait** keep `Arc<dyn Repository>` usable across
/// Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Authentication ---
    /// Exact-match lookup on the stored remember token.
    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>, RepoError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;
    /// Rotates (`Some`) or clears (`None`) the stored token. False if the user is gone.
    async fn set_remember_token(&self, user_id: Uuid, token: Option<&str>)
    -> Result<bool, RepoError>;

    // --- Users ---
    async fn list_users(&self) -> Result<Vec<User>, RepoError>;
    async fn list_branch_staff(&self, branch_id: Uuid) -> Result<Vec<User>, RepoError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError>;
    /// Fails with `Conflict` on a duplicate email.
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError>;
    async fn update_user(&self, id: Uuid, changes: UserChanges)
    -> Result<Option<User>, RepoError>;
    /// Removes the user together with their attendance history.
    async fn delete_user(&self, id: Uuid) -> Result<bool, RepoError>;

    // --- Branches ---
    async fn list_branches(&self) -> Result<Vec<Branch>, RepoError>;
    async fn get_branch(&self, id: Uuid) -> Result<Option<Branch>, RepoError>;
    async fn create_branch(&self, req: CreateBranchRequest) -> Result<Branch, RepoError>;
    async fn update_branch(
        &self,
        id: Uuid,
        req: UpdateBranchRequest,
    ) -> Result<Option<Branch>, RepoError>;
    /// Fails with `Referenced` while users or attendance rows still point at the branch.
    async fn delete_branch(&self, id: Uuid) -> Result<bool, RepoError>;

    // --- Attendance ---
    /// Opens a shift. `None` if the user already has an open one.
    async fn clock_in(&self, user_id: Uuid, branch_id: Uuid)
    -> Result<Option<Attendance>, RepoError>;
    /// Closes the open shift. `None` if there is nothing to close.
    async fn clock_out(&self, user_id: Uuid) -> Result<Option<Attendance>, RepoError>;
    async fn list_user_attendance(&self, user_id: Uuid) -> Result<Vec<Attendance>, RepoError>;
    async fn list_branch_attendance(
        &self,
        branch_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Attendance>, RepoError>;

    // --- Dashboard ---
    async fn get_stats(&self) -> Result<DashboardStats, RepoError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str =
    "id, name, email, role, branch_id, password_hash, remember_token, created_at, updated_at";
const BRANCH_COLUMNS: &str = "id, name, address, phone, created_at, updated_at";
const ATTENDANCE_COLUMNS: &str = "id, user_id, branch_id, clock_in, clock_out";

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Queries are built at runtime (`query_as::<_, T>`) so the crate compiles
/// without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// find_user_by_token
    ///
    /// Single indexed read per gated request. NULL tokens never match.
    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE remember_token = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    async fn set_remember_token(
        &self,
        user_id: Uuid,
        token: Option<&str>,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query("UPDATE users SET remember_token = $1 WHERE id = $2")
            .bind(token)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self) -> Result<Vec<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY name ASC");
        sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    async fn list_branch_staff(&self, branch_id: Uuid) -> Result<Vec<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE branch_id = $1 ORDER BY name ASC");
        sqlx::query_as::<_, User>(&sql)
            .bind(branch_id)
            .fetch_all(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    /// create_user
    ///
    /// Inserts a new account with no remember token; the account is unusable on
    /// gated routes until its first login.
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        let sql = format!(
            "INSERT INTO users (id, name, email, role, branch_id, password_hash, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(user.name)
            .bind(user.email)
            .bind(user.role.as_str())
            .bind(user.branch_id)
            .bind(user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    /// update_user
    ///
    /// Uses `COALESCE` so only the provided columns change.
    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, RepoError> {
        let sql = format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                role = COALESCE($5, role),
                branch_id = COALESCE($6, branch_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(changes.name)
            .bind(changes.email)
            .bind(changes.password_hash)
            .bind(changes.role.map(|r| r.as_str()))
            .bind(changes.branch_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepoError> {
        // attendance rows go with the user via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_branches(&self) -> Result<Vec<Branch>, RepoError> {
        let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches ORDER BY name ASC");
        sqlx::query_as::<_, Branch>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    async fn get_branch(&self, id: Uuid) -> Result<Option<Branch>, RepoError> {
        let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE id = $1");
        sqlx::query_as::<_, Branch>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    async fn create_branch(&self, req: CreateBranchRequest) -> Result<Branch, RepoError> {
        let sql = format!(
            "INSERT INTO branches (id, name, address, phone, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, NOW(), NOW()) RETURNING {BRANCH_COLUMNS}"
        );
        sqlx::query_as::<_, Branch>(&sql)
            .bind(Uuid::new_v4())
            .bind(req.name)
            .bind(req.address)
            .bind(req.phone)
            .fetch_one(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    async fn update_branch(
        &self,
        id: Uuid,
        req: UpdateBranchRequest,
    ) -> Result<Option<Branch>, RepoError> {
        let sql = format!(
            r#"
            UPDATE branches
            SET name = COALESCE($2, name),
                address = COALESCE($3, address),
                phone = COALESCE($4, phone),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {BRANCH_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Branch>(&sql)
            .bind(id)
            .bind(req.name)
            .bind(req.address)
            .bind(req.phone)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    /// delete_branch
    ///
    /// `users.branch_id` is `ON DELETE RESTRICT`, so assigned staff surface as a
    /// foreign-key violation, which `from_sqlx` turns into `Referenced`.
    async fn delete_branch(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM branches WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    /// clock_in
    ///
    /// The partial unique index on open shifts makes the insert a no-op when one
    /// is already open, which `fetch_optional` reports as `None`.
    async fn clock_in(
        &self,
        user_id: Uuid,
        branch_id: Uuid,
    ) -> Result<Option<Attendance>, RepoError> {
        let sql = format!(
            "INSERT INTO attendance (id, user_id, branch_id, clock_in) VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT DO NOTHING RETURNING {ATTENDANCE_COLUMNS}"
        );
        sqlx::query_as::<_, Attendance>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(branch_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    async fn clock_out(&self, user_id: Uuid) -> Result<Option<Attendance>, RepoError> {
        let sql = format!(
            "UPDATE attendance SET clock_out = NOW() WHERE user_id = $1 AND clock_out IS NULL \
             RETURNING {ATTENDANCE_COLUMNS}"
        );
        sqlx::query_as::<_, Attendance>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    async fn list_user_attendance(&self, user_id: Uuid) -> Result<Vec<Attendance>, RepoError> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE user_id = $1 ORDER BY clock_in DESC"
        );
        sqlx::query_as::<_, Attendance>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    async fn list_branch_attendance(
        &self,
        branch_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Attendance>, RepoError> {
        let sql = format!(
            r#"
            SELECT {ATTENDANCE_COLUMNS} FROM attendance
            WHERE branch_id = $1
              AND ($2::date IS NULL OR (clock_in AT TIME ZONE 'UTC')::date = $2)
            ORDER BY clock_in DESC
            "#
        );
        sqlx::query_as::<_, Attendance>(&sql)
            .bind(branch_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)
    }

    /// get_stats
    ///
    /// Compiles the dashboard counters in a single round-trip.
    async fn get_stats(&self) -> Result<DashboardStats, RepoError> {
        let (total_users, total_branches, staff_on_shift, attendance_today) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM users),
                    (SELECT COUNT(*) FROM branches),
                    (SELECT COUNT(*) FROM attendance WHERE clock_out IS NULL),
                    (SELECT COUNT(*) FROM attendance
                      WHERE (clock_in AT TIME ZONE 'UTC')::date = (NOW() AT TIME ZONE 'UTC')::date)
                "#,
            )
            .fetch_one(&self.pool)
            .await
            .map_err(RepoError::from_sqlx)?;

        Ok(DashboardStats {
            total_users,
            total_branches,
            staff_on_shift,
            attendance_today,
        })
    }
}

// --- In-Memory Implementation ---

#[derive(Default)]
struct MemoryTables {
    users: Vec<User>,
    branches: Vec<Branch>,
    attendance: Vec<Attendance>,
}

/// MemoryRepository
///
/// A `Repository` held in process memory, mirroring the Postgres constraints
/// (unique email, restricted branch deletion, one open shift per user). Used by
/// the test-suite to drive handlers and the token gate without a database.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<MemoryTables>,
    /// When true, every operation fails as if the database were unreachable.
    should_fail: bool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), RepoError> {
        if self.should_fail {
            return Err(RepoError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>, RepoError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.remember_token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn set_remember_token(
        &self,
        user_id: Uuid,
        token: Option<&str>,
    ) -> Result<bool, RepoError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        match tables.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.remember_token = token.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_users(&self) -> Result<Vec<User>, RepoError> {
        self.check()?;
        let mut users = self.tables.read().await.users.clone();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn list_branch_staff(&self, branch_id: Uuid) -> Result<Vec<User>, RepoError> {
        Ok(self
            .list_users()
            .await?
            .into_iter()
            .filter(|u| u.branch_id == Some(branch_id))
            .collect())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if tables
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(RepoError::Conflict(format!("email {} taken", user.email)));
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            role: user.role,
            branch_id: user.branch_id,
            password_hash: user.password_hash,
            remember_token: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, RepoError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if let Some(email) = &changes.email {
            if tables
                .users
                .iter()
                .any(|u| u.id != id && u.email.eq_ignore_ascii_case(email))
            {
                return Err(RepoError::Conflict(format!("email {email} taken")));
            }
        }
        let Some(user) = tables.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(branch_id) = changes.branch_id {
            user.branch_id = Some(branch_id);
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepoError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        if tables.users.len() == before {
            return Ok(false);
        }
        tables.attendance.retain(|a| a.user_id != id);
        Ok(true)
    }

    async fn list_branches(&self) -> Result<Vec<Branch>, RepoError> {
        self.check()?;
        let mut branches = self.tables.read().await.branches.clone();
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }

    async fn get_branch(&self, id: Uuid) -> Result<Option<Branch>, RepoError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables.branches.iter().find(|b| b.id == id).cloned())
    }

    async fn create_branch(&self, req: CreateBranchRequest) -> Result<Branch, RepoError> {
        self.check()?;
        let now = Utc::now();
        let branch = Branch {
            id: Uuid::new_v4(),
            name: req.name,
            address: req.address,
            phone: req.phone,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.branches.push(branch.clone());
        Ok(branch)
    }

    async fn update_branch(
        &self,
        id: Uuid,
        req: UpdateBranchRequest,
    ) -> Result<Option<Branch>, RepoError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let Some(branch) = tables.branches.iter_mut().find(|b| b.id == id) else {
            return Ok(None);
        };
        if let Some(name) = req.name {
            branch.name = name;
        }
        if let Some(address) = req.address {
            branch.address = address;
        }
        if let Some(phone) = req.phone {
            branch.phone = Some(phone);
        }
        branch.updated_at = Utc::now();
        Ok(Some(branch.clone()))
    }

    async fn delete_branch(&self, id: Uuid) -> Result<bool, RepoError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.branch_id == Some(id))
            || tables.attendance.iter().any(|a| a.branch_id == id)
        {
            return Err(RepoError::Referenced(format!("branch {id} is still referenced")));
        }
        let before = tables.branches.len();
        tables.branches.retain(|b| b.id != id);
        Ok(tables.branches.len() < before)
    }

    async fn clock_in(
        &self,
        user_id: Uuid,
        branch_id: Uuid,
    ) -> Result<Option<Attendance>, RepoError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if tables
            .attendance
            .iter()
            .any(|a| a.user_id == user_id && a.clock_out.is_none())
        {
            return Ok(None);
        }
        let record = Attendance {
            id: Uuid::new_v4(),
            user_id,
            branch_id,
            clock_in: Utc::now(),
            clock_out: None,
        };
        tables.attendance.push(record.clone());
        Ok(Some(record))
    }

    async fn clock_out(&self, user_id: Uuid) -> Result<Option<Attendance>, RepoError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        Ok(tables
            .attendance
            .iter_mut()
            .find(|a| a.user_id == user_id && a.clock_out.is_none())
            .map(|open| {
                open.clock_out = Some(Utc::now());
                open.clone()
            }))
    }

    async fn list_user_attendance(&self, user_id: Uuid) -> Result<Vec<Attendance>, RepoError> {
        self.check()?;
        let tables = self.tables.read().await;
        let mut records: Vec<Attendance> = tables
            .attendance
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.clock_in.cmp(&a.clock_in));
        Ok(records)
    }

    async fn list_branch_attendance(
        &self,
        branch_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Attendance>, RepoError> {
        self.check()?;
        let tables = self.tables.read().await;
        let mut records: Vec<Attendance> = tables
            .attendance
            .iter()
            .filter(|a| a.branch_id == branch_id)
            .filter(|a| date.is_none_or(|d| a.clock_in.date_naive() == d))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.clock_in.cmp(&a.clock_in));
        Ok(records)
    }

    async fn get_stats(&self) -> Result<DashboardStats, RepoError> {
        self.check()?;
        let tables = self.tables.read().await;
        let today = Utc::now().date_naive();
        Ok(DashboardStats {
            total_users: tables.users.len() as i64,
            total_branches: tables.branches.len() as i64,
            staff_on_shift: tables
                .attendance
                .iter()
                .filter(|a| a.clock_out.is_none())
                .count() as i64,
            attendance_today: tables
                .attendance
                .iter()
                .filter(|a| a.clock_in.date_naive() == today)
                .count() as i64,
        })
    }
}
