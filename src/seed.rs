use crate::{
    config::BootstrapAdmin,
    error::RepoError,
    models::{NewUser, Role, User},
    password::{self, HashError},
    repository::Repository,
};

/// SeedError
///
/// Why the bootstrap admin could not be ensured.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// ensure_bootstrap_admin
///
/// Creates a `Super Admin` for `admin.email` unless an account with that email
/// already exists. Safe to run on every startup; an existing account is
/// returned untouched, password included.
pub async fn ensure_bootstrap_admin(
    repo: &dyn Repository,
    admin: &BootstrapAdmin,
) -> Result<User, SeedError> {
    if let Some(existing) = repo.find_user_by_email(&admin.email).await? {
        tracing::debug!(user_id = %existing.id, "bootstrap admin already present");
        return Ok(existing);
    }

    let created = repo
        .create_user(NewUser {
            name: "Super Admin".to_string(),
            email: admin.email.clone(),
            password_hash: password::hash_password(&admin.password)?,
            role: Role::SuperAdmin,
            branch_id: None,
        })
        .await?;

    tracing::info!(user_id = %created.id, email = %created.email, "bootstrap admin created");
    Ok(created)
}
