//! User service
//!
//! Registration, email/password login, session tokens, self-service profile
//! edits and admin account management.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{RegisterInput, Session, UpdateProfileInput, UpdateUserInput, User, UserRole};
use crate::services::password::{
    hash_password, is_acceptable_password, verify_password, MIN_PASSWORD_LENGTH,
};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Email already registered
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Register a player account. Self-registration always yields the `user`
    /// role; admins are seeded or promoted by another admin.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Name cannot be empty".to_string(),
            ));
        }
        let email = normalize_email(&input.email)?;
        if !is_acceptable_password(&input.password) {
            return Err(UserServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        self.ensure_email_free(&email, None).await?;

        let password_hash = hash_password(&input.password)?;
        let user = User::new(
            name.to_string(),
            email,
            clean_optional(input.phone),
            password_hash,
            UserRole::User,
        );

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!("Registered user {} ({})", created.id, created.email);
        Ok(created)
    }

    /// Verify credentials and open a session.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(Session, User), UserServiceError> {
        let invalid =
            || UserServiceError::AuthenticationError("Invalid email or password".to_string());

        let email = email.trim().to_lowercase();
        let user = self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to get user by email")?
            .ok_or_else(invalid)?;

        let password_valid = verify_password(password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            return Err(invalid());
        }

        let session = self.create_session(user.id).await?;
        Ok((session, user))
    }

    /// Deleting an unknown session is not an error.
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a token to its user. Expired sessions are removed and yield `None`.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;
        Ok(user)
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self.require_user(user_id).await?;

        if let Some(name) = input.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(UserServiceError::ValidationError(
                    "Name cannot be empty".to_string(),
                ));
            }
            user.name = name.to_string();
        }
        if input.phone.is_some() {
            user.phone = clean_optional(input.phone);
        }

        self.save(user).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, UserServiceError> {
        let users = self.user_repo.list().await.context("Failed to list users")?;
        Ok(users)
    }

    pub async fn admin_update_user(
        &self,
        id: i64,
        input: UpdateUserInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self.require_user(id).await?;

        if let Some(name) = input.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(UserServiceError::ValidationError(
                    "Name cannot be empty".to_string(),
                ));
            }
            user.name = name.to_string();
        }
        if let Some(email) = input.email {
            let email = normalize_email(&email)?;
            if email != user.email {
                self.ensure_email_free(&email, Some(id)).await?;
                user.email = email;
            }
        }
        if input.phone.is_some() {
            user.phone = clean_optional(input.phone);
        }
        if let Some(role) = input.role {
            user.role = role;
        }

        self.save(user).await
    }

    /// Replace a user's password and sign out all of their sessions.
    pub async fn set_password(&self, id: i64, password: &str) -> Result<(), UserServiceError> {
        if !is_acceptable_password(password) {
            return Err(UserServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let mut user = self.require_user(id).await?;
        user.password_hash = hash_password(password)?;
        self.save(user).await?;

        self.session_repo
            .delete_by_user(id)
            .await
            .context("Failed to revoke sessions")?;
        Ok(())
    }

    /// Create the configured admin account when no admin exists yet.
    ///
    /// Returns `true` if an account was created.
    pub async fn ensure_admin(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<bool, UserServiceError> {
        let admins = self
            .user_repo
            .count_by_role(UserRole::Admin)
            .await
            .context("Failed to count admins")?;
        if admins > 0 {
            return Ok(false);
        }

        let email = normalize_email(email)?;
        if let Some(mut existing) = self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to get user by email")?
        {
            existing.role = UserRole::Admin;
            self.save(existing).await?;
            tracing::info!("Promoted {} to admin", email);
            return Ok(true);
        }

        let user = User::new(
            name.to_string(),
            email.clone(),
            None,
            hash_password(password)?,
            UserRole::Admin,
        );
        self.user_repo
            .create(&user)
            .await
            .context("Failed to create admin")?;

        tracing::info!("Seeded admin account {}", email);
        Ok(true)
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn require_user(&self, id: i64) -> Result<User, UserServiceError> {
        self.get_by_id(id).await?.ok_or(UserServiceError::NotFound(id))
    }

    async fn save(&self, user: User) -> Result<User, UserServiceError> {
        let updated = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update user")?;
        Ok(updated)
    }

    async fn ensure_email_free(
        &self,
        email: &str,
        owner: Option<i64>,
    ) -> Result<(), UserServiceError> {
        let existing = self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to get user by email")?;
        match existing {
            Some(user) if Some(user.id) != owner => Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            ))),
            _ => Ok(()),
        }
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }
}

fn normalize_email(email: &str) -> Result<String, UserServiceError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
        None => false,
    };
    if !valid {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    Ok(email)
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup_test_service() -> (DynDatabasePool, UserService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        (pool, UserService::new(user_repo, session_repo))
    }

    fn register_input(name: &str, email: &str, password: &str) -> RegisterInput {
        RegisterInput {
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_creates_regular_user() {
        let (_pool, service) = setup_test_service().await;
        let user = service
            .register(register_input("Budi", " Budi@Example.com ", "rahasia"))
            .await
            .unwrap();

        assert!(user.id > 0);
        assert_eq!(user.role, UserRole::User);
        assert_eq!(user.email, "budi@example.com");
        assert_ne!(user.password_hash, "rahasia");
    }

    #[tokio::test]
    async fn test_register_duplicate_email_fails() {
        let (_pool, service) = setup_test_service().await;
        service
            .register(register_input("Budi", "budi@example.com", "rahasia"))
            .await
            .unwrap();

        let result = service
            .register(register_input("Budi 2", "BUDI@example.com", "rahasia"))
            .await;
        assert!(matches!(result, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_pool, service) = setup_test_service().await;

        for input in [
            register_input("  ", "a@example.com", "rahasia"),
            register_input("Ani", "not-an-email", "rahasia"),
            register_input("Ani", "@example.com", "rahasia"),
            register_input("Ani", "ani@example.com", "12345"),
        ] {
            let result = service.register(input).await;
            assert!(matches!(result, Err(UserServiceError::ValidationError(_))));
        }
    }

    #[tokio::test]
    async fn test_login_and_validate_session() {
        let (_pool, service) = setup_test_service().await;
        let registered = service
            .register(register_input("Citra", "citra@example.com", "rahasia"))
            .await
            .unwrap();

        let (session, user) = service.login("CITRA@example.com", "rahasia").await.unwrap();
        assert_eq!(user.id, registered.id);
        assert!(!session.id.is_empty());

        let validated = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(validated.id, registered.id);
    }

    #[tokio::test]
    async fn test_login_wrong_password_and_unknown_email() {
        let (_pool, service) = setup_test_service().await;
        service
            .register(register_input("Citra", "citra@example.com", "rahasia"))
            .await
            .unwrap();

        let wrong = service.login("citra@example.com", "salah123").await;
        assert!(matches!(wrong, Err(UserServiceError::AuthenticationError(_))));

        let unknown = service.login("nobody@example.com", "rahasia").await;
        assert!(matches!(unknown, Err(UserServiceError::AuthenticationError(_))));
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let (_pool, service) = setup_test_service().await;
        service
            .register(register_input("Dewi", "dewi@example.com", "rahasia"))
            .await
            .unwrap();
        let (session, _) = service.login("dewi@example.com", "rahasia").await.unwrap();

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        // Logging out twice is fine.
        service.logout(&session.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_removed() {
        let (pool, _) = setup_test_service().await;
        let service = UserService::with_session_expiration(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            -1,
        );
        service
            .register(register_input("Eko", "eko@example.com", "rahasia"))
            .await
            .unwrap();
        let (session, _) = service.login("eko@example.com", "rahasia").await.unwrap();

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let (pool, _) = setup_test_service().await;
        let service = UserService::with_session_expiration(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            -1,
        );
        service
            .register(register_input("Eko", "eko@example.com", "rahasia"))
            .await
            .unwrap();
        service.login("eko@example.com", "rahasia").await.unwrap();
        service.login("eko@example.com", "rahasia").await.unwrap();

        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_profile() {
        let (_pool, service) = setup_test_service().await;
        let user = service
            .register(register_input("Fajar", "fajar@example.com", "rahasia"))
            .await
            .unwrap();

        let updated = service
            .update_profile(
                user.id,
                UpdateProfileInput {
                    name: Some("Fajar S".to_string()),
                    phone: Some("0812345".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Fajar S");
        assert_eq!(updated.phone.as_deref(), Some("0812345"));
        assert_eq!(updated.email, "fajar@example.com");

        let blank = service
            .update_profile(
                user.id,
                UpdateProfileInput {
                    name: Some(" ".to_string()),
                    phone: None,
                },
            )
            .await;
        assert!(matches!(blank, Err(UserServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_admin_update_user_checks_email_uniqueness() {
        let (_pool, service) = setup_test_service().await;
        let a = service
            .register(register_input("A", "a@example.com", "rahasia"))
            .await
            .unwrap();
        service
            .register(register_input("B", "b@example.com", "rahasia"))
            .await
            .unwrap();

        let taken = service
            .admin_update_user(
                a.id,
                UpdateUserInput {
                    email: Some("b@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(taken, Err(UserServiceError::UserExists(_))));

        let promoted = service
            .admin_update_user(
                a.id,
                UpdateUserInput {
                    email: Some("a@example.com".to_string()),
                    role: Some(UserRole::Admin),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(promoted.is_admin());

        let missing = service
            .admin_update_user(999, UpdateUserInput::default())
            .await;
        assert!(matches!(missing, Err(UserServiceError::NotFound(999))));
    }

    #[tokio::test]
    async fn test_set_password_revokes_sessions() {
        let (_pool, service) = setup_test_service().await;
        let user = service
            .register(register_input("Gita", "gita@example.com", "rahasia"))
            .await
            .unwrap();
        let (session, _) = service.login("gita@example.com", "rahasia").await.unwrap();

        let short = service.set_password(user.id, "123").await;
        assert!(matches!(short, Err(UserServiceError::ValidationError(_))));

        service.set_password(user.id, "baru123").await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert!(service.login("gita@example.com", "rahasia").await.is_err());
        assert!(service.login("gita@example.com", "baru123").await.is_ok());
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let (_pool, service) = setup_test_service().await;

        assert!(service
            .ensure_admin("Admin", "admin@lapangan.local", "admin123")
            .await
            .unwrap());
        assert!(!service
            .ensure_admin("Admin", "admin@lapangan.local", "admin123")
            .await
            .unwrap());

        let (_, admin) = service.login("admin@lapangan.local", "admin123").await.unwrap();
        assert!(admin.is_admin());
        assert_eq!(service.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_admin_promotes_existing_account() {
        let (_pool, service) = setup_test_service().await;
        let user = service
            .register(register_input("Hadi", "hadi@example.com", "rahasia"))
            .await
            .unwrap();

        assert!(service
            .ensure_admin("Admin", "hadi@example.com", "ignored1")
            .await
            .unwrap());
        let promoted = service.get_by_id(user.id).await.unwrap().unwrap();
        assert!(promoted.is_admin());
        assert!(service.login("hadi@example.com", "rahasia").await.is_ok());
    }
}
