//! Authentication and user management service

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;

use crate::{
    clock::Clock,
    config::{AuthConfig, BootstrapConfig},
    error::{AppError, AppResult},
    models::user::{AccountType, CreateUser, RegisterUser, Role, UpdateUser, User, UserClaims, UserQuery},
    repository::{users::NewUser, Repository},
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            config,
            clock,
        }
    }

    /// Self-service sign-up: always a plain member
    pub async fn register(&self, data: RegisterUser) -> AppResult<User> {
        self.insert(NewUser {
            full_name: data.name.trim().to_string(),
            email: data.email.trim().to_string(),
            password_hash: self.hash_password(&data.password)?,
            role: Role::User,
            account_type: AccountType::Member,
        })
        .await
    }

    /// Authenticate user by email and return a JWT token
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<(String, User)> {
        let user = self
            .repository
            .users
            .get_by_email(email.trim())
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        if !self.verify_password(&user, password)? {
            tracing::warn!(user_id = user.id, "Failed login attempt");
            return Err(AppError::Authentication("Invalid email or password".to_string()));
        }

        let token = self.create_token_for_user(&user)?;
        tracing::info!(user_id = user.id, "User logged in");

        Ok((token, user))
    }

    /// Token lifetimes follow wall-clock time, which is what verification checks against
    fn create_token_for_user(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.email.clone(),
            user_id: user.id,
            role: user.role,
            account_type: user.account_type,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Verify user password
    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    /// Search users
    pub async fn search_users(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
        self.repository.users.search(query).await
    }

    /// Create a user with an explicit role and account type
    pub async fn create_user(&self, data: CreateUser) -> AppResult<User> {
        self.insert(NewUser {
            full_name: data.full_name.trim().to_string(),
            email: data.email.trim().to_string(),
            password_hash: self.hash_password(&data.password)?,
            role: data.role.unwrap_or(Role::User),
            account_type: data.account_type.unwrap_or(AccountType::Member),
        })
        .await
    }

    async fn insert(&self, user: NewUser) -> AppResult<User> {
        if self.repository.users.email_exists(&user.email, None).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let created = self.repository.users.create(&user, self.clock.now()).await?;
        tracing::info!(
            user_id = created.id,
            role = %created.role,
            account_type = %created.account_type,
            "User created"
        );
        Ok(created)
    }

    /// Update a user
    pub async fn update_user(&self, id: i64, data: UpdateUser) -> AppResult<User> {
        if let Some(ref email) = data.email {
            if self.repository.users.email_exists(email, Some(id)).await? {
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
        }

        let password_hash = match data.password {
            Some(ref password) => Some(self.hash_password(password)?),
            None => None,
        };

        self.repository.users.update(id, &data, password_hash).await
    }

    /// Create the configured administrator when the database has none.
    /// Returns the created account, if any.
    pub async fn ensure_bootstrap_admin(&self, config: &BootstrapConfig) -> AppResult<Option<User>> {
        if self.repository.users.admin_exists().await? {
            return Ok(None);
        }

        let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
            tracing::warn!("No administrator account exists and no bootstrap credentials are configured");
            return Ok(None);
        };

        let admin = self
            .insert(NewUser {
                full_name: config
                    .admin_name
                    .clone()
                    .unwrap_or_else(|| "Administrator".to_string()),
                email: email.clone(),
                password_hash: self.hash_password(password)?,
                role: Role::Admin,
                account_type: AccountType::Librarian,
            })
            .await?;

        tracing::info!(user_id = admin.id, email = %admin.email, "Bootstrap administrator created");
        Ok(Some(admin))
    }
}
