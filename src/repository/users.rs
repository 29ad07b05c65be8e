//! Users repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

use crate::{
    error::{AppError, AppResult},
    models::user::{AccountType, Role, UpdateUser, User, UserQuery},
};

/// Fields of a user about to be inserted
#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub account_type: AccountType,
}

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Sqlite>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> AppResult<User> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    pub async fn find_by_id(&self, id: i64) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Get user by email, ignoring case
    pub async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER(?)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Check if email already exists
    pub async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER(?) AND id != ?)",
        )
        .bind(email)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn admin_exists(&self) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin')")
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Search users with pagination
    pub async fn search(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
        let (_, per_page, offset) = super::paging(query.page, query.per_page);

        let mut conditions = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(ref search) = query.search {
            let pattern = format!("%{}%", search.to_lowercase());
            conditions.push("(LOWER(full_name) LIKE ? OR LOWER(email) LIKE ?)");
            params.push(pattern.clone());
            params.push(pattern);
        }

        if let Some(role) = query.role {
            conditions.push("role = ?");
            params.push(role.as_str().to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_query = format!("SELECT COUNT(*) FROM users {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        for param in &params {
            count_builder = count_builder.bind(param);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_query = format!(
            "SELECT * FROM users {} ORDER BY full_name, id LIMIT {} OFFSET {}",
            where_clause, per_page, offset
        );
        tracing::debug!(query = %select_query, params = ?params, "User search");
        let mut builder = sqlx::query_as::<_, User>(&select_query);
        for param in &params {
            builder = builder.bind(param);
        }
        let users = builder.fetch_all(&self.pool).await?;

        Ok((users, total))
    }

    /// Insert a user; the email is stored lowercased
    pub async fn create(&self, user: &NewUser, created_at: DateTime<Utc>) -> AppResult<User> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (full_name, email, password_hash, role, account_type, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&user.full_name)
        .bind(user.email.to_lowercase())
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.account_type)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Update the provided fields of a user
    pub async fn update(
        &self,
        id: i64,
        user: &UpdateUser,
        password_hash: Option<String>,
    ) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                full_name = COALESCE(?, full_name),
                email = COALESCE(?, email),
                password_hash = COALESCE(?, password_hash),
                role = COALESCE(?, role),
                account_type = COALESCE(?, account_type)
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&user.full_name)
        .bind(user.email.as_ref().map(|e| e.to_lowercase()))
        .bind(password_hash)
        .bind(user.role)
        .bind(user.account_type)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_pool;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            full_name: "Ada Reader".into(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::User,
            account_type: AccountType::Member,
        }
    }

    #[tokio::test]
    async fn emails_are_unique_ignoring_case() {
        let repo = UsersRepository::new(test_pool().await);
        let user = repo.create(&new_user("Ada@Example.org"), Utc::now()).await.unwrap();

        assert_eq!(user.email, "ada@example.org");
        assert!(repo.email_exists("ADA@example.org", None).await.unwrap());
        assert!(!repo.email_exists("ada@example.org", Some(user.id)).await.unwrap());
        assert!(repo.create(&new_user("ada@EXAMPLE.org"), Utc::now()).await.is_err());

        let found = repo.get_by_email("ada@example.ORG").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn update_keeps_unset_fields() {
        let repo = UsersRepository::new(test_pool().await);
        let user = repo.create(&new_user("bob@example.org"), Utc::now()).await.unwrap();

        let updated = repo
            .update(
                user.id,
                &UpdateUser {
                    account_type: Some(AccountType::Staff),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(updated.full_name, "Ada Reader");
        assert_eq!(updated.account_type, AccountType::Staff);
        assert_eq!(updated.password_hash, "hash");
        assert!(repo.update(999, &UpdateUser::default(), None).await.is_err());
    }

    #[tokio::test]
    async fn search_filters_by_name_and_role() {
        let repo = UsersRepository::new(test_pool().await);
        repo.create(&new_user("one@example.org"), Utc::now()).await.unwrap();
        let mut librarian = new_user("desk@example.org");
        librarian.full_name = "Desk Person".into();
        librarian.role = Role::Librarian;
        repo.create(&librarian, Utc::now()).await.unwrap();

        let (found, total) = repo
            .search(&UserQuery {
                search: Some("desk".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].role, Role::Librarian);

        let (_, total) = repo
            .search(&UserQuery {
                role: Some(Role::User),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(repo.count().await.unwrap(), 2);
    }
}
