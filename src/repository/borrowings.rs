//! Borrowings repository for database operations
//!
//! Operations that touch both a borrowing and its book run in one transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite};

use crate::{
    error::{AppError, AppResult},
    models::borrowing::{Borrowing, BorrowingRow},
};

#[derive(Clone)]
pub struct BorrowingsRepository {
    pool: Pool<Sqlite>,
}

impl BorrowingsRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> AppResult<Borrowing> {
        sqlx::query_as::<_, BorrowingRow>("SELECT * FROM borrowings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing with id {} not found", id)))?
            .try_into()
    }

    /// The unreturned borrowing of a book by a given user
    pub async fn find_active(&self, book_id: i64, user_id: i64) -> AppResult<Option<Borrowing>> {
        let row = sqlx::query_as::<_, BorrowingRow>(
            "SELECT * FROM borrowings WHERE book_id = ? AND user_id = ? AND returned_at IS NULL",
        )
        .bind(book_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Borrowing::try_from).transpose()
    }

    pub async fn count_active_for_user(&self, user_id: i64) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowings WHERE user_id = ? AND returned_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Borrowings of a user, oldest first
    pub async fn list_for_user(&self, user_id: i64, active_only: bool) -> AppResult<Vec<Borrowing>> {
        let query = if active_only {
            "SELECT * FROM borrowings WHERE user_id = ? AND returned_at IS NULL ORDER BY borrowed_at, id"
        } else {
            "SELECT * FROM borrowings WHERE user_id = ? ORDER BY borrowed_at, id"
        };
        let rows = sqlx::query_as::<_, BorrowingRow>(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Borrowing::try_from).collect()
    }

    pub async fn list_active(&self) -> AppResult<Vec<Borrowing>> {
        let rows = sqlx::query_as::<_, BorrowingRow>(
            "SELECT * FROM borrowings WHERE returned_at IS NULL ORDER BY due_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Borrowing::try_from).collect()
    }

    /// Full history, for reporting
    pub async fn list_all(&self) -> AppResult<Vec<Borrowing>> {
        let rows = sqlx::query_as::<_, BorrowingRow>("SELECT * FROM borrowings ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Borrowing::try_from).collect()
    }

    /// Issue a book: flip it to "issued" and record the borrowing.
    ///
    /// Returns `None` without writing anything when the book is not available.
    pub async fn open(
        &self,
        book_id: i64,
        user_id: i64,
        borrowed_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    ) -> AppResult<Option<Borrowing>> {
        let mut tx = self.pool.begin().await?;

        let issued = sqlx::query(
            "UPDATE books SET status = 'issued', issued_to = ? WHERE id = ? AND status = 'available'",
        )
        .bind(user_id)
        .bind(book_id)
        .execute(&mut *tx)
        .await?;

        if issued.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, BorrowingRow>(
            r#"
            INSERT INTO borrowings (book_id, user_id, borrowed_at, due_at, renew_count)
            VALUES (?, ?, ?, ?, 0)
            RETURNING *
            "#,
        )
        .bind(book_id)
        .bind(user_id)
        .bind(borrowed_at)
        .bind(due_at)
        .fetch_one(&mut *tx)
        .await?;

        let borrowing: Borrowing = row.try_into()?;
        tx.commit().await?;
        Ok(Some(borrowing))
    }

    /// Close a borrowing with its fine and put the book back on the shelf
    pub async fn close(
        &self,
        borrowing: &Borrowing,
        returned_at: DateTime<Utc>,
        fine: Decimal,
    ) -> AppResult<Borrowing> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, BorrowingRow>(
            r#"
            UPDATE borrowings SET returned_at = ?, fine = ?
            WHERE id = ? AND returned_at IS NULL
            RETURNING *
            "#,
        )
        .bind(returned_at)
        .bind(fine.to_string())
        .bind(borrowing.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::BusinessRule("Borrowing already returned".to_string()))?;

        sqlx::query("UPDATE books SET status = 'available', issued_to = NULL WHERE id = ?")
            .bind(borrowing.book_id)
            .execute(&mut *tx)
            .await?;

        let returned: Borrowing = row.try_into()?;
        tx.commit().await?;
        Ok(returned)
    }

    /// Move the due date and count the renewal; a fresh reminder may be sent later
    pub async fn extend(&self, id: i64, due_at: DateTime<Utc>) -> AppResult<Borrowing> {
        sqlx::query_as::<_, BorrowingRow>(
            r#"
            UPDATE borrowings SET due_at = ?, renew_count = renew_count + 1, reminded_at = NULL
            WHERE id = ? AND returned_at IS NULL
            RETURNING *
            "#,
        )
        .bind(due_at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Active borrowing with id {} not found", id)))?
        .try_into()
    }

    /// Record an overdue reminder and notify the borrower
    pub async fn remind(
        &self,
        borrowing: &Borrowing,
        message: &str,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE borrowings SET reminded_at = ? WHERE id = ?")
            .bind(at)
            .bind(borrowing.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO notifications (user_id, message, created_at) VALUES (?, ?, ?)")
            .bind(borrowing.user_id)
            .bind(message)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
