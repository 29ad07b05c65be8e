//! Reservations repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

use crate::{
    error::{AppError, AppResult},
    models::reservation::Reservation,
};

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Sqlite>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> AppResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(reservation)
    }

    pub async fn find_pending(&self, user_id: i64, book_id: i64) -> AppResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE user_id = ? AND book_id = ? AND fulfilled_at IS NULL AND cancelled_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reservation)
    }

    /// Pending reservations of a book in queue order: oldest first, ties by id
    pub async fn queue(&self, book_id: i64) -> AppResult<Vec<Reservation>> {
        let queue = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE book_id = ? AND fulfilled_at IS NULL AND cancelled_at IS NULL
            ORDER BY reserved_at, id
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(queue)
    }

    pub async fn count_pending_for_book(&self, book_id: i64) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM reservations
            WHERE book_id = ? AND fulfilled_at IS NULL AND cancelled_at IS NULL
            "#,
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn count_pending(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE fulfilled_at IS NULL AND cancelled_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Reservations of a user, newest first
    pub async fn list_for_user(&self, user_id: i64) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE user_id = ? ORDER BY reserved_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reservations)
    }

    pub async fn create(
        &self,
        book_id: i64,
        user_id: i64,
        reserved_at: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        let reservation = sqlx::query_as::<_, Reservation>(
            "INSERT INTO reservations (book_id, user_id, reserved_at) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(book_id)
        .bind(user_id)
        .bind(reserved_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(reservation)
    }

    /// Mark a reservation fulfilled and notify its holder in one transaction
    pub async fn fulfil(
        &self,
        id: i64,
        message: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        let mut tx = self.pool.begin().await?;

        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations SET fulfilled_at = ?
            WHERE id = ? AND fulfilled_at IS NULL AND cancelled_at IS NULL
            RETURNING *
            "#,
        )
        .bind(at)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Pending reservation {} not found", id)))?;

        sqlx::query("INSERT INTO notifications (user_id, message, created_at) VALUES (?, ?, ?)")
            .bind(reservation.user_id)
            .bind(message)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(reservation)
    }

    /// Withdraw a pending reservation
    pub async fn cancel(&self, id: i64, at: DateTime<Utc>) -> AppResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations SET cancelled_at = ?
            WHERE id = ? AND fulfilled_at IS NULL AND cancelled_at IS NULL
            RETURNING *
            "#,
        )
        .bind(at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reservation)
    }
}
