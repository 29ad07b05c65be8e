//! Borrowing (loan) model and related types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::reservation::Reservation;
use crate::error::AppError;

/// A loan of one book to one user. Closed by setting `returned_at`, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Borrowing {
    pub id: i64,
    pub book_id: i64,
    pub user_id: i64,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub renew_count: i64,
    /// Fine charged at return time
    #[schema(value_type = Option<String>)]
    pub fine: Option<Decimal>,
    pub reminded_at: Option<DateTime<Utc>>,
}

impl Borrowing {
    pub fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }

    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now > self.due_at
    }
}

/// Internal row structure; fines are stored as decimal text
#[derive(Debug, Clone, FromRow)]
pub struct BorrowingRow {
    id: i64,
    book_id: i64,
    user_id: i64,
    borrowed_at: DateTime<Utc>,
    due_at: DateTime<Utc>,
    returned_at: Option<DateTime<Utc>>,
    renew_count: i64,
    fine: Option<String>,
    reminded_at: Option<DateTime<Utc>>,
}

impl TryFrom<BorrowingRow> for Borrowing {
    type Error = AppError;

    fn try_from(row: BorrowingRow) -> Result<Self, Self::Error> {
        let fine = row
            .fine
            .map(|f| {
                f.parse::<Decimal>().map_err(|e| {
                    AppError::Internal(format!("Invalid fine {:?} on borrowing {}: {}", f, row.id, e))
                })
            })
            .transpose()?;

        Ok(Borrowing {
            id: row.id,
            book_id: row.book_id,
            user_id: row.user_id,
            borrowed_at: row.borrowed_at,
            due_at: row.due_at,
            returned_at: row.returned_at,
            renew_count: row.renew_count,
            fine,
            reminded_at: row.reminded_at,
        })
    }
}

/// Borrowing with book information for display
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowingDetails {
    pub id: i64,
    pub book_id: i64,
    pub book_title: String,
    pub book_author: String,
    pub user_id: i64,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub renew_count: i64,
    pub is_overdue: bool,
    /// Charged fine for returned loans, running fine for active ones
    #[schema(value_type = String)]
    pub fine: Decimal,
}

/// Outcome of a return
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnReceipt {
    pub borrowing: Borrowing,
    #[schema(value_type = String)]
    pub fine: Decimal,
    /// Head of the queue that was fulfilled by this return, if any
    pub fulfilled_reservation: Option<Reservation>,
}
