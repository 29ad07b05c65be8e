//! Reservation (hold) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// A place in a book's reservation queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reservation {
    pub id: i64,
    pub book_id: i64,
    pub user_id: i64,
    pub reserved_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn is_pending(&self) -> bool {
        self.fulfilled_at.is_none() && self.cancelled_at.is_none()
    }
}

/// Reservation with queue context for display
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReservationDetails {
    pub id: i64,
    pub book_id: i64,
    pub book_title: String,
    pub user_id: i64,
    pub reserved_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// 1-based position in the book's queue while pending
    pub queue_position: Option<usize>,
}
