//! Circulation service: borrowing, returns, renewals and the reservation queue.
//!
//! Every mutating operation holds `write_lock` for its whole read-check-write
//! sequence, so two requests can never both see a book as available and both
//! issue it. Multi-row writes are committed atomically by the repositories.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::{
    clock::Clock,
    error::{AppError, AppResult, CirculationError},
    models::{
        borrowing::{Borrowing, BorrowingDetails, ReturnReceipt},
        reservation::{Reservation, ReservationDetails},
    },
    repository::Repository,
    services::settings::SettingsService,
};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Whole days between `due_at` and `at`, rounded up; 0 when not late
pub fn days_late(due_at: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    let late_ms = (at - due_at).num_milliseconds();
    if late_ms <= 0 {
        0
    } else {
        (late_ms + DAY_MS - 1) / DAY_MS
    }
}

/// Fine owed for a loan returned (or still out) at `at`
pub fn compute_fine(
    due_at: DateTime<Utc>,
    at: DateTime<Utc>,
    fine_per_day: Decimal,
) -> AppResult<Decimal> {
    Decimal::from(days_late(due_at, at))
        .checked_mul(fine_per_day)
        .ok_or_else(|| AppError::Internal("Fine amount overflowed".to_string()))
}

/// `from` moved forward by whole days
pub fn add_days(from: DateTime<Utc>, days: u32) -> AppResult<DateTime<Utc>> {
    from.checked_add_signed(Duration::days(i64::from(days)))
        .ok_or_else(|| AppError::Validation(format!("{} days from {} is out of range", days, from)))
}

#[derive(Clone)]
pub struct CirculationService {
    repository: Repository,
    settings: SettingsService,
    clock: Arc<dyn Clock>,
    write_lock: Arc<Mutex<()>>,
}

impl CirculationService {
    pub fn new(repository: Repository, settings: SettingsService, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            settings,
            clock,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Lend a book to a user.
    ///
    /// Checks, in order: the user exists, the user is under their borrow
    /// limit, the book exists and is available.
    pub async fn borrow(&self, book_id: i64, user_id: i64) -> AppResult<Borrowing> {
        let _guard = self.write_lock.lock().await;

        let user = self
            .repository
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(CirculationError::UserNotFound)?;

        let settings = self.settings.get_settings().await?;
        let active = self.repository.borrowings.count_active_for_user(user.id).await?;
        let limit = settings.borrow_limit(user.account_type);
        if active >= i64::from(limit) {
            tracing::warn!(user_id, active, limit, "Borrow refused: limit reached");
            return Err(CirculationError::LimitReached.into());
        }

        let book = self
            .repository
            .books
            .find_by_id(book_id)
            .await?
            .ok_or(CirculationError::BookNotFound)?;
        if !book.is_available() {
            return Err(CirculationError::NotAvailable.into());
        }

        let now = self.clock.now();
        let due_at = add_days(now, settings.loan_days(user.account_type))?;

        let borrowing = self
            .repository
            .borrowings
            .open(book.id, user.id, now, due_at)
            .await?
            .ok_or(CirculationError::NotAvailable)?;

        tracing::info!(
            borrowing_id = borrowing.id,
            book_id,
            user_id,
            due_at = %borrowing.due_at,
            "Book issued"
        );

        Ok(borrowing)
    }

    /// Take a book back, charge any fine, then serve the reservation queue
    pub async fn return_book(&self, book_id: i64, user_id: i64) -> AppResult<ReturnReceipt> {
        let _guard = self.write_lock.lock().await;

        let borrowing = self
            .repository
            .borrowings
            .find_active(book_id, user_id)
            .await?
            .ok_or(CirculationError::NoActiveBorrowing)?;

        let settings = self.settings.get_settings().await?;
        let now = self.clock.now();
        let fine = compute_fine(borrowing.due_at, now, settings.fine_per_day)?;

        let borrowing = self.repository.borrowings.close(&borrowing, now, fine).await?;

        tracing::info!(
            borrowing_id = borrowing.id,
            book_id,
            user_id,
            fine = %fine,
            "Book returned"
        );

        let fulfilled_reservation = self.fulfil_next(book_id, now).await?;

        Ok(ReturnReceipt {
            borrowing,
            fine,
            fulfilled_reservation,
        })
    }

    /// Fulfil the oldest pending reservation of a book, if any
    pub async fn process_reservation_queue(&self, book_id: i64) -> AppResult<Option<Reservation>> {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();
        self.fulfil_next(book_id, now).await
    }

    /// Caller must hold `write_lock`.
    ///
    /// The book itself stays "available"; the notified user gets no hold on it.
    async fn fulfil_next(&self, book_id: i64, now: DateTime<Utc>) -> AppResult<Option<Reservation>> {
        let queue = self.repository.reservations.queue(book_id).await?;
        let Some(head) = queue.into_iter().next() else {
            return Ok(None);
        };

        let title = self
            .repository
            .books
            .find_by_id(book_id)
            .await?
            .map(|b| b.title)
            .unwrap_or_else(|| format!("Book #{}", book_id));
        let message = format!("\"{}\" is now available for pickup.", title);

        let fulfilled = self
            .repository
            .reservations
            .fulfil(head.id, &message, now)
            .await?;

        tracing::info!(
            reservation_id = fulfilled.id,
            book_id,
            user_id = fulfilled.user_id,
            "Reservation fulfilled"
        );

        Ok(Some(fulfilled))
    }

    /// Join the reservation queue of a book
    pub async fn reserve(&self, book_id: i64, user_id: i64) -> AppResult<Reservation> {
        let _guard = self.write_lock.lock().await;

        self.repository
            .books
            .find_by_id(book_id)
            .await?
            .ok_or(CirculationError::BookNotFound)?;
        self.repository
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(CirculationError::UserNotFound)?;

        if self
            .repository
            .reservations
            .find_pending(user_id, book_id)
            .await?
            .is_some()
        {
            return Err(CirculationError::AlreadyReserved.into());
        }

        let reservation = self
            .repository
            .reservations
            .create(book_id, user_id, self.clock.now())
            .await?;

        tracing::info!(reservation_id = reservation.id, book_id, user_id, "Book reserved");

        Ok(reservation)
    }

    /// Extend a loan by one standard duration, counted from the current due date.
    /// Refused while anyone is waiting for the book.
    pub async fn renew(&self, book_id: i64, user_id: i64) -> AppResult<Borrowing> {
        let _guard = self.write_lock.lock().await;

        let borrowing = self
            .repository
            .borrowings
            .find_active(book_id, user_id)
            .await?
            .ok_or(CirculationError::NoActiveBorrowing)?;

        let waiting = self
            .repository
            .reservations
            .count_pending_for_book(book_id)
            .await?;
        if waiting > 0 {
            tracing::warn!(book_id, user_id, waiting, "Renewal refused: reservations pending");
            return Err(CirculationError::ReservationPending.into());
        }

        let user = self
            .repository
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(CirculationError::UserNotFound)?;
        let settings = self.settings.get_settings().await?;
        let due_at = add_days(borrowing.due_at, settings.loan_days(user.account_type))?;

        let renewed = self.repository.borrowings.extend(borrowing.id, due_at).await?;

        tracing::info!(
            borrowing_id = renewed.id,
            book_id,
            user_id,
            due_at = %renewed.due_at,
            "Loan renewed"
        );

        Ok(renewed)
    }

    /// Withdraw a pending reservation. `requester` is `None` for staff overrides;
    /// users can only see and cancel their own reservations.
    pub async fn cancel_reservation(
        &self,
        reservation_id: i64,
        requester: Option<i64>,
    ) -> AppResult<Reservation> {
        let _guard = self.write_lock.lock().await;

        let reservation = self
            .repository
            .reservations
            .get_by_id(reservation_id)
            .await?
            .filter(|r| requester.map_or(true, |user_id| r.user_id == user_id))
            .ok_or(CirculationError::ReservationNotFound)?;

        if !reservation.is_pending() {
            return Err(AppError::BusinessRule(
                "Reservation is no longer pending".to_string(),
            ));
        }

        let cancelled = self
            .repository
            .reservations
            .cancel(reservation.id, self.clock.now())
            .await?
            .ok_or_else(|| AppError::BusinessRule("Reservation is no longer pending".to_string()))?;

        tracing::info!(reservation_id, book_id = cancelled.book_id, "Reservation cancelled");

        Ok(cancelled)
    }

    /// Pending reservations of a book, first in line first
    pub async fn book_queue(&self, book_id: i64) -> AppResult<Vec<Reservation>> {
        self.repository
            .books
            .find_by_id(book_id)
            .await?
            .ok_or(CirculationError::BookNotFound)?;
        self.repository.reservations.queue(book_id).await
    }

    /// A user's loans with book titles and running fines
    pub async fn user_borrowings(
        &self,
        user_id: i64,
        active_only: bool,
    ) -> AppResult<Vec<BorrowingDetails>> {
        self.repository
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(CirculationError::UserNotFound)?;

        let settings = self.settings.get_settings().await?;
        let now = self.clock.now();
        let borrowings = self
            .repository
            .borrowings
            .list_for_user(user_id, active_only)
            .await?;

        let mut details = Vec::with_capacity(borrowings.len());
        for borrowing in borrowings {
            let book = self.repository.books.get_by_id(borrowing.book_id).await?;
            let fine = match borrowing.returned_at {
                Some(_) => borrowing.fine.unwrap_or(Decimal::ZERO),
                None => compute_fine(borrowing.due_at, now, settings.fine_per_day)?,
            };
            details.push(BorrowingDetails {
                id: borrowing.id,
                book_id: borrowing.book_id,
                book_title: book.title,
                book_author: book.author,
                user_id: borrowing.user_id,
                borrowed_at: borrowing.borrowed_at,
                due_at: borrowing.due_at,
                returned_at: borrowing.returned_at,
                renew_count: borrowing.renew_count,
                is_overdue: borrowing.is_overdue_at(now),
                fine,
            });
        }

        Ok(details)
    }

    /// A user's reservations with their place in line
    pub async fn user_reservations(&self, user_id: i64) -> AppResult<Vec<ReservationDetails>> {
        self.repository
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(CirculationError::UserNotFound)?;

        let reservations = self.repository.reservations.list_for_user(user_id).await?;

        let mut details = Vec::with_capacity(reservations.len());
        for reservation in reservations {
            let book = self.repository.books.get_by_id(reservation.book_id).await?;
            let queue_position = if reservation.is_pending() {
                self.repository
                    .reservations
                    .queue(reservation.book_id)
                    .await?
                    .iter()
                    .position(|r| r.id == reservation.id)
                    .map(|p| p + 1)
            } else {
                None
            };
            details.push(ReservationDetails {
                id: reservation.id,
                book_id: reservation.book_id,
                book_title: book.title,
                user_id: reservation.user_id,
                reserved_at: reservation.reserved_at,
                fulfilled_at: reservation.fulfilled_at,
                cancelled_at: reservation.cancelled_at,
                queue_position,
            });
        }

        Ok(details)
    }

    /// Notify borrowers whose loans are past due by more than the grace period.
    ///
    /// Runs on demand; each loan is reminded once per due date. Returns the
    /// number of reminders sent.
    pub async fn send_overdue_reminders(&self, user_id: Option<i64>) -> AppResult<usize> {
        let _guard = self.write_lock.lock().await;

        let settings = self.settings.get_settings().await?;
        let now = self.clock.now();
        // Loans due before the cutoff are past their grace period
        let cutoff = now.checked_sub_signed(Duration::days(i64::from(settings.overdue_grace_days)));

        let overdue: Vec<Borrowing> = self
            .repository
            .borrowings
            .list_active()
            .await?
            .into_iter()
            .filter(|b| user_id.map_or(true, |id| b.user_id == id))
            .filter(|b| b.reminded_at.is_none() && cutoff.map_or(false, |c| c > b.due_at))
            .collect();

        for borrowing in &overdue {
            let book = self.repository.books.get_by_id(borrowing.book_id).await?;
            let message = format!(
                "\"{}\" was due on {}. Please return it; fines accrue at {} per day.",
                book.title,
                borrowing.due_at.format("%Y-%m-%d"),
                settings.fine_per_day
            );
            self.repository.borrowings.remind(borrowing, &message, now).await?;
        }

        if !overdue.is_empty() {
            tracing::info!(count = overdue.len(), "Overdue reminders sent");
        }

        Ok(overdue.len())
    }
}
