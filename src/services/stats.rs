//! Statistics service

use std::{collections::BTreeMap, sync::Arc};

use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::book::BookStatus,
    repository::Repository,
    services::{circulation::compute_fine, settings::SettingsService},
};

const MOST_BORROWED_LIMIT: usize = 5;

fn add_fine(total: Decimal, fine: Decimal) -> AppResult<Decimal> {
    total
        .checked_add(fine)
        .ok_or_else(|| AppError::Internal("Fine total overflowed".to_string()))
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowCount {
    pub book_id: i64,
    pub title: String,
    pub author: String,
    pub borrow_count: i64,
}

/// Snapshot of the circulation desk, computed on demand
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CirculationReport {
    pub total_books: i64,
    pub available_books: i64,
    pub total_users: i64,
    pub active_borrowings: i64,
    pub overdue_borrowings: i64,
    pub pending_reservations: i64,
    /// Most borrowed books of all time, ties broken by lower book id
    pub most_borrowed: Vec<BorrowCount>,
    /// Fines charged on returned loans
    #[schema(value_type = String)]
    pub fines_collected: Decimal,
    /// Fines accrued so far on loans still out past due
    #[schema(value_type = String)]
    pub fines_outstanding: Decimal,
}

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
    settings: SettingsService,
    clock: Arc<dyn Clock>,
}

impl StatsService {
    pub fn new(repository: Repository, settings: SettingsService, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            settings,
            clock,
        }
    }

    pub async fn get_report(&self) -> AppResult<CirculationReport> {
        let now = self.clock.now();
        let settings = self.settings.get_settings().await?;

        let books = self.repository.books.list_all().await?;
        let borrowings = self.repository.borrowings.list_all().await?;

        let mut counts: BTreeMap<i64, i64> = BTreeMap::new();
        let mut active_borrowings = 0;
        let mut overdue_borrowings = 0;
        let mut fines_collected = Decimal::ZERO;
        let mut fines_outstanding = Decimal::ZERO;

        for borrowing in &borrowings {
            *counts.entry(borrowing.book_id).or_default() += 1;

            if borrowing.is_active() {
                active_borrowings += 1;
                if borrowing.is_overdue_at(now) {
                    overdue_borrowings += 1;
                    let fine = compute_fine(borrowing.due_at, now, settings.fine_per_day)?;
                    fines_outstanding = add_fine(fines_outstanding, fine)?;
                }
            } else if let Some(fine) = borrowing.fine {
                fines_collected = add_fine(fines_collected, fine)?;
            }
        }

        // Stable sort over id-ordered entries keeps ties in book id order
        let mut ranked: Vec<(i64, i64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let most_borrowed = ranked
            .into_iter()
            .filter_map(|(book_id, borrow_count)| {
                books.iter().find(|b| b.id == book_id).map(|book| BorrowCount {
                    book_id,
                    title: book.title.clone(),
                    author: book.author.clone(),
                    borrow_count,
                })
            })
            .take(MOST_BORROWED_LIMIT)
            .collect();

        Ok(CirculationReport {
            total_books: books.len() as i64,
            available_books: books
                .iter()
                .filter(|b| b.status == BookStatus::Available)
                .count() as i64,
            total_users: self.repository.users.count().await?,
            active_borrowings,
            overdue_borrowings,
            pending_reservations: self.repository.reservations.count_pending().await?,
            most_borrowed,
            fines_collected,
            fines_outstanding,
        })
    }
}
