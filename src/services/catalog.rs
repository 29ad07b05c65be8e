//! Catalog management service

use std::sync::Arc;

use crate::{
    clock::Clock,
    error::AppResult,
    models::book::{Book, BookQuery, CategoryCount, CreateBook, UpdateBook},
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl CatalogService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Search books with filters
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        self.repository.books.search(query).await
    }

    pub async fn get_book(&self, id: i64) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    /// Add a book to the catalog; new books are always available
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        let created = self.repository.books.create(&book, self.clock.now()).await?;
        tracing::info!(book_id = created.id, title = %created.title, "Book added to catalog");
        Ok(created)
    }

    pub async fn update_book(&self, id: i64, book: UpdateBook) -> AppResult<Book> {
        self.repository.books.update(id, &book).await
    }

    /// Remove a book. Refused while the book is issued or once it has circulated.
    pub async fn delete_book(&self, id: i64) -> AppResult<()> {
        self.repository.books.delete(id).await?;
        tracing::info!(book_id = id, "Book removed from catalog");
        Ok(())
    }

    pub async fn list_categories(&self) -> AppResult<Vec<CategoryCount>> {
        self.repository.books.categories().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::{ManualClock, SystemClock},
        error::AppError,
        models::user::{AccountType, Role},
        repository::{test_pool, users::NewUser},
        services::{circulation::CirculationService, settings::SettingsService, stats::StatsService},
    };
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn book(title: &str, category: &str) -> CreateBook {
        CreateBook {
            title: title.into(),
            author: "Anon".into(),
            isbn: None,
            category: Some(category.into()),
            publisher: None,
            publication_year: None,
            language: None,
            cover_image: None,
        }
    }

    #[tokio::test]
    async fn issued_books_cannot_be_deleted() {
        let repository = Repository::new(test_pool().await);
        let catalog = CatalogService::new(repository.clone(), Arc::new(SystemClock));

        let kept = catalog.create_book(book("Dune", "Fiction")).await.unwrap();
        let dropped = catalog.create_book(book("Emma", "Fiction")).await.unwrap();

        let user = repository
            .users
            .create(
                &NewUser {
                    full_name: "Ada".into(),
                    email: "ada@example.org".into(),
                    password_hash: "x".into(),
                    role: Role::User,
                    account_type: AccountType::Member,
                },
                Utc::now(),
            )
            .await
            .unwrap();
        repository
            .borrowings
            .open(kept.id, user.id, Utc::now(), Utc::now() + Duration::days(14))
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            catalog.delete_book(kept.id).await,
            Err(AppError::BusinessRule(_))
        ));
        catalog.delete_book(dropped.id).await.unwrap();
        assert!(matches!(
            catalog.get_book(dropped.id).await,
            Err(AppError::NotFound(_))
        ));

        let categories = catalog.list_categories().await.unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].count, 1);
    }

    #[tokio::test]
    async fn books_with_history_are_kept() {
        let repository = Repository::new(test_pool().await);
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let settings = SettingsService::new(repository.clone(), shared.clone());
        let catalog = CatalogService::new(repository.clone(), shared.clone());
        let circulation =
            CirculationService::new(repository.clone(), settings.clone(), shared.clone());
        let stats = StatsService::new(repository.clone(), settings, shared);

        let dune = catalog.create_book(book("Dune", "Fiction")).await.unwrap();
        let user = repository
            .users
            .create(
                &NewUser {
                    full_name: "Ada".into(),
                    email: "ada@example.org".into(),
                    password_hash: "x".into(),
                    role: Role::User,
                    account_type: AccountType::Member,
                },
                clock.now(),
            )
            .await
            .unwrap();

        circulation.borrow(dune.id, user.id).await.unwrap();
        clock.advance(Duration::days(20));
        circulation.return_book(dune.id, user.id).await.unwrap();

        assert!(matches!(
            catalog.delete_book(dune.id).await,
            Err(AppError::BusinessRule(_))
        ));
        assert_eq!(catalog.get_book(dune.id).await.unwrap().id, dune.id);

        let history = repository.borrowings.list_all().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].fine, Some(Decimal::new(300, 2)));

        let report = stats.get_report().await.unwrap();
        assert_eq!(report.fines_collected, Decimal::new(300, 2));
        assert_eq!(report.most_borrowed[0].book_id, dune.id);

        // A reservation alone is history too
        let reserved = catalog.create_book(book("Emma", "Fiction")).await.unwrap();
        circulation.reserve(reserved.id, user.id).await.unwrap();
        assert!(matches!(
            catalog.delete_book(reserved.id).await,
            Err(AppError::BusinessRule(_))
        ));
    }
}
