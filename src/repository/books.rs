//! Books repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookQuery, CategoryCount, CreateBook, UpdateBook},
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Sqlite>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i64) -> AppResult<Book> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    pub async fn find_by_id(&self, id: i64) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    /// Search books with filters and pagination, newest first
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let (_, per_page, offset) = super::paging(query.page, query.per_page);

        let mut conditions = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(ref title) = query.title {
            conditions.push("LOWER(title) LIKE ?");
            params.push(format!("%{}%", title.to_lowercase()));
        }
        if let Some(ref author) = query.author {
            conditions.push("LOWER(author) LIKE ?");
            params.push(format!("%{}%", author.to_lowercase()));
        }
        if let Some(ref category) = query.category {
            conditions.push("LOWER(category) = LOWER(?)");
            params.push(category.clone());
        }
        if let Some(status) = query.status {
            conditions.push("status = ?");
            params.push(status.as_str().to_string());
        }
        if let Some(ref freesearch) = query.freesearch {
            let pattern = format!("%{}%", freesearch.to_lowercase());
            conditions.push(
                "(LOWER(title) LIKE ? OR LOWER(author) LIKE ? OR LOWER(COALESCE(isbn, '')) LIKE ?)",
            );
            params.push(pattern.clone());
            params.push(pattern.clone());
            params.push(pattern);
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_query = format!("SELECT COUNT(*) FROM books {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        for param in &params {
            count_builder = count_builder.bind(param);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_query = format!(
            "SELECT * FROM books {} ORDER BY id DESC LIMIT {} OFFSET {}",
            where_clause, per_page, offset
        );
        tracing::debug!(query = %select_query, params = ?params, "Book search");
        let mut builder = sqlx::query_as::<_, Book>(&select_query);
        for param in &params {
            builder = builder.bind(param);
        }
        let books = builder.fetch_all(&self.pool).await?;

        Ok((books, total))
    }

    /// Every book, for reporting
    pub async fn list_all(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>("SELECT * FROM books ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    /// Create a new book, available for loan
    pub async fn create(&self, book: &CreateBook, created_at: DateTime<Utc>) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (
                title, author, isbn, category, publisher,
                publication_year, language, cover_image, status, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'available', ?)
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.category)
        .bind(&book.publisher)
        .bind(book.publication_year)
        .bind(&book.language)
        .bind(&book.cover_image)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Update bibliographic fields
    pub async fn update(&self, id: i64, book: &UpdateBook) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = COALESCE(?, title),
                author = COALESCE(?, author),
                isbn = COALESCE(?, isbn),
                category = COALESCE(?, category),
                publisher = COALESCE(?, publisher),
                publication_year = COALESCE(?, publication_year),
                language = COALESCE(?, language),
                cover_image = COALESCE(?, cover_image)
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.category)
        .bind(&book.publisher)
        .bind(book.publication_year)
        .bind(&book.language)
        .bind(&book.cover_image)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Delete a book that is not out on loan and has never circulated
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let book = self.get_by_id(id).await?;
        if !book.is_available() {
            return Err(AppError::BusinessRule(
                "Book is issued and cannot be removed".to_string(),
            ));
        }

        let result = sqlx::query(
            r#"
            DELETE FROM books
            WHERE id = ? AND status = 'available'
              AND NOT EXISTS (SELECT 1 FROM borrowings WHERE book_id = books.id)
              AND NOT EXISTS (SELECT 1 FROM reservations WHERE book_id = books.id)
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::BusinessRule(
                "Book has circulation history and cannot be removed".to_string(),
            ));
        }

        Ok(())
    }

    /// Distinct categories with their book counts
    pub async fn categories(&self) -> AppResult<Vec<CategoryCount>> {
        let categories = sqlx::query_as::<_, CategoryCount>(
            r#"
            SELECT category AS name, COUNT(*) AS count
            FROM books
            WHERE category IS NOT NULL AND category != ''
            GROUP BY category
            ORDER BY category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::book::BookStatus;
    use crate::repository::test_pool;

    fn new_book(title: &str, author: &str, category: Option<&str>) -> CreateBook {
        CreateBook {
            title: title.into(),
            author: author.into(),
            isbn: None,
            category: category.map(String::from),
            publisher: None,
            publication_year: Some(1999),
            language: Some("en".into()),
            cover_image: None,
        }
    }

    #[tokio::test]
    async fn created_books_are_available() {
        let repo = BooksRepository::new(test_pool().await);
        let book = repo
            .create(&new_book("Dune", "Frank Herbert", Some("Fiction")), Utc::now())
            .await
            .unwrap();

        assert_eq!(book.status, BookStatus::Available);
        assert!(book.issued_to.is_none());
        assert_eq!(repo.get_by_id(book.id).await.unwrap().title, "Dune");
        assert!(repo.get_by_id(book.id + 1).await.is_err());
    }

    #[tokio::test]
    async fn search_and_categories() {
        let repo = BooksRepository::new(test_pool().await);
        repo.create(&new_book("Dune", "Frank Herbert", Some("Fiction")), Utc::now())
            .await
            .unwrap();
        repo.create(&new_book("Emma", "Jane Austen", Some("Fiction")), Utc::now())
            .await
            .unwrap();
        repo.create(&new_book("SICP", "Abelson", Some("Computing")), Utc::now())
            .await
            .unwrap();

        let (books, total) = repo
            .search(&BookQuery {
                freesearch: Some("austen".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(books[0].title, "Emma");

        let (books, total) = repo.search(&BookQuery::default()).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(books[0].title, "SICP");

        let categories = repo.categories().await.unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[1].name, "Fiction");
        assert_eq!(categories[1].count, 2);
    }

    #[tokio::test]
    async fn update_and_delete() {
        let repo = BooksRepository::new(test_pool().await);
        let book = repo
            .create(&new_book("Dune", "Frank Herbert", None), Utc::now())
            .await
            .unwrap();

        let updated = repo
            .update(
                book.id,
                &UpdateBook {
                    publisher: Some("Chilton".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.publisher.as_deref(), Some("Chilton"));
        assert_eq!(updated.title, "Dune");

        repo.delete(book.id).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
        assert!(repo.delete(book.id).await.is_err());
    }
}
