//! Persistence port for books and its in-process implementation.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::models::{now_millis, truncate_to_millis, Book, BookId, NewBook};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate value '{value}' for unique field `{field}`")]
    Duplicate { field: &'static str, value: String },

    #[error("stored book {id} is unreadable: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("database failure: {0}")]
    Database(#[from] mongodb::error::Error),
}

/// Storage for book records.
///
/// Implementations assign ids and timestamps, and enforce `isbn` uniqueness
/// atomically with the write.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// All books, newest `createdAt` first, ties by ascending id.
    async fn list(&self) -> Result<Vec<Book>, StoreError>;

    async fn get(&self, id: &BookId) -> Result<Option<Book>, StoreError>;

    /// Persist a new book with a fresh id and `createdAt == updatedAt`.
    async fn insert(&self, book: NewBook) -> Result<Book, StoreError>;

    /// Overwrite the fields of an existing book, keeping `createdAt` and
    /// refreshing `updatedAt`. `None` when no such book exists.
    async fn replace(&self, id: &BookId, book: NewBook) -> Result<Option<Book>, StoreError>;

    /// Returns true if the book existed and was deleted.
    async fn delete(&self, id: &BookId) -> Result<bool, StoreError>;
}

pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

/// Map-backed store for tests and the `memory` engine. Contents vanish with
/// the process.
pub struct InMemoryBookStore {
    books: RwLock<HashMap<BookId, Book>>,
    clock: Clock,
}

impl InMemoryBookStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(now_millis))
    }

    /// Use `clock` for `createdAt`/`updatedAt` instead of the system time.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn now(&self) -> OffsetDateTime {
        truncate_to_millis((self.clock)())
    }
}

impl Default for InMemoryBookStore {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_unique_isbn(
    books: &HashMap<BookId, Book>,
    book: &NewBook,
    except: Option<&BookId>,
) -> Result<(), StoreError> {
    let Some(isbn) = &book.isbn else {
        return Ok(());
    };
    let taken = books
        .values()
        .any(|other| Some(&other.id) != except && other.isbn.as_ref() == Some(isbn));
    if taken {
        return Err(StoreError::Duplicate {
            field: "isbn",
            value: isbn.clone(),
        });
    }
    Ok(())
}

#[async_trait]
impl BookStore for InMemoryBookStore {
    async fn list(&self) -> Result<Vec<Book>, StoreError> {
        let books = self.books.read().await;
        let mut listed: Vec<Book> = books.values().cloned().collect();
        listed.sort_by(Book::newest_first);
        Ok(listed)
    }

    async fn get(&self, id: &BookId) -> Result<Option<Book>, StoreError> {
        Ok(self.books.read().await.get(id).cloned())
    }

    async fn insert(&self, book: NewBook) -> Result<Book, StoreError> {
        let mut books = self.books.write().await;
        ensure_unique_isbn(&books, &book, None)?;

        let now = self.now();
        let stored = Book::from_new(BookId::new(), book, now, now);
        books.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn replace(&self, id: &BookId, book: NewBook) -> Result<Option<Book>, StoreError> {
        let mut books = self.books.write().await;
        let Some(created_at) = books.get(id).map(|existing| existing.created_at) else {
            return Ok(None);
        };
        ensure_unique_isbn(&books, &book, Some(id))?;

        let stored = Book::from_new(*id, book, created_at, self.now());
        books.insert(*id, stored.clone());
        Ok(Some(stored))
    }

    async fn delete(&self, id: &BookId) -> Result<bool, StoreError> {
        Ok(self.books.write().await.remove(id).is_some())
    }
}
