//! Book operations over an injected store.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::models::{Book, BookId, MalformedId, NewBook, Violation};
use super::schema;
use super::store::{BookStore, StoreError};

/// Every way a book operation can fail.
#[derive(Debug, thiserror::Error)]
pub enum BookError {
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(Vec<Violation>),

    #[error("book not found")]
    NotFound,

    #[error(transparent)]
    MalformedId(#[from] MalformedId),

    #[error("{}", .0.message)]
    Conflict(Violation),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for BookError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { field, value } => {
                BookError::Conflict(Violation::unique(field, &value))
            }
            other => BookError::Store(other),
        }
    }
}

#[derive(Clone)]
pub struct BooksService {
    store: Arc<dyn BookStore>,
}

impl BooksService {
    pub fn new(store: Arc<dyn BookStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<Book>, BookError> {
        Ok(self.store.list().await?)
    }

    pub async fn get(&self, raw_id: &str) -> Result<Book, BookError> {
        let id: BookId = raw_id.parse()?;
        self.store.get(&id).await?.ok_or(BookError::NotFound)
    }

    pub async fn create(&self, candidate: &Map<String, Value>) -> Result<Book, BookError> {
        let book = schema::validate(candidate).map_err(BookError::Validation)?;
        let created = self.store.insert(book).await?;
        tracing::info!(book_id = %created.id, "book created");
        Ok(created)
    }

    /// Apply the supplied fields to an existing book and re-validate the
    /// merged record as a whole.
    pub async fn update(
        &self,
        raw_id: &str,
        patch: &Map<String, Value>,
    ) -> Result<Book, BookError> {
        let id: BookId = raw_id.parse()?;
        let existing = self.store.get(&id).await?.ok_or(BookError::NotFound)?;

        let merged = schema::merge(&NewBook::from(&existing), patch);
        let book = schema::validate(&merged).map_err(BookError::Validation)?;

        let updated = self
            .store
            .replace(&id, book)
            .await?
            .ok_or(BookError::NotFound)?;
        tracing::info!(book_id = %updated.id, "book updated");
        Ok(updated)
    }

    pub async fn delete(&self, raw_id: &str) -> Result<(), BookError> {
        let id: BookId = raw_id.parse()?;
        if !self.store.delete(&id).await? {
            return Err(BookError::NotFound);
        }
        tracing::info!(book_id = %id, "book deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::models::ViolationKind;
    use crate::modules::books::store::InMemoryBookStore;
    use serde_json::json;

    fn service() -> BooksService {
        BooksService::new(Arc::new(InMemoryBookStore::new()))
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    fn dune() -> Map<String, Value> {
        object(json!({
            "title": "Dune",
            "author": "Herbert",
            "genre": "SciFi",
            "publishedDate": "1965-08-01",
            "pages": 412,
            "isbn": "978-0441013593"
        }))
    }

    #[tokio::test]
    async fn created_book_reads_back_unchanged() {
        let service = service();
        let created = service.create(&dune()).await.unwrap();
        let fetched = service.get(&created.id.to_string()).await.unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.pages, Some(412));
        assert_eq!(fetched.created_at, fetched.updated_at);
    }

    #[tokio::test]
    async fn invalid_candidates_are_not_stored() {
        let service = service();
        let err = service.create(&object(json!({"title": "x"}))).await.unwrap_err();
        assert!(matches!(err, BookError::Validation(ref v) if v.len() == 3));
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_isbn_becomes_a_conflict() {
        let service = service();
        service.create(&dune()).await.unwrap();
        let err = service.create(&dune()).await.unwrap_err();
        match err {
            BookError::Conflict(violation) => {
                assert_eq!(violation.field, "isbn");
                assert_eq!(violation.kind, ViolationKind::Unique);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn partial_update_only_touches_supplied_fields() {
        let service = service();
        let created = service.create(&dune()).await.unwrap();
        let updated = service
            .update(&created.id.to_string(), &object(json!({"available": false})))
            .await
            .unwrap();

        assert!(!updated.available);
        assert_eq!(
            Book {
                available: true,
                updated_at: created.updated_at,
                ..updated.clone()
            },
            created
        );
    }

    #[tokio::test]
    async fn update_revalidates_the_merged_record() {
        let service = service();
        let created = service.create(&dune()).await.unwrap();
        let err = service
            .update(&created.id.to_string(), &object(json!({"title": "  ", "pages": 0})))
            .await
            .unwrap_err();
        assert!(matches!(err, BookError::Validation(ref v) if v.len() == 2));
    }

    #[tokio::test]
    async fn malformed_and_missing_ids_are_distinct() {
        let service = service();
        let absent = BookId::new().to_string();

        assert!(matches!(service.get("nope").await, Err(BookError::MalformedId(_))));
        assert!(matches!(service.get(&absent).await, Err(BookError::NotFound)));
        assert!(matches!(
            service.update("nope", &Map::new()).await,
            Err(BookError::MalformedId(_))
        ));
        assert!(matches!(
            service.update(&absent, &Map::new()).await,
            Err(BookError::NotFound)
        ));
        assert!(matches!(service.delete("nope").await, Err(BookError::MalformedId(_))));
        assert!(matches!(service.delete(&absent).await, Err(BookError::NotFound)));
    }

    #[tokio::test]
    async fn deleted_books_are_gone() {
        let service = service();
        let id = service.create(&dune()).await.unwrap().id.to_string();

        service.delete(&id).await.unwrap();
        assert!(matches!(service.get(&id).await, Err(BookError::NotFound)));
        assert!(matches!(service.delete(&id).await, Err(BookError::NotFound)));
    }
}
