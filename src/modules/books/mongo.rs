//! MongoDB-backed book store.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{self, doc, oid::ObjectId, Bson, Document},
    error::{ErrorKind, WriteFailure},
    options::ReturnDocument,
    Collection, Database,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::models::{from_unix_millis, now_millis, unix_millis, Book, BookId, NewBook};
use super::store::{BookStore, StoreError};

pub const COLLECTION: &str = "books";

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

/// Shape of a book in the `books` collection.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    title: String,
    author: String,
    genre: String,
    published_date: bson::DateTime,
    // Absent values must not be written: the isbn index is sparse.
    // Kept raw: documents written through Mongoose hold a double here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pages: Option<Bson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    isbn: Option<String>,
    #[serde(default = "default_available")]
    available: bool,
    created_at: bson::DateTime,
    updated_at: bson::DateTime,
}

fn default_available() -> bool {
    true
}

/// Whole page count of a stored numeric value, whatever its BSON width.
fn whole_pages(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(pages) => Some(i64::from(*pages)),
        Bson::Int64(pages) => Some(*pages),
        Bson::Double(pages) if pages.fract() == 0.0 && pages.abs() < 9.0e15 => {
            Some(*pages as i64)
        }
        _ => None,
    }
}

fn to_bson(instant: OffsetDateTime) -> bson::DateTime {
    bson::DateTime::from_millis(unix_millis(instant))
}

impl BookDocument {
    fn new(id: BookId, book: NewBook, at: OffsetDateTime) -> Self {
        Self {
            id: id.object_id(),
            title: book.title,
            author: book.author,
            genre: book.genre,
            published_date: to_bson(book.published_date),
            pages: book.pages.map(Bson::Int64),
            isbn: book.isbn,
            available: book.available,
            created_at: to_bson(at),
            updated_at: to_bson(at),
        }
    }

    fn into_book(self) -> Result<Book, StoreError> {
        let id = self.id.to_hex();
        let instant = |value: bson::DateTime, field: &str| {
            from_unix_millis(value.timestamp_millis()).ok_or_else(|| StoreError::Corrupt {
                id: id.clone(),
                reason: format!("`{}` is out of range", field),
            })
        };

        let pages = match &self.pages {
            None | Some(Bson::Null) => None,
            Some(value) => Some(whole_pages(value).ok_or_else(|| StoreError::Corrupt {
                id: id.clone(),
                reason: format!("`pages` is not a whole number: {}", value),
            })?),
        };

        Ok(Book {
            id: BookId::from(self.id),
            published_date: instant(self.published_date, "publishedDate")?,
            created_at: instant(self.created_at, "createdAt")?,
            updated_at: instant(self.updated_at, "updatedAt")?,
            title: self.title,
            author: self.author,
            genre: self.genre,
            pages,
            isbn: self.isbn,
            available: self.available,
        })
    }
}

/// `$set`/`$unset` update that rewrites every writable field.
fn replacement_update(book: &NewBook, at: OffsetDateTime) -> Document {
    let mut set = doc! {
        "title": book.title.as_str(),
        "author": book.author.as_str(),
        "genre": book.genre.as_str(),
        "publishedDate": to_bson(book.published_date),
        "available": book.available,
        "updatedAt": to_bson(at),
    };
    let mut unset = Document::new();

    match book.pages {
        Some(pages) => set.insert("pages", pages),
        None => unset.insert("pages", ""),
    };
    match &book.isbn {
        Some(isbn) => set.insert("isbn", isbn.as_str()),
        None => unset.insert("isbn", ""),
    };

    let mut update = doc! { "$set": set };
    if !unset.is_empty() {
        update.insert("$unset", unset);
    }
    update
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY
        }
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn write_error(err: mongodb::error::Error, book: &NewBook) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::Duplicate {
            field: "isbn",
            value: book.isbn.clone().unwrap_or_default(),
        }
    } else {
        StoreError::Database(err)
    }
}

pub struct MongoBookStore {
    collection: Collection<BookDocument>,
}

impl MongoBookStore {
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(COLLECTION),
        }
    }
}

#[async_trait]
impl BookStore for MongoBookStore {
    async fn list(&self) -> Result<Vec<Book>, StoreError> {
        let documents: Vec<BookDocument> = self
            .collection
            .find(doc! {})
            .sort(doc! { "createdAt": -1, "_id": 1 })
            .await?
            .try_collect()
            .await?;

        documents.into_iter().map(BookDocument::into_book).collect()
    }

    async fn get(&self, id: &BookId) -> Result<Option<Book>, StoreError> {
        self.collection
            .find_one(doc! { "_id": id.object_id() })
            .await?
            .map(BookDocument::into_book)
            .transpose()
    }

    async fn insert(&self, book: NewBook) -> Result<Book, StoreError> {
        let document = BookDocument::new(BookId::new(), book.clone(), now_millis());
        self.collection
            .insert_one(&document)
            .await
            .map_err(|err| write_error(err, &book))?;

        tracing::debug!(book_id = %document.id, "book document inserted");
        document.into_book()
    }

    async fn replace(&self, id: &BookId, book: NewBook) -> Result<Option<Book>, StoreError> {
        self.collection
            .find_one_and_update(
                doc! { "_id": id.object_id() },
                replacement_update(&book, now_millis()),
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|err| write_error(err, &book))?
            .map(BookDocument::into_book)
            .transpose()
    }

    async fn delete(&self, id: &BookId) -> Result<bool, StoreError> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id.object_id() })
            .await?;
        Ok(result.deleted_count > 0)
    }
}
