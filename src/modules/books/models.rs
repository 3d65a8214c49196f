use std::{cmp::Ordering, fmt, str::FromStr};

use mongodb::bson::oid::ObjectId;
use serde::{Serialize, Serializer};
use time::OffsetDateTime;

/// Identifier of a stored book, rendered as 24 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BookId(ObjectId);

impl BookId {
    /// Generate a fresh identifier; later ids sort after earlier ones.
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    pub fn object_id(&self) -> ObjectId {
        self.0
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ObjectId> for BookId {
    fn from(id: ObjectId) -> Self {
        Self(id)
    }
}

impl Ord for BookId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.bytes().cmp(&other.0.bytes())
    }
}

impl PartialOrd for BookId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

/// The raw string is not in the store's identifier format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid book id")]
pub struct MalformedId(pub String);

impl FromStr for BookId {
    type Err = MalformedId;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        ObjectId::parse_str(raw)
            .map(Self)
            .map_err(|_| MalformedId(raw.to_string()))
    }
}

impl Serialize for BookId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_hex())
    }
}

/// A stored book.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub genre: String,
    #[serde(with = "time::serde::rfc3339")]
    pub published_date: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    pub available: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Book {
    /// Assemble a stored book from validated fields.
    pub fn from_new(
        id: BookId,
        book: NewBook,
        created_at: OffsetDateTime,
        updated_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            title: book.title,
            author: book.author,
            genre: book.genre,
            published_date: book.published_date,
            pages: book.pages,
            isbn: book.isbn,
            available: book.available,
            created_at,
            updated_at,
        }
    }

    /// List order: newest `createdAt` first, ties broken by ascending id.
    pub fn newest_first(a: &Book, b: &Book) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Validated, normalized book fields ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub published_date: OffsetDateTime,
    pub pages: Option<i64>,
    pub isbn: Option<String>,
    pub available: bool,
}

impl From<&Book> for NewBook {
    fn from(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            genre: book.genre.clone(),
            published_date: book.published_date,
            pages: book.pages,
            isbn: book.isbn.clone(),
            available: book.available,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Required,
    MaxLength,
    Min,
    Type,
    Unique,
}

/// One field-level reason a candidate book was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: &'static str,
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    pub fn new(field: &'static str, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            field,
            kind,
            message: message.into(),
        }
    }

    pub fn unique(field: &'static str, value: &str) -> Self {
        Self::new(
            field,
            ViolationKind::Unique,
            format!("Path `{}` (`{}`) is already used by another book.", field, value),
        )
    }
}

/// Drop sub-millisecond precision; the document store keeps milliseconds.
pub fn truncate_to_millis(instant: OffsetDateTime) -> OffsetDateTime {
    instant
        .replace_millisecond(instant.millisecond())
        .unwrap_or(instant)
}

/// Current UTC time at store precision.
pub fn now_millis() -> OffsetDateTime {
    truncate_to_millis(OffsetDateTime::now_utc())
}

pub fn unix_millis(instant: OffsetDateTime) -> i64 {
    (instant.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_unix_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn book_id_round_trips_through_hex() {
        let id = BookId::new();
        let parsed: BookId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.to_string().len(), 24);
    }

    #[test]
    fn violation_kinds_use_snake_case_on_the_wire() {
        let kinds = [
            (ViolationKind::Required, "required"),
            (ViolationKind::MaxLength, "max_length"),
            (ViolationKind::Min, "min"),
            (ViolationKind::Type, "type"),
            (ViolationKind::Unique, "unique"),
        ];
        for (kind, wire) in kinds {
            assert_eq!(serde_json::to_value(kind).unwrap(), wire);
        }
    }

    #[test]
    fn malformed_ids_are_rejected() {
        for raw in ["", "123", "not-an-id", "zzzzzzzzzzzzzzzzzzzzzzzz", "507f1f77bcf86cd7994390111"] {
            assert_eq!(raw.parse::<BookId>(), Err(MalformedId(raw.to_string())));
        }
    }

    #[test]
    fn ids_generated_later_sort_after() {
        let first = BookId::new();
        let second = BookId::new();
        assert!(first < second);
    }

    #[test]
    fn millisecond_helpers_agree() {
        let instant = datetime!(2024-02-29 12:30:45.123456789 UTC);
        let truncated = truncate_to_millis(instant);
        assert_eq!(truncated, datetime!(2024-02-29 12:30:45.123 UTC));
        assert_eq!(from_unix_millis(unix_millis(truncated)), Some(truncated));
    }

    #[test]
    fn book_serializes_with_camel_case_and_omits_absent_optionals() {
        let at = datetime!(2024-01-01 00:00 UTC);
        let book = Book::from_new(
            BookId::new(),
            NewBook {
                title: "Dune".to_string(),
                author: "Herbert".to_string(),
                genre: "SciFi".to_string(),
                published_date: datetime!(1965-08-01 00:00 UTC),
                pages: None,
                isbn: None,
                available: true,
            },
            at,
            at,
        );

        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["publishedDate"], "1965-08-01T00:00:00Z");
        assert_eq!(json["createdAt"], "2024-01-01T00:00:00Z");
        assert_eq!(json["id"], book.id.to_string());
        assert!(json.get("pages").is_none());
        assert!(json.get("isbn").is_none());
    }
}
