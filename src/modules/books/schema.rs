//! Book record schema: casting, normalization and validation of candidate fields.
//!
//! Candidates arrive as loose JSON objects. Each field is cast the way a
//! document mapper would (numbers to text, `"true"` to a boolean, date strings
//! to instants), trimmed, and checked against its constraints. Every violation
//! is collected so the caller can report them all at once.

use serde_json::{Map, Value};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    UtcOffset,
};

use super::models::{
    from_unix_millis, truncate_to_millis, unix_millis, NewBook, Violation, ViolationKind,
};

pub const TITLE_MAX_LENGTH: usize = 200;
pub const AUTHOR_MAX_LENGTH: usize = 120;
pub const GENRE_MAX_LENGTH: usize = 80;
pub const PAGES_MIN: i64 = 1;

/// Keys a candidate may set. Anything else, including `id` and the
/// timestamps, is ignored.
pub const WRITABLE_FIELDS: [&str; 7] = [
    "title",
    "author",
    "genre",
    "publishedDate",
    "pages",
    "isbn",
    "available",
];

/// Keys honoured by the `add` endpoint.
pub const ADD_FIELDS: [&str; 4] = ["title", "author", "genre", "publishedDate"];

/// Validate a candidate and produce the normalized record.
pub fn validate(candidate: &Map<String, Value>) -> Result<NewBook, Vec<Violation>> {
    let mut violations = Vec::new();

    let title = required_text(
        candidate,
        "title",
        "Title is required",
        TITLE_MAX_LENGTH,
        &mut violations,
    );
    let author = required_text(
        candidate,
        "author",
        "Author is required",
        AUTHOR_MAX_LENGTH,
        &mut violations,
    );
    let genre = required_text(
        candidate,
        "genre",
        "Genre is required",
        GENRE_MAX_LENGTH,
        &mut violations,
    );
    let published_date = required_date(
        candidate,
        "publishedDate",
        "Published date is required",
        &mut violations,
    );
    let pages = optional_pages(candidate, &mut violations);
    let isbn = optional_text(candidate, "isbn", &mut violations);
    let available = boolean_or_default(candidate, "available", true, &mut violations);

    match (title, author, genre, published_date) {
        (Some(title), Some(author), Some(genre), Some(published_date)) if violations.is_empty() => {
            Ok(NewBook {
                title,
                author,
                genre,
                published_date,
                pages,
                isbn,
                available,
            })
        }
        _ => Err(violations),
    }
}

/// The fields of a stored record as a candidate object.
pub fn candidate_of(book: &NewBook) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("title".to_string(), Value::from(book.title.as_str()));
    fields.insert("author".to_string(), Value::from(book.author.as_str()));
    fields.insert("genre".to_string(), Value::from(book.genre.as_str()));
    fields.insert(
        "publishedDate".to_string(),
        Value::from(unix_millis(book.published_date)),
    );
    if let Some(pages) = book.pages {
        fields.insert("pages".to_string(), Value::from(pages));
    }
    if let Some(isbn) = &book.isbn {
        fields.insert("isbn".to_string(), Value::from(isbn.as_str()));
    }
    fields.insert("available".to_string(), Value::from(book.available));
    fields
}

/// Overlay the writable keys of `patch` onto an existing record.
pub fn merge(existing: &NewBook, patch: &Map<String, Value>) -> Map<String, Value> {
    let mut fields = candidate_of(existing);
    fields.extend(pick(patch, &WRITABLE_FIELDS));
    fields
}

/// Keep only the listed keys of a candidate.
pub fn pick(candidate: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|key| {
            candidate
                .get(*key)
                .map(|value| (key.to_string(), value.clone()))
        })
        .collect()
}

/// A key that is missing or `null` counts as absent.
fn present<'a>(candidate: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    candidate.get(field).filter(|value| !value.is_null())
}

fn cast_failure(field: &'static str, expected: &str, value: &Value) -> Violation {
    Violation::new(
        field,
        ViolationKind::Type,
        format!("Cast to {} failed for value {} at path \"{}\"", expected, value, field),
    )
}

fn cast_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn required_text(
    candidate: &Map<String, Value>,
    field: &'static str,
    required_message: &str,
    max_length: usize,
    violations: &mut Vec<Violation>,
) -> Option<String> {
    let Some(value) = present(candidate, field) else {
        violations.push(Violation::new(field, ViolationKind::Required, required_message));
        return None;
    };
    let Some(text) = cast_text(value) else {
        violations.push(cast_failure(field, "string", value));
        return None;
    };

    if text.is_empty() {
        violations.push(Violation::new(field, ViolationKind::Required, required_message));
        return None;
    }
    if text.chars().count() > max_length {
        violations.push(Violation::new(
            field,
            ViolationKind::MaxLength,
            format!(
                "Path `{}` (`{}`) is longer than the maximum allowed length ({}).",
                field, text, max_length
            ),
        ));
        return None;
    }

    Some(text)
}

/// Optional text; blank after trimming counts as absent.
fn optional_text(
    candidate: &Map<String, Value>,
    field: &'static str,
    violations: &mut Vec<Violation>,
) -> Option<String> {
    let value = present(candidate, field)?;
    match cast_text(value) {
        Some(text) if text.is_empty() => None,
        Some(text) => Some(text),
        None => {
            violations.push(cast_failure(field, "string", value));
            None
        }
    }
}

fn parse_date_text(text: &str) -> Option<OffsetDateTime> {
    let calendar_date = format_description!("[year]-[month]-[day]");
    if let Ok(date) = Date::parse(text, &calendar_date) {
        return Some(date.midnight().assume_utc());
    }
    OffsetDateTime::parse(text, &Rfc3339)
        .ok()
        .map(|instant| instant.to_offset(UtcOffset::UTC))
}

fn cast_date(value: &Value) -> Option<OffsetDateTime> {
    let instant = match value {
        Value::String(text) => parse_date_text(text.trim()),
        Value::Number(number) => number.as_i64().and_then(from_unix_millis),
        _ => None,
    }?;
    Some(truncate_to_millis(instant))
}

fn required_date(
    candidate: &Map<String, Value>,
    field: &'static str,
    required_message: &str,
    violations: &mut Vec<Violation>,
) -> Option<OffsetDateTime> {
    let Some(value) = present(candidate, field) else {
        violations.push(Violation::new(field, ViolationKind::Required, required_message));
        return None;
    };
    let date = cast_date(value);
    if date.is_none() {
        violations.push(cast_failure(field, "date", value));
    }
    date
}

fn cast_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.abs() < 9.0e15)
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn optional_pages(candidate: &Map<String, Value>, violations: &mut Vec<Violation>) -> Option<i64> {
    let value = present(candidate, "pages")?;
    let Some(pages) = cast_integer(value) else {
        violations.push(cast_failure("pages", "integer", value));
        return None;
    };
    if pages < PAGES_MIN {
        violations.push(Violation::new(
            "pages",
            ViolationKind::Min,
            format!(
                "Path `pages` ({}) is less than minimum allowed value ({}).",
                pages, PAGES_MIN
            ),
        ));
        return None;
    }
    Some(pages)
}

fn cast_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        Value::Number(number) => match number.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn boolean_or_default(
    candidate: &Map<String, Value>,
    field: &'static str,
    default: bool,
    violations: &mut Vec<Violation>,
) -> bool {
    let Some(value) = present(candidate, field) else {
        return default;
    };
    cast_boolean(value).unwrap_or_else(|| {
        violations.push(cast_failure(field, "boolean", value));
        default
    })
}
