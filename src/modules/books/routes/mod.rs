//! HTTP handlers for the books resource.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use mux_http::error::AppError;
use serde::Serialize;
use serde_json::{Map, Value};

use super::models::{Book, Violation};
use super::schema;
use super::service::{BookError, BooksService};

const INVALID_ID: &str = "Invalid book ID";
const NOT_FOUND: &str = "Book not found";
const VALIDATION_FAILED: &str = "Validation failed";

type Payload = Result<Json<Map<String, Value>>, JsonRejection>;

#[derive(Debug, Serialize)]
pub struct AddedBook {
    pub message: &'static str,
    pub book: Book,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

/// Routes of the books resource, relative to its mount point.
pub fn router(service: BooksService) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/add", post(add_book))
        .route(
            "/{id}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .with_state(service)
}

fn details(violations: &[Violation]) -> Vec<Value> {
    violations
        .iter()
        .filter_map(|violation| serde_json::to_value(violation).ok())
        .collect()
}

fn body(payload: Payload) -> Result<Map<String, Value>, AppError> {
    payload
        .map(|Json(fields)| fields)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

/// Failure mapping shared by `create` and `add`; they differ only in the
/// message of a server-side failure.
fn creation_error(err: BookError, failure: &'static str) -> AppError {
    match err {
        BookError::Validation(violations) => {
            AppError::validation(details(&violations), VALIDATION_FAILED)
        }
        BookError::Conflict(violation) => {
            let detail = details(std::slice::from_ref(&violation));
            AppError::internal_with_details(
                "conflict",
                detail,
                failure,
                BookError::Conflict(violation),
            )
        }
        other => AppError::internal(failure, other),
    }
}

async fn list_books(State(service): State<BooksService>) -> Result<Json<Vec<Book>>, AppError> {
    service
        .list()
        .await
        .map(Json)
        .map_err(|err| AppError::internal("Failed to fetch books", err))
}

async fn get_book(
    State(service): State<BooksService>,
    Path(id): Path<String>,
) -> Result<Json<Book>, AppError> {
    service.get(&id).await.map(Json).map_err(|err| match err {
        BookError::MalformedId(_) => AppError::bad_request(INVALID_ID),
        BookError::NotFound => AppError::not_found(NOT_FOUND),
        other => AppError::internal("Failed to fetch book", other),
    })
}

async fn create_book(
    State(service): State<BooksService>,
    payload: Payload,
) -> Result<(StatusCode, Json<Book>), AppError> {
    let candidate = body(payload)?;
    let book = service
        .create(&candidate)
        .await
        .map_err(|err| creation_error(err, "Failed to create book"))?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Create from the four required fields only; any other key is ignored.
async fn add_book(
    State(service): State<BooksService>,
    payload: Payload,
) -> Result<(StatusCode, Json<AddedBook>), AppError> {
    let candidate = schema::pick(&body(payload)?, &schema::ADD_FIELDS);
    let book = service
        .create(&candidate)
        .await
        .map_err(|err| creation_error(err, "Error adding book"))?;
    Ok((
        StatusCode::CREATED,
        Json(AddedBook {
            message: "Book added successfully",
            book,
        }),
    ))
}

async fn update_book(
    State(service): State<BooksService>,
    Path(id): Path<String>,
    payload: Payload,
) -> Result<Json<Book>, AppError> {
    let patch = body(payload)?;
    service
        .update(&id, &patch)
        .await
        .map(Json)
        .map_err(|err| match err {
            BookError::MalformedId(_) => AppError::bad_request(INVALID_ID),
            BookError::NotFound => AppError::not_found(NOT_FOUND),
            BookError::Validation(violations) => {
                AppError::validation(details(&violations), VALIDATION_FAILED)
            }
            BookError::Conflict(violation) => AppError::conflict(
                details(std::slice::from_ref(&violation)),
                "Invalid book ID or update failed",
            ),
            other => AppError::internal("Failed to update book", other),
        })
}

async fn delete_book(
    State(service): State<BooksService>,
    Path(id): Path<String>,
) -> Result<Json<Deleted>, AppError> {
    service
        .delete(&id)
        .await
        .map(|()| Json(Deleted { deleted: true }))
        .map_err(|err| match err {
            BookError::MalformedId(_) => AppError::bad_request(INVALID_ID),
            BookError::NotFound => AppError::not_found(NOT_FOUND),
            other => AppError::internal("Failed to delete book", other),
        })
}
