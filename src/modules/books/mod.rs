pub mod models;
pub mod mongo;
pub mod routes;
pub mod schema;
pub mod service;
pub mod store;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use mux_kernel::{InitCtx, Migration, Module};
use serde_json::json;

use service::BooksService;
use store::BookStore;

/// The books resource: schema, store and HTTP surface
pub struct BooksModule {
    service: BooksService,
}

impl BooksModule {
    pub fn new(store: Arc<dyn BookStore>) -> Self {
        Self {
            service: BooksService::new(store),
        }
    }
}

fn error_response(description: &str) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorResponse" }
            }
        }
    })
}

fn book_response(description: &str) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/Book" }
            }
        }
    })
}

fn book_body() -> serde_json::Value {
    json!({
        "required": true,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/BookInput" }
            }
        }
    })
}

fn id_parameter() -> serde_json::Value {
    json!({
        "name": "id",
        "in": "path",
        "required": true,
        "description": "24 character hex book id",
        "schema": { "type": "string" }
    })
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    /// Legacy clients call the unprefixed path
    fn mounts(&self) -> Vec<String> {
        vec!["/books".to_string()]
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            engine = ?ctx.settings.database.engine,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.service.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List books, newest first",
                        "tags": ["Books"],
                        "responses": {
                            "200": {
                                "description": "List of books",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": { "$ref": "#/components/schemas/Book" }
                                        }
                                    }
                                }
                            },
                            "500": error_response("Failed to fetch books")
                        }
                    },
                    "post": {
                        "summary": "Create a book",
                        "tags": ["Books"],
                        "requestBody": book_body(),
                        "responses": {
                            "201": book_response("Created book"),
                            "400": error_response("Validation failed"),
                            "500": error_response("Failed to create book")
                        }
                    }
                },
                "/add": {
                    "post": {
                        "summary": "Create a book from title, author, genre and publishedDate",
                        "tags": ["Books"],
                        "requestBody": book_body(),
                        "responses": {
                            "201": {
                                "description": "Book added",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "object",
                                            "properties": {
                                                "message": { "type": "string" },
                                                "book": { "$ref": "#/components/schemas/Book" }
                                            },
                                            "required": ["message", "book"]
                                        }
                                    }
                                }
                            },
                            "400": error_response("Validation failed"),
                            "500": error_response("Error adding book")
                        }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Get a book",
                        "tags": ["Books"],
                        "parameters": [id_parameter()],
                        "responses": {
                            "200": book_response("The book"),
                            "400": error_response("Invalid book ID"),
                            "404": error_response("Book not found")
                        }
                    },
                    "put": {
                        "summary": "Update the supplied fields of a book",
                        "tags": ["Books"],
                        "parameters": [id_parameter()],
                        "requestBody": book_body(),
                        "responses": {
                            "200": book_response("Updated book"),
                            "400": error_response("Invalid book ID or validation failed"),
                            "404": error_response("Book not found")
                        }
                    },
                    "delete": {
                        "summary": "Delete a book",
                        "tags": ["Books"],
                        "parameters": [id_parameter()],
                        "responses": {
                            "200": {
                                "description": "Deleted",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "object",
                                            "properties": { "deleted": { "type": "boolean" } },
                                            "required": ["deleted"]
                                        }
                                    }
                                }
                            },
                            "400": error_response("Invalid book ID"),
                            "404": error_response("Book not found")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Book": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "description": "24 character hex id" },
                            "title": { "type": "string", "minLength": 1, "maxLength": 200 },
                            "author": { "type": "string", "minLength": 1, "maxLength": 120 },
                            "genre": { "type": "string", "maxLength": 80 },
                            "publishedDate": { "type": "string", "format": "date-time" },
                            "pages": { "type": "integer", "minimum": 1 },
                            "isbn": { "type": "string" },
                            "available": { "type": "boolean" },
                            "createdAt": { "type": "string", "format": "date-time" },
                            "updatedAt": { "type": "string", "format": "date-time" }
                        },
                        "required": [
                            "id", "title", "author", "genre", "publishedDate",
                            "available", "createdAt", "updatedAt"
                        ]
                    },
                    "BookInput": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "genre": { "type": "string" },
                            "publishedDate": {
                                "type": "string",
                                "description": "YYYY-MM-DD or RFC 3339 timestamp"
                            },
                            "pages": { "type": "integer", "minimum": 1 },
                            "isbn": { "type": "string", "description": "Unique when present" },
                            "available": { "type": "boolean", "default": true }
                        }
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_isbn_unique",
            up: r#"{
                "createIndexes": "books",
                "indexes": [
                    { "key": { "isbn": 1 }, "name": "isbn_unique", "unique": true, "sparse": true }
                ]
            }"#,
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create a new instance of the books module
pub fn create_module(store: Arc<dyn BookStore>) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryBookStore;

    #[test]
    fn isbn_index_migration_is_a_valid_command() {
        let module = BooksModule::new(Arc::new(InMemoryBookStore::new()));
        let migrations = module.migrations();
        assert_eq!(migrations.len(), 1);

        let command: serde_json::Value = serde_json::from_str(migrations[0].up).unwrap();
        assert_eq!(command["createIndexes"], mongo::COLLECTION);
        assert_eq!(command["indexes"][0]["unique"], true);
        assert_eq!(command["indexes"][0]["sparse"], true);
    }

    #[test]
    fn openapi_documents_every_route() {
        let module = BooksModule::new(Arc::new(InMemoryBookStore::new()));
        let spec = module.openapi().unwrap();
        for path in ["/", "/add", "/{id}"] {
            assert!(spec["paths"][path].is_object(), "missing {path}");
        }
    }
}
