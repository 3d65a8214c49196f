//! Process wiring: store selection, module lifecycle, server.

use std::sync::Arc;

use anyhow::{bail, Context};
use axum::{routing::get, Json, Router};
use mongodb::Database;
use mux_kernel::{
    settings::{Settings, StoreEngine},
    InitCtx, Migration, ModuleRegistry,
};
use serde_json::json;

use crate::modules::{
    self,
    books::{
        mongo::MongoBookStore,
        store::{BookStore, InMemoryBookStore},
    },
};

pub const WELCOME_MESSAGE: &str = "Welcome to Meet Mux! The app is loading...";

/// Routes served outside any module.
pub fn base_routes() -> Router {
    Router::new().route("/", get(welcome))
}

async fn welcome() -> Json<serde_json::Value> {
    Json(json!({ "message": WELCOME_MESSAGE }))
}

async fn connect(settings: &Settings) -> anyhow::Result<Database> {
    mux_db::connect(&settings.database).await.inspect_err(|err| {
        tracing::error!(error = %format!("{err:#}"), "MongoDB connection failed")
    })
}

/// Migrations of every module. They only carry metadata, so the store the
/// modules are bound to here is never touched.
fn module_migrations() -> Vec<(String, Migration)> {
    registry(Arc::new(InMemoryBookStore::new())).collect_migrations()
}

async fn apply_migrations(database: &Database) -> anyhow::Result<usize> {
    let applied = mux_db::apply_migrations(database, &module_migrations())
        .await
        .context("failed to apply migrations")?;
    tracing::info!(applied, "migrations complete");
    Ok(applied)
}

/// Open the configured store. A MongoDB store is returned once the server
/// has answered a ping and pending migrations (the `isbn` index) are applied.
pub async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn BookStore>> {
    match settings.database.engine {
        StoreEngine::Memory => {
            tracing::warn!("using the in-memory store; books are lost on exit");
            Ok(Arc::new(InMemoryBookStore::new()))
        }
        StoreEngine::Mongodb => {
            let database = connect(settings).await?;
            apply_migrations(&database).await?;
            Ok(Arc::new(MongoBookStore::new(&database)))
        }
    }
}

/// Registry with every module bound to `store`.
pub fn registry(store: Arc<dyn BookStore>) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, store);
    registry
}

/// Run the service until a shutdown signal arrives.
pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let store = open_store(settings).await?;
    let registry = registry(store);
    let ctx = InitCtx { settings };

    registry.init_modules(&ctx).await?;
    registry.start_modules(&ctx).await?;

    let served = mux_http::start_server(&registry, settings, base_routes()).await;

    registry.stop_modules().await?;
    served
}

/// Apply pending migrations of every module and return how many ran.
pub async fn migrate(settings: &Settings) -> anyhow::Result<usize> {
    if settings.database.engine == StoreEngine::Memory {
        bail!("migrations need the mongodb engine; database.engine is `memory`");
    }
    let database = connect(settings).await?;
    apply_migrations(&database).await
}
