//! MongoDB connection factory and migration runner.

use std::time::Duration;

use anyhow::Context;
use mongodb::{
    bson::{doc, Document},
    options::ClientOptions,
    Client, Database,
};
use mux_kernel::{settings::DatabaseSettings, Migration};

/// Collection recording which migrations have run.
pub const MIGRATIONS_COLLECTION: &str = "_migrations";

/// Connect to MongoDB and verify the deployment answers a `ping`.
///
/// The database named in the URI is used; `settings.name` otherwise.
pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<Database> {
    let timeout = Duration::from_millis(settings.connect_timeout_ms);

    let mut options = ClientOptions::parse(&settings.uri)
        .await
        .context("invalid MongoDB connection string")?;
    options.app_name = Some("mux-app".to_string());
    options.connect_timeout = Some(timeout);
    options.server_selection_timeout = Some(timeout);

    let client = Client::with_options(options).context("failed to build MongoDB client")?;
    let database = client
        .default_database()
        .unwrap_or_else(|| client.database(&settings.name));

    database
        .run_command(doc! { "ping": 1 })
        .await
        .context("MongoDB did not answer ping")?;

    tracing::info!(target: "mux-db", database = database.name(), "MongoDB connected");
    Ok(database)
}

/// Ledger key of a migration.
pub fn migration_key(module: &str, migration: &Migration) -> String {
    format!("{}:{}", module, migration.id)
}

/// Parse a migration body into the command document sent to the server.
pub fn parse_command(migration: &Migration) -> anyhow::Result<Document> {
    serde_json::from_str(migration.up)
        .with_context(|| format!("migration '{}' is not a JSON command document", migration.id))
}

/// Run every migration not yet recorded in the ledger. Returns how many ran.
pub async fn apply_migrations(
    database: &Database,
    migrations: &[(String, Migration)],
) -> anyhow::Result<usize> {
    let ledger = database.collection::<Document>(MIGRATIONS_COLLECTION);
    let mut applied = 0;

    for (module, migration) in migrations {
        let key = migration_key(module, migration);

        let seen = ledger
            .find_one(doc! { "_id": key.as_str() })
            .await
            .with_context(|| format!("failed to read migration ledger for '{}'", key))?;
        if seen.is_some() {
            tracing::debug!(target: "mux-db", migration = %key, "migration already applied");
            continue;
        }

        let command = parse_command(migration)?;
        database
            .run_command(command)
            .await
            .with_context(|| format!("migration '{}' failed", key))?;

        ledger
            .insert_one(doc! {
                "_id": key.as_str(),
                "module": module.as_str(),
                "migration": migration.id,
                "appliedAt": mongodb::bson::DateTime::now(),
            })
            .await
            .with_context(|| format!("failed to record migration '{}'", key))?;

        tracing::info!(target: "mux-db", migration = %key, "migration applied");
        applied += 1;
    }

    Ok(applied)
}
