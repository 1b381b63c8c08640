use anyhow::{bail, Result};
use sqlx::mysql::MySqlPoolOptions;

use inventory_standardizer::catalog::sql_store::SqlCatalogStore;
use inventory_standardizer::catalog::CatalogStore;
use inventory_standardizer::util::envfile::load_dotenv_if_present;

/// Create the catalog database and schema, then seed the starter catalog.
/// Args: host port user pass db (all optional, env/defaults apply).
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let _ = load_dotenv_if_present();

    let args: Vec<String> = std::env::args().collect();
    let host = arg_or_env(&args, 1, "DB_HOST", "127.0.0.1");
    let port = arg_or_env(&args, 2, "DB_PORT", "3306").parse::<u16>()?;
    let user = arg_or_env(&args, 3, "DB_USER", "root");
    let pass = arg_or_env(&args, 4, "DB_PASSWORD", "root");
    let db = arg_or_env(&args, 5, "DB_NAME", "inventory_catalog");
    // The database name is interpolated into DDL below, so it must be a plain
    // identifier.
    if db.is_empty() || !db.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("database name '{db}' must be alphanumeric/underscore");
    }

    println!("Seeding catalog database {db} on {host}:{port}...");

    // Server-level connection to create the target database.
    let url_server = format!("mysql://{user}:{pass}@{host}:{port}/mysql");
    let pool_server = MySqlPoolOptions::new()
        .max_connections(2)
        .connect(&url_server)
        .await?;
    sqlx::query(&format!(
        "CREATE DATABASE IF NOT EXISTS `{}` CHARACTER SET utf8mb4 COLLATE utf8mb4_0900_ai_ci",
        db
    ))
    .execute(&pool_server)
    .await?;

    let url_db = format!("mysql://{user}:{pass}@{host}:{port}/{db}");
    let pool = MySqlPoolOptions::new()
        .max_connections(4)
        .connect(&url_db)
        .await?;

    let store = SqlCatalogStore::from_pool(pool);
    store.create_schema().await?;
    store.seed_default_data().await?;

    let catalog = store.load_catalog().await?;
    println!(
        "Seeding complete: {} systems, {} manufacturers, {} models.",
        catalog.nomenclature_systems.len(),
        catalog.reference_db.manufacturer.len(),
        catalog.reference_db.model.len()
    );
    Ok(())
}

fn arg_or_env(args: &[String], index: usize, env: &str, default: &str) -> String {
    args.get(index)
        .cloned()
        .or_else(|| std::env::var(env).ok())
        .unwrap_or_else(|| default.to_string())
}
