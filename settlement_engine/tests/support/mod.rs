use log::*;
use settlement_engine::SqliteDatabase;
use sqlx::{migrate::MigrateDatabase, Sqlite};

/// A fresh, migrated database in the system temp directory.
pub async fn fresh_db(max_connections: u32) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let url = format!("sqlite://{}/settlement_it_{}.db", std::env::temp_dir().display(), rand::random::<u64>());
    Sqlite::create_database(&url).await.expect("Error creating database");
    let db = SqliteDatabase::new_with_url(&url, max_connections).await.expect("Error connecting to database");
    db.migrate().await.expect("Error running migrations");
    debug!("🚀️ Test database ready at {url}");
    db
}
