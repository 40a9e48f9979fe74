#![allow(dead_code)]

use std::sync::Once;

use rust_dbaccess::{ConditionSpec, Database, DatabaseConfig, OnConflict, Result};
use tempfile::NamedTempFile;

static INIT: Once = Once::new();

/// Initialize tracing for test binaries. Safe to call multiple times.
pub fn init_tracing_for_tests() {
    INIT.call_once(|| {
        use tracing_subscriber::filter::EnvFilter;
        use tracing_subscriber::fmt;
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_test_writer()
            .try_init();
    });
}

pub const SCHEMA: &str = r#"
    CREATE TABLE user (
        user_id INTEGER PRIMARY KEY,
        email TEXT UNIQUE NOT NULL,
        type INTEGER NOT NULL DEFAULT 0,
        active INTEGER NOT NULL DEFAULT 1,
        created INTEGER
    );
    CREATE TABLE user_temp_key (
        temp_key TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        time INTEGER NOT NULL
    );
"#;

// Helper function to create an in-memory database for testing
pub fn create_test_db() -> Result<Database> {
    create_db_with(&DatabaseConfig::new("sqlite::memory:"))
}

pub fn create_db_with(config: &DatabaseConfig) -> Result<Database> {
    init_tracing_for_tests();
    let mut db = Database::from_config(config)?;
    db.execute_batch(SCHEMA)?;
    db.reset_instrumentation();
    Ok(db)
}

// Helper function to create a temporary file-based database
pub fn create_temp_db() -> Result<(Database, NamedTempFile)> {
    init_tracing_for_tests();
    let temp_file = NamedTempFile::new().expect("temp file");
    let mut db = Database::connect(&format!("sqlite:{}", temp_file.path().display()))?;
    db.execute_batch(SCHEMA)?;
    Ok((db, temp_file))
}

pub fn insert_user(db: &mut Database, email: &str, user_type: i64) -> Result<i64> {
    let data = ConditionSpec::new()
        .equal("email", email)
        .equal("type", user_type);
    Ok(db
        .insert("user", &data, OnConflict::Fail)?
        .expect("insert wrote a row"))
}

pub fn by_id(user_id: i64) -> ConditionSpec {
    ConditionSpec::new().equal("user_id", user_id)
}
