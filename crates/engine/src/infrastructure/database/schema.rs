//! Schema bootstrap.

use sqlx::SqlitePool;

use super::DbError;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS players (
        player_id INTEGER PRIMARY KEY AUTOINCREMENT,
        player_uuid TEXT NOT NULL UNIQUE,
        player_name TEXT NOT NULL,
        player_created TEXT NOT NULL,
        player_last_online TEXT NOT NULL,
        player_current_character INTEGER NULL,
        player_titler_url TEXT NULL,
        player_hud_url TEXT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid TEXT NOT NULL,
        expires TEXT NOT NULL,
        revoked INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sessions_uuid ON sessions (uuid)",
    r#"
    CREATE TABLE IF NOT EXISTS launch_tokens (
        token TEXT PRIMARY KEY,
        session_id INTEGER NOT NULL REFERENCES sessions (id),
        used INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS player_characters (
        character_id INTEGER PRIMARY KEY AUTOINCREMENT,
        player_id INTEGER NOT NULL REFERENCES players (player_id),
        character_name TEXT NOT NULL,
        character_titler TEXT NULL,
        character_options TEXT NULL,
        character_stats TEXT NULL,
        legacy INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_player_characters_player ON player_characters (player_id)",
];

const LEGACY_TABLES: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS legacy_characters (
        legacy_id INTEGER PRIMARY KEY,
        owner_uuid TEXT NOT NULL,
        name TEXT NOT NULL,
        titler TEXT NULL,
        settings TEXT NULL,
        stats TEXT NULL
    )
    "#];

/// Creates the application tables if they do not exist.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), DbError> {
    run(pool, TABLES).await?;
    tracing::info!("Database schema ready");
    Ok(())
}

/// Creates the predecessor's character table. Used for local setups and tests;
/// production points the legacy connection at the real database.
pub async fn ensure_legacy_schema(pool: &SqlitePool) -> Result<(), DbError> {
    run(pool, LEGACY_TABLES).await
}

async fn run(pool: &SqlitePool, statements: &[&str]) -> Result<(), DbError> {
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DbError::driver("ensure_schema", e))?;
    }
    Ok(())
}
