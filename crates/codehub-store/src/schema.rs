use rusqlite::Connection;
use tracing::info;

/// Bump when the table layout changes and add a step to `migrate`
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = "
    CREATE TABLE IF NOT EXISTS categories (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        color TEXT,
        created_at INTEGER NOT NULL,
        UNIQUE(user_id, name)
    );

    CREATE TABLE IF NOT EXISTS repositories (
        user_id TEXT NOT NULL,
        remote_id TEXT NOT NULL,
        name TEXT NOT NULL,
        owner TEXT NOT NULL,
        url TEXT NOT NULL,
        payload TEXT NOT NULL,
        saved_at INTEGER NOT NULL,
        PRIMARY KEY (user_id, remote_id)
    );

    CREATE TABLE IF NOT EXISTS repository_categories (
        user_id TEXT NOT NULL,
        remote_id TEXT NOT NULL,
        category_id TEXT NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, remote_id, category_id),
        FOREIGN KEY (user_id, remote_id)
            REFERENCES repositories(user_id, remote_id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_repository_categories_category
        ON repository_categories(category_id);

    -- Selections are a JSON array with no foreign key: deleted categories
    -- linger here until the view is next loaded and pruned.
    CREATE TABLE IF NOT EXISTS views (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        mode TEXT NOT NULL,
        category_ids TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE(user_id, name)
    );
";

/// Create or upgrade the schema. Safe to run on every open.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
    }

    conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
    info!("Dashboard schema migrated from v{} to v{}", version, SCHEMA_VERSION);
    Ok(())
}
