// SQLite persistence for the CodeHub dashboard
pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;
