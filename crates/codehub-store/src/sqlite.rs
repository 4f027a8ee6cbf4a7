use chrono::{DateTime, Utc};
use codehub_core::models::{new_id, normalize_name};
use codehub_core::store::{ensure_known_categories, view_selection};
use codehub_core::{
    Category, CategoryStore, Error, FilterMode, Repository, RepositoryPayload, RepositoryStore,
    Result, View, ViewStore,
};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::schema;

/// How long a write waits for another connection's transaction to finish
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns rusqlite failures into opaque storage errors
trait SqlResultExt<T> {
    fn storage(self) -> Result<T>;
}

impl<T> SqlResultExt<T> for rusqlite::Result<T> {
    fn storage(self) -> Result<T> {
        self.map_err(|e| Error::Storage(e.to_string()))
    }
}

/// Dashboard store backed by a single SQLite database.
///
/// All access goes through one connection behind a mutex, and every write
/// runs in an IMMEDIATE transaction so other processes sharing the file are
/// serialized too.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).storage()?;
        // Other handles on the same file queue up instead of failing with SQLITE_BUSY
        conn.busy_timeout(BUSY_TIMEOUT).storage()?;
        schema::migrate(&conn).storage()?;
        info!("Dashboard database opened at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().storage()?;
        schema::migrate(&conn).storage()?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Storage(format!("Failed to lock database connection: {}", e)))?;
        f(&conn)
    }

    /// Run `f` in one transaction; any error rolls everything back
    fn with_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| Error::Storage(format!("Failed to lock database connection: {}", e)))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .storage()?;
        let value = f(&tx)?;
        tx.commit().storage()?;
        Ok(value)
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Current time at the precision stored on disk
fn now() -> DateTime<Utc> {
    from_millis(to_millis(Utc::now()))
}

// ============ Categories ============

fn map_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        created_at: from_millis(row.get(3)?),
    })
}

fn find_category(conn: &Connection, user: &str, id: &str) -> Result<Option<Category>> {
    conn.query_row(
        "SELECT id, name, color, created_at FROM categories WHERE user_id = ?1 AND id = ?2",
        params![user, id],
        map_category,
    )
    .optional()
    .storage()
}

fn category_name_taken(conn: &Connection, user: &str, name: &str, except: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM categories WHERE user_id = ?1 AND name = ?2 AND id != ?3",
        params![user, name, except],
        |_| Ok(()),
    )
    .optional()
    .map(|hit| hit.is_some())
    .storage()
}

fn check_categories(conn: &Connection, user: &str, requested: &BTreeSet<String>) -> Result<()> {
    if requested.is_empty() {
        return Ok(());
    }
    let mut stmt = conn
        .prepare("SELECT id FROM categories WHERE user_id = ?1")
        .storage()?;
    let known = stmt
        .query_map(params![user], |row| row.get::<_, String>(0))
        .storage()?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage()?;
    ensure_known_categories(requested, known.iter().map(String::as_str))
}

impl CategoryStore for SqliteStore {
    fn create_category(&self, user: &str, name: &str, color: Option<&str>) -> Result<Category> {
        let name = normalize_name("Category", name)?;

        self.with_tx(|tx| {
            if category_name_taken(tx, user, &name, "")? {
                return Err(Error::duplicate("Category", name));
            }

            let category = Category {
                id: new_id("cat"),
                name,
                color: color.map(str::to_string),
                created_at: now(),
            };
            tx.execute(
                "INSERT INTO categories (id, user_id, name, color, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    category.id,
                    user,
                    category.name,
                    category.color,
                    to_millis(category.created_at)
                ],
            )
            .storage()?;
            Ok(category)
        })
    }

    fn get_category(&self, user: &str, id: &str) -> Result<Category> {
        self.with_conn(|conn| {
            find_category(conn, user, id)?.ok_or_else(|| Error::not_found("Category", id))
        })
    }

    fn update_category(
        &self,
        user: &str,
        id: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> Result<Category> {
        let name = name.map(|n| normalize_name("Category", n)).transpose()?;

        self.with_tx(|tx| {
            let mut category =
                find_category(tx, user, id)?.ok_or_else(|| Error::not_found("Category", id))?;

            if let Some(name) = name {
                if category_name_taken(tx, user, &name, id)? {
                    return Err(Error::duplicate("Category", name));
                }
                category.name = name;
            }
            if let Some(color) = color {
                category.color = Some(color.to_string());
            }

            tx.execute(
                "UPDATE categories SET name = ?1, color = ?2 WHERE user_id = ?3 AND id = ?4",
                params![category.name, category.color, user, id],
            )
            .storage()?;
            Ok(category)
        })
    }

    fn delete_category(&self, user: &str, id: &str) -> Result<()> {
        self.with_tx(|tx| {
            // Memberships go first so the repository side never points at a
            // missing category, even with foreign keys off
            let stripped = tx
                .execute(
                    "DELETE FROM repository_categories WHERE user_id = ?1 AND category_id = ?2",
                    params![user, id],
                )
                .storage()?;

            let removed = tx
                .execute(
                    "DELETE FROM categories WHERE user_id = ?1 AND id = ?2",
                    params![user, id],
                )
                .storage()?;
            if removed == 0 {
                return Err(Error::not_found("Category", id));
            }

            debug!("Category {} removed from {} repositories", id, stripped);
            Ok(())
        })
    }

    fn list_categories(&self, user: &str) -> Result<Vec<Category>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, color, created_at FROM categories
                     WHERE user_id = ?1 ORDER BY created_at, rowid",
                )
                .storage()?;
            let categories = stmt
                .query_map(params![user], map_category)
                .storage()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .storage()?;
            Ok(categories)
        })
    }
}

// ============ Repositories ============

struct RepositoryRow {
    id: String,
    name: String,
    owner: String,
    url: String,
    payload: String,
    saved_at: i64,
}

impl RepositoryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            owner: row.get(2)?,
            url: row.get(3)?,
            payload: row.get(4)?,
            saved_at: row.get(5)?,
        })
    }

    fn into_repository(self, category_ids: BTreeSet<String>) -> Result<Repository> {
        let metadata: RepositoryPayload = serde_json::from_str(&self.payload)?;
        Ok(Repository {
            id: self.id,
            name: self.name,
            owner: self.owner,
            url: self.url,
            metadata,
            category_ids,
            saved_at: from_millis(self.saved_at),
        })
    }
}

const REPOSITORY_COLUMNS: &str = "remote_id, name, owner, url, payload, saved_at";

fn membership(conn: &Connection, user: &str, remote_id: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT category_id FROM repository_categories WHERE user_id = ?1 AND remote_id = ?2",
        )
        .storage()?;
    let ids = stmt
        .query_map(params![user, remote_id], |row| row.get::<_, String>(0))
        .storage()?
        .collect::<rusqlite::Result<BTreeSet<_>>>()
        .storage()?;
    Ok(ids)
}

fn find_repository(conn: &Connection, user: &str, id: &str) -> Result<Option<Repository>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM repositories WHERE user_id = ?1 AND remote_id = ?2",
                REPOSITORY_COLUMNS
            ),
            params![user, id],
            RepositoryRow::from_row,
        )
        .optional()
        .storage()?;

    match row {
        Some(row) => {
            let category_ids = membership(conn, user, &row.id)?;
            row.into_repository(category_ids).map(Some)
        }
        None => Ok(None),
    }
}

fn require_repository(conn: &Connection, user: &str, id: &str) -> Result<Repository> {
    find_repository(conn, user, id)?.ok_or_else(|| Error::not_found("Repository", id))
}

fn insert_memberships(
    tx: &Transaction<'_>,
    user: &str,
    remote_id: &str,
    category_ids: &BTreeSet<String>,
) -> Result<()> {
    let mut stmt = tx
        .prepare(
            "INSERT OR IGNORE INTO repository_categories (user_id, remote_id, category_id)
             VALUES (?1, ?2, ?3)",
        )
        .storage()?;
    for category_id in category_ids {
        stmt.execute(params![user, remote_id, category_id]).storage()?;
    }
    Ok(())
}

impl RepositoryStore for SqliteStore {
    fn save_repository(
        &self,
        user: &str,
        payload: RepositoryPayload,
        category_ids: &BTreeSet<String>,
    ) -> Result<Repository> {
        let repo = Repository::from_payload(payload, category_ids.clone(), now())?;
        let payload_json = serde_json::to_string(&repo.metadata)?;

        self.with_tx(|tx| {
            if find_repository(tx, user, &repo.id)?.is_some() {
                return Err(Error::duplicate("Repository", repo.full_name()));
            }
            check_categories(tx, user, category_ids)?;

            tx.execute(
                "INSERT INTO repositories (user_id, remote_id, name, owner, url, payload, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user,
                    repo.id,
                    repo.name,
                    repo.owner,
                    repo.url,
                    payload_json,
                    to_millis(repo.saved_at)
                ],
            )
            .storage()?;
            insert_memberships(tx, user, &repo.id, category_ids)?;
            Ok(repo)
        })
    }

    fn get_repository(&self, user: &str, id: &str) -> Result<Repository> {
        self.with_conn(|conn| require_repository(conn, user, id))
    }

    fn remove_repository(&self, user: &str, id: &str) -> Result<Repository> {
        self.with_tx(|tx| {
            let repo = require_repository(tx, user, id)?;
            tx.execute(
                "DELETE FROM repository_categories WHERE user_id = ?1 AND remote_id = ?2",
                params![user, id],
            )
            .storage()?;
            tx.execute(
                "DELETE FROM repositories WHERE user_id = ?1 AND remote_id = ?2",
                params![user, id],
            )
            .storage()?;
            Ok(repo)
        })
    }

    fn add_categories(
        &self,
        user: &str,
        id: &str,
        category_ids: &BTreeSet<String>,
    ) -> Result<Repository> {
        self.with_tx(|tx| {
            check_categories(tx, user, category_ids)?;
            require_repository(tx, user, id)?;
            insert_memberships(tx, user, id, category_ids)?;
            require_repository(tx, user, id)
        })
    }

    fn remove_categories(
        &self,
        user: &str,
        id: &str,
        category_ids: &BTreeSet<String>,
    ) -> Result<Repository> {
        self.with_tx(|tx| {
            check_categories(tx, user, category_ids)?;
            require_repository(tx, user, id)?;

            let mut stmt = tx
                .prepare(
                    "DELETE FROM repository_categories
                     WHERE user_id = ?1 AND remote_id = ?2 AND category_id = ?3",
                )
                .storage()?;
            for category_id in category_ids {
                stmt.execute(params![user, id, category_id]).storage()?;
            }

            require_repository(tx, user, id)
        })
    }

    fn list_repositories(&self, user: &str) -> Result<Vec<Repository>> {
        self.with_conn(|conn| {
            let mut memberships: HashMap<String, BTreeSet<String>> = HashMap::new();
            let mut stmt = conn
                .prepare(
                    "SELECT remote_id, category_id FROM repository_categories WHERE user_id = ?1",
                )
                .storage()?;
            let pairs = stmt
                .query_map(params![user], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .storage()?;
            for pair in pairs {
                let (remote_id, category_id) = pair.storage()?;
                memberships.entry(remote_id).or_default().insert(category_id);
            }

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM repositories WHERE user_id = ?1 ORDER BY saved_at, rowid",
                    REPOSITORY_COLUMNS
                ))
                .storage()?;
            let rows = stmt
                .query_map(params![user], RepositoryRow::from_row)
                .storage()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .storage()?;

            rows.into_iter()
                .map(|row| {
                    let category_ids = memberships.remove(&row.id).unwrap_or_default();
                    row.into_repository(category_ids)
                })
                .collect()
        })
    }
}

// ============ Views ============

struct ViewRow {
    id: String,
    name: String,
    mode: String,
    category_ids: String,
    created_at: i64,
}

impl ViewRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            mode: row.get(2)?,
            category_ids: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_view(self) -> Result<View> {
        Ok(View {
            id: self.id,
            name: self.name,
            mode: self.mode.parse::<FilterMode>()?,
            category_ids: serde_json::from_str(&self.category_ids)?,
            created_at: from_millis(self.created_at),
        })
    }
}

fn find_view(conn: &Connection, user: &str, id: &str) -> Result<Option<View>> {
    conn.query_row(
        "SELECT id, name, mode, category_ids, created_at FROM views
         WHERE user_id = ?1 AND id = ?2",
        params![user, id],
        ViewRow::from_row,
    )
    .optional()
    .storage()?
    .map(ViewRow::into_view)
    .transpose()
}

fn require_view(conn: &Connection, user: &str, id: &str) -> Result<View> {
    find_view(conn, user, id)?.ok_or_else(|| Error::not_found("View", id))
}

fn view_name_taken(conn: &Connection, user: &str, name: &str, except: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM views WHERE user_id = ?1 AND name = ?2 AND id != ?3",
        params![user, name, except],
        |_| Ok(()),
    )
    .optional()
    .map(|hit| hit.is_some())
    .storage()
}

impl ViewStore for SqliteStore {
    fn create_view(
        &self,
        user: &str,
        name: &str,
        category_ids: &BTreeSet<String>,
        mode: FilterMode,
    ) -> Result<View> {
        let name = normalize_name("View", name)?;
        let category_ids = view_selection(category_ids, mode)?;
        let selection_json = serde_json::to_string(&category_ids)?;

        self.with_tx(|tx| {
            if view_name_taken(tx, user, &name, "")? {
                return Err(Error::duplicate("View", name));
            }
            check_categories(tx, user, &category_ids)?;

            let view = View {
                id: new_id("view"),
                name,
                category_ids,
                mode,
                created_at: now(),
            };
            tx.execute(
                "INSERT INTO views (id, user_id, name, mode, category_ids, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    view.id,
                    user,
                    view.name,
                    view.mode.as_str(),
                    selection_json,
                    to_millis(view.created_at)
                ],
            )
            .storage()?;
            Ok(view)
        })
    }

    fn get_view(&self, user: &str, id: &str) -> Result<View> {
        self.with_conn(|conn| require_view(conn, user, id))
    }

    fn rename_view(&self, user: &str, id: &str, new_name: &str) -> Result<View> {
        let new_name = normalize_name("View", new_name)?;

        self.with_tx(|tx| {
            let mut view = require_view(tx, user, id)?;
            if view_name_taken(tx, user, &new_name, id)? {
                return Err(Error::duplicate("View", new_name));
            }

            tx.execute(
                "UPDATE views SET name = ?1 WHERE user_id = ?2 AND id = ?3",
                params![new_name, user, id],
            )
            .storage()?;
            view.name = new_name;
            Ok(view)
        })
    }

    fn update_view_categories(
        &self,
        user: &str,
        id: &str,
        category_ids: &BTreeSet<String>,
    ) -> Result<View> {
        let selection_json = serde_json::to_string(category_ids)?;

        self.with_tx(|tx| {
            let mut view = require_view(tx, user, id)?;
            tx.execute(
                "UPDATE views SET category_ids = ?1 WHERE user_id = ?2 AND id = ?3",
                params![selection_json, user, id],
            )
            .storage()?;
            view.category_ids = category_ids.clone();
            Ok(view)
        })
    }

    fn delete_view(&self, user: &str, id: &str) -> Result<()> {
        self.with_tx(|tx| {
            let removed = tx
                .execute(
                    "DELETE FROM views WHERE user_id = ?1 AND id = ?2",
                    params![user, id],
                )
                .storage()?;
            if removed == 0 {
                return Err(Error::not_found("View", id));
            }
            Ok(())
        })
    }

    fn list_views(&self, user: &str) -> Result<Vec<View>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, mode, category_ids, created_at FROM views
                     WHERE user_id = ?1 ORDER BY created_at, rowid",
                )
                .storage()?;
            let rows = stmt
                .query_map(params![user], ViewRow::from_row)
                .storage()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .storage()?;
            rows.into_iter().map(ViewRow::into_view).collect()
        })
    }
}
