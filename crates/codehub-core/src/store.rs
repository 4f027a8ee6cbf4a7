use std::collections::BTreeSet;

use crate::filter::check_selection;
use crate::models::{Category, FilterMode, Repository, RepositoryPayload, View};
use crate::{Error, Result};

/// Persistence for user-defined categories.
///
/// Every method is scoped to the `user` partition; nothing is shared across
/// users.
pub trait CategoryStore {
    /// Fails with `Validation` for an empty name and `Duplicate` for a name
    /// the user already has.
    fn create_category(&self, user: &str, name: &str, color: Option<&str>) -> Result<Category>;

    fn get_category(&self, user: &str, id: &str) -> Result<Category>;

    fn update_category(
        &self,
        user: &str,
        id: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> Result<Category>;

    /// Removes the category and strips its id from every saved repository
    /// as one atomic step. Deleting an unknown id is `NotFound`.
    fn delete_category(&self, user: &str, id: &str) -> Result<()>;

    /// Categories in creation order
    fn list_categories(&self, user: &str) -> Result<Vec<Category>>;
}

/// Persistence for saved repositories and their category memberships
pub trait RepositoryStore {
    /// Fails with `Duplicate` if the remote id is already saved and with
    /// `Validation` if any category id is unknown.
    fn save_repository(
        &self,
        user: &str,
        payload: RepositoryPayload,
        category_ids: &BTreeSet<String>,
    ) -> Result<Repository>;

    fn get_repository(&self, user: &str, id: &str) -> Result<Repository>;

    /// Returns the record that was removed
    fn remove_repository(&self, user: &str, id: &str) -> Result<Repository>;

    fn add_categories(
        &self,
        user: &str,
        id: &str,
        category_ids: &BTreeSet<String>,
    ) -> Result<Repository>;

    fn remove_categories(
        &self,
        user: &str,
        id: &str,
        category_ids: &BTreeSet<String>,
    ) -> Result<Repository>;

    /// No ordering guarantee; callers sort
    fn list_repositories(&self, user: &str) -> Result<Vec<Repository>>;
}

/// Persistence for saved filter configurations
pub trait ViewStore {
    fn create_view(
        &self,
        user: &str,
        name: &str,
        category_ids: &BTreeSet<String>,
        mode: FilterMode,
    ) -> Result<View>;

    fn get_view(&self, user: &str, id: &str) -> Result<View>;

    fn rename_view(&self, user: &str, id: &str, new_name: &str) -> Result<View>;

    /// Replace the stored selection without re-validating it against the
    /// mode; used to write back pruned selections.
    fn update_view_categories(
        &self,
        user: &str,
        id: &str,
        category_ids: &BTreeSet<String>,
    ) -> Result<View>;

    fn delete_view(&self, user: &str, id: &str) -> Result<()>;

    /// Views in creation order
    fn list_views(&self, user: &str) -> Result<Vec<View>>;
}

/// Everything a dashboard needs from its backend
pub trait DashboardStore: CategoryStore + RepositoryStore + ViewStore + Send + Sync {}

impl<T> DashboardStore for T where T: CategoryStore + RepositoryStore + ViewStore + Send + Sync {}

/// Reject category ids that are not in `known`
pub fn ensure_known_categories<'a, I>(requested: &BTreeSet<String>, known: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let known: BTreeSet<&str> = known.into_iter().collect();
    let unknown: Vec<&str> = requested
        .iter()
        .map(String::as_str)
        .filter(|id| !known.contains(id))
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "unknown category id(s): {}",
            unknown.join(", ")
        )))
    }
}

/// Selection a view is stored with: UNCATEGORIZED views keep no ids
pub fn view_selection(
    category_ids: &BTreeSet<String>,
    mode: FilterMode,
) -> Result<BTreeSet<String>> {
    check_selection(category_ids, mode)?;
    if mode.requires_selection() {
        Ok(category_ids.clone())
    } else {
        Ok(BTreeSet::new())
    }
}
