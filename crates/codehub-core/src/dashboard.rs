// Dashboard service - one user's view over the category, repository and view stores
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::filter::{evaluate, CategoryFilter};
use crate::models::{
    sort_repositories, Category, FilterMode, Repository, RepositoryPayload, SortBy, View,
};
use crate::store::DashboardStore;
use crate::{Error, Result};

/// How long a removed repository can be brought back by default
pub const DEFAULT_UNDO_WINDOW: Duration = Duration::from_secs(30);

/// Last removal, held only for the lifetime of this session
#[derive(Debug, Clone)]
struct RemovedRepository {
    repo: Repository,
    removed_at: Instant,
}

/// Entry point for the dashboard UI.
///
/// Wraps a [`DashboardStore`] and binds it to a single user. The UI never
/// filters on its own; every decision it shows comes from here.
pub struct Dashboard<S> {
    store: S,
    user: String,
    undo_window: Duration,
    last_removed: Option<RemovedRepository>,
}

impl<S: DashboardStore> Dashboard<S> {
    pub fn new(store: S, user: impl Into<String>) -> Self {
        Self {
            store,
            user: user.into(),
            undo_window: DEFAULT_UNDO_WINDOW,
            last_removed: None,
        }
    }

    pub fn with_undo_window(mut self, window: Duration) -> Self {
        self.undo_window = window;
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ============ Categories ============

    pub fn create_category(&self, name: &str, color: Option<&str>) -> Result<Category> {
        let category = self.store.create_category(&self.user, name, color)?;
        info!("Created category '{}' ({})", category.name, category.id);
        Ok(category)
    }

    pub fn update_category(
        &self,
        id: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> Result<Category> {
        self.store.update_category(&self.user, id, name, color)
    }

    pub fn delete_category(&self, id: &str) -> Result<()> {
        self.store.delete_category(&self.user, id)?;
        info!("Deleted category {}", id);
        Ok(())
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        self.store.list_categories(&self.user)
    }

    /// Every category with the number of saved repositories carrying it
    pub fn category_usage(&self) -> Result<Vec<(Category, usize)>> {
        let repos = self.store.list_repositories(&self.user)?;
        let usage = self
            .list_categories()?
            .into_iter()
            .map(|c| {
                let count = repos.iter().filter(|r| r.category_ids.contains(&c.id)).count();
                (c, count)
            })
            .collect();
        Ok(usage)
    }

    // ============ Repositories ============

    pub fn save_repository(
        &self,
        payload: RepositoryPayload,
        category_ids: &BTreeSet<String>,
    ) -> Result<Repository> {
        let repo = self.store.save_repository(&self.user, payload, category_ids)?;
        info!("Saved repository {} ({})", repo.full_name(), repo.id);
        Ok(repo)
    }

    pub fn get_repository(&self, id: &str) -> Result<Repository> {
        self.store.get_repository(&self.user, id)
    }

    /// Remove a saved repository. It stays restorable through
    /// [`Dashboard::undo_remove`] until the undo window closes or another
    /// repository is removed.
    pub fn remove_repository(&mut self, id: &str) -> Result<Repository> {
        let repo = self.store.remove_repository(&self.user, id)?;
        info!("Removed repository {}", repo.full_name());

        self.last_removed = Some(RemovedRepository {
            repo: repo.clone(),
            removed_at: Instant::now(),
        });
        Ok(repo)
    }

    /// Restore the most recently removed repository.
    ///
    /// Categories deleted in the meantime are dropped from the restored
    /// record. A failed restore keeps the record in the undo slot.
    pub fn undo_remove(&mut self) -> Result<Repository> {
        let removed = self
            .last_removed
            .as_ref()
            .ok_or_else(|| Error::not_found("Removed repository", "<none>"))?;

        if removed.removed_at.elapsed() >= self.undo_window {
            let id = removed.repo.id.clone();
            debug!("Undo window for {} has closed", id);
            self.last_removed = None;
            return Err(Error::not_found("Removed repository", id));
        }

        let existing: BTreeSet<String> = self
            .list_categories()?
            .into_iter()
            .map(|c| c.id)
            .collect();
        let category_ids: BTreeSet<String> = removed
            .repo
            .category_ids
            .intersection(&existing)
            .cloned()
            .collect();

        let restored =
            self.store
                .save_repository(&self.user, removed.repo.metadata.clone(), &category_ids)?;
        self.last_removed = None;
        info!("Restored repository {}", restored.full_name());
        Ok(restored)
    }

    /// Whether [`Dashboard::undo_remove`] would currently have something to restore
    pub fn can_undo(&self) -> bool {
        self.last_removed
            .as_ref()
            .map(|r| r.removed_at.elapsed() < self.undo_window)
            .unwrap_or(false)
    }

    pub fn add_categories(&self, id: &str, category_ids: &BTreeSet<String>) -> Result<Repository> {
        self.store.add_categories(&self.user, id, category_ids)
    }

    pub fn remove_categories(
        &self,
        id: &str,
        category_ids: &BTreeSet<String>,
    ) -> Result<Repository> {
        self.store.remove_categories(&self.user, id, category_ids)
    }

    /// All saved repositories, unfiltered
    pub fn list_repositories(&self, sort_by: SortBy) -> Result<Vec<Repository>> {
        let mut repos = self.store.list_repositories(&self.user)?;
        sort_repositories(&mut repos, sort_by);
        Ok(repos)
    }

    /// Saved repositories sorted by `sort_by`, then filtered
    pub fn filter(
        &self,
        selected: &BTreeSet<String>,
        mode: FilterMode,
        sort_by: SortBy,
    ) -> Result<Vec<Repository>> {
        let repos = self.list_repositories(sort_by)?;
        evaluate(&repos, selected, mode)
    }

    // ============ Views ============

    pub fn create_view(
        &self,
        name: &str,
        category_ids: &BTreeSet<String>,
        mode: FilterMode,
    ) -> Result<View> {
        let view = self.store.create_view(&self.user, name, category_ids, mode)?;
        info!("Created view '{}' ({}, {})", view.name, view.mode, view.id);
        Ok(view)
    }

    pub fn get_view(&self, id: &str) -> Result<View> {
        self.store.get_view(&self.user, id)
    }

    pub fn rename_view(&self, id: &str, new_name: &str) -> Result<View> {
        self.store.rename_view(&self.user, id, new_name)
    }

    pub fn delete_view(&self, id: &str) -> Result<()> {
        self.store.delete_view(&self.user, id)
    }

    pub fn list_views(&self) -> Result<Vec<View>> {
        self.store.list_views(&self.user)
    }

    /// Load a view, dropping category ids that no longer exist.
    ///
    /// A pruned selection is written back so the view stays clean.
    pub fn load_view(&self, id: &str) -> Result<View> {
        let view = self.store.get_view(&self.user, id)?;
        if view.category_ids.is_empty() {
            return Ok(view);
        }

        let existing: BTreeSet<String> = self
            .list_categories()?
            .into_iter()
            .map(|c| c.id)
            .collect();
        if view.category_ids.is_subset(&existing) {
            return Ok(view);
        }

        let pruned: BTreeSet<String> = view.category_ids.intersection(&existing).cloned().collect();
        warn!(
            "View '{}' referenced {} deleted categories; pruning",
            view.name,
            view.category_ids.len() - pruned.len()
        );
        self.store.update_view_categories(&self.user, id, &pruned)
    }

    /// Filter `repos` through a saved view.
    ///
    /// A view whose whole selection was deleted is stale and fails with
    /// `Validation` rather than silently matching nothing.
    pub fn apply_view(&self, id: &str, repos: &[Repository]) -> Result<Vec<Repository>> {
        let view = self.load_view(id)?;

        let filter = CategoryFilter::new(view.category_ids, view.mode).map_err(|_| {
            Error::validation(format!(
                "view '{}' no longer references any existing category",
                view.name
            ))
        })?;

        Ok(filter.apply(repos).into_iter().cloned().collect())
    }

    /// Apply a view to this user's saved repositories
    pub fn apply_saved_view(&self, id: &str, sort_by: SortBy) -> Result<Vec<Repository>> {
        let repos = self.list_repositories(sort_by)?;
        self.apply_view(id, &repos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::fixtures::{ids, payload};
    use crate::store::RepositoryStore;

    fn names(repos: &[Repository]) -> Vec<&str> {
        repos.iter().map(|r| r.name.as_str()).collect()
    }

    /// infra = A, ml = B; r1 {A}, r2 {A, B}, r3 {}
    fn seeded() -> (Dashboard<MemoryStore>, Category, Category) {
        let dash = Dashboard::new(MemoryStore::new(), "alice");
        let a = dash.create_category("infra", None).unwrap();
        let b = dash.create_category("ml", Some("#00ff00")).unwrap();

        dash.save_repository(payload(1, "acme/r1", 30), &ids(&[&a.id])).unwrap();
        dash.save_repository(payload(2, "acme/r2", 20), &ids(&[&a.id, &b.id])).unwrap();
        dash.save_repository(payload(3, "acme/r3", 10), &BTreeSet::new()).unwrap();
        (dash, a, b)
    }

    #[test]
    fn test_filter_scenario() {
        let (dash, a, b) = seeded();
        let all = |sel: BTreeSet<String>| dash.filter(&sel, FilterMode::All, SortBy::Saved).unwrap();

        assert_eq!(names(&all(ids(&[&a.id]))), vec!["r1", "r2"]);
        assert_eq!(names(&all(ids(&[&a.id, &b.id]))), vec!["r2"]);
        assert_eq!(
            names(&dash.filter(&ids(&[&b.id]), FilterMode::Any, SortBy::Saved).unwrap()),
            vec!["r2"]
        );
        assert_eq!(
            names(&dash.filter(&BTreeSet::new(), FilterMode::Uncategorized, SortBy::Saved).unwrap()),
            vec!["r3"]
        );
    }

    #[test]
    fn test_deleting_category_moves_repos_to_uncategorized() {
        let (dash, a, b) = seeded();
        dash.delete_category(&a.id).unwrap();

        assert!(dash.get_repository("1").unwrap().category_ids.is_empty());
        assert_eq!(dash.get_repository("2").unwrap().category_ids, ids(&[&b.id]));
        assert_eq!(
            names(&dash.filter(&BTreeSet::new(), FilterMode::Uncategorized, SortBy::Saved).unwrap()),
            vec!["r1", "r3"]
        );
    }

    #[test]
    fn test_filter_respects_sort_order() {
        let (dash, a, _) = seeded();
        let repos = dash.filter(&ids(&[&a.id]), FilterMode::Any, SortBy::Name).unwrap();
        assert_eq!(names(&repos), vec!["r1", "r2"]);

        let all = dash.list_repositories(SortBy::Stars).unwrap();
        assert_eq!(names(&all), vec!["r1", "r2", "r3"]);
    }

    #[test]
    fn test_apply_view_delegates_to_filter() {
        let (dash, a, b) = seeded();
        let view = dash
            .create_view("either", &ids(&[&a.id, &b.id]), FilterMode::Any)
            .unwrap();
        let untagged = dash
            .create_view("untagged", &BTreeSet::new(), FilterMode::Uncategorized)
            .unwrap();

        let repos = dash.list_repositories(SortBy::Saved).unwrap();
        assert_eq!(names(&dash.apply_view(&view.id, &repos).unwrap()), vec!["r1", "r2"]);
        assert_eq!(names(&dash.apply_view(&untagged.id, &repos).unwrap()), vec!["r3"]);
        assert!(matches!(
            dash.apply_view("view_missing", &repos).unwrap_err(),
            Error::NotFound { .. }
        ));
    }

    #[test]
    fn test_apply_view_prunes_deleted_categories() {
        let (dash, a, b) = seeded();
        let view = dash
            .create_view("both", &ids(&[&a.id, &b.id]), FilterMode::All)
            .unwrap();

        dash.delete_category(&a.id).unwrap();

        let repos = dash.apply_saved_view(&view.id, SortBy::Saved).unwrap();
        assert_eq!(names(&repos), vec!["r2"]);

        // Pruned selection was persisted
        assert_eq!(dash.get_view(&view.id).unwrap().category_ids, ids(&[&b.id]));
    }

    #[test]
    fn test_fully_pruned_view_is_stale() {
        let (dash, a, _) = seeded();
        let view = dash.create_view("infra only", &ids(&[&a.id]), FilterMode::All).unwrap();
        dash.delete_category(&a.id).unwrap();

        let err = dash.apply_saved_view(&view.id, SortBy::Saved).unwrap_err();
        match err {
            Error::Validation(msg) => assert!(msg.contains("infra only"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_view_names_must_be_unique() {
        let (dash, a, _) = seeded();
        let first = dash.create_view("mine", &ids(&[&a.id]), FilterMode::Any).unwrap();
        let second = dash.create_view("other", &ids(&[&a.id]), FilterMode::All).unwrap();

        assert!(matches!(
            dash.create_view("mine", &ids(&[&a.id]), FilterMode::All).unwrap_err(),
            Error::Duplicate { .. }
        ));
        assert!(matches!(
            dash.rename_view(&second.id, "mine").unwrap_err(),
            Error::Duplicate { .. }
        ));

        dash.delete_view(&first.id).unwrap();
        assert!(dash.rename_view(&second.id, "mine").is_ok());
        assert_eq!(dash.list_views().unwrap().len(), 1);
    }

    #[test]
    fn test_category_usage_counts() {
        let (dash, a, b) = seeded();
        let usage: Vec<_> = dash
            .category_usage()
            .unwrap()
            .into_iter()
            .map(|(c, n)| (c.id, n))
            .collect();
        assert_eq!(usage, vec![(a.id, 2), (b.id, 1)]);
    }

    #[test]
    fn test_undo_restores_removed_repository() {
        let (mut dash, a, b) = seeded();
        dash.remove_repository("2").unwrap();
        assert!(dash.can_undo());

        // Category deleted while the record sat in the undo slot
        dash.delete_category(&a.id).unwrap();

        let restored = dash.undo_remove().unwrap();
        assert_eq!(restored.id, "2");
        assert_eq!(restored.category_ids, ids(&[&b.id]));
        assert!(!dash.can_undo());
        assert!(matches!(dash.undo_remove().unwrap_err(), Error::NotFound { .. }));
    }

    #[test]
    fn test_failed_undo_keeps_removed_repository() {
        let (mut dash, a, _) = seeded();
        dash.remove_repository("1").unwrap();

        // Saved again before the undo, so the restore collides
        dash.save_repository(payload(1, "acme/r1", 30), &BTreeSet::new())
            .unwrap();
        assert!(matches!(dash.undo_remove().unwrap_err(), Error::Duplicate { .. }));
        assert!(dash.can_undo());

        // Clear the collision without touching the undo slot
        dash.store.remove_repository("alice", "1").unwrap();
        let restored = dash.undo_remove().unwrap();
        assert_eq!(restored.id, "1");
        assert_eq!(restored.category_ids, ids(&[&a.id]));
        assert!(!dash.can_undo());
    }

    #[test]
    fn test_undo_window_expires() {
        let (dash, _, _) = seeded();
        let mut dash = dash.with_undo_window(Duration::ZERO);
        dash.remove_repository("3").unwrap();

        assert!(!dash.can_undo());
        assert!(matches!(dash.undo_remove().unwrap_err(), Error::NotFound { .. }));
        assert!(dash.get_repository("3").is_err());
    }
}
