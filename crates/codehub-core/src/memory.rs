// In-process dashboard store - one lock around everything keeps the
// category cascade atomic with respect to concurrent membership edits
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::models::{
    new_id, normalize_name, Category, FilterMode, Repository, RepositoryPayload, View,
};
use crate::store::{
    ensure_known_categories, view_selection, CategoryStore, RepositoryStore, ViewStore,
};
use crate::{Error, Result};

/// Everything one user owns
#[derive(Debug, Default)]
struct Partition {
    categories: Vec<Category>,
    repositories: Vec<Repository>,
    views: Vec<View>,
}

impl Partition {
    fn category_mut(&mut self, id: &str) -> Result<&mut Category> {
        self.categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::not_found("Category", id))
    }

    fn repository_mut(&mut self, id: &str) -> Result<&mut Repository> {
        self.repositories
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found("Repository", id))
    }

    fn view_mut(&mut self, id: &str) -> Result<&mut View> {
        self.views
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| Error::not_found("View", id))
    }

    fn check_categories(&self, requested: &BTreeSet<String>) -> Result<()> {
        ensure_known_categories(requested, self.categories.iter().map(|c| c.id.as_str()))
    }
}

/// Dashboard store kept entirely in memory, partitioned by user
#[derive(Debug, Default)]
pub struct MemoryStore {
    partitions: RwLock<HashMap<String, Partition>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Partition>>> {
        self.partitions
            .read()
            .map_err(|e| Error::Storage(format!("memory store lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Partition>>> {
        self.partitions
            .write()
            .map_err(|e| Error::Storage(format!("memory store lock poisoned: {}", e)))
    }

    fn with_partition<T>(&self, user: &str, f: impl FnOnce(&Partition) -> Result<T>) -> Result<T> {
        let guard = self.read()?;
        match guard.get(user) {
            Some(partition) => f(partition),
            None => f(&Partition::default()),
        }
    }

    fn with_partition_mut<T>(
        &self,
        user: &str,
        f: impl FnOnce(&mut Partition) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.write()?;
        let created = !guard.contains_key(user);
        let result = f(guard.entry(user.to_string()).or_default());
        // Failed writes must not leave an empty partition behind
        if result.is_err() && created {
            guard.remove(user);
        }
        result
    }
}

impl CategoryStore for MemoryStore {
    fn create_category(&self, user: &str, name: &str, color: Option<&str>) -> Result<Category> {
        let name = normalize_name("Category", name)?;

        self.with_partition_mut(user, |p| {
            if p.categories.iter().any(|c| c.name == name) {
                return Err(Error::duplicate("Category", name));
            }

            let category = Category {
                id: new_id("cat"),
                name,
                color: color.map(str::to_string),
                created_at: Utc::now(),
            };
            p.categories.push(category.clone());
            Ok(category)
        })
    }

    fn get_category(&self, user: &str, id: &str) -> Result<Category> {
        self.with_partition(user, |p| {
            p.categories
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| Error::not_found("Category", id))
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

        self.with_partition_mut(user, |p| {
            p.category_mut(id)?;
            if let Some(name) = &name {
                if p.categories.iter().any(|c| c.id != id && &c.name == name) {
                    return Err(Error::duplicate("Category", name.clone()));
                }
            }

            let category = p.category_mut(id)?;
            if let Some(name) = name {
                category.name = name;
            }
            if let Some(color) = color {
                category.color = Some(color.to_string());
            }
            Ok(category.clone())
        })
    }

    fn delete_category(&self, user: &str, id: &str) -> Result<()> {
        self.with_partition_mut(user, |p| {
            let index = p
                .categories
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| Error::not_found("Category", id))?;
            p.categories.remove(index);

            let mut stripped = 0;
            for repo in &mut p.repositories {
                if repo.category_ids.remove(id) {
                    stripped += 1;
                }
            }
            debug!("Category {} removed from {} repositories", id, stripped);
            Ok(())
        })
    }

    fn list_categories(&self, user: &str) -> Result<Vec<Category>> {
        self.with_partition(user, |p| Ok(p.categories.clone()))
    }
}

impl RepositoryStore for MemoryStore {
    fn save_repository(
        &self,
        user: &str,
        payload: RepositoryPayload,
        category_ids: &BTreeSet<String>,
    ) -> Result<Repository> {
        let repo = Repository::from_payload(payload, category_ids.clone(), Utc::now())?;

        self.with_partition_mut(user, |p| {
            if p.repositories.iter().any(|r| r.id == repo.id) {
                return Err(Error::duplicate("Repository", repo.full_name()));
            }
            p.check_categories(category_ids)?;

            p.repositories.push(repo.clone());
            Ok(repo)
        })
    }

    fn get_repository(&self, user: &str, id: &str) -> Result<Repository> {
        self.with_partition(user, |p| {
            p.repositories
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| Error::not_found("Repository", id))
        })
    }

    fn remove_repository(&self, user: &str, id: &str) -> Result<Repository> {
        self.with_partition_mut(user, |p| {
            let index = p
                .repositories
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| Error::not_found("Repository", id))?;
            Ok(p.repositories.remove(index))
        })
    }

    fn add_categories(
        &self,
        user: &str,
        id: &str,
        category_ids: &BTreeSet<String>,
    ) -> Result<Repository> {
        self.with_partition_mut(user, |p| {
            p.check_categories(category_ids)?;
            let repo = p.repository_mut(id)?;
            repo.category_ids.extend(category_ids.iter().cloned());
            Ok(repo.clone())
        })
    }

    fn remove_categories(
        &self,
        user: &str,
        id: &str,
        category_ids: &BTreeSet<String>,
    ) -> Result<Repository> {
        self.with_partition_mut(user, |p| {
            p.check_categories(category_ids)?;
            let repo = p.repository_mut(id)?;
            repo.category_ids.retain(|c| !category_ids.contains(c));
            Ok(repo.clone())
        })
    }

    fn list_repositories(&self, user: &str) -> Result<Vec<Repository>> {
        self.with_partition(user, |p| Ok(p.repositories.clone()))
    }
}

impl ViewStore for MemoryStore {
    fn create_view(
        &self,
        user: &str,
        name: &str,
        category_ids: &BTreeSet<String>,
        mode: FilterMode,
    ) -> Result<View> {
        let name = normalize_name("View", name)?;
        let category_ids = view_selection(category_ids, mode)?;

        self.with_partition_mut(user, |p| {
            if p.views.iter().any(|v| v.name == name) {
                return Err(Error::duplicate("View", name));
            }
            p.check_categories(&category_ids)?;

            let view = View {
                id: new_id("view"),
                name,
                category_ids,
                mode,
                created_at: Utc::now(),
            };
            p.views.push(view.clone());
            Ok(view)
        })
    }

    fn get_view(&self, user: &str, id: &str) -> Result<View> {
        self.with_partition(user, |p| {
            p.views
                .iter()
                .find(|v| v.id == id)
                .cloned()
                .ok_or_else(|| Error::not_found("View", id))
        })
    }

    fn rename_view(&self, user: &str, id: &str, new_name: &str) -> Result<View> {
        let new_name = normalize_name("View", new_name)?;

        self.with_partition_mut(user, |p| {
            p.view_mut(id)?;
            if p.views.iter().any(|v| v.id != id && v.name == new_name) {
                return Err(Error::duplicate("View", new_name));
            }
            let view = p.view_mut(id)?;
            view.name = new_name;
            Ok(view.clone())
        })
    }

    fn update_view_categories(
        &self,
        user: &str,
        id: &str,
        category_ids: &BTreeSet<String>,
    ) -> Result<View> {
        self.with_partition_mut(user, |p| {
            let view = p.view_mut(id)?;
            view.category_ids = category_ids.clone();
            Ok(view.clone())
        })
    }

    fn delete_view(&self, user: &str, id: &str) -> Result<()> {
        self.with_partition_mut(user, |p| {
            let index = p
                .views
                .iter()
                .position(|v| v.id == id)
                .ok_or_else(|| Error::not_found("View", id))?;
            p.views.remove(index);
            Ok(())
        })
    }

    fn list_views(&self, user: &str) -> Result<Vec<View>> {
        self.with_partition(user, |p| Ok(p.views.clone()))
    }
}
