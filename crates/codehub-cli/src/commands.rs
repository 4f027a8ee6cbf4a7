// Command handlers - thin wrappers that resolve names, call the dashboard and print
use anyhow::{bail, Context as _, Result};
use codehub_api::GitHubClient;
use codehub_core::source::{import_search, trending};
use codehub_core::{
    Category, Config, Dashboard, Exporter, FilterMode, GitHubSource, Repository,
    RepositoryPayload, RepositorySource, SortBy, TrendingPeriod, View,
};
use codehub_store::SqliteStore;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::info;

pub struct Context {
    config: Config,
    pub dashboard: Dashboard<SqliteStore>,
}

impl Context {
    pub fn new(config: Config) -> Result<Self> {
        let db_path = config.storage.resolved_database_path()?;
        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;

        let dashboard = Dashboard::new(store, config.dashboard.resolved_user())
            .with_undo_window(config.dashboard.undo_window());

        Ok(Self { config, dashboard })
    }

    fn source(&self) -> Result<GitHubSource> {
        let client = GitHubClient::with_base_url(
            self.config.github.token.clone(),
            self.config.github.api_url.clone(),
        )?;
        Ok(GitHubSource::new(client))
    }

    fn limit_or_default(&self, limit: Option<u32>) -> u32 {
        limit.unwrap_or(self.config.github.per_page)
    }

    fn sort_or_default(&self, sort: Option<SortBy>) -> SortBy {
        sort.unwrap_or(self.config.dashboard.default_sort)
    }

    /// Map ids or names to category ids. Unknown tokens pass through so the
    /// store reports them.
    fn resolve_categories(&self, tokens: &[String]) -> Result<BTreeSet<String>> {
        if tokens.is_empty() {
            return Ok(BTreeSet::new());
        }
        let categories = self.dashboard.list_categories()?;
        Ok(tokens
            .iter()
            .map(|token| {
                categories
                    .iter()
                    .find(|c| c.id == *token || c.name == *token)
                    .map(|c| c.id.clone())
                    .unwrap_or_else(|| token.clone())
            })
            .collect())
    }

    fn resolve_category(&self, token: &str) -> Result<String> {
        let ids = self.resolve_categories(&[token.to_string()])?;
        Ok(ids.into_iter().next().unwrap_or_default())
    }

    fn resolve_view(&self, token: &str) -> Result<String> {
        let found = self
            .dashboard
            .list_views()?
            .into_iter()
            .find(|v| v.id == token || v.name == token)
            .map(|v| v.id);
        Ok(found.unwrap_or_else(|| token.to_string()))
    }

    fn category_names(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .dashboard
            .list_categories()?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect())
    }

    // ============ Categories ============

    pub fn category_add(&self, name: &str, color: Option<&str>) -> Result<()> {
        let category = self.dashboard.create_category(name, color)?;
        print_category(&category, None);
        Ok(())
    }

    pub fn category_update(
        &self,
        category: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> Result<()> {
        if name.is_none() && color.is_none() {
            bail!("Nothing to update; pass --name and/or --color");
        }
        let id = self.resolve_category(category)?;
        let updated = self.dashboard.update_category(&id, name, color)?;
        print_category(&updated, None);
        Ok(())
    }

    pub fn category_delete(&self, category: &str) -> Result<()> {
        let id = self.resolve_category(category)?;
        self.dashboard.delete_category(&id)?;
        println!("Deleted category {}", id);
        Ok(())
    }

    pub fn category_list(&self) -> Result<()> {
        let usage = self.dashboard.category_usage()?;
        if usage.is_empty() {
            println!("No categories yet. Create one with `codehub category add <name>`.");
        }
        for (category, count) in &usage {
            print_category(category, Some(*count));
        }
        Ok(())
    }

    // ============ Repositories ============

    pub async fn repo_save(&self, full_name: &str, categories: &[String]) -> Result<()> {
        let (owner, name) = full_name
            .split_once('/')
            .filter(|(o, n)| !o.is_empty() && !n.is_empty())
            .with_context(|| format!("Expected owner/name, got '{}'", full_name))?;

        let category_ids = self.resolve_categories(categories)?;
        let payload = self.source()?.get_repository(owner, name).await?;
        let repo = self.dashboard.save_repository(payload, &category_ids)?;
        print_repos(&[repo], &self.category_names()?);
        Ok(())
    }

    pub async fn repo_import(
        &self,
        query: &str,
        limit: Option<u32>,
        categories: &[String],
    ) -> Result<()> {
        let category_ids = self.resolve_categories(categories)?;
        let source = self.source()?;
        let limit = self.limit_or_default(limit);
        let summary = import_search(&self.dashboard, &source, query, limit, &category_ids).await?;

        print_repos(&summary.saved, &self.category_names()?);
        println!(
            "\nSaved {} repositories, skipped {} already saved",
            summary.saved.len(),
            summary.skipped.len()
        );
        Ok(())
    }

    pub fn repo_remove(&mut self, id: &str) -> Result<()> {
        let repo = self.dashboard.remove_repository(id)?;
        println!("Removed {} ({})", repo.full_name(), repo.id);
        Ok(())
    }

    pub fn repo_tag(&self, id: &str, categories: &[String]) -> Result<()> {
        let category_ids = self.resolve_categories(categories)?;
        let repo = self.dashboard.add_categories(id, &category_ids)?;
        print_repos(&[repo], &self.category_names()?);
        Ok(())
    }

    pub fn repo_untag(&self, id: &str, categories: &[String]) -> Result<()> {
        let category_ids = self.resolve_categories(categories)?;
        let repo = self.dashboard.remove_categories(id, &category_ids)?;
        print_repos(&[repo], &self.category_names()?);
        Ok(())
    }

    pub fn repo_list(&self, sort: Option<SortBy>) -> Result<()> {
        let repos = self.dashboard.list_repositories(self.sort_or_default(sort))?;
        print_repos(&repos, &self.category_names()?);
        Ok(())
    }

    pub fn filter(&self, mode: FilterMode, categories: &[String], sort: Option<SortBy>) -> Result<()> {
        let selected = self.resolve_categories(categories)?;
        let repos = self
            .dashboard
            .filter(&selected, mode, self.sort_or_default(sort))?;
        print_repos(&repos, &self.category_names()?);
        Ok(())
    }

    // ============ Views ============

    pub fn view_create(&self, name: &str, mode: FilterMode, categories: &[String]) -> Result<()> {
        let category_ids = self.resolve_categories(categories)?;
        let view = self.dashboard.create_view(name, &category_ids, mode)?;
        print_view(&view, &self.category_names()?);
        Ok(())
    }

    pub fn view_rename(&self, view: &str, new_name: &str) -> Result<()> {
        let id = self.resolve_view(view)?;
        let view = self.dashboard.rename_view(&id, new_name)?;
        print_view(&view, &self.category_names()?);
        Ok(())
    }

    pub fn view_delete(&self, view: &str) -> Result<()> {
        let id = self.resolve_view(view)?;
        self.dashboard.delete_view(&id)?;
        println!("Deleted view {}", id);
        Ok(())
    }

    pub fn view_list(&self) -> Result<()> {
        let names = self.category_names()?;
        let views = self.dashboard.list_views()?;
        if views.is_empty() {
            println!("No saved views yet.");
        }
        for view in &views {
            print_view(view, &names);
        }
        Ok(())
    }

    pub fn view_apply(&self, view: &str, sort: Option<SortBy>) -> Result<()> {
        let id = self.resolve_view(view)?;
        let repos = self
            .dashboard
            .apply_saved_view(&id, self.sort_or_default(sort))?;
        print_repos(&repos, &self.category_names()?);
        Ok(())
    }

    // ============ GitHub ============

    pub async fn search(&self, query: &str, limit: Option<u32>) -> Result<()> {
        info!("Searching GitHub for: {}", query);
        let limit = self.limit_or_default(limit);
        let results = self.source()?.search(query, None, limit).await?;
        print_payloads(&results);
        Ok(())
    }

    pub async fn trending(
        &self,
        period: TrendingPeriod,
        language: Option<&str>,
        limit: Option<u32>,
    ) -> Result<()> {
        let limit = self.limit_or_default(limit);
        let source = self.source()?;
        let results = trending(&source, period, language, limit).await?;
        println!("Trending {}", period.display_name());
        print_payloads(&results);
        Ok(())
    }

    // ============ Export ============

    pub fn export(&self, path: &Path, view: Option<&str>, sort: Option<SortBy>) -> Result<()> {
        let sort = self.sort_or_default(sort);
        let repos = match view {
            Some(view) => {
                let id = self.resolve_view(view)?;
                self.dashboard.apply_saved_view(&id, sort)?
            }
            None => self.dashboard.list_repositories(sort)?,
        };

        let categories: Vec<Category> = self.dashboard.list_categories()?;
        Exporter::new(&categories).export_to_file(&repos, path)?;
        println!("Exported {} repositories to {}", repos.len(), path.display());
        Ok(())
    }
}

fn print_category(category: &Category, usage: Option<usize>) {
    let color = category.color.as_deref().unwrap_or("-");
    match usage {
        Some(count) => println!(
            "{:<18} {:<24} {:<10} {} repos",
            category.id, category.name, color, count
        ),
        None => println!("{:<18} {:<24} {}", category.id, category.name, color),
    }
}

fn print_view(view: &View, names: &HashMap<String, String>) {
    let selection: Vec<&str> = view
        .category_ids
        .iter()
        .map(|id| names.get(id).map(String::as_str).unwrap_or(id.as_str()))
        .collect();
    println!(
        "{:<19} {:<24} {:<14} {}",
        view.id,
        view.name,
        view.mode,
        selection.join(", ")
    );
}

fn print_repos(repos: &[Repository], names: &HashMap<String, String>) {
    if repos.is_empty() {
        println!("No repositories.");
        return;
    }
    for repo in repos {
        let categories: Vec<&str> = repo
            .category_ids
            .iter()
            .map(|id| names.get(id).map(String::as_str).unwrap_or(id.as_str()))
            .collect();
        println!(
            "{:<12} {:<40} ⭐ {:<7} {:<12} [{}]",
            repo.id,
            repo.full_name(),
            repo.metadata.stars(),
            repo.metadata.language().unwrap_or("-"),
            categories.join(", ")
        );
    }
}

fn print_payloads(payloads: &[RepositoryPayload]) {
    if payloads.is_empty() {
        println!("No results.");
        return;
    }
    for payload in payloads {
        println!(
            "{:<12} {:<40} ⭐ {:<7} {}",
            payload.remote_id().unwrap_or_default(),
            payload.full_name().unwrap_or("?"),
            payload.stars(),
            payload.description().unwrap_or("")
        );
    }
}
