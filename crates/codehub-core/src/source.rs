// Where repositories come from before they are saved - GitHub search and trending
use async_trait::async_trait;
use chrono::{Duration, Utc};
use codehub_api::{GitHubClient, SearchSort};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::dashboard::Dashboard;
use crate::models::{Repository, RepositoryPayload, SortBy};
use crate::store::DashboardStore;
use crate::{Error, Result};

/// Anything that can hand out repository payloads.
///
/// Implemented for GitHub; tests swap in a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositorySource: Send + Sync {
    async fn search(
        &self,
        query: &str,
        sort: Option<SortBy>,
        limit: u32,
    ) -> Result<Vec<RepositoryPayload>>;

    async fn get_repository(&self, owner: &str, name: &str) -> Result<RepositoryPayload>;
}

/// GitHub-backed source
pub struct GitHubSource {
    client: GitHubClient,
}

impl GitHubSource {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }
}

fn search_sort(sort: SortBy) -> Option<SearchSort> {
    match sort {
        SortBy::Stars => Some(SearchSort::Stars),
        SortBy::Forks => Some(SearchSort::Forks),
        SortBy::Updated => Some(SearchSort::Updated),
        SortBy::Saved | SortBy::Name => None,
    }
}

#[async_trait]
impl RepositorySource for GitHubSource {
    async fn search(
        &self,
        query: &str,
        sort: Option<SortBy>,
        limit: u32,
    ) -> Result<Vec<RepositoryPayload>> {
        let response = self
            .client
            .search_repositories(query, sort.and_then(search_sort), limit)
            .await?;

        response
            .items
            .into_iter()
            .map(RepositoryPayload::from_value)
            .collect()
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<RepositoryPayload> {
        let value = self
            .client
            .get_repository(owner, name)
            .await
            .map_err(|e| match e {
                codehub_api::GitHubError::NotFound(what) => Error::not_found("Repository", what),
                other => other.into(),
            })?;
        RepositoryPayload::from_value(value)
    }
}

/// Time range for trending repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendingPeriod {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

impl TrendingPeriod {
    pub fn days(&self) -> i64 {
        match self {
            TrendingPeriod::Daily => 1,
            TrendingPeriod::Weekly => 7,
            TrendingPeriod::Monthly => 30,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TrendingPeriod::Daily => "Today",
            TrendingPeriod::Weekly => "This Week",
            TrendingPeriod::Monthly => "This Month",
        }
    }
}

impl std::str::FromStr for TrendingPeriod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(TrendingPeriod::Daily),
            "weekly" | "week" => Ok(TrendingPeriod::Weekly),
            "monthly" | "month" => Ok(TrendingPeriod::Monthly),
            other => Err(Error::validation(format!("unknown trending period '{}'", other))),
        }
    }
}

/// Search qualifier for repositories created within `period`
pub fn trending_query(period: TrendingPeriod, language: Option<&str>) -> String {
    let since = (Utc::now() - Duration::days(period.days())).format("%Y-%m-%d");
    let mut query = format!("created:>={}", since);
    if let Some(lang) = language.filter(|l| !l.trim().is_empty()) {
        query.push_str(&format!(" language:{}", lang.trim()));
    }
    query
}

/// Most-starred repositories created within `period`
pub async fn trending(
    source: &dyn RepositorySource,
    period: TrendingPeriod,
    language: Option<&str>,
    limit: u32,
) -> Result<Vec<RepositoryPayload>> {
    let query = trending_query(period, language);
    debug!("Trending query: {}", query);
    source.search(&query, Some(SortBy::Stars), limit).await
}

/// Outcome of saving a batch of search results
#[derive(Debug, Default)]
pub struct ImportSummary {
    pub saved: Vec<Repository>,
    /// Remote ids that were already on the dashboard
    pub skipped: Vec<String>,
}

/// Run a search and save every result to the dashboard.
///
/// Repositories already saved are skipped; any other failure aborts the
/// import with the repositories saved so far left in place.
pub async fn import_search<S: DashboardStore>(
    dashboard: &Dashboard<S>,
    source: &dyn RepositorySource,
    query: &str,
    limit: u32,
    category_ids: &BTreeSet<String>,
) -> Result<ImportSummary> {
    let payloads = source.search(query, None, limit).await?;
    let mut summary = ImportSummary::default();

    for payload in payloads {
        let remote_id = payload.remote_id().unwrap_or_default();
        match dashboard.save_repository(payload, category_ids) {
            Ok(repo) => summary.saved.push(repo),
            Err(Error::Duplicate { .. }) => {
                debug!("Skipping already saved repository {}", remote_id);
                summary.skipped.push(remote_id);
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        "Imported {} repositories for '{}' ({} already saved)",
        summary.saved.len(),
        query,
        summary.skipped.len()
    );
    Ok(summary)
}
