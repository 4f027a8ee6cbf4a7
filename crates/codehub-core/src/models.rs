use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Raw repository object as handed over by the search collaborator.
///
/// Nothing here is validated beyond the remote id; the accessors read the
/// handful of fields the dashboard displays and sorts by.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryPayload(Map<String, Value>);

impl RepositoryPayload {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(Error::validation(format!(
                "repository payload must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Stable remote identifier: GitHub sends a number, other sources a string
    pub fn remote_id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    pub fn full_name(&self) -> Option<&str> {
        self.str_field("full_name")
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
            .or_else(|| self.full_name().and_then(|f| f.rsplit_once('/')).map(|(_, n)| n))
    }

    pub fn owner(&self) -> Option<&str> {
        let explicit = match self.0.get("owner") {
            Some(Value::Object(owner)) => owner.get("login").and_then(Value::as_str),
            Some(Value::String(owner)) => Some(owner.as_str()),
            _ => None,
        };
        explicit
            .filter(|s| !s.is_empty())
            .or_else(|| self.full_name().and_then(|f| f.split_once('/')).map(|(o, _)| o))
    }

    pub fn url(&self) -> Option<&str> {
        self.str_field("html_url").or_else(|| self.str_field("url"))
    }

    pub fn description(&self) -> Option<&str> {
        self.str_field("description")
    }

    pub fn language(&self) -> Option<&str> {
        self.str_field("language")
    }

    pub fn stars(&self) -> u64 {
        self.count_field(&["stargazers_count", "stars"])
    }

    pub fn forks(&self) -> u64 {
        self.count_field(&["forks_count", "forks"])
    }

    /// ISO-8601 timestamp, compared lexicographically when sorting
    pub fn updated_at(&self) -> Option<&str> {
        self.str_field("updated_at")
            .or_else(|| self.str_field("pushed_at"))
    }

    pub fn topics(&self) -> Vec<&str> {
        self.0
            .get("topics")
            .and_then(Value::as_array)
            .map(|t| t.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    fn count_field(&self, keys: &[&str]) -> u64 {
        keys.iter()
            .find_map(|k| self.0.get(*k).and_then(Value::as_u64))
            .unwrap_or(0)
    }
}

impl From<Map<String, Value>> for RepositoryPayload {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A repository saved to a user's dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Remote identifier, also the deduplication key
    pub id: String,
    pub name: String,
    pub owner: String,
    pub url: String,
    pub metadata: RepositoryPayload,
    pub category_ids: BTreeSet<String>,
    pub saved_at: DateTime<Utc>,
}

impl Repository {
    pub fn from_payload(
        payload: RepositoryPayload,
        category_ids: BTreeSet<String>,
        saved_at: DateTime<Utc>,
    ) -> Result<Self> {
        let id = payload
            .remote_id()
            .ok_or_else(|| Error::validation("repository payload has no usable `id` field"))?;
        let name = payload
            .name()
            .ok_or_else(|| Error::validation(format!("repository {} has no name", id)))?
            .to_string();
        let owner = payload
            .owner()
            .ok_or_else(|| Error::validation(format!("repository {} has no owner", id)))?
            .to_string();
        let url = payload
            .url()
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://github.com/{}/{}", owner, name));

        Ok(Self {
            id,
            name,
            owner,
            url,
            metadata: payload,
            category_ids,
            saved_at,
        })
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn is_uncategorized(&self) -> bool {
        self.category_ids.is_empty()
    }
}

/// User-defined label for saved repositories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    /// Display hint only, never interpreted
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// How selected categories combine when filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterMode {
    /// Repository must carry every selected category
    All,
    /// Repository must carry at least one selected category
    Any,
    /// Repository carries no category at all
    Uncategorized,
}

impl FilterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterMode::All => "ALL",
            FilterMode::Any => "ANY",
            FilterMode::Uncategorized => "UNCATEGORIZED",
        }
    }

    /// ALL and ANY are meaningless without a selection
    pub fn requires_selection(&self) -> bool {
        !matches!(self, FilterMode::Uncategorized)
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "and" => Ok(FilterMode::All),
            "any" | "or" => Ok(FilterMode::Any),
            "uncategorized" | "none" => Ok(FilterMode::Uncategorized),
            other => Err(Error::validation(format!("unknown filter mode '{}'", other))),
        }
    }
}

/// A named, reusable filter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub id: String,
    pub name: String,
    pub category_ids: BTreeSet<String>,
    pub mode: FilterMode,
    pub created_at: DateTime<Utc>,
}

/// Ordering applied by callers before filtering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Order in which repositories were saved
    #[default]
    Saved,
    Stars,
    Forks,
    Updated,
    Name,
}

impl FromStr for SortBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "saved" => Ok(SortBy::Saved),
            "stars" => Ok(SortBy::Stars),
            "forks" => Ok(SortBy::Forks),
            "updated" => Ok(SortBy::Updated),
            "name" => Ok(SortBy::Name),
            other => Err(Error::validation(format!("unknown sort key '{}'", other))),
        }
    }
}

/// Stable sort; counts and timestamps descending, names ascending
pub fn sort_repositories(repos: &mut [Repository], sort_by: SortBy) {
    match sort_by {
        SortBy::Saved => repos.sort_by(|a, b| a.saved_at.cmp(&b.saved_at)),
        SortBy::Stars => repos.sort_by(|a, b| b.metadata.stars().cmp(&a.metadata.stars())),
        SortBy::Forks => repos.sort_by(|a, b| b.metadata.forks().cmp(&a.metadata.forks())),
        SortBy::Updated => {
            repos.sort_by(|a, b| b.metadata.updated_at().cmp(&a.metadata.updated_at()))
        }
        SortBy::Name => repos.sort_by_key(|r| r.full_name().to_lowercase()),
    }
}

/// Trim a user-supplied name; empty names are rejected
pub fn normalize_name(entity: &str, name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{} name must not be empty", entity)));
    }
    Ok(trimmed.to_string())
}

/// Short prefixed identifier, e.g. `cat_3f9a0c1b2d4e`
pub fn new_id(prefix: &str) -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &raw[..12])
}
