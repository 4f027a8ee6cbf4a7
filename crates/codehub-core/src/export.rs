use crate::models::{Category, Repository};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Markdown,
}

impl ExportFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            "md" | "markdown" => Some(ExportFormat::Markdown),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Markdown => "md",
        }
    }
}

/// One exported row: the saved record with category names resolved
#[derive(Debug, Serialize)]
struct ExportedRepository<'a> {
    id: &'a str,
    full_name: String,
    url: &'a str,
    stars: u64,
    forks: u64,
    language: Option<&'a str>,
    description: Option<&'a str>,
    categories: Vec<&'a str>,
    saved_at: String,
}

/// Writes a list of saved repositories (typically an applied view) to disk
pub struct Exporter<'a> {
    category_names: HashMap<&'a str, &'a str>,
}

impl<'a> Exporter<'a> {
    pub fn new(categories: &'a [Category]) -> Self {
        Self {
            category_names: categories
                .iter()
                .map(|c| (c.id.as_str(), c.name.as_str()))
                .collect(),
        }
    }

    /// Export with the format picked from the file extension
    pub fn export_to_file<P: AsRef<Path>>(&self, repos: &[Repository], path: P) -> Result<()> {
        let path = path.as_ref();
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ExportFormat::from_extension)
            .ok_or_else(|| {
                Error::validation(
                    "could not determine export format from extension; use .json, .csv or .md",
                )
            })?;

        let content = self.render(repos, format)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn render(&self, repos: &[Repository], format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Json => self.to_json(repos),
            ExportFormat::Csv => Ok(self.to_csv(repos)),
            ExportFormat::Markdown => Ok(self.to_markdown(repos)),
        }
    }

    pub fn to_json(&self, repos: &[Repository]) -> Result<String> {
        let rows: Vec<_> = repos.iter().map(|r| self.row(r)).collect();
        Ok(serde_json::to_string_pretty(&rows)?)
    }

    pub fn to_csv(&self, repos: &[Repository]) -> String {
        let mut output = String::from("Id,Name,Stars,Forks,Language,Categories,Saved At,URL\n");

        for repo in repos {
            let row = self.row(repo);
            output.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                escape_csv(row.id),
                escape_csv(&row.full_name),
                row.stars,
                row.forks,
                escape_csv(row.language.unwrap_or("")),
                escape_csv(&row.categories.join("; ")),
                row.saved_at,
                escape_csv(row.url),
            ));
        }

        output
    }

    pub fn to_markdown(&self, repos: &[Repository]) -> String {
        let mut output = String::from("# Saved Repositories\n\n");
        output.push_str(&format!("Total repositories: {}\n\n", repos.len()));
        output.push_str("| Repository | Stars | Language | Categories |\n");
        output.push_str("|---|---:|---|---|\n");

        for repo in repos {
            let row = self.row(repo);
            let categories = if row.categories.is_empty() {
                "_uncategorized_".to_string()
            } else {
                row.categories.join(", ")
            };
            output.push_str(&format!(
                "| [{}]({}) | {} | {} | {} |\n",
                row.full_name.replace('|', "\\|"),
                row.url,
                row.stars,
                row.language.unwrap_or("-"),
                categories.replace('|', "\\|"),
            ));
        }

        output
    }

    fn row<'r>(&'r self, repo: &'r Repository) -> ExportedRepository<'r> {
        let categories = repo
            .category_ids
            .iter()
            .map(|id| self.category_names.get(id.as_str()).copied().unwrap_or(id.as_str()))
            .collect();

        ExportedRepository {
            id: &repo.id,
            full_name: repo.full_name(),
            url: &repo.url,
            stars: repo.metadata.stars(),
            forks: repo.metadata.forks(),
            language: repo.metadata.language(),
            description: repo.metadata.description(),
            categories,
            saved_at: repo.saved_at.format("%Y-%m-%d").to_string(),
        }
    }
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::repo;
    use chrono::Utc;

    fn categories() -> Vec<Category> {
        vec![Category {
            id: "cat_a".into(),
            name: "infra, ops".into(),
            color: None,
            created_at: Utc::now(),
        }]
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ExportFormat::from_extension("JSON"), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_extension("markdown"), Some(ExportFormat::Markdown));
        assert_eq!(ExportFormat::from_extension("xlsx"), None);
        assert_eq!(ExportFormat::Csv.extension(), "csv");
    }

    #[test]
    fn test_csv_resolves_and_escapes_category_names() {
        let cats = categories();
        let exporter = Exporter::new(&cats);
        let csv = exporter.to_csv(&[repo(1, "acme/tool", &["cat_a", "cat_gone"])]);

        let line = csv.lines().nth(1).unwrap();
        assert!(line.starts_with("1,acme/tool,100,10,Rust,"));
        assert!(line.contains("\"infra, ops; cat_gone\""));
    }

    #[test]
    fn test_markdown_marks_uncategorized() {
        let cats = categories();
        let md = Exporter::new(&cats).to_markdown(&[repo(2, "acme/bare", &[])]);
        assert!(md.contains("Total repositories: 1"));
        assert!(md.contains("_uncategorized_"));
    }

    #[test]
    fn test_export_to_file_picks_format() {
        let dir = tempfile::tempdir().unwrap();
        let cats = categories();
        let exporter = Exporter::new(&cats);
        let repos = vec![repo(3, "acme/json", &["cat_a"])];

        let path = dir.path().join("view.json");
        exporter.export_to_file(&repos, &path).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed[0]["categories"][0], "infra, ops");

        let err = exporter
            .export_to_file(&repos, dir.path().join("view.xlsx"))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
