//! Category-based filtering of saved repositories.
//!
//! Filtering is a pure, order-preserving pass over whatever sequence the
//! caller hands in. Category ids are compared as plain strings, so ids that no
//! longer exist in the category store simply never match.

use std::collections::BTreeSet;

use crate::models::{FilterMode, Repository};
use crate::{Error, Result};

/// A validated selection of categories plus how to combine them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFilter {
    category_ids: BTreeSet<String>,
    mode: FilterMode,
}

impl CategoryFilter {
    /// Fails when ALL/ANY is given nothing to match against. The selection
    /// is dropped for UNCATEGORIZED.
    pub fn new(category_ids: BTreeSet<String>, mode: FilterMode) -> Result<Self> {
        check_selection(&category_ids, mode)?;

        let category_ids = if mode.requires_selection() {
            category_ids
        } else {
            BTreeSet::new()
        };

        Ok(Self { category_ids, mode })
    }

    pub fn uncategorized() -> Self {
        Self {
            category_ids: BTreeSet::new(),
            mode: FilterMode::Uncategorized,
        }
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn category_ids(&self) -> &BTreeSet<String> {
        &self.category_ids
    }

    pub fn matches(&self, repo: &Repository) -> bool {
        match self.mode {
            FilterMode::All => self.category_ids.is_subset(&repo.category_ids),
            FilterMode::Any => !self.category_ids.is_disjoint(&repo.category_ids),
            FilterMode::Uncategorized => repo.category_ids.is_empty(),
        }
    }

    /// Keep matching repositories in their original relative order
    pub fn apply<'a, I>(&self, repos: I) -> Vec<&'a Repository>
    where
        I: IntoIterator<Item = &'a Repository>,
    {
        repos.into_iter().filter(|r| self.matches(r)).collect()
    }
}

/// ALL and ANY need at least one selected category
pub fn check_selection(category_ids: &BTreeSet<String>, mode: FilterMode) -> Result<()> {
    if mode.requires_selection() && category_ids.is_empty() {
        return Err(Error::validation(format!(
            "filter mode {} needs at least one category",
            mode
        )));
    }
    Ok(())
}

/// Filter `repos` by `selected` categories combined with `mode`
pub fn evaluate(
    repos: &[Repository],
    selected: &BTreeSet<String>,
    mode: FilterMode,
) -> Result<Vec<Repository>> {
    let filter = CategoryFilter::new(selected.clone(), mode)?;
    Ok(filter.apply(repos).into_iter().cloned().collect())
}
