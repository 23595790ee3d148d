//! Reference counting of taxonomy terms.
//!
//! Every store keeps one count per `(taxonomy, term)` equal to the number of live posts
//! carrying that term. Entries are created on first reference and dropped when the count
//! reaches zero, so enumerating terms never has to scan posts.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;

use serde::Serialize;

use crate::domain::Post;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxonomyCount {
    pub taxonomy: String,
    pub term: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonomyCounter {
    counts: BTreeMap<String, BTreeMap<String, u64>>,
}

impl TaxonomyCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, taxonomy: &str, term: &str) -> u64 {
        let count = self
            .counts
            .entry(taxonomy.to_string())
            .or_default()
            .entry(term.to_string())
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Returns `false` when no entry existed, which callers treat as drift.
    pub fn decrement(&mut self, taxonomy: &str, term: &str) -> bool {
        let Some(terms) = self.counts.get_mut(taxonomy) else {
            return false;
        };
        let Some(count) = terms.get_mut(term) else {
            return false;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            terms.remove(term);
            if terms.is_empty() {
                self.counts.remove(taxonomy);
            }
        }
        true
    }

    pub fn count(&self, taxonomy: &str, term: &str) -> u64 {
        self.counts
            .get(taxonomy)
            .and_then(|terms| terms.get(term))
            .copied()
            .unwrap_or(0)
    }

    pub fn terms_of(&self, taxonomy: &str) -> Vec<String> {
        self.counts
            .get(taxonomy)
            .map(|terms| terms.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn term_counts(&self, taxonomy: &str) -> Vec<TaxonomyCount> {
        self.counts
            .get(taxonomy)
            .map(|terms| {
                terms
                    .iter()
                    .map(|(term, count)| TaxonomyCount {
                        taxonomy: taxonomy.to_string(),
                        term: term.clone(),
                        count: *count,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn taxonomies(&self) -> Vec<String> {
        self.counts.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

/// Term changes between two versions of a post.
///
/// Terms present in both versions appear in neither list, so their counts are never
/// touched during an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonomyDiff {
    pub added: Vec<(String, String)>,
    pub removed: Vec<(String, String)>,
}

impl TaxonomyDiff {
    pub fn between(old: &Post, new: &Post) -> Self {
        let before: BTreeSet<(&str, &str)> = old.taxonomy_pairs().collect();
        let after: BTreeSet<(&str, &str)> = new.taxonomy_pairs().collect();
        Self {
            added: owned(after.difference(&before)),
            removed: owned(before.difference(&after)),
        }
    }

    /// Diff for a brand new post.
    pub fn added(post: &Post) -> Self {
        Self {
            added: owned(post.taxonomy_pairs().collect::<BTreeSet<_>>().iter()),
            removed: Vec::new(),
        }
    }

    /// Diff for a deleted post.
    pub fn removed(post: &Post) -> Self {
        Self {
            added: Vec::new(),
            removed: owned(post.taxonomy_pairs().collect::<BTreeSet<_>>().iter()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Apply to any count storage, returning the pairs whose decrement found no entry.
    pub fn apply_to<C: TermCounts>(&self, counts: &mut C) -> Result<Vec<(String, String)>, C::Error> {
        let mut missing = Vec::new();
        for (taxonomy, term) in &self.removed {
            if !counts.decrement(taxonomy, term)? {
                missing.push((taxonomy.clone(), term.clone()));
            }
        }
        for (taxonomy, term) in &self.added {
            counts.increment(taxonomy, term)?;
        }
        Ok(missing)
    }

    pub fn apply(&self, counter: &mut TaxonomyCounter) -> Vec<(String, String)> {
        match self.apply_to(counter) {
            Ok(missing) => missing,
            Err(never) => match never {},
        }
    }
}

/// Storage for per-term counts.
pub trait TermCounts {
    type Error;

    fn increment(&mut self, taxonomy: &str, term: &str) -> Result<(), Self::Error>;

    /// Decrement, removing the entry at zero. `Ok(false)` when no entry existed.
    fn decrement(&mut self, taxonomy: &str, term: &str) -> Result<bool, Self::Error>;
}

impl TermCounts for TaxonomyCounter {
    type Error = Infallible;

    fn increment(&mut self, taxonomy: &str, term: &str) -> Result<(), Infallible> {
        TaxonomyCounter::increment(self, taxonomy, term);
        Ok(())
    }

    fn decrement(&mut self, taxonomy: &str, term: &str) -> Result<bool, Infallible> {
        Ok(TaxonomyCounter::decrement(self, taxonomy, term))
    }
}

fn owned<'a, 'b: 'a>(pairs: impl Iterator<Item = &'a (&'b str, &'b str)>) -> Vec<(String, String)> {
    pairs
        .map(|(taxonomy, term)| (taxonomy.to_string(), term.to_string()))
        .collect()
}
