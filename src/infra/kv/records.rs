//! Canonical post records and taxonomy counts, committed together.

use std::collections::BTreeSet;

use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition};

use crate::application::repos::StoreError;
use crate::application::taxonomy::{TaxonomyCount, TaxonomyDiff, TermCounts};
use crate::domain::{Post, PostId};

use super::KvError;

/// `type/slug` -> JSON encoded [`Post`].
const POSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("posts");
/// `(taxonomy, term)` -> number of live posts carrying the term.
const TAXONOMY_COUNTS: TableDefinition<(&str, &str), u64> =
    TableDefinition::new("taxonomy_counts");

/// Pairs whose decrement found no stored count.
pub(super) type Drift = Vec<(String, String)>;

pub(super) fn ensure_tables(db: &Database) -> Result<(), KvError> {
    let txn = db.begin_write()?;
    txn.open_table(POSTS)?;
    txn.open_table(TAXONOMY_COUNTS)?;
    txn.commit()?;
    Ok(())
}

pub(super) fn clear(db: &Database) -> Result<(), KvError> {
    let txn = db.begin_write()?;
    txn.delete_table(POSTS)?;
    txn.delete_table(TAXONOMY_COUNTS)?;
    txn.open_table(POSTS)?;
    txn.open_table(TAXONOMY_COUNTS)?;
    txn.commit()?;
    Ok(())
}

struct CountTable<'a, 'txn> {
    table: &'a mut Table<'txn, (&'static str, &'static str), u64>,
}

impl TermCounts for CountTable<'_, '_> {
    type Error = KvError;

    fn increment(&mut self, taxonomy: &str, term: &str) -> Result<(), KvError> {
        let current = self
            .table
            .get((taxonomy, term))?
            .map(|count| count.value())
            .unwrap_or(0);
        self.table.insert((taxonomy, term), current + 1)?;
        Ok(())
    }

    fn decrement(&mut self, taxonomy: &str, term: &str) -> Result<bool, KvError> {
        let current = match self.table.get((taxonomy, term))? {
            Some(count) => count.value(),
            None => return Ok(false),
        };
        if current <= 1 {
            self.table.remove((taxonomy, term))?;
        } else {
            self.table.insert((taxonomy, term), current - 1)?;
        }
        Ok(true)
    }
}

fn encode(post: &Post) -> Result<Vec<u8>, KvError> {
    Ok(serde_json::to_vec(post)?)
}

fn decode(bytes: &[u8]) -> Result<Post, KvError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub(super) fn create(db: &Database, post: &Post) -> Result<Drift, KvError> {
    let id = post.id().to_string();
    let txn = db.begin_write()?;
    let drift = {
        let mut posts = txn.open_table(POSTS)?;
        if posts.get(id.as_str())?.is_some() {
            return Err(StoreError::already_exists(&post.id()).into());
        }
        posts.insert(id.as_str(), encode(post)?.as_slice())?;
        let mut counts = txn.open_table(TAXONOMY_COUNTS)?;
        TaxonomyDiff::added(post).apply_to(&mut CountTable { table: &mut counts })?
    };
    txn.commit()?;
    Ok(drift)
}

pub(super) fn update(db: &Database, old_id: &PostId, post: &Post) -> Result<Drift, KvError> {
    let old_key = old_id.to_string();
    let new_id = post.id();
    let new_key = new_id.to_string();
    let txn = db.begin_write()?;
    let drift = {
        let mut posts = txn.open_table(POSTS)?;
        let previous = match posts.get(old_key.as_str())? {
            Some(bytes) => decode(bytes.value())?,
            None => return Err(StoreError::not_found(old_id).into()),
        };
        if new_key != old_key && posts.get(new_key.as_str())?.is_some() {
            return Err(StoreError::already_exists(&new_id).into());
        }
        posts.remove(old_key.as_str())?;
        posts.insert(new_key.as_str(), encode(post)?.as_slice())?;
        let mut counts = txn.open_table(TAXONOMY_COUNTS)?;
        TaxonomyDiff::between(&previous, post).apply_to(&mut CountTable { table: &mut counts })?
    };
    txn.commit()?;
    Ok(drift)
}

pub(super) fn delete(db: &Database, id: &PostId) -> Result<Drift, KvError> {
    let key = id.to_string();
    let txn = db.begin_write()?;
    let drift = {
        let mut posts = txn.open_table(POSTS)?;
        let previous = match posts.remove(key.as_str())? {
            Some(bytes) => decode(bytes.value())?,
            None => return Err(StoreError::not_found(id).into()),
        };
        let mut counts = txn.open_table(TAXONOMY_COUNTS)?;
        TaxonomyDiff::removed(&previous).apply_to(&mut CountTable { table: &mut counts })?
    };
    txn.commit()?;
    Ok(drift)
}

pub(super) fn get(db: &Database, id: &PostId) -> Result<Post, KvError> {
    let txn = db.begin_read()?;
    let posts = txn.open_table(POSTS)?;
    match posts.get(id.to_string().as_str())? {
        Some(bytes) => decode(bytes.value()),
        None => Err(StoreError::not_found(id).into()),
    }
}

pub(super) fn all(db: &Database) -> Result<Vec<Post>, KvError> {
    let txn = db.begin_read()?;
    let posts = txn.open_table(POSTS)?;
    let mut out = Vec::new();
    for entry in posts.iter()? {
        let (_, bytes) = entry?;
        out.push(decode(bytes.value())?);
    }
    Ok(out)
}

/// Records for `ids`; ids without a record are skipped.
pub(super) fn many(db: &Database, ids: &BTreeSet<String>) -> Result<Vec<Post>, KvError> {
    let txn = db.begin_read()?;
    let posts = txn.open_table(POSTS)?;
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(bytes) = posts.get(id.as_str())? {
            out.push(decode(bytes.value())?);
        }
    }
    Ok(out)
}

pub(super) fn taxonomies(db: &Database) -> Result<Vec<String>, KvError> {
    let txn = db.begin_read()?;
    let counts = txn.open_table(TAXONOMY_COUNTS)?;
    let mut names: Vec<String> = Vec::new();
    for entry in counts.iter()? {
        let (key, _) = entry?;
        let (taxonomy, _) = key.value();
        if names.last().map(String::as_str) != Some(taxonomy) {
            names.push(taxonomy.to_string());
        }
    }
    Ok(names)
}

pub(super) fn term_counts(db: &Database, taxonomy: &str) -> Result<Vec<TaxonomyCount>, KvError> {
    let txn = db.begin_read()?;
    let counts = txn.open_table(TAXONOMY_COUNTS)?;
    let mut out = Vec::new();
    for entry in counts.range((taxonomy, "")..)? {
        let (key, count) = entry?;
        let (name, term) = key.value();
        if name != taxonomy {
            break;
        }
        out.push(TaxonomyCount {
            taxonomy: taxonomy.to_string(),
            term: term.to_string(),
            count: count.value(),
        });
    }
    Ok(out)
}
