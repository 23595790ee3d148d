//! Token index kept in its own database file.
//!
//! Updated after the canonical records commit. A failure here leaves the index stale for
//! the affected post until the next resync; the records stay authoritative.

use std::collections::BTreeSet;

use redb::{Database, ReadableDatabase, TableDefinition, WriteTransaction};

use crate::application::filter::post_tokens;
use crate::domain::Post;

use super::KvError;

/// `(token, post id)` -> nothing; the key is the posting.
const POSTINGS: TableDefinition<(&str, &str), ()> = TableDefinition::new("postings");
/// post id -> JSON list of the tokens posted for it.
const DOC_TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("doc_tokens");

pub(super) fn ensure_tables(db: &Database) -> Result<(), KvError> {
    let txn = db.begin_write()?;
    txn.open_table(POSTINGS)?;
    txn.open_table(DOC_TOKENS)?;
    txn.commit()?;
    Ok(())
}

pub(super) fn clear(db: &Database) -> Result<(), KvError> {
    let txn = db.begin_write()?;
    txn.delete_table(POSTINGS)?;
    txn.delete_table(DOC_TOKENS)?;
    txn.open_table(POSTINGS)?;
    txn.open_table(DOC_TOKENS)?;
    txn.commit()?;
    Ok(())
}

fn unindex(txn: &WriteTransaction, id: &str) -> Result<(), KvError> {
    let mut docs = txn.open_table(DOC_TOKENS)?;
    let tokens: Vec<String> = match docs.remove(id)? {
        Some(bytes) => serde_json::from_slice(bytes.value())?,
        None => return Ok(()),
    };
    let mut postings = txn.open_table(POSTINGS)?;
    for token in &tokens {
        postings.remove((token.as_str(), id))?;
    }
    Ok(())
}

fn index(txn: &WriteTransaction, id: &str, post: &Post) -> Result<(), KvError> {
    let tokens: BTreeSet<String> = post_tokens(post).collect();
    let mut postings = txn.open_table(POSTINGS)?;
    for token in &tokens {
        postings.insert((token.as_str(), id), ())?;
    }
    let mut docs = txn.open_table(DOC_TOKENS)?;
    docs.insert(id, serde_json::to_vec(&tokens)?.as_slice())?;
    Ok(())
}

/// Replace whatever is indexed under `old_id` with `post` at its own id.
pub(super) fn reindex(db: &Database, old_id: &str, post: &Post) -> Result<(), KvError> {
    let txn = db.begin_write()?;
    unindex(&txn, old_id)?;
    index(&txn, &post.id().to_string(), post)?;
    txn.commit()?;
    Ok(())
}

pub(super) fn remove(db: &Database, id: &str) -> Result<(), KvError> {
    let txn = db.begin_write()?;
    unindex(&txn, id)?;
    txn.commit()?;
    Ok(())
}

/// Ids whose indexed tokens cover every query token by prefix.
pub(super) fn candidates(db: &Database, query: &[String]) -> Result<BTreeSet<String>, KvError> {
    let txn = db.begin_read()?;
    let postings = txn.open_table(POSTINGS)?;
    let mut result: Option<BTreeSet<String>> = None;

    for prefix in query {
        let mut ids = BTreeSet::new();
        for entry in postings.range((prefix.as_str(), "")..)? {
            let (key, _) = entry?;
            let (token, id) = key.value();
            if !token.starts_with(prefix.as_str()) {
                break;
            }
            ids.insert(id.to_string());
        }
        let narrowed = match result {
            Some(previous) => previous.intersection(&ids).cloned().collect(),
            None => ids,
        };
        if narrowed.is_empty() {
            return Ok(narrowed);
        }
        result = Some(narrowed);
    }

    Ok(result.unwrap_or_default())
}
