use sqlx::{SqliteConnection, SqlitePool};

use crate::application::filter::post_tokens;
use crate::application::repos::StoreError;
use crate::application::taxonomy::TaxonomyDiff;
use crate::domain::{Post, PostId};

use super::map_sqlx_error;
use super::query::decode;
use super::util::sort_key;

type Drift = Vec<(String, String)>;

pub(super) async fn create(pool: &SqlitePool, post: &Post) -> Result<Drift, StoreError> {
    let id = post.id();
    let mut tx = pool
        .begin()
        .await
        .map_err(map_sqlx_error("create", Some(&id)))?;

    if load(&mut tx, &id, "create").await?.is_some() {
        return Err(StoreError::already_exists(&id));
    }
    insert_rows(&mut tx, post, "create").await?;
    let drift = apply_counts(&mut tx, &TaxonomyDiff::added(post), "create").await?;

    tx.commit()
        .await
        .map_err(map_sqlx_error("create", Some(&id)))?;
    Ok(drift)
}

pub(super) async fn update(
    pool: &SqlitePool,
    old_id: &PostId,
    post: &Post,
) -> Result<Drift, StoreError> {
    let new_id = post.id();
    let mut tx = pool
        .begin()
        .await
        .map_err(map_sqlx_error("update", Some(old_id)))?;

    let previous = load(&mut tx, old_id, "update")
        .await?
        .ok_or_else(|| StoreError::not_found(old_id))?;
    if new_id != *old_id && load(&mut tx, &new_id, "update").await?.is_some() {
        return Err(StoreError::already_exists(&new_id));
    }

    delete_rows(&mut tx, old_id, "update").await?;
    insert_rows(&mut tx, post, "update").await?;
    let drift = apply_counts(&mut tx, &TaxonomyDiff::between(&previous, post), "update").await?;

    tx.commit()
        .await
        .map_err(map_sqlx_error("update", Some(old_id)))?;
    Ok(drift)
}

pub(super) async fn delete(pool: &SqlitePool, id: &PostId) -> Result<Drift, StoreError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(map_sqlx_error("delete", Some(id)))?;

    let previous = load(&mut tx, id, "delete")
        .await?
        .ok_or_else(|| StoreError::not_found(id))?;
    delete_rows(&mut tx, id, "delete").await?;
    let drift = apply_counts(&mut tx, &TaxonomyDiff::removed(&previous), "delete").await?;

    tx.commit()
        .await
        .map_err(map_sqlx_error("delete", Some(id)))?;
    Ok(drift)
}

async fn load(
    conn: &mut SqliteConnection,
    id: &PostId,
    op: &'static str,
) -> Result<Option<Post>, StoreError> {
    let document: Option<String> =
        sqlx::query_scalar("SELECT document FROM posts WHERE post_id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|err| StoreError::backend(op, Some(id), err))?;
    document.map(|raw| decode(&raw, op)).transpose()
}

async fn insert_rows(
    conn: &mut SqliteConnection,
    post: &Post,
    op: &'static str,
) -> Result<(), StoreError> {
    let id = post.id();
    let key = id.to_string();
    let backend = |err: sqlx::Error| StoreError::backend(op, Some(&id), err);
    let document =
        serde_json::to_string(post).map_err(|err| StoreError::backend(op, Some(&id), err))?;

    sqlx::query(
        r#"
        INSERT INTO posts (
            post_id, post_type, slug, title, author, status, visibility, pinned,
            published_key, created_key, updated_key, document
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&key)
    .bind(&post.post_type)
    .bind(&post.slug)
    .bind(&post.title)
    .bind(&post.author)
    .bind(post.status.as_str())
    .bind(post.visibility.as_str())
    .bind(post.pinned)
    .bind(sort_key(post.published))
    .bind(sort_key(post.created))
    .bind(sort_key(post.updated))
    .bind(&document)
    .execute(&mut *conn)
    .await
    .map_err(backend)?;

    for (name, value) in &post.properties {
        sqlx::query("INSERT INTO post_properties (post_id, key, value) VALUES (?, ?, ?)")
            .bind(&key)
            .bind(name)
            .bind(value)
            .execute(&mut *conn)
            .await
            .map_err(backend)?;
    }

    for (taxonomy, term) in post.taxonomy_pairs() {
        sqlx::query("INSERT INTO post_terms (post_id, taxonomy, term) VALUES (?, ?, ?)")
            .bind(&key)
            .bind(taxonomy)
            .bind(term)
            .execute(&mut *conn)
            .await
            .map_err(backend)?;
    }

    let body = post_tokens(post).collect::<Vec<_>>().join(" ");
    sqlx::query("INSERT INTO posts_fts (post_id, body) VALUES (?, ?)")
        .bind(&key)
        .bind(body)
        .execute(&mut *conn)
        .await
        .map_err(backend)?;

    Ok(())
}

async fn delete_rows(
    conn: &mut SqliteConnection,
    id: &PostId,
    op: &'static str,
) -> Result<(), StoreError> {
    let key = id.to_string();
    for statement in [
        "DELETE FROM posts_fts WHERE post_id = ?",
        "DELETE FROM post_terms WHERE post_id = ?",
        "DELETE FROM post_properties WHERE post_id = ?",
        "DELETE FROM posts WHERE post_id = ?",
    ] {
        sqlx::query(statement)
            .bind(&key)
            .execute(&mut *conn)
            .await
            .map_err(|err| StoreError::backend(op, Some(id), err))?;
    }
    Ok(())
}

/// Removals run before additions. Returns the pairs whose decrement found no row.
async fn apply_counts(
    conn: &mut SqliteConnection,
    diff: &TaxonomyDiff,
    op: &'static str,
) -> Result<Drift, StoreError> {
    let backend = |err: sqlx::Error| StoreError::backend(op, None, err);
    let mut drift = Vec::new();

    for (taxonomy, term) in &diff.removed {
        let lowered = sqlx::query(
            "UPDATE taxonomy_counts SET count = count - 1 \
             WHERE taxonomy = ? AND term = ? AND count > 1",
        )
        .bind(taxonomy)
        .bind(term)
        .execute(&mut *conn)
        .await
        .map_err(backend)?;
        if lowered.rows_affected() > 0 {
            continue;
        }

        let removed = sqlx::query("DELETE FROM taxonomy_counts WHERE taxonomy = ? AND term = ?")
            .bind(taxonomy)
            .bind(term)
            .execute(&mut *conn)
            .await
            .map_err(backend)?;
        if removed.rows_affected() == 0 {
            drift.push((taxonomy.clone(), term.clone()));
        }
    }

    for (taxonomy, term) in &diff.added {
        sqlx::query(
            "INSERT INTO taxonomy_counts (taxonomy, term, count) VALUES (?, ?, 1) \
             ON CONFLICT (taxonomy, term) DO UPDATE SET count = count + 1",
        )
        .bind(taxonomy)
        .bind(term)
        .execute(&mut *conn)
        .await
        .map_err(backend)?;
    }

    Ok(drift)
}
