use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::application::filter::{KeyValue, QueryPlan, SortField};
use crate::application::repos::{SearchResults, StoreError};
use crate::domain::Post;

use super::map_sqlx_error;

pub(super) fn decode(document: &str, op: &'static str) -> Result<Post, StoreError> {
    serde_json::from_str(document).map_err(|err| StoreError::backend(op, None, err))
}

fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::Pinned => "p.pinned",
        SortField::Published => "p.published_key",
        SortField::Title => "p.title",
        SortField::Slug => "p.slug",
        SortField::Id => "p.post_id",
        SortField::Author => "p.author",
        SortField::Created => "p.created_key",
        SortField::Updated => "p.updated_key",
    }
}

/// FTS5 query requiring every token as a prefix, e.g. `"rust"* "async"*`.
fn match_expression(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|token| format!("\"{token}\"*"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, plan: &QueryPlan) {
    if let Some(post_type) = &plan.post_type {
        qb.push(" AND p.post_type = ");
        qb.push_bind(post_type.clone());
    }
    if let Some(status) = plan.status {
        qb.push(" AND p.status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(visibility) = plan.visibility {
        qb.push(" AND p.visibility = ");
        qb.push_bind(visibility.as_str());
    }
    if let Some(author) = &plan.author {
        qb.push(" AND instr(p.author, ");
        qb.push_bind(author.clone());
        qb.push(") > 0");
    }
    for KeyValue { key, value } in &plan.taxonomies {
        qb.push(
            " AND EXISTS (SELECT 1 FROM post_terms t \
             WHERE t.post_id = p.post_id AND t.taxonomy = ",
        );
        qb.push_bind(key.clone());
        qb.push(" AND t.term = ");
        qb.push_bind(value.clone());
        qb.push(")");
    }
    for KeyValue { key, value } in &plan.properties {
        qb.push(
            " AND EXISTS (SELECT 1 FROM post_properties pp \
             WHERE pp.post_id = p.post_id AND pp.key = ",
        );
        qb.push_bind(key.clone());
        qb.push(" AND pp.value = ");
        qb.push_bind(value.clone());
        qb.push(")");
    }
    if !plan.search_tokens.is_empty() {
        qb.push(" AND p.post_id IN (SELECT post_id FROM posts_fts WHERE posts_fts MATCH ");
        qb.push_bind(match_expression(&plan.search_tokens));
        qb.push(")");
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Sqlite>, plan: &QueryPlan) {
    qb.push(" ORDER BY ");
    let mut columns = qb.separated(", ");
    for key in &plan.sort {
        columns.push(sort_column(key.field));
        if key.descending {
            columns.push_unseparated(" DESC");
        }
    }
}

enum Pinned {
    Any,
    Only,
    Excluded,
}

async fn fetch_documents(
    pool: &SqlitePool,
    plan: &QueryPlan,
    pinned: Pinned,
    paginate: bool,
) -> Result<Vec<Post>, StoreError> {
    let mut qb = QueryBuilder::new("SELECT p.document FROM posts p WHERE 1=1 ");
    push_filters(&mut qb, plan);
    match pinned {
        Pinned::Any => {}
        Pinned::Only => {
            qb.push(" AND p.pinned = 1");
        }
        Pinned::Excluded => {
            qb.push(" AND p.pinned = 0");
        }
    }
    push_order(&mut qb, plan);
    if paginate {
        let limit = i64::from(plan.window.size);
        let offset = i64::try_from(plan.window.offset()).unwrap_or(i64::MAX);
        qb.push(" LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);
    }

    let rows: Vec<String> = qb
        .build_query_scalar()
        .fetch_all(pool)
        .await
        .map_err(map_sqlx_error("search", None))?;
    rows.iter().map(|raw| decode(raw, "search")).collect()
}

pub(super) async fn search(pool: &SqlitePool, plan: &QueryPlan) -> Result<SearchResults, StoreError> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p WHERE 1=1 ");
    push_filters(&mut qb, plan);
    let total: i64 = qb
        .build_query_scalar()
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error("search", None))?;
    let total = usize::try_from(total)
        .map_err(|_| StoreError::backend("search", None, "negative row count"))?;

    let posts = if plan.split_pinned {
        let mut posts = fetch_documents(pool, plan, Pinned::Only, false).await?;
        posts.extend(fetch_documents(pool, plan, Pinned::Excluded, true).await?);
        posts
    } else {
        fetch_documents(pool, plan, Pinned::Any, true).await?
    };

    Ok(SearchResults { posts, total })
}
