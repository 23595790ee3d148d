//! The same behavioural suite run against every store backend.

mod common;

use std::sync::Arc;

use postindex::application::filter::{FilterRequest, KeyValue, Selector};
use postindex::application::observer::NoopObserver;
use postindex::application::repos::Store;
use postindex::application::taxonomy::TaxonomyCount;
use postindex::domain::{Post, PostId, PostStatus, Visibility};
use postindex::infra::db::SqliteStore;
use postindex::infra::kv::RedbStore;
use postindex::infra::memory::MemoryStore;
use tempfile::TempDir;
use time::macros::datetime;

use common::published;

struct Backend {
    name: &'static str,
    store: Arc<dyn Store>,
    _dir: Option<TempDir>,
}

async fn backends() -> Vec<Backend> {
    let memory: Arc<dyn Store> = Arc::new(MemoryStore::new(Arc::new(NoopObserver)));

    let dir = TempDir::new().expect("tempdir");
    let redb: Arc<dyn Store> = Arc::new(RedbStore::new(dir.path(), Arc::new(NoopObserver)));

    let pool = SqliteStore::connect("sqlite::memory:", 1)
        .await
        .expect("sqlite pool");
    let sqlite: Arc<dyn Store> = Arc::new(SqliteStore::new(pool, Arc::new(NoopObserver)));

    let backends = vec![
        Backend {
            name: "memory",
            store: memory,
            _dir: None,
        },
        Backend {
            name: "redb",
            store: redb,
            _dir: Some(dir),
        },
        Backend {
            name: "sqlite",
            store: sqlite,
            _dir: None,
        },
    ];
    for backend in &backends {
        backend.store.init().await.expect(backend.name);
    }
    backends
}

fn slugs(posts: &[Post]) -> Vec<&str> {
    posts.iter().map(|post| post.slug.as_str()).collect()
}

fn counts(pairs: &[(&str, u64)], taxonomy: &str) -> Vec<TaxonomyCount> {
    pairs
        .iter()
        .map(|(term, count)| TaxonomyCount {
            taxonomy: taxonomy.to_string(),
            term: term.to_string(),
            count: *count,
        })
        .collect()
}

/// Five articles and a note with distinct dates, terms and properties.
fn corpus() -> Vec<Post> {
    let mut rust = published("articles", "rust-ownership")
        .with_terms("tags", ["rust", "memory"])
        .with_terms("series", ["basics"]);
    rust.title = "Ownership in Rust".into();
    rust.author = "Ada Lovelace".into();
    rust.content = "Borrowing rules keep references valid.".into();
    rust.published = Some(datetime!(2024-01-10 9:00 UTC));
    rust.properties.insert("lang".into(), "en".into());

    let mut async_post = published("articles", "async-runtime").with_terms("tags", ["rust", "async"]);
    async_post.title = "Inside an async runtime".into();
    async_post.author = "Grace Hopper".into();
    async_post.content = "Executors poll futures until they complete.".into();
    async_post.published = Some(datetime!(2024-02-01 9:00 UTC));
    async_post.pinned = true;
    async_post.properties.insert("lang".into(), "en".into());

    let mut go = published("articles", "go-channels").with_terms("tags", ["go"]);
    go.title = "Channels".into();
    go.author = "Ada Lovelace".into();
    go.published = Some(datetime!(2023-12-24 9:00 UTC));
    go.properties.insert("lang".into(), "de".into());

    let mut draft = published("articles", "draft-idea").with_terms("tags", ["rust"]);
    draft.status = PostStatus::Draft;
    draft.published = Some(datetime!(2024-03-01 9:00 UTC));

    let mut private = published("articles", "private-notes");
    private.visibility = Visibility::Private;
    private.published = Some(datetime!(2024-03-02 9:00 UTC));

    let mut note = published("notes", "scratch").with_terms("tags", ["rust"]);
    note.published = Some(datetime!(2024-01-01 9:00 UTC));

    vec![rust, async_post, go, draft, private, note]
}

async fn seed(store: &dyn Store) {
    for post in corpus() {
        store.create(post).await.expect("seed");
    }
}

#[tokio::test]
async fn create_get_and_duplicate_ids() {
    for backend in backends().await {
        let store = backend.store.as_ref();
        let post = corpus().remove(0);
        let created = store.create(post.clone()).await.expect(backend.name);
        assert_eq!(created, post, "{}", backend.name);
        assert_eq!(store.get(&post.id()).await.expect(backend.name), post);

        let err = store.create(post.clone()).await.unwrap_err();
        assert!(err.is_already_exists(), "{}: {err}", backend.name);

        let missing = PostId::new("articles", "missing");
        assert!(store.get(&missing).await.unwrap_err().is_not_found());
    }
}

#[tokio::test]
async fn update_rewrites_terms_and_moves_ids() {
    for backend in backends().await {
        let store = backend.store.as_ref();
        seed(store).await;
        let old = corpus().remove(0);

        let mut renamed = old.clone();
        renamed.slug = "ownership".into();
        renamed.taxonomies.remove("series");
        renamed.taxonomies.insert("tags".into(), ["rust".to_string()].into());
        store
            .update(&old.id(), renamed.clone())
            .await
            .expect(backend.name);

        assert!(store.get(&old.id()).await.unwrap_err().is_not_found());
        assert_eq!(store.get(&renamed.id()).await.expect(backend.name), renamed);
        assert_eq!(
            store.list_term_counts("tags").await.expect(backend.name),
            counts(&[("async", 1), ("go", 1), ("rust", 4)], "tags"),
            "{}",
            backend.name
        );
        assert_eq!(
            store.list_taxonomies().await.expect(backend.name),
            vec!["tags"],
            "{}",
            backend.name
        );

        let err = store
            .update(&PostId::new("articles", "gone"), published("articles", "gone"))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{}: {err}", backend.name);

        let onto = published("articles", "go-channels");
        let err = store.update(&renamed.id(), onto).await.unwrap_err();
        assert!(err.is_already_exists(), "{}: {err}", backend.name);
        assert_eq!(store.get(&renamed.id()).await.expect(backend.name), renamed);
    }
}

#[tokio::test]
async fn delete_drops_counts_that_reach_zero() {
    for backend in backends().await {
        let store = backend.store.as_ref();
        seed(store).await;

        store
            .delete(&PostId::new("articles", "go-channels"))
            .await
            .expect(backend.name);
        store
            .delete(&PostId::new("articles", "rust-ownership"))
            .await
            .expect(backend.name);

        assert_eq!(
            store.list_terms("tags").await.expect(backend.name),
            vec!["async", "rust"],
            "{}",
            backend.name
        );
        assert!(
            !store
                .list_taxonomies()
                .await
                .expect(backend.name)
                .contains(&"series".to_string()),
            "{}",
            backend.name
        );

        let err = store
            .delete(&PostId::new("articles", "go-channels"))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{}: {err}", backend.name);
    }
}

#[tokio::test]
async fn default_search_is_published_public_in_default_order() {
    for backend in backends().await {
        let store = backend.store.as_ref();
        seed(store).await;

        let results = store
            .search(&FilterRequest::default())
            .await
            .expect(backend.name);
        assert_eq!(results.total, 4, "{}", backend.name);
        assert_eq!(
            slugs(&results.posts),
            vec!["async-runtime", "rust-ownership", "scratch", "go-channels"],
            "{}",
            backend.name
        );
    }
}

#[tokio::test]
async fn attribute_filters_combine() {
    for backend in backends().await {
        let store = backend.store.as_ref();
        seed(store).await;

        let request = FilterRequest {
            post_type: Some("articles".into()),
            author: Some("Ada".into()),
            properties: vec![KeyValue::new("lang", "en")],
            ..FilterRequest::default()
        };
        let results = store.search(&request).await.expect(backend.name);
        assert_eq!(slugs(&results.posts), vec!["rust-ownership"], "{}", backend.name);

        let request = FilterRequest {
            taxonomies: vec![KeyValue::new("tags", "rust")],
            status: Selector::Any,
            ..FilterRequest::default()
        };
        let results = store.search(&request).await.expect(backend.name);
        assert_eq!(
            slugs(&results.posts),
            vec!["async-runtime", "draft-idea", "rust-ownership", "scratch"],
            "{}",
            backend.name
        );

        let request = FilterRequest {
            visibility: Selector::Exactly(Visibility::Private),
            ..FilterRequest::default()
        };
        let results = store.search(&request).await.expect(backend.name);
        assert_eq!(slugs(&results.posts), vec!["private-notes"], "{}", backend.name);

        let request = FilterRequest {
            author: Some("ada".into()),
            ..FilterRequest::default()
        };
        let results = store.search(&request).await.expect(backend.name);
        assert_eq!(results.total, 0, "author match is case-sensitive on {}", backend.name);
    }
}

#[tokio::test]
async fn text_search_prefix_matches_every_token() {
    for backend in backends().await {
        let store = backend.store.as_ref();
        seed(store).await;

        let request = FilterRequest {
            search: "borrow REF".into(),
            ..FilterRequest::default()
        };
        let results = store.search(&request).await.expect(backend.name);
        assert_eq!(slugs(&results.posts), vec!["rust-ownership"], "{}", backend.name);

        let request = FilterRequest {
            search: "borrow futures".into(),
            ..FilterRequest::default()
        };
        let results = store.search(&request).await.expect(backend.name);
        assert_eq!(results.total, 0, "{}", backend.name);
    }
}

#[tokio::test]
async fn explicit_sort_and_pagination() {
    for backend in backends().await {
        let store = backend.store.as_ref();
        seed(store).await;

        let request = FilterRequest {
            sort: vec!["title".into()],
            page: 2,
            page_size: 2,
            ..FilterRequest::default()
        };
        let results = store.search(&request).await.expect(backend.name);
        assert_eq!(results.total, 4, "{}", backend.name);
        // Channels, Inside an async runtime, Ownership in Rust, Title of scratch.
        assert_eq!(
            slugs(&results.posts),
            vec!["rust-ownership", "scratch"],
            "{}",
            backend.name
        );

        let request = FilterRequest {
            page: 9,
            page_size: 2,
            ..FilterRequest::default()
        };
        let results = store.search(&request).await.expect(backend.name);
        assert_eq!(results.total, 4, "{}", backend.name);
        assert!(results.posts.is_empty(), "{}", backend.name);
    }
}

#[tokio::test]
async fn dates_outside_the_nanosecond_range_sort_correctly() {
    for backend in backends().await {
        let store = backend.store.as_ref();
        let mut old = published("articles", "calendar-reform");
        old.published = Some(datetime!(1600-01-01 0:00 UTC));
        old.created = old.published;
        let mut epoch = published("articles", "epoch-eve");
        epoch.published = Some(datetime!(1969-12-31 23:00 UTC));
        let mut future = published("articles", "far-future");
        future.published = Some(datetime!(2300-07-04 12:00 UTC));

        for post in [old.clone(), epoch, future] {
            store.create(post).await.expect(backend.name);
        }
        assert_eq!(store.get(&old.id()).await.expect(backend.name), old);

        let results = store
            .search(&FilterRequest::default())
            .await
            .expect(backend.name);
        assert_eq!(
            slugs(&results.posts),
            vec!["far-future", "epoch-eve", "calendar-reform"],
            "{}",
            backend.name
        );

        let results = store
            .search(&FilterRequest {
                sort: vec!["published".into()],
                ..FilterRequest::default()
            })
            .await
            .expect(backend.name);
        assert_eq!(
            slugs(&results.posts),
            vec!["calendar-reform", "epoch-eve", "far-future"],
            "{}",
            backend.name
        );
    }
}

#[tokio::test]
async fn split_pinned_returns_pinned_ahead_of_window() {
    for backend in backends().await {
        let store = backend.store.as_ref();
        seed(store).await;

        let request = FilterRequest {
            split_pinned: true,
            page: 2,
            page_size: 2,
            ..FilterRequest::default()
        };
        let results = store.search(&request).await.expect(backend.name);
        assert_eq!(results.total, 4, "{}", backend.name);
        assert_eq!(
            slugs(&results.posts),
            vec!["async-runtime", "go-channels"],
            "{}",
            backend.name
        );
    }
}

#[tokio::test]
async fn clear_empties_posts_and_counts() {
    for backend in backends().await {
        let store = backend.store.as_ref();
        seed(store).await;
        store.clear().await.expect(backend.name);

        let results = store
            .search(&FilterRequest {
                status: Selector::Any,
                visibility: Selector::Any,
                ..FilterRequest::default()
            })
            .await
            .expect(backend.name);
        assert_eq!(results.total, 0, "{}", backend.name);
        assert!(store.list_taxonomies().await.expect(backend.name).is_empty());

        // The store stays usable after a clear.
        seed(store).await;
        assert_eq!(
            store.list_term_counts("series").await.expect(backend.name),
            counts(&[("basics", 1)], "series")
        );
        store.close().await.expect(backend.name);
    }
}
