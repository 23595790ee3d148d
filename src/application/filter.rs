//! Filter, sort and window semantics shared by every store.
//!
//! A [`FilterRequest`] is what callers send. [`QueryPlan`] is the resolved form with
//! defaults applied. In-process backends evaluate the plan directly through
//! [`QueryPlan::execute`]; the SQL backend translates the same plan into a query and must
//! agree with it on every case.

use std::{borrow::Borrow, cmp::Ordering, iter, str::FromStr};

use serde::{Deserialize, Deserializer};

use crate::application::pagination::{DEFAULT_PAGE_SIZE, PageWindow};
use crate::application::repos::SearchResults;
use crate::domain::{ANY, DomainError, Post, PostStatus, Visibility};

/// A status or visibility filter as supplied by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector<T> {
    /// Nothing supplied; the field's default applies.
    Default,
    /// The wildcard: no filter at all.
    Any,
    Exactly(T),
}

impl<T> Default for Selector<T> {
    fn default() -> Self {
        Selector::Default
    }
}

impl<T> Selector<T>
where
    T: FromStr<Err = DomainError>,
{
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim() {
            "" => Ok(Selector::Default),
            ANY => Ok(Selector::Any),
            other => other.parse().map(Selector::Exactly),
        }
    }
}

impl<T: Copy> Selector<T> {
    fn resolve(&self, default: T) -> Option<T> {
        match self {
            Selector::Default => Some(default),
            Selector::Any => None,
            Selector::Exactly(value) => Some(*value),
        }
    }
}

impl<'de, T> Deserialize<'de> for Selector<T>
where
    T: FromStr<Err = DomainError>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Selector::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A `key=value` constraint on taxonomies or properties.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl FromStr for KeyValue {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok(Self::new(key.trim(), value.trim()))
            }
            _ => Err(format!("expected key=value, got `{raw}`")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FilterRequest {
    pub page: u32,
    /// Zero selects the default page size.
    pub page_size: u32,
    /// Field names, each optionally prefixed with `-` for descending order.
    pub sort: Vec<String>,
    /// Empty or `any` matches every type.
    pub post_type: Option<String>,
    pub status: Selector<PostStatus>,
    pub visibility: Selector<Visibility>,
    /// Case-sensitive substring of the author field.
    pub author: Option<String>,
    pub search: String,
    pub taxonomies: Vec<KeyValue>,
    pub properties: Vec<KeyValue>,
    pub split_pinned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Pinned,
    Published,
    Title,
    Slug,
    Id,
    Author,
    Created,
    Updated,
}

impl SortField {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pinned" | "featured" => Some(SortField::Pinned),
            "published" | "date" => Some(SortField::Published),
            "title" | "name" => Some(SortField::Title),
            "slug" => Some(SortField::Slug),
            "id" => Some(SortField::Id),
            "author" => Some(SortField::Author),
            "created" => Some(SortField::Created),
            "updated" => Some(SortField::Updated),
            _ => None,
        }
    }

    fn compare(self, a: &Post, b: &Post) -> Ordering {
        match self {
            SortField::Pinned => a.pinned.cmp(&b.pinned),
            SortField::Published => a.published.cmp(&b.published),
            SortField::Title => a.title.cmp(&b.title),
            SortField::Slug => a.slug.cmp(&b.slug),
            SortField::Id => id_bytes(a).cmp(id_bytes(b)),
            SortField::Author => a.author.cmp(&b.author),
            SortField::Created => a.created.cmp(&b.created),
            SortField::Updated => a.updated.cmp(&b.updated),
        }
    }
}

/// Byte order of the `type/slug` string, which is how the SQL backend orders ids.
fn id_bytes(post: &Post) -> impl Iterator<Item = u8> + '_ {
    post.post_type
        .bytes()
        .chain(iter::once(b'/'))
        .chain(post.slug.bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl SortKey {
    pub const fn asc(field: SortField) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub const fn desc(field: SortField) -> Self {
        Self {
            field,
            descending: true,
        }
    }

    /// `None` for unrecognized field names.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.strip_prefix('-') {
            Some(name) => SortField::parse(name).map(Self::desc),
            None => SortField::parse(raw.strip_prefix('+').unwrap_or(raw)).map(Self::asc),
        }
    }

    fn compare(&self, a: &Post, b: &Post) -> Ordering {
        let ordering = self.field.compare(a, b);
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

pub const DEFAULT_SORT: [SortKey; 3] = [
    SortKey::desc(SortField::Pinned),
    SortKey::desc(SortField::Published),
    SortKey::asc(SortField::Id),
];

/// Resolve a sort list. Unknown names are skipped; an empty result falls back to
/// [`DEFAULT_SORT`]. Identity ascending always ends the list so ordering is total.
pub fn resolve_sort(keys: &[String]) -> Vec<SortKey> {
    let mut resolved: Vec<SortKey> = keys.iter().filter_map(|key| SortKey::parse(key)).collect();
    if resolved.is_empty() {
        resolved.extend(DEFAULT_SORT);
    }
    if !resolved.iter().any(|key| key.field == SortField::Id) {
        resolved.push(SortKey::asc(SortField::Id));
    }
    resolved
}

/// Lowercased alphanumeric runs of `text`.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

/// Tokens of every searchable field of a post.
pub fn post_tokens(post: &Post) -> impl Iterator<Item = String> + '_ {
    [&post.title, &post.subtitle, &post.summary, &post.content]
        .into_iter()
        .flat_map(|field| tokenize(field))
}

/// A fully resolved request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub post_type: Option<String>,
    pub status: Option<PostStatus>,
    pub visibility: Option<Visibility>,
    pub author: Option<String>,
    /// Every token must prefix-match some token of the post's text fields.
    pub search_tokens: Vec<String>,
    pub taxonomies: Vec<KeyValue>,
    pub properties: Vec<KeyValue>,
    pub sort: Vec<SortKey>,
    pub window: PageWindow,
    pub split_pinned: bool,
}

impl QueryPlan {
    pub fn new(request: &FilterRequest) -> Self {
        Self::with_default_page_size(request, DEFAULT_PAGE_SIZE)
    }

    pub fn with_default_page_size(request: &FilterRequest, default_page_size: u32) -> Self {
        let post_type = request
            .post_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty() && *value != ANY)
            .map(str::to_string);
        let author = request
            .author
            .as_deref()
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let size = if request.page_size == 0 {
            default_page_size
        } else {
            request.page_size
        };

        Self {
            post_type,
            status: request.status.resolve(PostStatus::Published),
            visibility: request.visibility.resolve(Visibility::Public),
            author,
            search_tokens: tokenize(&request.search).collect(),
            taxonomies: request.taxonomies.clone(),
            properties: request.properties.clone(),
            sort: resolve_sort(&request.sort),
            window: PageWindow::new(request.page, size),
            split_pinned: request.split_pinned,
        }
    }

    /// A copy with the free-text constraint removed, for backends that resolve text
    /// matches through their own index.
    pub fn without_text(&self) -> Self {
        Self {
            search_tokens: Vec::new(),
            ..self.clone()
        }
    }

    pub fn matches(&self, post: &Post) -> bool {
        self.matches_attributes(post) && self.matches_text(post)
    }

    pub fn matches_attributes(&self, post: &Post) -> bool {
        if let Some(post_type) = &self.post_type {
            if &post.post_type != post_type {
                return false;
            }
        }
        if self.status.is_some_and(|status| post.status != status) {
            return false;
        }
        if self
            .visibility
            .is_some_and(|visibility| post.visibility != visibility)
        {
            return false;
        }
        if let Some(author) = &self.author {
            if !post.author.contains(author.as_str()) {
                return false;
            }
        }
        self.taxonomies
            .iter()
            .all(|KeyValue { key, value }| post.has_term(key, value))
            && self
                .properties
                .iter()
                .all(|KeyValue { key, value }| post.properties.get(key) == Some(value))
    }

    pub fn matches_text(&self, post: &Post) -> bool {
        if self.search_tokens.is_empty() {
            return true;
        }
        let tokens: Vec<String> = post_tokens(post).collect();
        self.search_tokens
            .iter()
            .all(|query| tokens.iter().any(|token| token.starts_with(query.as_str())))
    }

    pub fn compare(&self, a: &Post, b: &Post) -> Ordering {
        self.sort
            .iter()
            .map(|key| key.compare(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Filter, count, sort and window a candidate set.
    ///
    /// With `split_pinned`, every matching pinned post is returned ahead of the window
    /// and only the unpinned remainder is paginated.
    pub fn execute<P: Borrow<Post>>(&self, candidates: impl IntoIterator<Item = P>) -> SearchResults {
        let mut matched: Vec<P> = candidates
            .into_iter()
            .filter(|post| self.matches(post.borrow()))
            .collect();
        let total = matched.len();
        matched.sort_by(|a, b| self.compare(a.borrow(), b.borrow()));

        let selected = if self.split_pinned {
            let (mut pinned, unpinned): (Vec<P>, Vec<P>) =
                matched.into_iter().partition(|post| post.borrow().pinned);
            pinned.extend(self.window.take(unpinned));
            pinned
        } else {
            self.window.take(matched)
        };

        SearchResults {
            posts: selected.iter().map(|post| post.borrow().clone()).collect(),
            total,
        }
    }
}

impl From<&FilterRequest> for QueryPlan {
    fn from(request: &FilterRequest) -> Self {
        Self::new(request)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn post(slug: &str) -> Post {
        let mut post = Post::new("articles", slug);
        post.status = PostStatus::Published;
        post.visibility = Visibility::Public;
        post
    }

    fn slugs(results: &SearchResults) -> Vec<&str> {
        results.posts.iter().map(|p| p.slug.as_str()).collect()
    }

    #[test]
    fn selector_parses_default_any_and_values() {
        assert_eq!(
            Selector::<PostStatus>::parse("").expect("empty"),
            Selector::Default
        );
        assert_eq!(
            Selector::<PostStatus>::parse("any").expect("any"),
            Selector::Any
        );
        assert_eq!(
            Selector::<Visibility>::parse("private").expect("value"),
            Selector::Exactly(Visibility::Private)
        );
        assert!(Selector::<PostStatus>::parse("bogus").is_err());
    }

    #[test]
    fn request_deserializes_from_json() {
        let request: FilterRequest = serde_json::from_value(serde_json::json!({
            "page": 2,
            "status": "any",
            "taxonomies": [{"key": "tags", "value": "rust"}],
        }))
        .expect("valid request");
        assert_eq!(request.page, 2);
        assert_eq!(request.status, Selector::Any);
        assert_eq!(request.visibility, Selector::Default);
        assert_eq!(request.taxonomies, vec![KeyValue::new("tags", "rust")]);
    }

    #[test]
    fn defaults_resolve_to_published_and_public() {
        let plan = QueryPlan::new(&FilterRequest::default());
        assert_eq!(plan.status, Some(PostStatus::Published));
        assert_eq!(plan.visibility, Some(Visibility::Public));
        assert_eq!(plan.post_type, None);
        assert_eq!(plan.window, PageWindow::new(1, DEFAULT_PAGE_SIZE));
        assert_eq!(plan.sort, DEFAULT_SORT.to_vec());
    }

    #[test]
    fn any_post_type_disables_type_filter() {
        let request = FilterRequest {
            post_type: Some("any".into()),
            ..Default::default()
        };
        assert_eq!(QueryPlan::new(&request).post_type, None);
    }

    #[test]
    fn unknown_sort_keys_are_skipped() {
        let sort = resolve_sort(&["-bogus".into(), "title".into()]);
        assert_eq!(
            sort,
            vec![SortKey::asc(SortField::Title), SortKey::asc(SortField::Id)]
        );
    }

    #[test]
    fn taxonomy_constraints_are_anded_across_keys() {
        let a = post("a")
            .with_terms("tags", ["rust"])
            .with_terms("series", ["intro"]);
        let b = post("b").with_terms("tags", ["rust"]);
        let request = FilterRequest {
            taxonomies: vec![KeyValue::new("tags", "rust"), KeyValue::new("series", "intro")],
            ..Default::default()
        };
        let results = QueryPlan::new(&request).execute([a, b]);
        assert_eq!(slugs(&results), vec!["a"]);
        assert_eq!(results.total, 1);
    }

    #[test]
    fn property_constraints_require_exact_values() {
        let mut a = post("a");
        a.properties.insert("lang".into(), "en".into());
        let mut b = post("b");
        b.properties.insert("lang".into(), "english".into());
        let request = FilterRequest {
            properties: vec![KeyValue::new("lang", "en")],
            ..Default::default()
        };
        assert_eq!(slugs(&QueryPlan::new(&request).execute([a, b])), vec!["a"]);
    }

    #[test]
    fn author_match_is_case_sensitive_substring() {
        let mut a = post("a");
        a.author = "Ada Lovelace".into();
        let plan = QueryPlan::new(&FilterRequest {
            author: Some("Lovelace".into()),
            ..Default::default()
        });
        assert!(plan.matches(&a));
        let plan = QueryPlan::new(&FilterRequest {
            author: Some("lovelace".into()),
            ..Default::default()
        });
        assert!(!plan.matches(&a));
    }

    #[test]
    fn search_matches_token_prefixes_across_fields() {
        let mut a = post("a");
        a.title = "Building Caches".into();
        a.content = "Consistency under failure.".into();
        let plan = QueryPlan::new(&FilterRequest {
            search: "cach consist".into(),
            ..Default::default()
        });
        assert!(plan.matches(&a));
        let plan = QueryPlan::new(&FilterRequest {
            search: "ache".into(),
            ..Default::default()
        });
        assert!(!plan.matches(&a));
    }

    #[test]
    fn blank_search_is_no_constraint() {
        let plan = QueryPlan::new(&FilterRequest {
            search: "  -- ".into(),
            ..Default::default()
        });
        assert!(plan.search_tokens.is_empty());
        assert!(plan.matches(&post("a")));
    }

    #[test]
    fn default_order_is_pinned_then_newest_then_id() {
        let mut old = post("old");
        old.published = Some(datetime!(2023-01-01 0:00 UTC));
        let mut new = post("new");
        new.published = Some(datetime!(2024-01-01 0:00 UTC));
        let mut pinned = post("pinned");
        pinned.pinned = true;
        let mut tie = post("a-tie");
        tie.published = new.published;

        let results = QueryPlan::new(&FilterRequest::default()).execute([old, new, pinned, tie]);
        assert_eq!(slugs(&results), vec!["pinned", "a-tie", "new", "old"]);
    }

    #[test]
    fn split_pinned_prepends_all_pinned_to_each_page() {
        let mut posts = Vec::new();
        for i in 0..7 {
            let mut p = post(&format!("p{i}"));
            p.pinned = i < 2;
            posts.push(p);
        }
        let request = FilterRequest {
            page: 2,
            page_size: 2,
            split_pinned: true,
            sort: vec!["slug".into()],
            ..Default::default()
        };
        let results = QueryPlan::new(&request).execute(posts);
        assert_eq!(results.total, 7);
        assert_eq!(slugs(&results), vec!["p0", "p1", "p4", "p5"]);
    }
}
