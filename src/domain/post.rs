//! The post record and its identity.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use time::{
    Date, OffsetDateTime, PrimitiveDateTime,
    format_description::{FormatItem, well_known::Rfc3339},
    macros::format_description,
};

use super::{
    error::DomainError,
    types::{PostStatus, Visibility},
};

const PUBLISHED_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const PUBLISHED_DATE_TIME: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Parse a `published` value written as `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` (both UTC) or
/// RFC 3339.
pub fn parse_published(raw: &str) -> Result<OffsetDateTime, DomainError> {
    let raw = raw.trim();
    if let Ok(date) = Date::parse(raw, PUBLISHED_DATE) {
        return Ok(date.midnight().assume_utc());
    }
    if let Ok(datetime) = PrimitiveDateTime::parse(raw, PUBLISHED_DATE_TIME) {
        return Ok(datetime.assume_utc());
    }
    OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|_| DomainError::invalid_metadata("published", raw))
}

/// Canonical identity of a post, rendered as `post_type/slug`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostId {
    pub post_type: String,
    pub slug: String,
}

impl PostId {
    pub fn new(post_type: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            post_type: post_type.into(),
            slug: slug.into(),
        }
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.post_type, self.slug)
    }
}

impl FromStr for PostId {
    type Err = DomainError;

    /// Splits at the first `/`; the slug keeps any further separators.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once('/') {
            Some((post_type, slug)) if !post_type.is_empty() && !slug.is_empty() => {
                Ok(Self::new(post_type, slug))
            }
            _ => Err(DomainError::invalid_identity(format!(
                "`{value}` is not of the form type/slug"
            ))),
        }
    }
}

impl TryFrom<String> for PostId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PostId> for String {
    fn from(id: PostId) -> Self {
        id.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Post {
    pub post_type: String,
    pub slug: String,
    pub title: String,
    pub subtitle: String,
    pub summary: String,
    pub author: String,
    /// Raw markdown body.
    pub content: String,
    /// Rendered markup for `content`.
    pub html: String,
    pub photo: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published: Option<OffsetDateTime>,
    pub status: PostStatus,
    pub visibility: Visibility,
    pub pinned: bool,
    pub properties: BTreeMap<String, String>,
    pub taxonomies: BTreeMap<String, BTreeSet<String>>,
    pub etag: String,
    pub estimated_read_time: String,
    /// Date from a `YYYY-MM-DD-` prefix on the document's file name.
    pub file_date: Option<Date>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated: Option<OffsetDateTime>,
}

impl Post {
    pub fn new(post_type: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            post_type: post_type.into(),
            slug: slug.into(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> PostId {
        PostId::new(self.post_type.clone(), self.slug.clone())
    }

    pub fn set_id(&mut self, id: &PostId) {
        self.post_type.clone_from(&id.post_type);
        self.slug.clone_from(&id.slug);
    }

    pub fn has_term(&self, taxonomy: &str, term: &str) -> bool {
        self.taxonomies
            .get(taxonomy)
            .is_some_and(|terms| terms.contains(term))
    }

    /// Every `(taxonomy, term)` pair the post carries.
    pub fn taxonomy_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.taxonomies.iter().flat_map(|(taxonomy, terms)| {
            terms
                .iter()
                .map(move |term| (taxonomy.as_str(), term.as_str()))
        })
    }

    pub fn with_terms<I, S>(mut self, taxonomy: &str, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.taxonomies
            .entry(taxonomy.to_string())
            .or_default()
            .extend(terms.into_iter().map(Into::into));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_id_splits_on_first_separator() {
        let id: PostId = "notes/2024/trip".parse().expect("valid id");
        assert_eq!(id.post_type, "notes");
        assert_eq!(id.slug, "2024/trip");
        assert_eq!(id.to_string(), "notes/2024/trip");
    }

    #[test]
    fn post_id_rejects_missing_parts() {
        assert!("articles".parse::<PostId>().is_err());
        assert!("/slug".parse::<PostId>().is_err());
        assert!("articles/".parse::<PostId>().is_err());
    }

    #[test]
    fn taxonomy_pairs_flatten_terms() {
        let post = Post::new("articles", "a")
            .with_terms("tags", ["rust", "db"])
            .with_terms("series", ["intro"]);
        let pairs: Vec<_> = post.taxonomy_pairs().collect();
        assert_eq!(
            pairs,
            vec![("series", "intro"), ("tags", "db"), ("tags", "rust")]
        );
        assert!(post.has_term("tags", "rust"));
        assert!(!post.has_term("tags", "go"));
    }

    #[test]
    fn published_accepts_three_layouts() {
        use time::macros::datetime;

        assert_eq!(
            parse_published("2024-03-01").expect("date"),
            datetime!(2024-03-01 0:00 UTC)
        );
        assert_eq!(
            parse_published("2024-03-01 08:30:00").expect("date time"),
            datetime!(2024-03-01 8:30 UTC)
        );
        assert_eq!(
            parse_published("2024-03-01T08:30:00+02:00").expect("rfc3339"),
            datetime!(2024-03-01 6:30 UTC)
        );
        assert!(parse_published("March 1st").is_err());
    }

    #[test]
    fn post_serializes_id_fields_and_timestamps() {
        let mut post = Post::new("articles", "a");
        post.published = Some(time::macros::datetime!(2024-03-01 10:00 UTC));
        let json = serde_json::to_value(&post).expect("serialize");
        assert_eq!(json["post_type"], "articles");
        assert_eq!(json["published"], "2024-03-01T10:00:00Z");
        let back: Post = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, post);
    }
}
