//! Enumerations carried on every post plus the registry of recognized post types.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::{error::DomainError, post::PostId};

/// Wildcard accepted by filters in place of a concrete post type, status or visibility.
pub const ANY: &str = "any";

pub const DEFAULT_POST_TYPES: [&str; 5] = ["articles", "pages", "notes", "links", "bookmarks"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Published,
    Archived,
    #[default]
    #[serde(rename = "")]
    Unset,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
            PostStatus::Unset => "",
        }
    }

    pub fn is_unset(self) -> bool {
        matches!(self, PostStatus::Unset)
    }
}

impl FromStr for PostStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            "archived" => Ok(PostStatus::Archived),
            "" => Ok(PostStatus::Unset),
            other => Err(DomainError::invalid_metadata("status", other)),
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    Unlisted,
    #[default]
    #[serde(rename = "")]
    Unset,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Unlisted => "unlisted",
            Visibility::Unset => "",
        }
    }

    pub fn is_unset(self) -> bool {
        matches!(self, Visibility::Unset)
    }
}

impl FromStr for Visibility {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "unlisted" => Ok(Visibility::Unlisted),
            "" => Ok(Visibility::Unset),
            other => Err(DomainError::invalid_metadata("visibility", other)),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of post types a deployment recognizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostTypes {
    names: BTreeSet<String>,
}

impl PostTypes {
    /// Build a registry, rejecting empty names and the wildcard.
    pub fn new<I, S>(names: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for name in names {
            let name = name.into();
            let trimmed = name.trim();
            if trimmed.is_empty() || trimmed == ANY || trimmed.contains('/') {
                return Err(DomainError::invalid_identity(format!(
                    "`{name}` cannot be used as a post type"
                )));
            }
            set.insert(trimmed.to_string());
        }
        if set.is_empty() {
            return Err(DomainError::invalid_identity(
                "at least one post type must be configured",
            ));
        }
        Ok(Self { names: set })
    }

    pub fn contains(&self, post_type: &str) -> bool {
        self.names.contains(post_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Reject identities with an empty slug or an unregistered type.
    pub fn validate(&self, id: &PostId) -> Result<(), DomainError> {
        if id.slug.trim().is_empty() {
            return Err(DomainError::invalid_identity(format!(
                "post `{id}` has an empty slug"
            )));
        }
        if !self.contains(&id.post_type) {
            return Err(DomainError::invalid_identity(format!(
                "post type `{}` is not recognized",
                id.post_type
            )));
        }
        Ok(())
    }
}

impl Default for PostTypes {
    fn default() -> Self {
        Self {
            names: DEFAULT_POST_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}
