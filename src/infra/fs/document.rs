//! Markdown documents with optional frontmatter, `+++` fenced TOML or `---` fenced YAML.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use comrak::options::Options;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use tracing::warn;

use crate::application::source::SourceError;
use crate::domain::{Post, PostStatus, Visibility, parse_published};

const WORDS_PER_MINUTE: usize = 200;

/// Frontmatter syntax used when writing documents. Reading accepts either.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrontmatterFormat {
    #[default]
    Toml,
    Yaml,
}

impl FrontmatterFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            FrontmatterFormat::Toml => "toml",
            FrontmatterFormat::Yaml => "yaml",
        }
    }

    fn fence(self) -> &'static str {
        match self {
            FrontmatterFormat::Toml => "+++",
            FrontmatterFormat::Yaml => "---",
        }
    }

    fn from_fence(line: &str) -> Option<Self> {
        match line.trim_end() {
            "+++" => Some(FrontmatterFormat::Toml),
            "---" => Some(FrontmatterFormat::Yaml),
            _ => None,
        }
    }
}

impl fmt::Display for FrontmatterFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrontmatterFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "toml" => Ok(FrontmatterFormat::Toml),
            "yaml" | "yml" => Ok(FrontmatterFormat::Yaml),
            other => Err(format!("unknown frontmatter format `{other}`, expected toml or yaml")),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Frontmatter {
    #[serde(alias = "name", skip_serializing_if = "String::is_empty")]
    title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    subtitle: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    summary: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    author: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    photo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    published: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    visibility: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pinned: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, toml::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    taxonomies: BTreeMap<String, BTreeSet<String>>,
}

fn markdown_options() -> Options<'static> {
    let mut options = Options::default();
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;
    ext.description_lists = true;
    options.render.github_pre_lang = true;
    options
}

/// A frontmatter block and the syntax it was fenced with.
struct Block {
    format: FrontmatterFormat,
    text: String,
}

/// Split `raw` into its frontmatter block, if any, and the markdown body.
fn split(raw: &str, path: &Path) -> Result<(Option<Block>, String), SourceError> {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let mut lines = text.split_inclusive('\n');
    let Some(format) = lines.next().and_then(FrontmatterFormat::from_fence) else {
        return Ok((None, text.to_string()));
    };

    let mut frontmatter = String::new();
    for line in lines.by_ref() {
        if line.trim_end() == format.fence() {
            let body: String = lines.collect();
            return Ok((
                Some(Block {
                    format,
                    text: frontmatter,
                }),
                body.trim_start_matches(['\r', '\n']).to_string(),
            ));
        }
        frontmatter.push_str(line);
    }
    Err(SourceError::parse(
        path,
        format!("frontmatter is not closed by `{}`", format.fence()),
    ))
}

fn decode(block: &Block, path: &Path) -> Result<Frontmatter, SourceError> {
    if block.text.trim().is_empty() {
        return Ok(Frontmatter::default());
    }
    let decoded: Result<Frontmatter, String> = match block.format {
        FrontmatterFormat::Toml => toml::from_str(&block.text).map_err(|err| err.to_string()),
        FrontmatterFormat::Yaml => serde_yaml::from_str(&block.text).map_err(|err| err.to_string()),
    };
    decoded.map_err(|message| SourceError::parse(path, message))
}

/// Hex SHA-256 of the document text.
pub fn etag(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize().to_vec())
}

/// Reading time at 200 words per minute over the whole document text.
pub fn estimate_read_time(text: &str) -> String {
    let minutes = text.split_whitespace().count() / WORDS_PER_MINUTE;
    match minutes {
        0 => "< 1 min".to_string(),
        1..=59 => format!("{minutes} min"),
        _ => format!("{} hr {} min", minutes / 60, minutes % 60),
    }
}

fn property_text(value: toml::Value) -> String {
    match value {
        toml::Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Build a post from document text. Identity and file timestamps are filled in by the caller.
pub fn parse(raw: &str, path: &Path) -> Result<Post, SourceError> {
    let (block, body) = split(raw, path)?;
    let mut post = Post {
        html: comrak::markdown_to_html(&body, &markdown_options()),
        etag: etag(raw),
        estimated_read_time: estimate_read_time(raw),
        content: body,
        ..Post::default()
    };

    let Some(block) = block else {
        return Ok(post);
    };
    let meta = decode(&block, path)?;

    let invalid = |source| SourceError::Invalid {
        path: path.to_path_buf(),
        source,
    };
    post.status = if meta.status.trim().is_empty() {
        PostStatus::Published
    } else {
        meta.status.parse().map_err(invalid)?
    };
    post.visibility = if meta.visibility.trim().is_empty() {
        Visibility::Public
    } else {
        meta.visibility.parse().map_err(invalid)?
    };
    post.published = meta
        .published
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| match parse_published(value) {
            Ok(published) => Some(published),
            Err(err) => {
                warn!(
                    target: "postindex::source",
                    path = %path.display(),
                    error = %err,
                    "Ignoring unparseable published timestamp"
                );
                None
            }
        });
    post.title = meta.title;
    post.subtitle = meta.subtitle;
    post.summary = meta.summary;
    post.author = meta.author;
    post.photo = meta.photo;
    post.pinned = meta.pinned;
    post.properties = meta
        .properties
        .into_iter()
        .map(|(key, value)| (key, property_text(value)))
        .collect();
    post.taxonomies = meta.taxonomies;
    Ok(post)
}

/// Document text for `post`: frontmatter, a blank line, then the markdown body.
pub fn render(post: &Post, path: &Path, format: FrontmatterFormat) -> Result<String, SourceError> {
    let published = post
        .published
        .map(|ts| ts.format(&Rfc3339))
        .transpose()
        .map_err(|err| SourceError::parse(path, err.to_string()))?;
    let meta = Frontmatter {
        title: post.title.clone(),
        subtitle: post.subtitle.clone(),
        summary: post.summary.clone(),
        author: post.author.clone(),
        photo: post.photo.clone(),
        published,
        status: post.status.as_str().to_string(),
        visibility: post.visibility.as_str().to_string(),
        pinned: post.pinned,
        properties: post
            .properties
            .iter()
            .map(|(key, value)| (key.clone(), toml::Value::String(value.clone())))
            .collect(),
        taxonomies: post.taxonomies.clone(),
    };
    let frontmatter = match format {
        FrontmatterFormat::Toml => toml::to_string(&meta).map_err(|err| err.to_string()),
        FrontmatterFormat::Yaml => serde_yaml::to_string(&meta).map_err(|err| err.to_string()),
    }
    .map_err(|message| SourceError::parse(path, message))?;
    let fence = format.fence();
    Ok(format!("{fence}\n{frontmatter}{fence}\n\n{}", post.content))
}
