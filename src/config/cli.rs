use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};

use crate::application::filter::KeyValue;

/// Command-line arguments for the postindex binary.
#[derive(Debug, Parser)]
#[command(
    name = "postindex",
    version,
    about = "Index a markdown content tree and query it"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "POSTINDEX_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Walk the content tree and index every post.
    Sync,
    /// Filter, sort and paginate indexed posts.
    Search(SearchArgs),
    /// Fetch one post by `type/slug`, reading through to the content tree on a miss.
    Get(GetArgs),
    /// List taxonomies that have at least one term in use.
    Taxonomies,
    /// List the terms of one taxonomy.
    Terms(TermsArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Memory,
    Embedded,
    Sqlite,
}

/// Settings overrides shared by every command.
#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the content root directory.
    #[arg(long = "content-root", value_name = "PATH", value_hint = ValueHint::DirPath, global = true)]
    pub content_root: Option<PathBuf>,

    /// Override the store backend.
    #[arg(long = "store-backend", value_name = "BACKEND", global = true)]
    pub store_backend: Option<BackendArg>,

    /// Override the embedded store's data directory.
    #[arg(long = "store-data-dir", value_name = "PATH", value_hint = ValueHint::DirPath, global = true)]
    pub store_data_dir: Option<PathBuf>,

    /// Override the SQLite connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SearchArgs {
    /// 1-based page number.
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Items per page; zero uses the configured default.
    #[arg(long = "page-size", default_value_t = 0)]
    pub page_size: u32,

    /// Sort key, `-` prefixed for descending. Repeatable.
    #[arg(long = "sort", value_name = "FIELD", allow_hyphen_values = true)]
    pub sort: Vec<String>,

    /// Post type, or `any`.
    #[arg(long = "type", value_name = "TYPE")]
    pub post_type: Option<String>,

    /// Status, or `any`. Defaults to published.
    #[arg(long, default_value = "")]
    pub status: String,

    /// Visibility, or `any`. Defaults to public.
    #[arg(long, default_value = "")]
    pub visibility: String,

    #[arg(long)]
    pub author: Option<String>,

    /// Free-text query matched by token prefix.
    #[arg(long = "query", short = 'q', default_value = "")]
    pub query: String,

    /// `taxonomy=term` constraint. Repeatable.
    #[arg(long = "taxonomy", value_name = "KEY=VALUE")]
    pub taxonomies: Vec<KeyValue>,

    /// `key=value` property constraint. Repeatable.
    #[arg(long = "property", value_name = "KEY=VALUE")]
    pub properties: Vec<KeyValue>,

    /// Return pinned posts separately ahead of the page.
    #[arg(long = "split-pinned", action = clap::ArgAction::SetTrue)]
    pub split_pinned: bool,
}

#[derive(Debug, Args, Clone)]
pub struct GetArgs {
    /// Post identity as `type/slug`.
    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Debug, Args, Clone)]
pub struct TermsArgs {
    #[arg(value_name = "TAXONOMY")]
    pub taxonomy: String,

    /// Include the number of posts carrying each term.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub counts: bool,
}
