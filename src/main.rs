use std::{process, sync::Arc};

use postindex::{
    application::{
        error::AppError,
        filter::{FilterRequest, Selector},
        observer::{CacheObserver, TracingObserver},
        sync::{SyncCoordinator, SyncReport},
    },
    config::{self, Command, SearchArgs, StoreBackend, TermsArgs},
    domain::PostId,
    infra::{self, fs::LocalFileSystem, telemetry},
};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.report().messages.join(": ");
    if dispatcher::has_been_set() {
        error!(error = %chain, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;
    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let command = cli_args.command.unwrap_or(Command::Sync);
    let observer: Arc<dyn CacheObserver> = Arc::new(TracingObserver);
    let store = infra::open_store(&settings.store, observer.clone()).await?;
    let source = Arc::new(
        LocalFileSystem::new(&settings.content.root, settings.content.walk_buffer.get())
            .with_frontmatter(settings.content.frontmatter),
    );
    let coordinator = SyncCoordinator::new(
        source,
        store.clone(),
        settings.content.post_types.clone(),
        observer,
    )
    .with_default_page_size(settings.query.default_page_size.get());

    // The memory backend starts empty on every run.
    if settings.store.backend == StoreBackend::Memory && !matches!(command, Command::Sync) {
        let report = sync(&coordinator).await?;
        info!(
            created = report.created,
            failures = report.failures.len(),
            "memory store populated"
        );
    }

    let outcome = match command {
        Command::Sync => run_sync(&coordinator).await,
        Command::Search(args) => run_search(&coordinator, args).await,
        Command::Get(args) => run_get(&coordinator, &args.id).await,
        Command::Taxonomies => run_taxonomies(&coordinator).await,
        Command::Terms(args) => run_terms(&coordinator, args).await,
    };

    if let Err(err) = store.close().await {
        warn!(error = %err, "failed to close store");
    }
    outcome
}

/// Resync until finished or interrupted.
async fn sync(coordinator: &SyncCoordinator) -> Result<SyncReport, AppError> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let listener = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping sync");
            interrupt.cancel();
        }
    });

    let report = coordinator.sync_all(cancel).await;
    listener.abort();
    Ok(report?)
}

async fn run_sync(coordinator: &SyncCoordinator) -> Result<(), AppError> {
    let report = sync(coordinator).await?;
    let failures: Vec<_> = report
        .failures
        .iter()
        .map(|failure| json!({ "id": failure.id, "error": failure.error.to_string() }))
        .collect();
    print_json(&json!({
        "created": report.created,
        "updated": report.updated,
        "cancelled": report.cancelled,
        "failures": failures,
    }))
}

async fn run_search(coordinator: &SyncCoordinator, args: SearchArgs) -> Result<(), AppError> {
    let request = FilterRequest {
        page: args.page,
        page_size: args.page_size,
        sort: args.sort,
        post_type: args.post_type,
        status: Selector::parse(&args.status)?,
        visibility: Selector::parse(&args.visibility)?,
        author: args.author,
        search: args.query,
        taxonomies: args.taxonomies,
        properties: args.properties,
        split_pinned: args.split_pinned,
    };
    let page = coordinator.search(&request).await?;
    print_json(&page)
}

async fn run_get(coordinator: &SyncCoordinator, raw_id: &str) -> Result<(), AppError> {
    let id: PostId = raw_id.parse()?;
    let post = coordinator.get(&id).await?;
    print_json(&post)
}

async fn run_taxonomies(coordinator: &SyncCoordinator) -> Result<(), AppError> {
    let taxonomies = coordinator.store().list_taxonomies().await?;
    print_json(&taxonomies)
}

async fn run_terms(coordinator: &SyncCoordinator, args: TermsArgs) -> Result<(), AppError> {
    let store = coordinator.store();
    if args.counts {
        print_json(&store.list_term_counts(&args.taxonomy).await?)
    } else {
        print_json(&store.list_terms(&args.taxonomy).await?)
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{text}");
    Ok(())
}
