use anyhow::Context;
use clap::Parser;
use scanner_core::cache::CacheStore;
use scanner_core::fetch::HttpScannerClient;
use scanner_core::query::ScannerService;
use scanner_core::schema::ScannerSchema;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "scanner_worker")]
struct Args {
    /// Snapshot date (YYYY-MM-DD). Defaults to today in SCANNER_UTC_OFFSET_MINUTES or local time.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Fetch and build the snapshot without reading or writing the cache.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = scanner_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let as_of_date = scanner_core::time::resolve_as_of_date(
        args.as_of_date.as_deref(),
        chrono::Utc::now(),
        settings.utc_offset()?,
    )
    .context("invalid --as-of-date (expected YYYY-MM-DD)")?;

    let client = HttpScannerClient::from_settings(&settings)?;
    let service = ScannerService::new(
        client,
        CacheStore::new(&settings.cache_dir),
        ScannerSchema::default(),
    )?;

    if args.dry_run {
        let snapshot = service.fetch_and_build(as_of_date).await.map_err(|err| {
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            err
        })?;
        tracing::info!(
            %as_of_date,
            dry_run = true,
            records = snapshot.len(),
            "scanner snapshot built (not cached)"
        );
        return Ok(());
    }

    match service.get_summary(as_of_date).await {
        Ok(summary) => {
            let counts = format_summary(&summary);
            tracing::info!(
                %as_of_date,
                path = %service.cache().path_for(as_of_date).display(),
                %counts,
                "scanner cache warm"
            );
            Ok(())
        }
        Err(err) => {
            let kind = err.kind().as_str();
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%as_of_date, kind, error = %err, "scanner run failed");
            Err(err)
        }
    }
}

fn format_summary(summary: &scanner_core::query::CategorySummary) -> String {
    summary
        .iter()
        .map(|(category, count)| format!("{category}={count}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn init_sentry(settings: &scanner_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
