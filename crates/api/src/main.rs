use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::FixedOffset;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scanner_core::cache::CacheStore;
use scanner_core::fetch::{HttpScannerClient, ScannerClient};
use scanner_core::query::{CategoryMatch, CategorySummary, ProjectedRecord, ScannerService};
use scanner_core::schema::ScannerSchema;
use scanner_core::{ErrorKind, ScannerError};

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

    let client = HttpScannerClient::from_settings(&settings)?;
    let service = ScannerService::new(
        client,
        CacheStore::new(&settings.cache_dir),
        ScannerSchema::default(),
    )?;
    let state = AppState::new(service, settings.utc_offset()?);

    let app = build_router(state).layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, cache_dir = %settings.cache_dir.display(), "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Operations run one at a time so a cache miss triggers at most one build per date.
struct AppState<C> {
    service: Arc<Mutex<ScannerService<C>>>,
    utc_offset: Option<FixedOffset>,
}

impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            utc_offset: self.utc_offset,
        }
    }
}

impl<C> AppState<C> {
    fn new(service: ScannerService<C>, utc_offset: Option<FixedOffset>) -> Self {
        Self {
            service: Arc::new(Mutex::new(service)),
            utc_offset,
        }
    }

    fn today(&self) -> chrono::NaiveDate {
        scanner_core::time::local_date(chrono::Utc::now(), self.utc_offset)
    }
}

fn build_router<C: ScannerClient + 'static>(state: AppState<C>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/tools/get_stock_by_category", post(get_stock_by_category::<C>))
        .route("/tools/get_technical_values", post(get_technical_values::<C>))
        .route(
            "/tools/get_recommendation_summary",
            post(get_recommendation_summary::<C>),
        )
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct CategoryRequest {
    category: String,
}

#[derive(Debug, Deserialize)]
struct TickersRequest {
    tickers: Vec<String>,
}

async fn get_stock_by_category<C: ScannerClient>(
    State(state): State<AppState<C>>,
    Json(req): Json<CategoryRequest>,
) -> Result<Json<Vec<CategoryMatch>>, ApiError> {
    let as_of_date = state.today();
    let service = state.service.lock().await;
    let out = service.get_by_category(as_of_date, &req.category).await?;
    Ok(Json(out))
}

async fn get_technical_values<C: ScannerClient>(
    State(state): State<AppState<C>>,
    Json(req): Json<TickersRequest>,
) -> Result<Json<Vec<ProjectedRecord>>, ApiError> {
    let as_of_date = state.today();
    let service = state.service.lock().await;
    let out = service.get_technical_values(as_of_date, &req.tickers).await?;
    Ok(Json(out))
}

async fn get_recommendation_summary<C: ScannerClient>(
    State(state): State<AppState<C>>,
) -> Result<Json<CategorySummary>, ApiError> {
    let as_of_date = state.today();
    let service = state.service.lock().await;
    let out = service.get_summary(as_of_date).await?;
    Ok(Json(out))
}

/// Caller mistakes come back as 400 with the reason; everything else collapses to a
/// single "unable to complete request" carrying the failing layer and its cause.
struct ApiError(ScannerError);

impl From<ScannerError> for ApiError {
    fn from(err: ScannerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        if self.0.is_caller_error() {
            let body = serde_json::json!({
                "error": self.0.to_string(),
                "layer": kind,
            });
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }

        let status = match kind {
            ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        let err = anyhow::Error::new(self.0);
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(layer = kind.as_str(), error = %err, "tool call failed");

        let body = serde_json::json!({
            "error": "unable to complete request",
            "layer": kind,
            "detail": format!("{err:#}"),
        });
        (status, Json(body)).into_response()
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
