// Gridflow - Web Server
// REST API with Axum feeding the globe viewer

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gridflow::{
    enrich_lines, infer, load_lines, price_points, spawn_lookups, spawn_refresh_loop,
    ColorMode, Config, DirectionBasis, Direction, LineClass, LineRecord, LookupsHandle,
    PriceIndex, PricePoint, PriceStore, RenderedLine,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    lookups: LookupsHandle,
    prices: PriceStore,
    lines: Arc<OnceCell<Vec<LineRecord>>>,
}

impl AppState {
    /// Geometry is loaded on first successful use and kept for the process
    /// lifetime. A failed load serves no lines and is retried next request.
    async fn line_records(&self) -> &[LineRecord] {
        let source = &self.config.lines_source;
        match self.lines.get_or_try_init(|| load_lines(source)).await {
            Ok(records) => records.as_slice(),
            Err(e) => {
                warn!(%source, error = %e, "line geometry unavailable, will retry");
                &[]
            }
        }
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    version: &'static str,
    lookups_ready: bool,
    price_records: usize,
    prices_fetched_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct LinesQuery {
    mode: Option<String>,
}

#[derive(Deserialize)]
struct DirectionQuery {
    start: String,
    end: String,
    tipo: Option<String>,
}

#[derive(Serialize)]
struct NormalizeResponse {
    raw: String,
    canonical: String,
    generation: bool,
}

#[derive(Serialize)]
struct DirectionResponse {
    start: String,
    end: String,
    class: LineClass,
    direction: Direction,
    basis: DirectionBasis,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.prices.current();
    Json(ApiResponse::ok(HealthResponse {
        version: gridflow::VERSION,
        lookups_ready: state.lookups.is_ready(),
        price_records: snapshot.records.len(),
        prices_fetched_at: snapshot.fetched_at,
    }))
}

/// GET /api/lines?mode=voltage|price - Oriented, colored lines
async fn get_lines(
    State(state): State<AppState>,
    Query(query): Query<LinesQuery>,
) -> impl IntoResponse {
    // unknown modes fall back to the configured default
    let mode = query.mode.and_then(|m| m.parse::<ColorMode>().ok());
    let options = state.config.enrich_options(mode);

    let lookups = state.lookups.ready().await;
    let records = state.line_records().await.to_vec();

    let index = match options.mode {
        ColorMode::Price => Some(PriceIndex::build(&state.prices.current().records, &lookups)),
        ColorMode::Voltage => None,
    };

    let rendered: Vec<RenderedLine> = enrich_lines(records, &lookups, index.as_ref(), &options);
    Json(ApiResponse::ok(rendered))
}

/// GET /api/prices - Price markers from the latest snapshot
async fn get_prices(State(state): State<AppState>) -> impl IntoResponse {
    let points: Vec<PricePoint> = price_points(&state.prices.current().records);
    Json(ApiResponse::ok(points))
}

/// GET /api/normalize/:name - Canonical barra name
///
/// `Path` has already percent-decoded the segment.
async fn get_normalized(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> impl IntoResponse {
    let lookups = state.lookups.ready().await;
    let canonical = lookups.normalize(&raw);
    let generation = lookups.generation().contains(&canonical);

    Json(ApiResponse::ok(NormalizeResponse {
        raw,
        canonical,
        generation,
    }))
}

/// GET /api/direction?start=&end=&tipo= - Direction for an ad-hoc pair
async fn get_direction(
    State(state): State<AppState>,
    Query(query): Query<DirectionQuery>,
) -> impl IntoResponse {
    let lookups = state.lookups.ready().await;
    let class = LineClass::from_tipo(query.tipo.as_deref());
    let start = lookups.normalize(&query.start);
    let end = lookups.normalize(&query.end);
    let inference = infer(&class, &start, &end, &lookups);

    Json(ApiResponse::ok(DirectionResponse {
        start,
        end,
        class,
        direction: inference.direction,
        basis: inference.basis,
    }))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    info!(addr = %config.addr, "Starting gridflow server");

    // Background loads: lookups once, prices on a timer
    let lookups = spawn_lookups(config.alias_source.clone(), config.generation_source.clone());
    let prices = PriceStore::new();
    let _refresh = spawn_refresh_loop(
        prices.clone(),
        config.prices_source.clone(),
        config.price_refresh,
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        lookups,
        prices,
        lines: Arc::new(OnceCell::new()),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/lines", get(get_lines))
        .route("/prices", get(get_prices))
        .route("/normalize/:name", get(get_normalized))
        .route("/direction", get(get_direction))
        .with_state(state);

    // Build main router
    let app = Router::new()
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.addr))?;

    info!("Server running on http://{}", config.addr);
    info!("   API: http://{}/api/lines", config.addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
