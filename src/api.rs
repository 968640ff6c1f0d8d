// REST API over an immutable dataset (axum)
// Every request recomputes its result from the shared dataset.

use crate::config::Config;
use crate::db::Dataset;
use crate::report::build_dashboard;
use crate::stats;
use crate::trend::{self, Granularity, TrendRanking};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub dataset: Arc<Dataset>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(dataset: Dataset, config: Config) -> Self {
        Self {
            dataset: Arc::new(dataset),
            config: Arc::new(config),
        }
    }

    fn slice(&self, granularity: Granularity) -> usize {
        match granularity {
            Granularity::Product => self.config.top_products,
            Granularity::Category => self.config.top_categories,
        }
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }

    fn not_found(message: String) -> Response {
        (
            StatusCode::NOT_FOUND,
            Json(Self {
                success: false,
                data: None,
                error: Some(message),
            }),
        )
            .into_response()
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/dashboard - All three tabs
async fn get_dashboard(State(state): State<AppState>) -> Response {
    ApiResponse::ok(build_dashboard(&state.dataset, &state.config))
}

fn ranking(state: &AppState, granularity: Granularity) -> Response {
    let trends = trend::rating_trends(&state.dataset, granularity);
    let ranking = TrendRanking::from_trends(granularity, &trends, state.slice(granularity));
    debug!(granularity = granularity.plural(), "served ranking");
    ApiResponse::ok(ranking)
}

fn single_trend(state: &AppState, granularity: Granularity, name: &str) -> Response {
    match trend::trend_for(&state.dataset, granularity, name) {
        Some(t) => ApiResponse::ok(t.keyed(granularity)),
        None => ApiResponse::<()>::not_found(format!(
            "No reviewed {} named {:?}",
            granularity.key_column().to_lowercase(),
            name
        )),
    }
}

/// GET /api/products/trends
async fn get_product_trends(State(state): State<AppState>) -> Response {
    ranking(&state, Granularity::Product)
}

/// GET /api/products/trends/:name
async fn get_product_trend(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    single_trend(&state, Granularity::Product, &name)
}

/// GET /api/categories/trends
async fn get_category_trends(State(state): State<AppState>) -> Response {
    ranking(&state, Granularity::Category)
}

/// GET /api/categories/trends/:name
async fn get_category_trend(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    single_trend(&state, Granularity::Category, &name)
}

/// GET /api/stats/distribution
async fn get_distribution(State(state): State<AppState>) -> Response {
    ApiResponse::ok(stats::rating_distribution(&state.dataset))
}

/// GET /api/stats/monthly
async fn get_monthly(State(state): State<AppState>) -> Response {
    ApiResponse::ok(stats::monthly_average(&state.dataset))
}

#[derive(Serialize)]
struct RatedProducts {
    top: Vec<stats::ProductAverage>,
    bottom: Vec<stats::ProductAverage>,
}

/// GET /api/stats/products - Highest and lowest average ratings
async fn get_rated_products(State(state): State<AppState>) -> Response {
    let averages = stats::product_average_ratings(&state.dataset);
    let n = state.config.top_rated;
    ApiResponse::ok(RatedProducts {
        top: stats::top_rated(&averages, n),
        bottom: stats::bottom_rated(&averages, n),
    })
}

/// GET /api/stats/summary
async fn get_summary(State(state): State<AppState>) -> Response {
    ApiResponse::ok(stats::summary(&state.dataset))
}

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/dashboard", get(get_dashboard))
        .route("/products/trends", get(get_product_trends))
        .route("/products/trends/:name", get(get_product_trend))
        .route("/categories/trends", get(get_category_trends))
        .route("/categories/trends/:name", get(get_category_trend))
        .route("/stats/distribution", get(get_distribution))
        .route("/stats/monthly", get(get_monthly))
        .route("/stats/products", get(get_rated_products))
        .route("/stats/summary", get(get_summary))
        .with_state(state);

    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
