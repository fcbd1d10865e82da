//! HTTP request handlers with OpenAPI documentation.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, warn};
use utoipa::OpenApi;
use validator::Validate;

use crate::app::AppState;
use crate::domain::{
    AppError, CacheError, ChartData, ChartSnapshot, ChartType, ContractUsage, DailyAmount,
    DailyCount, DatabaseError, DecodeError, ErrorDetail, ErrorResponse, FeeBurnSummary,
    HealthResponse, HealthStatus, HolderBalance, SortOrder, TransactionPage, TransactionPageQuery,
    TransactionView, ValidationError,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Ledger Explorer API",
        version = "0.1.0",
        description = "Paginated transaction listings and cached aggregate charts of a block ledger",
        license(
            name = "MIT"
        )
    ),
    paths(
        list_transactions_handler,
        get_chart_handler,
        refresh_chart_handler,
        health_check_handler,
        liveness_handler,
    ),
    components(
        schemas(
            TransactionView,
            TransactionPage,
            SortOrder,
            ChartType,
            ChartData,
            ChartSnapshot,
            HolderBalance,
            DailyCount,
            DailyAmount,
            FeeBurnSummary,
            ContractUsage,
            HealthResponse,
            HealthStatus,
            ErrorResponse,
            ErrorDetail,
        )
    ),
    tags(
        (name = "transactions", description = "Block-relative transaction listings"),
        (name = "charts", description = "Cached aggregate charts"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// List transactions of an ecosystem, optionally of one actor
///
/// Pages are computed over the concatenation of all blocks in scope, so
/// `total` is exact and only blocks overlapping the page are decoded.
#[utoipa::path(
    get,
    path = "/transactions",
    tag = "transactions",
    params(TransactionPageQuery),
    responses(
        (status = 200, description = "One page of transactions", body = TransactionPage),
        (status = 400, description = "Invalid paging parameters", body = ErrorResponse),
        (status = 500, description = "Corrupt block data", body = ErrorResponse),
        (status = 503, description = "Database unavailable", body = ErrorResponse)
    )
)]
pub async fn list_transactions_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TransactionPageQuery>,
) -> Result<Json<TransactionPage>, AppError> {
    query.validate().map_err(|e| {
        warn!(error = %e, "Validation failed");
        AppError::Validation(ValidationError::Multiple(e.to_string()))
    })?;
    let page = state
        .explorer
        .get_transaction_page(query.scope(), query.page, query.limit, query.order)
        .await?;
    Ok(Json(page))
}

/// Read a chart
///
/// Never waits for a computation: a cold chart is returned empty with
/// `from_cache = false` and refreshed in the background.
#[utoipa::path(
    get,
    path = "/charts/{chart}/{entity_id}",
    tag = "charts",
    params(
        ("chart" = ChartType, Path, description = "Chart type"),
        ("entity_id" = i64, Path, description = "Ecosystem id")
    ),
    responses(
        (status = 200, description = "Cached chart or empty default", body = ChartSnapshot),
        (status = 400, description = "Unknown chart type or invalid entity", body = ErrorResponse)
    )
)]
pub async fn get_chart_handler(
    State(state): State<Arc<AppState>>,
    Path((chart, entity_id)): Path<(String, i64)>,
) -> Result<Json<ChartSnapshot>, AppError> {
    let chart = parse_chart(&chart)?;
    let snapshot = state.charts.get_chart(chart, entity_id).await?;
    Ok(Json(snapshot))
}

/// Request a chart recomputation
///
/// The request may be dropped under load; the periodic sweep covers it.
#[utoipa::path(
    post,
    path = "/charts/{chart}/{entity_id}/refresh",
    tag = "charts",
    params(
        ("chart" = ChartType, Path, description = "Chart type"),
        ("entity_id" = i64, Path, description = "Ecosystem id")
    ),
    responses(
        (status = 202, description = "Refresh requested"),
        (status = 400, description = "Unknown chart type or invalid entity", body = ErrorResponse)
    )
)]
pub async fn refresh_chart_handler(
    State(state): State<Arc<AppState>>,
    Path((chart, entity_id)): Path<(String, i64)>,
) -> Result<StatusCode, AppError> {
    let chart = parse_chart(&chart)?;
    state.charts.request_refresh(chart, entity_id)?;
    Ok(StatusCode::ACCEPTED)
}

/// Detailed health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse)
    )
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.explorer.health_check().await;
    Json(health)
}

/// Liveness check for the orchestrator
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is alive")
    )
)]
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

fn parse_chart(raw: &str) -> Result<ChartType, AppError> {
    ChartType::from_str(raw).map_err(|message| {
        AppError::Validation(ValidationError::InvalidField {
            field: "chart".to_string(),
            message,
        })
    })
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type, message) = match &self {
            AppError::Database(db_err) => match db_err {
                DatabaseError::Connection(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "database_error",
                    self.to_string(),
                ),
                DatabaseError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "not_found", self.to_string())
                }
                DatabaseError::Query(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    self.to_string(),
                ),
            },
            AppError::Cache(cache_err) => match cache_err {
                CacheError::Connection(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "cache_error",
                    self.to_string(),
                ),
                CacheError::Command(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "cache_error",
                    self.to_string(),
                ),
            },
            AppError::Decode(decode_err) => match decode_err {
                DecodeError::MissingBlock(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "inconsistent_store",
                    self.to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "corrupt_block",
                    self.to_string(),
                ),
            },
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                self.to_string(),
            ),
            AppError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                self.to_string(),
            ),
            AppError::Serialization(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "serialization_error",
                self.to_string(),
            ),
        };

        if status.is_server_error() {
            error!(error_type = %error_type, message = %message, "Server error");
        }

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                r#type: error_type.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}
