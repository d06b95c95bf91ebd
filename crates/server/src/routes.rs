//! Suggestion and cutting-list routes.
//!
//! JSON API Endpoints:
//! - `GET  /suggestions/products`     — product-name autocomplete
//! - `GET  /suggestions/sizes`        — sizes learned for a product
//! - `GET  /suggestions/profiles`     — profiles for a product/size context
//! - `GET  /suggestions/combinations` — full combinations for a context
//! - `GET  /suggestions/statistics`   — corpus-wide aggregates
//! - `POST /suggestions/apply`        — build a complete line item
//! - `POST /suggestions/cleanup`      — run the retention sweep
//! - `POST /suggestions/reseed`       — rebuild patterns from history
//! - `POST /cutting-lists/items`      — record a line item and learn from it
//!
//! Every response carries the `{success, data | error}` envelope. Failures
//! get a fresh correlation id, logged alongside the real error; the body
//! only ever carries the generic user-facing message.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use cutplan_core::domain::cutting_list::{CuttingList, CuttingListId, CuttingListItem};
use cutplan_core::errors::{ApplicationError, InterfaceError};
use cutplan_core::suggestions::{
    keys, AppliedSuggestion, CombinationSuggestion, EngineStatistics, LineItemObservation,
    ProductSuggestion, ProfileSuggestion, SizeSuggestion,
};
use cutplan_engine::{ExtractionReport, SweepReport};

use crate::bootstrap::AppState;

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self { success: true, data: Some(data), error: None, correlation_id: None }),
        )
    }
}

fn failure<T>(error: ApplicationError) -> (StatusCode, Json<ApiResponse<T>>) {
    let correlation_id = Uuid::new_v4().to_string();
    error!(
        event_name = "api.request.failed",
        correlation_id = %correlation_id,
        error = %error,
        "request failed"
    );

    let interface = error.into_interface(correlation_id.clone());
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(interface.user_message().to_string()),
            correlation_id: Some(correlation_id),
        }),
    )
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ProductsQuery {
    #[serde(default)]
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SizesQuery {
    pub product: String,
    #[serde(default)]
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ProfilesQuery {
    pub product: String,
    pub size: String,
    #[serde(default)]
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CombinationsQuery {
    pub product: String,
    pub size: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub product: String,
    pub size: String,
    pub order_quantity: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CleanupRequest {
    #[serde(default)]
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LineEntryRequest {
    pub profile: Option<String>,
    pub measurement: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordLineItemRequest {
    pub cutting_list_id: Option<String>,
    pub product_name: String,
    pub size: String,
    pub order_quantity: i64,
    pub entries: Vec<LineEntryRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedLineItem {
    pub cutting_list_id: String,
    pub entry_count: usize,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/suggestions/products", get(products))
        .route("/suggestions/sizes", get(sizes))
        .route("/suggestions/profiles", get(profiles))
        .route("/suggestions/combinations", get(combinations))
        .route("/suggestions/statistics", get(statistics))
        .route("/suggestions/apply", post(apply))
        .route("/suggestions/cleanup", post(cleanup))
        .route("/suggestions/reseed", post(reseed))
        .route("/cutting-lists/items", post(record_line_item))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn products(
    State(state): State<AppState>,
    Query(params): Query<ProductsQuery>,
) -> (StatusCode, Json<ApiResponse<Vec<ProductSuggestion>>>) {
    match state.suggestions.products(&params.query, params.limit).await {
        Ok(data) => ApiResponse::ok(data),
        Err(error) => failure(error),
    }
}

pub async fn sizes(
    State(state): State<AppState>,
    Query(params): Query<SizesQuery>,
) -> (StatusCode, Json<ApiResponse<Vec<SizeSuggestion>>>) {
    match state.suggestions.sizes(&params.product, &params.query, params.limit).await {
        Ok(data) => ApiResponse::ok(data),
        Err(error) => failure(error),
    }
}

pub async fn profiles(
    State(state): State<AppState>,
    Query(params): Query<ProfilesQuery>,
) -> (StatusCode, Json<ApiResponse<Vec<ProfileSuggestion>>>) {
    match state.suggestions.profiles(&params.product, &params.size, &params.query, params.limit).await
    {
        Ok(data) => ApiResponse::ok(data),
        Err(error) => failure(error),
    }
}

pub async fn combinations(
    State(state): State<AppState>,
    Query(params): Query<CombinationsQuery>,
) -> (StatusCode, Json<ApiResponse<Vec<CombinationSuggestion>>>) {
    match state.suggestions.combinations(&params.product, &params.size, params.limit).await {
        Ok(data) => ApiResponse::ok(data),
        Err(error) => failure(error),
    }
}

pub async fn statistics(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<EngineStatistics>>) {
    match state.suggestions.statistics().await {
        Ok(data) => ApiResponse::ok(data),
        Err(error) => failure(error),
    }
}

pub async fn apply(
    State(state): State<AppState>,
    Json(request): Json<ApplyRequest>,
) -> (StatusCode, Json<ApiResponse<AppliedSuggestion>>) {
    match state.suggestions.apply(&request.product, &request.size, request.order_quantity).await
    {
        Ok(data) => ApiResponse::ok(data),
        Err(error) => failure(error),
    }
}

pub async fn cleanup(
    State(state): State<AppState>,
    Json(request): Json<CleanupRequest>,
) -> (StatusCode, Json<ApiResponse<SweepReport>>) {
    match state.sweeper.cleanup(request.days).await {
        Ok(data) => ApiResponse::ok(data),
        Err(error) => failure(error),
    }
}

pub async fn reseed(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<ExtractionReport>>) {
    match state.extractor.reseed().await {
        Ok(data) => ApiResponse::ok(data),
        Err(error) => failure(error),
    }
}

/// Persist the new line item first; learning is fire-and-forget so the write
/// path never waits on (or fails because of) the pattern store.
pub async fn record_line_item(
    State(state): State<AppState>,
    Json(request): Json<RecordLineItemRequest>,
) -> (StatusCode, Json<ApiResponse<RecordedLineItem>>) {
    if let Err(error) = keys::context_key(&request.product_name, &request.size) {
        return failure(error.into());
    }
    if request.order_quantity < 0 {
        return failure(ApplicationError::Domain(
            cutplan_core::errors::DomainError::NonPositiveQuantity {
                field: "order_quantity",
                value: request.order_quantity,
            },
        ));
    }

    let id = request.cutting_list_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let now = Utc::now();
    let items: Vec<CuttingListItem> = request
        .entries
        .into_iter()
        .map(|entry| CuttingListItem {
            profile: entry.profile,
            measurement: entry.measurement,
            quantity: entry.quantity,
        })
        .collect();

    let list = CuttingList {
        id: CuttingListId(id.clone()),
        product_name: request.product_name.clone(),
        size: request.size.clone(),
        order_quantity: request.order_quantity,
        created_at: now,
        items: items.clone(),
    };
    if let Err(error) = state.history.save_list(&list).await {
        return failure(ApplicationError::Persistence(error.to_string()));
    }

    state.learner.submit(LineItemObservation {
        product_name: request.product_name,
        size: request.size,
        order_quantity: request.order_quantity,
        observed_at: now,
        entries: items,
    });

    ApiResponse::ok(RecordedLineItem { cutting_list_id: id, entry_count: list.items.len() })
}
