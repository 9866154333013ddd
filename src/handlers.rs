use crate::auth::SessionUser;
use crate::config::Config;
use crate::dashboard;
use crate::errors::AppError;
use crate::follow_ups::FollowUpStore;
use crate::ingestion::SaleOrderIngestion;
use crate::models::*;
use crate::payments::PaymentStatusLookup;
use crate::renewal_collection::RenewalCollection;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// ERP sale order ingestion.
    pub ingestion: Arc<SaleOrderIngestion>,
    /// Follow-up notes per sale.
    pub follow_ups: Arc<dyn FollowUpStore>,
    /// Payment processor lookups.
    pub payments: Arc<dyn PaymentStatusLookup>,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-sales-ops-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/v1/erp/health
///
/// Probes the ERP's `common` endpoint. Answers 503 when it is unreachable.
pub async fn erp_health(
    State(state): State<Arc<AppState>>,
    _user: SessionUser,
) -> (StatusCode, Json<serde_json::Value>) {
    let reachable = state.ingestion.client().check_endpoint().await;
    let status = if reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(json!({ "erp": reachable })))
}

/// GET /api/v1/sale-orders?month=YYYY-MM
///
/// Sale orders created in the month, with payment status and follow-ups.
pub async fn list_sale_orders(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    Query(params): Query<MonthQuery>,
) -> Result<Json<Vec<DashboardRow>>, AppError> {
    let month = params
        .month
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Month parameter is required".to_string()))?;
    tracing::info!("GET /sale-orders month={} user={}", month, user.email);

    let records = state.ingestion.fetch_month(&month).await?;
    let rows = dashboard::build_dashboard(
        records,
        state.follow_ups.as_ref(),
        state.payments.as_ref(),
    )
    .await?;

    Ok(Json(rows))
}

/// GET /api/v1/payments/status?so=S00219
pub async fn payment_status(
    State(state): State<Arc<AppState>>,
    _user: SessionUser,
    Query(params): Query<SaleReferenceQuery>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let so = params
        .so
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("so parameter is required".to_string()))?;

    let paid = state.payments.find_payment_by_sale_reference(&so).await?;

    Ok(Json(PaymentStatusResponse { so, paid }))
}

/// GET /api/v1/payments/intents/:id
pub async fn payment_intent(
    State(state): State<Arc<AppState>>,
    _user: SessionUser,
    Path(intent_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .payments
        .get_payment_intent(&intent_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Payment intent not found".to_string()))
}

/// GET /api/v1/renewal-collection
///
/// Cumulative collected and outstanding amounts for the last four weeks.
pub async fn renewal_collection(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
) -> Result<Json<RenewalCollectionReport>, AppError> {
    tracing::info!("GET /renewal-collection user={}", user.email);

    let report = RenewalCollection::new(state.ingestion.client().clone())
        .report(Utc::now().date_naive())
        .await?;

    Ok(Json(report))
}

/// POST /api/v1/follow-ups
pub async fn create_follow_up(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    Json(payload): Json<NewFollowUp>,
) -> Result<(StatusCode, Json<FollowUp>), AppError> {
    if payload.sale_id.trim().is_empty() {
        return Err(AppError::BadRequest("Sale ID is required".to_string()));
    }

    let follow_up = state
        .follow_ups
        .create_follow_up(payload, &user.email)
        .await?;

    Ok((StatusCode::CREATED, Json(follow_up)))
}

/// GET /api/v1/follow-ups?saleId=11
pub async fn list_follow_ups(
    State(state): State<Arc<AppState>>,
    _user: SessionUser,
    Query(params): Query<FollowUpListQuery>,
) -> Result<Json<Vec<FollowUp>>, AppError> {
    let sale_id = params
        .sale_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Sale ID is required".to_string()))?;

    let follow_ups = state.follow_ups.get_follow_ups_by_sale_id(&sale_id).await?;
    Ok(Json(follow_ups))
}

/// GET /api/v1/follow-ups/:id
pub async fn get_follow_up(
    State(state): State<Arc<AppState>>,
    _user: SessionUser,
    Path(id): Path<Uuid>,
) -> Result<Json<FollowUp>, AppError> {
    state
        .follow_ups
        .get_follow_up(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Follow-up {} not found", id)))
}

/// PATCH /api/v1/follow-ups/:id
pub async fn update_follow_up(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    Path(id): Path<Uuid>,
    Json(update): Json<FollowUpUpdate>,
) -> Result<Json<FollowUp>, AppError> {
    tracing::info!("Follow-up {} updated by {}", id, user.email);

    state
        .follow_ups
        .update_follow_up(id, update)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Follow-up {} not found", id)))
}

/// DELETE /api/v1/follow-ups/:id
pub async fn delete_follow_up(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.follow_ups.delete_follow_up(id).await? {
        return Err(AppError::NotFound(format!("Follow-up {} not found", id)));
    }

    tracing::info!("Follow-up {} deleted by {}", id, user.email);
    Ok(StatusCode::NO_CONTENT)
}
