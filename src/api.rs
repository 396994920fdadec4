//! HTTP surface.
//!
//! The confirmation endpoint always answers `200` with `{status: "OK" | "FAILED"}`;
//! the other endpoints map errors onto status codes.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::discounts::DiscountResolver;
use crate::domain::aggregates::ReviewError;
use crate::orders::{Caller, ConfirmOrderRequest, LineOutcome, OrderService, SubmitReviewRequest};
use crate::store::LineKey;
use crate::EngineError;

pub const CUSTOMER_HEADER: &str = "x-customer-id";
pub const STAFF_HEADER: &str = "x-staff";

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub discounts: Arc<DiscountResolver>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Ok,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<LineOutcome>>,
}

impl ApiResponse {
    pub fn ok(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self { status: ResponseStatus::Ok, data: Some(data), message: None, lines: None },
            Err(e) => {
                error!(error = %e, "response encoding failed");
                Self::failed("Something went wrong.")
            }
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { status: ResponseStatus::Failed, data: None, message: Some(message.into()), lines: None }
    }

    fn with_lines(mut self, lines: Vec<LineOutcome>) -> Self {
        if !lines.is_empty() {
            self.lines = Some(lines);
        }
        self
    }
}

/// Error side of the non-confirmation endpoints.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self { Self(e) }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::InvalidPhone | EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            EngineError::Review(ReviewError::InvalidRating(_)) => StatusCode::BAD_REQUEST,
            EngineError::Review(_) | EngineError::NothingReserved => StatusCode::CONFLICT,
            EngineError::OrderNotFound | EngineError::OrderedProductNotFound | EngineError::CustomerNotFound => StatusCode::NOT_FOUND,
            EngineError::Unauthorized => StatusCode::UNAUTHORIZED,
            EngineError::Forbidden => StatusCode::FORBIDDEN,
            EngineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::OrderIdExhausted(_) | EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (status, Json(ApiResponse::failed(public_message(&self.0)))).into_response()
    }
}

/// Internal failures are reported generically.
fn public_message(e: &EngineError) -> String {
    match e {
        EngineError::Storage(_) | EngineError::OrderIdExhausted(_) => "Something went wrong.".to_string(),
        other => other.to_string(),
    }
}

type CallerRejection = (StatusCode, Json<ApiResponse>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = CallerRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let customer_id = match parts.headers.get(CUSTOMER_HEADER) {
            None => None,
            Some(value) => {
                let parsed = value.to_str().ok().and_then(|v| Uuid::parse_str(v.trim()).ok());
                Some(parsed.ok_or_else(|| (StatusCode::BAD_REQUEST, Json(ApiResponse::failed("Invalid customer id header"))))?)
            }
        };
        let is_staff = parts
            .headers
            .get(STAFF_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");
        Ok(Caller { customer_id, is_staff })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-orders"})) }))
        .route("/api/v1/orders/confirm", post(confirm_order))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:order_id", get(get_order))
        .route("/api/v1/reviews", post(submit_review))
        .route("/api/v1/reviews/approve", post(approve_review))
        .route("/api/v1/reviews/:product_id", get(list_reviews))
        .route("/api/v1/offers/validate-coupon/:code", get(validate_coupon))
        .route("/api/v1/offers/flat-discount", get(flat_discount))
        .with_state(state)
}

async fn confirm_order(
    State(s): State<AppState>,
    caller: Result<Caller, CallerRejection>,
    payload: Result<Json<ConfirmOrderRequest>, JsonRejection>,
) -> Json<ApiResponse> {
    let caller = match caller {
        Ok(caller) => caller,
        Err((_, response)) => return response,
    };
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return Json(ApiResponse::failed(rejection.body_text())),
    };
    match s.orders.confirm(&caller, request).await {
        Ok(confirmation) => {
            let view = confirmation.order.view(caller.is_staff);
            Json(ApiResponse::ok(view).with_lines(confirmation.lines))
        }
        Err(e) => {
            if matches!(e, EngineError::Storage(_) | EngineError::OrderIdExhausted(_) | EngineError::Timeout(_)) {
                error!(error = %e, "order confirmation failed");
            }
            Json(ApiResponse::failed(public_message(&e)))
        }
    }
}

async fn list_orders(State(s): State<AppState>, caller: Caller) -> Result<Json<ApiResponse>, ApiError> {
    let orders = s.orders.list_orders(&caller).await?;
    let views: Vec<_> = orders.iter().map(|o| o.view(caller.is_staff)).collect();
    Ok(Json(ApiResponse::ok(views)))
}

async fn get_order(State(s): State<AppState>, caller: Caller, Path(order_id): Path<String>) -> Result<Json<ApiResponse>, ApiError> {
    let order = s.orders.get_order(&caller, &order_id).await?;
    Ok(Json(ApiResponse::ok(order.view(caller.is_staff))))
}

async fn submit_review(
    State(s): State<AppState>,
    caller: Caller,
    payload: Result<Json<SubmitReviewRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApiError> {
    let Json(request) = payload.map_err(|r| EngineError::InvalidRequest(r.body_text()))?;
    let line = s.orders.submit_review(&caller, request).await?;
    Ok(Json(ApiResponse::ok(line)))
}

async fn approve_review(
    State(s): State<AppState>,
    caller: Caller,
    payload: Result<Json<LineKey>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApiError> {
    let Json(key) = payload.map_err(|r| EngineError::InvalidRequest(r.body_text()))?;
    let line = s.orders.approve_review(&caller, &key).await?;
    Ok(Json(ApiResponse::ok(line)))
}

async fn list_reviews(State(s): State<AppState>, caller: Caller, Path(product_id): Path<String>) -> Result<Json<ApiResponse>, ApiError> {
    let reviews = s.orders.list_reviews(&caller, &product_id).await?;
    Ok(Json(ApiResponse::ok(reviews)))
}

async fn validate_coupon(State(s): State<AppState>, Path(code): Path<String>) -> Result<Json<ApiResponse>, ApiError> {
    let resolution = s.discounts.resolve_coupon(&code).await.map_err(EngineError::from)?;
    Ok(Json(ApiResponse::ok(resolution)))
}

async fn flat_discount(State(s): State<AppState>) -> Result<Json<ApiResponse>, ApiError> {
    let resolution = s.discounts.resolve_flat_discount().await.map_err(EngineError::from)?;
    Ok(Json(ApiResponse::ok(resolution)))
}
