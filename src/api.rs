use axum::{
    Json, Router,
    extract::{
        FromRequest, FromRequestParts, Path, Query, Request, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    analytics::{self, AnalyticsReport, Period},
    auth::{Caller, Role},
    errors::{AppError, ErrorDetail},
    geo::Coordinate,
    geofence::DeliveryDecision,
    lifecycle,
    orders::{Order, OrderAck},
    state::AppState,
    status::OrderStatus,
};

const DEFAULT_PAGE_LIMIT: usize = 50;
const MAX_PAGE_LIMIT: usize = 100;

/// `Json` that logs and reports body rejections as `{"error": ...}`.
/// Malformed or wrong-typed bodies are 400; a missing JSON content type
/// stays 415.
pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(LoggedJson(value)),
            Err(rejection) => {
                let status = match &rejection {
                    JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    _ => StatusCode::BAD_REQUEST,
                };
                warn!("rejected request body: {}", rejection.body_text());
                Err((status, Json(json!({ "error": rejection.body_text() }))))
            }
        }
    }
}

/// `Path` whose rejections become [`AppError::Validation`].
pub struct LoggedPath<T>(pub T);

impl<S, T> FromRequestParts<S> for LoggedPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(LoggedPath(value)),
            Err(rejection) => {
                warn!("rejected request path: {}", rejection.body_text());
                Err(AppError::Validation(rejection.body_text()))
            }
        }
    }
}

/// `Query` whose rejections become [`AppError::Validation`].
pub struct LoggedQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for LoggedQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(LoggedQuery(value)),
            Err(rejection) => {
                warn!("rejected query string: {}", rejection.body_text());
                Err(AppError::Validation(rejection.body_text()))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub restaurant_id: String,
    pub total_amount: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCheck {
    pub restaurant_id: Option<String>,
    pub user_location: Option<UserLocation>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub period: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub limit: Option<usize>,
    pub after: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrdersPage {
    pub items: Vec<Order>,
    pub next: Option<String>,
}

/// Places a `pending` order for the calling account.
pub async fn create_order(
    State(state): State<AppState>,
    Caller(caller): Caller,
    LoggedJson(payload): LoggedJson<NewOrder>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    if !(payload.total_amount.is_finite() && payload.total_amount >= 0.0) {
        return Err(AppError::Validation("totalAmount must be a non-negative number".into()));
    }
    let restaurant = state
        .restaurants
        .find_by_id(&payload.restaurant_id)
        .ok_or(AppError::RestaurantNotFound)?;
    if !restaurant.is_active {
        return Err(AppError::Validation("restaurant is not accepting orders".into()));
    }

    let restaurant_id = restaurant.id.clone();
    let order = state.store.place_order(|order_number| {
        Order::place(
            order_number,
            restaurant_id,
            caller.account_id.clone(),
            payload.total_amount,
            payload.notes,
            Utc::now(),
        )
    })?;
    info!(order_id = %order.id, order_number = %order.order_number, restaurant = %restaurant.id, "order created");
    Ok((StatusCode::CREATED, Json(order)))
}

/// Full order record, for the customer who placed it, the restaurant owner or
/// a super admin.
pub async fn get_order(
    State(state): State<AppState>,
    Caller(caller): Caller,
    LoggedPath(order_id): LoggedPath<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .store
        .get_order(order_id)?
        .ok_or(AppError::OrderNotFound(order_id))?;

    let owns_restaurant = order
        .restaurant_id
        .as_deref()
        .and_then(|id| state.restaurants.find_by_owner_and_id(&caller.account_id, id))
        .is_some();
    if caller.role == Role::SuperAdmin || order.customer_id == caller.account_id || owns_restaurant {
        Ok(Json(order))
    } else {
        Err(AppError::AccessDenied)
    }
}

pub async fn update_status(
    State(state): State<AppState>,
    Caller(caller): Caller,
    LoggedPath(order_id): LoggedPath<Uuid>,
    LoggedJson(payload): LoggedJson<StatusUpdate>,
) -> Result<Json<OrderAck>, AppError> {
    let status = payload
        .status
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::Validation("status is required".into()))?;

    let updated = lifecycle::transition(
        &state.store,
        &state.restaurants,
        order_id,
        &status,
        &caller.account_id,
        payload.reason.as_deref(),
    )?;
    Ok(Json(OrderAck::from(&updated)))
}

/// Always 200 once the input is well formed; refusal is part of the body.
pub async fn validate_delivery(
    State(state): State<AppState>,
    LoggedJson(payload): LoggedJson<DeliveryCheck>,
) -> Result<Json<DeliveryDecision>, AppError> {
    let (Some(restaurant_id), Some(location)) = (payload.restaurant_id, payload.user_location) else {
        return Err(AppError::MissingLocation);
    };
    let (Some(latitude), Some(longitude)) = (location.latitude, location.longitude) else {
        return Err(AppError::MissingLocation);
    };
    if restaurant_id.trim().is_empty() {
        return Err(AppError::MissingLocation);
    }
    let customer = Coordinate::new(latitude, longitude);
    customer.validate()?;

    let decision = state.geofence.evaluate(&restaurant_id, customer);
    info!(
        restaurant = %restaurant_id,
        can_deliver = decision.can_deliver,
        distance = ?decision.distance,
        "delivery checked"
    );
    Ok(Json(decision))
}

pub async fn restaurant_analytics(
    State(state): State<AppState>,
    Caller(caller): Caller,
    LoggedPath(restaurant_id): LoggedPath<String>,
    LoggedQuery(query): LoggedQuery<AnalyticsQuery>,
) -> Result<Json<AnalyticsReport>, AppError> {
    let period = match query.period.as_deref() {
        Some(raw) => raw.parse::<Period>()?,
        None => Period::default(),
    };
    let report = analytics::summarize(
        &state.store,
        &state.restaurants,
        &caller.account_id,
        &restaurant_id,
        period,
        Utc::now(),
    )?;
    Ok(Json(report))
}

/// Dashboard listing of a restaurant's orders, oldest first.
pub async fn restaurant_orders(
    State(state): State<AppState>,
    Caller(caller): Caller,
    LoggedPath(restaurant_id): LoggedPath<String>,
    LoggedQuery(query): LoggedQuery<OrdersQuery>,
) -> Result<(HeaderMap, Json<OrdersPage>), AppError> {
    let restaurant = state
        .restaurants
        .find_by_id(&restaurant_id)
        .ok_or(AppError::RestaurantNotFound)?;
    if restaurant.owner != caller.account_id && caller.role != Role::SuperAdmin {
        return Err(AppError::AccessDenied);
    }

    let status_filter: Option<OrderStatus> = match query.status.as_deref() {
        Some(raw) => Some(OrderStatus::from_requested(raw)?),
        None => None,
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);

    let (items, next) = state.store.page_restaurant_orders(
        &restaurant.id,
        query.after.as_deref(),
        limit,
        |order| status_filter.is_none_or(|s| order.status == s),
    )?;

    let mut headers = HeaderMap::new();
    headers.insert("x-effective-limit", HeaderValue::from(limit));
    Ok((headers, Json(OrdersPage { items, next })))
}

/// Adds the internal detail of a 500 to its body when configured to.
async fn expose_error_detail(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let res = next.run(req).await;
    if !state.config.expose_error_detail {
        return res;
    }
    match res.extensions().get::<ErrorDetail>().cloned() {
        Some(ErrorDetail(detail)) => (
            res.status(),
            Json(json!({ "error": "internal server error", "detail": detail })),
        )
            .into_response(),
        None => res,
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/status", patch(update_status))
        .route("/delivery/validate", post(validate_delivery))
        .route("/restaurants/{id}/analytics", get(restaurant_analytics))
        .route("/restaurants/{id}/orders", get(restaurant_orders))
        .layer(middleware::from_fn_with_state(state.clone(), expose_error_detail))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
