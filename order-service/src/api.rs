use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use shared::OrderMessage;
use tracing::{error, info};

use crate::error::AppError;
use crate::models::Order;
use crate::queue::DynPublisher;
use crate::store::DynStore;

#[derive(Clone)]
pub struct AppState {
    pub store: DynStore,
    pub publisher: DynPublisher,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub ticket_id: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

type ApiResult<T> = Result<T, AppError>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order).get(get_orders))
        .route("/orders/reset-sequence", post(reset_order_sequence))
        .route("/orders/ticket/:id", delete(delete_orders_by_ticket))
        .route("/orders/:id", get(get_orders_by_ticket).delete(delete_order))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

/// Queues the order and answers 202 straight away. Whether a ticket was
/// actually available is only known to the consumer.
pub async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let Json(request) = payload?;
    let message = OrderMessage::new(request.ticket_id);

    state
        .publisher
        .publish(&message)
        .await
        .map_err(|e| AppError::internal("Failed to publish order", e))?;

    info!(ticket_id = request.ticket_id, "Order queued for processing");
    Ok((
        StatusCode::ACCEPTED,
        MessageResponse::new("Order received for processing"),
    ))
}

pub async fn get_orders(State(state): State<AppState>) -> ApiResult<Json<Vec<Order>>> {
    let orders = state
        .store
        .all_orders_unscoped()
        .await
        .map_err(|e| AppError::internal("Failed to load orders", e))?;
    Ok(Json(orders))
}

/// `id` is a ticket id; answers with every live order for that ticket.
pub async fn get_orders_by_ticket(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
) -> ApiResult<Json<Vec<Order>>> {
    let Path(ticket_id) = id?;
    let orders = match state.store.orders_for_ticket(ticket_id).await {
        Ok(orders) => orders,
        Err(e) => {
            error!(ticket_id, error = %e, "Failed to load orders for ticket");
            Vec::new()
        }
    };

    if orders.is_empty() {
        return Err(AppError::NotFound("Order not found".to_string()));
    }
    Ok(Json(orders))
}

pub async fn delete_order(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Path(order_id) = id?;
    let affected = match state.store.delete_order(order_id).await {
        Ok(affected) => affected,
        Err(e) => {
            error!(order_id, error = %e, "Failed to delete order");
            0
        }
    };

    if affected == 0 {
        return Err(AppError::NotFound("Order not found".to_string()));
    }
    info!(order_id, "Order deleted");
    Ok(MessageResponse::new("Order deleted successfully"))
}

pub async fn delete_orders_by_ticket(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Path(ticket_id) = id?;
    let affected = state
        .store
        .delete_orders_for_ticket_unscoped(ticket_id)
        .await
        .map_err(|e| AppError::internal("Failed to delete orders", e))?;

    if affected == 0 {
        return Err(AppError::NotFound(
            "No orders found for the given ticket ID".to_string(),
        ));
    }
    info!(ticket_id, affected, "Orders deleted for ticket");
    Ok(MessageResponse::new("Orders deleted successfully"))
}

/// Administrative: restarts order ids at 1 without looking at the table.
pub async fn reset_order_sequence(
    State(state): State<AppState>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .store
        .reset_order_sequence()
        .await
        .map_err(|e| AppError::internal("Failed to reset order sequence", e))?;

    info!("Order sequence reset");
    Ok(MessageResponse::new("Order sequence reset successfully"))
}

pub async fn health_check() -> &'static str {
    "OK"
}
