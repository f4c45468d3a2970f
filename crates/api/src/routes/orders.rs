//! Order command and query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{
    CancelOrder, ChangeDeliveryAddress, CommandResult, CompleteDelivery, CreateOrder, Money,
    Order, PayOrder, Payment, ShopItem, SubmitOrder, UpdateShopItems,
};
use projections::OrderProjection;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct ShopItemRequest {
    pub sku: String,
    pub title: String,
    pub quantity: u32,
    pub price_cents: i64,
}

impl From<ShopItemRequest> for ShopItem {
    fn from(req: ShopItemRequest) -> Self {
        ShopItem::new(req.sku, req.title, req.quantity, Money::from_cents(req.price_cents))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub shop_items: Vec<ShopItemRequest>,
    pub account_email: String,
    pub delivery_address: String,
}

#[derive(Debug, Deserialize)]
pub struct PayOrderRequest {
    pub payment_id: String,
    /// Defaults to the time the request is handled.
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub cancel_reason: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateShopItemsRequest {
    pub shop_items: Vec<ShopItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeDeliveryAddressRequest {
    pub delivery_address: String,
}

// -- Response types --

/// Returned by every command endpoint.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub order_id: String,
    pub version: i64,
}

impl CommandResponse {
    fn from_result(order_id: OrderId, result: &CommandResult<Order>) -> Json<Self> {
        Json(Self {
            order_id: order_id.to_string(),
            version: result.new_version.as_i64(),
        })
    }
}

// -- Handlers --

/// POST /orders: create a new order.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let cmd = CreateOrder::new(
        req.shop_items.into_iter().map(ShopItem::from).collect(),
        req.account_email,
        req.delivery_address,
    );
    let order_id = cmd.order_id;
    let result = state.orders.create_order(cmd).await?;

    Ok((
        StatusCode::CREATED,
        CommandResponse::from_result(order_id, &result),
    ))
}

/// POST /orders/{id}/pay
#[tracing::instrument(skip(state, req))]
pub async fn pay(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PayOrderRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let payment = Payment::new(req.payment_id, req.paid_at.unwrap_or_else(Utc::now));
    let result = state
        .orders
        .pay_order(PayOrder::new(order_id, payment))
        .await?;
    Ok(CommandResponse::from_result(order_id, &result))
}

/// POST /orders/{id}/submit
#[tracing::instrument(skip(state))]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let result = state.orders.submit_order(SubmitOrder::new(order_id)).await?;
    Ok(CommandResponse::from_result(order_id, &result))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state, req))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CancelOrderRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let result = state
        .orders
        .cancel_order(CancelOrder::new(order_id, req.cancel_reason))
        .await?;
    Ok(CommandResponse::from_result(order_id, &result))
}

/// POST /orders/{id}/deliver: marks the order delivered now.
#[tracing::instrument(skip(state))]
pub async fn deliver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let result = state
        .orders
        .complete_delivery(CompleteDelivery::now(order_id))
        .await?;
    Ok(CommandResponse::from_result(order_id, &result))
}

/// PUT /orders/{id}/items: replace the shop items.
#[tracing::instrument(skip(state, req))]
pub async fn update_items(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateShopItemsRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let items = req.shop_items.into_iter().map(ShopItem::from).collect();
    let result = state
        .orders
        .update_shop_items(UpdateShopItems::new(order_id, items))
        .await?;
    Ok(CommandResponse::from_result(order_id, &result))
}

/// PUT /orders/{id}/address
#[tracing::instrument(skip(state, req))]
pub async fn change_address(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ChangeDeliveryAddressRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let result = state
        .orders
        .change_delivery_address(ChangeDeliveryAddress::new(order_id, req.delivery_address))
        .await?;
    Ok(CommandResponse::from_result(order_id, &result))
}

/// GET /orders/{id}: the order's projection document.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderProjection>, ApiError> {
    let order_id = parse_order_id(&id)?;
    Ok(Json(state.queries.get_by_id(order_id).await?))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}
