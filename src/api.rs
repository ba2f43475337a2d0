//! HTTP surface.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Path, Request, State},
    http::{request::Parts, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use validator::Validate;

use crate::cart::{AddToCart, CartService};
use crate::checkout::{OrderLedger, PlaceOrder, StatusUpdate};
use crate::domain::aggregates::{Cart, Order, OrderStatus, PaymentMethod, PaymentResult, PaymentStatus, ShippingAddress};
use crate::domain::value_objects::Money;
use crate::error::{CheckoutError, Result};
use crate::requester::{Requester, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Clone)]
pub struct AppState { pub ledger: Arc<OrderLedger>, pub carts: Arc<CartService> }

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "techpk-checkout"})) }))
        .route("/api/v1/orders", get(my_orders).post(place_order))
        .route("/api/v1/orders/admin/all", get(all_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/status", put(update_status))
        .route("/api/v1/cart", get(get_cart))
        .route("/api/v1/cart/add", post(add_to_cart))
        .route("/api/v1/cart/update/:item_id", put(update_cart_item))
        .route("/api/v1/cart/remove/:item_id", delete(remove_from_cart))
        .route("/api/v1/cart/clear", delete(clear_cart))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Requester {
    type Rejection = CheckoutError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let id = header(parts, USER_ID_HEADER).and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| CheckoutError::Unauthenticated("Authentication required".into()))?;
        let role = match header(parts, USER_ROLE_HEADER) {
            None => Role::Customer,
            Some(v) => v.parse().map_err(CheckoutError::Unauthenticated)?,
        };
        Ok(Requester { id, role })
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn require_admin(requester: &Requester) -> Result<()> {
    if requester.is_admin() { Ok(()) } else { Err(CheckoutError::Forbidden("Not authorized as admin".into())) }
}

/// JSON body that has passed `validator` checks.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = CheckoutError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| CheckoutError::Validation(e.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")] pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")] pub total_revenue: Option<Money>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> { Json(Self { success: true, count: None, total_revenue: None, data }) }
}

impl<T> ApiResponse<Vec<T>> {
    fn list(data: Vec<T>) -> Json<Self> { Json(Self { success: true, count: Some(data.len()), total_revenue: None, data }) }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView { #[serde(flatten)] pub cart: Cart, pub total_price: Money }

impl From<Cart> for CartView {
    fn from(cart: Cart) -> Self { let total_price = cart.total_price(); Self { cart, total_price } }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    #[validate]
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_result: Option<PaymentResult>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest { pub order_status: Option<OrderStatus>, pub payment_status: Option<PaymentStatus> }

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be a positive integer"))]
    pub quantity: Option<u32>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, message = "Quantity must be a positive integer"))]
    pub quantity: u32,
}

async fn place_order(State(s): State<AppState>, who: Requester, ValidJson(r): ValidJson<PlaceOrderRequest>) -> Result<(StatusCode, Json<ApiResponse<Order>>)> {
    let request = PlaceOrder { shipping_address: r.shipping_address, payment_method: r.payment_method, payment_result: r.payment_result };
    let order = s.ledger.place_order(who.id, request).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(order)))
}

async fn my_orders(State(s): State<AppState>, who: Requester) -> Result<Json<ApiResponse<Vec<Order>>>> {
    Ok(ApiResponse::list(s.ledger.orders_for_user(who.id).await?))
}

async fn get_order(State(s): State<AppState>, who: Requester, Path(id): Path<Uuid>) -> Result<Json<ApiResponse<Order>>> {
    Ok(ApiResponse::ok(s.ledger.order_by_id(id, &who).await?))
}

async fn update_status(State(s): State<AppState>, who: Requester, Path(id): Path<Uuid>, ValidJson(r): ValidJson<UpdateStatusRequest>) -> Result<Json<ApiResponse<Order>>> {
    require_admin(&who)?;
    let order = s.ledger.update_order_status(id, StatusUpdate { order_status: r.order_status, payment_status: r.payment_status }).await?;
    Ok(ApiResponse::ok(order))
}

async fn all_orders(State(s): State<AppState>, who: Requester) -> Result<Json<ApiResponse<Vec<Order>>>> {
    require_admin(&who)?;
    let report = s.ledger.all_orders().await?;
    let Json(mut body) = ApiResponse::list(report.orders);
    body.total_revenue = Some(report.total_revenue);
    Ok(Json(body))
}

async fn get_cart(State(s): State<AppState>, who: Requester) -> Result<Json<ApiResponse<CartView>>> {
    Ok(ApiResponse::ok(s.carts.get_cart(who.id).await?.into()))
}

async fn add_to_cart(State(s): State<AppState>, who: Requester, ValidJson(r): ValidJson<AddToCartRequest>) -> Result<Json<ApiResponse<CartView>>> {
    let req = AddToCart { product_id: r.product_id, quantity: r.quantity.unwrap_or(1), color: r.color };
    Ok(ApiResponse::ok(s.carts.add_item(who.id, req).await?.into()))
}

async fn update_cart_item(State(s): State<AppState>, who: Requester, Path(item_id): Path<Uuid>, ValidJson(r): ValidJson<UpdateCartItemRequest>) -> Result<Json<ApiResponse<CartView>>> {
    Ok(ApiResponse::ok(s.carts.update_item(who.id, item_id, r.quantity).await?.into()))
}

async fn remove_from_cart(State(s): State<AppState>, who: Requester, Path(item_id): Path<Uuid>) -> Result<Json<ApiResponse<CartView>>> {
    Ok(ApiResponse::ok(s.carts.remove_item(who.id, item_id).await?.into()))
}

async fn clear_cart(State(s): State<AppState>, who: Requester) -> Result<Json<ApiResponse<CartView>>> {
    Ok(ApiResponse::ok(s.carts.clear(who.id).await?.into()))
}
