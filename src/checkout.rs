//! Order ledger: turns a user's cart into an order and keeps stock in step.
//!
//! Placing an order is a unit of work spanning the order record, one stock
//! decrement per line item, and the cart clear. Every step that succeeds is
//! recorded; if a later step fails the recorded steps are compensated in
//! reverse order, so a failed checkout leaves stock, orders and the cart as
//! they were.

use std::sync::Arc;

use chrono::Utc;
use futures::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{
    CartItem, LineItem, NewOrder, Order, OrderStatus, PaymentMethod, PaymentResult, PaymentStatus, PricingPolicy,
    ShippingAddress,
};
use crate::domain::events::OrderEvent;
use crate::domain::order_number;
use crate::domain::value_objects::Money;
use crate::error::{CheckoutError, Result};
use crate::events::EventBus;
use crate::requester::Requester;
use crate::store::{StorageContext, StoreError};

/// Attempts at finding a free order number before giving up.
pub const MAX_ORDER_NUMBER_ATTEMPTS: usize = 5;

#[derive(Clone, Debug)]
pub struct PlaceOrder {
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_result: Option<PaymentResult>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate { pub order_status: Option<OrderStatus>, pub payment_status: Option<PaymentStatus> }

#[derive(Clone, Debug)]
pub struct OrdersReport { pub orders: Vec<Order>, pub total_revenue: Money }

type NumberSource = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub struct OrderLedger {
    storage: StorageContext,
    pricing: PricingPolicy,
    events: EventBus,
    next_number: NumberSource,
}

impl OrderLedger {
    pub fn new(storage: StorageContext, pricing: PricingPolicy) -> Self {
        Self { storage, pricing, events: EventBus::disabled(), next_number: Arc::new(order_number::generate) }
    }

    pub fn with_events(mut self, events: EventBus) -> Self { self.events = events; self }

    /// Overrides where order numbers come from.
    pub fn with_order_numbers(mut self, source: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.next_number = Arc::new(source);
        self
    }

    #[instrument(skip(self, request), fields(payment_method = %request.payment_method))]
    pub async fn place_order(&self, user_id: Uuid, request: PlaceOrder) -> Result<Order> {
        request.shipping_address.validate()?;

        let cart = self.storage.carts.get(user_id).await?
            .filter(|c| !c.is_empty())
            .ok_or(CheckoutError::EmptyCart)?;

        let items = try_join_all(cart.items.iter().map(|item| self.snapshot(item))).await?;
        let totals = self.pricing.totals(cart.total_price());
        let new = NewOrder {
            user_id, items, shipping_address: request.shipping_address,
            payment_method: request.payment_method, payment_result: request.payment_result, totals,
        };
        let mut order = Order::create((self.next_number)(), new).map_err(|e| CheckoutError::Validation(e.to_string()))?;
        self.insert_with_fresh_number(&mut order).await?;

        let mut work = UnitOfWork::new(&self.storage, order.id());
        let decrements = join_all(order.items().iter().map(|item| async move {
            (item.product_id, item.quantity, self.storage.products.decrement_stock(item.product_id, item.quantity).await)
        })).await;

        let mut failed = Vec::new();
        for (product_id, quantity, outcome) in decrements {
            match outcome {
                Ok(()) => work.stock_taken(product_id, quantity),
                Err(e) => failed.push((product_id, e)),
            }
        }
        if !failed.is_empty() {
            for (product_id, e) in &failed { warn!(order_number = order.order_number(), %product_id, error = %e, "stock decrement failed"); }
            work.rollback().await;
            self.events.publish(OrderEvent::RolledBack { order_number: order.order_number().to_string(), user_id, reason: "stock update failed".into() }).await;
            return Err(CheckoutError::StockUpdateFailed);
        }

        if let Err(e) = self.storage.carts.set_items(user_id, &[]).await {
            error!(order_number = order.order_number(), error = %e, "failed to clear cart, rolling back");
            work.rollback().await;
            self.events.publish(OrderEvent::RolledBack { order_number: order.order_number().to_string(), user_id, reason: "cart clear failed".into() }).await;
            return Err(e.into());
        }

        info!(order_number = order.order_number(), total = %order.total_amount(), "order placed");
        self.events.publish(OrderEvent::Placed {
            order_id: order.id(), order_number: order.order_number().to_string(), user_id, total_amount: order.total_amount(),
        }).await;
        Ok(order)
    }

    /// Line item as of now. Falls back to what the cart captured when the
    /// product is gone; the stock step will then refuse the order.
    async fn snapshot(&self, item: &CartItem) -> Result<LineItem> {
        let product = self.storage.products.get(item.product_id).await?;
        let (name, image) = match product {
            Some(p) => { let image = p.first_image().map(String::from); (p.name, image) }
            None => (item.name.clone(), item.image.clone()),
        };
        Ok(LineItem { product_id: item.product_id, name, image, quantity: item.quantity, unit_price: item.unit_price, color: item.color.clone() })
    }

    async fn insert_with_fresh_number(&self, order: &mut Order) -> Result<()> {
        for attempt in 1..=MAX_ORDER_NUMBER_ATTEMPTS {
            match self.storage.orders.insert(order).await {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict(_)) => {
                    warn!(order_number = order.order_number(), attempt, "order number taken, regenerating");
                    order.reassign_number((self.next_number)());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(CheckoutError::Internal("could not allocate a unique order number".into()))
    }

    #[instrument(skip(self))]
    pub async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        Ok(self.storage.orders.list_for_user(user_id).await?)
    }

    #[instrument(skip(self))]
    pub async fn order_by_id(&self, order_id: Uuid, requester: &Requester) -> Result<Order> {
        let order = self.storage.orders.get(order_id).await?.ok_or(CheckoutError::NotFound("Order"))?;
        if !requester.can_access(order.user_id()) {
            return Err(CheckoutError::Forbidden("Not authorized to view this order".into()));
        }
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn update_order_status(&self, order_id: Uuid, update: StatusUpdate) -> Result<Order> {
        let mut order = self.storage.orders.get(order_id).await?.ok_or(CheckoutError::NotFound("Order"))?;
        order.apply_status_update(update.order_status, update.payment_status, Utc::now());
        self.storage.orders.update(&order).await.map_err(|e| match e {
            StoreError::NotFound => CheckoutError::NotFound("Order"),
            other => other.into(),
        })?;
        info!(order_number = order.order_number(), order_status = %order.order_status(), payment_status = %order.payment_status(), "order status updated");
        self.events.publish(OrderEvent::StatusUpdated { order_id, order_status: order.order_status(), payment_status: order.payment_status() }).await;
        Ok(order)
    }

    /// Every order, newest first, with the sum of their totals.
    #[instrument(skip(self))]
    pub async fn all_orders(&self) -> Result<OrdersReport> {
        let orders = self.storage.orders.list_all().await?;
        let total_revenue = orders.iter().map(Order::total_amount).sum();
        Ok(OrdersReport { orders, total_revenue })
    }
}

/// Compensations for the steps of one checkout that already took effect.
struct UnitOfWork<'a> {
    storage: &'a StorageContext,
    order_id: Uuid,
    taken: Vec<(Uuid, u32)>,
}

impl<'a> UnitOfWork<'a> {
    fn new(storage: &'a StorageContext, order_id: Uuid) -> Self { Self { storage, order_id, taken: vec![] } }

    fn stock_taken(&mut self, product_id: Uuid, quantity: u32) { self.taken.push((product_id, quantity)); }

    /// Best effort: a compensation that fails is logged and the rest still run.
    async fn rollback(self) {
        for (product_id, quantity) in self.taken.into_iter().rev() {
            if let Err(e) = self.storage.products.restore_stock(product_id, quantity).await {
                error!(%product_id, quantity, error = %e, "failed to restore stock during rollback");
            }
        }
        if let Err(e) = self.storage.orders.delete(self.order_id).await {
            error!(order_id = %self.order_id, error = %e, "failed to delete order during rollback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use crate::domain::aggregates::{Cart, Product};
    use crate::store::memory::MemoryStore;
    use crate::store::{CartStore, OrderRepository, StoreResult};

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Ada".into(), phone: "555-0100".into(), street: "1 Main St".into(), city: "Lahore".into(),
            state: "Punjab".into(), zip_code: "54000".into(), country: "PK".into(),
        }
    }

    fn request(method: PaymentMethod) -> PlaceOrder {
        PlaceOrder { shipping_address: address(), payment_method: method, payment_result: None }
    }

    async fn stock(store: &MemoryStore, name: &str, price: rust_decimal::Decimal, stock: u32) -> Product {
        let p = Product::create(name, Money::new(price), stock).with_images([format!("{name}.png")]);
        store.products.insert(p.clone()).await;
        p
    }

    async fn cart_with(store: &MemoryStore, user: Uuid, lines: &[(&Product, u32)]) -> Cart {
        let mut cart = Cart::for_user(user);
        for (p, qty) in lines {
            cart.add_item(CartItem::new(p.id, p.name.clone(), p.first_image().map(String::from), *qty, p.price, None));
        }
        store.carts.save(&cart).await.unwrap();
        cart
    }

    fn ledger(store: &MemoryStore) -> OrderLedger { OrderLedger::new(store.context(), PricingPolicy::default()) }

    #[tokio::test]
    async fn test_empty_or_missing_cart_creates_nothing() {
        let store = MemoryStore::new();
        let ledger = ledger(&store);
        let user = Uuid::new_v4();
        assert_eq!(ledger.place_order(user, request(PaymentMethod::Card)).await.unwrap_err(), CheckoutError::EmptyCart);
        store.carts.save(&Cart::for_user(user)).await.unwrap();
        assert_eq!(ledger.place_order(user, request(PaymentMethod::Card)).await.unwrap_err(), CheckoutError::EmptyCart);
        assert!(store.orders.is_empty().await);
    }

    #[tokio::test]
    async fn test_small_order_pays_shipping() {
        let store = MemoryStore::new();
        let p = stock(&store, "headphones", dec!(60), 5).await;
        let user = Uuid::new_v4();
        cart_with(&store, user, &[(&p, 1)]).await;

        let order = ledger(&store).place_order(user, request(PaymentMethod::Card)).await.unwrap();
        assert_eq!(order.subtotal().amount(), dec!(60));
        assert_eq!(order.shipping_cost().amount(), dec!(10));
        assert_eq!(order.tax().amount(), dec!(6));
        assert_eq!(order.total_amount().amount(), dec!(76));
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        assert_eq!(order.order_status(), OrderStatus::Processing);
        assert_eq!(order.items()[0].name, "headphones");
        assert_eq!(order.items()[0].image.as_deref(), Some("headphones.png"));
        assert!(order_number::is_well_formed(order.order_number()));
        assert_eq!(store.products.stock_of(p.id).await, Some(4));
        assert!(store.carts.get(user).await.unwrap().unwrap().is_empty());
        assert_eq!(store.orders.len().await, 1);
    }

    #[tokio::test]
    async fn test_large_order_ships_free() {
        let store = MemoryStore::new();
        let p = stock(&store, "watch", dec!(150), 2).await;
        let user = Uuid::new_v4();
        cart_with(&store, user, &[(&p, 1)]).await;

        let order = ledger(&store).place_order(user, request(PaymentMethod::Cod)).await.unwrap();
        assert_eq!(order.shipping_cost(), Money::zero());
        assert_eq!(order.tax().amount(), dec!(15));
        assert_eq!(order.total_amount().amount(), dec!(165));
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_multi_product_order_takes_each_line_from_stock() {
        let store = MemoryStore::new();
        let mouse = stock(&store, "mouse", dec!(15), 10).await;
        let keyboard = stock(&store, "keyboard", dec!(25.50), 8).await;
        let user = Uuid::new_v4();
        cart_with(&store, user, &[(&mouse, 2), (&keyboard, 3)]).await;

        let order = ledger(&store).place_order(user, request(PaymentMethod::Card)).await.unwrap();
        assert_eq!(order.items().len(), 2);
        assert_eq!(order.subtotal().amount(), dec!(106.50));
        assert_eq!(order.shipping_cost(), Money::zero());
        assert_eq!(order.tax().amount(), dec!(10.65));
        assert_eq!(order.total_amount().amount(), dec!(117.15));
        assert_eq!(store.products.stock_of(mouse.id).await, Some(8));
        assert_eq!(store.products.stock_of(keyboard.id).await, Some(5));
        assert!(store.carts.get(user).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_ignores_later_catalog_changes() {
        let store = MemoryStore::new();
        let p = stock(&store, "earbuds", dec!(20), 10).await;
        let user = Uuid::new_v4();
        cart_with(&store, user, &[(&p, 2)]).await;
        let ledger = ledger(&store);
        let order = ledger.place_order(user, request(PaymentMethod::Paypal)).await.unwrap();

        let mut renamed = store.products.remove(p.id).await.unwrap();
        renamed.name = "earbuds v2".into();
        renamed.price = Money::new(dec!(99));
        store.products.insert(renamed).await;

        let stored = ledger.order_by_id(order.id(), &Requester::customer(user)).await.unwrap();
        assert_eq!(stored.items()[0].name, "earbuds");
        assert_eq!(stored.items()[0].unit_price.amount(), dec!(20));
    }

    #[tokio::test]
    async fn test_deleted_product_rolls_back_everything() {
        let store = MemoryStore::new();
        let kept = stock(&store, "headphones", dec!(60), 5).await;
        let gone = stock(&store, "earbuds", dec!(30), 5).await;
        let user = Uuid::new_v4();
        let cart = cart_with(&store, user, &[(&kept, 2), (&gone, 1)]).await;
        store.products.remove(gone.id).await;

        let err = ledger(&store).place_order(user, request(PaymentMethod::Card)).await.unwrap_err();
        assert_eq!(err, CheckoutError::StockUpdateFailed);
        assert!(store.orders.is_empty().await);
        assert_eq!(store.products.stock_of(kept.id).await, Some(5));
        assert_eq!(store.carts.get(user).await.unwrap().unwrap().items, cart.items);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back() {
        let store = MemoryStore::new();
        let p = stock(&store, "watch", dec!(150), 1).await;
        let user = Uuid::new_v4();
        cart_with(&store, user, &[(&p, 3)]).await;

        let err = ledger(&store).place_order(user, request(PaymentMethod::Card)).await.unwrap_err();
        assert_eq!(err, CheckoutError::StockUpdateFailed);
        assert_eq!(store.products.stock_of(p.id).await, Some(1));
        assert!(store.orders.is_empty().await);
        assert_eq!(store.carts.get(user).await.unwrap().unwrap().item_count(), 1);
    }

    #[tokio::test]
    async fn test_blank_address_is_rejected_before_any_write() {
        let store = MemoryStore::new();
        let p = stock(&store, "watch", dec!(150), 1).await;
        let user = Uuid::new_v4();
        cart_with(&store, user, &[(&p, 1)]).await;
        let mut req = request(PaymentMethod::Card);
        req.shipping_address.city = String::new();

        let err = ledger(&store).place_order(user, req).await.unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(store.orders.is_empty().await);
        assert_eq!(store.products.stock_of(p.id).await, Some(1));
    }

    #[tokio::test]
    async fn test_taken_order_number_is_regenerated() {
        let store = MemoryStore::new();
        let p = stock(&store, "earbuds", dec!(10), 10).await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        cart_with(&store, alice, &[(&p, 1)]).await;
        cart_with(&store, bob, &[(&p, 1)]).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let ledger = ledger(&store).with_order_numbers(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 { "TP-SAME-AAAA".to_string() } else { format!("TP-NEW-{n:04}") }
        });

        let first = ledger.place_order(alice, request(PaymentMethod::Card)).await.unwrap();
        let second = ledger.place_order(bob, request(PaymentMethod::Card)).await.unwrap();
        assert_eq!(first.order_number(), "TP-SAME-AAAA");
        assert_eq!(second.order_number(), "TP-NEW-0002");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_order_number_exhaustion_is_internal() {
        let store = MemoryStore::new();
        let p = stock(&store, "earbuds", dec!(10), 10).await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        cart_with(&store, alice, &[(&p, 1)]).await;
        cart_with(&store, bob, &[(&p, 1)]).await;
        let ledger = ledger(&store).with_order_numbers(|| "TP-SAME-AAAA".to_string());

        ledger.place_order(alice, request(PaymentMethod::Card)).await.unwrap();
        let err = ledger.place_order(bob, request(PaymentMethod::Card)).await.unwrap_err();
        assert_eq!(err, CheckoutError::Internal("could not allocate a unique order number".into()));
        assert_eq!(store.orders.len().await, 1);
        assert_eq!(store.products.stock_of(p.id).await, Some(9));
    }

    struct BrokenOrders;

    #[async_trait]
    impl OrderRepository for BrokenOrders {
        async fn insert(&self, _: &Order) -> StoreResult<()> { Err(StoreError::Backend("disk full".into())) }
        async fn delete(&self, _: Uuid) -> StoreResult<()> { Err(StoreError::NotFound) }
        async fn get(&self, _: Uuid) -> StoreResult<Option<Order>> { Ok(None) }
        async fn list_for_user(&self, _: Uuid) -> StoreResult<Vec<Order>> { Ok(vec![]) }
        async fn list_all(&self) -> StoreResult<Vec<Order>> { Ok(vec![]) }
        async fn update(&self, _: &Order) -> StoreResult<()> { Err(StoreError::NotFound) }
    }

    #[tokio::test]
    async fn test_order_write_failure_changes_nothing() {
        let store = MemoryStore::new();
        let p = stock(&store, "watch", dec!(150), 2).await;
        let user = Uuid::new_v4();
        cart_with(&store, user, &[(&p, 1)]).await;
        let ctx = StorageContext::new(Arc::new(store.carts.clone()), Arc::new(store.products.clone()), Arc::new(BrokenOrders));

        let err = OrderLedger::new(ctx, PricingPolicy::default()).place_order(user, request(PaymentMethod::Card)).await.unwrap_err();
        assert_eq!(err, CheckoutError::Internal("Storage error: disk full".into()));
        assert_eq!(store.products.stock_of(p.id).await, Some(2));
        assert_eq!(store.carts.get(user).await.unwrap().unwrap().item_count(), 1);
    }

    /// Reads from memory but refuses to clear.
    struct StuckCarts(crate::store::memory::InMemoryCarts);

    #[async_trait]
    impl CartStore for StuckCarts {
        async fn get(&self, user_id: Uuid) -> StoreResult<Option<Cart>> { self.0.get(user_id).await }
        async fn save(&self, cart: &Cart) -> StoreResult<()> { self.0.save(cart).await }
        async fn set_items(&self, _: Uuid, _: &[CartItem]) -> StoreResult<()> { Err(StoreError::Backend("timeout".into())) }
    }

    #[tokio::test]
    async fn test_cart_clear_failure_restores_stock() {
        let store = MemoryStore::new();
        let p = stock(&store, "watch", dec!(150), 2).await;
        let user = Uuid::new_v4();
        cart_with(&store, user, &[(&p, 2)]).await;
        let ctx = StorageContext::new(Arc::new(StuckCarts(store.carts.clone())), Arc::new(store.products.clone()), Arc::new(store.orders.clone()));

        let err = OrderLedger::new(ctx, PricingPolicy::default()).place_order(user, request(PaymentMethod::Card)).await.unwrap_err();
        assert_eq!(err.kind(), "internal_error");
        assert_eq!(store.products.stock_of(p.id).await, Some(2));
        assert!(store.orders.is_empty().await);
    }

    #[tokio::test]
    async fn test_order_visibility() {
        let store = MemoryStore::new();
        let p = stock(&store, "watch", dec!(150), 2).await;
        let owner = Uuid::new_v4();
        cart_with(&store, owner, &[(&p, 1)]).await;
        let ledger = ledger(&store);
        let order = ledger.place_order(owner, request(PaymentMethod::Card)).await.unwrap();

        assert!(ledger.order_by_id(order.id(), &Requester::customer(owner)).await.is_ok());
        assert!(ledger.order_by_id(order.id(), &Requester::admin(Uuid::new_v4())).await.is_ok());
        let err = ledger.order_by_id(order.id(), &Requester::customer(Uuid::new_v4())).await.unwrap_err();
        assert_eq!(err.kind(), "authorization_error");
        let err = ledger.order_by_id(Uuid::new_v4(), &Requester::customer(owner)).await.unwrap_err();
        assert_eq!(err, CheckoutError::NotFound("Order"));
    }

    #[tokio::test]
    async fn test_listing_and_revenue() {
        let store = MemoryStore::new();
        let cheap = stock(&store, "earbuds", dec!(60), 10).await;
        let dear = stock(&store, "watch", dec!(150), 10).await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let ledger = ledger(&store);

        cart_with(&store, alice, &[(&cheap, 1)]).await;
        let first = ledger.place_order(alice, request(PaymentMethod::Card)).await.unwrap();
        cart_with(&store, alice, &[(&dear, 1)]).await;
        let second = ledger.place_order(alice, request(PaymentMethod::Card)).await.unwrap();
        cart_with(&store, bob, &[(&cheap, 1)]).await;
        ledger.place_order(bob, request(PaymentMethod::Cod)).await.unwrap();

        let mine = ledger.orders_for_user(alice).await.unwrap();
        assert_eq!(mine.iter().map(Order::id).collect::<Vec<_>>(), vec![second.id(), first.id()]);

        let report = ledger.all_orders().await.unwrap();
        assert_eq!(report.orders.len(), 3);
        assert_eq!(report.total_revenue.amount(), dec!(76) + dec!(165) + dec!(76));
    }

    #[tokio::test]
    async fn test_status_updates() {
        let store = MemoryStore::new();
        let p = stock(&store, "watch", dec!(150), 2).await;
        let user = Uuid::new_v4();
        cart_with(&store, user, &[(&p, 1)]).await;
        let ledger = ledger(&store);
        let order = ledger.place_order(user, request(PaymentMethod::Cod)).await.unwrap();

        let delivered = ledger.update_order_status(order.id(), StatusUpdate { order_status: Some(OrderStatus::Delivered), payment_status: None }).await.unwrap();
        let stamp = delivered.delivered_at().expect("delivered_at set");
        assert_eq!(delivered.payment_status(), PaymentStatus::Pending);

        let later = ledger.update_order_status(order.id(), StatusUpdate { order_status: Some(OrderStatus::Shipped), payment_status: Some(PaymentStatus::Paid) }).await.unwrap();
        assert_eq!(later.delivered_at(), Some(stamp));
        assert_eq!(later.order_status(), OrderStatus::Shipped);
        assert_eq!(later.payment_status(), PaymentStatus::Paid);
        assert_eq!(later.total_amount(), order.total_amount());

        let err = ledger.update_order_status(Uuid::new_v4(), StatusUpdate::default()).await.unwrap_err();
        assert_eq!(err, CheckoutError::NotFound("Order"));
    }
}
