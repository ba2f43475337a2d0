//! Cart operations ahead of checkout.

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartItem};
use crate::domain::value_objects::Quantity;
use crate::error::{CheckoutError, Result};
use crate::store::StorageContext;

#[derive(Clone, Debug)]
pub struct AddToCart { pub product_id: Uuid, pub quantity: u32, pub color: Option<String> }

#[derive(Clone)]
pub struct CartService { storage: StorageContext }

impl CartService {
    pub fn new(storage: StorageContext) -> Self { Self { storage } }

    /// The user's cart, created empty on first access.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<Cart> {
        if let Some(cart) = self.storage.carts.get(user_id).await? { return Ok(cart); }
        let cart = Cart::for_user(user_id);
        self.storage.carts.save(&cart).await?;
        debug!(cart_id = %cart.id, "created cart");
        Ok(cart)
    }

    #[instrument(skip(self))]
    pub async fn add_item(&self, user_id: Uuid, req: AddToCart) -> Result<Cart> {
        let quantity = Quantity::new(req.quantity).map_err(|e| CheckoutError::Validation(e.to_string()))?.value();
        let product = self.storage.products.get(req.product_id).await?.ok_or(CheckoutError::NotFound("Product"))?;
        if !product.is_available() {
            return Err(CheckoutError::Validation("Product is not available".into()));
        }
        if product.stock < quantity {
            return Err(CheckoutError::Validation("Insufficient stock".into()));
        }

        let mut cart = self.get_cart(user_id).await?;
        if let Some(existing) = cart.find_line(product.id, req.color.as_deref()) {
            if existing.quantity.checked_add(quantity).map_or(true, |total| total > product.stock) {
                let left = product.stock.saturating_sub(existing.quantity);
                return Err(CheckoutError::Validation(format!("Cannot add {quantity}. Only {left} items available")));
            }
        }
        let image = product.first_image().map(String::from);
        cart.add_item(CartItem::new(product.id, product.name, image, quantity, product.price, req.color));
        self.storage.carts.save(&cart).await?;
        Ok(cart)
    }

    #[instrument(skip(self))]
    pub async fn update_item(&self, user_id: Uuid, item_id: Uuid, quantity: u32) -> Result<Cart> {
        let quantity = Quantity::new(quantity).map_err(|e| CheckoutError::Validation(e.to_string()))?.value();
        let mut cart = self.existing(user_id).await?;
        cart.set_quantity(item_id, quantity).map_err(|_| CheckoutError::NotFound("Item in cart"))?;
        self.storage.carts.save(&cart).await?;
        Ok(cart)
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<Cart> {
        let mut cart = self.existing(user_id).await?;
        cart.remove_item(item_id);
        self.storage.carts.save(&cart).await?;
        Ok(cart)
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<Cart> {
        let mut cart = self.existing(user_id).await?;
        cart.clear();
        self.storage.carts.set_items(user_id, &[]).await?;
        Ok(cart)
    }

    async fn existing(&self, user_id: Uuid) -> Result<Cart> {
        self.storage.carts.get(user_id).await?.ok_or(CheckoutError::NotFound("Cart"))
    }
}
