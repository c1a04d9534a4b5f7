use crate::{db_types::CartItem, traits::SettlementDbError};

/// The parts of the cart service that the settlement flow touches.
#[allow(async_fn_in_trait)]
pub trait CartManagement {
    /// Adds `quantity` of `sku` to the customer's cart, merging with an existing line.
    async fn add_cart_item(&self, customer_id: &str, sku: &str, quantity: i64) -> Result<CartItem, SettlementDbError>;

    async fn fetch_cart(&self, customer_id: &str) -> Result<Vec<CartItem>, SettlementDbError>;

    /// Empties the customer's cart. Returns the number of lines removed.
    async fn clear_cart(&self, customer_id: &str) -> Result<u64, SettlementDbError>;
}
