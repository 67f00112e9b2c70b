//! A toy stock ledger standing in for a real inventory service.

use std::collections::HashMap;

use conveyor::core::Outcome;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("unknown sku {0}")]
    UnknownSku(String),
}

pub struct Inventory {
    stock: Mutex<HashMap<String, u32>>,
    prices: HashMap<String, u64>,
}

impl Inventory {
    /// Two skus: `SKU-1` (5 in stock, 12.99) and `SKU-2` (40 in stock, 4.50).
    pub fn seeded() -> Self {
        Self {
            stock: Mutex::new(HashMap::from([("SKU-1".into(), 5), ("SKU-2".into(), 40)])),
            prices: HashMap::from([("SKU-1".into(), 1299), ("SKU-2".into(), 450)]),
        }
    }

    /// Unit price in cents.
    pub fn price(&self, sku: &str) -> Result<u64, InventoryError> {
        self.prices
            .get(sku)
            .copied()
            .ok_or_else(|| InventoryError::UnknownSku(sku.to_string()))
    }

    /// Takes `quantity` units out of stock and returns what is left.
    ///
    /// Running short is an expected outcome and comes back as
    /// `Outcome::Fail`; an unknown sku is an error.
    pub async fn reserve(&self, sku: &str, quantity: u32) -> Result<Outcome<u32>, InventoryError> {
        if quantity == 0 {
            return Ok(Outcome::fail("quantity must be positive"));
        }

        let mut stock = self.stock.lock().await;
        let available = stock
            .get_mut(sku)
            .ok_or_else(|| InventoryError::UnknownSku(sku.to_string()))?;
        if *available < quantity {
            return Ok(Outcome::fail(format!(
                "only {available} of {sku} left, {quantity} requested"
            )));
        }

        *available -= quantity;
        Ok(Outcome::success(*available))
    }
}
