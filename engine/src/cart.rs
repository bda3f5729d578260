//! Cart - the local collection being mutated.
//!
//! A cart maps product ids to line items. No entry ever holds a quantity
//! of zero or less: reducing a quantity to that point removes the item.

use crate::{Mutation, ProductId, Quantity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Unique key within the cart
    pub product_id: ProductId,
    /// Always greater than zero
    pub quantity: Quantity,
}

impl CartItem {
    /// Create a new cart item.
    pub fn new(product_id: impl Into<ProductId>, quantity: Quantity) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// How a repeated `Add` for a product already in the cart is merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddPolicy {
    /// Quantities are summed (default)
    #[default]
    Additive,
    /// The newer quantity overwrites the older one
    Replace,
}

/// The local cart state.
///
/// Uses BTreeMap so snapshots serialize deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    items: BTreeMap<ProductId, CartItem>,
}

impl Cart {
    /// Create an empty cart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an item by product id.
    pub fn get(&self, product_id: &str) -> Option<&CartItem> {
        self.items.get(product_id)
    }

    /// Quantity for a product, zero when absent.
    pub fn quantity_of(&self, product_id: &str) -> Quantity {
        self.items.get(product_id).map(|i| i.quantity).unwrap_or(0)
    }

    /// Check if a product is in the cart.
    pub fn contains(&self, product_id: &str) -> bool {
        self.items.contains_key(product_id)
    }

    /// Iterate items ordered by product id.
    pub fn items(&self) -> impl Iterator<Item = &CartItem> {
        self.items.values()
    }

    /// Number of distinct products.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the cart has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether applying `mutation` would leave the cart unchanged.
    pub fn is_noop(&self, mutation: &Mutation, policy: AddPolicy) -> bool {
        let mut scratch = self.clone();
        !scratch.apply(mutation, policy)
    }

    /// Apply a mutation in place. Returns true if the cart changed.
    pub fn apply(&mut self, mutation: &Mutation, policy: AddPolicy) -> bool {
        match mutation {
            Mutation::Add {
                product_id,
                quantity,
            } => {
                let current = self.quantity_of(product_id);
                let next = match policy {
                    AddPolicy::Additive => current.saturating_add(*quantity),
                    AddPolicy::Replace => *quantity,
                };
                self.set(product_id, next)
            }
            Mutation::SetQuantity {
                product_id,
                quantity,
            } => self.set(product_id, *quantity),
            Mutation::Remove { product_id } => self.items.remove(product_id).is_some(),
            Mutation::Clear => {
                let changed = !self.items.is_empty();
                self.items.clear();
                changed
            }
        }
    }

    fn set(&mut self, product_id: &str, quantity: Quantity) -> bool {
        if quantity <= 0 {
            return self.items.remove(product_id).is_some();
        }
        match self.items.get_mut(product_id) {
            Some(item) if item.quantity == quantity => false,
            Some(item) => {
                item.quantity = quantity;
                true
            }
            None => {
                self.items
                    .insert(product_id.to_string(), CartItem::new(product_id, quantity));
                true
            }
        }
    }
}

impl FromIterator<CartItem> for Cart {
    fn from_iter<I: IntoIterator<Item = CartItem>>(iter: I) -> Self {
        let mut cart = Cart::new();
        for item in iter {
            cart.set(&item.product_id, item.quantity);
        }
        cart
    }
}
