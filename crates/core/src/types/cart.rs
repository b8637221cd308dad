//! Cart line and materialized cart view.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{CartLineId, ProductId};
use super::product::Product;
use super::scope::UserScope;

/// One line of a user's cart.
///
/// Exactly one `CartLine` may exist per `(scope, product)` pair; the cart
/// reconciler enforces this by reading before it writes. The embedded
/// product comes from the store's join/expand on reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Line identity.
    pub id: CartLineId,
    /// Owning user scope.
    pub scope: UserScope,
    /// Referenced product identity.
    pub product_id: ProductId,
    /// Quantity, always >= 1 for a stored line.
    pub quantity: i32,
    /// The referenced product, expanded on read.
    pub product: Product,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    /// Line subtotal (unit price times quantity).
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.product.price * Decimal::from(self.quantity)
    }
}

/// The set of cart lines for one user scope.
///
/// A cart is not a stored entity, only a view recomputed from the remote
/// store on every refresh. The refetched view is canonical: it replaces
/// whatever was held locally, it is never merged into it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Build a cart view from refetched lines.
    #[must_use]
    pub fn new(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }

    /// The lines of the cart.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the cart holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Find the line for a product, if one exists.
    #[must_use]
    pub fn line_for(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Total quantity across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.quantity)).sum()
    }

    /// Cart subtotal across all lines.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::subtotal).sum()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::types::Barcode;

    fn product(price: &str, barcode: &str) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::generate(),
            name: "Test Product".to_owned(),
            price: price.parse().expect("valid decimal"),
            barcode: Barcode::parse(barcode).expect("valid barcode"),
            image_url: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn line(product: Product, quantity: i32) -> CartLine {
        CartLine {
            id: CartLineId::generate(),
            scope: UserScope::parse("user-1").expect("valid scope"),
            product_id: product.id,
            quantity,
            product,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_line_subtotal() {
        let l = line(product("3.50", "012345"), 2);
        assert_eq!(l.subtotal(), Decimal::new(700, 2));
    }

    #[test]
    fn test_cart_totals() {
        let cart = Cart::new(vec![
            line(product("3.50", "012345"), 2),
            line(product("1.25", "678901"), 1),
        ]);
        assert_eq!(cart.len(), 2);
        assert_eq!(cart.total_quantity(), 3);
        assert_eq!(cart.subtotal(), Decimal::new(825, 2));
    }

    #[test]
    fn test_line_for_finds_by_product() {
        let p = product("3.50", "012345");
        let wanted = p.id;
        let cart = Cart::new(vec![line(p, 1), line(product("1.25", "678901"), 4)]);

        assert_eq!(cart.line_for(wanted).map(|l| l.quantity), Some(1));
        assert!(cart.line_for(ProductId::generate()).is_none());
    }

    #[test]
    fn test_empty_cart() {
        let cart = Cart::default();
        assert!(cart.is_empty());
        assert_eq!(cart.subtotal(), Decimal::ZERO);
    }
}
