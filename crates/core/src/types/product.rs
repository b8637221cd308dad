//! Catalog product record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::barcode::Barcode;
use super::id::ProductId;

/// A catalog product.
///
/// Product rows are created and maintained outside the pipeline; from the
/// pipeline's perspective they are read-only. The barcode is a unique key
/// in the catalog, which is what makes exact-match resolution possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Opaque product identity.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price. Non-negative by catalog contract.
    pub price: Decimal,
    /// Unique barcode key.
    pub barcode: Barcode,
    /// Image reference (URL into the catalog's media storage).
    pub image_url: String,
    /// Row creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Row update timestamp.
    pub updated_at: DateTime<Utc>,
}
