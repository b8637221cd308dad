//! HTTP client for the remote store's REST surface.
//!
//! Speaks the store's conventional row-filter dialect: exact-match
//! predicates as query parameters (`barcode=eq.{code}`), JSON row arrays
//! on reads, and `Prefer` headers on writes. Authentication is a scoped
//! API key sent on every request.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use cartwheel_core::{
    Barcode, CartLine, CartLineId, NewScanRecord, Product, ProductId, ScanStatus, UserScope,
};

use crate::config::StoreConfig;

use super::{RemoteStore, StoreError};

/// Client for the remote store's REST surface.
///
/// Cheaply cloneable; all clones share one connection pool.
#[derive(Clone)]
pub struct RestStore {
    inner: Arc<RestStoreInner>,
}

struct RestStoreInner {
    client: reqwest::Client,
    base: String,
    api_key: SecretString,
}

impl RestStore {
    /// Create a new store client.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        let base = config.rest_url.as_str().trim_end_matches('/').to_string();

        Self {
            inner: Arc::new(RestStoreInner {
                client: reqwest::Client::new(),
                base,
                api_key: config.api_key.clone(),
            }),
        }
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{table}", self.inner.base);
        let key = self.inner.api_key.expose_secret();

        self.inner
            .client
            .request(method, url)
            .header("apikey", key)
            .header("Authorization", format!("Bearer {key}"))
    }

    /// Send a request, mapping non-success statuses to [`StoreError::Status`].
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, StoreError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let body: String = body.chars().take(200).collect();
            tracing::error!(status = %status, body = %body, "store returned non-success status");
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    /// Fetch rows matching the given filter predicates.
    async fn select<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let body = self
            .send(self.request(reqwest::Method::GET, table).query(query))
            .await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    #[instrument(skip(self), fields(id = %id))]
    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let rows: Vec<ProductRow> = self
            .select(
                "products",
                &[("id", format!("eq.{id}")), ("limit", "1".to_string())],
            )
            .await?;
        rows.into_iter().next().map(ProductRow::into_product).transpose()
    }

    #[instrument(skip(self), fields(barcode = %barcode))]
    async fn product_by_barcode(
        &self,
        barcode: &Barcode,
    ) -> Result<Option<Product>, StoreError> {
        let rows: Vec<ProductRow> = self
            .select(
                "products",
                &[
                    ("barcode", format!("eq.{barcode}")),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        rows.into_iter().next().map(ProductRow::into_product).transpose()
    }

    #[instrument(skip(self, scope), fields(product_id = %product_id))]
    async fn cart_line(
        &self,
        scope: &UserScope,
        product_id: ProductId,
    ) -> Result<Option<CartLine>, StoreError> {
        let rows: Vec<CartRow> = self
            .select(
                "cart",
                &[
                    ("user_id", format!("eq.{scope}")),
                    ("product_id", format!("eq.{product_id}")),
                    ("select", "*,product:product_id(*)".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        rows.into_iter().next().map(CartRow::into_line).transpose()
    }

    #[instrument(skip(self, scope))]
    async fn fetch_cart(&self, scope: &UserScope) -> Result<Vec<CartLine>, StoreError> {
        let rows: Vec<CartRow> = self
            .select(
                "cart",
                &[
                    ("user_id", format!("eq.{scope}")),
                    ("select", "*,product:product_id(*)".to_string()),
                    ("order", "updated_at.asc".to_string()),
                ],
            )
            .await?;
        rows.into_iter().map(CartRow::into_line).collect()
    }

    #[instrument(skip(self, scope), fields(product_id = %product_id, quantity))]
    async fn insert_line(
        &self,
        scope: &UserScope,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<(), StoreError> {
        self.send(
            self.request(reqwest::Method::POST, "cart")
                .header("Prefer", "return=minimal")
                .json(&InsertLineBody {
                    user_id: scope.as_str(),
                    product_id,
                    quantity,
                }),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id, quantity))]
    async fn update_line(
        &self,
        id: CartLineId,
        quantity: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.send(
            self.request(reqwest::Method::PATCH, "cart")
                .query(&[("id", format!("eq.{id}"))])
                .header("Prefer", "return=minimal")
                .json(&UpdateLineBody {
                    quantity,
                    updated_at,
                }),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn delete_line(&self, id: CartLineId) -> Result<(), StoreError> {
        // Deleting zero rows is a success response, which gives us the
        // idempotent-delete contract for free.
        self.send(
            self.request(reqwest::Method::DELETE, "cart")
                .query(&[("id", format!("eq.{id}"))]),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, scope))]
    async fn clear_cart(&self, scope: &UserScope) -> Result<(), StoreError> {
        self.send(
            self.request(reqwest::Method::DELETE, "cart")
                .query(&[("user_id", format!("eq.{scope}"))]),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, record), fields(barcode = %record.barcode, status = ?record.status))]
    async fn append_scan(&self, record: &NewScanRecord) -> Result<(), StoreError> {
        self.send(
            self.request(reqwest::Method::POST, "barcode_scans")
                .header("Prefer", "return=minimal")
                .json(&ScanBody {
                    barcode: record.barcode.as_str(),
                    user_id: record.scope.as_str(),
                    status: record.status,
                    scan_timestamp: record.scanned_at,
                }),
        )
        .await?;
        Ok(())
    }
}

// =============================================================================
// Wire rows
// =============================================================================

#[derive(Debug, Deserialize)]
struct ProductRow {
    id: ProductId,
    name: String,
    price: Decimal,
    barcode: String,
    #[serde(default)]
    image_url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self) -> Result<Product, StoreError> {
        let barcode = Barcode::parse(&self.barcode).map_err(|e| {
            StoreError::DataCorruption(format!("invalid barcode in products row: {e}"))
        })?;

        Ok(Product {
            id: self.id,
            name: self.name,
            price: self.price,
            barcode,
            image_url: self.image_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CartRow {
    id: CartLineId,
    user_id: String,
    product_id: ProductId,
    quantity: i32,
    updated_at: DateTime<Utc>,
    product: ProductRow,
}

impl CartRow {
    fn into_line(self) -> Result<CartLine, StoreError> {
        let scope = UserScope::parse(&self.user_id).map_err(|e| {
            StoreError::DataCorruption(format!("invalid user scope in cart row: {e}"))
        })?;

        Ok(CartLine {
            id: self.id,
            scope,
            product_id: self.product_id,
            quantity: self.quantity,
            product: self.product.into_product()?,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Serialize)]
struct InsertLineBody<'a> {
    user_id: &'a str,
    product_id: ProductId,
    quantity: i32,
}

#[derive(Debug, Serialize)]
struct UpdateLineBody {
    quantity: i32,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ScanBody<'a> {
    barcode: &'a str,
    user_id: &'a str,
    status: ScanStatus,
    scan_timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_row_conversion() {
        let json = r#"{
            "id": "7f3b2c6e-0e4a-4f0b-9a3d-2f1e5c8b7a60",
            "name": "Oat Milk 1L",
            "price": 3.50,
            "barcode": "4006381333931",
            "image_url": "https://cdn.example.com/oat-milk.jpg",
            "created_at": "2024-01-05T08:00:00Z",
            "updated_at": "2024-01-05T08:00:00Z"
        }"#;

        let row: ProductRow = serde_json::from_str(json).expect("row deserializes");
        let product = row.into_product().expect("row converts");
        assert_eq!(product.name, "Oat Milk 1L");
        assert_eq!(product.barcode.as_str(), "4006381333931");
        assert_eq!(product.price, Decimal::new(350, 2));
    }

    #[test]
    fn test_product_row_rejects_corrupt_barcode() {
        let json = r#"{
            "id": "7f3b2c6e-0e4a-4f0b-9a3d-2f1e5c8b7a60",
            "name": "Broken",
            "price": 1,
            "barcode": "",
            "created_at": "2024-01-05T08:00:00Z",
            "updated_at": "2024-01-05T08:00:00Z"
        }"#;

        let row: ProductRow = serde_json::from_str(json).expect("row deserializes");
        assert!(matches!(
            row.into_product(),
            Err(StoreError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_cart_row_expands_product() {
        let json = r#"{
            "id": "11f3b2c6-0e4a-4f0b-9a3d-2f1e5c8b7a60",
            "user_id": "user-1",
            "product_id": "7f3b2c6e-0e4a-4f0b-9a3d-2f1e5c8b7a60",
            "quantity": 2,
            "updated_at": "2024-01-06T10:30:00Z",
            "product": {
                "id": "7f3b2c6e-0e4a-4f0b-9a3d-2f1e5c8b7a60",
                "name": "Oat Milk 1L",
                "price": "3.50",
                "barcode": "4006381333931",
                "created_at": "2024-01-05T08:00:00Z",
                "updated_at": "2024-01-05T08:00:00Z"
            }
        }"#;

        let row: CartRow = serde_json::from_str(json).expect("row deserializes");
        let line = row.into_line().expect("row converts");
        assert_eq!(line.quantity, 2);
        assert_eq!(line.scope.as_str(), "user-1");
        assert_eq!(line.product.id, line.product_id);
    }

    #[test]
    fn test_scan_body_wire_shape() {
        let scanned_at = "2024-01-06T10:30:00Z"
            .parse::<DateTime<Utc>>()
            .expect("valid timestamp");
        let body = ScanBody {
            barcode: "999999",
            user_id: "user-1",
            status: ScanStatus::Unmatched,
            scan_timestamp: scanned_at,
        };

        let json = serde_json::to_value(&body).expect("serializable");
        assert_eq!(json["status"], "unmatched");
        assert_eq!(json["barcode"], "999999");
    }
}
