//! Remote store access.
//!
//! The pipeline never owns product or cart data; a remote relational store
//! does. This module is the seam to it: the [`RemoteStore`] trait covers
//! query/mutate calls, the [`ChangeFeed`] trait covers the change
//! notification channel, and the submodules provide the implementations:
//!
//! - [`rest`] - HTTP client for the store's REST surface
//! - [`realtime`] - websocket change feed
//! - [`memory`] - in-process reference implementation for tests and examples
//!
//! Any transport meeting these contracts is conformant; the cart logic
//! only ever sees the traits.

pub mod memory;
pub mod realtime;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use cartwheel_core::{
    Barcode, CartLine, CartLineId, NewScanRecord, Product, ProductId, UserScope,
};

pub use memory::MemoryStore;
pub use realtime::RealtimeFeed;
pub use rest::RestStore;

/// Errors that can occur when talking to the remote store.
///
/// Everything here is transport-class from the pipeline's perspective:
/// recoverable, surfaced to the caller, never auto-retried by the core.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("store returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated for logging.
        body: String,
    },

    /// JSON decoding of a response failed.
    #[error("JSON decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A row came back in a shape the domain types reject.
    #[error("corrupt row from store: {0}")]
    DataCorruption(String),

    /// The change-notification channel failed.
    #[error("change feed error: {0}")]
    Subscription(String),
}

/// Query/mutate surface of the remote store.
///
/// `products` is read-only; `cart` rows are scoped by user; `barcode_scans`
/// is append-only. Reads of cart rows expand the referenced product.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Look up a product by its id.
    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Look up a product by exact barcode match.
    async fn product_by_barcode(&self, barcode: &Barcode)
    -> Result<Option<Product>, StoreError>;

    /// Fetch the cart line for `(scope, product)`, if one exists.
    async fn cart_line(
        &self,
        scope: &UserScope,
        product_id: ProductId,
    ) -> Result<Option<CartLine>, StoreError>;

    /// Fetch all cart lines for a scope, products expanded.
    async fn fetch_cart(&self, scope: &UserScope) -> Result<Vec<CartLine>, StoreError>;

    /// Insert a new cart line.
    async fn insert_line(
        &self,
        scope: &UserScope,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<(), StoreError>;

    /// Update quantity and timestamp of an existing line.
    async fn update_line(
        &self,
        id: CartLineId,
        quantity: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Delete a cart line. Deleting a line that no longer exists succeeds.
    async fn delete_line(&self, id: CartLineId) -> Result<(), StoreError>;

    /// Delete every cart line for a scope.
    async fn clear_cart(&self, scope: &UserScope) -> Result<(), StoreError>;

    /// Append one scan-log row.
    async fn append_scan(&self, record: &NewScanRecord) -> Result<(), StoreError>;
}

/// Kind of cart mutation reported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A cart change notification.
///
/// Carries no payload diff on purpose: subscribers only use it as a
/// refetch trigger, so delivery order and coalescing never matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartChange {
    /// Scope whose cart changed.
    pub scope: UserScope,
    /// What kind of mutation happened.
    pub kind: ChangeKind,
}

/// Change-notification surface of the remote store.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription for cart changes in one scope.
    ///
    /// The subscription is a scoped resource: dropping the returned
    /// [`ChangeEvents`] tears the underlying channel down.
    async fn subscribe(&self, scope: &UserScope) -> Result<ChangeEvents, StoreError>;
}

/// A live stream of cart change notifications for one scope.
pub struct ChangeEvents {
    rx: mpsc::Receiver<CartChange>,
    _guard: Option<SubscriptionGuard>,
}

impl ChangeEvents {
    /// Wrap a notification channel, optionally tying a pump task's
    /// lifetime to this subscription.
    #[must_use]
    pub(crate) fn new(rx: mpsc::Receiver<CartChange>, guard: Option<SubscriptionGuard>) -> Self {
        Self { rx, _guard: guard }
    }

    /// Receive the next change notification.
    ///
    /// Returns `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<CartChange> {
        self.rx.recv().await
    }
}

impl std::fmt::Debug for ChangeEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeEvents").finish_non_exhaustive()
    }
}

/// Aborts the subscription's pump task when the subscription is dropped.
pub(crate) struct SubscriptionGuard {
    task: JoinHandle<()>,
}

impl SubscriptionGuard {
    pub(crate) const fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
