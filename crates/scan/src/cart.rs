//! Cart reconciliation.
//!
//! The remote store owns the cart; this service owns nothing but a cached
//! view of it. Every mutation is read-modify-write followed by a full
//! refetch, and the refetched state unconditionally replaces the published
//! view - the mutation's own response is never trusted as final state.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::instrument;

use cartwheel_core::{Cart, CartLine, CartLineId, ProductId, UserScope};

use crate::store::{RemoteStore, StoreError};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Another mutation from this session is still in flight.
    ///
    /// Overlapping mutations are rejected rather than interleaved; the
    /// caller may retry once the current one settles.
    #[error("another cart mutation is in flight")]
    MutationInFlight,

    /// Negative quantities are invalid input and never reach the store.
    #[error("quantity cannot be negative")]
    InvalidQuantity,

    /// The line vanished between our write and the refetch (typically a
    /// concurrent removal from another session).
    #[error("cart line for product {0} disappeared before refetch")]
    LineVanished(ProductId),

    /// The store could not be reached or answered badly.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The cart reconciler for one user scope.
///
/// Cheaply cloneable; clones share the same view channel and mutation
/// guard. At most one `CartLine` exists per `(scope, product)` pair,
/// enforced by reading before writing. The guarantee is best-effort
/// across sessions: two sessions may still interleave read and write on
/// the store, and the next refetch corrects the view (see crate docs).
#[derive(Clone)]
pub struct CartService {
    inner: Arc<CartServiceInner>,
}

struct CartServiceInner {
    store: Arc<dyn RemoteStore>,
    scope: UserScope,
    /// Mutation-in-flight guard. Held for the whole read-modify-write-
    /// refetch cycle and released on every exit path.
    gate: Mutex<()>,
    cart_tx: watch::Sender<Cart>,
}

impl CartService {
    /// Create a service for one scope. The published view starts empty;
    /// call [`refresh`](Self::refresh) to load the real cart.
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>, scope: UserScope) -> Self {
        let (cart_tx, _) = watch::channel(Cart::default());

        Self {
            inner: Arc::new(CartServiceInner {
                store,
                scope,
                gate: Mutex::new(()),
                cart_tx,
            }),
        }
    }

    /// The scope this service reconciles.
    #[must_use]
    pub fn scope(&self) -> &UserScope {
        &self.inner.scope
    }

    /// Subscribe to the published cart view.
    ///
    /// The receiver observes every canonical state the service publishes,
    /// whether triggered locally or by the change feed.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Cart> {
        self.inner.cart_tx.subscribe()
    }

    /// Refetch the cart and publish it as the new canonical state.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Store`] when the refetch fails; the previously
    /// published view stays in place.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Cart, CartError> {
        let lines = self.inner.store.fetch_cart(&self.inner.scope).await?;
        let cart = Cart::new(lines);
        self.inner.cart_tx.send_replace(cart.clone());
        Ok(cart)
    }

    /// Add one unit of a product to the cart.
    ///
    /// Increments the existing line or inserts a fresh one with quantity 1,
    /// then refetches and publishes the whole cart.
    ///
    /// # Errors
    ///
    /// [`CartError::MutationInFlight`] when another mutation is running,
    /// [`CartError::Store`] on transport failure.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_to_cart(&self, product_id: ProductId) -> Result<CartLine, CartError> {
        let _guard = self.begin_mutation()?;

        match self
            .inner
            .store
            .cart_line(&self.inner.scope, product_id)
            .await?
        {
            Some(existing) => {
                self.inner
                    .store
                    .update_line(existing.id, existing.quantity + 1, Utc::now())
                    .await?;
            }
            None => {
                self.inner
                    .store
                    .insert_line(&self.inner.scope, product_id, 1)
                    .await?;
            }
        }

        let cart = self.refresh().await?;
        cart.line_for(product_id)
            .cloned()
            .ok_or(CartError::LineVanished(product_id))
    }

    /// Set the quantity of a line.
    ///
    /// Zero removes the line; negative values are rejected before any
    /// remote call.
    ///
    /// # Errors
    ///
    /// [`CartError::InvalidQuantity`] for negative input,
    /// [`CartError::MutationInFlight`] when another mutation is running,
    /// [`CartError::Store`] on transport failure.
    #[instrument(skip(self), fields(line_id = %line_id, quantity))]
    pub async fn set_quantity(
        &self,
        line_id: CartLineId,
        quantity: i32,
    ) -> Result<Cart, CartError> {
        if quantity < 0 {
            return Err(CartError::InvalidQuantity);
        }

        let _guard = self.begin_mutation()?;

        if quantity == 0 {
            self.inner.store.delete_line(line_id).await?;
        } else {
            self.inner
                .store
                .update_line(line_id, quantity, Utc::now())
                .await?;
        }

        self.refresh().await
    }

    /// Remove a line from the cart.
    ///
    /// Removing a line that no longer exists still succeeds.
    ///
    /// # Errors
    ///
    /// [`CartError::MutationInFlight`] when another mutation is running,
    /// [`CartError::Store`] on transport failure.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove_line(&self, line_id: CartLineId) -> Result<Cart, CartError> {
        let _guard = self.begin_mutation()?;
        self.inner.store.delete_line(line_id).await?;
        self.refresh().await
    }

    /// Remove every line from the cart.
    ///
    /// # Errors
    ///
    /// [`CartError::MutationInFlight`] when another mutation is running,
    /// [`CartError::Store`] on transport failure.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<Cart, CartError> {
        let _guard = self.begin_mutation()?;
        self.inner.store.clear_cart(&self.inner.scope).await?;
        self.refresh().await
    }

    /// Claim the mutation-in-flight guard without waiting.
    fn begin_mutation(&self) -> Result<MutexGuard<'_, ()>, CartError> {
        self.inner
            .gate
            .try_lock()
            .map_err(|_| CartError::MutationInFlight)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use cartwheel_core::{Barcode, Product};

    use crate::store::MemoryStore;

    use super::*;

    fn scope() -> UserScope {
        UserScope::parse("user-1").expect("valid scope")
    }

    fn seeded_product(store: &MemoryStore, barcode: &str) -> Product {
        let now = Utc::now();
        let product = Product {
            id: ProductId::generate(),
            name: format!("Product {barcode}"),
            price: Decimal::new(350, 2),
            barcode: Barcode::parse(barcode).expect("valid barcode"),
            image_url: String::new(),
            created_at: now,
            updated_at: now,
        };
        store.add_product(product.clone());
        product
    }

    fn service(store: &MemoryStore) -> CartService {
        CartService::new(Arc::new(store.clone()), scope())
    }

    #[tokio::test]
    async fn test_first_add_creates_single_line() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");
        let cart = service(&store);

        let line = cart.add_to_cart(product.id).await.expect("add succeeds");
        assert_eq!(line.quantity, 1);
        assert_eq!(line.product_id, product.id);

        let view = cart.refresh().await.expect("refresh succeeds");
        assert_eq!(view.len(), 1);
    }

    #[tokio::test]
    async fn test_second_add_increments_without_duplicate() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");
        let cart = service(&store);

        cart.add_to_cart(product.id).await.expect("first add");
        let line = cart.add_to_cart(product.id).await.expect("second add");

        assert_eq!(line.quantity, 2);
        let view = cart.refresh().await.expect("refresh succeeds");
        assert_eq!(view.len(), 1);
        assert_eq!(view.line_for(product.id).map(|l| l.quantity), Some(2));
    }

    #[tokio::test]
    async fn test_set_quantity_zero_equals_remove() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");
        let cart = service(&store);

        let line = cart.add_to_cart(product.id).await.expect("add succeeds");
        let view = cart.set_quantity(line.id, 0).await.expect("set succeeds");
        assert!(view.is_empty());
    }

    #[tokio::test]
    async fn test_set_quantity_negative_rejected_before_store() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");
        let cart = service(&store);
        let line = cart.add_to_cart(product.id).await.expect("add succeeds");

        // Even an unreachable store never sees invalid input.
        store.set_offline(true);
        let err = cart
            .set_quantity(line.id, -1)
            .await
            .expect_err("negative rejected");
        assert!(matches!(err, CartError::InvalidQuantity));
        store.set_offline(false);

        let view = cart.refresh().await.expect("refresh succeeds");
        assert_eq!(view.line_for(product.id).map(|l| l.quantity), Some(1));
    }

    #[tokio::test]
    async fn test_set_quantity_updates_directly() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");
        let cart = service(&store);

        let line = cart.add_to_cart(product.id).await.expect("add succeeds");
        let view = cart.set_quantity(line.id, 7).await.expect("set succeeds");
        assert_eq!(view.line_for(product.id).map(|l| l.quantity), Some(7));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");
        let cart = service(&store);

        let line = cart.add_to_cart(product.id).await.expect("add succeeds");
        let first = cart.remove_line(line.id).await.expect("first remove");
        assert!(first.is_empty());

        // Removing the same line again signals success and changes nothing.
        let second = cart.remove_line(line.id).await.expect("second remove");
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_clear_then_add_rebuilds_single_line() {
        let store = MemoryStore::new();
        let first = seeded_product(&store, "012345");
        let second = seeded_product(&store, "678901");
        let cart = service(&store);

        cart.add_to_cart(first.id).await.expect("add succeeds");
        cart.add_to_cart(second.id).await.expect("add succeeds");

        let view = cart.clear().await.expect("clear succeeds");
        assert!(view.is_empty());

        let line = cart.add_to_cart(first.id).await.expect("re-add succeeds");
        assert_eq!(line.quantity, 1);
        let view = cart.refresh().await.expect("refresh succeeds");
        assert_eq!(view.len(), 1);
    }

    #[tokio::test]
    async fn test_guard_clears_after_failed_mutation() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");
        let cart = service(&store);

        store.set_offline(true);
        let err = cart.add_to_cart(product.id).await.expect_err("store down");
        assert!(matches!(err, CartError::Store(_)));

        // The in-flight flag must be clear again, or this would dead-end.
        store.set_offline(false);
        let line = cart.add_to_cart(product.id).await.expect("add succeeds");
        assert_eq!(line.quantity, 1);
    }

    #[tokio::test]
    async fn test_refresh_publishes_to_subscribers() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");
        let cart = service(&store);
        let mut view = cart.subscribe();

        cart.add_to_cart(product.id).await.expect("add succeeds");

        view.changed().await.expect("publisher alive");
        assert_eq!(view.borrow().len(), 1);
    }
}
