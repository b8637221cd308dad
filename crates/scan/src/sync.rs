//! Cross-session cart synchronization.
//!
//! One change-feed subscription per active user scope. Every notification
//! - including echoes of this session's own writes - triggers a full cart
//! refetch; no incremental merge is ever attempted. The subscription is a
//! scoped resource: it comes up when the scope becomes active and is torn
//! down deterministically when the scope ends.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::instrument;

use cartwheel_core::{Cart, UserScope};

use crate::cart::{CartError, CartService};
use crate::store::{ChangeFeed, RemoteStore, StoreError};

/// Refetches the cart on every change notification.
pub struct CartWatcher {
    task: Option<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl CartWatcher {
    /// Subscribe to the scope's cart changes and start watching.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the subscription cannot be opened.
    pub async fn spawn(
        service: CartService,
        feed: Arc<dyn ChangeFeed>,
    ) -> Result<Self, StoreError> {
        let mut events = feed.subscribe(service.scope()).await?;
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    change = events.next() => match change {
                        Some(change) => {
                            tracing::debug!(kind = ?change.kind, "cart change notification");
                            if let Err(error) = service.refresh().await {
                                // The view keeps its last canonical state;
                                // the next notification retries the refetch.
                                tracing::warn!(%error, "cart refetch after notification failed");
                            }
                        }
                        None => {
                            tracing::info!("change feed ended");
                            break;
                        }
                    },
                }
            }
            // `events` drops here, tearing the subscription down.
        });

        Ok(Self {
            task: Some(task),
            shutdown,
        })
    }

    /// Stop watching and tear the subscription down.
    ///
    /// Returns once the watcher task has exited.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for CartWatcher {
    fn drop(&mut self) {
        // Backstop for callers that never reached `shutdown`.
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// A user scope's cart, live for the lifetime of this value.
///
/// Owns the reconciler and its watcher: opening performs the initial
/// refetch and starts the subscription, closing tears both down. This is
/// the explicit lifecycle object; there is no module-level state behind
/// it.
pub struct CartSession {
    service: CartService,
    watcher: Mutex<Option<CartWatcher>>,
}

impl CartSession {
    /// Open a session: load the cart and start watching for changes.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] when the initial refetch or the subscription
    /// fails; no session resources are left behind in that case.
    #[instrument(skip_all, fields(scope = %scope))]
    pub async fn open(
        store: Arc<dyn RemoteStore>,
        feed: Arc<dyn ChangeFeed>,
        scope: UserScope,
    ) -> Result<Self, CartError> {
        let service = CartService::new(store, scope);
        service.refresh().await?;

        let watcher = CartWatcher::spawn(service.clone(), feed)
            .await
            .map_err(CartError::Store)?;

        Ok(Self {
            service,
            watcher: Mutex::new(Some(watcher)),
        })
    }

    /// The reconciler for this scope.
    #[must_use]
    pub fn service(&self) -> &CartService {
        &self.service
    }

    /// Subscribe to the live cart view.
    #[must_use]
    pub fn cart(&self) -> watch::Receiver<Cart> {
        self.service.subscribe()
    }

    /// End the scope: stop the watcher and drop the subscription.
    ///
    /// Idempotent; later calls are no-ops.
    pub async fn close(&self) {
        let watcher = self.watcher.lock().await.take();
        if let Some(watcher) = watcher {
            watcher.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::time::Duration;

    use cartwheel_core::{Barcode, Product, ProductId};

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

    async fn settled<T: Clone>(rx: &mut watch::Receiver<T>, predicate: impl Fn(&T) -> bool) -> T {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if predicate(&rx.borrow()) {
                    return rx.borrow().clone();
                }
                rx.changed().await.expect("publisher alive");
            }
        })
        .await
        .expect("view settles in time")
    }

    #[tokio::test]
    async fn test_open_loads_existing_cart() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");
        store
            .insert_line(&scope(), product.id, 3)
            .await
            .expect("seed line");

        let session = CartSession::open(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            scope(),
        )
        .await
        .expect("session opens");

        let view = session.cart().borrow().clone();
        assert_eq!(view.line_for(product.id).map(|l| l.quantity), Some(3));
        session.close().await;
    }

    #[tokio::test]
    async fn test_foreign_write_converges_local_view() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");

        let session = CartSession::open(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            scope(),
        )
        .await
        .expect("session opens");
        let mut view = session.cart();

        // Simulate another session writing straight to the store.
        store
            .insert_line(&scope(), product.id, 1)
            .await
            .expect("foreign write");

        let cart = settled(&mut view, |c| !c.is_empty()).await;
        assert_eq!(cart.line_for(product.id).map(|l| l.quantity), Some(1));
        session.close().await;
    }

    #[tokio::test]
    async fn test_own_write_echoes_through_feed() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");

        let session = CartSession::open(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            scope(),
        )
        .await
        .expect("session opens");
        let mut view = session.cart();

        session
            .service()
            .add_to_cart(product.id)
            .await
            .expect("add succeeds");

        let cart = settled(&mut view, |c| !c.is_empty()).await;
        assert_eq!(cart.len(), 1);
        session.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = MemoryStore::new();
        let session = CartSession::open(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            scope(),
        )
        .await
        .expect("session opens");

        session.close().await;
        session.close().await;
    }

    #[tokio::test]
    async fn test_closed_session_stops_refetching() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");

        let session = CartSession::open(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            scope(),
        )
        .await
        .expect("session opens");
        session.close().await;

        store
            .insert_line(&scope(), product.id, 1)
            .await
            .expect("foreign write");
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Watcher is gone; the local view must not have moved.
        assert!(session.cart().borrow().is_empty());
    }
}
