//! In-process reference implementation of the store contracts.
//!
//! Backs the integration tests and doc examples. Behaves like the real
//! store where it matters to the pipeline: reads expand products, writes
//! fan out change notifications (including to the writer's own
//! subscriptions), deletes are idempotent, and the whole thing can be
//! flipped "offline" to exercise transport-error paths.

use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};

use cartwheel_core::{
    Barcode, CartLine, CartLineId, NewScanRecord, Product, ProductId, ScanId, ScanRecord,
    UserScope,
};

use super::{
    CartChange, ChangeEvents, ChangeFeed, ChangeKind, RemoteStore, StoreError, SubscriptionGuard,
};

/// Stored cart row; products are joined on read.
#[derive(Debug, Clone)]
struct StoredLine {
    id: CartLineId,
    scope: UserScope,
    product_id: ProductId,
    quantity: i32,
    updated_at: DateTime<Utc>,
}

/// In-memory store implementing both [`RemoteStore`] and [`ChangeFeed`].
///
/// Cheaply cloneable; clones share the same tables and feed.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

struct MemoryStoreInner {
    products: RwLock<Vec<Product>>,
    lines: RwLock<Vec<StoredLine>>,
    scans: RwLock<Vec<ScanRecord>>,
    offline: AtomicBool,
    changes: broadcast::Sender<CartChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(MemoryStoreInner {
                products: RwLock::new(Vec::new()),
                lines: RwLock::new(Vec::new()),
                scans: RwLock::new(Vec::new()),
                offline: AtomicBool::new(false),
                changes,
            }),
        }
    }

    /// Seed a catalog product.
    ///
    /// # Panics
    ///
    /// Panics if the table lock is poisoned.
    pub fn add_product(&self, product: Product) {
        self.inner
            .products
            .write()
            .expect("products lock poisoned")
            .push(product);
    }

    /// Snapshot of the scan log, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the table lock is poisoned.
    #[must_use]
    pub fn scan_records(&self) -> Vec<ScanRecord> {
        self.inner
            .scans
            .read()
            .expect("scans lock poisoned")
            .clone()
    }

    /// Simulate the store becoming unreachable (or reachable again).
    ///
    /// While offline, every store call fails with a transport-class error.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 503,
                body: "store offline".to_string(),
            });
        }
        Ok(())
    }

    fn notify(&self, scope: &UserScope, kind: ChangeKind) {
        // Nobody subscribed is fine; broadcast just reports zero receivers.
        let _ = self.inner.changes.send(CartChange {
            scope: scope.clone(),
            kind,
        });
    }

    fn product(&self, id: ProductId) -> Result<Product, StoreError> {
        self.inner
            .products
            .read()
            .expect("products lock poisoned")
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| {
                StoreError::DataCorruption(format!("cart row references unknown product {id}"))
            })
    }

    fn join(&self, stored: &StoredLine) -> Result<CartLine, StoreError> {
        Ok(CartLine {
            id: stored.id,
            scope: stored.scope.clone(),
            product_id: stored.product_id,
            quantity: stored.quantity,
            product: self.product(stored.product_id)?,
            updated_at: stored.updated_at,
        })
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.check_online()?;
        Ok(self
            .inner
            .products
            .read()
            .expect("products lock poisoned")
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn product_by_barcode(
        &self,
        barcode: &Barcode,
    ) -> Result<Option<Product>, StoreError> {
        self.check_online()?;
        Ok(self
            .inner
            .products
            .read()
            .expect("products lock poisoned")
            .iter()
            .find(|p| &p.barcode == barcode)
            .cloned())
    }

    async fn cart_line(
        &self,
        scope: &UserScope,
        product_id: ProductId,
    ) -> Result<Option<CartLine>, StoreError> {
        self.check_online()?;
        let stored = self
            .inner
            .lines
            .read()
            .expect("lines lock poisoned")
            .iter()
            .find(|l| &l.scope == scope && l.product_id == product_id)
            .cloned();
        stored.map(|l| self.join(&l)).transpose()
    }

    async fn fetch_cart(&self, scope: &UserScope) -> Result<Vec<CartLine>, StoreError> {
        self.check_online()?;
        let stored: Vec<StoredLine> = self
            .inner
            .lines
            .read()
            .expect("lines lock poisoned")
            .iter()
            .filter(|l| &l.scope == scope)
            .cloned()
            .collect();
        stored.iter().map(|l| self.join(l)).collect()
    }

    async fn insert_line(
        &self,
        scope: &UserScope,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<(), StoreError> {
        self.check_online()?;
        self.inner
            .lines
            .write()
            .expect("lines lock poisoned")
            .push(StoredLine {
                id: CartLineId::generate(),
                scope: scope.clone(),
                product_id,
                quantity,
                updated_at: Utc::now(),
            });
        self.notify(scope, ChangeKind::Insert);
        Ok(())
    }

    async fn update_line(
        &self,
        id: CartLineId,
        quantity: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_online()?;
        let scope = {
            let mut lines = self.inner.lines.write().expect("lines lock poisoned");
            lines.iter_mut().find(|l| l.id == id).map(|line| {
                line.quantity = quantity;
                line.updated_at = updated_at;
                line.scope.clone()
            })
        };
        // Matching zero rows is still a success response.
        if let Some(scope) = scope {
            self.notify(&scope, ChangeKind::Update);
        }
        Ok(())
    }

    async fn delete_line(&self, id: CartLineId) -> Result<(), StoreError> {
        self.check_online()?;
        let scope = {
            let mut lines = self.inner.lines.write().expect("lines lock poisoned");
            let removed = lines.iter().position(|l| l.id == id).map(|i| lines.remove(i));
            removed.map(|l| l.scope)
        };
        if let Some(scope) = scope {
            self.notify(&scope, ChangeKind::Delete);
        }
        Ok(())
    }

    async fn clear_cart(&self, scope: &UserScope) -> Result<(), StoreError> {
        self.check_online()?;
        let removed = {
            let mut lines = self.inner.lines.write().expect("lines lock poisoned");
            let before = lines.len();
            lines.retain(|l| &l.scope != scope);
            before - lines.len()
        };
        for _ in 0..removed {
            self.notify(scope, ChangeKind::Delete);
        }
        Ok(())
    }

    async fn append_scan(&self, record: &NewScanRecord) -> Result<(), StoreError> {
        self.check_online()?;
        self.inner
            .scans
            .write()
            .expect("scans lock poisoned")
            .push(ScanRecord {
                id: ScanId::generate(),
                barcode: record.barcode.clone(),
                scope: record.scope.clone(),
                status: record.status,
                scanned_at: record.scanned_at,
            });
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MemoryStore {
    async fn subscribe(&self, scope: &UserScope) -> Result<ChangeEvents, StoreError> {
        self.check_online()?;

        let mut feed = self.inner.changes.subscribe();
        let scope = scope.clone();
        let (tx, rx) = mpsc::channel(16);

        let pump = tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(change) if change.scope == scope => {
                        if tx.send(change).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Dropped notifications are harmless: the consumer
                        // refetches the whole cart on the next one anyway.
                        tracing::warn!(skipped, "change feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(ChangeEvents::new(rx, Some(SubscriptionGuard::new(pump))))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

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

    #[tokio::test]
    async fn test_barcode_lookup_is_exact() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "4006381333931");

        let hit = store
            .product_by_barcode(&product.barcode)
            .await
            .expect("store online");
        assert_eq!(hit.as_ref().map(|p| p.id), Some(product.id));

        let near_miss = Barcode::parse("400638133393").expect("valid barcode");
        assert!(
            store
                .product_by_barcode(&near_miss)
                .await
                .expect("store online")
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_insert_notifies_subscriber() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");

        let mut events = store.subscribe(&scope()).await.expect("subscribed");
        store
            .insert_line(&scope(), product.id, 1)
            .await
            .expect("inserted");

        let change = events.next().await.expect("notification delivered");
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(change.scope, scope());
    }

    #[tokio::test]
    async fn test_subscription_filters_other_scopes() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");
        let other = UserScope::parse("user-2").expect("valid scope");

        let mut events = store.subscribe(&scope()).await.expect("subscribed");
        store
            .insert_line(&other, product.id, 1)
            .await
            .expect("inserted");
        store
            .insert_line(&scope(), product.id, 1)
            .await
            .expect("inserted");

        // Only the second insert is for our scope.
        let change = events.next().await.expect("notification delivered");
        assert_eq!(change.scope, scope());
    }

    #[tokio::test]
    async fn test_delete_missing_line_is_idempotent() {
        let store = MemoryStore::new();
        store
            .delete_line(CartLineId::generate())
            .await
            .expect("idempotent delete");
    }

    #[tokio::test]
    async fn test_offline_fails_with_transport_error() {
        let store = MemoryStore::new();
        let product = seeded_product(&store, "012345");

        store.set_offline(true);
        let err = store
            .product_by_barcode(&product.barcode)
            .await
            .expect_err("offline store fails");
        assert!(matches!(err, StoreError::Status { status: 503, .. }));

        store.set_offline(false);
        assert!(
            store
                .product_by_barcode(&product.barcode)
                .await
                .expect("store back online")
                .is_some()
        );
    }
}
