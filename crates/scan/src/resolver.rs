//! Product resolution.
//!
//! Maps a confirmed barcode to a catalog product by exact lookup. Not
//! finding one is a normal outcome, distinct from transport failure; the
//! caller shows it to the user and keeps scanning.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use tracing::{debug, instrument};

use cartwheel_core::{Barcode, NewScanRecord, Product, ScanStatus, UserScope};

use crate::store::{RemoteStore, StoreError};

/// Outcome of a resolution attempt that reached the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The barcode matched a product.
    Found(Product),
    /// No product carries this barcode.
    NotFound,
}

/// Resolves barcodes against the remote catalog.
///
/// Found products are cached for 5 minutes; the catalog is read-only from
/// here, so staleness is bounded and harmless. Every attempt that reaches
/// the catalog (cached or not) appends exactly one scan-log row; transport
/// failures append nothing.
#[derive(Clone)]
pub struct ProductResolver {
    inner: Arc<ProductResolverInner>,
}

struct ProductResolverInner {
    store: Arc<dyn RemoteStore>,
    cache: Cache<Barcode, Product>,
}

impl ProductResolver {
    /// Create a resolver over a store.
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(ProductResolverInner { store, cache }),
        }
    }

    /// Resolve a barcode to a product.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the catalog or the scan log could not
    /// be reached; no scan-log row exists for such attempts.
    #[instrument(skip(self, scope), fields(barcode = %barcode))]
    pub async fn resolve(
        &self,
        scope: &UserScope,
        barcode: &Barcode,
    ) -> Result<Resolution, StoreError> {
        if let Some(product) = self.inner.cache.get(barcode).await {
            debug!("cache hit for barcode");
            self.log(scope, barcode, ScanStatus::Matched).await?;
            return Ok(Resolution::Found(product));
        }

        match self.inner.store.product_by_barcode(barcode).await? {
            Some(product) => {
                self.log(scope, barcode, ScanStatus::Matched).await?;
                self.inner
                    .cache
                    .insert(barcode.clone(), product.clone())
                    .await;
                Ok(Resolution::Found(product))
            }
            None => {
                self.log(scope, barcode, ScanStatus::Unmatched).await?;
                Ok(Resolution::NotFound)
            }
        }
    }

    async fn log(
        &self,
        scope: &UserScope,
        barcode: &Barcode,
        status: ScanStatus,
    ) -> Result<(), StoreError> {
        self.inner
            .store
            .append_scan(&NewScanRecord {
                barcode: barcode.clone(),
                scope: scope.clone(),
                status,
                scanned_at: Utc::now(),
            })
            .await
    }

    /// Invalidate a cached barcode (used when the catalog is known to have
    /// changed under us).
    pub async fn invalidate(&self, barcode: &Barcode) {
        self.inner.cache.invalidate(barcode).await;
    }
}
