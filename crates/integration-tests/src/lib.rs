//! Integration tests for Cartwheel.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartwheel-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `scan_pipeline` - End-to-end camera/manual scan scenarios
//! - `cart_reconciliation` - Cart merge properties and mutation serialization
//! - `realtime_sync` - Cross-session convergence through the change feed
//!
//! Everything runs against [`cartwheel_scan::store::MemoryStore`]; this
//! crate's library is the shared test support: catalog fixtures, a
//! scripted camera/decoder pair, and a store wrapper whose reads can be
//! held open to force overlapping mutations.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cartwheel_core::{
    Barcode, CartLine, CartLineId, NewScanRecord, Product, ProductId, UserScope,
};
use cartwheel_scan::decoder::{
    CameraDevice, CameraError, CameraProfile, Decode, Frame, FrameDecoder, Symbology,
};
use cartwheel_scan::store::{MemoryStore, RemoteStore, StoreError};

/// Install a tracing subscriber for test diagnostics.
///
/// Honors `RUST_LOG`; off by default. Safe to call from every test, the
/// first caller wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a user scope fixture.
///
/// # Panics
///
/// Panics on invalid input; fixtures are test-author controlled.
#[must_use]
pub fn scope(key: &str) -> UserScope {
    UserScope::parse(key).expect("valid scope fixture")
}

/// Build a catalog product fixture.
///
/// # Panics
///
/// Panics on invalid input; fixtures are test-author controlled.
#[must_use]
pub fn product(name: &str, price: &str, barcode: &str) -> Product {
    let now = Utc::now();
    Product {
        id: ProductId::generate(),
        name: name.to_string(),
        price: price.parse().expect("valid price fixture"),
        barcode: Barcode::parse(barcode).expect("valid barcode fixture"),
        image_url: format!("https://cdn.example.com/{barcode}.jpg"),
        created_at: now,
        updated_at: now,
    }
}

/// A memory store seeded with the given products.
#[must_use]
pub fn seeded_store(products: &[Product]) -> MemoryStore {
    let store = MemoryStore::new();
    for p in products {
        store.add_product(p.clone());
    }
    store
}

// =============================================================================
// Scripted camera + decoder
// =============================================================================

/// Encode a barcode string (and a decode error estimate) into a frame the
/// [`TextDecoder`] understands.
#[must_use]
pub fn frame_with_code(code: &str, error: f32) -> Frame {
    let mut pixels = error.to_le_bytes().to_vec();
    pixels.extend_from_slice(code.as_bytes());
    Frame {
        width: u32::try_from(pixels.len()).unwrap_or(u32::MAX),
        height: 1,
        pixels,
    }
}

/// A frame the [`TextDecoder`] reports as "no barcode recognized".
#[must_use]
pub fn blank_frame() -> Frame {
    Frame {
        width: 4,
        height: 1,
        pixels: Vec::new(),
    }
}

type Script = VecDeque<(Duration, Frame)>;

static CAMERA_SCRIPT: Mutex<Option<(Script, Arc<AtomicBool>)>> = Mutex::new(None);

/// Camera that plays back a staged frame script, then fails.
///
/// [`CameraDevice::acquire`] takes no test-local state, so the script is
/// staged through a process-wide slot; tests using it must serialize on
/// [`camera_lock`].
pub struct ScriptedCamera {
    script: Script,
    released: Arc<AtomicBool>,
}

impl ScriptedCamera {
    /// Stage frames (each after a grab delay) for the next acquisition.
    /// Returns a flag that flips once the device is released again.
    ///
    /// # Panics
    ///
    /// Panics if the staging lock is poisoned.
    pub fn stage(frames: Vec<(Duration, Frame)>) -> Arc<AtomicBool> {
        let released = Arc::new(AtomicBool::new(false));
        *CAMERA_SCRIPT.lock().expect("camera script lock") =
            Some((frames.into(), Arc::clone(&released)));
        released
    }
}

impl CameraDevice for ScriptedCamera {
    fn acquire(_profile: &CameraProfile) -> Result<Self, CameraError> {
        let (script, released) = CAMERA_SCRIPT
            .lock()
            .expect("camera script lock")
            .take()
            .ok_or(CameraError::NotFound)?;
        Ok(Self { script, released })
    }

    fn grab(&mut self) -> Result<Frame, CameraError> {
        let (delay, frame) = self
            .script
            .pop_front()
            .ok_or_else(|| CameraError::Io("end of script".to_string()))?;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(frame)
    }
}

impl Drop for ScriptedCamera {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Serializes tests that stage the [`ScriptedCamera`].
#[must_use]
pub fn camera_lock() -> &'static tokio::sync::Mutex<()> {
    static LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());
    &LOCK
}

/// Decoder that reads [`frame_with_code`] frames back out.
pub struct TextDecoder {
    /// Symbology reported for every decode.
    pub symbology: Symbology,
}

impl Default for TextDecoder {
    fn default() -> Self {
        Self {
            symbology: Symbology::Ean13,
        }
    }
}

impl FrameDecoder for TextDecoder {
    fn decode(&self, frame: &Frame) -> Option<Decode> {
        let (header, code) = frame.pixels.split_at_checked(4)?;
        let error = f32::from_le_bytes(header.try_into().ok()?);
        Some(Decode {
            code: String::from_utf8(code.to_vec()).ok()?,
            symbology: self.symbology,
            error,
        })
    }
}

// =============================================================================
// Holdable store wrapper
// =============================================================================

/// Store wrapper whose `cart_line` reads can be held open.
///
/// Used to keep one mutation in flight while a second one arrives, which
/// is the only way to observe the mutation guard deterministically.
#[derive(Clone)]
pub struct HoldStore {
    inner: MemoryStore,
    armed: Arc<AtomicBool>,
    gate: Arc<tokio::sync::Notify>,
}

impl HoldStore {
    /// Wrap a memory store.
    #[must_use]
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            armed: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Make the next `cart_line` read block until [`release`](Self::release).
    pub fn hold_next_read(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Release a held read.
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl RemoteStore for HoldStore {
    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.inner.product_by_id(id).await
    }

    async fn product_by_barcode(
        &self,
        barcode: &Barcode,
    ) -> Result<Option<Product>, StoreError> {
        self.inner.product_by_barcode(barcode).await
    }

    async fn cart_line(
        &self,
        scope: &UserScope,
        product_id: ProductId,
    ) -> Result<Option<CartLine>, StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.inner.cart_line(scope, product_id).await
    }

    async fn fetch_cart(&self, scope: &UserScope) -> Result<Vec<CartLine>, StoreError> {
        self.inner.fetch_cart(scope).await
    }

    async fn insert_line(
        &self,
        scope: &UserScope,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<(), StoreError> {
        self.inner.insert_line(scope, product_id, quantity).await
    }

    async fn update_line(
        &self,
        id: CartLineId,
        quantity: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.update_line(id, quantity, updated_at).await
    }

    async fn delete_line(&self, id: CartLineId) -> Result<(), StoreError> {
        self.inner.delete_line(id).await
    }

    async fn clear_cart(&self, scope: &UserScope) -> Result<(), StoreError> {
        self.inner.clear_cart(scope).await
    }

    async fn append_scan(&self, record: &NewScanRecord) -> Result<(), StoreError> {
        self.inner.append_scan(record).await
    }
}
