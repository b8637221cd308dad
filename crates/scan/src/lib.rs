//! Cartwheel Scan - the scan-to-cart pipeline.
//!
//! Turns a live camera feed into cart mutations against a remote store:
//! frames are decoded into barcode candidates, debounced into confirmed
//! scans, resolved against the product catalog, and (once the caller
//! confirms) merged into a per-user cart that stays convergent across
//! concurrent sessions via a change feed.
//!
//! # Architecture
//!
//! ```text
//! camera frames -> DecoderStream -> Debouncer -> ProductResolver
//!                                                     |
//!                                          caller confirmation
//!                                                     v
//!            CartWatcher <- change feed <- store <- CartService
//! ```
//!
//! - The remote store is an external collaborator reached through the
//!   [`store::RemoteStore`] and [`store::ChangeFeed`] traits; production
//!   code talks to it with [`store::RestStore`] + [`store::RealtimeFeed`],
//!   tests with [`store::MemoryStore`].
//! - Every cart mutation is followed by a full refetch; the refetched view
//!   is canonical and unconditionally replaces local state.
//! - Reconciliation runs on the cooperative runtime; only frame analysis
//!   uses a worker pool, and it only ever emits candidates.
//!
//! # Example
//!
//! ```rust,ignore
//! use cartwheel_scan::{
//!     cart::CartService,
//!     debounce::DebounceConfig,
//!     decoder::{DecoderOptions, DecoderStream},
//!     resolver::ProductResolver,
//!     session::{ScanEvent, ScanSession},
//!     store::{RealtimeFeed, RestStore},
//!     sync::CartSession,
//! };
//!
//! let store = std::sync::Arc::new(RestStore::new(&config.store));
//! let feed = std::sync::Arc::new(RealtimeFeed::new(&config.store));
//!
//! let cart = CartSession::open(store.clone(), feed, scope.clone()).await?;
//! let resolver = ProductResolver::new(store);
//!
//! let decoder = DecoderStream::open::<V4lCamera, _>(
//!     &config.decoder.profile,
//!     my_decoder,
//!     DecoderOptions::default(),
//! )?;
//! let mut session = ScanSession::with_camera(decoder, resolver, scope, DebounceConfig::default());
//!
//! while let Some(event) = session.next_event().await {
//!     if let ScanEvent::Matched { product, .. } = event {
//!         cart.service().add_to_cart(product.id).await?;
//!     }
//! }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod config;
pub mod debounce;
pub mod decoder;
pub mod resolver;
pub mod session;
pub mod store;
pub mod sync;

pub use cart::{CartError, CartService};
pub use config::{ConfigError, ScanConfig, StoreConfig};
pub use debounce::{DebounceConfig, Debouncer};
pub use decoder::{DecoderOptions, DecoderStream};
pub use resolver::{ProductResolver, Resolution};
pub use session::{ScanEvent, ScanSession, SessionError, SessionState};
pub use store::{ChangeFeed, RemoteStore, StoreError};
pub use sync::{CartSession, CartWatcher};
