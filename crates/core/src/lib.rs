//! Cartwheel Core - Shared types library.
//!
//! This crate provides common types used across all Cartwheel components:
//! - `scan` - The scan-to-cart pipeline (decoder, debouncer, resolver, cart)
//! - app shells embedding the pipeline (out of scope here)
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no camera
//! access. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, barcodes, and scopes,
//!   plus the product/cart/scan domain records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
