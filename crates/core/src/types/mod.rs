//! Core types for Cartwheel.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod barcode;
pub mod cart;
pub mod id;
pub mod product;
pub mod scan;
pub mod scope;

pub use barcode::{Barcode, BarcodeError};
pub use cart::{Cart, CartLine};
pub use id::*;
pub use product::Product;
pub use scan::{ConfirmedScan, NewScanRecord, ScanCandidate, ScanRecord, ScanSource, ScanStatus};
pub use scope::{ScopeError, UserScope};
