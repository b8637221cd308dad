//! Scan session.
//!
//! Owns the camera-to-resolver half of the pipeline: candidates from the
//! decoder stream are debounced into confirmed scans, resolved against the
//! catalog, and surfaced as [`ScanEvent`]s. Manual entry feeds the same
//! confirmed-scan path, so downstream logic never cares where a scan came
//! from. Whether a matched product actually goes into the cart stays the
//! caller's decision.

use std::time::Instant;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use cartwheel_core::{Barcode, BarcodeError, ConfirmedScan, Product, ScanSource, UserScope};

use crate::debounce::{DebounceConfig, Debouncer};
use crate::decoder::DecoderStream;
use crate::resolver::{ProductResolver, Resolution};
use crate::store::StoreError;

/// Errors from driving a scan session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session has been stopped; no further scans are accepted.
    #[error("scan session already stopped")]
    Stopped,

    /// Manual input failed validation; nothing reached the store.
    #[error("invalid barcode: {0}")]
    InvalidBarcode(#[from] BarcodeError),
}

/// Lifecycle state of a [`ScanSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The driver is running and events are flowing.
    Active,
    /// The session has been stopped and its camera released.
    Stopped,
}

/// What became of one confirmed scan.
#[derive(Debug)]
pub enum ScanEvent {
    /// The barcode resolved to a product. Adding it to the cart is up to
    /// the caller.
    Matched {
        /// The confirmed scan.
        scan: ConfirmedScan,
        /// The resolved product.
        product: Product,
    },
    /// No product carries this barcode. Non-fatal; the pipeline stays
    /// ready for the next scan.
    Unmatched {
        /// The confirmed scan.
        scan: ConfirmedScan,
    },
    /// The store could not be reached. Recoverable; the caller decides
    /// whether to re-trigger.
    Faulted {
        /// The confirmed scan.
        scan: ConfirmedScan,
        /// The transport failure.
        error: StoreError,
    },
}

/// A running scan session.
///
/// Replaces hidden initialized/in-flight flags with one value that owns
/// its lifecycle: created active, stopped exactly once, never restarted.
pub struct ScanSession {
    events_rx: mpsc::Receiver<ScanEvent>,
    manual_tx: mpsc::Sender<ConfirmedScan>,
    stop_tx: watch::Sender<bool>,
    driver: Option<JoinHandle<()>>,
    state: SessionState,
}

impl ScanSession {
    /// Start a session fed by a camera decoder stream.
    #[must_use]
    pub fn with_camera(
        decoder: DecoderStream,
        resolver: ProductResolver,
        scope: UserScope,
        config: DebounceConfig,
    ) -> Self {
        Self::spawn(Some(decoder), resolver, scope, config)
    }

    /// Start a manual-entry-only session (camera unavailable or denied).
    #[must_use]
    pub fn manual_only(resolver: ProductResolver, scope: UserScope) -> Self {
        Self::spawn(None, resolver, scope, DebounceConfig::default())
    }

    fn spawn(
        decoder: Option<DecoderStream>,
        resolver: ProductResolver,
        scope: UserScope,
        config: DebounceConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(16);
        let (manual_tx, manual_rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = watch::channel(false);

        let driver = tokio::spawn(drive(
            decoder, resolver, scope, config, events_tx, manual_rx, stop_rx,
        ));

        Self {
            events_rx,
            manual_tx,
            stop_tx,
            driver: Some(driver),
            state: SessionState::Active,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Receive the next scan event.
    ///
    /// Returns `None` once the session has stopped and all pending events
    /// are drained.
    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events_rx.recv().await
    }

    /// Submit a manually typed barcode.
    ///
    /// Validation happens here, before anything touches the store; the
    /// submission then flows through the same confirmed-scan path as
    /// camera scans (without a cooldown - typing is its own debounce).
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidBarcode`] for empty or malformed input,
    /// [`SessionError::Stopped`] when the session is no longer running.
    pub async fn submit_manual(&self, code: &str) -> Result<(), SessionError> {
        if self.state == SessionState::Stopped {
            return Err(SessionError::Stopped);
        }

        let barcode = Barcode::parse(code)?;
        let scan = ConfirmedScan {
            barcode,
            source: ScanSource::Manual,
            at: Instant::now(),
        };

        self.manual_tx
            .send(scan)
            .await
            .map_err(|_| SessionError::Stopped)
    }

    /// Stop the session.
    ///
    /// Stops the decoder stream - releasing the camera before this call
    /// returns - and ends the event stream. Safe to call more than once.
    pub async fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        self.state = SessionState::Stopped;

        // Unblock a driver stuck publishing into a full event queue, then
        // signal it to wind down.
        self.events_rx.close();
        let _ = self.stop_tx.send(true);
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        // Backstop: let the driver notice the stop signal and wind down
        // (it owns the decoder stream, whose own drop aborts capture).
        let _ = self.stop_tx.send(true);
    }
}

/// The session driver: one cooperative task, no shared mutable state.
async fn drive(
    mut decoder: Option<DecoderStream>,
    resolver: ProductResolver,
    scope: UserScope,
    config: DebounceConfig,
    events_tx: mpsc::Sender<ScanEvent>,
    mut manual_rx: mpsc::Receiver<ConfirmedScan>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut debouncer = Debouncer::new(config);

    // One turn of the driver loop.
    enum Step {
        Stop,
        Manual(Option<ConfirmedScan>),
        Candidate(Option<cartwheel_core::ScanCandidate>),
    }

    loop {
        let step = if let Some(stream) = decoder.as_mut() {
            tokio::select! {
                _ = stop_rx.changed() => Step::Stop,
                manual = manual_rx.recv() => Step::Manual(manual),
                candidate = stream.next() => Step::Candidate(candidate),
            }
        } else {
            tokio::select! {
                _ = stop_rx.changed() => Step::Stop,
                manual = manual_rx.recv() => Step::Manual(manual),
            }
        };

        let scan = match step {
            Step::Stop | Step::Manual(None) => break,
            Step::Manual(Some(scan)) => Some(scan),
            Step::Candidate(Some(candidate)) => debouncer.observe(&candidate),
            Step::Candidate(None) => {
                // Camera path ended (device failure or exhaustion). Manual
                // entry keeps working; release the camera now.
                tracing::info!("decoder stream ended, continuing manual-only");
                if let Some(stream) = decoder.take() {
                    stream.stop().await;
                }
                debouncer.reset();
                None
            }
        };

        let Some(scan) = scan else { continue };

        let event = match resolver.resolve(&scope, &scan.barcode).await {
            Ok(Resolution::Found(product)) => ScanEvent::Matched { scan, product },
            Ok(Resolution::NotFound) => ScanEvent::Unmatched { scan },
            Err(error) => ScanEvent::Faulted { scan, error },
        };

        if events_tx.send(event).await.is_err() {
            // Nobody is listening anymore.
            break;
        }
    }

    debouncer.reset();
    if let Some(stream) = decoder.take() {
        stream.stop().await;
    }
}
