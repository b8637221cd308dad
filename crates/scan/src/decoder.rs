//! Camera decoder stream.
//!
//! Wraps a camera device and turns its frames into a lazy, infinite,
//! non-restartable sequence of [`ScanCandidate`]s. Frame analysis runs on
//! a worker pool sized to the machine; candidates are emitted into a
//! bounded channel and nothing here ever touches cart state.
//!
//! The decoder library itself is a black box behind [`FrameDecoder`]:
//! "decode one frame into a code plus an error estimate" is consumed,
//! not implemented.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

use cartwheel_core::ScanCandidate;

/// Errors from acquiring or reading the camera device.
///
/// Acquisition failures are terminal for a [`DecoderStream`] instance and
/// are never retried automatically; the caller falls back to manual entry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// The user denied camera access.
    #[error("camera permission denied")]
    PermissionDenied,

    /// No camera device satisfies the requested profile.
    #[error("no suitable camera device")]
    NotFound,

    /// The device exists but is exclusively owned elsewhere.
    #[error("camera device busy")]
    Busy,

    /// Device I/O failed mid-stream.
    #[error("camera I/O error: {0}")]
    Io(String),
}

/// Which way the preferred camera faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// Front camera.
    User,
    /// Rear camera.
    Environment,
}

/// Constraint profile for camera acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraProfile {
    /// Preferred facing mode.
    pub facing: Facing,
    /// Minimum capture width in pixels.
    pub min_width: u32,
    /// Minimum capture height in pixels.
    pub min_height: u32,
    /// Acceptable width/height ratio bounds.
    pub aspect_ratio: RangeInclusive<f64>,
}

impl Default for CameraProfile {
    fn default() -> Self {
        Self {
            facing: Facing::Environment,
            min_width: 450,
            min_height: 300,
            aspect_ratio: 1.0..=2.0,
        }
    }
}

/// One captured camera frame (luma plane).
#[derive(Debug, Clone)]
pub struct Frame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major luma samples, `width * height` bytes.
    pub pixels: Vec<u8>,
}

/// Barcode symbologies the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbology {
    Ean13,
    Ean8,
    UpcA,
    Code128,
    Code39,
}

impl Symbology {
    /// All supported symbologies, the default whitelist.
    pub const ALL: [Self; 5] = [
        Self::Ean13,
        Self::Ean8,
        Self::UpcA,
        Self::Code128,
        Self::Code39,
    ];
}

/// A successful single-frame decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Decode {
    /// Decoded string.
    pub code: String,
    /// Symbology the pattern matched.
    pub symbology: Symbology,
    /// Error estimate for the decode; lower is better.
    pub error: f32,
}

/// A camera device.
///
/// Acquisition takes the constraint profile and claims exclusive ownership
/// of the device; dropping the value releases it.
pub trait CameraDevice: Send + Sized + 'static {
    /// Acquire a device matching the profile.
    ///
    /// # Errors
    ///
    /// Returns a [`CameraError`] when no device can be acquired. This is
    /// terminal for the decoder stream being opened.
    fn acquire(profile: &CameraProfile) -> Result<Self, CameraError>;

    /// Block until the next frame is available.
    ///
    /// # Errors
    ///
    /// Returns a [`CameraError`] when the device fails; the stream ends.
    fn grab(&mut self) -> Result<Frame, CameraError>;
}

/// The external barcode decoder library.
pub trait FrameDecoder: Send + Sync + 'static {
    /// Try to decode one frame. `None` when no barcode-shaped pattern was
    /// recognized.
    fn decode(&self, frame: &Frame) -> Option<Decode>;
}

/// Tuning for a [`DecoderStream`].
#[derive(Debug, Clone)]
pub struct DecoderOptions {
    /// Symbologies that may be emitted; everything else is discarded.
    pub symbologies: Vec<Symbology>,
    /// Decode worker count; `0` means available hardware concurrency.
    pub workers: usize,
    /// Depth of the frame and candidate queues.
    pub queue_depth: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            symbologies: Symbology::ALL.to_vec(),
            workers: 0,
            queue_depth: 8,
        }
    }
}

/// A live decode pipeline from one exclusively-owned camera.
///
/// The candidate sequence is infinite and lazy: candidates are produced
/// only while someone keeps calling [`next`](Self::next). Once stopped the
/// stream cannot be restarted; open a fresh one to resume scanning.
pub struct DecoderStream {
    candidates_rx: mpsc::Receiver<ScanCandidate>,
    shutdown: Arc<AtomicBool>,
    capture: Option<JoinHandle<()>>,
    dispatch: Option<JoinHandle<()>>,
}

impl DecoderStream {
    /// Acquire the camera and start decoding.
    ///
    /// # Errors
    ///
    /// Returns the acquisition error unchanged; see [`CameraDevice::acquire`].
    pub fn open<C: CameraDevice, D: FrameDecoder>(
        profile: &CameraProfile,
        decoder: D,
        options: DecoderOptions,
    ) -> Result<Self, CameraError> {
        let mut camera = C::acquire(profile)?;
        tracing::info!(?profile.facing, "camera acquired");

        let shutdown = Arc::new(AtomicBool::new(false));
        let (frames_tx, mut frames_rx) = mpsc::channel::<Frame>(options.queue_depth);
        let (candidates_tx, candidates_rx) = mpsc::channel::<ScanCandidate>(options.queue_depth);

        // Capture loop. Owns the camera; whichever way the loop exits, the
        // device is released when the closure drops it.
        let capture = tokio::task::spawn_blocking({
            let shutdown = Arc::clone(&shutdown);
            move || {
                while !shutdown.load(Ordering::SeqCst) {
                    match camera.grab() {
                        Ok(frame) => {
                            if frames_tx.blocking_send(frame).is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            tracing::warn!(%error, "camera grab failed, ending stream");
                            break;
                        }
                    }
                }
                tracing::debug!("camera released");
            }
        });

        let workers = if options.workers == 0 {
            std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
        } else {
            options.workers
        };
        let decoder = Arc::new(decoder);
        let whitelist = Arc::new(options.symbologies);
        let pool = Arc::new(Semaphore::new(workers));

        // Analysis dispatcher: fans frames out to at most `workers`
        // concurrent blocking decodes.
        let dispatch = tokio::spawn(async move {
            while let Some(frame) = frames_rx.recv().await {
                let Ok(permit) = Arc::clone(&pool).acquire_owned().await else {
                    break;
                };
                let decoder = Arc::clone(&decoder);
                let whitelist = Arc::clone(&whitelist);
                let tx = candidates_tx.clone();

                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    if let Some(decode) = decoder.decode(&frame)
                        && whitelist.contains(&decode.symbology)
                    {
                        let candidate = ScanCandidate {
                            code: decode.code,
                            error: decode.error,
                            at: Instant::now(),
                        };
                        let _ = tx.blocking_send(candidate);
                    }
                });
            }
        });

        Ok(Self {
            candidates_rx,
            shutdown,
            capture: Some(capture),
            dispatch: Some(dispatch),
        })
    }

    /// Receive the next scan candidate.
    ///
    /// Returns `None` once the stream has ended (camera failure or stop).
    pub async fn next(&mut self) -> Option<ScanCandidate> {
        self.candidates_rx.recv().await
    }

    /// Stop the stream and release the camera.
    ///
    /// Consumes the stream: decoding cannot resume on this instance. The
    /// call returns only after the capture task has exited, so the device
    /// is guaranteed released when it does.
    pub async fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Dropping the dispatcher closes the frame queue, which unblocks a
        // capture task stuck on a full queue.
        if let Some(dispatch) = self.dispatch.take() {
            dispatch.abort();
        }
        if let Some(capture) = self.capture.take() {
            let _ = capture.await;
        }
    }
}

impl Drop for DecoderStream {
    fn drop(&mut self) {
        // Backstop for callers that never reached `stop`: signal shutdown
        // and close the frame queue so the capture task exits on its next
        // grab or send. Release is prompt but not awaited here.
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(dispatch) = &self.dispatch {
            dispatch.abort();
        }
    }
}
