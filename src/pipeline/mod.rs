//! Capture → detect → annotate → encode loop shared by every stream consumer
//!
//! One [`CameraService`] owns the device handle, the dedup gate and the lifecycle state
//! behind a single lock. While streaming, one blocking task runs capture cycles and fans
//! the encoded frames out through a broadcast channel, so any number of HTTP clients share
//! one open device.

pub mod annotate;
pub mod encode;
pub mod font;
pub mod multipart;

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use bytes::Bytes;
use chrono::Local;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capture::decoder::decode_frame;
use crate::capture::{CameraError, CaptureError, FrameSource, SourceOpener};
use crate::classify::classify;
use crate::dedup::DedupGate;
use crate::detect::QrDecoder;
use crate::store::{EventStore, QrEvent};
use crate::utils::epoch_seconds;
use crate::Config;

pub use encode::EncodeError;

/// Camera lifecycle. Captures only succeed in `Streaming`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CameraState {
    Uninitialized,
    Initialized,
    Streaming,
    Stopped,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("capture task aborted")]
    Aborted,
}

impl CycleError {
    /// Whether the session has to end; a single bad frame does not end it
    fn ends_session(&self) -> bool {
        !matches!(
            self,
            CycleError::Encode(_) | CycleError::Capture(CaptureError::Decode { .. })
        )
    }
}

/// Shape of `/camera/status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    pub camera_initialized: bool,
    pub is_streaming: bool,
    pub camera_opened: bool,
    pub state: CameraState,
}

/// One frame grabbed outside the stream
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Base64 JPEG
    pub frame: String,
    pub qr_data: Option<String>,
    pub timestamp: f64,
}

struct Session {
    id: u64,
    cancel: watch::Sender<bool>,
    frames: broadcast::Sender<Bytes>,
}

struct Core {
    state: CameraState,
    source: Option<Box<dyn FrameSource>>,
    gate: DedupGate,
    session: Option<Session>,
    worker: Option<JoinHandle<()>>,
    next_session: u64,
}

impl Core {
    fn release_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
        }
    }
}

struct Inner {
    config: Config,
    opener: Box<dyn SourceOpener>,
    decoder: Box<dyn QrDecoder>,
    store: Arc<dyn EventStore>,
    core: Mutex<Core>,
}

/// Shared handle to the camera pipeline; clones refer to the same camera
#[derive(Clone)]
pub struct CameraService {
    inner: Arc<Inner>,
}

impl CameraService {
    pub fn new(
        config: Config,
        opener: impl SourceOpener + 'static,
        decoder: impl QrDecoder + 'static,
        store: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                opener: Box::new(opener),
                decoder: Box::new(decoder),
                store,
                core: Mutex::new(Core {
                    state: CameraState::Uninitialized,
                    source: None,
                    gate: DedupGate::new(),
                    session: None,
                    worker: None,
                    next_session: 1,
                }),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.inner.store
    }

    /// Open the device. A no-op when a device is already held, so a second open never happens.
    pub async fn initialize(&self) -> Result<(), CameraError> {
        let mut core = self.inner.core.lock().await;
        match core.state {
            CameraState::Initialized | CameraState::Streaming => {
                debug!(state = ?core.state, "Camera already initialized");
                return Ok(());
            }
            CameraState::Uninitialized | CameraState::Stopped => {}
        }

        let capture = &self.inner.config.capture;
        match self.inner.opener.open(capture) {
            Ok(source) => {
                core.source = Some(source);
                core.state = CameraState::Initialized;
                info!(
                    device = %capture.device_node(),
                    width = capture.width,
                    height = capture.height,
                    fps = capture.fps,
                    "Camera initialized"
                );
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize camera");
                Err(e)
            }
        }
    }

    /// Begin a streaming session on an initialized camera
    pub async fn start(&self) -> Result<(), CameraError> {
        let mut core = self.inner.core.lock().await;
        match core.state {
            CameraState::Streaming => {
                debug!("Camera already streaming");
                return Ok(());
            }
            CameraState::Uninitialized | CameraState::Stopped => {
                return Err(CameraError::NotInitialized)
            }
            CameraState::Initialized => {}
        }

        let id = core.next_session;
        core.next_session += 1;

        let (cancel, cancelled) = watch::channel(false);
        let capacity = self.inner.config.pipeline.broadcast_capacity.max(1);
        let (frames, _) = broadcast::channel(capacity);

        core.session = Some(Session {
            id,
            cancel,
            frames: frames.clone(),
        });
        core.state = CameraState::Streaming;

        let inner = self.inner.clone();
        core.worker = Some(tokio::task::spawn_blocking(move || {
            inner.run_session(id, cancelled, frames)
        }));

        info!(session = id, "Streaming started");
        Ok(())
    }

    /// Stop streaming and release the device. Always succeeds; stopping an idle camera is a no-op.
    pub async fn stop(&self) {
        // Waits for an in-flight cycle to finish
        let mut core = self.inner.core.lock().await;
        match core.state {
            CameraState::Streaming | CameraState::Initialized => {
                if let Some(session) = core.session.take() {
                    session.cancel.send_replace(true);
                    info!(session = session.id, "Streaming stopped");
                }
                core.release_source();
                core.state = CameraState::Stopped;
            }
            CameraState::Uninitialized | CameraState::Stopped => {
                debug!(state = ?core.state, "Stop requested on idle camera");
            }
        }
    }

    pub async fn state(&self) -> CameraState {
        self.inner.core.lock().await.state
    }

    pub async fn status(&self) -> Status {
        let core = self.inner.core.lock().await;
        Status {
            // a camera stays initialized once opened, even after stop
            camera_initialized: core.state != CameraState::Uninitialized,
            is_streaming: core.state == CameraState::Streaming,
            camera_opened: core.source.as_ref().is_some_and(|s| s.is_open()),
            state: core.state,
        }
    }

    /// Attach to the running stream. `None` when nothing is streaming.
    pub async fn subscribe(&self) -> Option<FrameSubscription> {
        let core = self.inner.core.lock().await;
        core.session.as_ref().map(|session| FrameSubscription {
            frames: session.frames.subscribe(),
            cancelled: session.cancel.subscribe(),
        })
    }

    /// Wait for the current capture loop, if any, to exit
    pub async fn join(&self) {
        let worker = self.inner.core.lock().await.worker.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Capture loop panicked");
            }
        }
    }

    /// Grab and encode one frame from the running session, without annotation or persistence
    pub async fn snapshot(&self) -> Result<Snapshot, CycleError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || -> Result<Snapshot, CycleError> {
            let mut core = inner.core.blocking_lock();
            if core.state != CameraState::Streaming {
                return Err(CaptureError::NotStreaming.into());
            }
            let source = core.source.as_mut().ok_or(CaptureError::Closed)?;
            let image = decode_frame(&source.capture()?)?;
            let qr_data = inner.decoder.detect(&image).map(|code| code.payload);
            let jpeg = encode::encode_jpeg(&image, inner.config.pipeline.jpeg_quality)?;

            Ok(Snapshot {
                frame: base64::engine::general_purpose::STANDARD.encode(&jpeg),
                qr_data,
                timestamp: epoch_seconds(),
            })
        })
        .await
        .unwrap_or(Err(CycleError::Aborted))
    }
}

impl Inner {
    /// Capture loop of one streaming session; runs on a blocking thread
    fn run_session(
        &self,
        id: u64,
        cancelled: watch::Receiver<bool>,
        frames: broadcast::Sender<Bytes>,
    ) {
        let interval = Duration::from_millis(self.config.pipeline.frame_interval_ms);
        let is_cancelled = || *cancelled.borrow() || cancelled.has_changed().is_err();
        info!(session = id, "Capture loop running");

        while !is_cancelled() {
            let started = Instant::now();

            let result = {
                let mut core = self.core.blocking_lock();
                // stop() may have taken the lock first
                if is_cancelled() {
                    break;
                }
                let result = self.cycle(&mut core);
                if let Err(e) = &result {
                    if e.ends_session() {
                        warn!(session = id, error = %e, "Capture failed, ending stream");
                        metrics::counter!("capture_failures").increment(1);
                        self.end_session(&mut core, id);
                        break;
                    }
                }
                result
            };

            match result {
                // No receivers is fine; frames are simply not watched right now
                Ok(jpeg) => {
                    let _ = frames.send(jpeg);
                }
                Err(e) => warn!(session = id, error = %e, "Dropping frame"),
            }

            metrics::histogram!("cycle_time_us").record(started.elapsed().as_micros() as f64);
            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }

        info!(session = id, "Capture loop exited");
    }

    /// One capture-and-annotate cycle; the caller holds the core lock
    fn cycle(&self, core: &mut Core) -> Result<Bytes, CycleError> {
        if core.state != CameraState::Streaming {
            return Err(CaptureError::NotStreaming.into());
        }
        let source = core.source.as_mut().ok_or(CaptureError::Closed)?;
        let frame = source.capture()?;
        metrics::counter!("frames_captured").increment(1);

        let mut image = decode_frame(&frame)?;
        let detection = self.decoder.detect(&image);

        if let Some(code) = &detection {
            metrics::counter!("qr_detections").increment(1);
            debug!(sequence = frame.sequence(), payload = %code.payload, "QR code in frame");
            annotate::annotate(&mut image, code);

            if self.config.pipeline.persist_events && core.gate.admit(&code.payload) {
                self.record(&code.payload);
            }
        }

        let jpeg = encode::encode_jpeg(&image, self.config.pipeline.jpeg_quality)?;
        metrics::counter!("frames_encoded").increment(1);
        metrics::histogram!("frame_latency_us").record(frame.timestamp.elapsed().as_micros() as f64);
        Ok(jpeg)
    }

    /// Classify and persist a newly admitted payload.
    ///
    /// Persistence is best effort: a failed append is logged and the gate stays advanced.
    fn record(&self, payload: &str) {
        let region = classify(payload);
        let event = QrEvent::new(payload, region, Local::now());

        match self.store.append(event) {
            Ok(()) => {
                metrics::counter!("qr_events_persisted").increment(1);
                info!(payload = %payload, region = %region, "New QR code recorded");
            }
            Err(e) => {
                metrics::counter!("qr_persist_failures").increment(1);
                error!(payload = %payload, error = %e, "Failed to persist QR event");
            }
        }
    }

    /// Tear down a session whose capture failed, unless stop/start already replaced it
    fn end_session(&self, core: &mut Core, id: u64) {
        if core.session.as_ref().map(|s| s.id) != Some(id) {
            return;
        }
        core.session = None;
        core.release_source();
        core.state = CameraState::Stopped;
    }
}

/// Receiving end of the frame fan-out
pub struct FrameSubscription {
    frames: broadcast::Receiver<Bytes>,
    cancelled: watch::Receiver<bool>,
}

impl FrameSubscription {
    /// Next encoded frame, or `None` once the session ends.
    ///
    /// Frames still buffered when the session ends are discarded. A consumer that falls
    /// behind skips to the oldest frame still buffered.
    pub async fn next(&mut self) -> Option<Bytes> {
        loop {
            if self.session_over() {
                return None;
            }
            tokio::select! {
                biased;
                // both outcomes are picked up by session_over() on the next turn
                _ = self.cancelled.changed() => {}
                received = self.frames.recv() => match received {
                    Ok(_) if self.session_over() => return None,
                    Ok(frame) => return Some(frame),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Stream consumer lagging, skipping frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Stopped, or torn down after a capture failure
    fn session_over(&self) -> bool {
        *self.cancelled.borrow() || self.cancelled.has_changed().is_err()
    }
}
