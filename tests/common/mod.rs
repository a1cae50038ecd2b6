#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};
use qrcam::capture::{CameraError, CaptureError, Frame, FrameSource, SourceOpener};
use qrcam::detect::{DecodedCode, Point, QrDecoder};
use qrcam::store::JsonFileStore;
use qrcam::{CameraService, CaptureConfig, Config};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

/// A frame whose top-left red channel carries `marker`; 0 means "no code"
pub fn frame(sequence: u64, marker: u8) -> Frame {
    let mut image = RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([0, 0, 0]));
    image.put_pixel(0, 0, Rgb([marker, 0, 0]));
    Frame::from_rgb(sequence, WIDTH, HEIGHT, image.into_raw())
}

/// Decodes the marker pixel through a lookup table; clones share the sighting counts
#[derive(Clone)]
pub struct TableDecoder {
    payloads: Arc<HashMap<u8, String>>,
    sightings: Arc<Mutex<HashMap<String, usize>>>,
}

impl TableDecoder {
    pub fn new(entries: &[(u8, &str)]) -> Self {
        Self {
            payloads: Arc::new(entries.iter().map(|&(k, v)| (k, v.to_string())).collect()),
            sightings: Arc::default(),
        }
    }

    /// How many frames so far carried `payload`
    pub fn sightings(&self, payload: &str) -> usize {
        self.sightings.lock().unwrap().get(payload).copied().unwrap_or(0)
    }
}

impl QrDecoder for TableDecoder {
    fn detect(&self, frame: &RgbImage) -> Option<DecodedCode> {
        let marker = frame.get_pixel(0, 0).0[0];
        let payload = self.payloads.get(&marker)?;
        *self.sightings.lock().unwrap().entry(payload.clone()).or_default() += 1;
        Some(DecodedCode {
            payload: payload.clone(),
            corners: vec![
                Point::new(10, 20),
                Point::new(40, 20),
                Point::new(40, 40),
                Point::new(10, 40),
            ],
        })
    }
}

/// How long a scripted camera waits for a new frame before repeating the last one
pub const FRAME_PERIOD: Duration = Duration::from_millis(20);

/// Live-camera stand-in: delivers queued frames, repeats the latest one while the queue is
/// empty, and fails once the feeding side is dropped
pub struct ScriptedSource {
    frames: flume::Receiver<Frame>,
    last: Frame,
    open: bool,
    released: Arc<AtomicUsize>,
}

impl FrameSource for ScriptedSource {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        if !self.open {
            return Err(CaptureError::Closed);
        }
        match self.frames.recv_timeout(FRAME_PERIOD) {
            Ok(frame) => {
                self.last = frame.clone();
                Ok(frame)
            }
            Err(flume::RecvTimeoutError::Timeout) => Ok(self.last.clone()),
            Err(flume::RecvTimeoutError::Disconnected) => Err(CaptureError::Closed),
        }
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[derive(Default)]
struct OpenerState {
    feeds: Mutex<VecDeque<flume::Receiver<Frame>>>,
    opens: AtomicUsize,
    released: Arc<AtomicUsize>,
}

/// Hands out one queued feed per open; fails with `Busy` when none is queued
#[derive(Clone, Default)]
pub struct ScriptedOpener {
    state: Arc<OpenerState>,
}

impl ScriptedOpener {
    /// Queue a feed for the next open and return its sending side
    pub fn feed(&self) -> flume::Sender<Frame> {
        let (tx, rx) = flume::unbounded();
        self.state.feeds.lock().unwrap().push_back(rx);
        tx
    }

    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }
}

impl SourceOpener for ScriptedOpener {
    fn open(&self, _config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CameraError> {
        let feed = self
            .state
            .feeds
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CameraError::Busy("scripted".into()))?;
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            frames: feed,
            last: frame(0, 0),
            open: true,
            released: self.state.released.clone(),
        }))
    }
}

pub fn test_config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.pipeline.frame_interval_ms = 0;
    config.pipeline.broadcast_capacity = 16;
    config.storage.path = dir.path().join("qr_data.json");
    config
}

pub struct Harness {
    pub service: CameraService,
    pub opener: ScriptedOpener,
    pub store: Arc<JsonFileStore>,
    pub dir: tempfile::TempDir,
}

pub fn harness(decoder: TableDecoder) -> Harness {
    harness_with(decoder, |_| {})
}

pub fn harness_with(decoder: TableDecoder, tweak: impl FnOnce(&mut Config)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    tweak(&mut config);
    let store = Arc::new(JsonFileStore::new(&config.storage.path));
    let opener = ScriptedOpener::default();
    let service = CameraService::new(config, opener.clone(), decoder, store.clone());
    Harness {
        service,
        opener,
        store,
        dir,
    }
}

/// Poll until `check` holds or patience runs out
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + PATIENCE;
    while !check() {
        assert!(std::time::Instant::now() < deadline, "condition never held");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Bound on how long a test waits for the capture thread
pub const PATIENCE: Duration = Duration::from_secs(10);
