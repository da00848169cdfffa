//! In-memory GIF fixtures and host fakes shared by the unit tests.

use std::borrow::Cow;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::host::RenderTarget;
use crate::surface::SurfaceBridge;

/// Black, red, green, blue.
pub const PALETTE: [u8; 12] = [0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255];
pub const BLACK: u8 = 0;
pub const RED: u8 = 1;
pub const GREEN: u8 = 2;
pub const BLUE: u8 = 3;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct TestFrame {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub indices: Vec<u8>,
    pub delay_cs: u16,
    pub dispose: gif::DisposalMethod,
    pub transparent: Option<u8>,
}

impl TestFrame {
    pub fn solid(width: u16, height: u16, color: u8, delay_cs: u16) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
            indices: vec![color; usize::from(width) * usize::from(height)],
            delay_cs,
            dispose: gif::DisposalMethod::Keep,
            transparent: None,
        }
    }

    pub fn at(mut self, left: u16, top: u16) -> Self {
        self.left = left;
        self.top = top;
        self
    }

    pub fn dispose(mut self, dispose: gif::DisposalMethod) -> Self {
        self.dispose = dispose;
        self
    }

    pub fn transparent(mut self, index: u8) -> Self {
        self.transparent = Some(index);
        self
    }
}

pub fn encode_gif(
    width: u16,
    height: u16,
    frames: &[TestFrame],
    repeat: Option<gif::Repeat>,
) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut bytes, width, height, &PALETTE).unwrap();
        if let Some(repeat) = repeat {
            encoder.set_repeat(repeat).unwrap();
        }
        for f in frames {
            let mut frame = gif::Frame::default();
            frame.left = f.left;
            frame.top = f.top;
            frame.width = f.width;
            frame.height = f.height;
            frame.delay = f.delay_cs;
            frame.dispose = f.dispose;
            frame.transparent = f.transparent;
            frame.buffer = Cow::Owned(f.indices.clone());
            encoder.write_frame(&frame).unwrap();
        }
    }
    bytes
}

/// Two full-canvas frames, red then green.
pub fn two_frame_gif(width: u16, height: u16, delay_cs: u16) -> Vec<u8> {
    encode_gif(
        width,
        height,
        &[
            TestFrame::solid(width, height, RED, delay_cs),
            TestFrame::solid(width, height, GREEN, delay_cs),
        ],
        None,
    )
}

/// Readable stream whose seeks always fail, like a pipe.
pub struct NonSeekable<R>(pub R);

impl<R: Read> Read for NonSeekable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R> Seek for NonSeekable<R> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "stream cannot seek"))
    }
}

/// Switch shared between a [`SlowReads`] stream and the test driving it.
#[derive(Clone, Default)]
pub struct Throttle {
    armed: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
}

impl Throttle {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Whether a reader is currently sleeping inside `read`.
    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::SeqCst)
    }
}

/// Stream whose reads sleep for `delay` once its throttle is armed.
pub struct SlowReads<R> {
    inner: R,
    delay: Duration,
    throttle: Throttle,
}

impl<R> SlowReads<R> {
    pub fn new(inner: R, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            throttle: Throttle::default(),
        }
    }

    pub fn throttle(&self) -> Throttle {
        self.throttle.clone()
    }
}

impl<R: Read> Read for SlowReads<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.throttle.armed.load(Ordering::SeqCst) {
            self.throttle.stalled.store(true, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.throttle.stalled.store(false, Ordering::SeqCst);
        }
        self.inner.read(buf)
    }
}

impl<R: Seek> Seek for SlowReads<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Render target that counts every call it receives.
#[derive(Default)]
pub struct RecordingTarget {
    pub attached: AtomicUsize,
    pub detached: AtomicUsize,
    pub invalidated: AtomicUsize,
    pub surface: Mutex<Option<Arc<SurfaceBridge>>>,
}

impl RecordingTarget {
    pub fn invalidations(&self) -> usize {
        self.invalidated.load(Ordering::SeqCst)
    }
}

impl RenderTarget for RecordingTarget {
    fn attach_surface(&self, surface: Arc<SurfaceBridge>) {
        self.attached.fetch_add(1, Ordering::SeqCst);
        *self.surface.lock().unwrap() = Some(surface);
    }

    fn detach_surface(&self) {
        self.detached.fetch_add(1, Ordering::SeqCst);
        self.surface.lock().unwrap().take();
    }

    fn invalidate(&self) {
        self.invalidated.fetch_add(1, Ordering::SeqCst);
    }
}
