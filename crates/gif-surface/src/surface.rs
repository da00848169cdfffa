use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

/// Pixel layout of the presentable surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit blue, green, red, alpha; 4 bytes per pixel.
    Bgra8888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8888 => 4,
        }
    }
}

struct SurfaceState {
    pixels: Vec<u8>,
    pending: bool,
    released: bool,
}

/// The presentable pixel surface shared by the decode thread (writer) and
/// the render-clock consumer.
///
/// The pixel buffer and the pending flag live under one mutex. Writers hold
/// it for the entire copy, so a consumer that sees `pending` can never see a
/// partially written frame. `pending_hint` mirrors the flag so idle ticks
/// skip the mutex entirely.
pub struct SurfaceBridge {
    width: u32,
    height: u32,
    format: PixelFormat,
    state: Mutex<SurfaceState>,
    pending_hint: AtomicBool,
    frames_written: AtomicU64,
}

impl SurfaceBridge {
    pub fn new(width: u32, height: u32) -> Self {
        let format = PixelFormat::Bgra8888;
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            state: Mutex::new(SurfaceState {
                pixels: vec![0; len],
                pending: false,
                released: false,
            }),
            pending_hint: AtomicBool::new(false),
            frames_written: AtomicU64::new(0),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes per row of the pixel buffer.
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    pub fn byte_len(&self) -> usize {
        self.stride() * self.height as usize
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the pixel buffer for writing. Returns `None` once the surface
    /// has been released. The lock is held until the guard drops; call
    /// [`SurfaceWriteGuard::commit`] to publish the frame.
    pub fn begin_write(&self) -> Option<SurfaceWriteGuard<'_>> {
        let state = self.lock();
        if state.released {
            return None;
        }
        Some(SurfaceWriteGuard {
            state,
            bridge: self,
        })
    }

    /// Read and clear the pending flag under the writer lock.
    ///
    /// Never blocks: with no hint set no lock is taken, and if a writer
    /// currently holds the lock this reports `false` and the frame is picked
    /// up on a later call.
    pub fn take_pending(&self) -> bool {
        if !self.pending_hint.load(Ordering::Acquire) {
            return false;
        }
        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::WouldBlock) => return false,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        self.pending_hint.store(false, Ordering::Release);
        std::mem::take(&mut state.pending)
    }

    /// Lock-free check whether a committed frame may be waiting.
    pub fn has_pending(&self) -> bool {
        self.pending_hint.load(Ordering::Acquire)
    }

    /// Lock the pixel buffer for reading (host paint path). Empty once the
    /// surface has been released.
    pub fn read(&self) -> SurfaceReadGuard<'_> {
        SurfaceReadGuard { state: self.lock() }
    }

    /// Run `f` while holding the surface lock. Anything `f` publishes is
    /// ordered against writers: a writer checks it either before `f` runs or
    /// after it returns, never in between.
    pub fn locked<T>(&self, f: impl FnOnce() -> T) -> T {
        let _state = self.lock();
        f()
    }

    /// Free the pixel memory and refuse further writes. Returns `true` only
    /// for the call that actually released it.
    pub fn release(&self) -> bool {
        let mut state = self.lock();
        if state.released {
            return false;
        }
        state.released = true;
        state.pending = false;
        state.pixels = Vec::new();
        self.pending_hint.store(false, Ordering::Release);
        true
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Number of frames committed so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }
}

/// Exclusive access to the pixel buffer; the surface lock is dropped with
/// the guard, including on unwind.
pub struct SurfaceWriteGuard<'a> {
    state: MutexGuard<'a, SurfaceState>,
    bridge: &'a SurfaceBridge,
}

impl SurfaceWriteGuard<'_> {
    /// Mark the written frame as pending and release the lock.
    pub fn commit(mut self) {
        self.state.pending = true;
        self.bridge.pending_hint.store(true, Ordering::Release);
        self.bridge.frames_written.fetch_add(1, Ordering::Relaxed);
    }
}

impl Deref for SurfaceWriteGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.state.pixels
    }
}

impl DerefMut for SurfaceWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.state.pixels
    }
}

pub struct SurfaceReadGuard<'a> {
    state: MutexGuard<'a, SurfaceState>,
}

impl Deref for SurfaceReadGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.state.pixels
    }
}

/// Process-scoped lock serializing redraw requests across every animated
/// surface sharing a host.
///
/// Lock order is fixed: this lock first, then a surface's own lock. Only
/// the render-clock consumer takes it; writers never do.
#[derive(Clone, Default)]
pub struct RedrawCoordinator {
    lock: Arc<Mutex<()>>,
}

impl RedrawCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the redraw lock.
    pub fn serialize<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}
