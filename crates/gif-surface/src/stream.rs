use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, PoisonError};

/// Byte stream an animation can be opened from.
pub trait ByteStream: Read + Seek + Send + 'static {}

impl<T: Read + Seek + Send + 'static> ByteStream for T {}

/// Probe whether the stream can actually reposition. Types like pipes
/// implement `Seek` but fail at runtime.
pub fn is_seekable<S: Seek + ?Sized>(stream: &mut S) -> bool {
    stream.stream_position().is_ok()
}

/// Owner-controlled handle to the session's input stream.
///
/// The decoder reads through a clone; the owner decides when the stream is
/// released. After `release`, reads and seeks fail with `NotConnected`.
pub struct SharedStream<R> {
    inner: Arc<Mutex<Option<R>>>,
}

impl<R> Clone for SharedStream<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> SharedStream<R> {
    pub fn new(stream: R) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(stream))),
        }
    }

    /// Detach the stream, returning it if it had not been released yet.
    pub fn release(&self) -> Option<R> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    fn with<T>(&self, f: impl FnOnce(&mut R) -> io::Result<T>) -> io::Result<T> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(stream) => f(stream),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "stream released")),
        }
    }
}

impl<R: Read> Read for SharedStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.with(|s| s.read(buf))
    }
}

impl<R: Seek> Seek for SharedStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.with(|s| s.seek(pos))
    }
}
