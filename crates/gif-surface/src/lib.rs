//! Animated GIF playback onto a host-redrawn pixel surface.
//!
//! A dedicated thread decodes frames at their declared delays and copies
//! each one into a [`SurfaceBridge`] under its lock. The host's render clock
//! ticks a [`RenderClockAdapter`], which turns a pending frame into a single
//! redraw request. [`AnimationSession`] owns all of it and tears it down.

pub mod clock;
pub mod config;
pub mod error;
pub mod host;
pub mod repeat;
pub mod session;
pub mod source;
pub mod stream;
pub mod surface;
pub mod worker;

#[cfg(test)]
mod testing;

pub use clock::{ClockSubscription, ManualClock, RenderClock, RenderClockAdapter, TickListener};
pub use config::{IterationCount, PlaybackConfig};
pub use error::{Error, Result};
pub use host::RenderTarget;
pub use repeat::RepeatPolicy;
pub use session::{AnimationSession, HostContext, SessionState};
pub use source::{Decoded, FrameInfo, FrameSource};
pub use stream::{ByteStream, SharedStream, is_seekable};
pub use surface::{
    PixelFormat, RedrawCoordinator, SurfaceBridge, SurfaceReadGuard, SurfaceWriteGuard,
};
pub use worker::{BackgroundWorker, WorkerCommand, WorkerConfig, WorkerEvent};
