use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Receiver;

use crate::clock::{ClockSubscription, RenderClock, RenderClockAdapter};
use crate::config::PlaybackConfig;
use crate::error::{Error, Result};
use crate::host::RenderTarget;
use crate::source::FrameSource;
use crate::stream::{ByteStream, SharedStream, is_seekable};
use crate::surface::{RedrawCoordinator, SurfaceBridge};
use crate::worker::{BackgroundWorker, WorkerConfig, WorkerEvent};

/// Host services a session plugs into.
#[derive(Clone)]
pub struct HostContext {
    pub clock: Arc<dyn RenderClock>,
    /// Shared by every session drawing into the same host.
    pub coordinator: RedrawCoordinator,
}

impl HostContext {
    pub fn new(clock: Arc<dyn RenderClock>, coordinator: RedrawCoordinator) -> Self {
        Self { clock, coordinator }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Disposed,
}

struct Running<R: ByteStream> {
    stream: SharedStream<R>,
    worker: BackgroundWorker<R>,
    surface: Arc<SurfaceBridge>,
    adapter: Arc<RenderClockAdapter>,
    subscription: ClockSubscription,
    frame_count: usize,
}

/// One animated GIF bound to one host visual. Owns the stream, decode
/// thread and surface, and is the only place that tears them down.
pub struct AnimationSession<R: ByteStream> {
    target: Arc<dyn RenderTarget>,
    host: HostContext,
    config: PlaybackConfig,
    stream: Option<R>,
    running: Option<Running<R>>,
    state: SessionState,
    disposed: Arc<AtomicBool>,
}

impl<R: ByteStream> AnimationSession<R> {
    pub fn new(
        target: Arc<dyn RenderTarget>,
        stream: R,
        config: PlaybackConfig,
        host: HostContext,
    ) -> Self {
        Self {
            target,
            host,
            config,
            stream: Some(stream),
            running: None,
            state: SessionState::Created,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `Created -> Running`: open the stream, size the surface from the
    /// header, spawn the decode thread and subscribe to the render clock.
    ///
    /// A non-seekable stream fails with [`Error::Argument`] before any
    /// thread is spawned.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            SessionState::Created => {}
            SessionState::Running => return Err(Error::argument("session already started")),
            SessionState::Disposed => return Err(Error::argument("session has been disposed")),
        }
        let Some(mut stream) = self.stream.take() else {
            return Err(Error::argument("session has no stream"));
        };
        if !is_seekable(&mut stream) {
            return Err(Error::argument("The stream is not seekable"));
        }

        let shared = SharedStream::new(stream);
        let source = FrameSource::open(shared.clone(), self.config.iterations)?;
        let (width, height) = source.dimensions();
        let frame_count = source.frame_count();

        let surface = Arc::new(SurfaceBridge::new(width, height));
        let worker = BackgroundWorker::spawn(
            source,
            Arc::clone(&surface),
            WorkerConfig {
                min_frame_delay: self.config.min_frame_delay(),
            },
            Arc::clone(&self.disposed),
        )?;
        self.target.attach_surface(Arc::clone(&surface));

        let adapter = Arc::new(RenderClockAdapter::new(
            Arc::clone(&surface),
            Arc::clone(&self.target),
            self.host.coordinator.clone(),
            Arc::clone(&self.disposed),
        ));
        let subscription = self.host.clock.subscribe(adapter.clone());

        if self.config.auto_start {
            worker.play();
        }

        log::info!("Animation session started ({width}x{height}, {frame_count} frames)");
        self.running = Some(Running {
            stream: shared,
            worker,
            surface,
            adapter,
            subscription,
            frame_count,
        });
        self.state = SessionState::Running;
        Ok(())
    }

    /// `Running -> Disposed`. Tears down in reverse: clock subscription,
    /// decode thread, surface, decoder, stream. Safe to call repeatedly.
    ///
    /// The flag is raised under the surface lock, so no frame is committed
    /// or announced once `is_disposed` reports true.
    pub fn dispose(&mut self) {
        let already = match &self.running {
            Some(running) => running
                .surface
                .locked(|| self.disposed.swap(true, Ordering::AcqRel)),
            None => self.disposed.swap(true, Ordering::AcqRel),
        };
        if already {
            return;
        }
        self.state = SessionState::Disposed;

        if let Some(running) = self.running.take() {
            let Running {
                stream,
                mut worker,
                surface,
                adapter,
                subscription,
                ..
            } = running;
            self.host.clock.unsubscribe(subscription);
            let source = worker.stop();
            drop(worker);
            surface.release();
            self.target.detach_surface();
            drop(adapter);
            drop(source);
            drop(stream.release());
            log::info!("Animation session disposed");
        }
        self.stream = None;
    }

    /// Resume (or begin, when `auto_start` was off) playback.
    pub fn play(&self) -> bool {
        self.running.as_ref().is_some_and(|r| r.worker.play())
    }

    pub fn pause(&self) -> bool {
        self.running.as_ref().is_some_and(|r| r.worker.pause())
    }

    /// Register for worker events, including decode failures. `None`
    /// unless running.
    pub fn subscribe(&self) -> Option<Receiver<WorkerEvent>> {
        self.running.as_ref().map(|r| r.worker.subscribe())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Surface size fixed at start from the GIF header.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.running.as_ref().map(|r| r.surface.dimensions())
    }

    pub fn frame_count(&self) -> Option<usize> {
        self.running.as_ref().map(|r| r.frame_count)
    }

    pub fn surface(&self) -> Option<Arc<SurfaceBridge>> {
        self.running.as_ref().map(|r| Arc::clone(&r.surface))
    }

    pub fn redraw_count(&self) -> u64 {
        self.running.as_ref().map_or(0, |r| r.adapter.redraws())
    }

    pub fn is_worker_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| r.worker.is_running())
    }
}

impl<R: ByteStream> Drop for AnimationSession<R> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::IterationCount;
    use crate::testing::*;

    struct Harness {
        clock: Arc<ManualClock>,
        target: Arc<RecordingTarget>,
        coordinator: RedrawCoordinator,
    }

    impl Harness {
        fn new() -> Self {
            init_logging();
            Self {
                clock: Arc::new(ManualClock::new()),
                target: Arc::new(RecordingTarget::default()),
                coordinator: RedrawCoordinator::new(),
            }
        }

        fn host(&self) -> HostContext {
            HostContext::new(self.clock.clone(), self.coordinator.clone())
        }

        fn session<S: ByteStream>(&self, stream: S, config: PlaybackConfig) -> AnimationSession<S> {
            AnimationSession::new(self.target.clone(), stream, config, self.host())
        }

        /// Tick the clock until `done` or the timeout elapses.
        fn tick_until(&self, timeout: Duration, done: impl Fn() -> bool) -> bool {
            let deadline = Instant::now() + timeout;
            while Instant::now() < deadline {
                self.clock.tick();
                if done() {
                    return true;
                }
                std::thread::sleep(Duration::from_millis(2));
            }
            false
        }
    }

    fn count(counter: &std::sync::atomic::AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    #[test]
    fn start_sizes_surface_from_header() {
        let h = Harness::new();
        let mut session =
            h.session(Cursor::new(two_frame_gif(10, 6, 10)), PlaybackConfig::default());
        assert_eq!(session.state(), SessionState::Created);
        session.start().unwrap();

        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.dimensions(), Some((10, 6)));
        assert_eq!(session.frame_count(), Some(2));
        let surface = session.surface().unwrap();
        assert_eq!(surface.byte_len(), 10 * 6 * 4);
        assert_eq!(count(&h.target.attached), 1);
        assert_eq!(h.clock.subscriber_count(), 1);

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(session.dimensions(), Some((10, 6)));
        assert_eq!(surface.read().len(), 10 * 6 * 4);
    }

    #[test]
    fn ticks_turn_frames_into_redraws() {
        let h = Harness::new();
        let mut session = h.session(
            Cursor::new(two_frame_gif(4, 4, 2)),
            PlaybackConfig::default().with_min_frame_delay_ms(1),
        );
        session.start().unwrap();
        assert!(h.tick_until(Duration::from_secs(2), || h.target.invalidations() >= 2));
        assert_eq!(session.redraw_count(), h.target.invalidations() as u64);
    }

    #[test]
    fn non_seekable_stream_fails_before_any_thread() {
        let h = Harness::new();
        let mut session = h.session(
            NonSeekable(Cursor::new(two_frame_gif(4, 4, 1))),
            PlaybackConfig::default(),
        );
        let err = session.start().unwrap_err();
        assert!(matches!(err, Error::Argument(_)), "{err}");
        assert!(!session.is_worker_running());
        assert_eq!(session.state(), SessionState::Created);
        assert_eq!(h.clock.subscriber_count(), 0);
        assert_eq!(count(&h.target.attached), 0);
    }

    #[test]
    fn malformed_header_is_format_error() {
        let h = Harness::new();
        let mut session = h.session(Cursor::new(b"GIF89a\x01".to_vec()), PlaybackConfig::default());
        let err = session.start().unwrap_err();
        assert!(matches!(err, Error::Format(_)), "{err}");
        assert_eq!(h.clock.subscriber_count(), 0);
    }

    #[test]
    fn start_twice_is_rejected() {
        let h = Harness::new();
        let mut session = h.session(Cursor::new(two_frame_gif(4, 4, 1)), PlaybackConfig::default());
        session.start().unwrap();
        assert!(matches!(session.start(), Err(Error::Argument(_))));
        assert_eq!(h.clock.subscriber_count(), 1);
    }

    #[test]
    fn dispose_twice_releases_once() {
        let h = Harness::new();
        let mut session = h.session(Cursor::new(two_frame_gif(4, 4, 1)), PlaybackConfig::default());
        session.start().unwrap();
        let surface = session.surface().unwrap();

        session.dispose();
        session.dispose();
        drop(session);

        assert_eq!(count(&h.target.detached), 1);
        assert_eq!(h.clock.subscriber_count(), 0);
        assert!(surface.is_released());
    }

    #[test]
    fn dispose_before_start_is_harmless() {
        let h = Harness::new();
        let mut session = h.session(Cursor::new(two_frame_gif(4, 4, 1)), PlaybackConfig::default());
        session.dispose();
        assert_eq!(session.state(), SessionState::Disposed);
        assert!(matches!(session.start(), Err(Error::Argument(_))));
        assert_eq!(count(&h.target.detached), 0);
    }

    #[test]
    fn disposed_session_stops_redrawing() {
        let h = Harness::new();
        let mut session = h.session(
            Cursor::new(two_frame_gif(4, 4, 1)),
            PlaybackConfig::default().with_min_frame_delay_ms(1),
        );
        session.start().unwrap();
        assert!(h.tick_until(Duration::from_secs(2), || h.target.invalidations() >= 1));

        session.dispose();
        assert!(!session.is_worker_running());
        let before = h.target.invalidations();
        for _ in 0..10 {
            h.clock.tick();
        }
        assert_eq!(h.target.invalidations(), before);
        assert!(!session.play());
    }

    #[test]
    fn auto_start_off_waits_for_play() {
        let h = Harness::new();
        let mut session = h.session(
            Cursor::new(two_frame_gif(4, 4, 1)),
            PlaybackConfig::default().with_auto_start(false),
        );
        session.start().unwrap();
        let surface = session.surface().unwrap();
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(surface.frames_written(), 0);

        assert!(session.play());
        assert!(h.tick_until(Duration::from_secs(2), || surface.frames_written() > 0));
    }

    #[test]
    fn bounded_session_finishes() {
        let h = Harness::new();
        let mut session = h.session(
            Cursor::new(two_frame_gif(4, 4, 0)),
            PlaybackConfig::default()
                .with_iterations(IterationCount::Finite(1))
                .with_auto_start(false)
                .with_min_frame_delay_ms(1),
        );
        session.start().unwrap();
        let events = session.subscribe().unwrap();
        session.play();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut frames = 0;
        while let Ok(event) = events.recv_deadline(deadline) {
            match event {
                WorkerEvent::FrameReady(_) => frames += 1,
                WorkerEvent::Finished => break,
                WorkerEvent::Failed(e) => panic!("{e}"),
            }
        }
        assert_eq!(frames, 2);
        assert_eq!(session.surface().unwrap().frames_written(), 2);
    }

    #[test]
    fn sessions_share_one_coordinator() {
        let h = Harness::new();
        let config = PlaybackConfig::default().with_min_frame_delay_ms(1);
        let mut a = h.session(Cursor::new(two_frame_gif(4, 4, 1)), config.clone());
        let mut b = h.session(Cursor::new(two_frame_gif(8, 8, 1)), config);
        a.start().unwrap();
        b.start().unwrap();
        assert_eq!(h.clock.subscriber_count(), 2);
        let both_drawn = || a.redraw_count() > 0 && b.redraw_count() > 0;
        assert!(h.tick_until(Duration::from_secs(2), both_drawn));

        a.dispose();
        assert_eq!(h.clock.subscriber_count(), 1);
        assert_eq!(b.state(), SessionState::Running);
    }

    #[test]
    fn no_frame_lands_after_dispose() {
        let h = Harness::new();
        let gif = Cursor::new(two_frame_gif(4, 4, 0));
        let stream = SlowReads::new(gif, Duration::from_millis(200));
        let throttle = stream.throttle();
        let mut session = h.session(stream, PlaybackConfig::default().with_min_frame_delay_ms(1));
        session.start().unwrap();
        let surface = session.surface().unwrap();
        let events = session.subscribe().unwrap();
        assert!(h.tick_until(Duration::from_secs(2), || surface.frames_written() >= 2));

        // Catch the decode thread inside a read so its next frame is in flight.
        throttle.arm();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !throttle.is_stalled() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(throttle.is_stalled());
        let written = surface.frames_written();
        let _ = events.try_iter().count();

        session.dispose();
        assert!(session.is_disposed());
        assert_eq!(surface.frames_written(), written);
        assert!(events.try_iter().all(|e| !matches!(e, WorkerEvent::FrameReady(_))));
        assert!(surface.is_released());
    }
}
