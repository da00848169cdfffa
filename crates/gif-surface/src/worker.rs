use std::io::{Read, Seek};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::error::{Error, Result};
use crate::source::{Decoded, FrameInfo, FrameSource};
use crate::stream::ByteStream;
use crate::surface::SurfaceBridge;

/// Commands accepted by the decode thread. Delivery is queued and processed
/// one at a time; an in-flight decode is never preempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCommand {
    Play,
    Pause,
    Stop,
}

/// Notifications published by the decode thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A frame was copied to the surface and marked pending.
    FrameReady(FrameInfo),
    /// The bounded repeat policy is used up; the thread idles until `Stop`.
    Finished,
    /// Decoding failed and the thread exited. The last good frame stays on
    /// the surface.
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Declared delays shorter than this are clamped up to it.
    pub min_frame_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            min_frame_delay: Duration::from_millis(20),
        }
    }
}

/// Max buffered frame notifications per listener before new ones are
/// dropped. Each channel holds one slot more, reserved for the single
/// `Finished` or `Failed` a thread can emit.
const LISTENER_CAPACITY: usize = 64;

type Listeners = Arc<Mutex<Vec<Sender<WorkerEvent>>>>;

/// Dedicated decode thread driving a [`FrameSource`] at its frame delays
/// and copying each frame into the [`SurfaceBridge`].
pub struct BackgroundWorker<R: ByteStream> {
    commands: Sender<WorkerCommand>,
    listeners: Listeners,
    thread: Option<JoinHandle<FrameSource<R>>>,
}

impl<R: ByteStream> BackgroundWorker<R> {
    /// Spawn the decode thread. It starts paused; send `Play` to begin.
    ///
    /// Once `cancel` is set no further frame is committed or announced. The
    /// flag is checked under the surface lock, so the owner can order it
    /// against writes with [`SurfaceBridge::locked`].
    pub fn spawn(
        source: FrameSource<R>,
        surface: Arc<SurfaceBridge>,
        config: WorkerConfig,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self> {
        let (commands, command_rx) = crossbeam_channel::unbounded();
        let listeners: Listeners = Arc::new(Mutex::new(Vec::new()));
        let thread_listeners = Arc::clone(&listeners);

        let handle = std::thread::Builder::new()
            .name("gif-decode".into())
            .spawn(move || {
                let mut source = source;
                let ctx = LoopContext {
                    surface: &surface,
                    commands: &command_rx,
                    listeners: &thread_listeners,
                    cancel: &cancel,
                    config,
                };
                decode_loop(&mut source, &ctx);
                log::info!("GIF decode thread exiting");
                source
            })
            .map_err(|e| Error::Thread(format!("Failed to spawn decode thread: {e}")))?;

        Ok(Self {
            commands,
            listeners,
            thread: Some(handle),
        })
    }

    /// Queue a command. Returns false if the thread has already exited.
    pub fn send(&self, command: WorkerCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn play(&self) -> bool {
        self.send(WorkerCommand::Play)
    }

    pub fn pause(&self) -> bool {
        self.send(WorkerCommand::Pause)
    }

    /// Register a listener for worker events. A slow listener loses frame
    /// notifications rather than stall the decode thread, but always
    /// receives `Finished` and `Failed`.
    pub fn subscribe(&self) -> Receiver<WorkerEvent> {
        let (tx, rx) = crossbeam_channel::bounded(LISTENER_CAPACITY + 1);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Stop and join the thread, handing the frame source back so the owner
    /// controls when it is released. `None` if already stopped or the
    /// thread panicked.
    pub fn stop(&mut self) -> Option<FrameSource<R>> {
        let handle = self.thread.take()?;
        let _ = self.commands.send(WorkerCommand::Stop);
        match handle.join() {
            Ok(source) => Some(source),
            Err(_) => {
                log::error!("GIF decode thread panicked");
                None
            }
        }
    }

    /// Whether the thread is alive (it exits on stop, decode failure, or a
    /// released surface).
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl<R: ByteStream> Drop for BackgroundWorker<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn broadcast(listeners: &Listeners, event: &WorkerEvent) {
    let terminal = !matches!(event, WorkerEvent::FrameReady(_));
    let mut listeners = listeners.lock().unwrap_or_else(PoisonError::into_inner);
    listeners.retain(|tx| {
        if !terminal && tx.len() >= LISTENER_CAPACITY {
            return true;
        }
        !matches!(tx.try_send(event.clone()), Err(TrySendError::Disconnected(_)))
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayState {
    Paused,
    Playing,
    Exhausted,
}

struct LoopContext<'a> {
    surface: &'a SurfaceBridge,
    commands: &'a Receiver<WorkerCommand>,
    listeners: &'a Listeners,
    cancel: &'a AtomicBool,
    config: WorkerConfig,
}

impl LoopContext<'_> {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

fn decode_loop<R: Read + Seek>(source: &mut FrameSource<R>, ctx: &LoopContext<'_>) {
    let LoopContext {
        surface,
        commands,
        listeners,
        config,
        ..
    } = *ctx;
    let mut state = PlayState::Paused;
    let mut next_due = Instant::now();
    // Delay still owed to the current frame when playback was paused.
    let mut remaining = Duration::ZERO;

    loop {
        // Waiting on the queue doubles as the inter-frame sleep, so Stop
        // wakes the thread immediately.
        let command = match state {
            PlayState::Playing => match commands.recv_deadline(next_due) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => return,
            },
            PlayState::Paused | PlayState::Exhausted => match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => return,
            },
        };

        if let Some(command) = command {
            match (command, state) {
                (WorkerCommand::Stop, _) => return,
                (WorkerCommand::Play, PlayState::Paused) => {
                    state = PlayState::Playing;
                    next_due = Instant::now() + remaining;
                }
                (WorkerCommand::Play, PlayState::Exhausted) => {
                    log::debug!("Play ignored: frame sequence exhausted");
                }
                (WorkerCommand::Pause, PlayState::Playing) => {
                    state = PlayState::Paused;
                    remaining = next_due.saturating_duration_since(Instant::now());
                }
                _ => {}
            }
            continue;
        }

        let started = Instant::now();
        match source.decode_next_frame() {
            Ok(Decoded::Frame(info)) => {
                let Some(mut pixels) = surface.begin_write() else {
                    log::debug!("Surface released, decode thread stopping");
                    return;
                };
                if ctx.cancelled() {
                    log::debug!("Decode thread cancelled, frame {} dropped", info.index);
                    return;
                }
                source.copy_into(&mut pixels);
                pixels.commit();
                if ctx.cancelled() {
                    return;
                }
                broadcast(listeners, &WorkerEvent::FrameReady(info));
                next_due = started + info.delay.max(config.min_frame_delay);
            }
            Ok(Decoded::Exhausted) => {
                log::info!("GIF playback finished");
                state = PlayState::Exhausted;
                broadcast(listeners, &WorkerEvent::Finished);
            }
            Err(e) => {
                log::error!("GIF decode failed: {e}");
                broadcast(listeners, &WorkerEvent::Failed(e.to_string()));
                return;
            }
        }
    }
}
