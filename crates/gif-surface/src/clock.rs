use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::host::RenderTarget;
use crate::surface::{RedrawCoordinator, SurfaceBridge};

/// Receives ticks from a [`RenderClock`].
pub trait TickListener: Send + Sync {
    fn on_tick(&self);
}

/// Handle identifying one clock subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockSubscription(pub u64);

/// Host periodic render clock. The cadence belongs to the host.
pub trait RenderClock: Send + Sync {
    fn subscribe(&self, listener: Arc<dyn TickListener>) -> ClockSubscription;
    fn unsubscribe(&self, subscription: ClockSubscription);
}

/// Clock driven explicitly by the host calling [`ManualClock::tick`], e.g.
/// from its frame callback.
#[derive(Default)]
pub struct ManualClock {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ClockSubscription, Arc<dyn TickListener>)>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one tick to every current subscriber. Listeners are invoked
    /// outside the registry lock so they may unsubscribe from within.
    pub fn tick(&self) {
        let listeners: Vec<Arc<dyn TickListener>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener.on_tick();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl RenderClock for ManualClock {
    fn subscribe(&self, listener: Arc<dyn TickListener>) -> ClockSubscription {
        let subscription = ClockSubscription(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((subscription, listener));
        subscription
    }

    fn unsubscribe(&self, subscription: ClockSubscription) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(id, _)| *id != subscription);
    }
}

/// Tick consumer: turns a pending frame into one redraw request.
///
/// Runs on every tick, so it does no pixel work. With nothing pending it
/// returns without touching either lock.
pub struct RenderClockAdapter {
    surface: Arc<SurfaceBridge>,
    target: Arc<dyn RenderTarget>,
    coordinator: RedrawCoordinator,
    disposed: Arc<AtomicBool>,
    redraws: AtomicU64,
}

impl RenderClockAdapter {
    pub fn new(
        surface: Arc<SurfaceBridge>,
        target: Arc<dyn RenderTarget>,
        coordinator: RedrawCoordinator,
        disposed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            surface,
            target,
            coordinator,
            disposed,
            redraws: AtomicU64::new(0),
        }
    }

    /// Redraw requests issued so far.
    pub fn redraws(&self) -> u64 {
        self.redraws.load(Ordering::Relaxed)
    }
}

impl TickListener for RenderClockAdapter {
    fn on_tick(&self) {
        if self.disposed.load(Ordering::Acquire) || !self.surface.has_pending() {
            return;
        }
        // Redraw lock, then the surface lock inside take_pending.
        self.coordinator.serialize(|| {
            if self.surface.take_pending() {
                self.target.invalidate();
                self.redraws.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
}
