use std::sync::Arc;

use crate::surface::SurfaceBridge;

/// The host visual an animation is displayed on.
///
/// `invalidate` is called from the render-clock context and should only
/// request a redraw; the host reads pixels later through
/// [`SurfaceBridge::read`].
pub trait RenderTarget: Send + Sync {
    /// Make `surface` the visual's rendering source.
    fn attach_surface(&self, surface: Arc<SurfaceBridge>);

    /// Drop the rendering source at session teardown.
    fn detach_surface(&self) {}

    /// Request a redraw of the visual.
    fn invalidate(&self);
}
