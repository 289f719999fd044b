//! Rendering engine seam.
//!
//! The registry never draws anything itself. It resolves surfaces, builds,
//! repaints and releases chart instances through this trait, so any backend
//! (bitmap canvases, a GUI toolkit, a test double) can sit behind it.

use crate::charts::spec::{ChartId, ChartSpec};

/// Capabilities the registry needs from a rendering backend.
pub trait RenderEngine {
    /// A resolved, drawable target.
    type Surface;
    /// A live chart instance bound to one surface.
    type Handle;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resolve a surface id, or `None` when the surface does not exist.
    fn attach(&mut self, surface_id: &ChartId) -> Option<Self::Surface>;

    /// Build a chart instance on `surface` from `spec`.
    fn construct(
        &mut self,
        surface: Self::Surface,
        spec: &ChartSpec,
    ) -> Result<Self::Handle, Self::Error>;

    /// Apply `spec` to an existing instance and repaint it.
    fn redraw(&mut self, handle: &mut Self::Handle, spec: &ChartSpec) -> Result<(), Self::Error>;

    /// Release everything bound to `handle`.
    fn dispose(&mut self, handle: Self::Handle) -> Result<(), Self::Error>;
}

/// Engines whose surfaces can appear and disappear at runtime (view changes).
pub trait SurfaceHost {
    /// Returns false if the surface already existed.
    fn add_surface(&mut self, surface_id: &ChartId) -> bool;

    /// Returns false if there was no such surface.
    fn remove_surface(&mut self, surface_id: &ChartId) -> bool;
}
