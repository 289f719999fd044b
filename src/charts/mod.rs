//! Charts module - chart specs, the instance registry and the bitmap engine

mod engine;
mod plotter;
mod registry;
mod renderer;
mod spec;

pub use engine::{RenderEngine, SurfaceHost};
pub use plotter::{ChartPlotter, PlotError, PlotStyle, PALETTE};
pub use registry::{ChartInstance, ChartRegistry, RegistryError};
pub use renderer::{BitmapChart, BitmapEngine, BitmapSurface, CanvasConfig, EngineError};
pub use spec::{ChartId, ChartKind, ChartSpec, RenderHints, Series, SpecPatch};
