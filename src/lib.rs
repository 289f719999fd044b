//! Chartify Registry - chart instance lifecycle management
//!
//! A [`ChartRegistry`] keeps at most one live chart per surface id. It builds,
//! repaints and tears charts down through a [`RenderEngine`]; the bundled
//! [`BitmapEngine`] draws into in-memory canvases and exports PNG.
//!
//! ```no_run
//! use chartify_registry::{BitmapEngine, CanvasConfig, ChartRegistry, ChartSpec, ChartKind, Series};
//!
//! let engine = BitmapEngine::with_surfaces(CanvasConfig::default(), ["tco-chart"])?;
//! let mut registry = ChartRegistry::new(engine);
//!
//! let spec = ChartSpec::new(ChartKind::Bar)
//!     .with_series(Series::new("Current", vec![100000.0]))
//!     .with_categories(["Total"]);
//! registry.create("tco-chart", spec)?;
//! assert!(registry.get("tco-chart").is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod charts;
pub mod data;
pub mod tracing_setup;

pub use charts::{
    BitmapChart, BitmapEngine, CanvasConfig, ChartId, ChartInstance, ChartKind, ChartRegistry,
    ChartSpec, EngineError, RegistryError, RenderEngine, RenderHints, Series, SpecPatch,
    SurfaceHost,
};
