//! Bitmap Rendering Engine
//! In-memory RGB canvases, one per surface id, drawn with [`ChartPlotter`]
//! and exported as PNG.
//!
//! Each canvas hosts at most one chart. Constructing on a canvas that is still
//! bound to another chart fails, the same way a browser canvas refuses a
//! second chart context.

use crate::charts::engine::{RenderEngine, SurfaceHost};
use crate::charts::plotter::{ChartPlotter, PlotError, PlotStyle};
use crate::charts::spec::{ChartId, ChartSpec};
use image::{ImageFormat, RgbImage};
use plotters::style::{register_font, FontStyle, RGBColor};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use thiserror::Error;
use tracing::debug;

/// Largest accepted canvas side, in pixels.
pub const MAX_CANVAS_SIDE: u32 = 16_384;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Surface '{0}' is not attached")]
    SurfaceGone(ChartId),
    #[error("Surface '{id}' is already in use by chart #{serial}")]
    SurfaceBusy { id: ChartId, serial: u64 },
    #[error("Chart #{serial} no longer owns surface '{id}'")]
    StaleHandle { id: ChartId, serial: u64 },
    #[error(transparent)]
    Plot(#[from] PlotError),
    #[error("Failed to load font '{0}'")]
    Font(PathBuf),
    #[error("Failed to read font file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Canvas size {width}x{height} is not supported")]
    BufferSize { width: u32, height: u32 },
}

/// Canvas settings shared by every surface of one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    pub background: [u8; 3],
    /// TTF/OTF file used for titles and labels. No font, no text.
    pub font: Option<PathBuf>,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 400,
            background: [255, 255, 255],
            font: None,
        }
    }
}

/// A resolved surface, handed from `attach` to `construct`.
#[derive(Debug, Clone)]
pub struct BitmapSurface {
    id: ChartId,
}

/// Live chart bound to one canvas.
#[derive(Debug)]
pub struct BitmapChart {
    surface: ChartId,
    serial: u64,
    redraws: u32,
}

impl BitmapChart {
    pub fn surface(&self) -> &ChartId {
        &self.surface
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Number of in-place repaints since construction.
    pub fn redraws(&self) -> u32 {
        self.redraws
    }
}

struct Canvas {
    pixels: Vec<u8>,
    chart: Option<u64>,
}

/// Rendering engine backed by in-memory RGB canvases.
pub struct BitmapEngine {
    config: CanvasConfig,
    style: PlotStyle,
    canvases: HashMap<ChartId, Canvas>,
    next_serial: u64,
}

impl BitmapEngine {
    /// Create an engine. Loads and registers the configured font, if any.
    pub fn new(config: CanvasConfig) -> Result<Self, EngineError> {
        let sides = 1..=MAX_CANVAS_SIDE;
        if !sides.contains(&config.width) || !sides.contains(&config.height) {
            return Err(EngineError::BufferSize {
                width: config.width,
                height: config.height,
            });
        }

        let text = match &config.font {
            Some(path) => {
                register_font("sans-serif", FontStyle::Normal, font_bytes(path)?)
                    .map_err(|_| EngineError::Font(path.clone()))?;
                debug!(font = %path.display(), "font registered");
                true
            }
            None => false,
        };

        let [r, g, b] = config.background;
        Ok(Self {
            style: PlotStyle {
                background: RGBColor(r, g, b),
                text,
            },
            config,
            canvases: HashMap::new(),
            next_serial: 0,
        })
    }

    /// Engine with several blank surfaces already attached.
    pub fn with_surfaces<I, S>(config: CanvasConfig, ids: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<ChartId>,
    {
        let mut engine = Self::new(config)?;
        for id in ids {
            engine.add_surface(&id.into());
        }
        Ok(engine)
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn has_surface(&self, id: &str) -> bool {
        self.canvases.contains_key(id)
    }

    /// Surface ids, sorted.
    pub fn surface_ids(&self) -> Vec<ChartId> {
        let mut ids: Vec<ChartId> = self.canvases.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Raw RGB pixels of a surface.
    pub fn pixels(&self, id: &str) -> Option<&[u8]> {
        self.canvases.get(id).map(|c| c.pixels.as_slice())
    }

    pub fn pixel_at(&self, id: &str, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.config.width || y >= self.config.height {
            return None;
        }
        let offset = (y as usize * self.config.width as usize + x as usize) * 3;
        let pixels = self.pixels(id)?;
        Some([pixels[offset], pixels[offset + 1], pixels[offset + 2]])
    }

    /// True when the surface shows nothing but background.
    pub fn is_blank(&self, id: &str) -> bool {
        let [r, g, b] = self.config.background;
        self.pixels(id)
            .map(|p| p.chunks_exact(3).all(|px| px == [r, g, b]))
            .unwrap_or(true)
    }

    /// Serial of the chart currently bound to a surface.
    pub fn bound_chart(&self, id: &str) -> Option<u64> {
        self.canvases.get(id).and_then(|c| c.chart)
    }

    pub fn encode_png(&self, id: &str) -> Result<Vec<u8>, EngineError> {
        let canvas = self
            .canvases
            .get(id)
            .ok_or_else(|| EngineError::SurfaceGone(ChartId::from(id)))?;
        self.encode(&canvas.pixels)
    }

    /// Encode several surfaces in parallel. Unknown ids yield `SurfaceGone`.
    pub fn encode_all_png(&self, ids: &[ChartId]) -> Vec<(ChartId, Result<Vec<u8>, EngineError>)> {
        ids.par_iter()
            .map(|id| (id.clone(), self.encode_png(id.as_str())))
            .collect()
    }

    fn encode(&self, pixels: &[u8]) -> Result<Vec<u8>, EngineError> {
        let (width, height) = (self.config.width, self.config.height);
        let img = RgbImage::from_raw(width, height, pixels.to_vec())
            .ok_or(EngineError::BufferSize { width, height })?;
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    fn blank(&self) -> Vec<u8> {
        let pixel_count = self.config.width as usize * self.config.height as usize;
        self.config
            .background
            .iter()
            .copied()
            .cycle()
            .take(pixel_count * 3)
            .collect()
    }

    /// Render into a scratch buffer so a failed draw leaves no partial chart.
    fn render(&self, spec: &ChartSpec) -> Result<Vec<u8>, EngineError> {
        let mut scratch = self.blank();
        ChartPlotter::draw(
            spec,
            &self.style,
            &mut scratch,
            (self.config.width, self.config.height),
        )?;
        Ok(scratch)
    }
}

/// Font files are read once per path and kept for the life of the process,
/// since plotters only accepts `'static` font data.
fn font_bytes(path: &Path) -> Result<&'static [u8], EngineError> {
    static LOADED: OnceLock<Mutex<HashMap<PathBuf, &'static [u8]>>> = OnceLock::new();

    let mut loaded = LOADED
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(&bytes) = loaded.get(path) {
        return Ok(bytes);
    }

    let bytes: &'static [u8] = Box::leak(std::fs::read(path)?.into_boxed_slice());
    loaded.insert(path.to_path_buf(), bytes);
    Ok(bytes)
}

impl SurfaceHost for BitmapEngine {
    fn add_surface(&mut self, surface_id: &ChartId) -> bool {
        if self.canvases.contains_key(surface_id.as_str()) {
            return false;
        }
        let canvas = Canvas {
            pixels: self.blank(),
            chart: None,
        };
        self.canvases.insert(surface_id.clone(), canvas);
        true
    }

    fn remove_surface(&mut self, surface_id: &ChartId) -> bool {
        self.canvases.remove(surface_id.as_str()).is_some()
    }
}

impl RenderEngine for BitmapEngine {
    type Surface = BitmapSurface;
    type Handle = BitmapChart;
    type Error = EngineError;

    fn attach(&mut self, surface_id: &ChartId) -> Option<BitmapSurface> {
        self.canvases
            .contains_key(surface_id.as_str())
            .then(|| BitmapSurface {
                id: surface_id.clone(),
            })
    }

    fn construct(
        &mut self,
        surface: BitmapSurface,
        spec: &ChartSpec,
    ) -> Result<BitmapChart, EngineError> {
        match self.canvases.get(surface.id.as_str()) {
            None => return Err(EngineError::SurfaceGone(surface.id)),
            Some(Canvas {
                chart: Some(serial),
                ..
            }) => {
                return Err(EngineError::SurfaceBusy {
                    id: surface.id,
                    serial: *serial,
                })
            }
            Some(_) => {}
        }

        let pixels = self.render(spec)?;
        self.next_serial += 1;
        let serial = self.next_serial;

        if let Some(canvas) = self.canvases.get_mut(surface.id.as_str()) {
            canvas.pixels = pixels;
            canvas.chart = Some(serial);
        }

        Ok(BitmapChart {
            surface: surface.id,
            serial,
            redraws: 0,
        })
    }

    fn redraw(&mut self, handle: &mut BitmapChart, spec: &ChartSpec) -> Result<(), EngineError> {
        match self.canvases.get(handle.surface.as_str()) {
            None => return Err(EngineError::SurfaceGone(handle.surface.clone())),
            Some(canvas) if canvas.chart != Some(handle.serial) => {
                return Err(EngineError::StaleHandle {
                    id: handle.surface.clone(),
                    serial: handle.serial,
                })
            }
            Some(_) => {}
        }

        let pixels = self.render(spec)?;
        if let Some(canvas) = self.canvases.get_mut(handle.surface.as_str()) {
            canvas.pixels = pixels;
        }
        handle.redraws += 1;
        Ok(())
    }

    fn dispose(&mut self, handle: BitmapChart) -> Result<(), EngineError> {
        let blank = self.blank();
        let canvas = self
            .canvases
            .get_mut(handle.surface.as_str())
            .ok_or_else(|| EngineError::SurfaceGone(handle.surface.clone()))?;

        if canvas.chart != Some(handle.serial) {
            return Err(EngineError::StaleHandle {
                id: handle.surface,
                serial: handle.serial,
            });
        }

        canvas.pixels = blank;
        canvas.chart = None;
        Ok(())
    }
}
