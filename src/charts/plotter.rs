//! Chart Plotter Module
//! Draws a chart spec onto an RGB pixel buffer using plotters.
//!
//! Everything is laid out in pixel coordinates on the root drawing area, so
//! nothing but the optional title and category labels needs a font.

use crate::charts::spec::{ChartKind, ChartSpec, Series};
use plotters::coord::Shift;
use plotters::prelude::*;
use serde_json::Value;
use std::f64::consts::PI;
use thiserror::Error;

/// Color palette for series and pie slices
pub const PALETTE: [RGBColor; 10] = [
    RGBColor(52, 152, 219),  // Blue
    RGBColor(231, 76, 60),   // Red
    RGBColor(46, 204, 113),  // Green
    RGBColor(155, 89, 182),  // Purple
    RGBColor(243, 156, 18),  // Orange
    RGBColor(26, 188, 156),  // Teal
    RGBColor(233, 30, 99),   // Pink
    RGBColor(0, 188, 212),   // Cyan
    RGBColor(121, 85, 72),   // Brown
    RGBColor(96, 125, 139),  // Blue Grey
];

const AXIS: RGBColor = RGBColor(90, 90, 90);
const GRID: RGBColor = RGBColor(200, 200, 200);

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Drawing backend error: {0}")]
    Backend(String),
    #[error("Unsupported chart kind '{0}'")]
    Unsupported(String),
    #[error("A {kind} chart needs at least {needed} categories, got {got}")]
    TooFewCategories {
        kind: ChartKind,
        needed: usize,
        got: usize,
    },
}

fn backend_err<E: std::fmt::Display>(e: E) -> PlotError {
    PlotError::Backend(e.to_string())
}

/// How the canvas itself looks, independent of the spec.
#[derive(Debug, Clone, Copy)]
pub struct PlotStyle {
    pub background: RGBColor,
    /// Draw title and category labels (requires a registered font).
    pub text: bool,
}

/// Inner plotting rectangle in pixels.
#[derive(Debug, Clone, Copy)]
struct PlotArea {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

impl PlotArea {
    fn new(width: u32, height: u32) -> Self {
        let (w, h) = (width as i32, height as i32);
        Self {
            left: 40,
            top: 20,
            right: (w - 20).max(41),
            bottom: (h - 30).max(21),
        }
    }

    fn width(&self) -> f64 {
        (self.right - self.left) as f64
    }

    fn height(&self) -> f64 {
        (self.bottom - self.top) as f64
    }

    fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }

    fn y_of(&self, value: f64, (min, max): (f64, f64)) -> i32 {
        let ratio = ((value - min) / (max - min)).clamp(0.0, 1.0);
        (self.bottom as f64 - ratio * self.height()).round() as i32
    }
}

type Root<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// Renders chart specs into bitmaps.
pub struct ChartPlotter;

impl ChartPlotter {
    /// Color for a series: its `color` hint when parseable, else the palette.
    pub fn series_color(series: &Series, index: usize) -> RGBColor {
        series
            .hints
            .color
            .as_deref()
            .and_then(Self::parse_hex_color)
            .unwrap_or(PALETTE[index % PALETTE.len()])
    }

    /// Parse `#rrggbb` or `#rgb`.
    pub fn parse_hex_color(raw: &str) -> Option<RGBColor> {
        let hex = raw.trim().strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            6 => Some(RGBColor(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => {
                let mut rgb = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16)? as u8;
                    rgb[i] = v * 16 + v;
                }
                Some(RGBColor(rgb[0], rgb[1], rgb[2]))
            }
            _ => None,
        }
    }

    /// Number of category slots drawn: the categories when present, else the
    /// longest series.
    pub fn slot_count(spec: &ChartSpec) -> usize {
        if spec.categories.is_empty() {
            spec.series.iter().map(|s| s.values.len()).max().unwrap_or(0)
        } else {
            spec.categories.len()
        }
    }

    /// Draw `spec` into `buffer` (RGB, `width * height * 3` bytes).
    pub fn draw(
        spec: &ChartSpec,
        style: &PlotStyle,
        buffer: &mut [u8],
        (width, height): (u32, u32),
    ) -> Result<(), PlotError> {
        if let ChartKind::Other(kind) = &spec.kind {
            return Err(PlotError::Unsupported(kind.clone()));
        }

        let root = BitMapBackend::with_buffer(buffer, (width, height)).into_drawing_area();
        root.fill(&style.background).map_err(backend_err)?;
        let area = PlotArea::new(width, height);

        match spec.kind {
            ChartKind::Bar => Self::draw_bars(&root, spec, &area)?,
            ChartKind::Line => Self::draw_lines(&root, spec, &area)?,
            ChartKind::Pie => Self::draw_pie(&root, spec, &area, None)?,
            ChartKind::Doughnut => Self::draw_pie(&root, spec, &area, Some(style.background))?,
            ChartKind::Radar => Self::draw_radar(&root, spec, &area)?,
            ChartKind::Other(_) => {}
        }

        if style.text {
            Self::draw_text(&root, spec, &area)?;
        }

        root.present().map_err(backend_err)?;
        Ok(())
    }

    fn value_range(spec: &ChartSpec, slots: usize) -> (f64, f64) {
        let begin_at_zero = spec
            .options
            .get("beginAtZero")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for series in &spec.series {
            for &v in series.values.iter().take(slots) {
                if v.is_finite() {
                    min = min.min(v);
                    max = max.max(v);
                }
            }
        }
        if min.is_infinite() {
            return (0.0, 1.0);
        }
        if begin_at_zero {
            min = min.min(0.0);
            max = max.max(0.0);
        }
        if (max - min).abs() < f64::EPSILON {
            max = min + 1.0;
        }
        // Headroom so the tallest value does not touch the frame
        (min, max + (max - min) * 0.05)
    }

    fn draw_axes(root: &Root<'_>, area: &PlotArea) -> Result<(), PlotError> {
        root.draw(&PathElement::new(
            vec![
                (area.left, area.top),
                (area.left, area.bottom),
                (area.right, area.bottom),
            ],
            AXIS.stroke_width(1),
        ))
        .map_err(backend_err)
    }

    /// Grouped bars, one group per category slot.
    fn draw_bars(root: &Root<'_>, spec: &ChartSpec, area: &PlotArea) -> Result<(), PlotError> {
        let slots = Self::slot_count(spec);
        if slots > 0 && !spec.series.is_empty() {
            let range = Self::value_range(spec, slots);
            let base = area.y_of(0.0_f64.clamp(range.0, range.1), range);
            let slot_w = area.width() / slots as f64;
            let bar_w = slot_w * 0.8 / spec.series.len() as f64;

            for (s_idx, series) in spec.series.iter().enumerate() {
                let color = Self::series_color(series, s_idx);
                for (slot, &value) in series.values.iter().take(slots).enumerate() {
                    if !value.is_finite() {
                        continue;
                    }
                    let x0 = area.left as f64 + slot as f64 * slot_w + slot_w * 0.1 + s_idx as f64 * bar_w;
                    let y = area.y_of(value, range);
                    let (top, bottom) = if y < base { (y, base) } else { (base, y) };
                    root.draw(&Rectangle::new(
                        [(x0.round() as i32, top), ((x0 + bar_w).round() as i32 - 1, bottom)],
                        color.filled(),
                    ))
                    .map_err(backend_err)?;
                }
            }
        }
        Self::draw_axes(root, area)
    }

    /// Straight segments between slot centers; `fill` shades down to zero.
    fn draw_lines(root: &Root<'_>, spec: &ChartSpec, area: &PlotArea) -> Result<(), PlotError> {
        let slots = Self::slot_count(spec);
        if slots > 0 {
            let range = Self::value_range(spec, slots);
            let base = area.y_of(0.0_f64.clamp(range.0, range.1), range);
            let slot_w = area.width() / slots as f64;

            for (s_idx, series) in spec.series.iter().enumerate() {
                let color = Self::series_color(series, s_idx);
                let points: Vec<(i32, i32)> = series
                    .values
                    .iter()
                    .take(slots)
                    .enumerate()
                    .filter(|(_, v)| v.is_finite())
                    .map(|(slot, &v)| {
                        let x = area.left as f64 + (slot as f64 + 0.5) * slot_w;
                        (x.round() as i32, area.y_of(v, range))
                    })
                    .collect();

                if points.is_empty() {
                    continue;
                }

                if series.hints.fill.unwrap_or(false) && points.len() > 1 {
                    let mut shape = points.clone();
                    shape.push((points[points.len() - 1].0, base));
                    shape.push((points[0].0, base));
                    root.draw(&Polygon::new(shape, color.mix(0.25).filled()))
                        .map_err(backend_err)?;
                }

                root.draw(&PathElement::new(points.clone(), color.stroke_width(2)))
                    .map_err(backend_err)?;
                for &point in &points {
                    root.draw(&Circle::new(point, 3, color.filled()))
                        .map_err(backend_err)?;
                }
            }
        }
        Self::draw_axes(root, area)
    }

    /// Slices come from the first series. `hole` turns the pie into a doughnut.
    fn draw_pie(
        root: &Root<'_>,
        spec: &ChartSpec,
        area: &PlotArea,
        hole: Option<RGBColor>,
    ) -> Result<(), PlotError> {
        let center = area.center();
        let radius = (area.width().min(area.height()) / 2.0 - 4.0).max(1.0);
        let Some(series) = spec.series.first() else {
            root.draw(&Circle::new(center, radius as i32, GRID.stroke_width(1)))
                .map_err(backend_err)?;
            return Ok(());
        };
        let hinted = series.hints.color.as_deref().and_then(Self::parse_hex_color);
        let slice_color = |slot: usize| hinted.unwrap_or(PALETTE[slot % PALETTE.len()]);

        // Keep the category slot so colours stay attached to their category
        let slices: Vec<(usize, f64)> = series
            .values
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, v)| v.is_finite() && *v > 0.0)
            .collect();
        let total: f64 = slices.iter().map(|(_, v)| v).sum();

        if total <= 0.0 {
            root.draw(&Circle::new(center, radius as i32, GRID.stroke_width(1)))
                .map_err(backend_err)?;
            return Ok(());
        }

        if let [(slot, _)] = slices.as_slice() {
            // A lone slice is the whole disc
            root.draw(&Circle::new(center, radius as i32, slice_color(*slot).filled()))
                .map_err(backend_err)?;
        } else {
            let mut start = -PI / 2.0;
            for &(slot, value) in &slices {
                let sweep = value / total * 2.0 * PI;
                let steps = ((sweep.to_degrees() / 2.0).ceil() as usize).max(1);
                let mut wedge = vec![center];
                for k in 0..=steps {
                    let angle = start + sweep * k as f64 / steps as f64;
                    wedge.push(Self::polar(center, radius, angle));
                }
                root.draw(&Polygon::new(wedge, slice_color(slot).filled()))
                    .map_err(backend_err)?;
                start += sweep;
            }
        }

        if let Some(background) = hole {
            root.draw(&Circle::new(
                center,
                (radius * 0.55) as i32,
                background.filled(),
            ))
            .map_err(backend_err)?;
        }
        Ok(())
    }

    /// One spoke per category slot, values scaled to the largest value.
    fn draw_radar(root: &Root<'_>, spec: &ChartSpec, area: &PlotArea) -> Result<(), PlotError> {
        let spokes = Self::slot_count(spec);
        if spokes < 3 {
            return Err(PlotError::TooFewCategories {
                kind: ChartKind::Radar,
                needed: 3,
                got: spokes,
            });
        }

        let center = area.center();
        let radius = (area.width().min(area.height()) / 2.0 - 4.0).max(1.0);
        let angle_of = |i: usize| -PI / 2.0 + i as f64 * 2.0 * PI / spokes as f64;

        let mut ring: Vec<(i32, i32)> = (0..spokes)
            .map(|i| Self::polar(center, radius, angle_of(i)))
            .collect();
        for &tip in &ring {
            root.draw(&PathElement::new(vec![center, tip], GRID.stroke_width(1)))
                .map_err(backend_err)?;
        }
        ring.push(ring[0]);
        root.draw(&PathElement::new(ring, GRID.stroke_width(1)))
            .map_err(backend_err)?;

        let max = spec
            .series
            .iter()
            .flat_map(|s| s.values.iter().take(spokes))
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0_f64, f64::max);
        let max = if max > 0.0 { max } else { 1.0 };

        for (s_idx, series) in spec.series.iter().enumerate() {
            let color = Self::series_color(series, s_idx);
            let mut outline: Vec<(i32, i32)> = (0..spokes)
                .map(|i| {
                    let v = series.values.get(i).copied().unwrap_or(0.0);
                    let v = if v.is_finite() { v.clamp(0.0, max) } else { 0.0 };
                    Self::polar(center, radius * v / max, angle_of(i))
                })
                .collect();
            root.draw(&Polygon::new(outline.clone(), color.mix(0.25).filled()))
                .map_err(backend_err)?;
            outline.push(outline[0]);
            root.draw(&PathElement::new(outline, color.stroke_width(2)))
                .map_err(backend_err)?;
        }
        Ok(())
    }

    fn draw_text(root: &Root<'_>, spec: &ChartSpec, area: &PlotArea) -> Result<(), PlotError> {
        if let Some(title) = spec.options.get("title").and_then(Value::as_str) {
            root.draw(&Text::new(
                title.to_string(),
                (area.left, 2),
                ("sans-serif", 15).into_font().color(&BLACK),
            ))
            .map_err(backend_err)?;
        }

        if matches!(spec.kind, ChartKind::Bar | ChartKind::Line) && !spec.categories.is_empty() {
            let slot_w = area.width() / spec.categories.len() as f64;
            for (slot, label) in spec.categories.iter().enumerate() {
                let x = area.left as f64 + slot as f64 * slot_w + 2.0;
                root.draw(&Text::new(
                    label.clone(),
                    (x.round() as i32, area.bottom + 6),
                    ("sans-serif", 12).into_font().color(&AXIS),
                ))
                .map_err(backend_err)?;
            }
        }
        Ok(())
    }

    fn polar((cx, cy): (i32, i32), radius: f64, angle: f64) -> (i32, i32) {
        (
            cx + (radius * angle.cos()).round() as i32,
            cy + (radius * angle.sin()).round() as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_hex() {
        assert_eq!(
            ChartPlotter::parse_hex_color("#ff8000"),
            Some(RGBColor(255, 128, 0))
        );
        assert_eq!(
            ChartPlotter::parse_hex_color("#0f0"),
            Some(RGBColor(0, 255, 0))
        );
        assert_eq!(ChartPlotter::parse_hex_color("red"), None);
        assert_eq!(ChartPlotter::parse_hex_color("#12345"), None);
    }

    #[test]
    fn multibyte_hex_is_rejected_not_sliced() {
        assert_eq!(ChartPlotter::parse_hex_color("#a\u{e9}bcd"), None);
        assert_eq!(ChartPlotter::parse_hex_color("#\u{e9}\u{e9}"), None);

        let series = Series::new("Cloud", vec![1.0]).with_color("#a\u{e9}bcd");
        assert_eq!(ChartPlotter::series_color(&series, 0), PALETTE[0]);
    }

    #[test]
    fn unparseable_hint_falls_back_to_palette() {
        let series = Series::new("Cloud", vec![1.0]).with_color("teal");
        assert_eq!(ChartPlotter::series_color(&series, 11), PALETTE[1]);
    }

    #[test]
    fn slots_follow_categories_when_present() {
        let spec = ChartSpec::new(ChartKind::Bar).with_series(Series::new("A", vec![1.0, 2.0, 3.0]));
        assert_eq!(ChartPlotter::slot_count(&spec), 3);

        let spec = spec.with_categories(["Q1", "Q2"]);
        assert_eq!(ChartPlotter::slot_count(&spec), 2);
    }

    #[test]
    fn range_starts_at_zero_unless_disabled() {
        let spec = ChartSpec::new(ChartKind::Line).with_series(Series::new("A", vec![50.0, 100.0]));
        let (min, max) = ChartPlotter::value_range(&spec, 2);
        assert_eq!(min, 0.0);
        assert!(max > 100.0);

        let spec = spec.with_option("beginAtZero", false);
        let (min, _) = ChartPlotter::value_range(&spec, 2);
        assert_eq!(min, 50.0);
    }

    #[test]
    fn other_kind_is_unsupported() {
        let spec = ChartSpec::new("polarArea");
        let style = PlotStyle {
            background: RGBColor(255, 255, 255),
            text: false,
        };
        let mut buffer = vec![0u8; 10 * 10 * 3];
        assert!(matches!(
            ChartPlotter::draw(&spec, &style, &mut buffer, (10, 10)),
            Err(PlotError::Unsupported(kind)) if kind == "polarArea"
        ));
    }

    const WHITE: RGBColor = RGBColor(255, 255, 255);

    fn pixel(buffer: &[u8], width: u32, (x, y): (u32, u32)) -> RGBColor {
        let offset = ((y * width + x) * 3) as usize;
        RGBColor(buffer[offset], buffer[offset + 1], buffer[offset + 2])
    }

    fn pie_pixels(series: Series) -> Vec<u8> {
        let spec = ChartSpec::new(ChartKind::Pie)
            .with_series(series)
            .with_categories(["Licensing", "Operations"]);
        let style = PlotStyle {
            background: WHITE,
            text: false,
        };
        let mut buffer = vec![255u8; 120 * 90 * 3];
        ChartPlotter::draw(&spec, &style, &mut buffer, (120, 90)).unwrap();
        buffer
    }

    #[test]
    fn pie_slices_keep_their_category_colour() {
        // Plot area centre is (70, 40); the zero slot is skipped but keeps its colour index
        let buffer = pie_pixels(Series::new("Share", vec![0.0, 5.0]));
        assert_eq!(pixel(&buffer, 120, (70, 40)), PALETTE[1]);
    }

    #[test]
    fn pie_uses_series_colour_hint() {
        let buffer = pie_pixels(Series::new("Share", vec![2.0, 3.0]).with_color("#00ff00"));
        // One point inside each wedge
        assert_eq!(pixel(&buffer, 120, (78, 40)), RGBColor(0, 255, 0));
        assert_eq!(pixel(&buffer, 120, (62, 40)), RGBColor(0, 255, 0));
    }
}
