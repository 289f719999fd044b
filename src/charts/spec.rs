//! Chart Spec Module
//! Declarative description of what a chart displays: kind, series, categories
//! and an opaque options bag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;

/// Stable key naming one rendering surface (one logical chart).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartId(String);

impl ChartId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for ChartId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChartId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ChartId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chart shape. Unknown renderer-specific type strings are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Doughnut,
    Radar,
    Other(String),
}

impl ChartKind {
    pub fn as_str(&self) -> &str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
            ChartKind::Doughnut => "doughnut",
            ChartKind::Radar => "radar",
            ChartKind::Other(kind) => kind,
        }
    }
}

impl From<String> for ChartKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "bar" => ChartKind::Bar,
            "line" => ChartKind::Line,
            "pie" => ChartKind::Pie,
            "doughnut" => ChartKind::Doughnut,
            "radar" => ChartKind::Radar,
            _ => ChartKind::Other(kind),
        }
    }
}

impl From<&str> for ChartKind {
    fn from(kind: &str) -> Self {
        ChartKind::from(kind.to_string())
    }
}

impl From<ChartKind> for String {
    fn from(kind: ChartKind) -> Self {
        match kind {
            ChartKind::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-series render hints. Passed through to the engine untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tension: Option<f64>,
}

impl RenderHints {
    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.fill.is_none() && self.tension.is_none()
    }
}

/// A named, ordered sequence of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub label: String,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default, skip_serializing_if = "RenderHints::is_empty")]
    pub hints: RenderHints,
}

impl Series {
    pub fn new(label: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            values,
            hints: RenderHints::default(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.hints.color = Some(color.into());
        self
    }

    pub fn with_fill(mut self, fill: bool) -> Self {
        self.hints.fill = Some(fill);
        self
    }
}

/// Declarative chart description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl ChartSpec {
    pub fn new(kind: impl Into<ChartKind>) -> Self {
        Self {
            kind: kind.into(),
            series: Vec::new(),
            categories: Vec::new(),
            options: Map::new(),
        }
    }

    /// Minimal stand-in used when the engine rejects the real spec.
    pub fn placeholder(kind: ChartKind) -> Self {
        // Radar needs three spokes to be drawable at all.
        let slots = if kind == ChartKind::Radar { 3 } else { 1 };
        Self {
            kind,
            series: vec![Series::new("No data", vec![0.0; slots])],
            categories: (0..slots).map(|_| "-".to_string()).collect(),
            options: Map::new(),
        }
    }

    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Series whose value count differs from the category count.
    pub fn mismatched_series(&self) -> impl Iterator<Item = &Series> {
        let expected = self.categories.len();
        self.series
            .iter()
            .filter(move |s| expected > 0 && s.values.len() != expected)
    }

    /// Apply a patch: `series`/`categories` are replaced wholesale, `options`
    /// are merged one level deep and a `null` value removes the key.
    pub fn merged(&self, patch: &SpecPatch) -> ChartSpec {
        let mut spec = self.clone();
        if let Some(series) = &patch.series {
            spec.series = series.clone();
        }
        if let Some(categories) = &patch.categories {
            spec.categories = categories.clone();
        }
        if let Some(options) = &patch.options {
            for (key, value) in options {
                if value.is_null() {
                    spec.options.remove(key);
                } else {
                    spec.options.insert(key.clone(), value.clone());
                }
            }
        }
        spec
    }
}

/// Partial spec for in-place updates. Absent fields stay unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChartKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<Vec<Series>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

impl SpecPatch {
    pub fn series(series: Vec<Series>) -> Self {
        Self {
            series: Some(series),
            ..Default::default()
        }
    }

    pub fn categories<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: Some(categories.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}
