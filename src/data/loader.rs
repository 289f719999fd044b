//! Chart Script Loader Module
//! Reads JSON chart scripts: canvas settings, the surfaces that exist up
//! front, and the registry operations to replay.

use crate::charts::{CanvasConfig, ChartId, ChartSpec, SpecPatch};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to read script: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse script: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Surface #{0} has an empty id")]
    EmptySurfaceId(usize),
    #[error("Script has no steps")]
    NoSteps,
}

/// A whole script file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartScript {
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub surfaces: Vec<ChartId>,
    pub steps: Vec<Step>,
}

/// One registry or surface operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Create {
        id: ChartId,
        spec: ChartSpec,
        /// Retry with a placeholder chart if the engine rejects `spec`.
        #[serde(default)]
        fallback: bool,
    },
    Update {
        id: ChartId,
        #[serde(default)]
        patch: SpecPatch,
    },
    Destroy {
        id: ChartId,
    },
    DestroyAll,
    AddSurface {
        id: ChartId,
    },
    RemoveSurface {
        id: ChartId,
    },
}

impl Step {
    pub fn op(&self) -> &'static str {
        match self {
            Step::Create { .. } => "create",
            Step::Update { .. } => "update",
            Step::Destroy { .. } => "destroy",
            Step::DestroyAll => "destroy_all",
            Step::AddSurface { .. } => "add_surface",
            Step::RemoveSurface { .. } => "remove_surface",
        }
    }

    pub fn id(&self) -> Option<&ChartId> {
        match self {
            Step::Create { id, .. }
            | Step::Update { id, .. }
            | Step::Destroy { id }
            | Step::AddSurface { id }
            | Step::RemoveSurface { id } => Some(id),
            Step::DestroyAll => None,
        }
    }
}

/// Loads chart scripts from disk or memory.
pub struct ScriptLoader;

impl ScriptLoader {
    pub fn load_file(path: &Path) -> Result<ChartScript, LoaderError> {
        let json = std::fs::read_to_string(path)?;
        Self::parse(&json)
    }

    pub fn parse(json: &str) -> Result<ChartScript, LoaderError> {
        let script: ChartScript = serde_json::from_str(json)?;

        if let Some(pos) = script.surfaces.iter().position(ChartId::is_empty) {
            return Err(LoaderError::EmptySurfaceId(pos));
        }
        if script.steps.is_empty() {
            return Err(LoaderError::NoSteps);
        }

        Ok(script)
    }
}
