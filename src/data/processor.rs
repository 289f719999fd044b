//! Chart Script Processor Module
//! Replays script steps against a chart registry and exports live charts.

use crate::charts::{
    BitmapEngine, ChartId, ChartRegistry, EngineError, RegistryError, RenderEngine, SurfaceHost,
};
use crate::data::loader::Step;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Failed to write chart image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to export chart: {0}")]
    Engine(#[from] EngineError),
}

/// A step that the registry rejected.
#[derive(Debug)]
pub struct StepFailure {
    pub index: usize,
    pub op: &'static str,
    pub error: RegistryError,
}

/// Outcome of replaying a script.
#[derive(Debug, Default)]
pub struct RunReport {
    pub applied: usize,
    pub failures: Vec<StepFailure>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives a registry from script steps.
pub struct ScriptRunner;

impl ScriptRunner {
    /// Run every step in order. A failing step is recorded and the run goes
    /// on, so one broken chart never blocks the others.
    pub fn run<E>(registry: &mut ChartRegistry<E>, steps: &[Step]) -> RunReport
    where
        E: RenderEngine + SurfaceHost,
    {
        let mut report = RunReport::default();

        for (index, step) in steps.iter().enumerate() {
            match Self::apply(registry, step) {
                Ok(()) => report.applied += 1,
                Err(error) => {
                    warn!(step = index, op = step.op(), error = %error, "step failed");
                    report.failures.push(StepFailure {
                        index,
                        op: step.op(),
                        error,
                    });
                }
            }
        }

        info!(
            applied = report.applied,
            failed = report.failures.len(),
            live = registry.len(),
            "script finished"
        );
        report
    }

    fn apply<E>(registry: &mut ChartRegistry<E>, step: &Step) -> Result<(), RegistryError>
    where
        E: RenderEngine + SurfaceHost,
    {
        match step {
            Step::Create { id, spec, fallback } => {
                if *fallback {
                    registry.create_or_placeholder(id.clone(), spec.clone())?;
                } else {
                    registry.create(id.clone(), spec.clone())?;
                }
            }
            Step::Update { id, patch } => registry.update(id.as_str(), patch.clone())?,
            Step::Destroy { id } => {
                registry.destroy(id.as_str());
            }
            Step::DestroyAll => {
                registry.destroy_all();
            }
            Step::AddSurface { id } => {
                if !registry.engine_mut().add_surface(id) {
                    debug!(surface = %id, "surface already present");
                }
            }
            Step::RemoveSurface { id } => {
                if !registry.engine_mut().remove_surface(id) {
                    debug!(surface = %id, "no such surface");
                }
            }
        }
        Ok(())
    }

    /// Write `<dir>/<id>.png` for every live chart. Returns the written paths
    /// in id order.
    ///
    /// Ids that sanitise to the same file name get a `-2`, `-3`, ... suffix,
    /// so no export overwrites another.
    pub fn export_pngs(
        registry: &ChartRegistry<BitmapEngine>,
        dir: &Path,
    ) -> Result<Vec<PathBuf>, ProcessorError> {
        std::fs::create_dir_all(dir)?;

        let ids = registry.ids();
        let mut written = Vec::with_capacity(ids.len());
        let mut taken = HashSet::new();
        for (id, png) in registry.engine().encode_all_png(&ids) {
            let name = Self::unique_name(&Self::file_stem(&id), &mut taken);
            let path = dir.join(name);
            std::fs::write(&path, png?)?;
            debug!(chart = %id, path = %path.display(), "chart exported");
            written.push(path);
        }
        Ok(written)
    }

    fn file_stem(id: &ChartId) -> String {
        id.as_str()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    fn unique_name(stem: &str, taken: &mut HashSet<String>) -> String {
        let mut name = format!("{}.png", stem);
        let mut n = 2;
        while !taken.insert(name.clone()) {
            warn!(file = %name, "file name already used by another chart");
            name = format!("{}-{}.png", stem, n);
            n += 1;
        }
        name
    }
}
