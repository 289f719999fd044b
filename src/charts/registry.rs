//! Chart Registry Module
//! Owns the mapping from chart id to the single live chart instance on that
//! surface, and mediates every create, update and teardown.

use crate::charts::engine::RenderEngine;
use crate::charts::spec::{ChartId, ChartKind, ChartSpec, SpecPatch};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, trace, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Chart id must not be empty")]
    EmptyId,
    #[error("Rendering surface '{0}' not found")]
    SurfaceNotFound(ChartId),
    #[error("Failed to construct chart '{id}': {source}")]
    ConstructionFailed {
        id: ChartId,
        #[source]
        source: BoxError,
    },
    #[error("No chart registered for '{0}'")]
    NotFound(ChartId),
    #[error("Chart '{id}' is a {current} chart, recreate it to switch to {requested}")]
    KindChange {
        id: ChartId,
        current: ChartKind,
        requested: ChartKind,
    },
    #[error("Failed to redraw chart '{id}': {source}")]
    RedrawFailed {
        id: ChartId,
        #[source]
        source: BoxError,
    },
    #[error("Failed to dispose chart '{id}': {source}")]
    DisposalFailed {
        id: ChartId,
        #[source]
        source: BoxError,
    },
}

/// A live chart: the engine handle plus the spec it currently shows.
#[derive(Debug)]
pub struct ChartInstance<H> {
    handle: H,
    spec: ChartSpec,
}

impl<H> ChartInstance<H> {
    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn spec(&self) -> &ChartSpec {
        &self.spec
    }

    pub fn kind(&self) -> &ChartKind {
        &self.spec.kind
    }
}

/// At most one live chart per id.
///
/// Handles are only ever lent out for the duration of a borrow of the
/// registry, so a later `create` for the same id can always dispose of the
/// previous instance.
pub struct ChartRegistry<E: RenderEngine> {
    engine: E,
    charts: HashMap<ChartId, ChartInstance<E::Handle>>,
}

impl<E: RenderEngine> ChartRegistry<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            charts: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Mutable engine access, e.g. to add or remove surfaces.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Build a chart for `id`, disposing of any chart already bound to it.
    ///
    /// On failure the id is left without a chart, never with a reference to
    /// the disposed one.
    pub fn create(
        &mut self,
        id: impl Into<ChartId>,
        spec: ChartSpec,
    ) -> Result<&ChartInstance<E::Handle>, RegistryError> {
        let id = id.into();
        self.install(&id, spec)?;
        self.lookup(&id)
    }

    /// Like [`create`](Self::create), but retries once with
    /// [`ChartSpec::placeholder`] when the engine rejects the spec.
    pub fn create_or_placeholder(
        &mut self,
        id: impl Into<ChartId>,
        spec: ChartSpec,
    ) -> Result<&ChartInstance<E::Handle>, RegistryError> {
        let id = id.into();
        let kind = spec.kind.clone();

        match self.install(&id, spec) {
            Ok(()) => {}
            Err(RegistryError::ConstructionFailed { source, .. }) => {
                warn!(chart = %id, error = %source, "chart rejected, falling back to placeholder");
                self.install(&id, ChartSpec::placeholder(kind))?;
            }
            Err(err) => return Err(err),
        }

        self.lookup(&id)
    }

    pub fn get(&self, id: &str) -> Option<&ChartInstance<E::Handle>> {
        self.charts.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.charts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    /// Ids with a live chart, sorted.
    pub fn ids(&self) -> Vec<ChartId> {
        let mut ids: Vec<ChartId> = self.charts.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Merge `patch` into the live chart and repaint the same handle.
    ///
    /// Never creates a chart. A failed repaint keeps the chart registered with
    /// its previous spec.
    pub fn update(&mut self, id: &str, patch: SpecPatch) -> Result<(), RegistryError> {
        let Some(instance) = self.charts.get_mut(id) else {
            return Err(RegistryError::NotFound(ChartId::from(id)));
        };

        if let Some(requested) = &patch.kind {
            if requested != &instance.spec.kind {
                return Err(RegistryError::KindChange {
                    id: ChartId::from(id),
                    current: instance.spec.kind.clone(),
                    requested: requested.clone(),
                });
            }
        }

        let merged = instance.spec.merged(&patch);
        warn_on_mismatch(id, &merged);

        self.engine
            .redraw(&mut instance.handle, &merged)
            .map_err(|e| RegistryError::RedrawFailed {
                id: ChartId::from(id),
                source: Box::new(e),
            })?;

        instance.spec = merged;
        debug!(chart = id, "chart updated");
        Ok(())
    }

    /// Remove the chart for `id`. Returns whether one was live.
    ///
    /// Engine failures while releasing the handle are logged; the mapping is
    /// removed regardless.
    pub fn destroy(&mut self, id: &str) -> bool {
        let Some(instance) = self.charts.remove(id) else {
            trace!(chart = id, "no chart to destroy");
            return false;
        };

        self.release(ChartId::from(id), instance);
        true
    }

    /// Destroy every live chart. Returns how many were removed.
    pub fn destroy_all(&mut self) -> usize {
        let charts = std::mem::take(&mut self.charts);
        let count = charts.len();
        for (id, instance) in charts {
            self.release(id, instance);
        }
        if count > 0 {
            debug!(count, "all charts destroyed");
        }
        count
    }

    fn install(&mut self, id: &ChartId, spec: ChartSpec) -> Result<(), RegistryError> {
        if id.is_empty() {
            return Err(RegistryError::EmptyId);
        }

        if self.destroy(id.as_str()) {
            debug!(chart = %id, "replacing existing chart");
        }

        let Some(surface) = self.engine.attach(id) else {
            warn!(chart = %id, "rendering surface not found");
            return Err(RegistryError::SurfaceNotFound(id.clone()));
        };

        warn_on_mismatch(id.as_str(), &spec);

        let handle = self
            .engine
            .construct(surface, &spec)
            .map_err(|e| RegistryError::ConstructionFailed {
                id: id.clone(),
                source: Box::new(e),
            })?;

        debug!(chart = %id, kind = %spec.kind, series = spec.series.len(), "chart created");
        self.charts
            .insert(id.clone(), ChartInstance { handle, spec });
        Ok(())
    }

    fn lookup(&self, id: &ChartId) -> Result<&ChartInstance<E::Handle>, RegistryError> {
        self.charts
            .get(id.as_str())
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    fn release(&mut self, id: ChartId, instance: ChartInstance<E::Handle>) {
        match self.engine.dispose(instance.handle) {
            Ok(()) => debug!(chart = %id, "chart destroyed"),
            Err(e) => {
                let err = RegistryError::DisposalFailed {
                    id,
                    source: Box::new(e),
                };
                warn!(error = %err, "chart removed despite disposal failure");
            }
        }
    }
}

impl<E: RenderEngine> Drop for ChartRegistry<E> {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

fn warn_on_mismatch(id: &str, spec: &ChartSpec) {
    for series in spec.mismatched_series() {
        warn!(
            chart = id,
            series = %series.label,
            values = series.values.len(),
            categories = spec.categories.len(),
            "series length does not match category count"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::spec::Series;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct MockError(&'static str);

    #[derive(Default)]
    struct Journal {
        constructed: Vec<u32>,
        disposed: Vec<u32>,
        redrawn: Vec<u32>,
    }

    #[derive(Debug)]
    struct MockHandle {
        serial: u32,
        shown: ChartSpec,
    }

    /// Records every engine call; failures are switched on per surface.
    struct MockEngine {
        surfaces: HashSet<String>,
        reject: HashSet<String>,
        fail_dispose: bool,
        fail_redraw: bool,
        next_serial: u32,
        journal: Rc<RefCell<Journal>>,
    }

    impl MockEngine {
        fn with_surfaces(ids: &[&str]) -> (Self, Rc<RefCell<Journal>>) {
            let journal = Rc::new(RefCell::new(Journal::default()));
            let engine = Self {
                surfaces: ids.iter().map(|s| s.to_string()).collect(),
                reject: HashSet::new(),
                fail_dispose: false,
                fail_redraw: false,
                next_serial: 0,
                journal: Rc::clone(&journal),
            };
            (engine, journal)
        }
    }

    impl RenderEngine for MockEngine {
        type Surface = String;
        type Handle = MockHandle;
        type Error = MockError;

        fn attach(&mut self, surface_id: &ChartId) -> Option<String> {
            self.surfaces
                .get(surface_id.as_str())
                .map(|s| s.to_string())
        }

        fn construct(&mut self, surface: String, spec: &ChartSpec) -> Result<MockHandle, MockError> {
            if self.reject.contains(&surface) && spec.series.iter().all(|s| s.label != "No data") {
                return Err(MockError("incompatible options"));
            }
            self.next_serial += 1;
            self.journal.borrow_mut().constructed.push(self.next_serial);
            Ok(MockHandle {
                serial: self.next_serial,
                shown: spec.clone(),
            })
        }

        fn redraw(&mut self, handle: &mut MockHandle, spec: &ChartSpec) -> Result<(), MockError> {
            if self.fail_redraw {
                return Err(MockError("redraw exploded"));
            }
            handle.shown = spec.clone();
            self.journal.borrow_mut().redrawn.push(handle.serial);
            Ok(())
        }

        fn dispose(&mut self, handle: MockHandle) -> Result<(), MockError> {
            self.journal.borrow_mut().disposed.push(handle.serial);
            if self.fail_dispose {
                return Err(MockError("teardown threw"));
            }
            Ok(())
        }
    }

    fn tco_spec() -> ChartSpec {
        ChartSpec::new(ChartKind::Bar)
            .with_series(Series::new("Current", vec![100000.0]))
            .with_categories(["Total"])
    }

    fn roi_spec() -> ChartSpec {
        ChartSpec::new(ChartKind::Line)
            .with_series(Series::new("Portnox", vec![10.0, 20.0, 30.0]))
            .with_categories(["Y1", "Y2", "Y3"])
    }

    #[test]
    fn create_then_get_returns_same_spec() {
        let (engine, _) = MockEngine::with_surfaces(&["tco-chart"]);
        let mut registry = ChartRegistry::new(engine);

        registry.create("tco-chart", tco_spec()).unwrap();

        let chart = registry.get("tco-chart").unwrap();
        assert_eq!(chart.spec(), &tco_spec());
        assert_eq!(chart.handle().shown, tco_spec());
        assert_eq!(chart.kind(), &ChartKind::Bar);
    }

    #[test]
    fn recreate_disposes_previous_handle_once() {
        let (engine, journal) = MockEngine::with_surfaces(&["tco-chart"]);
        let mut registry = ChartRegistry::new(engine);

        let first = registry.create("tco-chart", tco_spec()).unwrap().handle().serial;
        let second = registry.create("tco-chart", roi_spec()).unwrap().handle().serial;

        assert_ne!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("tco-chart").unwrap().spec(), &roi_spec());
        assert_eq!(journal.borrow().disposed, vec![first]);
    }

    #[test]
    fn many_creates_leave_only_latest_live() {
        let (engine, journal) = MockEngine::with_surfaces(&["tco-chart"]);
        let mut registry = ChartRegistry::new(engine);

        for _ in 0..5 {
            registry.create("tco-chart", tco_spec()).unwrap();
        }

        let live = registry.get("tco-chart").unwrap().handle().serial;
        let journal = journal.borrow();
        assert_eq!(journal.constructed.len(), 5);
        assert_eq!(journal.disposed.len(), 4);
        assert!(!journal.disposed.contains(&live));
    }

    #[test]
    fn update_before_create_is_not_found() {
        let (engine, journal) = MockEngine::with_surfaces(&["roi-chart"]);
        let mut registry = ChartRegistry::new(engine);

        let err = registry
            .update("roi-chart", SpecPatch::series(vec![Series::new("A", vec![1.0])]))
            .unwrap_err();

        assert!(matches!(err, RegistryError::NotFound(id) if id.as_str() == "roi-chart"));
        assert!(registry.get("roi-chart").is_none());
        assert!(journal.borrow().constructed.is_empty());
    }

    #[test]
    fn update_redraws_same_handle() {
        let (engine, journal) = MockEngine::with_surfaces(&["roi-chart"]);
        let mut registry = ChartRegistry::new(engine);
        let serial = registry.create("roi-chart", roi_spec()).unwrap().handle().serial;

        registry
            .update(
                "roi-chart",
                SpecPatch::series(vec![Series::new("Portnox", vec![1.0, 2.0, 3.0])])
                    .option("title", "ROI"),
            )
            .unwrap();

        let chart = registry.get("roi-chart").unwrap();
        assert_eq!(chart.handle().serial, serial);
        assert_eq!(chart.spec().series[0].values, vec![1.0, 2.0, 3.0]);
        assert_eq!(chart.spec().categories, vec!["Y1", "Y2", "Y3"]);
        assert_eq!(chart.handle().shown, *chart.spec());
        assert_eq!(journal.borrow().redrawn, vec![serial]);
        assert!(journal.borrow().disposed.is_empty());
    }

    #[test]
    fn update_rejects_kind_change() {
        let (engine, _) = MockEngine::with_surfaces(&["roi-chart"]);
        let mut registry = ChartRegistry::new(engine);
        registry.create("roi-chart", roi_spec()).unwrap();

        let patch = SpecPatch {
            kind: Some(ChartKind::Pie),
            ..Default::default()
        };
        let err = registry.update("roi-chart", patch).unwrap_err();
        assert!(matches!(err, RegistryError::KindChange { .. }));

        let same_kind = SpecPatch {
            kind: Some(ChartKind::Line),
            ..Default::default()
        };
        registry.update("roi-chart", same_kind).unwrap();
        assert_eq!(registry.get("roi-chart").unwrap().spec(), &roi_spec());
    }

    #[test]
    fn failed_redraw_keeps_chart_and_old_spec() {
        let (mut engine, _) = MockEngine::with_surfaces(&["roi-chart"]);
        engine.fail_redraw = true;
        let mut registry = ChartRegistry::new(engine);
        registry.create("roi-chart", roi_spec()).unwrap();

        let err = registry
            .update("roi-chart", SpecPatch::categories(["a", "b", "c"]))
            .unwrap_err();

        assert!(matches!(err, RegistryError::RedrawFailed { .. }));
        assert_eq!(registry.get("roi-chart").unwrap().spec(), &roi_spec());
    }

    #[test]
    fn destroy_is_idempotent() {
        let (engine, _) = MockEngine::with_surfaces(&["tco-chart"]);
        let mut registry = ChartRegistry::new(engine);
        registry.create("tco-chart", tco_spec()).unwrap();

        assert!(registry.destroy("tco-chart"));
        assert!(registry.get("tco-chart").is_none());
        assert!(!registry.destroy("tco-chart"));
        assert!(registry.get("tco-chart").is_none());
        assert!(!registry.destroy("nonexistent-id"));
    }

    #[test]
    fn destroy_then_recreate_has_no_residue() {
        let (engine, _) = MockEngine::with_surfaces(&["tco-chart"]);
        let mut registry = ChartRegistry::new(engine);

        registry.create("tco-chart", roi_spec()).unwrap();
        registry.destroy("tco-chart");
        registry.create("tco-chart", tco_spec()).unwrap();

        let chart = registry.get("tco-chart").unwrap();
        assert_eq!(chart.spec(), &tco_spec());
        assert_eq!(chart.handle().shown.series.len(), 1);
    }

    #[test]
    fn disposal_failure_still_removes_mapping() {
        let (mut engine, journal) = MockEngine::with_surfaces(&["tco-chart"]);
        engine.fail_dispose = true;
        let mut registry = ChartRegistry::new(engine);
        registry.create("tco-chart", tco_spec()).unwrap();

        assert!(registry.destroy("tco-chart"));
        assert!(registry.get("tco-chart").is_none());
        assert_eq!(journal.borrow().disposed.len(), 1);

        registry.create("tco-chart", roi_spec()).unwrap();
        assert_eq!(registry.get("tco-chart").unwrap().spec(), &roi_spec());
    }

    #[test]
    fn destroy_all_clears_everything() {
        let ids = ["tco-chart", "roi-chart", "compliance-chart"];
        let (engine, journal) = MockEngine::with_surfaces(&ids);
        let mut registry = ChartRegistry::new(engine);
        for id in ids {
            registry.create(id, tco_spec()).unwrap();
        }

        assert_eq!(registry.destroy_all(), 3);
        for id in ids {
            assert!(registry.get(id).is_none());
        }
        assert!(registry.is_empty());
        assert_eq!(journal.borrow().disposed.len(), 3);
        assert_eq!(registry.destroy_all(), 0);
    }

    #[test]
    fn missing_surface_is_reported() {
        let (engine, journal) = MockEngine::with_surfaces(&[]);
        let mut registry = ChartRegistry::new(engine);

        let err = registry.create("tco-chart", tco_spec()).unwrap_err();
        assert!(matches!(err, RegistryError::SurfaceNotFound(_)));
        assert!(registry.get("tco-chart").is_none());
        assert!(journal.borrow().constructed.is_empty());
    }

    #[test]
    fn empty_id_is_rejected() {
        let (engine, _) = MockEngine::with_surfaces(&[""]);
        let mut registry = ChartRegistry::new(engine);
        assert!(matches!(
            registry.create("", tco_spec()),
            Err(RegistryError::EmptyId)
        ));
    }

    #[test]
    fn construction_failure_leaves_no_registration() {
        let (mut engine, _) = MockEngine::with_surfaces(&["broken-chart"]);
        engine.reject.insert("broken-chart".into());
        let mut registry = ChartRegistry::new(engine);

        let err = registry.create("broken-chart", tco_spec()).unwrap_err();
        assert!(matches!(err, RegistryError::ConstructionFailed { .. }));
        assert!(registry.get("broken-chart").is_none());
    }

    #[test]
    fn failed_replacement_does_not_keep_old_handle() {
        let (engine, journal) = MockEngine::with_surfaces(&["broken-chart"]);
        let mut registry = ChartRegistry::new(engine);
        let first = registry.create("broken-chart", tco_spec()).unwrap().handle().serial;

        registry.engine_mut().reject.insert("broken-chart".into());
        assert!(registry.create("broken-chart", roi_spec()).is_err());

        assert!(registry.get("broken-chart").is_none());
        assert_eq!(journal.borrow().disposed, vec![first]);
    }

    #[test]
    fn placeholder_fallback_after_rejection() {
        let (mut engine, _) = MockEngine::with_surfaces(&["broken-chart"]);
        engine.reject.insert("broken-chart".into());
        let mut registry = ChartRegistry::new(engine);

        let chart = registry
            .create_or_placeholder("broken-chart", roi_spec())
            .unwrap();
        assert_eq!(chart.spec(), &ChartSpec::placeholder(ChartKind::Line));
    }

    #[test]
    fn placeholder_fallback_does_not_mask_missing_surface() {
        let (engine, _) = MockEngine::with_surfaces(&[]);
        let mut registry = ChartRegistry::new(engine);
        assert!(matches!(
            registry.create_or_placeholder("gone", tco_spec()),
            Err(RegistryError::SurfaceNotFound(_))
        ));
    }

    #[test]
    fn dropping_registry_disposes_live_charts() {
        let (engine, journal) = MockEngine::with_surfaces(&["tco-chart", "roi-chart"]);
        let mut registry = ChartRegistry::new(engine);
        registry.create("tco-chart", tco_spec()).unwrap();
        registry.create("roi-chart", roi_spec()).unwrap();

        drop(registry);
        assert_eq!(journal.borrow().disposed.len(), 2);
    }

    #[test]
    fn ids_are_sorted() {
        let (engine, _) = MockEngine::with_surfaces(&["b", "a", "c"]);
        let mut registry = ChartRegistry::new(engine);
        for id in ["c", "a", "b"] {
            registry.create(id, tco_spec()).unwrap();
        }
        let ids: Vec<String> = registry.ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(registry.contains("a"));
    }
}
