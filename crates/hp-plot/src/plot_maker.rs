//! Single-pass scan orchestrator.
//!
//! Figures are registered with a [`PlotMaker`]. When filled, the components of
//! all pending figures are grouped by the key of their process's event source
//! and every distinct source is read exactly once, each event being forwarded
//! to every component routed to that source. Distinct sources are scanned in
//! parallel on a rayon pool; every worker holds the only `&mut` to its
//! components, so no locking is involved.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hp_core::{Error, Result};
use hp_event::EventSource;
use rayon::prelude::*;

use crate::figure::{Figure, FigureComponent};

/// Typed reference to a figure owned by a [`PlotMaker`].
#[derive(Debug)]
pub struct FigureHandle<F> {
    index: usize,
    _marker: PhantomData<fn() -> F>,
}

impl<F> Clone for FigureHandle<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for FigureHandle<F> {}

impl<F> FigureHandle<F> {
    /// Registration index.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Events read per source during one fill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// `(source key, events read)` in key order.
    pub sources: Vec<(String, usize)>,
}

impl ScanSummary {
    /// Total events read.
    pub fn total_events(&self) -> usize {
        self.sources.iter().map(|(_, n)| n).sum()
    }
}

struct Target<'a> {
    label: String,
    component: &'a mut dyn FigureComponent,
}

struct Task<'a> {
    key: String,
    source: Arc<dyn EventSource>,
    targets: Vec<Target<'a>>,
}

/// Registry of figures and driver of the scan.
pub struct PlotMaker {
    figures: Vec<Box<dyn Figure>>,
    filled: Vec<bool>,
    /// Scan distinct sources concurrently.
    pub multithreaded: bool,
    /// Size of a dedicated pool; `None` uses rayon's global pool.
    pub num_threads: Option<usize>,
}

impl Default for PlotMaker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PlotMaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlotMaker")
            .field("figures", &self.figures.iter().map(|fig| fig.name()).collect::<Vec<_>>())
            .field("filled", &self.filled)
            .field("multithreaded", &self.multithreaded)
            .field("num_threads", &self.num_threads)
            .finish()
    }
}

impl PlotMaker {
    /// Empty registry, multithreaded on the global pool.
    pub fn new() -> Self {
        Self { figures: Vec::new(), filled: Vec::new(), multithreaded: true, num_threads: None }
    }

    /// Toggle concurrent scanning.
    pub fn with_multithreading(mut self, on: bool) -> Self {
        self.multithreaded = on;
        self
    }

    /// Scan on a dedicated pool of `n` threads.
    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Register a figure. It is filled by the next [`fill`](Self::fill).
    pub fn push<F: Figure + 'static>(&mut self, figure: F) -> FigureHandle<F> {
        self.figures.push(Box::new(figure));
        self.filled.push(false);
        FigureHandle { index: self.figures.len() - 1, _marker: PhantomData }
    }

    /// Figure behind `handle`.
    pub fn get<F: Figure + 'static>(&self, handle: FigureHandle<F>) -> Result<&F> {
        self.figures
            .get(handle.index)
            .and_then(|f| f.as_any().downcast_ref::<F>())
            .ok_or_else(|| Error::Config(format!("no figure of the requested type at index {}", handle.index)))
    }

    /// Registered figures in registration order.
    pub fn figures(&self) -> impl Iterator<Item = &dyn Figure> {
        self.figures.iter().map(|f| f.as_ref())
    }

    /// Number of registered figures.
    pub fn len(&self) -> usize {
        self.figures.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.figures.is_empty()
    }

    /// Whether the figure at `index` has been filled.
    pub fn is_filled(&self, index: usize) -> bool {
        self.filled.get(index).copied().unwrap_or(false)
    }

    /// Drop all figures.
    pub fn clear(&mut self) {
        self.figures.clear();
        self.filled.clear();
    }

    /// Fill every pending figure, reading each distinct source once.
    ///
    /// Any error aborts the whole fill. No figure is marked filled then, and
    /// the pending figures are emptied so that a later fill starts afresh.
    pub fn fill(&mut self) -> Result<ScanSummary> {
        match self.scan_pending() {
            Ok(counts) => {
                for filled in &mut self.filled {
                    *filled = true;
                }
                Ok(ScanSummary { sources: counts })
            }
            Err(e) => {
                self.reset_pending();
                Err(e)
            }
        }
    }

    fn scan_pending(&mut self) -> Result<Vec<(String, usize)>> {
        let multithreaded = self.multithreaded;
        let num_threads = self.num_threads;

        let mut tasks: BTreeMap<String, Task<'_>> = BTreeMap::new();
        for (figure, filled) in self.figures.iter_mut().zip(&self.filled) {
            if *filled {
                continue;
            }
            let figure_name = figure.name();
            for component in figure.components_mut() {
                let process = Arc::clone(component.process());
                let source = Arc::clone(process.source());
                let key = source.key().to_string();
                let task = tasks
                    .entry(key.clone())
                    .or_insert_with(|| Task { key, source: Arc::clone(&source), targets: Vec::new() });
                if !Arc::ptr_eq(&task.source, &source) {
                    return Err(Error::Config(format!(
                        "process '{}' in figure '{}' uses a different source under the key '{}' \
                         already taken by another source",
                        process.name(),
                        figure_name,
                        task.key
                    )));
                }
                task.targets.push(Target {
                    label: format!("figure '{}' / process '{}'", figure_name, process.name()),
                    component,
                });
            }
        }
        let tasks: Vec<Task<'_>> = tasks.into_values().collect();
        log::debug!("scanning {} distinct sources", tasks.len());

        if !multithreaded || tasks.len() <= 1 {
            tasks.into_iter().map(run_task).collect()
        } else if let Some(n) = num_threads {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| Error::Computation(format!("failed to create thread pool: {e}")))?;
            pool.install(|| tasks.into_par_iter().map(run_task).collect())
        } else {
            tasks.into_par_iter().map(run_task).collect()
        }
    }

    fn reset_pending(&mut self) {
        for (figure, filled) in self.figures.iter_mut().zip(&self.filled) {
            if !*filled {
                log::debug!("discarding partial fill of figure '{}'", figure.name());
                figure.components_mut().into_iter().for_each(|c| c.reset());
            }
        }
    }

    /// Fill pending figures, then print every figure at `luminosity` below
    /// `out_dir`. Returns all written paths.
    pub fn make_plots(&mut self, luminosity: f64, out_dir: &Path) -> Result<Vec<PathBuf>> {
        if luminosity.is_nan() || luminosity <= 0.0 {
            return Err(Error::Validation(format!("luminosity must be positive, got {luminosity}")));
        }
        self.fill()?;
        let mut written = Vec::new();
        for figure in &self.figures {
            log::debug!("printing figure '{}'", figure.name());
            let paths = figure
                .print(luminosity, out_dir)
                .map_err(|e| e.context(format!("printing figure '{}'", figure.name())))?;
            written.extend(paths);
        }
        Ok(written)
    }
}

fn run_task(mut task: Task<'_>) -> Result<(String, usize)> {
    log::info!("opening source '{}' for {} components", task.key, task.targets.len());
    let mut reader = task
        .source
        .open()
        .map_err(|e| e.context(format!("opening source '{}'", task.key)))?;
    let mut n_events = 0usize;
    while let Some(ev) = reader.next_event().map_err(|e| e.context(format!("reading source '{}'", task.key)))? {
        for target in &mut task.targets {
            target.component.record_event(ev).map_err(|e| e.context(&target.label))?;
        }
        n_events += 1;
    }
    log::info!("scanned {} events from source '{}'", n_events, task.key);
    Ok((task.key, n_events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hist1d::{Hist1D, HistoDef};
    use crate::plot_opt::PlotOpt;
    use std::sync::atomic::{AtomicBool, Ordering};

    use hp_core::ProcessKind;
    use hp_event::{ColumnSet, ColumnSource, EventReader, NamedFunc, Process};

    /// Fails to open until `available` is set.
    struct LateSource {
        inner: ColumnSource,
        available: AtomicBool,
    }

    impl EventSource for LateSource {
        fn key(&self) -> &str {
            self.inner.key()
        }

        fn open(&self) -> Result<Box<dyn EventReader + '_>> {
            if !self.available.load(Ordering::Relaxed) {
                return Err(Error::DataAvailability("missing file 'late.json'".into()));
            }
            self.inner.open()
        }
    }

    fn process(name: &str, key: &str, xs: Vec<f64>) -> (Arc<Process>, Arc<ColumnSource>) {
        let src = Arc::new(ColumnSource::new(key, ColumnSet::new().with_scalar("x", xs)).unwrap());
        let dyn_src: Arc<dyn EventSource> = src.clone();
        (Process::new(name, ProcessKind::Background, 0, dyn_src, NamedFunc::constant(1.0)), src)
    }

    fn hist(p: &[Arc<Process>]) -> Hist1D {
        let def = HistoDef::uniform(
            4,
            0.0,
            4.0,
            NamedFunc::scalar_field("x"),
            NamedFunc::constant(1.0),
            NamedFunc::constant(1.0),
            vec![PlotOpt::default()],
        );
        Hist1D::new(def, p).unwrap()
    }

    #[test]
    fn handle_downcasts() {
        let (p, _) = process("a", "k", vec![0.5]);
        let mut pm = PlotMaker::new();
        let h = pm.push(hist(&[p]));
        assert!(pm.get(h).is_ok());
        let wrong: FigureHandle<crate::table::Table> = FigureHandle { index: h.index(), _marker: PhantomData };
        assert!(pm.get(wrong).is_err());
    }

    #[test]
    fn figures_are_filled_once() {
        let (p, src) = process("a", "k", vec![0.5, 1.5, 2.5]);
        let mut pm = PlotMaker::new().with_multithreading(false);
        let h = pm.push(hist(&[p.clone()]));
        let s = pm.fill().unwrap();
        assert_eq!(s.total_events(), 3);
        assert!(pm.is_filled(0));
        let again = pm.fill().unwrap();
        assert_eq!(again.total_events(), 0);
        assert_eq!(src.open_count(), 1);
        assert_eq!(pm.get(h).unwrap().raw(&p).unwrap().integral(), 3.0);
    }

    #[test]
    fn dedicated_pool() {
        let (a, _) = process("a", "ka", vec![0.5, 1.5]);
        let (b, _) = process("b", "kb", vec![2.5]);
        let mut pm = PlotMaker::new().with_num_threads(2);
        let h = pm.push(hist(&[a.clone(), b.clone()]));
        let s = pm.fill().unwrap();
        assert_eq!(s.sources, vec![("ka".to_string(), 2), ("kb".to_string(), 1)]);
        assert_eq!(pm.get(h).unwrap().raw(&b).unwrap().integral(), 1.0);
    }

    #[test]
    fn failed_fill_leaves_no_partial_totals() {
        let (a, _) = process("a", "a", vec![1.5; 10]);
        let late = Arc::new(LateSource {
            inner: ColumnSource::new("b", ColumnSet::new().with_scalar("x", vec![2.5; 4])).unwrap(),
            available: AtomicBool::new(false),
        });
        let late_dyn: Arc<dyn EventSource> = late.clone();
        let b = Process::new("b", ProcessKind::Background, 0, late_dyn, NamedFunc::constant(1.0));

        let mut pm = PlotMaker::new().with_multithreading(false);
        let h = pm.push(hist(&[a.clone(), b.clone()]));
        assert!(matches!(pm.fill(), Err(Error::DataAvailability(_))));
        assert!(!pm.is_filled(h.index()));
        assert_eq!(pm.get(h).unwrap().raw(&a).unwrap().integral(), 0.0);

        late.available.store(true, Ordering::Relaxed);
        pm.fill().unwrap();
        assert_eq!(pm.get(h).unwrap().raw(&a).unwrap().integral(), 10.0);
        assert_eq!(pm.get(h).unwrap().raw(&b).unwrap().integral(), 4.0);
    }

    #[test]
    fn distinct_sources_sharing_a_key_are_rejected() {
        let (a, _) = process("a", "mc", vec![0.5; 3]);
        let (b, _) = process("b", "mc", vec![1.5; 7]);
        let mut pm = PlotMaker::new();
        let h = pm.push(hist(&[a.clone(), b.clone()]));
        match pm.fill() {
            Err(Error::Config(msg)) => assert!(msg.contains("'mc'"), "{msg}"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!pm.is_filled(h.index()));
        assert_eq!(pm.get(h).unwrap().raw(&a).unwrap().integral(), 0.0);
    }

    #[test]
    fn rejects_non_positive_luminosity() {
        let mut pm = PlotMaker::new();
        let dir = tempfile::tempdir().unwrap();
        assert!(pm.make_plots(0.0, dir.path()).is_err());
    }
}
