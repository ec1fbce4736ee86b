//! Figures and their per-process components.
//!
//! A [`Figure`] owns one [`FigureComponent`] per registered [`Process`]. The
//! scan forwards every event of a process's source to the matching
//! component; afterwards the figure aggregates its components and writes its
//! artifacts. Components are looked up by process identity (`Arc::ptr_eq`),
//! never by value.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hp_core::{Error, ProcessKind, Result};
use hp_event::{Event, Process};

/// Per-process accumulator of a figure.
pub trait FigureComponent: Send {
    /// Process this component accumulates.
    fn process(&self) -> &Arc<Process>;

    /// Fold one event of the process's source into the accumulator.
    fn record_event(&mut self, ev: &dyn Event) -> Result<()>;

    /// Discard everything recorded so far.
    fn reset(&mut self);
}

/// Something the scan can fill and print.
pub trait Figure: Send {
    /// Identifier used in logs and error messages.
    fn name(&self) -> String;

    /// Processes registered with this figure.
    fn processes(&self) -> Vec<Arc<Process>>;

    /// Mutable access to every component (used by the scan).
    fn components_mut(&mut self) -> Vec<&mut dyn FigureComponent>;

    /// Component registered for `process`.
    fn component(&self, process: &Arc<Process>) -> Result<&dyn FigureComponent>;

    /// Aggregate at `luminosity` and write artifacts below `out_dir`.
    /// Returns the written paths.
    fn print(&self, luminosity: f64, out_dir: &Path) -> Result<Vec<PathBuf>>;

    /// Downcast support for typed handles.
    fn as_any(&self) -> &dyn Any;
}

/// Components partitioned by process category, each group in registration order.
#[derive(Debug, Clone)]
pub struct Components<C> {
    /// Data components.
    pub data: Vec<C>,
    /// Background components.
    pub background: Vec<C>,
    /// Signal components.
    pub signal: Vec<C>,
}

impl<C> Default for Components<C> {
    fn default() -> Self {
        Self { data: Vec::new(), background: Vec::new(), signal: Vec::new() }
    }
}

impl<C: FigureComponent> Components<C> {
    /// Build one component per process with `make`. Registering the same
    /// process twice is a configuration error.
    pub fn build<F>(processes: &[Arc<Process>], mut make: F) -> Result<Self>
    where
        F: FnMut(&Arc<Process>) -> Result<C>,
    {
        let mut out = Self::default();
        for (i, p) in processes.iter().enumerate() {
            if processes[..i].iter().any(|q| Arc::ptr_eq(p, q)) {
                return Err(Error::Config(format!(
                    "process '{}' registered twice with the same figure",
                    p.name()
                )));
            }
            let c = make(p)?;
            out.group_mut(p.kind()).push(c);
        }
        Ok(out)
    }

    /// Group of one category.
    pub fn group(&self, kind: ProcessKind) -> &[C] {
        match kind {
            ProcessKind::Data => &self.data,
            ProcessKind::Background => &self.background,
            ProcessKind::Signal => &self.signal,
        }
    }

    fn group_mut(&mut self, kind: ProcessKind) -> &mut Vec<C> {
        match kind {
            ProcessKind::Data => &mut self.data,
            ProcessKind::Background => &mut self.background,
            ProcessKind::Signal => &mut self.signal,
        }
    }

    /// Component of `process`, or a configuration error naming `figure`.
    pub fn get(&self, process: &Arc<Process>, figure: &str) -> Result<&C> {
        self.group(process.kind())
            .iter()
            .find(|c| Arc::ptr_eq(c.process(), process))
            .ok_or_else(|| {
                Error::Config(format!(
                    "process '{}' is not registered with figure '{figure}'",
                    process.name()
                ))
            })
    }

    /// All components: data, then backgrounds, then signals.
    pub fn iter(&self) -> impl Iterator<Item = &C> {
        self.data.iter().chain(&self.background).chain(&self.signal)
    }

    /// Mutable iteration in the same order as [`iter`](Self::iter).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut C> {
        self.data.iter_mut().chain(self.background.iter_mut()).chain(self.signal.iter_mut())
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.data.len() + self.background.len() + self.signal.len()
    }

    /// Whether no process is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Processes of all components.
    pub fn processes(&self) -> Vec<Arc<Process>> {
        self.iter().map(|c| Arc::clone(c.process())).collect()
    }

    /// Type-erased mutable views for the scan.
    pub fn as_dyn_mut(&mut self) -> Vec<&mut dyn FigureComponent> {
        self.iter_mut().map(|c| c as &mut dyn FigureComponent).collect()
    }
}
