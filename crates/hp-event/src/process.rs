//! Processes: a named, styled event source with a selection.

use std::fmt;
use std::sync::Arc;

use hp_core::{ProcessKind, Result};
use serde::{Deserialize, Serialize};

use crate::event::Schema;
use crate::named_func::NamedFunc;
use crate::source::EventSource;

/// Display attributes of a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStyle {
    /// RGB color, `0xRRGGBB`.
    pub color: u32,
    /// Whether the area under the histogram is filled.
    pub fill: bool,
    /// Line width in pixels.
    pub line_width: u32,
    /// Line style code (1 = solid).
    pub line_style: u32,
    /// Marker style code (0 = none).
    pub marker_style: u32,
    /// Marker size.
    pub marker_size: f64,
}

impl ProcessStyle {
    /// Default look for a category: filled backgrounds, outlined signals,
    /// markers for data.
    pub fn for_kind(kind: ProcessKind, color: u32) -> Self {
        match kind {
            ProcessKind::Background => Self {
                color,
                fill: true,
                line_width: 1,
                line_style: 1,
                marker_style: 0,
                marker_size: 0.0,
            },
            ProcessKind::Signal => Self {
                color,
                fill: false,
                line_width: 3,
                line_style: 1,
                marker_style: 0,
                marker_size: 0.0,
            },
            ProcessKind::Data => Self {
                color,
                fill: false,
                line_width: 1,
                line_style: 1,
                marker_style: 20,
                marker_size: 1.2,
            },
        }
    }
}

/// One contribution to a figure: data, a background or a signal.
///
/// Processes are immutable and shared between figures as `Arc<Process>`;
/// figures identify them by pointer, not by value.
pub struct Process {
    name: String,
    kind: ProcessKind,
    style: ProcessStyle,
    source: Arc<dyn EventSource>,
    cut: NamedFunc,
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("source", &self.source.key())
            .field("cut", &self.cut.name())
            .finish()
    }
}

impl Process {
    /// Build a shared process. No I/O happens here.
    pub fn new(
        name: impl Into<String>,
        kind: ProcessKind,
        color: u32,
        source: Arc<dyn EventSource>,
        cut: NamedFunc,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind,
            style: ProcessStyle::for_kind(kind, color),
            source,
            cut,
        })
    }

    /// Build a process from textual category and cut, as read from an
    /// analysis configuration.
    pub fn from_strings(
        name: impl Into<String>,
        kind: &str,
        color: u32,
        source: Arc<dyn EventSource>,
        cut: &str,
        schema: &Schema,
    ) -> Result<Arc<Self>> {
        let kind: ProcessKind = kind.parse()?;
        let cut = NamedFunc::parse(cut, schema)?;
        Ok(Self::new(name, kind, color, source, cut))
    }

    /// Copy of this process with a different style.
    pub fn with_style(&self, style: ProcessStyle) -> Arc<Self> {
        Arc::new(Self {
            name: self.name.clone(),
            kind: self.kind,
            style,
            source: Arc::clone(&self.source),
            cut: self.cut.clone(),
        })
    }

    /// Display label (may contain markup).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Category.
    pub fn kind(&self) -> ProcessKind {
        self.kind
    }

    /// Display style.
    pub fn style(&self) -> &ProcessStyle {
        &self.style
    }

    /// Event source handle.
    pub fn source(&self) -> &Arc<dyn EventSource> {
        &self.source
    }

    /// Selection applied to every event of the source.
    pub fn cut(&self) -> &NamedFunc {
        &self.cut
    }

    /// Whether this is recorded data.
    pub fn is_data(&self) -> bool {
        self.kind == ProcessKind::Data
    }

    /// Whether this is a simulated background.
    pub fn is_background(&self) -> bool {
        self.kind == ProcessKind::Background
    }

    /// Whether this is a simulated signal.
    pub fn is_signal(&self) -> bool {
        self.kind == ProcessKind::Signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ColumnSet, ColumnSource};

    fn source() -> Arc<dyn EventSource> {
        Arc::new(ColumnSource::new("tt", ColumnSet::new().with_scalar("x", vec![1.0])).unwrap())
    }

    #[test]
    fn category_is_validated() {
        let schema = Schema::new().with_scalar("x");
        let p = Process::from_strings("t#bar{t}", "background", 0x1f77b4, source(), "x>0", &schema)
            .unwrap();
        assert!(p.is_background());
        assert_eq!(p.cut().name(), "x>0");
        assert!(p.style().fill);

        let err = Process::from_strings("x", "ghost", 0, source(), "", &schema).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn identical_processes_are_distinct() {
        let a = Process::new("a", ProcessKind::Signal, 0, source(), NamedFunc::constant(1.0));
        let b = Process::new("a", ProcessKind::Signal, 0, source(), NamedFunc::constant(1.0));
        assert!(!Arc::ptr_eq(&a, &b));
        let a2 = Arc::clone(&a);
        assert!(Arc::ptr_eq(&a, &a2));
    }

    #[test]
    fn data_style_uses_markers() {
        let s = ProcessStyle::for_kind(ProcessKind::Data, 0);
        assert_eq!(s.marker_style, 20);
        assert!(!s.fill);
    }
}
