//! Event dumps: chosen columns of every selected event, one text file per process.
//!
//! Each file starts every eighth event with a header line. Scalar columns are
//! printed once per line; vector columns contribute one line per instance,
//! with blanks where a shorter vector has run out.

use std::any::Any;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hp_core::Result;
use hp_event::{Event, NamedFunc, Process, Value, canonical_name};

use crate::figure::{Components, Figure, FigureComponent};

/// Significant digits used when no precision is given.
pub const DEFAULT_PRECISION: usize = 9;

/// Text dump of one process.
#[derive(Debug)]
pub struct ScanColumn {
    process: Arc<Process>,
    full_cut: NamedFunc,
    columns: Vec<NamedFunc>,
    precision: usize,
    out: String,
    rows: usize,
}

impl ScanColumn {
    fn width(&self) -> usize {
        self.precision + 6
    }

    /// Text written so far.
    pub fn text(&self) -> &str {
        &self.out
    }

    /// Number of events written.
    pub fn rows(&self) -> usize {
        self.rows
    }

    fn write_header(&mut self) {
        let w = self.width();
        self.out.push_str("      Row Instance");
        for col in &self.columns {
            let name: String = col.name().chars().take(w).collect();
            let _ = write!(self.out, " {name:>w$}");
        }
        self.out.push('\n');
    }
}

impl FigureComponent for ScanColumn {
    fn process(&self) -> &Arc<Process> {
        &self.process
    }

    fn record_event(&mut self, ev: &dyn Event) -> Result<()> {
        let cut = self.full_cut.eval(ev)?;
        if matches!(cut, Value::Scalar(c) if c == 0.0) {
            return Ok(());
        }
        let values = self.columns.iter().map(|c| c.eval(ev)).collect::<Result<Vec<Value>>>()?;

        let mut n_instances = values
            .iter()
            .map(|v| v.vector_len().unwrap_or(1))
            .max()
            .unwrap_or(0);
        if let Some(n) = cut.vector_len() {
            n_instances = n_instances.min(n);
        }
        let passing: Vec<usize> = (0..n_instances).filter(|&i| cut.at(i) != 0.0).collect();
        if passing.is_empty() {
            return Ok(());
        }

        if self.rows % 8 == 0 {
            self.write_header();
        }
        let w = self.width();
        for instance in passing {
            let _ = write!(self.out, "{:>9} {:>8}", self.rows, instance);
            for v in &values {
                let cell = match v {
                    Value::Scalar(x) => format_g(*x, self.precision),
                    Value::Vector(xs) => xs.get(instance).map(|x| format_g(*x, self.precision)).unwrap_or_default(),
                };
                let _ = write!(self.out, " {cell:>w$}");
            }
            self.out.push('\n');
        }
        self.rows += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.out.clear();
        self.rows = 0;
    }
}

/// Event dump figure.
#[derive(Debug)]
pub struct EventScan {
    name: String,
    components: Components<ScanColumn>,
}

impl EventScan {
    /// Dump `columns` of events passing `cut` for each process.
    pub fn new(
        name: impl Into<String>,
        cut: NamedFunc,
        columns: Vec<NamedFunc>,
        processes: &[Arc<Process>],
        precision: usize,
    ) -> Result<Self> {
        let name = name.into();
        let components = Components::build(processes, |p| {
            Ok(ScanColumn {
                process: Arc::clone(p),
                full_cut: cut.and(p.cut()),
                columns: columns.clone(),
                precision,
                out: String::new(),
                rows: 0,
            })
        })
        .map_err(|e| e.context(format!("scan '{name}'")))?;
        Ok(Self { name, components })
    }

    /// Dump of `process`.
    pub fn column(&self, process: &Arc<Process>) -> Result<&ScanColumn> {
        self.components.get(process, &self.name)
    }

    /// File of one process below `out_dir`.
    pub fn file_path(&self, process: &Process, out_dir: &Path) -> PathBuf {
        out_dir.join(format!("{}_SCAN_{}.txt", self.name, canonical_name(process.name())))
    }
}

impl Figure for EventScan {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn processes(&self) -> Vec<Arc<Process>> {
        self.components.processes()
    }

    fn components_mut(&mut self) -> Vec<&mut dyn FigureComponent> {
        self.components.as_dyn_mut()
    }

    fn component(&self, process: &Arc<Process>) -> Result<&dyn FigureComponent> {
        let c: &dyn FigureComponent = self.column(process)?;
        Ok(c)
    }

    fn print(&self, _luminosity: f64, out_dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(out_dir)?;
        let mut written = Vec::new();
        for scan in self.components.iter() {
            let path = self.file_path(&scan.process, out_dir);
            std::fs::write(&path, &scan.out)?;
            log::info!("wrote scan of {} events to {}", scan.rows, path.display());
            written.push(path);
        }
        Ok(written)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `printf("%.*g")`-style formatting: `precision` significant digits,
/// trailing zeros dropped, scientific notation for very large or small values.
pub fn format_g(value: f64, precision: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return format!("{value}");
    }
    let p = precision.max(1);
    let exp = value.abs().log10().floor() as i32;
    if exp < -4 || exp >= p as i32 {
        let s = format!("{:.*e}", p - 1, value);
        let (mantissa, exponent) = s.split_once('e').unwrap_or((s.as_str(), "0"));
        let mantissa = trim_zeros(mantissa);
        let e: i32 = exponent.parse().unwrap_or(0);
        let sign = if e < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", e.abs())
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') { s.trim_end_matches('0').trim_end_matches('.') } else { s }
}
