//! Cut-flow tables: per-row weighted yields for every process.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hp_core::{ProcessKind, Result};
use hp_event::{EntrySpec, Event, NamedFunc, Process};
use hp_prob::{GammaParams, binomial_exp_z};
use serde::Serialize;

use crate::artifact::{ArtifactMeta, lumi_tag, write_json};
use crate::figure::{Components, Figure, FigureComponent};

/// Flat relative uncertainty added in quadrature to the background
/// statistical uncertainty in the Zbi column.
pub const ZBI_FLAT_SYST: f64 = 0.3;

/// One line of a table.
#[derive(Debug, Clone)]
pub struct TableRow {
    /// Label in the first column.
    pub label: String,
    /// Selection of the row (combined with each process's cut).
    pub cut: NamedFunc,
    /// Weight overriding the table weight.
    pub weight: Option<NamedFunc>,
    /// Horizontal rules before the row.
    pub lines_before: usize,
    /// Horizontal rules after the row.
    pub lines_after: usize,
    /// Whether the row holds yields (false for label-only rows).
    pub is_data_row: bool,
}

impl TableRow {
    /// Yield row.
    pub fn new(label: impl Into<String>, cut: NamedFunc) -> Self {
        Self {
            label: label.into(),
            cut,
            weight: None,
            lines_before: 0,
            lines_after: 0,
            is_data_row: true,
        }
    }

    /// Label-only row spanning the whole table.
    pub fn separator(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            cut: NamedFunc::constant(0.0),
            weight: None,
            lines_before: 1,
            lines_after: 1,
            is_data_row: false,
        }
    }

    /// Use `weight` for this row instead of the table weight.
    pub fn with_weight(mut self, weight: NamedFunc) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Set the rules around the row.
    pub fn lines(mut self, before: usize, after: usize) -> Self {
        self.lines_before = before;
        self.lines_after = after;
        self
    }
}

/// Per-row sums of one process.
#[derive(Debug)]
pub struct TableColumn {
    process: Arc<Process>,
    specs: Vec<Option<EntrySpec>>,
    sumw: Vec<f64>,
    sumw2: Vec<f64>,
}

impl TableColumn {
    fn new(rows: &[TableRow], weight: &NamedFunc, process: &Arc<Process>) -> Self {
        let specs = rows
            .iter()
            .map(|row| {
                row.is_data_row.then(|| {
                    EntrySpec::new(
                        row.cut.and(process.cut()),
                        row.weight.clone().unwrap_or_else(|| weight.clone()),
                        Vec::new(),
                    )
                })
            })
            .collect();
        Self {
            process: Arc::clone(process),
            specs,
            sumw: vec![0.0; rows.len()],
            sumw2: vec![0.0; rows.len()],
        }
    }

    /// `Σw` per row (1 fb⁻¹-equivalent for simulation).
    pub fn sumw(&self) -> &[f64] {
        &self.sumw
    }

    /// `Σw²` per row.
    pub fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }
}

impl FigureComponent for TableColumn {
    fn process(&self) -> &Arc<Process> {
        &self.process
    }

    fn record_event(&mut self, ev: &dyn Event) -> Result<()> {
        for (irow, spec) in self.specs.iter().enumerate() {
            let Some(spec) = spec else { continue };
            let (sumw, sumw2) = (&mut self.sumw[irow], &mut self.sumw2[irow]);
            spec.for_each_entry(ev, |w, _| {
                *sumw += w;
                *sumw2 += w * w;
            })?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.sumw.iter_mut().for_each(|s| *s = 0.0);
        self.sumw2.iter_mut().for_each(|s| *s = 0.0);
    }
}

/// Table figure.
#[derive(Debug)]
pub struct Table {
    name: String,
    rows: Vec<TableRow>,
    do_zbi: bool,
    components: Components<TableColumn>,
}

impl Table {
    /// Build a table; `weight` applies to rows without their own weight.
    pub fn new(
        name: impl Into<String>,
        rows: Vec<TableRow>,
        processes: &[Arc<Process>],
        weight: NamedFunc,
        do_zbi: bool,
    ) -> Result<Self> {
        let name = name.into();
        let components = Components::build(processes, |p| Ok(TableColumn::new(&rows, &weight, p)))
            .map_err(|e| e.context(format!("table '{name}'")))?;
        Ok(Self { name, rows, do_zbi, components })
    }

    /// Rows.
    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    /// Column of `process`.
    pub fn column(&self, process: &Arc<Process>) -> Result<&TableColumn> {
        self.components.get(process, &self.name)
    }

    /// Per-row yield of one process; simulation is scaled by `luminosity`,
    /// data is not.
    pub fn yield_of(&self, process: &Arc<Process>, luminosity: f64) -> Result<Vec<GammaParams>> {
        let col = self.column(process)?;
        Ok(column_yields(col, luminosity))
    }

    /// Per-row summed background yield.
    pub fn background_yield(&self, luminosity: f64) -> Vec<GammaParams> {
        self.sum_group(ProcessKind::Background, luminosity)
    }

    /// Per-row summed data yield.
    pub fn data_yield(&self) -> Vec<GammaParams> {
        self.sum_group(ProcessKind::Data, 1.0)
    }

    /// Whether any data process is registered.
    pub fn has_data(&self) -> bool {
        !self.components.data.is_empty()
    }

    /// Processes of one category, in registration order.
    pub fn processes_of(&self, kind: ProcessKind) -> Vec<Arc<Process>> {
        self.components.group(kind).iter().map(|c| Arc::clone(&c.process)).collect()
    }

    fn sum_group(&self, kind: ProcessKind, luminosity: f64) -> Vec<GammaParams> {
        let mut out = vec![GammaParams::default(); self.rows.len()];
        for col in self.components.group(kind) {
            for (acc, y) in out.iter_mut().zip(column_yields(col, luminosity)) {
                *acc += y;
            }
        }
        out
    }

    /// Per-row Zbi of `signal` over the summed backgrounds, with the
    /// background's relative statistical error combined with
    /// [`ZBI_FLAT_SYST`].
    pub fn zbi(&self, signal: &Arc<Process>, luminosity: f64) -> Result<Vec<f64>> {
        let sig = self.yield_of(signal, luminosity)?;
        let bkg = self.background_yield(luminosity);
        Ok(sig
            .iter()
            .zip(&bkg)
            .map(|(s, b)| {
                let rel = if b.yield_value() > 0.0 { b.uncertainty() / b.yield_value() } else { 0.0 };
                binomial_exp_z(s.yield_value(), b.yield_value(), rel.hypot(ZBI_FLAT_SYST))
            })
            .collect())
    }

    /// Path of the artifact below `out_dir`.
    pub fn artifact_path(&self, luminosity: f64, out_dir: &Path) -> PathBuf {
        out_dir.join("tables").join(format!("{}_lumi_{}.json", self.name, lumi_tag(luminosity)))
    }

    fn artifact(&self, luminosity: f64) -> Result<TableArtifact> {
        let header = |kind: ProcessKind| -> Vec<String> {
            self.components.group(kind).iter().map(|c| c.process.name().to_string()).collect()
        };
        let per_proc = |kind: ProcessKind| -> Vec<Vec<YieldCell>> {
            self.components.group(kind).iter().map(|c| column_cells(c, luminosity)).collect()
        };
        let bkg = per_proc(ProcessKind::Background);
        let data = per_proc(ProcessKind::Data);
        let sig = per_proc(ProcessKind::Signal);
        let zbis = if self.do_zbi {
            self.components
                .signal
                .iter()
                .map(|c| self.zbi(&c.process, luminosity))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let cells = |ys: &[Vec<YieldCell>]| -> Vec<YieldCell> {
                    if !row.is_data_row {
                        return Vec::new();
                    }
                    ys.iter().map(|y| y[i]).collect()
                };
                let total = |ys: &[Vec<YieldCell>]| -> Option<YieldCell> {
                    (row.is_data_row && !ys.is_empty()).then(|| YieldCell {
                        value: ys.iter().map(|y| y[i].value).sum(),
                        error: ys.iter().map(|y| y[i].error).fold(0.0, f64::hypot),
                    })
                };
                RowArtifact {
                    label: row.label.clone(),
                    cut: row.cut.name().to_string(),
                    lines_before: row.lines_before,
                    lines_after: row.lines_after,
                    is_data_row: row.is_data_row,
                    backgrounds: cells(&bkg),
                    background_total: total(&bkg),
                    data: cells(&data),
                    data_total: total(&data),
                    signals: cells(&sig),
                    zbi: if row.is_data_row { zbis.iter().map(|z| z[i]).collect() } else { Vec::new() },
                }
            })
            .collect();

        Ok(TableArtifact {
            schema_version: "hepplot_table_v1".to_string(),
            meta: ArtifactMeta::now(luminosity)?,
            name: self.name.clone(),
            backgrounds: header(ProcessKind::Background),
            data: header(ProcessKind::Data),
            signals: header(ProcessKind::Signal),
            rows,
        })
    }
}

fn column_yields(col: &TableColumn, luminosity: f64) -> Vec<GammaParams> {
    let lumi = if col.process.kind().is_lumi_scaled() { luminosity } else { 1.0 };
    col.sumw
        .iter()
        .zip(&col.sumw2)
        .map(|(w, w2)| GammaParams::from_yield_and_uncertainty(lumi * w, lumi * w2.max(0.0).sqrt()))
        .collect()
}

fn column_cells(col: &TableColumn, luminosity: f64) -> Vec<YieldCell> {
    let lumi = if col.process.kind().is_lumi_scaled() { luminosity } else { 1.0 };
    col.sumw
        .iter()
        .zip(&col.sumw2)
        .map(|(w, w2)| YieldCell { value: lumi * w, error: lumi * w2.max(0.0).sqrt() })
        .collect()
}

impl Figure for Table {
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

    fn print(&self, luminosity: f64, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let path = self.artifact_path(luminosity, out_dir);
        write_json(&path, &self.artifact(luminosity)?)?;
        log::debug!("wrote {}", path.display());
        Ok(vec![path])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Serialize)]
struct TableArtifact {
    schema_version: String,
    meta: ArtifactMeta,
    name: String,
    backgrounds: Vec<String>,
    data: Vec<String>,
    signals: Vec<String>,
    rows: Vec<RowArtifact>,
}

#[derive(Debug, Clone, Serialize)]
struct RowArtifact {
    label: String,
    cut: String,
    lines_before: usize,
    lines_after: usize,
    is_data_row: bool,
    backgrounds: Vec<YieldCell>,
    #[serde(skip_serializing_if = "Option::is_none")]
    background_total: Option<YieldCell>,
    data: Vec<YieldCell>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_total: Option<YieldCell>,
    signals: Vec<YieldCell>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    zbi: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct YieldCell {
    value: f64,
    error: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hp_event::{ColumnSet, ColumnSource, EventSource, MapEvent};

    fn process(name: &str, kind: ProcessKind) -> Arc<Process> {
        let src: Arc<dyn EventSource> =
            Arc::new(ColumnSource::new(name, ColumnSet::new().with_scalar("x", vec![])).unwrap());
        Process::new(name, kind, 0, src, NamedFunc::constant(1.0))
    }

    fn rows() -> Vec<TableRow> {
        let x = NamedFunc::scalar_field("x");
        vec![
            TableRow::new("all", NamedFunc::constant(1.0)),
            TableRow::separator("tight"),
            TableRow::new("x > 5", x.greater(5.0)),
        ]
    }

    fn feed(table: &mut Table, p: &Arc<Process>, xs: &[f64], w: f64) {
        for col in table.components_mut() {
            if !Arc::ptr_eq(col.process(), p) {
                continue;
            }
            for x in xs {
                let ev = MapEvent::new().with_scalar("x", *x).with_scalar("w", w);
                col.record_event(&ev).unwrap();
            }
        }
    }

    #[test]
    fn rows_accumulate_weights() {
        let bkg = process("bkg", ProcessKind::Background);
        let mut t = Table::new("flow", rows(), &[bkg.clone()], NamedFunc::scalar_field("w"), false).unwrap();
        feed(&mut t, &bkg, &[1.0, 6.0, 7.0, 9.0], 0.5);
        let col = t.column(&bkg).unwrap();
        assert_eq!(col.sumw(), &[2.0, 0.0, 1.5]);
        assert_eq!(col.sumw2(), &[1.0, 0.0, 0.75]);

        let y = t.yield_of(&bkg, 2.0).unwrap();
        assert_relative_eq!(y[2].yield_value(), 3.0, epsilon = 1e-12);
        assert_relative_eq!(y[2].uncertainty(), 2.0 * 0.75f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn data_is_not_scaled_and_backgrounds_sum() {
        let a = process("a", ProcessKind::Background);
        let b = process("b", ProcessKind::Background);
        let d = process("data", ProcessKind::Data);
        let mut t = Table::new(
            "flow",
            rows(),
            &[a.clone(), d.clone(), b.clone()],
            NamedFunc::constant(1.0),
            false,
        )
        .unwrap();
        feed(&mut t, &a, &[6.0, 6.0], 1.0);
        feed(&mut t, &b, &[1.0, 8.0], 1.0);
        feed(&mut t, &d, &[6.0, 6.0, 6.0], 1.0);
        let bkg = t.background_yield(10.0);
        assert_relative_eq!(bkg[2].yield_value(), 30.0, epsilon = 1e-9);
        assert_relative_eq!(bkg[0].yield_value(), 40.0, epsilon = 1e-9);
        let data = t.data_yield();
        assert_relative_eq!(data[2].yield_value(), 3.0, epsilon = 1e-12);
        assert_relative_eq!(t.yield_of(&d, 10.0).unwrap()[2].yield_value(), 3.0, epsilon = 1e-12);
        assert!(t.has_data());
        assert_eq!(t.processes_of(ProcessKind::Background).len(), 2);
    }

    #[test]
    fn zbi_uses_flat_systematic() {
        let b = process("bkg", ProcessKind::Background);
        let s = process("sig", ProcessKind::Signal);
        let mut t =
            Table::new("flow", rows(), &[b.clone(), s.clone()], NamedFunc::constant(1.0), true).unwrap();
        feed(&mut t, &b, &[6.0; 100], 1.0);
        feed(&mut t, &s, &[6.0; 20], 1.0);
        let z = t.zbi(&s, 1.0).unwrap();
        let expected = binomial_exp_z(20.0, 100.0, 0.1f64.hypot(0.3));
        assert_relative_eq!(z[2], expected, epsilon = 1e-9);
        assert!(z[2] > 0.0);
    }

    #[test]
    fn print_writes_json() {
        let b = process("bkg", ProcessKind::Background);
        let s = process("sig", ProcessKind::Signal);
        let mut t =
            Table::new("cutflow", rows(), &[b.clone(), s.clone()], NamedFunc::constant(1.0), true).unwrap();
        feed(&mut t, &b, &[6.0, 2.0], 1.0);
        feed(&mut t, &s, &[7.0], 1.0);
        let dir = tempfile::tempdir().unwrap();
        let paths = t.print(2.5, dir.path()).unwrap();
        assert_eq!(paths, vec![dir.path().join("tables").join("cutflow_lumi_2p5.json")]);
        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(v["schema_version"], "hepplot_table_v1");
        assert_eq!(v["rows"][1]["is_data_row"], false);
        assert_eq!(v["rows"][0]["background_total"]["value"], 5.0);
        assert_eq!(v["rows"][2]["signals"][0]["value"], 2.5);
        assert!(v["rows"][2]["zbi"][0].as_f64().is_some());
    }

    #[test]
    fn unknown_process_is_rejected() {
        let b = process("bkg", ProcessKind::Background);
        let t = Table::new("flow", rows(), &[b], NamedFunc::constant(1.0), false).unwrap();
        let stranger = process("bkg", ProcessKind::Background);
        assert!(t.yield_of(&stranger, 1.0).is_err());
    }
}
