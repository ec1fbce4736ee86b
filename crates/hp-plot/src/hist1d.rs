//! Stacked 1-D histogram figures.
//!
//! A [`Hist1D`] fills one luminosity-independent histogram per process during
//! the scan. At print time every requested [`PlotOpt`] gets its own working
//! copies, which go through the aggregation steps in order:
//!
//! 1. clone the raw histograms
//! 2. fold flow bins into the edge bins, convert contents to entries per
//!    average bin width
//! 3. multiply backgrounds and signals by the luminosity (data untouched)
//! 4. stack backgrounds from the last registered to the first
//! 5. normalize (to data, or every histogram to 100)
//! 6. derive the background error band
//! 7. derive the ratio/difference pane
//! 8. find the drawn y range
//!
//! The result is a [`Hist1DView`]; [`Figure::print`] writes one JSON artifact
//! per style.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hp_core::{Error, ProcessKind, Result};
use hp_event::{EntrySpec, Event, Histogram, NamedFunc, Process};
use serde::Serialize;

use crate::artifact::{ArtifactMeta, BandEnvelope, write_json};
use crate::figure::{Components, Figure, FigureComponent};
use crate::plot_opt::{BottomType, OverflowType, PlotOpt, StackType, YAxisType};

/// What to plot: binning, variable, selection, weight and styles.
#[derive(Debug, Clone)]
pub struct HistoDef {
    /// Prefix of the artifact names.
    pub tag: String,
    /// Bin edges.
    pub edges: Vec<f64>,
    /// Plotted variable.
    pub var: NamedFunc,
    /// Selection, combined with each process's own cut.
    pub cut: NamedFunc,
    /// Per-entry weight.
    pub weight: NamedFunc,
    /// X-axis title.
    pub x_title: String,
    /// Units of the variable.
    pub units: String,
    /// Style variants to print.
    pub styles: Vec<PlotOpt>,
}

impl HistoDef {
    /// Definition with explicit edges.
    pub fn new(
        edges: Vec<f64>,
        var: NamedFunc,
        cut: NamedFunc,
        weight: NamedFunc,
        styles: Vec<PlotOpt>,
    ) -> Self {
        let x_title = var.name().to_string();
        Self { tag: String::new(), edges, var, cut, weight, x_title, units: String::new(), styles }
    }

    /// Definition with `n_bins` equal bins on `[x_min, x_max)`.
    pub fn uniform(
        n_bins: usize,
        x_min: f64,
        x_max: f64,
        var: NamedFunc,
        cut: NamedFunc,
        weight: NamedFunc,
        styles: Vec<PlotOpt>,
    ) -> Self {
        let w = (x_max - x_min) / n_bins.max(1) as f64;
        let mut edges: Vec<f64> = (0..n_bins).map(|i| x_min + w * i as f64).collect();
        edges.push(x_max);
        Self::new(edges, var, cut, weight, styles)
    }

    /// Set the artifact name prefix.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Set the x-axis title and units.
    pub fn axis(mut self, x_title: impl Into<String>, units: impl Into<String>) -> Self {
        self.x_title = x_title.into();
        self.units = units.into();
        self
    }

    /// `<tag>__<var>__<cut>__<weight>`, built from canonical names.
    pub fn name(&self) -> String {
        let body =
            format!("{}__{}__{}", self.var.plain_name(), self.cut.plain_name(), self.weight.plain_name());
        if self.tag.is_empty() { body } else { format!("{}__{}", self.tag, body) }
    }

    /// Y-axis title for a style.
    pub fn y_title(&self, opt: &PlotOpt) -> String {
        let n = self.edges.len().saturating_sub(1).max(1);
        let width = (self.edges.last().copied().unwrap_or(1.0) - self.edges.first().copied().unwrap_or(0.0))
            / n as f64;
        let base = if opt.stack == StackType::Shapes { "% entries" } else { "Entries" };
        if self.units.is_empty() && width == 1.0 {
            base.to_string()
        } else if self.units.is_empty() {
            format!("{base}/({})", compact(width))
        } else {
            format!("{base}/({} {})", compact(width), self.units)
        }
    }
}

/// Raw histogram of one process.
#[derive(Debug)]
pub struct SingleHist {
    process: Arc<Process>,
    spec: EntrySpec,
    raw: Histogram,
}

impl SingleHist {
    fn new(def: &HistoDef, process: &Arc<Process>) -> Result<Self> {
        Ok(Self {
            process: Arc::clone(process),
            spec: EntrySpec::new(def.cut.and(process.cut()), def.weight.clone(), vec![def.var.clone()]),
            raw: Histogram::new(process.name(), def.edges.clone())?,
        })
    }

    /// Luminosity-independent accumulated histogram.
    pub fn raw(&self) -> &Histogram {
        &self.raw
    }
}

impl FigureComponent for SingleHist {
    fn process(&self) -> &Arc<Process> {
        &self.process
    }

    fn record_event(&mut self, ev: &dyn Event) -> Result<()> {
        let raw = &mut self.raw;
        self.spec.for_each_entry(ev, |w, vals| raw.fill(vals[0], w))?;
        Ok(())
    }

    fn reset(&mut self) {
        self.raw.reset();
    }
}

/// One process as drawn in a style variant.
#[derive(Debug, Clone)]
pub struct DrawnHist {
    /// Process name.
    pub name: String,
    /// Process category.
    pub kind: ProcessKind,
    /// Process color.
    pub color: u32,
    /// Drawn histogram (cumulative for stacked backgrounds).
    pub hist: Histogram,
    /// Marginal yield of this process in the drawn units.
    pub yield_value: f64,
    /// Mean of the marginal distribution.
    pub mean: f64,
    /// Legend label, annotated when the style asks for it.
    pub label: String,
}

/// Bottom pane of a style variant.
#[derive(Debug, Clone)]
pub struct BottomPane {
    /// Ratio or difference.
    pub kind: BottomType,
    /// Process whose histogram is the reference.
    pub reference: String,
    /// Reference uncertainty band, relative to the reference.
    pub band: BandEnvelope,
    /// Compared histograms.
    pub entries: Vec<(String, Histogram)>,
    /// Displayed y range.
    pub y_min: f64,
    /// Displayed y range.
    pub y_max: f64,
}

/// Fully aggregated figure for one style.
#[derive(Debug, Clone)]
pub struct Hist1DView {
    /// Data, in registration order.
    pub data: Vec<DrawnHist>,
    /// Backgrounds, in registration order.
    pub backgrounds: Vec<DrawnHist>,
    /// Signals, in registration order.
    pub signals: Vec<DrawnHist>,
    /// Data/MC scale factor (1 unless normalized to data).
    pub mc_scale: f64,
    /// Uncertainty of the scale factor.
    pub mc_scale_error: f64,
    /// Error band of the reference histogram.
    pub band: Option<BandEnvelope>,
    /// Ratio or difference pane.
    pub bottom: Option<BottomPane>,
    /// Lower end of the y axis.
    pub y_min: f64,
    /// Upper end of the y axis, including room for the legend.
    pub y_max: f64,
}

impl Hist1DView {
    /// Drawn histogram of the process named `name`.
    pub fn find(&self, name: &str) -> Option<&DrawnHist> {
        self.data.iter().chain(&self.backgrounds).chain(&self.signals).find(|h| h.name == name)
    }
}

/// Stacked 1-D histogram figure.
#[derive(Debug)]
pub struct Hist1D {
    def: HistoDef,
    components: Components<SingleHist>,
}

impl Hist1D {
    /// One raw histogram per process. The edges are validated here.
    pub fn new(def: HistoDef, processes: &[Arc<Process>]) -> Result<Self> {
        let components = Components::build(processes, |p| SingleHist::new(&def, p))
            .map_err(|e| e.context(format!("figure '{}'", def.name())))?;
        Ok(Self { def, components })
    }

    /// Definition.
    pub fn definition(&self) -> &HistoDef {
        &self.def
    }

    /// Raw histogram of `process`.
    pub fn raw(&self, process: &Arc<Process>) -> Result<&Histogram> {
        Ok(self.components.get(process, &self.def.name())?.raw())
    }

    /// Run the aggregation steps for one style at `luminosity`.
    pub fn view(&self, opt: &PlotOpt, luminosity: f64) -> Result<Hist1DView> {
        let prepare = |c: &SingleHist| -> Histogram {
            let mut h = c.raw.clone();
            match opt.overflow {
                OverflowType::None => {}
                OverflowType::Underflow => h.merge_underflow(),
                OverflowType::Overflow => h.merge_overflow(),
                OverflowType::Both => {
                    h.merge_underflow();
                    h.merge_overflow();
                }
            }
            h.adjust_density_for_bin_width();
            if c.process.kind().is_lumi_scaled() {
                h.scale(luminosity);
            }
            h
        };
        let mut data: Vec<Histogram> = self.components.data.iter().map(&prepare).collect();
        let mut bkgs: Vec<Histogram> = self.components.background.iter().map(&prepare).collect();
        let mut sigs: Vec<Histogram> = self.components.signal.iter().map(&prepare).collect();

        let stacked = opt.backgrounds_stacked();
        if stacked {
            for i in (0..bkgs.len().saturating_sub(1)).rev() {
                let (head, tail) = bkgs.split_at_mut(i + 1);
                head[i].add(&tail[0])?;
            }
        }

        let (mc_scale, mc_scale_error) = match opt.stack {
            StackType::DataNorm => normalize_to_data(&mut data, &mut bkgs),
            StackType::Shapes => {
                for h in data.iter_mut().chain(bkgs.iter_mut()).chain(sigs.iter_mut()) {
                    h.normalize_to(100.0);
                }
                (1.0, 0.0)
            }
            _ => (1.0, 0.0),
        };

        let annotate = |h: &Histogram, below: Option<&Histogram>| -> Result<(f64, f64)> {
            let mut marginal = h.clone();
            if let Some(below) = below {
                marginal.subtract(below)?;
            }
            Ok((marginal.count(), marginal.mean()))
        };

        let mut drawn_bkgs = Vec::with_capacity(bkgs.len());
        for (i, h) in bkgs.iter().enumerate() {
            let below = if stacked { bkgs.get(i + 1) } else { None };
            let (y, m) = annotate(h, below)?;
            drawn_bkgs.push(self.drawn(&self.components.background[i].process, h.clone(), y, m, opt));
        }
        let mut drawn_data = Vec::with_capacity(data.len());
        for (c, h) in self.components.data.iter().zip(data) {
            let (y, m) = annotate(&h, None)?;
            drawn_data.push(self.drawn(&c.process, h, y, m, opt));
        }
        let mut drawn_sigs = Vec::with_capacity(sigs.len());
        for (c, mut h) in self.components.signal.iter().zip(sigs) {
            let (y, m) = annotate(&h, None)?;
            if opt.stack == StackType::SignalOnTop {
                if let Some(total) = bkgs.first() {
                    h.add(total)?;
                }
            }
            drawn_sigs.push(self.drawn(&c.process, h, y, m, opt));
        }

        let reference = drawn_bkgs.first().or(drawn_data.first()).or(drawn_sigs.first());
        let band = reference.map(|r| envelope(&r.hist));

        let bottom = match opt.bottom {
            BottomType::Off => None,
            kind => Some(self.bottom_pane(kind, opt, &drawn_data, &drawn_bkgs, &drawn_sigs)?),
        };

        let mut view = Hist1DView {
            data: drawn_data,
            backgrounds: drawn_bkgs,
            signals: drawn_sigs,
            mc_scale,
            mc_scale_error,
            band,
            bottom,
            y_min: 0.0,
            y_max: 1.0,
        };
        let (lo, hi) = y_range(&view, opt);
        view.y_min = lo;
        view.y_max = hi;
        Ok(view)
    }

    fn drawn(&self, p: &Arc<Process>, hist: Histogram, yield_value: f64, mean: f64, opt: &PlotOpt) -> DrawnHist {
        let mut label = p.name().to_string();
        if opt.annotate_legend {
            if opt.annotates_mean() {
                label.push_str(&format!(" [#mu={}]", fixed_digits(mean, 3)));
            } else {
                let digits = if yield_value >= 1.0 { 2 } else { 1 };
                label.push_str(&format!(" [N={}]", fixed_digits(yield_value, digits)));
            }
        }
        DrawnHist {
            name: p.name().to_string(),
            kind: p.kind(),
            color: p.style().color,
            hist,
            yield_value,
            mean,
            label,
        }
    }

    fn bottom_pane(
        &self,
        kind: BottomType,
        opt: &PlotOpt,
        data: &[DrawnHist],
        bkgs: &[DrawnHist],
        sigs: &[DrawnHist],
    ) -> Result<BottomPane> {
        let reference = bkgs.first().or(data.first()).or(sigs.first()).ok_or_else(|| {
            Error::Config(format!(
                "figure '{}': no histograms available for the {} pane",
                self.def.name(),
                kind
            ))
        })?;
        let mut denom = reference.hist.clone();
        denom.zero_errors();

        let stacked = opt.backgrounds_stacked();
        let mut compared: Vec<&DrawnHist> = Vec::new();
        if stacked {
            compared.extend(bkgs.first());
        } else {
            compared.extend(bkgs);
        }
        compared.extend(data);
        if !stacked {
            compared.extend(sigs);
        }

        let apply = |h: &Histogram| -> Result<Histogram> {
            let mut out = h.clone();
            match kind {
                BottomType::Ratio => out.divide(&denom)?,
                _ => out.subtract(&denom)?,
            }
            Ok(out)
        };

        let band_hist = apply(&reference.hist)?;
        let band = envelope(&band_hist);

        let mut entries = Vec::new();
        for h in compared.into_iter().filter(|h| !std::ptr::eq(*h, reference)) {
            entries.push((h.name.clone(), apply(&h.hist)?));
        }

        let (y_min, y_max) = if kind == BottomType::Ratio {
            (opt.ratio_minimum, opt.ratio_maximum)
        } else {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for (i, c) in band_hist.bin_content.iter().enumerate() {
                lo = lo.min(band.lo[i]).min(*c);
                hi = hi.max(band.hi[i]).max(*c);
            }
            for (_, h) in &entries {
                lo = lo.min(h.min_with_errors(true));
                hi = hi.max(h.max_with_errors(true));
            }
            (lo, hi)
        };

        Ok(BottomPane { kind, reference: reference.name.clone(), band, entries, y_min, y_max })
    }

    fn artifact(&self, view: &Hist1DView, opt: &PlotOpt, luminosity: f64) -> Result<Hist1DArtifact> {
        let series = |hs: &[DrawnHist]| -> Vec<SeriesArtifact> {
            hs.iter()
                .map(|h| SeriesArtifact {
                    name: h.name.clone(),
                    kind: h.kind,
                    color: format!("#{:06x}", h.color),
                    label: h.label.clone(),
                    y: h.hist.bin_content.clone(),
                    yerr: h.hist.errors(),
                    yield_value: h.yield_value,
                    mean: h.mean,
                })
                .collect()
        };
        let bottom = view.bottom.as_ref().map(|b| BottomArtifact {
            kind: b.kind,
            reference: b.reference.clone(),
            band: b.band.clone(),
            series: b
                .entries
                .iter()
                .map(|(name, h)| RatioSeries {
                    name: name.clone(),
                    y: h.bin_content.clone(),
                    yerr: h.errors(),
                    y_display: h
                        .bin_content
                        .iter()
                        .map(|v| v.clamp(b.y_min, b.y_max))
                        .collect(),
                })
                .collect(),
            y_min: b.y_min,
            y_max: b.y_max,
        });
        Ok(Hist1DArtifact {
            schema_version: "hepplot_hist1d_v1".to_string(),
            meta: ArtifactMeta::now(luminosity)?,
            name: self.def.name(),
            style: opt.type_string(),
            options: opt.clone(),
            x_title: self.def.x_title.clone(),
            y_title: self.def.y_title(opt),
            bin_edges: self.def.edges.clone(),
            data: series(&view.data),
            backgrounds: series(&view.backgrounds),
            signals: series(&view.signals),
            mc_scale: (opt.stack == StackType::DataNorm)
                .then_some(ScaleArtifact { value: view.mc_scale, error: view.mc_scale_error }),
            background_band: view.band.clone(),
            bottom,
            y_min: view.y_min,
            y_max: view.y_max,
        })
    }

    /// Path of the artifact of one style below `out_dir`.
    pub fn artifact_path(&self, opt: &PlotOpt, out_dir: &Path) -> PathBuf {
        out_dir.join("plots").join(format!("{}__{}.json", self.def.name(), opt.type_string()))
    }
}

impl Figure for Hist1D {
    fn name(&self) -> String {
        self.def.name()
    }

    fn processes(&self) -> Vec<Arc<Process>> {
        self.components.processes()
    }

    fn components_mut(&mut self) -> Vec<&mut dyn FigureComponent> {
        self.components.as_dyn_mut()
    }

    fn component(&self, process: &Arc<Process>) -> Result<&dyn FigureComponent> {
        let c: &dyn FigureComponent = self.components.get(process, &self.def.name())?;
        Ok(c)
    }

    fn print(&self, luminosity: f64, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.def.styles.len());
        for opt in &self.def.styles {
            let view = self.view(opt, luminosity).map_err(|e| e.context(format!("figure '{}'", self.name())))?;
            if opt.print_vals {
                log_bin_values(&self.name(), &view);
            }
            let path = self.artifact_path(opt, out_dir);
            write_json(&path, &self.artifact(&view, opt, luminosity)?)?;
            log::debug!("wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Serialize)]
struct Hist1DArtifact {
    schema_version: String,
    meta: ArtifactMeta,
    name: String,
    style: String,
    options: PlotOpt,
    x_title: String,
    y_title: String,
    bin_edges: Vec<f64>,
    data: Vec<SeriesArtifact>,
    backgrounds: Vec<SeriesArtifact>,
    signals: Vec<SeriesArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mc_scale: Option<ScaleArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    background_band: Option<BandEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bottom: Option<BottomArtifact>,
    y_min: f64,
    y_max: f64,
}

#[derive(Debug, Clone, Serialize)]
struct SeriesArtifact {
    name: String,
    kind: ProcessKind,
    color: String,
    label: String,
    y: Vec<f64>,
    yerr: Vec<f64>,
    #[serde(rename = "yield")]
    yield_value: f64,
    mean: f64,
}

#[derive(Debug, Clone, Serialize)]
struct ScaleArtifact {
    value: f64,
    error: f64,
}

#[derive(Debug, Clone, Serialize)]
struct BottomArtifact {
    kind: BottomType,
    reference: String,
    band: BandEnvelope,
    series: Vec<RatioSeries>,
    y_min: f64,
    y_max: f64,
}

#[derive(Debug, Clone, Serialize)]
struct RatioSeries {
    name: String,
    y: Vec<f64>,
    yerr: Vec<f64>,
    y_display: Vec<f64>,
}

/// Scale backgrounds by data/MC and every data histogram to the leading one.
fn normalize_to_data(data: &mut [Histogram], bkgs: &mut [Histogram]) -> (f64, f64) {
    let (Some(d0), Some(b0)) = (data.first(), bkgs.first()) else {
        return (1.0, 0.0);
    };
    let (data_norm, data_err) = d0.integral_and_error(true);
    let (mc_norm, mc_err) = b0.integral_and_error(true);
    if mc_norm == 0.0 || !mc_norm.is_finite() {
        log::warn!("background stack has zero integral; data normalization skipped");
        return (1.0, 0.0);
    }
    let scale = data_norm / mc_norm;
    let scale_err = (data_norm * mc_err).hypot(mc_norm * data_err) / (mc_norm * mc_norm);
    for h in bkgs.iter_mut() {
        h.scale(scale);
    }
    for h in data.iter_mut() {
        let (own, _) = h.integral_and_error(true);
        h.scale(if own == 0.0 { 1.0 } else { data_norm / own });
    }
    (scale, scale_err)
}

fn envelope(h: &Histogram) -> BandEnvelope {
    let errs = h.errors();
    let mut lo = Vec::with_capacity(errs.len());
    let mut hi = Vec::with_capacity(errs.len());
    for (c, e) in h.bin_content.iter().zip(errs) {
        lo.push(c - e);
        hi.push(c + e);
    }
    BandEnvelope { lo, hi }
}

fn max_below(h: &Histogram, bound: f64, with_errors: bool) -> f64 {
    let errs = h.errors();
    h.bin_content
        .iter()
        .zip(errs)
        .map(|(c, e)| if with_errors { c + e } else { *c })
        .filter(|v| *v < bound)
        .fold(f64::NEG_INFINITY, f64::max)
}

fn min_above(h: &Histogram, bound: f64, with_errors: bool) -> f64 {
    let errs = h.errors();
    h.bin_content
        .iter()
        .zip(errs)
        .map(|(c, e)| if with_errors { c - e.abs() } else { *c })
        .filter(|v| *v > bound)
        .fold(f64::INFINITY, f64::min)
}

/// Highest drawn point below `bound`: backgrounds with their band if enabled,
/// signals without errors, data always with errors.
pub fn max_draw(view: &Hist1DView, opt: &PlotOpt, bound: f64) -> f64 {
    let bkg = view.backgrounds.iter().map(|h| max_below(&h.hist, bound, opt.show_background_error));
    let sig = view.signals.iter().map(|h| max_below(&h.hist, bound, false));
    let dat = view.data.iter().map(|h| max_below(&h.hist, bound, true));
    bkg.chain(sig).chain(dat).fold(f64::NEG_INFINITY, f64::max)
}

/// Lowest drawn point above `bound`, with the same error conventions as
/// [`max_draw`].
pub fn min_draw(view: &Hist1DView, opt: &PlotOpt, bound: f64) -> f64 {
    let bkg = view.backgrounds.iter().map(|h| min_above(&h.hist, bound, opt.show_background_error));
    let sig = view.signals.iter().map(|h| min_above(&h.hist, bound, false));
    let dat = view.data.iter().map(|h| min_above(&h.hist, bound, true));
    bkg.chain(sig).chain(dat).fold(f64::INFINITY, f64::min)
}

fn y_range(view: &Hist1DView, opt: &PlotOpt) -> (f64, f64) {
    let the_max = max_draw(view, opt, f64::INFINITY);
    let the_min = min_draw(view, opt, 0.0);
    let ratio = 1.0 / (1.0 - opt.legend_fraction);
    match opt.y_axis {
        YAxisType::Linear => {
            let bottom = if the_min.is_finite() && the_min < 0.0 { the_min } else { 0.0 };
            let top = if the_max.is_finite() && the_max > bottom {
                bottom + ratio * (the_max - bottom)
            } else {
                bottom + 1.0
            };
            (bottom, top)
        }
        YAxisType::Log => {
            let bottom = if the_min.is_finite() && the_min > opt.log_minimum { the_min } else { opt.log_minimum };
            let top = if the_max.is_finite() && the_max > bottom {
                (bottom.ln() + ratio * (the_max.ln() - bottom.ln())).exp()
            } else {
                bottom * 10.0
            };
            (bottom, top)
        }
    }
}

fn log_bin_values(name: &str, view: &Hist1DView) {
    let (Some(data), Some(mc)) = (view.data.first(), view.backgrounds.first()) else {
        return;
    };
    let (d, _) = data.hist.integral_and_error(false);
    let (m, _) = mc.hist.integral_and_error(false);
    log::info!("{name}: data = {d:.1}, MC = {m:.1}, data/MC = {:.3}", if m == 0.0 { 0.0 } else { d / m });
    for i in 0..data.hist.n_bins() {
        log::info!(
            "bin [{}, {}): data = {:.1} +- {:.1}, MC = {:.1} +- {:.1}",
            data.hist.bin_edges[i],
            data.hist.bin_edges[i + 1],
            data.hist.bin_content[i],
            data.hist.bin_error(i),
            mc.hist.bin_content[i],
            mc.hist.bin_error(i),
        );
    }
}

/// Shortest of up to four decimals, trailing zeros dropped.
fn compact(value: f64) -> String {
    let s = format!("{value:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

/// `value` rounded to `digits` significant digits (never fewer than zero decimals).
pub(crate) fn fixed_digits(value: f64, digits: i32) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{value}");
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (digits - 1 - magnitude).max(0) as usize;
    format!("{value:.decimals$}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hp_event::{ColumnSet, ColumnSource, EventSource};

    fn process(name: &str, kind: ProcessKind) -> Arc<Process> {
        let src: Arc<dyn EventSource> =
            Arc::new(ColumnSource::new(name, ColumnSet::new().with_scalar("x", vec![])).unwrap());
        Process::new(name, kind, 0x336699, src, NamedFunc::constant(1.0))
    }

    fn figure(processes: &[Arc<Process>], styles: Vec<PlotOpt>) -> Hist1D {
        let def = HistoDef::uniform(
            3,
            0.0,
            3.0,
            NamedFunc::scalar_field("x"),
            NamedFunc::constant(1.0),
            NamedFunc::constant(1.0),
            styles,
        );
        Hist1D::new(def, processes).unwrap()
    }

    fn set(fig: &mut Hist1D, p: &Arc<Process>, contents: &[f64]) {
        let c = fig.components.iter_mut().find(|c| Arc::ptr_eq(&c.process, p)).unwrap();
        for (i, v) in contents.iter().enumerate() {
            c.raw.fill(i as f64 + 0.5, *v);
            c.raw.sumw2[i] = *v;
        }
    }

    #[test]
    fn fixed_digit_formatting() {
        assert_eq!(fixed_digits(40.0, 2), "40");
        assert_eq!(fixed_digits(3.14159, 3), "3.14");
        assert_eq!(fixed_digits(0.26, 1), "0.3");
        assert_eq!(fixed_digits(1234.4, 2), "1234");
        assert_eq!(compact(12.5), "12.5");
        assert_eq!(compact(40.0), "40");
    }

    #[test]
    fn names_use_canonical_pieces() {
        let def = HistoDef::uniform(
            4,
            0.0,
            4.0,
            NamedFunc::scalar_field("njets"),
            NamedFunc::scalar_field("ht").greater(500.0),
            NamedFunc::scalar_field("w"),
            vec![],
        )
        .tag("sr");
        assert_eq!(def.name(), "sr__njets__ht_GTR_500__w");
        assert_eq!(def.y_title(&PlotOpt::new()), "Entries");
        let def = def.axis("H_{T}", "GeV");
        assert_eq!(def.y_title(&PlotOpt::new().stack(StackType::Shapes)), "% entries/(1 GeV)");
    }

    #[test]
    fn stacking_and_marginal_yields() {
        let a = process("a", ProcessKind::Background);
        let b = process("b", ProcessKind::Background);
        let c = process("c", ProcessKind::Background);
        let mut fig = figure(&[a.clone(), b.clone(), c.clone()], vec![]);
        set(&mut fig, &a, &[1.0, 2.0, 3.0]);
        set(&mut fig, &b, &[4.0, 5.0, 6.0]);
        set(&mut fig, &c, &[7.0, 8.0, 9.0]);
        let view = fig.view(&PlotOpt::new(), 1.0).unwrap();
        assert_eq!(view.backgrounds[0].hist.bin_content, vec![12.0, 15.0, 18.0]);
        assert_eq!(view.backgrounds[1].hist.bin_content, vec![11.0, 13.0, 15.0]);
        assert_relative_eq!(view.backgrounds[0].yield_value, 6.0, epsilon = 1e-12);
        assert_relative_eq!(view.backgrounds[1].yield_value, 15.0, epsilon = 1e-12);
        assert_relative_eq!(view.backgrounds[2].yield_value, 24.0, epsilon = 1e-12);
        assert_eq!(view.backgrounds[0].label, "a [N=6.0]");
    }

    #[test]
    fn lumi_shapes_are_not_stacked() {
        let a = process("a", ProcessKind::Background);
        let b = process("b", ProcessKind::Background);
        let mut fig = figure(&[a.clone(), b.clone()], vec![]);
        set(&mut fig, &a, &[1.0, 1.0, 2.0]);
        set(&mut fig, &b, &[4.0, 0.0, 0.0]);
        let opt = PlotOpt::new().stack(StackType::LumiShapes);
        let view = fig.view(&opt, 2.0).unwrap();
        assert_eq!(view.backgrounds[0].hist.bin_content, vec![2.0, 2.0, 4.0]);
        assert!(view.backgrounds[0].label.contains("[#mu="));
    }

    #[test]
    fn data_is_never_lumi_scaled() {
        let d = process("data", ProcessKind::Data);
        let s = process("sig", ProcessKind::Signal);
        let mut fig = figure(&[d.clone(), s.clone()], vec![]);
        set(&mut fig, &d, &[1.0, 2.0, 3.0]);
        set(&mut fig, &s, &[1.0, 2.0, 3.0]);
        let view = fig.view(&PlotOpt::new(), 10.0).unwrap();
        assert_eq!(view.data[0].hist.bin_content, vec![1.0, 2.0, 3.0]);
        assert_eq!(view.signals[0].hist.bin_content, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn signal_on_top_does_not_change_yields() {
        let b = process("bkg", ProcessKind::Background);
        let s = process("sig", ProcessKind::Signal);
        let mut fig = figure(&[b.clone(), s.clone()], vec![]);
        set(&mut fig, &b, &[10.0, 10.0, 10.0]);
        set(&mut fig, &s, &[1.0, 2.0, 3.0]);
        let view = fig.view(&PlotOpt::new().stack(StackType::SignalOnTop), 1.0).unwrap();
        assert_eq!(view.signals[0].hist.bin_content, vec![11.0, 12.0, 13.0]);
        assert_relative_eq!(view.signals[0].yield_value, 6.0, epsilon = 1e-12);
        assert_relative_eq!(view.backgrounds[0].yield_value, 30.0, epsilon = 1e-12);
    }

    #[test]
    fn shapes_normalize_to_one_hundred() {
        let b = process("bkg", ProcessKind::Background);
        let d = process("data", ProcessKind::Data);
        let mut fig = figure(&[b.clone(), d.clone()], vec![]);
        set(&mut fig, &b, &[3.0, 1.0, 0.5]);
        set(&mut fig, &d, &[7.0, 0.0, 2.0]);
        let view = fig.view(&PlotOpt::new().stack(StackType::Shapes), 3.0).unwrap();
        assert_relative_eq!(view.backgrounds[0].hist.integral(), 100.0, epsilon = 1e-9);
        assert_relative_eq!(view.data[0].hist.integral(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn data_norm_scales_backgrounds() {
        let d = process("data", ProcessKind::Data);
        let a = process("a", ProcessKind::Background);
        let b = process("b", ProcessKind::Background);
        let mut fig = figure(&[d.clone(), a.clone(), b.clone()], vec![]);
        set(&mut fig, &d, &[40.0, 40.0, 40.0]);
        set(&mut fig, &a, &[10.0, 10.0, 5.0]);
        set(&mut fig, &b, &[10.0, 10.0, 15.0]);
        let view = fig.view(&PlotOpt::new().stack(StackType::DataNorm), 1.0).unwrap();
        assert_relative_eq!(view.mc_scale, 2.0, epsilon = 1e-12);
        assert!(view.mc_scale_error > 0.0);
        assert_relative_eq!(view.backgrounds[0].hist.integral(), 120.0, epsilon = 1e-9);
        assert_relative_eq!(view.backgrounds[1].yield_value, 70.0, epsilon = 1e-9);
        assert_relative_eq!(view.data[0].hist.integral(), 120.0, epsilon = 1e-9);
    }

    #[test]
    fn data_norm_with_empty_stack_is_neutral() {
        let d = process("data", ProcessKind::Data);
        let a = process("a", ProcessKind::Background);
        let mut fig = figure(&[d.clone(), a.clone()], vec![]);
        set(&mut fig, &d, &[3.0, 0.0, 0.0]);
        let view = fig.view(&PlotOpt::new().stack(StackType::DataNorm), 1.0).unwrap();
        assert_eq!(view.mc_scale, 1.0);
        assert_eq!(view.data[0].hist.bin_content, vec![3.0, 0.0, 0.0]);
    }

    #[test]
    fn flow_handling_per_style() {
        let b = process("bkg", ProcessKind::Background);
        let mut fig = figure(&[b.clone()], vec![]);
        {
            let c = fig.components.background.iter_mut().next().unwrap();
            c.raw.fill(-1.0, 2.0);
            c.raw.fill(1.5, 1.0);
            c.raw.fill(7.0, 3.0);
        }
        let both = fig.view(&PlotOpt::new(), 1.0).unwrap();
        assert_eq!(both.backgrounds[0].hist.bin_content, vec![2.0, 1.0, 3.0]);
        let under = fig.view(&PlotOpt::new().overflow(OverflowType::Underflow), 1.0).unwrap();
        assert_eq!(under.backgrounds[0].hist.bin_content, vec![2.0, 1.0, 0.0]);
        let none = fig.view(&PlotOpt::new().overflow(OverflowType::None), 1.0).unwrap();
        assert_eq!(none.backgrounds[0].hist.bin_content, vec![0.0, 1.0, 0.0]);
        // the raw histogram is untouched by any style
        assert_eq!(fig.raw(&b).unwrap().overflow, 3.0);
    }

    #[test]
    fn ratio_pane_against_background() {
        let b = process("bkg", ProcessKind::Background);
        let d = process("data", ProcessKind::Data);
        let mut fig = figure(&[b.clone(), d.clone()], vec![]);
        set(&mut fig, &b, &[10.0, 20.0, 30.0]);
        set(&mut fig, &d, &[12.0, 18.0, 33.0]);
        let opt = PlotOpt::new().bottom(BottomType::Ratio);
        let view = fig.view(&opt, 1.0).unwrap();
        let pane = view.bottom.unwrap();
        assert_eq!(pane.reference, "bkg");
        assert_eq!(pane.entries.len(), 1);
        assert_eq!(pane.entries[0].1.bin_content, vec![1.2, 0.9, 1.1]);
        assert_eq!((pane.y_min, pane.y_max), (0.1, 1.9));
        // band is the reference's own relative error around 1
        assert_relative_eq!(pane.band.hi[0], 1.0 + 10f64.sqrt() / 10.0, epsilon = 1e-12);
    }

    #[test]
    fn diff_pane_falls_back_to_data() {
        let d1 = process("d1", ProcessKind::Data);
        let d2 = process("d2", ProcessKind::Data);
        let mut fig = figure(&[d1.clone(), d2.clone()], vec![]);
        set(&mut fig, &d1, &[5.0, 5.0, 5.0]);
        set(&mut fig, &d2, &[6.0, 4.0, 5.0]);
        let view = fig.view(&PlotOpt::new().bottom(BottomType::Diff), 1.0).unwrap();
        let pane = view.bottom.unwrap();
        assert_eq!(pane.reference, "d1");
        assert_eq!(pane.entries[0].0, "d2");
        assert_eq!(pane.entries[0].1.bin_content, vec![1.0, -1.0, 0.0]);
    }

    #[test]
    fn bottom_pane_without_histograms_is_an_error() {
        let fig = figure(&[], vec![]);
        let err = fig.view(&PlotOpt::new().bottom(BottomType::Ratio), 1.0).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(fig.view(&PlotOpt::new(), 1.0).is_ok());
    }

    #[test]
    fn drawn_range_leaves_room_for_legend() {
        let b = process("bkg", ProcessKind::Background);
        let d = process("data", ProcessKind::Data);
        let mut fig = figure(&[b.clone(), d.clone()], vec![]);
        set(&mut fig, &b, &[10.0, 20.0, 30.0]);
        set(&mut fig, &d, &[12.0, 18.0, 36.0]);
        let opt = PlotOpt::new().show_background_error(false);
        let view = fig.view(&opt, 1.0).unwrap();
        let top = 36.0 + 6.0;
        assert_relative_eq!(max_draw(&view, &opt, f64::INFINITY), top, epsilon = 1e-12);
        assert_relative_eq!(max_draw(&view, &opt, 31.0), 30.0, epsilon = 1e-12);
        assert_eq!(view.y_min, 0.0);
        assert_relative_eq!(view.y_max, top / 0.7, epsilon = 1e-9);

        let log = fig.view(&opt.clone().y_axis(YAxisType::Log), 1.0).unwrap();
        assert_relative_eq!(log.y_min, 12.0 - 12f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn unregistered_process_lookup_fails() {
        let a = process("a", ProcessKind::Background);
        let twin = process("a", ProcessKind::Background);
        let fig = figure(&[a.clone()], vec![]);
        assert!(fig.component(&a).is_ok());
        let err = fig.component(&twin).err().unwrap();
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let a = process("a", ProcessKind::Signal);
        let def = HistoDef::uniform(
            1,
            0.0,
            1.0,
            NamedFunc::constant(0.5),
            NamedFunc::constant(1.0),
            NamedFunc::constant(1.0),
            vec![],
        );
        assert!(Hist1D::new(def, &[a.clone(), a]).is_err());
    }
}
