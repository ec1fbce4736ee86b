//! Weighted 1D histogram with explicit underflow/overflow.

use hp_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// A 1D weighted histogram.
///
/// In-range bins are `bin_content[0..n_bins]`; entries below the first edge go
/// to `underflow`, entries at or above the last edge go to `overflow`.
/// Statistical errors are carried as sums of squared weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Histogram name.
    pub name: String,
    /// Bin edges (length = n_bins + 1, strictly increasing).
    pub bin_edges: Vec<f64>,
    /// Bin contents (sum of weights per bin).
    pub bin_content: Vec<f64>,
    /// Sum of weights squared per bin.
    pub sumw2: Vec<f64>,
    /// Underflow sum of weights.
    pub underflow: f64,
    /// Overflow sum of weights.
    pub overflow: f64,
    /// Underflow sum of weights squared.
    pub underflow_sumw2: f64,
    /// Overflow sum of weights squared.
    pub overflow_sumw2: f64,
    /// Number of fill calls.
    pub entries: u64,
}

impl Histogram {
    /// Empty histogram with explicit edges.
    pub fn new(name: impl Into<String>, bin_edges: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if bin_edges.len() < 2 {
            return Err(Error::Validation(format!(
                "histogram '{name}' needs at least two bin edges, got {}",
                bin_edges.len()
            )));
        }
        if bin_edges.iter().any(|e| !e.is_finite()) || bin_edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::Validation(format!(
                "histogram '{name}' bin edges must be finite and strictly increasing"
            )));
        }
        let n = bin_edges.len() - 1;
        Ok(Self {
            name,
            bin_edges,
            bin_content: vec![0.0; n],
            sumw2: vec![0.0; n],
            underflow: 0.0,
            overflow: 0.0,
            underflow_sumw2: 0.0,
            overflow_sumw2: 0.0,
            entries: 0,
        })
    }

    /// Empty histogram with `n_bins` equal-width bins on `[x_min, x_max)`.
    pub fn uniform(name: impl Into<String>, n_bins: usize, x_min: f64, x_max: f64) -> Result<Self> {
        let name = name.into();
        if n_bins == 0 || !(x_max > x_min) {
            return Err(Error::Validation(format!(
                "histogram '{name}': invalid binning ({n_bins} bins on [{x_min}, {x_max}))"
            )));
        }
        let w = (x_max - x_min) / n_bins as f64;
        let mut edges: Vec<f64> = (0..n_bins).map(|i| x_min + w * i as f64).collect();
        edges.push(x_max);
        Self::new(name, edges)
    }

    /// Number of in-range bins.
    pub fn n_bins(&self) -> usize {
        self.bin_content.len()
    }

    /// Lower edge of the axis.
    pub fn x_min(&self) -> f64 {
        self.bin_edges[0]
    }

    /// Upper edge of the axis.
    pub fn x_max(&self) -> f64 {
        self.bin_edges[self.bin_edges.len() - 1]
    }

    /// Width of bin `i`.
    pub fn bin_width(&self, i: usize) -> f64 {
        self.bin_edges[i + 1] - self.bin_edges[i]
    }

    /// Center of bin `i`.
    pub fn bin_center(&self, i: usize) -> f64 {
        0.5 * (self.bin_edges[i] + self.bin_edges[i + 1])
    }

    /// Axis length divided by the number of bins.
    pub fn avg_bin_width(&self) -> f64 {
        (self.x_max() - self.x_min()) / self.n_bins() as f64
    }

    /// Statistical error of bin `i`.
    pub fn bin_error(&self, i: usize) -> f64 {
        self.sumw2[i].sqrt()
    }

    /// Per-bin statistical errors.
    pub fn errors(&self) -> Vec<f64> {
        self.sumw2.iter().map(|s| s.sqrt()).collect()
    }

    /// Whether `other` has identical binning.
    pub fn same_binning(&self, other: &Histogram) -> bool {
        self.bin_edges == other.bin_edges
    }

    fn check_binning(&self, other: &Histogram, what: &str) -> Result<()> {
        if self.same_binning(other) {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "cannot {what} histograms with different binning ('{}' vs '{}')",
                self.name, other.name
            )))
        }
    }

    /// Add one weighted entry.
    pub fn fill(&mut self, x: f64, w: f64) {
        self.entries += 1;
        let w2 = w * w;
        if !(x >= self.x_min()) {
            self.underflow += w;
            self.underflow_sumw2 += w2;
            return;
        }
        if x >= self.x_max() {
            self.overflow += w;
            self.overflow_sumw2 += w2;
            return;
        }
        let i = self.bin_edges.partition_point(|e| *e <= x) - 1;
        self.bin_content[i] += w;
        self.sumw2[i] += w2;
    }

    /// Fold the underflow into the first bin and empty it.
    pub fn merge_underflow(&mut self) {
        self.bin_content[0] += self.underflow;
        self.sumw2[0] += self.underflow_sumw2;
        self.underflow = 0.0;
        self.underflow_sumw2 = 0.0;
    }

    /// Fold the overflow into the last bin and empty it.
    pub fn merge_overflow(&mut self) {
        let last = self.n_bins() - 1;
        self.bin_content[last] += self.overflow;
        self.sumw2[last] += self.overflow_sumw2;
        self.overflow = 0.0;
        self.overflow_sumw2 = 0.0;
    }

    /// Multiply contents by `factor` (errors scale linearly, so sumw2 by `factor²`).
    pub fn scale(&mut self, factor: f64) {
        let f2 = factor * factor;
        for (c, s) in self.bin_content.iter_mut().zip(self.sumw2.iter_mut()) {
            *c *= factor;
            *s *= f2;
        }
        self.underflow *= factor;
        self.overflow *= factor;
        self.underflow_sumw2 *= f2;
        self.overflow_sumw2 *= f2;
    }

    /// Bin-by-bin sum; errors add in quadrature.
    pub fn add(&mut self, other: &Histogram) -> Result<()> {
        self.check_binning(other, "add")?;
        for i in 0..self.n_bins() {
            self.bin_content[i] += other.bin_content[i];
            self.sumw2[i] += other.sumw2[i];
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.underflow_sumw2 += other.underflow_sumw2;
        self.overflow_sumw2 += other.overflow_sumw2;
        self.entries += other.entries;
        Ok(())
    }

    /// Bin-by-bin difference; errors add in quadrature.
    pub fn subtract(&mut self, other: &Histogram) -> Result<()> {
        self.check_binning(other, "subtract")?;
        for i in 0..self.n_bins() {
            self.bin_content[i] -= other.bin_content[i];
            self.sumw2[i] += other.sumw2[i];
        }
        self.underflow -= other.underflow;
        self.overflow -= other.overflow;
        self.underflow_sumw2 += other.underflow_sumw2;
        self.overflow_sumw2 += other.overflow_sumw2;
        Ok(())
    }

    /// Bin-by-bin ratio `self / other` with uncorrelated error propagation.
    /// Bins where the denominator is zero are set to zero with zero error.
    pub fn divide(&mut self, other: &Histogram) -> Result<()> {
        self.check_binning(other, "divide")?;
        for i in 0..self.n_bins() {
            let a = self.bin_content[i];
            let b = other.bin_content[i];
            if b == 0.0 {
                self.bin_content[i] = 0.0;
                self.sumw2[i] = 0.0;
                continue;
            }
            let b2 = b * b;
            self.bin_content[i] = a / b;
            self.sumw2[i] = (self.sumw2[i] * b2 + other.sumw2[i] * a * a) / (b2 * b2);
        }
        self.underflow = 0.0;
        self.overflow = 0.0;
        self.underflow_sumw2 = 0.0;
        self.overflow_sumw2 = 0.0;
        Ok(())
    }

    /// Set every error to zero, contents unchanged.
    pub fn zero_errors(&mut self) {
        self.sumw2.iter_mut().for_each(|s| *s = 0.0);
        self.underflow_sumw2 = 0.0;
        self.overflow_sumw2 = 0.0;
    }

    /// Empty every bin, keeping name and edges.
    pub fn reset(&mut self) {
        self.bin_content.iter_mut().for_each(|c| *c = 0.0);
        self.zero_errors();
        self.underflow = 0.0;
        self.overflow = 0.0;
        self.entries = 0;
    }

    /// Sum of in-range contents.
    pub fn integral(&self) -> f64 {
        self.bin_content.iter().sum()
    }

    /// Sum of contents including under/overflow.
    pub fn integral_with_flows(&self) -> f64 {
        self.integral() + self.underflow + self.overflow
    }

    /// Integral and its error, including under/overflow.
    ///
    /// With `width`, each bin is weighted by its width (flows by the width of
    /// the adjacent edge bin).
    pub fn integral_and_error(&self, width: bool) -> (f64, f64) {
        let n = self.n_bins();
        let wi = |i: usize| if width { self.bin_width(i) } else { 1.0 };
        let mut sum = self.underflow * wi(0) + self.overflow * wi(n - 1);
        let mut var = self.underflow_sumw2 * wi(0).powi(2) + self.overflow_sumw2 * wi(n - 1).powi(2);
        for i in 0..n {
            let w = wi(i);
            sum += self.bin_content[i] * w;
            var += self.sumw2[i] * w * w;
        }
        (sum, var.sqrt())
    }

    /// Number of entries represented by the histogram: the width-weighted
    /// in-range integral divided by the average bin width.
    ///
    /// For a histogram whose contents were rescaled with
    /// [`adjust_density_for_bin_width`](Self::adjust_density_for_bin_width) this
    /// is the exact sum of the original contents, also for variable bins.
    pub fn count(&self) -> f64 {
        let sum: f64 = (0..self.n_bins()).map(|i| self.bin_content[i] * self.bin_width(i)).sum();
        sum / self.avg_bin_width()
    }

    /// Content-weighted mean of bin centers (in-range bins only).
    pub fn mean(&self) -> f64 {
        let mut sw = 0.0;
        let mut swx = 0.0;
        for i in 0..self.n_bins() {
            sw += self.bin_content[i];
            swx += self.bin_content[i] * self.bin_center(i);
        }
        if sw == 0.0 { 0.0 } else { swx / sw }
    }

    /// Rescale each bin by `avg_width / width`, turning contents into
    /// entries per average bin width. A no-op for uniform binning.
    pub fn adjust_density_for_bin_width(&mut self) {
        let avg = self.avg_bin_width();
        for i in 0..self.n_bins() {
            let f = avg / self.bin_width(i);
            self.bin_content[i] *= f;
            self.sumw2[i] *= f * f;
        }
    }

    /// Rescale so that [`count`](Self::count) equals `target`. Returns the
    /// applied factor; a zero or non-finite count leaves the histogram
    /// untouched and returns 1.
    pub fn normalize_to(&mut self, target: f64) -> f64 {
        let area = self.count();
        if area == 0.0 || !area.is_finite() {
            log::warn!("histogram '{}' has zero integral; normalization skipped", self.name);
            return 1.0;
        }
        let factor = target / area;
        self.scale(factor);
        factor
    }

    /// Largest of `content + error` (or plain content) over in-range bins.
    pub fn max_with_errors(&self, with_errors: bool) -> f64 {
        (0..self.n_bins())
            .map(|i| self.bin_content[i] + if with_errors { self.bin_error(i) } else { 0.0 })
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Smallest of `content - error` (or plain content) over in-range bins.
    pub fn min_with_errors(&self, with_errors: bool) -> f64 {
        (0..self.n_bins())
            .map(|i| self.bin_content[i] - if with_errors { self.bin_error(i) } else { 0.0 })
            .fold(f64::INFINITY, f64::min)
    }
}
