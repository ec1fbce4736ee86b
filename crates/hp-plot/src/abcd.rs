//! ABCD background prediction.
//!
//! A method is a set of planes (e.g. MET ranges), each split into bins (e.g.
//! jet and b-tag multiplicities), each bin split into four regions by two
//! roughly uncorrelated variables. With `R1..R4` the yields of the four
//! regions, the background in `R4` is predicted as `R2·R3/R1` from data,
//! corrected by `κ = (R1·R4)/(R2·R3)` from simulation.
//!
//! Region cuts may contain two placeholders. `{bin}` is replaced by the cut
//! of the current bin. `{all_bins}` is replaced by the OR of all bin cuts of
//! the plane when bins are integrated, otherwise by the current bin's cut.

use std::sync::Arc;

use hp_core::{Error, ProcessKind, Result};
use hp_event::{NamedFunc, Process, Schema};
use hp_prob::{
    GammaParams, KappaOptions, KappaResult, KappaTerm, SignificanceOptions, calc_kappa,
    significance_with,
};
use serde::Serialize;

use crate::table::{Table, TableRow};

/// Number of regions per bin.
pub const N_REGIONS: usize = 4;

const BIN_TOKEN: &str = "{bin}";
const ALL_BINS_TOKEN: &str = "{all_bins}";

/// Toy settings of [`AbcdMethod::predict`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AbcdOptions {
    /// Kappa and prediction toys.
    pub kappa: KappaOptions,
    /// Significance toys.
    pub significance: SignificanceOptions,
}

/// Cut strings of an ABCD method.
#[derive(Debug, Clone)]
pub struct AbcdMethod {
    name: String,
    plane_cuts: Vec<String>,
    bin_cuts: Vec<Vec<String>>,
    abcd_cuts: Vec<String>,
    base_cut: String,
    integrate_bins: bool,
    signal_planes: Vec<bool>,
    all_cuts: Vec<String>,
}

/// Prediction for one bin.
#[derive(Debug, Clone, Serialize)]
pub struct AbcdPrediction {
    /// Method name.
    pub method: String,
    /// Plane index.
    pub plane: usize,
    /// Bin index within the plane.
    pub bin: usize,
    /// Simulated background per region, at the requested luminosity.
    pub mc: [f64; N_REGIONS],
    /// Observed yields per region, when the table has data.
    pub data: Option<[f64; N_REGIONS]>,
    /// Closure factor from simulation.
    pub kappa: KappaResult,
    /// Predicted background in region 4.
    pub prediction: KappaResult,
    /// Signal yields in region 4.
    pub signals: Vec<SignalYield>,
    /// Significance of the observed region-4 yield, on signal planes with data.
    pub significance: Option<f64>,
}

/// Signal yield in the predicted region.
#[derive(Debug, Clone, Serialize)]
pub struct SignalYield {
    /// Process name.
    pub name: String,
    /// Yield at the requested luminosity.
    pub value: f64,
}

impl AbcdMethod {
    /// Method with the same bins in every plane.
    pub fn new(
        name: impl Into<String>,
        plane_cuts: Vec<String>,
        bin_cuts: Vec<String>,
        abcd_cuts: Vec<String>,
        base_cut: impl Into<String>,
    ) -> Result<Self> {
        let per_plane = vec![bin_cuts; plane_cuts.len()];
        Self::with_bins_per_plane(name, plane_cuts, per_plane, abcd_cuts, base_cut)
    }

    /// Method with its own bins in each plane.
    pub fn with_bins_per_plane(
        name: impl Into<String>,
        plane_cuts: Vec<String>,
        bin_cuts: Vec<Vec<String>>,
        abcd_cuts: Vec<String>,
        base_cut: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        if abcd_cuts.len() != N_REGIONS {
            return Err(Error::Config(format!(
                "ABCD method '{name}' needs {N_REGIONS} region cuts, got {}",
                abcd_cuts.len()
            )));
        }
        if plane_cuts.is_empty() {
            return Err(Error::Config(format!("ABCD method '{name}' has no planes")));
        }
        if bin_cuts.len() != plane_cuts.len() {
            return Err(Error::Config(format!(
                "ABCD method '{name}': {} planes but bins for {}",
                plane_cuts.len(),
                bin_cuts.len()
            )));
        }
        if let Some(i) = bin_cuts.iter().position(Vec::is_empty) {
            return Err(Error::Config(format!("ABCD method '{name}': plane {i} has no bins")));
        }
        let signal_planes = vec![true; plane_cuts.len()];
        let mut out = Self {
            name,
            plane_cuts,
            bin_cuts,
            abcd_cuts,
            base_cut: base_cut.into(),
            integrate_bins: true,
            signal_planes,
            all_cuts: Vec::new(),
        };
        out.serialize_cuts();
        Ok(out)
    }

    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of planes.
    pub fn n_planes(&self) -> usize {
        self.plane_cuts.len()
    }

    /// Number of bins in `plane`.
    pub fn n_bins(&self, plane: usize) -> Result<usize> {
        self.bin_cuts
            .get(plane)
            .map(Vec::len)
            .ok_or_else(|| self.plane_error(plane))
    }

    /// Whether `{all_bins}` integrates over the bins of a plane.
    pub fn set_integrate_bins(&mut self, on: bool) {
        self.integrate_bins = on;
        self.serialize_cuts();
    }

    /// Mark planes before `first` as background-only.
    ///
    /// `first == 0` makes every plane background-only. A `first` beyond the
    /// last plane leaves the current assignment untouched.
    pub fn set_first_signal_plane(&mut self, first: usize) {
        let n = self.plane_cuts.len();
        if first >= n {
            log::warn!(
                "first signal plane {first} requested but method '{}' has {n} planes; keeping all planes as signal",
                self.name
            );
            return;
        }
        let last_background = if first == 0 { n - 1 } else { first - 1 };
        for flag in &mut self.signal_planes[..=last_background] {
            *flag = false;
        }
    }

    /// Whether `plane` may contain signal.
    pub fn is_signal_plane(&self, plane: usize) -> bool {
        self.signal_planes.get(plane).copied().unwrap_or(false)
    }

    fn serialize_cuts(&mut self) {
        let mut all = Vec::new();
        for (plane, bins) in self.plane_cuts.iter().zip(&self.bin_cuts) {
            let integrated = format!("(({}))", bins.join(")||("));
            for bin in bins {
                let all_bins = if self.integrate_bins && bins.len() > 1 { integrated.as_str() } else { bin.as_str() };
                for region in &self.abcd_cuts {
                    let mut cut = String::new();
                    if !self.base_cut.is_empty() {
                        cut.push_str(&self.base_cut);
                        cut.push_str(" && ");
                    }
                    cut.push_str(plane);
                    cut.push_str(" && ");
                    cut.push_str(region);
                    all.push(cut.replace(ALL_BINS_TOKEN, all_bins).replace(BIN_TOKEN, bin));
                }
            }
        }
        self.all_cuts = all;
    }

    /// Position of one region in [`all_cuts`](Self::all_cuts).
    pub fn index_bin(&self, plane: usize, bin: usize, region: usize) -> Result<usize> {
        if plane >= self.plane_cuts.len() {
            return Err(self.plane_error(plane));
        }
        let n_bins = self.bin_cuts[plane].len();
        if bin >= n_bins {
            return Err(Error::Config(format!(
                "bin {bin} out of range: plane {plane} of '{}' has {n_bins} bins",
                self.name
            )));
        }
        if region >= N_REGIONS {
            return Err(Error::Config(format!("region {region} out of range (0..{N_REGIONS})")));
        }
        let before: usize = self.bin_cuts[..plane].iter().map(|b| b.len() * N_REGIONS).sum();
        Ok(before + bin * N_REGIONS + region)
    }

    /// Full cut of one region.
    pub fn region_cut(&self, plane: usize, bin: usize, region: usize) -> Result<&str> {
        let i = self.index_bin(plane, bin, region)?;
        Ok(&self.all_cuts[i])
    }

    /// Full cuts of every region, plane-major.
    pub fn all_cuts(&self) -> &[String] {
        &self.all_cuts
    }

    /// One table row per region, in [`all_cuts`](Self::all_cuts) order.
    pub fn table_rows(&self, schema: &Schema) -> Result<Vec<TableRow>> {
        let mut rows = Vec::with_capacity(self.all_cuts.len());
        for (plane, bins) in self.bin_cuts.iter().enumerate() {
            for bin in 0..bins.len() {
                for region in 0..N_REGIONS {
                    let text = &self.all_cuts[rows.len()];
                    let cut = NamedFunc::parse(text, schema)
                        .map_err(|e| e.context(format!("ABCD method '{}'", self.name)))?;
                    rows.push(TableRow::new(format!("plane {plane} bin {bin} R{}", region + 1), cut));
                }
            }
        }
        Ok(rows)
    }

    /// Yield table over every region.
    pub fn table(
        &self,
        name: impl Into<String>,
        processes: &[Arc<Process>],
        weight: NamedFunc,
        schema: &Schema,
    ) -> Result<Table> {
        Table::new(name, self.table_rows(schema)?, processes, weight, false)
    }

    /// Predict the background in region 4 of one bin from a filled table
    /// built by [`table`](Self::table).
    ///
    /// Without data the simulated totals stand in for the observed counts and
    /// no significance is computed.
    pub fn predict(
        &self,
        table: &Table,
        plane: usize,
        bin: usize,
        luminosity: f64,
        opts: &AbcdOptions,
    ) -> Result<AbcdPrediction> {
        if table.rows().len() != self.all_cuts.len() {
            return Err(Error::Config(format!(
                "table has {} rows but ABCD method '{}' has {} regions",
                table.rows().len(),
                self.name,
                self.all_cuts.len()
            )));
        }
        let rows = (0..N_REGIONS)
            .map(|r| self.index_bin(plane, bin, r))
            .collect::<Result<Vec<usize>>>()?;

        let backgrounds = table.processes_of(ProcessKind::Background);
        let mut mc_components: Vec<Vec<GammaParams>> = vec![Vec::new(); N_REGIONS];
        for p in &backgrounds {
            let yields = table.yield_of(p, luminosity)?;
            for (region, &row) in rows.iter().enumerate() {
                mc_components[region].push(yields[row]);
            }
        }
        let mc_terms = |powers: [i32; N_REGIONS]| -> Vec<KappaTerm> {
            mc_components
                .iter()
                .zip(powers)
                .map(|(c, p)| KappaTerm::mc(c.clone(), p))
                .collect()
        };
        let kappa_terms = mc_terms([1, -1, -1, 1]);
        let mc: [f64; N_REGIONS] = std::array::from_fn(|r| kappa_terms[r].yield_value());

        let data = if table.has_data() {
            let totals = table.data_yield();
            Some(std::array::from_fn(|r| totals[rows[r]].yield_value()))
        } else {
            None
        };

        let mut pred_terms: Vec<KappaTerm> = match &data {
            Some(d) => vec![KappaTerm::data(d[0], -1), KappaTerm::data(d[1], 1), KappaTerm::data(d[2], 1)],
            None => mc_components
                .iter()
                .zip([-1, 1, 1])
                .map(|(c, p)| KappaTerm::mc(c.clone(), p))
                .collect(),
        };
        pred_terms.extend(kappa_terms.iter().cloned());

        let kappa = calc_kappa(&kappa_terms, &opts.kappa)?;
        let prediction = calc_kappa(&pred_terms, &opts.kappa)?;

        let signals = table
            .processes_of(ProcessKind::Signal)
            .iter()
            .map(|p| {
                let y = table.yield_of(p, luminosity)?;
                Ok(SignalYield { name: p.name().to_string(), value: y[rows[3]].yield_value() })
            })
            .collect::<Result<Vec<_>>>()?;

        let significance = match &data {
            Some(d) if self.is_signal_plane(plane) && !prediction.is_unavailable() => Some(significance_with(
                d[3],
                prediction.value,
                prediction.err_up,
                prediction.err_down,
                &opts.significance,
            )?),
            _ => None,
        };

        log::debug!(
            "{} plane {plane} bin {bin}: kappa {:.3}, prediction {:.3} +{:.3} -{:.3}",
            self.name,
            kappa.value,
            prediction.value,
            prediction.err_up,
            prediction.err_down
        );
        Ok(AbcdPrediction {
            method: self.name.clone(),
            plane,
            bin,
            mc,
            data,
            kappa,
            prediction,
            signals,
            significance,
        })
    }

    fn plane_error(&self, plane: usize) -> Error {
        Error::Config(format!(
            "plane {plane} out of range: ABCD method '{}' has {} planes",
            self.name,
            self.plane_cuts.len()
        ))
    }
}
