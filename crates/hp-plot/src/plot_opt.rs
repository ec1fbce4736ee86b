//! Per-style presentation switches.
//!
//! A [`PlotOpt`] selects how one style variant of a figure is aggregated:
//! stacking and normalization, flow-bin handling, the bottom pane and the
//! y-axis scale. Every enum parses from the lowercase names used in config
//! files, and [`PlotOpt::type_string`] builds the style tag used in artifact
//! file names.

use std::fmt;
use std::str::FromStr;

use hp_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::config::OptionBundle;

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal $(| $alias:literal)*),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Name used in config files and style tags.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text $(| $alias)* => Ok($name::$variant),)+
                    other => Err(Error::Config(format!(
                        "unrecognized {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum! {
    /// Stacking and normalization mode.
    StackType {
        /// Stacked backgrounds, signals drawn as outlines on their own.
        SignalOverlay => "lumi" | "signal_overlay",
        /// Stacked backgrounds, signals drawn on top of the stack.
        SignalOnTop => "signal_on_top" | "stack_signal",
        /// Stacked backgrounds normalized to the data integral.
        DataNorm => "data_norm",
        /// Unstacked, luminosity-scaled.
        LumiShapes => "lumi_shapes",
        /// Unstacked, every histogram normalized to 100.
        Shapes => "shapes",
    }
}

string_enum! {
    /// Which flow bins are folded into the edge bins.
    OverflowType {
        /// Drop both flow bins.
        None => "none",
        /// Fold the underflow into the first bin.
        Underflow => "underflow",
        /// Fold the overflow into the last bin.
        Overflow => "overflow",
        /// Fold both.
        Both => "both",
    }
}

string_enum! {
    /// Content of the bottom pane.
    BottomType {
        /// No bottom pane.
        Off => "off",
        /// Ratio to the reference histogram.
        Ratio => "ratio",
        /// Difference from the reference histogram.
        Diff => "diff",
    }
}

string_enum! {
    /// Y-axis scale.
    YAxisType {
        /// Linear axis starting at zero.
        Linear => "lin" | "linear",
        /// Logarithmic axis.
        Log => "log",
    }
}

string_enum! {
    /// Title block of the figure.
    TitleType {
        /// Cut and luminosity summary.
        Info => "info",
        /// Collaboration label, preliminary.
        Preliminary => "preliminary",
        /// Collaboration label, simulation.
        Simulation => "simulation",
        /// Collaboration label, supplementary.
        Supplementary => "supplementary",
        /// Collaboration label, final data.
        Data => "data",
    }
}

/// Options of one style variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotOpt {
    /// Stacking and normalization.
    pub stack: StackType,
    /// Flow-bin handling.
    pub overflow: OverflowType,
    /// Bottom pane.
    pub bottom: BottomType,
    /// Y-axis scale.
    pub y_axis: YAxisType,
    /// Title block.
    pub title: TitleType,
    /// Include the background error band in the drawn maximum/minimum.
    pub show_background_error: bool,
    /// Append yields or means to legend labels.
    pub annotate_legend: bool,
    /// Log per-bin data/MC comparison when printing.
    pub print_vals: bool,
    /// Lower edge of the displayed ratio range.
    pub ratio_minimum: f64,
    /// Upper edge of the displayed ratio range.
    pub ratio_maximum: f64,
    /// Smallest y value shown on a log axis.
    pub log_minimum: f64,
    /// Fraction of the pane height kept free for the legend.
    pub legend_fraction: f64,
    /// Output formats requested from the renderer.
    pub file_extensions: Vec<String>,
}

impl Default for PlotOpt {
    fn default() -> Self {
        Self {
            stack: StackType::SignalOverlay,
            overflow: OverflowType::Both,
            bottom: BottomType::Off,
            y_axis: YAxisType::Linear,
            title: TitleType::Info,
            show_background_error: true,
            annotate_legend: true,
            print_vals: false,
            ratio_minimum: 0.1,
            ratio_maximum: 1.9,
            log_minimum: 0.1,
            legend_fraction: 0.3,
            file_extensions: vec!["pdf".to_string()],
        }
    }
}

impl PlotOpt {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stacking mode.
    pub fn stack(mut self, stack: StackType) -> Self {
        self.stack = stack;
        self
    }

    /// Set the flow-bin handling.
    pub fn overflow(mut self, overflow: OverflowType) -> Self {
        self.overflow = overflow;
        self
    }

    /// Set the bottom pane.
    pub fn bottom(mut self, bottom: BottomType) -> Self {
        self.bottom = bottom;
        self
    }

    /// Set the y-axis scale.
    pub fn y_axis(mut self, y_axis: YAxisType) -> Self {
        self.y_axis = y_axis;
        self
    }

    /// Set the title block.
    pub fn title(mut self, title: TitleType) -> Self {
        self.title = title;
        self
    }

    /// Toggle the background error band in the drawn range.
    pub fn show_background_error(mut self, show: bool) -> Self {
        self.show_background_error = show;
        self
    }

    /// Toggle legend annotations.
    pub fn annotate_legend(mut self, annotate: bool) -> Self {
        self.annotate_legend = annotate;
        self
    }

    /// Toggle the per-bin printout.
    pub fn print_vals(mut self, print: bool) -> Self {
        self.print_vals = print;
        self
    }

    /// Set the displayed ratio range.
    pub fn ratio_range(mut self, minimum: f64, maximum: f64) -> Self {
        self.ratio_minimum = minimum;
        self.ratio_maximum = maximum;
        self
    }

    /// Set the log-axis floor.
    pub fn log_minimum(mut self, minimum: f64) -> Self {
        self.log_minimum = minimum;
        self
    }

    /// Set the requested output formats.
    pub fn file_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_extensions = exts.into_iter().map(Into::into).collect();
        self
    }

    /// Whether backgrounds are drawn cumulatively.
    pub fn backgrounds_stacked(&self) -> bool {
        matches!(self.stack, StackType::SignalOverlay | StackType::SignalOnTop | StackType::DataNorm)
    }

    /// Whether legend annotations report a mean instead of a yield.
    pub fn annotates_mean(&self) -> bool {
        matches!(self.stack, StackType::LumiShapes | StackType::Shapes)
    }

    /// Style tag used in artifact names, e.g. `lin_lumi` or `log_shapes_ratio`.
    pub fn type_string(&self) -> String {
        let mut out = format!("{}_{}", self.y_axis.as_str(), self.stack.as_str());
        if self.bottom != BottomType::Off {
            out.push('_');
            out.push_str(self.bottom.as_str());
        }
        out
    }

    /// Apply a config bundle on top of the defaults.
    pub fn from_config(bundle: &OptionBundle) -> Result<Self> {
        Self::default().with_config(bundle)
    }

    /// Apply a config bundle on top of these options. Unknown keys are errors.
    pub fn with_config(mut self, bundle: &OptionBundle) -> Result<Self> {
        for (key, value) in bundle {
            let ctx = || format!("option '{key}'");
            match key.as_str() {
                "stack" => self.stack = value.parse().map_err(|e: Error| e.context(ctx()))?,
                "overflow" => self.overflow = value.parse().map_err(|e: Error| e.context(ctx()))?,
                "bottom" => self.bottom = value.parse().map_err(|e: Error| e.context(ctx()))?,
                "y_axis" | "yaxis" => {
                    self.y_axis = value.parse().map_err(|e: Error| e.context(ctx()))?
                }
                "title" => self.title = value.parse().map_err(|e: Error| e.context(ctx()))?,
                "show_background_error" => self.show_background_error = parse_bool(key, value)?,
                "annotate_legend" => self.annotate_legend = parse_bool(key, value)?,
                "print_vals" => self.print_vals = parse_bool(key, value)?,
                "ratio_minimum" => self.ratio_minimum = parse_f64(key, value)?,
                "ratio_maximum" => self.ratio_maximum = parse_f64(key, value)?,
                "log_minimum" => self.log_minimum = parse_f64(key, value)?,
                "legend_fraction" => self.legend_fraction = parse_f64(key, value)?,
                "file_extensions" => {
                    self.file_extensions = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                }
                other => return Err(Error::Config(format!("unknown plot option '{other}'"))),
            }
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if !(self.ratio_minimum < self.ratio_maximum) {
            return Err(Error::Config(format!(
                "ratio range [{}, {}] is empty",
                self.ratio_minimum, self.ratio_maximum
            )));
        }
        if !(self.log_minimum > 0.0) {
            return Err(Error::Config(format!("log_minimum must be > 0, got {}", self.log_minimum)));
        }
        if !(0.0..1.0).contains(&self.legend_fraction) {
            return Err(Error::Config(format!(
                "legend_fraction must be in [0, 1), got {}",
                self.legend_fraction
            )));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(Error::Config(format!("option '{key}': expected a boolean, got '{other}'"))),
    }
}

fn parse_f64(key: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|e| Error::Config(format!("option '{key}': {e} ('{value}')")))
}
