//! Common data types for hepplot

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Category of a process.
///
/// The category decides the aggregation rules: data is never luminosity-scaled,
/// backgrounds may be stacked, signals are overlaid as outlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessKind {
    /// Recorded collision data
    Data,
    /// Simulated background
    Background,
    /// Simulated signal
    Signal,
}

impl ProcessKind {
    /// All categories in draw order of the component groups.
    pub const ALL: [ProcessKind; 3] =
        [ProcessKind::Data, ProcessKind::Background, ProcessKind::Signal];

    /// Whether raw accumulators of this category are multiplied by the luminosity.
    pub fn is_lumi_scaled(self) -> bool {
        !matches!(self, ProcessKind::Data)
    }

    /// Lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessKind::Data => "data",
            ProcessKind::Background => "background",
            ProcessKind::Signal => "signal",
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "data" => Ok(ProcessKind::Data),
            "background" | "bkg" => Ok(ProcessKind::Background),
            "signal" | "sig" => Ok(ProcessKind::Signal),
            other => Err(Error::Config(format!("unrecognized process category '{other}'"))),
        }
    }
}
