//! Numbers-first JSON artifacts written by figures.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use hp_core::{Error, Result};
use serde::Serialize;

/// Provenance block shared by all artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactMeta {
    /// Producing tool, always `hepplot`.
    pub tool: String,
    /// Crate version.
    pub tool_version: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_unix_ms: u128,
    /// Luminosity the numbers are scaled to, in fb⁻¹.
    pub luminosity: f64,
}

impl ArtifactMeta {
    /// Stamp for an artifact produced now at `luminosity`.
    pub fn now(luminosity: f64) -> Result<Self> {
        Ok(Self {
            tool: "hepplot".to_string(),
            tool_version: hp_core::VERSION.to_string(),
            created_unix_ms: now_unix_ms()?,
            luminosity,
        })
    }
}

/// Lower and upper edge of a band, per bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandEnvelope {
    /// Lower edge per bin.
    pub lo: Vec<f64>,
    /// Upper edge per bin.
    pub hi: Vec<f64>,
}

fn now_unix_ms() -> Result<u128> {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Computation(format!("system time error: {}", e)))?;
    Ok(d.as_millis())
}

/// Serialize `value` as pretty JSON to `path`, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut w, value)?;
    w.write_all(b"\n")?;
    w.flush()?;
    Ok(())
}

/// Luminosity formatted for file names: `2.5` becomes `2p5`.
pub fn lumi_tag(luminosity: f64) -> String {
    let s = format!("{luminosity}");
    s.replace('.', "p")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lumi_tags() {
        assert_eq!(lumi_tag(1.0), "1");
        assert_eq!(lumi_tag(35.9), "35p9");
    }

    #[test]
    fn writes_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b.json");
        let meta = ArtifactMeta::now(2.0).unwrap();
        write_json(&path, &meta).unwrap();
        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["tool"], "hepplot");
        assert_eq!(v["luminosity"], 2.0);
    }
}
