//! Section-delimited `key = value` option files.
//!
//! ```text
//! # defaults for every section
//! overflow = both
//!
//! [lin_lumi]
//! stack = lumi
//!
//! [log_shapes]
//! y_axis = log
//! stack = shapes
//! ```
//!
//! Keys before the first `[section]` header are global defaults; a section's
//! bundle is the globals overlaid with the section's own keys.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use hp_core::{Error, Result};

use crate::plot_opt::PlotOpt;

/// A named set of string options.
pub type OptionBundle = BTreeMap<String, String>;

/// Parsed option file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    globals: OptionBundle,
    sections: BTreeMap<String, OptionBundle>,
    order: Vec<String>,
}

impl ConfigFile {
    /// Parse option text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut cfg = Self::default();
        let mut current: Option<String> = None;
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix('[') {
                let Some(name) = rest.strip_suffix(']') else {
                    return Err(Error::Config(format!(
                        "line {}: unterminated section header '{line}'",
                        lineno + 1
                    )));
                };
                let name = name.trim().to_string();
                if !cfg.sections.contains_key(&name) {
                    cfg.order.push(name.clone());
                    cfg.sections.insert(name.clone(), OptionBundle::new());
                }
                current = Some(name);
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::Config(format!(
                    "line {}: expected 'key = value', got '{line}'",
                    lineno + 1
                )));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::Config(format!("line {}: empty key", lineno + 1)));
            }
            let target = match &current {
                Some(name) => cfg.sections.entry(name.clone()).or_default(),
                None => &mut cfg.globals,
            };
            target.insert(key.to_string(), value.trim().to_string());
        }
        Ok(cfg)
    }

    /// Read and parse an option file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&text).map_err(|e| e.context(path.display()))
    }

    /// Section names in file order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Whether `name` is a section of the file.
    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Global defaults.
    pub fn globals(&self) -> &OptionBundle {
        &self.globals
    }

    /// Globals overlaid with the keys of section `name`.
    pub fn section(&self, name: &str) -> Result<OptionBundle> {
        let own = self
            .sections
            .get(name)
            .ok_or_else(|| Error::Config(format!("no section '[{name}]' in option file")))?;
        let mut merged = self.globals.clone();
        merged.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(merged)
    }

    /// Set `key` in section `name` (created if missing).
    pub fn set(&mut self, name: &str, key: impl Into<String>, value: impl Into<String>) {
        if !self.sections.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.sections.entry(name.to_string()).or_default().insert(key.into(), value.into());
    }

    /// Plot options of the named sections, in the given order.
    pub fn plot_opts(&self, names: &[&str]) -> Result<Vec<PlotOpt>> {
        names
            .iter()
            .map(|name| {
                let bundle = self.section(name)?;
                PlotOpt::from_config(&bundle).map_err(|e| e.context(format!("section '[{name}]'")))
            })
            .collect()
    }

    /// Serialize back to option text (globals first, then sections in file order).
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.globals {
            let _ = writeln!(out, "{k} = {v}");
        }
        for name in &self.order {
            if !out.is_empty() {
                out.push('\n');
            }
            let _ = writeln!(out, "[{name}]");
            if let Some(bundle) = self.sections.get(name) {
                for (k, v) in bundle {
                    let _ = writeln!(out, "{k} = {v}");
                }
            }
        }
        out
    }

    /// Write the option text to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_text())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot_opt::{BottomType, StackType, YAxisType};

    const TEXT: &str = "
# shared
overflow = both
bottom = off

[lin_lumi]
stack = lumi

[log_shapes_ratio]
  y_axis = log   # not a comment marker here
";

    #[test]
    fn sections_merge_over_globals() {
        let cfg = ConfigFile::parse(TEXT).unwrap();
        assert_eq!(cfg.section_names().collect::<Vec<_>>(), vec!["lin_lumi", "log_shapes_ratio"]);
        let b = cfg.section("lin_lumi").unwrap();
        assert_eq!(b.get("overflow").map(String::as_str), Some("both"));
        assert_eq!(b.get("stack").map(String::as_str), Some("lumi"));
        assert!(cfg.section("missing").is_err());
    }

    #[test]
    fn values_are_trimmed_whole() {
        let cfg = ConfigFile::parse(TEXT).unwrap();
        let b = cfg.section("log_shapes_ratio").unwrap();
        assert_eq!(b.get("y_axis").map(String::as_str), Some("log   # not a comment marker here"));
    }

    #[test]
    fn malformed_lines_are_errors() {
        let err = ConfigFile::parse("[open\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
        let err = ConfigFile::parse("[a]\njust words\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn plot_opts_from_sections() {
        let mut cfg = ConfigFile::parse("bottom = ratio\n").unwrap();
        cfg.set("log", "y_axis", "log");
        cfg.set("shapes", "stack", "shapes");
        let opts = cfg.plot_opts(&["log", "shapes"]).unwrap();
        assert_eq!(opts[0].y_axis, YAxisType::Log);
        assert_eq!(opts[0].bottom, BottomType::Ratio);
        assert_eq!(opts[1].stack, StackType::Shapes);

        cfg.set("bad", "stack", "pile");
        let err = cfg.plot_opts(&["bad"]).unwrap_err();
        assert!(err.to_string().contains("[bad]"));
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("styles.txt");
        let cfg = ConfigFile::parse(TEXT).unwrap();
        cfg.save(&path).unwrap();
        let back = ConfigFile::load(&path).unwrap();
        assert_eq!(back, cfg);
    }
}
