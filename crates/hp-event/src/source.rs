//! Event sources: the file sets a process reads from.
//!
//! A source is identified by its [`EventSource::key`]. Two processes whose
//! sources share a key are served by a single pass over the data, so a key
//! must name one shared source instance. Opening is deferred until the scan
//! actually needs the events.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use hp_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::event::{Event, FieldKind, Schema};

/// A file set that can be scanned event by event.
pub trait EventSource: Send + Sync {
    /// Identity of the underlying data. Sources with equal keys are read once per scan,
    /// so processes reading the same data must share one source instance.
    fn key(&self) -> &str;

    /// Start a fresh pass over the events.
    fn open(&self) -> Result<Box<dyn EventReader + '_>>;

    /// Field vocabulary, when known without opening the data.
    fn schema(&self) -> Option<Schema> {
        None
    }
}

/// Sequential access to the events of an opened source.
pub trait EventReader {
    /// Advance to the next event. `Ok(None)` marks the end of the source.
    fn next_event(&mut self) -> Result<Option<&dyn Event>>;
}

/// One column of event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Column {
    /// One value per event.
    Scalar(Vec<f64>),
    /// A sequence of values per event.
    Vector(Vec<Vec<f64>>),
}

impl Column {
    /// Number of events in the column.
    pub fn len(&self) -> usize {
        match self {
            Column::Scalar(v) => v.len(),
            Column::Vector(v) => v.len(),
        }
    }

    /// Whether the column holds no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape of the column.
    pub fn kind(&self) -> FieldKind {
        match self {
            Column::Scalar(_) => FieldKind::Scalar,
            Column::Vector(_) => FieldKind::Vector,
        }
    }
}

/// Columnar block of events, all columns of equal length.
///
/// On disk this is a JSON object `{"columns": {"ht": [..], "jets_pt": [[..], ..]}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSet {
    columns: BTreeMap<String, Column>,
}

impl ColumnSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scalar column (builder style).
    pub fn with_scalar(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.insert(name.into(), Column::Scalar(values));
        self
    }

    /// Add a vector column (builder style).
    pub fn with_vector(mut self, name: impl Into<String>, values: Vec<Vec<f64>>) -> Self {
        self.columns.insert(name.into(), Column::Vector(values));
        self
    }

    /// Number of events, after checking every column has the same length.
    pub fn n_events(&self) -> Result<usize> {
        let mut n: Option<(usize, &str)> = None;
        for (name, col) in &self.columns {
            match n {
                None => n = Some((col.len(), name)),
                Some((len, first)) if len != col.len() => {
                    return Err(Error::Validation(format!(
                        "column length mismatch: '{first}' has {len} events, '{name}' has {}",
                        col.len()
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(n.map(|(len, _)| len).unwrap_or(0))
    }

    /// Field vocabulary of the set.
    pub fn schema(&self) -> Schema {
        let mut s = Schema::new();
        for (name, col) in &self.columns {
            s.insert(name.clone(), col.kind());
        }
        s
    }

    /// Read a set from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::DataAvailability(format!("cannot open '{}': {e}", path.display()))
        })?;
        let set: ColumnSet = serde_json::from_str(&text)
            .map_err(|e| Error::Validation(format!("malformed event file '{}': {e}", path.display())))?;
        set.n_events()?;
        Ok(set)
    }

    fn scalar_at(&self, row: usize, name: &str) -> Option<f64> {
        match self.columns.get(name)? {
            Column::Scalar(v) => v.get(row).copied(),
            Column::Vector(_) => None,
        }
    }

    fn vector_at(&self, row: usize, name: &str) -> Option<&[f64]> {
        match self.columns.get(name)? {
            Column::Vector(v) => v.get(row).map(|x| x.as_slice()),
            Column::Scalar(_) => None,
        }
    }
}

/// In-memory event source.
#[derive(Debug)]
pub struct ColumnSource {
    key: String,
    set: ColumnSet,
    n_events: usize,
    opens: AtomicUsize,
}

impl ColumnSource {
    /// Wrap a column set under the given identity key.
    pub fn new(key: impl Into<String>, set: ColumnSet) -> Result<Self> {
        let n_events = set.n_events()?;
        Ok(Self { key: key.into(), set, n_events, opens: AtomicUsize::new(0) })
    }

    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// How many times the source has been opened.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }
}

impl EventSource for ColumnSource {
    fn key(&self) -> &str {
        &self.key
    }

    fn open(&self) -> Result<Box<dyn EventReader + '_>> {
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(ColumnReader { set: &self.set, n_events: self.n_events, next: 0 }))
    }

    fn schema(&self) -> Option<Schema> {
        Some(self.set.schema())
    }
}

struct ColumnReader<'a> {
    set: &'a ColumnSet,
    n_events: usize,
    next: usize,
}

impl EventReader for ColumnReader<'_> {
    fn next_event(&mut self) -> Result<Option<&dyn Event>> {
        if self.next >= self.n_events {
            return Ok(None);
        }
        self.next += 1;
        let ev: &dyn Event = self;
        Ok(Some(ev))
    }
}

impl Event for ColumnReader<'_> {
    fn scalar(&self, name: &str) -> Option<f64> {
        self.set.scalar_at(self.next - 1, name)
    }

    fn vector(&self, name: &str) -> Option<&[f64]> {
        self.set.vector_at(self.next - 1, name)
    }
}

/// Which files a [`JsonFileSource`] reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSet {
    /// Explicit list of files.
    Files(Vec<PathBuf>),
    /// Every file in `dir` whose name ends with `suffix`, resolved when opened.
    Directory {
        /// Directory to list.
        dir: PathBuf,
        /// File-name suffix filter.
        suffix: String,
    },
}

/// Event source over JSON column files, read one file at a time.
#[derive(Debug)]
pub struct JsonFileSource {
    key: String,
    files: FileSet,
    opens: AtomicUsize,
}

impl JsonFileSource {
    /// Source over an explicit list of files. The key is the sorted path list.
    pub fn new(files: Vec<PathBuf>) -> Self {
        let mut files = files;
        files.sort();
        let key = files.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(",");
        Self { key, files: FileSet::Files(files), opens: AtomicUsize::new(0) }
    }

    /// Source over all `*suffix` files of a directory.
    pub fn from_dir(dir: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        let dir = dir.into();
        let suffix = suffix.into();
        let key = format!("{}/*{}", dir.display(), suffix);
        Self { key, files: FileSet::Directory { dir, suffix }, opens: AtomicUsize::new(0) }
    }

    /// How many times the source has been opened.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }

    /// Resolve the concrete file list.
    pub fn resolve(&self) -> Result<Vec<PathBuf>> {
        let files = match &self.files {
            FileSet::Files(files) => files.clone(),
            FileSet::Directory { dir, suffix } => {
                let entries = std::fs::read_dir(dir).map_err(|e| {
                    Error::DataAvailability(format!("cannot list '{}': {e}", dir.display()))
                })?;
                let mut out = Vec::new();
                for entry in entries {
                    let path = entry?.path();
                    let matches = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(suffix.as_str()));
                    if matches && path.is_file() {
                        out.push(path);
                    }
                }
                out.sort();
                out
            }
        };
        if files.is_empty() {
            return Err(Error::DataAvailability(format!("no files match '{}'", self.key)));
        }
        if let Some(missing) = files.iter().find(|p| !p.exists()) {
            return Err(Error::DataAvailability(format!("missing file '{}'", missing.display())));
        }
        Ok(files)
    }
}

impl EventSource for JsonFileSource {
    fn key(&self) -> &str {
        &self.key
    }

    fn open(&self) -> Result<Box<dyn EventReader + '_>> {
        self.opens.fetch_add(1, Ordering::Relaxed);
        let files = self.resolve()?;
        log::debug!("opened '{}' ({} files)", self.key, files.len());
        Ok(Box::new(JsonFileReader { files, next_file: 0, set: ColumnSet::new(), n_events: 0, row: 0 }))
    }
}

struct JsonFileReader {
    files: Vec<PathBuf>,
    next_file: usize,
    set: ColumnSet,
    n_events: usize,
    row: usize,
}

impl EventReader for JsonFileReader {
    fn next_event(&mut self) -> Result<Option<&dyn Event>> {
        while self.row >= self.n_events {
            let Some(path) = self.files.get(self.next_file) else {
                return Ok(None);
            };
            self.set = ColumnSet::from_json_file(path)?;
            self.n_events = self.set.n_events()?;
            self.row = 0;
            self.next_file += 1;
        }
        self.row += 1;
        let ev: &dyn Event = self;
        Ok(Some(ev))
    }
}

impl Event for JsonFileReader {
    fn scalar(&self, name: &str) -> Option<f64> {
        self.set.scalar_at(self.row - 1, name)
    }

    fn vector(&self, name: &str) -> Option<&[f64]> {
        self.set.vector_at(self.row - 1, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ColumnSet {
        ColumnSet::new()
            .with_scalar("ht", vec![300.0, 650.0, 1200.0])
            .with_vector("jets_pt", vec![vec![50.0], vec![], vec![90.0, 40.0]])
    }

    #[test]
    fn column_reader_walks_rows() {
        let src = ColumnSource::new("mem", sample()).unwrap();
        let mut reader = src.open().unwrap();
        let mut hts = Vec::new();
        let mut njets = Vec::new();
        while let Some(ev) = reader.next_event().unwrap() {
            hts.push(ev.scalar("ht").unwrap());
            njets.push(ev.vector("jets_pt").unwrap().len());
        }
        assert_eq!(hts, vec![300.0, 650.0, 1200.0]);
        assert_eq!(njets, vec![1, 0, 2]);
        assert_eq!(src.open_count(), 1);
    }

    #[test]
    fn mismatched_columns_rejected() {
        let set = ColumnSet::new().with_scalar("a", vec![1.0, 2.0]).with_scalar("b", vec![1.0]);
        assert!(ColumnSource::new("bad", set).is_err());
    }

    #[test]
    fn empty_source_is_not_an_error() {
        let src = ColumnSource::new("empty", ColumnSet::new()).unwrap();
        let mut reader = src.open().unwrap();
        assert!(reader.next_event().unwrap().is_none());
    }

    #[test]
    fn schema_from_columns() {
        let s = sample().schema();
        assert_eq!(s.kind("ht"), Some(FieldKind::Scalar));
        assert_eq!(s.kind("jets_pt"), Some(FieldKind::Vector));
    }

    #[test]
    fn missing_files_are_data_errors() {
        let src = JsonFileSource::new(vec![PathBuf::from("/nonexistent/hepplot/a.json")]);
        match src.open() {
            Err(Error::DataAvailability(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("open should fail"),
        };
    }
}
