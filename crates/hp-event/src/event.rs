//! Per-event field access.
//!
//! An [`Event`] exposes named per-event quantities, either a single scalar or a
//! variable-length sequence (one entry per reconstructed object). The set of
//! names a source provides is described by its [`Schema`], which is what
//! expressions are resolved against when they are parsed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Shape of a named event field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// One value per event.
    Scalar,
    /// Variable-length sequence per event.
    Vector,
}

/// Named field vocabulary of an analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: BTreeMap<String, FieldKind>,
}

impl Schema {
    /// Empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scalar field (builder style).
    pub fn with_scalar(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), FieldKind::Scalar);
        self
    }

    /// Add a vector field (builder style).
    pub fn with_vector(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), FieldKind::Vector);
        self
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, name: impl Into<String>, kind: FieldKind) {
        self.fields.insert(name.into(), kind);
    }

    /// Kind of `name`, if known.
    pub fn kind(&self, name: &str) -> Option<FieldKind> {
        self.fields.get(name).copied()
    }

    /// Iterate `(name, kind)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldKind)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Union of two schemas. Fields of `other` win on conflicts.
    pub fn merged(&self, other: &Schema) -> Schema {
        let mut out = self.clone();
        for (k, v) in &other.fields {
            out.fields.insert(k.clone(), *v);
        }
        out
    }
}

/// One event as seen by expressions.
pub trait Event {
    /// Value of scalar field `name`, or `None` if the event has no such scalar.
    fn scalar(&self, name: &str) -> Option<f64>;

    /// Values of vector field `name`, or `None` if the event has no such vector.
    fn vector(&self, name: &str) -> Option<&[f64]>;
}

/// Event backed by a map of owned values. Mostly useful in tests and for
/// expressions evaluated outside a scan.
#[derive(Debug, Clone, Default)]
pub struct MapEvent {
    scalars: BTreeMap<String, f64>,
    vectors: BTreeMap<String, Vec<f64>>,
}

impl MapEvent {
    /// Empty event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a scalar field (builder style).
    pub fn with_scalar(mut self, name: impl Into<String>, value: f64) -> Self {
        self.scalars.insert(name.into(), value);
        self
    }

    /// Set a vector field (builder style).
    pub fn with_vector(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.vectors.insert(name.into(), values);
        self
    }
}

impl Event for MapEvent {
    fn scalar(&self, name: &str) -> Option<f64> {
        self.scalars.get(name).copied()
    }

    fn vector(&self, name: &str) -> Option<&[f64]> {
        self.vectors.get(name).map(|v| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_lookup_and_merge() {
        let a = Schema::new().with_scalar("ht").with_vector("jets_pt");
        let b = Schema::new().with_scalar("met").with_scalar("jets_pt");
        assert_eq!(a.kind("jets_pt"), Some(FieldKind::Vector));
        assert_eq!(a.kind("met"), None);

        let m = a.merged(&b);
        assert_eq!(m.kind("met"), Some(FieldKind::Scalar));
        assert_eq!(m.kind("jets_pt"), Some(FieldKind::Scalar));
        assert_eq!(m.iter().count(), 3);
    }

    #[test]
    fn map_event_accessors() {
        let ev = MapEvent::new().with_scalar("ht", 512.0).with_vector("jets_pt", vec![80.0, 45.0]);
        assert_eq!(ev.scalar("ht"), Some(512.0));
        assert_eq!(ev.vector("jets_pt"), Some(&[80.0, 45.0][..]));
        assert!(ev.scalar("jets_pt").is_none());
        assert!(ev.vector("ht").is_none());
    }
}
