//! Per-event entry expansion shared by every accumulator.
//!
//! A consumer is described by a cut, a weight and any number of value
//! functions, each of which may be scalar or vector valued. One event expands
//! into zero or more entries:
//!
//! - a scalar cut that is false yields nothing, and nothing else is evaluated;
//! - if none of cut, weight and values is vector valued, the event yields one entry;
//! - otherwise the shortest vector among them bounds the positions, and a
//!   vector cut gates each position individually.

use hp_core::Result;

use crate::event::Event;
use crate::named_func::{NamedFunc, Value};

/// Cut, weight and value functions of one accumulator.
#[derive(Debug, Clone)]
pub struct EntrySpec {
    /// Selection (nonzero passes).
    pub cut: NamedFunc,
    /// Per-entry weight.
    pub weight: NamedFunc,
    /// Quantities recorded per entry (e.g. the plotted variable).
    pub values: Vec<NamedFunc>,
}

impl EntrySpec {
    /// Build a spec.
    pub fn new(cut: NamedFunc, weight: NamedFunc, values: Vec<NamedFunc>) -> Self {
        Self { cut, weight, values }
    }

    /// Expand `ev` into entries, calling `visit(weight, values)` for each.
    /// Returns the number of entries visited.
    pub fn for_each_entry<F>(&self, ev: &dyn Event, mut visit: F) -> Result<usize>
    where
        F: FnMut(f64, &[f64]),
    {
        let cut = self.cut.eval(ev)?;
        if !cut.passes() {
            return Ok(0);
        }
        let weight = self.weight.eval(ev)?;
        let values = self.values.iter().map(|f| f.eval(ev)).collect::<Result<Vec<Value>>>()?;

        let min_len = std::iter::once(&cut)
            .chain(std::iter::once(&weight))
            .chain(values.iter())
            .filter_map(Value::vector_len)
            .min();

        let mut row = vec![0.0; values.len()];
        let Some(n) = min_len else {
            for (slot, v) in row.iter_mut().zip(&values) {
                *slot = v.at(0);
            }
            visit(weight.at(0), &row);
            return Ok(1);
        };

        let mut visited = 0;
        for i in 0..n {
            if cut.at(i) == 0.0 {
                continue;
            }
            for (slot, v) in row.iter_mut().zip(&values) {
                *slot = v.at(i);
            }
            visit(weight.at(i), &row);
            visited += 1;
        }
        Ok(visited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MapEvent;

    fn collect(spec: &EntrySpec, ev: &MapEvent) -> Vec<(f64, Vec<f64>)> {
        let mut out = Vec::new();
        spec.for_each_entry(ev, |w, vals| out.push((w, vals.to_vec()))).unwrap();
        out
    }

    #[test]
    fn scalar_only_gives_one_entry() {
        let ev = MapEvent::new().with_scalar("x", 7.0).with_scalar("w", 0.5);
        let spec = EntrySpec::new(
            NamedFunc::scalar_field("x").greater(5.0),
            NamedFunc::scalar_field("w"),
            vec![NamedFunc::scalar_field("x")],
        );
        assert_eq!(collect(&spec, &ev), vec![(0.5, vec![7.0])]);
    }

    #[test]
    fn failing_scalar_cut_skips_evaluation() {
        // "missing" would error if evaluated
        let ev = MapEvent::new().with_scalar("x", 1.0);
        let spec = EntrySpec::new(
            NamedFunc::scalar_field("x").greater(5.0),
            NamedFunc::scalar_field("missing"),
            vec![NamedFunc::scalar_field("missing")],
        );
        assert!(collect(&spec, &ev).is_empty());
    }

    #[test]
    fn vector_cut_gates_positions() {
        let ev = MapEvent::new()
            .with_vector("pt", vec![50.0, 20.0, 70.0, 90.0])
            .with_vector("sf", vec![1.0, 2.0, 3.0]);
        let spec = EntrySpec::new(
            NamedFunc::vector_field("pt").greater(30.0),
            NamedFunc::vector_field("sf"),
            vec![NamedFunc::vector_field("pt")],
        );
        // bounded by the 3-element weight vector; position 1 fails the cut
        assert_eq!(collect(&spec, &ev), vec![(1.0, vec![50.0]), (3.0, vec![70.0])]);
    }

    #[test]
    fn scalar_weight_broadcasts_over_vector_variable() {
        let ev = MapEvent::new().with_scalar("w", 2.0).with_vector("pt", vec![10.0, 20.0]);
        let spec = EntrySpec::new(
            NamedFunc::constant(1.0),
            NamedFunc::scalar_field("w"),
            vec![NamedFunc::vector_field("pt")],
        );
        assert_eq!(collect(&spec, &ev), vec![(2.0, vec![10.0]), (2.0, vec![20.0])]);
    }

    #[test]
    fn vector_cut_without_passing_entries() {
        let ev = MapEvent::new().with_vector("pt", vec![5.0, 6.0]);
        let spec = EntrySpec::new(
            NamedFunc::vector_field("pt").greater(30.0),
            NamedFunc::constant(1.0),
            vec![],
        );
        assert!(collect(&spec, &ev).is_empty());
    }
}
