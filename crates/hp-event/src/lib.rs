//! # hp-event
//!
//! Event access and per-event computation for hepplot.
//!
//! Event sources yield events with named scalar and vector fields; a
//! [`NamedFunc`] turns an event into a scalar or a vector; [`EntrySpec`]
//! expands an event into weighted entries; [`Histogram`] accumulates them.
//!
//! ## Example
//!
//! ```
//! use hp_event::{ColumnSet, ColumnSource, EventSource, Histogram, NamedFunc};
//!
//! let src = ColumnSource::new(
//!     "demo",
//!     ColumnSet::new().with_scalar("ht", vec![250.0, 720.0, 1300.0]),
//! )
//! .unwrap();
//! let schema = src.schema().unwrap();
//! let cut = NamedFunc::parse("ht > 500", &schema).unwrap();
//! let ht = NamedFunc::parse("ht", &schema).unwrap();
//!
//! let mut h = Histogram::uniform("ht", 4, 0.0, 2000.0).unwrap();
//! let mut reader = src.open().unwrap();
//! while let Some(ev) = reader.next_event().unwrap() {
//!     if cut.get_scalar(ev).unwrap() != 0.0 {
//!         h.fill(ht.get_scalar(ev).unwrap(), 1.0);
//!     }
//! }
//! assert_eq!(h.integral(), 2.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod event;
pub mod expr;
pub mod filler;
pub mod histogram;
pub mod named_func;
pub mod process;
pub mod source;

pub use event::{Event, FieldKind, MapEvent, Schema};
pub use filler::EntrySpec;
pub use histogram::Histogram;
pub use named_func::{NamedFunc, Value, canonical_name};
pub use process::{Process, ProcessStyle};
pub use source::{Column, ColumnSet, ColumnSource, EventReader, EventSource, FileSet, JsonFileSource};
