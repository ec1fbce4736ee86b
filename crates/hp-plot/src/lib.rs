//! # hp-plot
//!
//! Figures, the single-pass scan and the aggregation pipeline of hepplot.
//!
//! Figures ([`Hist1D`], [`Table`], [`EventScan`]) are registered with a
//! [`PlotMaker`], which reads each distinct event source once and feeds every
//! figure component routed to it. Each figure then turns its raw (1 fb⁻¹)
//! accumulators into numbers-first JSON artifacts for every requested
//! [`PlotOpt`] style.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use hp_core::ProcessKind;
//! use hp_event::{ColumnSet, ColumnSource, EventSource, NamedFunc, Process};
//! use hp_plot::{Hist1D, HistoDef, PlotMaker, PlotOpt};
//!
//! let src: Arc<dyn EventSource> = Arc::new(
//!     ColumnSource::new("ttbar", ColumnSet::new().with_scalar("ht", vec![300.0, 700.0, 900.0]))
//!         .unwrap(),
//! );
//! let tt = Process::new("t#bar{t}", ProcessKind::Background, 0x1f77b4, src, NamedFunc::constant(1.0));
//!
//! let def = HistoDef::uniform(
//!     4,
//!     0.0,
//!     1000.0,
//!     NamedFunc::scalar_field("ht"),
//!     NamedFunc::scalar_field("ht").greater(500.0),
//!     NamedFunc::constant(1.0),
//!     vec![PlotOpt::default()],
//! );
//! let mut pm = PlotMaker::new();
//! let h = pm.push(Hist1D::new(def, &[tt.clone()]).unwrap());
//! pm.fill().unwrap();
//! assert_eq!(pm.get(h).unwrap().raw(&tt).unwrap().integral(), 2.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abcd;
pub mod artifact;
pub mod config;
pub mod event_scan;
pub mod figure;
pub mod hist1d;
pub mod plot_maker;
pub mod plot_opt;
pub mod table;

pub use abcd::{AbcdMethod, AbcdOptions, AbcdPrediction};
pub use config::{ConfigFile, OptionBundle};
pub use event_scan::EventScan;
pub use figure::{Components, Figure, FigureComponent};
pub use hist1d::{Hist1D, Hist1DView, HistoDef};
pub use plot_maker::{FigureHandle, PlotMaker, ScanSummary};
pub use plot_opt::{BottomType, OverflowType, PlotOpt, StackType, TitleType, YAxisType};
pub use table::{Table, TableRow};
