//! KSense Runner: per-tick orchestration on top of `ksense-core`.
//!
//! This crate provides:
//! - `TickEvaluator`: both estimators against one pair of snapshots
//! - `score_batch`: many queries against one fitted reference, optionally parallel
//! - `CsvSink`: append-only CSV output with a guaranteed header row
//! - `Renderer`: seam for live series, with `NullRenderer` and `SeriesRecorder`
//! - `Monitor`: histogram + reference window + outputs, one observation per tick

pub mod batch;
pub mod monitor;
pub mod render;
pub mod sink;
pub mod tick;

pub use batch::score_batch;
pub use monitor::{Ewma, Monitor, MonitorError, Series};
pub use render::{NullRenderer, Renderer, SeriesFrame, SeriesRecorder};
pub use sink::{ensure_header, percentile_label, report_header, CsvSink, SinkError};
pub use tick::{TickEvaluator, TickReport};
