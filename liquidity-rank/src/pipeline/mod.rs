//! Run orchestration: batching, side-table joins, and the end-to-end run.

pub mod batch;
pub mod merge;
pub mod runner;

pub use batch::{partition, BatchConfig, BatchOrchestrator, BatchRunSummary};
pub use merge::{format_earnings, Keyed, MergeEngine, SideTable};
pub use runner::{LiquidityRun, RunError, RunSettings};
