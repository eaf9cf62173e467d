//! Listening History Statistics
//!
//! Computes listening statistics over exported streaming history (tens of thousands of
//! play events) by splitting the events into batches, analyzing each batch independently
//! (in-process or through a remote aggregation endpoint), merging the per-batch raw counts
//! and deriving every ratio and ranking once at the end.
//!
//! ## Core Features
//!
//! - **Batched map-reduce**: per-batch summaries carry raw counts only, so merging is exact
//!   and independent of how the input was split or in which order batches complete
//! - **Bounded concurrency**: sliding-window or fixed-group scheduling with a per-call
//!   timeout and fail-fast error handling
//! - **Remote or local analysis**: the same [`scheduler::BatchAnalyzer`] seam drives an
//!   in-process analyzer and an HTTP client for the aggregation endpoint
//! - **Benchmarking**: batch size × concurrency matrices over the same records
//!
//! ## Architecture Overview
//!
//! - [`models`] - Raw events, per-batch summaries and their count types
//! - [`analyzer`] - Pure per-batch analysis
//! - [`merge`] - Combining summaries into the global aggregate
//! - [`report`] - Finalization into ratios and rankings
//! - [`scheduler`] - Partitioning, concurrency control and progress
//! - [`wire`] - JSON form of a summary exchanged with the endpoint
//! - `remote` - HTTP client analyzer (feature `remote`)
//! - `endpoint` - HTTP aggregation endpoint (feature `server`)
//! - [`bench`] - Benchmark harness
//! - [`loader`] - Reading history files and date filtering
//! - [`display`] - Terminal and JSON output
//! - [`config`] - Configuration management with environment variable support
//! - [`logging`] - Structured logging with JSON and pretty-print formats
//! - [`error`] - Error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use listen_stats::{finalize, BatchScheduler, LocalAnalyzer, SchedulerOptions};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let events = listen_stats::loader::load_events(&["history.json".into()])?;
//! let scheduler = BatchScheduler::new(Arc::new(LocalAnalyzer), SchedulerOptions::default());
//! let aggregate = scheduler.run(&events).await?;
//! let report = finalize(&aggregate);
//! println!("{} plays", report.total_plays);
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod bench;
pub mod config;
pub mod display;
pub mod error;
pub mod loader;
pub mod logging;
pub mod merge;
pub mod models;
pub mod report;
pub mod scheduler;
pub mod wire;

#[cfg(feature = "remote")]
pub mod remote;

#[cfg(feature = "server")]
pub mod endpoint;

pub use analyzer::analyze;
pub use error::{AnalysisError, BatchFailure, RemoteCallError, RunError};
pub use merge::merge_all;
pub use models::{BatchSummary, GlobalAggregate, ListeningEvent, SkipCounts, Tally};
pub use report::{finalize, finalize_with, Report};
pub use scheduler::{
    BatchAnalyzer, BatchScheduler, LocalAnalyzer, Progress, SchedulePolicy, SchedulerOptions,
};
