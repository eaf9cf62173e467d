//! Batch Scheduler
//!
//! Splits the full record set into contiguous batches, drives them through a
//! [`BatchAnalyzer`] with at most `max_concurrency` calls outstanding, and folds every
//! completed summary into a single [`GlobalAggregate`].
//!
//! ## Concurrency
//!
//! One task owns the run. With [`SchedulePolicy::SlidingWindow`] it keeps a
//! `FuturesUnordered` of in-flight calls and a semaphore with `max_concurrency` permits:
//! a permit is acquired before a batch is dispatched and travels with the call, so it is
//! released the moment that call finishes and the next batch can start. With
//! [`SchedulePolicy::FixedGroup`] batches are dispatched `max_concurrency` at a time and
//! the whole group is awaited before the next one starts.
//!
//! Completion order is not submission order under the sliding window. That is fine
//! because merging is order-independent (see [`crate::merge`]); the scheduler task is the
//! only owner of the aggregate and merges one completed batch at a time.
//!
//! ## Failure
//!
//! The first failed or timed-out call aborts the run with a [`BatchFailure`] naming the
//! batch. Calls still in flight are dropped, and whatever was merged so far is discarded.

use crate::analyzer::analyze;
use crate::config::ProcessingConfig;
use crate::error::{AnalysisError, BatchFailure, RemoteCallError, RunError};
use crate::logging::new_run_id;
use crate::models::{BatchSummary, GlobalAggregate, ListeningEvent};
use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, info_span, warn, Instrument};

/// A contiguous slice of the input submitted as one unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub index: usize,
    pub offset: usize,
    pub events: Vec<ListeningEvent>,
}

/// Something that can turn a batch into its summary: locally or over the network
#[async_trait]
pub trait BatchAnalyzer: Send + Sync {
    /// Short label used in logs and benchmark output
    fn name(&self) -> &str;

    async fn analyze_batch(&self, batch: Batch) -> Result<BatchSummary, AnalysisError>;
}

/// Runs the analyzer in-process on tokio's blocking pool
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalAnalyzer;

#[async_trait]
impl BatchAnalyzer for LocalAnalyzer {
    fn name(&self) -> &str {
        "local"
    }

    async fn analyze_batch(&self, batch: Batch) -> Result<BatchSummary, AnalysisError> {
        tokio::task::spawn_blocking(move || analyze(&batch.events))
            .await
            .map_err(|e| AnalysisError::Internal(format!("analysis task failed: {e}")))?
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulePolicy {
    /// Launch the next batch as soon as any in-flight call completes
    #[default]
    #[serde(rename = "sliding")]
    SlidingWindow,
    /// Launch `max_concurrency` batches, wait for all of them, repeat
    #[serde(rename = "fixed")]
    FixedGroup,
}

impl FromStr for SchedulePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sliding" | "sliding-window" | "window" => Ok(SchedulePolicy::SlidingWindow),
            "fixed" | "fixed-group" | "group" => Ok(SchedulePolicy::FixedGroup),
            other => Err(format!(
                "unknown schedule policy '{other}' (expected 'sliding' or 'fixed')"
            )),
        }
    }
}

impl fmt::Display for SchedulePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulePolicy::SlidingWindow => write!(f, "sliding"),
            SchedulePolicy::FixedGroup => write!(f, "fixed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerOptions {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub policy: SchedulePolicy,
    /// Independent limit for each call; `None` waits forever
    pub call_timeout: Option<Duration>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            batch_size: 2000,
            max_concurrency: 4,
            policy: SchedulePolicy::SlidingWindow,
            call_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl SchedulerOptions {
    pub fn validate(&self) -> Result<(), RunError> {
        if self.batch_size == 0 {
            return Err(RunError::InvalidOptions(
                "batch size must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(RunError::InvalidOptions(
                "max concurrency must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<&ProcessingConfig> for SchedulerOptions {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_concurrency: config.max_concurrency,
            policy: config.policy,
            call_timeout: match config.request_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

/// Entries merged so far out of the whole input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub batches: usize,
    pub records: usize,
    pub peak_in_flight: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub aggregate: GlobalAggregate,
    pub stats: RunStats,
}

/// Split `events` into contiguous batches of `batch_size`; the last may be shorter
pub fn partition(events: &[ListeningEvent], batch_size: usize) -> Vec<Batch> {
    events
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            offset: index * batch_size.max(1),
            events: chunk.to_vec(),
        })
        .collect()
}

struct CallOutcome {
    index: usize,
    offset: usize,
    len: usize,
    result: Result<BatchSummary, AnalysisError>,
}

/// The single owner of the aggregate while a run is in progress
struct RunningFold<'a, P> {
    aggregate: GlobalAggregate,
    processed: usize,
    total: usize,
    merged: usize,
    on_progress: &'a mut P,
}

impl<'a, P: FnMut(Progress)> RunningFold<'a, P> {
    fn new(total: usize, on_progress: &'a mut P) -> Self {
        Self {
            aggregate: BatchSummary::identity(),
            processed: 0,
            total,
            merged: 0,
            on_progress,
        }
    }

    fn accept(&mut self, outcome: CallOutcome) -> Result<(), BatchFailure> {
        let summary = match outcome.result {
            Ok(summary) => summary,
            Err(cause) => {
                warn!(
                    batch_index = outcome.index,
                    offset = outcome.offset,
                    records = outcome.len,
                    error = %cause,
                    "Batch failed, aborting run"
                );
                return Err(BatchFailure {
                    index: outcome.index,
                    offset: outcome.offset,
                    len: outcome.len,
                    cause,
                });
            }
        };

        self.aggregate.absorb(summary.rebase(outcome.offset));
        self.merged += 1;
        self.processed = (self.processed + outcome.len).min(self.total);

        debug!(
            batch_index = outcome.index,
            processed = self.processed,
            total = self.total,
            "Merged batch"
        );
        (self.on_progress)(Progress {
            processed: self.processed,
            total: self.total,
        });
        Ok(())
    }
}

pub struct BatchScheduler<A: ?Sized> {
    analyzer: Arc<A>,
    options: SchedulerOptions,
}

impl<A: BatchAnalyzer + ?Sized + 'static> BatchScheduler<A> {
    pub fn new(analyzer: Arc<A>, options: SchedulerOptions) -> Self {
        Self { analyzer, options }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Analyze everything and return the merged aggregate
    pub async fn run(&self, events: &[ListeningEvent]) -> Result<GlobalAggregate, RunError> {
        self.run_with_progress(events, |_| {}).await
    }

    pub async fn run_with_progress<P>(
        &self,
        events: &[ListeningEvent],
        on_progress: P,
    ) -> Result<GlobalAggregate, RunError>
    where
        P: FnMut(Progress),
    {
        self.execute(events, on_progress)
            .await
            .map(|outcome| outcome.aggregate)
    }

    /// Analyze everything, reporting progress after each merged batch, and return the
    /// aggregate together with run statistics
    pub async fn execute<P>(
        &self,
        events: &[ListeningEvent],
        mut on_progress: P,
    ) -> Result<RunOutcome, RunError>
    where
        P: FnMut(Progress),
    {
        self.options.validate()?;

        let run_id = new_run_id();
        let span = info_span!("schedule_run", run_id = %run_id, analyzer = self.analyzer.name());

        async move {
            let started = Instant::now();
            let total = events.len();
            let batches = partition(events, self.options.batch_size);
            let batch_count = batches.len();

            info!(
                records = total,
                batches = batch_count,
                batch_size = self.options.batch_size,
                max_concurrency = self.options.max_concurrency,
                policy = %self.options.policy,
                "Starting batched analysis"
            );

            let mut fold = RunningFold::new(total, &mut on_progress);
            let peak_in_flight = match self.options.policy {
                SchedulePolicy::SlidingWindow => self.drive_sliding_window(batches, &mut fold).await?,
                SchedulePolicy::FixedGroup => self.drive_fixed_groups(batches, &mut fold).await?,
            };

            let stats = RunStats {
                batches: fold.merged,
                records: total,
                peak_in_flight,
                elapsed: started.elapsed(),
            };
            info!(
                batches = stats.batches,
                plays = fold.aggregate.total_plays,
                peak_in_flight = stats.peak_in_flight,
                elapsed_ms = stats.elapsed.as_millis() as u64,
                "Batched analysis complete"
            );

            Ok::<_, RunError>(RunOutcome {
                aggregate: fold.aggregate,
                stats,
            })
        }
        .instrument(span)
        .await
    }

    async fn drive_sliding_window<P: FnMut(Progress)>(
        &self,
        batches: Vec<Batch>,
        fold: &mut RunningFold<'_, P>,
    ) -> Result<usize, BatchFailure> {
        let permits = Arc::new(Semaphore::new(self.options.max_concurrency));
        let mut pending = batches.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut peak = 0;

        loop {
            tokio::select! {
                biased;

                Some(outcome) = in_flight.next(), if !in_flight.is_empty() => {
                    fold.accept(outcome)?;
                }

                permit = Arc::clone(&permits).acquire_owned(), if pending.len() > 0 => {
                    if let Some(batch) = pending.next() {
                        let permit = match permit {
                            Ok(permit) => permit,
                            Err(_) => {
                                return Err(BatchFailure {
                                    index: batch.index,
                                    offset: batch.offset,
                                    len: batch.events.len(),
                                    cause: AnalysisError::Internal(
                                        "concurrency limiter closed".to_string(),
                                    ),
                                });
                            }
                        };
                        let call = self.dispatch(batch);
                        in_flight.push(async move {
                            let outcome = call.await;
                            drop(permit);
                            outcome
                        });
                        peak = peak.max(in_flight.len());
                    }
                }

                else => break,
            }
        }

        Ok(peak)
    }

    async fn drive_fixed_groups<P: FnMut(Progress)>(
        &self,
        batches: Vec<Batch>,
        fold: &mut RunningFold<'_, P>,
    ) -> Result<usize, BatchFailure> {
        let mut remaining = batches.into_iter();
        let mut peak = 0;

        loop {
            let group: Vec<Batch> = remaining
                .by_ref()
                .take(self.options.max_concurrency)
                .collect();
            if group.is_empty() {
                break;
            }
            peak = peak.max(group.len());

            let outcomes = join_all(group.into_iter().map(|batch| self.dispatch(batch))).await;
            for outcome in outcomes {
                fold.accept(outcome)?;
            }
        }

        Ok(peak)
    }

    fn dispatch(&self, batch: Batch) -> impl Future<Output = CallOutcome> + Send + 'static {
        let analyzer = Arc::clone(&self.analyzer);
        let timeout = self.options.call_timeout;
        let (index, offset, len) = (batch.index, batch.offset, batch.events.len());

        async move {
            debug!(batch_index = index, offset, records = len, "Dispatching batch");
            let call = analyzer.analyze_batch(batch);
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(AnalysisError::RemoteCall(RemoteCallError::Timeout(limit))),
                },
                None => call.await,
            };
            CallOutcome {
                index,
                offset,
                len,
                result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(n: usize) -> Vec<ListeningEvent> {
        (0..n)
            .map(|i| ListeningEvent::new(&format!("T{}", i % 7), "X", "2024-01-01T00:00:00Z", 10))
            .collect()
    }

    #[test]
    fn test_partition_is_contiguous() {
        let batches = partition(&events(5), 2);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].offset, 0);
        assert_eq!(batches[1].offset, 2);
        assert_eq!(batches[2].offset, 4);
        assert_eq!(batches[2].events.len(), 1);
        assert_eq!(batches[2].index, 2);
    }

    #[test]
    fn test_partition_of_nothing() {
        assert!(partition(&[], 10).is_empty());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("sliding".parse::<SchedulePolicy>(), Ok(SchedulePolicy::SlidingWindow));
        assert_eq!("Fixed".parse::<SchedulePolicy>(), Ok(SchedulePolicy::FixedGroup));
        assert!("random".parse::<SchedulePolicy>().is_err());
        assert_eq!(SchedulePolicy::FixedGroup.to_string(), "fixed");
    }

    #[test]
    fn test_options_validation() {
        let mut options = SchedulerOptions::default();
        assert!(options.validate().is_ok());
        options.batch_size = 0;
        assert!(matches!(options.validate(), Err(RunError::InvalidOptions(_))));
        options.batch_size = 1;
        options.max_concurrency = 0;
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_progress_fraction() {
        assert_eq!(Progress { processed: 5, total: 10 }.fraction(), 0.5);
        assert_eq!(Progress { processed: 0, total: 0 }.fraction(), 1.0);
    }

    #[tokio::test]
    async fn test_local_run_matches_single_pass() {
        let events = events(25);
        let scheduler = BatchScheduler::new(
            Arc::new(LocalAnalyzer),
            SchedulerOptions {
                batch_size: 4,
                max_concurrency: 3,
                ..Default::default()
            },
        );

        let aggregate = scheduler.run(&events).await.unwrap();

        assert_eq!(aggregate, analyze(&events).unwrap());
    }

    #[tokio::test]
    async fn test_empty_input_yields_identity() {
        let scheduler = BatchScheduler::new(Arc::new(LocalAnalyzer), SchedulerOptions::default());
        let outcome = scheduler.execute(&[], |_| {}).await.unwrap();

        assert_eq!(outcome.aggregate, BatchSummary::identity());
        assert_eq!(outcome.stats.batches, 0);
    }
}
