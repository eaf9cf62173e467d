//! Benchmark harness
//!
//! Runs the scheduler over the same records once per (batch size, concurrency) cell and
//! records throughput. Cells run one after another in row-major order so they never
//! compete for the analyzer; the first failing cell aborts the matrix.

use crate::error::RunError;
use crate::models::ListeningEvent;
use crate::scheduler::{BatchAnalyzer, BatchScheduler, SchedulePolicy, SchedulerOptions};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct BenchMatrix {
    pub batch_sizes: Vec<usize>,
    pub concurrency_levels: Vec<usize>,
    pub policy: SchedulePolicy,
    pub call_timeout: Option<Duration>,
}

impl Default for BenchMatrix {
    fn default() -> Self {
        Self {
            batch_sizes: vec![500, 1000, 2000, 5000],
            concurrency_levels: vec![1, 2, 4, 8],
            policy: SchedulePolicy::SlidingWindow,
            call_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl BenchMatrix {
    /// Cells in the order they run
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.batch_sizes.iter().flat_map(move |&batch_size| {
            self.concurrency_levels
                .iter()
                .map(move |&concurrency| (batch_size, concurrency))
        })
    }

    fn options_for(&self, batch_size: usize, max_concurrency: usize) -> SchedulerOptions {
        SchedulerOptions {
            batch_size,
            max_concurrency,
            policy: self.policy,
            call_timeout: self.call_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchResult {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub batches: usize,
    pub records: usize,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub records_per_sec: f64,
    pub peak_in_flight: usize,
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64() * 1000.0)
}

fn throughput(records: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        records as f64 / secs
    } else {
        0.0
    }
}

pub async fn run_matrix<A>(
    analyzer: Arc<A>,
    events: &[ListeningEvent],
    matrix: &BenchMatrix,
) -> Result<Vec<BenchResult>, RunError>
where
    A: BatchAnalyzer + ?Sized + 'static,
{
    if matrix.batch_sizes.is_empty() || matrix.concurrency_levels.is_empty() {
        return Err(RunError::InvalidOptions(
            "benchmark needs at least one batch size and one concurrency level".to_string(),
        ));
    }

    let mut results = Vec::new();
    for (batch_size, max_concurrency) in matrix.cells() {
        let scheduler = BatchScheduler::new(
            Arc::clone(&analyzer),
            matrix.options_for(batch_size, max_concurrency),
        );
        let outcome = scheduler.execute(events, |_| {}).await?;
        let stats = outcome.stats;

        let result = BenchResult {
            batch_size,
            max_concurrency,
            batches: stats.batches,
            records: stats.records,
            elapsed: stats.elapsed,
            records_per_sec: throughput(stats.records, stats.elapsed),
            peak_in_flight: stats.peak_in_flight,
        };
        info!(
            batch_size,
            max_concurrency,
            elapsed_ms = result.elapsed.as_millis() as u64,
            records_per_sec = result.records_per_sec,
            "Benchmark cell finished"
        );
        results.push(result);
    }

    Ok(results)
}
