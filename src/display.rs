//! Output Formatting and Display Management
//!
//! Renders a finalized [`Report`] and benchmark results either as colored terminal
//! output or as JSON for programmatic consumption.
//!
//! ## Output Formats
//!
//! ### Terminal
//! - Totals: plays, hours, skip rate, unique tracks, repeats, exploration ratio
//! - Ranked top tracks, top artists and most-skipped artists
//! - Skip rate per platform
//! - Monthly new tracks next to monthly first-time discoveries
//!
//! ### JSON
//! The [`Report`] is serialized as-is with camelCase keys:
//! ```json
//! {
//!   "topTracks": [{"name": "Song A", "plays": 12}],
//!   "totalHours": 41.7,
//!   "skipRate": 0.18,
//!   "monthlyDiscoveries": {"2023-01": 140}
//! }
//! ```
//!
//! Everything goes to stdout except progress, which is drawn on stderr so JSON output
//! stays pipeable.

use crate::bench::BenchResult;
use crate::report::{RankedEntry, Report};
use crate::scheduler::Progress;
use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::io::Write;

pub struct DisplayManager {
    json_pretty: bool,
}

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DisplayManager {
    pub fn new(json_pretty: bool) -> Self {
        Self { json_pretty }
    }

    pub fn to_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let rendered = if self.json_pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.context("Failed to serialize output to JSON")
    }

    pub fn display_report(&self, report: &Report, json_output: bool) -> Result<()> {
        if json_output {
            println!("{}", self.to_json(report)?);
            return Ok(());
        }

        println!("\n{}", "=".repeat(80).bright_cyan());
        println!("{}", "Listening History Report".bright_white().bold());
        println!("{}", "=".repeat(80).bright_cyan());

        println!(
            "\n{} {} plays • {} • {} unique tracks\n",
            "📊".bright_yellow(),
            report.total_plays.to_string().bright_white().bold(),
            format!("{:.1} hours", report.total_hours).bright_green().bold(),
            report.unique_tracks.to_string().bright_white().bold()
        );
        println!(
            "   Skip rate: {} ({} skipped)",
            percent(report.skip_rate).bright_yellow(),
            report.total_skipped.to_string().bright_white()
        );
        println!(
            "   Repeat plays: {}",
            report.repeat_tracks.to_string().bright_white()
        );
        println!(
            "   Exploration ratio: {}",
            percent(report.exploration_ratio).bright_yellow()
        );

        print_ranking("🎵", "Top tracks", &report.top_tracks);
        print_ranking("🎤", "Top artists", &report.top_artists);

        if !report.most_skipped_artists.is_empty() {
            println!("\n{} {}:", "⏭".bright_blue(), "Most skipped artists".bold());
            for (rank, entry) in report.most_skipped_artists.iter().enumerate() {
                println!(
                    "   {:>2}. {}: {} ({}/{})",
                    rank + 1,
                    entry.name.bright_cyan(),
                    percent(entry.ratio).bright_yellow(),
                    entry.skipped,
                    entry.total
                );
            }
        }

        if !report.skips_platform.is_empty() {
            println!("\n{} {}:", "📱".bright_blue(), "Skip rate by platform".bold());
            for (platform, ratio) in &report.skips_platform {
                println!(
                    "   {}: {}",
                    platform.bright_cyan(),
                    percent(*ratio).bright_yellow()
                );
            }
        }

        if !report.monthly_new_tracks.is_empty() {
            println!(
                "\n{} {}:",
                "📅".bright_blue(),
                "Distinct tracks / first-time discoveries by month".bold()
            );
            for (month, distinct) in &report.monthly_new_tracks {
                let discovered = report.monthly_discoveries.get(month).copied().unwrap_or(0);
                println!(
                    "   {}: {} / {}",
                    month.bright_white().bold(),
                    distinct.to_string().bright_white(),
                    discovered.to_string().bright_green()
                );
            }
        }

        println!();
        Ok(())
    }

    pub fn display_bench(&self, results: &[BenchResult], json_output: bool) -> Result<()> {
        if json_output {
            println!("{}", self.to_json(&results)?);
            return Ok(());
        }

        println!("\n{}", "Batch scheduling benchmark".bright_white().bold());
        println!(
            "{}",
            format!(
                "{:>10} {:>12} {:>8} {:>10} {:>12} {:>14}",
                "batch", "concurrency", "batches", "peak", "elapsed ms", "records/s"
            )
            .bright_cyan()
        );

        let best = results
            .iter()
            .map(|r| r.records_per_sec)
            .fold(f64::MIN, f64::max);
        for result in results {
            let line = format!(
                "{:>10} {:>12} {:>8} {:>10} {:>12.1} {:>14.0}",
                result.batch_size,
                result.max_concurrency,
                result.batches,
                result.peak_in_flight,
                result.elapsed.as_secs_f64() * 1000.0,
                result.records_per_sec
            );
            if result.records_per_sec >= best {
                println!("{}", line.bright_green().bold());
            } else {
                println!("{line}");
            }
        }
        println!();
        Ok(())
    }

    /// Redraw a single progress line on stderr
    pub fn display_progress(&self, progress: Progress) {
        let mut stderr = std::io::stderr();
        let _ = write!(
            stderr,
            "\r{} {}/{} records ({:.0}%)",
            "⏳".bright_yellow(),
            progress.processed,
            progress.total,
            progress.fraction() * 100.0
        );
        if progress.processed >= progress.total {
            let _ = writeln!(stderr);
        }
        let _ = stderr.flush();
    }
}

fn print_ranking(icon: &str, title: &str, entries: &[RankedEntry]) {
    if entries.is_empty() {
        return;
    }
    println!("\n{} {}:", icon.bright_blue(), title.bold());
    for (rank, entry) in entries.iter().enumerate() {
        println!(
            "   {:>2}. {} ({} plays)",
            rank + 1,
            entry.name.bright_cyan(),
            entry.plays.to_string().bright_white()
        );
    }
}

fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::models::ListeningEvent;
    use crate::report::finalize;

    #[test]
    fn test_percent_formatting() {
        assert_eq!(percent(0.5), "50.0%");
        assert_eq!(percent(0.0), "0.0%");
    }

    #[test]
    fn test_compact_json_uses_camel_case() {
        let summary = analyze(&[ListeningEvent::new("A", "X", "2023-01-01T00:00:00Z", 1000)])
            .unwrap();
        let json = DisplayManager::new(false).to_json(&finalize(&summary)).unwrap();
        assert!(!json.contains('\n'));
        assert!(json.contains("\"topTracks\""));
        assert!(json.contains("\"monthlyDiscoveries\""));
    }
}
