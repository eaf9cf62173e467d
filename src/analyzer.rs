//! Per-Batch Analyzer
//!
//! Computes the raw-count [`BatchSummary`] of one batch of listening events in a single
//! pass. The function is pure: it owns its output, touches no shared state and performs no
//! I/O, so any number of batches can be analyzed in parallel.
//!
//! ## Validation
//!
//! A record is counted only if it has a non-empty track name, a non-empty artist name, a
//! timestamp and a numeric `ms_played`. Invalid records are dropped silently. A batch in
//! which nothing survives is reported as [`AnalysisError::EmptyBatch`] rather than turned
//! into a zero summary, which would be indistinguishable from an empty global state.
//!
//! ## Ordinals
//!
//! Each counted key remembers the index (within the batch) of the first record it appeared
//! in. The scheduler shifts these by the batch offset with [`BatchSummary::rebase`] so that
//! ranking ties resolve by first appearance across the whole input.

use crate::error::AnalysisError;
use crate::models::{BatchSummary, ListeningEvent, SkipCounts, Tally};
use tracing::trace;

/// Analyze one batch of raw events
pub fn analyze(events: &[ListeningEvent]) -> Result<BatchSummary, AnalysisError> {
    let mut summary = BatchSummary::default();

    for (position, event) in events.iter().enumerate() {
        let Some(valid) = event.validate() else {
            continue;
        };
        let ordinal = position as u64;

        summary
            .track_play_counts
            .entry(valid.track.to_string())
            .or_insert_with(|| Tally::new(ordinal))
            .count += 1;
        summary
            .artist_play_counts
            .entry(valid.artist.to_string())
            .or_insert_with(|| Tally::new(ordinal))
            .count += 1;

        summary.total_ms_played = summary.total_ms_played.saturating_add(valid.ms_played);
        summary.total_plays += 1;
        if valid.skipped {
            summary.total_skipped += 1;
        }

        summary.unique_tracks.insert(valid.track.to_string());

        if let Some(platform) = valid.platform {
            summary
                .skip_by_platform
                .entry(platform.to_string())
                .or_insert_with(SkipCounts::default)
                .record(valid.skipped);
        }
        summary
            .skip_by_artist
            .entry(valid.artist.to_string())
            .or_insert_with(SkipCounts::default)
            .record(valid.skipped);

        summary
            .monthly_new_track_sets
            .entry(valid.month().to_string())
            .or_default()
            .insert(valid.track.to_string());
    }

    if summary.is_empty() {
        return Err(AnalysisError::EmptyBatch {
            submitted: events.len(),
        });
    }

    trace!(
        submitted = events.len(),
        valid = summary.total_plays,
        unique_tracks = summary.unique_tracks.len(),
        "Analyzed batch"
    );

    Ok(summary)
}
