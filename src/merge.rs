//! Result Merger
//!
//! Folding summaries together is a commutative monoid over every field: integer
//! addition for counts and totals, set union for track sets, and `min` for the
//! first-seen ordinals. The empty summary is the identity. Because the fold never
//! depends on order, the scheduler may merge batches in whatever order they complete.
//!
//! Derived values (ratios, repeat counts, top-N lists) are deliberately absent here:
//! they are computed once from the fully merged aggregate in [`crate::report`].

use crate::models::{BatchSummary, GlobalAggregate, SkipCounts, Tally};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

impl BatchSummary {
    /// The all-zero aggregate every run starts from
    pub fn identity() -> GlobalAggregate {
        BatchSummary::default()
    }

    /// Combine two summaries into one
    pub fn merge(mut self, other: BatchSummary) -> BatchSummary {
        self.absorb(other);
        self
    }

    /// Fold `other` into `self` in place
    pub fn absorb(&mut self, other: BatchSummary) {
        merge_maps(&mut self.track_play_counts, other.track_play_counts, Tally::combine);
        merge_maps(&mut self.artist_play_counts, other.artist_play_counts, Tally::combine);

        self.total_ms_played = self.total_ms_played.saturating_add(other.total_ms_played);
        self.total_skipped += other.total_skipped;
        self.total_plays += other.total_plays;

        self.unique_tracks.extend(other.unique_tracks);

        merge_maps(&mut self.skip_by_platform, other.skip_by_platform, SkipCounts::combine);
        merge_maps(&mut self.skip_by_artist, other.skip_by_artist, SkipCounts::combine);

        for (month, tracks) in other.monthly_new_track_sets {
            union_into(self.monthly_new_track_sets.entry(month).or_default(), tracks);
        }
    }

    /// Shift batch-local first-seen ordinals to global ones
    pub fn rebase(mut self, offset: usize) -> BatchSummary {
        let offset = offset as u64;
        for tally in self
            .track_play_counts
            .values_mut()
            .chain(self.artist_play_counts.values_mut())
        {
            tally.first_seen += offset;
        }
        self
    }
}

fn merge_maps<K, V>(target: &mut HashMap<K, V>, source: HashMap<K, V>, combine: fn(V, V) -> V)
where
    K: Eq + Hash,
    V: Copy,
{
    for (key, value) in source {
        target
            .entry(key)
            .and_modify(|existing| *existing = combine(*existing, value))
            .or_insert(value);
    }
}

fn union_into(target: &mut HashSet<String>, source: HashSet<String>) {
    if target.is_empty() {
        *target = source;
    } else {
        target.extend(source);
    }
}

/// Fold any number of summaries, starting from the identity
pub fn merge_all<I>(summaries: I) -> GlobalAggregate
where
    I: IntoIterator<Item = BatchSummary>,
{
    summaries
        .into_iter()
        .fold(BatchSummary::identity(), BatchSummary::merge)
}
