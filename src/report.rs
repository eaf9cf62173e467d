//! Finalization
//!
//! Turns a fully merged [`GlobalAggregate`] into the [`Report`] handed to presentation.
//! This is the only place ratios and rankings are derived; it runs once per analysis,
//! after every batch has been merged.

use crate::models::{GlobalAggregate, SkipCounts, Tally};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Default length of the ranked lists
pub const DEFAULT_TOP_N: usize = 10;

const MS_PER_HOUR: f64 = 1000.0 * 60.0 * 60.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub name: String,
    pub plays: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRatio {
    pub name: String,
    pub ratio: f64,
    pub skipped: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub top_tracks: Vec<RankedEntry>,
    pub top_artists: Vec<RankedEntry>,
    pub total_hours: f64,
    pub total_ms_played: u64,
    pub total_plays: u64,
    pub total_skipped: u64,
    pub unique_tracks: usize,
    pub skip_rate: f64,
    pub skips_platform: BTreeMap<String, f64>,
    pub skips_artist: BTreeMap<String, f64>,
    pub most_skipped_artists: Vec<RankedRatio>,
    pub repeat_tracks: u64,
    pub exploration_ratio: f64,
    pub monthly_new_tracks: BTreeMap<String, usize>,
    pub monthly_discoveries: BTreeMap<String, usize>,
}

/// Finalize with the default top-N length
pub fn finalize(aggregate: &GlobalAggregate) -> Report {
    finalize_with(aggregate, DEFAULT_TOP_N)
}

pub fn finalize_with(aggregate: &GlobalAggregate, top_n: usize) -> Report {
    let skip_rate = if aggregate.total_plays > 0 {
        aggregate.total_skipped as f64 / aggregate.total_plays as f64
    } else {
        0.0
    };

    Report {
        top_tracks: top_by_count(&aggregate.track_play_counts, top_n),
        top_artists: top_by_count(&aggregate.artist_play_counts, top_n),
        total_hours: aggregate.total_ms_played as f64 / MS_PER_HOUR,
        total_ms_played: aggregate.total_ms_played,
        total_plays: aggregate.total_plays,
        total_skipped: aggregate.total_skipped,
        unique_tracks: aggregate.unique_tracks.len(),
        skip_rate,
        skips_platform: ratios(&aggregate.skip_by_platform),
        skips_artist: ratios(&aggregate.skip_by_artist),
        most_skipped_artists: top_by_ratio(
            &aggregate.skip_by_artist,
            &aggregate.artist_play_counts,
            top_n,
        ),
        repeat_tracks: aggregate.repeat_plays(),
        exploration_ratio: exploration_ratio(&aggregate.track_play_counts),
        monthly_new_tracks: aggregate
            .monthly_new_track_sets
            .iter()
            .map(|(month, tracks)| (month.clone(), tracks.len()))
            .collect(),
        monthly_discoveries: monthly_discoveries(aggregate),
    }
}

/// Highest counts first; equal counts keep first-seen order
fn top_by_count(counts: &HashMap<String, Tally>, top_n: usize) -> Vec<RankedEntry> {
    let mut ranked: Vec<(&String, &Tally)> = counts.iter().collect();
    ranked.sort_by(|(_, a), (_, b)| {
        b.count
            .cmp(&a.count)
            .then(a.first_seen.cmp(&b.first_seen))
    });

    ranked
        .into_iter()
        .take(top_n)
        .map(|(name, tally)| RankedEntry {
            name: name.clone(),
            plays: tally.count,
        })
        .collect()
}

fn top_by_ratio(
    skips: &HashMap<String, SkipCounts>,
    order: &HashMap<String, Tally>,
    top_n: usize,
) -> Vec<RankedRatio> {
    let first_seen = |name: &str| order.get(name).map_or(u64::MAX, |t| t.first_seen);

    let mut ranked: Vec<(&String, &SkipCounts)> = skips.iter().collect();
    ranked.sort_by(|(name_a, a), (name_b, b)| {
        b.ratio()
            .partial_cmp(&a.ratio())
            .unwrap_or(Ordering::Equal)
            .then_with(|| first_seen(name_a).cmp(&first_seen(name_b)))
            .then_with(|| name_a.cmp(name_b))
    });

    ranked
        .into_iter()
        .take(top_n)
        .map(|(name, counts)| RankedRatio {
            name: name.clone(),
            ratio: counts.ratio(),
            skipped: counts.skipped,
            total: counts.total,
        })
        .collect()
}

fn ratios(skips: &HashMap<String, SkipCounts>) -> BTreeMap<String, f64> {
    skips
        .iter()
        .map(|(key, counts)| (key.clone(), counts.ratio()))
        .collect()
}

/// `1 - (tracks played more than once) / (distinct tracks)`
fn exploration_ratio(track_counts: &HashMap<String, Tally>) -> f64 {
    let distinct = track_counts.len();
    if distinct == 0 {
        return 0.0;
    }
    let repeated = track_counts.values().filter(|t| t.count > 1).count();
    1.0 - repeated as f64 / distinct as f64
}

/// Tracks counted under the earliest month they appear in anywhere in the input
fn monthly_discoveries(aggregate: &GlobalAggregate) -> BTreeMap<String, usize> {
    let mut first_month: HashMap<&str, &str> = HashMap::new();
    // BTreeMap iterates months in ascending order, so the first insert wins
    for (month, tracks) in &aggregate.monthly_new_track_sets {
        for track in tracks {
            first_month.entry(track.as_str()).or_insert(month.as_str());
        }
    }

    let mut discoveries: BTreeMap<String, usize> = aggregate
        .monthly_new_track_sets
        .keys()
        .map(|month| (month.clone(), 0))
        .collect();
    for month in first_month.into_values() {
        if let Some(count) = discoveries.get_mut(month) {
            *count += 1;
        }
    }
    discoveries
}
