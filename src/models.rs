//! Core Data Models
//!
//! This module defines the data structures that flow through the batched aggregation
//! pipeline, from raw exported records to raw-count summaries.
//!
//! ## Data Flow
//!
//! 1. **Raw Data**: [`ListeningEvent`] - one played track instance as exported
//! 2. **Validation**: [`ValidEvent`] - borrowed view of an event that passed validation
//! 3. **Per-batch counts**: [`BatchSummary`] - raw counts for one batch
//! 4. **Running fold**: [`GlobalAggregate`] - the merge of every summary seen so far
//!
//! Summaries only ever carry counts and sets. Ratios are derived once, at finalization
//! (see [`crate::report`]), so merging never has to combine two already-divided values.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// One exported listening record
///
/// Every field is optional and leniently decoded: a field holding the wrong JSON type is
/// treated as absent, so a single odd record never fails a whole request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListeningEvent {
    #[serde(
        rename = "master_metadata_track_name",
        default,
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub track_name: Option<String>,
    #[serde(
        rename = "master_metadata_album_artist_name",
        default,
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub artist_name: Option<String>,
    #[serde(
        rename = "ts",
        default,
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub ms_played: Option<u64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub skipped: bool,
    #[serde(
        default,
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub platform: Option<String>,
}

impl ListeningEvent {
    pub fn new(track: &str, artist: &str, timestamp: &str, ms_played: u64) -> Self {
        Self {
            track_name: Some(track.to_string()),
            artist_name: Some(artist.to_string()),
            timestamp: Some(timestamp.to_string()),
            ms_played: Some(ms_played),
            skipped: false,
            platform: None,
        }
    }

    pub fn with_skipped(mut self, skipped: bool) -> Self {
        self.skipped = skipped;
        self
    }

    pub fn with_platform(mut self, platform: &str) -> Self {
        self.platform = Some(platform.to_string());
        self
    }

    /// Decode one element of a request array; anything that is not an event object
    /// becomes an event that fails validation.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Borrow the validated fields, or `None` if the record must be dropped
    pub fn validate(&self) -> Option<ValidEvent<'_>> {
        let track = non_empty(self.track_name.as_deref())?;
        let artist = non_empty(self.artist_name.as_deref())?;
        let timestamp = self.timestamp.as_deref()?;
        let ms_played = self.ms_played?;

        Some(ValidEvent {
            track,
            artist,
            timestamp,
            ms_played,
            skipped: self.skipped,
            platform: non_empty(self.platform.as_deref()),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_some()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// An event that passed validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidEvent<'a> {
    pub track: &'a str,
    pub artist: &'a str,
    pub timestamp: &'a str,
    pub ms_played: u64,
    pub skipped: bool,
    pub platform: Option<&'a str>,
}

impl<'a> ValidEvent<'a> {
    /// Calendar month bucket: the first seven characters of the timestamp (`YYYY-MM`).
    /// No timezone conversion is applied.
    pub fn month(&self) -> &'a str {
        month_prefix(self.timestamp)
    }
}

pub fn month_prefix(timestamp: &str) -> &str {
    match timestamp.char_indices().nth(7) {
        Some((end, _)) => &timestamp[..end],
        None => timestamp,
    }
}

/// Play count for one key plus the ordinal of the first record it appeared in
///
/// `first_seen` combines by `min`, so ranking ties can be broken by first appearance no
/// matter in which order summaries were merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub count: u64,
    pub first_seen: u64,
}

impl Tally {
    pub fn new(first_seen: u64) -> Self {
        Self { count: 0, first_seen }
    }

    pub fn combine(self, other: Tally) -> Tally {
        Tally {
            count: self.count + other.count,
            first_seen: self.first_seen.min(other.first_seen),
        }
    }
}

/// Raw skip counts for one platform or artist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    pub skipped: u64,
    pub total: u64,
}

impl SkipCounts {
    pub fn record(&mut self, skipped: bool) {
        self.total += 1;
        if skipped {
            self.skipped += 1;
        }
    }

    pub fn combine(self, other: SkipCounts) -> SkipCounts {
        SkipCounts {
            skipped: self.skipped + other.skipped,
            total: self.total + other.total,
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.total > 0 {
            self.skipped as f64 / self.total as f64
        } else {
            0.0
        }
    }
}

/// Raw-count statistics for one batch
///
/// Created by [`crate::analyzer::analyze`], immutable once returned, and folded into a
/// [`GlobalAggregate`] exactly once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub track_play_counts: HashMap<String, Tally>,
    pub artist_play_counts: HashMap<String, Tally>,
    pub total_ms_played: u64,
    pub total_skipped: u64,
    pub total_plays: u64,
    pub unique_tracks: HashSet<String>,
    pub skip_by_platform: HashMap<String, SkipCounts>,
    pub skip_by_artist: HashMap<String, SkipCounts>,
    /// Month (`YYYY-MM`) to the tracks observed in that month
    pub monthly_new_track_sets: BTreeMap<String, HashSet<String>>,
}

/// The running fold of every summary merged so far; same shape as a batch summary.
pub type GlobalAggregate = BatchSummary;

impl BatchSummary {
    /// Plays of a track that was already played before: `total_plays - |unique_tracks|`.
    /// Only meaningful for the summary it is called on; never sum it across batches.
    pub fn repeat_plays(&self) -> u64 {
        self.total_plays
            .saturating_sub(self.unique_tracks.len() as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.total_plays == 0
    }
}

mod lenient {
    use super::*;

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    pub fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => match n.as_u64() {
                Some(ms) => Some(ms),
                None => n
                    .as_f64()
                    .filter(|ms| ms.is_finite() && *ms >= 0.0 && *ms < u64::MAX as f64)
                    .map(|ms| ms.trunc() as u64),
            },
            _ => None,
        })
    }

    pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
    }
}
