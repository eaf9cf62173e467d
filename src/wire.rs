//! Wire format of the remote aggregation call
//!
//! The endpoint answers a batch submission with a [`WireSummary`]: the raw counts of the
//! batch, with sets rendered as arrays. Count objects are written in first-seen order and
//! read back preserving that order, which is how batch-local ordinals survive the trip
//! without an extra field.

use crate::models::{BatchSummary, SkipCounts, Tally};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Key/count pairs in first-seen order, encoded as a JSON object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedCounts(pub Vec<(String, u64)>);

impl OrderedCounts {
    fn from_tallies(counts: &HashMap<String, Tally>) -> Self {
        let mut entries: Vec<(&String, &Tally)> = counts.iter().collect();
        entries.sort_by_key(|(_, tally)| tally.first_seen);
        Self(
            entries
                .into_iter()
                .map(|(name, tally)| (name.clone(), tally.count))
                .collect(),
        )
    }

    fn into_tallies(self) -> HashMap<String, Tally> {
        let mut tallies = HashMap::with_capacity(self.0.len());
        for (position, (name, count)) in self.0.into_iter().enumerate() {
            tallies
                .entry(name)
                .and_modify(|tally: &mut Tally| tally.count += count)
                .or_insert(Tally {
                    count,
                    first_seen: position as u64,
                });
        }
        tallies
    }
}

impl Serialize for OrderedCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, count) in &self.0 {
            map.serialize_entry(name, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OrderedCounts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedCountsVisitor;

        impl<'de> Visitor<'de> for OrderedCountsVisitor {
            type Value = OrderedCounts;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an object of name to play count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, count)) = access.next_entry::<String, u64>()? {
                    entries.push((name, count));
                }
                Ok(OrderedCounts(entries))
            }
        }

        deserializer.deserialize_map(OrderedCountsVisitor)
    }
}

/// 200 response body of a batch submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireSummary {
    pub top_tracks_counts: OrderedCounts,
    pub top_artists_counts: OrderedCounts,
    pub total_ms_played: u64,
    pub total_skipped: u64,
    pub total_plays: u64,
    /// Batch-local and informational; ignored when decoding
    #[serde(default)]
    pub repeat_tracks: u64,
    pub unique_tracks: Vec<String>,
    #[serde(default)]
    pub skips_platform_counts: BTreeMap<String, SkipCounts>,
    #[serde(default)]
    pub skips_artist_counts: BTreeMap<String, SkipCounts>,
    #[serde(default)]
    pub monthly_track_sets: BTreeMap<String, Vec<String>>,
}

/// Error response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl From<&BatchSummary> for WireSummary {
    fn from(summary: &BatchSummary) -> Self {
        Self {
            top_tracks_counts: OrderedCounts::from_tallies(&summary.track_play_counts),
            top_artists_counts: OrderedCounts::from_tallies(&summary.artist_play_counts),
            total_ms_played: summary.total_ms_played,
            total_skipped: summary.total_skipped,
            total_plays: summary.total_plays,
            repeat_tracks: summary.repeat_plays(),
            unique_tracks: sorted(summary.unique_tracks.iter()),
            skips_platform_counts: summary
                .skip_by_platform
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            skips_artist_counts: summary
                .skip_by_artist
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            monthly_track_sets: summary
                .monthly_new_track_sets
                .iter()
                .map(|(month, tracks)| (month.clone(), sorted(tracks.iter())))
                .collect(),
        }
    }
}

impl From<WireSummary> for BatchSummary {
    fn from(wire: WireSummary) -> Self {
        Self {
            track_play_counts: wire.top_tracks_counts.into_tallies(),
            artist_play_counts: wire.top_artists_counts.into_tallies(),
            total_ms_played: wire.total_ms_played,
            total_skipped: wire.total_skipped,
            total_plays: wire.total_plays,
            unique_tracks: wire.unique_tracks.into_iter().collect(),
            skip_by_platform: wire.skips_platform_counts.into_iter().collect(),
            skip_by_artist: wire.skips_artist_counts.into_iter().collect(),
            monthly_new_track_sets: wire
                .monthly_track_sets
                .into_iter()
                .map(|(month, tracks)| (month, tracks.into_iter().collect()))
                .collect(),
        }
    }
}

fn sorted<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut items: Vec<String> = items.cloned().collect();
    items.sort();
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::models::ListeningEvent;

    #[test]
    fn test_counts_keep_first_seen_order_on_the_wire() {
        let summary = analyze(&[
            ListeningEvent::new("zebra", "X", "2024-01-01", 1),
            ListeningEvent::new("apple", "X", "2024-01-01", 1),
            ListeningEvent::new("zebra", "X", "2024-01-01", 1),
        ])
        .unwrap();

        let json = serde_json::to_string(&WireSummary::from(&summary)).unwrap();
        let zebra = json.find("\"zebra\":2").unwrap();
        let apple = json.find("\"apple\":1").unwrap();
        assert!(zebra < apple);

        let decoded: WireSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(
            decoded.top_tracks_counts.0,
            vec![("zebra".to_string(), 2), ("apple".to_string(), 1)]
        );
    }

    #[test]
    fn test_decoded_summary_matches_local_summary() {
        let summary = analyze(&[
            ListeningEvent::new("A", "X", "2024-01-01", 10).with_platform("ios"),
            ListeningEvent::new("B", "Y", "2024-02-01", 20).with_skipped(true),
            ListeningEvent::new("A", "Y", "2024-02-01", 30),
        ])
        .unwrap();

        let json = serde_json::to_vec(&WireSummary::from(&summary)).unwrap();
        let wire: WireSummary = serde_json::from_slice(&json).unwrap();
        let decoded = BatchSummary::from(wire);

        assert_eq!(decoded.total_plays, summary.total_plays);
        assert_eq!(decoded.skip_by_artist, summary.skip_by_artist);
        assert_eq!(decoded.skip_by_platform, summary.skip_by_platform);
        assert_eq!(decoded.unique_tracks, summary.unique_tracks);
        assert_eq!(decoded.monthly_new_track_sets, summary.monthly_new_track_sets);
        assert_eq!(decoded.track_play_counts["A"].count, 2);
        assert!(
            decoded.track_play_counts["A"].first_seen < decoded.track_play_counts["B"].first_seen
        );
    }

    #[test]
    fn test_repeat_tracks_is_batch_local() {
        let summary = analyze(&[
            ListeningEvent::new("A", "X", "2024-01-01", 1),
            ListeningEvent::new("A", "X", "2024-01-01", 1),
        ])
        .unwrap();
        let wire = WireSummary::from(&summary);
        assert_eq!(wire.repeat_tracks, 1);
        assert_eq!(wire.unique_tracks, vec!["A".to_string()]);
    }
}
