#![allow(dead_code)]

use listen_stats::ListeningEvent;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

const PLATFORMS: [&str; 3] = ["android", "ios", "web"];

/// Deterministic history with repeats, skips, several months and a few broken records
pub fn sample_history(count: usize) -> Vec<ListeningEvent> {
    (0..count)
        .map(|i| {
            if i % 97 == 13 {
                // missing artist, dropped by validation
                return ListeningEvent {
                    track_name: Some(format!("Track {}", i % 41)),
                    ..ListeningEvent::default()
                };
            }
            let month = 1 + (i / 500) % 12;
            let mut event = ListeningEvent::new(
                &format!("Track {}", (i * 7) % 41),
                &format!("Artist {}", i % 9),
                &format!("2023-{month:02}-{:02}T12:00:00Z", 1 + i % 28),
                30_000 + (i as u64 % 5) * 1_000,
            )
            .with_skipped(i % 4 == 0);
            if i % 5 != 0 {
                event = event.with_platform(PLATFORMS[i % PLATFORMS.len()]);
            }
            event
        })
        .collect()
}

pub fn event_json(track: &str, artist: &str, ts: &str, ms_played: u64) -> serde_json::Value {
    json!({
        "master_metadata_track_name": track,
        "master_metadata_album_artist_name": artist,
        "ts": ts,
        "ms_played": ms_played,
        "skipped": false,
        "platform": "android",
        "conn_country": "SE"
    })
}

pub fn write_history(dir: &Path, filename: &str, events: &[ListeningEvent]) -> PathBuf {
    let path = dir.join(filename);
    let content = serde_json::to_string(events).unwrap();
    fs::write(&path, content).unwrap();
    path
}
