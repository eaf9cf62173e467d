//! Property-based tests for the merge algebra

use listen_stats::{analyze, finalize, merge_all, BatchSummary, ListeningEvent};
use proptest::prelude::*;

fn event_strategy() -> impl Strategy<Value = ListeningEvent> {
    (
        0usize..8,
        0usize..4,
        1u32..5,
        0u64..300_000,
        any::<bool>(),
        prop::option::of(prop::sample::select(vec!["android", "ios", "web"])),
    )
        .prop_map(|(track, artist, month, ms, skipped, platform)| {
            let event = ListeningEvent::new(
                &format!("Track {track}"),
                &format!("Artist {artist}"),
                &format!("2023-{month:02}-10T08:00:00Z"),
                ms,
            )
            .with_skipped(skipped);
            match platform {
                Some(p) => event.with_platform(p),
                None => event,
            }
        })
}

fn history(max: usize) -> impl Strategy<Value = Vec<ListeningEvent>> {
    prop::collection::vec(event_strategy(), 1..max)
}

/// Summary of `events` as if they started at global position `offset`
fn summary_at(events: &[ListeningEvent], offset: usize) -> BatchSummary {
    analyze(events).unwrap().rebase(offset)
}

proptest! {
    #[test]
    fn test_identity_is_neutral(events in history(40)) {
        let summary = summary_at(&events, 0);
        prop_assert_eq!(BatchSummary::identity().merge(summary.clone()), summary.clone());
        prop_assert_eq!(summary.clone().merge(BatchSummary::identity()), summary);
    }

    #[test]
    fn test_merge_is_commutative(a in history(30), b in history(30)) {
        let left = summary_at(&a, 0);
        let right = summary_at(&b, a.len());
        prop_assert_eq!(left.clone().merge(right.clone()), right.merge(left));
    }

    #[test]
    fn test_merge_is_associative(a in history(20), b in history(20), c in history(20)) {
        let x = summary_at(&a, 0);
        let y = summary_at(&b, a.len());
        let z = summary_at(&c, a.len() + b.len());

        let grouped_left = x.clone().merge(y.clone()).merge(z.clone());
        let grouped_right = x.merge(y.merge(z));
        prop_assert_eq!(grouped_left, grouped_right);
    }

    #[test]
    fn test_any_split_matches_single_pass(events in history(120), cuts in prop::collection::vec(1usize..120, 0..6)) {
        let mut bounds: Vec<usize> = cuts.into_iter().filter(|&c| c < events.len()).collect();
        bounds.push(0);
        bounds.push(events.len());
        bounds.sort_unstable();
        bounds.dedup();

        let parts: Vec<BatchSummary> = bounds
            .windows(2)
            .map(|w| summary_at(&events[w[0]..w[1]], w[0]))
            .collect();

        let single = analyze(&events).unwrap();
        let merged = merge_all(parts.into_iter().rev());
        prop_assert_eq!(&merged, &single);

        let expected = finalize(&single);
        let report = finalize(&merged);
        prop_assert_eq!(report.top_tracks, expected.top_tracks);
        prop_assert_eq!(report.top_artists, expected.top_artists);
        prop_assert_eq!(report.repeat_tracks, expected.repeat_tracks);
        prop_assert!((report.skip_rate - expected.skip_rate).abs() < 1e-9);
    }
}
