//! End-to-end runs through the HTTP client against an in-process endpoint
#![cfg(all(feature = "remote", feature = "server"))]

mod common;

use common::sample_history;
use listen_stats::endpoint::{router, ANALYZE_PATH};
use listen_stats::error::{AnalysisError, RemoteCallError, RunError};
use listen_stats::remote::RemoteAnalyzer;
use listen_stats::scheduler::Batch;
use listen_stats::{
    analyze, finalize, BatchAnalyzer, BatchScheduler, ListeningEvent, SchedulePolicy,
    SchedulerOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Serve the endpoint on an ephemeral port and return its URL
async fn spawn_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router()).await.unwrap();
    });
    format!("http://{address}{ANALYZE_PATH}")
}

#[tokio::test]
async fn test_remote_run_matches_local_analysis() {
    let url = spawn_endpoint().await;
    let events = sample_history(2_500);

    for policy in [SchedulePolicy::SlidingWindow, SchedulePolicy::FixedGroup] {
        let scheduler = BatchScheduler::new(
            Arc::new(RemoteAnalyzer::new(url.clone())),
            SchedulerOptions {
                batch_size: 400,
                max_concurrency: 3,
                policy,
                call_timeout: Some(Duration::from_secs(30)),
            },
        );
        let outcome = scheduler.execute(&events, |_| {}).await.unwrap();

        let expected = finalize(&analyze(&events).unwrap());
        let report = finalize(&outcome.aggregate);
        assert_eq!(outcome.stats.batches, 7);
        assert_eq!(report.top_tracks, expected.top_tracks);
        assert_eq!(report.top_artists, expected.top_artists);
        assert_eq!(report.total_plays, expected.total_plays);
        assert_eq!(report.repeat_tracks, expected.repeat_tracks);
        assert_eq!(report.skips_platform, expected.skips_platform);
        assert_eq!(report.most_skipped_artists, expected.most_skipped_artists);
        assert_eq!(report.monthly_discoveries, expected.monthly_discoveries);
    }
}

#[tokio::test]
async fn test_rejected_batch_surfaces_server_message() {
    let url = spawn_endpoint().await;
    let analyzer = RemoteAnalyzer::new(url);

    let err = analyzer
        .analyze_batch(Batch {
            index: 0,
            offset: 0,
            events: vec![ListeningEvent::default()],
        })
        .await
        .unwrap_err();

    match err {
        AnalysisError::RemoteCall(RemoteCallError::Status { status, message }) => {
            assert_eq!(status, 400);
            assert!(message.contains("no valid"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_the_run() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let scheduler = BatchScheduler::new(
        Arc::new(RemoteAnalyzer::new(format!("http://{address}{ANALYZE_PATH}"))),
        SchedulerOptions {
            batch_size: 10,
            ..SchedulerOptions::default()
        },
    );
    let err = scheduler.run(&sample_history(30)).await.unwrap_err();

    assert!(matches!(
        err,
        RunError::Batch(ref f) if matches!(f.cause, AnalysisError::RemoteCall(RemoteCallError::Transport(_)))
    ));
}
