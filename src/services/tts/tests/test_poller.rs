use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::fake_api::{FakeApi, completed, in_progress, queued, transport_error};
use crate::models::{Job, JobStatus};
use crate::services::tts::poller::{JobPoller, PollErrorPolicy, PollerConfig};

fn poller(api: std::sync::Arc<FakeApi>, policy: PollErrorPolicy, cap: Option<u32>) -> JobPoller {
    JobPoller::new(
        api,
        PollerConfig {
            interval: Duration::from_secs(2),
            max_attempts: cap,
            error_policy: policy,
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_emits_exactly_one_terminal_then_closes() {
    let api = FakeApi::new()
        .on_status(|id, idx| match idx {
            0 => Ok(queued(id)),
            1 => Ok(in_progress(id)),
            _ => Ok(completed(id)),
        })
        .shared();

    let updates: Vec<Job> = poller(api.clone(), PollErrorPolicy::Close, None)
        .poll("job-1", CancellationToken::new())
        .collect()
        .await;

    let statuses: Vec<JobStatus> = updates.iter().map(|job| job.status).collect();
    assert_eq!(
        statuses,
        vec![JobStatus::Queued, JobStatus::InProgress, JobStatus::Completed]
    );
    assert_eq!(updates.iter().filter(|job| job.is_terminal()).count(), 1);
    assert_eq!(api.status_calls("job-1"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_first_request_waits_one_interval() {
    let api = FakeApi::new().shared();
    let start = Instant::now();

    let mut updates = poller(api, PollErrorPolicy::Close, None)
        .poll("job-1", CancellationToken::new());
    let first = updates.next().await.unwrap();

    assert_eq!(first.status, JobStatus::Completed);
    assert!(start.elapsed() >= Duration::from_secs(2));
    assert!(updates.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stream_is_lazy() {
    let api = FakeApi::new().shared();
    let updates = poller(api.clone(), PollErrorPolicy::Close, None)
        .poll("job-1", CancellationToken::new());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.total_status_calls(), 0);
    drop(updates);
}

#[tokio::test(start_paused = true)]
async fn test_close_policy_ends_stream_on_error() {
    let api = FakeApi::new()
        .on_status(|id, idx| match idx {
            0 => Ok(in_progress(id)),
            _ => Err(transport_error()),
        })
        .shared();

    let updates: Vec<Job> = poller(api.clone(), PollErrorPolicy::Close, None)
        .poll("job-1", CancellationToken::new())
        .collect()
        .await;

    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].status, JobStatus::InProgress);
    assert_eq!(api.status_calls("job-1"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_skip_policy_keeps_polling_after_errors() {
    let api = FakeApi::new()
        .on_status(|id, idx| match idx {
            0 | 1 => Err(transport_error()),
            _ => Ok(completed(id)),
        })
        .shared();

    let updates: Vec<Job> = poller(api.clone(), PollErrorPolicy::Skip, Some(150))
        .poll("job-1", CancellationToken::new())
        .collect()
        .await;

    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].status, JobStatus::Completed);
    assert_eq!(api.status_calls("job-1"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_cap_closes_stream() {
    let api = FakeApi::new().on_status(|id, _| Ok(in_progress(id))).shared();

    let updates: Vec<Job> = poller(api.clone(), PollErrorPolicy::Skip, Some(150))
        .poll("job-1", CancellationToken::new())
        .collect()
        .await;

    assert_eq!(updates.len(), 150);
    assert!(updates.iter().all(|job| !job.is_terminal()));
    assert_eq!(api.status_calls("job-1"), 150);
}

#[tokio::test(start_paused = true)]
async fn test_failed_errors_count_towards_cap() {
    let api = FakeApi::new().on_status(|_, _| Err(transport_error())).shared();

    let updates: Vec<Job> = poller(api.clone(), PollErrorPolicy::Skip, Some(5))
        .poll("job-1", CancellationToken::new())
        .collect()
        .await;

    assert!(updates.is_empty());
    assert_eq!(api.status_calls("job-1"), 5);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_polling() {
    let api = FakeApi::new().on_status(|id, _| Ok(in_progress(id))).shared();
    let token = CancellationToken::new();
    let mut updates = poller(api.clone(), PollErrorPolicy::Close, None)
        .poll("job-1", token.clone());

    assert!(updates.next().await.is_some());
    token.cancel();
    assert!(updates.next().await.is_none());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.status_calls("job-1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_request_emits_nothing() {
    let api = FakeApi::new()
        .with_status_delay(Duration::from_secs(10))
        .shared();
    let token = CancellationToken::new();
    let mut updates = poller(api.clone(), PollErrorPolicy::Close, None)
        .poll("job-1", token.clone());

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            token.cancel();
        })
    };

    assert!(updates.next().await.is_none());
    canceller.await.unwrap();
    assert_eq!(api.status_calls("job-1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_drop_stops_polling() {
    let api = FakeApi::new().on_status(|id, _| Ok(in_progress(id))).shared();
    let mut updates = poller(api.clone(), PollErrorPolicy::Close, None)
        .poll("job-1", CancellationToken::new());

    assert!(updates.next().await.is_some());
    drop(updates);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.status_calls("job-1"), 1);
}
