//! Polling orchestration: terminal states, budgets, auth abort, cancellation.

use crate::mock_server::{envelope, failed, processing, succeeded, MockServerFixture};
use serde_json::json;
use std::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use vidgen_client::client::InMemoryProgressSink;
use vidgen_client::{
    ChannelProgressSink, ErrorClass, GenerationJob, GenerationRequest, JobState,
    NoopProgressSink, ProgressEvent,
};

const VIDEO_URL: &str = "https://cdn.example.com/out/abc123.mp4";

fn request() -> GenerationRequest {
    GenerationRequest::new("A fox running through @video")
        .with_reference_video("https://cdn.example.com/in.mp4")
}

#[tokio::test]
async fn test_completes_after_three_polls() {
    let mut fixture = MockServerFixture::new().await;
    let _submit = fixture.mock_submit_ok("abc123").await;
    let running = fixture.mock_status("abc123", processing(40.0), 2).await;
    let done = fixture.mock_status("abc123", succeeded(VIDEO_URL), 1).await;

    let sink = InMemoryProgressSink::new(64);
    let result = fixture.client().run(&request(), &sink).await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.state, JobState::Completed);
    assert_eq!(result.video_url.as_deref(), Some(VIDEO_URL));
    assert_eq!(result.job_id.as_deref(), Some("abc123"));
    assert_eq!(result.polls, 3);
    assert!(result.error.is_none());

    let events = sink.events();
    let first = events.first().unwrap();
    assert_eq!((first.state, first.percent), (JobState::Pending, Some(0)));
    let last = events.last().unwrap();
    assert_eq!((last.state, last.percent), (JobState::Completed, Some(100)));
    assert!(events
        .iter()
        .any(|e| e.state == JobState::Processing && e.percent == Some(40)));
    assert_eq!(
        events.iter().filter(|e| e.state == JobState::Completed).count(),
        1
    );

    running.assert_async().await;
    done.assert_async().await;
}

#[tokio::test]
async fn test_remote_failure_is_reported_with_class() {
    let mut fixture = MockServerFixture::new().await;
    let _submit = fixture.mock_submit_ok("abc123").await;
    let _status = fixture.mock_status("abc123", failed("insufficient balance"), 1).await;

    let result = fixture.client().run(&request(), &NoopProgressSink).await;
    assert!(!result.success);
    assert_eq!(result.state, JobState::Failed);
    assert_eq!(result.error.as_deref(), Some("insufficient balance"));
    assert_eq!(result.error_class, Some(ErrorClass::InsufficientBalance));
    assert_eq!(result.job_id.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn test_failure_without_message_uses_default() {
    let mut fixture = MockServerFixture::new().await;
    let _submit = fixture.mock_submit_ok("abc123").await;
    let _status = fixture
        .mock_status("abc123", json!({ "task_id": "abc123", "task_status": "failed" }), 1)
        .await;

    let result = fixture.client().run(&request(), &NoopProgressSink).await;
    assert_eq!(result.state, JobState::Failed);
    assert_eq!(result.error.as_deref(), Some("Generation failed"));
}

#[tokio::test]
async fn test_times_out_after_exact_poll_budget() {
    let mut fixture = MockServerFixture::new().await;
    let _submit = fixture.mock_submit_ok("abc123").await;
    let status = fixture.mock_status("abc123", processing(10.0), 4).await;

    let client = fixture.builder().max_poll_attempts(4).build().unwrap();
    let result = client.run(&request(), &NoopProgressSink).await;

    assert_eq!(result.state, JobState::TimedOut);
    assert_eq!(result.polls, 4);
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .starts_with("Generation timeout after"));
    status.assert_async().await;
}

#[tokio::test]
async fn test_completed_without_url_fails() {
    let mut fixture = MockServerFixture::new().await;
    let _submit = fixture.mock_submit_ok("abc123").await;
    let _status = fixture
        .mock_status(
            "abc123",
            json!({ "task_id": "abc123", "task_status": "succeed", "task_result": { "videos": [] } }),
            1,
        )
        .await;

    let sink = InMemoryProgressSink::new(16);
    let result = fixture.client().run(&request(), &sink).await;
    assert_eq!(result.state, JobState::Failed);
    assert_eq!(result.error.as_deref(), Some("No artifact URL in response"));

    let seen: Vec<(JobState, Option<u8>)> =
        sink.events().iter().map(|e| (e.state, e.percent)).collect();
    assert_eq!(
        seen,
        vec![(JobState::Pending, Some(0)), (JobState::Failed, None)]
    );
}

#[tokio::test]
async fn test_repeated_auth_failures_abort_early() {
    let mut fixture = MockServerFixture::new().await;
    let _submit = fixture.mock_submit_ok("abc123").await;
    let unauthorized = fixture
        .mock_status_raw("abc123", 401, r#"{"code":1004,"message":"token expired"}"#, 3)
        .await;

    let client = fixture.builder().max_poll_attempts(20).build().unwrap();
    let result = client.run(&request(), &NoopProgressSink).await;

    assert_eq!(result.state, JobState::Failed);
    assert_eq!(result.error_class, Some(ErrorClass::AuthError));
    assert_eq!(result.polls, 3);
    unauthorized.assert_async().await;
}

#[tokio::test]
async fn test_auth_failures_below_threshold_recover() {
    let mut fixture = MockServerFixture::new().await;
    let _submit = fixture.mock_submit_ok("abc123").await;
    let unauthorized = fixture
        .mock_status_raw("abc123", 401, r#"{"code":1004,"message":"token expired"}"#, 2)
        .await;
    let done = fixture.mock_status("abc123", succeeded(VIDEO_URL), 1).await;

    let result = fixture.client().run(&request(), &NoopProgressSink).await;
    assert!(result.success, "{result:?}");
    assert_eq!(result.polls, 3);
    unauthorized.assert_async().await;
    done.assert_async().await;
}

#[tokio::test]
async fn test_transient_poll_failures_are_skipped() {
    let mut fixture = MockServerFixture::new().await;
    let _submit = fixture.mock_submit_ok("abc123").await;
    let client = fixture
        .builder()
        .max_retry_attempts(1)
        .build()
        .unwrap();
    let flaky = fixture
        .mock_status_raw("abc123", 503, r#"{"code":5000,"message":"busy"}"#, 2)
        .await;
    let done = fixture.mock_status("abc123", succeeded(VIDEO_URL), 1).await;

    let result = client.run(&request(), &NoopProgressSink).await;
    assert!(result.success, "{result:?}");
    assert_eq!(result.polls, 3);
    flaky.assert_async().await;
    done.assert_async().await;
}

#[tokio::test]
async fn test_malformed_status_is_a_generic_failure() {
    let mut fixture = MockServerFixture::new().await;
    let _submit = fixture.mock_submit_ok("abc123").await;
    let _status = fixture.mock_status_raw("abc123", 200, "<html>oops</html>", 1).await;

    let result = fixture.client().run(&request(), &NoopProgressSink).await;
    assert_eq!(result.state, JobState::Failed);
    assert_eq!(result.error_class, Some(ErrorClass::Unknown));
    assert_eq!(result.polls, 1);
}

#[tokio::test]
async fn test_poll_is_side_effect_free() {
    let mut fixture = MockServerFixture::new().await;
    let status = fixture.mock_status("abc123", processing(55.0), 2).await;

    let client = fixture.client();
    let job = GenerationJob::new("abc123");
    let a = client.poll(&job).await.unwrap();
    let b = client.poll(&job).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.state, JobState::Processing);
    assert_eq!(a.percent, Some(55));
    status.assert_async().await;
}

#[tokio::test]
async fn test_poll_surfaces_api_error_code() {
    let mut fixture = MockServerFixture::new().await;
    let _status = fixture
        .mock_status_raw("abc123", 200, &envelope(1303, json!(null)).to_string(), 1)
        .await;

    let err = fixture
        .client()
        .poll(&GenerationJob::new("abc123"))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::QuotaExceeded);
}

#[tokio::test]
async fn test_panicking_sink_does_not_stop_polling() {
    let mut fixture = MockServerFixture::new().await;
    let _submit = fixture.mock_submit_ok("abc123").await;
    let _running = fixture.mock_status("abc123", processing(20.0), 1).await;
    let _done = fixture.mock_status("abc123", succeeded(VIDEO_URL), 1).await;

    let sink = |event: &ProgressEvent| {
        if event.state == JobState::Processing {
            panic!("sink bug");
        }
    };
    let result = fixture.client().run(&request(), &sink).await;
    assert!(result.success, "{result:?}");
    assert_eq!(result.polls, 2);
}

#[tokio::test]
async fn test_cancellation_resolves_promptly() {
    let mut fixture = MockServerFixture::new().await;
    let _submit = fixture.mock_submit_ok("abc123").await;
    let _status = fixture.mock_status("abc123", processing(5.0), 100).await;

    let client = fixture
        .builder()
        .poll_interval(Duration::from_millis(20))
        .max_poll_attempts(500)
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(80)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        client.run_with_cancel(&request(), &NoopProgressSink, cancel),
    )
    .await
    .expect("run resolves after cancellation");

    assert!(!result.success);
    assert_eq!(result.state, JobState::TimedOut);
    assert_eq!(result.error.as_deref(), Some("Generation cancelled"));
    assert_eq!(result.job_id.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn test_overall_timeout_caps_wall_clock() {
    let mut fixture = MockServerFixture::new().await;
    let _submit = fixture.mock_submit_ok("abc123").await;
    let _status = fixture.mock_status("abc123", processing(5.0), 100).await;

    let client = fixture
        .builder()
        .poll_interval(Duration::from_millis(20))
        .max_poll_attempts(500)
        .overall_timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    let result = client.run(&request(), &NoopProgressSink).await;
    assert_eq!(result.state, JobState::TimedOut);
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .starts_with("Generation timeout after"));
    assert!(result.polls < 500);
}

#[tokio::test]
async fn test_wait_resumes_existing_job() {
    let mut fixture = MockServerFixture::new().await;
    let _done = fixture.mock_status("job-7", succeeded(VIDEO_URL), 1).await;

    let result = fixture
        .client()
        .wait(
            &GenerationJob::new("job-7"),
            &NoopProgressSink,
            CancellationToken::new(),
        )
        .await;
    assert!(result.success);
    assert_eq!(result.job_id.as_deref(), Some("job-7"));
}

#[tokio::test]
async fn test_channel_sink_yields_finite_sequence() {
    let mut fixture = MockServerFixture::new().await;
    let _submit = fixture.mock_submit_ok("abc123").await;
    let _running = fixture.mock_status("abc123", processing(60.0), 1).await;
    let _done = fixture.mock_status("abc123", succeeded(VIDEO_URL), 1).await;

    let client = fixture.client();
    let (sink, rx) = ChannelProgressSink::new();
    let result = client.run(&request(), &sink).await;
    tokio_test::assert_ok!(serde_json::to_value(&result));
    drop(sink);

    let states: Vec<JobState> = UnboundedReceiverStream::new(rx)
        .map(|event| event.state)
        .collect()
        .await;
    assert_eq!(
        states,
        vec![JobState::Pending, JobState::Processing, JobState::Completed]
    );
}
