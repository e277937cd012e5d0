//! Submission: validation, prompt translation, retry and rejection.

use crate::mock_server::{envelope, truncated_body_server, MockServerFixture, SUBMIT_PATH};
use mockito::Matcher;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use vidgen_client::{
    ErrorClass, GenerationRequest, JobState, NoopProgressSink, SubmissionFailure,
    VideoClientBuilder,
};

fn request() -> GenerationRequest {
    GenerationRequest::new("Same motion as @video, styled like @image1")
        .with_reference_video("https://cdn.example.com/in.mp4")
        .with_reference_image("https://cdn.example.com/style.png")
}

#[tokio::test]
async fn test_submit_sends_translated_prompt() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", SUBMIT_PATH)
        .match_header("authorization", Matcher::Regex("^Bearer .+".into()))
        .match_body(Matcher::PartialJson(json!({
            "model_name": "kling-video-o1",
            "prompt": "Same motion as <<<video_1>>>, styled like <<<image_1>>>",
            "mode": "std",
            "duration": "5",
            "image_list": [ { "image_url": "https://cdn.example.com/style.png" } ],
            "video_list": [ {
                "video_url": "https://cdn.example.com/in.mp4",
                "refer_type": "base",
                "keep_original_sound": "yes"
            } ]
        })))
        .with_status(200)
        .with_body(envelope(0, json!({ "task_id": "job-42" })).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = fixture.client();
    let job = client.submit(&request()).await.unwrap();
    assert_eq!(job.job_id(), "job-42");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_validation_failure_makes_no_call() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_submit_raw(200, &envelope(0, json!({ "task_id": "x" })).to_string(), 0)
        .await;
    let client = fixture.client();

    let empty = GenerationRequest::new("   ").with_reference_video("https://cdn.example.com/a.mp4");
    let err = client.submit(&empty).await.unwrap_err();
    assert!(err.is_validation());

    let bad_duration = request().with_duration(7);
    assert!(client.submit(&bad_duration).await.unwrap_err().is_validation());

    let no_media = GenerationRequest::new("P");
    assert!(client.submit(&no_media).await.unwrap_err().is_validation());

    let dangling = GenerationRequest::new("put @image2 here")
        .with_reference_image("https://cdn.example.com/1.png");
    assert!(client.submit(&dangling).await.unwrap_err().is_validation());

    let result = client.run(&empty, &NoopProgressSink).await;
    assert!(!result.success);
    assert_eq!(result.state, JobState::Failed);
    assert!(result.job_id.is_none());
    assert_eq!(result.polls, 0);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_transient_errors_are_retried_within_budget() {
    let mut fixture = MockServerFixture::new().await;
    let unavailable = fixture
        .mock_submit_raw(503, r#"{"code":5001,"message":"service busy"}"#, 2)
        .await;
    let ok = fixture
        .mock_submit_raw(200, &envelope(0, json!({ "task_id": "abc123" })).to_string(), 1)
        .await;

    let job = fixture.client().submit(&request()).await.unwrap();
    assert_eq!(job.job_id(), "abc123");
    unavailable.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture.mock_submit_raw(502, "Bad Gateway", 3).await;

    let err = fixture.client().submit(&request()).await.unwrap_err();
    match &err {
        SubmissionFailure::Request(inner) => assert_eq!(inner.status(), Some(502)),
        other => panic!("unexpected failure: {other:?}"),
    }
    assert_eq!(err.class(), Some(ErrorClass::ServiceUnavailable));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_truncated_body_is_retried() {
    let (base_url, connections) = truncated_body_server().await;
    let client = VideoClientBuilder::new()
        .base_url(&base_url)
        .credentials("test-ak", "test-sk")
        .max_retry_attempts(3)
        .backoff(Duration::from_millis(1), Duration::from_millis(5))
        .build()
        .unwrap();

    let err = client.submit(&request()).await.unwrap_err();
    assert!(matches!(err, SubmissionFailure::Request(_)), "{err:?}");
    assert_eq!(connections.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_non_retryable_status_fails_after_one_call() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_submit_raw(400, r#"{"code":1201,"message":"invalid parameter"}"#, 1)
        .await;

    let err = fixture.client().submit(&request()).await.unwrap_err();
    assert!(matches!(err, SubmissionFailure::Request(_)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_retry_after_stays_within_backoff_ceiling() {
    let mut fixture = MockServerFixture::new().await;
    let limited = fixture
        .server
        .mock("POST", SUBMIT_PATH)
        .with_status(429)
        .with_header("retry-after", "30")
        .with_body(r#"{"code":1302,"message":"too many requests"}"#)
        .expect(2)
        .create_async()
        .await;
    let ok = fixture
        .mock_submit_raw(200, &envelope(0, json!({ "task_id": "abc123" })).to_string(), 1)
        .await;

    let client = fixture
        .builder()
        .backoff(Duration::from_millis(20), Duration::from_millis(50))
        .build()
        .unwrap();
    let ceiling = client.config().retry.max_cumulative_backoff();
    assert_eq!(ceiling, Duration::from_millis(40 + 50));

    let start = Instant::now();
    client.submit(&request()).await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed < ceiling + Duration::from_millis(500), "{elapsed:?}");
    limited.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn test_rejected_envelope_is_classified() {
    let mut fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_submit_raw(200, r#"{"code":1102,"message":"account balance not enough","data":null}"#, 1)
        .await;

    let client = fixture.client();
    let err = client.submit(&request()).await.unwrap_err();
    assert!(matches!(err, SubmissionFailure::Rejected { code: 1102, .. }));
    assert_eq!(err.class(), Some(ErrorClass::InsufficientBalance));
}

#[tokio::test]
async fn test_missing_job_id() {
    let mut fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_submit_raw(200, &envelope(0, json!({ "task_status": "submitted" })).to_string(), 1)
        .await;

    let err = fixture.client().submit(&request()).await.unwrap_err();
    assert!(matches!(err, SubmissionFailure::MissingJobId));
}
