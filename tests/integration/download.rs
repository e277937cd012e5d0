//! Artifact download.

use crate::mock_server::{truncated_body_server, MockServerFixture};
use std::sync::atomic::Ordering;
use std::time::Duration;
use vidgen_client::{Error, VideoClientBuilder};

#[tokio::test]
async fn test_download_to_file() {
    let mut fixture = MockServerFixture::new().await;
    let payload = vec![7u8; 4096];
    let mock = fixture
        .server
        .mock("GET", "/files/abc123.mp4")
        .with_status(200)
        .with_header("content-type", "video/mp4")
        .with_body(payload.clone())
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested").join("out.mp4");
    let url = format!("{}/files/abc123.mp4", fixture.base_url);

    let written = fixture
        .client()
        .download_artifact_to(&url, &target)
        .await
        .unwrap();
    assert_eq!(written, 4096);
    assert_eq!(std::fs::read(&target).unwrap(), payload);
    assert!(!target.with_extension("mp4.part").exists());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_download_is_unauthenticated() {
    let mut fixture = MockServerFixture::new().await;
    let _mock = fixture
        .server
        .mock("GET", "/files/a.mp4")
        .match_header("authorization", mockito::Matcher::Missing)
        .with_status(200)
        .with_body("video")
        .create_async()
        .await;

    let url = format!("{}/files/a.mp4", fixture.base_url);
    let bytes = fixture.client().download_artifact(&url).await.unwrap();
    assert_eq!(&bytes[..], b"video");
}

#[tokio::test]
async fn test_download_not_found() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("GET", "/files/gone.mp4")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let url = format!("{}/files/gone.mp4", fixture.base_url);
    let err = fixture.client().download_artifact(&url).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_download_rejects_relative_url() {
    let fixture = MockServerFixture::new().await;
    let err = fixture
        .client()
        .download_artifact("files/a.mp4")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn test_interrupted_download_leaves_no_partial_file() {
    let (base_url, connections) = truncated_body_server().await;
    let client = VideoClientBuilder::new()
        .base_url(&base_url)
        .credentials("test-ak", "test-sk")
        .max_retry_attempts(2)
        .backoff(Duration::from_millis(1), Duration::from_millis(5))
        .build()
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("cut.mp4");
    let url = format!("{base_url}/files/cut.mp4");

    assert!(client.download_artifact_to(&url, &target).await.is_err());
    assert_eq!(connections.load(Ordering::SeqCst), 2);
    assert!(!target.exists());
    assert!(!dir.path().join("cut.mp4.part").exists());
}

#[tokio::test]
async fn test_failed_rename_removes_partial_file() {
    let mut fixture = MockServerFixture::new().await;
    let _mock = fixture
        .server
        .mock("GET", "/files/abc123.mp4")
        .with_status(200)
        .with_body(vec![1u8; 64])
        .create_async()
        .await;

    // A non-empty directory in the way makes the final rename fail.
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.mp4");
    std::fs::create_dir_all(target.join("occupied")).unwrap();
    let url = format!("{}/files/abc123.mp4", fixture.base_url);

    let err = fixture
        .client()
        .download_artifact_to(&url, &target)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)), "{err:?}");
    assert!(!dir.path().join("out.mp4.part").exists());
}
