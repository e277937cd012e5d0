//! Mock HTTP server setup for integration tests

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use vidgen_client::{VideoClient, VideoClientBuilder};

pub const SUBMIT_PATH: &str = "/v1/videos/omni-video";

pub fn status_path(job_id: &str) -> String {
    format!("{}/{}", SUBMIT_PATH, job_id)
}

/// Test fixture that owns a mock server.
pub struct MockServerFixture {
    pub server: ServerGuard,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self { server, base_url }
    }

    /// Builder with millisecond-scale delays so tests stay fast.
    pub fn builder(&self) -> VideoClientBuilder {
        VideoClientBuilder::new()
            .base_url(&self.base_url)
            .credentials("test-ak", "test-sk")
            .max_retry_attempts(3)
            .backoff(Duration::from_millis(1), Duration::from_millis(5))
            .poll_interval(Duration::from_millis(5))
            .max_poll_attempts(5)
            .auth_failure_threshold(3)
    }

    pub fn client(&self) -> VideoClient {
        self.builder().build().expect("test client builds")
    }

    /// Successful submission returning `job_id`.
    pub async fn mock_submit_ok(&mut self, job_id: &str) -> Mock {
        self.server
            .mock("POST", SUBMIT_PATH)
            .match_header("authorization", Matcher::Regex("^Bearer .+".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(envelope(0, json!({ "task_id": job_id, "task_status": "submitted" })).to_string())
            .create_async()
            .await
    }

    /// Raw response on the submission endpoint, served `hits` times.
    pub async fn mock_submit_raw(&mut self, status: usize, body: &str, hits: usize) -> Mock {
        self.server
            .mock("POST", SUBMIT_PATH)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    /// Status response for `job_id`, served `hits` times.
    pub async fn mock_status(&mut self, job_id: &str, data: Value, hits: usize) -> Mock {
        self.mock_status_raw(job_id, 200, &envelope(0, data).to_string(), hits)
            .await
    }

    pub async fn mock_status_raw(
        &mut self,
        job_id: &str,
        status: usize,
        body: &str,
        hits: usize,
    ) -> Mock {
        self.server
            .mock("GET", status_path(job_id).as_str())
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }
}

pub fn envelope(code: i64, data: Value) -> Value {
    json!({
        "code": code,
        "message": if code == 0 { "SUCCEED" } else { "error" },
        "request_id": "req-test",
        "data": data,
    })
}

pub fn processing(progress: f64) -> Value {
    json!({ "task_id": "abc123", "task_status": "processing", "task_progress": progress })
}

pub fn succeeded(url: &str) -> Value {
    json!({
        "task_id": "abc123",
        "task_status": "succeed",
        "task_result": { "videos": [ { "id": "v1", "url": url, "duration": "5.0" } ] }
    })
}

pub fn failed(message: &str) -> Value {
    json!({ "task_id": "abc123", "task_status": "failed", "task_status_msg": message })
}

/// Raw TCP server that answers every request with a 200 whose body stops
/// short of its `Content-Length`, then closes the connection.
///
/// Returns the base URL and a counter of accepted connections.
pub async fn truncated_body_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                read_request(&mut socket).await;
                let head = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 500\r\n\r\n";
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(br#"{"code":0,"#).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (base_url, connections)
}

/// Consume one request: headers, then `content-length` bytes of body.
async fn read_request(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let body_len = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + body_len {
            return;
        }
    }
}
