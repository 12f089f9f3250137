//! End-to-end dispatch tests over real HTTP.
//!
//! A stub backend server stands in for the inference endpoints; the full
//! stack (pool startup, admission, dispatch, retry, probing) runs against it
//! unchanged.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use inferpool::pool::QuantProfile;
use inferpool::{
    DispatchConfig, FatalReason, GenerationPayload, GenerationService, HttpBackend, Outcome,
    PoolError, RetryReason, WorkerBackend, WorkerConfig,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Behavior of the stub backend for its next requests.
#[derive(Debug, Clone)]
enum StubMode {
    Reply(String),
    Empty,
    ServerError,
    Stall,
}

struct StubState {
    mode: Mutex<StubMode>,
    chat_calls: AtomicUsize,
}

struct StubServer {
    addr: String,
    state: Arc<StubState>,
    task: tokio::task::JoinHandle<()>,
}

impl StubServer {
    async fn spawn(mode: StubMode) -> Self {
        let state = Arc::new(StubState {
            mode: Mutex::new(mode),
            chat_calls: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/api/chat", post(chat))
            .route("/api/pull", post(pull))
            .route("/api/generate", post(unload))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());

        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, task }
    }

    fn set_mode(&self, mode: StubMode) {
        *self.state.mode.lock().unwrap() = mode;
    }

    fn chat_calls(&self) -> usize {
        self.state.chat_calls.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn chat(State(state): State<Arc<StubState>>) -> Response {
    state.chat_calls.fetch_add(1, Ordering::SeqCst);
    let mode = state.mode.lock().unwrap().clone();
    match mode {
        StubMode::Reply(text) => Json(json!({
            "message": {"role": "assistant", "content": text},
            "done": true,
        }))
        .into_response(),
        StubMode::Empty => Json(json!({
            "message": {"role": "assistant", "content": ""},
            "done": true,
        }))
        .into_response(),
        StubMode::ServerError => {
            (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response()
        }
        StubMode::Stall => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Json(json!({
                "message": {"role": "assistant", "content": "too late"},
                "done": true,
            }))
            .into_response()
        }
    }
}

async fn pull(State(_state): State<Arc<StubState>>) -> Response {
    Json(json!({"status": "success"})).into_response()
}

async fn unload(State(_state): State<Arc<StubState>>) -> Response {
    Json(json!({"done": true})).into_response()
}

fn worker_for(id: usize, addr: &str) -> WorkerConfig {
    WorkerConfig {
        id,
        backend_addr: addr.to_string(),
        accelerator_id: 0,
        context_window_tokens: 8192,
        batch_tokens: 512,
        thread_count: 4,
        profile: QuantProfile::new("q4_k_m", 0.25),
        model_tag: "yi:6b-q4_k_m".to_string(),
    }
}

fn fast_config(max_attempts: u32) -> DispatchConfig {
    DispatchConfig {
        worker_count: 1,
        max_attempts,
        backoff_min_ms: 1,
        backoff_max_ms: 5,
        request_timeout_secs: 5,
        probe_timeout_secs: 2,
        ..Default::default()
    }
}

fn service_over(
    workers: Vec<WorkerConfig>,
    max_attempts: u32,
) -> GenerationService {
    let backend: Arc<dyn WorkerBackend> = Arc::new(HttpBackend::new().unwrap());
    GenerationService::new(workers, backend, &fast_config(max_attempts)).unwrap()
}

#[tokio::test]
async fn full_generation_roundtrip_over_http() {
    let server_a = StubServer::spawn(StubMode::Reply("from a".to_string())).await;
    let server_b = StubServer::spawn(StubMode::Reply("from b".to_string())).await;

    let service = service_over(
        vec![worker_for(0, &server_a.addr), worker_for(1, &server_b.addr)],
        3,
    );
    service.start().await.unwrap();

    // Round robin alternates workers across submissions
    let first = service
        .submit(GenerationPayload::from_prompt("one"))
        .await
        .unwrap();
    let second = service
        .submit(GenerationPayload::from_prompt("two"))
        .await
        .unwrap();

    let texts: Vec<_> = [&first, &second]
        .iter()
        .map(|o| o.text().unwrap().to_string())
        .collect();
    assert!(texts.contains(&"from a".to_string()));
    assert!(texts.contains(&"from b".to_string()));
    assert_eq!(server_a.chat_calls(), 1);
    assert_eq!(server_b.chat_calls(), 1);

    service.stop().await;
    assert_eq!(service.pool().ready_count(), 0);
}

#[tokio::test]
async fn empty_content_exhausts_retries() {
    let server = StubServer::spawn(StubMode::Empty).await;
    let service = service_over(vec![worker_for(0, &server.addr)], 3);
    service.start().await.unwrap();

    let outcome = service
        .submit(GenerationPayload::from_prompt("hello"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        Outcome::Fatal(FatalReason::RetriesExhausted(RetryReason::EmptyResponse))
    );
    // Exactly max_attempts dispatches hit the backend
    assert_eq!(server.chat_calls(), 3);

    service.stop().await;
}

#[tokio::test]
async fn backend_error_status_is_fatal_without_retry() {
    let server = StubServer::spawn(StubMode::ServerError).await;
    let service = service_over(vec![worker_for(0, &server.addr)], 5);
    service.start().await.unwrap();

    let outcome = service
        .submit(GenerationPayload::from_prompt("hello"))
        .await
        .unwrap();

    match outcome {
        Outcome::Fatal(FatalReason::Backend { status, .. }) => assert_eq!(status, 500),
        other => panic!("expected backend failure, got {:?}", other),
    }
    assert_eq!(server.chat_calls(), 1);

    service.stop().await;
}

#[tokio::test]
async fn stalled_backend_times_out_at_deadline() {
    let server = StubServer::spawn(StubMode::Stall).await;
    let service = service_over(vec![worker_for(0, &server.addr)], 2);
    service.start().await.unwrap();

    let started = Instant::now();
    let outcome = service
        .submit_with_timeout(
            GenerationPayload::from_prompt("hello"),
            Duration::from_millis(300),
        )
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(
        outcome,
        Outcome::Fatal(FatalReason::RetriesExhausted(RetryReason::Timeout))
    );
    // Two ~300ms attempts plus jitter; nowhere near the 60s stall
    assert!(elapsed >= Duration::from_millis(600));
    assert!(elapsed < Duration::from_secs(5));

    service.stop().await;
}

#[tokio::test]
async fn unreachable_backend_is_transport_fatal() {
    let server = StubServer::spawn(StubMode::Reply("ok".to_string())).await;
    let service = service_over(vec![worker_for(0, &server.addr)], 3);
    service.start().await.unwrap();

    // Kill the endpoint after startup; the next dispatch hits a dead port
    server.shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = service
        .submit(GenerationPayload::from_prompt("hello"))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        Outcome::Fatal(FatalReason::Transport(_))
    ));
}

#[tokio::test]
async fn startup_rolls_back_when_one_worker_unreachable() {
    let good = StubServer::spawn(StubMode::Reply("ok".to_string())).await;

    // Reserve a port and close it again so nothing is listening there
    let dead_addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let service = service_over(
        vec![worker_for(0, &good.addr), worker_for(1, &dead_addr)],
        1,
    );

    let err = service.start().await.unwrap_err();
    assert!(matches!(err, PoolError::ResourceInit { worker: 1, .. }));
    assert_eq!(service.pool().ready_count(), 0);
}

#[tokio::test]
async fn probe_reports_mixed_pool_health() {
    let healthy = StubServer::spawn(StubMode::Reply("pong".to_string())).await;
    let stalled = StubServer::spawn(StubMode::Stall).await;
    let broken = StubServer::spawn(StubMode::ServerError).await;

    let service = service_over(
        vec![
            worker_for(0, &healthy.addr),
            worker_for(1, &stalled.addr),
            worker_for(2, &broken.addr),
        ],
        1,
    );
    // Probing does not require a started pool

    let report = service.probe_all().await;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.ok_count(), 1);
    assert_eq!(report.timeout_count(), 1);
    assert_eq!(report.fail_count(), 1);

    let average = report.average_latency().unwrap();
    // Only the healthy worker contributes to the average
    assert!(average < Duration::from_secs(2));
}

#[tokio::test]
async fn batch_order_preserved_over_http() {
    let server = StubServer::spawn(StubMode::Reply("ok".to_string())).await;
    let service = service_over(vec![worker_for(0, &server.addr)], 1);
    service.start().await.unwrap();

    let payloads: Vec<_> = (0..5)
        .map(|i| GenerationPayload::from_prompt(&format!("item {}", i)))
        .collect();
    let results = service.submit_batch(payloads).await;

    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.as_ref().unwrap().is_success()));
    assert_eq!(server.chat_calls(), 5);

    service.stop().await;
}
