//! Integration tests for the request execution pipeline.
//!
//! A scripted transport drives the deterministic scenarios; wiremock covers
//! the same paths over a real socket through `ReqwestTransport`.

use async_trait::async_trait;
use bulwark_http::prelude::*;
use bulwark_http::{BodyStream, Bytes, RequestBody, RequestStream};
use futures::stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

// =============================================================================
// Scripted transport
// =============================================================================

enum Step {
    Respond(RawResponse),
    Fail(TransportError),
    Hang,
}

#[derive(Default)]
struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicU32,
    seen: Mutex<Vec<reqwest::header::HeaderMap>>,
}

impl ScriptedTransport {
    fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Default::default()
        })
    }

    fn statuses(codes: &[u16]) -> Arc<Self> {
        Self::new(codes.iter().map(|&code| status(code)))
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        request: reqwest::Request,
    ) -> std::result::Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(request.headers().clone());

        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Hang) => std::future::pending().await,
            None => Ok(RawResponse::new(StatusCode::OK)),
        }
    }
}

fn status(code: u16) -> Step {
    Step::Respond(RawResponse::new(
        StatusCode::from_u16(code).expect("valid status"),
    ))
}

fn client(config: HttpClientConfig, transport: Arc<ScriptedTransport>) -> HttpClient {
    HttpClient::with_transport(config, transport)
}

fn retrying(policy: RetryPolicy) -> HttpClientConfig {
    HttpClientConfig::builder().retry(policy).build()
}

const URL: &str = "http://service.local/resource";

// =============================================================================
// Retry orchestration
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_retries_until_success_with_static_wait() {
    let transport = ScriptedTransport::statuses(&[503, 503, 200]);
    let client = client(
        retrying(RetryPolicy::constant(3, Duration::from_millis(10))),
        transport.clone(),
    );

    let started = tokio::time::Instant::now();
    let response = assert_ok!(client.get(URL).send().await);

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.calls(), 3);
    assert_eq!(response.attempts(), 3);
    assert_eq!(response.total_wait(), Duration::from_millis(20));
    assert!(response.elapsed() >= Duration::from_millis(20));
    assert!(started.elapsed() >= Duration::from_millis(20));
}

#[tokio::test(start_paused = true)]
async fn test_persistent_503_exhausts_retries() {
    let transport = ScriptedTransport::statuses(&[503, 503, 503]);
    let client = client(
        retrying(RetryPolicy::constant(3, Duration::from_millis(10))),
        transport.clone(),
    );

    let err = assert_err!(client.get(URL).send().await);
    let exhausted = err.retry_exhausted().expect("retry exhausted");

    assert_eq!(exhausted.attempts, 3);
    assert_eq!(exhausted.total_wait, Duration::from_millis(20));
    assert_eq!(exhausted.method, Method::GET);
    assert_eq!(exhausted.url.as_str(), URL);
    assert_eq!(
        exhausted.last_error.as_ref().and_then(|e| e.status_code()),
        Some(503)
    );
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_return_last_outcome_on_exhaustion() {
    let transport = ScriptedTransport::statuses(&[503, 503, 503]);
    let policy = RetryPolicy::immediate(3).with_exhaustion(ExhaustionPolicy::ReturnLastOutcome);
    let client = client(retrying(policy), transport.clone());

    let response = assert_ok!(client.get(URL).send().await);
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_client_errors_are_not_retried() {
    let transport = ScriptedTransport::statuses(&[404, 200]);
    let client = client(retrying(RetryPolicy::immediate(3)), transport.clone());

    let response = assert_ok!(client.get(URL).send().await);
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_post_retries_only_with_opt_in() {
    let transport = ScriptedTransport::statuses(&[503, 200]);
    let client = client(retrying(RetryPolicy::immediate(3)), transport.clone());

    let response = assert_ok!(client.post(URL).text("order").send().await);
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(transport.calls(), 1);

    let response = client
        .post(URL)
        .text("order")
        .allow_non_idempotent_retry()
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_policy_sends_once() {
    let transport = ScriptedTransport::statuses(&[503, 200]);
    let client = client(HttpClientConfig::default(), transport.clone());

    let response = assert_ok!(client.get(URL).send().await);
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.attempts(), 1);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_certificate_error_is_never_retried() {
    let transport = ScriptedTransport::new([
        Step::Fail(TransportError::Certificate("unknown issuer".into())),
        status(200),
    ]);
    let policy = RetryPolicy::immediate(3).with_condition(|_, _| true);
    let client = client(retrying(policy), transport.clone());

    let err = assert_err!(client.get(URL).send().await);
    assert!(matches!(
        err,
        HttpClientError::Transport(TransportError::Certificate(_))
    ));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_temporary_transport_error_is_retried() {
    let transport = ScriptedTransport::new([
        Step::Fail(TransportError::Connect("connection refused".into())),
        status(200),
    ]);
    let client = client(retrying(RetryPolicy::immediate(3)), transport.clone());

    let response = assert_ok!(client.get(URL).send().await);
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_overrides_backoff() {
    let transport = ScriptedTransport::new([
        Step::Respond(
            RawResponse::new(StatusCode::TOO_MANY_REQUESTS).with_header("Retry-After", "2"),
        ),
        status(200),
    ]);
    let client = client(retrying(RetryPolicy::new(2)), transport.clone());

    let response = assert_ok!(client.get(URL).send().await);
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.total_wait(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_waits_stay_in_bounds() {
    let transport = ScriptedTransport::statuses(&[500, 502, 504, 200]);
    let backoff = Backoff::new(
        Duration::from_millis(10),
        Duration::from_millis(40),
        JitterStrategy::FullJitter,
    );
    let client = client(
        retrying(RetryPolicy::with_backoff_strategy(4, backoff)),
        transport.clone(),
    );

    let response = assert_ok!(client.get(URL).send().await);
    assert_eq!(response.attempts(), 4);
    assert!(response.total_wait() >= Duration::from_millis(30));
    assert!(response.total_wait() <= Duration::from_millis(120));
}

// =============================================================================
// Request bodies
// =============================================================================

fn payload() -> RequestStream {
    Box::pin(stream::iter(vec![
        Ok::<_, std::io::Error>(Bytes::from_static(b"chunk-1")),
        Ok(Bytes::from_static(b"chunk-2")),
    ]))
}

#[tokio::test(start_paused = true)]
async fn test_one_shot_body_cannot_be_retried() {
    let transport = ScriptedTransport::statuses(&[503, 200]);
    let client = client(retrying(RetryPolicy::immediate(3)), transport.clone());

    let err = client
        .put(URL)
        .body_stream(payload(), Some(14))
        .send()
        .await
        .unwrap_err();

    assert!(matches!(err, HttpClientError::BodyNotReplayable));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reopenable_body_is_sent_on_every_attempt() {
    let transport = ScriptedTransport::statuses(&[503, 200]);
    let client = client(retrying(RetryPolicy::immediate(3)), transport.clone());
    let opened = Arc::new(AtomicU32::new(0));
    let counter = opened.clone();

    let response = client
        .put(URL)
        .body_reopenable(Some(14), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(payload())
        })
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(opened.load(Ordering::SeqCst), 2);
    assert_eq!(transport.seen.lock()[1]["content-length"], "14");
}

#[tokio::test]
async fn test_buffered_body_round_trip() {
    let transport = ScriptedTransport::new([]);
    let client = client(HttpClientConfig::default(), transport.clone());

    let body = RequestBody::from("raw");
    assert!(body.is_replayable());
    let response = assert_ok!(client.patch(URL).body(body).send().await);
    assert!(response.is_success());
}

// =============================================================================
// Circuit breaker
// =============================================================================

#[tokio::test]
async fn test_breaker_rejects_after_threshold() {
    let transport = ScriptedTransport::statuses(&[500, 500, 200]);
    let config = HttpClientConfig::builder()
        .circuit_breaker(CircuitBreakerConfig::new(2, Duration::from_secs(60)))
        .build();
    let client = client(config, transport.clone());

    for _ in 0..2 {
        let response = assert_ok!(client.get(URL).send().await);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
    assert_eq!(
        client.circuit_breaker().map(|cb| cb.state()),
        Some(CircuitState::Open)
    );

    let err = assert_err!(client.get(URL).send().await);
    assert!(err.is_breaker_open());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_breaker_stops_retry_loop() {
    let transport = ScriptedTransport::statuses(&[500, 500, 500, 500]);
    let config = HttpClientConfig::builder()
        .retry(RetryPolicy::immediate(5))
        .circuit_breaker(CircuitBreakerConfig::new(2, Duration::from_secs(60)))
        .build();
    let client = client(config, transport.clone());

    let err = assert_err!(client.get(URL).send().await);
    assert!(matches!(err, HttpClientError::BreakerOpen));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_half_open_probe_closes() {
    let transport = ScriptedTransport::statuses(&[500, 200]);
    let config = HttpClientConfig::builder()
        .circuit_breaker(CircuitBreakerConfig::new(1, Duration::from_millis(20)))
        .build();
    let client = client(config, transport.clone());

    assert_ok!(client.get(URL).send().await);
    assert!(assert_err!(client.get(URL).send().await).is_breaker_open());

    tokio::time::sleep(Duration::from_millis(30)).await;
    let response = assert_ok!(client.get(URL).send().await);
    assert!(response.is_success());
    assert_eq!(
        client.circuit_breaker().map(|cb| cb.state()),
        Some(CircuitState::Closed)
    );
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_attempt_leaves_breaker_half_open() {
    let transport = ScriptedTransport::statuses(&[500, 200]);
    let config = HttpClientConfig::builder()
        .circuit_breaker(CircuitBreakerConfig::new(1, Duration::from_millis(20)))
        .build();
    let client = client(config, transport.clone());

    assert_ok!(client.get(URL).send().await);
    tokio::time::sleep(Duration::from_millis(30)).await;

    let token = CancellationToken::new();
    token.cancel();
    let err = assert_err!(client.get(URL).cancellation(token).send().await);
    assert!(matches!(err, HttpClientError::Cancelled));
    assert_eq!(transport.calls(), 1);
    assert_eq!(
        client.circuit_breaker().map(|cb| cb.state()),
        Some(CircuitState::HalfOpen)
    );

    // The next attempt that reaches the transport settles the circuit.
    assert_ok!(client.get(URL).send().await);
    assert_eq!(transport.calls(), 2);
    assert_eq!(
        client.circuit_breaker().map(|cb| cb.state()),
        Some(CircuitState::Closed)
    );
}

// =============================================================================
// Cancellation and deadlines
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_backoff() {
    let transport = ScriptedTransport::statuses(&[503, 503, 503]);
    let client = client(
        retrying(RetryPolicy::constant(3, Duration::from_secs(10))),
        transport.clone(),
    );
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        })
    };

    let started = tokio::time::Instant::now();
    let err = client
        .get(URL)
        .cancellation(token)
        .send()
        .await
        .unwrap_err();

    assert!(matches!(err, HttpClientError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(transport.calls(), 1);
    canceller.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_deadline_interrupts_hung_transport() {
    let transport = ScriptedTransport::new([Step::Hang]);
    let config = HttpClientConfig::builder()
        .retry(RetryPolicy::immediate(3))
        .circuit_breaker(CircuitBreakerConfig::new(1, Duration::from_secs(60)))
        .build();
    let client = client(config, transport.clone());

    let err = client
        .get(URL)
        .deadline(Duration::from_millis(50))
        .send()
        .await
        .unwrap_err();

    assert!(matches!(err, HttpClientError::DeadlineExceeded));
    assert!(err.is_cancelled());
    assert_eq!(
        client.circuit_breaker().map(|cb| cb.state()),
        Some(CircuitState::Closed)
    );
}

// =============================================================================
// Decompression and content negotiation
// =============================================================================

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn decoded_body() -> BodyStream {
    Box::pin(stream::iter([Ok::<_, std::io::Error>(Bytes::from_static(b"decoded"))]))
}

#[tokio::test]
async fn test_registered_br_decoder_is_used() {
    let transport = ScriptedTransport::new([
        Step::Respond(
            RawResponse::new(StatusCode::OK)
                .with_header("Content-Encoding", "br")
                .with_body("opaque"),
        ),
        Step::Respond(RawResponse::new(StatusCode::OK).with_body("plain")),
    ]);
    let client = client(HttpClientConfig::default(), transport.clone());
    client.register_decompressor("br", |_body| Ok(decoded_body()));

    let mut response = assert_ok!(client.get(URL).send().await);
    assert_eq!(response.text().await.unwrap(), "decoded");
    assert!(response.header("content-encoding").is_none());

    let mut response = assert_ok!(client.get(URL).send().await);
    assert_eq!(response.text().await.unwrap(), "plain");
}

#[tokio::test]
async fn test_gzip_body_is_decoded() {
    let transport = ScriptedTransport::new([Step::Respond(
        RawResponse::new(StatusCode::OK)
            .with_header("Content-Encoding", "gzip")
            .with_header("Content-Type", "application/json")
            .with_body(gzip(br#"{"id":7,"name":"widget"}"#)),
    )]);
    let client = client(HttpClientConfig::default(), transport.clone());

    let mut response = assert_ok!(client.get(URL).send().await);
    let value: serde_json::Value = response.decode().await.unwrap();
    assert_eq!(value["id"], 7);
    assert_eq!(value["name"], "widget");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_encoding_is_fatal() {
    let transport = ScriptedTransport::new([
        Step::Respond(
            RawResponse::new(StatusCode::OK)
                .with_header("Content-Encoding", "zstd")
                .with_body("x"),
        ),
        status(200),
    ]);
    let client = client(retrying(RetryPolicy::immediate(3)), transport.clone());

    let err = assert_err!(client.get(URL).send().await);
    assert!(matches!(err, HttpClientError::CodecNotFound(e) if e == "zstd"));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_accept_encoding_is_advertised() {
    let transport = ScriptedTransport::new([]);
    let client = client(HttpClientConfig::default(), transport.clone());
    client.register_decompressor("snappy", Ok);

    assert_ok!(client.get(URL).send().await);
    let seen = transport.seen.lock();
    let accept = seen[0]["accept-encoding"].to_str().unwrap();
    assert!(accept.contains("gzip"));
    assert!(accept.contains("snappy"));
}

#[tokio::test]
async fn test_custom_codec_round_trip() {
    let transport = ScriptedTransport::new([Step::Respond(
        RawResponse::new(StatusCode::OK)
            .with_header("Content-Type", "text/csv; charset=utf-8")
            .with_body("a,b,c"),
    )]);
    let client = client(HttpClientConfig::default(), transport.clone());
    client
        .register_decoder("text/csv", |body| {
            let text = std::str::from_utf8(body)
                .map_err(|e| HttpClientError::Decode(e.to_string()))?;
            Ok(serde_json::Value::from(text.split(',').collect::<Vec<_>>()))
        })
        .unwrap();
    client
        .register_encoder("text/csv", |value| {
            let items: Vec<String> = value
                .as_array()
                .map(|items| items.iter().filter_map(|v| v.as_str()).map(String::from).collect())
                .unwrap_or_default();
            Ok(Bytes::from(items.join(",")))
        })
        .unwrap();

    let mut response = client
        .put(URL)
        .encode("text/csv", &["a", "b", "c"])
        .send()
        .await
        .unwrap();
    let columns: Vec<String> = response.decode().await.unwrap();
    assert_eq!(columns, ["a", "b", "c"]);
}

// =============================================================================
// Interceptors and tracing
// =============================================================================

#[derive(Default)]
struct Counts {
    requests: AtomicU32,
    responses: AtomicU32,
    attempts_seen: AtomicU32,
    wait_seen: Mutex<Duration>,
}

struct CountingInterceptor(Arc<Counts>);

#[async_trait]
impl Interceptor for CountingInterceptor {
    async fn intercept_request(&self, request: reqwest::Request) -> Result<reqwest::Request> {
        self.0.requests.fetch_add(1, Ordering::SeqCst);
        Ok(request)
    }

    async fn intercept_response(&self, response: Response) -> Result<Response> {
        self.0.responses.fetch_add(1, Ordering::SeqCst);
        self.0
            .attempts_seen
            .store(response.attempts(), Ordering::SeqCst);
        *self.0.wait_seen.lock() = response.total_wait();
        Ok(response)
    }
}

#[tokio::test(start_paused = true)]
async fn test_interceptors_run_per_attempt_and_once_per_response() {
    let transport = ScriptedTransport::statuses(&[503, 503, 200]);
    let counts = Arc::new(Counts::default());
    let client = client(
        retrying(RetryPolicy::constant(3, Duration::from_millis(10))),
        transport.clone(),
    )
    .with_interceptor(CountingInterceptor(counts.clone()))
    .with_interceptor(bulwark_http::LoggingInterceptor::new().with_headers());

    let response = assert_ok!(client.get(URL).send().await);
    assert_eq!(counts.requests.load(Ordering::SeqCst), 3);
    assert_eq!(counts.responses.load(Ordering::SeqCst), 1);

    // Response hooks observe the final attempt statistics.
    assert_eq!(response.attempts(), 3);
    assert_eq!(counts.attempts_seen.load(Ordering::SeqCst), 3);
    assert_eq!(*counts.wait_seen.lock(), Duration::from_millis(20));
}

#[tokio::test(start_paused = true)]
async fn test_trace_records_every_attempt() {
    let transport = ScriptedTransport::statuses(&[503, 200]);
    let client = client(
        retrying(RetryPolicy::constant(2, Duration::from_millis(10))),
        transport.clone(),
    );

    let response = assert_ok!(client.get(URL).trace(true).send().await);
    let trace = response.trace_info().unwrap();
    assert_eq!(trace.request_attempts(), 2);
    assert_eq!(trace.attempts[0].status, Some(503));
    assert_eq!(trace.attempts[0].wait, Duration::from_millis(10));
    assert_eq!(trace.attempts[1].status, Some(200));
    assert_eq!(trace.total_wait, Duration::from_millis(10));

    let untraced = assert_ok!(client.get(URL).send().await);
    assert!(matches!(
        untraced.trace_info(),
        Err(HttpClientError::TraceNotEnabled)
    ));
}

// =============================================================================
// Real HTTP through reqwest
// =============================================================================

mod over_http {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_client(policy: RetryPolicy) -> HttpClient {
        HttpClient::new(HttpClientConfig::builder().retry(policy).build()).unwrap()
    }

    #[tokio::test]
    async fn test_flaky_endpoint_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = http_client(RetryPolicy::constant(3, Duration::from_millis(10)));
        let mut response = client
            .get(format!("{}/flaky", server.uri()))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.attempts(), 3);
        assert_eq!(response.text().await.unwrap(), "ok");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_gzip_response_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compressed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-encoding", "gzip")
                    .set_body_bytes(gzip(b"compressed over the wire")),
            )
            .mount(&server)
            .await;

        let client = http_client(RetryPolicy::immediate(1));
        let mut response = client
            .get(format!("{}/compressed", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.text().await.unwrap(), "compressed over the wire");
    }

    #[tokio::test]
    async fn test_json_post_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(body_json(serde_json::json!({"item": "widget", "quantity": 5})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 42})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = http_client(RetryPolicy::immediate(3));
        let mut response = client
            .post(format!("{}/orders", server.uri()))
            .json(&serde_json::json!({"item": "widget", "quantity": 5}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let created: serde_json::Value = response.json().await.unwrap();
        assert_eq!(created["id"], 42);
    }

    #[tokio::test]
    async fn test_connection_refused_exhausts() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = http_client(RetryPolicy::constant(2, Duration::from_millis(5)));
        let err = client
            .get(format!("http://{addr}/"))
            .send()
            .await
            .unwrap_err();

        let exhausted = err.retry_exhausted().expect("retry exhausted");
        assert_eq!(exhausted.attempts, 2);
        assert!(matches!(
            exhausted.last_error.as_deref(),
            Some(HttpClientError::Transport(TransportError::Connect(_)))
        ));
    }
}
