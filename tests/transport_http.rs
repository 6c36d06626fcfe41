//! HTTP 层测试：用 wiremock 模拟服务商，验证重试、错误映射和响应校验

use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lesson_pipeline::infrastructure::{HttpTransport, LlmTransport, RetryPolicy};
use lesson_pipeline::models::{ChatRequest, ProviderKind};
use lesson_pipeline::{App, Config, TransportError};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay_ms: 10,
        max_delay_ms: 50,
        backoff_factor: 2.0,
    }
}

fn transport(provider: ProviderKind, url: &str) -> HttpTransport {
    HttpTransport::new(provider, url, "sk-test", Duration::from_secs(5))
        .unwrap()
        .with_retry(fast_retry())
}

fn request() -> ChatRequest {
    ChatRequest::new("test-model", Some("system"), "Hello", 0.7, 100)
}

fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
    })
}

#[tokio::test]
async fn success_returns_message_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Structured lesson")))
        .expect(1)
        .mount(&server)
        .await;

    let reply = transport(ProviderKind::OpenRouter, &server.uri())
        .call(&request())
        .await
        .unwrap();
    assert_eq!(reply, "Structured lesson");
}

#[tokio::test]
async fn rate_limited_then_success_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(serde_json::json!({ "error": { "message": "slow down" } })),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let reply = transport(ProviderKind::OpenAi, &server.uri())
        .call(&request())
        .await
        .unwrap();
    assert_eq!(reply, "ok");
}

#[tokio::test]
async fn bad_request_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({ "error": { "message": "unknown model" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = transport(ProviderKind::OpenRouter, &server.uri())
        .call(&request())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TransportError::Status {
            status: 400,
            message: "unknown model".into()
        }
    );
}

#[tokio::test]
async fn server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        // 首次 + 3 次重试
        .expect(4)
        .mount(&server)
        .await;

    let err = transport(ProviderKind::Nvidia, &server.uri())
        .call(&request())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(matches!(err, TransportError::Status { ref message, .. } if message == "Service Unavailable"));
}

#[tokio::test]
async fn empty_content_is_a_format_error_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("")))
        .expect(1)
        .mount(&server)
        .await;

    let err = transport(ProviderKind::OpenRouter, &server.uri())
        .call(&request())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::InvalidResponseFormat(_)));
}

#[tokio::test]
async fn anthropic_uses_messages_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "sk-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{ "type": "text", "text": "Course outline" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = transport(ProviderKind::Anthropic, &server.uri())
        .call(&request())
        .await
        .unwrap();
    assert_eq!(reply, "Course outline");
}

#[tokio::test]
async fn extra_headers_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("X-Title", "Educational Content Processing System"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let reply = transport(ProviderKind::OpenRouter, &server.uri())
        .with_header("X-Title", "Educational Content Processing System")
        .call(&request())
        .await
        .unwrap();
    assert_eq!(reply, "ok");
}

#[tokio::test]
async fn connection_refused_is_a_network_error() {
    // 绑定后立即释放端口，保证没有服务监听
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let transport = HttpTransport::new(
        ProviderKind::OpenAi,
        format!("http://127.0.0.1:{}", port),
        "sk-test",
        Duration::from_secs(2),
    )
    .unwrap()
    .with_retry(RetryPolicy {
        max_attempts: 1,
        initial_delay_ms: 5,
        max_delay_ms: 5,
        backoff_factor: 2.0,
    });

    let err = transport.call(&request()).await.unwrap_err();
    assert!(matches!(err, TransportError::Network(_)), "got {:?}", err);
}

#[tokio::test]
async fn slow_response_times_out_and_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("too late"))
                .set_delay(Duration::from_millis(500)),
        )
        // 首次 + 2 次重试
        .expect(3)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(
        ProviderKind::OpenAi,
        server.uri(),
        "sk-test",
        Duration::from_millis(50),
    )
    .unwrap()
    .with_retry(RetryPolicy {
        max_attempts: 2,
        initial_delay_ms: 5,
        max_delay_ms: 10,
        backoff_factor: 2.0,
    });

    let err = transport.call(&request()).await.unwrap_err();
    assert_eq!(err, TransportError::Timeout);
}

async fn run_app_on_one_document(server: &MockServer, refresh_after_batch: bool) {
    let dir = tempfile::tempdir().unwrap();
    let documents = dir.path().join("chemistry");
    std::fs::create_dir(&documents).unwrap();
    std::fs::write(documents.join("atoms.md"), "Atoms are small.").unwrap();

    let config = Config {
        provider: ProviderKind::OpenAi,
        llm_api_key: "sk-test".to_string(),
        llm_api_endpoint: Some(server.uri()),
        retry: fast_retry(),
        documents_folder: documents.to_string_lossy().to_string(),
        output_log_file: dir.path().join("output.txt").to_string_lossy().to_string(),
        refresh_after_batch,
        ..Default::default()
    };

    let app = App::initialize(config).await.unwrap();
    app.run().await.unwrap();
}

#[tokio::test]
async fn batch_run_evaluates_each_document_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Score 0.9")))
        // 抽取 + 评估，不再重新评估
        .expect(2)
        .mount(&server)
        .await;

    run_app_on_one_document(&server, false).await;
}

#[tokio::test]
async fn batch_run_with_refresh_reevaluates_and_structures_course() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Score 0.9")))
        // 抽取 + 评估，刷新时再评估一次并生成课程结构
        .expect(4)
        .mount(&server)
        .await;

    run_app_on_one_document(&server, true).await;
}
