//! 远程模型调用 - 基础设施层
//!
//! `HttpTransport` 是唯一持有 HTTP 客户端和 API 密钥的地方。
//! 一次 `call` = 带超时的单次请求 + 响应结构校验 + 按 `RetryPolicy` 重试。
//! 传输层不上报指标，耗时由调用方统计。

use crate::config::Config;
use crate::error::TransportError;
use crate::infrastructure::retry::RetryPolicy;
use crate::models::{ChatMessage, ChatRequest, ChatRole, ProviderKind, WireFormat};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Anthropic messages API 版本
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// 远程调用能力
#[async_trait]
pub trait LlmTransport: Send + Sync {
    /// 服务商名称，用作监控指标的 key
    fn provider_name(&self) -> &str;

    /// 发送请求并返回模型回复的文本
    async fn call(&self, request: &ChatRequest) -> Result<String, TransportError>;
}

/// 基于 reqwest 的 HTTP 传输
pub struct HttpTransport {
    http: reqwest::Client,
    provider: ProviderKind,
    endpoint: String,
    api_key: String,
    extra_headers: Vec<(String, String)>,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// 创建新的传输层
    ///
    /// # 参数
    /// - `provider`: 服务商，决定报文格式和鉴权方式
    /// - `endpoint`: API 根地址（不含 `/chat/completions`）
    /// - `api_key`: API 密钥
    /// - `timeout`: 单次请求超时
    pub fn new(
        provider: ProviderKind,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("无法创建 HTTP 客户端: {}", e)))?;

        Ok(Self {
            http,
            provider,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            extra_headers: Vec::new(),
            retry: RetryPolicy::default(),
        })
    }

    /// 按配置创建，OpenRouter 会附带 `HTTP-Referer` / `X-Title`
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        let mut transport = Self::new(
            config.provider,
            config.endpoint(),
            config.llm_api_key.clone(),
            config.request_timeout(),
        )?
        .with_retry(config.retry.clone());

        if config.provider == ProviderKind::OpenRouter {
            let referer = config
                .http_referer
                .clone()
                .unwrap_or_else(|| "http://localhost".to_string());
            transport = transport
                .with_header("HTTP-Referer", referer)
                .with_header("X-Title", config.app_title.clone());
        }

        Ok(transport)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    /// 单次请求，不重试
    async fn send_once(&self, request: &ChatRequest) -> Result<String, TransportError> {
        let wire_format = self.provider.wire_format();

        debug!(
            provider = %self.provider,
            model = %request.model,
            messages = request.messages.len(),
            "发送模型请求"
        );

        let mut builder = match wire_format {
            WireFormat::OpenAiChat => self
                .http
                .post(self.url("chat/completions"))
                .bearer_auth(&self.api_key)
                .json(request),
            WireFormat::AnthropicMessages => self
                .http
                .post(self.url("messages"))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&AnthropicRequest::from_chat(request)),
        };
        for (name, value) in &self.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body).unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                } else {
                    body.trim().to_string()
                }
            });
            warn!(
                provider = %self.provider,
                status = status.as_u16(),
                message = %message,
                "服务商返回错误状态"
            );
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let content = match wire_format {
            WireFormat::OpenAiChat => parse_chat_completion(&body)?,
            WireFormat::AnthropicMessages => parse_anthropic_message(&body)?,
        };

        debug!(provider = %self.provider, chars = content.len(), "收到模型回复");
        Ok(content)
    }
}

#[async_trait]
impl LlmTransport for HttpTransport {
    fn provider_name(&self) -> &str {
        self.provider.name()
    }

    async fn call(&self, request: &ChatRequest) -> Result<String, TransportError> {
        self.retry
            .run(self.provider.name(), || self.send_once(request))
            .await
    }
}

// ========== 报文结构 ==========

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<&'a ChatMessage>,
}

impl<'a> AnthropicRequest<'a> {
    fn from_chat(request: &'a ChatRequest) -> Self {
        Self {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system_prompt(),
            messages: request
                .messages
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// `choices[0].message.content`，缺失或为空都视为格式错误
fn parse_chat_completion(body: &str) -> Result<String, TransportError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| TransportError::InvalidResponseFormat(e.to_string()))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| TransportError::InvalidResponseFormat("缺少 message content".into()))?;

    non_empty(content)
}

/// `content[0].text`
fn parse_anthropic_message(body: &str) -> Result<String, TransportError> {
    let parsed: AnthropicResponse = serde_json::from_str(body)
        .map_err(|e| TransportError::InvalidResponseFormat(e.to_string()))?;

    let content = parsed
        .content
        .into_iter()
        .next()
        .and_then(|block| block.text)
        .ok_or_else(|| TransportError::InvalidResponseFormat("缺少 content text".into()))?;

    non_empty(content)
}

fn non_empty(content: String) -> Result<String, TransportError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(TransportError::InvalidResponseFormat("回复内容为空".into()));
    }
    Ok(trimmed.to_string())
}

/// 从 `{ "error": { "message": ... } }` 等常见错误体中取出消息
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(|m| m.as_str())
        .or_else(|| value.get("message").and_then(|m| m.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  Hello  "}}]}"#;
        assert_eq!(parse_chat_completion(body).unwrap(), "Hello");
    }

    #[test]
    fn test_parse_chat_completion_rejects_bad_shapes() {
        for body in [
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"content":"   "}}]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"result":"ok"}"#,
            "not json",
        ] {
            assert!(
                matches!(
                    parse_chat_completion(body),
                    Err(TransportError::InvalidResponseFormat(_))
                ),
                "body 应判为格式错误: {}",
                body
            );
        }
    }

    #[test]
    fn test_parse_anthropic_message() {
        let body = r#"{"content":[{"type":"text","text":"Outline"}],"stop_reason":"end_turn"}"#;
        assert_eq!(parse_anthropic_message(body).unwrap(), "Outline");
        assert!(parse_anthropic_message(r#"{"content":[]}"#).is_err());
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"Invalid model","code":400}}"#).as_deref(),
            Some("Invalid model")
        );
        assert_eq!(
            extract_error_message(r#"{"error":"quota"}"#).as_deref(),
            Some("quota")
        );
        assert_eq!(extract_error_message("<html>bad gateway</html>"), None);
    }

    #[test]
    fn test_anthropic_request_moves_system_prompt() {
        let request = ChatRequest::new("claude", Some("be brief"), "hi", 0.7, 100);
        let json = serde_json::to_value(AnthropicRequest::from_chat(&request)).unwrap();
        assert_eq!(json["system"], "be brief");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_from_config_openrouter_headers() {
        let config = Config {
            llm_api_key: "sk".into(),
            ..Default::default()
        };
        let transport = HttpTransport::from_config(&config).unwrap();
        assert_eq!(transport.provider_name(), "openrouter");
        assert!(transport.extra_headers.iter().any(|(k, _)| k == "HTTP-Referer"));
        assert!(transport
            .extra_headers
            .iter()
            .any(|(k, v)| k == "X-Title" && v == "Educational Content Processing System"));
        assert_eq!(transport.url("chat/completions"), "https://openrouter.ai/api/v1/chat/completions");
    }
}
