//! 聊天补全请求

use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// 单条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// 发往服务商的请求（OpenAI 兼容格式）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// 系统消息（可选）+ 用户消息
    pub fn new(
        model: impl Into<String>,
        system_message: Option<&str>,
        user_message: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(sys_msg) = system_message {
            messages.push(ChatMessage::system(sys_msg));
        }
        messages.push(ChatMessage::user(user_message));

        Self {
            model: model.into(),
            messages,
            temperature,
            max_tokens,
        }
    }

    /// 第一条系统消息的内容
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_openai_shape() {
        let request = ChatRequest::new("mistralai/mistral-7b-instruct", Some("sys"), "hi", 0.7, 4000);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "mistralai/mistral-7b-instruct");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 4000);
    }

    #[test]
    fn test_without_system_message() {
        let request = ChatRequest::new("m", None, "hi", 0.3, 10);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.system_prompt(), None);
    }
}
