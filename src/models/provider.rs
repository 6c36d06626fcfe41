//! 模型服务商
//!
//! 服务商是一个封闭集合，在构造传输层时通过显式标签选择。

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// 请求/响应的报文格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// OpenAI 兼容的 `/chat/completions`
    OpenAiChat,
    /// Anthropic `/messages`
    AnthropicMessages,
}

/// 服务商枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenRouter（默认）
    OpenRouter,
    /// OpenAI
    OpenAi,
    /// Anthropic
    Anthropic,
    /// NVIDIA NIM
    Nvidia,
}

impl ProviderKind {
    /// 服务商名称，同时作为监控指标的 key
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Nvidia => "nvidia",
        }
    }

    /// 默认 API 地址
    pub fn default_endpoint(self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
            ProviderKind::Nvidia => "https://integrate.api.nvidia.com/v1",
        }
    }

    pub fn wire_format(self) -> WireFormat {
        match self {
            ProviderKind::Anthropic => WireFormat::AnthropicMessages,
            _ => WireFormat::OpenAiChat,
        }
    }

    /// 从字符串解析服务商（忽略大小写）
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openrouter" => Some(ProviderKind::OpenRouter),
            "openai" => Some(ProviderKind::OpenAi),
            "anthropic" => Some(ProviderKind::Anthropic),
            "nvidia" => Some(ProviderKind::Nvidia),
            _ => None,
        }
    }
}

impl Default for ProviderKind {
    fn default() -> Self {
        ProviderKind::OpenRouter
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!(ProviderKind::from_str("OpenRouter"), Some(ProviderKind::OpenRouter));
        assert_eq!(ProviderKind::from_str(" anthropic "), Some(ProviderKind::Anthropic));
        assert_eq!(ProviderKind::from_str("azure"), None);
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(ProviderKind::Anthropic.wire_format(), WireFormat::AnthropicMessages);
        assert_eq!(ProviderKind::Nvidia.wire_format(), WireFormat::OpenAiChat);
    }
}
