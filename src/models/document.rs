//! 待处理的文档

use serde::{Deserialize, Serialize};

/// 一份上传的文档
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// 文件名（含扩展名）
    pub name: String,
    /// 文本内容
    pub content: String,
    /// 原始文件大小（字节）
    pub size_bytes: u64,
    /// 来源路径（从目录加载时设置）
    #[serde(default)]
    pub file_path: Option<String>,
}

impl Document {
    /// 由文件名和内容创建，大小取内容的字节数
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            name: name.into(),
            size_bytes: content.len() as u64,
            content,
            file_path: None,
        }
    }

    /// 去掉最后一个扩展名作为课程标题
    pub fn title(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 && idx + 1 < self.name.len() => &self.name[..idx],
            _ => &self.name,
        }
    }

    /// 以 4 字节 ≈ 1 token 粗略估算
    pub fn estimated_tokens(&self) -> u64 {
        estimate_tokens(self.size_bytes)
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// `ceil(len / 4)`
pub fn estimate_tokens(len: u64) -> u64 {
    len.div_ceil(4)
}
