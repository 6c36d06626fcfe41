//! 课时处理上下文
//!
//! 封装"我正在处理第几份文档"这一信息，只用于日志

use std::fmt::Display;

use crate::models::Document;

/// 课时处理上下文
#[derive(Debug, Clone)]
pub struct LessonCtx {
    /// 文档序号（从1开始，仅用于日志显示）
    pub document_index: usize,

    /// 文档文件名
    pub document_name: String,
}

impl LessonCtx {
    /// 创建新的上下文
    pub fn new(document_index: usize, document_name: impl Into<String>) -> Self {
        Self {
            document_index,
            document_name: document_name.into(),
        }
    }

    pub fn for_document(document_index: usize, document: &Document) -> Self {
        Self::new(document_index, document.name.clone())
    }
}

impl Display for LessonCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[文档 {} {}]", self.document_index, self.document_name)
    }
}
