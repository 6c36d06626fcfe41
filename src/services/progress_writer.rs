//! 进度写入服务 - 业务能力层
//!
//! 只负责"把进度事件追加到输出日志"能力，不关心流程

use anyhow::{Context, Result};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::models::ProgressEvent;

/// 进度写入服务
///
/// 职责：
/// - 将进度事件逐行追加到日志文件
/// - 只处理单条事件
/// - 不关心流程顺序
#[derive(Debug, Clone)]
pub struct ProgressWriter {
    log_file_path: String,
}

impl ProgressWriter {
    /// 创建新的进度写入服务（默认写入 output.txt）
    pub fn new() -> Self {
        Self {
            log_file_path: "output.txt".to_string(),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            log_file_path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.log_file_path
    }

    /// 追加一条进度事件
    pub async fn write(&self, event: &ProgressEvent) -> Result<()> {
        self.write_line(&event.to_string()).await
    }

    /// 追加一行文本
    pub async fn write_line(&self, line: &str) -> Result<()> {
        debug!("写入进度日志: {}", line);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .await
            .with_context(|| format!("无法打开日志文件: {}", self.log_file_path))?;

        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

impl Default for ProgressWriter {
    fn default() -> Self {
        Self::new()
    }
}
