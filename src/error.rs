use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 流水线错误
    #[error("流水线错误: {0}")]
    Pipeline(#[from] PipelineError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置项取值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    InvalidValue { field: String, reason: String },
    /// 配置文件解析失败
    #[error("配置文件解析失败 ({path}): {source}")]
    FileParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 目录不存在
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
}

/// 单次远程调用的失败
///
/// 只描述"发生了什么"，是否重试由 `infrastructure::retry` 判断，
/// 面向用户的文案由 `services::error_classifier` 决定。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// 服务端返回非 2xx 状态码
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    /// 请求超时（没有收到响应）
    #[error("请求超时")]
    Timeout,
    /// 网络层失败（没有收到响应）
    #[error("网络错误: {0}")]
    Network(String),
    /// 响应结构不符合预期
    #[error("响应格式无效: {0}")]
    InvalidResponseFormat(String),
}

impl TransportError {
    /// HTTP 状态码（网络层失败时为 None）
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::InvalidResponseFormat(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// 持久化协作方错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// 当前没有登录用户
    #[error("Authentication required")]
    NotAuthenticated,
    /// 记录不存在
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    /// 存储后端失败
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// 准入控制错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateLimitError {
    /// 排队中的操作在启动前被丢弃
    #[error("queued request was dropped before it could run")]
    QueueDropped,
}

/// 流水线阶段内部的错误，对外统一经过分类器转换为 `ErrorInfo`
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] RateLimitError),
    /// 文档内容为空
    #[error("Empty or invalid file content")]
    EmptyDocument,
    /// 课程下没有可用于生成结构的课时
    #[error("Course has no lessons: {0}")]
    EmptyCourse(String),
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_status_display() {
        let err = TransportError::Status {
            status: 503,
            message: "upstream overloaded".into(),
        };
        assert_eq!(err.to_string(), "HTTP 503: upstream overloaded");
        assert_eq!(err.status(), Some(503));
        assert_eq!(TransportError::Timeout.status(), None);
    }

    #[test]
    fn pipeline_error_is_transparent() {
        let err: PipelineError = StoreError::NotAuthenticated.into();
        assert_eq!(err.to_string(), "Authentication required");

        let err: PipelineError = TransportError::Network("connection reset".into()).into();
        assert_eq!(err.to_string(), "网络错误: connection reset");
    }

    #[test]
    fn file_error_display() {
        let err = AppError::file_write_failed(
            "output.txt",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "文件错误: 写入文件失败 (output.txt): denied");

        let err: AppError = FileError::DirectoryNotFound {
            path: "documents".into(),
        }
        .into();
        assert_eq!(err.to_string(), "文件错误: 目录不存在: documents");
    }
}
