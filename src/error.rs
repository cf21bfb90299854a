use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthMatrixError {
    /// 文档格式错误：JSON 无效、缺少必需字段或存在悬空引用
    #[error("格式错误: {0}")]
    FormatError(String),

    /// 调用方对 SpecStore 的非法修改，不会产生部分修改
    #[error("校验错误: {0}")]
    ValidationError(String),

    /// 单次 HTTP 请求失败，只影响对应的单元格
    #[error("传输错误: {0}")]
    TransportError(String),

    /// 引擎内部的致命错误（例如快照不合法），通过 ERROR 通道上报
    #[error("引擎错误: {0}")]
    EngineFatal(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("HTTP 请求失败: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL 解析错误: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("{0}")]
    Other(String),
}

// Add conversion from anyhow::Error
impl From<anyhow::Error> for AuthMatrixError {
    fn from(err: anyhow::Error) -> Self {
        AuthMatrixError::Other(err.to_string())
    }
}

impl AuthMatrixError {
    pub fn format(message: impl Into<String>) -> Self {
        AuthMatrixError::FormatError(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AuthMatrixError::ValidationError(message.into())
    }
}

/// Result type for authmatrix crate
pub type Result<T> = std::result::Result<T, AuthMatrixError>;
