use thiserror::Error;

pub type Result<T> = std::result::Result<T, LogQueryError>;

#[derive(Debug, Error)]
pub enum LogQueryError {
    /// 未知的方法/工具/提示词,映射为 JSON-RPC -32601。
    #[error("{0}")]
    NotFound(String),

    #[error("无效请求: {0}")]
    InvalidRequest(String),

    #[error("内部错误: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
