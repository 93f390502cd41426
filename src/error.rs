use thiserror::Error;

use crate::backend::BackendError;

#[derive(Error, Debug)]
pub enum HonyakuError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dictionary error: {0}")]
    Dictionary(String),

    /// TLS handshake failed; almost always a skewed system clock on the client machine.
    #[error("SSL证书验证失败，请检查系统时间 ({0})")]
    CertificateCheck(String),

    #[error("翻译失败，已尝试 {attempts} 次: {last}")]
    RetriesExhausted { attempts: u32, last: BackendError },

    #[error("后端持续限流，已重试 {retries} 次: {last}")]
    RateLimitExhausted { retries: u32, last: BackendError },

    #[error("没有可用的翻译后端: {0}")]
    NoBackendAvailable(String),

    #[error("翻译超时")]
    Timeout,

    #[error("Translation error: {0}")]
    Translation(String),
}

pub type Result<T> = std::result::Result<T, HonyakuError>;
