use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid image: {message}")]
    InvalidImage { message: String },

    #[error("Vendor API returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Vendor API timed out after {attempts} attempt(s)")]
    UpstreamTimeout { attempts: u32 },

    #[error("Vendor API unreachable: {0}")]
    UpstreamUnavailable(#[from] reqwest::Error),

    #[error("Invalid vendor response: {message}")]
    InvalidResponse { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

impl ProxyError {
    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage {
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// 是否值得再試一次: 連線錯誤、逾時、429 與 5xx
    pub fn is_retryable(&self) -> bool {
        match self {
            ProxyError::Upstream { status, .. } => *status == 429 || *status >= 500,
            ProxyError::UpstreamTimeout { .. } => true,
            // 連線建立後被中斷也算 request 錯誤；builder 與 redirect 錯誤重試也無用
            ProxyError::UpstreamUnavailable(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || (e.is_request() && !e.is_builder() && !e.is_redirect())
            }
            _ => false,
        }
    }

    /// 用戶端送來的資料有問題 (而非本服務或供應商的問題)
    pub fn is_client_error(&self) -> bool {
        matches!(self, ProxyError::InvalidImage { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
