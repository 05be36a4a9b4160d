use crate::utils::error::{ProxyError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub server: ServerConfig,
    pub vendor: VendorConfig,
    pub retry: RetryConfig,
    pub detection: DetectionConfig,
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 15 * MIB,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// 送往供應商的請求格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// `{"<image_field>": "<base64>"}`
    #[default]
    Json,
    /// 以 base64 純文字作為 body
    Base64Body,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    /// 設定時 API key 以 query 參數傳送，否則使用 Bearer header
    pub api_key_param: Option<String>,
    pub payload: PayloadFormat,
    pub image_field: String,
    pub extra_fields: HashMap<String, serde_json::Value>,
    pub headers: HashMap<String, String>,
    pub timeout_seconds: u64,
    pub health_endpoint: Option<String>,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            api_key_param: None,
            payload: PayloadFormat::Json,
            image_field: "image".to_string(),
            extra_fields: HashMap::new(),
            headers: HashMap::new(),
            timeout_seconds: 30,
            health_endpoint: None,
        }
    }
}

impl VendorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

/// 供應商 `x`/`y`/`width`/`height` 平面欄位的原點
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxOrigin {
    #[default]
    Center,
    TopLeft,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// 保留的標籤 (不分大小寫)；空陣列代表全部保留
    pub labels: Vec<String>,
    pub min_confidence: f64,
    pub max_detections: Option<usize>,
    pub box_origin: BoxOrigin,
    pub allowed_image_types: Vec<String>,
    pub max_image_bytes: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            labels: vec!["dog".to_string()],
            min_confidence: 0.0,
            max_detections: None,
            box_origin: BoxOrigin::Center,
            allowed_image_types: ["jpeg", "jpg", "png", "webp", "gif", "bmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_image_bytes: 10 * MIB,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub directory: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: "./debug".to_string(),
        }
    }
}

impl ProxyConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ProxyError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| ProxyError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${VENDOR_API_KEY})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> String {
        static ENV_VAR: OnceLock<Regex> = OnceLock::new();
        let re = ENV_VAR.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("server.host", &self.server.host)?;
        validation::validate_positive_number("server.max_body_bytes", self.server.max_body_bytes, 1)?;
        for origin in &self.server.cors_origins {
            validation::validate_origin("server.cors_origins", origin)?;
        }

        validation::validate_url("vendor.endpoint", &self.vendor.endpoint)?;
        if let Some(health) = &self.vendor.health_endpoint {
            validation::validate_url("vendor.health_endpoint", health)?;
        }
        if let Some(param) = &self.vendor.api_key_param {
            validation::validate_non_empty_string("vendor.api_key_param", param)?;
            validation::validate_required_field("vendor.api_key", &self.vendor.api_key)?;
        }
        if let Some(key) = &self.vendor.api_key {
            if key.contains("${") {
                return Err(ProxyError::InvalidConfigValueError {
                    field: "vendor.api_key".to_string(),
                    value: key.clone(),
                    reason: "Environment variable was not set".to_string(),
                });
            }
        }
        validation::validate_non_empty_string("vendor.image_field", &self.vendor.image_field)?;
        for name in self.vendor.headers.keys() {
            validation::validate_header_name("vendor.headers", name)?;
        }
        validation::validate_range("vendor.timeout_seconds", self.vendor.timeout_seconds, 1, 600)?;

        validation::validate_range("retry.max_attempts", self.retry.max_attempts, 1, 10)?;
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(ProxyError::InvalidConfigValueError {
                field: "retry.max_delay_ms".to_string(),
                value: self.retry.max_delay_ms.to_string(),
                reason: "Must not be smaller than retry.initial_delay_ms".to_string(),
            });
        }

        validation::validate_range("detection.min_confidence", self.detection.min_confidence, 0.0, 1.0)?;
        if let Some(max) = self.detection.max_detections {
            validation::validate_positive_number("detection.max_detections", max, 1)?;
        }
        validation::validate_positive_number("detection.max_image_bytes", self.detection.max_image_bytes, 1)?;
        if self.detection.allowed_image_types.is_empty() {
            return Err(ProxyError::InvalidConfigValueError {
                field: "detection.allowed_image_types".to_string(),
                value: "[]".to_string(),
                reason: "At least one image type must be allowed".to_string(),
            });
        }

        if self.debug.enabled {
            validation::validate_path("debug.directory", &self.debug.directory)?;
        }

        Ok(())
    }
}

impl Validate for ProxyConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
