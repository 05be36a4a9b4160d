pub mod storage;
pub mod toml_config;

pub use toml_config::{
    BoxOrigin, DebugConfig, DetectionConfig, PayloadFormat, ProxyConfig, RetryConfig, ServerConfig,
    VendorConfig,
};

use crate::utils::error::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "dog-detect-proxy")]
#[command(about = "HTTP proxy that forwards images to a dog-detection vendor API")]
pub struct CliArgs {
    #[arg(long, short, env = "DOG_PROXY_CONFIG", help = "Path to a TOML config file")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "DOG_PROXY_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "DOG_PROXY_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "VENDOR_ENDPOINT")]
    pub vendor_endpoint: Option<String>,

    #[arg(long, env = "VENDOR_API_KEY", hide_env_values = true)]
    pub vendor_api_key: Option<String>,

    #[arg(long, env = "DOG_PROXY_DEBUG_DIR", help = "Write vendor traffic to this directory")]
    pub debug_dir: Option<String>,

    #[arg(long, env = "DOG_PROXY_VERBOSE", help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, env = "LOG_JSON", help = "Emit logs as JSON")]
    pub log_json: bool,
}

impl CliArgs {
    /// 載入設定檔 (若有) 並套用命令列覆寫
    pub fn load_config(&self) -> Result<ProxyConfig> {
        let mut config = match &self.config {
            Some(path) => ProxyConfig::from_file(path)?,
            None => ProxyConfig::default(),
        };
        self.apply_overrides(&mut config);
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut ProxyConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(endpoint) = &self.vendor_endpoint {
            config.vendor.endpoint = endpoint.clone();
        }
        if let Some(key) = &self.vendor_api_key {
            config.vendor.api_key = Some(key.clone());
        }
        if let Some(dir) = &self.debug_dir {
            config.debug.enabled = true;
            config.debug.directory = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_file_values() {
        let args = CliArgs::parse_from([
            "dog-detect-proxy",
            "--port",
            "9999",
            "--vendor-endpoint",
            "https://vendor.example.com/infer",
            "--debug-dir",
            "/tmp/dumps",
        ]);

        let mut config = ProxyConfig::default();
        args.apply_overrides(&mut config);

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.vendor.endpoint, "https://vendor.example.com/infer");
        assert!(config.debug.enabled);
        assert_eq!(config.debug.directory, "/tmp/dumps");
    }

    #[test]
    fn test_every_flag_has_an_env_fallback() {
        use clap::CommandFactory;

        let command = CliArgs::command();
        for arg in command.get_arguments() {
            if matches!(arg.get_id().as_str(), "help" | "version") {
                continue;
            }
            assert!(arg.get_env().is_some(), "--{} has no env fallback", arg.get_id());
        }
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let args = CliArgs::parse_from(["dog-detect-proxy"]);
        let mut config = ProxyConfig::default();
        config.vendor.endpoint = "https://keep.example.com".to_string();
        args.apply_overrides(&mut config);
        assert_eq!(config.vendor.endpoint, "https://keep.example.com");
        assert!(!config.debug.enabled);
    }
}
