use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Parser;
use dog_detect_proxy::core::data_url::to_data_url;
use dog_detect_proxy::core::Storage;
use dog_detect_proxy::utils::{logger, validation::Validate};
use dog_detect_proxy::{build_service, CliArgs, DetectRequest, LocalStorage};

/// 直接對本機圖片執行偵測，用來手動驗證供應商設定
#[derive(Debug, Parser)]
#[command(name = "detect-file")]
#[command(about = "Send a local image through the proxy pipeline and print the result")]
struct Args {
    /// Image file to send
    image: PathBuf,

    #[command(flatten)]
    proxy: CliArgs,
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_cli_logger(args.proxy.verbose);

    let config = args.proxy.load_config()?;
    config.validate()?;

    println!("🚀 Sending {} to {}", args.image.display(), config.vendor.endpoint);

    let storage = LocalStorage::new(".");
    let path = args.image.to_string_lossy();
    let bytes = storage
        .read_file(&path)
        .await
        .with_context(|| format!("failed to read {}", args.image.display()))?;

    let request = DetectRequest {
        image: to_data_url(mime_for(&args.image), &STANDARD.encode(&bytes)),
    };

    let service = build_service(&config)?;
    let result = service.detect("detect-file", &request).await?;

    println!("✅ {} dog(s) found", result.count);
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
