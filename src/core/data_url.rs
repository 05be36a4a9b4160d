use crate::config::DetectionConfig;
use crate::domain::model::ImagePayload;
use crate::utils::error::{ProxyError, Result};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

/// 標準字母表，但容許省略結尾的 `=`
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Parses and validates a `data:image/<subtype>;base64,<payload>` string.
///
/// The payload is decoded only to validate it; the vendor receives the
/// caller's base64 text with whitespace removed.
pub fn parse_data_url(input: &str, limits: &DetectionConfig) -> Result<ImagePayload> {
    let rest = input
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| ProxyError::invalid_image("image must be a data URL starting with 'data:'"))?;

    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ProxyError::invalid_image("data URL is missing the ',' separator"))?;

    let mut parts = meta.split(';');
    let mime_type = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
    let params: Vec<&str> = parts.map(str::trim).collect();

    if params.last().map(|p| p.eq_ignore_ascii_case("base64")) != Some(true) {
        return Err(ProxyError::invalid_image("data URL must be base64 encoded"));
    }

    let subtype = mime_type
        .strip_prefix("image/")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ProxyError::invalid_image(format!("unsupported media type '{}'", mime_type))
        })?;

    if !limits
        .allowed_image_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(subtype))
    {
        return Err(ProxyError::invalid_image(format!(
            "image type '{}' is not allowed (allowed: {})",
            subtype,
            limits.allowed_image_types.join(", ")
        )));
    }

    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(ProxyError::invalid_image("image payload is empty"));
    }

    // 解碼前先估算大小，避免為超大圖片配置記憶體
    let estimated = compact.len() / 4 * 3;
    if estimated > limits.max_image_bytes + 3 {
        return Err(too_large(estimated, limits.max_image_bytes));
    }

    let bytes = LENIENT
        .decode(compact.as_bytes())
        .map_err(|e| ProxyError::invalid_image(format!("invalid base64 payload: {}", e)))?;

    if bytes.is_empty() {
        return Err(ProxyError::invalid_image("image payload is empty"));
    }
    if bytes.len() > limits.max_image_bytes {
        return Err(too_large(bytes.len(), limits.max_image_bytes));
    }

    let byte_len = bytes.len();

    Ok(ImagePayload {
        mime_type,
        base64: compact,
        byte_len,
    })
}

fn too_large(size: usize, max: usize) -> ProxyError {
    ProxyError::invalid_image(format!(
        "image is {} bytes, larger than the {} byte limit",
        size, max
    ))
}

pub fn to_data_url(mime_type: &str, base64: &str) -> String {
    format!("data:{};base64,{}", mime_type, base64)
}
