use serde::{Deserialize, Serialize};

/// 呼叫端送來的請求本體
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    /// `data:image/<subtype>;base64,<payload>`
    pub image: String,
}

/// 已驗證的圖片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    /// 去除空白後的 base64 文字
    pub base64: String,
    /// 解碼後的位元組數
    pub byte_len: usize,
}

/// Pixel box with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// 由兩個角點建立，自動處理順序顛倒的情況
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    pub fn from_center(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        let (width, height) = (width.abs(), height.abs());
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    pub fn from_top_left(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::from_corners(x, y, x + width, y + height)
    }

    pub fn scale(self, sx: f64, sy: f64) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedDog {
    pub label: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
    /// 供應商回傳的裁切圖 (data URL)；供應商沒給就是 null
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub dogs: Vec<DetectedDog>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ImageSize>,
}

impl DetectionResult {
    pub fn new(dogs: Vec<DetectedDog>, source: Option<ImageSize>) -> Self {
        Self {
            count: dogs.len(),
            dogs,
            source,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }
}

/// 供應商成功回應的原始內容
#[derive(Debug, Clone)]
pub struct VendorResponse {
    pub status: u16,
    pub body: serde_json::Value,
}
