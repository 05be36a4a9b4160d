//! Translates heterogeneous vendor detection payloads into a [`DetectionResult`].
//!
//! Vendors disagree on nearly everything: where the list of detections lives,
//! what the label and score fields are called, and how a box is described.
//! Each concern is handled by one small lookup function below; a detection is
//! kept when a box can be recovered from it and it passes the label and
//! confidence filters.

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{BoxOrigin, DetectionConfig};
use crate::core::data_url::to_data_url;
use crate::domain::model::{BoundingBox, DetectedDog, DetectionResult, ImageSize};
use crate::utils::error::{ProxyError, Result};

const LIST_KEYS: &[&str] = &[
    "predictions",
    "detections",
    "objects",
    "results",
    "dogs",
    "localized_object_annotations",
    "localizedObjectAnnotations",
];
const WRAPPER_KEYS: &[&str] = &["result", "data", "output", "outputs"];
const LABEL_KEYS: &[&str] = &["class", "label", "name", "class_name", "category"];
const SCORE_KEYS: &[&str] = &["confidence", "score", "probability"];
const CROP_KEYS: &[&str] = &["crop", "image", "crop_image", "cropped_image", "image_base64"];
const MAX_UNWRAP_DEPTH: usize = 3;

pub fn normalize(body: &Value, config: &DetectionConfig) -> Result<DetectionResult> {
    // 外層的圖片尺寸在拆開 result/data 包裝後仍要保留
    let outer_source = body.as_object().and_then(image_size);
    let body = unwrap(body, 0);

    let (items, source) = match body {
        Value::Array(items) => (items.as_slice(), outer_source),
        Value::Object(obj) => {
            let source = image_size(obj).or(outer_source);
            match find_list(obj) {
                Some(items) => (items, source),
                // 單一偵測物件直接當成長度 1 的清單
                None if find_box(obj, config.box_origin, source).is_some() => {
                    (std::slice::from_ref(body), source)
                }
                None => return Ok(DetectionResult::new(Vec::new(), source)),
            }
        }
        other => {
            return Err(ProxyError::invalid_response(format!(
                "expected a JSON object or array, got {}",
                type_name(other)
            )))
        }
    };

    let mut dogs: Vec<DetectedDog> = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let Some(obj) = item.as_object() else {
                debug!("Skipping detection #{}: not an object", index);
                return None;
            };
            detection(obj, config, source).or_else(|| {
                debug!("Skipping detection #{}: no usable bounding box", index);
                None
            })
        })
        .filter(|dog| label_allowed(&dog.label, &config.labels))
        .filter(|dog| dog.confidence >= config.min_confidence)
        .collect();

    dogs.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    if let Some(max) = config.max_detections {
        dogs.truncate(max);
    }

    Ok(DetectionResult::new(dogs, source))
}

/// 剝除 `result` / `data` 之類的外層包裝
fn unwrap(value: &Value, depth: usize) -> &Value {
    if depth >= MAX_UNWRAP_DEPTH {
        return value;
    }
    let Value::Object(obj) = value else {
        return value;
    };
    if find_list(obj).is_some() {
        return value;
    }
    for key in WRAPPER_KEYS {
        match obj.get(*key) {
            Some(inner @ Value::Object(_)) => return unwrap(inner, depth + 1),
            Some(Value::Array(items)) if items.len() == 1 && items[0].is_object() => {
                return unwrap(&items[0], depth + 1)
            }
            // `outputs: [...]` 本身就是偵測清單的情況
            Some(inner) if inner.as_array().is_some_and(|items| items.iter().all(Value::is_object)) => {
                return inner
            }
            _ => {}
        }
    }
    value
}

fn find_list(obj: &Map<String, Value>) -> Option<&[Value]> {
    LIST_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
}

fn detection(
    obj: &Map<String, Value>,
    config: &DetectionConfig,
    source: Option<ImageSize>,
) -> Option<DetectedDog> {
    let bbox = find_box(obj, config.box_origin, source)?;
    let label = first_str(obj, LABEL_KEYS).unwrap_or("dog").to_string();
    let confidence = first_number(obj, SCORE_KEYS).map(normalize_score).unwrap_or(1.0);
    let image = CROP_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
        .map(crop_data_url);

    Some(DetectedDog {
        label,
        confidence,
        bbox,
        image,
    })
}

fn find_box(
    obj: &Map<String, Value>,
    origin: BoxOrigin,
    source: Option<ImageSize>,
) -> Option<BoundingBox> {
    if let Some(b) = corner_box(obj) {
        return Some(b);
    }

    for key in ["bbox", "box", "bounding_box", "boundingBox"] {
        match obj.get(key) {
            Some(Value::Array(values)) if values.len() == 4 => {
                let v: Option<Vec<f64>> = values.iter().map(as_f64).collect();
                if let Some(v) = v {
                    return Some(BoundingBox::from_top_left(v[0], v[1], v[2], v[3]));
                }
            }
            // 巢狀物件內的寬高一律視為左上角原點
            Some(Value::Object(inner)) => {
                if let Some(b) = find_box(inner, BoxOrigin::TopLeft, source) {
                    return Some(b);
                }
            }
            _ => {}
        }
    }

    if let Some(b) = sized_box(obj, origin) {
        return Some(b);
    }

    polygon_box(obj, source)
}

fn corner_box(obj: &Map<String, Value>) -> Option<BoundingBox> {
    const CORNERS: &[[&str; 4]] = &[
        ["x_min", "y_min", "x_max", "y_max"],
        ["xmin", "ymin", "xmax", "ymax"],
        ["x1", "y1", "x2", "y2"],
        ["left", "top", "right", "bottom"],
    ];
    CORNERS.iter().find_map(|[x1, y1, x2, y2]| {
        Some(BoundingBox::from_corners(
            number(obj, x1)?,
            number(obj, y1)?,
            number(obj, x2)?,
            number(obj, y2)?,
        ))
    })
}

fn sized_box(obj: &Map<String, Value>, origin: BoxOrigin) -> Option<BoundingBox> {
    let width = number(obj, "width").or_else(|| number(obj, "w"))?;
    let height = number(obj, "height").or_else(|| number(obj, "h"))?;

    if let (Some(left), Some(top)) = (number(obj, "left"), number(obj, "top")) {
        return Some(BoundingBox::from_top_left(left, top, width, height));
    }

    let x = number(obj, "x")?;
    let y = number(obj, "y")?;
    Some(match origin {
        BoxOrigin::Center => BoundingBox::from_center(x, y, width, height),
        BoxOrigin::TopLeft => BoundingBox::from_top_left(x, y, width, height),
    })
}

fn polygon_box(obj: &Map<String, Value>, source: Option<ImageSize>) -> Option<BoundingBox> {
    let poly = obj
        .get("bounding_poly")
        .or_else(|| obj.get("boundingPoly"))
        .and_then(Value::as_object)
        .unwrap_or(obj);

    if let Some(b) = poly.get("vertices").and_then(vertices_box) {
        return Some(b);
    }

    let normalized = poly
        .get("normalized_vertices")
        .or_else(|| poly.get("normalizedVertices"))
        .and_then(vertices_box)?;

    Some(match source {
        Some(size) => normalized.scale(size.width, size.height),
        None => normalized,
    })
}

fn vertices_box(value: &Value) -> Option<BoundingBox> {
    let points = value.as_array()?;
    if points.is_empty() {
        return None;
    }

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for point in points {
        let point = point.as_object()?;
        // 座標為 0 時某些供應商會省略該欄位
        let x = number(point, "x").unwrap_or(0.0);
        let y = number(point, "y").unwrap_or(0.0);
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    Some(BoundingBox::from_corners(min_x, min_y, max_x, max_y))
}

fn image_size(obj: &Map<String, Value>) -> Option<ImageSize> {
    let from = |m: &Map<String, Value>, w: &str, h: &str| {
        Some(ImageSize {
            width: number(m, w)?,
            height: number(m, h)?,
        })
    };

    obj.get("image")
        .and_then(Value::as_object)
        .and_then(|image| from(image, "width", "height"))
        .or_else(|| from(obj, "image_width", "image_height"))
}

fn label_allowed(label: &str, labels: &[String]) -> bool {
    labels.is_empty() || labels.iter().any(|l| l.eq_ignore_ascii_case(label.trim()))
}

/// 0..=100 的百分比轉為 0..=1
fn normalize_score(score: f64) -> f64 {
    if score > 1.0 {
        (score / 100.0).min(1.0)
    } else {
        score.max(0.0)
    }
}

fn crop_data_url(crop: &str) -> String {
    let crop = crop.trim();
    if crop.starts_with("data:") {
        crop.to_string()
    } else {
        to_data_url("image/jpeg", crop)
    }
}

fn number(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    obj.get(key).and_then(as_f64)
}

fn first_number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| number(obj, key))
}

fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
}

fn as_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> DetectionConfig {
        DetectionConfig::default()
    }

    fn only_box(body: Value) -> BoundingBox {
        let result = normalize(&body, &config()).unwrap();
        assert_eq!(result.count, 1, "body: {}", body);
        result.dogs[0].bbox
    }

    const EXPECTED: BoundingBox = BoundingBox {
        x: 10.0,
        y: 20.0,
        width: 100.0,
        height: 50.0,
    };

    #[test]
    fn test_center_based_predictions() {
        let body = json!({
            "image": {"width": 640, "height": 480},
            "predictions": [
                {"x": 60, "y": 45, "width": 100, "height": 50, "class": "dog", "confidence": 0.91}
            ]
        });
        let result = normalize(&body, &config()).unwrap();
        assert_eq!(result.dogs[0].bbox, EXPECTED);
        assert_eq!(result.dogs[0].label, "dog");
        assert_eq!(result.dogs[0].confidence, 0.91);
        assert_eq!(result.source, Some(ImageSize { width: 640.0, height: 480.0 }));
    }

    #[test]
    fn test_top_left_origin_option() {
        let mut cfg = config();
        cfg.box_origin = BoxOrigin::TopLeft;
        let body = json!([{"x": 10, "y": 20, "width": 100, "height": 50, "label": "dog"}]);
        let result = normalize(&body, &cfg).unwrap();
        assert_eq!(result.dogs[0].bbox, EXPECTED);
    }

    #[test]
    fn test_every_box_shape_agrees() {
        let shapes = vec![
            json!({"detections": [{"label": "dog", "x_min": 10, "y_min": 20, "x_max": 110, "y_max": 70}]}),
            json!({"objects": [{"name": "Dog", "xmin": "10", "ymin": "20", "xmax": "110", "ymax": "70"}]}),
            json!({"results": [{"class_name": "dog", "bbox": [10, 20, 100, 50]}]}),
            json!({"results": [{"category": "dog", "bbox": {"x": 10, "y": 20, "width": 100, "height": 50}}]}),
            json!({"dogs": [{"box": {"left": 10, "top": 20, "right": 110, "bottom": 70}}]}),
            json!({"dogs": [{"bounding_box": {"left": 10, "top": 20, "width": 100, "height": 50}}]}),
            json!({"predictions": [{"class": "dog", "vertices": [
                {"x": 10, "y": 20}, {"x": 110, "y": 20}, {"x": 110, "y": 70}, {"x": 10, "y": 70}
            ]}]}),
            json!([{"label": "dog", "x1": 110, "y1": 70, "x2": 10, "y2": 20}]),
        ];

        for body in shapes {
            assert_eq!(only_box(body.clone()), EXPECTED, "shape: {}", body);
        }
    }

    #[test]
    fn test_normalized_vertices_scale_with_source_size() {
        let body = json!({
            "image_width": 200,
            "image_height": 100,
            "localizedObjectAnnotations": [{
                "name": "Dog",
                "score": 0.8,
                "boundingPoly": {"normalizedVertices": [
                    {"x": 0.05, "y": 0.2}, {"x": 0.55, "y": 0.2}, {"x": 0.55, "y": 0.7}, {"x": 0.05, "y": 0.7}
                ]}
            }]
        });
        let b = only_box(body);
        assert!((b.x - 10.0).abs() < 1e-9);
        assert!((b.y - 20.0).abs() < 1e-9);
        assert!((b.width - 100.0).abs() < 1e-9);
        assert!((b.height - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_outer_image_size_survives_unwrapping() {
        let body = json!({
            "image": {"width": 200, "height": 100},
            "result": {"localizedObjectAnnotations": [{
                "name": "Dog",
                "score": 0.8,
                "boundingPoly": {"normalizedVertices": [
                    {"x": 0.05, "y": 0.2}, {"x": 0.55, "y": 0.2}, {"x": 0.55, "y": 0.7}, {"x": 0.05, "y": 0.7}
                ]}
            }]}
        });
        let result = normalize(&body, &config()).unwrap();
        assert_eq!(result.source, Some(ImageSize { width: 200.0, height: 100.0 }));

        let b = result.dogs[0].bbox;
        assert!((b.x - 10.0).abs() < 1e-9);
        assert!((b.width - 100.0).abs() < 1e-9);
        assert!((b.height - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_wrapped_responses_are_unwrapped() {
        let body = json!({
            "status": "ok",
            "result": {"data": {"predictions": [
                {"x": 60, "y": 45, "width": 100, "height": 50, "class": "dog"}
            ]}}
        });
        assert_eq!(only_box(body), EXPECTED);

        let body = json!({"outputs": [{"predictions": [
            {"x": 60, "y": 45, "width": 100, "height": 50, "class": "dog"}
        ]}]});
        assert_eq!(only_box(body), EXPECTED);
    }

    #[test]
    fn test_single_detection_object() {
        let body = json!({"label": "dog", "score": 0.7, "bbox": [10, 20, 100, 50]});
        assert_eq!(only_box(body), EXPECTED);
    }

    #[test]
    fn test_filters_labels_and_confidence_and_sorts() {
        let mut cfg = config();
        cfg.min_confidence = 0.5;
        let body = json!({"predictions": [
            {"class": "cat", "confidence": 0.99, "bbox": [0, 0, 1, 1]},
            {"class": "dog", "confidence": 0.6, "bbox": [0, 0, 1, 1]},
            {"class": "DOG", "confidence": 0.95, "bbox": [0, 0, 2, 2]},
            {"class": "dog", "confidence": 0.2, "bbox": [0, 0, 3, 3]},
            {"class": "dog", "confidence": 0.9},
            "garbage"
        ]});

        let result = normalize(&body, &cfg).unwrap();
        assert_eq!(result.count, 2);
        assert_eq!(result.dogs[0].confidence, 0.95);
        assert_eq!(result.dogs[0].label, "DOG");
        assert_eq!(result.dogs[1].confidence, 0.6);
    }

    #[test]
    fn test_empty_label_filter_keeps_everything_and_max_detections_truncates() {
        let mut cfg = config();
        cfg.labels.clear();
        cfg.max_detections = Some(1);
        let body = json!([
            {"class": "cat", "confidence": 0.4, "bbox": [0, 0, 1, 1]},
            {"class": "horse", "confidence": 0.8, "bbox": [0, 0, 1, 1]}
        ]);
        let result = normalize(&body, &cfg).unwrap();
        assert_eq!(result.count, 1);
        assert_eq!(result.dogs[0].label, "horse");
    }

    #[test]
    fn test_percent_scores_and_missing_scores() {
        let body = json!([
            {"score": 87, "bbox": [0, 0, 1, 1]},
            {"bbox": [0, 0, 1, 1]}
        ]);
        let result = normalize(&body, &config()).unwrap();
        assert_eq!(result.dogs[0].confidence, 1.0);
        assert!((result.dogs[1].confidence - 0.87).abs() < 1e-9);
        assert_eq!(result.dogs[0].label, "dog");
    }

    #[test]
    fn test_crops_become_data_urls() {
        let body = json!([
            {"bbox": [0, 0, 1, 1], "confidence": 0.9, "crop": "QUJD"},
            {"bbox": [0, 0, 1, 1], "confidence": 0.8, "image_base64": "data:image/png;base64,QUJD"},
            {"bbox": [0, 0, 1, 1], "confidence": 0.7, "image": {"width": 3}}
        ]);
        let result = normalize(&body, &config()).unwrap();
        assert_eq!(result.dogs[0].image.as_deref(), Some("data:image/jpeg;base64,QUJD"));
        assert_eq!(result.dogs[1].image.as_deref(), Some("data:image/png;base64,QUJD"));
        assert_eq!(result.dogs[2].image, None);
    }

    #[test]
    fn test_object_without_detections_is_empty() {
        let result = normalize(&json!({"status": "ok", "predictions": []}), &config()).unwrap();
        assert_eq!(result.count, 0);

        let result = normalize(&json!({"message": "no objects"}), &config()).unwrap();
        assert!(result.dogs.is_empty());
    }

    #[test]
    fn test_scalar_body_is_invalid() {
        let err = normalize(&json!("dog"), &config()).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidResponse { .. }));
        assert!(normalize(&Value::Null, &config()).is_err());
    }
}
