//! Detection records returned by the remote detector.
//!
//! The detector answers either with a flat list of detections or with an
//! object carrying an "all boxes" list for drawing and a separate "primary
//! detections" list for cropping. [`DetectResponse`] models both shapes and
//! [`DetectResponse::normalize`] collapses them into the single
//! [`NormalizedDetections`] shape the rest of the pipeline consumes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::codec::EncodedImage;
use crate::error::{LofuError, Result};

/// Foot side reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
    Unknown,
}

impl Side {
    /// Parse a side label, case-insensitively. Anything that is not
    /// left or right is `Unknown`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "left" => Self::Left,
            "right" => Self::Right,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point in source-image pixel space, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Axis-aligned bounding box in source-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Box area, floored at zero for malformed boxes.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn is_valid(&self) -> bool {
        self.x2 >= self.x1 && self.y2 >= self.y1
    }
}

/// One object found by the remote detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    #[serde(
        default,
        deserialize_with = "deserialize_side",
        skip_serializing_if = "Option::is_none"
    )]
    pub side: Option<Side>,
    #[serde(rename = "class", default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon_global: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cropped_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_cropped: Option<String>,
}

fn deserialize_side<'de, D>(deserializer: D) -> std::result::Result<Option<Side>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .filter(|s| !s.trim().is_empty())
        .map(|s| Side::parse(&s)))
}

impl Detection {
    /// Bare detection with only a box, mostly useful for tests and fixtures.
    pub fn boxed(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            side: None,
            class_name: None,
            polygon: None,
            polygon_global: None,
            cropped_image: None,
            annotated_cropped: None,
        }
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.x1, self.y1, self.x2, self.y2)
    }

    pub fn area(&self) -> f64 {
        self.bbox().area()
    }

    /// Side label with absent values folded into `Unknown`.
    pub fn side_or_unknown(&self) -> Side {
        self.side.unwrap_or(Side::Unknown)
    }

    /// Text drawn next to the box: the side if known, else the class name.
    pub fn label(&self) -> Option<String> {
        match (self.side, self.class_name.as_deref()) {
            (Some(side), _) => Some(side.to_string()),
            (None, Some(class)) if !class.is_empty() => Some(class.to_string()),
            _ => None,
        }
    }

    /// Polygon to draw on the full capture; global coordinates win over
    /// crop-local ones.
    pub fn drawing_polygon(&self) -> Option<&[Point]> {
        self.polygon_global
            .as_deref()
            .or(self.polygon.as_deref())
    }

    /// Encoded crop for classification, preferring the server-annotated one.
    pub fn crop_data_url(&self) -> Option<&str> {
        self.annotated_cropped
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.cropped_image.as_deref().filter(|s| !s.is_empty()))
    }

    pub fn crop_image(&self) -> Option<Result<EncodedImage>> {
        self.crop_data_url().map(EncodedImage::from_data_url)
    }
}

/// The two response shapes of the detect endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectResponse {
    /// A bare list, used both for drawing and for cropping.
    Flat(Vec<Detection>),
    /// All boxes for drawing (including non-foot classes) plus the primary
    /// foot detections for cropping.
    Split {
        boxes: Vec<Detection>,
        detections: Vec<Detection>,
    },
    /// Anything else (error objects, scalars, null).
    Invalid,
}

#[derive(Deserialize)]
struct SplitBody {
    #[serde(default)]
    boxes: Option<Vec<Detection>>,
    #[serde(default)]
    detections: Option<Vec<Detection>>,
}

impl DetectResponse {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(_) => serde_json::from_value(value)
                .map(Self::Flat)
                .map_err(|e| LofuError::MalformedResponse(format!("detection list: {e}"))),
            Value::Object(ref map)
                if map.contains_key("boxes") || map.contains_key("detections") =>
            {
                let body: SplitBody = serde_json::from_value(value)
                    .map_err(|e| LofuError::MalformedResponse(format!("detection object: {e}")))?;
                Ok(Self::Split {
                    boxes: body.boxes.unwrap_or_default(),
                    detections: body.detections.unwrap_or_default(),
                })
            }
            other => {
                warn!(kind = json_kind(&other), "Detect response is neither a list nor a box object");
                Ok(Self::Invalid)
            }
        }
    }

    /// Collapse either shape into the canonical overlay/cropping split.
    pub fn normalize(self) -> NormalizedDetections {
        match self {
            Self::Flat(list) => NormalizedDetections {
                overlay_boxes: list.clone(),
                primary: list,
                shape: ResponseShape::Flat,
            },
            Self::Split { boxes, detections } => {
                let overlay_boxes = if boxes.is_empty() {
                    detections.clone()
                } else {
                    boxes
                };
                NormalizedDetections {
                    overlay_boxes,
                    primary: detections,
                    shape: ResponseShape::Split,
                }
            }
            Self::Invalid => NormalizedDetections {
                overlay_boxes: Vec::new(),
                primary: Vec::new(),
                shape: ResponseShape::Invalid,
            },
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Which shape a normalized response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Flat,
    Split,
    Invalid,
}

/// Canonical detect result consumed by ranking, drawing and cropping.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDetections {
    pub overlay_boxes: Vec<Detection>,
    pub primary: Vec<Detection>,
    pub shape: ResponseShape,
}

impl NormalizedDetections {
    pub fn is_empty(&self) -> bool {
        self.overlay_boxes.is_empty() && self.primary.is_empty()
    }
}
