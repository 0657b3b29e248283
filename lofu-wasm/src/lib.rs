//! WebAssembly bindings for the Lofu detection pipeline.
//!
//! Exposes the pure pieces of the pipeline (response normalization,
//! ranking and overlay rendering) so a browser client can annotate a
//! capture without another round trip. Every binding takes and returns
//! JSON strings; failures are reported as `{"error": "..."}`.

use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;

use lofu_core::detection::ResponseShape;
use lofu_core::{render_detections, rank, DetectResponse, Detection, EncodedImage, RankPolicy};

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Normalized detect response.
#[derive(Serialize)]
pub struct NormalizedView {
    /// `flat`, `split` or `invalid`
    pub shape: &'static str,
    pub overlay_boxes: Vec<Detection>,
    pub primary: Vec<Detection>,
}

/// Rendered overlay.
#[derive(Serialize)]
pub struct OverlayView {
    /// PNG as a data URL, ready for an `<img>` element.
    pub image: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Serialize)]
struct ErrorView {
    error: String,
}

/// Rank a JSON list of detections.
///
/// # Arguments
/// * `detections_json` - Detection list as returned by the detect endpoint
/// * `review` - Keep up to four detections instead of two
///
/// # Returns
/// The selected detections, in display order, as a JSON list
#[wasm_bindgen]
pub fn rank_detections_wasm(detections_json: &str, review: bool) -> String {
    respond(rank_internal(detections_json, review))
}

/// Normalize a raw detect response body (flat list or `{boxes, detections}`).
#[wasm_bindgen]
pub fn normalize_detect_response_wasm(response_json: &str) -> String {
    respond(normalize_internal(response_json))
}

/// Draw detections over an encoded image.
///
/// # Arguments
/// * `image_bytes` - The encoded capture (PNG, JPEG, WebP or GIF)
/// * `detections_json` - Detections to draw, as a JSON list
#[wasm_bindgen]
pub fn render_overlay_wasm(image_bytes: &[u8], detections_json: &str) -> String {
    respond(render_internal(image_bytes, detections_json))
}

/// Get the library version.
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn rank_internal(detections_json: &str, review: bool) -> Result<Vec<Detection>, String> {
    let detections = parse_detections(detections_json)?;
    let policy = if review {
        RankPolicy::review()
    } else {
        RankPolicy::capture()
    };
    Ok(rank(&detections, policy).into_vec())
}

fn normalize_internal(response_json: &str) -> Result<NormalizedView, String> {
    let value: Value =
        serde_json::from_str(response_json).map_err(|e| format!("Failed to parse response: {e}"))?;
    let normalized = DetectResponse::from_value(value).map_err(|e| e.to_string())?.normalize();

    let shape = match normalized.shape {
        ResponseShape::Flat => "flat",
        ResponseShape::Split => "split",
        ResponseShape::Invalid => "invalid",
    };
    Ok(NormalizedView {
        shape,
        overlay_boxes: normalized.overlay_boxes,
        primary: normalized.primary,
    })
}

fn render_internal(image_bytes: &[u8], detections_json: &str) -> Result<OverlayView, String> {
    let detections = parse_detections(detections_json)?;
    let source = EncodedImage::from_bytes(image_bytes.to_vec());
    let overlay = render_detections(&source, &detections).map_err(|e| e.to_string())?;
    Ok(OverlayView {
        image: overlay.image.to_data_url(),
        width: overlay.width,
        height: overlay.height,
    })
}

fn parse_detections(json: &str) -> Result<Vec<Detection>, String> {
    serde_json::from_str(json).map_err(|e| format!("Failed to parse detections: {e}"))
}

fn respond<T: Serialize>(result: Result<T, String>) -> String {
    let json = match &result {
        Ok(value) => serde_json::to_string(value),
        Err(error) => serde_json::to_string(&ErrorView { error: error.clone() }),
    };
    json.unwrap_or_else(|e| format!(r#"{{"error":"Serialization error: {e}"}}"#))
}
