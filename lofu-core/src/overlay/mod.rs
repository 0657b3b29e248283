//! Overlay rendering for capture previews and reports.
//!
//! Boxes, labels and polygons are drawn onto a copy of the source image at
//! its intrinsic resolution, so detector coordinates (source-pixel space)
//! line up without any rescaling. The result is always re-encoded as PNG.
//!
//! # Usage
//!
//! ```no_run
//! use lofu_core::codec::EncodedImage;
//! use lofu_core::overlay::{render_overlay, OverlayStyle, Region};
//! use lofu_core::detection::{Detection, Side};
//!
//! let source = EncodedImage::from_bytes(std::fs::read("feet.png").unwrap());
//! let regions = [Region::from_detection(
//!     &Detection::boxed(10.0, 20.0, 110.0, 220.0).with_side(Side::Left),
//! )];
//! let overlay = render_overlay(&source, &regions, &OverlayStyle::default()).unwrap();
//! assert_eq!(overlay.image.mime, "image/png");
//! ```

mod font;

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use tracing::debug;

use crate::codec::EncodedImage;
use crate::detection::{BoundingBox, Detection, Point, Side};
use crate::error::{LofuError, Result};

pub use font::text_size;

/// Minimum number of points for a polygon to be drawn.
pub const MIN_POLYGON_POINTS: usize = 3;

/// Colors and sizes used when drawing regions.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub stroke_width: u32,
    /// Gap between the top of the box and the bottom of its label.
    pub label_offset: u32,
    /// Bitmap font scale; 2 gives a 16 px line.
    pub font_scale: u32,
    pub marker_radius: i32,
    pub left: Rgba<u8>,
    pub right: Rgba<u8>,
    pub unknown: Rgba<u8>,
    pub polygon: Rgba<u8>,
    pub marker: Rgba<u8>,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            stroke_width: 2,
            label_offset: 6,
            font_scale: 2,
            marker_radius: 3,
            left: Rgba([0, 122, 255, 255]),
            right: Rgba([255, 0, 0, 255]),
            unknown: Rgba([255, 165, 0, 255]),
            polygon: Rgba([0, 255, 0, 255]),
            marker: Rgba([255, 0, 0, 255]),
        }
    }
}

impl OverlayStyle {
    pub fn color_for(&self, hint: Option<Side>) -> Rgba<u8> {
        match hint {
            Some(Side::Left) => self.left,
            Some(Side::Right) => self.right,
            Some(Side::Unknown) | None => self.unknown,
        }
    }
}

/// One annotated area of the source image.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub bbox: BoundingBox,
    pub label: Option<String>,
    pub polygon: Vec<Point>,
    /// Side used to pick the stroke color.
    pub color_hint: Option<Side>,
}

impl Region {
    pub fn new(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            label: None,
            polygon: Vec::new(),
            color_hint: None,
        }
    }

    pub fn from_detection(detection: &Detection) -> Self {
        Self {
            bbox: detection.bbox(),
            label: detection.label(),
            polygon: detection.drawing_polygon().map(<[Point]>::to_vec).unwrap_or_default(),
            color_hint: detection.side,
        }
    }
}

/// A flattened overlay image.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub image: EncodedImage,
    pub width: u32,
    pub height: u32,
}

/// Decode `source`, draw every region on a same-size surface and return the
/// flattened PNG. The input is left untouched.
pub fn render_overlay(source: &EncodedImage, regions: &[Region], style: &OverlayStyle) -> Result<Overlay> {
    let decoded = image::load_from_memory(&source.bytes)
        .map_err(|e| LofuError::Decode(format!("Failed to decode source image: {e}")))?;
    let mut canvas = decoded.to_rgba8();
    let (width, height) = canvas.dimensions();

    for region in regions {
        draw_region(&mut canvas, region, style);
    }
    debug!(width, height, regions = regions.len(), "Rendered overlay");

    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| LofuError::Encode(format!("Failed to encode overlay: {e}")))?;

    Ok(Overlay {
        image: EncodedImage::new(bytes, "image/png"),
        width,
        height,
    })
}

/// Convenience wrapper drawing detections with the default style.
pub fn render_detections(source: &EncodedImage, detections: &[Detection]) -> Result<Overlay> {
    let regions: Vec<Region> = detections.iter().map(Region::from_detection).collect();
    render_overlay(source, &regions, &OverlayStyle::default())
}

fn draw_region(canvas: &mut RgbaImage, region: &Region, style: &OverlayStyle) {
    let color = style.color_for(region.color_hint);
    let b = region.bbox;

    let margin = style.stroke_width as i32 + 1;
    let (x_min, y_min, x_max, y_max) = pixel_bounds(canvas.dimensions(), b, margin);
    let w = (x_max - x_min).max(1) as u32;
    let h = (y_max - y_min).max(1) as u32;

    draw_hollow_rect_mut(canvas, Rect::at(x_min, y_min).of_size(w, h), color);
    for t in 1..style.stroke_width.min(w / 2).min(h / 2) {
        let inner = Rect::at(x_min + t as i32, y_min + t as i32)
            .of_size((w - 2 * t).max(1), (h - 2 * t).max(1));
        draw_hollow_rect_mut(canvas, inner, color);
    }

    if let Some(label) = region.label.as_deref().filter(|l| !l.is_empty()) {
        let (x, y) = label_origin(canvas.dimensions(), (x_min, y_min), label, style);
        font::draw_text(canvas, label, x, y, style.font_scale, color);
    }

    if region.polygon.len() >= MIN_POLYGON_POINTS {
        draw_polygon(canvas, &region.polygon, style);
    }
}

/// Box edges in whole pixels, clamped to the surface plus `margin` on every
/// side. Edges outside the surface stay outside it, stroke included.
fn pixel_bounds(surface: (u32, u32), b: BoundingBox, margin: i32) -> (i32, i32, i32, i32) {
    let (surface_w, surface_h) = surface;
    let to_px = |v: f64, limit: u32| {
        v.round()
            .clamp(-f64::from(margin), f64::from(limit) + f64::from(margin)) as i32
    };
    (
        to_px(b.x1.min(b.x2), surface_w),
        to_px(b.y1.min(b.y2), surface_h),
        to_px(b.x1.max(b.x2), surface_w),
        to_px(b.y1.max(b.y2), surface_h),
    )
}

/// Top-left corner of a label: above the box's top-left corner, kept on
/// the surface.
fn label_origin(surface: (u32, u32), (x_min, y_min): (i32, i32), label: &str, style: &OverlayStyle) -> (i32, i32) {
    let (surface_w, surface_h) = surface;
    let (text_w, text_h) = font::text_size(label, style.font_scale);

    let max_x = surface_w.saturating_sub(text_w) as i32;
    let max_y = surface_h.saturating_sub(text_h) as i32;

    let x = x_min.clamp(0, max_x);
    let y = y_min
        .saturating_sub(style.label_offset as i32)
        .saturating_sub(text_h as i32)
        .clamp(0, max_y);
    (x, y)
}

fn draw_polygon(canvas: &mut RgbaImage, points: &[Point], style: &OverlayStyle) {
    let surface = canvas.dimensions();

    for (i, start) in points.iter().enumerate() {
        let end = &points[(i + 1) % points.len()];
        if let Some((a, b)) = clip_segment(surface, start, end) {
            draw_line_segment_mut(canvas, a, b, style.polygon);
        }
    }

    let reach = style.marker_radius.max(0) + 1;
    for p in points {
        let on_band = |v: f64, limit: u32| v >= -f64::from(reach) && v <= f64::from(limit) + f64::from(reach);
        if on_band(p.x, surface.0) && on_band(p.y, surface.1) {
            let center = (p.x.round() as i32, p.y.round() as i32);
            draw_filled_circle_mut(canvas, center, style.marker_radius, style.marker);
        }
    }
}

/// Clip a segment to the surface (one pixel of slack on each side) with
/// Liang-Barsky. `None` when nothing of it is visible.
fn clip_segment(surface: (u32, u32), start: &Point, end: &Point) -> Option<((f32, f32), (f32, f32))> {
    let (min_x, min_y) = (-1.0, -1.0);
    let (max_x, max_y) = (f64::from(surface.0) + 1.0, f64::from(surface.1) + 1.0);
    let (dx, dy) = (end.x - start.x, end.y - start.y);
    if !(start.x.is_finite() && start.y.is_finite() && end.x.is_finite() && end.y.is_finite()) {
        return None;
    }

    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    for (p, q) in [
        (-dx, start.x - min_x),
        (dx, max_x - start.x),
        (-dy, start.y - min_y),
        (dy, max_y - start.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }

    let at = |t: f64| ((start.x + t * dx) as f32, (start.y + t * dy) as f32);
    Some((at(t0), at(t1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn white_png(width: u32, height: u32) -> EncodedImage {
        let img = RgbaImage::from_pixel(width, height, WHITE);
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        EncodedImage::new(bytes, "image/png")
    }

    fn decode(overlay: &Overlay) -> RgbaImage {
        image::load_from_memory(&overlay.image.bytes).unwrap().to_rgba8()
    }

    #[test]
    fn test_output_keeps_intrinsic_dimensions() {
        let source = white_png(97, 41);
        let regions = [Region::new(BoundingBox::new(5.0, 5.0, 500.0, 500.0))];
        let overlay = render_overlay(&source, &regions, &OverlayStyle::default()).unwrap();

        assert_eq!((overlay.width, overlay.height), (97, 41));
        assert_eq!(decode(&overlay).dimensions(), (97, 41));
        assert_eq!(overlay.image.mime, "image/png");
    }

    #[test]
    fn test_box_is_stroked_with_side_color() {
        let source = white_png(120, 80);
        let style = OverlayStyle::default();
        let det = Detection::boxed(20.0, 30.0, 60.0, 70.0).with_side(Side::Left);
        let overlay = render_overlay(&source, &[Region::from_detection(&det)], &style).unwrap();
        let img = decode(&overlay);

        assert_eq!(*img.get_pixel(20, 30), style.left);
        assert_eq!(*img.get_pixel(59, 69), style.left);
        assert_eq!(*img.get_pixel(40, 50), WHITE, "box interior stays untouched");
    }

    #[test]
    fn test_label_is_clamped_onto_surface() {
        let source = white_png(120, 80);
        let style = OverlayStyle::default();
        let det = Detection::boxed(100.0, 0.0, 119.0, 20.0).with_side(Side::Right);
        let overlay = render_overlay(&source, &[Region::from_detection(&det)], &style).unwrap();
        let img = decode(&overlay);

        let (text_w, text_h) = text_size("Right", style.font_scale);
        let x0 = 120 - text_w;
        // Only look left of the box so the stroke itself does not count.
        let inked = (x0..100)
            .flat_map(|x| (0..text_h).map(move |y| (x, y)))
            .filter(|&(x, y)| *img.get_pixel(x, y) == style.right)
            .count();
        assert!(inked > 0, "label should be drawn inside the top-right corner");
    }

    #[test]
    fn test_polygon_draws_markers_and_short_polygon_is_skipped() {
        let source = white_png(100, 100);
        let style = OverlayStyle::default();

        let mut triangle = Region::new(BoundingBox::new(10.0, 10.0, 90.0, 90.0));
        triangle.polygon = vec![
            Point { x: 30.0, y: 30.0 },
            Point { x: 70.0, y: 30.0 },
            Point { x: 50.0, y: 70.0 },
        ];
        let overlay = render_overlay(&source, &[triangle], &style).unwrap();
        let img = decode(&overlay);
        assert_eq!(*img.get_pixel(30, 30), style.marker);
        assert_eq!(*img.get_pixel(50, 30), style.polygon);

        let mut segment = Region::new(BoundingBox::new(10.0, 10.0, 90.0, 90.0));
        segment.polygon = vec![Point { x: 30.0, y: 30.0 }, Point { x: 70.0, y: 30.0 }];
        let overlay = render_overlay(&source, &[segment], &style).unwrap();
        let img = decode(&overlay);
        assert_eq!(*img.get_pixel(50, 30), WHITE);
        assert_eq!(*img.get_pixel(10, 10), style.unknown, "box still drawn");
    }

    #[test]
    fn test_malformed_box_still_renders() {
        let source = white_png(50, 50);
        let regions = [Region::new(BoundingBox::new(40.0, 40.0, 10.0, 10.0))];
        let overlay = render_overlay(&source, &regions, &OverlayStyle::default()).unwrap();
        assert_eq!((overlay.width, overlay.height), (50, 50));
    }

    #[test]
    fn test_far_off_coordinates_do_not_overflow() {
        let source = white_png(60, 40);
        let style = OverlayStyle::default();

        let far = Detection::boxed(1e12, 0.0, 2e12, 10.0).with_side(Side::Right);
        let negative = Detection::boxed(-2e12, -5e11, -1e12, 20.0);
        let mut spike = Region::new(BoundingBox::new(5.0, 5.0, 30.0, 30.0));
        spike.polygon = vec![
            Point { x: 10.0, y: 10.0 },
            Point { x: 1e12, y: 10.0 },
            Point { x: 10.0, y: 30.0 },
        ];
        let regions = [Region::from_detection(&far), Region::from_detection(&negative), spike];
        let overlay = render_overlay(&source, &regions, &style).unwrap();
        let img = decode(&overlay);

        assert_eq!((overlay.width, overlay.height), (60, 40));
        assert_eq!(*img.get_pixel(10, 10), style.marker);
        assert_eq!(*img.get_pixel(40, 10), style.polygon, "visible part of the clipped edge");
    }

    #[test]
    fn test_box_crossing_the_edge_keeps_visible_sides() {
        let source = white_png(50, 50);
        let style = OverlayStyle::default();
        let det = Detection::boxed(-100.0, 10.0, 30.0, 40.0).with_side(Side::Left);
        let overlay = render_overlay(&source, &[Region::from_detection(&det)], &style).unwrap();
        let img = decode(&overlay);

        assert_eq!(*img.get_pixel(15, 10), style.left, "top edge");
        assert_eq!(*img.get_pixel(29, 25), style.left, "right edge");
        assert_eq!(*img.get_pixel(0, 25), WHITE, "off-surface left edge stays off");
    }

    #[test]
    fn test_undecodable_source_is_an_error() {
        let source = EncodedImage::new(vec![1, 2, 3, 4], "image/png");
        let err = render_overlay(&source, &[], &OverlayStyle::default()).unwrap_err();
        assert!(matches!(err, LofuError::Decode(_)));
    }

    #[test]
    fn test_source_is_not_mutated() {
        let source = white_png(20, 20);
        let before = source.clone();
        let _ = render_detections(&source, &[Detection::boxed(1.0, 1.0, 10.0, 10.0)]).unwrap();
        assert_eq!(source, before);
    }
}
