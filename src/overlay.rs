//! Verbose-mode debug overlays drawn onto generated samples.

use std::sync::OnceLock;

use ab_glyph::{FontVec, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::warn;

use crate::render::{BoundingBox, SyntheticAnnotations, BACKGROUND_PLANE_CLASS};

const BOX_COLOR: Rgba<u8> = Rgba([255, 255, 0, 255]);
const CLOSEST_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const NORMAL_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const TEXT_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);

const OUTLINE_WIDTH: i32 = 3;

/// Draw every scaled box; the closest gate gets a distinct color.
pub fn draw_bounding_boxes(
    image: &mut RgbaImage,
    bboxes: &[BoundingBox],
    closest_gate: Option<usize>,
) {
    for (i, bbox) in bboxes.iter().enumerate() {
        let color = if closest_gate == Some(i) {
            CLOSEST_COLOR
        } else {
            BOX_COLOR
        };
        draw_thick_rect(image, bbox, color);
    }
}

/// Draw orientation-normal segments for every non-background-plane box.
pub fn draw_normals(image: &mut RgbaImage, bboxes: &[BoundingBox]) {
    for bbox in bboxes {
        if bbox.class_id == BACKGROUND_PLANE_CLASS {
            continue;
        }
        if let Some(normal) = &bbox.normal {
            draw_line_segment_mut(
                image,
                (normal.origin[0] as f32, normal.origin[1] as f32),
                (normal.end[0] as f32, normal.end[1] as f32),
                NORMAL_COLOR,
            );
        }
    }
}

/// Overlay the scalar annotation values as a text block in the top-left
/// corner. Skipped with a warning when no usable system font is found.
pub fn draw_annotation_text(image: &mut RgbaImage, annotations: &SyntheticAnnotations) {
    let Some(font) = overlay_font() else {
        warn!("no system font found; skipping annotation text overlay");
        return;
    };
    let lines = [
        format!("gate_distance: {:.3}", annotations.gate_distance),
        format!("gate_rotation: {:.3}", annotations.gate_rotation),
        format!(
            "drone_pose: [{:.3}, {:.3}, {:.3}]",
            annotations.drone_pose.x, annotations.drone_pose.y, annotations.drone_pose.z
        ),
        format!(
            "drone_orientation: [{:.3}, {:.3}, {:.3}]",
            annotations.drone_orientation.x,
            annotations.drone_orientation.y,
            annotations.drone_orientation.z
        ),
    ];
    let scale = PxScale::from(14.0);
    for (i, line) in lines.iter().enumerate() {
        draw_text_mut(image, TEXT_COLOR, 2, 2 + i as i32 * 16, scale, font, line);
    }
}

fn draw_thick_rect(image: &mut RgbaImage, bbox: &BoundingBox, color: Rgba<u8>) {
    for inset in 0..OUTLINE_WIDTH {
        let x = bbox.min[0] + inset;
        let y = bbox.min[1] + inset;
        let w = bbox.max[0] - bbox.min[0] - 2 * inset;
        let h = bbox.max[1] - bbox.min[1] - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        draw_hollow_rect_mut(image, Rect::at(x, y).of_size(w as u32, h as u32), color);
    }
}

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

fn overlay_font() -> Option<&'static FontVec> {
    static FONT: OnceLock<Option<FontVec>> = OnceLock::new();
    FONT.get_or_init(|| {
        for candidate in FONT_CANDIDATES {
            if let Ok(bytes) = std::fs::read(candidate) {
                if let Ok(font) = FontVec::try_from_vec(bytes) {
                    return Some(font);
                }
            }
        }
        None
    })
    .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::GateNormal;

    #[test]
    fn boxes_and_normals_mark_pixels() {
        let mut image = RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 255]));
        let bboxes = vec![BoundingBox {
            class_id: 1,
            min: [10, 10],
            max: [40, 40],
            normal: Some(GateNormal { origin: [25, 25], end: [35, 25] }),
        }];
        draw_bounding_boxes(&mut image, &bboxes, Some(0));
        draw_normals(&mut image, &bboxes);

        assert_eq!(image.get_pixel(10, 10).0, CLOSEST_COLOR.0);
        assert_eq!(image.get_pixel(30, 25).0, NORMAL_COLOR.0);
    }

    #[test]
    fn degenerate_boxes_do_not_panic() {
        let mut image = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        let bboxes = vec![BoundingBox {
            class_id: 1,
            min: [4, 4],
            max: [4, 4],
            normal: None,
        }];
        draw_bounding_boxes(&mut image, &bboxes, None);
    }
}
