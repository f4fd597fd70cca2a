//! Per-sample augmentation and compositing primitives.
//!
//! All functions here are pure transforms over pixel buffers or annotation
//! records; the per-sample orchestration lives in [`crate::compose`].

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::background::Resolution;
use crate::render::{BoundingBox, GateNormal, SyntheticAnnotations, BACKGROUND_PLANE_CLASS};

/// Sharpness-derived blur strength in `[0.1, 1.0]`.
///
/// The background's variance of the Laplacian is normalized by the configured
/// threshold and clamped to at most `0.9` before inversion, so tack-sharp
/// backgrounds still get a minimum amount of synthetic motion blur.
pub fn blur_amount(background: &RgbaImage, blur_threshold: f64) -> f64 {
    let gray = imageops::grayscale(background);
    let laplacian = imageproc::filter::laplacian_filter(&gray);

    let n = f64::from(laplacian.width() * laplacian.height());
    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    for px in laplacian.pixels() {
        let v = f64::from(px.0[0]);
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum / n;
    let variance = sum_sq / n - mean * mean;

    let mut amount = variance / blur_threshold;
    if amount > 1.0 {
        amount = 0.9;
    }
    1.0 - amount
}

/// Map a blur strength to a motion-blur kernel size. Boundaries inclusive.
pub fn blur_kernel_size(amount: f64) -> u32 {
    if amount <= 0.3 {
        3
    } else if amount <= 0.7 {
        5
    } else {
        9
    }
}

/// Convolve with a normalized identity-diagonal kernel, approximating
/// diagonal motion blur. Borders are clamped.
pub fn motion_blur(image: &RgbaImage, amount: f64) -> RgbaImage {
    let size = blur_kernel_size(amount) as i64;
    let radius = size / 2;
    let (width, height) = image.dimensions();

    let mut out = RgbaImage::new(width, height);
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut acc = [0f64; 4];
            for k in 0..size {
                let sx = (x + k - radius).clamp(0, width as i64 - 1) as u32;
                let sy = (y + k - radius).clamp(0, height as i64 - 1) as u32;
                let px = image.get_pixel(sx, sy);
                for (a, &v) in acc.iter_mut().zip(px.0.iter()) {
                    *a += f64::from(v);
                }
            }
            let px = out.get_pixel_mut(x as u32, y as u32);
            for (o, a) in px.0.iter_mut().zip(acc.iter()) {
                *o = (a / size as f64).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// Inject Gaussian pixel noise with standard deviation `sigma` (on a 0..1
/// intensity scale) into every channel.
pub fn gaussian_noise(image: &mut RgbaImage, sigma: f64, rng: &mut StdRng) {
    if sigma <= 0.0 {
        return;
    }
    let normal = Normal::new(0.0, sigma).expect("sigma is finite and positive");
    for px in image.pixels_mut() {
        for v in px.0.iter_mut() {
            let noisy = f64::from(*v) / 255.0 + normal.sample(rng);
            *v = (noisy.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
    }
}

/// Downscale `image` to fit within `target`, preserving aspect ratio.
/// Images already within bounds are returned unchanged; nothing is ever
/// upscaled.
pub fn shrink_to_fit(image: &RgbaImage, target: Resolution) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width <= target.width && height <= target.height {
        return image.clone();
    }
    let scale = f64::min(
        f64::from(target.width) / f64::from(width),
        f64::from(target.height) / f64::from(height),
    );
    let new_w = ((f64::from(width) * scale).floor() as u32).max(1);
    let new_h = ((f64::from(height) * scale).floor() as u32).max(1);
    imageops::resize(image, new_w, new_h, FilterType::Lanczos3)
}

/// Composite `overlay` over an opaque `background` using the overlay's alpha
/// channel. The blend covers the top-left overlapping region; the result has
/// the background's dimensions and is fully opaque.
pub fn alpha_composite(background: &RgbaImage, overlay: &RgbaImage) -> RgbaImage {
    let mut out = background.clone();
    let width = background.width().min(overlay.width());
    let height = background.height().min(overlay.height());
    for y in 0..height {
        for x in 0..width {
            let over = overlay.get_pixel(x, y);
            let alpha = f64::from(over.0[3]) / 255.0;
            if alpha == 0.0 {
                continue;
            }
            let under = out.get_pixel(x, y);
            let mut blended = [0u8; 4];
            for c in 0..3 {
                let v = f64::from(over.0[c]) * alpha + f64::from(under.0[c]) * (1.0 - alpha);
                blended[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            blended[3] = 255;
            out.put_pixel(x, y, Rgba(blended));
        }
    }
    out
}

/// Rescale a pixel coordinate between resolutions with independent per-axis
/// linear factors, flooring the result.
pub fn scale_coordinates(point: [i32; 2], from: Resolution, to: Resolution) -> [i32; 2] {
    [
        ((f64::from(point[0]) * f64::from(to.width)) / f64::from(from.width)).floor() as i32,
        ((f64::from(point[1]) * f64::from(to.height)) / f64::from(from.height)).floor() as i32,
    ]
}

/// Produce a scaled copy of the annotations, mapping every box corner and,
/// for classes other than the background plane, the normal endpoints.
pub fn scale_annotations(
    annotations: &SyntheticAnnotations,
    from: Resolution,
    to: Resolution,
) -> SyntheticAnnotations {
    let bboxes = annotations
        .bboxes
        .iter()
        .map(|bbox| {
            let normal = match (&bbox.normal, bbox.class_id) {
                (Some(normal), class_id) if class_id != BACKGROUND_PLANE_CLASS => {
                    Some(GateNormal {
                        origin: scale_coordinates(normal.origin, from, to),
                        end: scale_coordinates(normal.end, from, to),
                    })
                }
                (normal, _) => *normal,
            };
            BoundingBox {
                class_id: bbox.class_id,
                min: scale_coordinates(bbox.min, from, to),
                max: scale_coordinates(bbox.max, from, to),
                normal,
            }
        })
        .collect();

    SyntheticAnnotations {
        bboxes,
        closest_gate: annotations.closest_gate,
        gate_distance: annotations.gate_distance,
        gate_rotation: annotations.gate_rotation,
        drone_pose: annotations.drone_pose,
        drone_orientation: annotations.drone_orientation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use rand::SeedableRng;

    const BASE: Resolution = Resolution { width: 640, height: 480 };
    const OUT: Resolution = Resolution { width: 320, height: 120 };

    #[test]
    fn scale_is_linear_and_floors() {
        assert_eq!(scale_coordinates([640, 480], BASE, OUT), [320, 120]);
        assert_eq!(scale_coordinates([0, 0], BASE, OUT), [0, 0]);
        // 321 * 320 / 640 = 160.5 -> 160; 241 * 120 / 480 = 60.25 -> 60
        assert_eq!(scale_coordinates([321, 241], BASE, OUT), [160, 60]);
    }

    #[test]
    fn scale_is_monotonic() {
        let mut prev = i32::MIN;
        for x in 0..640 {
            let [sx, _] = scale_coordinates([x, 0], BASE, OUT);
            assert!(sx >= prev);
            prev = sx;
        }
    }

    #[test]
    fn kernel_size_boundaries_are_inclusive() {
        assert_eq!(blur_kernel_size(0.1), 3);
        assert_eq!(blur_kernel_size(0.3), 3);
        assert_eq!(blur_kernel_size(0.5), 5);
        assert_eq!(blur_kernel_size(0.7), 5);
        assert_eq!(blur_kernel_size(0.71), 9);
        assert_eq!(blur_kernel_size(1.0), 9);
    }

    #[test]
    fn sharp_backgrounds_clamp_to_minimum_blur() {
        // Checkerboard: maximal Laplacian variance, far above a threshold of 1.
        let mut img = RgbaImage::new(16, 16);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let v = if (x + y) % 2 == 0 { 255 } else { 0 };
            *px = Rgba([v, v, v, 255]);
        }
        let amount = blur_amount(&img, 1.0);
        assert!((amount - 0.1).abs() < 1e-9);
    }

    #[test]
    fn flat_backgrounds_blur_fully() {
        let img = RgbaImage::from_pixel(16, 16, Rgba([128, 128, 128, 255]));
        let amount = blur_amount(&img, 200.0);
        assert!((amount - 1.0).abs() < 1e-9);
    }

    #[test]
    fn shrink_never_upscales() {
        let img = RgbaImage::new(100, 50);
        let same = shrink_to_fit(&img, Resolution { width: 200, height: 200 });
        assert_eq!(same.dimensions(), (100, 50));

        let smaller = shrink_to_fit(&img, Resolution { width: 50, height: 50 });
        assert_eq!(smaller.dimensions(), (50, 25));
    }

    #[test]
    fn composite_blends_by_overlay_alpha() {
        let background = RgbaImage::from_pixel(2, 2, Rgba([100, 100, 100, 255]));
        let mut overlay = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        overlay.put_pixel(0, 0, Rgba([200, 200, 200, 255]));
        overlay.put_pixel(1, 0, Rgba([200, 200, 200, 127]));

        let out = alpha_composite(&background, &overlay);
        assert_eq!(out.get_pixel(0, 0).0, [200, 200, 200, 255]);
        // Transparent overlay pixels leave the background untouched.
        assert_eq!(out.get_pixel(0, 1).0, [100, 100, 100, 255]);
        let half = out.get_pixel(1, 0).0;
        assert!(half[0] > 100 && half[0] < 200);
        assert_eq!(half[3], 255);
    }

    #[test]
    fn noise_respects_sigma_zero() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        let mut rng = StdRng::seed_from_u64(3);
        gaussian_noise(&mut img, 0.0, &mut rng);
        assert!(img.pixels().all(|p| p.0 == [10, 20, 30, 255]));
    }

    #[test]
    fn background_plane_normals_are_not_scaled() {
        let annotations = SyntheticAnnotations {
            bboxes: vec![
                BoundingBox {
                    class_id: 1,
                    min: [10, 10],
                    max: [20, 20],
                    normal: Some(GateNormal { origin: [10, 10], end: [20, 20] }),
                },
                BoundingBox {
                    class_id: BACKGROUND_PLANE_CLASS,
                    min: [100, 100],
                    max: [200, 200],
                    normal: Some(GateNormal { origin: [100, 100], end: [200, 200] }),
                },
            ],
            closest_gate: Some(0),
            gate_distance: 4.2,
            gate_rotation: 0.5,
            drone_pose: Vector3::zeros(),
            drone_orientation: Vector3::zeros(),
        };

        let scaled = scale_annotations(&annotations, BASE, OUT);
        assert_eq!(scaled.bboxes[0].min, [5, 2]);
        assert_eq!(
            scaled.bboxes[0].normal,
            Some(GateNormal { origin: [5, 2], end: [10, 5] })
        );
        // The plane's record is copied through with corners scaled but the
        // normal untouched.
        assert_eq!(scaled.bboxes[1].min, [50, 25]);
        assert_eq!(
            scaled.bboxes[1].normal,
            Some(GateNormal { origin: [100, 100], end: [200, 200] })
        );
    }

    #[test]
    fn motion_blur_preserves_flat_regions() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([50, 60, 70, 255]));
        let blurred = motion_blur(&img, 0.9);
        assert!(blurred.pixels().all(|p| p.0 == [50, 60, 70, 255]));
    }
}
