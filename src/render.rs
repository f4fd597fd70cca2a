//! Interface to the external scene renderer.
//!
//! The 3D mesh projector is a black box to this pipeline: it receives the
//! drone pose a background was captured at and returns a transparent-background
//! projection of the gates plus their screen-space annotations. Renderers hold
//! per-call mutable state, so every worker owns its own instance.

use anyhow::Result;
use image::{Rgba, RgbaImage};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::annotations::BackgroundPose;
use crate::background::Resolution;
use crate::camera::CameraParameters;

/// Class id the renderer assigns to the background-plane quad; it carries no
/// orientation normal.
pub const BACKGROUND_PLANE_CLASS: u32 = 2;

/// Endpoints of a gate's orientation-normal segment, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateNormal {
    pub origin: [i32; 2],
    pub end: [i32; 2],
}

/// Axis-aligned screen-space box around one projected object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundingBox {
    pub class_id: u32,
    pub min: [i32; 2],
    pub max: [i32; 2],
    /// Present for every class except the background plane.
    pub normal: Option<GateNormal>,
}

/// Screen-space annotations for one generated sample.
#[derive(Debug, Clone)]
pub struct SyntheticAnnotations {
    pub bboxes: Vec<BoundingBox>,
    /// Index into `bboxes` of the gate closest to the camera, if any gate is
    /// in frame.
    pub closest_gate: Option<usize>,
    pub gate_distance: f64,
    pub gate_rotation: f64,
    pub drone_pose: Vector3<f64>,
    pub drone_orientation: Vector3<f64>,
}

/// A rendered projection and its annotations.
pub struct RenderOutput {
    /// Transparent-background RGBA projection of the scene.
    pub image: RgbaImage,
    pub annotations: SyntheticAnnotations,
}

/// One projection pass over the 3D scene.
///
/// Implementations are stateful between `set_pose` and `generate` and must
/// not be shared across concurrent workers.
pub trait SceneRenderer {
    /// Position the virtual camera at the pose the background was captured
    /// at.
    fn set_pose(&mut self, pose: &BackgroundPose);

    /// Project the scene, spawning up to `max_gates` gates no closer than
    /// `min_dist` meters apart.
    fn generate(&mut self, min_dist: f64, max_gates: u32) -> Result<RenderOutput>;
}

/// Placeholder renderer used by the CLI and the test suite until a real mesh
/// projector is wired in.
///
/// Emits a transparent frame with one opaque quad standing in for a gate,
/// plus a plausible bounding box and normal, derived from the configured
/// camera resolution and the current pose.
pub struct StubRenderer {
    resolution: Resolution,
    rng: StdRng,
    pose: Option<BackgroundPose>,
}

impl StubRenderer {
    pub fn new(camera: &CameraParameters, resolution: Resolution, seed: u64) -> Self {
        let _ = camera; // a real projector consumes the intrinsics
        Self {
            resolution,
            rng: StdRng::seed_from_u64(seed),
            pose: None,
        }
    }
}

impl SceneRenderer for StubRenderer {
    fn set_pose(&mut self, pose: &BackgroundPose) {
        self.pose = Some(pose.clone());
    }

    fn generate(&mut self, min_dist: f64, _max_gates: u32) -> Result<RenderOutput> {
        let Resolution { width, height } = self.resolution;
        let mut image = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));

        // One fake gate somewhere in the middle two quarters of the frame.
        // The upper bounds keep the range non-empty for frames under 4 px.
        let gate_w = (width / 4).max(2);
        let gate_h = (height / 4).max(2);
        let x0 = self.rng.gen_range(width / 4..(width / 2).max(width / 4 + 1));
        let y0 = self.rng.gen_range(height / 4..(height / 2).max(height / 4 + 1));
        for y in y0..(y0 + gate_h).min(height) {
            for x in x0..(x0 + gate_w).min(width) {
                image.put_pixel(x, y, Rgba([220, 90, 40, 255]));
            }
        }

        let center = [
            (x0 + gate_w / 2) as i32,
            (y0 + gate_h / 2) as i32,
        ];
        let bbox = BoundingBox {
            class_id: 1,
            min: [x0 as i32, y0 as i32],
            max: [(x0 + gate_w) as i32, (y0 + gate_h) as i32],
            normal: Some(GateNormal {
                origin: center,
                end: [center[0] + gate_w as i32 / 2, center[1]],
            }),
        };

        let pose = self.pose.clone().unwrap_or(BackgroundPose {
            translation: Vector3::zeros(),
            orientation: nalgebra::Quaternion::identity(),
        });
        let annotations = SyntheticAnnotations {
            bboxes: vec![bbox],
            closest_gate: Some(0),
            gate_distance: min_dist.max(pose.translation.norm()),
            gate_rotation: 0.0,
            drone_pose: pose.translation,
            drone_orientation: Vector3::zeros(),
        };

        Ok(RenderOutput { image, annotations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraParameters, CvMatrix};

    fn camera(width: u32, height: u32) -> CameraParameters {
        CameraParameters {
            image_width: width,
            image_height: height,
            camera_matrix: CvMatrix {
                rows: 3,
                cols: 3,
                data: vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            },
            distortion_coefficients: None,
        }
    }

    #[test]
    fn stub_copes_with_tiny_frames() {
        for (w, h) in [(1, 1), (2, 3), (3, 2), (8, 8)] {
            let res = Resolution { width: w, height: h };
            let mut renderer = StubRenderer::new(&camera(w, h), res, 7);
            let out = renderer.generate(3.5, 6).unwrap();
            assert_eq!(out.image.dimensions(), (w, h));
            assert_eq!(out.annotations.bboxes.len(), 1);
            assert_eq!(out.annotations.closest_gate, Some(0));
        }
    }
}
