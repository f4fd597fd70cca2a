//! Per-sample generation pipeline: background retrieval, rendering,
//! augmentation, compositing and annotation rescaling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::augment;
use crate::background::{BackgroundSet, Resolution};
use crate::overlay;
use crate::render::{RenderOutput, SceneRenderer};
use crate::sink::{Sample, SinkHandle};

/// Knobs of the augmentation/compositing stage, shared by every worker.
#[derive(Debug, Clone)]
pub struct ComposeConfig {
    /// Final output resolution; composited images are downscaled (never
    /// upscaled) to fit it.
    pub target: Resolution,
    /// Laplacian-variance normalization threshold for the blur amount.
    pub blur_threshold: f64,
    /// Gaussian pixel-noise standard deviation on a 0..1 intensity scale.
    pub noise_sigma: f64,
    /// Disable synthetic motion blur globally.
    pub no_blur: bool,
    /// Draw scaled boxes and normals onto the output.
    pub verbose: bool,
    /// Additionally overlay the scalar annotation values.
    pub extra_verbose: bool,
    /// Minimum distance between spawned gates, in meters.
    pub min_dist: f64,
    /// Maximum number of gates the renderer may spawn.
    pub max_gates: u32,
}

/// One generation worker's pipeline state. Owns its renderer exclusively;
/// everything else is shared.
pub struct Composer<R: SceneRenderer> {
    renderer: R,
    config: ComposeConfig,
    sources: Arc<BackgroundSet>,
    sink: SinkHandle,
    visible_gates: Arc<AtomicUsize>,
    rng: StdRng,
}

impl<R: SceneRenderer> Composer<R> {
    pub fn new(
        renderer: R,
        config: ComposeConfig,
        sources: Arc<BackgroundSet>,
        sink: SinkHandle,
        visible_gates: Arc<AtomicUsize>,
        seed: u64,
    ) -> Self {
        Self {
            renderer,
            config,
            sources,
            sink,
            visible_gates,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate sample `index`: one background consumed, one sample emitted.
    ///
    /// A renderer failure aborts only this sample; the queues are left
    /// untouched by the failed call apart from the consumed background.
    pub fn generate(&mut self, index: usize) -> Result<()> {
        let source = self.sources.take();
        self.renderer.set_pose(&source.pose);
        let RenderOutput {
            image: mut projection,
            annotations,
        } = self
            .renderer
            .generate(self.config.min_dist, self.config.max_gates)
            .with_context(|| format!("renderer failed for sample {index}"))?;

        let background = source
            .image()
            .with_context(|| format!("failed to load background for sample {index}"))?;

        let gate_visible = !annotations.bboxes.is_empty();
        if gate_visible {
            self.visible_gates.fetch_add(1, Ordering::Relaxed);
            if !self.config.no_blur {
                let amount = augment::blur_amount(&background, self.config.blur_threshold);
                projection = augment::motion_blur(&projection, amount);
            }
            augment::gaussian_noise(&mut projection, self.config.noise_sigma, &mut self.rng);
        }

        let base = self.sources.resolution();
        let projection = augment::shrink_to_fit(&projection, base);
        let composited = augment::alpha_composite(&background, &projection);
        let mut output = augment::shrink_to_fit(&composited, self.config.target);

        let out_res = Resolution {
            width: output.width(),
            height: output.height(),
        };
        let scaled = augment::scale_annotations(&annotations, base, out_res);

        if self.config.verbose && gate_visible {
            overlay::draw_bounding_boxes(&mut output, &scaled.bboxes, scaled.closest_gate);
            overlay::draw_normals(&mut output, &scaled.bboxes);
        }
        if self.config.extra_verbose {
            overlay::draw_annotation_text(&mut output, &scaled);
        }

        self.sink.push(Sample {
            image: output,
            id: index,
            annotations: scaled,
        });
        Ok(())
    }
}
