//! Hybrid synthetic dataset generator.
//!
//! Composites transparent projections of a 3D gate model onto randomly
//! selected real background photographs and writes the annotated results to
//! disk. The pipeline is a fixed pool of background samples feeding
//! generation workers, a per-sample compositing/augmentation stage, and a
//! persistence stage draining finished samples.

pub mod annotations;
pub mod augment;
pub mod background;
pub mod camera;
pub mod compose;
pub mod factory;
pub mod overlay;
pub mod render;
pub mod sink;

pub use annotations::BackgroundPose;
pub use background::{BackgroundSample, BackgroundSet, Resolution};
pub use compose::{ComposeConfig, Composer};
pub use factory::{DatasetFactory, FactoryConfig, RunReport, WorldBoundaries};
pub use render::{BoundingBox, RenderOutput, SceneRenderer, SyntheticAnnotations};
pub use sink::{Sample, SampleSink, WriterPool};
