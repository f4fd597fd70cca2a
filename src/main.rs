use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::{ArgAction, Parser};
use tracing::{error, info};

use gatesynth::background::{BackgroundSet, Resolution};
use gatesynth::camera;
use gatesynth::compose::ComposeConfig;
use gatesynth::factory::{DatasetFactory, FactoryConfig, WorldBoundaries};
use gatesynth::render::StubRenderer;

#[derive(Parser, Debug)]
#[command(
    name = "gatesynth",
    about = "Generate a hybrid synthetic dataset of projections of a 3D gate \
             model, in random positions and orientations, onto randomly \
             selected background images."
)]
struct Args {
    /// Directory of 3D meshes (with textures) to project
    meshes_dir: PathBuf,
    /// Background images dataset directory (flat files + annotations.csv)
    dataset: PathBuf,
    /// Destination directory for the generated dataset
    destination: PathBuf,
    /// Number of images to generate
    #[arg(long, default_value_t = 5)]
    count: usize,
    /// Desired output resolution (WxH)
    #[arg(long = "res", default_value = "640x480", value_parser = parse_resolution)]
    resolution: Resolution,
    /// Number of generation worker threads
    #[arg(short = 't', default_value_t = 4)]
    threads: usize,
    /// Camera parameters YAML file (output of OpenCV's calibration)
    #[arg(long)]
    camera: PathBuf,
    /// Verbose output; -v draws annotations, -vv adds the text overlay
    #[arg(short = 'v', action = ArgAction::Count)]
    verbose: u8,
    /// Use a fixed rng seed
    #[arg(long)]
    seed: Option<u64>,
    /// Blur threshold (Laplacian-variance normalization)
    #[arg(long = "blur", default_value_t = 200.0)]
    blur_threshold: f64,
    /// Gaussian noise amount
    #[arg(long = "noise", default_value_t = 0.015)]
    noise_amount: f64,
    /// Disable synthetic motion blur
    #[arg(long = "no-blur")]
    no_blur: bool,
    /// Maximum number of gates to spawn
    #[arg(long = "max-gates", default_value_t = 6)]
    max_gates: u32,
    /// Minimum distance between gates, in meters
    #[arg(long = "min-dist", default_value_t = 3.5)]
    min_dist: f64,
}

fn parse_resolution(s: &str) -> Result<Resolution, String> {
    s.parse()
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    ensure!(
        args.meshes_dir.is_dir(),
        "meshes directory not found: {}",
        args.meshes_dir.display()
    );
    let camera = camera::load(&args.camera)?;

    let annotations_path = args.dataset.join("annotations.csv");
    let sources =
        match BackgroundSet::load(&args.dataset, &annotations_path, args.count, args.seed) {
            Ok(sources) => sources,
            Err(err) => {
                error!("could not load dataset: {err}");
                std::process::exit(1);
            }
        };
    let base_resolution = sources.resolution();

    let config = FactoryConfig {
        destination: args.destination.clone(),
        count: args.count,
        threads: args.threads,
        writer_threads: 1,
        seed: args.seed,
        world: WorldBoundaries::default(),
        compose: ComposeConfig {
            target: args.resolution,
            blur_threshold: args.blur_threshold,
            noise_sigma: args.noise_amount,
            no_blur: args.no_blur,
            verbose: args.verbose >= 1,
            extra_verbose: args.verbose >= 2,
            min_dist: args.min_dist,
            max_gates: args.max_gates,
        },
    };

    let base_seed = args.seed.unwrap_or_else(rand::random);
    let factory = DatasetFactory::new(config, sources);
    // TODO: swap StubRenderer for the mesh projector once it lands; it will
    // consume meshes_dir, the camera intrinsics and the world boundaries.
    let report = factory.run(|worker, _world| {
        Ok(StubRenderer::new(
            &camera,
            base_resolution,
            base_seed + worker as u64,
        ))
    })?;

    info!(
        "generated {} samples, {} written, {} visible",
        report.generated, report.written, report.visible
    );
    Ok(())
}
