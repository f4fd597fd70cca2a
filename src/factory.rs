//! Run orchestration: strategy selection, queue and thread lifecycle, and
//! end-of-run statistics.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam::channel::unbounded;
use indicatif::ProgressBar;
use tracing::{info, warn};

use crate::background::BackgroundSet;
use crate::compose::{ComposeConfig, Composer};
use crate::render::SceneRenderer;
use crate::sink::{SampleSink, WriterPool};

/// Real-world extent (meters) within which the renderer may place gates,
/// relative to the mesh scale.
#[derive(Debug, Clone, Copy)]
pub struct WorldBoundaries {
    pub x: f64,
    pub y: f64,
}

impl Default for WorldBoundaries {
    fn default() -> Self {
        Self { x: 10.0, y: 10.0 }
    }
}

#[derive(Debug, Clone)]
pub struct FactoryConfig {
    pub destination: PathBuf,
    /// Number of samples to generate; ids are `0..count`.
    pub count: usize,
    /// Generation worker threads; `<= 1` selects the sequential strategy.
    pub threads: usize,
    /// Persistence worker threads.
    pub writer_threads: usize,
    /// Base rng seed; `None` seeds from entropy. Worker `i` derives
    /// `seed + i` so parallel runs stay reproducible.
    pub seed: Option<u64>,
    pub world: WorldBoundaries,
    pub compose: ComposeConfig,
}

/// End-of-run totals.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub generated: usize,
    pub failed: usize,
    pub written: usize,
    pub visible: usize,
    pub visibility_pct: u32,
}

pub struct DatasetFactory {
    config: FactoryConfig,
    sources: Arc<BackgroundSet>,
}

impl DatasetFactory {
    pub fn new(config: FactoryConfig, sources: BackgroundSet) -> Self {
        Self {
            config,
            sources: Arc::new(sources),
        }
    }

    /// Generate the configured number of samples and drain them to disk.
    ///
    /// `make_renderer` is invoked once per generation worker; each renderer
    /// instance is owned exclusively by its worker for the whole run.
    pub fn run<R, F>(&self, make_renderer: F) -> Result<RunReport>
    where
        R: SceneRenderer + Send,
        F: Fn(usize, &WorldBoundaries) -> Result<R>,
    {
        let cfg = &self.config;
        std::fs::create_dir_all(&cfg.destination).with_context(|| {
            format!("failed to create destination {}", cfg.destination.display())
        })?;

        info!("generating dataset...");
        info!("using {} target resolution", cfg.compose.target);

        // Every renderer is built before any thread is spawned, so a setup
        // failure returns with no pool left to unwind.
        let worker_count = cfg.threads.max(1);
        let mut renderers = Vec::with_capacity(worker_count);
        for worker in 0..worker_count {
            renderers.push(make_renderer(worker, &cfg.world).context("renderer setup failed")?);
        }

        let sink = SampleSink::new();
        let writers = WriterPool::spawn(&sink, &cfg.destination, cfg.writer_threads);
        let visible_gates = Arc::new(AtomicUsize::new(0));
        let failed = AtomicUsize::new(0);
        let progress = ProgressBar::new(cfg.count as u64);
        let base_seed = cfg.seed.unwrap_or_else(rand::random);

        if cfg.threads <= 1 {
            let renderer = renderers.pop().expect("one renderer built above");
            let mut composer = Composer::new(
                renderer,
                cfg.compose.clone(),
                self.sources.clone(),
                sink.handle(),
                visible_gates.clone(),
                base_seed,
            );
            for index in 0..cfg.count {
                if let Err(err) = composer.generate(index) {
                    warn!("sample {index} failed: {err:#}");
                    failed.fetch_add(1, Ordering::Relaxed);
                }
                progress.inc(1);
            }
        } else {
            let (index_tx, index_rx) = unbounded();
            for index in 0..cfg.count {
                index_tx.send(index).expect("index queue receiver alive");
            }
            // Workers exit once the queue drains and the sender is gone.
            drop(index_tx);

            std::thread::scope(|scope| {
                for (worker, renderer) in renderers.into_iter().enumerate() {
                    let mut composer = Composer::new(
                        renderer,
                        cfg.compose.clone(),
                        self.sources.clone(),
                        sink.handle(),
                        visible_gates.clone(),
                        base_seed + worker as u64,
                    );
                    let index_rx = index_rx.clone();
                    let progress = progress.clone();
                    let failed = &failed;
                    scope.spawn(move || {
                        while let Ok(index) = index_rx.recv() {
                            if let Err(err) = composer.generate(index) {
                                warn!("sample {index} failed: {err:#}");
                                failed.fetch_add(1, Ordering::Relaxed);
                            }
                            progress.inc(1);
                        }
                    });
                }
            });
        }

        // All generation work is confirmed submitted and every producer
        // handle is gone; deliver the one sentinel and wait for persistence
        // to drain.
        sink.finish();
        let write_report = writers.join();
        progress.finish_and_clear();

        let failed = failed.load(Ordering::Relaxed);
        let visible = visible_gates.load(Ordering::Relaxed);
        let visibility_pct = visibility_percentage(visible, cfg.count);

        info!("saved to {}", cfg.destination.display());
        if failed > 0 {
            warn!("{failed} of {} samples failed to generate", cfg.count);
        }
        if write_report.failed > 0 {
            warn!("{} samples failed to persist", write_report.failed);
        }
        info!("gate visibility percentage: {visibility_pct}%");

        Ok(RunReport {
            generated: cfg.count - failed,
            failed,
            written: write_report.written,
            visible,
            visibility_pct,
        })
    }
}

/// Integer-truncated `visible / total * 100`.
fn visibility_percentage(visible: usize, total: usize) -> u32 {
    if total == 0 {
        0
    } else {
        (visible * 100 / total) as u32
    }
}
