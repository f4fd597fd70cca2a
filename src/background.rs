//! Background photograph pool.
//!
//! `BackgroundSet` stages one descriptor per sample to generate, sampled with
//! replacement from the background directory, and hands them out to
//! generation workers through a blocking `take()`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crossbeam::channel::{unbounded, Receiver, Sender};
use image::RgbaImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{info, warn};

use crate::annotations::{self, AnnotationError, BackgroundPose};

/// Width and height of an image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    /// Parses the CLI `WxH` form, e.g. `640x480`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("expected WxH, got {s:?}"))?;
        let width = w.parse().map_err(|e| format!("invalid width {w:?}: {e}"))?;
        let height = h
            .parse()
            .map_err(|e| format!("invalid height {h:?}: {e}"))?;
        if width == 0 || height == 0 {
            return Err(format!("resolution must be non-zero, got {s:?}"));
        }
        Ok(Resolution { width, height })
    }
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("background directory not found: {0}")]
    DirectoryNotFound(PathBuf),
    #[error(transparent)]
    Annotations(#[from] AnnotationError),
    #[error("no annotated background images in {0}")]
    Empty(PathBuf),
    #[error("failed to read {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("failed to list {path}: {source}")]
    List {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One background photograph plus the pose it was captured at.
///
/// Pixel data is loaded on demand and never kept at rest; ownership moves to
/// the worker that dequeues the sample.
#[derive(Debug, Clone)]
pub struct BackgroundSample {
    pub path: PathBuf,
    pub pose: BackgroundPose,
}

impl BackgroundSample {
    /// Load the photograph as RGBA pixels.
    pub fn image(&self) -> Result<RgbaImage, DatasetError> {
        let img = image::open(&self.path).map_err(|source| DatasetError::Image {
            path: self.path.clone(),
            source,
        })?;
        Ok(img.to_rgba8())
    }
}

/// Fixed pool of staged background samples, one per sample to generate.
///
/// Populated once by [`BackgroundSet::load`]; supply matches demand exactly,
/// so `take()` can only block transiently while another worker holds the
/// channel.
#[derive(Debug)]
pub struct BackgroundSet {
    // Sender kept alive so a drained receiver blocks instead of disconnecting.
    _tx: Sender<BackgroundSample>,
    rx: Receiver<BackgroundSample>,
    resolution: Resolution,
    staged: usize,
    unmatched: usize,
}

impl BackgroundSet {
    /// Stage at least `target_count` annotated background samples from
    /// `directory`.
    ///
    /// The directory listing is shuffled; files with no row in the
    /// annotations table are warned about, counted and skipped. If fewer
    /// usable files exist than `target_count`, entries are re-sampled with
    /// replacement until the pool is large enough.
    pub fn load(
        directory: &Path,
        annotations_path: &Path,
        target_count: usize,
        seed: Option<u64>,
    ) -> Result<Self, DatasetError> {
        if !directory.is_dir() {
            return Err(DatasetError::DirectoryNotFound(directory.to_path_buf()));
        }
        info!("loading and randomizing base dataset from {}", directory.display());
        let poses = annotations::parse(annotations_path)?;

        let mut files = Vec::new();
        let entries = std::fs::read_dir(directory).map_err(|source| DatasetError::List {
            path: directory.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| DatasetError::List {
                path: directory.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path != annotations_path {
                files.push(path);
            }
        }

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        files.shuffle(&mut rng);

        let mut unmatched = 0usize;
        let mut matched = Vec::new();
        for path in files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match poses.get(&name) {
                Some(pose) => matched.push(BackgroundSample {
                    path,
                    pose: pose.clone(),
                }),
                None => {
                    warn!("cannot find pose annotation for {name}");
                    unmatched += 1;
                }
            }
        }
        if unmatched > 0 {
            warn!("{unmatched} background annotations could not be found");
        }
        if matched.is_empty() {
            return Err(DatasetError::Empty(directory.to_path_buf()));
        }

        // Sample with replacement until supply covers the requested count.
        let unique = matched.len();
        while matched.len() < target_count {
            let pick = matched[rng.gen_range(0..unique)].clone();
            matched.push(pick);
        }

        let resolution = first_resolution(&matched)?;
        info!("using {resolution} background resolution");

        let (tx, rx) = unbounded();
        let staged = matched.len();
        for sample in matched {
            tx.send(sample).expect("source queue receiver alive");
        }

        Ok(Self {
            _tx: tx,
            rx,
            resolution,
            staged,
            unmatched,
        })
    }

    /// Blocking dequeue of the next staged sample.
    pub fn take(&self) -> BackgroundSample {
        self.rx.recv().expect("source queue sender alive")
    }

    /// Resolution of the background set, measured once from the first staged
    /// image. Source photographs are assumed uniform in size.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Number of samples staged at load time.
    pub fn staged(&self) -> usize {
        self.staged
    }

    /// Number of eligible files skipped for want of an annotation row.
    pub fn unmatched(&self) -> usize {
        self.unmatched
    }
}

fn first_resolution(samples: &[BackgroundSample]) -> Result<Resolution, DatasetError> {
    let first = &samples[0];
    let (width, height) =
        image::image_dimensions(&first.path).map_err(|source| DatasetError::Image {
            path: first.path.clone(),
            source,
        })?;
    Ok(Resolution { width, height })
}
