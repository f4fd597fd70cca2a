//! Finished-sample queue and the persistence worker pool draining it.
//!
//! Generation workers push without blocking; writer threads block on the
//! shared receiver until a sample or the run's single sentinel arrives.
//! [`SampleSink::finish`] enqueues the sentinel and closes the producer side:
//! the writer that observes the sentinel exits directly, the rest exit when
//! the drained channel disconnects.

use std::path::Path;
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Receiver, Sender};
use image::RgbaImage;
use tracing::{debug, warn};

use crate::render::SyntheticAnnotations;

/// One finished synthetic sample. Produced exactly once per generation call,
/// consumed exactly once by a persistence worker.
pub struct Sample {
    pub image: RgbaImage,
    pub id: usize,
    pub annotations: SyntheticAnnotations,
}

enum SinkMessage {
    Sample(Box<Sample>),
    Done,
}

/// Unbounded push/pull pipe between generation workers and the writer pool.
pub struct SampleSink {
    tx: Sender<SinkMessage>,
    rx: Receiver<SinkMessage>,
}

/// Producer-side handle; cheap to clone into generation workers.
#[derive(Clone)]
pub struct SinkHandle {
    tx: Sender<SinkMessage>,
}

impl SinkHandle {
    /// Enqueue a finished sample. Never blocks.
    pub fn push(&self, sample: Sample) {
        self.tx
            .send(SinkMessage::Sample(Box::new(sample)))
            .expect("sample sink receiver alive");
    }
}

impl SampleSink {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn handle(&self) -> SinkHandle {
        SinkHandle { tx: self.tx.clone() }
    }

    /// Enqueue the run's single sentinel and close the producer side. Call
    /// exactly once, after all generation work has been submitted and every
    /// [`SinkHandle`] has been dropped.
    pub fn finish(self) {
        self.tx
            .send(SinkMessage::Done)
            .expect("sample sink receiver alive");
    }
}

impl Default for SampleSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Totals reported by [`WriterPool::join`].
#[derive(Debug, Default, Clone, Copy)]
pub struct WriterReport {
    pub written: usize,
    pub failed: usize,
}

/// Fixed pool of persistence workers writing `<destination>/<id>.png`.
pub struct WriterPool {
    handles: Vec<JoinHandle<WriterReport>>,
}

impl WriterPool {
    /// Spawn `threads` writer threads draining `sink` into `destination`.
    pub fn spawn(sink: &SampleSink, destination: &Path, threads: usize) -> Self {
        let threads = threads.max(1);
        let mut handles = Vec::with_capacity(threads);
        for worker in 0..threads {
            let rx = sink.rx.clone();
            let destination = destination.to_path_buf();
            handles.push(std::thread::spawn(move || {
                write_loop(worker, &rx, &destination)
            }));
        }
        Self { handles }
    }

    /// Wait for every writer to observe the sentinel and exit.
    pub fn join(self) -> WriterReport {
        let mut report = WriterReport::default();
        for handle in self.handles {
            let partial = handle.join().expect("writer thread panicked");
            report.written += partial.written;
            report.failed += partial.failed;
        }
        report
    }
}

fn write_loop(worker: usize, rx: &Receiver<SinkMessage>, destination: &Path) -> WriterReport {
    let mut report = WriterReport::default();
    loop {
        match rx.recv() {
            Ok(SinkMessage::Sample(sample)) => {
                let path = destination.join(format!("{}.png", sample.id));
                match write_sample(&sample, &path) {
                    Ok(()) => report.written += 1,
                    Err(err) => {
                        warn!("failed to write {}: {err}", path.display());
                        report.failed += 1;
                    }
                }
                // The image buffer drops here; nothing is kept in memory
                // after the flush.
            }
            Ok(SinkMessage::Done) => {
                debug!("writer {worker} exiting after {} samples", report.written);
                break;
            }
            // The sink was finished (or dropped) and the queue is drained.
            Err(_) => break,
        }
    }
    report
}

fn write_sample(sample: &Sample, path: &Path) -> Result<(), image::ImageError> {
    sample.image.save(path)
}
