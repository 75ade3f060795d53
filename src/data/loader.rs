//! Worker-pool batch loader.
//!
//! Samples are chunked into fixed-size batches up front; a pool of worker
//! threads claims chunks from a shared counter, extracts features (each
//! worker owns its own [`FeaturePipeline`]), collates, and sends the result
//! back tagged with its chunk index. The consuming iterator reorders
//! arrivals so batches are always yielded in chunk order, regardless of
//! which worker finishes first.
//!
//! A failed sample is skipped with a warning and does not abort its batch;
//! cancellation is cooperative and checked between samples. Dropping the
//! loader cancels and joins all workers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use candle_core::Device;

use crate::config::{AudioConfig, DatasetKind, ModelConfig};
use crate::data::batch::{collate, Batch};
use crate::data::features::FeaturePipeline;
use crate::data::source::Sample;
use crate::{Error, Result};

/// Loader parameters.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub batch_size: usize,
    pub num_workers: usize,
    /// Drop a trailing chunk smaller than `batch_size`.
    pub drop_last: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            num_workers: 4,
            drop_last: true,
        }
    }
}

/// Iterator over collated batches, in deterministic chunk order.
pub struct BatchLoader {
    rx: mpsc::Receiver<(usize, Result<Batch>)>,
    pending: BTreeMap<usize, Result<Batch>>,
    next_index: usize,
    total_chunks: usize,
    cancel: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl BatchLoader {
    /// Spawn workers over the given sample list.
    pub fn new(
        samples: Vec<Sample>,
        audio: &AudioConfig,
        model: &ModelConfig,
        kind: DatasetKind,
        config: LoaderConfig,
        device: &Device,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::Config("batch size must be >= 1".into()));
        }
        if config.num_workers == 0 {
            return Err(Error::Config("worker count must be >= 1".into()));
        }

        let mut chunks: Vec<Vec<Sample>> = samples
            .chunks(config.batch_size)
            .map(|c| c.to_vec())
            .collect();
        if config.drop_last {
            if let Some(last) = chunks.last() {
                if last.len() < config.batch_size {
                    chunks.pop();
                }
            }
        }
        let total_chunks = chunks.len();
        let chunks = Arc::new(chunks);
        let next_chunk = Arc::new(AtomicUsize::new(0));
        let cancel = Arc::new(AtomicBool::new(false));

        let (tx, rx) = mpsc::channel();
        let mut workers = Vec::with_capacity(config.num_workers);
        for worker_id in 0..config.num_workers {
            // Each worker owns its own pipeline; construction errors surface here.
            let pipeline = FeaturePipeline::new(audio, model, kind)?;
            let chunks = Arc::clone(&chunks);
            let next_chunk = Arc::clone(&next_chunk);
            let cancel = Arc::clone(&cancel);
            let tx = tx.clone();
            let device = device.clone();

            workers.push(std::thread::spawn(move || {
                run_worker(worker_id, pipeline, chunks, next_chunk, cancel, tx, device)
            }));
        }

        Ok(Self {
            rx,
            pending: BTreeMap::new(),
            next_index: 0,
            total_chunks,
            cancel,
            workers,
        })
    }

    /// Number of batches this loader will yield when run to completion.
    pub fn len(&self) -> usize {
        self.total_chunks
    }

    pub fn is_empty(&self) -> bool {
        self.total_chunks == 0
    }

    /// Request cooperative cancellation. Workers finish the sample they are
    /// on, then stop claiming work.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

fn run_worker(
    worker_id: usize,
    pipeline: FeaturePipeline,
    chunks: Arc<Vec<Vec<Sample>>>,
    next_chunk: Arc<AtomicUsize>,
    cancel: Arc<AtomicBool>,
    tx: mpsc::Sender<(usize, Result<Batch>)>,
    device: Device,
) {
    loop {
        let index = next_chunk.fetch_add(1, Ordering::SeqCst);
        if index >= chunks.len() || cancel.load(Ordering::SeqCst) {
            return;
        }

        let mut pairs = Vec::with_capacity(chunks[index].len());
        for sample in &chunks[index] {
            // Cancellation is checked between samples; one extraction is the
            // smallest unit of work.
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            match pipeline.extract(sample) {
                Ok(pair) => pairs.push(pair),
                Err(e) => {
                    tracing::warn!(
                        worker = worker_id,
                        file = %sample.audio_path.display(),
                        error = %e,
                        "skipping sample"
                    );
                }
            }
        }

        let result = if pairs.is_empty() {
            Err(Error::Dataset(format!(
                "every sample in batch {index} failed extraction"
            )))
        } else {
            collate(&pairs, &device)
        };

        // Receiver gone means the loader was dropped; just stop.
        if tx.send((index, result)).is_err() {
            return;
        }
    }
}

impl Iterator for BatchLoader {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.next_index >= self.total_chunks {
                return None;
            }
            if let Some(result) = self.pending.remove(&self.next_index) {
                self.next_index += 1;
                return Some(result);
            }
            match self.rx.recv() {
                Ok((index, result)) => {
                    self.pending.insert(index, result);
                }
                // All workers exited (completion or cancellation).
                Err(_) => return None,
            }
        }
    }
}

impl Drop for BatchLoader {
    fn drop(&mut self) {
        self.cancel();
        // Drain so no worker blocks on a full channel (mpsc is unbounded, but
        // join still wants them past their current send).
        while self.rx.try_recv().is_ok() {}
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_sine_wav(path: &Path, seconds: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let n = (22050.0 * seconds) as usize;
        for i in 0..n {
            let s = (2.0 * std::f64::consts::PI * 220.0 * i as f64 / 22050.0).sin() as f32;
            writer.write_sample(s * 0.5).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn make_samples(dir: &Path, durations: &[f32]) -> Vec<Sample> {
        durations
            .iter()
            .enumerate()
            .map(|(i, &seconds)| {
                let path = dir.join(format!("clip{i}.wav"));
                write_sine_wav(&path, seconds);
                Sample {
                    audio_path: path,
                    text: Some(format!("sentence number {i}")),
                    duration: seconds,
                }
            })
            .collect()
    }

    fn loader_for(samples: Vec<Sample>, batch_size: usize, num_workers: usize) -> BatchLoader {
        BatchLoader::new(
            samples,
            &AudioConfig::default(),
            &ModelConfig::default(),
            DatasetKind::Blizzard,
            LoaderConfig {
                batch_size,
                num_workers,
                drop_last: true,
            },
            &Device::Cpu,
        )
        .unwrap()
    }

    #[test]
    fn batches_arrive_in_chunk_order() {
        let dir = tempfile::tempdir().unwrap();
        // Increasing durations: frame counts identify the chunks.
        let samples = make_samples(dir.path(), &[0.3, 0.5, 0.7, 0.9]);
        let loader = loader_for(samples, 1, 2);
        assert_eq!(loader.len(), 4);

        let frames: Vec<usize> = loader
            .map(|b| b.unwrap().audio_lengths[0])
            .collect();
        assert_eq!(frames.len(), 4);
        for pair in frames.windows(2) {
            assert!(pair[0] < pair[1], "batches out of order: {frames:?}");
        }
    }

    #[test]
    fn drop_last_discards_short_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let samples = make_samples(dir.path(), &[0.3, 0.3, 0.3, 0.3, 0.3]);
        let loader = loader_for(samples, 2, 1);
        assert_eq!(loader.len(), 2);
        assert_eq!(loader.count(), 2);
    }

    #[test]
    fn bad_samples_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut samples = make_samples(dir.path(), &[0.3, 0.3]);
        samples.push(Sample {
            audio_path: dir.path().join("missing.wav"),
            text: Some("ghost".into()),
            duration: 0.3,
        });

        let loader = loader_for(samples, 3, 1);
        let batches: Vec<_> = loader.collect();
        assert_eq!(batches.len(), 1);
        // Two good samples survive out of three.
        assert_eq!(batches[0].as_ref().unwrap().batch_size(), 2);
    }

    #[test]
    fn cancellation_stops_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let samples = make_samples(dir.path(), &[0.3; 8]);
        let mut loader = loader_for(samples, 1, 1);

        let first = loader.next();
        assert!(first.is_some());
        loader.cancel();
        // Anything already in flight may still arrive, but iteration must
        // terminate rather than wait for the full 8 batches forever.
        let remaining = loader.count();
        assert!(remaining <= 7);
    }

    #[test]
    fn invalid_loader_config_rejected() {
        let result = BatchLoader::new(
            Vec::new(),
            &AudioConfig::default(),
            &ModelConfig::default(),
            DatasetKind::Kss,
            LoaderConfig {
                batch_size: 0,
                num_workers: 1,
                drop_last: true,
            },
            &Device::Cpu,
        );
        assert!(result.is_err());
    }
}
