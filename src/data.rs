//! Dataset pipeline: enumeration, feature extraction, batching.
//!
//! ## Components
//!
//! - [`source`] — sample enumeration per dataset layout + seeded 95/5 split
//! - [`tier`] — interleaved coarse-to-fine tier decomposition
//! - [`features`] — per-sample feature extraction (mel + tiers + tokens)
//! - [`batch`] — collation of variable-length features into padded tensors
//! - [`loader`] — worker-pool loader yielding batches in order

pub mod batch;
pub mod features;
pub mod loader;
pub mod source;
pub mod tier;

pub use batch::{collate, Batch};
pub use features::{FeaturePair, FeaturePipeline};
pub use loader::{BatchLoader, LoaderConfig};
pub use source::{enumerate, split, Sample, Split};
pub use tier::{Spectrogram, TierUtil};
