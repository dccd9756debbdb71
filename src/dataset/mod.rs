//! Supervised dataset construction and serving.
//!
//! The compiler turns replays into `Sample`s that reference observations in a
//! shared `ObservationCache`; the provider re-encodes those observations on
//! demand and applies each sample's rotation; the loader batches provider
//! output for the training loop.

pub mod augment;
pub mod compiler;
pub mod labels;
pub mod loader;
pub mod provider;
pub mod split;

use std::collections::HashMap;
use std::fmt;

use ndarray::Array2;

use crate::replay::{Observation, ReplayError};

/// Per-cell class labels over the 32x32 grid, `NO_LABEL` where no unit acted.
pub type LabelGrid = Array2<i8>;

/// Label value of a cell that is excluded from loss and accuracy.
pub const NO_LABEL: i8 = -1;

/// Observations by key, shared read-only by every sample that references them.
pub type ObservationCache = HashMap<ObservationKey, Observation>;

/// Errors raised while building or serving the dataset.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("observation {0} is not in the cache")]
    MissingObservation(ObservationKey),

    #[error("sample index {index} out of range for {len} samples")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("batch size must be positive")]
    ZeroBatchSize,

    #[error("failed to stack batch: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Identifies one cached observation: episode and turn index within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservationKey {
    pub episode_id: String,
    pub turn: usize,
}

impl ObservationKey {
    pub fn new(episode_id: impl Into<String>, turn: usize) -> Self {
        ObservationKey {
            episode_id: episode_id.into(),
            turn,
        }
    }
}

impl fmt::Display for ObservationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.episode_id, self.turn)
    }
}

/// A multiple of 90 degrees to rotate a sample by. Always in `0..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Rotation(u8);

impl Rotation {
    pub const IDENTITY: Rotation = Rotation(0);

    /// Returns `None` unless `quarter_turns` is in `0..=3`.
    pub const fn new(quarter_turns: u8) -> Option<Rotation> {
        if quarter_turns < 4 {
            Some(Rotation(quarter_turns))
        } else {
            None
        }
    }

    pub const fn quarter_turns(self) -> u8 {
        self.0
    }

    /// The rotation that undoes this one.
    pub const fn inverse(self) -> Rotation {
        Rotation((4 - self.0) % 4)
    }
}

/// One training sample: an observation reference, its label grid, and the
/// rotation applied when it is served.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub key: ObservationKey,
    pub labels: LabelGrid,
    pub rotation: Rotation,
}

impl Sample {
    /// Number of cells carrying a label.
    pub fn labeled_cells(&self) -> usize {
        self.labels.iter().filter(|&&v| v != NO_LABEL).count()
    }
}
