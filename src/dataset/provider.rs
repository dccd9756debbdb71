//! Rotation-augmented training examples.
//!
//! Label grids are precomputed by the compiler, encoded tensors are not: each
//! access re-encodes the cached observation. The global tensor carries no
//! spatial structure and is never rotated.

use std::sync::Arc;

use ndarray::{Array2, Array3};

use super::augment::{rotate_grid, rotate_spatial};
use super::{DatasetError, ObservationCache, Sample};
use crate::nn::encoding::{encode_observation, EncodedFrame};

/// One (spatial, global, labels) training triple.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    /// [14, 32, 32]
    pub spatial: Array3<f32>,
    /// [15, 4, 4]
    pub global: Array3<f32>,
    /// [32, 32], -1 where unlabeled.
    pub labels: Array2<i64>,
}

/// Serves samples against a shared observation cache.
#[derive(Debug, Clone)]
pub struct SampleProvider {
    cache: Arc<ObservationCache>,
    samples: Vec<Sample>,
}

impl SampleProvider {
    pub fn new(cache: Arc<ObservationCache>, samples: Vec<Sample>) -> Self {
        SampleProvider { cache, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Builds the training example for sample `index`.
    pub fn get(&self, index: usize) -> Result<TrainingExample, DatasetError> {
        let sample = self.samples.get(index).ok_or(DatasetError::IndexOutOfRange {
            index,
            len: self.samples.len(),
        })?;
        self.example(sample)
    }

    /// Builds the training example for a sample, which need not belong to
    /// this provider as long as its observation is cached.
    pub fn example(&self, sample: &Sample) -> Result<TrainingExample, DatasetError> {
        let obs = self
            .cache
            .get(&sample.key)
            .ok_or_else(|| DatasetError::MissingObservation(sample.key.clone()))?;
        let EncodedFrame { spatial, global } = encode_observation(obs);

        if sample.rotation.quarter_turns() == 0 {
            return Ok(TrainingExample {
                spatial,
                global,
                labels: sample.labels.mapv(i64::from),
            });
        }

        Ok(TrainingExample {
            spatial: rotate_spatial(spatial.view(), sample.rotation),
            global,
            labels: rotate_grid(sample.labels.view(), sample.rotation).mapv(i64::from),
        })
    }
}
