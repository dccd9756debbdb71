//! Batched iteration over a sample provider.
//!
//! Training loaders shuffle once per pass, validation loaders keep sample
//! order. With `workers > 0` the examples of each batch are encoded on a
//! dedicated rayon pool; results are collected in order, so batches are the
//! same as in sequential mode.

use ndarray::{stack, Array3, Array4, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;

use super::provider::{SampleProvider, TrainingExample};
use super::DatasetError;

/// A stacked batch of training examples.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// [B, 14, 32, 32]
    pub spatial: Array4<f32>,
    /// [B, 15, 4, 4]
    pub global: Array4<f32>,
    /// [B, 32, 32]
    pub labels: Array3<i64>,
}

impl Batch {
    /// Stacks examples along a new leading batch axis.
    pub fn stack(examples: &[TrainingExample]) -> Result<Batch, DatasetError> {
        let spatial: Vec<_> = examples.iter().map(|e| e.spatial.view()).collect();
        let global: Vec<_> = examples.iter().map(|e| e.global.view()).collect();
        let labels: Vec<_> = examples.iter().map(|e| e.labels.view()).collect();
        Ok(Batch {
            spatial: stack(Axis(0), &spatial)?,
            global: stack(Axis(0), &global)?,
            labels: stack(Axis(0), &labels)?,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Batches a provider's samples.
#[derive(Debug)]
pub struct BatchLoader {
    provider: SampleProvider,
    batch_size: usize,
    shuffle: bool,
    pool: Option<rayon::ThreadPool>,
}

impl BatchLoader {
    /// Creates a loader. `workers == 0` encodes on the calling thread.
    pub fn new(
        provider: SampleProvider,
        batch_size: usize,
        shuffle: bool,
        workers: usize,
    ) -> Result<BatchLoader, DatasetError> {
        if batch_size == 0 {
            return Err(DatasetError::ZeroBatchSize);
        }
        let pool = if workers > 0 {
            Some(rayon::ThreadPoolBuilder::new().num_threads(workers).build()?)
        } else {
            None
        };
        Ok(BatchLoader {
            provider,
            batch_size,
            shuffle,
            pool,
        })
    }

    /// Number of samples served per pass.
    pub fn len(&self) -> usize {
        self.provider.len()
    }

    pub fn is_empty(&self) -> bool {
        self.provider.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    /// Starts one pass over the samples.
    pub fn batches<R: Rng + ?Sized>(&self, rng: &mut R) -> Batches<'_> {
        let mut order: Vec<usize> = (0..self.provider.len()).collect();
        if self.shuffle {
            order.shuffle(rng);
        }
        Batches {
            loader: self,
            order,
            cursor: 0,
        }
    }

    fn load(&self, indices: &[usize]) -> Result<Batch, DatasetError> {
        let examples: Vec<TrainingExample> = match &self.pool {
            Some(pool) => pool.install(|| {
                indices
                    .par_iter()
                    .map(|&i| self.provider.get(i))
                    .collect::<Result<_, _>>()
            })?,
            None => indices
                .iter()
                .map(|&i| self.provider.get(i))
                .collect::<Result<_, _>>()?,
        };
        Batch::stack(&examples)
    }
}

/// Iterator over the batches of one pass.
pub struct Batches<'a> {
    loader: &'a BatchLoader,
    order: Vec<usize>,
    cursor: usize,
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.loader.batch_size).min(self.order.len());
        let batch = self.loader.load(&self.order[self.cursor..end]);
        self.cursor = end;
        Some(batch)
    }
}
