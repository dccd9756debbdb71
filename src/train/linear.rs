//! Baseline per-cell linear policy.
//!
//! Every board cell gets `logits = W_s · spatial[:, y, x] + W_g · mean(global) + b`,
//! where `mean(global)` averages each global channel over its 4x4 plane. It is
//! the smallest network that consumes both input tensors and produces the
//! `[B, C, 32, 32]` output the trainer expects, and its gradient is exact.
//!
//! Parameters are stored flat: `W` row-major as `[C, 14 + 15]`, then `b[C]`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{s, Array1, Array2, Array4, ArrayView1, ArrayView2, ArrayView4, Axis};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{PolicyNetwork, TrainError};
use crate::nn::encoding::{GLOBAL_CHANNELS, GLOBAL_SIZE, SPATIAL_CHANNELS};
use crate::replay::GRID_SIZE;

/// Architecture tag written into checkpoints.
pub const ARCHITECTURE: &str = "pixel-linear";

const INPUTS: usize = SPATIAL_CHANNELS + GLOBAL_CHANNELS;
const CELLS: usize = GRID_SIZE * GRID_SIZE;

/// On-disk checkpoint: weights plus the input shapes they expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyCheckpoint {
    pub architecture: String,
    pub input_shapes: [[usize; 4]; 2],
    pub num_classes: usize,
    pub parameters: Vec<f32>,
}

type WeightViews<'a> = (ArrayView2<'a, f32>, ArrayView2<'a, f32>, ArrayView1<'a, f32>);

#[derive(Debug, Clone, PartialEq)]
pub struct PixelLinearPolicy {
    num_classes: usize,
    params: Vec<f32>,
}

impl PixelLinearPolicy {
    /// Uniform init in `±1/sqrt(fan_in)`, reproducible from `seed`.
    pub fn new(num_classes: usize, seed: u64) -> PixelLinearPolicy {
        let mut rng = SmallRng::seed_from_u64(seed);
        let bound = 1.0 / (INPUTS as f32).sqrt();
        let params = (0..num_classes * (INPUTS + 1))
            .map(|_| rng.gen_range(-bound..bound))
            .collect();
        PixelLinearPolicy {
            num_classes,
            params,
        }
    }

    /// Reads a checkpoint written by `save_checkpoint`.
    pub fn load_checkpoint(path: &Path) -> Result<PixelLinearPolicy, TrainError> {
        let file = File::open(path).map_err(|source| TrainError::CheckpointIo {
            path: path.to_path_buf(),
            source,
        })?;
        let checkpoint: PolicyCheckpoint =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| {
                TrainError::CheckpointFormat {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        if checkpoint.architecture != ARCHITECTURE {
            return Err(TrainError::Architecture(checkpoint.architecture));
        }
        let expected = checkpoint.num_classes * (INPUTS + 1);
        if checkpoint.parameters.len() != expected {
            return Err(TrainError::ParameterMismatch {
                expected,
                found: checkpoint.parameters.len(),
            });
        }
        Ok(PixelLinearPolicy {
            num_classes: checkpoint.num_classes,
            params: checkpoint.parameters,
        })
    }

    /// Views of `(W_s, W_g, b)`.
    fn weights(&self) -> Result<WeightViews<'_>, TrainError> {
        let split = self.num_classes * INPUTS;
        let w = ArrayView2::from_shape((self.num_classes, INPUTS), &self.params[..split])?;
        let bias = ArrayView1::from(&self.params[split..]);
        Ok((
            w.slice_move(s![.., ..SPATIAL_CHANNELS]),
            w.slice_move(s![.., SPATIAL_CHANNELS..]),
            bias,
        ))
    }

    fn check_inputs(
        &self,
        spatial: &ArrayView4<'_, f32>,
        global: &ArrayView4<'_, f32>,
    ) -> Result<usize, TrainError> {
        let batch = spatial.len_of(Axis(0));
        if spatial.dim() != (batch, SPATIAL_CHANNELS, GRID_SIZE, GRID_SIZE)
            || global.dim() != (batch, GLOBAL_CHANNELS, GLOBAL_SIZE, GLOBAL_SIZE)
        {
            return Err(TrainError::InputShape {
                spatial: spatial.shape().to_vec(),
                global: global.shape().to_vec(),
            });
        }
        Ok(batch)
    }
}

/// Mean of each global channel over its plane, `[B, 15]`.
fn global_means(global: &ArrayView4<'_, f32>) -> Array2<f32> {
    let plane = (GLOBAL_SIZE * GLOBAL_SIZE) as f32;
    global.sum_axis(Axis(3)).sum_axis(Axis(2)) / plane
}

impl PolicyNetwork for PixelLinearPolicy {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn forward(
        &self,
        spatial: ArrayView4<'_, f32>,
        global: ArrayView4<'_, f32>,
    ) -> Result<Array4<f32>, TrainError> {
        let batch = self.check_inputs(&spatial, &global)?;
        let (w_spatial, w_global, bias) = self.weights()?;
        let means = global_means(&global);

        let mut logits = Array4::<f32>::zeros((batch, self.num_classes, GRID_SIZE, GRID_SIZE));
        for b in 0..batch {
            let frame = spatial.index_axis(Axis(0), b);
            let cells = frame.to_shape((SPATIAL_CHANNELS, CELLS))?;
            let per_cell = w_spatial
                .dot(&cells)
                .into_shape_with_order((self.num_classes, GRID_SIZE, GRID_SIZE))?;
            let offsets = w_global.dot(&means.row(b)) + &bias;

            let mut out = logits.index_axis_mut(Axis(0), b);
            out.assign(&per_cell);
            for (k, &offset) in offsets.iter().enumerate() {
                let mut plane = out.index_axis_mut(Axis(0), k);
                plane += offset;
            }
        }
        Ok(logits)
    }

    fn backward(
        &self,
        spatial: ArrayView4<'_, f32>,
        global: ArrayView4<'_, f32>,
        grad_logits: ArrayView4<'_, f32>,
    ) -> Result<Vec<f32>, TrainError> {
        let batch = self.check_inputs(&spatial, &global)?;
        let expected = (batch, self.num_classes, GRID_SIZE, GRID_SIZE);
        if grad_logits.dim() != expected {
            return Err(TrainError::ShapeMismatch {
                logits: grad_logits.shape().to_vec(),
                labels: vec![batch, self.num_classes, GRID_SIZE, GRID_SIZE],
            });
        }
        let means = global_means(&global);

        let mut grad_w = Array2::<f32>::zeros((self.num_classes, INPUTS));
        let mut grad_b = Array1::<f32>::zeros(self.num_classes);
        for b in 0..batch {
            let grad_frame = grad_logits.index_axis(Axis(0), b);
            let g = grad_frame.to_shape((self.num_classes, CELLS))?;
            let frame = spatial.index_axis(Axis(0), b);
            let cells = frame.to_shape((SPATIAL_CHANNELS, CELLS))?;

            let mut spatial_part = grad_w.slice_mut(s![.., ..SPATIAL_CHANNELS]);
            spatial_part += &g.dot(&cells.t());

            let summed = g.sum_axis(Axis(1));
            let mean_row = means.row(b);
            let mut global_part = grad_w.slice_mut(s![.., SPATIAL_CHANNELS..]);
            for (k, mut row) in global_part.outer_iter_mut().enumerate() {
                row.scaled_add(summed[k], &mean_row);
            }
            grad_b += &summed;
        }

        let mut grads = Vec::with_capacity(self.params.len());
        grads.extend(grad_w.iter().copied());
        grads.extend(grad_b.iter().copied());
        Ok(grads)
    }

    fn parameters(&self) -> &[f32] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    fn save_checkpoint(&self, path: &Path) -> Result<(), TrainError> {
        let checkpoint = PolicyCheckpoint {
            architecture: ARCHITECTURE.to_string(),
            input_shapes: [
                [1, SPATIAL_CHANNELS, GRID_SIZE, GRID_SIZE],
                [1, GLOBAL_CHANNELS, GLOBAL_SIZE, GLOBAL_SIZE],
            ],
            num_classes: self.num_classes,
            parameters: self.params.clone(),
        };
        let file = File::create(path).map_err(|source| TrainError::CheckpointIo {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &checkpoint).map_err(|source| {
            TrainError::CheckpointFormat {
                path: path.to_path_buf(),
                source,
            }
        })?;
        writer.flush().map_err(|source| TrainError::CheckpointIo {
            path: path.to_path_buf(),
            source,
        })
    }
}
