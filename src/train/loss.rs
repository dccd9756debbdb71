//! Per-cell cross-entropy with ignored cells.

use ndarray::{Array4, ArrayView3, ArrayView4, Axis};

use super::TrainError;
use crate::dataset::NO_LABEL;

/// Loss, gradient, and accuracy counts for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct LossOutput {
    /// Mean cross-entropy over labeled cells (0 when none are labeled).
    pub loss: f32,
    /// dLoss/dLogits, same shape as the logits.
    pub grad: Array4<f32>,
    /// Labeled cells whose argmax class equals the label.
    pub correct: usize,
    /// Cells whose label is not `NO_LABEL`.
    pub labeled: usize,
}

/// Softmax cross-entropy over the class axis of `[B, C, H, W]` logits against
/// `[B, H, W]` labels. Cells labeled `NO_LABEL` contribute neither loss,
/// gradient, nor accuracy counts.
pub fn masked_cross_entropy(
    logits: ArrayView4<'_, f32>,
    labels: ArrayView3<'_, i64>,
) -> Result<LossOutput, TrainError> {
    let (batch, classes, height, width) = logits.dim();
    if labels.dim() != (batch, height, width) {
        return Err(TrainError::ShapeMismatch {
            logits: logits.shape().to_vec(),
            labels: labels.shape().to_vec(),
        });
    }

    let ignore = i64::from(NO_LABEL);
    let mut grad = Array4::<f32>::zeros(logits.raw_dim());
    let mut total = 0.0f64;
    let mut correct = 0usize;
    let mut labeled = 0usize;
    let mut probs = vec![0.0f64; classes];

    for ((b, y, x), &label) in labels.indexed_iter() {
        if label == ignore {
            continue;
        }
        if label < 0 || label as usize >= classes {
            return Err(TrainError::LabelOutOfRange { label, classes });
        }
        let target = label as usize;
        let cell = logits.slice(ndarray::s![b, .., y, x]);

        let mut best = 0;
        for k in 1..classes {
            if cell[k] > cell[best] {
                best = k;
            }
        }
        if best == target {
            correct += 1;
        }

        let max = cell[best] as f64;
        let mut denom = 0.0f64;
        for k in 0..classes {
            probs[k] = (cell[k] as f64 - max).exp();
            denom += probs[k];
        }
        total += denom.ln() + max - cell[target] as f64;

        let mut g = grad.index_axis_mut(Axis(0), b);
        for k in 0..classes {
            let onehot = if k == target { 1.0 } else { 0.0 };
            g[[k, y, x]] = (probs[k] / denom - onehot) as f32;
        }
        labeled += 1;
    }

    if labeled == 0 {
        return Ok(LossOutput {
            loss: 0.0,
            grad,
            correct,
            labeled,
        });
    }

    grad /= labeled as f32;
    Ok(LossOutput {
        loss: (total / labeled as f64) as f32,
        grad,
        correct,
        labeled,
    })
}
