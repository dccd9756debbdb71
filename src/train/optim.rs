//! Parameter updates and learning-rate schedules.

use super::TrainError;

/// Updates a flat parameter vector from its gradient.
pub trait Optimizer {
    /// Applies one update. `grads` must have the same length as `params`.
    fn step(&mut self, params: &mut [f32], grads: &[f32]) -> Result<(), TrainError>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);
}

/// Adam with decoupled weight decay.
#[derive(Debug, Clone)]
pub struct AdamW {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    weight_decay: f64,
    t: i32,
    m: Vec<f32>,
    v: Vec<f32>,
}

impl AdamW {
    /// Betas (0.9, 0.999) and eps 1e-8.
    pub fn new(lr: f64, weight_decay: f64) -> AdamW {
        AdamW {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Number of updates applied so far.
    pub fn steps(&self) -> i32 {
        self.t
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, params: &mut [f32], grads: &[f32]) -> Result<(), TrainError> {
        if params.len() != grads.len() {
            return Err(TrainError::ParameterMismatch {
                expected: params.len(),
                found: grads.len(),
            });
        }
        if self.m.len() != params.len() {
            self.m = vec![0.0; params.len()];
            self.v = vec![0.0; params.len()];
            self.t = 0;
        }

        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);
        let step_size = self.lr / bias1;
        let decay = 1.0 - self.lr * self.weight_decay;

        for (((p, &g), m), v) in params
            .iter_mut()
            .zip(grads)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            let g = g as f64;
            let mut mf = *m as f64;
            let mut vf = *v as f64;
            mf = self.beta1 * mf + (1.0 - self.beta1) * g;
            vf = self.beta2 * vf + (1.0 - self.beta2) * g * g;
            *m = mf as f32;
            *v = vf as f32;

            let denom = vf.sqrt() / bias2.sqrt() + self.eps;
            let updated = (*p as f64) * decay - step_size * mf / denom;
            *p = updated as f32;
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }
}

/// Multiplies the learning rate by `gamma` on every step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialLr {
    pub gamma: f64,
}

impl ExponentialLr {
    pub fn new(gamma: f64) -> ExponentialLr {
        ExponentialLr { gamma }
    }

    pub fn step<O: Optimizer + ?Sized>(&self, optimizer: &mut O) {
        let lr = optimizer.learning_rate() * self.gamma;
        optimizer.set_learning_rate(lr);
    }
}
