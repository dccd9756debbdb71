//! Supervised training of per-cell action policies.
//!
//! A training cycle is one shuffled pass over the training loader with
//! parameter updates, then one in-order pass over the validation loader. The
//! network is checkpointed whenever validation accuracy matches or beats the
//! best seen so far, and the learning rate decays once per cycle.

pub mod linear;
pub mod loss;
pub mod optim;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use ndarray::{Array4, ArrayView4};
use rand::Rng;
use thiserror::Error;

use crate::dataset::loader::BatchLoader;
use crate::dataset::DatasetError;
use crate::progress::progress_bar;

use loss::masked_cross_entropy;
use optim::{ExponentialLr, Optimizer};

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("label {label} outside 0..{classes}")]
    LabelOutOfRange { label: i64, classes: usize },
    #[error("logits shape {logits:?} does not match labels shape {labels:?}")]
    ShapeMismatch { logits: Vec<usize>, labels: Vec<usize> },
    #[error("unexpected input shapes: spatial {spatial:?}, global {global:?}")]
    InputShape { spatial: Vec<usize>, global: Vec<usize> },
    #[error("expected {expected} parameters, found {found}")]
    ParameterMismatch { expected: usize, found: usize },
    #[error("unknown checkpoint architecture {0:?}")]
    Architecture(String),
    #[error("checkpoint {path}: {source}")]
    CheckpointIo { path: PathBuf, source: io::Error },
    #[error("checkpoint {path}: {source}")]
    CheckpointFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

/// A network mapping `[B, 14, 32, 32]` spatial and `[B, 15, 4, 4]` global
/// inputs to `[B, C, 32, 32]` per-cell logits.
///
/// Parameters are exposed as one flat vector so optimizers stay independent of
/// the architecture. `backward` recomputes whatever it needs from the inputs.
pub trait PolicyNetwork {
    fn num_classes(&self) -> usize;

    fn forward(
        &self,
        spatial: ArrayView4<'_, f32>,
        global: ArrayView4<'_, f32>,
    ) -> Result<Array4<f32>, TrainError>;

    /// Gradient of the loss with respect to `parameters()`, given the
    /// gradient with respect to the logits of `forward(spatial, global)`.
    fn backward(
        &self,
        spatial: ArrayView4<'_, f32>,
        global: ArrayView4<'_, f32>,
        grad_logits: ArrayView4<'_, f32>,
    ) -> Result<Vec<f32>, TrainError>;

    fn parameters(&self) -> &[f32];

    fn parameters_mut(&mut self) -> &mut [f32];

    /// Switches between training and evaluation behavior. Networks without
    /// dropout or batch statistics ignore it.
    fn set_training(&mut self, _training: bool) {}

    fn save_checkpoint(&self, path: &Path) -> Result<(), TrainError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Val,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Phase::Train => "train",
            Phase::Val => "val",
        })
    }
}

/// Aggregate metrics of one pass over a loader.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseStats {
    /// Sum of per-batch mean losses weighted by batch size, over the sample count.
    pub loss: f64,
    /// Correct labeled cells over labeled cells; 0 when nothing is labeled.
    pub accuracy: f64,
    pub samples: usize,
    pub labeled_cells: usize,
}

/// Metrics of one train + val cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// 1-based cycle number.
    pub epoch: usize,
    /// Learning rate used during the cycle, before the decay step.
    pub learning_rate: f64,
    pub train: PhaseStats,
    pub val: PhaseStats,
    pub checkpointed: bool,
}

/// State carried between cycles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSession {
    pub epoch: usize,
    pub best_accuracy: f64,
    pub history: Vec<CycleReport>,
}

impl TrainingSession {
    pub fn new() -> TrainingSession {
        TrainingSession::default()
    }
}

/// The loaders of one training run.
#[derive(Debug)]
pub struct PhaseLoaders {
    pub train: BatchLoader,
    pub val: BatchLoader,
}

/// Where and how a run reports and saves its progress.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub checkpoint_path: PathBuf,
    pub progress: bool,
}

/// One pass over `loader`. In `Phase::Train` every batch updates the network.
pub fn run_phase<N, O, R>(
    net: &mut N,
    optimizer: &mut O,
    loader: &BatchLoader,
    phase: Phase,
    rng: &mut R,
    progress: bool,
) -> Result<PhaseStats, TrainError>
where
    N: PolicyNetwork + ?Sized,
    O: Optimizer + ?Sized,
    R: Rng + ?Sized,
{
    net.set_training(phase == Phase::Train);
    let pb = progress_bar(loader.num_batches() as u64, progress);
    pb.set_message(phase.to_string());

    let mut loss_sum = 0.0f64;
    let mut samples = 0usize;
    let mut correct = 0usize;
    let mut labeled = 0usize;

    for batch in loader.batches(rng) {
        let batch = batch?;
        let logits = net.forward(batch.spatial.view(), batch.global.view())?;
        let out = masked_cross_entropy(logits.view(), batch.labels.view())?;
        if phase == Phase::Train {
            let grads = net.backward(batch.spatial.view(), batch.global.view(), out.grad.view())?;
            optimizer.step(net.parameters_mut(), &grads)?;
        }

        loss_sum += f64::from(out.loss) * batch.len() as f64;
        samples += batch.len();
        correct += out.correct;
        labeled += out.labeled;
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(PhaseStats {
        loss: if samples == 0 { 0.0 } else { loss_sum / samples as f64 },
        accuracy: if labeled == 0 {
            0.0
        } else {
            correct as f64 / labeled as f64
        },
        samples,
        labeled_cells: labeled,
    })
}

/// Runs one train + val cycle, checkpoints on a new best validation
/// accuracy, then decays the learning rate.
#[allow(clippy::too_many_arguments)]
pub fn train_cycle<N, O, R>(
    session: &mut TrainingSession,
    total_cycles: usize,
    net: &mut N,
    optimizer: &mut O,
    scheduler: &ExponentialLr,
    loaders: &PhaseLoaders,
    options: &RunOptions,
    rng: &mut R,
) -> Result<CycleReport, TrainError>
where
    N: PolicyNetwork + ?Sized,
    O: Optimizer + ?Sized,
    R: Rng + ?Sized,
{
    session.epoch += 1;
    let learning_rate = optimizer.learning_rate();
    info!("Learning with lr: {learning_rate:.6}");

    let mut stats = [PhaseStats::default(); 2];
    for (slot, (phase, loader)) in [(Phase::Train, &loaders.train), (Phase::Val, &loaders.val)]
        .into_iter()
        .enumerate()
    {
        let phase_stats = run_phase(net, optimizer, loader, phase, rng, options.progress)?;
        info!(
            "Epoch {}/{} | {:^5} | Loss: {:.4} | Acc: {:.4}",
            session.epoch, total_cycles, phase, phase_stats.loss, phase_stats.accuracy
        );
        stats[slot] = phase_stats;
    }
    let [train, val] = stats;

    let checkpointed = val.accuracy >= session.best_accuracy;
    if checkpointed {
        net.save_checkpoint(&options.checkpoint_path)?;
        session.best_accuracy = val.accuracy;
        info!(
            "Saved checkpoint to {} (val acc {:.4})",
            options.checkpoint_path.display(),
            val.accuracy
        );
    }
    scheduler.step(optimizer);

    let report = CycleReport {
        epoch: session.epoch,
        learning_rate,
        train,
        val,
        checkpointed,
    };
    session.history.push(report.clone());
    Ok(report)
}

/// Runs `cycles` training cycles from a fresh session.
#[allow(clippy::too_many_arguments)]
pub fn fit<N, O, R>(
    cycles: usize,
    net: &mut N,
    optimizer: &mut O,
    scheduler: &ExponentialLr,
    loaders: &PhaseLoaders,
    options: &RunOptions,
    rng: &mut R,
) -> Result<TrainingSession, TrainError>
where
    N: PolicyNetwork + ?Sized,
    O: Optimizer + ?Sized,
    R: Rng + ?Sized,
{
    let mut session = TrainingSession::new();
    for _ in 0..cycles {
        train_cycle(
            &mut session,
            cycles,
            net,
            optimizer,
            scheduler,
            loaders,
            options,
            rng,
        )?;
    }
    info!("Best val acc {:.4}", session.best_accuracy);
    Ok(session)
}
