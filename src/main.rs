//! lux-imitation -- trains a per-cell action policy on Lux AI replays.
//!
//! Compiles the replay directory into labeled samples, splits them into
//! train and validation sets, and runs the training cycles, writing the best
//! checkpoint by validation accuracy.
//!
//! Usage:
//!   cargo run --release -- --episodes DIR [OPTIONS]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use lux_imitation::config::TrainConfig;
use lux_imitation::dataset::compiler::compile_dataset;
use lux_imitation::dataset::labels::NUM_LABEL_CLASSES;
use lux_imitation::dataset::loader::BatchLoader;
use lux_imitation::dataset::provider::SampleProvider;
use lux_imitation::dataset::split::train_val_split;
use lux_imitation::train::linear::PixelLinearPolicy;
use lux_imitation::train::optim::{AdamW, ExponentialLr};
use lux_imitation::train::{fit, PhaseLoaders, RunOptions};

#[derive(Debug, Parser)]
#[command(author, version, about = "Imitation learning on Lux AI replays")]
struct Cli {
    /// JSON config file; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory of replay JSON files
    #[arg(long, value_name = "DIR")]
    episodes: Option<PathBuf>,

    /// Team whose wins are imitated
    #[arg(long, value_name = "NAME")]
    team: Option<String>,

    /// Keep only the last N replay files
    #[arg(long, value_name = "N")]
    max_episodes: Option<usize>,

    #[arg(long, value_name = "N")]
    batch_size: Option<usize>,

    /// Fraction of samples held out for validation
    #[arg(long, value_name = "F")]
    val_fraction: Option<f64>,

    /// Number of train + val cycles
    #[arg(long, value_name = "N")]
    cycles: Option<usize>,

    #[arg(long, value_name = "LR")]
    lr: Option<f64>,

    #[arg(long, value_name = "W")]
    weight_decay: Option<f64>,

    /// Learning-rate decay per cycle
    #[arg(long, value_name = "G")]
    gamma: Option<f64>,

    /// Batch encoding threads (0 = training thread)
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// Where the best checkpoint is written
    #[arg(long, value_name = "FILE")]
    checkpoint: Option<PathBuf>,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    fn into_config(self) -> Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_json_file(path)?,
            None => TrainConfig::default(),
        };
        if let Some(dir) = self.episodes {
            config.episode_dir = dir;
        }
        if let Some(team) = self.team {
            config.team_name = team;
        }
        if self.max_episodes.is_some() {
            config.max_episodes = self.max_episodes;
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(f) = self.val_fraction {
            config.val_fraction = f;
        }
        if let Some(n) = self.cycles {
            config.cycles = n;
        }
        if let Some(lr) = self.lr {
            config.learning_rate = lr;
        }
        if let Some(w) = self.weight_decay {
            config.weight_decay = w;
        }
        if let Some(g) = self.gamma {
            config.lr_gamma = g;
        }
        if let Some(n) = self.workers {
            config.workers = n;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(path) = self.checkpoint {
            config.checkpoint_path = path;
        }
        if self.no_progress {
            config.progress = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let config = cli.into_config()?;

    let dataset = compile_dataset(&config.episode_dir, &config.compile_options())
        .with_context(|| format!("compiling {}", config.episode_dir.display()))?;
    if dataset.samples.is_empty() {
        warn!(
            "no samples for team '{}' in {}",
            config.team_name,
            config.episode_dir.display()
        );
    }

    let (train, val) = train_val_split(dataset.samples, config.val_fraction, config.seed);
    info!("Split {} train / {} val samples", train.len(), val.len());

    let cache = Arc::new(dataset.observations);
    let loaders = PhaseLoaders {
        train: BatchLoader::new(
            SampleProvider::new(Arc::clone(&cache), train),
            config.batch_size,
            true,
            config.workers,
        )?,
        val: BatchLoader::new(
            SampleProvider::new(cache, val),
            config.batch_size,
            false,
            config.workers,
        )?,
    };

    let mut net = PixelLinearPolicy::new(NUM_LABEL_CLASSES, config.seed);
    let mut optimizer = AdamW::new(config.learning_rate, config.weight_decay);
    let scheduler = ExponentialLr::new(config.lr_gamma);
    let options = RunOptions {
        checkpoint_path: config.checkpoint_path.clone(),
        progress: config.progress,
    };
    let mut rng = SmallRng::seed_from_u64(config.seed);

    let session = fit(
        config.cycles,
        &mut net,
        &mut optimizer,
        &scheduler,
        &loaders,
        &options,
        &mut rng,
    )?;
    info!(
        "Finished {} cycle(s); best val acc {:.4}, checkpoint {}",
        session.epoch,
        session.best_accuracy,
        config.checkpoint_path.display()
    );
    Ok(())
}
