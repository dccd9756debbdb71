//! Dataset compilation CLI.
//!
//! Compiles a replay directory the same way training does and prints the
//! compile statistics as one JSON object on stdout. With `--output`, also
//! writes one JSON line per sample:
//!
//!   {"key": "<episode>_<turn>", "rotation": k, "cells": [[y, x, label], ...]}
//!
//! Usage:
//!   cargo run --release --bin compile_dataset -- --episodes DIR [--output FILE]

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;
use serde::Serialize;

use lux_imitation::dataset::compiler::{compile_dataset, CompileOptions, DEFAULT_TEAM};
use lux_imitation::dataset::{Sample, NO_LABEL};

#[derive(Debug, Parser)]
#[command(author, version, about = "Compile Lux AI replays into labeled samples")]
struct Cli {
    /// Directory of replay JSON files
    #[arg(long, value_name = "DIR")]
    episodes: PathBuf,

    /// Team whose wins are compiled
    #[arg(long, value_name = "NAME", default_value = DEFAULT_TEAM)]
    team: String,

    /// Keep only the last N replay files
    #[arg(long, value_name = "N")]
    max_episodes: Option<usize>,

    /// Write one JSON line per sample to this file
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Serialize)]
struct SampleRecord<'a> {
    key: String,
    rotation: u8,
    cells: &'a [[i64; 3]],
}

fn labeled_cells(sample: &Sample) -> Vec<[i64; 3]> {
    sample
        .labels
        .indexed_iter()
        .filter(|(_, &label)| label != NO_LABEL)
        .map(|((y, x), &label)| [y as i64, x as i64, i64::from(label)])
        .collect()
}

fn write_samples(path: &Path, samples: &[Sample]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for sample in samples {
        let cells = labeled_cells(sample);
        let record = SampleRecord {
            key: sample.key.to_string(),
            rotation: sample.rotation.quarter_turns(),
            cells: &cells,
        };
        serde_json::to_writer(&mut out, &record)?;
        writeln!(out)?;
    }
    out.flush()
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let options = CompileOptions {
        team_name: cli.team,
        max_episodes: cli.max_episodes,
        progress: !cli.no_progress,
    };
    let dataset = compile_dataset(&cli.episodes, &options)
        .with_context(|| format!("compiling {}", cli.episodes.display()))?;

    if let Some(path) = &cli.output {
        write_samples(path, &dataset.samples)?;
        info!("Wrote {} samples to {}", dataset.samples.len(), path.display());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer(&mut out, &dataset.stats)?;
    writeln!(out)?;
    Ok(())
}
