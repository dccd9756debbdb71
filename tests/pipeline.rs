//! End-to-end tests over synthetic replay files.
//!
//! Replays are written to a temporary directory, then compiled, served with
//! rotation, and trained on through the library and both binaries.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde_json::{json, Value};

use lux_imitation::dataset::compiler::{compile_dataset, CompileOptions};
use lux_imitation::dataset::labels::NUM_LABEL_CLASSES;
use lux_imitation::dataset::loader::BatchLoader;
use lux_imitation::dataset::provider::SampleProvider;
use lux_imitation::dataset::split::train_val_split;
use lux_imitation::dataset::Rotation;
use lux_imitation::train::linear::PixelLinearPolicy;
use lux_imitation::train::optim::{AdamW, ExponentialLr};
use lux_imitation::train::{fit, PhaseLoaders, PolicyNetwork, RunOptions};

const WINNER: &str = "Toad Brigade";

/// A 32x32 replay where worker `u_1` of the `WINNER` seat stands at
/// (turn, 4), the other seat's `u_2` sits at (30, 30), and both agents
/// submit `commands[i]` on turn `i + 1`. Every turn keeps one wood tile on
/// the map.
fn replay_json(episode_id: Value, teams: [&str; 2], rewards: Value, commands: &[&str]) -> Value {
    let team = teams.iter().position(|&t| t == WINNER).unwrap_or(0);
    let mut steps = Vec::new();
    for turn in 0..=commands.len() {
        let action = if turn == 0 {
            json!([])
        } else {
            json!([commands[turn - 1]])
        };
        steps.push(json!([
            {
                "action": action,
                "status": "ACTIVE",
                "observation": {
                    "step": turn,
                    "width": 32,
                    "height": 32,
                    "updates": [
                        "rp 0 10",
                        "rp 1 4",
                        format!("u 0 {} u_1 {} 4 0 20 0 0", team, turn),
                        format!("u 0 {} u_2 30 30 0 0 0 0", 1 - team),
                        "r wood 16 16 500",
                        "D_DONE"
                    ]
                }
            },
            {
                "action": action,
                "status": "ACTIVE",
                "observation": {"player": 1}
            }
        ]));
    }
    json!({
        "info": {"EpisodeId": episode_id, "TeamNames": teams},
        "rewards": rewards,
        "steps": steps
    })
}

fn write(dir: &Path, name: &str, value: &Value) {
    std::fs::write(dir.join(name), value.to_string()).unwrap();
}

fn quiet() -> CompileOptions {
    CompileOptions {
        progress: false,
        ..CompileOptions::default()
    }
}

/// Two won episodes with a mix of directions, one lost episode, and junk.
fn populate(dir: &Path) {
    write(
        dir,
        "100.json",
        &replay_json(
            json!(100),
            [WINNER, "Other"],
            json!([3, 1]),
            &["m u_1 n", "m u_1 w", "m u_1 s", "m u_1 e", "bcity u_1"],
        ),
    );
    write(
        dir,
        "200.json",
        &replay_json(
            json!("200"),
            ["Other", WINNER],
            json!([null, 2]),
            &["m u_1 n", "m u_1 e"],
        ),
    );
    write(
        dir,
        "300.json",
        &replay_json(json!(300), [WINNER, "Other"], json!([0, 9]), &["m u_1 n"]),
    );
    std::fs::write(dir.join("400.json"), "[1, 2").unwrap();
    std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
}

#[test]
fn single_move_becomes_one_north_sample() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "1.json",
        &replay_json(json!(1), [WINNER, "Other"], json!([1, 0]), &["m u_1 n"]),
    );
    let dataset = compile_dataset(dir.path(), &quiet()).unwrap();
    assert_eq!(dataset.samples.len(), 1);
    let sample = &dataset.samples[0];
    assert_eq!(sample.rotation, Rotation::IDENTITY);
    assert_eq!(sample.key.to_string(), "1_0");
    // Worker u_1 stands at (0, 4) on turn 0.
    assert_eq!(sample.labels[[4, 0]], 0);
    assert_eq!(sample.labeled_cells(), 1);

    let provider = SampleProvider::new(Arc::new(dataset.observations), dataset.samples);
    let example = provider.get(0).unwrap();
    assert_eq!(example.labels[[4, 0]], 0);
    assert_eq!(example.spatial[[0, 4, 0]], 1.0);
    assert_eq!(example.spatial[[3, 30, 30]], 1.0);
}

#[test]
fn compiles_only_the_target_teams_wins() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path());
    let dataset = compile_dataset(dir.path(), &quiet()).unwrap();

    assert_eq!(dataset.stats.files, 4);
    assert_eq!(dataset.stats.skipped_files, 1);
    assert_eq!(dataset.stats.other_team, 1);
    assert_eq!(dataset.stats.episodes, 2);
    assert_eq!(dataset.stats.observations, 5 + 2);
    // 100: N, E (west move), S, W (east move), bcity on all four; 200: N, W.
    assert_eq!(dataset.stats.samples_per_channel, [3, 3, 2, 2]);
    assert_eq!(dataset.samples.len(), 10);
    assert!(dataset
        .samples
        .iter()
        .all(|s| dataset.observations.contains_key(&s.key)));
}

#[test]
fn rotated_samples_point_moves_north() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path());
    let dataset = compile_dataset(dir.path(), &quiet()).unwrap();
    let moves: Vec<_> = dataset
        .samples
        .iter()
        .filter(|s| s.labels.iter().any(|&v| v == 0))
        .cloned()
        .collect();
    assert_eq!(moves.len(), 6);
    // 200.json is won from the second seat.
    assert!(moves
        .iter()
        .any(|s| dataset.observations[&s.key].player == 1));

    let provider = SampleProvider::new(Arc::new(dataset.observations), moves);
    for i in 0..provider.len() {
        let example = provider.get(i).unwrap();
        // The labeled unit is still under its label after rotation.
        let cells: Vec<_> = example
            .labels
            .indexed_iter()
            .filter(|(_, &v)| v == 0)
            .map(|(pos, _)| pos)
            .collect();
        assert_eq!(cells.len(), 1);
        let (y, x) = cells[0];
        assert_eq!(example.spatial[[0, y, x]], 1.0, "sample {}", i);
        assert_eq!(example.spatial[[3, y, x]], 0.0, "sample {}", i);
    }
}

#[test]
fn max_episodes_keeps_the_last_files() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path());
    let options = CompileOptions {
        max_episodes: Some(2),
        ..quiet()
    };
    let dataset = compile_dataset(dir.path(), &options).unwrap();
    // 300.json (other team) and 400.json (broken).
    assert_eq!(dataset.stats.files, 2);
    assert_eq!(dataset.stats.episodes, 0);
    assert!(dataset.samples.is_empty());
}

#[test]
fn short_training_run_writes_a_loadable_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path());
    let dataset = compile_dataset(dir.path(), &quiet()).unwrap();
    let (train, val) = train_val_split(dataset.samples, 0.3, 42);
    assert_eq!(val.len(), 3);

    let cache = Arc::new(dataset.observations);
    let loaders = PhaseLoaders {
        train: BatchLoader::new(SampleProvider::new(Arc::clone(&cache), train), 4, true, 2)
            .unwrap(),
        val: BatchLoader::new(SampleProvider::new(cache, val), 4, false, 0).unwrap(),
    };
    let checkpoint = dir.path().join("policy_checkpoint.json");
    let options = RunOptions {
        checkpoint_path: checkpoint.clone(),
        progress: false,
    };
    let mut net = PixelLinearPolicy::new(NUM_LABEL_CLASSES, 42);
    let mut optimizer = AdamW::new(1e-2, 0.01);
    let scheduler = ExponentialLr::new(0.98);
    let mut rng = SmallRng::seed_from_u64(42);

    let session = fit(3, &mut net, &mut optimizer, &scheduler, &loaders, &options, &mut rng).unwrap();
    assert_eq!(session.history.len(), 3);
    assert!(session.history.iter().all(|r| r.train.samples == 7));
    assert!(session.history.iter().all(|r| r.val.samples == 3));

    let loaded = PixelLinearPolicy::load_checkpoint(&checkpoint).unwrap();
    assert_eq!(loaded.num_classes(), NUM_LABEL_CLASSES);
    assert_eq!(loaded.parameters().len(), net.parameters().len());
}

#[test]
fn compile_dataset_binary_exports_samples() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path());
    let export = dir.path().join("samples.jsonl");

    let output = Command::new(env!("CARGO_BIN_EXE_compile_dataset"))
        .arg("--episodes")
        .arg(dir.path())
        .arg("--output")
        .arg(&export)
        .arg("--no-progress")
        .output()
        .expect("failed to run compile_dataset");
    assert!(output.status.success());

    let stats: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["episodes"], 2);
    assert_eq!(stats["samples_per_channel"], json!([3, 3, 2, 2]));

    let text = std::fs::read_to_string(&export).unwrap();
    let records: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 10);
    assert_eq!(records[0]["key"], "100_0");
    assert_eq!(records[0]["rotation"], 0);
    assert_eq!(records[0]["cells"], json!([[4, 0, 0]]));
}

#[test]
fn train_binary_runs_from_flags() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path());
    let checkpoint = dir.path().join("best.json");

    let status = Command::new(env!("CARGO_BIN_EXE_lux-imitation"))
        .arg("--episodes")
        .arg(dir.path())
        .args(["--cycles", "2", "--batch-size", "4", "--val-fraction", "0.2"])
        .arg("--checkpoint")
        .arg(&checkpoint)
        .arg("--no-progress")
        .status()
        .expect("failed to run lux-imitation");
    assert!(status.success());
    assert!(checkpoint.exists());
}

#[test]
fn train_binary_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_lux-imitation"))
        .arg("--episodes")
        .arg(dir.path())
        .args(["--batch-size", "0", "--no-progress"])
        .status()
        .expect("failed to run lux-imitation");
    assert!(!status.success());
}
