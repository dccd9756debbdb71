//! Replay -> dataset compilation.
//!
//! For each replay won by the target team, every turn on which the winner
//! was ACTIVE contributes its observation (the input) and the winner's
//! actions recorded on the following turn (the label source). An episode
//! stops at the first such turn with no resources left on the map.

use std::path::Path;

use log::{debug, info, warn};
use serde::Serialize;

use super::labels::{DirectionChannel, TurnLabels};
use super::{DatasetError, ObservationCache, ObservationKey, Sample};
use crate::progress::progress_bar;
use crate::replay::action::UnitPositions;
use crate::replay::{discover_replays, AgentStep, Observation, Replay, ReplayError};

/// Team whose wins are imitated unless configured otherwise.
pub const DEFAULT_TEAM: &str = "Toad Brigade";

/// Options for `compile_dataset`.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Only episodes won by this team are used.
    pub team_name: String,
    /// Keep only the last N replay files (in path order).
    pub max_episodes: Option<usize>,
    /// Show a progress bar while scanning.
    pub progress: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            team_name: DEFAULT_TEAM.to_string(),
            max_episodes: None,
            progress: true,
        }
    }
}

/// Counters collected while compiling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompileStats {
    pub files: usize,
    pub skipped_files: usize,
    pub other_team: usize,
    pub episodes: usize,
    pub early_stops: usize,
    pub observations: usize,
    /// Samples emitted per direction-channel, in N, W, S, E order.
    pub samples_per_channel: [usize; 4],
}

impl CompileStats {
    pub fn samples(&self) -> usize {
        self.samples_per_channel.iter().sum()
    }
}

/// Everything one episode contributes.
#[derive(Debug, Clone, Default)]
pub struct EpisodeSamples {
    pub observations: Vec<(ObservationKey, Observation)>,
    pub samples: Vec<(DirectionChannel, Sample)>,
    /// True when the episode was cut short by resource depletion.
    pub stopped_early: bool,
}

/// The compiled dataset: samples plus the observations they reference.
#[derive(Debug, Clone, Default)]
pub struct CompiledDataset {
    pub observations: ObservationCache,
    pub samples: Vec<Sample>,
    pub stats: CompileStats,
}

/// Compiles one replay. Returns `Ok(None)` when the episode was not won by
/// `team_name`.
pub fn compile_episode(
    replay: &Replay,
    team_name: &str,
) -> Result<Option<EpisodeSamples>, ReplayError> {
    let Some(winner) = replay.winner_index() else {
        return Ok(None);
    };
    if replay.team_name(winner) != Some(team_name) {
        return Ok(None);
    }

    let episode_id = replay.info.episode_id.to_string();
    let mut episode = EpisodeSamples::default();

    for turn in 0..replay.steps.len().saturating_sub(1) {
        let active = replay
            .agent_step(turn, winner)
            .is_some_and(AgentStep::is_active);
        if !active {
            continue;
        }

        let obs = replay.observation(turn)?.trim(winner)?;
        if obs.resources_depleted() {
            episode.stopped_early = true;
            break;
        }

        let actions = replay
            .agent_step(turn + 1, winner)
            .map(AgentStep::actions)
            .unwrap_or_default();
        let key = ObservationKey::new(episode_id.as_str(), turn);

        let positions = UnitPositions::new(&obs);
        let mut labels = TurnLabels::new();
        for command in actions {
            labels.record(&positions.decode(command));
        }

        episode.samples.extend(labels.into_samples(&key));
        episode.observations.push((key, obs));
    }

    Ok(Some(episode))
}

/// Compiles every replay in `dir`.
///
/// Files that cannot be read or interpreted are skipped with a warning; only
/// failing to list the directory is an error.
pub fn compile_dataset(dir: &Path, options: &CompileOptions) -> Result<CompiledDataset, DatasetError> {
    let mut paths = discover_replays(dir)?;
    if let Some(n) = options.max_episodes {
        let skip = paths.len().saturating_sub(n);
        paths.drain(..skip);
    }
    info!("Compiling {} replay(s) from {}", paths.len(), dir.display());

    let mut dataset = CompiledDataset::default();
    let pb = progress_bar(paths.len() as u64, options.progress);

    for path in &paths {
        dataset.stats.files += 1;
        let outcome = Replay::load(path).and_then(|r| compile_episode(&r, &options.team_name));
        pb.inc(1);

        let episode = match outcome {
            Ok(Some(episode)) => episode,
            Ok(None) => {
                debug!("{}: not won by '{}'", path.display(), options.team_name);
                dataset.stats.other_team += 1;
                continue;
            }
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                dataset.stats.skipped_files += 1;
                continue;
            }
        };

        debug!(
            "{}: {} observations, {} samples",
            path.display(),
            episode.observations.len(),
            episode.samples.len()
        );
        dataset.stats.episodes += 1;
        if episode.stopped_early {
            dataset.stats.early_stops += 1;
        }
        dataset.stats.observations += episode.observations.len();
        dataset.observations.extend(episode.observations);
        for (channel, sample) in episode.samples {
            dataset.stats.samples_per_channel[channel.index()] += 1;
            dataset.samples.push(sample);
        }
    }
    pb.finish_and_clear();

    info!(
        "Compiled {} observations and {} samples from {} episode(s) ({} other-team, {} skipped)",
        dataset.stats.observations,
        dataset.stats.samples(),
        dataset.stats.episodes,
        dataset.stats.other_team,
        dataset.stats.skipped_files
    );
    Ok(dataset)
}
