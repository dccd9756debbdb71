//! Replay file model and loading.
//!
//! A replay is one JSON document per episode. Only the fields the dataset
//! compiler needs are modelled; everything else in the file is ignored.
//! `steps[turn][agent]` holds each agent's status and submitted actions, and
//! agent 0's entry additionally carries the full shared observation.

pub mod action;
pub mod update;

use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use self::update::CellPos;

/// Side length of the fixed coordinate space every board is centered in.
pub const GRID_SIZE: usize = 32;

/// Status string of an agent that is expected to act this turn.
pub const STATUS_ACTIVE: &str = "ACTIVE";

/// Errors that can occur while loading or interpreting a replay.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse replay {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("turn {0} has no shared observation")]
    MissingObservation(usize),

    #[error("observation is missing field '{0}'")]
    MissingField(&'static str),

    #[error("board size {width}x{height} does not fit the 32x32 grid")]
    BoardSize { width: usize, height: usize },
}

/// Episode identifier; Kaggle writes it as a number, other tools as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EpisodeId {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpisodeId::Number(n) => write!(f, "{}", n),
            EpisodeId::Text(s) => f.write_str(s),
        }
    }
}

/// Episode metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayInfo {
    #[serde(rename = "EpisodeId")]
    pub episode_id: EpisodeId,
    #[serde(rename = "TeamNames", default)]
    pub team_names: Vec<String>,
}

/// One agent's entry for one turn.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentStep {
    #[serde(default)]
    pub action: Option<Vec<String>>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub observation: Option<RawObservation>,
}

impl AgentStep {
    /// Actions submitted this turn; a `null` action list is empty.
    pub fn actions(&self) -> &[String] {
        self.action.as_deref().unwrap_or(&[])
    }

    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

/// The observation as recorded, before trimming. Non-zero agents only carry
/// a few bookkeeping fields, so everything is optional here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawObservation {
    #[serde(default)]
    pub step: Option<u32>,
    #[serde(default)]
    pub updates: Option<Vec<String>>,
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub height: Option<usize>,
}

impl RawObservation {
    /// Keeps only what encoding needs, tagging it with the acting player.
    pub fn trim(&self, player: usize) -> Result<Observation, ReplayError> {
        let step = self.step.ok_or(ReplayError::MissingField("step"))?;
        let updates = self
            .updates
            .clone()
            .ok_or(ReplayError::MissingField("updates"))?;
        let width = self.width.ok_or(ReplayError::MissingField("width"))?;
        let height = self.height.ok_or(ReplayError::MissingField("height"))?;
        Observation::new(step, updates, player, width, height)
    }
}

/// A full replay document.
#[derive(Debug, Clone, Deserialize)]
pub struct Replay {
    pub info: ReplayInfo,
    #[serde(default)]
    pub rewards: Vec<Option<f64>>,
    #[serde(default)]
    pub steps: Vec<Vec<AgentStep>>,
}

impl Replay {
    /// Loads a replay from a JSON file.
    pub fn load(path: &Path) -> Result<Replay, ReplayError> {
        let file = File::open(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ReplayError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Index of the winning agent: highest reward, missing rewards count as 0,
    /// ties go to the lowest index. `None` when there are no rewards at all.
    pub fn winner_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, reward) in self.rewards.iter().enumerate() {
            let r = reward.unwrap_or(0.0);
            match best {
                Some((_, b)) if r <= b => {}
                _ => best = Some((i, r)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// Team name of an agent, if recorded.
    pub fn team_name(&self, agent: usize) -> Option<&str> {
        self.info.team_names.get(agent).map(String::as_str)
    }

    /// Agent `agent`'s entry for `turn`.
    pub fn agent_step(&self, turn: usize, agent: usize) -> Option<&AgentStep> {
        self.steps.get(turn)?.get(agent)
    }

    /// The shared observation of `turn` (always recorded on agent 0).
    pub fn observation(&self, turn: usize) -> Result<&RawObservation, ReplayError> {
        self.agent_step(turn, 0)
            .and_then(|s| s.observation.as_ref())
            .ok_or(ReplayError::MissingObservation(turn))
    }
}

/// A trimmed observation: one turn as seen by the acting player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub step: u32,
    pub updates: Vec<String>,
    pub player: usize,
    pub width: usize,
    pub height: usize,
}

impl Observation {
    /// Builds an observation, rejecting boards that do not fit the grid.
    pub fn new(
        step: u32,
        updates: Vec<String>,
        player: usize,
        width: usize,
        height: usize,
    ) -> Result<Observation, ReplayError> {
        if width == 0 || height == 0 || width > GRID_SIZE || height > GRID_SIZE {
            return Err(ReplayError::BoardSize { width, height });
        }
        Ok(Observation {
            step,
            updates,
            player,
            width,
            height,
        })
    }

    /// Padding that centers this board in the fixed grid.
    pub fn shift(&self) -> GridShift {
        GridShift {
            x: GRID_SIZE.saturating_sub(self.width) / 2,
            y: GRID_SIZE.saturating_sub(self.height) / 2,
        }
    }

    /// Board area, the normalizer for global counts.
    pub fn area(&self) -> f32 {
        (self.width * self.height) as f32
    }

    /// True when no resource record remains on the map.
    pub fn resources_depleted(&self) -> bool {
        !self.updates.iter().any(|u| is_resource_update(u))
    }
}

/// A cell of the fixed 32x32 grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GridPos {
    pub x: usize,
    pub y: usize,
}

/// Per-axis padding offset between board and grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShift {
    pub x: usize,
    pub y: usize,
}

impl GridShift {
    /// Maps a board cell into the grid, or `None` if it lands outside.
    pub fn apply(&self, pos: CellPos) -> Option<GridPos> {
        let x = pos.x.checked_add(self.x as i32)?;
        let y = pos.y.checked_add(self.y as i32)?;
        if x < 0 || y < 0 || x as usize >= GRID_SIZE || y as usize >= GRID_SIZE {
            return None;
        }
        Some(GridPos {
            x: x as usize,
            y: y as usize,
        })
    }
}

fn is_resource_update(update: &str) -> bool {
    update.split(' ').next() == Some("r")
}

/// Lists replay files in `dir`: `*.json`, skipping names containing
/// `output`, sorted by path.
pub fn discover_replays(dir: &Path) -> Result<Vec<PathBuf>, ReplayError> {
    let entries = fs::read_dir(dir).map_err(|source| ReplayError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ReplayError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.contains("output") {
            continue;
        }
        paths.push(path);
    }
    paths.sort();
    Ok(paths)
}
