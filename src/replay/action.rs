//! Action command decoding.
//!
//! Maps one textual unit command to a discrete action class and the acting
//! unit's position in the centered 32x32 grid:
//!
//!   m <unit> <n|w|s|e>   move          -> classes 0..3
//!   bcity <unit>         build city    -> class 4
//!   t <unit> ...         transfer      -> class 5 (also stands in for "center")
//!
//! Every other command (city tile actions, pillage, malformed moves) has no
//! class and produces no label.

use std::collections::HashMap;

use super::update::{parse_update, UpdateRecord};
use super::{GridPos, Observation};

/// Compass direction of a move, in label-class order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    West,
    South,
    East,
}

impl Direction {
    /// Parses the single-letter direction used in move commands.
    pub fn from_code(code: &str) -> Option<Direction> {
        match code {
            "n" => Some(Direction::North),
            "w" => Some(Direction::West),
            "s" => Some(Direction::South),
            "e" => Some(Direction::East),
            _ => None,
        }
    }
}

/// Discrete action classes a unit command can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    Move(Direction),
    BuildCity,
    TransferOrCenter,
}

impl ActionClass {
    /// Class index: moves N/W/S/E are 0..3, build city 4, transfer 5.
    pub const fn index(self) -> usize {
        match self {
            ActionClass::Move(Direction::North) => 0,
            ActionClass::Move(Direction::West) => 1,
            ActionClass::Move(Direction::South) => 2,
            ActionClass::Move(Direction::East) => 3,
            ActionClass::BuildCity => 4,
            ActionClass::TransferOrCenter => 5,
        }
    }
}

/// The result of decoding one command against an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAction {
    pub unit_id: String,
    pub class: Option<ActionClass>,
    pub pos: GridPos,
}

/// Splits a command into its unit id and class without looking at the board.
pub fn classify(command: &str) -> (&str, Option<ActionClass>) {
    let tokens: Vec<&str> = command.split(' ').collect();
    let unit_id = tokens.get(1).copied().unwrap_or("");
    if tokens.len() < 2 {
        return (unit_id, None);
    }

    let class = match tokens[0] {
        "m" => tokens
            .get(2)
            .and_then(|d| Direction::from_code(d))
            .map(ActionClass::Move),
        "bcity" => Some(ActionClass::BuildCity),
        "t" => Some(ActionClass::TransferOrCenter),
        _ => None,
    };
    (unit_id, class)
}

/// Grid positions of every unit in an observation, keyed by unit id.
///
/// Building this once per turn avoids rescanning the updates per command.
#[derive(Debug, Clone, Default)]
pub struct UnitPositions {
    positions: HashMap<String, GridPos>,
}

impl UnitPositions {
    pub fn new(obs: &Observation) -> Self {
        let shift = obs.shift();
        let mut positions = HashMap::new();
        for line in obs.updates.iter().filter(|u| u.starts_with("u ")) {
            let record = match parse_update(line) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    log::debug!("skipping unit update '{}': {}", line, e);
                    continue;
                }
            };
            if let UpdateRecord::Unit { id, pos, .. } = record {
                // Later records for the same id win.
                if let Some(grid_pos) = shift.apply(pos) {
                    positions.insert(id, grid_pos);
                }
            }
        }
        UnitPositions { positions }
    }

    /// Position of a unit, if it is on the board.
    pub fn get(&self, unit_id: &str) -> Option<GridPos> {
        self.positions.get(unit_id).copied()
    }

    /// Decodes a command. Units missing from the observation (already
    /// destroyed, typically) fall back to the grid origin.
    pub fn decode(&self, command: &str) -> DecodedAction {
        let (unit_id, class) = classify(command);
        DecodedAction {
            unit_id: unit_id.to_string(),
            class,
            pos: self.get(unit_id).unwrap_or_default(),
        }
    }
}

/// Decodes a single command against an observation.
pub fn decode_action(command: &str, obs: &Observation) -> DecodedAction {
    UnitPositions::new(obs).decode(command)
}
