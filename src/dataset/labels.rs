//! Direction-channel label grids.
//!
//! Each turn produces up to four 32x32 label grids, one per direction-channel.
//! A channel's grid is served rotated by its rotation index, and the move
//! written into it is the one that points toward the top edge (row 0) after
//! that rotation. This is why a west move lands in the E channel and an east
//! move in the W channel:
//!
//! | action          | channel(s) | label |
//! |-----------------|------------|-------|
//! | move north      | N          | 0     |
//! | move west       | E          | 0     |
//! | move south      | S          | 0     |
//! | move east       | W          | 0     |
//! | build city      | N W S E    | 1     |
//! | transfer/center | N W S E    | 2     |
//!
//! Channels are emitted in N, W, S, E order with rotation indices 0..3.

use ndarray::Array2;

use super::{LabelGrid, ObservationKey, Rotation, Sample, NO_LABEL};
use crate::replay::action::{ActionClass, DecodedAction, Direction};
use crate::replay::GRID_SIZE;

/// Label of the channel's own move direction.
pub const LABEL_MOVE: i8 = 0;
/// Label of a city build.
pub const LABEL_BUILD_CITY: i8 = 1;
/// Label of a transfer (or staying in the center).
pub const LABEL_TRANSFER: i8 = 2;

/// Number of classes the network predicts per cell.
pub const NUM_LABEL_CLASSES: usize = 3;

/// One of the four label grids built per turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectionChannel {
    North,
    West,
    South,
    East,
}

/// Channels in emission order.
pub const ALL_CHANNELS: [DirectionChannel; 4] = [
    DirectionChannel::North,
    DirectionChannel::West,
    DirectionChannel::South,
    DirectionChannel::East,
];

impl DirectionChannel {
    /// Position in emission order.
    pub const fn index(self) -> usize {
        match self {
            DirectionChannel::North => 0,
            DirectionChannel::West => 1,
            DirectionChannel::South => 2,
            DirectionChannel::East => 3,
        }
    }

    /// Rotation applied to this channel's samples.
    pub fn rotation(self) -> Rotation {
        match self {
            DirectionChannel::North => Rotation::IDENTITY,
            DirectionChannel::West => Rotation(1),
            DirectionChannel::South => Rotation(2),
            DirectionChannel::East => Rotation(3),
        }
    }

    /// Channel that records a move in `direction`.
    pub const fn for_move(direction: Direction) -> DirectionChannel {
        match direction {
            Direction::North => DirectionChannel::North,
            Direction::West => DirectionChannel::East,
            Direction::South => DirectionChannel::South,
            Direction::East => DirectionChannel::West,
        }
    }
}

/// The four label grids of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnLabels {
    grids: [LabelGrid; 4],
}

impl Default for TurnLabels {
    fn default() -> Self {
        TurnLabels::new()
    }
}

impl TurnLabels {
    /// Four grids with every cell unlabeled.
    pub fn new() -> Self {
        TurnLabels {
            grids: std::array::from_fn(|_| Array2::from_elem((GRID_SIZE, GRID_SIZE), NO_LABEL)),
        }
    }

    /// Writes one decoded action into the grids it belongs to. Actions
    /// without a class are ignored.
    pub fn record(&mut self, action: &DecodedAction) {
        let Some(class) = action.class else {
            return;
        };
        let cell = [action.pos.y, action.pos.x];
        match class {
            ActionClass::Move(direction) => {
                self.grids[DirectionChannel::for_move(direction).index()][cell] = LABEL_MOVE;
            }
            ActionClass::BuildCity => {
                for grid in self.grids.iter_mut() {
                    grid[cell] = LABEL_BUILD_CITY;
                }
            }
            ActionClass::TransferOrCenter => {
                for grid in self.grids.iter_mut() {
                    grid[cell] = LABEL_TRANSFER;
                }
            }
        }
    }

    pub fn grid(&self, channel: DirectionChannel) -> &LabelGrid {
        &self.grids[channel.index()]
    }

    /// True when the channel's grid has at least one labeled cell.
    pub fn has_labels(&self, channel: DirectionChannel) -> bool {
        self.grid(channel).iter().any(|&v| v != NO_LABEL)
    }

    /// Emits one sample per non-empty channel, in N, W, S, E order.
    pub fn into_samples(self, key: &ObservationKey) -> Vec<(DirectionChannel, Sample)> {
        let nonempty: Vec<bool> = ALL_CHANNELS.iter().map(|&c| self.has_labels(c)).collect();
        ALL_CHANNELS
            .into_iter()
            .zip(self.grids)
            .zip(nonempty)
            .filter(|(_, keep)| *keep)
            .map(|((channel, labels), _)| {
                (
                    channel,
                    Sample {
                        key: key.clone(),
                        labels,
                        rotation: channel.rotation(),
                    },
                )
            })
            .collect()
    }
}
