//! Imitation learning from Lux AI replays.
//!
//! Turns recorded episodes into per-cell action-label grids over encoded
//! board tensors and trains a policy network to reproduce the winning
//! team's actions.

pub mod config;
pub mod dataset;
pub mod nn;
mod progress;
pub mod replay;
pub mod train;
