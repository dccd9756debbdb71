//! Neural network feature encoding.
//!
//! Converts a trimmed `Observation` into the [14, 32, 32] spatial and
//! [15, 4, 4] global tensors the policy network consumes.

pub mod encoding;
