//! Observation -> tensor encoding for the policy network.
//!
//! Produces a [14, 32, 32] spatial tensor indexed `[channel, y, x]` and a
//! [15, 4, 4] global tensor whose channels are constant scalars broadcast
//! over the 4x4 extent (the resolution the network merges them at).
//!
//! Spatial channels ("own" is the observation's acting player):
//!   [0:3]   own unit: [present, cooldown / 6, cargo / 100]
//!   [3:6]   opponent unit: [present, cooldown / 6, cargo / 100]
//!   [6:8]   own citytile: [present, city survival factor]
//!   [8:10]  opponent citytile: [present, city survival factor]
//!   [10:13] resource amount / 800: [wood, coal, uranium]
//!   [13]    playable map mask
//!
//! Global channels:
//!   [0:5]   own: [units, research, cities, citytiles, mean survival]
//!   [5:10]  opponent: same layout
//!   [10:13] resource cells per area: [wood, coal, uranium]
//!   [13]    day/night phase
//!   [14]    turn progress
//!
//! Counts are divided by the board area. The survival factor of a city is
//! `min(fuel / light_upkeep, 20) / 20`, i.e. the fraction of 20 nights it can
//! keep its tiles lit.

use std::collections::HashMap;

use ndarray::{s, Array3, Axis};

use crate::replay::update::{parse_updates, ResourceKind, UpdateRecord};
use crate::replay::{Observation, GRID_SIZE};

/// Number of spatial feature channels.
pub const SPATIAL_CHANNELS: usize = 14;

/// Number of global feature channels.
pub const GLOBAL_CHANNELS: usize = 15;

/// Side length of the global tensor's broadcast extent.
pub const GLOBAL_SIZE: usize = 4;

/// Spatial channel offsets. Opponent features sit at a fixed offset from
/// their own-side counterparts.
const CH_UNIT: usize = 0;
const CH_UNIT_COOLDOWN: usize = 1;
const CH_UNIT_CARGO: usize = 2;
const CH_OPP_UNIT_OFFSET: usize = 3;
const CH_CITYTILE: usize = 6;
const CH_CITY_SURVIVAL: usize = 7;
const CH_OPP_CITY_OFFSET: usize = 2;
const CH_RESOURCE: usize = 10;
const CH_MAP_MASK: usize = 13;

/// Global channel offsets.
const G_UNITS: usize = 0;
const G_RESEARCH: usize = 1;
const G_CITIES: usize = 2;
const G_CITYTILES: usize = 3;
const G_SURVIVAL: usize = 4;
const G_OPP_OFFSET: usize = 5;
const G_RESOURCE: usize = 10;
const G_DAY_NIGHT: usize = 13;
const G_TURN: usize = 14;

/// Normalizers.
const COOLDOWN_SCALE: f32 = 6.0;
const CARGO_SCALE: f32 = 100.0;
const RESOURCE_SCALE: f32 = 800.0;
const SURVIVAL_NIGHTS: f32 = 20.0;
const RESEARCH_CAP: i64 = 200;
const DAY_NIGHT_CYCLE: u32 = 40;
const MAX_TURNS: f32 = 360.0;

/// Encoded network inputs for one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    /// [SPATIAL_CHANNELS, GRID_SIZE, GRID_SIZE]
    pub spatial: Array3<f32>,
    /// [GLOBAL_CHANNELS, GLOBAL_SIZE, GLOBAL_SIZE]
    pub global: Array3<f32>,
}

/// Which side of the board a team is on, relative to the acting player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Own,
    Opponent,
}

impl Side {
    fn of(team: usize, obs: &Observation) -> Side {
        if team == obs.player {
            Side::Own
        } else {
            Side::Opponent
        }
    }

    fn index(self) -> usize {
        match self {
            Side::Own => 0,
            Side::Opponent => 1,
        }
    }
}

/// Running per-side counters.
#[derive(Debug, Default)]
struct SideStats {
    units: usize,
    cities: usize,
    citytiles: usize,
    research: f32,
    survival: HashMap<String, f32>,
}

impl SideStats {
    fn mean_survival(&self) -> f32 {
        if self.survival.is_empty() {
            return 0.0;
        }
        self.survival.values().sum::<f32>() / self.survival.len() as f32
    }
}

fn resource_channel(kind: ResourceKind) -> usize {
    match kind {
        ResourceKind::Wood => CH_RESOURCE,
        ResourceKind::Coal => CH_RESOURCE + 1,
        ResourceKind::Uranium => CH_RESOURCE + 2,
    }
}

/// Fraction of the survival horizon a city's fuel covers.
fn survival_factor(fuel: f32, light_upkeep: f32) -> f32 {
    if light_upkeep <= 0.0 {
        return 1.0;
    }
    (fuel / light_upkeep).min(SURVIVAL_NIGHTS) / SURVIVAL_NIGHTS
}

/// Encodes an observation into spatial and global tensors.
///
/// Cities are resolved in two passes: every `City` record is read before any
/// `CityTile`, so tiles may precede their city in the update list. A tile
/// whose city never appears gets a survival factor of 0. Malformed records
/// and records outside the grid are skipped. Off-grid units, city tiles and
/// resources are dropped from the global counts too; `City` records carry no
/// position and are always counted.
pub fn encode_observation(obs: &Observation) -> EncodedFrame {
    let mut spatial = Array3::<f32>::zeros((SPATIAL_CHANNELS, GRID_SIZE, GRID_SIZE));
    let mut global = Array3::<f32>::zeros((GLOBAL_CHANNELS, GLOBAL_SIZE, GLOBAL_SIZE));

    let shift = obs.shift();
    let records = parse_updates(&obs.updates);
    let mut sides = [SideStats::default(), SideStats::default()];
    let mut resource_cells = [0usize; 3];

    // Pass 1: city fuel.
    for record in &records {
        if let UpdateRecord::City {
            team,
            city_id,
            fuel,
            light_upkeep,
        } = record
        {
            let stats = &mut sides[Side::of(*team, obs).index()];
            stats.cities += 1;
            stats
                .survival
                .insert(city_id.clone(), survival_factor(*fuel, *light_upkeep));
        }
    }

    // Pass 2: everything placed on the grid.
    for record in &records {
        match record {
            UpdateRecord::Unit {
                team,
                pos,
                cooldown,
                cargo,
                ..
            } => {
                let Some(p) = shift.apply(*pos) else {
                    continue;
                };
                let side = Side::of(*team, obs);
                let base = CH_UNIT + side.index() * CH_OPP_UNIT_OFFSET;
                spatial[[base, p.y, p.x]] = 1.0;
                spatial[[base + CH_UNIT_COOLDOWN, p.y, p.x]] = cooldown / COOLDOWN_SCALE;
                spatial[[base + CH_UNIT_CARGO, p.y, p.x]] = cargo.total() as f32 / CARGO_SCALE;
                sides[side.index()].units += 1;
            }
            UpdateRecord::CityTile {
                team, city_id, pos, ..
            } => {
                let Some(p) = shift.apply(*pos) else {
                    continue;
                };
                let side = Side::of(*team, obs);
                let stats = &mut sides[side.index()];
                let base = CH_CITYTILE + side.index() * CH_OPP_CITY_OFFSET;
                spatial[[base, p.y, p.x]] = 1.0;
                spatial[[base + (CH_CITY_SURVIVAL - CH_CITYTILE), p.y, p.x]] =
                    stats.survival.get(city_id).copied().unwrap_or(0.0);
                stats.citytiles += 1;
            }
            UpdateRecord::Resource { kind, pos, amount } => {
                let Some(p) = shift.apply(*pos) else {
                    continue;
                };
                let ch = resource_channel(*kind);
                spatial[[ch, p.y, p.x]] = *amount as f32 / RESOURCE_SCALE;
                resource_cells[ch - CH_RESOURCE] += 1;
            }
            UpdateRecord::ResearchPoints { team, points } => {
                sides[Side::of(*team, obs).index()].research =
                    (*points).clamp(0, RESEARCH_CAP) as f32 / RESEARCH_CAP as f32;
            }
            UpdateRecord::City { .. } => {}
        }
    }

    spatial
        .slice_mut(s![
            CH_MAP_MASK,
            shift.y..GRID_SIZE - shift.y,
            shift.x..GRID_SIZE - shift.x
        ])
        .fill(1.0);

    let area = obs.area();
    let mut fill = |channel: usize, value: f32| {
        global.index_axis_mut(Axis(0), channel).fill(value);
    };
    for (i, stats) in sides.iter().enumerate() {
        let base = i * G_OPP_OFFSET;
        fill(base + G_UNITS, stats.units as f32 / area);
        fill(base + G_RESEARCH, stats.research);
        fill(base + G_CITIES, stats.cities as f32 / area);
        fill(base + G_CITYTILES, stats.citytiles as f32 / area);
        fill(base + G_SURVIVAL, stats.mean_survival());
    }
    for (i, &count) in resource_cells.iter().enumerate() {
        fill(G_RESOURCE + i, count as f32 / area);
    }
    fill(
        G_DAY_NIGHT,
        (obs.step % DAY_NIGHT_CYCLE) as f32 / DAY_NIGHT_CYCLE as f32,
    );
    fill(G_TURN, obs.step as f32 / MAX_TURNS);

    EncodedFrame { spatial, global }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(step: u32, size: usize, player: usize, updates: &[&str]) -> Observation {
        Observation::new(
            step,
            updates.iter().map(|s| s.to_string()).collect(),
            player,
            size,
            size,
        )
        .unwrap()
    }

    fn global_value(frame: &EncodedFrame, channel: usize) -> f32 {
        let plane = frame.global.index_axis(Axis(0), channel);
        let first = plane[[0, 0]];
        assert!(
            plane.iter().all(|&v| v == first),
            "global channel {} is not constant",
            channel
        );
        first
    }

    #[test]
    fn tensor_shapes() {
        let frame = encode_observation(&obs(0, 12, 0, &[]));
        assert_eq!(frame.spatial.dim(), (SPATIAL_CHANNELS, GRID_SIZE, GRID_SIZE));
        assert_eq!(frame.global.dim(), (GLOBAL_CHANNELS, GLOBAL_SIZE, GLOBAL_SIZE));
    }

    #[test]
    fn map_mask_covers_exactly_the_board() {
        for size in [12, 16, 24, 32, 13] {
            let frame = encode_observation(&obs(0, size, 0, &[]));
            let shift = (GRID_SIZE - size) / 2;
            for y in 0..GRID_SIZE {
                for x in 0..GRID_SIZE {
                    let inside = (shift..GRID_SIZE - shift).contains(&y)
                        && (shift..GRID_SIZE - shift).contains(&x);
                    let expected = if inside { 1.0 } else { 0.0 };
                    assert_eq!(
                        frame.spatial[[CH_MAP_MASK, y, x]],
                        expected,
                        "size {} at ({}, {})",
                        size,
                        x,
                        y
                    );
                }
            }
        }
    }

    #[test]
    fn units_split_by_side() {
        // 16x16 board: shift 8.
        let o = obs(
            0,
            16,
            1,
            &["u 0 1 u_1 2 3 3 40 10 0", "u 0 0 u_2 5 6 6 0 0 100"],
        );
        let frame = encode_observation(&o);

        // Player 1 owns u_1 at grid (10, 11).
        assert_eq!(frame.spatial[[CH_UNIT, 11, 10]], 1.0);
        assert_eq!(frame.spatial[[CH_UNIT_COOLDOWN, 11, 10]], 0.5);
        assert_eq!(frame.spatial[[CH_UNIT_CARGO, 11, 10]], 0.5);
        assert_eq!(frame.spatial[[CH_OPP_UNIT_OFFSET, 11, 10]], 0.0);

        // Opponent u_2 at grid (13, 14).
        assert_eq!(frame.spatial[[CH_UNIT + CH_OPP_UNIT_OFFSET, 14, 13]], 1.0);
        assert_eq!(frame.spatial[[CH_UNIT_COOLDOWN + CH_OPP_UNIT_OFFSET, 14, 13]], 1.0);
        assert_eq!(frame.spatial[[CH_UNIT_CARGO + CH_OPP_UNIT_OFFSET, 14, 13]], 1.0);

        assert_eq!(global_value(&frame, G_UNITS), 1.0 / 256.0);
        assert_eq!(global_value(&frame, G_UNITS + G_OPP_OFFSET), 1.0 / 256.0);
    }

    #[test]
    fn city_tiles_resolve_cities_listed_later() {
        let o = obs(
            0,
            32,
            0,
            &[
                "ct 0 c_1 4 4 0",
                "ct 0 c_1 4 5 0",
                "ct 1 c_2 9 9 0",
                "c 0 c_1 100 10",
                "c 1 c_2 500 10",
            ],
        );
        let frame = encode_observation(&o);

        assert_eq!(frame.spatial[[CH_CITYTILE, 4, 4]], 1.0);
        assert_eq!(frame.spatial[[CH_CITY_SURVIVAL, 4, 4]], 0.5);
        assert_eq!(frame.spatial[[CH_CITY_SURVIVAL, 5, 4]], 0.5);
        assert_eq!(frame.spatial[[CH_CITYTILE + CH_OPP_CITY_OFFSET, 9, 9]], 1.0);
        // 50 nights of fuel saturates at the 20-night horizon.
        assert_eq!(frame.spatial[[CH_CITY_SURVIVAL + CH_OPP_CITY_OFFSET, 9, 9]], 1.0);

        let area = 1024.0;
        assert_eq!(global_value(&frame, G_CITIES), 1.0 / area);
        assert_eq!(global_value(&frame, G_CITYTILES), 2.0 / area);
        assert_eq!(global_value(&frame, G_SURVIVAL), 0.5);
        assert_eq!(global_value(&frame, G_SURVIVAL + G_OPP_OFFSET), 1.0);
    }

    #[test]
    fn record_order_does_not_change_encoding() {
        let tiles_first = obs(3, 24, 0, &["ct 0 c_1 1 1 0", "c 0 c_1 30 10", "rp 0 20"]);
        let cities_first = obs(3, 24, 0, &["c 0 c_1 30 10", "rp 0 20", "ct 0 c_1 1 1 0"]);
        assert_eq!(
            encode_observation(&tiles_first),
            encode_observation(&cities_first)
        );
    }

    #[test]
    fn tile_without_city_has_zero_survival() {
        let frame = encode_observation(&obs(0, 32, 0, &["ct 0 c_9 2 2 0"]));
        assert_eq!(frame.spatial[[CH_CITYTILE, 2, 2]], 1.0);
        assert_eq!(frame.spatial[[CH_CITY_SURVIVAL, 2, 2]], 0.0);
        assert_eq!(global_value(&frame, G_SURVIVAL), 0.0);
    }

    #[test]
    fn zero_upkeep_city_is_fully_fueled() {
        assert_eq!(survival_factor(10.0, 0.0), 1.0);
        assert_eq!(survival_factor(0.0, 0.0), 1.0);
        assert_eq!(survival_factor(0.0, 23.0), 0.0);
    }

    #[test]
    fn resources_and_counts() {
        let o = obs(
            0,
            12,
            0,
            &[
                "r wood 0 0 800",
                "r wood 1 0 400",
                "r coal 2 0 425.7",
                "r uranium 3 0 80",
            ],
        );
        let frame = encode_observation(&o);
        assert_eq!(frame.spatial[[CH_RESOURCE, 10, 10]], 1.0);
        assert_eq!(frame.spatial[[CH_RESOURCE, 10, 11]], 0.5);
        assert_eq!(frame.spatial[[CH_RESOURCE + 1, 10, 12]], 425.0 / 800.0);
        assert_eq!(frame.spatial[[CH_RESOURCE + 2, 10, 13]], 0.1);

        assert_eq!(global_value(&frame, G_RESOURCE), 2.0 / 144.0);
        assert_eq!(global_value(&frame, G_RESOURCE + 1), 1.0 / 144.0);
        assert_eq!(global_value(&frame, G_RESOURCE + 2), 1.0 / 144.0);
    }

    #[test]
    fn research_is_clamped() {
        let frame = encode_observation(&obs(0, 12, 0, &["rp 0 250", "rp 1 50"]));
        assert_eq!(global_value(&frame, G_RESEARCH), 1.0);
        assert_eq!(global_value(&frame, G_RESEARCH + G_OPP_OFFSET), 0.25);

        let frame = encode_observation(&obs(0, 12, 0, &["rp 0 -4"]));
        assert_eq!(global_value(&frame, G_RESEARCH), 0.0);
    }

    #[test]
    fn day_night_and_turn_progress() {
        let frame = encode_observation(&obs(90, 12, 0, &[]));
        assert_eq!(global_value(&frame, G_DAY_NIGHT), 0.25);
        assert_eq!(global_value(&frame, G_TURN), 0.25);

        let frame = encode_observation(&obs(0, 12, 0, &[]));
        assert_eq!(global_value(&frame, G_DAY_NIGHT), 0.0);
        assert_eq!(global_value(&frame, G_TURN), 0.0);
    }

    #[test]
    fn off_grid_and_malformed_records_are_skipped() {
        let o = obs(
            0,
            12,
            0,
            &["u 0 0 u_1 40 1 0 0 0 0", "u 0 0 u_2 1 1 x 0 0 0", "ccd 1 1 2"],
        );
        let frame = encode_observation(&o);
        assert_eq!(frame.spatial.index_axis(Axis(0), CH_UNIT).sum(), 0.0);
        assert_eq!(global_value(&frame, G_UNITS), 0.0);
    }

    #[test]
    fn off_grid_records_leave_global_counts() {
        let o = obs(
            0,
            12,
            0,
            &[
                "c 0 c_1 100 10",
                "ct 0 c_1 1 1 0",
                "ct 0 c_1 40 1 0",
                "r wood 2 2 100",
                "r wood 2 40 100",
            ],
        );
        let frame = encode_observation(&o);
        assert_eq!(global_value(&frame, G_CITIES), 1.0 / 144.0);
        assert_eq!(global_value(&frame, G_CITYTILES), 1.0 / 144.0);
        assert_eq!(global_value(&frame, G_RESOURCE), 1.0 / 144.0);
    }

    #[test]
    fn global_counts_stay_in_unit_range() {
        let mut updates = Vec::new();
        for y in 0..12 {
            for x in 0..12 {
                updates.push(format!("r wood {} {} 100", x, y));
                updates.push(format!("ct 0 c_1 {} {} 0", x, y));
            }
        }
        updates.push("c 0 c_1 0 10".to_string());
        let refs: Vec<&str> = updates.iter().map(String::as_str).collect();
        let frame = encode_observation(&obs(0, 12, 0, &refs));
        for channel in [G_CITIES, G_CITYTILES, G_RESOURCE] {
            let v = global_value(&frame, channel);
            assert!((0.0..=1.0).contains(&v), "channel {} = {}", channel, v);
        }
        assert_eq!(global_value(&frame, G_CITYTILES), 1.0);
    }
}
