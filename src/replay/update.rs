//! Update-string parsing.
//!
//! Each observation carries a list of space-separated update records with a
//! leading type tag:
//!
//!   u  <unit_type> <team> <unit_id> <x> <y> <cooldown> <wood> <coal> <uranium>
//!   ct <team> <city_id> <x> <y> [<cooldown>]
//!   c  <team> <city_id> <fuel> <light_upkeep>
//!   r  <wood|coal|uranium> <x> <y> <amount>
//!   rp <team> <points>
//!
//! Any other tag (road `ccd` records, for instance) carries nothing the
//! encoder uses and parses to `None`.

use std::str::FromStr;

use thiserror::Error;

/// Errors that can occur when parsing an update record with a known tag.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpdateError {
    #[error("'{tag}' record has {found} fields, expected at least {expected}")]
    MissingFields {
        tag: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("invalid {field} '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("unknown resource type '{0}'")]
    UnknownResource(String),
}

/// A board cell in replay coordinates (before centering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellPos {
    pub x: i32,
    pub y: i32,
}

/// Resource kinds present on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Wood,
    Coal,
    Uranium,
}

impl ResourceKind {
    /// Parses the resource name used in `r` records.
    pub fn from_name(name: &str) -> Option<ResourceKind> {
        match name {
            "wood" => Some(ResourceKind::Wood),
            "coal" => Some(ResourceKind::Coal),
            "uranium" => Some(ResourceKind::Uranium),
            _ => None,
        }
    }
}

/// Resources carried by a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cargo {
    pub wood: i64,
    pub coal: i64,
    pub uranium: i64,
}

impl Cargo {
    pub fn total(&self) -> i64 {
        self.wood + self.coal + self.uranium
    }
}

/// A decoded update record.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateRecord {
    Unit {
        kind: u8,
        team: usize,
        id: String,
        pos: CellPos,
        cooldown: f32,
        cargo: Cargo,
    },
    CityTile {
        team: usize,
        city_id: String,
        pos: CellPos,
        cooldown: f32,
    },
    City {
        team: usize,
        city_id: String,
        fuel: f32,
        light_upkeep: f32,
    },
    Resource {
        kind: ResourceKind,
        pos: CellPos,
        amount: i64,
    },
    ResearchPoints {
        team: usize,
        points: i64,
    },
}

/// Parses one update string.
///
/// Returns `Ok(None)` for tags this crate does not consume.
pub fn parse_update(line: &str) -> Result<Option<UpdateRecord>, UpdateError> {
    let tokens: Vec<&str> = line.split(' ').collect();

    let record = match tokens[0] {
        "u" => {
            require(&tokens, "u", 10)?;
            UpdateRecord::Unit {
                kind: field(tokens[1], "unit type")?,
                team: field(tokens[2], "team")?,
                id: tokens[3].to_string(),
                pos: pos(tokens[4], tokens[5])?,
                cooldown: field(tokens[6], "cooldown")?,
                cargo: Cargo {
                    wood: field(tokens[7], "wood")?,
                    coal: field(tokens[8], "coal")?,
                    uranium: field(tokens[9], "uranium")?,
                },
            }
        }
        "ct" => {
            require(&tokens, "ct", 5)?;
            let cooldown = match tokens.get(5) {
                Some(t) => field(t, "cooldown")?,
                None => 0.0,
            };
            UpdateRecord::CityTile {
                team: field(tokens[1], "team")?,
                city_id: tokens[2].to_string(),
                pos: pos(tokens[3], tokens[4])?,
                cooldown,
            }
        }
        "c" => {
            require(&tokens, "c", 5)?;
            UpdateRecord::City {
                team: field(tokens[1], "team")?,
                city_id: tokens[2].to_string(),
                fuel: field(tokens[3], "fuel")?,
                light_upkeep: field(tokens[4], "light upkeep")?,
            }
        }
        "r" => {
            require(&tokens, "r", 5)?;
            let kind = ResourceKind::from_name(tokens[1])
                .ok_or_else(|| UpdateError::UnknownResource(tokens[1].to_string()))?;
            // Amounts are written as floats in some replays; truncate like an int cast.
            let amount: f64 = field(tokens[4], "amount")?;
            UpdateRecord::Resource {
                kind,
                pos: pos(tokens[2], tokens[3])?,
                amount: amount.trunc() as i64,
            }
        }
        "rp" => {
            require(&tokens, "rp", 3)?;
            UpdateRecord::ResearchPoints {
                team: field(tokens[1], "team")?,
                points: field(tokens[2], "research points")?,
            }
        }
        _ => return Ok(None),
    };

    Ok(Some(record))
}

/// Parses every update of an observation, skipping malformed records.
pub fn parse_updates(updates: &[String]) -> Vec<UpdateRecord> {
    updates
        .iter()
        .filter_map(|line| match parse_update(line) {
            Ok(record) => record,
            Err(e) => {
                log::debug!("skipping update '{}': {}", line, e);
                None
            }
        })
        .collect()
}

fn require(tokens: &[&str], tag: &'static str, expected: usize) -> Result<(), UpdateError> {
    if tokens.len() < expected {
        return Err(UpdateError::MissingFields {
            tag,
            expected,
            found: tokens.len(),
        });
    }
    Ok(())
}

fn field<T: FromStr>(token: &str, name: &'static str) -> Result<T, UpdateError> {
    token.parse().map_err(|_| UpdateError::InvalidField {
        field: name,
        value: token.to_string(),
    })
}

fn pos(x: &str, y: &str) -> Result<CellPos, UpdateError> {
    Ok(CellPos {
        x: field(x, "x")?,
        y: field(y, "y")?,
    })
}
