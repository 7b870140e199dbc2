//! Hard filters and soft scoring for candidate rooms.
//!
//! A hard rule removes rooms that cannot host a demand at all. A soft rule
//! adds (or subtracts) points among the rooms that survive. Capacity and room
//! type are intrinsic hard rules: they are enforced even when the rule list
//! does not mention them.
//!
//! Scores are integers so that ties are exact and runs are reproducible:
//!
//! | Factor | Points |
//! |---|---|
//! | every room | `-(capacity - enrollment) × waste_per_seat` |
//! | `PreferRoom` match | `prefer_room × weight` |
//! | `PreferFloor` | `max(0, prefer_floor - floor_step × distance) × weight` |
//! | `PreferCharacteristic` present | `prefer_characteristic × weight` |
//! | `MinimizeWaste` | `-(capacity - enrollment) × minimize_waste × weight` |

use serde::{Deserialize, Serialize};

use crate::model::{Demand, DemandId, PersonId, Room, RoomId};

/// Which demands a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    #[default]
    All,
    Demand(DemandId),
    Professor(PersonId),
}

impl RuleScope {
    pub fn applies_to(&self, demand: &Demand) -> bool {
        match self {
            RuleScope::All => true,
            RuleScope::Demand(id) => demand.id == *id,
            RuleScope::Professor(p) => demand.professor == *p,
        }
    }
}

/// A filter that eliminates rooms outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HardKind {
    /// Room capacity must cover enrollment.
    Capacity,
    /// Room type must equal the demand's required type, when it has one.
    RoomType,
    RequireCharacteristic {
        #[serde(default)]
        scope: RuleScope,
        characteristic: String,
    },
    ExcludeRoom {
        #[serde(default)]
        scope: RuleScope,
        room: RoomId,
    },
}

/// A scoring factor among feasible rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoftKind {
    PreferRoom {
        #[serde(default)]
        scope: RuleScope,
        room: RoomId,
    },
    PreferFloor {
        #[serde(default)]
        scope: RuleScope,
        floor: i32,
    },
    PreferCharacteristic {
        #[serde(default)]
        scope: RuleScope,
        characteristic: String,
    },
    MinimizeWaste,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Hard(HardKind),
    Soft {
        factor: SoftKind,
        /// Rule priority; multiplies the factor's base points.
        #[serde(default = "default_weight")]
        weight: u32,
    },
}

fn default_weight() -> u32 {
    1
}

impl Rule {
    pub fn hard(kind: HardKind) -> Self {
        Rule::Hard(kind)
    }

    pub fn soft(factor: SoftKind, weight: u32) -> Self {
        Rule::Soft { factor, weight }
    }
}

/// Base points per soft factor. Loaded from the `[scoring]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringWeights {
    pub prefer_room: i64,
    pub prefer_floor: i64,
    pub floor_step: i64,
    pub prefer_characteristic: i64,
    pub waste_per_seat: i64,
    pub minimize_waste: i64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            prefer_room: 100,
            prefer_floor: 30,
            floor_step: 10,
            prefer_characteristic: 20,
            waste_per_seat: 1,
            minimize_waste: 2,
        }
    }
}

/// `true` if `room` passes the intrinsic checks and every hard rule.
pub fn admits(rules: &[Rule], demand: &Demand, room: &Room) -> bool {
    if !fits_capacity(demand, room) || !fits_type(demand, room) {
        return false;
    }
    rules.iter().all(|rule| match rule {
        Rule::Hard(kind) => hard_admits(kind, demand, room),
        Rule::Soft { .. } => true,
    })
}

fn fits_capacity(demand: &Demand, room: &Room) -> bool {
    room.capacity >= demand.enrollment
}

fn fits_type(demand: &Demand, room: &Room) -> bool {
    demand
        .room_type
        .as_deref()
        .is_none_or(|wanted| wanted == room.room_type)
}

fn hard_admits(kind: &HardKind, demand: &Demand, room: &Room) -> bool {
    match kind {
        HardKind::Capacity => fits_capacity(demand, room),
        HardKind::RoomType => fits_type(demand, room),
        HardKind::RequireCharacteristic {
            scope,
            characteristic,
        } => !scope.applies_to(demand) || room.has_characteristic(characteristic),
        HardKind::ExcludeRoom { scope, room: banned } => {
            !scope.applies_to(demand) || room.id != *banned
        }
    }
}

/// Rooms admitted by [`admits`], in input order.
pub fn hard_filter<'a>(rules: &[Rule], demand: &Demand, rooms: &'a [Room]) -> Vec<&'a Room> {
    rooms.iter().filter(|room| admits(rules, demand, room)).collect()
}

/// Total soft score of `room` for `demand`. Higher is better.
pub fn score(rules: &[Rule], weights: &ScoringWeights, demand: &Demand, room: &Room) -> i64 {
    let waste = i64::from(room.capacity) - i64::from(demand.enrollment);
    let mut total = -waste * weights.waste_per_seat;

    for rule in rules {
        let Rule::Soft { factor, weight } = rule else {
            continue;
        };
        let weight = i64::from(*weight);
        total += match factor {
            SoftKind::PreferRoom { scope, room: wanted } => {
                if scope.applies_to(demand) && room.id == *wanted {
                    weights.prefer_room * weight
                } else {
                    0
                }
            }
            SoftKind::PreferFloor { scope, floor } => {
                if scope.applies_to(demand) {
                    let distance = (i64::from(room.floor) - i64::from(*floor)).abs();
                    (weights.prefer_floor - weights.floor_step.saturating_mul(distance)).max(0) * weight
                } else {
                    0
                }
            }
            SoftKind::PreferCharacteristic {
                scope,
                characteristic,
            } => {
                if scope.applies_to(demand) && room.has_characteristic(characteristic) {
                    weights.prefer_characteristic * weight
                } else {
                    0
                }
            }
            SoftKind::MinimizeWaste => -waste * weights.minimize_waste * weight,
        };
    }

    total
}
