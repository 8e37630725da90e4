//! Reduced read-only projection for the cross-window broadcast
//! collaborator.
//!
//! A display window elsewhere renders positions and health from this view;
//! it never feeds events back into the engine.

use crate::creature::Faction;
use crate::geometry::Position;
use crate::scale::Scale;
use crate::snapshot::{EncounterSnapshot, Phase};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleMarker {
    pub id: String,
    pub name: String,
    pub faction: Faction,
    pub hp: i32,
    pub max_hp: i32,
    pub position: Option<Position>,
    pub facing: f32,
    pub operative: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatureMarker {
    pub id: String,
    pub name: String,
    pub faction: Faction,
    pub hp: i32,
    pub max_hp: i32,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplicationSummary {
    pub name: String,
    pub pending: usize,
}

/// What the secondary display gets to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastView {
    pub name: String,
    pub round: u32,
    pub phase: Phase,
    pub scale: Scale,
    pub vehicles: Vec<VehicleMarker>,
    pub creatures: Vec<CreatureMarker>,
    pub complication: Option<ComplicationSummary>,
}

/// Project the snapshot down to the broadcast shape.
#[must_use]
pub fn broadcast_view(snapshot: &EncounterSnapshot) -> BroadcastView {
    BroadcastView {
        name: snapshot.name.clone(),
        round: snapshot.round,
        phase: snapshot.phase,
        scale: snapshot.scale,
        vehicles: snapshot
            .vehicles
            .iter()
            .map(|vehicle| VehicleMarker {
                id: vehicle.id.clone(),
                name: vehicle.name.clone(),
                faction: vehicle.faction,
                hp: vehicle.hp,
                max_hp: vehicle.template.max_hp,
                position: vehicle.position,
                facing: vehicle.facing,
                operative: vehicle.operative,
            })
            .collect(),
        creatures: snapshot
            .creatures
            .iter()
            .map(|creature| CreatureMarker {
                id: creature.id.clone(),
                name: creature.name.clone(),
                faction: creature.faction(),
                hp: creature.hp,
                max_hp: creature.statblock.max_hp,
                position: creature.position,
            })
            .collect(),
        complication: snapshot.complication.as_ref().map(|active| {
            ComplicationSummary {
                name: active.entry.name.clone(),
                pending: active
                    .resolutions
                    .iter()
                    .filter(|resolution| {
                        resolution.status
                            == crate::complication::ResolutionStatus::Pending
                    })
                    .count(),
            }
        }),
    }
}
