//! The event vocabulary accepted by the encounter state machine.
//!
//! Events are plain data. The engine treats every recognized event as a
//! total operation: validation failures and unknown identities leave the
//! snapshot unchanged rather than erroring, because the issuing layer is
//! expected to pre-validate.

use crate::creature::{Creature, Faction};
use crate::geometry::{ElevationZone, Position};
use crate::scale::Scale;
use crate::template::VehicleTemplate;
use crate::vehicle::SpeedModifier;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncounterEvent {
    // Setup -----------------------------------------------------------------
    AddVehicle {
        id: String,
        name: String,
        faction: Faction,
        template: VehicleTemplate,
        #[serde(default)]
        position: Option<Position>,
        #[serde(default)]
        facing: f32,
    },
    RemoveVehicle {
        vehicle_id: String,
    },
    AddCreature {
        creature: Creature,
    },
    RemoveCreature {
        creature_id: String,
    },
    AssignCrew {
        creature_id: String,
        vehicle_id: String,
        station_index: usize,
    },
    UnassignCrew {
        creature_id: String,
    },
    SetInitiative {
        creature_id: String,
        value: i32,
    },
    SetScale {
        scale: Scale,
    },
    MoveVehicle {
        vehicle_id: String,
        position: Position,
    },
    SetFacing {
        vehicle_id: String,
        facing: f32,
    },
    MoveCreature {
        creature_id: String,
        position: Position,
    },
    AddElevationZone {
        zone: ElevationZone,
    },
    RemoveElevationZone {
        zone_id: String,
    },
    RenameEncounter {
        name: String,
    },

    // Turn flow -------------------------------------------------------------
    StartCombat,
    NextTurn,
    NextRound,
    EndCombat,
    SetTurn {
        index: usize,
    },

    // Damage & mishaps ------------------------------------------------------
    DamageVehicle {
        vehicle_id: String,
        amount: i32,
    },
    RepairVehicleHull {
        vehicle_id: String,
        amount: i32,
    },
    SetVehicleSpeed {
        vehicle_id: String,
        value: i32,
    },
    DamageCreature {
        creature_id: String,
        amount: i32,
    },
    HealCreature {
        creature_id: String,
        amount: i32,
    },
    GrantTempHp {
        creature_id: String,
        amount: i32,
    },
    /// Operator-triggered mishap roll, e.g. after an ability check failed
    /// its target by five or more.
    RollMishap {
        vehicle_id: String,
    },
    RepairMishap {
        vehicle_id: String,
        mishap_id: String,
        check_total: i32,
    },
    /// Narrative removal, for outcomes without a repair check.
    ClearMishap {
        vehicle_id: String,
        mishap_id: String,
    },
    AddSpeedModifier {
        vehicle_id: String,
        modifier: SpeedModifier,
    },
    ClearSpeedModifiers {
        vehicle_id: String,
    },

    // Complications ---------------------------------------------------------
    RollComplication,
    ResolveComplicationSave {
        vehicle_id: String,
        total: i32,
    },
    FailComplication {
        vehicle_id: String,
    },
    SkipComplication {
        vehicle_id: String,
    },
    DismissComplication,
}
