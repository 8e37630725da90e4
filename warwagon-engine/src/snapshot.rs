//! The encounter snapshot: the aggregate root the state machine folds
//! events into.
//!
//! Snapshots are plain serializable values. Callers never mutate them
//! directly; every change flows through [`crate::engine::apply`], which
//! clones the prior snapshot and returns a fresh one, so concurrent readers
//! never observe a half-updated state.

use crate::complication::ActiveComplication;
use crate::creature::Creature;
use crate::crew::{self, CrewAssignment};
use crate::geometry::{self, ElevationZone, GeometryConfig, SightLine};
use crate::scale::Scale;
use crate::template::{Arc, CoverClass};
use crate::vehicle::Vehicle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Encounter lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Setup,
    Combat,
    Ended,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Combat => "combat",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a combatant in the turn order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombatantRef {
    Vehicle(String),
    Creature(String),
}

/// One slot in the turn order. A vehicle's turn represents all of its crew
/// acting together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnEntry {
    pub combatant: CombatantRef,
    pub name: String,
    pub initiative: i32,
}

/// Category tag on a combat-log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    #[default]
    Info,
    TurnFlow,
    Damage,
    Destruction,
    Mishap,
    Complication,
}

/// One line of the append-only combat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub round: u32,
    #[serde(default)]
    pub kind: LogKind,
    pub message: String,
}

/// A targetable thing on the battlefield.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetRef {
    VehicleStation {
        vehicle_id: String,
        station_index: usize,
    },
    Creature {
        creature_id: String,
    },
}

/// The canonical encounter state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EncounterSnapshot {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(default)]
    pub creatures: Vec<Creature>,
    #[serde(default)]
    pub crew: Vec<CrewAssignment>,
    #[serde(default)]
    pub turn_order: Vec<TurnEntry>,
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub turn_index: usize,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub scale: Scale,
    #[serde(default)]
    pub elevation_zones: Vec<ElevationZone>,
    #[serde(default)]
    pub complication: Option<ActiveComplication>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
    #[serde(default)]
    pub geometry: GeometryConfig,
    /// Counter backing generated mishap-instance ids.
    #[serde(default)]
    pub mishap_seq: u64,
    /// Counter backing crew-assignment ordering.
    #[serde(default)]
    pub assign_seq: u64,
}

impl EncounterSnapshot {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    // Lookups ---------------------------------------------------------------

    #[must_use]
    pub fn vehicle(&self, vehicle_id: &str) -> Option<&Vehicle> {
        self.vehicles.iter().find(|vehicle| vehicle.id == vehicle_id)
    }

    #[must_use]
    pub fn vehicle_mut(&mut self, vehicle_id: &str) -> Option<&mut Vehicle> {
        self.vehicles
            .iter_mut()
            .find(|vehicle| vehicle.id == vehicle_id)
    }

    #[must_use]
    pub fn creature(&self, creature_id: &str) -> Option<&Creature> {
        self.creatures
            .iter()
            .find(|creature| creature.id == creature_id)
    }

    #[must_use]
    pub fn creature_mut(&mut self, creature_id: &str) -> Option<&mut Creature> {
        self.creatures
            .iter_mut()
            .find(|creature| creature.id == creature_id)
    }

    pub fn operative_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.iter().filter(|vehicle| vehicle.operative)
    }

    #[must_use]
    pub fn is_creature_crewed(&self, creature_id: &str) -> bool {
        crew::assignment_of(&self.crew, creature_id).is_some()
    }

    // Derived views ---------------------------------------------------------

    /// The turn-order entry whose turn it currently is.
    #[must_use]
    pub fn current_entry(&self) -> Option<&TurnEntry> {
        if self.phase != Phase::Combat {
            return None;
        }
        self.turn_order.get(self.turn_index)
    }

    /// Identity of the current actor, during combat.
    #[must_use]
    pub fn current_actor(&self) -> Option<&CombatantRef> {
        self.current_entry().map(|entry| &entry.combatant)
    }

    /// The creature driving the given vehicle, if anyone does.
    #[must_use]
    pub fn driver_of(&self, vehicle_id: &str) -> Option<&Creature> {
        let vehicle = self.vehicle(vehicle_id)?;
        let assignment = crew::driver_of(&self.crew, vehicle)?;
        self.creature(&assignment.creature_id)
    }

    /// Effective speed after mishaps and modifiers.
    #[must_use]
    pub fn effective_speed(&self, vehicle_id: &str) -> Option<i32> {
        self.vehicle(vehicle_id).map(Vehicle::effective_speed)
    }

    /// Mishap threshold after accumulated losses.
    #[must_use]
    pub fn effective_threshold(&self, vehicle_id: &str) -> Option<i32> {
        self.vehicle(vehicle_id).map(Vehicle::effective_threshold)
    }

    /// Saving-throw bonus the vehicle's driver adds against the active
    /// complication. `None` when no complication is active or the vehicle
    /// has no driver (it cannot attempt the save at all).
    #[must_use]
    pub fn complication_save_bonus(&self, vehicle_id: &str) -> Option<i32> {
        let active = self.complication.as_ref()?;
        let driver = self.driver_of(vehicle_id)?;
        Some(driver.statblock.abilities.modifier(active.entry.save))
    }

    /// Evaluate targeting from one vehicle station toward a target.
    ///
    /// Returns `None` when an identity does not resolve or either side has
    /// no battlefield position. A line whose arc the observing station
    /// cannot see comes back with `visible` forced off.
    #[must_use]
    pub fn sight_from_station(
        &self,
        vehicle_id: &str,
        station_index: usize,
        target: &TargetRef,
    ) -> Option<SightLine> {
        let observer = self.vehicle(vehicle_id)?;
        let observer_station = observer.template.stations.get(station_index)?;
        let observer_pos = observer.position?;

        let (target_pos, target_facing, target_cover) = match target {
            TargetRef::VehicleStation {
                vehicle_id: target_vehicle,
                station_index: target_station,
            } => {
                let vehicle = self.vehicle(target_vehicle)?;
                let station = vehicle.template.stations.get(*target_station)?;
                (vehicle.position?, vehicle.facing, station.cover)
            }
            TargetRef::Creature { creature_id } => {
                let creature = self.creature(creature_id)?;
                // Unattached creatures stand in the open and have no facing.
                (creature.position?, 0.0, CoverClass::Open)
            }
        };

        let mut line = geometry::sight_line(
            &self.geometry,
            &self.elevation_zones,
            observer_pos,
            target_pos,
            target_facing,
            target_cover,
        );
        let outgoing_arc = geometry::attack_arc(target_pos, observer_pos, observer.facing);
        if !observer_station.covers_arc(outgoing_arc) {
            line.visible = false;
        }
        Some(line)
    }

    /// Greatest weapon range the vehicle can bring to bear into the given
    /// arc, counting only stations staffed by a living crew member.
    #[must_use]
    pub fn max_threat_range(&self, vehicle_id: &str, arc: Arc) -> Option<u32> {
        let vehicle = self.vehicle(vehicle_id)?;
        let mut best: Option<u32> = None;
        for (index, station) in vehicle.template.stations.iter().enumerate() {
            if !station.covers_arc(arc) {
                continue;
            }
            let staffed = crew::assignments_for(&self.crew, &vehicle.id)
                .filter(|assignment| assignment.station_index == index)
                .any(|assignment| {
                    self.creature(&assignment.creature_id)
                        .is_some_and(Creature::is_alive)
                });
            if !staffed {
                continue;
            }
            for weapon in vehicle.template.weapons_at(index) {
                let range = weapon.range.distance();
                if best.is_none_or(|current| range > current) {
                    best = Some(range);
                }
            }
        }
        best
    }

    // Mutation helpers used by the engine ------------------------------------

    pub fn push_log(&mut self, kind: LogKind, message: impl Into<String>) {
        let entry = LogEntry {
            round: self.round,
            kind,
            message: message.into(),
        };
        self.log.push(entry);
    }

    pub fn next_mishap_id(&mut self) -> String {
        self.mishap_seq += 1;
        format!("mishap-{}", self.mishap_seq)
    }

    pub fn next_assign_order(&mut self) -> u64 {
        self.assign_seq += 1;
        self.assign_seq
    }

    // Persistence -----------------------------------------------------------

    /// Defensive merge pass run when a snapshot is loaded from storage.
    ///
    /// Older saves may predate fields or carry drifted invariants; this
    /// fills documented defaults, re-clamps numerics, re-resolves template
    /// roles, and drops references that no longer resolve.
    #[must_use]
    pub fn migrate(mut self) -> Self {
        for vehicle in &mut self.vehicles {
            vehicle.template.finalize();
            vehicle.hp = vehicle.hp.clamp(0, vehicle.template.max_hp);
            vehicle.current_speed = vehicle.current_speed.clamp(0, vehicle.template.base_speed);
            if vehicle.hp == 0 {
                vehicle.operative = false;
            }
        }
        for creature in &mut self.creatures {
            creature.hp = creature.hp.clamp(0, creature.statblock.max_hp);
            creature.temp_hp = creature.temp_hp.max(0);
            if creature.faction.is_none() {
                creature.faction = Some(creature.faction());
            }
        }

        // Assignments must reference a live vehicle, an existing creature,
        // and a real station; a creature holds at most one.
        let mut kept: Vec<CrewAssignment> = Vec::with_capacity(self.crew.len());
        let mut sorted = std::mem::take(&mut self.crew);
        sorted.sort_by_key(|assignment| assignment.assigned_order);
        for assignment in sorted {
            let vehicle_ok = self.vehicle(&assignment.vehicle_id).is_some_and(|vehicle| {
                vehicle.operative
                    && assignment.station_index < vehicle.template.stations.len()
            });
            let creature_ok = self.creature(&assignment.creature_id).is_some();
            let duplicate = kept
                .iter()
                .any(|existing| existing.creature_id == assignment.creature_id);
            if vehicle_ok && creature_ok && !duplicate {
                kept.push(assignment);
            }
        }
        self.crew = kept;

        // Crewed creatures never carry a battlefield position.
        for creature in &mut self.creatures {
            if crew::assignment_of(&self.crew, &creature.id).is_some() {
                creature.position = None;
            }
        }

        self.turn_order.retain(|entry| match &entry.combatant {
            CombatantRef::Vehicle(id) => self.vehicles.iter().any(|vehicle| &vehicle.id == id),
            CombatantRef::Creature(id) => {
                self.creatures.iter().any(|creature| &creature.id == id)
            }
        });
        if self.turn_index >= self.turn_order.len() {
            self.turn_index = 0;
        }
        self
    }
}
