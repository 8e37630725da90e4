//! The encounter state machine.
//!
//! One operation: [`apply`] folds an event into a snapshot and returns a
//! fresh snapshot. The function is total: unknown events and validation
//! failures leave the state unchanged (the issuing layer pre-validates, so
//! a silent no-op is a deliberate simplification, not a fault path), and
//! numeric inputs are clamped rather than rejected.

use crate::complication::{self, ComplicationEffect, ActiveComplication, ResolutionStatus};
use crate::constants::{EJECTION_RADIUS, UNDRIVEN_INITIATIVE};
use crate::creature::Creature;
use crate::crew::{self, CrewAssignment};
use crate::event::EncounterEvent;
use crate::geometry::Position;
use crate::mishap::{self, ActiveMishap, MishapDuration};
use crate::snapshot::{CombatantRef, EncounterSnapshot, LogKind, Phase, TurnEntry};
use crate::vehicle::{HullHit, SpeedModifier, Vehicle};
use rand::Rng;
use std::f32::consts::TAU;

/// Fold one event into the snapshot.
///
/// Always succeeds; the result is either a changed snapshot or a value
/// equal to the prior one. All randomness comes from the caller-supplied
/// generator, so replays with a seeded generator are deterministic.
#[must_use]
pub fn apply<R: Rng + ?Sized>(
    snapshot: &EncounterSnapshot,
    event: &EncounterEvent,
    rng: &mut R,
) -> EncounterSnapshot {
    let mut next = snapshot.clone();
    match event {
        // Setup -------------------------------------------------------------
        EncounterEvent::AddVehicle {
            id,
            name,
            faction,
            template,
            position,
            facing,
        } => add_vehicle(&mut next, id, name, *faction, template.clone(), *position, *facing),
        EncounterEvent::RemoveVehicle { vehicle_id } => remove_vehicle(&mut next, vehicle_id),
        EncounterEvent::AddCreature { creature } => add_creature(&mut next, creature.clone()),
        EncounterEvent::RemoveCreature { creature_id } => remove_creature(&mut next, creature_id),
        EncounterEvent::AssignCrew {
            creature_id,
            vehicle_id,
            station_index,
        } => assign_crew(&mut next, creature_id, vehicle_id, *station_index),
        EncounterEvent::UnassignCrew { creature_id } => unassign_crew(&mut next, creature_id),
        EncounterEvent::SetInitiative { creature_id, value } => {
            set_initiative(&mut next, creature_id, *value);
        }
        EncounterEvent::SetScale { scale } => next.scale = *scale,
        EncounterEvent::MoveVehicle {
            vehicle_id,
            position,
        } => {
            if let Some(vehicle) = next.vehicle_mut(vehicle_id) {
                vehicle.position = Some(*position);
            }
        }
        EncounterEvent::SetFacing { vehicle_id, facing } => {
            if let Some(vehicle) = next.vehicle_mut(vehicle_id) {
                vehicle.facing = facing.rem_euclid(360.0);
            }
        }
        EncounterEvent::MoveCreature {
            creature_id,
            position,
        } => move_creature(&mut next, creature_id, *position),
        EncounterEvent::AddElevationZone { zone } => {
            if !next.elevation_zones.iter().any(|existing| existing.id == zone.id) {
                next.elevation_zones.push(zone.clone());
            }
        }
        EncounterEvent::RemoveElevationZone { zone_id } => {
            next.elevation_zones.retain(|zone| &zone.id != zone_id);
        }
        EncounterEvent::RenameEncounter { name } => next.name = name.clone(),

        // Turn flow ----------------------------------------------------------
        EncounterEvent::StartCombat => start_combat(&mut next),
        EncounterEvent::NextTurn => next_turn(&mut next),
        EncounterEvent::NextRound => next_round(&mut next),
        EncounterEvent::EndCombat => end_combat(&mut next),
        EncounterEvent::SetTurn { index } => {
            if next.phase == Phase::Combat && *index < next.turn_order.len() {
                next.turn_index = *index;
            }
        }

        // Damage & mishaps ---------------------------------------------------
        EncounterEvent::DamageVehicle { vehicle_id, amount } => {
            damage_vehicle(&mut next, vehicle_id, *amount, rng);
        }
        EncounterEvent::RepairVehicleHull { vehicle_id, amount } => {
            if let Some(vehicle) = next.vehicle_mut(vehicle_id) {
                vehicle.repair_hull(*amount);
            }
        }
        EncounterEvent::SetVehicleSpeed { vehicle_id, value } => {
            if let Some(vehicle) = next.vehicle_mut(vehicle_id) {
                vehicle.set_speed(*value);
            }
        }
        EncounterEvent::DamageCreature {
            creature_id,
            amount,
        } => damage_creature(&mut next, creature_id, *amount),
        EncounterEvent::HealCreature {
            creature_id,
            amount,
        } => {
            if let Some(creature) = next.creature_mut(creature_id) {
                creature.heal(*amount);
            }
        }
        EncounterEvent::GrantTempHp {
            creature_id,
            amount,
        } => {
            if let Some(creature) = next.creature_mut(creature_id) {
                creature.grant_temp_hp(*amount);
            }
        }
        EncounterEvent::RollMishap { vehicle_id } => {
            if next.vehicle(vehicle_id).is_some_and(|vehicle| vehicle.operative) {
                trigger_mishap(&mut next, vehicle_id, rng);
            }
        }
        EncounterEvent::RepairMishap {
            vehicle_id,
            mishap_id,
            check_total,
        } => repair_mishap(&mut next, vehicle_id, mishap_id, *check_total),
        EncounterEvent::ClearMishap {
            vehicle_id,
            mishap_id,
        } => clear_mishap(&mut next, vehicle_id, mishap_id),
        EncounterEvent::AddSpeedModifier {
            vehicle_id,
            modifier,
        } => {
            let round = next.round;
            let turn_index = next.turn_index;
            if let Some(vehicle) = next.vehicle_mut(vehicle_id) {
                vehicle.add_speed_mod(SpeedModifier {
                    applied_round: round,
                    applied_turn: turn_index,
                    ..*modifier
                });
            }
        }
        EncounterEvent::ClearSpeedModifiers { vehicle_id } => {
            if let Some(vehicle) = next.vehicle_mut(vehicle_id) {
                vehicle.clear_speed_mods();
            }
        }

        // Complications -------------------------------------------------------
        EncounterEvent::RollComplication => roll_complication(&mut next, rng),
        EncounterEvent::ResolveComplicationSave { vehicle_id, total } => {
            resolve_complication_save(&mut next, vehicle_id, *total, rng);
        }
        EncounterEvent::FailComplication { vehicle_id } => {
            mark_complication(&mut next, vehicle_id, ResolutionStatus::Failed, rng);
        }
        EncounterEvent::SkipComplication { vehicle_id } => {
            mark_complication(&mut next, vehicle_id, ResolutionStatus::Skipped, rng);
        }
        EncounterEvent::DismissComplication => {
            if next.complication.take().is_some() {
                next.push_log(LogKind::Complication, "Complication dismissed");
            }
        }
    }
    next
}

// Turn order ----------------------------------------------------------------

fn vehicle_initiative(snapshot: &EncounterSnapshot, vehicle: &Vehicle) -> i32 {
    crew::driver_of(&snapshot.crew, vehicle)
        .and_then(|assignment| snapshot.creature(&assignment.creature_id))
        .map_or(UNDRIVEN_INITIATIVE, |creature| creature.initiative)
}

fn sort_entries(entries: &mut [TurnEntry]) {
    entries.sort_by(|a, b| {
        b.initiative
            .cmp(&a.initiative)
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Build a linear order: one entry per operative vehicle (at its driver's
/// initiative, or the undriven sentinel) and one per uncrewed creature.
fn build_turn_order(snapshot: &EncounterSnapshot, filter_dead_npcs: bool) -> Vec<TurnEntry> {
    let mut entries = Vec::new();
    for vehicle in snapshot.operative_vehicles() {
        entries.push(TurnEntry {
            combatant: CombatantRef::Vehicle(vehicle.id.clone()),
            name: vehicle.name.clone(),
            initiative: vehicle_initiative(snapshot, vehicle),
        });
    }
    for creature in &snapshot.creatures {
        if snapshot.is_creature_crewed(&creature.id) {
            continue;
        }
        if filter_dead_npcs && !creature.player_controlled && !creature.is_alive() {
            continue;
        }
        entries.push(TurnEntry {
            combatant: CombatantRef::Creature(creature.id.clone()),
            name: creature.name.clone(),
            initiative: creature.initiative,
        });
    }
    sort_entries(&mut entries);
    entries
}

/// First index whose entry sorts below the given initiative; appending when
/// none does. Keeps descending order stable.
fn sorted_insert_index(order: &[TurnEntry], initiative: i32) -> usize {
    order
        .iter()
        .position(|entry| entry.initiative < initiative)
        .unwrap_or(order.len())
}

fn insert_order_entry(snapshot: &mut EncounterSnapshot, entry: TurnEntry, index: usize) {
    snapshot.turn_order.insert(index, entry);
    if index <= snapshot.turn_index {
        snapshot.turn_index += 1;
    }
}

fn remove_order_entry(snapshot: &mut EncounterSnapshot, combatant: &CombatantRef) {
    if let Some(position) = snapshot
        .turn_order
        .iter()
        .position(|entry| &entry.combatant == combatant)
    {
        snapshot.turn_order.remove(position);
        if position <= snapshot.turn_index && snapshot.turn_index > 0 {
            snapshot.turn_index -= 1;
        }
    }
}

fn start_combat(snapshot: &mut EncounterSnapshot) {
    if snapshot.phase != Phase::Setup {
        return;
    }
    snapshot.phase = Phase::Combat;
    snapshot.round = 1;
    snapshot.turn_index = 0;
    snapshot.turn_order = build_turn_order(snapshot, false);
    snapshot.push_log(
        LogKind::TurnFlow,
        format!("Combat begins with {} combatants", snapshot.turn_order.len()),
    );
}

fn entry_can_act(snapshot: &EncounterSnapshot, entry: &TurnEntry) -> bool {
    match &entry.combatant {
        CombatantRef::Vehicle(id) => snapshot.vehicle(id).is_some_and(|vehicle| vehicle.operative),
        // Player-controlled creatures at 0 HP still take a turn, so
        // death-save-style play stays possible.
        CombatantRef::Creature(id) => snapshot
            .creature(id)
            .is_some_and(|creature| creature.player_controlled || creature.is_alive()),
    }
}

fn next_turn(snapshot: &mut EncounterSnapshot) {
    if snapshot.phase != Phase::Combat {
        return;
    }
    let start = snapshot.turn_index + 1;
    let Some(found) = (start..snapshot.turn_order.len())
        .find(|&index| entry_can_act(snapshot, &snapshot.turn_order[index]))
    else {
        // End of the order: the caller must advance the round instead.
        log::debug!("next_turn at end of order is a no-op");
        return;
    };
    snapshot.turn_index = found;
    let round = snapshot.round;
    for vehicle in &mut snapshot.vehicles {
        vehicle.expire_speed_mods(round, found);
    }
    let name = snapshot.turn_order[found].name.clone();
    snapshot.push_log(LogKind::TurnFlow, format!("Turn: {name}"));
}

fn next_round(snapshot: &mut EncounterSnapshot) {
    if snapshot.phase != Phase::Combat {
        return;
    }
    snapshot.round += 1;
    snapshot.turn_index = 0;
    let round = snapshot.round;

    for vehicle in &mut snapshot.vehicles {
        for active in &mut vehicle.mishaps {
            if let MishapDuration::Rounds(remaining) = &mut active.remaining {
                *remaining = remaining.saturating_sub(1);
            }
        }
        vehicle
            .mishaps
            .retain(|active| !matches!(active.remaining, MishapDuration::Rounds(0)));
        vehicle.expire_speed_mods(round, 0);
    }

    // Rebuild from current membership, preserving only combatants still in
    // the order: this repairs mid-round insertion drift without re-admitting
    // anyone who has left combat.
    let rebuilt: Vec<TurnEntry> = build_turn_order(snapshot, true)
        .into_iter()
        .filter(|entry| {
            snapshot
                .turn_order
                .iter()
                .any(|existing| existing.combatant == entry.combatant)
        })
        .collect();
    snapshot.turn_order = rebuilt;
    snapshot.push_log(LogKind::TurnFlow, format!("Round {round} begins"));
}

fn end_combat(snapshot: &mut EncounterSnapshot) {
    if snapshot.phase != Phase::Combat {
        return;
    }
    snapshot.phase = Phase::Ended;
    snapshot.push_log(LogKind::TurnFlow, "Combat ends");
}

// Setup ---------------------------------------------------------------------

fn add_vehicle(
    snapshot: &mut EncounterSnapshot,
    id: &str,
    name: &str,
    faction: crate::creature::Faction,
    mut template: crate::template::VehicleTemplate,
    position: Option<Position>,
    facing: f32,
) {
    if snapshot.vehicle(id).is_some() || template.max_hp <= 0 {
        log::debug!("add_vehicle ignored for {id}");
        return;
    }
    template.finalize();
    let mut vehicle = Vehicle::from_template(id, name, faction, template);
    vehicle.position = position;
    vehicle.facing = facing.rem_euclid(360.0);
    let entry = TurnEntry {
        combatant: CombatantRef::Vehicle(vehicle.id.clone()),
        name: vehicle.name.clone(),
        initiative: UNDRIVEN_INITIATIVE,
    };
    snapshot.vehicles.push(vehicle);
    if snapshot.phase == Phase::Combat {
        let index = sorted_insert_index(&snapshot.turn_order, entry.initiative);
        insert_order_entry(snapshot, entry, index);
    }
}

fn remove_vehicle(snapshot: &mut EncounterSnapshot, vehicle_id: &str) {
    if snapshot.vehicle(vehicle_id).is_none() {
        return;
    }
    release_crew(snapshot, vehicle_id, CrewPlacement::AtVehicle);
    remove_order_entry(snapshot, &CombatantRef::Vehicle(vehicle_id.to_string()));
    snapshot.vehicles.retain(|vehicle| vehicle.id != vehicle_id);
}

fn add_creature(snapshot: &mut EncounterSnapshot, creature: Creature) {
    if snapshot.creature(&creature.id).is_some() || creature.statblock.max_hp <= 0 {
        log::debug!("add_creature ignored for {}", creature.id);
        return;
    }
    let entry = TurnEntry {
        combatant: CombatantRef::Creature(creature.id.clone()),
        name: creature.name.clone(),
        initiative: creature.initiative,
    };
    snapshot.creatures.push(creature);
    if snapshot.phase == Phase::Combat {
        let index = sorted_insert_index(&snapshot.turn_order, entry.initiative);
        insert_order_entry(snapshot, entry, index);
    }
}

fn remove_creature(snapshot: &mut EncounterSnapshot, creature_id: &str) {
    if snapshot.creature(creature_id).is_none() {
        return;
    }
    snapshot
        .crew
        .retain(|assignment| assignment.creature_id != creature_id);
    remove_order_entry(snapshot, &CombatantRef::Creature(creature_id.to_string()));
    snapshot
        .creatures
        .retain(|creature| creature.id != creature_id);
}

fn assign_crew(
    snapshot: &mut EncounterSnapshot,
    creature_id: &str,
    vehicle_id: &str,
    station_index: usize,
) {
    if snapshot.creature(creature_id).is_none()
        || crew::assignment_of(&snapshot.crew, creature_id).is_some()
    {
        return;
    }
    let Some(vehicle) = snapshot.vehicle(vehicle_id) else {
        return;
    };
    let Some(station) = vehicle.template.stations.get(station_index) else {
        return;
    };
    if !vehicle.operative
        || crew::station_occupancy(&snapshot.crew, vehicle_id, station_index)
            >= station.capacity as usize
    {
        return;
    }
    let assigned_order = snapshot.next_assign_order();
    snapshot.crew.push(CrewAssignment {
        creature_id: creature_id.to_string(),
        vehicle_id: vehicle_id.to_string(),
        station_index,
        assigned_order,
    });
    if let Some(creature) = snapshot.creature_mut(creature_id) {
        creature.position = None;
    }
    // Crewed creatures act with their vehicle, not on their own slot.
    remove_order_entry(snapshot, &CombatantRef::Creature(creature_id.to_string()));
}

fn unassign_crew(snapshot: &mut EncounterSnapshot, creature_id: &str) {
    let Some(assignment) = crew::assignment_of(&snapshot.crew, creature_id).cloned() else {
        return;
    };
    snapshot
        .crew
        .retain(|existing| existing.creature_id != creature_id);
    let vehicle_position = snapshot
        .vehicle(&assignment.vehicle_id)
        .and_then(|vehicle| vehicle.position);
    let Some(creature) = snapshot.creature_mut(creature_id) else {
        return;
    };
    creature.position = vehicle_position;
    let entry = TurnEntry {
        combatant: CombatantRef::Creature(creature.id.clone()),
        name: creature.name.clone(),
        initiative: creature.initiative,
    };
    if snapshot.phase == Phase::Combat {
        // Unlike ejection, a voluntary exit slots in right after the current
        // turn so the creature can still act this round; the next round
        // rebuild restores strict initiative ordering.
        let index = (snapshot.turn_index + 1).min(snapshot.turn_order.len());
        snapshot.turn_order.insert(index, entry);
    }
}

fn set_initiative(snapshot: &mut EncounterSnapshot, creature_id: &str, value: i32) {
    if let Some(creature) = snapshot.creature_mut(creature_id) {
        creature.initiative = value;
        let combatant = CombatantRef::Creature(creature_id.to_string());
        if let Some(entry) = snapshot
            .turn_order
            .iter_mut()
            .find(|entry| entry.combatant == combatant)
        {
            entry.initiative = value;
        }
    }
}

fn move_creature(snapshot: &mut EncounterSnapshot, creature_id: &str, position: Position) {
    if snapshot.is_creature_crewed(creature_id) {
        // Crewed creatures ride the vehicle; they have no position of
        // their own to move.
        return;
    }
    if let Some(creature) = snapshot.creature_mut(creature_id) {
        creature.position = Some(position);
    }
}

// Damage, destruction, mishaps ----------------------------------------------

fn damage_vehicle<R: Rng + ?Sized>(
    snapshot: &mut EncounterSnapshot,
    vehicle_id: &str,
    amount: i32,
    rng: &mut R,
) {
    let Some(vehicle) = snapshot.vehicle_mut(vehicle_id) else {
        log::debug!("damage_vehicle ignored for unknown {vehicle_id}");
        return;
    };
    if amount <= 0 {
        return;
    }
    let threshold = vehicle.effective_threshold();
    let name = vehicle.name.clone();
    let hit = vehicle.apply_hull_damage(amount);
    match hit {
        HullHit::Shrugged => {
            snapshot.push_log(
                LogKind::Damage,
                format!("{name} shrugs off a {amount}-point hit"),
            );
            return;
        }
        HullHit::Damaged | HullHit::Destroyed => {
            snapshot.push_log(LogKind::Damage, format!("{name} takes {amount} damage"));
        }
    }
    if amount >= threshold {
        trigger_mishap(snapshot, vehicle_id, rng);
    }
    if hit == HullHit::Destroyed {
        destroy_vehicle(snapshot, vehicle_id);
    }
}

fn trigger_mishap<R: Rng + ?Sized>(
    snapshot: &mut EncounterSnapshot,
    vehicle_id: &str,
    rng: &mut R,
) {
    let Some(vehicle) = snapshot.vehicle(vehicle_id) else {
        return;
    };
    let name = vehicle.name.clone();
    let Some(picked) = mishap::roll_mishap_for_vehicle(vehicle, rng) else {
        // Exhausted table: make the "nothing happened" visible.
        snapshot.push_log(
            LogKind::Mishap,
            format!("{name}: no mishap outcome remains available"),
        );
        return;
    };
    let rerolls = if picked.rerolls > 0 {
        format!(", {} rerolls", picked.rerolls)
    } else {
        String::new()
    };
    snapshot.push_log(
        LogKind::Mishap,
        format!(
            "{name} suffers {} (rolled {}{rerolls})",
            picked.entry.name, picked.roll
        ),
    );
    if picked.entry.duration == MishapDuration::Instant {
        return;
    }
    let id = snapshot.next_mishap_id();
    if let Some(vehicle) = snapshot.vehicle_mut(vehicle_id) {
        vehicle.mishaps.push(ActiveMishap {
            id,
            remaining: picked.entry.duration,
            entry: picked.entry,
        });
    }
}

enum CrewPlacement {
    /// Dropped at the vehicle's own position.
    AtVehicle,
    /// Thrown clear, evenly spaced on a circle around the wreck.
    Ejected,
}

/// Remove every assignment aboard the vehicle, place the crew on the
/// battlefield, and splice uncrewed creatures into the turn order.
fn release_crew(snapshot: &mut EncounterSnapshot, vehicle_id: &str, placement: CrewPlacement) -> usize {
    let released: Vec<CrewAssignment> =
        crew::assignments_for(&snapshot.crew, vehicle_id).cloned().collect();
    if released.is_empty() {
        return 0;
    }
    snapshot
        .crew
        .retain(|assignment| assignment.vehicle_id != vehicle_id);

    let anchor = snapshot.vehicle(vehicle_id).and_then(|vehicle| vehicle.position);
    let count = released.len();
    for (index, assignment) in released.iter().enumerate() {
        let position = anchor.map(|origin| match placement {
            CrewPlacement::AtVehicle => origin,
            CrewPlacement::Ejected => {
                let angle = TAU * index as f32 / count as f32;
                Position::new(
                    origin.x + EJECTION_RADIUS * angle.cos(),
                    origin.y + EJECTION_RADIUS * angle.sin(),
                )
            }
        });
        let Some(creature) = snapshot.creature_mut(&assignment.creature_id) else {
            continue;
        };
        creature.position = position;
        let entry = TurnEntry {
            combatant: CombatantRef::Creature(creature.id.clone()),
            name: creature.name.clone(),
            initiative: creature.initiative,
        };
        if snapshot.phase == Phase::Combat {
            let insert_at = sorted_insert_index(&snapshot.turn_order, entry.initiative);
            insert_order_entry(snapshot, entry, insert_at);
        }
    }
    count
}

/// Destruction side effects: the vehicle is already at 0 HP and marked
/// inoperative by the hull hit; here the crew is thrown clear and the
/// vehicle leaves the turn order.
fn destroy_vehicle(snapshot: &mut EncounterSnapshot, vehicle_id: &str) {
    let ejected = release_crew(snapshot, vehicle_id, CrewPlacement::Ejected);
    remove_order_entry(snapshot, &CombatantRef::Vehicle(vehicle_id.to_string()));
    let name = snapshot
        .vehicle(vehicle_id)
        .map_or_else(|| vehicle_id.to_string(), |vehicle| vehicle.name.clone());
    snapshot.push_log(
        LogKind::Destruction,
        format!("{name} is destroyed; {ejected} crew thrown clear"),
    );
}

fn damage_creature(snapshot: &mut EncounterSnapshot, creature_id: &str, amount: i32) {
    let Some(creature) = snapshot.creature_mut(creature_id) else {
        return;
    };
    let was_alive = creature.is_alive();
    creature.apply_damage(amount);
    if was_alive && !creature.is_alive() {
        let name = creature.name.clone();
        snapshot.push_log(LogKind::Damage, format!("{name} drops to 0 HP"));
    }
}

fn repair_mishap(
    snapshot: &mut EncounterSnapshot,
    vehicle_id: &str,
    mishap_id: &str,
    check_total: i32,
) {
    let Some(vehicle) = snapshot.vehicle(vehicle_id) else {
        return;
    };
    let name = vehicle.name.clone();
    let Some(active) = vehicle.mishaps.iter().find(|active| active.id == mishap_id) else {
        return;
    };
    // The most severe tier has no repair check; it needs narrative
    // resolution via an explicit clear.
    let Some(spec) = active.entry.repair else {
        return;
    };
    let mishap_name = active.entry.name.clone();
    if check_total >= spec.difficulty {
        if let Some(vehicle) = snapshot.vehicle_mut(vehicle_id) {
            vehicle.mishaps.retain(|active| active.id != mishap_id);
        }
        snapshot.push_log(
            LogKind::Mishap,
            format!("{name}: {mishap_name} repaired ({check_total} vs DC {})", spec.difficulty),
        );
    } else {
        snapshot.push_log(
            LogKind::Mishap,
            format!(
                "{name}: repair of {mishap_name} fails ({check_total} vs DC {})",
                spec.difficulty
            ),
        );
    }
}

fn clear_mishap(snapshot: &mut EncounterSnapshot, vehicle_id: &str, mishap_id: &str) {
    let Some(vehicle) = snapshot.vehicle_mut(vehicle_id) else {
        return;
    };
    let before = vehicle.mishaps.len();
    vehicle.mishaps.retain(|active| active.id != mishap_id);
    if vehicle.mishaps.len() != before {
        let name = vehicle.name.clone();
        snapshot.push_log(LogKind::Mishap, format!("{name}: mishap cleared"));
    }
}

// Complications --------------------------------------------------------------

fn roll_complication<R: Rng + ?Sized>(snapshot: &mut EncounterSnapshot, rng: &mut R) {
    if snapshot.phase != Phase::Combat || snapshot.complication.is_some() {
        return;
    }
    let affected: Vec<String> = snapshot
        .operative_vehicles()
        .map(|vehicle| vehicle.id.clone())
        .collect();
    if affected.is_empty() {
        return;
    }
    let (roll, entry) = complication::roll_complication(snapshot.scale, rng);
    let Some(entry) = entry else {
        snapshot.push_log(
            LogKind::Complication,
            format!("No complication this round (rolled {roll})"),
        );
        return;
    };
    snapshot.push_log(
        LogKind::Complication,
        format!(
            "Complication: {} (rolled {roll}, DC {} {} save)",
            entry.name, entry.difficulty, entry.save
        ),
    );
    snapshot.complication = Some(ActiveComplication::start(entry, roll, affected));
}

fn resolve_complication_save<R: Rng + ?Sized>(
    snapshot: &mut EncounterSnapshot,
    vehicle_id: &str,
    total: i32,
    rng: &mut R,
) {
    // Only a driver-bearing vehicle can attempt the save at all.
    if snapshot.driver_of(vehicle_id).is_none() {
        return;
    }
    let Some(active) = snapshot.complication.as_mut() else {
        return;
    };
    let difficulty = active.entry.difficulty;
    let Some(resolution) = active.resolution_mut(vehicle_id) else {
        return;
    };
    if resolution.status != ResolutionStatus::Pending {
        return;
    }
    resolution.roll = Some(total);
    resolution.status = if total >= difficulty {
        ResolutionStatus::Passed
    } else {
        ResolutionStatus::Failed
    };
    finish_complication_if_resolved(snapshot, rng);
}

fn mark_complication<R: Rng + ?Sized>(
    snapshot: &mut EncounterSnapshot,
    vehicle_id: &str,
    status: ResolutionStatus,
    rng: &mut R,
) {
    let Some(active) = snapshot.complication.as_mut() else {
        return;
    };
    let Some(resolution) = active.resolution_mut(vehicle_id) else {
        return;
    };
    if resolution.status != ResolutionStatus::Pending {
        return;
    }
    resolution.status = status;
    finish_complication_if_resolved(snapshot, rng);
}

/// Two-phase completion: once every record is non-pending, effects land on
/// the failures and the complication clears as one atomic step, so nothing
/// depends on the order the saves came in.
fn finish_complication_if_resolved<R: Rng + ?Sized>(
    snapshot: &mut EncounterSnapshot,
    rng: &mut R,
) {
    let ready = snapshot
        .complication
        .as_ref()
        .is_some_and(ActiveComplication::all_resolved);
    if !ready {
        return;
    }
    let Some(active) = snapshot.complication.take() else {
        return;
    };
    let failed: Vec<String> = active.failed_vehicles().map(String::from).collect();
    let round = snapshot.round;
    let turn_index = snapshot.turn_index;
    for vehicle_id in &failed {
        match active.entry.effect {
            ComplicationEffect::HalveSpeed => {
                if let Some(vehicle) = snapshot.vehicle_mut(vehicle_id) {
                    vehicle.add_speed_mod(SpeedModifier {
                        multiplier: 0.5,
                        scope: crate::vehicle::ModifierScope::ThisRound,
                        applied_round: round,
                        applied_turn: turn_index,
                    });
                }
            }
            ComplicationEffect::SpeedLoss { amount } => {
                if let Some(vehicle) = snapshot.vehicle_mut(vehicle_id) {
                    let reduced = vehicle.current_speed - amount;
                    vehicle.set_speed(reduced);
                }
            }
            ComplicationEffect::HullDamage { amount } => {
                damage_vehicle(snapshot, vehicle_id, amount, rng);
            }
        }
    }
    snapshot.push_log(
        LogKind::Complication,
        format!(
            "{} resolved: {} of {} vehicles affected",
            active.entry.name,
            failed.len(),
            active.resolutions.len()
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creature::{Faction, Statblock};
    use crate::template::{Station, VehicleTemplate};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use smallvec::SmallVec;

    fn template() -> VehicleTemplate {
        let mut template = VehicleTemplate {
            name: "Test Wagon".to_string(),
            max_hp: 40,
            armor_class: 18,
            base_speed: 60,
            damage_threshold: 5,
            mishap_threshold: 10,
            stations: vec![
                Station {
                    name: "Helm".to_string(),
                    cover: crate::template::CoverClass::ThreeQuarters,
                    arcs: SmallVec::new(),
                    capacity: 1,
                    role: crate::template::StationRole::Passenger,
                },
                Station {
                    name: "Rail".to_string(),
                    cover: crate::template::CoverClass::Half,
                    arcs: SmallVec::new(),
                    capacity: 2,
                    role: crate::template::StationRole::Passenger,
                },
            ],
            weapons: Vec::new(),
        };
        template.finalize();
        template
    }

    fn creature(id: &str, name: &str, initiative: i32) -> Creature {
        let mut creature = Creature::new(id, name, Statblock::default());
        creature.initiative = initiative;
        creature
    }

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(42)
    }

    fn setup_snapshot() -> EncounterSnapshot {
        let mut snapshot = EncounterSnapshot::new("Test Encounter");
        let mut rng = rng();
        for (id, name, faction) in [
            ("va", "Alpha", Faction::Party),
            ("vb", "Bravo", Faction::Enemy),
        ] {
            snapshot = apply(
                &snapshot,
                &EncounterEvent::AddVehicle {
                    id: id.to_string(),
                    name: name.to_string(),
                    faction,
                    template: template(),
                    position: Some(Position::new(0.0, 0.0)),
                    facing: 0.0,
                },
                &mut rng,
            );
        }
        snapshot
    }

    #[test]
    fn unknown_identity_is_a_no_op() {
        let snapshot = setup_snapshot();
        let mut rng = rng();
        let after = apply(
            &snapshot,
            &EncounterEvent::DamageVehicle {
                vehicle_id: "ghost".to_string(),
                amount: 30,
            },
            &mut rng,
        );
        assert_eq!(after, snapshot);
        let after = apply(
            &snapshot,
            &EncounterEvent::UnassignCrew {
                creature_id: "ghost".to_string(),
            },
            &mut rng,
        );
        assert_eq!(after, snapshot);
    }

    #[test]
    fn start_combat_sorts_by_driver_initiative_with_undriven_last() {
        let mut snapshot = setup_snapshot();
        let mut rng = rng();
        snapshot = apply(
            &snapshot,
            &EncounterEvent::AddCreature {
                creature: creature("driver-a", "Anya", 14),
            },
            &mut rng,
        );
        snapshot = apply(
            &snapshot,
            &EncounterEvent::AddCreature {
                creature: creature("lone", "Straggler", 9),
            },
            &mut rng,
        );
        snapshot = apply(
            &snapshot,
            &EncounterEvent::AssignCrew {
                creature_id: "driver-a".to_string(),
                vehicle_id: "va".to_string(),
                station_index: 0,
            },
            &mut rng,
        );
        snapshot = apply(&snapshot, &EncounterEvent::StartCombat, &mut rng);

        let order: Vec<&str> = snapshot
            .turn_order
            .iter()
            .map(|entry| entry.name.as_str())
            .collect();
        assert_eq!(order, vec!["Alpha", "Straggler", "Bravo"]);
        assert_eq!(snapshot.turn_order[0].initiative, 14);
    }

    #[test]
    fn ties_break_by_case_sensitive_name() {
        let mut snapshot = EncounterSnapshot::new("ties");
        let mut rng = rng();
        for (id, name) in [("c1", "banshee"), ("c2", "Banshee"), ("c3", "Azer")] {
            snapshot = apply(
                &snapshot,
                &EncounterEvent::AddCreature {
                    creature: creature(id, name, 10),
                },
                &mut rng,
            );
        }
        snapshot = apply(&snapshot, &EncounterEvent::StartCombat, &mut rng);
        let order: Vec<&str> = snapshot
            .turn_order
            .iter()
            .map(|entry| entry.name.as_str())
            .collect();
        // Byte order: uppercase sorts before lowercase.
        assert_eq!(order, vec!["Azer", "Banshee", "banshee"]);
    }

    #[test]
    fn next_turn_skips_wrecks_and_dead_npcs_but_not_downed_players() {
        let mut snapshot = setup_snapshot();
        let mut rng = rng();
        let mut downed_player = creature("pc", "Vex", 20);
        downed_player.player_controlled = true;
        snapshot = apply(
            &snapshot,
            &EncounterEvent::AddCreature { creature: downed_player },
            &mut rng,
        );
        snapshot = apply(
            &snapshot,
            &EncounterEvent::AddCreature {
                creature: creature("npc", "Raider", 15),
            },
            &mut rng,
        );
        snapshot = apply(&snapshot, &EncounterEvent::StartCombat, &mut rng);
        // Order: Vex(20), Raider(15), Alpha, Bravo (both undriven).
        snapshot = apply(
            &snapshot,
            &EncounterEvent::DamageCreature {
                creature_id: "pc".to_string(),
                amount: 99,
            },
            &mut rng,
        );
        snapshot = apply(
            &snapshot,
            &EncounterEvent::DamageCreature {
                creature_id: "npc".to_string(),
                amount: 99,
            },
            &mut rng,
        );

        assert_eq!(snapshot.turn_index, 0);
        snapshot = apply(&snapshot, &EncounterEvent::NextTurn, &mut rng);
        // Raider at index 1 is dead and skipped; lands on Alpha at index 2.
        assert_eq!(snapshot.turn_index, 2);

        snapshot = apply(&snapshot, &EncounterEvent::NextTurn, &mut rng);
        assert_eq!(snapshot.turn_index, 3);
        // End of order: advancing again is a no-op.
        let stuck = apply(&snapshot, &EncounterEvent::NextTurn, &mut rng);
        assert_eq!(stuck, snapshot);
    }

    #[test]
    fn voluntary_exit_acts_later_this_round_and_resorts_next_round() {
        let mut snapshot = setup_snapshot();
        let mut rng = rng();
        snapshot = apply(
            &snapshot,
            &EncounterEvent::AddCreature {
                creature: creature("driver-a", "Anya", 18),
            },
            &mut rng,
        );
        snapshot = apply(
            &snapshot,
            &EncounterEvent::AssignCrew {
                creature_id: "driver-a".to_string(),
                vehicle_id: "va".to_string(),
                station_index: 0,
            },
            &mut rng,
        );
        snapshot = apply(&snapshot, &EncounterEvent::StartCombat, &mut rng);
        // Order: Alpha(18), Bravo(sentinel).
        snapshot = apply(
            &snapshot,
            &EncounterEvent::UnassignCrew {
                creature_id: "driver-a".to_string(),
            },
            &mut rng,
        );
        let order: Vec<&str> = snapshot
            .turn_order
            .iter()
            .map(|entry| entry.name.as_str())
            .collect();
        // Inserted right after the active index, not at sorted position.
        assert_eq!(order, vec!["Alpha", "Anya", "Bravo"]);

        snapshot = apply(&snapshot, &EncounterEvent::NextRound, &mut rng);
        let order: Vec<&str> = snapshot
            .turn_order
            .iter()
            .map(|entry| entry.name.as_str())
            .collect();
        // Rebuild restores strict ordering: Anya(18) first, then the now
        // driverless vehicles by name.
        assert_eq!(order, vec!["Anya", "Alpha", "Bravo"]);
    }

    #[test]
    fn round_advance_expires_round_mishaps() {
        let mut snapshot = setup_snapshot();
        let mut rng = rng();
        snapshot = apply(&snapshot, &EncounterEvent::StartCombat, &mut rng);
        snapshot
            .vehicle_mut("va")
            .unwrap()
            .mishaps
            .push(ActiveMishap {
                id: "m1".to_string(),
                entry: crate::mishap::MishapEntry {
                    name: "Jammed Controls".to_string(),
                    lower: 7,
                    upper: 8,
                    stackable: false,
                    effect: crate::mishap::MishapEffect::ControlsJammed,
                    duration: MishapDuration::Rounds(2),
                    repair: None,
                },
                remaining: MishapDuration::Rounds(2),
            });

        snapshot = apply(&snapshot, &EncounterEvent::NextRound, &mut rng);
        assert_eq!(snapshot.vehicle("va").unwrap().mishaps.len(), 1);
        snapshot = apply(&snapshot, &EncounterEvent::NextRound, &mut rng);
        assert!(snapshot.vehicle("va").unwrap().mishaps.is_empty());
    }

    #[test]
    fn complication_applies_effects_once_all_resolved() {
        let mut snapshot = setup_snapshot();
        let mut rng = rng();
        snapshot = apply(
            &snapshot,
            &EncounterEvent::AddCreature {
                creature: creature("driver-a", "Anya", 14),
            },
            &mut rng,
        );
        snapshot = apply(
            &snapshot,
            &EncounterEvent::AssignCrew {
                creature_id: "driver-a".to_string(),
                vehicle_id: "va".to_string(),
                station_index: 0,
            },
            &mut rng,
        );
        snapshot = apply(&snapshot, &EncounterEvent::StartCombat, &mut rng);

        let entry = crate::complication::ComplicationEntry {
            name: "Obstacle Field".to_string(),
            lower: 1,
            upper: 3,
            difficulty: 15,
            save: crate::creature::Ability::Dex,
            effect: ComplicationEffect::HalveSpeed,
        };
        snapshot.complication = Some(ActiveComplication::start(
            entry,
            2,
            ["va".to_string(), "vb".to_string()],
        ));

        // Driverless vehicle cannot enter a save result.
        let attempt = apply(
            &snapshot,
            &EncounterEvent::ResolveComplicationSave {
                vehicle_id: "vb".to_string(),
                total: 20,
            },
            &mut rng,
        );
        assert_eq!(attempt, snapshot);

        snapshot = apply(
            &snapshot,
            &EncounterEvent::ResolveComplicationSave {
                vehicle_id: "va".to_string(),
                total: 9,
            },
            &mut rng,
        );
        // One record still pending: no effect yet.
        assert!(snapshot.complication.is_some());
        assert!(snapshot.vehicle("va").unwrap().speed_mods.is_empty());

        snapshot = apply(
            &snapshot,
            &EncounterEvent::FailComplication {
                vehicle_id: "vb".to_string(),
            },
            &mut rng,
        );
        assert!(snapshot.complication.is_none());
        assert_eq!(snapshot.vehicle("va").unwrap().speed_mods.len(), 1);
        assert_eq!(snapshot.vehicle("va").unwrap().effective_speed(), 30);
        assert_eq!(snapshot.vehicle("vb").unwrap().speed_mods.len(), 1);
    }

    #[test]
    fn skipped_vehicles_take_no_effect() {
        let mut snapshot = setup_snapshot();
        let mut rng = rng();
        snapshot = apply(&snapshot, &EncounterEvent::StartCombat, &mut rng);
        let entry = crate::complication::ComplicationEntry {
            name: "Loose Ground".to_string(),
            lower: 4,
            upper: 6,
            difficulty: 12,
            save: crate::creature::Ability::Str,
            effect: ComplicationEffect::SpeedLoss { amount: 10 },
        };
        snapshot.complication = Some(ActiveComplication::start(
            entry,
            5,
            ["va".to_string(), "vb".to_string()],
        ));
        snapshot = apply(
            &snapshot,
            &EncounterEvent::SkipComplication {
                vehicle_id: "va".to_string(),
            },
            &mut rng,
        );
        snapshot = apply(
            &snapshot,
            &EncounterEvent::FailComplication {
                vehicle_id: "vb".to_string(),
            },
            &mut rng,
        );
        assert_eq!(snapshot.vehicle("va").unwrap().current_speed, 60);
        assert_eq!(snapshot.vehicle("vb").unwrap().current_speed, 50);
    }
}
