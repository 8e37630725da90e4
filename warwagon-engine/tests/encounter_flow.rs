//! Scenario sweeps over the encounter state machine.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use warwagon_engine::{
    CombatantRef, Creature, EncounterEvent, EncounterSnapshot, Faction, LogKind, Phase, Statblock,
    VehicleTemplate, apply, stock_templates,
};

fn rng(seed: u64) -> ChaCha20Rng {
    ChaCha20Rng::seed_from_u64(seed)
}

fn template() -> VehicleTemplate {
    stock_templates()
        .by_name("Scout Skiff")
        .expect("stock skiff exists")
        .clone()
}

fn creature(id: &str, name: &str, initiative: i32) -> Creature {
    let mut creature = Creature::new(id, name, Statblock::default());
    creature.initiative = initiative;
    creature
}

fn add_vehicle(
    snapshot: &EncounterSnapshot,
    rng: &mut ChaCha20Rng,
    id: &str,
    name: &str,
    x: f32,
) -> EncounterSnapshot {
    apply(
        snapshot,
        &EncounterEvent::AddVehicle {
            id: id.to_string(),
            name: name.to_string(),
            faction: Faction::Party,
            template: template(),
            position: Some(warwagon_engine::Position::new(x, 0.0)),
            facing: 0.0,
        },
        rng,
    )
}

fn assign(
    snapshot: &EncounterSnapshot,
    rng: &mut ChaCha20Rng,
    creature_id: &str,
    vehicle_id: &str,
    station: usize,
) -> EncounterSnapshot {
    apply(
        snapshot,
        &EncounterEvent::AssignCrew {
            creature_id: creature_id.to_string(),
            vehicle_id: vehicle_id.to_string(),
            station_index: station,
        },
        rng,
    )
}

#[test]
fn lethal_hit_ejects_crew_and_rolls_mishap() {
    let mut rng = rng(7);
    let mut snapshot = EncounterSnapshot::new("Destruction Scenario");
    snapshot = add_vehicle(&snapshot, &mut rng, "v1", "Doomed Wagon", 100.0);
    // Scout Skiff has 50 max HP; pin the scenario at 40.
    snapshot.vehicle_mut("v1").unwrap().hp = 40;
    snapshot = apply(
        &snapshot,
        &EncounterEvent::AddCreature {
            creature: creature("c1", "Pilot", 12),
        },
        &mut rng,
    );
    snapshot = apply(
        &snapshot,
        &EncounterEvent::AddCreature {
            creature: creature("c2", "Gunner", 8),
        },
        &mut rng,
    );
    snapshot = assign(&snapshot, &mut rng, "c1", "v1", 0);
    snapshot = assign(&snapshot, &mut rng, "c2", "v1", 1);
    snapshot = apply(&snapshot, &EncounterEvent::StartCombat, &mut rng);
    assert!(
        snapshot
            .turn_order
            .iter()
            .any(|entry| entry.combatant == CombatantRef::Vehicle("v1".to_string()))
    );

    snapshot = apply(
        &snapshot,
        &EncounterEvent::DamageVehicle {
            vehicle_id: "v1".to_string(),
            amount: 45,
        },
        &mut rng,
    );

    let vehicle = snapshot.vehicle("v1").unwrap();
    assert_eq!(vehicle.hp, 0);
    assert!(!vehicle.operative);

    // No assignment may reference the wreck, and both crew stand within
    // the ejection radius of its former position.
    assert!(snapshot.crew.is_empty());
    let origin = vehicle.position.unwrap();
    for id in ["c1", "c2"] {
        let creature = snapshot.creature(id).unwrap();
        let position = creature.position.expect("ejected crew gain a position");
        assert!(position.distance_to(origin) <= 15.0 + 1e-3);
    }

    // The wreck left the order; the crew joined it.
    assert!(
        !snapshot
            .turn_order
            .iter()
            .any(|entry| entry.combatant == CombatantRef::Vehicle("v1".to_string()))
    );
    for id in ["c1", "c2"] {
        assert!(
            snapshot
                .turn_order
                .iter()
                .any(|entry| entry.combatant == CombatantRef::Creature(id.to_string()))
        );
    }

    // 45 >= threshold 10, so a mishap roll happened and was logged.
    assert!(snapshot.log.iter().any(|entry| entry.kind == LogKind::Mishap));
    assert!(
        snapshot
            .log
            .iter()
            .any(|entry| entry.kind == LogKind::Destruction && entry.message.contains("2 crew"))
    );
}

#[test]
fn undriven_vehicles_sort_after_any_creature() {
    let mut rng = rng(11);
    let mut snapshot = EncounterSnapshot::new("Ordering Scenario");
    snapshot = add_vehicle(&snapshot, &mut rng, "va", "Vanguard", 0.0);
    snapshot = add_vehicle(&snapshot, &mut rng, "vb", "Baggage Cart", 30.0);
    snapshot = apply(
        &snapshot,
        &EncounterEvent::AddCreature {
            creature: creature("drv", "Driver", 14),
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
    snapshot = assign(&snapshot, &mut rng, "drv", "va", 0);
    snapshot = apply(&snapshot, &EncounterEvent::StartCombat, &mut rng);

    let names: Vec<&str> = snapshot
        .turn_order
        .iter()
        .map(|entry| entry.name.as_str())
        .collect();
    assert_eq!(names, vec!["Vanguard", "Straggler", "Baggage Cart"]);
    assert_eq!(snapshot.turn_order[0].initiative, 14);
    assert_eq!(snapshot.turn_order[1].initiative, 9);
}

#[test]
fn turn_order_stays_a_permutation_of_the_roster() {
    let mut rng = rng(13);
    let mut snapshot = EncounterSnapshot::new("Permutation Property");
    snapshot = add_vehicle(&snapshot, &mut rng, "va", "Vanguard", 0.0);
    snapshot = add_vehicle(&snapshot, &mut rng, "vb", "Rearguard", 60.0);
    for (id, name, initiative) in [
        ("c1", "Anya", 18),
        ("c2", "Boris", 11),
        ("c3", "Cass", 4),
    ] {
        snapshot = apply(
            &snapshot,
            &EncounterEvent::AddCreature {
                creature: creature(id, name, initiative),
            },
            &mut rng,
        );
    }
    snapshot = assign(&snapshot, &mut rng, "c1", "va", 0);
    snapshot = apply(&snapshot, &EncounterEvent::StartCombat, &mut rng);

    let events = [
        EncounterEvent::NextTurn,
        EncounterEvent::UnassignCrew {
            creature_id: "c1".to_string(),
        },
        EncounterEvent::DamageVehicle {
            vehicle_id: "vb".to_string(),
            amount: 60,
        },
        EncounterEvent::NextRound,
        EncounterEvent::AssignCrew {
            creature_id: "c2".to_string(),
            vehicle_id: "va".to_string(),
            station_index: 1,
        },
        EncounterEvent::NextTurn,
        EncounterEvent::NextRound,
    ];
    for event in &events {
        snapshot = apply(&snapshot, event, &mut rng);

        let mut expected: Vec<CombatantRef> = Vec::new();
        for vehicle in snapshot.vehicles.iter().filter(|vehicle| vehicle.operative) {
            expected.push(CombatantRef::Vehicle(vehicle.id.clone()));
        }
        for creature in &snapshot.creatures {
            if !snapshot.is_creature_crewed(&creature.id) {
                expected.push(CombatantRef::Creature(creature.id.clone()));
            }
        }
        assert_eq!(
            snapshot.turn_order.len(),
            expected.len(),
            "order drifted after {event:?}"
        );
        for combatant in &expected {
            assert!(
                snapshot
                    .turn_order
                    .iter()
                    .any(|entry| &entry.combatant == combatant),
                "{combatant:?} missing after {event:?}"
            );
        }
    }
}

#[test]
fn driverless_vehicle_can_never_pass_a_complication() {
    let mut rng = rng(17);
    let mut snapshot = EncounterSnapshot::new("Complication Scenario");
    snapshot = add_vehicle(&snapshot, &mut rng, "va", "Crewed", 0.0);
    snapshot = add_vehicle(&snapshot, &mut rng, "vb", "Empty", 50.0);
    snapshot = apply(
        &snapshot,
        &EncounterEvent::AddCreature {
            creature: creature("drv", "Driver", 12),
        },
        &mut rng,
    );
    snapshot = assign(&snapshot, &mut rng, "drv", "va", 0);
    snapshot = apply(&snapshot, &EncounterEvent::StartCombat, &mut rng);

    snapshot.complication = Some(warwagon_engine::ActiveComplication::start(
        warwagon_engine::ComplicationEntry {
            name: "Obstacle Field".to_string(),
            lower: 1,
            upper: 3,
            difficulty: 15,
            save: warwagon_engine::Ability::Dex,
            effect: warwagon_engine::ComplicationEffect::HalveSpeed,
        },
        2,
        ["va".to_string(), "vb".to_string()],
    ));

    // The crewed vehicle rolls with its driver's dex; the empty hull has
    // no save bonus to offer.
    assert_eq!(snapshot.complication_save_bonus("va"), Some(0));
    assert_eq!(snapshot.complication_save_bonus("vb"), None);

    // A save total, however high, does nothing for the driverless hull.
    let attempt = apply(
        &snapshot,
        &EncounterEvent::ResolveComplicationSave {
            vehicle_id: "vb".to_string(),
            total: 30,
        },
        &mut rng,
    );
    assert_eq!(attempt, snapshot);

    snapshot = apply(
        &snapshot,
        &EncounterEvent::ResolveComplicationSave {
            vehicle_id: "va".to_string(),
            total: 17,
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

    assert!(snapshot.complication.is_none());
    // The passing vehicle is untouched; the auto-failed one is slowed.
    assert!(snapshot.vehicle("va").unwrap().speed_mods.is_empty());
    assert_eq!(snapshot.vehicle("vb").unwrap().speed_mods.len(), 1);
}

#[test]
fn saved_snapshots_reload_with_equal_content() {
    let mut rng = rng(19);
    let mut snapshot = EncounterSnapshot::new("Round Trip");
    snapshot = add_vehicle(&snapshot, &mut rng, "va", "Vanguard", 12.0);
    snapshot = apply(
        &snapshot,
        &EncounterEvent::AddCreature {
            creature: creature("c1", "Anya", 16),
        },
        &mut rng,
    );
    snapshot = assign(&snapshot, &mut rng, "c1", "va", 0);
    snapshot = apply(&snapshot, &EncounterEvent::StartCombat, &mut rng);
    snapshot = apply(
        &snapshot,
        &EncounterEvent::DamageVehicle {
            vehicle_id: "va".to_string(),
            amount: 15,
        },
        &mut rng,
    );

    let json = serde_json::to_string(&snapshot).expect("snapshot serializes");
    let reloaded: EncounterSnapshot = serde_json::from_str(&json).expect("snapshot parses");
    let migrated = reloaded.migrate();

    assert_eq!(migrated.vehicles, snapshot.vehicles);
    assert_eq!(migrated.creatures, snapshot.creatures);
    assert_eq!(migrated.crew, snapshot.crew);
    assert_eq!(migrated.turn_order, snapshot.turn_order);
    assert_eq!(migrated.round, snapshot.round);
    assert_eq!(migrated.phase, Phase::Combat);
}

#[test]
fn legacy_saves_without_factions_are_defaulted() {
    let mut snapshot = EncounterSnapshot::new("Legacy Save");
    let mut fiend = Creature::new(
        "c1",
        "Chain Devil",
        Statblock {
            creature_type: "fiend".to_string(),
            ..Statblock::default()
        },
    );
    fiend.faction = None;
    snapshot.creatures.push(fiend);
    let mut pc = Creature::new("c2", "Vex", Statblock::default());
    pc.player_controlled = true;
    pc.faction = None;
    snapshot.creatures.push(pc);

    let json = serde_json::to_string(&snapshot).unwrap();
    let migrated: EncounterSnapshot = serde_json::from_str(&json).unwrap();
    let migrated = migrated.migrate();
    assert_eq!(migrated.creature("c1").unwrap().faction, Some(Faction::Enemy));
    assert_eq!(migrated.creature("c2").unwrap().faction, Some(Faction::Party));
}
