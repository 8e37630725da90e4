//! Mutable vehicle combat state.
//!
//! Hull arithmetic is clamped rather than rejected: damage and repairs keep
//! HP inside `[0, max]`, and speed inside `[0, base]`. Whether a hit also
//! triggers mishaps or destruction side effects is the engine's call.

use crate::creature::Faction;
use crate::geometry::Position;
use crate::mishap::{ActiveMishap, MishapEffect};
use crate::template::VehicleTemplate;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// How long a speed modifier stays in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierScope {
    ThisTurn,
    ThisRound,
    UntilCleared,
}

/// A transient multiplier on a vehicle's speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedModifier {
    pub multiplier: f32,
    pub scope: ModifierScope,
    /// Round the modifier was applied in.
    #[serde(default)]
    pub applied_round: u32,
    /// Turn index the modifier was applied in.
    #[serde(default)]
    pub applied_turn: usize,
}

/// Result of a single hull hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HullHit {
    /// The hit fell below the damage threshold and was shrugged off.
    Shrugged,
    Damaged,
    /// This hit brought the vehicle from positive HP to zero.
    Destroyed,
}

/// A vehicle participating in the encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub faction: Faction,
    pub template: VehicleTemplate,
    pub hp: i32,
    #[serde(default)]
    pub current_speed: i32,
    #[serde(default)]
    pub facing: f32,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub mishaps: Vec<ActiveMishap>,
    #[serde(default)]
    pub speed_mods: SmallVec<[SpeedModifier; 4]>,
    #[serde(default = "Vehicle::default_operative")]
    pub operative: bool,
}

impl Vehicle {
    const fn default_operative() -> bool {
        true
    }

    #[must_use]
    pub fn from_template(
        id: impl Into<String>,
        name: impl Into<String>,
        faction: Faction,
        template: VehicleTemplate,
    ) -> Self {
        let hp = template.max_hp;
        let current_speed = template.base_speed;
        Self {
            id: id.into(),
            name: name.into(),
            faction,
            template,
            hp,
            current_speed,
            facing: 0.0,
            position: None,
            mishaps: Vec::new(),
            speed_mods: SmallVec::new(),
            operative: true,
        }
    }

    /// Apply one hit to the hull.
    ///
    /// Hits strictly below the damage threshold are shrugged off entirely.
    /// Reaching zero HP marks the vehicle inoperative; the engine handles
    /// crew ejection and turn-order removal.
    pub fn apply_hull_damage(&mut self, amount: i32) -> HullHit {
        if amount <= 0 || amount < self.template.damage_threshold {
            return HullHit::Shrugged;
        }
        let was_alive = self.hp > 0;
        self.hp = (self.hp - amount).max(0);
        if self.hp == 0 {
            self.operative = false;
            if was_alive {
                return HullHit::Destroyed;
            }
        }
        HullHit::Damaged
    }

    /// Restore hull HP, clamping to the template maximum. Wrecks stay
    /// inoperative regardless of the repaired value.
    pub fn repair_hull(&mut self, amount: i32) {
        if amount <= 0 {
            return;
        }
        self.hp = (self.hp + amount).min(self.template.max_hp);
    }

    /// Set the vehicle's speed directly, clamped into `[0, base]`.
    pub fn set_speed(&mut self, value: i32) {
        self.current_speed = value.clamp(0, self.template.base_speed);
    }

    /// Total speed loss from active mishaps.
    #[must_use]
    pub fn speed_loss_total(&self) -> i32 {
        self.mishaps
            .iter()
            .map(|mishap| match mishap.entry.effect {
                MishapEffect::SpeedLoss { amount } => amount,
                _ => 0,
            })
            .sum()
    }

    /// Total mishap-threshold loss from active mishaps.
    #[must_use]
    pub fn threshold_loss_total(&self) -> i32 {
        self.mishaps
            .iter()
            .map(|mishap| match mishap.entry.effect {
                MishapEffect::ThresholdLoss { amount } => amount,
                _ => 0,
            })
            .sum()
    }

    /// Number of weapons currently knocked out by mishaps.
    #[must_use]
    pub fn disabled_weapon_count(&self) -> usize {
        self.mishaps
            .iter()
            .filter(|mishap| matches!(mishap.entry.effect, MishapEffect::WeaponDisabled))
            .count()
    }

    /// Speed before transient modifiers: current speed minus mishap losses.
    #[must_use]
    pub fn base_speed_after_mishaps(&self) -> i32 {
        (self.current_speed - self.speed_loss_total()).max(0)
    }

    /// Effective speed after mishaps and all active speed modifiers.
    #[must_use]
    pub fn effective_speed(&self) -> i32 {
        let mut speed = self.base_speed_after_mishaps() as f32;
        for modifier in &self.speed_mods {
            speed *= modifier.multiplier.max(0.0);
        }
        (speed.round() as i32).max(0)
    }

    /// Mishap threshold after accumulated threshold losses, floored at 0.
    #[must_use]
    pub fn effective_threshold(&self) -> i32 {
        (self.template.mishap_threshold - self.threshold_loss_total()).max(0)
    }

    #[must_use]
    pub fn has_mishap_named(&self, name: &str) -> bool {
        self.mishaps.iter().any(|mishap| mishap.entry.name == name)
    }

    pub fn add_speed_mod(&mut self, modifier: SpeedModifier) {
        self.speed_mods.push(modifier);
    }

    pub fn clear_speed_mods(&mut self) {
        self.speed_mods.clear();
    }

    /// Drop modifiers whose scope ended before the given round and turn.
    pub fn expire_speed_mods(&mut self, round: u32, turn_index: usize) {
        self.speed_mods.retain(|modifier| match modifier.scope {
            ModifierScope::UntilCleared => true,
            ModifierScope::ThisRound => modifier.applied_round >= round,
            ModifierScope::ThisTurn => {
                modifier.applied_round > round
                    || (modifier.applied_round == round && modifier.applied_turn >= turn_index)
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mishap::{MishapDuration, MishapEntry};

    fn test_template() -> VehicleTemplate {
        let mut template = VehicleTemplate {
            name: "Test Wagon".to_string(),
            max_hp: 40,
            armor_class: 18,
            base_speed: 60,
            damage_threshold: 5,
            mishap_threshold: 10,
            stations: Vec::new(),
            weapons: Vec::new(),
        };
        template.finalize();
        template
    }

    fn active(entry: MishapEntry) -> ActiveMishap {
        ActiveMishap {
            id: "m1".to_string(),
            remaining: entry.duration,
            entry,
        }
    }

    fn speed_loss_entry(amount: i32) -> MishapEntry {
        MishapEntry {
            name: "Gouged Wheels".to_string(),
            lower: 4,
            upper: 6,
            stackable: true,
            effect: MishapEffect::SpeedLoss { amount },
            duration: MishapDuration::UntilRepaired,
            repair: None,
        }
    }

    #[test]
    fn small_hits_are_shrugged() {
        let mut vehicle = Vehicle::from_template("v1", "Wagon", Faction::Party, test_template());
        assert_eq!(vehicle.apply_hull_damage(4), HullHit::Shrugged);
        assert_eq!(vehicle.hp, 40);
        assert_eq!(vehicle.apply_hull_damage(-3), HullHit::Shrugged);
        assert_eq!(vehicle.hp, 40);
    }

    #[test]
    fn lethal_hit_marks_inoperative_once() {
        let mut vehicle = Vehicle::from_template("v1", "Wagon", Faction::Party, test_template());
        assert_eq!(vehicle.apply_hull_damage(45), HullHit::Destroyed);
        assert_eq!(vehicle.hp, 0);
        assert!(!vehicle.operative);
        // Further hits on the wreck are plain damage, not a new destruction.
        assert_eq!(vehicle.apply_hull_damage(10), HullHit::Damaged);
    }

    #[test]
    fn repair_clamps_and_keeps_wrecks_dead() {
        let mut vehicle = Vehicle::from_template("v1", "Wagon", Faction::Party, test_template());
        vehicle.apply_hull_damage(45);
        vehicle.repair_hull(100);
        assert_eq!(vehicle.hp, 40);
        assert!(!vehicle.operative);
    }

    #[test]
    fn effective_speed_applies_losses_then_modifiers() {
        let mut vehicle = Vehicle::from_template("v1", "Wagon", Faction::Party, test_template());
        vehicle.mishaps.push(active(speed_loss_entry(20)));
        assert_eq!(vehicle.base_speed_after_mishaps(), 40);
        vehicle.add_speed_mod(SpeedModifier {
            multiplier: 0.5,
            scope: ModifierScope::ThisRound,
            applied_round: 1,
            applied_turn: 0,
        });
        assert_eq!(vehicle.effective_speed(), 20);
        vehicle.mishaps.push(active(speed_loss_entry(50)));
        assert_eq!(vehicle.base_speed_after_mishaps(), 0);
        assert_eq!(vehicle.effective_speed(), 0);
    }

    #[test]
    fn speed_mod_expiry_honors_scopes() {
        let mut vehicle = Vehicle::from_template("v1", "Wagon", Faction::Party, test_template());
        vehicle.add_speed_mod(SpeedModifier {
            multiplier: 0.5,
            scope: ModifierScope::ThisRound,
            applied_round: 1,
            applied_turn: 0,
        });
        vehicle.add_speed_mod(SpeedModifier {
            multiplier: 0.75,
            scope: ModifierScope::ThisTurn,
            applied_round: 1,
            applied_turn: 0,
        });
        vehicle.add_speed_mod(SpeedModifier {
            multiplier: 0.9,
            scope: ModifierScope::UntilCleared,
            applied_round: 1,
            applied_turn: 0,
        });

        // Advancing to turn 1 drops only the this-turn modifier.
        vehicle.expire_speed_mods(1, 1);
        assert_eq!(vehicle.speed_mods.len(), 2);
        // Advancing to round 2 drops the this-round modifier as well.
        vehicle.expire_speed_mods(2, 0);
        assert_eq!(vehicle.speed_mods.len(), 1);
        assert_eq!(vehicle.speed_mods[0].scope, ModifierScope::UntilCleared);
    }

    #[test]
    fn threshold_degrades_and_floors() {
        let mut vehicle = Vehicle::from_template("v1", "Wagon", Faction::Party, test_template());
        assert_eq!(vehicle.effective_threshold(), 10);
        vehicle.mishaps.push(active(MishapEntry {
            name: "Shaken Frame".to_string(),
            lower: 1,
            upper: 3,
            stackable: true,
            effect: MishapEffect::ThresholdLoss { amount: 6 },
            duration: MishapDuration::UntilRepaired,
            repair: None,
        }));
        assert_eq!(vehicle.effective_threshold(), 4);
        vehicle.mishaps.push(active(MishapEntry {
            name: "Shaken Frame".to_string(),
            lower: 1,
            upper: 3,
            stackable: true,
            effect: MishapEffect::ThresholdLoss { amount: 6 },
            duration: MishapDuration::UntilRepaired,
            repair: None,
        }));
        assert_eq!(vehicle.effective_threshold(), 0);
    }
}
