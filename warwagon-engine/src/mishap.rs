//! Mishap table and selector.
//!
//! The catalog is a fixed table of mechanical failures keyed by inclusive
//! d20 ranges. Selection rerolls to avoid outcomes with no remaining effect:
//! the table must never present a mechanically meaningless result, such as a
//! second locked steering while the first is still active.

use crate::constants::MISHAP_REROLL_LIMIT;
use crate::creature::Ability;
use crate::vehicle::Vehicle;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

/// How long a mishap stays on the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MishapDuration {
    /// Resolves in the moment it lands; never stored on the vehicle.
    Instant,
    UntilRepaired,
    Rounds(u32),
}

/// Mechanical consequence of a mishap.
///
/// The stackable kinds accumulate against an underlying resource; the unit
/// kinds are status conditions where a second instance would be redundant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MishapEffect {
    SpeedLoss { amount: i32 },
    ThresholdLoss { amount: i32 },
    WeaponDisabled,
    SteeringLocked,
    ControlsJammed,
    OnFire,
    Catastrophic,
}

/// Check that clears a repairable mishap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairSpec {
    pub ability: Ability,
    pub difficulty: i32,
}

/// One row of the mishap catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MishapEntry {
    pub name: String,
    /// Inclusive d20 range this entry covers.
    pub lower: u8,
    pub upper: u8,
    #[serde(default)]
    pub stackable: bool,
    pub effect: MishapEffect,
    pub duration: MishapDuration,
    /// Absent on the most severe tier: those need narrative resolution.
    #[serde(default)]
    pub repair: Option<RepairSpec>,
}

impl MishapEntry {
    #[must_use]
    pub const fn matches_roll(&self, roll: u8) -> bool {
        roll >= self.lower && roll <= self.upper
    }
}

/// An instance of a mishap applied to a specific vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMishap {
    pub id: String,
    pub entry: MishapEntry,
    pub remaining: MishapDuration,
}

/// Errors raised when catalog data violates its documented shape.
#[derive(Debug, Error)]
pub enum MishapCatalogError {
    #[error("mishap data is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no catalog entry covers roll {roll}")]
    Gap { roll: u8 },
    #[error("multiple catalog entries cover roll {roll}")]
    Overlap { roll: u8 },
    #[error("entry {name:?} has inverted range {lower}-{upper}")]
    InvertedRange { name: String, lower: u8, upper: u8 },
}

/// The full mishap table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MishapCatalog {
    pub entries: Vec<MishapEntry>,
}

impl MishapCatalog {
    /// Parse and validate a catalog: every roll 1-20 must map to exactly
    /// one entry.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON, inverted ranges, gaps, or
    /// overlapping ranges.
    pub fn from_json(json: &str) -> Result<Self, MishapCatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), MishapCatalogError> {
        for entry in &self.entries {
            if entry.lower > entry.upper {
                return Err(MishapCatalogError::InvertedRange {
                    name: entry.name.clone(),
                    lower: entry.lower,
                    upper: entry.upper,
                });
            }
        }
        for roll in 1..=20 {
            let covering = self
                .entries
                .iter()
                .filter(|entry| entry.matches_roll(roll))
                .count();
            if covering == 0 {
                return Err(MishapCatalogError::Gap { roll });
            }
            if covering > 1 {
                return Err(MishapCatalogError::Overlap { roll });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn entry_for_roll(&self, roll: u8) -> Option<&MishapEntry> {
        self.entries.iter().find(|entry| entry.matches_roll(roll))
    }
}

const MISHAPS_DATA: &str = include_str!("../assets/mishaps.json");

/// The stock mishap catalog embedded in the crate.
///
/// # Panics
///
/// Panics if the embedded catalog fails validation; the shape is covered by
/// tests, so a panic here means a broken build, not bad user input.
#[must_use]
pub fn mishap_catalog() -> &'static MishapCatalog {
    static CATALOG: OnceLock<MishapCatalog> = OnceLock::new();
    CATALOG.get_or_init(|| {
        MishapCatalog::from_json(MISHAPS_DATA).expect("embedded mishap catalog is valid")
    })
}

/// Whether an entry can still do something to this vehicle.
#[must_use]
pub fn entry_available(entry: &MishapEntry, vehicle: &Vehicle) -> bool {
    if !entry.stackable && vehicle.has_mishap_named(&entry.name) {
        return false;
    }
    match entry.effect {
        MishapEffect::SpeedLoss { .. } => vehicle.base_speed_after_mishaps() > 0,
        MishapEffect::ThresholdLoss { .. } => vehicle.effective_threshold() > 0,
        MishapEffect::WeaponDisabled => {
            vehicle.disabled_weapon_count() < vehicle.template.weapons.len()
        }
        MishapEffect::SteeringLocked
        | MishapEffect::ControlsJammed
        | MishapEffect::OnFire
        | MishapEffect::Catastrophic => true,
    }
}

/// Outcome of one mishap selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MishapRoll {
    /// The d20 value that landed on the chosen entry. When the selector
    /// falls back to a uniform pick, this is the entry's lower bound.
    pub roll: u8,
    pub entry: MishapEntry,
    /// How many redraws it took to land on an available outcome.
    pub rerolls: u32,
}

/// Select a mishap for the vehicle from the stock catalog.
///
/// Returns `None` when every outcome is unavailable; the caller should log
/// that as a user-visible "no effect" event.
pub fn roll_mishap_for_vehicle<R: Rng + ?Sized>(
    vehicle: &Vehicle,
    rng: &mut R,
) -> Option<MishapRoll> {
    roll_mishap_with_catalog(mishap_catalog(), vehicle, rng)
}

/// Selection against an explicit catalog; the reroll policy lives here.
pub fn roll_mishap_with_catalog<R: Rng + ?Sized>(
    catalog: &MishapCatalog,
    vehicle: &Vehicle,
    rng: &mut R,
) -> Option<MishapRoll> {
    let available: Vec<&MishapEntry> = catalog
        .entries
        .iter()
        .filter(|entry| entry_available(entry, vehicle))
        .collect();
    if available.is_empty() {
        return None;
    }

    let mut rerolls = 0;
    while rerolls <= MISHAP_REROLL_LIMIT {
        let roll = rng.gen_range(1..=20_u8);
        let Some(entry) = catalog.entry_for_roll(roll) else {
            break;
        };
        if entry_available(entry, vehicle) {
            return Some(MishapRoll {
                roll,
                entry: entry.clone(),
                rerolls,
            });
        }
        rerolls += 1;
    }

    // Retries exhausted: uniform pick among the known-available outcomes.
    let index = rng.gen_range(0..available.len());
    let entry = available[index].clone();
    Some(MishapRoll {
        roll: entry.lower,
        entry,
        rerolls,
    })
}
