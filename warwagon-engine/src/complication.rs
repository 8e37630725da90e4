//! Battlefield complications and their resolution workflow.
//!
//! One complication may be in flight at a time. Triggering one opens a
//! pending resolution record per operative vehicle; effects are computed
//! only once every record is non-pending, and only against the failures, so
//! nothing depends on the order saves come in.

use crate::constants::COMPLICATION_CUTOFF;
use crate::creature::Ability;
use crate::scale::Scale;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

/// What happens to a vehicle that failed its save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplicationEffect {
    /// Speed halved for the rest of the current round.
    HalveSpeed,
    /// Flat speed reduction applied to the vehicle's current speed.
    SpeedLoss { amount: i32 },
    /// A hull hit, subject to the usual threshold and mishap rules.
    HullDamage { amount: i32 },
}

/// One row of a per-scale complication table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplicationEntry {
    pub name: String,
    /// Inclusive d20 range this entry covers, at or below the cutoff.
    pub lower: u8,
    pub upper: u8,
    pub difficulty: i32,
    pub save: Ability,
    pub effect: ComplicationEffect,
}

impl ComplicationEntry {
    #[must_use]
    pub const fn matches_roll(&self, roll: u8) -> bool {
        roll >= self.lower && roll <= self.upper
    }
}

/// Errors raised when complication data violates its documented shape.
#[derive(Debug, Error)]
pub enum ComplicationCatalogError {
    #[error("complication data is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("scale {scale} has no table")]
    MissingScale { scale: Scale },
    #[error("scale {scale} roll {roll} is covered by {covering} entries")]
    BadCoverage { scale: Scale, roll: u8, covering: usize },
}

/// Per-scale complication tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplicationCatalog {
    pub tables: HashMap<Scale, Vec<ComplicationEntry>>,
}

impl ComplicationCatalog {
    /// Parse and validate: every scale needs a table covering each roll up
    /// to the cutoff exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON, a missing scale, or bad roll
    /// coverage.
    pub fn from_json(json: &str) -> Result<Self, ComplicationCatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), ComplicationCatalogError> {
        for scale in Scale::all() {
            let Some(table) = self.tables.get(&scale) else {
                return Err(ComplicationCatalogError::MissingScale { scale });
            };
            for roll in 1..=COMPLICATION_CUTOFF {
                let covering = table.iter().filter(|entry| entry.matches_roll(roll)).count();
                if covering != 1 {
                    return Err(ComplicationCatalogError::BadCoverage {
                        scale,
                        roll,
                        covering,
                    });
                }
            }
        }
        Ok(())
    }

    /// The entry for a d20 roll at the given scale. Rolls above the cutoff
    /// mean no complication.
    #[must_use]
    pub fn entry_for(&self, scale: Scale, roll: u8) -> Option<&ComplicationEntry> {
        if roll > COMPLICATION_CUTOFF {
            return None;
        }
        self.tables
            .get(&scale)?
            .iter()
            .find(|entry| entry.matches_roll(roll))
    }
}

const COMPLICATIONS_DATA: &str = include_str!("../assets/complications.json");

/// The stock complication catalog embedded in the crate.
///
/// # Panics
///
/// Panics if the embedded catalog fails validation; the shape is covered by
/// tests, so a panic here means a broken build, not bad user input.
#[must_use]
pub fn complication_catalog() -> &'static ComplicationCatalog {
    static CATALOG: OnceLock<ComplicationCatalog> = OnceLock::new();
    CATALOG.get_or_init(|| {
        ComplicationCatalog::from_json(COMPLICATIONS_DATA)
            .expect("embedded complication catalog is valid")
    })
}

/// Draw the complication roll for the current scale.
pub fn roll_complication<R: Rng + ?Sized>(
    scale: Scale,
    rng: &mut R,
) -> (u8, Option<ComplicationEntry>) {
    let roll = rng.gen_range(1..=20_u8);
    let entry = complication_catalog().entry_for(scale, roll).cloned();
    (roll, entry)
}

/// Where one vehicle stands against the active complication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    #[default]
    Pending,
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplicationResolution {
    pub vehicle_id: String,
    #[serde(default)]
    pub status: ResolutionStatus,
    /// Saving-throw total entered for this vehicle, when one was rolled.
    #[serde(default)]
    pub roll: Option<i32>,
}

/// The single in-flight complication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveComplication {
    pub entry: ComplicationEntry,
    /// The d20 that triggered this complication.
    pub rolled: u8,
    pub resolutions: Vec<ComplicationResolution>,
}

impl ActiveComplication {
    /// Open a pending record for every affected vehicle.
    #[must_use]
    pub fn start(
        entry: ComplicationEntry,
        rolled: u8,
        vehicle_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        let resolutions = vehicle_ids
            .into_iter()
            .map(|vehicle_id| ComplicationResolution {
                vehicle_id,
                status: ResolutionStatus::Pending,
                roll: None,
            })
            .collect();
        Self {
            entry,
            rolled,
            resolutions,
        }
    }

    #[must_use]
    pub fn resolution_mut(&mut self, vehicle_id: &str) -> Option<&mut ComplicationResolution> {
        self.resolutions
            .iter_mut()
            .find(|resolution| resolution.vehicle_id == vehicle_id)
    }

    /// True once no record is pending: time to apply effects and clear.
    #[must_use]
    pub fn all_resolved(&self) -> bool {
        self.resolutions
            .iter()
            .all(|resolution| resolution.status != ResolutionStatus::Pending)
    }

    /// Vehicles whose failed saves take the effect.
    pub fn failed_vehicles(&self) -> impl Iterator<Item = &str> {
        self.resolutions
            .iter()
            .filter(|resolution| resolution.status == ResolutionStatus::Failed)
            .map(|resolution| resolution.vehicle_id.as_str())
    }
}
