//! Centralized balance and tuning constants for the encounter engine.
//!
//! These values define the deterministic math for the core rules. Keeping
//! them together ensures that behavior can only be adjusted via code changes
//! reviewed in version control, rather than through external assets.

// Turn order ---------------------------------------------------------------
/// Initiative assigned to a vehicle with no driver. Far below any real
/// score so undriven vehicles always sort last.
pub const UNDRIVEN_INITIATIVE: i32 = i32::MIN / 2;

// Destruction & ejection ---------------------------------------------------
/// Distance from a destroyed vehicle at which ejected crew are placed.
pub const EJECTION_RADIUS: f32 = 15.0;

// Mishaps ------------------------------------------------------------------
/// Maximum redraws before the selector falls back to a uniform pick among
/// the available outcomes.
pub const MISHAP_REROLL_LIMIT: u32 = 8;

// Complications ------------------------------------------------------------
/// A complication roll above this value means nothing happens this round.
pub const COMPLICATION_CUTOFF: u8 = 12;

// Geometry & targeting -----------------------------------------------------
/// Reach of a weapon whose range field reads "melee".
pub const MELEE_RANGE: u32 = 5;
/// Range assumed when a weapon's range field cannot be parsed.
pub const DEFAULT_WEAPON_RANGE: u32 = 30;
/// Attack-roll modifier granted per unit of elevation difference.
pub const ELEVATION_MOD_PER_UNIT: f32 = 0.1;
/// Elevation attack modifiers never exceed this magnitude.
pub const ELEVATION_MOD_CAP: i32 = 2;
/// Extra weapon range per unit of elevation advantage held by the firer.
pub const RANGE_EXTENSION_PER_UNIT: f32 = 2.0;
/// Elevation differences smaller than this do not count as high ground.
pub const HIGH_GROUND_EPSILON: f32 = 0.5;

// Comparison tolerance used by tests and float checks.
pub const FLOAT_EPSILON: f32 = 1e-4;
