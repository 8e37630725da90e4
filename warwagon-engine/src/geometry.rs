//! Arc/elevation-aware targeting math.
//!
//! Pure functions over positions on a 2-D battlefield. Movement geometry is
//! deliberately limited to rectangular elevation zones and circle-distance
//! checks; nothing here owns state.

use crate::constants::{
    ELEVATION_MOD_CAP, ELEVATION_MOD_PER_UNIT, HIGH_GROUND_EPSILON, RANGE_EXTENSION_PER_UNIT,
};
use crate::template::{Arc, CoverClass, WeaponRange};
use serde::{Deserialize, Serialize};

/// A point on the battlefield, in distance units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_to(self, other: Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        Self {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
        }
    }
}

/// Axis-aligned rectangle, origin at the lower-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    #[must_use]
    pub fn contains(&self, point: Position) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.w
            && point.y >= self.y
            && point.y <= self.y + self.h
    }
}

/// A region of raised (or sunken) terrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationZone {
    pub id: String,
    pub rect: Rect,
    pub elevation: f32,
}

/// Elevation at a position: the highest zone containing it, or grade level.
#[must_use]
pub fn elevation_at(zones: &[ElevationZone], position: Position) -> f32 {
    zones
        .iter()
        .filter(|zone| zone.rect.contains(position))
        .map(|zone| zone.elevation)
        .fold(0.0_f32, f32::max)
}

/// Tunable rates for elevation effects on targeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    #[serde(default = "GeometryConfig::default_mod_per_unit")]
    pub elevation_mod_per_unit: f32,
    #[serde(default = "GeometryConfig::default_mod_cap")]
    pub elevation_mod_cap: i32,
    #[serde(default = "GeometryConfig::default_range_extension")]
    pub range_extension_per_unit: f32,
    #[serde(default = "GeometryConfig::default_high_ground_epsilon")]
    pub high_ground_epsilon: f32,
}

impl GeometryConfig {
    const fn default_mod_per_unit() -> f32 {
        ELEVATION_MOD_PER_UNIT
    }

    const fn default_mod_cap() -> i32 {
        ELEVATION_MOD_CAP
    }

    const fn default_range_extension() -> f32 {
        RANGE_EXTENSION_PER_UNIT
    }

    const fn default_high_ground_epsilon() -> f32 {
        HIGH_GROUND_EPSILON
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            elevation_mod_per_unit: Self::default_mod_per_unit(),
            elevation_mod_cap: Self::default_mod_cap(),
            range_extension_per_unit: Self::default_range_extension(),
            high_ground_epsilon: Self::default_high_ground_epsilon(),
        }
    }
}

fn normalize_degrees(angle: f32) -> f32 {
    let mut wrapped = angle % 360.0;
    if wrapped > 180.0 {
        wrapped -= 360.0;
    } else if wrapped <= -180.0 {
        wrapped += 360.0;
    }
    wrapped
}

/// Which arc of the target the observer attacks from.
///
/// The bearing is taken from the target to the midpoint between the two
/// combatants, rotated into the target's facing frame. Front covers the
/// 90-degree sector centered on the facing; an observer sitting exactly on
/// the target counts as front.
#[must_use]
pub fn attack_arc(observer: Position, target: Position, target_facing: f32) -> Arc {
    let midpoint = observer.midpoint(target);
    let dx = midpoint.x - target.x;
    let dy = midpoint.y - target.y;
    if dx.abs() < f32::EPSILON && dy.abs() < f32::EPSILON {
        return Arc::Front;
    }
    let bearing = dy.atan2(dx).to_degrees();
    let relative = normalize_degrees(bearing - target_facing);
    if relative.abs() <= 45.0 {
        Arc::Front
    } else if relative.abs() >= 135.0 {
        Arc::Rear
    } else if relative > 0.0 {
        Arc::Left
    } else {
        Arc::Right
    }
}

/// Effective cover after elevation adjustments: the target's high ground
/// upgrades its cover one step, the observer's degrades it one step.
#[must_use]
pub fn effective_cover(
    cfg: &GeometryConfig,
    base: CoverClass,
    observer_elevation: f32,
    target_elevation: f32,
) -> CoverClass {
    let delta = target_elevation - observer_elevation;
    if delta > cfg.high_ground_epsilon {
        base.upgraded()
    } else if delta < -cfg.high_ground_epsilon {
        base.degraded()
    } else {
        base
    }
}

/// Full cover blocks line of sight entirely.
#[must_use]
pub fn line_of_sight(cover: CoverClass) -> bool {
    cover != CoverClass::Total
}

/// Attack-roll modifier from elevation difference, positive when the
/// observer holds the high ground. Capped at the configured magnitude.
#[must_use]
pub fn elevation_attack_modifier(
    cfg: &GeometryConfig,
    observer_elevation: f32,
    target_elevation: f32,
) -> i32 {
    let raw = (observer_elevation - target_elevation) * cfg.elevation_mod_per_unit;
    let rounded = raw.round() as i32;
    rounded.clamp(-cfg.elevation_mod_cap, cfg.elevation_mod_cap)
}

/// Weapon reach extended proportionally when the firer is higher than the
/// target. Firing uphill never shortens the base range.
#[must_use]
pub fn effective_weapon_range(
    cfg: &GeometryConfig,
    range: WeaponRange,
    firer_elevation: f32,
    target_elevation: f32,
) -> f32 {
    let advantage = (firer_elevation - target_elevation).max(0.0);
    range.distance() as f32 + advantage * cfg.range_extension_per_unit
}

/// Everything the renderer needs about one observer-target pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SightLine {
    pub distance: f32,
    pub arc: Arc,
    pub cover: CoverClass,
    pub visible: bool,
    pub attack_modifier: i32,
}

/// Evaluate one observer-target pair on the battlefield.
#[must_use]
pub fn sight_line(
    cfg: &GeometryConfig,
    zones: &[ElevationZone],
    observer: Position,
    target: Position,
    target_facing: f32,
    target_cover: CoverClass,
) -> SightLine {
    let observer_elevation = elevation_at(zones, observer);
    let target_elevation = elevation_at(zones, target);
    let cover = effective_cover(cfg, target_cover, observer_elevation, target_elevation);
    SightLine {
        distance: observer.distance_to(target),
        arc: attack_arc(observer, target, target_facing),
        cover,
        visible: line_of_sight(cover),
        attack_modifier: elevation_attack_modifier(cfg, observer_elevation, target_elevation),
    }
}
