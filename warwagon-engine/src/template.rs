//! Vehicle templates: immutable hull stats, stations, and weapons.
//!
//! Templates are shared data. All free-text fields (weapon ranges, station
//! roles) are resolved to typed values once at load time so the read side
//! never re-parses them.

use crate::constants::{DEFAULT_WEAPON_RANGE, MELEE_RANGE};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// One of four 90-degree sectors relative to a vehicle's facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arc {
    Front,
    Rear,
    Left,
    Right,
}

impl Arc {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Rear => "rear",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for Arc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cover granted by a station, from none up to total cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoverClass {
    Open,
    #[default]
    Half,
    ThreeQuarters,
    Total,
}

impl CoverClass {
    /// One step more cover, saturating at total.
    #[must_use]
    pub const fn upgraded(self) -> Self {
        match self {
            Self::Open => Self::Half,
            Self::Half => Self::ThreeQuarters,
            Self::ThreeQuarters | Self::Total => Self::Total,
        }
    }

    /// One step less cover, saturating at open.
    #[must_use]
    pub const fn degraded(self) -> Self {
        match self {
            Self::Open | Self::Half => Self::Open,
            Self::ThreeQuarters => Self::Half,
            Self::Total => Self::ThreeQuarters,
        }
    }
}

/// Role a station plays aboard the vehicle, classified once per template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StationRole {
    Driver,
    Gunner,
    #[default]
    Passenger,
}

const DRIVER_NAME_PATTERNS: [&str; 4] = ["helm", "driver", "pilot", "rider"];

/// Classify a station by its name and whether any weapon is mounted at it.
#[must_use]
pub fn classify_station_role(name: &str, has_weapon: bool) -> StationRole {
    let lower = name.to_lowercase();
    if DRIVER_NAME_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
    {
        StationRole::Driver
    } else if has_weapon {
        StationRole::Gunner
    } else {
        StationRole::Passenger
    }
}

/// A named crew slot on a vehicle template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    #[serde(default)]
    pub cover: CoverClass,
    /// Arcs this station can see and fire into. Empty means all four.
    #[serde(default)]
    pub arcs: SmallVec<[Arc; 4]>,
    #[serde(default = "Station::default_capacity")]
    pub capacity: u32,
    /// Computed at load; not authored in data files.
    #[serde(default)]
    pub role: StationRole,
}

impl Station {
    const fn default_capacity() -> u32 {
        1
    }

    /// Whether this station can see targets in the given arc.
    #[must_use]
    pub fn covers_arc(&self, arc: Arc) -> bool {
        self.arcs.is_empty() || self.arcs.contains(&arc)
    }
}

/// Weapon reach, resolved from the free-text range field at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponRange {
    Melee,
    Fixed(u32),
}

impl WeaponRange {
    /// Parse a free-text range field such as `"melee"` or `"120 ft"`.
    ///
    /// Unparseable text falls back to a fixed default rather than failing:
    /// a weapon with a garbled range is still a weapon.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("melee") {
            return Self::Melee;
        }
        trimmed
            .split_whitespace()
            .next()
            .and_then(|token| token.parse::<u32>().ok())
            .map_or(Self::Fixed(DEFAULT_WEAPON_RANGE), Self::Fixed)
    }

    /// Base reach in distance units.
    #[must_use]
    pub const fn distance(self) -> u32 {
        match self {
            Self::Melee => MELEE_RANGE,
            Self::Fixed(units) => units,
        }
    }
}

impl fmt::Display for WeaponRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Melee => f.write_str("melee"),
            Self::Fixed(units) => write!(f, "{units}"),
        }
    }
}

impl Serialize for WeaponRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WeaponRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.trim().is_empty() {
            return Err(D::Error::custom("weapon range must not be empty"));
        }
        Ok(Self::parse(&text))
    }
}

/// A weapon mounted on the vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weapon {
    pub name: String,
    pub range: WeaponRange,
    /// Index of the station this weapon is fired from. `None` means any
    /// gunner station may operate it.
    #[serde(default)]
    pub station: Option<usize>,
}

/// Immutable hull stats shared by every vehicle spawned from this template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleTemplate {
    pub name: String,
    pub max_hp: i32,
    pub armor_class: i32,
    pub base_speed: i32,
    /// Single hits strictly below this deal no hull damage.
    #[serde(default)]
    pub damage_threshold: i32,
    /// Single hits at or above the current value trigger a mishap roll.
    #[serde(default)]
    pub mishap_threshold: i32,
    #[serde(default)]
    pub stations: Vec<Station>,
    #[serde(default)]
    pub weapons: Vec<Weapon>,
}

impl VehicleTemplate {
    /// Resolve station roles and clamp weapon station indices.
    ///
    /// Called after deserialization; data files never author roles.
    pub fn finalize(&mut self) {
        for weapon in &mut self.weapons {
            if weapon
                .station
                .is_some_and(|index| index >= self.stations.len())
            {
                weapon.station = None;
            }
        }
        let armed: Vec<bool> = (0..self.stations.len())
            .map(|index| {
                self.weapons
                    .iter()
                    .any(|weapon| weapon.station.is_none() || weapon.station == Some(index))
            })
            .collect();
        for (station, has_weapon) in self.stations.iter_mut().zip(armed) {
            station.role = classify_station_role(&station.name, has_weapon);
        }
    }

    /// Indices of stations holding the driver role, in template order.
    pub fn driver_stations(&self) -> impl Iterator<Item = usize> + '_ {
        self.stations
            .iter()
            .enumerate()
            .filter(|(_, station)| station.role == StationRole::Driver)
            .map(|(index, _)| index)
    }

    /// Weapons that can be operated from the given station.
    pub fn weapons_at(&self, station_index: usize) -> impl Iterator<Item = &Weapon> {
        self.weapons.iter().filter(move |weapon| {
            match weapon.station {
                Some(mount) => mount == station_index,
                // Unmounted weapons are fired from any gunner station.
                None => self
                    .stations
                    .get(station_index)
                    .is_some_and(|station| station.role == StationRole::Gunner),
            }
        })
    }
}

/// Errors raised when template data violates its documented shape.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template data is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("template {name:?} has non-positive max hp {max_hp}")]
    NonPositiveHp { name: String, max_hp: i32 },
}

#[derive(Debug, Clone, Deserialize)]
struct TemplateFile {
    #[serde(default)]
    templates: Vec<VehicleTemplate>,
}

/// Built-in stock templates shipped with the engine.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<VehicleTemplate>,
}

impl TemplateCatalog {
    /// Parse a catalog from JSON, finalizing every template.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a template carries a
    /// non-positive max HP.
    pub fn from_json(json: &str) -> Result<Self, TemplateError> {
        let file: TemplateFile = serde_json::from_str(json)?;
        let mut templates = file.templates;
        for template in &mut templates {
            if template.max_hp <= 0 {
                return Err(TemplateError::NonPositiveHp {
                    name: template.name.clone(),
                    max_hp: template.max_hp,
                });
            }
            template.finalize();
        }
        Ok(Self { templates })
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&VehicleTemplate> {
        self.templates
            .iter()
            .find(|template| template.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn templates(&self) -> &[VehicleTemplate] {
        &self.templates
    }
}

const STOCK_TEMPLATES_DATA: &str = include_str!("../assets/templates.json");

/// The stock template catalog embedded in the crate.
#[must_use]
pub fn stock_templates() -> &'static TemplateCatalog {
    static CATALOG: OnceLock<TemplateCatalog> = OnceLock::new();
    CATALOG.get_or_init(|| {
        TemplateCatalog::from_json(STOCK_TEMPLATES_DATA).unwrap_or_default()
    })
}
