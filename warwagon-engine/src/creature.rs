//! Creatures and their statblocks.
//!
//! Statblock field values usually arrive from an external monster database;
//! the caller maps them into [`Statblock`] before issuing an add-creature
//! event, so the engine sees lookups as just another event source.

use crate::geometry::Position;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of the encounter a combatant fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Faction {
    Party,
    #[default]
    Enemy,
}

impl Faction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Party => "party",
            Self::Enemy => "enemy",
        }
    }

    /// Infer a faction from a statblock's creature type, used when loading
    /// older snapshots that never recorded one.
    #[must_use]
    pub fn infer(creature_type: &str, player_controlled: bool) -> Self {
        if player_controlled || creature_type.eq_ignore_ascii_case("humanoid") {
            Self::Party
        } else {
            Self::Enemy
        }
    }
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Faction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "party" => Ok(Self::Party),
            "enemy" => Ok(Self::Enemy),
            _ => Err(()),
        }
    }
}

/// The six abilities used for checks and saving throws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Str,
    Dex,
    Con,
    Int,
    Wis,
    Cha,
}

impl Ability {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Dex => "dex",
            Self::Con => "con",
            Self::Int => "int",
            Self::Wis => "wis",
            Self::Cha => "cha",
        }
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw ability scores, 1-30.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    #[serde(default = "default_score")]
    pub str: i32,
    #[serde(default = "default_score")]
    pub dex: i32,
    #[serde(default = "default_score")]
    pub con: i32,
    #[serde(default = "default_score")]
    pub int: i32,
    #[serde(default = "default_score")]
    pub wis: i32,
    #[serde(default = "default_score")]
    pub cha: i32,
}

const fn default_score() -> i32 {
    10
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self {
            str: default_score(),
            dex: default_score(),
            con: default_score(),
            int: default_score(),
            wis: default_score(),
            cha: default_score(),
        }
    }
}

impl AbilityScores {
    #[must_use]
    pub const fn score(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Str => self.str,
            Ability::Dex => self.dex,
            Ability::Con => self.con,
            Ability::Int => self.int,
            Ability::Wis => self.wis,
            Ability::Cha => self.cha,
        }
    }

    #[must_use]
    pub const fn modifier(&self, ability: Ability) -> i32 {
        ability_modifier(self.score(ability))
    }
}

/// Standard ability modifier: `(score - 10) / 2`, rounded down.
#[must_use]
pub const fn ability_modifier(score: i32) -> i32 {
    (score - 10).div_euclid(2)
}

/// A creature's immutable statblock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statblock {
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub creature_type: String,
    #[serde(default)]
    pub abilities: AbilityScores,
    pub max_hp: i32,
    pub armor_class: i32,
    #[serde(default)]
    pub speed: i32,
    #[serde(default)]
    pub resistances: Vec<String>,
}

impl Default for Statblock {
    fn default() -> Self {
        Self {
            size: String::from("medium"),
            creature_type: String::from("humanoid"),
            abilities: AbilityScores::default(),
            max_hp: 1,
            armor_class: 10,
            speed: 30,
            resistances: Vec::new(),
        }
    }
}

/// A creature participating in the encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creature {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub faction: Option<Faction>,
    pub statblock: Statblock,
    pub hp: i32,
    #[serde(default)]
    pub temp_hp: i32,
    #[serde(default)]
    pub initiative: i32,
    #[serde(default)]
    pub player_controlled: bool,
    /// World position. Mutually exclusive with being crewed on a vehicle:
    /// present only when unassigned or ejected.
    #[serde(default)]
    pub position: Option<Position>,
}

impl Creature {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, statblock: Statblock) -> Self {
        let hp = statblock.max_hp;
        Self {
            id: id.into(),
            name: name.into(),
            faction: None,
            statblock,
            hp,
            temp_hp: 0,
            initiative: 0,
            player_controlled: false,
            position: None,
        }
    }

    #[must_use]
    pub fn faction(&self) -> Faction {
        self.faction.unwrap_or_else(|| {
            Faction::infer(&self.statblock.creature_type, self.player_controlled)
        })
    }

    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Apply damage, consuming temporary HP first. Amounts at or below zero
    /// change nothing.
    pub fn apply_damage(&mut self, amount: i32) {
        if amount <= 0 {
            return;
        }
        let absorbed = amount.min(self.temp_hp);
        self.temp_hp -= absorbed;
        self.hp = (self.hp - (amount - absorbed)).max(0);
    }

    /// Restore HP, clamping to the statblock maximum.
    pub fn heal(&mut self, amount: i32) {
        if amount <= 0 {
            return;
        }
        self.hp = (self.hp + amount).min(self.statblock.max_hp);
    }

    /// Temporary HP does not stack; the larger grant wins.
    pub fn grant_temp_hp(&mut self, amount: i32) {
        if amount > self.temp_hp {
            self.temp_hp = amount;
        }
    }
}
