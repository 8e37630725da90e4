//! Engagement-distance scale bands.
//!
//! The scale governs how long a combat round represents and which
//! complication table is in play. It does not change the transition rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    PointBlank,
    #[default]
    Tactical,
    Approach,
    Strategic,
}

impl Scale {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PointBlank => "point_blank",
            Self::Tactical => "tactical",
            Self::Approach => "approach",
            Self::Strategic => "strategic",
        }
    }

    /// How much in-world time one combat round covers at this scale.
    #[must_use]
    pub const fn round_duration_seconds(self) -> u32 {
        match self {
            Self::PointBlank => 6,
            Self::Tactical => 60,
            Self::Approach => 600,
            Self::Strategic => 3_600,
        }
    }

    #[must_use]
    pub const fn all() -> [Self; 4] {
        [
            Self::PointBlank,
            Self::Tactical,
            Self::Approach,
            Self::Strategic,
        ]
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scale {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "point_blank" => Ok(Self::PointBlank),
            "tactical" => Ok(Self::Tactical),
            "approach" => Ok(Self::Approach),
            "strategic" => Ok(Self::Strategic),
            _ => Err(()),
        }
    }
}
