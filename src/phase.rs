//! Workflow phases and the synthesis stages that advance them.
//!
//! Phases are strictly ordered: INTAKE → EXTRACTION → IDENTITY → GEAR.
//! No phase is skipped or revisited except through a full reset (or the
//! asset-selection shortcut into GEAR).

use serde::{Deserialize, Serialize};

/// A step of the sprite workflow.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Waiting for the user image
    #[default]
    Intake,
    /// Raw upload present, base-body extraction pending
    Extraction,
    /// Base body present, identity refinement pending
    Identity,
    /// Identity locked, gear layers may be synthesized
    Gear,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Intake, Phase::Extraction, Phase::Identity, Phase::Gear];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "INTAKE",
            Self::Extraction => "EXTRACTION",
            Self::Identity => "IDENTITY",
            Self::Gear => "GEAR",
        }
    }

    /// The phase a successful transition out of this one lands in.
    /// GEAR is terminal: gear synthesis stays in GEAR.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Self::Intake => Some(Self::Extraction),
            Self::Extraction => Some(Self::Identity),
            Self::Identity => Some(Self::Gear),
            Self::Gear => None,
        }
    }

    /// The synthesis stage that is legal in this phase, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Intake => None,
            Self::Extraction => Some(Stage::Extraction),
            Self::Identity => Some(Stage::Identity),
            Self::Gear => Some(Stage::Gear),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INTAKE" => Ok(Self::Intake),
            "EXTRACTION" => Ok(Self::Extraction),
            "IDENTITY" => Ok(Self::Identity),
            "GEAR" => Ok(Self::Gear),
            _ => anyhow::bail!(
                "Invalid phase '{}'. Valid values: intake, extraction, identity, gear",
                s
            ),
        }
    }
}

/// One of the three synthesis operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Base-body extraction from the raw upload
    Extraction,
    /// Face and hair refinement of the base body
    Identity,
    /// Layered gear on top of the identity base
    Gear,
}

impl Stage {
    /// The phase in which this stage may run.
    pub fn phase(&self) -> Phase {
        match self {
            Self::Extraction => Phase::Extraction,
            Self::Identity => Phase::Identity,
            Self::Gear => Phase::Gear,
        }
    }

    /// Operation name used in precondition errors and logs.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Extraction => "extract",
            Self::Identity => "refine",
            Self::Gear => "gear",
        }
    }

    /// Display label shown in the CLI.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Extraction => "DNA FORGE",
            Self::Identity => "IDENTITY MATRIX",
            Self::Gear => "GEAR SYNTHESIS",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.phase().as_str())
    }
}
