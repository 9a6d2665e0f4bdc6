//! Stage-specific instruction text.
//!
//! The final instruction payload is the composed chain followed by one stage
//! block. Blocks embed the background hint and the user prompt.

use serde::{Deserialize, Serialize};

use crate::phase::Stage;

use super::chain::InstructionChain;

/// Prompt used for extraction when the user leaves it blank.
pub const DEFAULT_EXTRACTION_PROMPT: &str = "base mannequin, no clothing";

/// Background the synthesis service is asked to paint behind the sprite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundStyle {
    #[default]
    Magenta,
    White,
    Gray,
    Gradient,
}

impl BackgroundStyle {
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Magenta => "Solid Magenta #FF00FF",
            Self::White => "Solid White #FFFFFF",
            Self::Gray => "Solid Neutral Gray #808080",
            Self::Gradient => "Soft neutral studio gradient",
        }
    }

    /// Whether the background is a single flat color the chroma key can remove.
    pub fn is_solid(&self) -> bool {
        !matches!(self, Self::Gradient)
    }
}

impl std::fmt::Display for BackgroundStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackgroundStyle::Magenta => write!(f, "magenta"),
            BackgroundStyle::White => write!(f, "white"),
            BackgroundStyle::Gray => write!(f, "gray"),
            BackgroundStyle::Gradient => write!(f, "gradient"),
        }
    }
}

impl std::str::FromStr for BackgroundStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "magenta" => Ok(BackgroundStyle::Magenta),
            "white" => Ok(BackgroundStyle::White),
            "gray" | "grey" => Ok(BackgroundStyle::Gray),
            "gradient" => Ok(BackgroundStyle::Gradient),
            _ => anyhow::bail!(
                "Invalid background style '{}'. Valid values: magenta, white, gray, gradient",
                s
            ),
        }
    }
}

/// Resolve the extraction design text, falling back to the default when blank.
pub fn extraction_design(prompt: &str) -> &str {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        DEFAULT_EXTRACTION_PROMPT
    } else {
        trimmed
    }
}

pub fn extraction_block(design: &str, background: BackgroundStyle) -> String {
    format!(
        "OBJECTIVE: Create a TECHNICAL BODY TEMPLATE (mannequin) from the reference.\n\
         STYLE: Pure pixel art. Cluster shading, clean outlines, limited palette.\n\
         PIXEL RATIO: Strict 1x1 consistency. No pixel doubling or sub-pixels.\n\
         PROPORTIONS: Classic JRPG (slightly larger head, compact body).\n\
         BACKGROUND: {} ONLY. No effects, glows or decorations.\n\
         SUBJECT: Base character in neutral undergarments.\n\
         DESIGN: {}\n\
         STRIP: All weapons, armor, props and background elements. Output ONLY the isolated body.",
        background.hint(),
        design
    )
}

pub fn identity_block(traits: &str, background: BackgroundStyle) -> String {
    format!(
        "OBJECTIVE: Refine face and hair while keeping pixel integrity.\n\
         EYES: Defined pixel by pixel.\n\
         HAIR: Shaded by volume clumps, not individual strands.\n\
         CLEANLINESS: Zero pixel noise.\n\
         BACKGROUND: {}.\n\
         TRAITS: {}",
        background.hint(),
        traits
    )
}

pub fn gear_block(request: &str, background: BackgroundStyle, has_gear_state: bool) -> String {
    let references = if has_gear_state {
        "REFERENCES: Image 1 is the TECHNICAL BASE MANNEQUIN WITH LOCKED IDENTITY. \
         Image 2 is the CURRENT GEAR STATE; compose on top of it."
    } else {
        "REFERENCE: Image 1 is the TECHNICAL BASE MANNEQUIN WITH LOCKED IDENTITY."
    };
    format!(
        "OBJECTIVE: Layer equipment over the mannequin while locking character identity.\n\
         {references}\n\
         [IDENTITY LOCK]\n\
         - FACE: Preserve eye shape, position and expression. Never redraw the face.\n\
         - HAIR: Hairstyle and silhouette are locked.\n\
         - SKIN: Keep the base skin palette exactly.\n\
         [LAYER HIERARCHY]\n\
         1. UNDERLAYER: tunics, leggings, base fabrics.\n\
         2. PADDING: gambesons, leather buffers.\n\
         3. MAIN GEAR: breastplates, pauldrons, greaves, heavy robes.\n\
         4. OVER-GEAR: belts, bandoliers, pouches.\n\
         5. OUTER: cloaks, hoods, mantles.\n\
         [PHYSICAL CONSISTENCY]\n\
         - Gear adds depth to the base silhouette; cloth drapes with gravity.\n\
         - Upper layers cast subtle shadows on the layers below.\n\
         - Single 45-degree light source.\n\
         BACKGROUND: {}.\n\
         GEAR REQUEST: {}",
        background.hint(),
        request
    )
}

/// Full instruction text for `stage`: active chain entries, then the stage block.
pub fn build_instructions(
    chain: &InstructionChain,
    stage: Stage,
    prompt: &str,
    background: BackgroundStyle,
    has_gear_state: bool,
) -> String {
    let block = match stage {
        Stage::Extraction => extraction_block(extraction_design(prompt), background),
        Stage::Identity => identity_block(prompt.trim(), background),
        Stage::Gear => gear_block(prompt.trim(), background, has_gear_state),
    };
    let prefix = chain.compose();
    if prefix.is_empty() {
        block
    } else {
        format!("{}\n\n{}", prefix, block)
    }
}
