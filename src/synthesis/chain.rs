//! The instruction chain: an ordered list of named, toggleable directives
//! that prefix every instruction text sent to the synthesis collaborator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("Unknown directive '{0}'")]
    UnknownDirective(String),

    #[error("Directive '{0}' is locked and cannot be disabled")]
    Locked(String),
}

/// One entry of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub instruction: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Locked directives can never be deactivated
    #[serde(default)]
    pub locked: bool,
}

fn default_active() -> bool {
    true
}

impl Directive {
    pub fn new(id: &str, label: &str, description: &str, instruction: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            description: description.to_string(),
            instruction: instruction.to_string(),
            active: true,
            locked: false,
        }
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstructionChain(Vec<Directive>);

impl InstructionChain {
    pub fn new(directives: Vec<Directive>) -> Self {
        Self(directives)
    }

    pub fn directives(&self) -> &[Directive] {
        &self.0
    }

    pub fn get(&self, id: &str) -> Option<&Directive> {
        self.0.iter().find(|d| d.id == id)
    }

    /// Active instructions joined by newline, in chain order.
    pub fn compose(&self) -> String {
        self.0
            .iter()
            .filter(|d| d.active)
            .map(|d| d.instruction.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn set_active(&mut self, id: &str, active: bool) -> Result<(), ChainError> {
        let directive = self
            .0
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| ChainError::UnknownDirective(id.to_string()))?;
        if directive.locked && !active {
            return Err(ChainError::Locked(id.to_string()));
        }
        directive.active = active;
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        self.0.iter().filter(|d| d.active).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for InstructionChain {
    fn default() -> Self {
        default_chain()
    }
}

pub fn default_chain() -> InstructionChain {
    InstructionChain(vec![
        Directive::new(
            "engine-core",
            "SPRITE ENGINE",
            "Professional pixel logic.",
            "ROLE: Professional JRPG Pixel Artist. Use cluster shading and hand-placed pixel look.",
        )
        .locked(),
        Directive::new(
            "dna-lock",
            "IDENTITY LOCK",
            "Face/Hair protection.",
            "ENFORCE IDENTITY DNA LOCK. Do not alter face, hair silhouette, or skin tones of the base sprite.",
        ),
        Directive::new(
            "pixel-precision",
            "PIXEL LOCK",
            "Consistent sizing.",
            "Maintain consistent 1x1 pixel size throughout the entire sprite. No soft edges.",
        ),
        Directive::new(
            "chroma-key",
            "CHROMA PURE",
            "Technical background.",
            "FORCE BACKGROUND TO #FF00FF MAGENTA. ABSOLUTELY NO GRADIENTS OR EFFECTS.",
        ),
    ])
}
