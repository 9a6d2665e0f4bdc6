//! Shared UI icons.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Files
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
pub static FILE_NEW: Emoji<'_, '_> = Emoji("📄 ", "+");
pub static FILE_DEL: Emoji<'_, '_> = Emoji("🗑️  ", "-");

// Stages
pub static DNA: Emoji<'_, '_> = Emoji("🧬 ", "[DNA]");
pub static FACE: Emoji<'_, '_> = Emoji("🎭 ", "[ID]");
pub static GEAR: Emoji<'_, '_> = Emoji("🛡️  ", "[GEAR]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
