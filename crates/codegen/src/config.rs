//! Generation settings, readable from the `[generation]` table of `braid.toml`.

use crate::generator::TargetLanguage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub target: TargetLanguage,
    /// Package / module / namespace name used by the emitted sources.
    pub module_name: String,
    pub generate_symbol_table: bool,
    pub generate_scope_manager: bool,
    pub generate_validator: bool,
    pub generate_inheritance_optimization: bool,
    pub enable_context_optimization: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            target: TargetLanguage::Rust,
            module_name: "braid_context".to_string(),
            generate_symbol_table: true,
            generate_scope_manager: true,
            generate_validator: true,
            generate_inheritance_optimization: false,
            enable_context_optimization: false,
        }
    }
}

impl GenerationConfig {
    pub fn for_target(target: TargetLanguage) -> Self {
        GenerationConfig {
            target,
            ..Self::default()
        }
    }

    pub(crate) fn module_name_is_valid(&self) -> bool {
        let mut chars = self.module_name.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}
