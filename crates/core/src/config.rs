//! Engine configuration. Every field has a default so a partial `[engine]`
//! table in `braid.toml` is enough.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Merge rules and symbols from `Inherits:` base grammars.
    pub enable_inheritance: bool,
    /// Fail the parse when a base grammar cannot be resolved.
    pub strict_inheritance: bool,
    pub max_scope_depth: usize,
    pub max_switch_depth: usize,
    /// Wall-clock budget for one scan, in milliseconds.
    pub deadline_ms: Option<u64>,
    pub function_keywords: Vec<String>,
    pub class_keywords: Vec<String>,
    pub block_keywords: Vec<String>,
    /// Keywords whose following identifier is defined as a variable
    /// (or constant for `const`).
    pub definition_keywords: Vec<String>,
    pub block_open: String,
    pub block_close: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            enable_inheritance: true,
            strict_inheritance: false,
            max_scope_depth: 256,
            max_switch_depth: 64,
            deadline_ms: None,
            function_keywords: words(&["function", "fn", "def", "func", "method"]),
            class_keywords: words(&["class", "struct", "interface", "trait", "enum"]),
            block_keywords: words(&[
                "if", "else", "while", "for", "loop", "match", "switch", "do", "try", "catch",
            ]),
            definition_keywords: words(&["let", "var", "const", "val"]),
            block_open: "{".to_string(),
            block_close: "}".to_string(),
        }
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl EngineConfig {
    pub fn is_keyword(&self, word: &str) -> bool {
        self.function_keywords.iter().any(|k| k == word)
            || self.class_keywords.iter().any(|k| k == word)
            || self.block_keywords.iter().any(|k| k == word)
            || self.definition_keywords.iter().any(|k| k == word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_table_keeps_defaults() {
        let cfg: EngineConfig = toml::from_str(
            r#"
            strict_inheritance = true
            max_scope_depth = 8
            "#,
        )
        .unwrap();
        assert!(cfg.strict_inheritance);
        assert_eq!(cfg.max_scope_depth, 8);
        assert!(cfg.enable_inheritance);
        assert_eq!(cfg.block_open, "{");
        assert!(cfg.is_keyword("fn"));
        assert!(!cfg.is_keyword("widget"));
    }
}
