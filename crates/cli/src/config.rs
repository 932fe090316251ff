//! `braid.toml`, the optional configuration file read via `--config`.
//!
//! # Example
//!
//! ```toml
//! [engine]
//! strict_inheritance = true
//! deadline_ms = 500
//! definition_keywords = ["let", "var", "const"]
//!
//! [generation]
//! target = "typescript"
//! module_name = "page_context"
//! enable_context_optimization = true
//! ```
//!
//! Both tables are optional, and so is every key inside them.

use std::path::Path;

use braid_codegen::GenerationConfig;
use braid_core::EngineConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BraidConfig {
    pub engine: EngineConfig,
    pub generation: GenerationConfig,
}

/// Command-line values that win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub strict_inheritance: bool,
    pub deadline_ms: Option<u64>,
    pub module_name: Option<String>,
}

impl BraidConfig {
    pub fn apply(mut self, overrides: &Overrides) -> Self {
        if overrides.strict_inheritance {
            self.engine.strict_inheritance = true;
        }
        if let Some(ms) = overrides.deadline_ms {
            self.engine.deadline_ms = Some(ms);
        }
        if let Some(name) = &overrides.module_name {
            self.generation.module_name = name.clone();
        }
        self
    }
}

/// Read `path`, or the defaults when no file was given.
pub fn load_config(path: Option<&Path>) -> Result<BraidConfig, String> {
    let Some(path) = path else {
        return Ok(BraidConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    parse_config(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

fn parse_config(content: &str) -> Result<BraidConfig, toml::de::Error> {
    toml::from_str(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_codegen::TargetLanguage;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(parse_config("").unwrap(), BraidConfig::default());
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let cfg = parse_config(
            r#"
            [engine]
            max_switch_depth = 4

            [generation]
            target = "go"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.engine.max_switch_depth, 4);
        assert!(cfg.engine.enable_inheritance);
        assert_eq!(cfg.generation.target, TargetLanguage::Go);
        assert_eq!(cfg.generation.module_name, "braid_context");
    }

    #[test]
    fn unknown_table_is_rejected() {
        let err = parse_config("[server]\nport = 1\n").unwrap_err();
        assert!(err.to_string().contains("server"));
    }

    #[test]
    fn flags_override_file_values() {
        let cfg = parse_config("[engine]\ndeadline_ms = 10\n[generation]\nmodule_name = \"a\"\n")
            .unwrap()
            .apply(&Overrides {
                strict_inheritance: true,
                deadline_ms: Some(99),
                module_name: Some("b".into()),
            });
        assert!(cfg.engine.strict_inheritance);
        assert_eq!(cfg.engine.deadline_ms, Some(99));
        assert_eq!(cfg.generation.module_name, "b");
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_config(Some(Path::new("/nonexistent/braid.toml"))).unwrap_err();
        assert!(err.contains("/nonexistent/braid.toml"));
    }
}
