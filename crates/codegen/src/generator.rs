//! The generator contract every backend implements.

use crate::analysis::{ContextAnalysisResult, ContextComplexity};
use crate::config::GenerationConfig;
use crate::error::{CodeGenerationError, CodegenError};
use braid_core::Grammar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetLanguage {
    Go,
    Rust,
    Wasm,
    TypeScript,
}

impl TargetLanguage {
    pub const ALL: [TargetLanguage; 4] = [
        TargetLanguage::Go,
        TargetLanguage::Rust,
        TargetLanguage::Wasm,
        TargetLanguage::TypeScript,
    ];
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetLanguage::Go => write!(f, "go"),
            TargetLanguage::Rust => write!(f, "rust"),
            TargetLanguage::Wasm => write!(f, "wasm"),
            TargetLanguage::TypeScript => write!(f, "typescript"),
        }
    }
}

impl FromStr for TargetLanguage {
    type Err = CodegenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "go" | "golang" => Ok(TargetLanguage::Go),
            "rust" | "rs" => Ok(TargetLanguage::Rust),
            "wasm" | "webassembly" => Ok(TargetLanguage::Wasm),
            "typescript" | "ts" => Ok(TargetLanguage::TypeScript),
            _ => Err(CodegenError::UnsupportedTarget(s.to_string())),
        }
    }
}

/// One emitted file.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub file_name: String,
    pub contents: String,
}

impl Artifact {
    pub fn new(file_name: impl Into<String>, contents: String) -> Self {
        Artifact {
            file_name: file_name.into(),
            contents,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub target_language: TargetLanguage,
    pub lines_of_code: usize,
    pub files_generated: usize,
    pub embedded_languages_supported: Vec<String>,
    pub context_switches: usize,
    pub cross_language_references: usize,
    pub validation_rules: usize,
    pub complexity: ContextComplexity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCode {
    /// Source files keyed by file name.
    pub files: BTreeMap<String, String>,
    /// Header / declaration files keyed by file name.
    pub headers: BTreeMap<String, String>,
    pub metadata: GenerationMetadata,
    pub errors: Vec<CodeGenerationError>,
    pub warnings: Vec<String>,
}

impl GeneratedCode {
    pub fn empty(target: TargetLanguage, analysis: &ContextAnalysisResult) -> Self {
        GeneratedCode {
            files: BTreeMap::new(),
            headers: BTreeMap::new(),
            metadata: GenerationMetadata {
                target_language: target,
                lines_of_code: 0,
                files_generated: 0,
                embedded_languages_supported: analysis.embedded_languages.clone(),
                context_switches: analysis.complexity.total_switches,
                cross_language_references: analysis.cross_language_references.len(),
                validation_rules: analysis.validation_rules.len(),
                complexity: analysis.complexity.clone(),
            },
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_file(&mut self, artifact: Artifact) {
        self.files.insert(artifact.file_name, artifact.contents);
        self.refresh_counts();
    }

    pub fn add_header(&mut self, artifact: Artifact) {
        self.headers.insert(artifact.file_name, artifact.contents);
        self.refresh_counts();
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    fn refresh_counts(&mut self) {
        let all = self.files.values().chain(self.headers.values());
        self.metadata.lines_of_code = all.map(|c| c.lines().count()).sum();
        self.metadata.files_generated = self.files.len() + self.headers.len();
    }
}

/// A per-target backend.
///
/// Backends implement the four artifact emitters; [`CodeGenerator::generate`]
/// decides which of them run for a given [`GenerationConfig`].
pub trait CodeGenerator {
    fn target(&self) -> TargetLanguage;

    /// Symbol table type seeded with the resolved symbols.
    fn symbol_table(
        &self,
        analysis: &ContextAnalysisResult,
        config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError>;

    /// Enter/exit scope operations mirroring the context depth model.
    fn scope_manager(
        &self,
        analysis: &ContextAnalysisResult,
        config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError>;

    /// Cross-language reference checks for the grammar's rules.
    fn validator(
        &self,
        analysis: &ContextAnalysisResult,
        config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError>;

    /// Flattened inheritance chain. `None` when the grammar has no bases.
    fn inheritance_optimization(
        &self,
        grammar: &dyn Grammar,
        analysis: &ContextAnalysisResult,
        config: &GenerationConfig,
    ) -> Result<Option<Artifact>, CodegenError>;

    /// Declaration files derived from the emitted sources.
    fn headers(
        &self,
        _analysis: &ContextAnalysisResult,
        _config: &GenerationConfig,
        _files: &BTreeMap<String, String>,
    ) -> Vec<Artifact> {
        Vec::new()
    }

    /// Emit everything `config` asks for. An invalid module name is a hard
    /// error; a failing artifact is recorded in
    /// [`GeneratedCode::errors`] and the remaining artifacts still run.
    fn generate(
        &self,
        grammar: &dyn Grammar,
        analysis: &ContextAnalysisResult,
        config: &GenerationConfig,
    ) -> Result<GeneratedCode, CodegenError> {
        if !config.module_name_is_valid() {
            return Err(CodegenError::InvalidModuleName(config.module_name.clone()));
        }
        let target = self.target();
        let mut code = GeneratedCode::empty(target, analysis);

        let record = |code: &mut GeneratedCode, name: &str, result: Result<Option<Artifact>, CodegenError>| {
            match result {
                Ok(Some(artifact)) => code.add_file(artifact),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(backend = %target, artifact = name, error = %err, "artifact failed");
                    code.errors
                        .push(CodeGenerationError::new(target, err.to_string()).in_artifact(name));
                }
            }
        };

        if config.generate_symbol_table {
            record(&mut code, "symbol_table", self.symbol_table(analysis, config).map(Some));
        }
        if config.generate_scope_manager {
            if analysis.requires_context_tracking {
                record(&mut code, "scope_manager", self.scope_manager(analysis, config).map(Some));
            } else {
                code.warnings
                    .push("scope manager skipped: grammar needs no context tracking".to_string());
            }
        }
        if config.generate_validator {
            if analysis.validation_required || !analysis.cross_language_references.is_empty() {
                record(&mut code, "validator", self.validator(analysis, config).map(Some));
            } else {
                code.warnings
                    .push("validator skipped: no cross-language validation requested".to_string());
            }
        }
        if config.generate_inheritance_optimization {
            record(
                &mut code,
                "inheritance",
                self.inheritance_optimization(grammar, analysis, config),
            );
        }
        if analysis.complexity.has_cyclic_references {
            let cycle = analysis.complexity.cycle.clone().unwrap_or_default().join(" -> ");
            code.warnings
                .push(format!("cyclic cross-language references: {}", cycle));
        }

        for header in self.headers(analysis, config, &code.files) {
            code.add_header(header);
        }
        tracing::info!(
            backend = %target,
            files = code.metadata.files_generated,
            lines = code.metadata.lines_of_code,
            errors = code.errors.len(),
            "generation finished"
        );
        Ok(code)
    }
}
