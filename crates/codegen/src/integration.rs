//! Generation entry point and file output.

use crate::analysis::ContextAnalysisResult;
use crate::config::GenerationConfig;
use crate::error::{CodeGenerationError, CodegenError};
use crate::generator::GeneratedCode;
use crate::optimization::OptimizationReport;
use crate::registry::GeneratorRegistry;
use braid_core::{EmbeddedSession, Grammar, GrammarRegistry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub code: GeneratedCode,
    pub optimization: OptimizationReport,
    pub analysis: ContextAnalysisResult,
}

/// Analyze `session` and run the configured target's generator.
///
/// An unsupported target is an error. Any other generator failure is
/// returned inside [`GeneratedCode::errors`].
pub fn generate_for_grammar(
    generators: &GeneratorRegistry,
    grammars: &GrammarRegistry,
    grammar: &dyn Grammar,
    session: &EmbeddedSession,
    config: &GenerationConfig,
) -> Result<GenerationReport, CodegenError> {
    let generator = generators.get(config.target)?;
    let analysis = ContextAnalysisResult::analyze(grammar, grammars, session);
    let code = match generator.generate(grammar, &analysis, config) {
        Ok(code) => code,
        Err(err) => {
            tracing::warn!(backend = %config.target, error = %err, "generation failed");
            let mut code = GeneratedCode::empty(config.target, &analysis);
            code.errors
                .push(CodeGenerationError::new(config.target, err.to_string()));
            code
        }
    };
    let optimization = OptimizationReport::build(&analysis, config);
    Ok(GenerationReport {
        code,
        optimization,
        analysis,
    })
}

/// Write sources and headers under `dir`, creating it if needed. Returns
/// the written paths in file-name order, sources first.
pub fn write_generated(dir: &Path, code: &GeneratedCode) -> Result<Vec<PathBuf>, CodegenError> {
    std::fs::create_dir_all(dir).map_err(|source| CodegenError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    code.files
        .iter()
        .chain(code.headers.iter())
        .map(|(name, contents)| write_file(&dir.join(name), contents))
        .collect()
}

fn write_file(path: &Path, contents: &str) -> Result<PathBuf, CodegenError> {
    std::fs::write(path, contents).map_err(|source| CodegenError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}
