//! Braid code generator.
//!
//! A parse session is reduced to a [`ContextAnalysisResult`], then handed
//! to the [`CodeGenerator`] registered for the configured
//! [`TargetLanguage`]. Each backend emits a symbol table, a scope manager,
//! a cross-language validator and, for grammars with bases, a flattened
//! inheritance table.
//!
//! # Public API
//!
//! - [`generate_for_grammar()`] -- analysis, generation and optimization report
//! - [`write_generated()`] -- persist sources and headers
//! - [`detect_cycle()`] -- cycle search over a language dependency graph

pub mod analysis;
pub mod config;
pub mod error;
pub mod generator;
pub mod integration;
pub mod optimization;
pub mod registry;
pub mod targets;

pub use analysis::{
    detect_cycle, reference_graph, AnalyzedSymbol, ContextAnalysisResult, ContextComplexity,
    ContextSummary, ContextSwitchInfo,
};
pub use config::GenerationConfig;
pub use error::{CodeGenerationError, CodegenError};
pub use generator::{Artifact, CodeGenerator, GeneratedCode, GenerationMetadata, TargetLanguage};
pub use integration::{generate_for_grammar, write_generated, GenerationReport};
pub use optimization::{Estimate, OptimizationReport, ESTIMATE_LABEL};
pub use registry::GeneratorRegistry;
