mod config;
mod logging;

use std::path::{Path, PathBuf};
use std::process;

use braid_codegen::{
    generate_for_grammar, write_generated, GenerationReport, GeneratorRegistry, TargetLanguage,
};
use braid_core::{
    ContextEngine, Diagnostic, EmbeddedLanguageManager, EmbeddedOutcome, FileSystemProvider,
    GrammarRegistry, ParseOutcome, Severity,
};
use braid_validate::{CrossLanguageValidator, ValidationOutcome};
use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{load_config, BraidConfig, Overrides};

/// Braid context-sensitive parser and code generator
#[derive(Parser)]
#[command(
    name = "braid",
    version,
    about = "Braid context-sensitive parser and code generator"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to a braid.toml with [engine] and [generation] tables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when BRAID_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Fail the parse when a base grammar cannot be resolved
    #[arg(long, global = true)]
    strict_inheritance: bool,

    /// Wall-clock budget for one scan, in milliseconds
    #[arg(long, global = true)]
    deadline_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an input file and print its contexts
    Parse {
        /// Grammar file (imports resolve relative to it)
        grammar: PathBuf,
        /// Input file to parse
        input: PathBuf,
        /// Target for @IF(target="...") blocks in the grammar
        #[arg(long)]
        target: Option<String>,
        /// Single-language parse: no language switches or references
        #[arg(long)]
        context_only: bool,
    },
    /// Parse and run cross-language validation; exits 1 on errors
    Check {
        grammar: PathBuf,
        input: PathBuf,
        /// Target for @IF(target="...") blocks in the grammar
        #[arg(long)]
        target: Option<String>,
    },
    /// Generate context-handling code for a target language
    Generate {
        /// go, rust, wasm or typescript
        lang: String,
        grammar: PathBuf,
        input: PathBuf,
        /// Output directory for generated files
        #[arg(long, default_value = "./generated")]
        out: PathBuf,
        /// Module or package name for the generated sources
        #[arg(long)]
        module_name: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_tracing(&cli.log_level) {
        report_error(&format!("error: {}", e), cli.output, cli.quiet);
        process::exit(1);
    }

    let module_name = match &cli.command {
        Commands::Generate { module_name, .. } => module_name.clone(),
        _ => None,
    };
    let overrides = Overrides {
        strict_inheritance: cli.strict_inheritance,
        deadline_ms: cli.deadline_ms,
        module_name,
    };
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config.apply(&overrides),
        Err(e) => {
            report_error(&format!("error: {}", e), cli.output, cli.quiet);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Parse {
            grammar,
            input,
            target,
            context_only,
        } => {
            cmd_parse(
                &grammar,
                &input,
                target.as_deref(),
                context_only,
                &config,
                cli.output,
                cli.quiet,
            );
        }
        Commands::Check {
            grammar,
            input,
            target,
        } => {
            cmd_check(&grammar, &input, target.as_deref(), &config, cli.output, cli.quiet);
        }
        Commands::Generate {
            lang,
            grammar,
            input,
            out,
            ..
        } => {
            cmd_generate(&lang, &grammar, &input, &out, config, cli.output, cli.quiet);
        }
    }
}

// ──────────────────────────────────────────────
// Shared steps
// ──────────────────────────────────────────────

/// Load `path` and its imports. Returns the registry and the root grammar
/// name, or exits.
fn load_grammars(
    path: &Path,
    target: Option<&str>,
    output: OutputFormat,
    quiet: bool,
) -> (GrammarRegistry, String) {
    let mut registry = GrammarRegistry::new();
    match registry.load_with_provider(path, &FileSystemProvider, target) {
        Ok(report) => {
            tracing::info!(root = %report.root, loaded = report.loaded.len(), "grammars loaded");
            if output == OutputFormat::Text && !quiet {
                print_diagnostics(&report.diagnostics);
            }
            (registry, report.root)
        }
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

fn read_input(path: &Path, output: OutputFormat, quiet: bool) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn parse_embedded(
    registry: &GrammarRegistry,
    root: &str,
    input: &str,
    config: &BraidConfig,
    output: OutputFormat,
    quiet: bool,
) -> EmbeddedOutcome {
    let Some(grammar) = registry.get(root) else {
        report_error(&format!("error: unknown grammar '{}'", root), output, quiet);
        process::exit(1);
    };
    let engine = ContextEngine::new(registry, config.engine.clone());
    let mut manager = EmbeddedLanguageManager::new(engine, grammar);
    manager.parse_with_embedded_languages(input)
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for d in diagnostics {
        eprintln!("{}", d);
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("serialization error: {}", e))
    );
}

// ──────────────────────────────────────────────
// parse
// ──────────────────────────────────────────────

fn cmd_parse(
    grammar_path: &Path,
    input_path: &Path,
    target: Option<&str>,
    context_only: bool,
    config: &BraidConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let (registry, root) = load_grammars(grammar_path, target, output, quiet);
    let input = read_input(input_path, output, quiet);

    if context_only {
        let Some(grammar) = registry.get(&root) else {
            report_error(&format!("error: unknown grammar '{}'", root), output, quiet);
            process::exit(1);
        };
        let mut engine = ContextEngine::new(&registry, config.engine.clone());
        let outcome = engine.parse_with_context(grammar, &input);
        match output {
            OutputFormat::Json => print_json(&outcome),
            OutputFormat::Text => {
                if !quiet {
                    print_context_summary(&outcome);
                }
                print_diagnostics(outcome.errors());
            }
        }
        if !outcome.is_success() {
            process::exit(1);
        }
        return;
    }

    let outcome = parse_embedded(&registry, &root, &input, config, output, quiet);
    match output {
        OutputFormat::Json => print_json(&outcome),
        OutputFormat::Text => {
            if !quiet {
                print_embedded_summary(&outcome);
            }
            print_diagnostics(outcome.errors());
        }
    }
    if !outcome.is_success() {
        process::exit(1);
    }
}

fn print_context_summary(outcome: &ParseOutcome) {
    let session = outcome.session();
    println!(
        "{}: {} context(s), {} token(s)",
        session.grammar,
        session.contexts.len(),
        session.metrics.tokens
    );
    for ctx in &session.contexts {
        println!(
            "  [{}] {} depth {} ({} symbol(s))",
            ctx.id.0,
            ctx.scope,
            ctx.depth,
            ctx.symbols.len()
        );
    }
    for w in &session.warnings {
        println!("  {}", w);
    }
}

fn print_embedded_summary(outcome: &EmbeddedOutcome) {
    let session = outcome.session();
    println!(
        "{}: {} context(s), {} language switch(es), {} cross-language reference(s)",
        session.grammar,
        session.contexts.len(),
        session.metrics.language_switches,
        session.cross_language_references.len()
    );
    for ctx in &session.contexts {
        println!(
            "  [{}] {} {} depth {} ({} symbol(s))",
            ctx.id.0,
            ctx.language,
            ctx.scope,
            ctx.depth,
            ctx.symbols.len()
        );
    }
    for r in &session.cross_language_references {
        let state = if r.resolved { "resolved" } else { "unresolved" };
        println!(
            "  {}.{} -> {}.{} ({})",
            r.source_language, r.source_symbol, r.target_language, r.target_symbol, state
        );
    }
    for w in &session.warnings {
        println!("  {}", w);
    }
}

// ──────────────────────────────────────────────
// check
// ──────────────────────────────────────────────

fn cmd_check(
    grammar_path: &Path,
    input_path: &Path,
    target: Option<&str>,
    config: &BraidConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let (registry, root) = load_grammars(grammar_path, target, output, quiet);
    let input = read_input(input_path, output, quiet);
    let mut outcome = parse_embedded(&registry, &root, &input, config, output, quiet);

    if !outcome.is_success() {
        match output {
            OutputFormat::Json => print_json(&serde_json::json!({
                "success": false,
                "parse_errors": outcome.errors(),
            })),
            OutputFormat::Text => print_diagnostics(outcome.errors()),
        }
        process::exit(1);
    }

    let Some(grammar) = registry.get(&root) else {
        report_error(&format!("error: unknown grammar '{}'", root), output, quiet);
        process::exit(1);
    };
    let mut validator = CrossLanguageValidator::for_grammar(grammar);
    let validation = validator.validate_session(outcome.session());
    outcome.record_results(&validation.validation_results);

    match output {
        OutputFormat::Json => print_json(&validation),
        OutputFormat::Text => {
            if !quiet {
                print_validation(&validation);
            }
        }
    }
    if !validation.success {
        process::exit(1);
    }
}

fn print_validation(validation: &ValidationOutcome) {
    for r in &validation.validation_results {
        if !r.valid {
            println!("{} [{}] {}", r.severity, r.rule, r.message);
        }
    }
    for s in &validation.symbol_validation_results {
        for issue in &s.issues {
            println!(
                "{} {}.{}: {}",
                issue.severity, s.language, s.symbol, issue.message
            );
        }
    }
    for r in &validation.reference_validation_results {
        for issue in &r.issues {
            println!(
                "{} {}.{} -> {}.{}: {}",
                issue.severity,
                r.source_language,
                r.source_symbol,
                r.target_language,
                r.target_symbol,
                issue.message
            );
        }
    }
    for s in &validation.semantic_validation_results {
        for v in &s.violations {
            println!("{} [{}] {}: {}", Severity::Error, s.rule, s.language, v);
        }
        for w in &s.warnings {
            println!("{} [{}] {}: {}", Severity::Warning, s.rule, s.language, w);
        }
    }
    let summary = &validation.summary;
    println!(
        "{}: {} error(s), {} warning(s), {} info(s), coverage {:.1}%",
        if validation.success { "ok" } else { "failed" },
        summary.errors,
        summary.warnings,
        summary.infos,
        summary.coverage
    );
}

// ──────────────────────────────────────────────
// generate
// ──────────────────────────────────────────────

fn cmd_generate(
    lang: &str,
    grammar_path: &Path,
    input_path: &Path,
    out_dir: &Path,
    mut config: BraidConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let target: TargetLanguage = match lang.parse() {
        Ok(t) => t,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    };
    config.generation.target = target;

    let target_name = target.to_string();
    let (registry, root) = load_grammars(grammar_path, Some(&target_name), output, quiet);
    let input = read_input(input_path, output, quiet);
    let outcome = parse_embedded(&registry, &root, &input, &config, output, quiet);
    if !outcome.is_success() {
        match output {
            OutputFormat::Json => print_json(&serde_json::json!({
                "success": false,
                "parse_errors": outcome.errors(),
            })),
            OutputFormat::Text => print_diagnostics(outcome.errors()),
        }
        process::exit(1);
    }

    let Some(grammar) = registry.get(&root) else {
        report_error(&format!("error: unknown grammar '{}'", root), output, quiet);
        process::exit(1);
    };
    let report = match generate_for_grammar(
        &GeneratorRegistry::with_builtin(),
        &registry,
        grammar,
        outcome.session(),
        &config.generation,
    ) {
        Ok(report) => report,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    let written = match write_generated(out_dir, &report.code) {
        Ok(paths) => paths,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "success": report.code.is_success(),
            "out": out_dir.display().to_string(),
            "written": written.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            "metadata": report.code.metadata,
            "errors": report.code.errors,
            "warnings": report.code.warnings,
            "optimization": report.optimization,
        })),
        OutputFormat::Text => {
            if !quiet {
                print_generation(&report, &written);
            }
            for e in &report.code.errors {
                eprintln!("error: {}", e.message);
            }
        }
    }
    if !report.code.is_success() {
        process::exit(1);
    }
}

fn print_generation(report: &GenerationReport, written: &[PathBuf]) {
    let meta = &report.code.metadata;
    println!(
        "Generated {} file(s) for {} ({} line(s))",
        written.len(),
        meta.target_language,
        meta.lines_of_code
    );
    for path in written {
        println!("  {}", path.display());
    }
    for w in &report.code.warnings {
        println!("warning: {}", w);
    }
    for e in &report.optimization.estimates {
        println!(
            "  {}: {:.1}% ({}, {})",
            e.area, e.improvement_percent, e.basis, e.label
        );
    }
    for note in &report.optimization.notes {
        println!("  note: {}", note);
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
