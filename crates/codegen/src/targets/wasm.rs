//! WASM backend: the Rust sources plus `extern "C"` exports for a
//! `cdylib` build, and a C header declaring them.

use super::banner;
use super::rust::{
    inheritance_source, module_index, scope_manager_source, symbol_table_source, validator_source,
};
use crate::analysis::ContextAnalysisResult;
use crate::config::GenerationConfig;
use crate::error::CodegenError;
use crate::generator::{Artifact, CodeGenerator, TargetLanguage};
use braid_core::Grammar;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct WasmGenerator;

const READ_STR: &str = r#"
fn read_str<'a>(ptr: *const u8, len: usize) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: the host passes a pointer to `len` initialized bytes that
    // outlive the call.
    let bytes = unsafe { std::slice::from_raw_parts(ptr, len) };
    std::str::from_utf8(bytes).ok()
}
"#;

const SYMBOL_EXPORTS: &str = r#"
thread_local! {
    static TABLE: SymbolTable = SymbolTable::seeded();
}

#[no_mangle]
pub extern "C" fn braid_symbol_count() -> u32 {
    TABLE.with(|t| t.len() as u32)
}

/// Scope id of the symbol, or -1 when it does not resolve.
#[no_mangle]
pub extern "C" fn braid_lookup_scope(
    lang_ptr: *const u8,
    lang_len: usize,
    name_ptr: *const u8,
    name_len: usize,
) -> i32 {
    let (Some(lang), Some(name)) = (read_str(lang_ptr, lang_len), read_str(name_ptr, name_len)) else {
        return -1;
    };
    TABLE.with(|t| t.lookup(lang, name).map_or(-1, |s| s.scope as i32))
}
"#;

const SCOPE_EXPORTS: &str = r#"
thread_local! {
    static SCOPES: std::cell::RefCell<ScopeManager> = std::cell::RefCell::new(ScopeManager::default());
}

/// New depth, or -1 when the scope cannot be opened.
#[no_mangle]
pub extern "C" fn braid_enter_scope(
    kind_ptr: *const u8,
    kind_len: usize,
    lang_ptr: *const u8,
    lang_len: usize,
) -> i32 {
    let (Some(kind), Some(lang)) = (read_str(kind_ptr, kind_len), read_str(lang_ptr, lang_len)) else {
        return -1;
    };
    SCOPES.with(|m| {
        m.borrow_mut()
            .enter(kind, lang)
            .map_or(-1, |s| s.depth as i32)
    })
}

/// Depth after closing, or -1 at the global scope.
#[no_mangle]
pub extern "C" fn braid_exit_scope() -> i32 {
    SCOPES.with(|m| {
        let mut m = m.borrow_mut();
        match m.exit() {
            Ok(_) => m.depth() as i32,
            Err(_) => -1,
        }
    })
}
"#;

const VALIDATOR_EXPORTS: &str = r#"
#[no_mangle]
pub extern "C" fn braid_types_compatible(
    a_ptr: *const u8,
    a_len: usize,
    b_ptr: *const u8,
    b_len: usize,
) -> i32 {
    match (read_str(a_ptr, a_len), read_str(b_ptr, b_len)) {
        (Some(a), Some(b)) => i32::from(types_compatible(a, b)),
        _ => 0,
    }
}

#[no_mangle]
pub extern "C" fn braid_rule_count() -> u32 {
    RULES.len() as u32
}
"#;

fn with_exports(source: String, exports: &str) -> String {
    format!("{}{}{}", source, READ_STR, exports)
}

fn c_header(analysis: &ContextAnalysisResult, files: &BTreeMap<String, String>) -> String {
    let mut out = banner("//", analysis);
    out.push_str("#ifndef BRAID_CONTEXT_H\n#define BRAID_CONTEXT_H\n\n#include <stddef.h>\n#include <stdint.h>\n\n");
    if files.contains_key("symbol_table.rs") {
        out.push_str("uint32_t braid_symbol_count(void);\n");
        out.push_str("int32_t braid_lookup_scope(const uint8_t *lang, size_t lang_len, const uint8_t *name, size_t name_len);\n");
    }
    if files.contains_key("scope_manager.rs") {
        out.push_str("int32_t braid_enter_scope(const uint8_t *kind, size_t kind_len, const uint8_t *lang, size_t lang_len);\n");
        out.push_str("int32_t braid_exit_scope(void);\n");
    }
    if files.contains_key("context_validator.rs") {
        out.push_str("int32_t braid_types_compatible(const uint8_t *a, size_t a_len, const uint8_t *b, size_t b_len);\n");
        out.push_str("uint32_t braid_rule_count(void);\n");
    }
    out.push_str("\n#endif\n");
    out
}

impl CodeGenerator for WasmGenerator {
    fn target(&self) -> TargetLanguage {
        TargetLanguage::Wasm
    }

    fn symbol_table(
        &self,
        analysis: &ContextAnalysisResult,
        _config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError> {
        Ok(Artifact::new(
            "symbol_table.rs",
            with_exports(symbol_table_source(analysis), SYMBOL_EXPORTS),
        ))
    }

    fn scope_manager(
        &self,
        analysis: &ContextAnalysisResult,
        config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError> {
        Ok(Artifact::new(
            "scope_manager.rs",
            with_exports(
                scope_manager_source(analysis, config.enable_context_optimization),
                SCOPE_EXPORTS,
            ),
        ))
    }

    fn validator(
        &self,
        analysis: &ContextAnalysisResult,
        config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError> {
        if !config.generate_symbol_table {
            return Err(CodegenError::Generation {
                target: TargetLanguage::Wasm,
                message: "the validator module needs the symbol table module".to_string(),
            });
        }
        Ok(Artifact::new(
            "context_validator.rs",
            with_exports(validator_source(analysis), VALIDATOR_EXPORTS),
        ))
    }

    fn inheritance_optimization(
        &self,
        grammar: &dyn Grammar,
        analysis: &ContextAnalysisResult,
        _config: &GenerationConfig,
    ) -> Result<Option<Artifact>, CodegenError> {
        if grammar.base_grammars().is_empty() {
            return Ok(None);
        }
        Ok(Some(Artifact::new("inheritance.rs", inheritance_source(analysis))))
    }

    fn headers(
        &self,
        analysis: &ContextAnalysisResult,
        _config: &GenerationConfig,
        files: &BTreeMap<String, String>,
    ) -> Vec<Artifact> {
        let modules: Vec<&str> = files.keys().filter_map(|f| f.strip_suffix(".rs")).collect();
        if modules.is_empty() {
            return Vec::new();
        }
        vec![
            Artifact::new("lib.rs", module_index(analysis, &modules)),
            Artifact::new("braid_context.h", c_header(analysis, files)),
        ]
    }
}
