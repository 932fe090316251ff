//! Target → generator registry. Duplicates are rejected when registered,
//! so lookups only fail for targets nobody registered.

use crate::error::CodegenError;
use crate::generator::{CodeGenerator, TargetLanguage};
use crate::targets::{GoGenerator, RustGenerator, TypeScriptGenerator, WasmGenerator};
use std::collections::BTreeMap;

#[derive(Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<TargetLanguage, Box<dyn CodeGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Go, Rust, WASM and TypeScript backends.
    pub fn with_builtin() -> Self {
        let mut generators: BTreeMap<TargetLanguage, Box<dyn CodeGenerator>> = BTreeMap::new();
        generators.insert(TargetLanguage::Go, Box::new(GoGenerator));
        generators.insert(TargetLanguage::Rust, Box::new(RustGenerator));
        generators.insert(TargetLanguage::Wasm, Box::new(WasmGenerator));
        generators.insert(TargetLanguage::TypeScript, Box::new(TypeScriptGenerator));
        GeneratorRegistry { generators }
    }

    pub fn register(&mut self, generator: Box<dyn CodeGenerator>) -> Result<(), CodegenError> {
        let target = generator.target();
        if self.generators.contains_key(&target) {
            return Err(CodegenError::DuplicateGenerator(target));
        }
        tracing::debug!(backend = %target, "generator registered");
        self.generators.insert(target, generator);
        Ok(())
    }

    pub fn get(&self, target: TargetLanguage) -> Result<&dyn CodeGenerator, CodegenError> {
        self.generators
            .get(&target)
            .map(|g| g.as_ref())
            .ok_or_else(|| CodegenError::UnsupportedTarget(target.to_string()))
    }

    pub fn targets(&self) -> impl Iterator<Item = TargetLanguage> + '_ {
        self.generators.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_every_target() {
        let registry = GeneratorRegistry::with_builtin();
        assert_eq!(registry.targets().collect::<Vec<_>>(), TargetLanguage::ALL.to_vec());
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = GeneratorRegistry::new();
        registry.register(Box::new(GoGenerator)).unwrap();
        let err = registry.register(Box::new(GoGenerator)).unwrap_err();
        assert!(matches!(err, CodegenError::DuplicateGenerator(TargetLanguage::Go)));
    }

    #[test]
    fn missing_target_is_unsupported() {
        let registry = GeneratorRegistry::new();
        let err = registry.get(TargetLanguage::Wasm).err().unwrap();
        assert_eq!(err.to_string(), "unsupported target language 'wasm'");
    }

    #[test]
    fn unknown_target_name_fails_to_parse() {
        let err = "cobol".parse::<TargetLanguage>().unwrap_err();
        assert!(matches!(err, CodegenError::UnsupportedTarget(name) if name == "cobol"));
        assert_eq!("TS".parse::<TargetLanguage>().unwrap(), TargetLanguage::TypeScript);
    }
}
