//! Named grammar storage and `@IMPORT` graph loading.

use super::loader::{parse_grammar, LoadOptions};
use super::{CompositionStrategy, GrammarSpec};
use crate::error::{BraidError, Diagnostic};
use crate::source::SourceProvider;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Grammars by name, plus language aliases introduced by imports
/// (`@IMPORT Script FROM "js.grammar"` makes `Script` resolve to whatever
/// grammar `js.grammar` declares).
#[derive(Debug, Default, Clone)]
pub struct GrammarRegistry {
    grammars: BTreeMap<String, GrammarSpec>,
    aliases: BTreeMap<String, String>,
}

/// What a provider-backed load produced.
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// Name of the root grammar.
    pub root: String,
    /// Every grammar loaded, imports before importers.
    pub loaded: Vec<String>,
    /// Warnings gathered across the import graph.
    pub diagnostics: Vec<Diagnostic>,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a grammar, replacing any grammar of the same name.
    pub fn insert(&mut self, grammar: GrammarSpec) -> Option<GrammarSpec> {
        self.grammars.insert(grammar.name.clone(), grammar)
    }

    /// Look up by grammar name, then by import alias.
    pub fn get(&self, name: &str) -> Option<&GrammarSpec> {
        self.grammars.get(name).or_else(|| {
            self.aliases
                .get(name)
                .and_then(|target| self.grammars.get(target))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.grammars.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    /// Parse and register grammar text. Fails when the text has errors.
    pub fn load_str(
        &mut self,
        src: &str,
        options: &LoadOptions,
    ) -> Result<(String, Vec<Diagnostic>), BraidError> {
        let load = parse_grammar(src, options);
        if !load.success() {
            return Err(BraidError::GrammarLoad {
                grammar: load.grammar.name,
                diagnostics: load.diagnostics,
            });
        }
        let name = load.grammar.name.clone();
        self.insert(load.grammar);
        Ok((name, load.diagnostics))
    }

    /// Load `root` and, depth-first, every grammar it imports.
    pub fn load_with_provider(
        &mut self,
        root: &Path,
        provider: &dyn SourceProvider,
        target: Option<&str>,
    ) -> Result<LoadReport, BraidError> {
        let mut walk = ImportWalk {
            provider,
            target,
            stack: Vec::new(),
            done: BTreeMap::new(),
            report: LoadReport {
                root: String::new(),
                loaded: Vec::new(),
                diagnostics: Vec::new(),
            },
        };
        let root_name = walk.load(self, root)?;
        walk.report.root = root_name;
        Ok(walk.report)
    }

    fn compose(&mut self, importer: &mut GrammarSpec, language: &str, imported: &str) {
        importer.add_embedded_language(language);
        match importer.composition {
            CompositionStrategy::Merge => {
                self.aliases
                    .entry(language.to_string())
                    .or_insert_with(|| imported.to_string());
            }
            CompositionStrategy::Override => {
                self.aliases
                    .insert(language.to_string(), imported.to_string());
            }
            CompositionStrategy::Extend => {
                self.aliases
                    .insert(language.to_string(), imported.to_string());
                importer.add_base_grammar(imported);
            }
        }
    }
}

struct ImportWalk<'p> {
    provider: &'p dyn SourceProvider,
    target: Option<&'p str>,
    stack: Vec<PathBuf>,
    done: BTreeMap<PathBuf, String>,
    report: LoadReport,
}

impl ImportWalk<'_> {
    fn load(&mut self, registry: &mut GrammarRegistry, path: &Path) -> Result<String, BraidError> {
        let source_error = |e: std::io::Error| BraidError::Source {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let canonical = self.provider.canonicalize(path).map_err(source_error)?;

        if let Some(pos) = self.stack.iter().position(|p| p == &canonical) {
            let mut chain: Vec<String> = self.stack[pos..]
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            chain.push(canonical.display().to_string());
            return Err(BraidError::ImportCycle { chain });
        }
        if let Some(name) = self.done.get(&canonical) {
            return Ok(name.clone());
        }

        let text = self.provider.read_source(&canonical).map_err(source_error)?;
        let options = LoadOptions {
            target: self.target.map(str::to_string),
            file: Some(canonical.display().to_string()),
            default_name: canonical
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned()),
        };
        let load = parse_grammar(&text, &options);
        if !load.success() {
            return Err(BraidError::GrammarLoad {
                grammar: load.grammar.name,
                diagnostics: load.diagnostics,
            });
        }
        let mut grammar = load.grammar;
        self.report.diagnostics.extend(load.diagnostics);
        tracing::debug!(grammar = %grammar.name, path = %canonical.display(), "loaded grammar");

        self.stack.push(canonical.clone());
        let base = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
        for import in grammar.imports.clone() {
            let resolved = self
                .provider
                .resolve_import(&base, &import.path)
                .map_err(|e| BraidError::Source {
                    path: PathBuf::from(&import.path),
                    message: e.to_string(),
                })?;
            let imported = self.load(registry, &resolved)?;
            registry.compose(&mut grammar, &import.language, &imported);
        }
        self.stack.pop();

        let name = grammar.name.clone();
        registry.insert(grammar);
        self.done.insert(canonical, name.clone());
        self.report.loaded.push(name.clone());
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;
    use crate::source::InMemoryProvider;

    #[test]
    fn loads_import_graph_depth_first() {
        let provider = InMemoryProvider::default()
            .with_file(
                "/g/page.grammar",
                "Grammar: Page\n@IMPORT Script FROM \"lang/js.grammar\"\n@IMPORT Style FROM \"lang/css.grammar\"\n",
            )
            .with_file("/g/lang/js.grammar", "Grammar: JavaScript\n")
            .with_file("/g/lang/css.grammar", "Grammar: CSS\n@IMPORT Script FROM \"js.grammar\"\n");

        let mut registry = GrammarRegistry::new();
        let report = registry
            .load_with_provider(Path::new("/g/page.grammar"), &provider, None)
            .unwrap();
        assert_eq!(report.root, "Page");
        assert_eq!(report.loaded, vec!["JavaScript", "CSS", "Page"]);
        assert_eq!(registry.get("Script").map(|g| g.name()), Some("JavaScript"));
        assert_eq!(
            registry.get("Page").unwrap().embedded_languages(),
            &["Script".to_string(), "Style".to_string()]
        );
    }

    #[test]
    fn import_cycle_is_reported_with_chain() {
        let provider = InMemoryProvider::default()
            .with_file("/g/a.grammar", "Grammar: A\n@IMPORT B FROM \"b.grammar\"\n")
            .with_file("/g/b.grammar", "Grammar: B\n@IMPORT A FROM \"a.grammar\"\n");
        let err = GrammarRegistry::new()
            .load_with_provider(Path::new("/g/a.grammar"), &provider, None)
            .unwrap_err();
        match err {
            BraidError::ImportCycle { chain } => {
                assert_eq!(chain.len(), 3);
                assert_eq!(chain.first(), chain.last());
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn missing_import_is_a_source_error() {
        let provider = InMemoryProvider::default()
            .with_file("/g/a.grammar", "Grammar: A\n@IMPORT B FROM \"b.grammar\"\n");
        let err = GrammarRegistry::new()
            .load_with_provider(Path::new("/g/a.grammar"), &provider, None)
            .unwrap_err();
        assert!(matches!(err, BraidError::Source { .. }));
    }

    #[test]
    fn composition_strategies_differ_on_alias_conflicts() {
        let mut registry = GrammarRegistry::new();
        registry.insert(GrammarSpec::new("Old"));
        registry.insert(GrammarSpec::new("New"));
        registry.aliases.insert("Script".into(), "Old".into());

        let mut merge = GrammarSpec::new("M");
        registry.compose(&mut merge, "Script", "New");
        assert_eq!(registry.get("Script").unwrap().name, "Old");
        assert!(merge.embedded_languages.contains(&"Script".to_string()));

        let mut over = GrammarSpec::new("O");
        over.composition = CompositionStrategy::Override;
        registry.compose(&mut over, "Script", "New");
        assert_eq!(registry.get("Script").unwrap().name, "New");

        let mut ext = GrammarSpec::new("E");
        ext.composition = CompositionStrategy::Extend;
        registry.compose(&mut ext, "Style", "Old");
        assert_eq!(ext.base_grammars, vec!["Old".to_string()]);
    }

    #[test]
    fn broken_grammar_text_is_rejected() {
        let mut registry = GrammarRegistry::new();
        let err = registry
            .load_str("Grammar: X\nTokenSplitter: commas\n", &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, BraidError::GrammarLoad { ref grammar, .. } if grammar == "X"));
        assert!(registry.is_empty());
    }
}
