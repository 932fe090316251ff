//! Per-language symbol table levels.
//!
//! One root level belongs to the primary grammar's language and every
//! embedded language gets a child level. The owning grammar's
//! [`SharingStrategy`] decides how far a lookup may travel.

use crate::context::SymbolInfo;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharingStrategy {
    /// Every level sees every other level.
    Global,
    /// A level sees only its own symbols.
    Local,
    /// A level sees its own symbols and those of its ancestors.
    #[default]
    Hierarchical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LevelId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolTableLevel {
    pub id: LevelId,
    pub language: String,
    pub level: usize,
    pub symbols: BTreeMap<String, SymbolInfo>,
    pub parent: Option<LevelId>,
    pub children: Vec<LevelId>,
    pub sharing: SharingStrategy,
}

/// Lookup counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone)]
pub struct SymbolHierarchy {
    levels: Vec<SymbolTableLevel>,
    cache: HashMap<(LevelId, String), Option<LevelId>>,
    stats: CacheStats,
}

impl SymbolHierarchy {
    /// A hierarchy holding only the root level for `language`.
    pub fn new(language: &str, sharing: SharingStrategy) -> Self {
        SymbolHierarchy {
            levels: vec![SymbolTableLevel {
                id: LevelId(0),
                language: language.to_string(),
                level: 0,
                symbols: BTreeMap::new(),
                parent: None,
                children: Vec::new(),
                sharing,
            }],
            cache: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn root(&self) -> LevelId {
        LevelId(0)
    }

    /// Add a level for `language` under `parent`, or return the existing one.
    pub fn add_level(&mut self, language: &str, parent: LevelId) -> LevelId {
        if let Some(existing) = self.level_for(language) {
            return existing;
        }
        let id = LevelId(self.levels.len());
        let (depth, sharing) = match self.levels.get(parent.0) {
            Some(p) => (p.level + 1, p.sharing),
            None => (1, SharingStrategy::default()),
        };
        self.levels.push(SymbolTableLevel {
            id,
            language: language.to_string(),
            level: depth,
            symbols: BTreeMap::new(),
            parent: Some(parent),
            children: Vec::new(),
            sharing,
        });
        if let Some(p) = self.levels.get_mut(parent.0) {
            p.children.push(id);
        }
        id
    }

    pub fn level_for(&self, language: &str) -> Option<LevelId> {
        self.levels
            .iter()
            .find(|l| l.language == language)
            .map(|l| l.id)
    }

    pub fn level(&self, id: LevelId) -> Option<&SymbolTableLevel> {
        self.levels.get(id.0)
    }

    pub fn levels(&self) -> &[SymbolTableLevel] {
        &self.levels
    }

    pub fn into_levels(self) -> Vec<SymbolTableLevel> {
        self.levels
    }

    /// Define (or redefine) a symbol on `level`. Invalidates the cache.
    pub fn define(&mut self, level: LevelId, symbol: SymbolInfo) {
        if let Some(l) = self.levels.get_mut(level.0) {
            l.symbols.insert(symbol.name.clone(), symbol);
            self.cache.clear();
        }
    }

    /// Find `name` as seen from `level`.
    pub fn lookup(&mut self, level: LevelId, name: &str) -> Option<&SymbolInfo> {
        let key = (level, name.to_string());
        let found = match self.cache.get(&key) {
            Some(hit) => {
                self.stats.hits += 1;
                *hit
            }
            None => {
                self.stats.misses += 1;
                let found = self.search(level, name);
                self.cache.insert(key, found);
                found
            }
        };
        found.and_then(|id| self.levels.get(id.0)?.symbols.get(name))
    }

    fn search(&self, level: LevelId, name: &str) -> Option<LevelId> {
        let start = self.levels.get(level.0)?;
        match start.sharing {
            SharingStrategy::Local => start.symbols.contains_key(name).then_some(level),
            SharingStrategy::Hierarchical => {
                let mut current = Some(level);
                while let Some(id) = current {
                    let l = self.levels.get(id.0)?;
                    if l.symbols.contains_key(name) {
                        return Some(id);
                    }
                    current = l.parent;
                }
                None
            }
            SharingStrategy::Global => {
                if start.symbols.contains_key(name) {
                    return Some(level);
                }
                self.levels
                    .iter()
                    .find(|l| l.symbols.contains_key(name))
                    .map(|l| l.id)
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextId, Position, SymbolKind};

    fn sym(name: &str) -> SymbolInfo {
        SymbolInfo::new(name, SymbolKind::Variable, ContextId(0), Position::default())
    }

    fn hierarchy(sharing: SharingStrategy) -> (SymbolHierarchy, LevelId, LevelId) {
        let mut h = SymbolHierarchy::new("HTML", sharing);
        let js = h.add_level("JavaScript", h.root());
        let css = h.add_level("CSS", h.root());
        h.define(h.root(), sym("title"));
        h.define(css, sym("primary"));
        (h, js, css)
    }

    #[test]
    fn hierarchical_walks_parents_only() {
        let (mut h, js, _) = hierarchy(SharingStrategy::Hierarchical);
        assert!(h.lookup(js, "title").is_some());
        assert!(h.lookup(js, "primary").is_none());
    }

    #[test]
    fn local_sees_own_level() {
        let (mut h, js, css) = hierarchy(SharingStrategy::Local);
        assert!(h.lookup(js, "title").is_none());
        assert!(h.lookup(css, "primary").is_some());
    }

    #[test]
    fn global_sees_siblings() {
        let (mut h, js, _) = hierarchy(SharingStrategy::Global);
        assert!(h.lookup(js, "primary").is_some());
    }

    #[test]
    fn levels_are_unique_per_language() {
        let (mut h, js, _) = hierarchy(SharingStrategy::Hierarchical);
        assert_eq!(h.add_level("JavaScript", h.root()), js);
        assert_eq!(h.level(js).map(|l| l.level), Some(1));
        assert_eq!(h.level(h.root()).map(|l| l.children.len()), Some(2));
    }

    #[test]
    fn repeated_lookups_hit_cache_until_mutation() {
        let (mut h, js, _) = hierarchy(SharingStrategy::Hierarchical);
        let first = h.lookup(js, "title").cloned();
        let second = h.lookup(js, "title").cloned();
        assert_eq!(first, second);
        assert_eq!(h.stats(), CacheStats { hits: 1, misses: 1 });

        h.define(js, sym("title"));
        let shadowed = h.lookup(js, "title").cloned();
        assert_eq!(h.stats().misses, 2);
        assert_ne!(shadowed, None);
    }
}
