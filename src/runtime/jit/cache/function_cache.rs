use std::time::Duration;

use ahash::AHashMap;

use super::CompiledEntry;

/// Compiled entries keyed by function name. Entries are never evicted; they
/// only leave through [`FunctionCache::invalidate_dependents`] or `clear`.
#[derive(Debug, Default)]
pub struct FunctionCache {
    entries: AHashMap<String, CompiledEntry>,
}

impl FunctionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&CompiledEntry> {
        self.entries.get(name)
    }

    /// Stores `entry` under its routine's name, replacing any previous one.
    pub fn insert(&mut self, entry: CompiledEntry) -> &CompiledEntry {
        let name = entry.name().to_string();
        self.entries.insert(name.clone(), entry);
        &self.entries[&name]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Drops every entry whose compilation unit includes `name` and returns the
    /// dropped entry names, sorted.
    pub fn invalidate_dependents(&mut self, name: &str) -> Vec<String> {
        let mut removed: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.links(name))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &removed {
            self.entries.remove(key);
        }
        removed.sort_unstable();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_functions: self.entries.len(),
            total_compile_time: self
                .entries
                .values()
                .map(|entry| entry.metadata.compilation_time)
                .sum(),
        }
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total_functions: usize,
    pub total_compile_time: Duration,
}
