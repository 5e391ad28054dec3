//! Pre-loaded modules handed to the sandboxed `require`.

use std::collections::BTreeMap;

/// Maps a whitelisted specifier to a JavaScript expression that produces the module.
///
/// Each expression is evaluated as the body of `function (runtime) { return <expr>; }`,
/// so it may reference the runtime object (`runtime.React`, `runtime.library(name)`).
/// The import policy runs before this map is consulted; an entry here does not make a
/// specifier importable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMap {
    entries: BTreeMap<String, String>,
}

impl Default for ModuleMap {
    fn default() -> Self {
        Self::empty()
            .with("react", "runtime.React")
            .with("recharts", "runtime.library(\"recharts\")")
            .with("lucide-react", "runtime.library(\"lucide-react\")")
    }
}

impl ModuleMap {
    /// A map with no modules. Every whitelisted `require` fails until populated.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Add or replace the module for `specifier`.
    pub fn with(mut self, specifier: impl Into<String>, expression: impl Into<String>) -> Self {
        self.insert(specifier, expression);
        self
    }

    pub fn insert(&mut self, specifier: impl Into<String>, expression: impl Into<String>) {
        self.entries.insert(specifier.into(), expression.into());
    }

    pub fn get(&self, specifier: &str) -> Option<&str> {
        self.entries.get(specifier).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
