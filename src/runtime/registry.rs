use ahash::AHashMap;

use crate::ast::FunctionDefinition;

/// Outcome of [`FunctionRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First definition under this name.
    Inserted,
    /// Same parameters and body as the definition already registered.
    Unchanged,
    /// The previous definition was replaced by a different one.
    Replaced,
}

/// Owns every known function definition, keyed by name.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: AHashMap<String, FunctionDefinition>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: FunctionDefinition) -> Registration {
        match self.functions.get_mut(definition.name()) {
            Some(existing) if *existing == definition => Registration::Unchanged,
            Some(existing) => {
                *existing = definition;
                Registration::Replaced
            }
            None => {
                self.functions
                    .insert(definition.name().to_string(), definition);
                Registration::Inserted
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered names in lexical order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
