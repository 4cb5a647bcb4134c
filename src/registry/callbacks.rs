//! Type-keyed callback table.
//!
//! Maps an application-defined intent type to exactly one callback. Both the
//! interaction registry and the job scheduler own an independent table; a
//! second registration for the same type replaces the first.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One callback per intent type.
pub struct CallbackTable<F: ?Sized> {
    callbacks: HashMap<String, Arc<F>>,
}

impl<F: ?Sized> CallbackTable<F> {
    pub fn new() -> Self {
        Self {
            callbacks: HashMap::new(),
        }
    }

    /// Register `callback` for `intent_type`.
    /// Returns true if an earlier callback was replaced.
    pub fn register(&mut self, intent_type: impl Into<String>, callback: Arc<F>) -> bool {
        self.callbacks.insert(intent_type.into(), callback).is_some()
    }

    /// Shared handle to the callback for `intent_type`, if any.
    pub fn get(&self, intent_type: &str) -> Option<Arc<F>> {
        self.callbacks.get(intent_type).cloned()
    }

    pub fn contains(&self, intent_type: &str) -> bool {
        self.callbacks.contains_key(intent_type)
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Registered types, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.callbacks.keys().cloned().collect();
        types.sort();
        types
    }
}

impl<F: ?Sized> Default for CallbackTable<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for CallbackTable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTable")
            .field("types", &self.types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Greeter = dyn Fn(&str) -> String + Send + Sync;

    #[test]
    fn test_last_writer_wins() {
        let mut table: CallbackTable<Greeter> = CallbackTable::new();

        assert!(!table.register("greet", Arc::new(|name: &str| format!("hello {name}"))));
        assert!(table.register("greet", Arc::new(|name: &str| format!("hi {name}"))));

        let greet = table.get("greet").unwrap();
        assert_eq!(greet("alice"), "hi alice");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unknown_type() {
        let table: CallbackTable<Greeter> = CallbackTable::default();
        assert!(table.get("greet").is_none());
        assert!(!table.contains("greet"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_types_sorted() {
        let mut table: CallbackTable<Greeter> = CallbackTable::new();
        table.register("b", Arc::new(|_: &str| String::new()));
        table.register("a", Arc::new(|_: &str| String::new()));
        assert_eq!(table.types(), vec!["a".to_string(), "b".to_string()]);
    }
}
