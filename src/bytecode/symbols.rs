//! Identifier resolution for the compiler.
//!
//! A single global scope mapping names to global slots. The slot indices
//! handed out here are the same indices the VM uses for `GetGlobal` and
//! `SetGlobal`, so a compiler and VM sharing state must share one table.

use indexmap::IndexMap;

/// A named binding resolved to a global slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub index: u16,
}

/// Insertion-ordered map from name to symbol, assigning slots in
/// definition order.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    store: IndexMap<String, Symbol>,
    definitions: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to the next unused slot. Redefining a name burns a
    /// fresh slot; the previous one becomes unreachable.
    pub fn define(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            index: self.definitions as u16,
        };
        self.definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Look up `name`, or `None` when it was never defined.
    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.store.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_assigns_slots_in_order() {
        let mut table = SymbolTable::new();
        let a = table.define("a");
        let b = table.define("b");

        assert_eq!(a, Symbol { name: "a".to_string(), index: 0 });
        assert_eq!(b, Symbol { name: "b".to_string(), index: 1 });
    }

    #[test]
    fn test_resolve() {
        let mut table = SymbolTable::new();
        table.define("a");
        table.define("b");

        assert_eq!(table.resolve("a").map(|s| s.index), Some(0));
        assert_eq!(table.resolve("b").map(|s| s.index), Some(1));
        assert_eq!(table.resolve("missing"), None);
    }

    #[test]
    fn test_redefinition_gets_a_new_slot() {
        let mut table = SymbolTable::new();
        table.define("a");
        table.define("b");
        let redefined = table.define("a");

        assert_eq!(redefined.index, 2);
        assert_eq!(table.resolve("a").map(|s| s.index), Some(2));
        assert_eq!(table.resolve("b").map(|s| s.index), Some(1));
    }
}
