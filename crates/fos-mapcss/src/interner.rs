//! Symbol Table - Map tag strings to integer ids
//!
//! Tag keys and values that rules require are interned once while the rule
//! index is built. Queries only look strings up and never allocate.

use std::collections::HashMap;

/// Interned string id - just 4 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Symbol(pub u32);

/// String to symbol table
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    /// Map from string content to id
    map: HashMap<Box<str>, Symbol>,
    /// Strings by id
    strings: Vec<Box<str>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its id
    pub fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&sym) = self.map.get(s) {
            return sym;
        }
        let sym = Symbol(self.strings.len() as u32);
        self.strings.push(s.into());
        self.map.insert(s.into(), sym);
        sym
    }

    /// Look up without interning
    #[inline]
    pub fn lookup(&self, s: &str) -> Option<Symbol> {
        self.map.get(s).copied()
    }

    /// String for an id
    pub fn resolve(&self, sym: Symbol) -> Option<&str> {
        self.strings.get(sym.0 as usize).map(|s| &**s)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedup() {
        let mut table = SymbolTable::new();
        let a = table.intern("highway");
        let b = table.intern("highway");
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_lookup_and_resolve() {
        let mut table = SymbolTable::new();
        let sym = table.intern("building");
        assert_eq!(table.lookup("building"), Some(sym));
        assert_eq!(table.lookup("amenity"), None);
        assert_eq!(table.resolve(sym), Some("building"));
    }
}
