use std::collections::HashMap;

use crate::value::SymbolId;

/// Names interned before anything else, in `sym` order.
const WELL_KNOWN: [&str; 13] = [
    "quote", "if", "define", "lambda", "let", "set!", "begin", "cond", "else", "and", "or",
    "PI", "E",
];

/// Ids of the names in `WELL_KNOWN`.
pub mod sym {
    use crate::value::SymbolId;

    pub const QUOTE: SymbolId = SymbolId(0);
    pub const IF: SymbolId = SymbolId(1);
    pub const DEFINE: SymbolId = SymbolId(2);
    pub const LAMBDA: SymbolId = SymbolId(3);
    pub const LET: SymbolId = SymbolId(4);
    pub const SET: SymbolId = SymbolId(5);
    pub const BEGIN: SymbolId = SymbolId(6);
    pub const COND: SymbolId = SymbolId(7);
    pub const ELSE: SymbolId = SymbolId(8);
    pub const AND: SymbolId = SymbolId(9);
    pub const OR: SymbolId = SymbolId(10);
    pub const PI: SymbolId = SymbolId(11);
    pub const E: SymbolId = SymbolId(12);
}

/// Symbol names live outside the arena; a `SymbolId` is an index into
/// `names`, so two symbols are the same exactly when their ids are.
#[derive(Debug)]
pub struct SymbolTable {
    ids: HashMap<Box<str>, SymbolId>,
    names: Vec<Box<str>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable {
            ids: HashMap::with_capacity(WELL_KNOWN.len()),
            names: Vec::with_capacity(WELL_KNOWN.len()),
        };
        for name in WELL_KNOWN {
            table.intern(name);
        }
        table
    }

    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = SymbolId(self.names.len() as u32);
        let owned: Box<str> = name.into();
        self.ids.insert(owned.clone(), id);
        self.names.push(owned);
        id
    }

    /// Text of an interned symbol. Ids never come from anywhere but `intern`.
    pub fn name(&self, id: SymbolId) -> &str {
        self.names.get(id.0 as usize).map_or("", |n| n.as_ref())
    }

    /// Id of `name` if it has been interned.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.ids.get(name).copied()
    }

    pub fn count(&self) -> usize {
        self.names.len()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
