use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;

/// Canonical identity of an interned name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

struct SymbolTableImpl {
    names: Vec<Arc<str>>,
    mappings: HashMap<Arc<str>, Symbol, ahash::RandomState>,
}

/// Process-wide symbol interning service.
///
/// Cloning shares the table, so several interpreters can agree on symbol
/// identity.
#[derive(Clone)]
pub struct SymbolTable(Arc<RwLock<SymbolTableImpl>>);

impl SymbolTableImpl {
    fn new() -> Self {
        Self {
            names: Vec::new(),
            mappings: HashMap::default(),
        }
    }

    fn get_or_add(&mut self, name: &str) -> Symbol {
        if let Some(&sym) = self.mappings.get(name) {
            return sym;
        }
        let sym = Symbol(self.names.len() as u32);
        let interned = Arc::<str>::from(name);
        self.names.push(interned.clone());
        self.mappings.insert(interned, sym);
        sym
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(SymbolTableImpl::new())))
    }

    pub fn intern(&self, name: &str) -> Symbol {
        if let Some(&sym) = self.0.read().mappings.get(name) {
            return sym;
        }
        self.0.write().get_or_add(name)
    }

    /// Looks up a name without interning it.
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.0.read().mappings.get(name).copied()
    }

    pub fn name(&self, sym: Symbol) -> Arc<str> {
        self.0
            .read()
            .names
            .get(sym.0 as usize)
            .cloned()
            .expect("symbol was interned by this table")
    }

    pub fn len(&self) -> usize {
        self.0.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("len", &self.len())
            .finish()
    }
}

/// Symbols the runtime refers to by identity.
#[derive(Debug, Clone, Copy)]
pub struct WellKnown {
    pub dots: Symbol,
    pub class: Symbol,
    pub names: Symbol,
    pub previous: Symbol,
    pub dot_class: Symbol,
    pub dot_generic: Symbol,
    pub dot_method: Symbol,
    pub dot_group: Symbol,
    pub dot_generic_call_env: Symbol,
    pub dot_generic_def_env: Symbol,
    pub deferred_default: Symbol,
    pub generic: Symbol,
    pub object: Symbol,
}

impl WellKnown {
    pub fn new(table: &SymbolTable) -> Self {
        Self {
            dots: table.intern("..."),
            class: table.intern("class"),
            names: table.intern("names"),
            previous: table.intern("previous"),
            dot_class: table.intern(".Class"),
            dot_generic: table.intern(".Generic"),
            dot_method: table.intern(".Method"),
            dot_group: table.intern(".Group"),
            dot_generic_call_env: table.intern(".GenericCallEnv"),
            dot_generic_def_env: table.intern(".GenericDefEnv"),
            deferred_default: table.intern(".DeferredDefault"),
            generic: table.intern("generic"),
            object: table.intern("object"),
        }
    }
}
