use std::rc::Rc;

use crate::{
    Arena, ArenaInconsistency, ArenaSettings, BUILTINS, Closure, ConfigError,
    ContextStack, DispatchHooks, EvalFn, EvalResult, Expr, Formal,
    GarbageCollectionStats, HeapObject, Literal, Object, ObjectRef, Opcode,
    PrimitiveMethods, RootProvider, RootStack, RootToken, SymbolTable,
    Visitable, WellKnown, eval_expr,
};

#[derive(Debug, Clone)]
pub struct InterpreterCreateInfo {
    pub arena: ArenaSettings,
    /// Maximum number of nested call contexts.
    pub max_depth: usize,
}

impl Default for InterpreterCreateInfo {
    fn default() -> Self {
        Self {
            arena: ArenaSettings::default(),
            max_depth: 512,
        }
    }
}

impl InterpreterCreateInfo {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.arena.validate().map_err(ConfigError::Arena)?;
        if self.max_depth == 0 {
            return Err(ConfigError::MaxDepth);
        }
        Ok(())
    }
}

/// The process-wide evaluation state. Single-threaded.
pub struct Interpreter {
    pub(crate) arena: Arena,
    pub(crate) roots: RootStack,
    pub contexts: ContextStack,
    pub symbols: SymbolTable,
    pub syms: WellKnown,
    pub(crate) prim_methods: PrimitiveMethods,
    pub hooks: DispatchHooks,
    pub(crate) eval_fn: EvalFn,
    null: ObjectRef,
    base_env: ObjectRef,
    global_env: ObjectRef,
    s3_methods: ObjectRef,
    deferred_default: ObjectRef,
    warnings: Vec<String>,
    max_depth: usize,
}

/// Root set of the interpreter, assembled from disjoint field borrows so
/// the arena can be borrowed mutably at the same time.
struct InterpreterRoots<'a> {
    roots: &'a RootStack,
    contexts: &'a ContextStack,
    prim_methods: &'a PrimitiveMethods,
    fixed: [ObjectRef; 5],
}

impl RootProvider for InterpreterRoots<'_> {
    fn visit_roots(&self, visitor: &mut dyn FnMut(ObjectRef)) {
        self.fixed.iter().for_each(|&r| visitor(r));
        let mut visit = |r: ObjectRef| visitor(r);
        self.roots.visit_edges(&mut visit);
        self.contexts.visit_edges(&mut visit);
        self.prim_methods.visit_edges(&mut visit);
    }
}

impl Interpreter {
    pub fn new(info: InterpreterCreateInfo) -> Result<Self, ConfigError> {
        Self::with_symbols(info, SymbolTable::new())
    }

    /// Creates an interpreter sharing an existing symbol table.
    pub fn with_symbols(
        info: InterpreterCreateInfo,
        symbols: SymbolTable,
    ) -> Result<Self, ConfigError> {
        info.validate()?;
        let mut arena = Arena::new(info.arena).map_err(ConfigError::Arena)?;
        let syms = WellKnown::new(&symbols);

        let mut boot: Vec<ObjectRef> = Vec::new();
        let mut boot_alloc = |arena: &mut Arena, object: Object| {
            let r = arena.allocate(HeapObject::new(object), &boot);
            boot.push(r);
            r
        };

        let null = boot_alloc(&mut arena, Object::Null);
        let base_env = boot_alloc(
            &mut arena,
            Object::Environment(crate::Environment::new(None)),
        );
        let global_env = boot_alloc(
            &mut arena,
            Object::Environment(crate::Environment::new(Some(base_env))),
        );
        let s3_methods = boot_alloc(
            &mut arena,
            Object::Environment(crate::Environment::new(None)),
        );
        let deferred_default =
            boot_alloc(&mut arena, Object::Symbol(syms.deferred_default));

        let mut interp = Self {
            arena,
            roots: RootStack::new(),
            contexts: ContextStack::new(),
            symbols,
            syms,
            prim_methods: PrimitiveMethods::new(BUILTINS.len()),
            hooks: DispatchHooks::default(),
            eval_fn: eval_expr,
            null,
            base_env,
            global_env,
            s3_methods,
            deferred_default,
            warnings: Vec::new(),
            max_depth: info.max_depth,
        };

        for (idx, entry) in BUILTINS.iter().enumerate() {
            let fun = interp.alloc_object(Object::Builtin(Opcode(idx)));
            let name = interp.symbols.intern(entry.name);
            interp.define_var(base_env, name, fun);
        }
        let name = interp.syms.deferred_default;
        interp.define_var(base_env, name, deferred_default);

        log::debug!(
            "interpreter: {} builtins installed, {} cells in use",
            BUILTINS.len(),
            interp.arena.allocated_cells()
        );
        Ok(interp)
    }

    /// Replaces the evaluator used for promises and closure bodies.
    pub fn set_eval_fn(&mut self, eval_fn: EvalFn) {
        self.eval_fn = eval_fn;
    }

    #[inline]
    pub fn eval(&mut self, expr: &Rc<Expr>, env: ObjectRef) -> EvalResult {
        (self.eval_fn)(self, expr, env)
    }

    /// Evaluates `expr` in the global environment. Roots created during
    /// evaluation are released, so callers must protect the result before
    /// allocating again.
    pub fn eval_toplevel(&mut self, expr: Expr) -> EvalResult {
        let mark = self.root_depth();
        let result = self.eval(&Rc::new(expr), self.global_env);
        self.release_roots(mark);
        result
    }

    #[inline]
    pub fn null(&self) -> ObjectRef {
        self.null
    }

    #[inline]
    pub fn base_env(&self) -> ObjectRef {
        self.base_env
    }

    #[inline]
    pub fn global_env(&self) -> ObjectRef {
        self.global_env
    }

    /// Environment holding registered S3 methods, consulted after the
    /// lexical lookup fails.
    #[inline]
    pub fn s3_methods_env(&self) -> ObjectRef {
        self.s3_methods
    }

    #[inline]
    pub fn deferred_default(&self) -> ObjectRef {
        self.deferred_default
    }

    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    // Allocation

    pub fn alloc(&mut self, object: HeapObject) -> ObjectRef {
        let roots = InterpreterRoots {
            roots: &self.roots,
            contexts: &self.contexts,
            prim_methods: &self.prim_methods,
            fixed: [
                self.null,
                self.base_env,
                self.global_env,
                self.s3_methods,
                self.deferred_default,
            ],
        };
        self.arena.allocate(object, &roots)
    }

    pub fn alloc_object(&mut self, object: Object) -> ObjectRef {
        if matches!(object, Object::Null) {
            return self.null;
        }
        self.alloc(HeapObject::new(object))
    }

    pub fn alloc_integer(&mut self, values: Vec<i64>) -> ObjectRef {
        self.alloc_object(Object::Integer(values))
    }

    pub fn alloc_double(&mut self, values: Vec<f64>) -> ObjectRef {
        self.alloc_object(Object::Double(values))
    }

    pub fn alloc_logical(&mut self, values: Vec<bool>) -> ObjectRef {
        self.alloc_object(Object::Logical(values))
    }

    pub fn alloc_character<S: Into<String>>(
        &mut self,
        values: impl IntoIterator<Item = S>,
    ) -> ObjectRef {
        let values = values.into_iter().map(Into::into).collect();
        self.alloc_object(Object::Character(values))
    }

    pub fn alloc_closure(
        &mut self,
        formals: Vec<Formal>,
        body: Expr,
        env: ObjectRef,
    ) -> ObjectRef {
        self.alloc_object(Object::Closure(Closure {
            formals: formals.into(),
            body: Rc::new(body),
            env,
        }))
    }

    pub fn alloc_literal(&mut self, literal: &Literal) -> ObjectRef {
        match literal {
            Literal::Null => self.null,
            Literal::Logical(b) => self.alloc_logical(vec![*b]),
            Literal::Integer(i) => self.alloc_integer(vec![*i]),
            Literal::Double(d) => self.alloc_double(vec![*d]),
            Literal::Str(s) => self.alloc_character([s.as_str()]),
        }
    }

    // Heap access

    pub fn heap(&self, r: ObjectRef) -> &HeapObject {
        self.arena
            .get(r)
            .unwrap_or_else(|| panic!("stale object reference {r:?}"))
    }

    pub fn heap_mut(&mut self, r: ObjectRef) -> &mut HeapObject {
        self.arena
            .get_mut(r)
            .unwrap_or_else(|| panic!("stale object reference {r:?}"))
    }

    #[inline]
    pub fn object(&self, r: ObjectRef) -> &Object {
        &self.heap(r).object
    }

    pub fn is_live(&self, r: ObjectRef) -> bool {
        self.arena.is_live(r)
    }

    pub fn closure(&self, r: ObjectRef) -> Option<&Closure> {
        match self.object(r) {
            Object::Closure(closure) => Some(closure),
            _ => None,
        }
    }

    /// First element of an integer, double or logical vector.
    pub fn as_integer(&self, r: ObjectRef) -> Option<i64> {
        match self.object(r) {
            Object::Integer(v) => v.first().copied(),
            Object::Double(v) => v.first().map(|d| *d as i64),
            Object::Logical(v) => v.first().map(|&b| b as i64),
            _ => None,
        }
    }

    /// The elements of a character vector.
    pub fn as_strings(&self, r: ObjectRef) -> Option<&[String]> {
        match self.object(r) {
            Object::Character(v) => Some(v),
            _ => None,
        }
    }

    /// A single non-empty string.
    pub fn as_string(&self, r: ObjectRef) -> Option<&str> {
        match self.as_strings(r) {
            Some([s]) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    // Protection

    #[inline]
    pub fn root_depth(&self) -> usize {
        self.roots.depth()
    }

    pub fn protect(&mut self, r: ObjectRef) -> RootToken {
        self.roots.protect(r, self.contexts.depth())
    }

    pub fn unprotect(&mut self, count: usize) {
        self.roots.unprotect(count, self.contexts.depth());
    }

    pub fn reprotect(&mut self, token: RootToken, r: ObjectRef) {
        self.roots.reprotect(token, r);
    }

    pub fn find_and_remove(&mut self, r: ObjectRef) {
        self.roots.find_and_remove(r);
    }

    /// Drops every root above `depth`.
    pub fn release_roots(&mut self, depth: usize) {
        self.roots.truncate(depth);
    }

    pub fn preserve_object(&mut self, r: ObjectRef) {
        self.roots.preserve_object(r);
    }

    pub fn release_object(&mut self, r: ObjectRef) {
        self.roots.release_object(r);
    }

    // Collection

    pub fn collect_garbage(&mut self) -> usize {
        let roots = InterpreterRoots {
            roots: &self.roots,
            contexts: &self.contexts,
            prim_methods: &self.prim_methods,
            fixed: [
                self.null,
                self.base_env,
                self.global_env,
                self.s3_methods,
                self.deferred_default,
            ],
        };
        self.arena.collect(&roots)
    }

    pub fn verify(&self) -> Result<(), ArenaInconsistency> {
        self.arena.verify()
    }

    pub fn gc_stats(&self) -> GarbageCollectionStats {
        self.arena.stats()
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    // Globals and registration

    pub fn define_global(&mut self, name: &str, value: ObjectRef) {
        let sym = self.symbols.intern(name);
        let global = self.global_env;
        self.define_var(global, sym, value);
    }

    /// Registers `fun` as the `generic` method for `class` in the S3
    /// methods table.
    pub fn register_s3_method(&mut self, generic: &str, class: &str, fun: ObjectRef) {
        let sym = self.symbols.intern(&crate::method_name(generic, class));
        let table = self.s3_methods;
        self.define_var(table, sym, fun);
    }

    /// Sets the class attribute of `r` in place.
    pub fn set_class(&mut self, r: ObjectRef, classes: &[&str]) {
        let class = self.syms.class;
        if classes.is_empty() {
            self.heap_mut(r).set_attribute(class, None);
            return;
        }
        let mark = self.root_depth();
        self.protect(r);
        let value = self.alloc_character(classes.iter().copied());
        self.heap_mut(r).set_attribute(class, Some(value));
        self.release_roots(mark);
    }

    // Warnings

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.warnings.push(message);
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("contexts", &self.contexts.depth())
            .field("roots", &self.roots.depth())
            .field("cells", &self.arena.allocated_cells())
            .finish()
    }
}
