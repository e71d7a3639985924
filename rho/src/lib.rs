mod apply;
mod arena;
mod args;
mod builtins;
mod context;
mod dispatch;
mod env;
mod error;
mod eval;
mod interpreter;
mod lang;
mod object;
mod primitive_methods;
mod promise;
mod roots;
mod search;
mod symbols;
mod visitor;

pub use arena::{
    Arena, ArenaInconsistency, ArenaSettings, GarbageCollectionStats, RootProvider,
};
pub use args::*;
pub use builtins::{
    BUILTINS, BuiltinContext, BuiltinEntry, BuiltinFlags, BuiltinFn, builtin_index,
    get_builtin,
};
pub use context::*;
pub use dispatch::format_class;
pub use env::*;
pub use error::*;
pub use eval::{EvalFn, eval_expr};
pub use interpreter::{Interpreter, InterpreterCreateInfo};
pub use lang::*;
pub use object::*;
pub use primitive_methods::*;
pub use promise::*;
pub use roots::{RootStack, RootToken};
pub use search::*;
pub use symbols::*;
pub use visitor::{Visitable, Visitor};
