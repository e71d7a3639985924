//! Expression trees consumed by the evaluator.
//!
//! Building these from source text is the parser's job and lives outside
//! this crate; the constructors here exist for hosts and tests.

use std::{fmt, rc::Rc};

use crate::{Symbol, SymbolTable};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Logical(bool),
    Integer(i64),
    Double(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Formal {
    pub name: Symbol,
    pub default: Option<Rc<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprArg {
    pub tag: Option<Symbol>,
    pub value: Rc<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Symbol(Symbol),
    /// The empty argument in `f(x, )`.
    Missing,
    Call {
        fun: Rc<Expr>,
        args: Rc<[ExprArg]>,
    },
    Function {
        formals: Rc<[Formal]>,
        body: Rc<Expr>,
    },
    Block(Vec<Rc<Expr>>),
    If {
        cond: Rc<Expr>,
        then: Rc<Expr>,
        otherwise: Option<Rc<Expr>>,
    },
    /// `name <- value`, or `name <<- value` when `superassign` is set.
    Assign {
        name: Symbol,
        value: Rc<Expr>,
        superassign: bool,
    },
}

impl Formal {
    pub fn new(name: Symbol) -> Self {
        Self {
            name,
            default: None,
        }
    }

    pub fn with_default(name: Symbol, default: Expr) -> Self {
        Self {
            name,
            default: Some(Rc::new(default)),
        }
    }
}

impl ExprArg {
    pub fn new(value: Expr) -> Self {
        Self {
            tag: None,
            value: Rc::new(value),
        }
    }

    pub fn named(tag: Symbol, value: Expr) -> Self {
        Self {
            tag: Some(tag),
            value: Rc::new(value),
        }
    }
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Self::Literal(Literal::Integer(value))
    }

    pub fn double(value: f64) -> Self {
        Self::Literal(Literal::Double(value))
    }

    pub fn string(value: &str) -> Self {
        Self::Literal(Literal::Str(value.to_owned()))
    }

    pub fn logical(value: bool) -> Self {
        Self::Literal(Literal::Logical(value))
    }

    pub fn null() -> Self {
        Self::Literal(Literal::Null)
    }

    pub fn call(fun: Expr, args: Vec<ExprArg>) -> Self {
        Self::Call {
            fun: Rc::new(fun),
            args: args.into(),
        }
    }

    pub fn function(formals: Vec<Formal>, body: Expr) -> Self {
        Self::Function {
            formals: formals.into(),
            body: Rc::new(body),
        }
    }

    pub fn block(exprs: Vec<Expr>) -> Self {
        Self::Block(exprs.into_iter().map(Rc::new).collect())
    }

    pub fn assign(name: Symbol, value: Expr) -> Self {
        Self::Assign {
            name,
            value: Rc::new(value),
            superassign: false,
        }
    }

    pub fn superassign(name: Symbol, value: Expr) -> Self {
        Self::Assign {
            name,
            value: Rc::new(value),
            superassign: true,
        }
    }

    pub fn if_else(cond: Expr, then: Expr, otherwise: Option<Expr>) -> Self {
        Self::If {
            cond: Rc::new(cond),
            then: Rc::new(then),
            otherwise: otherwise.map(Rc::new),
        }
    }

    /// The operator symbol of a call, if it is a plain name.
    pub fn call_head(&self) -> Option<Symbol> {
        match self {
            Expr::Call { fun, .. } => match **fun {
                Expr::Symbol(sym) => Some(sym),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn call_args(&self) -> &[ExprArg] {
        match self {
            Expr::Call { args, .. } => args,
            _ => &[],
        }
    }

    /// The same call with its operator replaced by `head`.
    pub fn with_head(&self, head: Symbol) -> Expr {
        match self {
            Expr::Call { args, .. } => Expr::Call {
                fun: Rc::new(Expr::Symbol(head)),
                args: args.clone(),
            },
            _ => Expr::Call {
                fun: Rc::new(Expr::Symbol(head)),
                args: Rc::from(Vec::new()),
            },
        }
    }

    /// Displays the expression in call syntax, for error messages.
    pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> ExprDisplay<'a> {
        ExprDisplay {
            expr: self,
            symbols,
        }
    }
}

pub struct ExprDisplay<'a> {
    expr: &'a Expr,
    symbols: &'a SymbolTable,
}

impl ExprDisplay<'_> {
    fn nested<'b>(&'b self, expr: &'b Expr) -> ExprDisplay<'b> {
        ExprDisplay {
            expr,
            symbols: self.symbols,
        }
    }
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expr {
            Expr::Literal(lit) => match lit {
                Literal::Null => f.write_str("NULL"),
                Literal::Logical(true) => f.write_str("TRUE"),
                Literal::Logical(false) => f.write_str("FALSE"),
                Literal::Integer(i) => write!(f, "{i}L"),
                Literal::Double(d) => write!(f, "{d}"),
                Literal::Str(s) => write!(f, "{s:?}"),
            },
            Expr::Symbol(sym) => f.write_str(&self.symbols.name(*sym)),
            Expr::Missing => Ok(()),
            Expr::Call { fun, args } => {
                write!(f, "{}(", self.nested(fun))?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    if let Some(tag) = arg.tag {
                        write!(f, "{} = ", self.symbols.name(tag))?;
                    }
                    write!(f, "{}", self.nested(&arg.value))?;
                }
                f.write_str(")")
            }
            Expr::Function { formals, .. } => {
                f.write_str("function(")?;
                for (idx, formal) in formals.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&self.symbols.name(formal.name))?;
                }
                f.write_str(") ...")
            }
            Expr::Block(exprs) => {
                f.write_str("{ ")?;
                for expr in exprs {
                    write!(f, "{}; ", self.nested(expr))?;
                }
                f.write_str("}")
            }
            Expr::If { cond, .. } => write!(f, "if ({}) ...", self.nested(cond)),
            Expr::Assign {
                name,
                value,
                superassign,
            } => {
                let op = if *superassign { "<<-" } else { "<-" };
                write!(
                    f,
                    "{} {op} {}",
                    self.symbols.name(*name),
                    self.nested(value)
                )
            }
        }
    }
}
