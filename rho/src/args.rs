//! Actual argument lists and formal/actual matching.

use std::rc::Rc;

use crate::{
    BindingOrigin, Expr, ExprArg, Formal, Interpreter, Literal, Object,
    ObjectRef, RuntimeError, Symbol, SymbolTable,
};

/// One actual argument. `value` is `None` for an empty argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arg {
    pub tag: Option<Symbol>,
    pub value: Option<ObjectRef>,
}

impl Arg {
    pub fn new(value: ObjectRef) -> Self {
        Self {
            tag: None,
            value: Some(value),
        }
    }

    pub fn named(tag: Symbol, value: ObjectRef) -> Self {
        Self {
            tag: Some(tag),
            value: Some(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgList(pub Vec<Arg>);

impl ArgList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, arg: Arg) {
        self.0.push(arg);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.0.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.0.iter().filter_map(|arg| arg.value)
    }

    pub fn get(&self, idx: usize) -> Option<&Arg> {
        self.0.get(idx)
    }

    /// Named entries of `other` replace same-named entries; everything else
    /// is appended. Positional entries of `self` are never disturbed.
    pub fn merge(&mut self, other: ArgList) {
        for arg in other.0 {
            let existing = arg.tag.and_then(|tag| {
                self.0.iter_mut().find(|current| current.tag == Some(tag))
            });
            match existing {
                Some(current) => current.value = arg.value,
                None => self.0.push(arg),
            }
        }
    }
}

impl From<Vec<Arg>> for ArgList {
    fn from(args: Vec<Arg>) -> Self {
        Self(args)
    }
}

/// The outcome of matching for one formal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matched {
    Supplied(ObjectRef),
    Missing,
    /// Everything gathered by the `...` formal, in call order.
    Dots(Vec<Arg>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// Indices of the actuals nothing consumed.
    Unused(Vec<usize>),
    MultipleMatch(Symbol),
    /// The actual at this index is a prefix of several formals.
    Ambiguous(usize),
}

/// Matches `actuals` against `formals`.
///
/// Exact names first, then unique prefixes for formals before `...`, then
/// untagged actuals positionally up to `...`; whatever is left goes to
/// `...` if there is one.
pub fn match_args(
    formals: &[Formal],
    actuals: &[Arg],
    dots: Symbol,
    symbols: &SymbolTable,
) -> Result<Vec<Matched>, MatchError> {
    let dots_at = formals.iter().position(|f| f.name == dots);
    let mut bound: Vec<Option<usize>> = vec![None; formals.len()];
    let mut used = vec![false; actuals.len()];

    for (fi, formal) in formals.iter().enumerate() {
        if Some(fi) == dots_at {
            continue;
        }
        for (ai, actual) in actuals.iter().enumerate() {
            if actual.tag != Some(formal.name) {
                continue;
            }
            if bound[fi].is_some() {
                return Err(MatchError::MultipleMatch(formal.name));
            }
            bound[fi] = Some(ai);
            used[ai] = true;
        }
    }

    let partial_limit = dots_at.unwrap_or(formals.len());
    let mut partially_bound = vec![false; formals.len()];
    for (ai, actual) in actuals.iter().enumerate() {
        let Some(tag) = actual.tag.filter(|_| !used[ai]) else {
            continue;
        };
        let prefix = symbols.name(tag);
        let candidates = (0..partial_limit)
            .filter(|&fi| bound[fi].is_none() || partially_bound[fi])
            .filter(|&fi| symbols.name(formals[fi].name).starts_with(&*prefix))
            .collect::<Vec<_>>();
        match candidates.as_slice() {
            [] => (),
            [fi] => {
                if partially_bound[*fi] {
                    return Err(MatchError::MultipleMatch(formals[*fi].name));
                }
                bound[*fi] = Some(ai);
                partially_bound[*fi] = true;
                used[ai] = true;
            }
            _ => return Err(MatchError::Ambiguous(ai)),
        }
    }

    let mut next = 0;
    for fi in 0..partial_limit {
        if bound[fi].is_some() {
            continue;
        }
        while next < actuals.len() && (used[next] || actuals[next].tag.is_some()) {
            next += 1;
        }
        if next == actuals.len() {
            break;
        }
        bound[fi] = Some(next);
        used[next] = true;
    }

    let leftover = (0..actuals.len()).filter(|&ai| !used[ai]);
    let gathered = match dots_at {
        Some(_) => leftover.map(|ai| actuals[ai]).collect::<Vec<_>>(),
        None => {
            let unused = leftover.collect::<Vec<_>>();
            if !unused.is_empty() {
                return Err(MatchError::Unused(unused));
            }
            Vec::new()
        }
    };

    let mut gathered = Some(gathered);
    Ok(formals
        .iter()
        .enumerate()
        .map(|(fi, _)| {
            if Some(fi) == dots_at {
                return Matched::Dots(gathered.take().unwrap_or_default());
            }
            match bound[fi].and_then(|ai| actuals[ai].value) {
                Some(value) => Matched::Supplied(value),
                None => Matched::Missing,
            }
        })
        .collect())
}

impl Interpreter {
    /// Matching with errors rendered against `call`.
    pub fn match_call_args(
        &self,
        call: &Expr,
        formals: &[Formal],
        actuals: &[Arg],
    ) -> Result<Vec<Matched>, RuntimeError> {
        match_args(formals, actuals, self.syms.dots, &self.symbols).map_err(
            |err| match err {
                MatchError::Unused(indices) => RuntimeError::UnusedArguments {
                    count: indices.len(),
                    args: indices
                        .iter()
                        .map(|&ai| self.describe_arg(&actuals[ai]))
                        .collect::<Vec<_>>()
                        .join(", "),
                    call: call.display(&self.symbols).to_string(),
                },
                MatchError::MultipleMatch(formal) => RuntimeError::MultipleMatch {
                    formal: self.symbols.name(formal).to_string(),
                },
                MatchError::Ambiguous(ai) => RuntimeError::AmbiguousArgument {
                    position: ai + 1,
                },
            },
        )
    }

    fn describe_arg(&self, arg: &Arg) -> String {
        let value = match arg.value.map(|value| self.object(value)) {
            Some(Object::Promise(promise)) => {
                promise.expr().display(&self.symbols).to_string()
            }
            Some(Object::Null) => "NULL".to_owned(),
            Some(Object::Integer(v)) if v.len() == 1 => format!("{}L", v[0]),
            Some(Object::Double(v)) if v.len() == 1 => v[0].to_string(),
            Some(Object::Logical(v)) if v.len() == 1 => {
                if v[0] { "TRUE" } else { "FALSE" }.to_owned()
            }
            Some(Object::Character(v)) if v.len() == 1 => format!("{:?}", v[0]),
            Some(other) => format!("<{}>", other.type_name()),
            None => String::new(),
        };
        match arg.tag {
            Some(tag) => format!("{} = {value}", self.symbols.name(tag)),
            None => value,
        }
    }

    /// Wraps the raw actuals of a call for a closure. `...` is spliced from
    /// `env`, literals are bound directly and everything else becomes a
    /// promise on `env`. Every created object is protected.
    pub fn promise_args(
        &mut self,
        args: &[ExprArg],
        env: ObjectRef,
    ) -> Result<ArgList, RuntimeError> {
        let mut list = ArgList::new();
        for arg in args {
            match &*arg.value {
                Expr::Symbol(sym) if *sym == self.syms.dots => {
                    list.0.extend(self.dots_args(env)?);
                }
                Expr::Missing => list.push(Arg {
                    tag: arg.tag,
                    value: None,
                }),
                Expr::Literal(lit) => {
                    let value = self.alloc_literal(lit);
                    self.protect(value);
                    list.push(Arg {
                        tag: arg.tag,
                        value: Some(value),
                    });
                }
                _ => {
                    let value = self.alloc_promise(arg.value.clone(), env);
                    self.protect(value);
                    list.push(Arg {
                        tag: arg.tag,
                        value: Some(value),
                    });
                }
            }
        }
        Ok(list)
    }

    /// Evaluates the actuals of a call for an eager builtin, forcing the
    /// elements of a spliced `...`. Every value is protected.
    pub fn eval_args(
        &mut self,
        args: &[ExprArg],
        env: ObjectRef,
    ) -> Result<ArgList, RuntimeError> {
        let mut list = ArgList::new();
        for arg in args {
            match &*arg.value {
                Expr::Symbol(sym) if *sym == self.syms.dots => {
                    for dot in self.dots_args(env)? {
                        let value = match dot.value {
                            Some(value) => Some(self.force_value(value)?),
                            None => None,
                        };
                        if let Some(value) = value {
                            self.protect(value);
                        }
                        list.push(Arg {
                            tag: dot.tag,
                            value,
                        });
                    }
                }
                Expr::Missing => list.push(Arg {
                    tag: arg.tag,
                    value: None,
                }),
                _ => {
                    let value = self.eval(&arg.value, env)?;
                    self.protect(value);
                    list.push(Arg {
                        tag: arg.tag,
                        value: Some(value),
                    });
                }
            }
        }
        Ok(list)
    }

    /// The arguments bound to `...` visible from `env`.
    pub fn dots_args(&self, env: ObjectRef) -> Result<Vec<Arg>, RuntimeError> {
        let binding = self.find_var(self.syms.dots, env);
        match (binding.origin, binding.value) {
            (BindingOrigin::Unbound, _) => Err(RuntimeError::InvalidArgument(
                "'...' used in an incorrect context".into(),
            )),
            (BindingOrigin::Missing, _) => Ok(Vec::new()),
            (_, Some(value)) => match self.object(value) {
                Object::Dots(args) => Ok(args.clone()),
                _ => Ok(Vec::new()),
            },
            (_, None) => Ok(Vec::new()),
        }
    }

    /// Pre-forced promises over already evaluated `args`, for handing
    /// builtin arguments to a closure method.
    pub(crate) fn forced_promise_args(
        &mut self,
        call: &Expr,
        args: &ArgList,
    ) -> ArgList {
        let exprs = call.call_args();
        let aligned = exprs.len() == args.len();
        let mut list = ArgList::new();
        for (idx, arg) in args.iter().enumerate() {
            let Some(value) = arg.value else {
                list.push(*arg);
                continue;
            };
            let expr = if aligned {
                exprs[idx].value.clone()
            } else {
                Rc::new(Expr::Literal(Literal::Null))
            };
            let promise = self.alloc_object(Object::Promise(
                crate::Promise::forced(expr, value),
            ));
            self.protect(promise);
            list.push(Arg {
                tag: arg.tag,
                value: Some(promise),
            });
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SizeClass;

    fn r(index: u32) -> ObjectRef {
        ObjectRef::from_parts(SizeClass(0), index, 0)
    }

    fn formals(table: &SymbolTable, names: &[&str]) -> Vec<Formal> {
        names.iter().map(|name| Formal::new(table.intern(name))).collect()
    }

    #[test]
    fn named_match_takes_priority_over_position() {
        let table = SymbolTable::new();
        let dots = table.intern("...");
        let b = table.intern("b");
        let formals = formals(&table, &["a", "b", "..."]);
        let actuals = [Arg::named(b, r(3)), Arg::new(r(1)), Arg::new(r(2))];

        let matched = match_args(&formals, &actuals, dots, &table)
            .expect("arguments match");
        assert_eq!(
            matched,
            vec![
                Matched::Supplied(r(1)),
                Matched::Supplied(r(3)),
                Matched::Dots(vec![Arg::new(r(2))]),
            ]
        );
    }

    #[test]
    fn partial_names_match_formals_before_dots_only() {
        let table = SymbolTable::new();
        let dots = table.intern("...");
        let val = table.intern("val");
        let na = table.intern("na");
        let formals = formals(&table, &["value", "...", "na.rm"]);
        let actuals = [Arg::named(val, r(1)), Arg::named(na, r(2))];

        let matched = match_args(&formals, &actuals, dots, &table)
            .expect("arguments match");
        assert_eq!(matched[0], Matched::Supplied(r(1)));
        assert_eq!(matched[1], Matched::Dots(vec![Arg::named(na, r(2))]));
        assert_eq!(matched[2], Matched::Missing);
    }

    #[test]
    fn ambiguous_prefix_is_rejected() {
        let table = SymbolTable::new();
        let dots = table.intern("...");
        let x = table.intern("x");
        let formals = formals(&table, &["xmin", "xmax"]);
        let actuals = [Arg::named(x, r(1))];
        assert_eq!(
            match_args(&formals, &actuals, dots, &table),
            Err(MatchError::Ambiguous(0))
        );
    }

    #[test]
    fn positional_fill_stops_at_dots() {
        let table = SymbolTable::new();
        let dots = table.intern("...");
        let formals = formals(&table, &["x", "...", "y"]);
        let actuals = [Arg::new(r(1)), Arg::new(r(2)), Arg::new(r(3))];
        let matched = match_args(&formals, &actuals, dots, &table)
            .expect("arguments match");
        assert_eq!(matched[0], Matched::Supplied(r(1)));
        assert_eq!(
            matched[1],
            Matched::Dots(vec![Arg::new(r(2)), Arg::new(r(3))])
        );
        assert_eq!(matched[2], Matched::Missing);
    }

    #[test]
    fn leftover_actuals_without_dots_are_unused() {
        let table = SymbolTable::new();
        let dots = table.intern("...");
        let z = table.intern("z");
        let formals = formals(&table, &["x"]);
        let actuals = [Arg::new(r(1)), Arg::new(r(2)), Arg::named(z, r(3))];
        assert_eq!(
            match_args(&formals, &actuals, dots, &table),
            Err(MatchError::Unused(vec![1, 2]))
        );
    }

    #[test]
    fn duplicate_names_are_multiple_matches() {
        let table = SymbolTable::new();
        let dots = table.intern("...");
        let x = table.intern("x");
        let formals = formals(&table, &["x"]);
        let actuals = [Arg::named(x, r(1)), Arg::named(x, r(2))];
        assert_eq!(
            match_args(&formals, &actuals, dots, &table),
            Err(MatchError::MultipleMatch(x))
        );
    }

    #[test]
    fn empty_argument_leaves_formal_missing() {
        let table = SymbolTable::new();
        let dots = table.intern("...");
        let formals = formals(&table, &["x", "y"]);
        let actuals = [
            Arg {
                tag: None,
                value: None,
            },
            Arg::new(r(2)),
        ];
        let matched = match_args(&formals, &actuals, dots, &table)
            .expect("arguments match");
        assert_eq!(matched, vec![Matched::Missing, Matched::Supplied(r(2))]);
    }

    #[test]
    fn merge_overrides_named_and_appends_rest() {
        let table = SymbolTable::new();
        let x = table.intern("x");
        let y = table.intern("y");
        let mut list = ArgList::from(vec![Arg::new(r(1)), Arg::named(x, r(2))]);
        list.merge(ArgList::from(vec![
            Arg::named(x, r(3)),
            Arg::named(y, r(4)),
            Arg::new(r(5)),
        ]));
        assert_eq!(
            list.0,
            vec![
                Arg::new(r(1)),
                Arg::named(x, r(3)),
                Arg::named(y, r(4)),
                Arg::new(r(5)),
            ]
        );
    }
}
