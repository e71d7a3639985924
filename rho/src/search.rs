//! Method resolution over a class vector.
//!
//! The search itself only needs a way to resolve a method name, so it is
//! a function over `(lookup, class vector, position)`. Resuming from a
//! later position is how the next method is found.

use crate::{ObjectRef, RuntimeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchState {
    #[default]
    NotDispatching,
    AwaitingMethod,
    NoMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodMatch {
    /// Class index the method was found at; the class vector length for
    /// the default method.
    pub index: usize,
    pub name: String,
    pub method: ObjectRef,
    pub group_match: bool,
    pub is_default: bool,
}

/// Resolves a method name to a function, if one is visible.
pub trait MethodLookup {
    fn lookup(&mut self, name: &str) -> Result<Option<ObjectRef>, RuntimeError>;
}

/// State of one dispatch: what is searched for and what was found.
#[derive(Debug, Clone)]
pub struct MethodSearch {
    pub generic: String,
    pub group: Option<String>,
    pub classes: Vec<String>,
    pub index: usize,
    pub found: Option<MethodMatch>,
    pub state: DispatchState,
}

#[inline]
pub fn method_name(prefix: &str, class: &str) -> String {
    format!("{prefix}.{class}")
}

impl MethodSearch {
    pub fn new(generic: &str, group: Option<&str>, classes: Vec<String>) -> Self {
        Self {
            generic: generic.to_owned(),
            group: group.filter(|g| !g.is_empty()).map(str::to_owned),
            classes,
            index: 0,
            found: None,
            state: DispatchState::NotDispatching,
        }
    }

    /// Searches from class index `from`. At each index the generic's
    /// method is tried before the group's, so a group method for a more
    /// specific class outranks a generic method for a less specific one.
    pub fn run(
        &mut self,
        lookup: &mut impl MethodLookup,
        from: usize,
        allow_default: bool,
    ) -> Result<Option<&MethodMatch>, RuntimeError> {
        self.state = DispatchState::AwaitingMethod;
        self.found = None;

        for idx in from..self.classes.len() {
            self.index = idx;
            let class = &self.classes[idx];
            let name = method_name(&self.generic, class);
            if let Some(method) = lookup.lookup(&name)? {
                return Ok(self.select(idx, name, method, false, false));
            }
            if let Some(group) = &self.group {
                let name = method_name(group, class);
                if let Some(method) = lookup.lookup(&name)? {
                    return Ok(self.select(idx, name, method, true, false));
                }
            }
        }

        self.index = self.classes.len();
        if allow_default {
            let name = method_name(&self.generic, "default");
            if let Some(method) = lookup.lookup(&name)? {
                let idx = self.classes.len();
                return Ok(self.select(idx, name, method, false, true));
            }
        }

        self.state = DispatchState::NoMethod;
        Ok(None)
    }

    fn select(
        &mut self,
        index: usize,
        name: String,
        method: ObjectRef,
        group_match: bool,
        is_default: bool,
    ) -> Option<&MethodMatch> {
        self.found = Some(MethodMatch {
            index,
            name,
            method,
            group_match,
            is_default,
        });
        self.found.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::SizeClass;

    struct Registry(HashMap<&'static str, ObjectRef>);

    impl MethodLookup for Registry {
        fn lookup(
            &mut self,
            name: &str,
        ) -> Result<Option<ObjectRef>, RuntimeError> {
            Ok(self.0.get(name).copied())
        }
    }

    fn r(index: u32) -> ObjectRef {
        ObjectRef::from_parts(SizeClass(0), index, 0)
    }

    fn classes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn finds_method_for_later_class() {
        let mut registry = Registry(HashMap::from([("speak.B", r(1))]));
        let mut search = MethodSearch::new("speak", None, classes(&["A", "B"]));
        let found = search
            .run(&mut registry, 0, true)
            .expect("lookup succeeds")
            .cloned()
            .expect("method exists");
        assert_eq!(found.name, "speak.B");
        assert_eq!(found.index, 1);
        assert!(!found.group_match);
        assert_eq!(search.index, 1);
        assert_eq!(search.state, DispatchState::AwaitingMethod);
    }

    #[test]
    fn group_at_earlier_class_beats_generic_at_later_class() {
        let mut registry = Registry(HashMap::from([
            ("ops.A", r(1)),
            ("speak.B", r(2)),
            ("ops.B", r(3)),
        ]));
        let mut search =
            MethodSearch::new("speak", Some("ops"), classes(&["A", "B"]));
        let found = search
            .run(&mut registry, 0, true)
            .expect("lookup succeeds")
            .cloned()
            .expect("method exists");
        assert_eq!(found.name, "ops.A");
        assert_eq!(found.index, 0);
        assert!(found.group_match);
    }

    #[test]
    fn generic_beats_group_at_the_same_index() {
        let mut registry =
            Registry(HashMap::from([("ops.A", r(1)), ("speak.A", r(2))]));
        let mut search =
            MethodSearch::new("speak", Some("ops"), classes(&["A"]));
        let found = search
            .run(&mut registry, 0, false)
            .expect("lookup succeeds")
            .cloned()
            .expect("method exists");
        assert_eq!(found.method, r(2));
        assert!(!found.group_match);
    }

    #[test]
    fn resuming_past_the_end_falls_back_to_default() {
        let mut registry = Registry(HashMap::from([
            ("speak.B", r(1)),
            ("speak.default", r(2)),
        ]));
        let mut search = MethodSearch::new("speak", None, classes(&["A", "B"]));
        let found = search
            .run(&mut registry, 2, true)
            .expect("lookup succeeds")
            .cloned()
            .expect("default exists");
        assert!(found.is_default);
        assert_eq!(found.index, 2);
        assert_eq!(search.index, 2);
    }

    #[test]
    fn absence_is_not_an_error() {
        let mut registry = Registry(HashMap::new());
        let mut search = MethodSearch::new("render", None, classes(&["widget"]));
        assert!(search.run(&mut registry, 0, true).expect("lookup succeeds").is_none());
        assert_eq!(search.state, DispatchState::NoMethod);

        let mut registry = Registry(HashMap::from([("render.default", r(1))]));
        assert!(
            search
                .run(&mut registry, 0, false)
                .expect("lookup succeeds")
                .is_none()
        );
    }
}
