use crate::ObjectRef;

pub type EvalResult = Result<ObjectRef, RuntimeError>;

fn plural(count: &usize) -> &'static str {
    if *count == 1 { "" } else { "s" }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error(
        "no applicable method for '{generic}' applied to an object of class {class}"
    )]
    NoApplicableMethod { generic: String, class: String },

    #[error("UseMethod called from outside a function")]
    OutsideFunction,

    #[error("'UseMethod' used in an inappropriate fashion")]
    InappropriateUse,

    #[error("NextMethod called from outside a method dispatch")]
    OutsideMethodDispatch,

    #[error("no method to invoke")]
    NoMethodToInvoke,

    #[error("no more methods for '{generic}'")]
    NoMoreMethods { generic: String },

    #[error("no calling generic was found: was a method called directly?")]
    NoCallingGeneric,

    #[error("generic function not specified")]
    GenericNotSpecified,

    #[error("object not specified")]
    ObjectNotSpecified,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("unused argument{} ({args}) in {call}", plural(.count))]
    UnusedArguments {
        count: usize,
        args: String,
        call: String,
    },

    #[error("formal argument \"{formal}\" matched by multiple actual arguments")]
    MultipleMatch { formal: String },

    #[error("argument {position} matches multiple formal arguments")]
    AmbiguousArgument { position: usize },

    #[error("argument \"{name}\" is missing, with no default")]
    MissingArgument { name: String },

    #[error("object '{name}' not found")]
    UnboundVariable { name: String },

    #[error("could not find function \"{name}\"")]
    FunctionNotFound { name: String },

    #[error("attempt to apply non-function")]
    NotAFunction,

    #[error(
        "promise already under evaluation: recursive default argument reference or earlier problems?"
    )]
    RecursivePromise,

    #[error("{0}")]
    Type(String),

    /// Raised by `stop()`.
    #[error("{0}")]
    User(String),

    /// Early return, caught by the closure whose environment is `env`.
    #[error("no function to return from, jumping to top level")]
    Return { value: ObjectRef, env: ObjectRef },

    #[error("unable to find a non-generic version of function \"{name}\"")]
    NoNonGeneric { name: String },

    #[error(
        "call to standardGeneric(\"{name}\") apparently not from the body of that generic function"
    )]
    NotFromGeneric { name: String },

    #[error("primitive function \"{name}\" has been set for methods but no generic function supplied")]
    MethodsUnavailable { name: String },

    #[error("evaluation nested too deeply: infinite recursion?")]
    TooDeep,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid arena settings: {0}")]
    Arena(&'static str),
    #[error("max_depth must be > 0")]
    MaxDepth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unused_argument_message_is_pluralised() {
        let one = RuntimeError::UnusedArguments {
            count: 1,
            args: "3".into(),
            call: "f(1, 3)".into(),
        };
        assert_eq!(one.to_string(), "unused argument (3) in f(1, 3)");
        let two = RuntimeError::UnusedArguments {
            count: 2,
            args: "3, 4".into(),
            call: "f(1, 3, 4)".into(),
        };
        assert_eq!(two.to_string(), "unused arguments (3, 4) in f(1, 3, 4)");
    }

    #[test]
    fn dispatch_failure_names_generic_and_class() {
        let err = RuntimeError::NoApplicableMethod {
            generic: "render".into(),
            class: "'widget'".into(),
        };
        assert_eq!(
            err.to_string(),
            "no applicable method for 'render' applied to an object of class 'widget'"
        );
    }
}
