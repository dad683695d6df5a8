use std::sync::Arc;

use thiserror::Error;

use crate::{
    binding::BindingMetadata,
    expression::{TypeError, Variable},
    types::{DynError, TypeInfo},
};

/// Errors while registering bindings
#[derive(Error, Debug, Clone)]
pub enum BindingError {
    #[error("A Type has been registered twice: '{target}' (first registered at {first})")]
    Duplicate {
        target: TypeInfo,
        first: BindingMetadata,
    },
}

/// A single problem found while building or resolving the dependency graph
#[derive(Error, Debug, Clone)]
pub enum ResolutionError {
    #[error("'{required_by}' needs '{dependency}' but it is missing")]
    MissingDependency {
        dependency: TypeInfo,
        required_by: TypeInfo,
    },
    #[error("A Circular Dependency exists between {}{}", display_types(.types), display_blocked(.blocked))]
    CyclicDependency {
        types: Vec<TypeInfo>,
        /// Types depending on the cycle, which can not be built either
        blocked: Vec<TypeInfo>,
    },
    #[error("Decorator {order} of '{decorated}' is invalid: {reason}")]
    DecoratorShapeMismatch {
        decorated: TypeInfo,
        order: usize,
        reason: String,
    },
    #[error("The expression of '{target}' contains an unsupported {shape}")]
    UnsupportedExpressionShape {
        target: TypeInfo,
        shape: &'static str,
    },
    #[error("Type mismatch in the expression of '{target}': {error}")]
    TypeMismatch { target: TypeInfo, error: TypeError },
    #[error("Factory for '{product}' failed - error: {error}")]
    FactoryFailed {
        product: TypeInfo,
        error: InvokeError,
    },
}

fn display_types(types: &[TypeInfo]) -> String {
    types
        .iter()
        .map(|ty| format!("'{ty}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_blocked(blocked: &[TypeInfo]) -> String {
    match blocked.is_empty() {
        true => String::new(),
        false => format!(", blocking {}", display_types(blocked)),
    }
}

impl std::fmt::Display for DependencyGraphErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("The dependency graph had one or more errors:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}

/// Every problem found during one build
#[derive(Error, Debug, Clone)]
pub struct DependencyGraphErrors {
    pub errors: Vec<ResolutionError>,
}

/// Combines all collected errors into one failure
///
/// Returns `None` if nothing went wrong.
pub fn aggregate(errors: Vec<ResolutionError>) -> Option<DependencyGraphErrors> {
    if errors.is_empty() {
        return None;
    }

    Some(DependencyGraphErrors { errors })
}

/// Errors while evaluating an expression
#[derive(Error, Debug, Clone)]
pub enum InvokeError {
    /// A variable was read before it was bound
    #[error("The variable '{0}' is not bound")]
    Unbound(Variable),
    #[error("'{factory}' failed - error: {error}")]
    FactoryFailed {
        factory: String,
        error: Arc<DynError>,
    },
    #[error("'{factory}' should produce '{expected}' but produced '{actual}'")]
    WrongOutput {
        factory: String,
        expected: TypeInfo,
        actual: TypeInfo,
    },
    #[error("Can not evaluate a {0}")]
    UnsupportedShape(&'static str),
}

/// Errors when trying to require a certain type
#[derive(Error, Debug, Clone)]
pub enum RequireError {
    /// The required type is not known
    #[error("The required type is not known: '{0}'")]
    TypeMissing(&'static str),
    /// Invoking the plan failed
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn aggregate_nothing_is_none() {
        assert!(aggregate(vec![]).is_none());
    }

    #[test]
    fn aggregate_lists_every_cause() {
        let errors = aggregate(vec![
            ResolutionError::MissingDependency {
                dependency: TypeInfo::of::<B>(),
                required_by: TypeInfo::of::<A>(),
            },
            ResolutionError::CyclicDependency {
                types: vec![TypeInfo::of::<A>(), TypeInfo::of::<B>()],
                blocked: vec![],
            },
        ])
        .unwrap();

        let message = errors.to_string();
        let lines: Vec<_> = message.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "The dependency graph had one or more errors:");
        assert!(lines[1].starts_with("- "));
        assert!(lines[1].contains("needs"));
        assert!(lines[2].contains(TypeInfo::of::<A>().type_name));
        assert!(lines[2].contains(TypeInfo::of::<B>().type_name));
    }
}
