use crate::{
    expression::{Expr, Variable},
    types::TypeInfo,
};

/// Types an expression requires to be evaluated
///
/// These are the parameter types of a root lambda and the types of all free
/// variables, in first encountered order and without duplicates.
pub fn extract(expr: &Expr) -> Vec<TypeInfo> {
    let mut types = Vec::new();
    for input in inputs(expr) {
        if !types.contains(&input.ty) {
            types.push(input.ty);
        }
    }
    types
}

/// Variables an expression requires to be evaluated
///
/// Like [`extract`], but keeps variables of the same type apart.
pub fn inputs(expr: &Expr) -> Vec<Variable> {
    let mut inputs = match expr {
        Expr::Lambda { params, .. } => {
            let mut unique: Vec<Variable> = Vec::with_capacity(params.len());
            for param in params {
                if !unique.contains(param) {
                    unique.push(param.clone());
                }
            }
            unique
        }
        _ => Vec::new(),
    };

    for free in expr.free_variables() {
        if !inputs.contains(&free) {
            inputs.push(free);
        }
    }
    inputs
}
