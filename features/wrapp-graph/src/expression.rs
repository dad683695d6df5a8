//! Construction expressions
//!
//! An [`Expr`] describes how to produce a value without producing it. Keeping
//! construction recipes as data lets the graph rewrite them (decorator
//! splicing, dependency substitution) before anything is evaluated.
//!
//! Evaluation is done by a small tree walking interpreter, see [`Expr::evaluate`].

use std::{borrow::Cow, collections::HashMap, fmt::Display, sync::Arc};

use crate::{
    errors::InvokeError,
    factories::Factory,
    types::{Injectable, Instance, TypeInfo},
};

/// A named, typed slot inside an expression
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Variable {
    pub name: Cow<'static, str>,
    pub ty: TypeInfo,
}
impl Variable {
    pub fn new(name: impl Into<Cow<'static, str>>, ty: TypeInfo) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn of<T: 'static>(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, TypeInfo::of::<T>())
    }

    /// Reference to this variable
    pub fn expr(&self) -> Expr {
        Expr::Variable(self.clone())
    }
}
impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    /// An already produced value
    Constant(Instance),
    /// Reference to a variable bound by a block, a lambda or the graph
    Variable(Variable),
    /// Invocation of a factory with one argument per factory parameter
    Invoke { factory: Factory, args: Vec<Expr> },
    /// Sequence of statements with block scoped variables
    ///
    /// Evaluates to the value of its last statement, or `()` if empty.
    Block { locals: Vec<Variable>, body: Vec<Expr> },
    /// Binds a value to a variable, evaluates to the value
    Assign { target: Variable, value: Box<Expr> },
    /// Parameterised expression
    ///
    /// Only valid as the root of a binding or decorator, where the parameters
    /// declare the dependencies of the expression.
    Lambda { params: Vec<Variable>, body: Box<Expr> },
}

impl Expr {
    pub fn constant<T: Injectable>(value: T) -> Self {
        Expr::Constant(Instance::new(value))
    }

    pub fn invoke(factory: Factory, args: Vec<Expr>) -> Self {
        Expr::Invoke { factory, args }
    }

    pub fn block(locals: Vec<Variable>, body: Vec<Expr>) -> Self {
        Expr::Block { locals, body }
    }

    pub fn assign(target: Variable, value: Expr) -> Self {
        Expr::Assign {
            target,
            value: Box::new(value),
        }
    }

    pub fn lambda(params: Vec<Variable>, body: Expr) -> Self {
        Expr::Lambda {
            params,
            body: Box::new(body),
        }
    }

    /// A lambda invoking `factory` with one parameter per factory parameter
    ///
    /// This is the common shape of a constructor binding: every argument is a
    /// dependency resolved by the graph.
    pub fn construct(factory: Factory) -> Self {
        let params: Vec<Variable> = factory
            .params()
            .iter()
            .enumerate()
            .map(|(index, ty)| Variable::new(format!("arg{index}"), *ty))
            .collect();
        let args = params.iter().map(Variable::expr).collect();

        if params.is_empty() {
            Expr::invoke(factory, args)
        } else {
            Expr::lambda(params, Expr::invoke(factory, args))
        }
    }

    /// Static type of the value this expression produces
    pub fn ty(&self) -> TypeInfo {
        match self {
            Expr::Constant(instance) => instance.info,
            Expr::Variable(variable) => variable.ty,
            Expr::Invoke { factory, .. } => factory.output(),
            Expr::Block { body, .. } => body.last().map(Expr::ty).unwrap_or(TypeInfo::void()),
            Expr::Assign { value, .. } => value.ty(),
            Expr::Lambda { body, .. } => body.ty(),
        }
    }

    /// Returns true if this expression or one of its children is a lambda
    /// that is not the root
    pub fn has_nested_lambda(&self) -> bool {
        let root_body = match self {
            Expr::Lambda { body, .. } => body.as_ref(),
            other => other,
        };

        let mut found = false;
        root_body.walk(&mut |expr| {
            if matches!(expr, Expr::Lambda { .. }) {
                found = true;
            }
        });
        found
    }

    /// Visits this expression and all its children, parents first
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Constant(_) | Expr::Variable(_) => {}
            Expr::Invoke { args, .. } => args.iter().for_each(|arg| arg.walk(visit)),
            Expr::Block { body, .. } => body.iter().for_each(|stmt| stmt.walk(visit)),
            Expr::Assign { value, .. } => value.walk(visit),
            Expr::Lambda { body, .. } => body.walk(visit),
        }
    }

    /// Replaces every free reference to `variable` with `replacement`
    ///
    /// References shadowed by a block local or lambda parameter of the same
    /// name and type are left alone.
    pub fn substitute(&self, variable: &Variable, replacement: &Expr) -> Expr {
        match self {
            Expr::Constant(_) => self.clone(),
            Expr::Variable(v) if v == variable => replacement.clone(),
            Expr::Variable(_) => self.clone(),
            Expr::Invoke { factory, args } => Expr::Invoke {
                factory: factory.clone(),
                args: args
                    .iter()
                    .map(|arg| arg.substitute(variable, replacement))
                    .collect(),
            },
            Expr::Block { locals, .. } if locals.contains(variable) => self.clone(),
            Expr::Block { locals, body } => Expr::Block {
                locals: locals.clone(),
                body: body
                    .iter()
                    .map(|stmt| stmt.substitute(variable, replacement))
                    .collect(),
            },
            Expr::Assign { target, value } => {
                // Assigning to a substituted variable would lose the binding
                let target = match replacement {
                    Expr::Variable(renamed) if target == variable => renamed.clone(),
                    _ => target.clone(),
                };
                Expr::assign(target, value.substitute(variable, replacement))
            }
            Expr::Lambda { params, .. } if params.contains(variable) => self.clone(),
            Expr::Lambda { params, body } => {
                Expr::lambda(params.clone(), body.substitute(variable, replacement))
            }
        }
    }

    /// Free variables in first encountered order, without duplicates
    pub fn free_variables(&self) -> Vec<Variable> {
        let mut free = Vec::new();
        collect_free(self, &mut Vec::new(), &mut free);
        free
    }

    /// Evaluates the expression in an empty scope
    pub fn evaluate(&self) -> Result<Instance, InvokeError> {
        self.evaluate_in(&mut Scope::default())
    }

    /// Evaluates the expression, reading and binding variables in `scope`
    pub fn evaluate_in(&self, scope: &mut Scope) -> Result<Instance, InvokeError> {
        match self {
            Expr::Constant(instance) => Ok(instance.clone()),
            Expr::Variable(variable) => scope
                .get(variable)
                .cloned()
                .ok_or_else(|| InvokeError::Unbound(variable.clone())),
            Expr::Invoke { factory, args } => {
                let args = args
                    .iter()
                    .map(|arg| arg.evaluate_in(scope))
                    .collect::<Result<Vec<_>, _>>()?;

                let instance = factory
                    .call(&args)
                    .map_err(|error| InvokeError::FactoryFailed {
                        factory: factory.name().to_string(),
                        error: Arc::new(error),
                    })?;

                if instance.info != factory.output() {
                    return Err(InvokeError::WrongOutput {
                        factory: factory.name().to_string(),
                        expected: factory.output(),
                        actual: instance.info,
                    });
                }
                Ok(instance)
            }
            Expr::Block { locals, body } => {
                let shadowed: Vec<_> = locals
                    .iter()
                    .map(|local| (local, scope.values.remove(local)))
                    .collect();

                let mut result = Ok(Instance::unit());
                for stmt in body {
                    result = stmt.evaluate_in(scope);
                    if result.is_err() {
                        break;
                    }
                }

                for (local, previous) in shadowed {
                    match previous {
                        Some(previous) => scope.values.insert(local.clone(), previous),
                        None => scope.values.remove(local),
                    };
                }
                result
            }
            Expr::Assign { target, value } => {
                let value = value.evaluate_in(scope)?;
                scope.values.insert(target.clone(), value.clone());
                Ok(value)
            }
            Expr::Lambda { .. } => Err(InvokeError::UnsupportedShape("lambda")),
        }
    }
}

fn collect_free(expr: &Expr, bound: &mut Vec<Variable>, free: &mut Vec<Variable>) {
    match expr {
        Expr::Constant(_) => {}
        Expr::Variable(variable) => reference(variable, bound, free),
        Expr::Invoke { args, .. } => {
            for arg in args {
                collect_free(arg, bound, free);
            }
        }
        Expr::Block { locals, body } => {
            let depth = bound.len();
            bound.extend(locals.iter().cloned());
            for stmt in body {
                collect_free(stmt, bound, free);
            }
            bound.truncate(depth);
        }
        Expr::Assign { target, value } => {
            collect_free(value, bound, free);
            reference(target, bound, free);
        }
        Expr::Lambda { params, body } => {
            let depth = bound.len();
            bound.extend(params.iter().cloned());
            collect_free(body, bound, free);
            bound.truncate(depth);
        }
    }

    fn reference(variable: &Variable, bound: &[Variable], free: &mut Vec<Variable>) {
        if !bound.contains(variable) && !free.contains(variable) {
            free.push(variable.clone());
        }
    }
}

/// Variable bindings used during evaluation
#[derive(Debug, Default, Clone)]
pub struct Scope {
    values: HashMap<Variable, Instance>,
}
impl Scope {
    pub fn get(&self, variable: &Variable) -> Option<&Instance> {
        self.values.get(variable)
    }
}

/// A static type error inside an expression
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("'{factory}' takes {expected} arguments but got {actual}")]
    Arity {
        factory: String,
        expected: usize,
        actual: usize,
    },
    #[error("{location} expects '{expected}' but got '{actual}'")]
    Mismatch {
        location: String,
        expected: TypeInfo,
        actual: TypeInfo,
    },
}

/// Checks factory arguments and assignments against their declared types
pub fn type_errors(expr: &Expr) -> Vec<TypeError> {
    let mut errors = Vec::new();
    expr.walk(&mut |expr| match expr {
        Expr::Invoke { factory, args } if factory.params().len() != args.len() => {
            errors.push(TypeError::Arity {
                factory: factory.name().to_string(),
                expected: factory.params().len(),
                actual: args.len(),
            });
        }
        Expr::Invoke { factory, args } => {
            for (index, (param, arg)) in factory.params().iter().zip(args).enumerate() {
                if *param != arg.ty() {
                    errors.push(TypeError::Mismatch {
                        location: format!("argument {index} of '{}'", factory.name()),
                        expected: *param,
                        actual: arg.ty(),
                    });
                }
            }
        }
        Expr::Assign { target, value } if target.ty != value.ty() => {
            errors.push(TypeError::Mismatch {
                location: format!("assignment to '{}'", target.name),
                expected: target.ty,
                actual: value.ty(),
            });
        }
        _ => {}
    });
    errors
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Constant(instance) => write!(f, "<{}>", instance.info),
            Expr::Variable(variable) => f.write_str(&variable.name),
            Expr::Invoke { factory, args } => {
                write!(f, "{}(", factory.name())?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expr::Block { locals, body } => {
                f.write_str("{ ")?;
                for local in locals {
                    write!(f, "let {local}; ")?;
                }
                for (index, stmt) in body.iter().enumerate() {
                    if index > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{stmt}")?;
                }
                f.write_str(" }")
            }
            Expr::Assign { target, value } => write!(f, "{} = {value}", target.name),
            Expr::Lambda { params, body } => {
                f.write_str("|")?;
                for (index, param) in params.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, "| {body}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Engine(u32);
    #[derive(Debug)]
    struct Car(Arc<Engine>);

    #[test]
    fn block_value_is_last_statement() {
        let engine = Variable::of::<Engine>("engine");
        let expr = Expr::block(
            vec![engine.clone()],
            vec![
                Expr::assign(engine.clone(), Expr::constant(Engine(4))),
                Expr::invoke(Factory::of(Car), vec![engine.expr()]),
            ],
        );

        assert_eq!(expr.ty(), TypeInfo::of::<Car>());
        let car = expr.evaluate().unwrap().downcast::<Car>().unwrap();
        assert_eq!(*car.0, Engine(4));
    }

    #[test]
    fn empty_block_is_void() {
        let expr = Expr::block(vec![], vec![]);

        assert!(expr.ty().is_void());
        assert!(expr.evaluate().unwrap().info.is_void());
    }

    #[test]
    fn block_locals_do_not_leak() {
        let engine = Variable::of::<Engine>("engine");
        let mut scope = Scope::default();
        let expr = Expr::block(
            vec![engine.clone()],
            vec![Expr::assign(engine.clone(), Expr::constant(Engine(1)))],
        );

        expr.evaluate_in(&mut scope).unwrap();
        assert!(scope.get(&engine).is_none());
    }

    #[test]
    fn unbound_variable_is_an_error() {
        let engine = Variable::of::<Engine>("engine");

        assert!(matches!(
            engine.expr().evaluate(),
            Err(InvokeError::Unbound(v)) if v == engine
        ));
    }

    #[test]
    fn invoke_evaluates_every_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let expr = Expr::invoke(
            Factory::of(move || Engine(counter.fetch_add(1, Ordering::SeqCst) as u32)),
            vec![],
        );

        let first = expr.evaluate().unwrap();
        let second = expr.evaluate().unwrap();

        assert!(!first.ptr_eq(&second));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn free_variables_skip_bound_ones() {
        let engine = Variable::of::<Engine>("engine");
        let wheel = Variable::of::<u8>("wheel");
        let expr = Expr::block(
            vec![engine.clone()],
            vec![
                Expr::assign(engine.clone(), Expr::constant(Engine(1))),
                wheel.expr(),
                engine.expr(),
                wheel.expr(),
            ],
        );

        assert_eq!(expr.free_variables(), vec![wheel]);
    }

    #[test]
    fn substitute_respects_shadowing() {
        let engine = Variable::of::<Engine>("engine");
        let shadowing = Expr::block(vec![engine.clone()], vec![engine.expr()]);
        let free = Expr::block(vec![], vec![engine.expr()]);
        let replacement = Expr::constant(Engine(8));

        assert!(matches!(
            &shadowing.substitute(&engine, &replacement),
            Expr::Block { body, .. } if matches!(body[0], Expr::Variable(_))
        ));
        assert!(matches!(
            &free.substitute(&engine, &replacement),
            Expr::Block { body, .. } if matches!(body[0], Expr::Constant(_))
        ));
    }

    #[test]
    fn construct_declares_one_param_per_argument() {
        let expr = Expr::construct(Factory::of(Car));

        match &expr {
            Expr::Lambda { params, body } => {
                assert_eq!(params.len(), 1);
                assert_eq!(params[0].ty, TypeInfo::of::<Engine>());
                assert_eq!(body.ty(), TypeInfo::of::<Car>());
            }
            other => panic!("expected a lambda, got {other}"),
        }
        assert!(matches!(
            Expr::construct(Factory::of(|| Engine(1))),
            Expr::Invoke { .. }
        ));
    }

    #[test]
    fn type_errors_find_mismatched_arguments() {
        let expr = Expr::invoke(Factory::of(Car).named("car"), vec![Expr::constant(3_u8)]);

        assert_eq!(
            type_errors(&expr),
            vec![TypeError::Mismatch {
                location: "argument 0 of 'car'".to_string(),
                expected: TypeInfo::of::<Engine>(),
                actual: TypeInfo::of::<u8>(),
            }]
        );

        let arity = Expr::invoke(Factory::of(Car).named("car"), vec![]);
        assert!(matches!(
            type_errors(&arity)[..],
            [TypeError::Arity {
                expected: 1,
                actual: 0,
                ..
            }]
        ));
    }

    #[test]
    fn nested_lambda_is_detected() {
        let root = Expr::lambda(vec![], Expr::constant(1_u8));
        let nested = Expr::block(vec![], vec![root.clone()]);

        assert!(!root.has_nested_lambda());
        assert!(nested.has_nested_lambda());
    }

    #[test]
    fn lambda_cannot_be_evaluated() {
        let expr = Expr::lambda(vec![], Expr::constant(1_u8));

        assert!(matches!(
            expr.evaluate(),
            Err(InvokeError::UnsupportedShape("lambda"))
        ));
    }
}
