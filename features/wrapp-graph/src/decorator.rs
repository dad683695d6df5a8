use crate::{
    binding::DecoratorSpec,
    errors::ResolutionError,
    expression::{Expr, Variable},
    types::TypeInfo,
};

/// Combines the base expression of `target` with its decorators
///
/// The result constructs the base, then applies every decorator in ascending
/// order, each one receiving the result of the previous stage in place of its
/// parameter of type `target`. Additional decorator parameters become
/// parameters of the result, so they are resolved like any other dependency.
///
/// Without decorators `base` is returned unchanged.
pub fn splice(
    target: TypeInfo,
    base: &Expr,
    decorators: &[DecoratorSpec],
) -> Result<Expr, ResolutionError> {
    if decorators.is_empty() {
        return Ok(base.clone());
    }

    let mut ordered: Vec<&DecoratorSpec> = decorators.iter().collect();
    ordered.sort_by_key(|decorator| decorator.order);

    let (mut params, inner) = match base {
        Expr::Lambda { params, body } => (params.clone(), body.as_ref().clone()),
        other => (Vec::new(), other.clone()),
    };

    let instance = Variable::new(format!("{target} instance"), target);
    let mut body = vec![Expr::assign(instance.clone(), inner)];

    for decorator in ordered {
        let mismatch = |reason: String| ResolutionError::DecoratorShapeMismatch {
            decorated: target,
            order: decorator.order,
            reason,
        };

        let Expr::Lambda {
            params: decorator_params,
            body: decorator_body,
        } = &decorator.expression
        else {
            return Err(mismatch("it must be a lambda".to_string()));
        };

        let mut inner_params = decorator_params.iter().filter(|param| param.ty == target);
        let inner_param = match (inner_params.next(), inner_params.next()) {
            (Some(param), None) => param,
            (None, _) => {
                return Err(mismatch(format!("it has no parameter of type '{target}'")));
            }
            (Some(_), Some(_)) => {
                return Err(mismatch(format!(
                    "it has more than one parameter of type '{target}'"
                )));
            }
        };

        // Every decorator parameter is its own input, even if another stage
        // declares one with the same name and type
        let mut stage = decorator_body.substitute(inner_param, &instance.expr());
        for extra in decorator_params.iter().filter(|param| param.ty != target) {
            let renamed = Variable::new(
                format!("decorator{} {}", decorator.order, extra.name),
                extra.ty,
            );
            stage = stage.substitute(extra, &renamed.expr());
            if !params.contains(&renamed) {
                params.push(renamed);
            }
        }

        let stage_type = stage.ty();
        if stage_type.is_void() {
            // Runs for its effect only, the instance stays as it is
            body.push(stage);
        } else if stage_type == target {
            body.push(Expr::assign(instance.clone(), stage));
        } else {
            return Err(mismatch(format!(
                "it produces '{stage_type}' instead of '{target}'"
            )));
        }
    }

    body.push(instance.expr());
    let block = Expr::block(vec![instance], body);

    Ok(match params.is_empty() {
        true => block,
        false => Expr::lambda(params, block),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        extractor::{extract, inputs},
        factories::Factory,
    };

    #[derive(Debug, PartialEq)]
    struct Greeting(String);
    struct Punctuation(&'static str);

    fn spec(expression: Expr, order: usize) -> DecoratorSpec {
        DecoratorSpec { expression, order }
    }

    fn wrap(label: &'static str) -> Expr {
        Expr::construct(Factory::of(move |inner: Arc<Greeting>| {
            Greeting(format!("{label}({})", inner.0))
        }))
    }

    fn base() -> Expr {
        Expr::construct(Factory::of(|| Greeting("P".to_string())))
    }

    fn evaluate(expr: &Expr) -> String {
        expr.evaluate().unwrap().downcast::<Greeting>().unwrap().0.clone()
    }

    #[test]
    fn no_decorators_returns_base() {
        let base = base();

        let spliced = splice(TypeInfo::of::<Greeting>(), &base, &[]).unwrap();
        assert!(matches!(spliced, Expr::Invoke { .. }));
    }

    #[test]
    fn decorators_apply_in_order() {
        let target = TypeInfo::of::<Greeting>();

        let forward = splice(target, &base(), &[spec(wrap("D1"), 0), spec(wrap("D2"), 1)]).unwrap();
        assert_eq!(evaluate(&forward), "D2(D1(P))");

        let swapped = splice(target, &base(), &[spec(wrap("D2"), 0), spec(wrap("D1"), 1)]).unwrap();
        assert_eq!(evaluate(&swapped), "D1(D2(P))");
    }

    #[test]
    fn order_field_wins_over_slice_position() {
        let target = TypeInfo::of::<Greeting>();

        let spliced = splice(target, &base(), &[spec(wrap("D2"), 1), spec(wrap("D1"), 0)]).unwrap();
        assert_eq!(evaluate(&spliced), "D2(D1(P))");
    }

    #[test]
    fn extra_parameters_become_dependencies() {
        let target = TypeInfo::of::<Greeting>();
        let decorator = Expr::construct(Factory::of(
            |inner: Arc<Greeting>, mark: Arc<Punctuation>| Greeting(format!("{}{}", inner.0, mark.0)),
        ));

        let spliced = splice(target, &base(), &[spec(decorator, 0)]).unwrap();

        assert_eq!(extract(&spliced), vec![TypeInfo::of::<Punctuation>()]);
    }

    #[test]
    fn decorators_do_not_share_parameters() {
        let target = TypeInfo::of::<Greeting>();
        let punctuate = || {
            Expr::construct(Factory::of(|inner: Arc<Greeting>, mark: Arc<Punctuation>| {
                Greeting(format!("{}{}", inner.0, mark.0))
            }))
        };

        let spliced = splice(target, &base(), &[spec(punctuate(), 0), spec(punctuate(), 1)]).unwrap();

        let found = inputs(&spliced);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|input| input.ty == TypeInfo::of::<Punctuation>()));
        assert_ne!(found[0], found[1]);
    }

    #[test]
    fn void_decorator_keeps_the_instance() {
        let target = TypeInfo::of::<Greeting>();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let observer = Expr::construct(Factory::of(move |inner: Arc<Greeting>| {
            log.lock().unwrap().push(inner.0.clone());
        }));

        let spliced = splice(target, &base(), &[spec(observer, 0), spec(wrap("D"), 1)]).unwrap();

        assert_eq!(spliced.ty(), target);
        assert_eq!(evaluate(&spliced), "D(P)");
        assert_eq!(*seen.lock().unwrap(), vec!["P".to_string()]);
    }

    #[test]
    fn decorator_without_inner_parameter_is_rejected() {
        let target = TypeInfo::of::<Greeting>();
        let decorator = Expr::construct(Factory::of(|_: Arc<Punctuation>| Greeting(String::new())));

        let err = splice(target, &base(), &[spec(decorator, 0)]).unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::DecoratorShapeMismatch { order: 0, .. }
        ));
    }

    #[test]
    fn decorator_with_two_inner_parameters_is_rejected() {
        let target = TypeInfo::of::<Greeting>();
        let decorator = Expr::construct(Factory::of(|a: Arc<Greeting>, _: Arc<Greeting>| {
            Greeting(a.0.clone())
        }));

        assert!(splice(target, &base(), &[spec(decorator, 0)]).is_err());
    }

    #[test]
    fn decorator_must_be_a_lambda() {
        let target = TypeInfo::of::<Greeting>();

        assert!(splice(target, &base(), &[spec(Expr::constant(1_u8), 0)]).is_err());
    }

    #[test]
    fn decorator_producing_another_type_is_rejected() {
        let target = TypeInfo::of::<Greeting>();
        let decorator = Expr::construct(Factory::of(|_: Arc<Greeting>| 1_u8));

        let err = splice(target, &base(), &[spec(decorator, 0)]).unwrap_err();
        assert!(err.to_string().contains("u8"));
    }
}
