use crate::{
    binding::{Bindings, Lifetime},
    dependency_graph::{DependencyGraph, Layers, NodeIndex},
    errors::{aggregate, DependencyGraphErrors, ResolutionError},
    expression::Expr,
    extractor::inputs,
    plan::ResolvedPlans,
    settings::Settings,
    types::TypeInfo,
};

/// Builds the graph of `bindings` and resolves every node
///
/// Either every binding gets a plan, or all problems are returned together.
pub fn build(
    bindings: &Bindings,
    settings: &Settings,
) -> Result<ResolvedPlans, DependencyGraphErrors> {
    tracing::debug!("Resolving {} bindings", bindings.len());

    let mut errors = Vec::new();
    let mut graph = DependencyGraph::new(bindings);
    let layers = graph.layers(&mut errors);
    resolve(&mut graph, &layers, &mut errors);

    if let Some(errors) = aggregate(errors) {
        tracing::warn!("Resolution failed with {} errors", errors.errors.len());
        return Err(errors);
    }

    tracing::debug!(
        "Resolved {} bindings in {} layers",
        graph.len(),
        layers.layers.len()
    );
    Ok(ResolvedPlans::new(graph, &layers, settings))
}

/// Resolves the nodes of `graph` layer by layer
///
/// Blocked nodes and nodes depending on a node that failed are skipped, their
/// cause is already part of `errors`.
pub fn resolve(graph: &mut DependencyGraph, layers: &Layers, errors: &mut Vec<ResolutionError>) {
    for (depth, layer) in layers.layers.iter().enumerate() {
        tracing::trace!("Resolving layer {depth} with {} nodes", layer.len());

        for &index in layer {
            if layers.blocked.contains(&index) {
                continue;
            }

            match resolve_node(graph, index) {
                Ok(Some(resolved)) => graph.node_mut(index).resolved = Some(resolved),
                Ok(None) => {
                    tracing::debug!("Skipped {}, a dependency failed", graph.node(index).target)
                }
                Err(error) => errors.push(error),
            }
        }
    }
}

/// Binds every input of the node to the resolved expression of its dependency
///
/// Returns `None` if a dependency has not been resolved because it failed.
fn resolve_node(graph: &DependencyGraph, index: NodeIndex) -> Result<Option<Expr>, ResolutionError> {
    let node = graph.node(index);
    if node.unresolved.has_nested_lambda() {
        return Err(ResolutionError::UnsupportedExpressionShape {
            target: node.target,
            shape: "nested lambda",
        });
    }

    let inputs = inputs(&node.unresolved);
    let mut body = Vec::with_capacity(inputs.len() + 1);
    for input in &inputs {
        let Some(dependency) = graph.index_of(&input.ty) else {
            return Err(ResolutionError::MissingDependency {
                dependency: input.ty,
                required_by: node.target,
            });
        };

        match &graph.node(dependency).resolved {
            Some(resolved) => body.push(Expr::assign(input.clone(), resolved.clone())),
            None => return Ok(None),
        }
    }

    let unresolved = match &node.unresolved {
        Expr::Lambda { body, .. } => body.as_ref().clone(),
        other => other.clone(),
    };

    let rewritten = match inputs.is_empty() {
        true => unresolved,
        false => {
            body.push(unresolved);
            Expr::block(inputs, body)
        }
    };

    tracing::trace!("Resolved {} ({:?}): {}", node.target, node.lifetime, rewritten);
    materialize(node.target, rewritten, node.lifetime).map(Some)
}

/// Applies the lifetime to a fully substituted expression
///
/// A [`Lifetime::PerContainer`] expression is evaluated once and replaced by
/// the produced value, a [`Lifetime::PerCall`] expression is kept as it is.
pub fn materialize(
    target: TypeInfo,
    expression: Expr,
    lifetime: Lifetime,
) -> Result<Expr, ResolutionError> {
    match lifetime {
        Lifetime::PerCall => Ok(expression),
        Lifetime::PerContainer => {
            let value = expression
                .evaluate()
                .map_err(|error| ResolutionError::FactoryFailed {
                    product: target,
                    error,
                })?;

            tracing::debug!("Constructed instance of {}", target);
            Ok(Expr::Constant(value))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::{binding::BindingSpec, factories::Factory, types::Instance};

    struct Config;
    struct Service(#[allow(dead_code)] Arc<Config>);

    fn bindings(specs: Vec<BindingSpec>) -> Bindings {
        let mut bindings = Bindings::new();
        for spec in specs {
            bindings.add(spec).unwrap();
        }
        bindings
    }

    #[test]
    fn per_call_is_kept_as_expression() {
        let expr = Expr::construct(Factory::of(|| Config));

        let materialized =
            materialize(TypeInfo::of::<Config>(), expr, Lifetime::PerCall).unwrap();
        assert!(matches!(materialized, Expr::Invoke { .. }));
    }

    #[test]
    fn per_container_becomes_a_constant() {
        let expr = Expr::construct(Factory::of(|| Config));

        let materialized =
            materialize(TypeInfo::of::<Config>(), expr, Lifetime::PerContainer).unwrap();
        assert!(matches!(materialized, Expr::Constant(instance) if instance.info == TypeInfo::of::<Config>()));
    }

    #[test]
    fn failing_singleton_is_reported() {
        let expr = Expr::construct(Factory::try_of(|| Err::<Config, _>("no config")));

        let err = materialize(TypeInfo::of::<Config>(), expr, Lifetime::PerContainer).unwrap_err();
        assert!(matches!(err, ResolutionError::FactoryFailed { .. }));
        assert!(err.to_string().contains("no config"));
    }

    #[test]
    fn dependencies_are_bound_in_a_block() {
        let bindings = bindings(vec![
            BindingSpec::of::<Service>(Factory::of(Service)),
            BindingSpec::of::<Config>(Factory::of(|| Config)),
        ]);
        let mut errors = Vec::new();
        let mut graph = DependencyGraph::new(&bindings);
        let layers = graph.layers(&mut errors);

        resolve(&mut graph, &layers, &mut errors);

        assert!(errors.is_empty());
        let service = graph.node(0).resolved.as_ref().unwrap();
        match service {
            Expr::Block { locals, body } => {
                assert_eq!(locals.len(), 1);
                assert_eq!(locals[0].ty, TypeInfo::of::<Config>());
                assert!(matches!(&body[0], Expr::Assign { value, .. } if matches!(value.as_ref(), Expr::Invoke { .. })));
            }
            other => panic!("expected a block, got {other}"),
        }
        assert!(service.free_variables().is_empty());
        assert!(service.evaluate().unwrap().downcast::<Service>().is_ok());
    }

    #[test]
    fn singleton_factory_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let bindings = bindings(vec![
            BindingSpec::of::<Config>(Factory::of(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Config
            }))
            .with(Lifetime::PerContainer),
            BindingSpec::of::<Service>(Factory::of(Service)),
        ]);

        let plans = build(&bindings, &Settings::default()).unwrap();
        for _ in 0..3 {
            plans.get::<Service>().unwrap().invoke().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dependents_of_failed_nodes_are_skipped() {
        let bindings = bindings(vec![
            BindingSpec::of::<Config>(Factory::try_of(|| Err::<Config, _>("broken")))
                .with(Lifetime::PerContainer),
            BindingSpec::of::<Service>(Factory::of(Service)),
        ]);

        let errors = build(&bindings, &Settings::default()).unwrap_err().errors;

        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ResolutionError::FactoryFailed { product, .. } if *product == TypeInfo::of::<Config>()
        ));
    }

    #[test]
    fn nested_lambda_is_unsupported() {
        let nested = Expr::block(
            vec![],
            vec![Expr::lambda(vec![], Expr::constant(Config))],
        );
        let bindings = bindings(vec![BindingSpec::new(
            TypeInfo::of::<Config>(),
            Expr::lambda(vec![], Expr::block(vec![], vec![nested, Expr::constant(Config)])),
        )]);

        let errors = build(&bindings, &Settings::default()).unwrap_err().errors;

        assert!(matches!(
            &errors[..],
            [ResolutionError::UnsupportedExpressionShape { shape: "nested lambda", .. }]
        ));
    }

    #[test]
    fn constants_resolve_to_themselves() {
        let shared = Instance::new(Config);
        let bindings = bindings(vec![BindingSpec::new(
            TypeInfo::of::<Config>(),
            Expr::Constant(shared.clone()),
        )
        .with(Lifetime::PerContainer)]);

        let plans = build(&bindings, &Settings::default()).unwrap();

        assert!(plans.get::<Config>().unwrap().invoke().unwrap().ptr_eq(&shared));
    }
}
