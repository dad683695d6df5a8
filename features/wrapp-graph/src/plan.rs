use std::{collections::HashMap, fmt::Debug};

use crate::{
    binding::{BindingMetadata, Disposal, Lifetime, OnDeath},
    dependency_graph::{DependencyGraph, Layers},
    errors::InvokeError,
    expression::Expr,
    settings::Settings,
    types::{Instance, TypeInfo},
};

/// What runs when an instance produced by a plan is torn down
#[derive(Clone)]
pub struct DisposalPlan {
    pub action: OnDeath,
    /// [`Lifetime::PerCall`] disposes every produced instance,
    /// [`Lifetime::PerContainer`] the single shared one
    pub granularity: Lifetime,
}
impl Debug for DisposalPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposalPlan")
            .field("granularity", &self.granularity)
            .finish_non_exhaustive()
    }
}

/// Fully substituted construction expression of one type
pub struct ResolvedPlan {
    target: TypeInfo,
    expression: Expr,
    lifetime: Lifetime,
    disposal: Disposal,
    disposal_plan: Option<DisposalPlan>,
    metadata: BindingMetadata,
}
impl Debug for ResolvedPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedPlan")
            .field("target", &self.target.type_name)
            .field("expression", &self.expression.to_string())
            .field("lifetime", &self.lifetime)
            .field("disposal", &self.disposal)
            .finish()
    }
}

impl ResolvedPlan {
    /// Produces an instance
    ///
    /// For [`Lifetime::PerContainer`] this returns the shared instance, for
    /// [`Lifetime::PerCall`] a freshly constructed one.
    pub fn invoke(&self) -> Result<Instance, InvokeError> {
        self.expression.evaluate()
    }

    pub fn target(&self) -> TypeInfo {
        self.target
    }

    /// The resolved expression, free of variables and lambdas
    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// The declared disposal policy
    pub fn disposal_policy(&self) -> Disposal {
        self.disposal
    }

    /// The disposal to run at teardown, if any
    pub fn disposal(&self) -> Option<&DisposalPlan> {
        self.disposal_plan.as_ref()
    }

    pub fn metadata(&self) -> BindingMetadata {
        self.metadata
    }
}

/// Resolved plans of every bound type
///
/// Immutable once built, so it can be shared between threads freely.
#[derive(Debug)]
pub struct ResolvedPlans {
    /// In construction order
    plans: Vec<ResolvedPlan>,
    index: HashMap<TypeInfo, usize>,
    layers: Vec<Vec<TypeInfo>>,
}

impl ResolvedPlans {
    pub(crate) fn new(graph: DependencyGraph, layers: &Layers, settings: &Settings) -> Self {
        let layer_types: Vec<Vec<TypeInfo>> = layers
            .layers
            .iter()
            .map(|layer| layer.iter().map(|index| graph.node(*index).target).collect())
            .collect();

        let mut nodes: Vec<_> = graph.into_nodes().into_iter().map(Some).collect();
        let mut plans = Vec::with_capacity(nodes.len());
        let mut index = HashMap::with_capacity(nodes.len());

        for node_index in layers.flatten() {
            let Some(node) = nodes[node_index].take() else {
                continue;
            };
            let Some(expression) = node.resolved else {
                continue;
            };

            let disposes = match node.disposal {
                Disposal::Always => true,
                Disposal::Never => false,
                Disposal::Default => settings.auto_dispose_lifetimes,
            };
            let disposal_plan = node
                .on_death
                .filter(|_| disposes)
                .map(|action| DisposalPlan {
                    action,
                    granularity: node.lifetime,
                });

            index.insert(node.target, plans.len());
            plans.push(ResolvedPlan {
                target: node.target,
                expression,
                lifetime: node.lifetime,
                disposal: node.disposal,
                disposal_plan,
                metadata: node.metadata,
            });
        }

        Self {
            plans,
            index,
            layers: layer_types,
        }
    }

    pub fn get<T: 'static>(&self) -> Option<&ResolvedPlan> {
        self.get_info(&TypeInfo::of::<T>())
    }

    pub fn get_info(&self, target: &TypeInfo) -> Option<&ResolvedPlan> {
        self.index.get(target).map(|index| &self.plans[*index])
    }

    /// The construction expression of `T` as data
    pub fn expression_of<T: 'static>(&self) -> Option<&Expr> {
        self.get::<T>().map(ResolvedPlan::expression)
    }

    /// All plans in construction order
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedPlan> {
        self.plans.iter()
    }

    /// Types in the order they were resolved
    pub fn order(&self) -> impl Iterator<Item = TypeInfo> + '_ {
        self.plans.iter().map(ResolvedPlan::target)
    }

    /// Types grouped by topological layer
    pub fn layers(&self) -> &[Vec<TypeInfo>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
