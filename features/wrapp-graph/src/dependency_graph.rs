use std::collections::{HashMap, HashSet};

use crate::{
    binding::{BindingMetadata, Bindings, Disposal, Lifetime, OnDeath},
    decorator::splice,
    errors::{aggregate, DependencyGraphErrors, ResolutionError},
    expression::{type_errors, Expr, TypeError},
    extractor::extract,
    types::TypeInfo,
};

/// Stable position of a node inside the [`DependencyGraph`]
pub type NodeIndex = usize;

/// One node per bound type
pub struct DependencyNode {
    pub target: TypeInfo,
    /// Expression after decorator splicing, before dependency substitution
    pub unresolved: Expr,
    pub lifetime: Lifetime,
    pub disposal: Disposal,
    pub on_death: Option<OnDeath>,
    pub metadata: BindingMetadata,
    /// Filled in once by the resolver
    pub resolved: Option<Expr>,
}

/// Graph of all bindings
/// Used to order construction and to find missing and circular dependencies
///
/// Nodes live in an arena, edges are computed from the node expressions when
/// needed and never stored.
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
    index: HashMap<TypeInfo, NodeIndex>,
    /// Nodes whose binding is invalid
    broken: HashSet<NodeIndex>,
    /// Problems of the invalid bindings, in registration order
    invalid: Vec<ResolutionError>,
}

/// Construction order produced by [`DependencyGraph::layers`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Layers {
    /// Nodes of one layer only depend on nodes of earlier layers
    pub layers: Vec<Vec<NodeIndex>>,
    /// Nodes which must not be resolved, their problem was already reported
    pub blocked: HashSet<NodeIndex>,
}
impl Layers {
    /// All layered nodes in construction order
    pub fn flatten(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.layers.iter().flatten().copied()
    }
}

impl DependencyGraph {
    /// Creates one node per binding, splicing in its decorators
    ///
    /// Invalid bindings still get a node, so types depending on them are not
    /// reported as missing. Their problems are reported by [`Self::layers`].
    pub fn new(bindings: &Bindings) -> Self {
        let mut graph = Self {
            nodes: Vec::with_capacity(bindings.len()),
            index: HashMap::with_capacity(bindings.len()),
            broken: HashSet::new(),
            invalid: Vec::new(),
        };

        for binding in bindings.iter() {
            let index = graph.nodes.len();
            let unresolved = match splice(binding.target, &binding.expression, &binding.decorators)
            {
                Ok(spliced) => {
                    let mismatches = check_types(binding.target, &spliced);
                    if !mismatches.is_empty() {
                        graph.broken.insert(index);
                        graph.invalid.extend(mismatches);
                    }
                    spliced
                }
                Err(error) => {
                    graph.broken.insert(index);
                    graph.invalid.push(error);
                    binding.expression.clone()
                }
            };

            tracing::trace!("Graph node for {}: {}", binding.target, unresolved);

            graph.index.insert(binding.target, index);
            graph.nodes.push(DependencyNode {
                target: binding.target,
                unresolved,
                lifetime: binding.lifetime,
                disposal: binding.disposal,
                on_death: binding.on_death.clone(),
                metadata: binding.metadata,
                resolved: None,
            });
        }

        tracing::debug!(
            "Built dependency graph with {} nodes ({} invalid)",
            graph.nodes.len(),
            graph.broken.len()
        );

        graph
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: NodeIndex) -> &DependencyNode {
        &self.nodes[index]
    }

    pub(crate) fn node_mut(&mut self, index: NodeIndex) -> &mut DependencyNode {
        &mut self.nodes[index]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.iter()
    }

    pub(crate) fn into_nodes(self) -> Vec<DependencyNode> {
        self.nodes
    }

    pub fn index_of(&self, target: &TypeInfo) -> Option<NodeIndex> {
        self.index.get(target).copied()
    }

    /// Types the node requires, computed from its unresolved expression
    pub fn dependencies(&self, index: NodeIndex) -> Vec<TypeInfo> {
        extract(&self.nodes[index].unresolved)
    }

    /// Orders the nodes into construction layers
    ///
    /// Invalid bindings, missing dependencies and cycles are added to
    /// `errors`. Processing continues past them so every problem is reported.
    pub fn layers(&self, errors: &mut Vec<ResolutionError>) -> Layers {
        errors.extend(self.invalid.iter().cloned());

        let count = self.nodes.len();
        let mut prerequisites: Vec<Vec<NodeIndex>> = vec![Vec::new(); count];
        let mut dependents: Vec<Vec<NodeIndex>> = vec![Vec::new(); count];
        let mut blocked = self.broken.clone();

        for (index, node) in self.nodes.iter().enumerate() {
            for dependency in self.dependencies(index) {
                match self.index.get(&dependency) {
                    Some(&prerequisite) => {
                        prerequisites[index].push(prerequisite);
                        dependents[prerequisite].push(index);
                    }
                    None => {
                        errors.push(ResolutionError::MissingDependency {
                            dependency,
                            required_by: node.target,
                        });
                        blocked.insert(index);
                    }
                }
            }
        }

        // Kahn - every round emits all nodes without open prerequisites
        let mut in_degree: Vec<usize> = prerequisites.iter().map(Vec::len).collect();
        let mut layers = Vec::new();
        let mut current: Vec<NodeIndex> = (0..count).filter(|i| in_degree[*i] == 0).collect();

        while !current.is_empty() {
            let mut next = Vec::new();
            for &index in &current {
                for &dependent in &dependents[index] {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort_unstable();

            tracing::trace!("Layer {}: {} nodes", layers.len(), current.len());
            layers.push(current);
            current = next;
        }

        let remaining: HashSet<NodeIndex> = (0..count).filter(|i| in_degree[*i] > 0).collect();
        if !remaining.is_empty() {
            let mut cycle: Vec<NodeIndex> = remaining
                .iter()
                .copied()
                .filter(|index| on_cycle(*index, &prerequisites, &remaining))
                .collect();
            cycle.sort_unstable();

            tracing::debug!(
                "{} nodes could not be ordered, {} of them form cycles",
                remaining.len(),
                cycle.len()
            );

            if !cycle.is_empty() {
                let mut downstream: Vec<NodeIndex> = remaining
                    .iter()
                    .copied()
                    .filter(|index| !cycle.contains(index))
                    .collect();
                downstream.sort_unstable();

                errors.push(ResolutionError::CyclicDependency {
                    types: cycle.iter().map(|index| self.nodes[*index].target).collect(),
                    blocked: downstream
                        .iter()
                        .map(|index| self.nodes[*index].target)
                        .collect(),
                });
            }
            blocked.extend(remaining);
        }

        Layers { layers, blocked }
    }

    /// Validate the graph
    ///
    /// Returns the construction layers or every invalid binding, missing
    /// dependency and cycle
    pub fn check(&self) -> Result<Layers, DependencyGraphErrors> {
        let mut errors = Vec::new();
        let layers = self.layers(&mut errors);

        match aggregate(errors) {
            Some(errors) => Err(errors),
            None => Ok(layers),
        }
    }
}

/// Returns true if `start` can reach itself through unordered nodes
fn on_cycle(
    start: NodeIndex,
    prerequisites: &[Vec<NodeIndex>],
    remaining: &HashSet<NodeIndex>,
) -> bool {
    let mut visited = HashSet::new();
    let mut stack: Vec<NodeIndex> = prerequisites[start].clone();

    while let Some(index) = stack.pop() {
        if index == start {
            return true;
        }
        if !remaining.contains(&index) || !visited.insert(index) {
            continue;
        }
        stack.extend(prerequisites[index].iter().copied());
    }

    false
}

fn check_types(target: TypeInfo, expr: &Expr) -> Vec<ResolutionError> {
    let mut errors: Vec<ResolutionError> = type_errors(expr)
        .into_iter()
        .map(|error| ResolutionError::TypeMismatch { target, error })
        .collect();

    if expr.ty() != target {
        errors.push(ResolutionError::TypeMismatch {
            target,
            error: TypeError::Mismatch {
                location: "the binding".to_string(),
                expected: target,
                actual: expr.ty(),
            },
        });
    }
    errors
}
