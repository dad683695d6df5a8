//! Wrapp Graph turns a set of bindings into executable construction plans.
//!
//! Every binding maps a target type to a construction [`Expr`], a [`Lifetime`],
//! an ordered list of decorators and a disposal policy. Building the bindings:
//!
//! 1. splices the decorators of every binding into its expression,
//! 2. extracts the dependencies of every expression and orders the bindings
//!    into topological layers,
//! 3. resolves the layers in order, substituting every dependency with its
//!    already resolved expression and materializing per container singletons.
//!
//! All problems (missing dependencies, cycles, malformed decorators, ...) are
//! collected and returned together as [`DependencyGraphErrors`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use wrapp_graph::{BindingSpec, Bindings, Container, Factory, Lifetime};
//!
//! struct Database;
//! struct Repository(Arc<Database>);
//!
//! let bindings = Bindings::new()
//!     .bind(BindingSpec::of::<Database>(Factory::of(|| Database)).with(Lifetime::PerContainer))
//!     .unwrap()
//!     .bind(BindingSpec::of::<Repository>(Factory::of(Repository)))
//!     .unwrap();
//!
//! let container = Container::build(&bindings).unwrap();
//! let first = container.require::<Repository>().unwrap();
//! let second = container.require::<Repository>().unwrap();
//!
//! assert!(!Arc::ptr_eq(&first, &second));
//! assert!(Arc::ptr_eq(&first.0, &second.0));
//! ```

pub mod binding;
pub mod container;
pub mod decorator;
pub mod dependency_graph;
pub mod errors;
pub mod expression;
pub mod extractor;
pub mod factories;
pub mod plan;
pub mod resolver;
pub mod settings;
pub mod types;

pub use binding::{BindingMetadata, BindingSpec, Bindings, DecoratorSpec, Disposal, Lifetime};
pub use container::Container;
pub use dependency_graph::{DependencyGraph, DependencyNode, Layers, NodeIndex};
pub use errors::{
    aggregate, BindingError, DependencyGraphErrors, InvokeError, RequireError, ResolutionError,
};
pub use expression::{Expr, Variable};
pub use factories::Factory;
pub use plan::{DisposalPlan, ResolvedPlan, ResolvedPlans};
pub use settings::Settings;
pub use types::{DynError, Injectable, Instance, TypeInfo};
