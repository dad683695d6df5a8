use std::{collections::HashMap, fmt::Debug, panic::Location, sync::Arc};

use crate::{
    container::Container,
    errors::{BindingError, DependencyGraphErrors},
    expression::Expr,
    factories::Factory,
    plan::ResolvedPlans,
    resolver,
    settings::Settings,
    types::{Injectable, Instance, TypeInfo},
};

/// How often the expression of a binding is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifetime {
    /// Evaluated on every request, producing a fresh instance
    #[default]
    PerCall,
    /// Evaluated once while building, the instance is shared afterwards
    PerContainer,
}

/// Whether the disposal action of a binding runs at teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposal {
    /// Disposes if [`Settings::auto_dispose_lifetimes`] is set
    #[default]
    Default,
    /// Never disposes
    Never,
    /// Always disposes
    Always,
}

/// Action run on an instance when it is disposed
pub type OnDeath = Arc<dyn Fn(&Instance) + Send + Sync>;

/// Where a binding was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingMetadata {
    pub location: &'static Location<'static>,
}
impl std::fmt::Display for BindingMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.location.file(), self.location.line())
    }
}

/// A wrapping step applied to an already constructed instance
#[derive(Debug, Clone)]
pub struct DecoratorSpec {
    /// A lambda with exactly one parameter of the decorated type
    pub expression: Expr,
    /// Registration index, decorators apply in ascending order
    pub order: usize,
}

/// Declared construction recipe for a target type
#[derive(Clone)]
pub struct BindingSpec {
    pub target: TypeInfo,
    pub expression: Expr,
    pub lifetime: Lifetime,
    pub decorators: Vec<DecoratorSpec>,
    pub disposal: Disposal,
    pub on_death: Option<OnDeath>,
    pub metadata: BindingMetadata,
}
impl Debug for BindingSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingSpec")
            .field("target", &self.target)
            .field("expression", &self.expression.to_string())
            .field("lifetime", &self.lifetime)
            .field("decorators", &self.decorators.len())
            .field("disposal", &self.disposal)
            .field("on_death", &self.on_death.is_some())
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl BindingSpec {
    /// Binds `target` to an expression
    #[track_caller]
    pub fn new(target: TypeInfo, expression: Expr) -> Self {
        Self {
            target,
            expression,
            lifetime: Lifetime::default(),
            decorators: Vec::new(),
            disposal: Disposal::default(),
            on_death: None,
            metadata: BindingMetadata {
                location: Location::caller(),
            },
        }
    }

    /// Binds `T` to a factory, each factory parameter is a dependency
    #[track_caller]
    pub fn of<T: Injectable>(factory: Factory) -> Self {
        Self::new(TypeInfo::of::<T>(), Expr::construct(factory))
    }

    /// Binds `T` to an already existing value
    #[track_caller]
    pub fn instance<T: Injectable>(value: T) -> Self {
        Self::new(TypeInfo::of::<T>(), Expr::constant(value)).with(Lifetime::PerContainer)
    }

    pub fn with(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn dispose(mut self, disposal: Disposal) -> Self {
        self.disposal = disposal;
        self
    }

    pub fn on_death(mut self, action: impl Fn(&Instance) + Send + Sync + 'static) -> Self {
        self.on_death = Some(Arc::new(action));
        self
    }

    /// Adds a decorator, applied after all previously added ones
    pub fn decorate(mut self, expression: Expr) -> Self {
        let order = self.decorators.len();
        self.decorators.push(DecoratorSpec { expression, order });
        self
    }

    /// Adds a decorator built from a factory
    ///
    /// The factory must take exactly one parameter of the target type, all
    /// other parameters are dependencies.
    pub fn decorate_with(self, factory: Factory) -> Self {
        self.decorate(Expr::construct(factory))
    }
}

/// Flattened and validated set of bindings, keyed by target type
///
/// Keeps registration order, so diagnostics are reproducible.
#[derive(Debug, Default, Clone)]
pub struct Bindings {
    pub(crate) registered: Vec<BindingSpec>,
    index: HashMap<TypeInfo, usize>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding, rejecting a second binding for the same target
    pub fn add(&mut self, binding: BindingSpec) -> Result<&mut Self, BindingError> {
        if let Some(existing) = self.index.get(&binding.target) {
            return Err(BindingError::Duplicate {
                target: binding.target,
                first: self.registered[*existing].metadata,
            });
        }

        self.index.insert(binding.target, self.registered.len());
        self.registered.push(binding);
        Ok(self)
    }

    /// Builder style [`Bindings::add`]
    pub fn bind(mut self, binding: BindingSpec) -> Result<Self, BindingError> {
        self.add(binding)?;
        Ok(self)
    }

    pub fn get(&self, target: &TypeInfo) -> Option<&BindingSpec> {
        self.index.get(target).map(|index| &self.registered[*index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindingSpec> {
        self.registered.iter()
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Resolves all bindings into construction plans
    pub fn build(&self) -> Result<ResolvedPlans, DependencyGraphErrors> {
        self.build_with(&Settings::default())
    }

    pub fn build_with(&self, settings: &Settings) -> Result<ResolvedPlans, DependencyGraphErrors> {
        resolver::build(self, settings)
    }

    /// Resolves all bindings and wraps the plans in a [`Container`]
    pub fn into_container(self) -> Result<Container, DependencyGraphErrors> {
        Ok(Container::new(self.build()?))
    }
}
