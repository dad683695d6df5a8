use std::{any::type_name, fmt::Debug, sync::Arc};

use crate::{
    binding::Bindings,
    errors::{DependencyGraphErrors, RequireError},
    plan::ResolvedPlans,
    settings::Settings,
    types::{Injectable, TypeInfo},
};

/// Container invoking resolved plans
///
/// Cloning the container shares the plans.
#[derive(Clone)]
pub struct Container(pub Arc<ResolvedPlans>);
impl Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_struct("Container");
        for plan in self.0.iter() {
            map.field(plan.target().type_name, &plan.lifetime());
        }
        map.finish()
    }
}

impl Container {
    pub fn new(plans: ResolvedPlans) -> Self {
        Self(Arc::new(plans))
    }

    /// Resolves the bindings and wraps the plans
    pub fn build(bindings: &Bindings) -> Result<Self, DependencyGraphErrors> {
        Self::build_with(bindings, &Settings::default())
    }

    pub fn build_with(
        bindings: &Bindings,
        settings: &Settings,
    ) -> Result<Self, DependencyGraphErrors> {
        Ok(Self::new(bindings.build_with(settings)?))
    }

    /// Attempts to get the requested type
    pub fn require<T: Injectable>(&self) -> Result<Arc<T>, RequireError> {
        let plan = self
            .0
            .get_info(&TypeInfo::of::<T>())
            .ok_or(RequireError::TypeMissing(type_name::<T>()))?;

        plan.invoke()?
            .downcast()
            .map_err(|actual_type| RequireError::DowncastFailed {
                required_type: type_name::<T>(),
                actual_type,
            })
    }

    pub fn plans(&self) -> &ResolvedPlans {
        &self.0
    }
}
