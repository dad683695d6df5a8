use std::{borrow::Cow, fmt::Debug, sync::Arc};

use crate::types::{DynError, Injectable, Instance, TypeInfo};

type FactoryFn = dyn Fn(&[Instance]) -> Result<Instance, DynError> + Send + Sync;

/// The callee of an [`Expr::Invoke`](crate::expression::Expr::Invoke)
///
/// The function body is opaque, but its name, parameter types and output type
/// are inspectable, so expressions invoking it can be checked and rewritten.
#[derive(Clone)]
pub struct Factory {
    name: Cow<'static, str>,
    params: Arc<[TypeInfo]>,
    output: TypeInfo,
    call: Arc<FactoryFn>,
}
impl Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("output", &self.output)
            .finish()
    }
}

impl Factory {
    /// Creates a factory from an untyped function
    ///
    /// The function receives one instance per entry of `params`, in order.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        params: Vec<TypeInfo>,
        output: TypeInfo,
        call: impl Fn(&[Instance]) -> Result<Instance, DynError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params: params.into(),
            output,
            call: Arc::new(call),
        }
    }

    /// Creates a factory from a closure taking its dependencies as `Arc`s
    ///
    /// ```ignore
    /// let factory = Factory::of(|db: Arc<Database>| Repository::new(db));
    /// ```
    pub fn of<Args, F: IntoFactory<Args>>(f: F) -> Self {
        f.into_factory()
    }

    /// Like [`Factory::of`] for closures returning a `Result`
    pub fn try_of<Args, F: IntoFallibleFactory<Args>>(f: F) -> Self {
        f.into_factory()
    }

    /// Replaces the name used in diagnostics
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[TypeInfo] {
        &self.params
    }

    pub fn output(&self) -> TypeInfo {
        self.output
    }

    /// Calls the underlying function
    pub fn call(&self, args: &[Instance]) -> Result<Instance, DynError> {
        (self.call)(args)
    }

    /// Returns true if both factories share the same function
    pub fn ptr_eq(&self, other: &Factory) -> bool {
        Arc::ptr_eq(&self.call, &other.call)
    }
}

/// Conversion of infallible closures into a [`Factory`]
pub trait IntoFactory<Args> {
    fn into_factory(self) -> Factory;
}

/// Conversion of fallible closures into a [`Factory`]
pub trait IntoFallibleFactory<Args> {
    fn into_factory(self) -> Factory;
}

fn argument<T: Injectable>(args: &[Instance], index: usize) -> Result<Arc<T>, DynError> {
    let instance = args
        .get(index)
        .ok_or_else(|| format!("missing argument {index}"))?;
    instance.downcast::<T>().map_err(|actual| {
        format!(
            "argument {index} is '{actual}', expected '{}'",
            std::any::type_name::<T>()
        )
        .into()
    })
}

macro_rules! impl_into_factory {
    ($($arg:ident => $index:tt),*) => {
        impl<Func, Out, $($arg),*> IntoFactory<($($arg,)*)> for Func
        where
            Func: Fn($(Arc<$arg>),*) -> Out + Send + Sync + 'static,
            Out: Injectable,
            $($arg: Injectable,)*
        {
            #[allow(unused_variables)]
            fn into_factory(self) -> Factory {
                Factory::new(
                    std::any::type_name::<Func>(),
                    vec![$(TypeInfo::of::<$arg>()),*],
                    TypeInfo::of::<Out>(),
                    move |args: &[Instance]| {
                        Ok(Instance::new((self)($(argument::<$arg>(args, $index)?),*)))
                    },
                )
            }
        }

        impl<Func, Out, Error, $($arg),*> IntoFallibleFactory<($($arg,)*)> for Func
        where
            Func: Fn($(Arc<$arg>),*) -> Result<Out, Error> + Send + Sync + 'static,
            Out: Injectable,
            Error: Into<DynError>,
            $($arg: Injectable,)*
        {
            #[allow(unused_variables)]
            fn into_factory(self) -> Factory {
                Factory::new(
                    std::any::type_name::<Func>(),
                    vec![$(TypeInfo::of::<$arg>()),*],
                    TypeInfo::of::<Out>(),
                    move |args: &[Instance]| {
                        (self)($(argument::<$arg>(args, $index)?),*)
                            .map(Instance::new)
                            .map_err(Into::into)
                    },
                )
            }
        }
    };
}

impl_into_factory!();
impl_into_factory!(A0 => 0);
impl_into_factory!(A0 => 0, A1 => 1);
impl_into_factory!(A0 => 0, A1 => 1, A2 => 2);
impl_into_factory!(A0 => 0, A1 => 1, A2 => 2, A3 => 3);
impl_into_factory!(A0 => 0, A1 => 1, A2 => 2, A3 => 3, A4 => 4);
impl_into_factory!(A0 => 0, A1 => 1, A2 => 2, A3 => 3, A4 => 4, A5 => 5);
