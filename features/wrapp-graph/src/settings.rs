/// Options applied while resolving a set of bindings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Record the disposal action of bindings using [`Disposal::Default`](crate::binding::Disposal::Default)
    pub auto_dispose_lifetimes: bool,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_dispose_lifetimes(mut self, auto_dispose: bool) -> Self {
        self.auto_dispose_lifetimes = auto_dispose;
        self
    }
}
