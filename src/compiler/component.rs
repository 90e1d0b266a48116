//! Page components and their lazy loading.

use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    sync::{Arc, OnceLock},
};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::domain::ComponentRef;

/// A renderable page.
pub trait Component: Send + Sync + fmt::Debug {
    /// Human-readable name, used in diagnostics.
    fn name(&self) -> &str;
}

/// A component that is nothing more than its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticComponent(pub String);

impl Component for StaticComponent {
    fn name(&self) -> &str {
        &self.0
    }
}

/// Errors raised while loading a component.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ComponentError {
    /// No factory is registered under the key.
    #[error("no component registered for '{0}'")]
    Unresolved(ComponentRef),

    /// The factory ran and failed.
    #[error("component '{key}' failed to load: {reason}")]
    Load {
        /// The component's key.
        key: ComponentRef,
        /// Why.
        reason: String,
    },
}

/// Result of loading a component.
pub type ComponentResult = Result<Arc<dyn Component>, ComponentError>;

/// An asynchronous constructor for a component.
pub type ComponentFactory = Arc<dyn Fn() -> BoxFuture<'static, ComponentResult> + Send + Sync>;

/// Maps component keys to the factories that load them.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    factories: BTreeMap<ComponentRef, ComponentFactory>,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl ComponentRegistry {
    /// Registers an asynchronous factory under `key`, replacing any previous
    /// one.
    pub fn register<F, Fut>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ComponentResult> + Send + 'static,
    {
        let factory: ComponentFactory = Arc::new(move || factory().boxed());
        self.factories.insert(ComponentRef::new(key), factory);
    }

    /// Registers a [`StaticComponent`] named after its key.
    pub fn register_static(&mut self, key: impl Into<String>) {
        let key = key.into();
        let component: Arc<dyn Component> = Arc::new(StaticComponent(key.clone()));
        self.register(key, move || futures::future::ready(Ok(Arc::clone(&component))));
    }

    /// Builder form of [`Self::register_static`].
    #[must_use]
    pub fn with_static(mut self, key: impl Into<String>) -> Self {
        self.register_static(key);
        self
    }

    /// The factory registered under `key`.
    #[must_use]
    pub fn resolve(&self, key: &ComponentRef) -> Option<ComponentFactory> {
        self.factories.get(key).cloned()
    }

    /// Whether a factory is registered under `key`.
    #[must_use]
    pub fn contains(&self, key: &ComponentRef) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &ComponentRef> {
        self.factories.keys()
    }

    /// Number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

type LoadFuture = Shared<BoxFuture<'static, ComponentResult>>;

/// A component loaded on first use.
///
/// The factory runs at most once. Every call to [`LazyComponent::load`]
/// awaits the same shared future, including calls made while the first load
/// is still in flight.
pub struct LazyComponent {
    key: ComponentRef,
    factory: ComponentFactory,
    load: OnceLock<LoadFuture>,
}

impl fmt::Debug for LazyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyComponent")
            .field("key", &self.key)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl LazyComponent {
    /// Wraps `factory` without running it.
    #[must_use]
    pub fn new(key: ComponentRef, factory: ComponentFactory) -> Self {
        Self {
            key,
            factory,
            load: OnceLock::new(),
        }
    }

    /// The component's key.
    #[must_use]
    pub const fn key(&self) -> &ComponentRef {
        &self.key
    }

    /// Loads the component, starting the factory on the first call.
    pub fn load(&self) -> impl Future<Output = ComponentResult> + Send + 'static {
        self.load
            .get_or_init(|| {
                tracing::debug!(key = %self.key, "loading component");
                (self.factory)().shared()
            })
            .clone()
    }

    /// Whether a load has completed, successfully or not.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.load.get().is_some_and(|load| load.peek().is_some())
    }
}
