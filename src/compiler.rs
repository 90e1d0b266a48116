//! Compiling registered routes into a navigable router.
//!
//! Pages are looked up by key in a [`ComponentRegistry`] and wrapped in
//! [`LazyComponent`]s that load on first use. Routes needing authorization
//! carry a [`Guard`] that consults the
//! [`PolicyProcessor`](crate::PolicyProcessor) when navigating.

mod component;
mod route_compiler;
mod router;

pub use component::{
    Component, ComponentError, ComponentFactory, ComponentRegistry, ComponentResult,
    LazyComponent, StaticComponent,
};
pub use route_compiler::RouteCompiler;
pub use router::{
    Builtin, CompiledRoute, Element, ErrorPlaceholder, Guard, Navigation, Params, Router,
};
