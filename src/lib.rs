//! Module, route and authorization registry for multi-site applications.
//!
//! Sites are assembled from feature modules. Each module contributes routes,
//! layout overrides, an authorization policy and nested submodules.
//! Installing a site registers all of these into a [`RouteTree`] and a
//! [`PolicyProcessor`], which the [`RouteCompiler`] turns into a [`Router`]
//! that checks access on every navigation.
//!
//! The usual entry point is the [`Bootstrapper`], which installs every
//! configured site into a [`System`].

pub mod domain;
pub use domain::{
    AccessDecision, AuthRoutes, ComponentRef, Config, CyclePolicy, DuplicatePolicy, FailedPolicy,
    InvalidNameError, LayoutMap, LayoutRef, ModuleName, ModulePath, ModulePolicy, PolicyContext,
    PolicyMode, PolicyRule, ProtectedRoute, RedirectPurpose, RouteNode, RouteRecord, SiteName,
    User,
};

/// Route and policy registries.
pub mod registry;
pub use registry::{
    HierarchyEntry, ModuleEntry, Parent, PolicyProcessor, RegisterOptions, RegistryError,
    RouteTree, SiteEntry,
};

pub mod module;
pub use module::{
    DependencyError, InstallContext, InstallError, Module, ModuleCatalog, install_module,
    install_order,
};

pub mod site;
pub use site::{
    Boot, BootError, BootState, Bootstrapper, CatalogLoadError, Catalogs, ManifestError,
    ModuleManifest, Site, SiteCatalog, SiteConfig, SiteManifest,
};

pub mod compiler;
pub use compiler::{
    CompiledRoute, Component, ComponentError, ComponentRegistry, Element, Guard, LazyComponent,
    Navigation, RouteCompiler, Router,
};

mod system;
pub use system::System;
