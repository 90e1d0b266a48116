//! Domain models for module and route registration.
//!
//! This module contains the core domain types: validated site and module
//! names, route definitions, authorization policy configuration and the
//! bootstrap configuration.

mod config;
pub use config::{Config, CyclePolicy, DuplicatePolicy};

/// Site names, module names and module paths.
pub mod name;
pub use name::{InvalidNameError, ModuleName, ModulePath, SiteName};

pub mod route;
pub use route::{ComponentRef, LayoutMap, LayoutRef, RouteNode, RouteRecord, join_path};

pub mod policy;
pub use policy::{
    AccessDecision, AuthRoutes, FailedPolicy, ModulePolicy, PolicyContext, PolicyMode, PolicyRule,
    ProtectedRoute, RedirectPurpose, User,
};
