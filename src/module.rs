//! Feature modules and their installation.
//!
//! A [`Module`] describes the routes, layouts, policy and submodules of a
//! feature. Modules are looked up by name in a [`ModuleCatalog`], ordered by
//! their dependencies with [`install_order`], and installed into a site's
//! [`RouteTree`](crate::RouteTree) and
//! [`PolicyProcessor`](crate::PolicyProcessor).

mod descriptor;
mod order;

pub use descriptor::{InstallContext, InstallError, Module, ModuleCatalog, install_module};
pub use order::{DependencyError, install_order};
