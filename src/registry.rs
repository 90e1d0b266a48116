mod policy_processor;
mod route_tree;

pub use policy_processor::{HierarchyEntry, PolicyProcessor};
pub use route_tree::{ModuleEntry, Parent, RegisterOptions, RegistryError, RouteTree, SiteEntry};
