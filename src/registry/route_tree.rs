//! In-memory store of site and module routes.
//!
//! The [`RouteTree`] holds, per site, a list of base routes and a forest of
//! module entries. Each module entry owns its routes, the layouts inherited
//! when it was installed, an optional route prefix and its submodules.
//! Absolute paths only exist after [`RouteTree::get_all_routes`] flattens
//! the forest.

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::domain::{
    DuplicatePolicy, LayoutMap, ModuleName, ModulePath, RouteNode, RouteRecord, SiteName,
    join_path, route::normalize_relative,
};

/// Where a module is attached when it is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parent {
    /// Directly under the site.
    Root,
    /// Under the module at this explicit path.
    At(ModulePath),
    /// Under the first module with this name found anywhere in the site's
    /// forest, depth-first.
    Named(ModuleName),
}

/// Per-registration options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// URL segment to mount the module under instead of its name.
    pub route_prefix: Option<String>,
}

/// Errors raised by the route tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A module was registered twice at the same position while duplicates
    /// are rejected.
    #[error("module {path} is already registered in site {site}")]
    DuplicateModule {
        /// Site the module belongs to.
        site: SiteName,
        /// Position of the module.
        path: ModulePath,
    },
}

/// A registered module and its submodules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    name: ModuleName,
    routes: Vec<RouteNode>,
    submodules: Vec<ModuleEntry>,
    inherited_layouts: LayoutMap,
    route_prefix: Option<String>,
    synthesized: bool,
}

impl ModuleEntry {
    const fn placeholder(name: ModuleName) -> Self {
        Self {
            name,
            routes: Vec::new(),
            submodules: Vec::new(),
            inherited_layouts: LayoutMap::new(),
            route_prefix: None,
            synthesized: true,
        }
    }

    /// The module's name.
    #[must_use]
    pub const fn name(&self) -> &ModuleName {
        &self.name
    }

    /// The module's own routes.
    #[must_use]
    pub fn routes(&self) -> &[RouteNode] {
        &self.routes
    }

    /// Modules registered beneath this one, in registration order.
    #[must_use]
    pub fn submodules(&self) -> &[Self] {
        &self.submodules
    }

    /// Layouts inherited when the module was installed.
    #[must_use]
    pub const fn inherited_layouts(&self) -> &LayoutMap {
        &self.inherited_layouts
    }

    /// The URL segment this module mounts under.
    #[must_use]
    pub fn segment(&self) -> &str {
        self.route_prefix.as_deref().unwrap_or(&self.name)
    }

    /// Whether the entry was created to stand in for a missing parent and has
    /// not been registered itself.
    #[must_use]
    pub const fn is_synthesized(&self) -> bool {
        self.synthesized
    }
}

/// A site's base routes and module forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteEntry {
    name: SiteName,
    base: Vec<RouteNode>,
    modules: Vec<ModuleEntry>,
}

impl SiteEntry {
    const fn new(name: SiteName) -> Self {
        Self {
            name,
            base: Vec::new(),
            modules: Vec::new(),
        }
    }

    /// The site's name.
    #[must_use]
    pub const fn name(&self) -> &SiteName {
        &self.name
    }

    /// Routes mounted directly under the site.
    #[must_use]
    pub fn base(&self) -> &[RouteNode] {
        &self.base
    }

    /// Root modules, in registration order.
    #[must_use]
    pub fn modules(&self) -> &[ModuleEntry] {
        &self.modules
    }
}

/// Store of every site's routes.
///
/// Sites are created lazily on first registration and kept in registration
/// order. Input routes are cloned on the way in so the caller's values never
/// alias stored state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTree {
    sites: Vec<SiteEntry>,
    duplicates: DuplicatePolicy,
}

impl RouteTree {
    /// An empty tree with the given duplicate registration policy.
    #[must_use]
    pub const fn with_policy(duplicates: DuplicatePolicy) -> Self {
        Self {
            sites: Vec::new(),
            duplicates,
        }
    }

    /// Replaces the base routes of `site`.
    pub fn register_site_routes(&mut self, site: &SiteName, routes: &[RouteNode]) {
        debug!(%site, count = routes.len(), "registering site routes");
        self.site_mut(site).base = routes.to_vec();
    }

    /// Registers a module's routes in `site` beneath `parent`.
    ///
    /// A parent that does not exist yet is synthesized as an empty entry (and
    /// a warning logged) so routes are never dropped. Re-registering a module
    /// at the same position replaces its routes, layouts and prefix but keeps
    /// any submodules already attached, unless the tree rejects duplicates.
    ///
    /// Returns the path the module was registered at.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateModule`] if the module is already
    /// registered at that position and the tree was built with
    /// [`DuplicatePolicy::Reject`].
    #[instrument(level = "debug", skip(self, routes, inherited_layouts, options))]
    pub fn register_module_routes(
        &mut self,
        module: &ModuleName,
        routes: &[RouteNode],
        site: &SiteName,
        parent: &Parent,
        inherited_layouts: &LayoutMap,
        options: &RegisterOptions,
    ) -> Result<ModulePath, RegistryError> {
        let parent_path = match parent {
            Parent::Root => ModulePath::root(),
            Parent::At(path) => path.clone(),
            Parent::Named(name) => self.find_module_node(site, name).unwrap_or_else(|| {
                warn!(%site, parent = %name, %module, "parent module not found, creating it at the site root");
                ModulePath::root().child(name.clone())
            }),
        };
        let path = parent_path.child(module.clone());
        let duplicates = self.duplicates;

        let siblings = children_at(&mut self.site_mut(site).modules, parent_path.segments(), site);
        let entry = ModuleEntry {
            name: module.clone(),
            routes: routes.to_vec(),
            submodules: Vec::new(),
            inherited_layouts: inherited_layouts.clone(),
            route_prefix: options.route_prefix.clone(),
            synthesized: false,
        };

        match siblings.iter_mut().find(|existing| &existing.name == module) {
            Some(existing) => {
                if duplicates == DuplicatePolicy::Reject && !existing.synthesized {
                    return Err(RegistryError::DuplicateModule {
                        site: site.clone(),
                        path,
                    });
                }
                debug!(%site, %path, "replacing module registration");
                let submodules = std::mem::take(&mut existing.submodules);
                *existing = ModuleEntry { submodules, ..entry };
            }
            None => siblings.push(entry),
        }

        Ok(path)
    }

    /// Finds the first module named `name` anywhere in `site`, depth-first in
    /// registration order.
    #[must_use]
    pub fn find_module_node(&self, site: &SiteName, name: &ModuleName) -> Option<ModulePath> {
        fn search(
            modules: &[ModuleEntry],
            name: &ModuleName,
            prefix: &ModulePath,
        ) -> Option<ModulePath> {
            for entry in modules {
                let path = prefix.child(entry.name.clone());
                if &entry.name == name {
                    return Some(path);
                }
                if let Some(found) = search(&entry.submodules, name, &path) {
                    return Some(found);
                }
            }
            None
        }

        search(&self.site(site)?.modules, name, &ModulePath::root())
    }

    /// Looks up the module at `path` in `site`.
    #[must_use]
    pub fn module(&self, site: &SiteName, path: &ModulePath) -> Option<&ModuleEntry> {
        let (first, rest) = path.segments().split_first()?;
        let mut entry = self.site(site)?.modules.iter().find(|e| &e.name == first)?;
        for name in rest {
            entry = entry.submodules.iter().find(|e| &e.name == name)?;
        }
        Some(entry)
    }

    /// Looks up a site.
    #[must_use]
    pub fn site(&self, site: &SiteName) -> Option<&SiteEntry> {
        self.sites.iter().find(|entry| &entry.name == site)
    }

    /// All sites, in registration order.
    #[must_use]
    pub fn sites(&self) -> &[SiteEntry] {
        &self.sites
    }

    /// Whether nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Flattens every site into records with absolute paths.
    ///
    /// Each site contributes its base routes (under `/{site}`) followed by its
    /// modules depth-first in registration order. A module's routes mount
    /// under the chain of its ancestors' segments.
    #[must_use]
    pub fn get_all_routes(&self) -> Vec<RouteRecord> {
        let mut records = Vec::new();
        for site in &self.sites {
            let mount = join_path([site.name.as_str()]);
            for node in &site.base {
                records.push(flatten(node, &mount, "", &site.name, &ModulePath::root()));
            }
            for entry in &site.modules {
                flatten_module(entry, &mount, &site.name, &ModulePath::root(), &mut records);
            }
        }
        records
    }

    /// Merges the inherited layouts of every module into one map.
    ///
    /// The merge is shallow and follows the same order as
    /// [`Self::get_all_routes`]; on a key collision the last module wins.
    #[must_use]
    pub fn get_all_layouts(&self) -> LayoutMap {
        fn collect(modules: &[ModuleEntry], layouts: &mut LayoutMap) {
            for entry in modules {
                layouts.extend(
                    entry
                        .inherited_layouts
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone())),
                );
                collect(&entry.submodules, layouts);
            }
        }

        let mut layouts = LayoutMap::new();
        for site in &self.sites {
            collect(&site.modules, &mut layouts);
        }
        layouts
    }

    /// Removes every site and module.
    pub fn clear_all_routes(&mut self) {
        debug!("clearing all routes");
        self.sites.clear();
    }

    fn site_mut(&mut self, site: &SiteName) -> &mut SiteEntry {
        let index = match self.sites.iter().position(|entry| &entry.name == site) {
            Some(index) => index,
            None => {
                self.sites.push(SiteEntry::new(site.clone()));
                self.sites.len() - 1
            }
        };
        &mut self.sites[index]
    }
}

/// Returns the submodule list at `path`, synthesizing missing entries.
fn children_at<'a>(
    modules: &'a mut Vec<ModuleEntry>,
    path: &[ModuleName],
    site: &SiteName,
) -> &'a mut Vec<ModuleEntry> {
    let Some((head, rest)) = path.split_first() else {
        return modules;
    };
    let index = if let Some(index) = modules.iter().position(|entry| &entry.name == head) {
        index
    } else {
        warn!(%site, parent = %head, "parent module not registered, creating an empty entry");
        modules.push(ModuleEntry::placeholder(head.clone()));
        modules.len() - 1
    };
    children_at(&mut modules[index].submodules, rest, site)
}

fn flatten_module(
    entry: &ModuleEntry,
    parent_mount: &str,
    site: &SiteName,
    parent_path: &ModulePath,
    records: &mut Vec<RouteRecord>,
) {
    let mount = join_path([parent_mount, entry.segment()]);
    let path = parent_path.child(entry.name.clone());
    for node in &entry.routes {
        records.push(flatten(node, &mount, "", site, &path));
    }
    for submodule in &entry.submodules {
        flatten_module(submodule, &mount, site, &path, records);
    }
}

fn flatten(
    node: &RouteNode,
    mount: &str,
    parent_relative: &str,
    site: &SiteName,
    module_path: &ModulePath,
) -> RouteRecord {
    let absolute = join_path([mount, node.path.as_str()]);
    let relative = normalize_relative(&join_path([parent_relative, node.path.as_str()]));
    let children = node
        .children
        .iter()
        .map(|child| flatten(child, &absolute, &relative, site, module_path))
        .collect();

    RouteRecord {
        path: absolute,
        relative_path: relative,
        site: site.clone(),
        module_path: module_path.clone(),
        component: node.component.clone(),
        layout: node.layout.clone(),
        module_name: node.module_name.clone(),
        protected: node.protected,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LayoutRef;

    fn site(name: &str) -> SiteName {
        SiteName::new(name).unwrap()
    }

    fn module(name: &str) -> ModuleName {
        ModuleName::new(name).unwrap()
    }

    fn auth_routes() -> Vec<RouteNode> {
        vec![
            RouteNode::page("", "auth/Index"),
            RouteNode::page("login", "auth/Login"),
            RouteNode::page("register", "auth/Register"),
        ]
    }

    fn paths(tree: &RouteTree) -> Vec<String> {
        tree.get_all_routes().into_iter().map(|r| r.path).collect()
    }

    fn register(tree: &mut RouteTree, name: &str, routes: &[RouteNode], parent: &Parent) -> ModulePath {
        tree.register_module_routes(
            &module(name),
            routes,
            &site("zoomy"),
            parent,
            &LayoutMap::new(),
            &RegisterOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn module_routes_flatten_under_site_and_module() {
        let mut tree = RouteTree::default();
        register(&mut tree, "auth", &auth_routes(), &Parent::Root);

        assert_eq!(
            paths(&tree),
            ["/zoomy/auth", "/zoomy/auth/login", "/zoomy/auth/register"]
        );
    }

    #[test]
    fn same_module_under_two_parents_does_not_collide() {
        let mut tree = RouteTree::default();
        register(&mut tree, "auth", &auth_routes(), &Parent::Root);
        let admin = register(
            &mut tree,
            "admin",
            &[RouteNode::page("dashboard", "admin/Dashboard")],
            &Parent::Root,
        );
        register(&mut tree, "auth", &auth_routes(), &Parent::At(admin));

        let all = paths(&tree);
        assert!(all.contains(&"/zoomy/auth/login".to_string()));
        assert!(all.contains(&"/zoomy/admin/auth/login".to_string()));
        assert_eq!(all.len(), 7);
    }

    #[test]
    fn site_base_routes_come_first() {
        let mut tree = RouteTree::default();
        register(&mut tree, "crm", &[RouteNode::page("leads", "crm/Leads")], &Parent::Root);
        tree.register_site_routes(&site("zoomy"), &[RouteNode::page("", "Home")]);

        assert_eq!(paths(&tree), ["/zoomy", "/zoomy/crm/leads"]);
    }

    #[test]
    fn site_routes_are_copied_on_registration() {
        let mut tree = RouteTree::default();
        let mut routes = vec![RouteNode::page("", "Home")];
        tree.register_site_routes(&site("zoomy"), &routes);
        routes[0].path = "mutated".to_string();

        assert_eq!(paths(&tree), ["/zoomy"]);
    }

    #[test]
    fn re_registration_overwrites_rather_than_duplicates() {
        let mut tree = RouteTree::default();
        register(&mut tree, "crm", &[RouteNode::page("leads", "crm/Leads")], &Parent::Root);
        register(&mut tree, "crm", &[RouteNode::page("deals", "crm/Deals")], &Parent::Root);

        assert_eq!(paths(&tree), ["/zoomy/crm/deals"]);
    }

    #[test]
    fn re_registration_keeps_attached_submodules() {
        let mut tree = RouteTree::default();
        let crm = register(&mut tree, "crm", &[], &Parent::Root);
        register(&mut tree, "leads", &[RouteNode::page("", "crm/Leads")], &Parent::At(crm));
        register(&mut tree, "crm", &[RouteNode::page("", "crm/Index")], &Parent::Root);

        assert_eq!(paths(&tree), ["/zoomy/crm", "/zoomy/crm/leads"]);
    }

    #[test]
    fn duplicates_can_be_rejected() {
        let mut tree = RouteTree::with_policy(DuplicatePolicy::Reject);
        register(&mut tree, "crm", &[], &Parent::Root);

        let err = tree
            .register_module_routes(
                &module("crm"),
                &[],
                &site("zoomy"),
                &Parent::Root,
                &LayoutMap::new(),
                &RegisterOptions::default(),
            )
            .unwrap_err();

        assert_eq!(
            err,
            RegistryError::DuplicateModule {
                site: site("zoomy"),
                path: "crm".parse().unwrap(),
            }
        );
    }

    #[test]
    fn rejecting_duplicates_still_fills_synthesized_parents() {
        let mut tree = RouteTree::with_policy(DuplicatePolicy::Reject);
        register(
            &mut tree,
            "leads",
            &[RouteNode::page("", "crm/Leads")],
            &Parent::At("crm".parse().unwrap()),
        );
        register(&mut tree, "crm", &[RouteNode::page("", "crm/Index")], &Parent::Root);

        assert_eq!(paths(&tree), ["/zoomy/crm", "/zoomy/crm/leads"]);
    }

    #[test]
    fn named_parent_is_found_at_any_depth() {
        for depth in 1..=4 {
            let mut tree = RouteTree::default();
            let mut parent = Parent::Root;
            let mut names = Vec::new();
            for level in 0..depth {
                let name = format!("m{level}");
                let path = register(&mut tree, &name, &[], &parent);
                parent = Parent::At(path);
                names.push(name);
            }

            let deepest = module(names.last().unwrap());
            let path = register(
                &mut tree,
                "leaf",
                &[RouteNode::page("page", "Leaf")],
                &Parent::Named(deepest),
            );

            assert_eq!(path.len(), depth + 1);
            let expected = format!("/zoomy/{}/leaf/page", names.join("/"));
            assert_eq!(paths(&tree), [expected]);
        }
    }

    #[test]
    fn missing_named_parent_is_synthesized_at_root() {
        let mut tree = RouteTree::default();
        let path = register(
            &mut tree,
            "campaigns",
            &[RouteNode::page("", "ads/Campaigns")],
            &Parent::Named(module("google-ads")),
        );

        assert_eq!(path.to_string(), "google-ads/campaigns");
        assert_eq!(paths(&tree), ["/zoomy/google-ads/campaigns"]);
        let parent = tree.module(&site("zoomy"), &"google-ads".parse().unwrap()).unwrap();
        assert!(parent.is_synthesized());
    }

    #[test]
    fn route_prefix_replaces_module_segment() {
        let mut tree = RouteTree::default();
        tree.register_module_routes(
            &module("file-manager"),
            &[RouteNode::page("", "files/Browser")],
            &site("zoomy"),
            &Parent::Root,
            &LayoutMap::new(),
            &RegisterOptions {
                route_prefix: Some("files".to_string()),
            },
        )
        .unwrap();

        assert_eq!(paths(&tree), ["/zoomy/files"]);
        let record = &tree.get_all_routes()[0];
        assert_eq!(record.module_path.to_string(), "file-manager");
    }

    #[test]
    fn nested_children_get_absolute_and_relative_paths() {
        let mut tree = RouteTree::default();
        register(
            &mut tree,
            "crm",
            &[RouteNode::new("campaigns").with_children(vec![
                RouteNode::page("", "crm/Campaigns"),
                RouteNode::page(":id", "crm/Campaign"),
            ])],
            &Parent::Root,
        );

        let records = tree.get_all_routes();
        assert_eq!(records.len(), 1);
        let parent = &records[0];
        assert_eq!(parent.path, "/zoomy/crm/campaigns");
        assert_eq!(parent.children[1].path, "/zoomy/crm/campaigns/:id");
        assert_eq!(parent.children[1].relative_path, "campaigns/:id");
        assert_eq!(parent.walk().count(), 3);
    }

    #[test]
    fn layouts_merge_with_last_registration_winning() {
        let mut tree = RouteTree::default();
        let first: LayoutMap = [
            ("crm".to_string(), LayoutRef::new("CrmLayout")),
            ("auth".to_string(), LayoutRef::new("AuthLayout")),
        ]
        .into();
        let second: LayoutMap = [("auth".to_string(), LayoutRef::new("AdminAuthLayout"))].into();

        for (name, layouts) in [("crm", &first), ("admin", &second)] {
            tree.register_module_routes(
                &module(name),
                &[],
                &site("zoomy"),
                &Parent::Root,
                layouts,
                &RegisterOptions::default(),
            )
            .unwrap();
        }

        let merged = tree.get_all_layouts();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["crm"], LayoutRef::new("CrmLayout"));
        assert_eq!(merged["auth"], LayoutRef::new("AdminAuthLayout"));
    }

    #[test]
    fn clearing_removes_everything() {
        let mut tree = RouteTree::default();
        tree.register_site_routes(&site("zoomy"), &[RouteNode::page("", "Home")]);
        register(&mut tree, "auth", &auth_routes(), &Parent::Root);

        tree.clear_all_routes();

        assert!(tree.get_all_routes().is_empty());
        assert!(tree.is_empty());
    }

    #[test]
    fn sites_flatten_in_registration_order() {
        let mut tree = RouteTree::default();
        tree.register_site_routes(&site("zoomy"), &[RouteNode::page("", "Home")]);
        tree.register_site_routes(&site("partners"), &[RouteNode::page("", "Home")]);

        assert_eq!(paths(&tree), ["/zoomy", "/partners"]);
    }
}
