use std::{collections::BTreeMap, fmt, sync::Arc};

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    domain::{LayoutMap, ModuleName, ModulePath, ModulePolicy, RouteNode, SiteName},
    registry::{Parent, PolicyProcessor, RegisterOptions, RegistryError, RouteTree},
};

/// Errors raised while installing sites and modules.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The route tree refused the registration.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A module lists itself among its own ancestors.
    #[error("module {module} cannot be installed beneath itself (at {path})")]
    Recursive {
        /// The module being installed.
        module: ModuleName,
        /// The path it would have been installed beneath.
        path: ModulePath,
    },

    /// A site's install hook failed.
    #[error("site {site} failed to install: {reason}")]
    Site {
        /// The site.
        site: SiteName,
        /// Why.
        reason: String,
    },
}

/// Everything a module needs while installing itself into a site.
pub struct InstallContext<'a> {
    /// The site being installed.
    pub site: &'a SiteName,
    /// Where routes are registered.
    pub routes: &'a mut RouteTree,
    /// Where policies are registered.
    pub policies: &'a mut PolicyProcessor,
    /// Where submodules are looked up.
    pub catalog: &'a ModuleCatalog,
}

impl fmt::Debug for InstallContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallContext")
            .field("site", self.site)
            .field("catalog", &self.catalog.names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// A feature module contributing routes, layouts and policy to a site.
///
/// Implementors describe themselves through the accessor methods. The
/// default [`Module::install`] registers the module and then installs each
/// declared submodule beneath it.
pub trait Module: Send + Sync + fmt::Debug {
    /// The module's name.
    fn name(&self) -> &ModuleName;

    /// Modules that must be installed before this one.
    fn dependencies(&self) -> &[ModuleName] {
        &[]
    }

    /// Modules installed beneath this one.
    fn submodules(&self) -> &[ModuleName] {
        &[]
    }

    /// Layout overrides this module passes to its submodules, keyed by
    /// module name.
    fn layouts(&self) -> LayoutMap {
        LayoutMap::new()
    }

    /// The module's own routes, relative to its mount point.
    fn routes(&self) -> Vec<RouteNode>;

    /// URL segment to mount under instead of the module's name.
    fn route_prefix(&self) -> Option<&str> {
        None
    }

    /// The module's authorization configuration.
    fn policy(&self) -> Option<ModulePolicy> {
        None
    }

    /// Installs the module beneath `parent` and returns where it landed.
    ///
    /// # Errors
    ///
    /// See [`install_module`].
    fn install(
        &self,
        ctx: &mut InstallContext<'_>,
        parent: &ModulePath,
        inherited_layouts: &LayoutMap,
    ) -> Result<ModulePath, InstallError> {
        install_module(self, ctx, parent, inherited_layouts)
    }
}

/// The standard install sequence.
///
/// 1. Register the module's routes beneath `parent` with
///    `inherited_layouts`.
/// 2. Register the module's hierarchy entry and, if it has one, its policy.
/// 3. Install each declared submodule from the catalog beneath the module,
///    passing `inherited_layouts` overlaid with the module's own layouts.
///
/// Submodules missing from the catalog are skipped with a warning.
///
/// # Errors
///
/// Returns [`InstallError::Recursive`] if the module already appears on
/// `parent`, or any error raised while registering the module or its
/// submodules.
#[instrument(level = "debug", skip_all, fields(site = %ctx.site, module = %module.name(), %parent))]
pub fn install_module<M: Module + ?Sized>(
    module: &M,
    ctx: &mut InstallContext<'_>,
    parent: &ModulePath,
    inherited_layouts: &LayoutMap,
) -> Result<ModulePath, InstallError> {
    if parent.contains(module.name()) {
        return Err(InstallError::Recursive {
            module: module.name().clone(),
            path: parent.clone(),
        });
    }

    let options = RegisterOptions {
        route_prefix: module.route_prefix().map(str::to_owned),
    };
    let parent_ref = if parent.is_root() {
        Parent::Root
    } else {
        Parent::At(parent.clone())
    };
    let path = ctx.routes.register_module_routes(
        module.name(),
        &module.routes(),
        ctx.site,
        &parent_ref,
        inherited_layouts,
        &options,
    )?;

    let policy = module.policy();
    if let Some(policy) = &policy {
        ctx.policies.register_module(policy.clone());
    }
    ctx.policies
        .register_module_hierarchy(ctx.site, &path, policy);

    let submodules = module.submodules();
    if submodules.is_empty() {
        return Ok(path);
    }

    let mut layouts = inherited_layouts.clone();
    layouts.extend(module.layouts());

    let catalog = ctx.catalog;
    for name in submodules {
        let Some(submodule) = catalog.get(name) else {
            warn!(site = %ctx.site, parent = %path, submodule = %name, "submodule not found in catalog, skipping");
            continue;
        };
        debug!(submodule = %name, "installing submodule");
        submodule.install(ctx, &path, &layouts)?;
    }

    Ok(path)
}

/// Table of available modules, keyed by name.
///
/// This stands in for loading modules by name at runtime: every module a
/// site or another module refers to must be registered here first.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<ModuleName, Arc<dyn Module>>,
}

impl ModuleCatalog {
    /// Adds a module, returning the one it replaced.
    pub fn register(&mut self, module: Arc<dyn Module>) -> Option<Arc<dyn Module>> {
        self.modules.insert(module.name().clone(), module)
    }

    /// Adds a module, builder style.
    #[must_use]
    pub fn with(mut self, module: impl Module + 'static) -> Self {
        self.register(Arc::new(module));
        self
    }

    /// Looks up a module.
    #[must_use]
    pub fn get(&self, name: &ModuleName) -> Option<&Arc<dyn Module>> {
        self.modules.get(name)
    }

    /// Whether a module is registered.
    #[must_use]
    pub fn contains(&self, name: &ModuleName) -> bool {
        self.modules.contains_key(name)
    }

    /// Names of all registered modules, sorted.
    pub fn names(&self) -> impl Iterator<Item = &ModuleName> {
        self.modules.keys()
    }

    /// All registered modules, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Module>> {
        self.modules.values()
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Extend<Arc<dyn Module>> for ModuleCatalog {
    fn extend<T: IntoIterator<Item = Arc<dyn Module>>>(&mut self, iter: T) {
        for module in iter {
            if let Some(previous) = self.register(module) {
                warn!(module = %previous.name(), "module registered twice in catalog, keeping the later one");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthRoutes, LayoutRef, PolicyContext, RedirectPurpose};

    #[derive(Debug)]
    struct TestModule {
        name: ModuleName,
        routes: Vec<RouteNode>,
        submodules: Vec<ModuleName>,
        layouts: LayoutMap,
        prefix: Option<String>,
        policy: Option<ModulePolicy>,
    }

    impl TestModule {
        fn new(name: &str, routes: &[&str]) -> Self {
            Self {
                name: ModuleName::new(name).unwrap(),
                routes: routes
                    .iter()
                    .map(|path| RouteNode::page(*path, format!("{name}/{path}")))
                    .collect(),
                submodules: Vec::new(),
                layouts: LayoutMap::new(),
                prefix: None,
                policy: None,
            }
        }

        fn owning(mut self, submodules: &[&str]) -> Self {
            self.submodules = submodules
                .iter()
                .map(|name| ModuleName::new(*name).unwrap())
                .collect();
            self
        }

        fn with_layout(mut self, module: &str, layout: &str) -> Self {
            self.layouts.insert(module.to_string(), LayoutRef::new(layout));
            self
        }
    }

    impl Module for TestModule {
        fn name(&self) -> &ModuleName {
            &self.name
        }

        fn submodules(&self) -> &[ModuleName] {
            &self.submodules
        }

        fn layouts(&self) -> LayoutMap {
            self.layouts.clone()
        }

        fn routes(&self) -> Vec<RouteNode> {
            self.routes.clone()
        }

        fn route_prefix(&self) -> Option<&str> {
            self.prefix.as_deref()
        }

        fn policy(&self) -> Option<ModulePolicy> {
            self.policy.clone()
        }
    }

    fn site() -> SiteName {
        SiteName::new("zoomy").unwrap()
    }

    fn install(catalog: &ModuleCatalog, root: &str, inherited: &LayoutMap) -> (RouteTree, PolicyProcessor) {
        let mut routes = RouteTree::default();
        let mut policies = PolicyProcessor::default();
        let site = site();
        let mut ctx = InstallContext {
            site: &site,
            routes: &mut routes,
            policies: &mut policies,
            catalog,
        };
        catalog
            .get(&ModuleName::new(root).unwrap())
            .unwrap()
            .install(&mut ctx, &ModulePath::root(), inherited)
            .unwrap();
        (routes, policies)
    }

    #[test]
    fn submodules_install_beneath_their_owner() {
        let catalog = ModuleCatalog::default()
            .with(TestModule::new("auth", &["login"]))
            .with(TestModule::new("admin", &["dashboard"]).owning(&["auth"]));

        let (routes, _) = install(&catalog, "admin", &LayoutMap::new());
        let paths: Vec<_> = routes.get_all_routes().into_iter().map(|r| r.path).collect();

        assert_eq!(paths, ["/zoomy/admin/dashboard", "/zoomy/admin/auth/login"]);
    }

    #[test]
    fn own_layouts_override_inherited_ones_for_submodules() {
        let catalog = ModuleCatalog::default()
            .with(TestModule::new("auth", &["login"]))
            .with(
                TestModule::new("admin", &["dashboard"])
                    .owning(&["auth"])
                    .with_layout("auth", "AdminAuthLayout"),
            );
        let inherited: LayoutMap = [
            ("auth".to_string(), LayoutRef::new("SiteAuthLayout")),
            ("admin".to_string(), LayoutRef::new("AdminLayout")),
        ]
        .into();

        let (routes, _) = install(&catalog, "admin", &inherited);
        let auth = routes
            .module(&site(), &"admin/auth".parse().unwrap())
            .unwrap();

        assert_eq!(auth.inherited_layouts()["auth"], LayoutRef::new("AdminAuthLayout"));
        assert_eq!(auth.inherited_layouts()["admin"], LayoutRef::new("AdminLayout"));
        let admin = routes.module(&site(), &"admin".parse().unwrap()).unwrap();
        assert_eq!(admin.inherited_layouts()["auth"], LayoutRef::new("SiteAuthLayout"));
    }

    #[test]
    fn missing_submodules_are_skipped() {
        let catalog = ModuleCatalog::default()
            .with(TestModule::new("crm", &["leads"]).owning(&["missing"]));

        let (routes, _) = install(&catalog, "crm", &LayoutMap::new());

        assert_eq!(routes.get_all_routes().len(), 1);
    }

    #[test]
    fn self_nesting_is_refused() {
        let catalog = ModuleCatalog::default()
            .with(TestModule::new("a", &[]).owning(&["b"]))
            .with(TestModule::new("b", &[]).owning(&["a"]));
        let mut routes = RouteTree::default();
        let mut policies = PolicyProcessor::default();
        let site = site();
        let mut ctx = InstallContext {
            site: &site,
            routes: &mut routes,
            policies: &mut policies,
            catalog: &catalog,
        };

        let err = catalog
            .get(&ModuleName::new("a").unwrap())
            .unwrap()
            .install(&mut ctx, &ModulePath::root(), &LayoutMap::new())
            .unwrap_err();

        assert!(matches!(err, InstallError::Recursive { ref module, .. } if module.as_str() == "a"));
    }

    #[test]
    fn policies_register_flat_and_in_hierarchy() {
        let mut auth = TestModule::new("auth", &["login"]);
        auth.policy = Some(
            ModulePolicy::new(ModuleName::new("auth").unwrap())
                .with_auth(AuthRoutes::default().with(RedirectPurpose::Login, "/zoomy/admin/auth/login")),
        );
        let catalog = ModuleCatalog::default()
            .with(auth)
            .with(TestModule::new("admin", &[]).owning(&["auth"]));

        let (_, policies) = install(&catalog, "admin", &LayoutMap::new());

        assert!(policies.module_config(&ModuleName::new("auth").unwrap()).is_some());
        assert!(policies
            .hierarchy_entry(&site(), &"admin".parse().unwrap())
            .is_some());
        let entry = policies
            .hierarchy_entry(&site(), &"admin/auth".parse().unwrap())
            .unwrap();
        assert_eq!(entry.parent, Some("admin".parse().unwrap()));
        assert_eq!(
            policies.get_redirect_route(
                &site(),
                &"admin/auth".parse().unwrap(),
                RedirectPurpose::Login,
                &PolicyContext::default()
            ),
            "/zoomy/admin/auth/login"
        );
    }

    #[test]
    fn route_prefix_is_passed_to_the_tree() {
        let mut files = TestModule::new("file-manager", &[""]);
        files.prefix = Some("files".to_string());
        let catalog = ModuleCatalog::default().with(files);

        let (routes, _) = install(&catalog, "file-manager", &LayoutMap::new());

        assert_eq!(routes.get_all_routes()[0].path, "/zoomy/files");
    }
}
