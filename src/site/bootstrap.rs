use std::{collections::BTreeMap, sync::Arc};

use thiserror::Error;
use tracing::{debug, error, info, instrument};

use super::{Site, SiteCatalog};
use crate::{
    compiler::{ComponentRegistry, RouteCompiler, Router},
    domain::{Config, InvalidNameError, LayoutMap, ModulePath, SiteName},
    module::{DependencyError, InstallContext, InstallError, ModuleCatalog, install_order},
    system::System,
};

/// Why a boot failed.
#[derive(Debug, Error)]
pub enum BootError {
    /// A configured site name is not a valid name.
    #[error(transparent)]
    InvalidName(#[from] InvalidNameError),

    /// A configured site is not in the catalog.
    #[error("site {0} not found")]
    UnknownSite(SiteName),

    /// A site or module failed to install.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// A site's modules could not be ordered.
    #[error("site {site}: {source}")]
    Dependency {
        /// The site being installed.
        site: SiteName,
        /// The underlying error.
        source: DependencyError,
    },
}

/// Where a boot ended up.
#[derive(Debug)]
pub enum BootState {
    /// Every site installed and the router was compiled.
    Ready,
    /// Booting failed and the system carries the fallback router.
    Failed(BootError),
}

/// The result of booting.
#[derive(Debug)]
pub struct Boot {
    /// The booted system.
    pub system: System,
    /// How the boot ended.
    pub state: BootState,
}

impl Boot {
    /// Whether every site booted.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.state, BootState::Ready)
    }
}

/// Installs sites and their modules and compiles the router.
#[derive(Debug, Default)]
pub struct Bootstrapper {
    config: Config,
    sites: SiteCatalog,
    modules: ModuleCatalog,
    components: ComponentRegistry,
}

impl Bootstrapper {
    /// A bootstrapper with empty catalogs.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Sets the sites that can be booted.
    #[must_use]
    pub fn with_sites(mut self, sites: SiteCatalog) -> Self {
        self.sites = sites;
        self
    }

    /// Sets the modules sites can install.
    #[must_use]
    pub fn with_modules(mut self, modules: ModuleCatalog) -> Self {
        self.modules = modules;
        self
    }

    /// Sets where page components are resolved.
    #[must_use]
    pub fn with_components(mut self, components: ComponentRegistry) -> Self {
        self.components = components;
        self
    }

    /// Boots every configured site into a fresh [`System`].
    ///
    /// Sites are taken from the configured list, or from the catalog when
    /// that list is empty. For each site in turn: install it, register its
    /// base routes and auth config, then install its root modules in
    /// dependency order with the site's layouts as the inherited layouts.
    /// Finally the router is compiled from the merged layouts.
    ///
    /// # Errors
    ///
    /// If any step fails and the configuration enables `fallback_on_error`,
    /// the returned [`Boot`] is [`BootState::Failed`] and its system carries
    /// [`Router::fallback`]. Otherwise the error is returned.
    #[instrument(skip(self))]
    pub fn boot(&self) -> Result<Boot, BootError> {
        let mut system = System::new(self.config.duplicate_modules);
        match self.install_all(&mut system) {
            Ok(layouts) => {
                system.router = RouteCompiler::new(&self.components).compile(
                    &system.routes,
                    &system.policies,
                    &layouts,
                );
                info!(routes = system.router.iter().count(), "boot complete");
                Ok(Boot {
                    system,
                    state: BootState::Ready,
                })
            }
            Err(e) if self.config.fallback_on_error => {
                error!(error = %e, "boot failed, using the fallback router");
                system.router = Router::fallback();
                Ok(Boot {
                    system,
                    state: BootState::Failed(e),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn discover(&self) -> Result<Vec<Arc<dyn Site>>, BootError> {
        if self.config.sites.is_empty() {
            return Ok(self
                .sites
                .names()
                .filter_map(|name| self.sites.get(name))
                .cloned()
                .collect());
        }
        self.config
            .sites
            .iter()
            .map(|name| {
                let name = SiteName::new(name.as_str())?;
                self.sites
                    .get(&name)
                    .cloned()
                    .ok_or(BootError::UnknownSite(name))
            })
            .collect()
    }

    fn install_all(
        &self,
        system: &mut System,
    ) -> Result<BTreeMap<SiteName, LayoutMap>, BootError> {
        let mut layouts = BTreeMap::new();
        for site in self.discover()? {
            let (name, site_layouts) = self.install_site(site.as_ref(), system)?;
            layouts.insert(name, site_layouts);
        }
        Ok(layouts)
    }

    #[instrument(level = "debug", skip_all, fields(site = %site.name()))]
    fn install_site(
        &self,
        site: &dyn Site,
        system: &mut System,
    ) -> Result<(SiteName, LayoutMap), BootError> {
        let config = site.install()?;
        info!(modules = config.modules.len(), "installing site");
        system.routes.register_site_routes(&config.name, &config.routes);
        system
            .policies
            .register_site_auth_config(&config.name, config.auth.clone());

        let modules = install_order(&config.modules, &self.modules, self.config.dependency_cycles)
            .map_err(|source| BootError::Dependency {
                site: config.name.clone(),
                source,
            })?;

        let mut ctx = InstallContext {
            site: &config.name,
            routes: &mut system.routes,
            policies: &mut system.policies,
            catalog: &self.modules,
        };
        for module in modules {
            debug!(module = %module.name(), "installing root module");
            module.install(&mut ctx, &ModulePath::root(), &config.layouts)?;
        }
        Ok((config.name, config.layouts))
    }
}
