//! Sites and the boot sequence.
//!
//! A [`Site`] names the root modules it is built from, its base routes, its
//! layout overrides and its site-level redirect targets. The
//! [`Bootstrapper`] installs every configured site into a fresh
//! [`System`](crate::System) and compiles the result into a router.

use std::{collections::BTreeMap, fmt, sync::Arc};

use tracing::warn;

use crate::{
    domain::{AuthRoutes, LayoutMap, ModuleName, RouteNode, SiteName},
    module::InstallError,
};

mod bootstrap;
mod manifest;

pub use bootstrap::{Boot, BootError, BootState, Bootstrapper};
pub use manifest::{
    CatalogLoadError, Catalogs, ManifestError, ModuleManifest, PolicyManifest, SiteManifest,
};

/// What a site yields when installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    /// The site's name, used as the first URL segment.
    pub name: SiteName,
    /// Root modules, in the order they are requested.
    pub modules: Vec<ModuleName>,
    /// Layout overrides keyed by module name, inherited by every root
    /// module.
    pub layouts: LayoutMap,
    /// Routes mounted directly under `/{site}`.
    pub routes: Vec<RouteNode>,
    /// Site-level redirect targets.
    pub auth: AuthRoutes,
}

/// A site descriptor.
pub trait Site: Send + Sync + fmt::Debug {
    /// The site's name.
    fn name(&self) -> &SiteName;

    /// Root modules to install.
    fn modules(&self) -> &[ModuleName];

    /// Layout overrides keyed by module name.
    fn layouts(&self) -> LayoutMap {
        LayoutMap::new()
    }

    /// Routes mounted directly under `/{site}`.
    fn routes(&self) -> Vec<RouteNode> {
        Vec::new()
    }

    /// Site-level redirect targets.
    fn auth(&self) -> AuthRoutes {
        AuthRoutes::default()
    }

    /// Prepares the site and returns its configuration.
    ///
    /// # Errors
    ///
    /// The default implementation never fails. Implementations doing real
    /// work (fetching remote configuration, say) report failures as
    /// [`InstallError::Site`].
    fn install(&self) -> Result<SiteConfig, InstallError> {
        Ok(SiteConfig {
            name: self.name().clone(),
            modules: self.modules().to_vec(),
            layouts: self.layouts(),
            routes: self.routes(),
            auth: self.auth(),
        })
    }
}

/// Table of available sites, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SiteCatalog {
    sites: BTreeMap<SiteName, Arc<dyn Site>>,
}

impl SiteCatalog {
    /// Adds a site, returning the one it replaced.
    pub fn register(&mut self, site: Arc<dyn Site>) -> Option<Arc<dyn Site>> {
        self.sites.insert(site.name().clone(), site)
    }

    /// Adds a site, builder style.
    #[must_use]
    pub fn with(mut self, site: impl Site + 'static) -> Self {
        self.register(Arc::new(site));
        self
    }

    /// Looks up a site.
    #[must_use]
    pub fn get(&self, name: &SiteName) -> Option<&Arc<dyn Site>> {
        self.sites.get(name)
    }

    /// Names of all registered sites, sorted.
    pub fn names(&self) -> impl Iterator<Item = &SiteName> {
        self.sites.keys()
    }

    /// Number of registered sites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

impl Extend<Arc<dyn Site>> for SiteCatalog {
    fn extend<T: IntoIterator<Item = Arc<dyn Site>>>(&mut self, iter: T) {
        for site in iter {
            if let Some(previous) = self.register(site) {
                warn!(site = %previous.name(), "site registered twice in catalog, keeping the later one");
            }
        }
    }
}
