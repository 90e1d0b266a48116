//! Declarative sites and modules read from TOML manifests.
//!
//! A project root holds one directory per site, each with a `site.toml`, and
//! a directory of shared module manifests:
//!
//! ```text
//! zoom.toml
//! sites/
//!   zoomy/site.toml
//!   partners/site.toml
//! modules/
//!   admin.toml
//!   auth.toml
//! ```
//!
//! Site and module names are taken from the directory and file names.

use std::{
    collections::{BTreeMap, BTreeSet},
    ffi::OsStr,
    fmt, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Deserialize;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use super::{Site, SiteCatalog};
use crate::{
    domain::{
        AuthRoutes, ComponentRef, Config, InvalidNameError, LayoutMap, ModuleName, ModulePolicy,
        ProtectedRoute, RouteNode, SiteName,
    },
    module::{Module, ModuleCatalog},
};

/// An error reading a single manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// The manifest.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// The file is not a valid manifest.
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        /// The manifest.
        path: PathBuf,
        /// The underlying error.
        source: toml::de::Error,
    },

    /// The name derived from the file's location is not a valid name.
    #[error("invalid name for {}: {source}", .path.display())]
    Name {
        /// The manifest.
        path: PathBuf,
        /// The underlying error.
        source: InvalidNameError,
    },
}

/// Every manifest that failed to load.
#[derive(Debug, thiserror::Error)]
pub struct CatalogLoadError(pub Vec<ManifestError>);

impl fmt::Display for CatalogLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} invalid manifest(s)", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  {error}")?;
        }
        Ok(())
    }
}

/// A site declared in `site.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteManifest {
    name: SiteName,
    file: SiteFile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct SiteFile {
    #[serde(default)]
    modules: Vec<ModuleName>,
    #[serde(default)]
    layouts: LayoutMap,
    #[serde(default)]
    routes: Vec<RouteNode>,
    #[serde(default)]
    auth: AuthRoutes,
}

impl SiteManifest {
    /// Parses a site manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is not a valid site manifest.
    pub fn parse(name: SiteName, content: &str) -> Result<Self, toml::de::Error> {
        Ok(Self {
            name,
            file: toml::from_str(content)?,
        })
    }

    /// Reads `site.toml` from a site directory, naming the site after the
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// directory name is not a valid site name.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let name = path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = SiteName::new(name).map_err(|source| ManifestError::Name {
            path: path.to_path_buf(),
            source,
        })?;
        let content = read(path)?;
        Self::parse(name, &content).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Site for SiteManifest {
    fn name(&self) -> &SiteName {
        &self.name
    }

    fn modules(&self) -> &[ModuleName] {
        &self.file.modules
    }

    fn layouts(&self) -> LayoutMap {
        self.file.layouts.clone()
    }

    fn routes(&self) -> Vec<RouteNode> {
        self.file.routes.clone()
    }

    fn auth(&self) -> AuthRoutes {
        self.file.auth.clone()
    }
}

/// The `[policy]` table of a module manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyManifest {
    /// Module-relative paths that are always accessible.
    #[serde(default)]
    pub public_routes: Vec<String>,

    /// Module-relative paths with access rules.
    #[serde(default)]
    pub protected_routes: BTreeMap<String, ProtectedRoute>,

    /// Redirect targets.
    #[serde(default)]
    pub auth: AuthRoutes,
}

impl PolicyManifest {
    /// Builds the module policy this table describes.
    #[must_use]
    pub fn to_policy(&self, module_name: ModuleName) -> ModulePolicy {
        let policy = self
            .public_routes
            .iter()
            .fold(ModulePolicy::new(module_name), |policy, path| policy.public(path));
        self.protected_routes
            .iter()
            .fold(policy, |policy, (path, route)| policy.protect(path, route.clone()))
            .with_auth(self.auth.clone())
    }
}

/// A module declared in a `<name>.toml` manifest.
#[derive(Debug, Clone)]
pub struct ModuleManifest {
    name: ModuleName,
    file: ModuleFile,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModuleFile {
    #[serde(default)]
    dependencies: Vec<ModuleName>,
    #[serde(default)]
    submodules: Vec<ModuleName>,
    #[serde(default)]
    route_prefix: Option<String>,
    #[serde(default)]
    layouts: LayoutMap,
    #[serde(default)]
    routes: Vec<RouteNode>,
    #[serde(default)]
    policy: Option<PolicyManifest>,
}

impl ModuleManifest {
    /// Parses a module manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is not a valid module manifest.
    pub fn parse(name: ModuleName, content: &str) -> Result<Self, toml::de::Error> {
        Ok(Self {
            name,
            file: toml::from_str(content)?,
        })
    }

    /// Reads a module manifest, naming the module after the file stem.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the file
    /// stem is not a valid module name.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = ModuleName::new(name).map_err(|source| ManifestError::Name {
            path: path.to_path_buf(),
            source,
        })?;
        let content = read(path)?;
        Self::parse(name, &content).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Module for ModuleManifest {
    fn name(&self) -> &ModuleName {
        &self.name
    }

    fn dependencies(&self) -> &[ModuleName] {
        &self.file.dependencies
    }

    fn submodules(&self) -> &[ModuleName] {
        &self.file.submodules
    }

    fn layouts(&self) -> LayoutMap {
        self.file.layouts.clone()
    }

    fn routes(&self) -> Vec<RouteNode> {
        self.file.routes.clone()
    }

    fn route_prefix(&self) -> Option<&str> {
        self.file.route_prefix.as_deref()
    }

    fn policy(&self) -> Option<ModulePolicy> {
        self.file
            .policy
            .as_ref()
            .map(|policy| policy.to_policy(self.name.clone()))
    }
}

/// Site and module catalogs loaded from a project directory.
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    /// Every site found under the sites directory.
    pub sites: SiteCatalog,
    /// Every module found under the modules directory.
    pub modules: ModuleCatalog,
}

impl Catalogs {
    /// Loads every manifest beneath `root`, parsing files in parallel.
    ///
    /// Sites are read from `{sites_dir}/*/site.toml` and modules from any
    /// `*.toml` file beneath `modules_dir`. Missing directories are treated
    /// as empty.
    ///
    /// # Errors
    ///
    /// Returns every manifest that failed to load.
    #[instrument(skip(config))]
    pub fn load(root: &Path, config: &Config) -> Result<Self, CatalogLoadError> {
        let site_paths = collect_paths(&root.join(&config.sites_dir), 2, Some(2), |path| {
            path.file_name() == Some(OsStr::new("site.toml"))
        });
        let module_paths = collect_paths(&root.join(&config.modules_dir), 1, None, |path| {
            path.extension() == Some(OsStr::new("toml"))
        });
        debug!(
            sites = site_paths.len(),
            modules = module_paths.len(),
            "loading manifests"
        );

        let (sites, site_errors): (Vec<_>, Vec<_>) = site_paths
            .par_iter()
            .map(|path| SiteManifest::load(path))
            .partition(Result::is_ok);
        let (modules, module_errors): (Vec<_>, Vec<_>) = module_paths
            .par_iter()
            .map(|path| ModuleManifest::load(path))
            .partition(Result::is_ok);

        let errors: Vec<_> = site_errors
            .into_iter()
            .filter_map(Result::err)
            .chain(module_errors.into_iter().filter_map(Result::err))
            .collect();
        if !errors.is_empty() {
            return Err(CatalogLoadError(errors));
        }

        let mut catalogs = Self::default();
        catalogs.sites.extend(
            sites
                .into_iter()
                .filter_map(Result::ok)
                .map(|site| Arc::new(site) as Arc<dyn Site>),
        );
        catalogs.modules.extend(
            modules
                .into_iter()
                .filter_map(Result::ok)
                .map(|module| Arc::new(module) as Arc<dyn Module>),
        );
        Ok(catalogs)
    }

    /// Every component key referenced by a route in either catalog.
    #[must_use]
    pub fn component_refs(&self) -> BTreeSet<ComponentRef> {
        fn collect(nodes: &[RouteNode], refs: &mut BTreeSet<ComponentRef>) {
            for node in nodes {
                refs.extend(node.component.iter().cloned());
                collect(&node.children, refs);
            }
        }

        let mut refs = BTreeSet::new();
        for name in self.sites.names() {
            if let Some(site) = self.sites.get(name) {
                collect(&site.routes(), &mut refs);
            }
        }
        for module in self.modules.iter() {
            collect(&module.routes(), &mut refs);
        }
        refs
    }
}

fn read(path: &Path) -> Result<String, ManifestError> {
    std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn collect_paths(
    dir: &Path,
    min_depth: usize,
    max_depth: Option<usize>,
    keep: impl Fn(&Path) -> bool,
) -> Vec<PathBuf> {
    let mut walk = WalkDir::new(dir).min_depth(min_depth).sort_by_file_name();
    if let Some(depth) = max_depth {
        walk = walk.max_depth(depth);
    }
    walk.into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && keep(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect()
}
