//! Hierarchical authorization registry.
//!
//! The [`PolicyProcessor`] keeps three views of the registered
//! configuration:
//! - a per-site hierarchy keyed by [`ModulePath`], whose parent links are the
//!   path's ancestors;
//! - a flat map of [`ModulePolicy`] keyed by module name (last registration
//!   wins);
//! - site-level redirect targets.
//!
//! No lookup here fails. Anything missing degrades to a permissive decision
//! or to a literal default route such as `/{site}/auth/login`.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::domain::{
    AccessDecision, AuthRoutes, FailedPolicy, ModuleName, ModulePath, ModulePolicy,
    PolicyContext, PolicyMode, ProtectedRoute, RedirectPurpose, SiteName, User,
    route::normalize_relative,
};

/// A module's position in a site's hierarchy.
#[derive(Debug, Clone)]
pub struct HierarchyEntry {
    /// The module's parent, `None` for root modules.
    pub parent: Option<ModulePath>,
    /// The configuration registered for this position.
    pub config: Option<ModulePolicy>,
}

/// Registry of authorization configuration.
#[derive(Debug, Clone, Default)]
pub struct PolicyProcessor {
    hierarchy: BTreeMap<SiteName, BTreeMap<ModulePath, HierarchyEntry>>,
    module_configs: BTreeMap<ModuleName, ModulePolicy>,
    site_auth: BTreeMap<SiteName, AuthRoutes>,
}

impl PolicyProcessor {
    /// Inserts or replaces the hierarchy entry for the module at `path`.
    pub fn register_module_hierarchy(
        &mut self,
        site: &SiteName,
        path: &ModulePath,
        config: Option<ModulePolicy>,
    ) {
        debug!(%site, %path, configured = config.is_some(), "registering module hierarchy");
        let entry = HierarchyEntry {
            parent: path.parent().filter(|parent| !parent.is_root()),
            config: config.map(ModulePolicy::normalized),
        };
        self.hierarchy
            .entry(site.clone())
            .or_default()
            .insert(path.clone(), entry);
    }

    /// Stores or replaces the flat configuration for a module.
    pub fn register_module(&mut self, config: ModulePolicy) {
        debug!(module = %config.module_name, "registering module policy");
        self.module_configs
            .insert(config.module_name.clone(), config.normalized());
    }

    /// Stores the site-level redirect targets.
    pub fn register_site_auth_config(&mut self, site: &SiteName, auth: AuthRoutes) {
        debug!(%site, "registering site auth config");
        self.site_auth.insert(site.clone(), auth);
    }

    /// The hierarchy entry at `path`, if registered.
    #[must_use]
    pub fn hierarchy_entry(&self, site: &SiteName, path: &ModulePath) -> Option<&HierarchyEntry> {
        self.hierarchy.get(site)?.get(path)
    }

    /// The flat configuration for `module`, if registered.
    #[must_use]
    pub fn module_config(&self, module: &ModuleName) -> Option<&ModulePolicy> {
        self.module_configs.get(module)
    }

    /// Decides whether `user` may access `relative_path` of `module`, using
    /// the module's flat configuration.
    ///
    /// Public paths are allowed. A protected path is decided by its rules.
    /// Unconfigured paths and unknown modules are allowed.
    #[must_use]
    pub fn evaluate_access(
        &self,
        module: &ModuleName,
        relative_path: &str,
        user: Option<&User>,
        site: &SiteName,
        context: &PolicyContext,
    ) -> AccessDecision {
        self.module_configs.get(module).map_or_else(AccessDecision::allowed, |config| {
            evaluate(config, relative_path, user, site, context)
        })
    }

    /// Same as [`Self::evaluate_access`], but prefers the configuration
    /// registered at `path` in the hierarchy, falling back to the flat
    /// configuration of the path's innermost module.
    #[must_use]
    pub fn evaluate_access_at(
        &self,
        site: &SiteName,
        path: &ModulePath,
        relative_path: &str,
        user: Option<&User>,
        context: &PolicyContext,
    ) -> AccessDecision {
        self.config_at(site, path)
            .map_or_else(AccessDecision::allowed, |config| {
                evaluate(config, relative_path, user, site, context)
            })
    }

    /// Whether `relative_path` of the module at `path` has a protected entry.
    #[must_use]
    pub fn is_protected_at(&self, site: &SiteName, path: &ModulePath, relative_path: &str) -> bool {
        self.config_at(site, path).is_some_and(|config| {
            config
                .protected_routes
                .contains_key(&normalize_relative(relative_path))
        })
    }

    /// Resolves the redirect target for `purpose` from the module at `path`.
    ///
    /// The walk checks, from the module outwards to the root: the hierarchy
    /// entry's configuration, then the flat configuration of that module
    /// name. It then checks the site's auth config and finally falls back to
    /// a literal default. `{site}` and `{attribute}` placeholders in the
    /// result are filled from the site name and `context`.
    #[must_use]
    pub fn get_redirect_route(
        &self,
        site: &SiteName,
        path: &ModulePath,
        purpose: RedirectPurpose,
        context: &PolicyContext,
    ) -> String {
        let route = self
            .find_in_hierarchy(site, path, purpose)
            .or_else(|| self.site_auth.get(site)?.get(purpose))
            .map_or_else(|| default_route(site, purpose), str::to_owned);
        expand(&route, site, context)
    }

    /// Resolves where to send a user after signing in from `relative_path`
    /// of the module at `path`.
    ///
    /// This is the home route found by the same walk as
    /// [`Self::get_redirect_route`]; `{from}` in it is replaced by
    /// `relative_path`.
    #[must_use]
    pub fn get_post_login_redirect(
        &self,
        site: &SiteName,
        path: &ModulePath,
        relative_path: &str,
    ) -> String {
        let context = PolicyContext::default().with("from", normalize_relative(relative_path));
        self.get_redirect_route(site, path, RedirectPurpose::Home, &context)
    }

    /// Removes all registered configuration.
    pub fn clear(&mut self) {
        self.hierarchy.clear();
        self.module_configs.clear();
        self.site_auth.clear();
    }

    fn config_at(&self, site: &SiteName, path: &ModulePath) -> Option<&ModulePolicy> {
        self.hierarchy_entry(site, path)
            .and_then(|entry| entry.config.as_ref())
            .or_else(|| self.module_configs.get(path.leaf()?))
    }

    fn find_in_hierarchy(
        &self,
        site: &SiteName,
        path: &ModulePath,
        purpose: RedirectPurpose,
    ) -> Option<&str> {
        let mut current = Some(path.clone()).filter(|path| !path.is_root());
        while let Some(path) = current {
            let entry = self.hierarchy_entry(site, &path);
            let own = entry
                .and_then(|entry| entry.config.as_ref())
                .and_then(|config| config.auth.get(purpose));
            let flat = || {
                path.leaf()
                    .and_then(|name| self.module_configs.get(name))
                    .and_then(|config| config.auth.get(purpose))
            };
            if let Some(route) = own.or_else(flat) {
                trace!(%site, %path, %purpose, route, "resolved redirect");
                return Some(route);
            }
            current = match entry {
                Some(entry) => entry.parent.clone(),
                None => path.parent().filter(|parent| !parent.is_root()),
            };
        }
        None
    }
}

fn evaluate(
    config: &ModulePolicy,
    relative_path: &str,
    user: Option<&User>,
    site: &SiteName,
    context: &PolicyContext,
) -> AccessDecision {
    let relative_path = normalize_relative(relative_path);
    if config.public_routes.contains(&relative_path) {
        return AccessDecision::allowed();
    }
    config
        .protected_routes
        .get(&relative_path)
        .map_or_else(AccessDecision::allowed, |route| {
            evaluate_route(route, user, site, context)
        })
}

fn evaluate_route(
    route: &ProtectedRoute,
    user: Option<&User>,
    site: &SiteName,
    context: &PolicyContext,
) -> AccessDecision {
    if route.policies.is_empty() {
        return if route.allow {
            AccessDecision::allowed()
        } else {
            AccessDecision::denied(route.redirect_to.clone(), None)
        };
    }

    let mut first_failure = None;
    for (index, rule) in route.policies.iter().enumerate() {
        let passed = rule.evaluate(user, site, context);
        match (route.mode, passed) {
            (PolicyMode::Any, true) => return AccessDecision::allowed(),
            (PolicyMode::All, false) => {
                return AccessDecision::denied(
                    route.redirect_to.clone(),
                    Some(FailedPolicy {
                        index,
                        kind: rule.kind(),
                    }),
                );
            }
            (PolicyMode::Any, false) => {
                first_failure.get_or_insert(FailedPolicy {
                    index,
                    kind: rule.kind(),
                });
            }
            (PolicyMode::All, true) => {}
        }
    }

    match route.mode {
        PolicyMode::All => AccessDecision::allowed(),
        PolicyMode::Any => AccessDecision::denied(route.redirect_to.clone(), first_failure),
    }
}

fn default_route(site: &SiteName, purpose: RedirectPurpose) -> String {
    match purpose {
        RedirectPurpose::Home => format!("/{site}"),
        purpose => format!("/{site}/auth/{purpose}"),
    }
}

fn expand(route: &str, site: &SiteName, context: &PolicyContext) -> String {
    if !route.contains('{') {
        return route.to_owned();
    }
    context.iter().fold(
        route.replace("{site}", site.as_str()),
        |route, (key, value)| route.replace(&format!("{{{key}}}"), value),
    )
}
