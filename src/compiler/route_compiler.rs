use std::{collections::BTreeMap, sync::Arc};

use tracing::{debug, instrument, warn};

use super::{
    component::{ComponentError, ComponentRegistry, LazyComponent},
    router::{CompiledRoute, Element, ErrorPlaceholder, Guard, Router},
};
use crate::{
    domain::{ComponentRef, LayoutMap, LayoutRef, RouteRecord, SiteName},
    registry::{PolicyProcessor, RouteTree},
};

/// Turns a populated [`RouteTree`] into a [`Router`].
///
/// Lazy components are memoized per key for the lifetime of the compiler,
/// so recompiling after a reload reuses components that were already
/// loaded.
#[derive(Debug)]
pub struct RouteCompiler<'a> {
    components: &'a ComponentRegistry,
    cache: BTreeMap<ComponentRef, Arc<LazyComponent>>,
}

impl<'a> RouteCompiler<'a> {
    /// A compiler resolving pages from `components`.
    #[must_use]
    pub const fn new(components: &'a ComponentRegistry) -> Self {
        Self {
            components,
            cache: BTreeMap::new(),
        }
    }

    /// Compiles every route in `tree`, followed by a catch-all not-found
    /// route.
    ///
    /// The layout of a top-level route is, in order of preference: its own
    /// `layout`, the override for its `module_name`, then the override for
    /// the nearest module on its install path. Overrides are looked up in
    /// the layouts the module was installed with and then in the entry of
    /// `layouts` for the route's own site.
    /// Nested routes only take their own `layout` or `module_name` override.
    ///
    /// A route is guarded if it or an ancestor is marked protected, or if
    /// its module has a protected entry for it. Pages whose component cannot
    /// be resolved compile to an error placeholder without affecting their
    /// siblings.
    #[instrument(level = "debug", skip_all)]
    pub fn compile(
        &mut self,
        tree: &RouteTree,
        policies: &PolicyProcessor,
        layouts: &BTreeMap<SiteName, LayoutMap>,
    ) -> Router {
        let mut routes: Vec<_> = tree
            .get_all_routes()
            .iter()
            .map(|record| {
                let installed = tree
                    .module(&record.site, &record.module_path)
                    .map(|entry| entry.inherited_layouts());
                let scope = LayoutScope {
                    installed,
                    site: layouts.get(&record.site),
                    top_level: true,
                };
                self.compile_record(record, policies, &scope, false)
            })
            .collect();
        routes.push(CompiledRoute::not_found());
        debug!(count = routes.len(), "compiled routes");
        Router::new(routes)
    }

    fn compile_record(
        &mut self,
        record: &RouteRecord,
        policies: &PolicyProcessor,
        scope: &LayoutScope<'_>,
        inherited_protection: bool,
    ) -> CompiledRoute {
        let protected = inherited_protection || record.protected;
        let guarded = protected
            || policies.is_protected_at(&record.site, &record.module_path, &record.relative_path);
        let guard = guarded.then(|| Guard {
            site: record.site.clone(),
            module_path: record.module_path.clone(),
            relative_path: record.relative_path.clone(),
            requires_auth: protected,
        });

        let element = if record.children.is_empty() {
            self.page(record)
        } else {
            let nested = LayoutScope {
                top_level: false,
                ..*scope
            };
            Element::Layout(
                record
                    .children
                    .iter()
                    .map(|child| self.compile_record(child, policies, &nested, protected))
                    .collect(),
            )
        };

        CompiledRoute {
            path: record.path.clone(),
            site: Some(record.site.clone()),
            module_path: record.module_path.clone(),
            relative_path: record.relative_path.clone(),
            layout: record.layout.clone().or_else(|| scope.resolve(record)),
            guard,
            element,
        }
    }

    fn page(&mut self, record: &RouteRecord) -> Element {
        let Some(key) = &record.component else {
            warn!(path = %record.path, "route has neither a component nor children");
            return Element::Error(ErrorPlaceholder {
                component: None,
                message: "route declares no component".to_owned(),
            });
        };
        if let Some(lazy) = self.cache.get(key) {
            return Element::Page(Arc::clone(lazy));
        }
        let Some(factory) = self.components.resolve(key) else {
            let error = ComponentError::Unresolved(key.clone());
            warn!(path = %record.path, %error, "rendering error placeholder");
            return Element::Error(ErrorPlaceholder {
                component: Some(key.clone()),
                message: error.to_string(),
            });
        };
        let lazy = Arc::new(LazyComponent::new(key.clone(), factory));
        self.cache.insert(key.clone(), Arc::clone(&lazy));
        Element::Page(lazy)
    }
}

#[derive(Clone, Copy)]
struct LayoutScope<'a> {
    installed: Option<&'a LayoutMap>,
    site: Option<&'a LayoutMap>,
    top_level: bool,
}

impl LayoutScope<'_> {
    fn lookup(&self, module: &str) -> Option<LayoutRef> {
        self.installed
            .and_then(|layouts| layouts.get(module))
            .or_else(|| self.site.and_then(|layouts| layouts.get(module)))
            .cloned()
    }

    fn resolve(&self, record: &RouteRecord) -> Option<LayoutRef> {
        if let Some(layout) = record
            .module_name
            .as_ref()
            .and_then(|name| self.lookup(name.as_str()))
        {
            return Some(layout);
        }
        if !self.top_level {
            return None;
        }
        record
            .module_path
            .ancestry()
            .find_map(|path| path.leaf().and_then(|name| self.lookup(name.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::{
        compiler::router::Navigation,
        domain::{ModuleName, ModulePath, PolicyContext, RouteNode, SiteName, User},
        registry::{Parent, RegisterOptions},
    };

    fn site() -> SiteName {
        SiteName::new("zoomy").unwrap()
    }

    fn register(
        tree: &mut RouteTree,
        module: &str,
        parent: &str,
        routes: Vec<RouteNode>,
        layouts: &LayoutMap,
    ) {
        let parent: ModulePath = parent.parse().unwrap();
        let parent = if parent.is_root() {
            Parent::Root
        } else {
            Parent::At(parent)
        };
        tree.register_module_routes(
            &ModuleName::new(module).unwrap(),
            &routes,
            &site(),
            &parent,
            layouts,
            &RegisterOptions::default(),
        )
        .unwrap();
    }

    fn layouts(entries: &[(&str, &str)]) -> LayoutMap {
        entries
            .iter()
            .map(|(module, layout)| ((*module).to_string(), LayoutRef::new(*layout)))
            .collect()
    }

    fn layout_of(router: &Router, path: &str) -> Option<String> {
        router
            .iter()
            .find(|route| route.path == path)
            .and_then(|route| route.layout.as_ref())
            .map(|layout| layout.as_str().to_owned())
    }

    #[test]
    fn layouts_follow_priority() {
        let mut tree = RouteTree::default();
        let installed = layouts(&[("admin", "AdminLayout"), ("auth", "AuthLayout")]);
        register(
            &mut tree,
            "admin",
            "",
            vec![
                RouteNode::page("dashboard", "admin/Dashboard"),
                RouteNode::page("settings", "admin/Settings").with_layout("SettingsLayout"),
            ],
            &installed,
        );
        register(
            &mut tree,
            "auth",
            "admin",
            vec![RouteNode::page("login", "auth/Login")],
            &installed,
        );
        register(
            &mut tree,
            "reports",
            "admin",
            vec![
                RouteNode::page("daily", "reports/Daily"),
                RouteNode::page("signin", "reports/SignIn").with_module(ModuleName::new("auth").unwrap()),
            ],
            &installed,
        );
        let registry = ComponentRegistry::default();

        let router = RouteCompiler::new(&registry).compile(
            &tree,
            &PolicyProcessor::default(),
            &BTreeMap::new(),
        );

        assert_eq!(layout_of(&router, "/zoomy/admin/settings").as_deref(), Some("SettingsLayout"));
        assert_eq!(layout_of(&router, "/zoomy/admin/dashboard").as_deref(), Some("AdminLayout"));
        assert_eq!(layout_of(&router, "/zoomy/admin/auth/login").as_deref(), Some("AuthLayout"));
        assert_eq!(
            layout_of(&router, "/zoomy/admin/reports/daily").as_deref(),
            Some("AdminLayout")
        );
        assert_eq!(
            layout_of(&router, "/zoomy/admin/reports/signin").as_deref(),
            Some("AuthLayout")
        );
    }

    #[test]
    fn site_layouts_apply_only_to_their_own_site() {
        let mut tree = RouteTree::default();
        let partners = SiteName::new("partners").unwrap();
        for name in [site(), partners.clone()] {
            tree.register_site_routes(
                &name,
                &[RouteNode::page("", format!("{name}/Home"))
                    .with_module(ModuleName::new("landing").unwrap())],
            );
        }
        let registry = ComponentRegistry::default();

        let router = RouteCompiler::new(&registry).compile(
            &tree,
            &PolicyProcessor::default(),
            &BTreeMap::from([(site(), layouts(&[("landing", "MarketingLayout")]))]),
        );

        assert_eq!(layout_of(&router, "/zoomy").as_deref(), Some("MarketingLayout"));
        assert_eq!(layout_of(&router, "/partners"), None);
    }

    #[test]
    fn unresolved_pages_do_not_affect_siblings() {
        let mut tree = RouteTree::default();
        register(
            &mut tree,
            "crm",
            "",
            vec![
                RouteNode::page("leads", "crm/Leads"),
                RouteNode::page("deals", "crm/Deals"),
                RouteNode::new("empty"),
            ],
            &LayoutMap::new(),
        );
        let registry = ComponentRegistry::default().with_static("crm/Leads");

        let router = RouteCompiler::new(&registry).compile(
            &tree,
            &PolicyProcessor::default(),
            &BTreeMap::new(),
        );
        let elements: Vec<_> = router.iter().map(|route| route.element.to_string()).collect();

        assert_eq!(
            elements,
            [
                "crm/Leads",
                "error: no component registered for 'crm/Deals'",
                "error: route declares no component",
                "not found",
            ]
        );
    }

    #[test]
    fn pages_share_one_lazy_component_per_key() {
        let mut tree = RouteTree::default();
        register(
            &mut tree,
            "crm",
            "",
            vec![
                RouteNode::page("leads", "crm/List"),
                RouteNode::page("deals", "crm/List"),
            ],
            &LayoutMap::new(),
        );
        let registry = ComponentRegistry::default().with_static("crm/List");

        let router = RouteCompiler::new(&registry).compile(
            &tree,
            &PolicyProcessor::default(),
            &BTreeMap::new(),
        );
        let pages: Vec<_> = router
            .iter()
            .filter_map(|route| match &route.element {
                Element::Page(page) => Some(Arc::clone(page)),
                _ => None,
            })
            .collect();

        assert_eq!(pages.len(), 2);
        assert!(Arc::ptr_eq(&pages[0], &pages[1]));
        assert_eq!(block_on(pages[0].load()).unwrap().name(), "crm/List");
        assert!(pages[1].is_loaded());
    }

    #[test]
    fn protection_is_inherited_by_children() {
        let mut tree = RouteTree::default();
        register(
            &mut tree,
            "admin",
            "",
            vec![RouteNode::new("")
                .protected()
                .with_children(vec![RouteNode::page("users", "admin/Users")])],
            &LayoutMap::new(),
        );
        let registry = ComponentRegistry::default().with_static("admin/Users");
        let policies = PolicyProcessor::default();

        let router = RouteCompiler::new(&registry).compile(&tree, &policies, &BTreeMap::new());
        let users = router
            .iter()
            .find(|route| route.path == "/zoomy/admin/users")
            .unwrap();

        assert!(users.guard.as_ref().is_some_and(|guard| guard.requires_auth));
        let context = PolicyContext::default();
        assert!(matches!(
            router.navigate("/zoomy/admin/users", None, &context, &policies),
            Navigation::Redirect(target) if target == "/zoomy/auth/login"
        ));
        assert!(matches!(
            router.navigate("/zoomy/admin/users", Some(&User::new("1")), &context, &policies),
            Navigation::Render { route, .. } if route.element.to_string() == "admin/Users"
        ));
    }
}
