//! The compiled router and navigation.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::Serialize;

use super::component::LazyComponent;
use crate::{
    domain::{
        ComponentRef, LayoutRef, ModulePath, PolicyContext, RedirectPurpose, SiteName, User,
    },
    registry::PolicyProcessor,
};

/// Routes every router can render without any registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Builtin {
    /// The landing page.
    Home,
    /// Shown when nothing else matches.
    NotFound,
}

/// Rendered in place of a page that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPlaceholder {
    /// The component that was requested, if any.
    pub component: Option<ComponentRef>,
    /// What went wrong.
    pub message: String,
}

/// What a route renders.
#[derive(Debug, Clone)]
pub enum Element {
    /// A lazily loaded page.
    Page(Arc<LazyComponent>),
    /// The route's layout wrapping its child routes.
    Layout(Vec<CompiledRoute>),
    /// A page that could not be resolved.
    Error(ErrorPlaceholder),
    /// A built-in page.
    Builtin(Builtin),
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page(page) => write!(f, "{}", page.key()),
            Self::Layout(children) => write!(f, "layout ({} children)", children.len()),
            Self::Error(error) => write!(f, "error: {}", error.message),
            Self::Builtin(Builtin::Home) => f.write_str("home"),
            Self::Builtin(Builtin::NotFound) => f.write_str("not found"),
        }
    }
}

/// Authorization check run before a route renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    /// The site the route belongs to.
    pub site: SiteName,
    /// The module the route belongs to.
    pub module_path: ModulePath,
    /// The route's path within its module.
    pub relative_path: String,
    /// Whether an anonymous user is turned away regardless of policy.
    pub requires_auth: bool,
}

impl Guard {
    /// Returns where to send `user` instead of rendering, or `None` if the
    /// route may render.
    ///
    /// A denial goes to the protected entry's own redirect when it has one,
    /// otherwise to the login route for anonymous users and to the
    /// unauthorized route for signed-in ones. `{from}` in either resolves to
    /// `path`.
    #[must_use]
    pub fn check(
        &self,
        path: &str,
        user: Option<&User>,
        context: &PolicyContext,
        policies: &PolicyProcessor,
    ) -> Option<String> {
        let decision = policies.evaluate_access_at(
            &self.site,
            &self.module_path,
            &self.relative_path,
            user,
            context,
        );
        if decision.allow && (user.is_some() || !self.requires_auth) {
            return None;
        }
        if !decision.allow {
            if let Some(target) = decision.redirect_to {
                return Some(target);
            }
        }

        let purpose = if user.is_none() {
            RedirectPurpose::Login
        } else {
            RedirectPurpose::Unauthorized
        };
        let context = context.clone().with("from", path);
        Some(policies.get_redirect_route(&self.site, &self.module_path, purpose, &context))
    }
}

/// A route ready to render.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    /// Absolute path pattern. Segments starting with `:` capture one
    /// segment and a final `*` captures the rest.
    pub path: String,
    /// The owning site; `None` for built-in routes.
    pub site: Option<SiteName>,
    /// The owning module.
    pub module_path: ModulePath,
    /// Path within the owning module.
    pub relative_path: String,
    /// Layout wrapping the element.
    pub layout: Option<LayoutRef>,
    /// Check run before rendering.
    pub guard: Option<Guard>,
    /// What renders.
    pub element: Element,
}

impl CompiledRoute {
    fn builtin(path: &str, builtin: Builtin) -> Self {
        Self {
            path: path.to_owned(),
            site: None,
            module_path: ModulePath::root(),
            relative_path: String::new(),
            layout: None,
            guard: None,
            element: Element::Builtin(builtin),
        }
    }

    /// The catch-all route rendering [`Builtin::NotFound`].
    #[must_use]
    pub fn not_found() -> Self {
        Self::builtin("*", Builtin::NotFound)
    }

    /// This route followed by its descendants, depth-first.
    pub fn walk(&self) -> Box<dyn Iterator<Item = &Self> + '_> {
        let children: &[Self] = match &self.element {
            Element::Layout(children) => children,
            _ => &[],
        };
        Box::new(std::iter::once(self).chain(children.iter().flat_map(Self::walk)))
    }
}

/// Values captured from `:name` and `*` segments.
pub type Params = BTreeMap<String, String>;

/// The outcome of a navigation.
#[derive(Debug)]
pub enum Navigation<'a> {
    /// Render a route.
    Render {
        /// The matched route.
        route: &'a CompiledRoute,
        /// Captured path parameters.
        params: Params,
    },
    /// Go somewhere else instead.
    Redirect(String),
    /// Nothing matched.
    NotFound,
}

/// The compiled route table.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<CompiledRoute>,
}

impl Router {
    /// A router over `routes`, matched in order.
    #[must_use]
    pub const fn new(routes: Vec<CompiledRoute>) -> Self {
        Self { routes }
    }

    /// The degraded router used when booting fails: a home page and a
    /// catch-all not-found page.
    #[must_use]
    pub fn fallback() -> Self {
        Self::new(vec![
            CompiledRoute::builtin("/", Builtin::Home),
            CompiledRoute::not_found(),
        ])
    }

    /// Top-level routes in match order.
    #[must_use]
    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }

    /// Every route, depth-first.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledRoute> {
        self.routes.iter().flat_map(CompiledRoute::walk)
    }

    /// Number of top-level routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the router has no routes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolves `path` for `user`.
    ///
    /// The first matching route wins; children of a layout are tried before
    /// the layout itself. Guards run from the outermost layout inwards and
    /// the first one to refuse decides the redirect.
    #[must_use]
    pub fn navigate(
        &self,
        path: &str,
        user: Option<&User>,
        context: &PolicyContext,
        policies: &PolicyProcessor,
    ) -> Navigation<'_> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut chain = Vec::new();
        let Some((route, params)) = find(&self.routes, &segments, &mut chain) else {
            return Navigation::NotFound;
        };
        if matches!(route.element, Element::Builtin(Builtin::NotFound)) {
            return Navigation::NotFound;
        }

        for guard in chain
            .iter()
            .chain(std::iter::once(&route))
            .filter_map(|route| route.guard.as_ref())
        {
            if let Some(target) = guard.check(path, user, context, policies) {
                return Navigation::Redirect(target);
            }
        }
        Navigation::Render { route, params }
    }
}

fn find<'a>(
    routes: &'a [CompiledRoute],
    segments: &[&str],
    chain: &mut Vec<&'a CompiledRoute>,
) -> Option<(&'a CompiledRoute, Params)> {
    for route in routes {
        if let Element::Layout(children) = &route.element {
            chain.push(route);
            if let Some(found) = find(children, segments, chain) {
                return Some(found);
            }
            chain.pop();
        }
        if let Some(params) = match_path(&route.path, segments) {
            return Some((route, params));
        }
    }
    None
}

fn match_path(pattern: &str, segments: &[&str]) -> Option<Params> {
    let mut params = Params::new();
    let mut pattern = pattern.split('/').filter(|s| !s.is_empty());
    let mut remaining = segments.iter();

    loop {
        match (pattern.next(), remaining.next()) {
            (None, None) => return Some(params),
            (Some("*"), first) => {
                let rest: Vec<&str> = first.into_iter().chain(remaining).copied().collect();
                params.insert("*".to_owned(), rest.join("/"));
                return Some(params);
            }
            (Some(expected), Some(actual)) => {
                if let Some(name) = expected.strip_prefix(':') {
                    params.insert(name.to_owned(), (*actual).to_owned());
                } else if expected != *actual {
                    return None;
                }
            }
            _ => return None,
        }
    }
}
