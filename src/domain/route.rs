//! Route definitions and the flattened records produced from them.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use super::name::{ModuleName, ModulePath, SiteName};

macro_rules! opaque_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a key.
            #[must_use]
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Returns the key.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self::new(key)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_key! {
    /// Key of a page component in the [`ComponentRegistry`](crate::ComponentRegistry).
    ComponentRef
}

opaque_key! {
    /// Key of a layout shell wrapping a subtree of routes.
    LayoutRef
}

/// Layout bindings keyed by module name.
pub type LayoutMap = BTreeMap<String, LayoutRef>;

/// A route as declared by a site or module.
///
/// `path` is relative to the parent node. When `children` is non-empty it
/// takes precedence over `component`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteNode {
    /// Path segment(s) relative to the parent.
    #[serde(default)]
    pub path: String,

    /// Page rendered at this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ComponentRef>,

    /// Explicit layout for this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutRef>,

    /// Module whose layout override applies to this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<ModuleName>,

    /// Whether this node and its descendants require an authenticated user.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub protected: bool,

    /// Nested routes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RouteNode>,
}

impl RouteNode {
    /// A bare node at `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// A leaf node rendering `component` at `path`.
    #[must_use]
    pub fn page(path: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            component: Some(ComponentRef::new(component)),
            ..Self::new(path)
        }
    }

    /// Sets an explicit layout.
    #[must_use]
    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = Some(LayoutRef::new(layout));
        self
    }

    /// Sets the module whose layout override applies.
    #[must_use]
    pub fn with_module(mut self, module: ModuleName) -> Self {
        self.module_name = Some(module);
        self
    }

    /// Sets the nested routes.
    #[must_use]
    pub fn with_children(mut self, children: Vec<Self>) -> Self {
        self.children = children;
        self
    }

    /// Marks the node as requiring authentication.
    #[must_use]
    pub const fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Whether the node renders its children rather than a page.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        !self.children.is_empty()
    }
}

/// A route with its absolute path resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteRecord {
    /// Absolute path, e.g. `/zoomy/admin/auth/login`.
    pub path: String,

    /// Path relative to the owning module's mount point, without slashes at
    /// either end. Policy lookups use this.
    pub relative_path: String,

    /// Owning site.
    pub site: SiteName,

    /// Owning module; the root path for site base routes.
    pub module_path: ModulePath,

    /// Page rendered at this node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<ComponentRef>,

    /// Explicit layout for this node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutRef>,

    /// Module whose layout override applies to this node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_name: Option<ModuleName>,

    /// Whether this node is marked as requiring authentication.
    pub protected: bool,

    /// Nested records.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RouteRecord>,
}

impl RouteRecord {
    /// Iterates over this record and all of its descendants, depth-first.
    pub fn walk(&self) -> Box<dyn Iterator<Item = &Self> + '_> {
        Box::new(std::iter::once(self).chain(self.children.iter().flat_map(Self::walk)))
    }
}

/// Joins path segments into an absolute path.
///
/// Slashes at either end of each segment are ignored and empty segments are
/// skipped, so `["zoomy", "auth", ""]` becomes `/zoomy/auth`.
#[must_use]
pub fn join_path<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let mut path = String::new();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        path.push('/');
        path.push_str(segment);
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

/// Normalizes a module-relative path for lookups.
#[must_use]
pub fn normalize_relative(path: &str) -> String {
    path.trim_matches('/').to_owned()
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(&["zoomy", "auth", "login"], "/zoomy/auth/login" ; "plain")]
    #[test_case(&["zoomy", "auth", ""], "/zoomy/auth" ; "empty leaf")]
    #[test_case(&["/zoomy/", "/admin", "users/"], "/zoomy/admin/users" ; "stray slashes")]
    #[test_case(&[], "/" ; "nothing")]
    fn joins_segments(segments: &[&str], expected: &str) {
        assert_eq!(join_path(segments.iter().copied()), expected);
    }

    #[test]
    fn route_nodes_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Routes {
            routes: Vec<RouteNode>,
        }

        let parsed: Routes = toml::from_str(
            r#"
            [[routes]]
            path = "campaigns"
            layout = "CrmLayout"
            protected = true

            [[routes.children]]
            path = ""
            component = "crm/CampaignList"

            [[routes.children]]
            path = ":id"
            component = "crm/CampaignDetail"
            "#,
        )
        .unwrap();

        let node = &parsed.routes[0];
        assert!(node.is_branch());
        assert!(node.protected);
        assert_eq!(node.layout, Some(LayoutRef::new("CrmLayout")));
        assert_eq!(
            node.children[1].component,
            Some(ComponentRef::new("crm/CampaignDetail"))
        );
    }

    #[test]
    fn builders_compose() {
        let node = RouteNode::new("settings")
            .protected()
            .with_layout("AdminLayout")
            .with_children(vec![RouteNode::page("", "admin/Settings")]);

        assert!(node.protected);
        assert!(node.is_branch());
        assert_eq!(node.children[0].component.as_ref().unwrap().as_str(), "admin/Settings");
    }
}
