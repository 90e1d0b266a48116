//! Authorization policy configuration.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
    sync::Arc,
};

use serde::Deserialize;

use super::{
    name::{ModuleName, SiteName},
    route::normalize_relative,
};

/// The user an access decision is made for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    /// Opaque user identifier.
    pub id: String,
    /// Roles held by the user.
    pub roles: BTreeSet<String>,
    /// Permissions granted to the user.
    pub permissions: BTreeSet<String>,
}

impl User {
    /// A user with no roles or permissions.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Adds a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Adds a permission.
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }
}

/// Free-form attributes describing the request being authorized.
///
/// Attributes are also substituted into redirect targets: `{name}` in a
/// configured route is replaced by the attribute `name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyContext {
    attributes: BTreeMap<String, String>,
}

impl PolicyContext {
    /// Sets an attribute.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets an attribute in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Reads an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Iterates over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A predicate over the user, site and request context.
pub type Predicate = Arc<dyn Fn(Option<&User>, &SiteName, &PolicyContext) -> bool + Send + Sync>;

/// One authorization rule.
///
/// Rules loaded from configuration files take the shapes `{ allow = true }`,
/// `{ roles = [..] }` and `{ permissions = [..] }`. Callbacks can only be
/// registered in code.
#[derive(Clone, Deserialize)]
#[serde(from = "RuleSpec")]
pub enum PolicyRule {
    /// Grants or denies unconditionally.
    Allow(bool),
    /// Passes when the user holds any of the roles.
    Roles(BTreeSet<String>),
    /// Passes when the user holds every one of the permissions.
    Permissions(BTreeSet<String>),
    /// Passes when the predicate returns `true`.
    Callback(Predicate),
}

impl PolicyRule {
    /// A role rule.
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Roles(roles.into_iter().map(Into::into).collect())
    }

    /// A permission rule.
    pub fn permissions<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Permissions(permissions.into_iter().map(Into::into).collect())
    }

    /// A callback rule.
    pub fn callback<F>(predicate: F) -> Self
    where
        F: Fn(Option<&User>, &SiteName, &PolicyContext) -> bool + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(predicate))
    }

    /// Evaluates the rule. Anonymous users fail role and permission rules.
    #[must_use]
    pub fn evaluate(&self, user: Option<&User>, site: &SiteName, context: &PolicyContext) -> bool {
        match self {
            Self::Allow(allow) => *allow,
            Self::Roles(roles) => user.is_some_and(|user| !user.roles.is_disjoint(roles)),
            Self::Permissions(permissions) => {
                user.is_some_and(|user| permissions.is_subset(&user.permissions))
            }
            Self::Callback(predicate) => predicate(user, site, context),
        }
    }

    /// Short name of the rule's kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Allow(_) => "allow",
            Self::Roles(_) => "roles",
            Self::Permissions(_) => "permissions",
            Self::Callback(_) => "callback",
        }
    }
}

impl fmt::Debug for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow(allow) => f.debug_tuple("Allow").field(allow).finish(),
            Self::Roles(roles) => f.debug_tuple("Roles").field(roles).finish(),
            Self::Permissions(permissions) => {
                f.debug_tuple("Permissions").field(permissions).finish()
            }
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged, deny_unknown_fields)]
enum RuleSpec {
    Allow { allow: bool },
    Roles { roles: BTreeSet<String> },
    Permissions { permissions: BTreeSet<String> },
}

impl From<RuleSpec> for PolicyRule {
    fn from(spec: RuleSpec) -> Self {
        match spec {
            RuleSpec::Allow { allow } => Self::Allow(allow),
            RuleSpec::Roles { roles } => Self::Roles(roles),
            RuleSpec::Permissions { permissions } => Self::Permissions(permissions),
        }
    }
}

/// How the rules of a protected route combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Access is granted when any rule passes.
    #[default]
    Any,
    /// Access is granted only when every rule passes.
    All,
}

/// Authorization settings for one module-relative path.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtectedRoute {
    /// Decision used when `policies` is empty.
    #[serde(default)]
    pub allow: bool,

    /// Rules evaluated in order.
    #[serde(default)]
    pub policies: Vec<PolicyRule>,

    /// How `policies` combine.
    #[serde(default)]
    pub mode: PolicyMode,

    /// Where to send users who are denied.
    #[serde(default)]
    pub redirect_to: Option<String>,
}

impl ProtectedRoute {
    /// A route guarded by the given rules, combined with [`PolicyMode::Any`].
    #[must_use]
    pub fn with_policies(policies: Vec<PolicyRule>) -> Self {
        Self {
            policies,
            ..Self::default()
        }
    }

    /// Sets how rules combine.
    #[must_use]
    pub const fn mode(mut self, mode: PolicyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the redirect used on denial.
    #[must_use]
    pub fn redirect_to(mut self, route: impl Into<String>) -> Self {
        self.redirect_to = Some(route.into());
        self
    }
}

/// What a redirect is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RedirectPurpose {
    /// Sign-in page.
    Login,
    /// Sign-up page.
    Register,
    /// Landing page after sign-in.
    Home,
    /// Shown to signed-in users who are denied.
    Unauthorized,
}

impl RedirectPurpose {
    /// Every purpose.
    pub const ALL: [Self; 4] = [Self::Login, Self::Register, Self::Home, Self::Unauthorized];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::Home => "home",
            Self::Unauthorized => "unauthorized",
        }
    }
}

impl fmt::Display for RedirectPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`RedirectPurpose`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown redirect purpose '{0}' (expected login, register, home or unauthorized)")]
pub struct UnknownPurposeError(String);

impl FromStr for RedirectPurpose {
    type Err = UnknownPurposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|purpose| purpose.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownPurposeError(s.to_owned()))
    }
}

/// Redirect targets a module (or site) configures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthRoutes {
    /// Sign-in page.
    #[serde(default)]
    pub login_route: Option<String>,
    /// Sign-up page.
    #[serde(default)]
    pub register_route: Option<String>,
    /// Landing page after sign-in.
    #[serde(default)]
    pub home_route: Option<String>,
    /// Page for denied signed-in users.
    #[serde(default)]
    pub unauthorized_route: Option<String>,
}

impl AuthRoutes {
    /// The configured route for `purpose`.
    #[must_use]
    pub fn get(&self, purpose: RedirectPurpose) -> Option<&str> {
        match purpose {
            RedirectPurpose::Login => self.login_route.as_deref(),
            RedirectPurpose::Register => self.register_route.as_deref(),
            RedirectPurpose::Home => self.home_route.as_deref(),
            RedirectPurpose::Unauthorized => self.unauthorized_route.as_deref(),
        }
    }

    /// Sets the route for `purpose`.
    #[must_use]
    pub fn with(mut self, purpose: RedirectPurpose, route: impl Into<String>) -> Self {
        let route = Some(route.into());
        match purpose {
            RedirectPurpose::Login => self.login_route = route,
            RedirectPurpose::Register => self.register_route = route,
            RedirectPurpose::Home => self.home_route = route,
            RedirectPurpose::Unauthorized => self.unauthorized_route = route,
        }
        self
    }
}

/// A module's authorization configuration.
#[derive(Debug, Clone)]
pub struct ModulePolicy {
    /// The module this configuration belongs to.
    pub module_name: ModuleName,
    /// Module-relative paths that are always accessible.
    pub public_routes: BTreeSet<String>,
    /// Module-relative paths with access rules, keyed by exact path.
    pub protected_routes: BTreeMap<String, ProtectedRoute>,
    /// Redirect targets.
    pub auth: AuthRoutes,
}

impl ModulePolicy {
    /// An empty configuration for `module_name`.
    #[must_use]
    pub const fn new(module_name: ModuleName) -> Self {
        Self {
            module_name,
            public_routes: BTreeSet::new(),
            protected_routes: BTreeMap::new(),
            auth: AuthRoutes {
                login_route: None,
                register_route: None,
                home_route: None,
                unauthorized_route: None,
            },
        }
    }

    /// Marks a path as public.
    #[must_use]
    pub fn public(mut self, path: &str) -> Self {
        self.public_routes.insert(normalize_relative(path));
        self
    }

    /// Protects a path.
    #[must_use]
    pub fn protect(mut self, path: &str, route: ProtectedRoute) -> Self {
        self.protected_routes.insert(normalize_relative(path), route);
        self
    }

    /// Sets the redirect targets.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthRoutes) -> Self {
        self.auth = auth;
        self
    }

    /// Re-keys public and protected paths in normalized form.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            public_routes: self
                .public_routes
                .iter()
                .map(|path| normalize_relative(path))
                .collect(),
            protected_routes: self
                .protected_routes
                .into_iter()
                .map(|(path, route)| (normalize_relative(&path), route))
                .collect(),
            ..self
        }
    }
}

/// A rule that caused a denial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPolicy {
    /// Position of the rule in the route's policy list.
    pub index: usize,
    /// Kind of the rule, see [`PolicyRule::kind`].
    pub kind: &'static str,
}

impl fmt::Display for FailedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.index)
    }
}

/// The outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    /// Whether access is granted.
    pub allow: bool,
    /// Configured redirect for denied users.
    pub redirect_to: Option<String>,
    /// The first rule that failed, when one did.
    pub failed_policy: Option<FailedPolicy>,
}

impl AccessDecision {
    /// Access granted.
    #[must_use]
    pub const fn allowed() -> Self {
        Self {
            allow: true,
            redirect_to: None,
            failed_policy: None,
        }
    }

    /// Access denied.
    #[must_use]
    pub const fn denied(redirect_to: Option<String>, failed_policy: Option<FailedPolicy>) -> Self {
        Self {
            allow: false,
            redirect_to,
            failed_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn site() -> SiteName {
        SiteName::new("zoomy").unwrap()
    }

    #[test]
    fn roles_match_any_held_role() {
        let rule = PolicyRule::roles(["admin", "editor"]);
        let editor = User::new("u1").with_role("editor");
        let viewer = User::new("u2").with_role("viewer");

        assert!(rule.evaluate(Some(&editor), &site(), &PolicyContext::default()));
        assert!(!rule.evaluate(Some(&viewer), &site(), &PolicyContext::default()));
        assert!(!rule.evaluate(None, &site(), &PolicyContext::default()));
    }

    #[test]
    fn permissions_require_every_listed_permission() {
        let rule = PolicyRule::permissions(["leads.read", "leads.write"]);
        let reader = User::new("u1").with_permission("leads.read");
        let writer = reader.clone().with_permission("leads.write");

        assert!(!rule.evaluate(Some(&reader), &site(), &PolicyContext::default()));
        assert!(rule.evaluate(Some(&writer), &site(), &PolicyContext::default()));
    }

    #[test]
    fn callbacks_see_site_and_context() {
        let rule = PolicyRule::callback(|_, site, ctx| {
            site.as_str() == "zoomy" && ctx.get("tenant") == Some("acme")
        });

        let ctx = PolicyContext::default().with("tenant", "acme");
        assert!(rule.evaluate(None, &site(), &ctx));
        assert!(!rule.evaluate(None, &site(), &PolicyContext::default()));
    }

    #[test]
    fn protected_routes_deserialize_rule_shapes() {
        let route: ProtectedRoute = toml::from_str(
            r#"
            mode = "all"
            redirect_to = "/zoomy/upgrade"
            policies = [{ allow = true }, { roles = ["admin"] }, { permissions = ["ads.manage"] }]
            "#,
        )
        .unwrap();

        let kinds: Vec<_> = route.policies.iter().map(PolicyRule::kind).collect();
        assert_eq!(kinds, ["allow", "roles", "permissions"]);
        assert_eq!(route.mode, PolicyMode::All);
        assert_eq!(route.redirect_to.as_deref(), Some("/zoomy/upgrade"));
        assert!(!route.allow);
    }

    #[test_case(r#"[{ allow = true, roles = ["admin"] }]"#; "allow with roles")]
    #[test_case(r#"[{ roles = ["admin"], permissions = ["ads.manage"] }]"#; "roles with permissions")]
    #[test_case(r#"[{ role = ["admin"] }]"#; "misspelt key")]
    fn mixed_rule_keys_are_rejected(policies: &str) {
        let result = toml::from_str::<ProtectedRoute>(&format!("policies = {policies}"));
        assert!(result.is_err());
    }

    #[test_case("login", RedirectPurpose::Login)]
    #[test_case("Register", RedirectPurpose::Register)]
    #[test_case("HOME", RedirectPurpose::Home)]
    #[test_case("unauthorized", RedirectPurpose::Unauthorized)]
    fn parses_purposes(input: &str, expected: RedirectPurpose) {
        assert_eq!(input.parse::<RedirectPurpose>().unwrap(), expected);
    }

    #[test]
    fn unknown_purpose_is_an_error() {
        assert!("logout".parse::<RedirectPurpose>().is_err());
    }

    #[test]
    fn module_policy_normalizes_paths() {
        let policy = ModulePolicy::new(ModuleName::new("crm").unwrap())
            .public("/leads/")
            .protect("/campaigns", ProtectedRoute::default());

        assert!(policy.public_routes.contains("leads"));
        assert!(policy.protected_routes.contains_key("campaigns"));
    }
}
