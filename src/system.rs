use crate::{
    compiler::{Navigation, Router},
    domain::{DuplicatePolicy, PolicyContext, User},
    registry::{PolicyProcessor, RouteTree},
};

/// The registries and router of a running application.
///
/// One `System` is built per boot and passed to whatever needs it, in place
/// of process-wide registries.
#[derive(Debug, Clone, Default)]
pub struct System {
    /// Registered routes.
    pub routes: RouteTree,
    /// Registered authorization configuration.
    pub policies: PolicyProcessor,
    /// The router compiled from `routes`.
    pub router: Router,
}

impl System {
    /// An empty system whose route tree applies `duplicates`.
    #[must_use]
    pub fn new(duplicates: DuplicatePolicy) -> Self {
        Self {
            routes: RouteTree::with_policy(duplicates),
            ..Self::default()
        }
    }

    /// Resolves `path` for `user` against the compiled router.
    #[must_use]
    pub fn navigate(
        &self,
        path: &str,
        user: Option<&User>,
        context: &PolicyContext,
    ) -> Navigation<'_> {
        self.router.navigate(path, user, context, &self.policies)
    }

    /// Clears every registry and the router, ready for a fresh boot.
    pub fn reset(&mut self) {
        tracing::debug!("resetting system");
        self.routes.clear_all_routes();
        self.policies.clear();
        self.router = Router::default();
    }
}
