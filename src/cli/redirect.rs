use std::path::Path;

use clap::Parser;
use tracing::instrument;
use zoom::{ModulePath, PolicyContext, RedirectPurpose, SiteName};

/// Command arguments for `zoom redirect`.
#[derive(Debug, Parser)]
#[command(about = "Resolve a redirect target from a module's position")]
pub struct Redirect {
    /// The site.
    site: SiteName,

    /// Slash-separated module path, e.g. `admin/auth`. Use `/` for the site
    /// root.
    module_path: ModulePath,

    /// What the redirect is for: login, register, home or unauthorized.
    purpose: RedirectPurpose,

    /// With `home`, resolve the post-login redirect back to this
    /// module-relative path.
    #[arg(long)]
    from: Option<String>,
}

impl Redirect {
    #[instrument]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let boot = super::boot(root, true)?;
        let policies = &boot.system.policies;

        let target = match (&self.from, self.purpose) {
            (Some(from), RedirectPurpose::Home) => {
                policies.get_post_login_redirect(&self.site, &self.module_path, from)
            }
            _ => policies.get_redirect_route(
                &self.site,
                &self.module_path,
                self.purpose,
                &PolicyContext::default(),
            ),
        };
        println!("{target}");
        Ok(())
    }
}
