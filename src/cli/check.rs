use std::path::Path;

use clap::Parser;
use tracing::instrument;
use zoom::{Navigation, PolicyContext, User};

use super::terminal::Colorize;

/// Parse a `key=value` context attribute.
fn parse_attribute(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))
}

/// Command arguments for `zoom check`.
#[derive(Debug, Parser)]
#[command(about = "Navigate to a path as a given user")]
pub struct Check {
    /// The absolute path to navigate to, e.g. `/zoomy/admin/users`.
    path: String,

    /// Navigate without signing in.
    #[arg(long, conflicts_with_all = ["role", "permission"])]
    anonymous: bool,

    /// The signed-in user's id.
    #[arg(long, default_value = "cli")]
    user: String,

    /// Roles held by the user (comma-separated).
    #[arg(long, value_delimiter = ',')]
    role: Vec<String>,

    /// Permissions held by the user (comma-separated).
    #[arg(long, value_delimiter = ',')]
    permission: Vec<String>,

    /// Context attributes available to redirects (`KEY=VALUE`).
    #[arg(long = "attr", value_parser = parse_attribute)]
    attributes: Vec<(String, String)>,
}

impl Check {
    #[instrument]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let boot = super::boot(root, true)?;
        if !boot.is_ready() {
            eprintln!("{}", "Boot failed, checking against the fallback router".warning());
        }

        let user = (!self.anonymous).then(|| {
            let user = self
                .role
                .iter()
                .fold(User::new(self.user.as_str()), |user, role| user.with_role(role.as_str()));
            self.permission
                .iter()
                .fold(user, |user, permission| user.with_permission(permission.as_str()))
        });
        let context = self
            .attributes
            .iter()
            .fold(PolicyContext::default(), |context, (key, value)| {
                context.with(key.as_str(), value.as_str())
            });

        match boot.system.navigate(&self.path, user.as_ref(), &context) {
            Navigation::Render { route, params } => {
                println!("{} {}", "render".success(), route.element);
                if let Some(layout) = &route.layout {
                    println!("  layout: {layout}");
                }
                for (name, value) in &params {
                    println!("  {name}: {value}");
                }
            }
            Navigation::Redirect(target) => {
                println!("{} {}", "redirect".warning(), target.info());
            }
            Navigation::NotFound => println!("{}", "not found".failure()),
        }
        Ok(())
    }
}
