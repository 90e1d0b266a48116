use std::path::Path;

use clap::Parser;
use tracing::instrument;
use zoom::{Element, ModuleEntry, Router};

use super::terminal::Colorize;

/// Command arguments for `zoom validate`.
#[derive(Debug, Parser)]
#[command(about = "Load every manifest and boot, reporting any failure")]
pub struct Validate {
    /// Suppress all output except errors
    #[arg(long, short)]
    quiet: bool,
}

impl Validate {
    #[instrument]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let boot = super::boot(root, false)?;

        let mut issues = Vec::new();
        for site in boot.system.routes.sites() {
            collect_placeholders(site.modules(), &site.name().to_string(), &mut issues);
        }
        collect_unrendered(&boot.system.router, &mut issues);

        if !self.quiet {
            let sites = boot.system.routes.sites().len();
            let routes = boot.system.router.iter().count();
            println!("✓ Boot:       {sites} sites, {routes} routes");
            if issues.is_empty() {
                println!("\n{}", "Project is healthy (0 issues)".success());
            } else {
                for issue in &issues {
                    println!("{}", format!("✗ {issue}").warning());
                }
            }
        }

        if !issues.is_empty() {
            anyhow::bail!("{} issues found", issues.len());
        }
        Ok(())
    }
}

fn collect_placeholders(modules: &[ModuleEntry], parent: &str, issues: &mut Vec<String>) {
    for entry in modules {
        let path = format!("{parent}/{}", entry.name());
        if entry.is_synthesized() {
            issues.push(format!("Module {path} was never registered, only referenced as a parent"));
        }
        collect_placeholders(entry.submodules(), &path, issues);
    }
}

fn collect_unrendered(router: &Router, issues: &mut Vec<String>) {
    for route in router.iter() {
        if let Element::Error(error) = &route.element {
            issues.push(format!("Route {}: {}", route.path, error.message));
        }
    }
}
