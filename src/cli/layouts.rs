use std::path::Path;

use clap::Parser;
use tracing::instrument;

use super::terminal::Colorize;

/// Command arguments for `zoom layouts`.
#[derive(Debug, Parser)]
#[command(about = "Show the merged layout overrides")]
pub struct Layouts {
    /// Print `module=layout` pairs without decoration.
    #[arg(long, short)]
    quiet: bool,
}

impl Layouts {
    #[instrument]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let boot = super::boot(root, true)?;
        let layouts = boot.system.routes.get_all_layouts();

        if layouts.is_empty() && !self.quiet {
            println!("{}", "No layout overrides".dim());
        }
        for (module, layout) in &layouts {
            if self.quiet {
                println!("{module}={layout}");
            } else {
                println!("{} → {}", module.info(), layout);
            }
        }
        Ok(())
    }
}
