use std::path::{Path, PathBuf};

mod check;
mod layouts;
mod redirect;
mod routes;
mod terminal;
mod validate;

use anyhow::Context;
use check::Check;
use clap::ArgAction;
use layouts::Layouts;
use redirect::Redirect;
use routes::Routes;
use tracing::instrument;
use validate::Validate;
use zoom::{Boot, Bootstrapper, Catalogs, ComponentRegistry, Config};

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The project root, holding `zoom.toml` and the site and module
    /// manifests
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        self.command
            .unwrap_or_else(|| Command::Routes(Routes::default()))
            .run(&self.root)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// List every registered route (default)
    Routes(Routes),

    /// Show the merged layout overrides
    Layouts(Layouts),

    /// Navigate to a path as a given user
    Check(Check),

    /// Resolve a redirect target from a module's position
    Redirect(Redirect),

    /// Load every manifest and boot, reporting any failure
    Validate(Validate),
}

impl Command {
    fn run(self, root: &Path) -> anyhow::Result<()> {
        match self {
            Self::Routes(command) => command.run(root)?,
            Self::Layouts(command) => command.run(root)?,
            Self::Check(command) => command.run(root)?,
            Self::Redirect(command) => command.run(root)?,
            Self::Validate(command) => command.run(root)?,
        }
        Ok(())
    }
}

/// Loads the project at `root` and boots it.
///
/// Every page referenced by a manifest is registered as a static component,
/// so the router renders component keys in place of real pages.
#[instrument]
fn boot(root: &Path, fallback_on_error: bool) -> anyhow::Result<Boot> {
    let config = Config {
        fallback_on_error,
        ..Config::load_or_default(root)
    };
    let catalogs = Catalogs::load(root, &config)
        .with_context(|| format!("failed to load manifests from {}", root.display()))?;

    let components = catalogs
        .component_refs()
        .into_iter()
        .fold(ComponentRegistry::default(), |registry, key| {
            registry.with_static(key.as_str())
        });

    let boot = Bootstrapper::new(config)
        .with_sites(catalogs.sites)
        .with_modules(catalogs.modules)
        .with_components(components)
        .boot()?;
    Ok(boot)
}
