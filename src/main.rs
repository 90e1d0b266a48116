//! Command-line interface for inspecting a multi-site project: its routes,
//! layouts, access decisions and redirects.

mod cli;

use clap::Parser;

fn main() -> anyhow::Result<()> {
    cli::Cli::parse().run()
}
