use std::path::Path;

use clap::{Parser, ValueEnum};
use tracing::instrument;
use zoom::{RouteRecord, SiteName};

use super::terminal::Colorize;

/// Command arguments for `zoom routes`.
#[derive(Debug, Default, Parser)]
#[command(about = "List every registered route")]
pub struct Routes {
    /// Only show routes of this site.
    #[arg(long)]
    site: Option<SiteName>,

    /// Output format (default: table).
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Routes {
    #[instrument]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let boot = super::boot(root, true)?;
        let records: Vec<RouteRecord> = boot
            .system
            .routes
            .get_all_routes()
            .into_iter()
            .filter(|record| self.site.as_ref().is_none_or(|site| &record.site == site))
            .collect();

        match self.output {
            OutputFormat::Table => print_table(&records),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        }
        Ok(())
    }
}

fn print_table(records: &[RouteRecord]) {
    if records.is_empty() {
        println!("{}", "No routes registered".dim());
        return;
    }

    let rows: Vec<_> = records.iter().flat_map(RouteRecord::walk).collect();
    let width = rows.iter().map(|record| record.path.len()).max().unwrap_or(0);
    for record in rows {
        let target = record.component.as_ref().map_or_else(
            || {
                if record.children.is_empty() {
                    "-".to_owned()
                } else {
                    format!("{} children", record.children.len())
                }
            },
            ToString::to_string,
        );
        let mut line = format!(
            "{:width$}  {}  {}",
            record.path,
            record.module_path.to_string().dim(),
            target,
        );
        if let Some(layout) = &record.layout {
            line.push_str(&format!("  [{layout}]").dim());
        }
        if record.protected {
            line.push_str(&format!("  {}", "protected".warning()));
        }
        println!("{line}");
    }
}
