//! Check command - validate the configuration table and environment without
//! fetching anything.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use console::style;

use sheetocr_core::{ConfigSource, EntityJobSet, PopplerRasterizer};

use crate::adapters::CsvConfigSource;

/// Arguments for the check command.
#[derive(Args)]
pub struct CheckArgs {
    /// Configuration table (CSV)
    table: PathBuf,

    /// The table has no header row
    #[arg(long)]
    no_header: bool,
}

pub async fn run(args: CheckArgs, config_path: Option<&str>) -> anyhow::Result<ExitCode> {
    let config = super::load_config(config_path)?;
    let mut problems = 0usize;

    match config.validate() {
        Ok(()) => println!("{} Configuration is valid ({} DPI)", style("✓").green(), config.raster.dpi),
        Err(e) => {
            problems += 1;
            println!("{} {}", style("✗").red(), e);
        }
    }

    let rasterizer = PopplerRasterizer::from_config(&config.raster);
    if rasterizer.is_available() {
        println!("{} pdftoppm found", style("✓").green());
    } else {
        println!(
            "{} pdftoppm not found at {} (pages will fail to rasterize)",
            style("!").yellow(),
            config.raster.pdftoppm_path.display()
        );
    }

    for language in &config.ocr.languages {
        let dir = config.ocr.language_dir(language);
        if dir.is_dir() {
            println!("{} Model for {}: {}", style("✓").green(), language, dir.display());
        } else {
            println!("{} Model for {} missing: {}", style("!").yellow(), language, dir.display());
        }
    }

    let rows = CsvConfigSource::new(&args.table).with_header(!args.no_header).rows()?;
    println!();
    println!("{} {} entities in {}", style("ℹ").blue(), rows.len(), args.table.display());

    for row in &rows {
        let set = EntityJobSet::from_row(row);
        let malformed = set.malformed_count();
        let valid = set.slots.len() - malformed;
        let pages = set.distinct_pages();

        println!(
            "  {} {} jobs on {} pages{}",
            style(&set.entity_id).bold(),
            valid,
            pages.len(),
            if malformed > 0 {
                format!(", {} malformed", style(malformed).red())
            } else {
                String::new()
            }
        );

        for slot in &set.slots {
            if let Err(e) = &slot.parsed {
                println!("    column {} [{}]: {}", slot.column, slot.raw, e);
            }
        }
        problems += malformed;
    }

    if problems == 0 {
        println!();
        println!("{} No problems found", style("✓").green());
        Ok(ExitCode::SUCCESS)
    } else {
        println!();
        println!("{} {} problems found", style("✗").red(), problems);
        Ok(ExitCode::FAILURE)
    }
}
