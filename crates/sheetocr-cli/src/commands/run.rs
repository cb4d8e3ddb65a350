//! Run command - process every entity in the configuration table.

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use sheetocr_core::models::config::DocumentSourceKind;
use sheetocr_core::{
    CancelToken, ConfigSource, DocumentSource, EntityReport, EntityState, LocalDocumentSource, MemorySink,
    MultiLanguageRecognizer, Orchestrator, PopplerRasterizer, ResultSink, RunReport, SheetOcrConfig,
};

use crate::adapters::{CsvConfigSource, CsvWorkbookSink, HttpDocumentSource};

/// Where documents come from.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SourceArg {
    /// `<documents>/<entity>.pdf`
    Local,
    /// Resolve the report from the listing page
    Http,
}

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Configuration table (CSV)
    table: PathBuf,

    /// The table has no header row
    #[arg(long)]
    no_header: bool,

    /// Document source
    #[arg(short, long, value_enum)]
    source: Option<SourceArg>,

    /// Directory of `<entity>.pdf` files for the local source
    #[arg(short, long)]
    documents: Option<PathBuf>,

    /// Directory for the per-entity worksheets
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Model directory (one sub-directory per language)
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Maximum entities in flight
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Keep rasterized pages in the images directory
    #[arg(long)]
    keep_images: bool,

    /// Exit non-zero when any entity fails
    #[arg(long)]
    strict: bool,

    /// Print results instead of writing worksheets
    #[arg(long)]
    dry_run: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut SheetOcrConfig) {
        if let Some(source) = self.source {
            config.fetch.source = match source {
                SourceArg::Local => DocumentSourceKind::Local,
                SourceArg::Http => DocumentSourceKind::Http,
            };
        }
        if let Some(dir) = &self.documents {
            config.fetch.local_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.sink.output_dir = dir.clone();
        }
        if let Some(dir) = &self.model_dir {
            config.ocr.model_dir = dir.clone();
        }
        if let Some(n) = self.concurrency {
            config.run.concurrency = n;
        }
        config.workspace.keep_images |= self.keep_images;
        config.run.strict |= self.strict;
    }
}

pub async fn run(args: RunArgs, config_path: Option<&str>) -> anyhow::Result<ExitCode> {
    let start = Instant::now();

    let mut config = super::load_config(config_path)?;
    args.apply(&mut config);
    config.validate()?;

    let rows = CsvConfigSource::new(&args.table).with_header(!args.no_header).rows()?;
    if rows.is_empty() {
        anyhow::bail!("No entities found in {}", args.table.display());
    }
    println!("{} Found {} entities to process", style("ℹ").blue(), rows.len());

    let rasterizer = PopplerRasterizer::from_config(&config.raster);
    if !rasterizer.is_available() {
        warn!(
            "pdftoppm not found at {}; every page will fail to rasterize",
            config.raster.pdftoppm_path.display()
        );
    }

    let recognizer = MultiLanguageRecognizer::from_config(&config.ocr)
        .map_err(|e| anyhow::anyhow!("Failed to load OCR models: {}", e))?;
    info!("Loaded models for {:?}", recognizer.languages());

    let source: Arc<dyn DocumentSource> = match config.fetch.source {
        DocumentSourceKind::Local => Arc::new(LocalDocumentSource::new(&config.fetch.local_dir)),
        DocumentSourceKind::Http => Arc::new(HttpDocumentSource::from_config(&config.fetch)?),
    };

    let memory = args.dry_run.then(|| Arc::new(MemorySink::new()));
    let sink: Arc<dyn ResultSink> = match &memory {
        Some(memory) => memory.clone(),
        None => Arc::new(CsvWorkbookSink::from_config(&config.sink)),
    };

    let progress = ProgressBar::new(rows.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} entities {msg}")?
            .progress_chars("=>-"),
    );

    let observer_bar = progress.clone();
    let cancel = CancelToken::new();
    let orchestrator = Orchestrator::new(&config, Arc::new(rasterizer), Arc::new(recognizer), source, sink)?
        .with_cancel_token(cancel.clone())
        .with_observer(Arc::new(move |report: &EntityReport| {
            observer_bar.set_message(format!("{} {}", report.entity_id, report.state));
            observer_bar.inc(1);
        }));

    tokio::spawn(async move {
        if watch_interrupts(cancel, tokio::signal::ctrl_c).await {
            eprintln!("{} Aborted", style("✗").red());
            std::process::exit(130);
        }
    });

    let report = orchestrator.run(&rows).await?;
    progress.finish_with_message("Complete");

    match report.write_to(&config.workspace.reports_dir) {
        Ok(path) => println!("{} Report written to {}", style("✓").green(), path.display()),
        Err(e) => warn!("Failed to write run report: {}", e),
    }

    if let Some(memory) = memory {
        println!();
        for (entity, destination, text) in memory.cells() {
            println!("{}!{}\t{:?}", entity, destination, text);
        }
    }

    print_summary(&report, start);

    if config.run.strict && report.has_failed_entities() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Cancel on the first interrupt. Returns `true` when a second interrupt
/// asks to abort without waiting for in-flight entities.
async fn watch_interrupts<F, Fut>(cancel: CancelToken, mut interrupted: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupted().await.is_err() {
        return false;
    }
    warn!("Interrupted; finishing in-flight entities (interrupt again to abort)");
    cancel.cancel();

    interrupted().await.is_ok()
}

fn print_summary(report: &RunReport, start: Instant) {
    let done = report.count_in(|s| s == EntityState::Done);
    let failed = report.count_in(EntityState::is_failed);
    let pending = report.count_in(|s| s == EntityState::Pending);

    println!();
    println!(
        "{} Processed {} entities in {:?}{}",
        style("✓").green(),
        report.entities.len(),
        start.elapsed(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    println!(
        "   {} done, {} failed, {} not started",
        style(done).green(),
        style(failed).red(),
        style(pending).yellow()
    );

    let failures: Vec<_> = report.entities.iter().filter(|e| e.state.is_failed()).collect();
    if !failures.is_empty() {
        println!();
        println!("{}", style("Failed entities:").red());
        for entity in failures {
            println!(
                "  - {}: {} ({})",
                entity.entity_id,
                entity.state,
                entity.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    let partial: Vec<_> = report
        .entities
        .iter()
        .filter(|e| e.state == EntityState::Done && e.failed_jobs() > 0)
        .collect();
    if !partial.is_empty() {
        println!();
        println!("{}", style("Cells not delivered:").yellow());
        for entity in partial {
            for outcome in entity.outcomes.iter().filter(|o| !o.is_ok()) {
                if let Some(kind) = outcome.result.kind() {
                    println!("  - {} column {} [{}]: {}", entity.entity_id, outcome.column, outcome.raw, kind);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::ready;

    #[tokio::test]
    async fn test_second_interrupt_aborts() {
        let token = CancelToken::new();
        let mut signals = 0;

        let abort = watch_interrupts(token.clone(), || {
            signals += 1;
            ready(Ok(()))
        })
        .await;

        assert!(abort);
        assert!(token.is_cancelled());
        assert_eq!(signals, 2);
    }

    #[tokio::test]
    async fn test_no_signal_handler_leaves_run_alone() {
        let token = CancelToken::new();

        let abort = watch_interrupts(token.clone(), || ready(Err(std::io::Error::other("no handler")))).await;

        assert!(!abort);
        assert!(!token.is_cancelled());
    }
}
