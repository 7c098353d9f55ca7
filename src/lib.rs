pub mod bag;
pub mod cli;
pub mod config;
pub mod crumbs;
pub mod data;
pub mod error;
pub mod io_utils;
pub mod lipd;
pub mod migrate;
pub mod missing;
pub mod model;
pub mod prune;
pub mod reindex;
pub mod reshape;
pub mod stats;
pub mod table;
pub mod workspace;

use std::{env, fs, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands, MetadataLayout},
    config::Settings,
    error::Diagnostics,
    workspace::Workspace,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("lipd_managed", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    debug!("Settings: {settings:?}");
    match cli.command {
        Commands::Inspect(args) => handle_inspect(&args, &settings),
        Commands::Stats(args) => handle_stats(&args, &settings),
        Commands::Convert(args) => handle_convert(&args, &settings),
        Commands::Metadata(args) => handle_metadata(&args, &settings),
        Commands::Library(args) => handle_library(&args, settings),
        Commands::Config(args) => {
            settings.save(&args.output)?;
            info!("Settings written to {:?}", args.output);
            Ok(())
        }
    }
}

fn report_diagnostics(diagnostics: &Diagnostics, verbose: bool) {
    if diagnostics.is_empty() {
        return;
    }
    if verbose {
        println!("\n{} issue(s):", diagnostics.len());
        for issue in diagnostics.iter() {
            println!("  - {issue}");
        }
    } else {
        println!("\n{} issue(s); rerun with --diagnostics for details", diagnostics.len());
    }
}

fn handle_inspect(args: &cli::InspectArgs, settings: &Settings) -> Result<()> {
    let loaded = lipd::load(&args.input, settings)
        .with_context(|| format!("Loading {:?}", args.input))?;
    println!(
        "Dataset: {} (LiPD {} on disk)",
        loaded.document.name,
        loaded.source_version.as_str()
    );
    let (headers, rows) = table::tables_overview(&loaded.document);
    table::print_table(&headers, &rows);
    report_diagnostics(&loaded.diagnostics, args.diagnostics);
    Ok(())
}

fn handle_stats(args: &cli::StatsArgs, settings: &Settings) -> Result<()> {
    let loaded = lipd::load(&args.input, settings)
        .with_context(|| format!("Loading {:?}", args.input))?;
    let (headers, rows) = table::statistics_overview(&loaded.document, args.table.as_deref());
    if rows.is_empty() {
        warn!("No column statistics to show");
    }
    table::print_table(&headers, &rows);
    Ok(())
}

fn handle_convert(args: &cli::ConvertArgs, settings: &Settings) -> Result<()> {
    let loaded = lipd::load(&args.input, settings)
        .with_context(|| format!("Loading {:?}", args.input))?;
    let report = lipd::save(&loaded.document, &args.output, settings)
        .with_context(|| format!("Saving to {:?}", args.output))?;
    println!(
        "Wrote {:?} and {} CSV file(s)",
        report.metadata_file,
        report.csv_files.len()
    );
    let mut diagnostics = loaded.diagnostics;
    diagnostics.append(report.diagnostics);
    report_diagnostics(&diagnostics, true);
    Ok(())
}

fn handle_metadata(args: &cli::MetadataArgs, settings: &Settings) -> Result<()> {
    let loaded = lipd::load(&args.input, settings)
        .with_context(|| format!("Loading {:?}", args.input))?;
    let tree = match args.layout {
        MetadataLayout::Named => loaded.document.metadata_only().to_named_tree(false),
        MetadataLayout::Numbered => lipd::disk_tree(&loaded.document),
    };
    let rendered = serde_json::to_string_pretty(&tree).context("Serializing metadata")?;
    match &args.output {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("Writing {path:?}"))?;
            info!("Metadata written to {path:?}");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn handle_library(args: &cli::LibraryArgs, settings: Settings) -> Result<()> {
    let mut workspace = Workspace::new(settings);
    let report = workspace.load_all(&args.root)?;
    let headers = vec!["dataset".to_string(), "tables".to_string(), "issues".to_string()];
    let rows = report
        .loaded
        .iter()
        .map(|(name, diagnostics)| {
            let tables = workspace
                .get(name)
                .map(|document| document.tables().len())
                .unwrap_or_default();
            vec![name.clone(), tables.to_string(), diagnostics.len().to_string()]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    for (path, err) in &report.failed {
        println!("failed: {path:?}: {err:#}");
    }
    if let Some(root) = &args.save_to {
        let saved = workspace.save_all(root)?;
        info!("Saved {} dataset(s) under {root:?}", saved.len());
    }
    Ok(())
}
