use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about = "Load, inspect and rewrite LiPD datasets", long_about = None)]
pub struct Cli {
    /// YAML settings file (defaults apply when omitted)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Summarize the tables of a LiPD directory
    Inspect(InspectArgs),
    /// Show derived per-column statistics
    Stats(StatsArgs),
    /// Load a dataset and write it back out as LiPD 1.3
    Convert(ConvertArgs),
    /// Print the metadata without values as JSON
    Metadata(MetadataArgs),
    /// Load every dataset under a directory
    Library(LibraryArgs),
    /// Write a settings file populated with the defaults
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Unpacked LiPD directory
    pub input: PathBuf,
    /// Also list every load diagnostic
    #[arg(long)]
    pub diagnostics: bool,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Unpacked LiPD directory
    pub input: PathBuf,
    /// Restrict output to one table, by crumbs (e.g. paleo0measurement0) or name
    #[arg(short, long)]
    pub table: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Unpacked LiPD directory to read
    pub input: PathBuf,
    /// Destination directory
    pub output: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MetadataLayout {
    /// Collections keyed by name, as held in memory
    Named,
    /// Ordered lists, as written to disk
    Numbered,
}

#[derive(Debug, Args)]
pub struct MetadataArgs {
    /// Unpacked LiPD directory
    pub input: PathBuf,
    /// Output file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = MetadataLayout::Named)]
    pub layout: MetadataLayout,
}

#[derive(Debug, Args)]
pub struct LibraryArgs {
    /// Directory holding one dataset directory per sub-folder
    pub root: PathBuf,
    /// Save every loaded dataset under this directory
    #[arg(long = "save-to")]
    pub save_to: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Destination YAML file
    pub output: PathBuf,
}
