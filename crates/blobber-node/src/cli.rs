use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blobber",
    about = "Blobber storage node: allocation commits and read-marker redemption",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the effective node configuration
    Config(ConfigArgs),
    /// Compute the lookup hash of a path in an allocation
    LookupHash(LookupHashArgs),
    /// Compute an allocation root from a tree root hash and timestamp
    AllocationRoot(AllocationRootArgs),
    /// Run an in-memory upload, commit, and download round
    Demo(DemoArgs),
}

#[derive(Args)]
pub struct ConfigArgs {
    /// TOML file to load; defaults apply when omitted
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct LookupHashArgs {
    #[arg(long)]
    pub allocation: String,
    #[arg(long)]
    pub path: String,
}

#[derive(Args)]
pub struct AllocationRootArgs {
    /// Hex root hash of the reference tree
    #[arg(long)]
    pub root_hash: String,
    /// Unix seconds of the write marker
    #[arg(long)]
    pub timestamp: i64,
}

#[derive(Args)]
pub struct DemoArgs {
    /// Bytes to upload
    #[arg(long, default_value = "1337")]
    pub size: usize,
    /// Optional TOML config for the in-memory node
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
