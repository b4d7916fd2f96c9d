use anyhow::Context;
use colored::Colorize;
use serde_json::json;

use blobber_core::BlobberConfig;
use blobber_crypto::{allocation_root, lookup_hash};
use blobber_reftree::path;
use blobber_types::{Digest, Timestamp};

use crate::cli::*;
use crate::demo;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Config(args) => cmd_config(args, format),
        Command::LookupHash(args) => cmd_lookup_hash(args, format),
        Command::AllocationRoot(args) => cmd_allocation_root(args, format),
        Command::Demo(args) => {
            let config = load_config(args.config.as_deref())?;
            let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
            runtime.block_on(demo::run(config, args.size, format))
        }
    }
}

pub fn load_config(file: Option<&std::path::Path>) -> anyhow::Result<BlobberConfig> {
    match file {
        Some(file) => BlobberConfig::load(file)
            .with_context(|| format!("loading config from {}", file.display())),
        None => Ok(BlobberConfig::default()),
    }
}

fn cmd_config(args: ConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.file.as_deref())?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => {
            println!("{} Configuration valid", "✓".green().bold());
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}

fn cmd_lookup_hash(args: LookupHashArgs, format: OutputFormat) -> anyhow::Result<()> {
    let normalized = path::normalize(&args.path)?;
    let hash = lookup_hash(&args.allocation, &normalized);
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "allocation": args.allocation, "path": normalized, "lookup_hash": hash })
        ),
        OutputFormat::Text => println!("{}  {}", hash.to_hex().yellow(), normalized),
    }
    Ok(())
}

fn cmd_allocation_root(args: AllocationRootArgs, format: OutputFormat) -> anyhow::Result<()> {
    let root_hash = Digest::from_hex(&args.root_hash).context("parsing --root-hash")?;
    let root = allocation_root(&root_hash, Timestamp::from_secs(args.timestamp));
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "root_hash": root_hash, "timestamp": args.timestamp, "allocation_root": root })
        ),
        OutputFormat::Text => println!("{}", root.to_hex().yellow()),
    }
    Ok(())
}
