//! ddsfuzz binary
//!
//! Run with: `ddsfuzz [OPTIONS] <SEED_HEX> <OUTPUT_DIR>`

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ddsfuzz::cdr::ByteOrder;
use ddsfuzz::compiler::{ExternalCompiler, IdlCompiler};
use ddsfuzz::config::Config;
use ddsfuzz::corpus::{self, RunOptions};

#[derive(Parser)]
#[command(name = "ddsfuzz")]
#[command(about = "Generate a random IDL schema and an XCDR2 seed corpus for it")]
#[command(version)]
struct Cli {
    /// Seed, in hex (optional 0x prefix)
    #[arg(value_name = "SEED_HEX", value_parser = corpus::parse_seed, required_unless_present = "print_config")]
    seed: Option<u64>,

    /// Existing directory to write the schema, manifest and corpus into
    #[arg(value_name = "OUTPUT_DIR", required_unless_present = "print_config")]
    output_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Number of type definitions to generate
    #[arg(long)]
    entities: Option<usize>,

    /// Depth budget for sequences, strings and optional members
    #[arg(long)]
    max_depth: Option<u32>,

    /// Encode samples big-endian
    #[arg(long)]
    big_endian: bool,

    /// External IDL compiler to run on the schema before loading it
    #[arg(long, value_name = "PATH")]
    idlc: Option<PathBuf>,

    /// Extra argument for the external IDL compiler (repeatable)
    #[arg(long = "idlc-arg", value_name = "ARG", requires = "idlc")]
    idlc_args: Vec<String>,

    /// Skip decoding each sample after encoding it
    #[arg(long)]
    no_verify: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let (Some(seed), Some(output_dir)) = (cli.seed, cli.output_dir.clone()) else {
        anyhow::bail!("a seed and an output directory are required");
    };

    let mut compiler = IdlCompiler::new();
    if let Some(program) = &cli.idlc {
        let external = cli
            .idlc_args
            .iter()
            .fold(ExternalCompiler::new(program), |external, arg| external.arg(arg));
        compiler = compiler.with_external(external);
    }

    let options = RunOptions::new(seed, output_dir, config);
    let report = corpus::run(&options, &compiler)
        .with_context(|| format!("Run for seed {} failed", corpus::seed_text(seed)))?;

    info!(
        "Wrote {}, {} and {} corpus files",
        report.schema_path.display(),
        report.manifest_path.display(),
        report.corpus_files.len()
    );
    Ok(())
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => Config::default(),
    };

    // Override with CLI options
    if let Some(entities) = cli.entities {
        config.generator.entity_count = entities;
    }
    if let Some(max_depth) = cli.max_depth {
        config.instance.max_depth = max_depth;
    }
    if cli.big_endian {
        config.output.byte_order = ByteOrder::Big;
    }
    if cli.no_verify {
        config.output.verify_roundtrip = false;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}
