//! linalg-lower Command Line Interface
//!
//! Usage:
//!   linalg-lower [OPTIONS] --kernel <KIND>
//!   linalg-lower --help
//!
//! Examples:
//!   linalg-lower --kernel matmul --sizes 64,32,16            # Lower to loops
//!   linalg-lower --kernel dot --symbolic --emit both         # Bounds as arguments
//!   linalg-lower --kernel matmul --tile-sizes 4,4,1          # Tiled steps
//!   linalg-lower --kernel matmul --pass lower-to-finer-grained-contractions \
//!                --pass compose-slice-ops --pass lower-to-loops

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use linalg_lower::ir::print_function;
use linalg_lower::kernels::{build_kernel, size_names};
use linalg_lower::linalg::ContractionKind;
use linalg_lower::transform::PassKind;
use linalg_lower::LoweringConfig;
use log::{debug, error, info};
use std::fs;
use std::path::PathBuf;

/// linalg-lower - lower tensor contractions to affine loop nests
#[derive(Parser, Debug)]
#[command(name = "linalg-lower")]
#[command(version)]
#[command(about = "Lower tensor contractions to affine loop nests", long_about = None)]
struct Cli {
    /// Contraction to build and lower
    #[arg(short, long, default_value = "matmul")]
    kernel: KernelArg,

    /// Problem sizes (comma-separated: M,N,K for matmul, M,K for matvec, K for dot)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    sizes: Option<Vec<i64>>,

    /// Pass sizes as function arguments instead of constants
    #[arg(long)]
    symbolic: bool,

    /// Pass to run (repeatable, run in order; defaults to lower-to-loops)
    #[arg(short, long = "pass")]
    passes: Vec<PassArg>,

    /// Step tile sizes for the lowered kernel (comma-separated, one per loop)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    tile_sizes: Option<Vec<i64>>,

    /// What to emit
    #[arg(long, default_value = "after")]
    emit: EmitKind,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KernelArg {
    /// C(i, j) += A(i, k) * B(k, j)
    Matmul,
    /// C(i) += A(i, k) * B(k)
    Matvec,
    /// C() += A(k) * B(k)
    Dot,
}

impl From<KernelArg> for ContractionKind {
    fn from(arg: KernelArg) -> Self {
        match arg {
            KernelArg::Matmul => ContractionKind::Matmul,
            KernelArg::Matvec => ContractionKind::Matvec,
            KernelArg::Dot => ContractionKind::Dot,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PassArg {
    /// Fold slice chains into views
    ComposeSliceOps,
    /// Split matmul/matvec into loops of smaller contractions
    LowerToFinerGrainedContractions,
    /// Replace contractions by loop nests
    LowerToLoops,
}

impl From<PassArg> for PassKind {
    fn from(arg: PassArg) -> Self {
        match arg {
            PassArg::ComposeSliceOps => PassKind::ComposeSliceOps,
            PassArg::LowerToFinerGrainedContractions => PassKind::LowerToFinerGrainedContractions,
            PassArg::LowerToLoops => PassKind::LowerToLoops,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmitKind {
    /// Function before lowering
    Before,
    /// Function after lowering
    After,
    /// Both, one after the other
    Both,
}

fn main() {
    if let Err(e) = run() {
        error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let kind: ContractionKind = cli.kernel.into();
    let config = build_config(&cli, kind);

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(config.log_level())
        .format_timestamp(None)
        .init();

    info!("linalg-lower v{}", linalg_lower::VERSION);

    let names = size_names(kind);
    let sizes = cli.sizes.clone().unwrap_or_else(|| vec![16; names.len()]);
    if sizes.len() != names.len() {
        bail!("{} takes {} sizes ({}), got {}", kind, names.len(), names.join(","), sizes.len());
    }

    debug!("Lowering config: {:?}", config);

    let mut func = build_kernel(kind, &sizes, cli.symbolic);
    let mut output = String::new();
    if cli.emit != EmitKind::After {
        output.push_str(&print_function(&func));
    }

    info!("Lowering @{}...", func.name());
    let result = linalg_lower::run_pipeline(&mut func, &config)
        .with_context(|| format!("Failed to lower @{}", func.name()))?;
    info!(
        "Lowering complete: {} ops rewritten by {} passes",
        result.total_rewritten(), result.applied_passes.len()
    );

    if cli.emit != EmitKind::Before {
        output.push_str(&print_function(&func));
    }
    write_output(&cli.output, &output)
}

fn build_config(cli: &Cli, kind: ContractionKind) -> LoweringConfig {
    let mut config = LoweringConfig::default();
    if !cli.passes.is_empty() {
        config.passes = cli.passes.iter().map(|&p| p.into()).collect();
    }
    if let Some(ref tiles) = cli.tile_sizes {
        config.tile_sizes.insert(kind, tiles.clone());
    }
    config.verbosity = if cli.quiet { 0 } else { cli.verbose.saturating_add(1) };
    config
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content)
                .with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
