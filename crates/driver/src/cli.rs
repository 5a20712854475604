//! CLI wiring for benchmatvec.

use crate::report::render_report;
use crate::session::{SessionOptions, TuningSession};
use anyhow::Result;
use clap::Parser;
use gemvtune_autotune::oracle::BusTransfer;
use gemvtune_autotune::tuner::{SearchMode, TuningOptions};
use gemvtune_kernels::config::{MatvecProblem, ShapePins};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "benchmatvec",
    about = "Autotune a matrix-vector kernel on the selected device"
)]
pub struct Cli {
    /// cpu, gpu or accelerator device, optionally followed by the device number
    #[arg(short = 'd', long)]
    pub device: String,
    /// Journal file of memoized measurements
    #[arg(short = 'j', long)]
    pub journal: PathBuf,
    /// Matrix dimension M (defaults to N)
    #[arg(short = 'm')]
    pub m: Option<usize>,
    /// Matrix dimension N
    #[arg(short = 'n')]
    pub n: usize,
    /// Work item group width and height
    #[arg(short = 'g', long)]
    pub group_size: Option<usize>,
    /// Inner blocking height
    #[arg(short = 'y', long)]
    pub block_height: Option<usize>,
    /// Extra parameter
    #[arg(short = 'x', long)]
    pub extra_param: Option<usize>,
    /// Number of trials
    #[arg(short = 't', long, default_value_t = 1)]
    pub trials: usize,
    /// Keep the top N candidates between trials
    #[arg(short = 'w', long)]
    pub top_n: Option<usize>,
    /// Use the alternating expectation maximization search
    #[arg(short = 'e', long)]
    pub em: bool,
    /// Transpose A
    #[arg(short = 'a', long)]
    pub transpose: bool,
    /// Include the transfer to the device in the timing
    #[arg(short = 's', long)]
    pub to_device: bool,
    /// Include the transfer from the device in the timing
    #[arg(short = 'r', long)]
    pub from_device: bool,
    /// Check every output against the reference product
    #[arg(short = 'p', long)]
    pub paranoid: bool,
    /// Disable the kernel vector attribute hint
    #[arg(short = 'v', long)]
    pub no_vector_hint: bool,
    /// Print kernel output and debug logs
    #[arg(short = 'z', long)]
    pub debug: bool,
    /// Kernel family to tune
    #[arg(long, default_value = "matvec")]
    pub kernel: String,
    /// Bound on expectation maximization iterations
    #[arg(long, default_value_t = 64)]
    pub max_iterations: usize,
    /// Write the tuning outcome as JSON
    #[arg(long)]
    pub dump: Option<PathBuf>,
}

impl Cli {
    pub fn tuning_options(&self) -> TuningOptions {
        let problem = MatvecProblem::new(self.m.unwrap_or(self.n), self.n).with_transpose(self.transpose);
        TuningOptions {
            pins: ShapePins {
                group_size: self.group_size,
                block_height: self.block_height,
                extra_param: self.extra_param,
            },
            trials: self.trials,
            retention: self.top_n,
            mode: if self.em {
                SearchMode::Alternating
            } else {
                SearchMode::Exhaustive
            },
            transfer: BusTransfer {
                to_device: self.to_device,
                from_device: self.from_device,
            },
            max_iterations: self.max_iterations,
            ..TuningOptions::new(problem)
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            device: self.device.clone(),
            journal: Some(self.journal.clone()),
            kernel: self.kernel.clone(),
            vector_hint: !self.no_vector_hint,
            paranoid_check: self.paranoid,
            print_debug: self.debug,
        }
    }
}

pub fn run_cli(cli: Cli) -> Result<()> {
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // A second run in the same process keeps the first subscriber.
    let _ = tracing_subscriber::fmt::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();

    let options = cli.tuning_options();
    let mut session = TuningSession::new(cli.session_options())?;
    let result = session.tune(options);
    session.shutdown()?;
    let outcome = result?;

    print!("{}", render_report(&outcome));

    if let Some(path) = &cli.dump {
        fs::write(path, serde_json::to_string_pretty(&outcome)?)?;
        info!(path = %path.display(), "tuning outcome written");
    }
    Ok(())
}
