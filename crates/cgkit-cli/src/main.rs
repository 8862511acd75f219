use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use cgkit_core::{
    serialize, CgroupContext, CgroupError, CgroupVersion, Controller, RequireOptions, VERSION,
};

#[derive(Parser)]
#[command(name = "cgkit")]
#[command(version = VERSION)]
#[command(about = "Negotiate, inspect and clean up test cgroup hierarchies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure controllers are mounted and usable, then print the resulting
    /// config on stdout for a later cleanup invocation
    Require {
        /// Controllers to negotiate (negotiated together: jointly mounted
        /// if private mounting is needed on V1)
        #[arg(required = true)]
        controllers: Vec<String>,

        /// Process to move into the test group on success
        #[arg(short, long)]
        pid: Option<u32>,

        /// Restrict negotiation to legacy (V1) hierarchies
        #[arg(long)]
        v1_only: bool,
    },

    /// Drain and remove every test-created group recorded in a config
    /// (from FILE, or stdin when omitted), unmounting hierarchies the
    /// recording process mounted
    Cleanup {
        /// Config file produced by `require`; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Scan the system and print the detected hierarchy config only
    Print,
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let skip = err
                .downcast_ref::<CgroupError>()
                .map(CgroupError::is_skip)
                .unwrap_or(false);
            if skip {
                eprintln!("{} {:#}", "skipped:".yellow().bold(), err);
                ExitCode::from(2)
            } else {
                eprintln!("{} {:#}", "error:".red().bold(), err);
                ExitCode::FAILURE
            }
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Require {
            controllers,
            pid,
            v1_only,
        } => require(&controllers, pid, v1_only),
        Commands::Cleanup { file } => cleanup(file),
        Commands::Print => print_config(),
    }
}

fn require(controllers: &[String], pid: Option<u32>, v1_only: bool) -> Result<()> {
    let controllers = controllers
        .iter()
        .map(|name| Controller::from_name(name))
        .collect::<cgkit_core::Result<Vec<_>>>()?;

    let mut options = RequireOptions::new();
    if v1_only {
        options = options.with_only_version(CgroupVersion::V1);
    }
    if let Some(pid) = pid {
        options = options.with_seed_pid(pid);
    }

    let mut ctx = CgroupContext::new();
    ctx.require_together(&controllers, &options)
        .context("controller negotiation failed")?;

    print!("{}", ctx.to_config());
    Ok(())
}

fn cleanup(file: Option<PathBuf>) -> Result<()> {
    let text = match file {
        Some(path) => fs::read_to_string(&path)
            .with_context(|| format!("reading config '{}'", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading config from stdin")?;
            buf
        }
    };

    let mut ctx = CgroupContext::from_config(&text)?;
    ctx.cleanup().context("cleanup failed")?;

    eprintln!("{}", "cleanup complete".green());
    Ok(())
}

fn print_config() -> Result<()> {
    let mut ctx = CgroupContext::new();
    ctx.scan().context("scanning mounts failed")?;

    print!("{}", serialize(&ctx.detected_descriptors()));
    Ok(())
}
