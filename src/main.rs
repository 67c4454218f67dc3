//! rootless-setup - Main entry point
//!
//! Parses the command line, sets up logging and signal handling, loads the
//! configuration and dispatches to the provisioning pipeline.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use rootless_setup::apparmor::profile_name;
use rootless_setup::cli::{Cli, Commands};
use rootless_setup::preflight::print_failure;
use rootless_setup::process_guard::{self, ProcessGuard};
use rootless_setup::{HostPaths, ProvisionConfig, ProvisionError, Provisioner, SystemRunner};

/// Exit code for a configuration file that cannot be read or parsed.
const EXIT_CONFIG: u8 = 4;

/// Initialize tracing with file/line output on stderr.
///
/// `RUST_LOG` overrides the level chosen by `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ProvisionConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            ProvisionConfig::load_from_file(path)
                .with_context(|| format!("Cannot use configuration file {:?}", path))
        }
        None => {
            debug!("No --config given, using defaults");
            Ok(ProvisionConfig::default())
        }
    }
}

fn run(cli: &Cli, config: &ProvisionConfig) -> Result<(), ProvisionError> {
    let runner = SystemRunner;
    let provisioner = Provisioner::new(config, &runner).with_paths(HostPaths::new(&cli.root));

    match cli.command() {
        Commands::Install => {
            let report = provisioner.run()?;
            println!("{}", report);
            for warning in report.warnings() {
                println!("⚠ {}", warning);
            }
            println!("✓ Rootless engine ready for {}", config.service_user);
        }
        Commands::Preflight => {
            let host = provisioner.preflight()?;
            println!("✓ Pre-flight checks passed: {}", host);
        }
        Commands::Validate => {
            let report = provisioner.validate_only()?;
            println!("{}", report);
            println!("✓ Rootless engine is healthy for {}", config.service_user);
        }
        Commands::DaemonConfig => {
            config.validate()?;
            print!("{}", provisioner.daemon_config_json()?);
        }
        Commands::ProfileName { binary } => {
            let binary = binary.unwrap_or_else(|| config.supervisor_binary.clone());
            println!("{}", profile_name(&binary));
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);
    info!("rootless-setup {} starting", env!("CARGO_PKG_VERSION"));

    // Children are terminated if we receive SIGINT/SIGTERM/SIGHUP
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    let _guard = ProcessGuard::new();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            print_failure(&e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
