use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::{config::Args, rules::all_rules, run_and_output, ExitStatus};

/// Binary entry point: argument parsing, subscriber installation, config
/// assembly, then the run itself.
pub fn bootstrap_cli() -> i32 {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let args = Args::parse();
    let config = match args.load_config_file_and_into_config(all_rules()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("javafmt: {error}");
            return ExitStatus::ConfigError.code();
        }
    };
    if config.paths.is_empty() {
        eprintln!("javafmt: no input files");
        return ExitStatus::InvalidInput.code();
    }
    run_and_output(&config).code()
}
