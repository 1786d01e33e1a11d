//! Config validation CLI tool
//!
//! Validates a disciplined configuration file and reports any errors.

use discipline_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let config_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a disciplined configuration file.");
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match discipline_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("  Socket:        {}", config.daemon.socket_path.display());
            println!("  Data dir:      {}", config.daemon.data_dir.display());
            println!("  Interval:      {}s", config.schedule.interval.as_secs());
            println!("  Exact timers:  {}", config.schedule.exact_timers);
            println!("  Executor:      {}", config.executor.command_prefix.join(" "));
            println!("  Protected packages:");
            for pkg in config
                .safety
                .protected_packages(&config.executor.host_package)
            {
                println!("    - {}", pkg);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                discipline_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                discipline_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        discipline_config::CURRENT_CONFIG_VERSION
                    );
                }
                other => eprintln!("{}", other),
            }
            ExitCode::from(1)
        }
    }
}
