use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use ubxlog::{Cli, Command, OutputFormatter, OutputMode, UbxLog, UbxLogError};

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbosity_level());
    process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    if cli.generate_config {
        return match handle_generate_config(cli) {
            Ok(path) => {
                println!("Generated sample configuration file: {}", path.display());
                println!("\nTo use this configuration:");
                println!("  ubxlog --config {} range <input.csv>", path.display());
                0
            }
            Err(e) => {
                eprintln!("Failed to generate configuration file: {:#}", e);
                1
            }
        };
    }

    let Some(command) = cli.command.as_ref() else {
        eprintln!("No command given. Run `ubxlog --help` for usage.");
        return 1;
    };

    let ubxlog = match UbxLog::from_cli(cli) {
        Ok(ubxlog) => ubxlog,
        Err(e) => {
            print_startup_error(&e);
            return exit_code(&e);
        }
    };

    let formatter = ubxlog.output_formatter();
    let outcome = match command {
        Command::Range { input, output, .. } => {
            let report = if cli.dry_run {
                ubxlog.plan_ranges(input, output.clone())
            } else {
                ubxlog.extract_ranges(input, output.clone())
            };
            report.map(|report| {
                formatter.print_range_report(&report);
                report.has_warnings()
            })
        }
        Command::Demux {
            input, output_base, ..
        } => {
            let report = if cli.dry_run {
                ubxlog.plan_demux(input, output_base.clone())
            } else {
                ubxlog.demux(input, output_base.clone())
            };
            report.map(|report| {
                formatter.print_demux_report(&report);
                report.has_warnings()
            })
        }
    };

    match outcome {
        Ok(false) => 0,
        Ok(true) => 2, // Success with skipped records
        Err(e) => {
            ubxlog.handle_error(&e);
            exit_code(&e)
        }
    }
}

fn exit_code(error: &UbxLogError) -> i32 {
    match error {
        UbxLogError::InputNotFound { .. } => 3,
        UbxLogError::MalformedRecord { .. } => 4,
        UbxLogError::Config { .. } => 5,
        UbxLogError::Permission { .. } => 7,
        _ => 1,
    }
}

fn handle_generate_config(cli: &Cli) -> anyhow::Result<PathBuf> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("ubxlog.toml"));

    UbxLog::generate_sample_config(&config_path)
        .with_context(|| format!("writing {}", config_path.display()))?;

    Ok(config_path)
}

fn print_startup_error(error: &UbxLogError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}

fn setup_logging(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "ubxlog=warn",
        1 => "ubxlog=info",
        _ => "ubxlog=debug",
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_generate_config_command() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let cli = Cli::try_parse_from([
            "ubxlog",
            "--generate-config",
            "--config",
            config_path.to_str().unwrap(),
        ])
        .unwrap();

        assert_eq!(run(&cli), 0);
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[demux]"));
    }

    #[test]
    fn test_exit_codes() {
        let missing = UbxLogError::InputNotFound {
            path: "x.csv".to_string(),
        };
        assert_eq!(exit_code(&missing), 3);

        let config = UbxLogError::Config {
            message: "bad".to_string(),
        };
        assert_eq!(exit_code(&config), 5);
    }

    #[test]
    fn test_missing_input_exit_code() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("absent.csv");

        let cli = Cli::try_parse_from([
            "ubxlog",
            "--quiet",
            "--output-format",
            "plain",
            "range",
            input.to_str().unwrap(),
        ])
        .unwrap();

        assert_eq!(run(&cli), 3);
    }
}
