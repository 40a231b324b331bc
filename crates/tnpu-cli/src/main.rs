//! tiny-npu CLI
//!
//! Packs quantized weights, inspects weight packs, runs the golden kernel
//! self-test, and cross-verifies the hardware simulator against the golden
//! kernels.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand};
use tnpu_cli::commands::{GoldenCommand, InspectCommand, PackCommand, VerifyCommand};
use tnpu_cli::exit::{EXIT_FAILURE, EXIT_SUCCESS, EXIT_USAGE};
use tnpu_common::{HarnessConfig, LogFormat, LoggingConfig};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG_FILE: &str = "tnpu.toml";

/// tiny-npu golden reference and verification harness
#[derive(Parser, Debug)]
#[command(name = "tnpu")]
#[command(about = "tiny-npu golden reference and verification harness")]
#[command(long_about = r#"
Bit-exact INT8 golden kernels, a quantized weight pack format, and a harness
that compares the hardware simulator's outputs against the golden kernels.

Examples:
  # Quantize a directory of .npy weights into a pack
  tnpu pack --input weights/ --output weights.bin

  # Show a pack's manifest
  tnpu inspect weights.bin --format json

  # Run the default GEMM suite against the simulator
  tnpu verify --simulator build/sim/gemm_test --jobs 4

  # Test two custom shapes with a different seed
  tnpu verify --case 8,32,8 --case 1,1,1 --seed 7
"#)]
#[command(version)]
struct Cli {
    /// Configuration file path (default: ./tnpu.toml when present)
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Quantize `.npy` tensors into a weight pack
    Pack(PackCommand),

    /// Validate a weight pack and print its manifest
    Inspect(InspectCommand),

    /// Run the golden kernel self-test
    Golden(GoldenCommand),

    /// Cross-verify the simulator against the golden kernels
    #[command(alias = "crossval")]
    Verify(VerifyCommand),

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the default configuration
    Default,
}

fn main() {
    let cli = Cli::parse();

    let config = match load_configuration(&cli).and_then(|config| {
        init_tracing(&config.logging, cli.log_level.as_deref())?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(EXIT_USAGE);
        }
    };

    let code = run(cli.command, &config).unwrap_or_else(|e| {
        let causes: Vec<String> = e.chain().skip(1).map(ToString::to_string).collect();
        error!(causes = ?causes, "{e}");
        EXIT_FAILURE
    });
    std::process::exit(code);
}

fn run(command: Option<Commands>, config: &HarnessConfig) -> Result<i32> {
    match command {
        Some(Commands::Pack(cmd)) => cmd.execute().map(|_| EXIT_SUCCESS),
        Some(Commands::Inspect(cmd)) => cmd.execute().map(|_| EXIT_SUCCESS),
        Some(Commands::Golden(cmd)) => {
            let report = cmd.execute()?;
            Ok(if report.passed() { EXIT_SUCCESS } else { EXIT_FAILURE })
        }
        Some(Commands::Verify(cmd)) => Ok(cmd.execute(config)?.exit_code()),
        Some(Commands::Config { action }) => handle_config_command(action, config).map(|_| EXIT_SUCCESS),
        None => {
            Cli::command().print_help()?;
            Ok(EXIT_SUCCESS)
        }
    }
}

/// Load the configuration file (explicit, or `./tnpu.toml` if present), else
/// defaults; `TNPU_*` environment overrides apply either way.
fn load_configuration(cli: &Cli) -> Result<HarnessConfig> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
    };

    let config = match path {
        Some(path) => HarnessConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => HarnessConfig::from_env().context("Failed to build configuration")?,
    };
    Ok(config)
}

/// Install the stderr subscriber.
///
/// `RUST_LOG` wins over `--log-level`, which wins over `logging.level`. A
/// malformed directive is a usage error rather than a silent fallback.
fn init_tracing(logging: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    let directive = level_override.unwrap_or(&logging.level);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directive).with_context(|| format!("Invalid log level `{directive}`"))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = match logging.format {
        LogFormat::Json => builder.json().with_timer(fmt::time::uptime()).try_init(),
        LogFormat::Compact => builder.compact().with_target(false).try_init(),
        LogFormat::Pretty => builder.pretty().with_target(false).try_init(),
    };
    installed.map_err(|e| anyhow!("Failed to install log subscriber: {e}"))
}

/// Handle configuration commands
fn handle_config_command(action: ConfigAction, config: &HarnessConfig) -> Result<()> {
    let rendered = match action {
        ConfigAction::Show => config.to_toml(),
        ConfigAction::Default => HarnessConfig::default_toml(),
    }
    .context("Failed to serialize configuration")?;
    print!("{rendered}");
    info!(action = ?action, "rendered configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_verify_with_repeated_cases_and_global_flags() {
        let cli = Cli::try_parse_from([
            "tnpu", "verify", "--case", "4,8,4", "--case", "1,1,1", "--jobs", "2", "--log-level", "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Some(Commands::Verify(cmd)) => {
                assert_eq!(cmd.cases, vec![(4, 8, 4), (1, 1, 1)]);
                assert_eq!(cmd.jobs, Some(2));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_pack_name_list() {
        let cli = Cli::try_parse_from(["tnpu", "pack", "-i", "w", "-o", "w.bin", "--names", "wq,wk"]).unwrap();
        match cli.command {
            Some(Commands::Pack(cmd)) => assert_eq!(cmd.names, vec!["wq", "wk"]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn malformed_log_level_is_reported() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let err = init_tracing(&LoggingConfig::default(), Some("tnpu=loud")).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid log level"), "{err:#}");
    }

    #[test]
    fn rejects_malformed_case() {
        assert!(Cli::try_parse_from(["tnpu", "verify", "--case", "4,8"]).is_err());
        assert!(Cli::try_parse_from(["tnpu", "inspect", "w.bin", "--format", "yaml"]).is_err());
    }
}
