mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hwc")]
#[command(about = "Declarative HuaweiCloud resources", long_about = None)]
struct Cli {
    /// Manifest file
    #[arg(
        short = 'f',
        long = "file",
        global = true,
        env = "HWCFLOW_MANIFEST",
        default_value = "hwcflow.yaml"
    )]
    file: PathBuf,

    /// Log debug output (request URLs and payloads)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the manifest without contacting the cloud
    Validate,
    /// Show the changes an apply would make
    Plan,
    /// Create, update and delete resources to match the manifest
    Apply {
        /// Apply without confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete every resource recorded in state
    Destroy {
        /// Destroy without confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Re-read every resource in state from the cloud
    Refresh,
    /// List the resources recorded in state
    State {
        /// Print the attributes as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete leftover acceptance-test resources
    Sweep {
        /// Region to sweep (defaults to the provider region)
        #[arg(short, long)]
        region: Option<String>,
        /// Sweepers to run (all when omitted)
        #[arg(short = 's', long = "sweeper")]
        sweepers: Vec<String>,
        /// Sweep without confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Check the provider credentials
    Auth,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries command output, logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let filter = if cli.verbose {
        filter.add_directive(tracing::Level::DEBUG.into())
    } else {
        filter
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    match cli.command {
        Commands::Version => {
            println!("hwcflow {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Validate => {
            commands::validate::handle(&cli.file).await?;
        }
        Commands::Plan => {
            commands::plan::handle(&cli.file).await?;
        }
        Commands::Apply { yes } => {
            commands::apply::handle(&cli.file, yes).await?;
        }
        Commands::Destroy { yes } => {
            commands::destroy::handle(&cli.file, yes).await?;
        }
        Commands::Refresh => {
            commands::refresh::handle(&cli.file).await?;
        }
        Commands::State { json } => {
            commands::state::handle(&cli.file, json).await?;
        }
        Commands::Sweep {
            region,
            sweepers,
            yes,
        } => {
            commands::sweep::handle(&cli.file, region, sweepers, yes).await?;
        }
        Commands::Auth => {
            commands::auth::handle(&cli.file).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sweep_arguments() {
        let cli = Cli::parse_from([
            "hwc",
            "sweep",
            "--region",
            "cn-south-1",
            "-s",
            "huaweicloud_as_group",
            "-s",
            "huaweicloud_drs_job",
        ]);
        match cli.command {
            Commands::Sweep {
                region,
                sweepers,
                yes,
            } => {
                assert_eq!(region.as_deref(), Some("cn-south-1"));
                assert_eq!(sweepers, vec!["huaweicloud_as_group", "huaweicloud_drs_job"]);
                assert!(!yes);
            }
            _ => panic!("expected sweep"),
        }
        assert_eq!(cli.file, PathBuf::from("hwcflow.yaml"));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::parse_from(["hwc", "plan", "--verbose"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Plan));
    }
}
