//! infrakit CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "infrakit")]
#[command(about = "Synthesize CloudFormation templates from an infrakit app", long_about = None)]
struct Cli {
    /// Path to the app configuration
    #[arg(long, short, global = true, env = "INFRAKIT_CONFIG", default_value = "infrakit.kdl")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "INFRAKIT_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write templates and the manifest for the app's stacks
    Synth {
        /// Output directory
        #[arg(long, short, env = "INFRAKIT_OUT", default_value = "cdk.out")]
        out: PathBuf,
        /// Only synthesize these stacks (repeatable)
        #[arg(long = "stack", short = 's')]
        stacks: Vec<String>,
    },
    /// Check the configuration and assemble every stack without writing
    Validate,
    /// List stacks in deployment order
    List,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so listings and paths on stdout stay scriptable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Synth { out, stacks } => {
            for path in commands::synth(&cli.config, &out, &stacks)? {
                println!("{}", path.display());
            }
        }
        Commands::Validate => {
            let stacks = commands::validate(&cli.config)?;
            println!("Configuration is valid ({} stacks)", stacks);
        }
        Commands::List => {
            for entry in commands::list(&cli.config)? {
                println!("{}", entry);
            }
        }
    }

    Ok(())
}
