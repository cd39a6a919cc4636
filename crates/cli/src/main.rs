mod commands;
mod config;
mod logging;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use manifold_core::{ComposeError, FailurePolicy};

use commands::compose::ComposeArgs;
use logging::LogFormat;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// `--policy` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    FailFast,
    Continue,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::FailFast => FailurePolicy::FailFast,
            PolicyArg::Continue => FailurePolicy::Continue,
        }
    }
}

/// Compose declarative resource models into deployment manifests.
#[derive(Parser)]
#[command(
    name = "manifold",
    version,
    about = "Compose declarative resource models into deployment manifests"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log line format on stderr
    #[arg(long, global = true, default_value = "text", value_enum)]
    log_format: LogFormat,

    /// Project config file (defaults to ./manifold.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose a declaration file into manifest files
    Compose {
        /// Path to the root declaration file
        file: PathBuf,
        /// Directory manifests are written to (default: [output].dir or ./manifests)
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Print manifests to stdout instead of writing them
        #[arg(long)]
        dry_run: bool,
        /// What to do when a resource fails
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
    },

    /// Run every stage without writing, reporting all failing resources
    Check {
        /// Path to the root declaration file
        file: PathBuf,
    },

    /// List declared resources as `kind id name`
    List {
        /// Path to the root declaration file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::initialise_logging(cli.verbose, cli.log_format);

    let config = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(msg) => {
            report_error(&msg, cli.output, cli.quiet);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Compose {
            file,
            out_dir,
            dry_run,
            policy,
        } => {
            let args = ComposeArgs {
                file: &file,
                out_dir,
                dry_run,
                policy: policy.map(FailurePolicy::from),
            };
            commands::compose::cmd_compose(args, &config, cli.output, cli.quiet);
        }
        Commands::Check { file } => {
            commands::check::cmd_check(&file, &config, cli.output, cli.quiet);
        }
        Commands::List { file } => {
            commands::list::cmd_list(&file, cli.output, cli.quiet);
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{{\"error\": \"{}\"}}", msg.replace('"', "\\\""));
        }
    }
}

/// Structured errors go to stderr as JSON regardless of `--quiet`, so
/// tooling always gets a machine-readable reason.
pub(crate) fn report_compose_error(e: &ComposeError, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Json => {
            let err_json = serde_json::to_string_pretty(&e.to_json_value())
                .unwrap_or_else(|_| format!("{{\"error\": \"{:?}\"}}", e));
            eprintln!("{}", err_json);
        }
        OutputFormat::Text => {
            if !quiet {
                eprintln!("error: {}", e);
            }
        }
    }
}
