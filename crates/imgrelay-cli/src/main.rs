mod commands;
mod logging;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::replicate::Overrides;
use commands::{exit_code_for, EXIT_PREREQ_MISSING};
use imgrelay_runtime::{check_transfer_prereqs, format_missing, DockerCli};
use imgrelay_schema::ProvisionPolicy;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

/// Replicate container images from a source registry region into every
/// destination region, pushing only the tags each destination is missing.
#[derive(Debug, Parser)]
#[command(name = "imgrelay", version, about)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Region whose repositories are replicated.
    #[arg(long, value_name = "REGION")]
    source_region: Option<String>,

    /// Destination region (repeatable; replaces the configured list).
    #[arg(long = "destination-region", value_name = "REGION")]
    destination_regions: Vec<String>,

    /// Only replicate repositories whose name contains a match of this regex.
    #[arg(long, value_name = "REGEX")]
    pattern: Option<String>,

    /// Destination provisioning policy: per-repository or first-match.
    #[arg(long, value_name = "POLICY")]
    provision: Option<ProvisionPolicy>,

    /// Assume source images are already in the local store.
    #[arg(long, default_value_t = false)]
    skip_pull: bool,

    /// Tag images for the destinations but do not push them.
    #[arg(long, default_value_t = false)]
    skip_push: bool,

    /// AWS credentials profile.
    #[arg(long)]
    profile: Option<String>,

    /// Attempts per pull, push and listing call.
    #[arg(long, value_name = "N")]
    max_attempts: Option<u32>,

    /// Output the run report as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            source_region: self.source_region.clone(),
            destination_regions: self.destination_regions.clone(),
            pattern: self.pattern.clone(),
            provision: self.provision,
            skip_pull: self.skip_pull,
            skip_push: self.skip_push,
            profile: self.profile.clone(),
            max_attempts: self.max_attempts,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    logging::init();

    if let Some(Commands::Completions { shell }) = cli.command {
        return finish(commands::completions::run::<Cli>(
            shell,
            &mut std::io::stdout(),
        ));
    }

    let config = match commands::replicate::load_config(cli.config.as_deref(), &cli.overrides()) {
        Ok(config) => config,
        Err(msg) => return finish(Err(msg)),
    };

    if std::env::var("IMGRELAY_SKIP_PREREQS").as_deref() != Ok("1") {
        let docker = DockerCli::new();
        let missing = check_transfer_prereqs(docker.program());
        if !missing.is_empty() {
            let msg = format_missing(&missing);
            error!("{msg}");
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_PREREQ_MISSING);
        }
    }

    finish(commands::replicate::run(config, cli.json))
}

fn finish(result: Result<u8, String>) -> ExitCode {
    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}
