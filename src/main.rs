//! playdash - web dashboard for automation playbooks.
//!
//! Lists playbooks from a directory, runs them with an external runner and
//! reports the last result of each one.

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use playdash::core::{Config, PlaybookEntry, PlaybookService};
use playdash::server;

/// Web dashboard for automation playbooks
#[derive(Parser)]
#[command(name = "playdash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: .playdash.toml, then ~/.config/playdash/config.toml)
    #[arg(short, long, global = true, env = "PLAYDASH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory containing playbooks
    #[arg(short, long, global = true, env = "PLAYDASH_DIR")]
    dir: Option<String>,

    /// Where run state is saved
    #[arg(long, global = true, env = "PLAYDASH_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Program used to run a playbook
    #[arg(long, global = true, env = "PLAYDASH_RUNNER")]
    runner: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the dashboard (default)
    Serve {
        /// Host to bind to
        #[arg(long, env = "PLAYDASH_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "PLAYDASH_PORT")]
        port: Option<u16>,
    },

    /// List playbooks with their last status
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a playbook in the foreground and save its result
    Run {
        /// Playbook file name
        name: String,
    },

    /// Show the saved result of a playbook
    Result {
        /// Playbook file name
        name: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    if let Some(Commands::Completions { shell }) = cli.command {
        cmd_completions(shell);
        return Ok(());
    }

    let mut config = load_config(&cli)?;

    match cli.command {
        None => cmd_serve(config).await,
        Some(Commands::Serve { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_serve(config).await
        }
        Some(Commands::List { format }) => cmd_list(&config, &format),
        Some(Commands::Run { name }) => cmd_run(&config, &name).await,
        Some(Commands::Result { name }) => cmd_result(&config, &name),
        Some(Commands::Completions { .. }) => Ok(()),
    }
}

/// Load the config file and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };

    if let Some(dir) = &cli.dir {
        config.playbooks.dir.clone_from(dir);
    }
    if let Some(state_file) = &cli.state_file {
        config.state.file.clone_from(state_file);
    }
    if let Some(runner) = &cli.runner {
        config.runner.program.clone_from(runner);
    }

    Ok(config)
}

async fn cmd_serve(config: Config) -> Result<()> {
    let service = PlaybookService::open(&config);
    let count = service.list_playbooks().len();
    tracing::info!(
        playbooks = count,
        state_file = %service.state_file().display(),
        runner = %config.runner.program,
        "Catalog ready"
    );

    server::serve(service, &config.server).await
}

fn cmd_list(config: &Config, format: &str) -> Result<()> {
    let service = PlaybookService::open(config);
    let entries = service.list_playbooks();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        "text" => print_entries(&entries),
        other => anyhow::bail!("Unknown format '{}'. Use 'text' or 'json'.", other),
    }

    Ok(())
}

fn print_entries(entries: &[PlaybookEntry]) {
    if entries.is_empty() {
        println!("No playbooks found");
        return;
    }

    for entry in entries {
        let last_run = entry
            .last_run_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "Never run".to_string());
        println!("{:<8} {:<32} {}", entry.status, entry.name, last_run);
    }
}

async fn cmd_run(config: &Config, name: &str) -> Result<()> {
    let service = PlaybookService::open(config);
    service.list_playbooks();

    let result = service.run_now(name).await?;
    print!("{}", result.output);
    if !result.output.is_empty() && !result.output.ends_with('\n') {
        println!();
    }

    if result.success {
        eprintln!("{} succeeded in {}", name, result.run_time);
        Ok(())
    } else {
        anyhow::bail!("{} failed after {}", name, result.run_time)
    }
}

fn cmd_result(config: &Config, name: &str) -> Result<()> {
    let service = PlaybookService::open(config);
    println!("{}", serde_json::to_string_pretty(&service.result(name))?);
    Ok(())
}

fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "playdash", &mut io::stdout());
}
