use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod routes;
mod shutdown;
mod sinks;
mod state;

#[derive(Parser, Debug)]
#[command(name = "quill", version, about = "Quill audit event pipeline")]
struct Cli {
    /// Configuration file (YAML). Defaults to ./quill.yaml when it exists.
    #[arg(long, short, global = true, env = "QUILL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP ingest server and the batcher (default).
    Serve {
        /// Override `server.bind`, e.g. 127.0.0.1:9000
        #[arg(long)]
        bind: Option<String>,
    },

    /// Write the events of a fallback file into the configured sink.
    Replay {
        /// Fallback JSON Lines file.
        file: PathBuf,

        /// Keep the file instead of renaming it to `<file>.replayed`.
        #[arg(long, default_value_t = false)]
        keep: bool,
    },

    /// Validate the configuration and print the effective settings.
    CheckConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.cmd.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => runtime.block_on(commands::serve::run(config, bind)),
        Command::Replay { file, keep } => {
            runtime.block_on(commands::replay::run(&config, &file, keep))
        }
        Command::CheckConfig => commands::check::run(&config, cli.config.as_deref()),
    }
}
