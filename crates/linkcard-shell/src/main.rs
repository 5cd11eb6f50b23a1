//! linkcard - session commands and route gating for the card builder.
//!
//! Signs in against the linkcard API, keeps the session renewed in the
//! background and reports what the route guards decide.

mod app;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;

#[derive(Parser, Debug)]
#[command(name = "linkcard", version, about = "Manage a linkcard session from the terminal")]
struct Args {
    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with email and password
    Login {
        /// Defaults to the last email used
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Sign in with an identity provider token
    Provider {
        /// Provider name, e.g. google
        provider: String,
        #[arg(long)]
        id_token: String,
    },
    /// Clear the stored session
    Logout,
    /// Show the stored session and token health
    Status,
    /// Run the route guard for a path and print its decision
    Visit { route: String },
    /// Keep the session renewed until interrupted
    Run,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    // RUST_LOG controls the level (e.g. RUST_LOG=linkcard_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path.file_name().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("linkcard.log"));
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let _log_guard = init_tracing(args.log_file.as_deref());
    info!("linkcard starting");

    let mut app = App::new()?;

    match args.command {
        Command::Login { email } => app.login(email).await,
        Command::Signup { name, email } => app.signup(&name, &email).await,
        Command::Provider { provider, id_token } => app.provider_login(&provider, &id_token).await,
        Command::Logout => {
            app.logout();
            Ok(())
        }
        Command::Status => {
            app.status();
            Ok(())
        }
        Command::Visit { route } => app.visit(&route).await,
        Command::Run => app.run().await,
    }
}
