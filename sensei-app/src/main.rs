//! bonsai-sensei: bonsai care assistant with confirmation-gated record changes.

mod assistant;
mod commands;
mod config;
mod confirmations;
mod gateway;
mod routes;
mod server;
mod session;
#[cfg(test)]
mod testing;
mod turn;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

const DEFAULT_LOG_FILTER: &str = "info,bonsai_sensei=debug,sensei_app=debug,sensei_tools=debug,sensei_channels=debug,sensei_llm=debug,tower_http=info";

#[derive(Debug, Parser)]
#[command(name = "bonsai-sensei", version, about = "Bonsai care assistant")]
struct Cli {
    /// Config file (defaults to ~/.bonsai-sensei/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API and chat gateway (default).
    Serve,
    /// Load and validate config, then check the record store.
    Doctor,
    /// Run a single assistant turn and print the reply.
    Ask { user: String, message: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;
    install_panic_hook();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::serve(cli.config).await,
        Command::Doctor => server::doctor(cli.config).await,
        Command::Ask { user, message } => server::ask(cli.config, &user, &message).await,
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let log_format = std::env::var("SENSEI_LOG_FORMAT")
        .unwrap_or_else(|_| "json".to_string())
        .to_ascii_lowercase();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match log_format.as_str() {
        "json" => builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .init(),
        "pretty" => builder.pretty().init(),
        "compact" => builder.compact().init(),
        other => {
            return Err(anyhow::anyhow!(
                "unsupported SENSEI_LOG_FORMAT={other:?}; expected json, pretty or compact"
            ));
        }
    }

    tracing::info!(log_format = %log_format, "tracing initialized");
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::error!(
            panic_location = %location,
            panic_payload = %panic_payload_to_string(panic_info.payload()),
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["bonsai-sensei"]).expect("parse");
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn ask_takes_user_and_message() {
        let cli = Cli::try_parse_from([
            "bonsai-sensei",
            "--config",
            "/tmp/sensei.toml",
            "ask",
            "42",
            "how often should I water?",
        ])
        .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/sensei.toml")));
        match cli.command {
            Some(Command::Ask { user, message }) => {
                assert_eq!(user, "42");
                assert_eq!(message, "how often should I water?");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
