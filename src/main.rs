use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use sportschat::chat_api::{ChatClient, ChatConfig, DEFAULT_HOST};
use sportschat::export::write_transcript;
use sportschat::gui::run_gui;
use sportschat::session::{ChatSession, TicketedEvent, WorkerEvent};
use sportschat::settings::{ConnectionStatus, Settings, TransportMode};
use sportschat::worker::drive_request;
use std::io::{self, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Base URL of the sports knowledge-base service
    #[arg(long, env = "SPORTS_CHAT_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Timeout in seconds for whole-response queries
    #[arg(long, default_value_t = 30)]
    timeout_seconds: u64,

    /// Stream answers from /chat/stream instead of waiting for /chat
    #[arg(long, default_value_t = false)]
    stream: bool,

    /// Start the window in dark mode
    #[arg(long, default_value_t = false)]
    dark: bool,

    /// Force CLI mode (otherwise the window opens)
    #[arg(long, default_value_t = false)]
    cli: bool,

    /// Directory that receives exported chats
    #[arg(long, default_value = ".")]
    export_dir: PathBuf,

    /// In CLI mode, also write the transcript to the export directory
    #[arg(long, default_value_t = false)]
    export: bool,

    /// Question to ask (runs one CLI query)
    prompt: Option<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = ChatConfig {
        host: args.host.clone(),
        timeout_seconds: args.timeout_seconds,
        ..ChatConfig::default()
    };
    let settings = Settings {
        dark_mode: args.dark,
        transport: if args.stream {
            TransportMode::Streaming
        } else {
            TransportMode::Whole
        },
        ..Settings::default()
    };

    if args.cli || args.prompt.is_some() {
        let prompt = args
            .prompt
            .ok_or_else(|| anyhow!("CLI mode needs a question to ask"))?;
        let export_dir = args.export.then_some(args.export_dir);
        run_cli(config, settings.transport, &prompt, export_dir)?;
    } else {
        info!(host = %config.host, "opening chat window");
        run_gui(config, settings, args.export_dir)?;
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run_cli(
    config: ChatConfig,
    mode: TransportMode,
    prompt: &str,
    export_dir: Option<PathBuf>,
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Unable to create the async runtime")?;
    let client = ChatClient::new(config)?;
    let mut session = ChatSession::new(client.host().to_string());

    let request = session
        .submit(prompt, mode)
        .ok_or_else(|| anyhow!("The question is empty"))?;

    let mut events = Vec::new();
    let mut printed = 0;
    runtime.block_on(drive_request(&client, &request, |event| {
        if let WorkerEvent::Text(cumulative) = &event {
            print!("{}", &cumulative[printed..]);
            io::stdout().flush().ok();
            printed = cumulative.len();
        }
        events.push(event);
        ControlFlow::Continue(())
    }));

    for event in events {
        session.apply(TicketedEvent {
            ticket: request.ticket,
            event,
        });
    }

    let answer = session
        .conversation()
        .last()
        .ok_or_else(|| anyhow!("The conversation is empty"))?;
    let streamed_in_full = printed > 0 && answer.content.len() == printed;
    if printed > 0 {
        println!();
    }
    if !streamed_in_full {
        println!("{}", answer.content);
    }
    if !answer.sources.is_empty() {
        println!("\nSources:");
        for source in &answer.sources {
            println!("- {source}");
        }
    }
    eprintln!("Status: {}", session.status().label());

    if let Some(dir) = export_dir {
        let path = write_transcript(&dir, session.conversation(), Utc::now().date_naive())?;
        eprintln!("Transcript written to {}", path.display());
    }

    if session.status() == ConnectionStatus::Offline {
        bail!("The sports assistant service could not answer the question");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> ChatConfig {
        ChatConfig {
            host: "http://127.0.0.1:9".to_string(),
            ..ChatConfig::default()
        }
    }

    #[test]
    fn cli_fails_when_service_is_unreachable() {
        let result = run_cli(unreachable_config(), TransportMode::Whole, "History of Cricket", None);

        assert!(result.is_err());
    }

    #[test]
    fn cli_still_exports_before_failing() {
        let dir = tempfile::tempdir().unwrap();

        let result = run_cli(
            unreachable_config(),
            TransportMode::Streaming,
            "History of Cricket",
            Some(dir.path().to_path_buf()),
        );

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn cli_rejects_blank_prompt() {
        assert!(run_cli(unreachable_config(), TransportMode::Whole, "   ", None).is_err());
    }
}
