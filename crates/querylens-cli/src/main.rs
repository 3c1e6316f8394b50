//! # querylens
//!
//! Terminal chat client with live query analysis. A thin presentation
//! layer over `ChatController`: reads lines from stdin, prints transcript
//! updates and live analysis previews as they arrive.

#![deny(unsafe_code)]

mod command;
mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use querylens_client::controller::{ChatController, ClientEvent};
use querylens_settings::QueryLensSettings;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use command::{Command, HELP};

/// QueryLens terminal client.
#[derive(Parser, Debug)]
#[command(name = "querylens", version, about = "Chat with live query analysis")]
struct Cli {
    /// Settings file (defaults to `~/.querylens/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Chat API base URL.
    #[arg(long)]
    api_url: Option<String>,

    /// Analysis socket base URL.
    #[arg(long)]
    ws_url: Option<String>,

    /// Analysis language.
    #[arg(long)]
    language: Option<String>,

    /// Log level (overrides settings and `QUERYLENS_LOG_LEVEL`).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<QueryLensSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(querylens_settings::settings_path);
        let mut settings = querylens_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(url) = &self.api_url {
            settings.backend.api_url.clone_from(url);
        }
        if let Some(url) = &self.ws_url {
            settings.backend.ws_url.clone_from(url);
        }
        if let Some(language) = &self.language {
            settings.backend.language.clone_from(language);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

/// Print controller events as they happen.
async fn print_events(controller: Arc<ChatController>, mut events: broadcast::Receiver<ClientEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::debug!(missed, "event printer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            ClientEvent::AnalysisUpdated(_) => {
                println!("  {}", render::live_preview(&controller.live_analysis()));
            }
            ClientEvent::MessageAppended(message) => {
                println!("{}", render::message_line(&message));
            }
            ClientEvent::TranscriptReset(messages) => {
                println!("{}", render::info(&format!("── {} message(s) ──", messages.len())));
                for message in &messages {
                    println!("{}", render::message_line(message));
                }
            }
            ClientEvent::SessionAssigned(id) => {
                println!("{}", render::info(&format!("session {}", id.short())));
            }
            ClientEvent::BackendError { operation, message } => {
                eprintln!("{}", render::error(&format!("{operation} failed: {message}")));
            }
            ClientEvent::AnalysisCleared | ClientEvent::LoadingChanged(_) => {}
        }
    }
}

/// Analyze `text`, give the analysis a moment to land, then submit it.
async fn say(controller: &ChatController, text: &str, quiet: Duration) {
    let mut events = controller.subscribe();
    controller.on_input(text);
    let landed = tokio::time::timeout(quiet + Duration::from_secs(1), async {
        while let Ok(event) = events.recv().await {
            if matches!(event, ClientEvent::AnalysisUpdated(_)) {
                break;
            }
        }
    });
    let _ = landed.await;
    if let Some(reply) = controller.submit(text) {
        let _ = reply.await;
    }
}

async fn run_command(controller: &ChatController, command: Command, quiet: Duration) -> bool {
    match command {
        Command::Empty => {}
        Command::Say(text) => say(controller, &text, quiet).await,
        Command::Analyze(text) => controller.on_input(&text),
        Command::New => match controller.start_new_session().await {
            Some(id) => println!("{}", render::info(&format!("new session {}", id.short()))),
            None => println!("{}", render::info("new session (id pending)")),
        },
        Command::History => match controller.conversations().await {
            Ok(list) if list.is_empty() => println!("{}", render::info("no conversations")),
            Ok(list) => {
                for c in list {
                    println!("{}  {}  {}", c.id, c.title, c.created_at.unwrap_or_default());
                }
            }
            Err(e) => eprintln!("{}", render::error(&e.to_string())),
        },
        Command::Load(id) => {
            if let Err(e) = controller.load_conversation(&id).await {
                eprintln!("{}", render::error(&e.to_string()));
            }
        }
        Command::Facts => match controller.user_facts().await {
            Ok(facts) if facts.is_empty() => println!("{}", render::info("no facts")),
            Ok(facts) => {
                for fact in facts {
                    println!("{}: {}", fact.key, fact.value_text());
                }
            }
            Err(e) => eprintln!("{}", render::error(&e.to_string())),
        },
        Command::Models => match controller.models().await {
            Ok(models) => println!("{}", models.join("\n")),
            Err(e) => eprintln!("{}", render::error(&e.to_string())),
        },
        Command::Model(None) => match controller.current_model().await {
            Ok(model) => println!("{model}"),
            Err(e) => eprintln!("{}", render::error(&e.to_string())),
        },
        Command::Model(Some(name)) => match controller.switch_model(&name).await {
            Ok(()) => println!("{}", render::info(&format!("switched to {name}"))),
            Err(e) => eprintln!("{}", render::error(&e.to_string())),
        },
        Command::Mode(None) => println!("{}", controller.processing_mode().as_str()),
        Command::Mode(Some(mode)) => {
            controller.set_processing_mode(mode);
            println!("{}", render::info(&format!("processing mode {}", mode.as_str())));
        }
        Command::Tools => match controller.mcp_tools().await {
            Ok(tools) if tools.is_empty() => println!("{}", render::info("no tools")),
            Ok(tools) => {
                for tool in tools {
                    println!("{}  {}", tool.name, tool.description.unwrap_or_default());
                }
            }
            Err(e) => eprintln!("{}", render::error(&e.to_string())),
        },
        Command::Status => {
            let session = controller
                .session_id()
                .map_or_else(|| "(none)".to_owned(), |id| id.to_string());
            println!("user     {}", controller.user_id());
            println!("session  {session}");
            println!("channel  {}", controller.channel_state().as_str());
            println!("mode     {}", controller.processing_mode().as_str());
            println!("loading  {}", controller.is_loading());
        }
        Command::Help => println!("{HELP}"),
        Command::Invalid(reason) => eprintln!("{}", render::error(&reason)),
        Command::Quit => return false,
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;

    if settings.logging.json {
        querylens_logging::init_json_subscriber(&settings.logging.level);
    } else {
        querylens_logging::init_subscriber(&settings.logging.level);
    }

    let controller = Arc::new(
        ChatController::from_settings(&settings).context("Failed to set up the chat client")?,
    );
    controller.open().context("Failed to open the analysis channel")?;
    let printer = tokio::spawn(print_events(controller.clone(), controller.subscribe()));

    println!(
        "{}",
        render::info(&format!(
            "querylens {}  user {}  (/help for commands)",
            querylens_core::constants::VERSION,
            controller.user_id()
        ))
    );

    let quiet = Duration::from_millis(settings.analysis.debounce_ms);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        if !run_command(&controller, Command::parse(&line), quiet).await {
            break;
        }
    }

    controller.close();
    printer.abort();
    Ok(())
}
