//! Jarvix CLI
//!
//! Terminal chat client for the Jarvix assistant backend.

use clap::Parser;
use jarvix::config::{data_dir, JarvixConfig};
use jarvix::markup;
use jarvix::session::{ClientSession, VoiceUpdate};
use jarvix::transcript::{Applied, Transcript};
use jarvix::tui::{clipboard, find_code_block, parse_command, App, LocalCommand};
use jarvix::voice::{CommandRecognizer, CommandSpeaker};
use jarvix::{Connection, InboundEvent};
use std::io::{self, BufRead};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Jarvix - chat with your assistant from the terminal
#[derive(Parser, Debug)]
#[command(name = "jarvix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// WebSocket endpoint of the backend
    #[arg(long)]
    url: Option<String>,

    /// Path to config.toml
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Do not read finished responses aloud
    #[arg(long)]
    no_tts: bool,

    /// Verbose output: debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable TUI and use plain text mode
    #[arg(long)]
    no_tui: bool,

    /// Prompt to send right away
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,
}

impl Cli {
    /// Overlay command line flags on the loaded config.
    fn apply(&self, mut config: JarvixConfig) -> JarvixConfig {
        if let Some(url) = &self.url {
            config = config.with_url(url.clone());
        }
        if self.no_tts {
            config = config.with_tts(false);
        }
        if self.verbose {
            config = config.with_debug(true);
        }
        config
    }

    fn initial_prompt(&self) -> Option<String> {
        let prompt = self.prompt.join(" ");
        (!prompt.trim().is_empty()).then_some(prompt)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.apply(JarvixConfig::load(cli.config.as_deref())?);

    if cli.no_tui {
        run_plain_mode(cli, config).await
    } else {
        run_tui_mode(cli, config).await
    }
}

fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    })
}

fn build_session(connection: &Connection, config: &JarvixConfig) -> ClientSession {
    ClientSession::new(
        Box::new(connection.outbox.clone()),
        Box::new(CommandSpeaker::new(config.speak_command.clone())),
        Box::new(CommandRecognizer::new(config.listen_command.clone())),
    )
    .with_tts(config.tts)
}

async fn run_tui_mode(cli: Cli, config: JarvixConfig) -> anyhow::Result<()> {
    // The screen belongs to the TUI, so logs go to a file
    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("jarvix.log"))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config.debug))
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();

    info!("Starting Jarvix (tui) against {}", config.url);

    let connection = Connection::open(config.url.clone());
    let mut session = build_session(&connection, &config);
    let (_, inbound, state, socket) = connection.into_parts();

    if let Some(prompt) = cli.initial_prompt() {
        session.submit(&prompt);
    }

    let mut app = App::new(session, inbound, state, config.url.clone())?;
    app.run().await?;
    drop(app);

    socket.abort();
    Ok(())
}

async fn run_plain_mode(cli: Cli, config: JarvixConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config.debug))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    info!("Starting Jarvix (plain mode) against {}", config.url);

    let connection = Connection::open(config.url.clone());
    let mut session = build_session(&connection, &config);
    let (_, mut inbound, _state, socket) = connection.into_parts();

    // Spawn blocking thread to read from stdin
    let (line_tx, mut line_rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    });

    if let Some(prompt) = cli.initial_prompt() {
        if let Some(id) = session.submit(&prompt) {
            println!("[{}] {}", id, session_status(session.transcript(), &id));
        }
    }

    // After stdin closes, keep going until every submitted turn is done
    let mut stdin_open = true;
    loop {
        if !stdin_open && session.transcript().in_flight() == 0 {
            break;
        }
        tokio::select! {
            line = line_rx.recv(), if stdin_open => {
                match line {
                    Some(line) => {
                        if !handle_plain_line(&mut session, &line).await {
                            break;
                        }
                    }
                    None => {
                        debug!(
                            "stdin closed, waiting on {} turn(s)",
                            session.transcript().in_flight()
                        );
                        stdin_open = false;
                    }
                }
            }
            event = inbound.recv() => {
                let Some(event) = event else {
                    warn!("connection closed");
                    break;
                };
                let applied = session.handle_event(event.clone());
                if let Some(text) = plain_report(session.transcript(), &event, &applied) {
                    println!("{}", text);
                }
            }
        }
    }

    session.stop_speaking();
    socket.abort();
    Ok(())
}

/// Handle one line of plain-mode input. Returns `false` to quit.
async fn handle_plain_line(session: &mut ClientSession, line: &str) -> bool {
    let Some(parsed) = parse_command(line) else {
        if let Some(id) = session.submit(line) {
            println!("[{}] {}", id, session_status(session.transcript(), &id));
        }
        return true;
    };

    match parsed.command {
        LocalCommand::Help => println!("{}", LocalCommand::help_text()),
        LocalCommand::Tts => {
            let on = session.toggle_tts();
            println!("Voice output {}.", if on { "on" } else { "off" });
        }
        LocalCommand::Voice => {
            let mut recognition = session.start_listening();
            while let Some(event) = recognition.next().await {
                match session.handle_recognition(event) {
                    Some(VoiceUpdate::Status(text)) | Some(VoiceUpdate::Error(text)) => {
                        println!("{}", text)
                    }
                    Some(VoiceUpdate::Submitted(id)) => {
                        println!("[{}] {}", id, session_status(session.transcript(), &id));
                    }
                    Some(VoiceUpdate::Dismiss) => break,
                    None => {}
                }
            }
        }
        LocalCommand::Copy => match parsed.copy_index() {
            Some(index) => match find_code_block(session.transcript(), index) {
                Some(code) => match clipboard::copy_text(&code) {
                    Ok(()) => println!("Copied code block {index}."),
                    Err(e) => println!("Copy failed: {e}"),
                },
                None => println!("No code block {index}."),
            },
            None => println!("Usage: /copy N"),
        },
        LocalCommand::Clear => println!("{}", "\n".repeat(40)),
        LocalCommand::Quit => return false,
    }
    true
}

fn session_status(transcript: &Transcript, id: &jarvix::CorrelationId) -> String {
    transcript
        .get(id)
        .map(|turn| format!("{} {}", turn.status.glyph(), turn.status.label()))
        .unwrap_or_default()
}

/// Plain-text line for an applied event. Stream fragments are printed in
/// one piece when the turn finishes.
fn plain_report(transcript: &Transcript, event: &InboundEvent, applied: &Applied) -> Option<String> {
    if *applied == Applied::Ignored {
        return None;
    }
    let turn = transcript.get(event.id())?;
    let header = format!("[{}] {} {}", turn.id, turn.status.glyph(), turn.status.label());
    match (event, applied) {
        (InboundEvent::StartProcessing { .. }, _) => Some(header),
        (InboundEvent::Log { .. }, _) => turn
            .logs
            .last()
            .map(|entry| format!("[{}]   {}", turn.id, markup::to_plain(entry))),
        (InboundEvent::EndProcessing { .. }, Applied::Finished { .. }) => {
            let response = turn.response_markup().map(markup::to_plain).unwrap_or_default();
            if response.trim().is_empty() {
                Some(header)
            } else {
                Some(format!("{}\n{}", response.trim_end(), header))
            }
        }
        _ => None,
    }
}
