#![forbid(unsafe_code)]

//! `code-relay-ctl` — terminal client for a `code-relay` server.
//!
//! Submits a local source file, prints the program's console as it
//! arrives, and forwards lines typed on stdin as program input.

use std::path::{Path, PathBuf};

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use code_relay::models::event::{ClientEvent, ServerEvent};

#[derive(Debug, Parser)]
#[command(
    name = "code-relay-ctl",
    about = "Run a source file on a code-relay server",
    version,
    long_about = None
)]
struct Cli {
    /// WebSocket endpoint of the server.
    #[arg(long, default_value = "ws://127.0.0.1:5000/ws")]
    url: String,

    /// Language name; inferred from the file extension when omitted.
    #[arg(long)]
    language: Option<String>,

    /// Source file to run.
    file: PathBuf,
}

/// Map a file extension to the server's language name.
fn language_for(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()? {
        "c" => Some("c"),
        "cpp" | "cc" | "cxx" => Some("cpp"),
        "java" => Some("java"),
        "js" | "mjs" => Some("javascript"),
        _ => None,
    }
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let Some(language) = args
        .language
        .clone()
        .or_else(|| language_for(&args.file).map(str::to_owned))
    else {
        eprintln!(
            "Error: cannot infer language of {}; pass --language",
            args.file.display()
        );
        std::process::exit(2);
    };

    let code = match tokio::fs::read_to_string(&args.file).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: cannot read {}: {err}", args.file.display());
            std::process::exit(2);
        }
    };

    match run(&args.url, language, code).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Failed to talk to server: {err}");
            eprintln!("Is code-relay listening on '{}'?", args.url);
            std::process::exit(1);
        }
    }
}

/// Drive one run and return the exit code to report.
async fn run(
    url: &str,
    language: String,
    code: String,
) -> std::result::Result<i32, Box<dyn std::error::Error>> {
    let (socket, _) = connect_async(url).await?;
    let (mut tx, mut rx) = socket.split();

    let request = serde_json::to_string(&ClientEvent::RunCode { language, code })?;
    tx.send(Message::Text(request.into())).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            frame = rx.next() => {
                let Some(frame) = frame else {
                    return Err("connection closed before the program finished".into());
                };
                let Message::Text(text) = frame? else {
                    continue;
                };
                let event: ServerEvent = serde_json::from_str(text.as_str())?;
                if let Some(code) = render(&event) {
                    return Ok(code);
                }
            }
            line = stdin.next_line(), if stdin_open => match line? {
                Some(text) => {
                    let input = serde_json::to_string(&ClientEvent::Input { text })?;
                    tx.send(Message::Text(input.into())).await?;
                }
                None => stdin_open = false,
            },
        }
    }
}

/// Print one event; returns the exit code once the run is over.
fn render(event: &ServerEvent) -> Option<i32> {
    match event {
        ServerEvent::Output { text } => {
            // Chunks arrive with their trailing newline stripped.
            println!("{text}");
            None
        }
        ServerEvent::Stderr { text } => {
            eprintln!("{text}");
            None
        }
        ServerEvent::InputRequest => None,
        ServerEvent::CompileError { text } => {
            eprintln!("{text}");
            Some(1)
        }
        ServerEvent::Error { text } => {
            eprintln!("Error: {text}");
            Some(1)
        }
        ServerEvent::Finished(exit) => {
            eprintln!("[{}]", exit.message);
            Some(exit.code.unwrap_or(1))
        }
    }
}
