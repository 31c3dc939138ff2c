//! Read command handler.
//!
//! Wires the speech providers, spawns the playback controller and runs the
//! console loop until the text ends or the user quits.
//!
//! Provider layout:
//!
//! | Mode                       | Primary             | Secondary    |
//! |----------------------------|---------------------|--------------|
//! | `--endpoint <url>`         | HTTP speech + rodio | tone + rodio |
//! | no endpoint or `--offline` | tone + rodio        | tone + rodio |

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use narrate_core::{
    AudioGenerator, AudioSink, NarrationError, NarrationEvent, NarrationSettings, PlaybackStatus,
    load_settings, save_settings, validate_settings,
};
use narrate_engine::{
    ControllerHandle, FallbackProvider, HttpSpeechConfig, HttpSpeechGenerator, PlaybackController,
    ProviderPair, RodioSink, ToneGenerator,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::commands::ReadArgs;
use crate::console::{self, ConsoleCommand, HELP};
use crate::error::CliError;
use crate::presentation::{describe, describe_snapshot, to_json_line};

/// Execute the read command.
pub async fn execute(args: ReadArgs, settings_path: Option<&Path>) -> Result<()> {
    let text =
        std::fs::read_to_string(&args.file).map_err(|e| CliError::read_file(&args.file, &e))?;
    let settings = resolve_settings(&args, settings_path)?;

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let provider = Arc::new(build_provider(&args, event_tx.clone())?);
    let handle =
        PlaybackController::spawn_with_events(provider.clone(), provider, settings, event_tx);

    let count = handle.load_text(&text).await.map_err(CliError::from)?;
    if count == 0 {
        return Err(CliError::from(NarrationError::EmptyContent).into());
    }
    if let Some(from) = args.from {
        handle
            .seek(from.saturating_sub(1))
            .await
            .map_err(CliError::from)?;
    }
    handle.play().await.map_err(CliError::from)?;

    if !args.json {
        println!("{count} paragraphs. Type h and Enter for controls.");
    }
    let result = run_console(&handle, &mut events, args.json).await;

    if let Err(e) = handle.shutdown().await {
        tracing::debug!(error = %e, "Controller already stopped");
    }
    result
}

/// Settings file, then command-line flags, then validation.
fn resolve_settings(args: &ReadArgs, settings_path: Option<&Path>) -> Result<NarrationSettings> {
    let mut settings = settings_path.map(load_settings).unwrap_or_default();
    args.apply(&mut settings);
    validate_settings(&settings).map_err(|e| CliError::Config(e.to_string()))?;

    if args.save_settings {
        match settings_path {
            Some(path) => {
                save_settings(path, &settings).map_err(|e| CliError::Config(e.to_string()))?;
                tracing::info!(path = %path.display(), "Saved settings");
            }
            None => tracing::warn!("No settings path available, not saving"),
        }
    }
    Ok(settings)
}

fn build_provider(
    args: &ReadArgs,
    events: mpsc::UnboundedSender<NarrationEvent>,
) -> Result<FallbackProvider, CliError> {
    let sink: Arc<dyn AudioSink> =
        Arc::new(RodioSink::spawn().map_err(|e| CliError::Audio(e.to_string()))?);
    let tone: Arc<dyn AudioGenerator> = Arc::new(ToneGenerator::new());

    let primary: Arc<dyn AudioGenerator> = match (&args.endpoint, args.offline) {
        (Some(endpoint), false) => {
            let mut config = HttpSpeechConfig::new(endpoint.clone());
            if let Some(key) = &args.api_key {
                config = config.with_api_key(key.clone());
            }
            if let Some(model) = &args.model {
                config = config.with_model(model.clone());
            }
            tracing::info!(endpoint = %endpoint, model = %config.model, "Using HTTP speech endpoint");
            Arc::new(HttpSpeechGenerator::new(config))
        }
        (None, false) => {
            tracing::info!("No speech endpoint configured, using the tone generator");
            Arc::clone(&tone)
        }
        (_, true) => Arc::clone(&tone),
    };

    let provider = FallbackProvider::new(
        ProviderPair::new(primary, Arc::clone(&sink)),
        ProviderPair::new(tone, sink),
    )
    .with_listener(move |notice| {
        let _ = events.send(NarrationEvent::ProviderFallback(notice));
    });
    Ok(provider)
}

/// Print events and act on console commands until the end of the text.
async fn run_console(
    handle: &ControllerHandle,
    events: &mut mpsc::UnboundedReceiver<NarrationEvent>,
    json: bool,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut status = PlaybackStatus::Idle;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if json {
                    println!("{}", to_json_line(&event));
                } else {
                    println!("{}", describe(&event));
                }
                match event {
                    NarrationEvent::StatusChanged { status: next } => status = next,
                    NarrationEvent::EndOfContent => break,
                    // Nobody is left to press play again.
                    NarrationEvent::Error { .. } if !stdin_open => break,
                    _ => {}
                }
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    if !handle_line(handle, &line, status).await? {
                        break;
                    }
                }
                None => {
                    tracing::debug!("stdin closed, narrating to the end");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

/// Run one console line. Returns `false` to quit.
async fn handle_line(handle: &ControllerHandle, line: &str, status: PlaybackStatus) -> Result<bool> {
    let command = match console::parse(line) {
        Ok(Some(command)) => command,
        Ok(None) => return Ok(true),
        Err(e) => {
            eprintln!("{e}");
            return Ok(true);
        }
    };

    let result = match command {
        ConsoleCommand::Toggle => {
            if status.is_active() && status != PlaybackStatus::Paused {
                handle.pause().await
            } else {
                handle.play().await
            }
        }
        ConsoleCommand::Next => handle.skip_forward().await,
        ConsoleCommand::Back => handle.skip_backward().await,
        ConsoleCommand::Stop => handle.stop().await,
        ConsoleCommand::Seek(paragraph) => handle.seek(paragraph).await,
        ConsoleCommand::Status => handle
            .snapshot()
            .await
            .map(|snapshot| println!("{}", describe_snapshot(&snapshot))),
        ConsoleCommand::Help => {
            println!("{HELP}");
            Ok(())
        }
        ConsoleCommand::Quit => return Ok(false),
    };

    match result {
        Ok(()) => Ok(true),
        Err(e @ NarrationError::ControllerClosed) => Err(CliError::from(e).into()),
        Err(e) => {
            eprintln!("{e}");
            Ok(true)
        }
    }
}
