//! Binary entry point: loads settings, wires the engine to the operating
//! system and chat backend, then runs the terminal session.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use jarvis::ai::build_fallback;
use jarvis::config::{Provider, Settings, CONFIG_PATH};
use jarvis::console::{prompt_for_api_key, Console};
use jarvis::engine::Engine;
use jarvis::speech::{SpeechIo, VoiceHandler};
use jarvis::system::SystemController;
use jarvis::worker::{BlockingPool, EngineHandle};

/// Blocking speech jobs allowed at once: one capture plus one utterance.
const SPEECH_WORKERS: usize = 2;

#[derive(Debug, Parser)]
#[command(name = "jarvis", version, about = "Just A Rather Very Intelligent System")]
struct Cli {
    /// Settings file.
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Do not speak replies.
    #[arg(long)]
    no_voice: bool,

    /// Start in hands-free listening mode.
    #[arg(long)]
    handsfree: bool,

    /// Answer a single request and exit.
    #[arg(long, value_name = "TEXT")]
    once: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli);
    let engine = Engine::new(Box::new(SystemController::new()), build_fallback(&settings));

    if let Some(text) = cli.once {
        let mut engine = engine;
        println!("{}", engine.process(&text).await);
        return Ok(());
    }

    let voice =
        VoiceHandler::from_settings(&settings).enabled(settings.voice_enabled && !cli.no_voice);
    let speech: Arc<dyn SpeechIo> = Arc::new(voice);
    let (handle, worker) = EngineHandle::spawn(engine);
    let mut console = Console::new(
        handle,
        speech,
        BlockingPool::new(SPEECH_WORKERS),
        settings,
    );
    console
        .run(BufReader::new(tokio::io::stdin()), cli.handsfree)
        .await?;
    drop(console);
    worker.await?;
    Ok(())
}

/// Loads settings and asks for a Gemini key when none is configured.
fn load_settings(cli: &Cli) -> Settings {
    let mut settings = Settings::load(&cli.config).with_env_overrides();
    let needs_key = settings.provider == Provider::Gemini && settings.api_key().is_none();
    if !needs_key {
        info!(provider = ?settings.provider, "configuration loaded");
        return settings;
    }
    if cli.once.is_some() || !std::io::stdin().is_terminal() {
        return settings;
    }
    match prompt_for_api_key(std::io::stdin().lock(), std::io::stdout()) {
        Ok(Some(key)) => match settings.set_api_key(key) {
            Ok(()) => println!("API key saved successfully!"),
            Err(err) => warn!(%err, "could not save API key"),
        },
        Ok(None) => {}
        Err(err) => warn!(%err, "could not read API key"),
    }
    settings
}
