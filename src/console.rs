/*
 * @file console.rs
 * @brief Terminal front end for Jarvis
 * @author Kevin Thomas
 * @date 2025
 *
 * MIT License
 *
 * Copyright (c) 2025 Kevin Thomas
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Terminal front end.
//!
//! Reads lines, hands them to the engine worker, prints and speaks the
//! replies. Slash commands switch to voice input or manage the session.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::commands;
use crate::config::{validate_api_key, Settings, VOICE_RATE_RANGE, VOICE_VOLUME_RANGE};
use crate::error::{ConfigError, SpeechError};
use crate::speech::{self, SpeechIo, LISTEN_TIMEOUT, MAX_PHRASE};
use crate::text;
use crate::worker::{BlockingPool, EngineHandle};

/// Phrase that ends hands-free listening.
const STOP_PHRASE: &str = "stop listening";

const HELP: &str = "Console commands:
- /voice      speak one command
- /handsfree  listen continuously (start with the wake word, say \"stop listening\" to return)
- /clear      forget the conversation
- /history    show the conversation (/history json for a JSON export)
- /rate <n>   set the speech rate (50-300 words per minute)
- /volume <x> set the speech volume (0.0-1.0)
- /settings   show the voice settings
- /help       show this help
- /quit       exit";

/// One line of console input.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Voice,
    HandsFree,
    Clear,
    History,
    /// History as pretty-printed JSON.
    HistoryJson,
    SetRate(u32),
    SetVolume(f32),
    Settings,
    Help,
    Quit,
    /// Known command with a missing or unparsable argument.
    Usage(&'static str),
    /// Unrecognised slash command.
    Unknown(String),
    /// Text for the assistant.
    Say(String),
    Empty,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if !line.starts_with('/') {
            return Self::Say(line.to_string());
        }
        let lowered = line.to_lowercase();
        let mut words = lowered.split_whitespace();
        let command = words.next().unwrap_or_default();
        let argument = words.next();
        match (command, argument) {
            ("/voice" | "/listen", None) => Self::Voice,
            ("/handsfree", None) => Self::HandsFree,
            ("/clear", None) => Self::Clear,
            ("/history", None) => Self::History,
            ("/history", Some("json")) => Self::HistoryJson,
            ("/rate", arg) => arg
                .and_then(|arg| arg.parse().ok())
                .map_or(Self::Usage("Usage: /rate <50-300>"), Self::SetRate),
            ("/volume", arg) => arg
                .and_then(|arg| arg.parse::<f32>().ok())
                .filter(|volume| volume.is_finite())
                .map_or(Self::Usage("Usage: /volume <0.0-1.0>"), Self::SetVolume),
            ("/settings", None) => Self::Settings,
            ("/help" | "/?", None) => Self::Help,
            ("/quit" | "/exit", None) => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// Interactive session bound to an engine worker.
pub struct Console<W: Write> {
    engine: EngineHandle,
    speech: Arc<dyn SpeechIo>,
    pool: BlockingPool,
    settings: Settings,
    out: W,
}

impl Console<std::io::Stdout> {
    pub fn new(
        engine: EngineHandle,
        speech: Arc<dyn SpeechIo>,
        pool: BlockingPool,
        settings: Settings,
    ) -> Self {
        Self::with_output(engine, speech, pool, settings, std::io::stdout())
    }
}

impl<W: Write> Console<W> {
    /// Builds a session writing to `out`.
    ///
    /// # Arguments
    /// * `settings` - Wake word and voice settings; `/rate` and `/volume`
    ///   save changes back to its file.
    pub fn with_output(
        engine: EngineHandle,
        speech: Arc<dyn SpeechIo>,
        pool: BlockingPool,
        settings: Settings,
        out: W,
    ) -> Self {
        Self {
            engine,
            speech,
            pool,
            settings,
            out,
        }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Runs the session until `/quit` or end of input.
    ///
    /// # Arguments
    /// * `input` - Line source, normally stdin.
    /// * `handsfree` - Start in hands-free listening mode.
    ///
    /// # Errors
    /// Fails when the engine worker stops or the terminal cannot be written.
    pub async fn run<R>(&mut self, input: R, handsfree: bool) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let greeting = self.engine.greeting().await?;
        self.reply(greeting)?;
        if handsfree {
            self.hands_free().await?;
        }

        let mut lines = input.lines();
        loop {
            write!(self.out, "You: ")?;
            self.out.flush()?;
            let Some(line) = lines.next_line().await.context("failed to read input")? else {
                break;
            };
            match ConsoleCommand::parse(&line) {
                ConsoleCommand::Empty => {}
                ConsoleCommand::Quit => break,
                ConsoleCommand::Help => {
                    writeln!(self.out, "{HELP}\n{}", commands::describe_rules())?;
                }
                ConsoleCommand::Clear => {
                    self.engine.clear_history().await?;
                    writeln!(self.out, "Conversation history cleared.")?;
                }
                ConsoleCommand::History => self.print_history().await?,
                ConsoleCommand::HistoryJson => {
                    let entries = self.engine.history().await?;
                    let json = serde_json::to_string_pretty(&entries)
                        .context("failed to serialize history")?;
                    writeln!(self.out, "{json}")?;
                }
                ConsoleCommand::SetRate(rate) => {
                    let saved = self.settings.set_voice_rate(rate);
                    self.speech.set_rate(self.settings.voice_rate);
                    let message = format!("Voice rate set to {}.", self.settings.voice_rate);
                    self.report_change(message, saved.map(drop))?;
                }
                ConsoleCommand::SetVolume(volume) => {
                    let saved = self.settings.set_voice_volume(volume);
                    self.speech.set_volume(self.settings.voice_volume);
                    let message =
                        format!("Voice volume set to {:.2}.", self.settings.voice_volume);
                    self.report_change(message, saved.map(drop))?;
                }
                ConsoleCommand::Settings => self.print_settings()?,
                ConsoleCommand::Usage(usage) => writeln!(self.out, "{usage}")?,
                ConsoleCommand::Voice => {
                    match self.capture().await {
                        Ok(heard) => {
                            writeln!(self.out, "You (voice): {heard}")?;
                            self.respond(&heard).await?;
                        }
                        Err(err) => writeln!(self.out, "Jarvis: {err}")?,
                    }
                }
                ConsoleCommand::HandsFree => self.hands_free().await?,
                ConsoleCommand::Unknown(command) => {
                    writeln!(self.out, "Unknown command {command}. Type /help for a list.")?;
                }
                ConsoleCommand::Say(text) => {
                    self.respond(&text).await?;
                }
            }
        }
        self.speech.stop();
        writeln!(self.out, "Goodbye.")?;
        Ok(())
    }

    /// Listens until the stop phrase, ctrl-c or a capture failure that
    /// retrying cannot fix.
    async fn hands_free(&mut self) -> Result<()> {
        writeln!(
            self.out,
            "Hands-free mode: say \"{} <command>\"; say \"{STOP_PHRASE}\" to return.",
            self.settings.wake_word
        )?;
        loop {
            let heard = tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                heard = self.capture() => heard,
            };
            match heard {
                Ok(heard) if heard.to_lowercase().contains(STOP_PHRASE) => break,
                Ok(heard) => match text::strip_wake_word(&heard, &self.settings.wake_word) {
                    Some(command) => {
                        writeln!(self.out, "You (voice): {command}")?;
                        let speaking = self.respond(&command).await?;
                        let _ = speaking.await;
                    }
                    None => debug!(%heard, "ignored utterance without wake word"),
                },
                Err(SpeechError::Timeout | SpeechError::NotUnderstood) => {}
                Err(err) => {
                    writeln!(self.out, "Jarvis: {err}")?;
                    break;
                }
            }
        }
        writeln!(self.out, "Stopped listening.")?;
        Ok(())
    }

    async fn capture(&self) -> Result<String, SpeechError> {
        let speech = Arc::clone(&self.speech);
        self.pool
            .submit(move || speech.capture_utterance(LISTEN_TIMEOUT, MAX_PHRASE))
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| Err(SpeechError::Engine("voice capture task failed".to_string())))
    }

    async fn respond(&mut self, text: &str) -> Result<JoinHandle<Option<()>>> {
        let reply = self.engine.process(text).await?;
        Ok(self.reply(reply)?)
    }

    /// Prints `reply` and starts speaking it.
    ///
    /// # Returns
    /// Handle that resolves once the reply has been spoken.
    ///
    /// # Errors
    /// Terminal write failures; nothing is spoken then.
    fn reply(&mut self, reply: String) -> std::io::Result<JoinHandle<Option<()>>> {
        writeln!(self.out, "Jarvis: {reply}")?;
        Ok(speech::speak_async(Arc::clone(&self.speech), &self.pool, reply))
    }

    /// Confirms a voice setting change, noting when it could not be saved.
    ///
    /// # Details
    /// The new value is live either way; a failed save only means it is
    /// lost on restart.
    fn report_change(
        &mut self,
        message: String,
        saved: Result<(), ConfigError>,
    ) -> std::io::Result<()> {
        writeln!(self.out, "{message}")?;
        if let Err(err) = saved {
            warn!(%err, "could not save settings");
            writeln!(self.out, "Warning: {err}. The change lasts until exit.")?;
        }
        Ok(())
    }

    fn print_settings(&mut self) -> std::io::Result<()> {
        let settings = &self.settings;
        writeln!(
            self.out,
            "Voice output: {}",
            if settings.voice_enabled { "on" } else { "off" }
        )?;
        writeln!(
            self.out,
            "Rate: {} ({}-{})",
            settings.voice_rate,
            VOICE_RATE_RANGE.start(),
            VOICE_RATE_RANGE.end()
        )?;
        writeln!(
            self.out,
            "Volume: {:.2} ({:.1}-{:.1})",
            settings.voice_volume,
            VOICE_VOLUME_RANGE.start(),
            VOICE_VOLUME_RANGE.end()
        )?;
        writeln!(self.out, "Wake word: {}", settings.wake_word)?;
        writeln!(self.out, "Chat: {:?} ({})", settings.provider, settings.model())?;
        writeln!(self.out, "Saved to: {}", settings.path().display())
    }

    async fn print_history(&mut self) -> Result<()> {
        let entries = self.engine.history().await?;
        if entries.is_empty() {
            writeln!(self.out, "No conversation yet.")?;
        }
        for entry in entries {
            let stamp = entry.created_at().format("%H:%M:%S");
            writeln!(self.out, "[{stamp}] You: {}", entry.input_text())?;
            writeln!(
                self.out,
                "[{stamp}] Jarvis: {}",
                entry.output_text().unwrap_or("...")
            )?;
        }
        Ok(())
    }
}

/// Asks for an API key until a plausible one is typed.
///
/// # Returns
/// * `Ok(Some(key))` - Accepted key.
/// * `Ok(None)` - Empty line or end of input; continue without a key.
///
/// # Errors
/// Terminal I/O failures.
pub fn prompt_for_api_key<R: BufRead, W: Write>(
    mut input: R,
    mut out: W,
) -> std::io::Result<Option<String>> {
    writeln!(out, "API key not found.")?;
    writeln!(
        out,
        "Enter your Gemini API key (get one at https://makersuite.google.com/app/apikey),"
    )?;
    writeln!(out, "or press Enter to continue with limited functionality.")?;
    loop {
        write!(out, "API key: ")?;
        out.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 || line.trim().is_empty() {
            writeln!(out, "Warning: Running without API key. Limited functionality available.")?;
            return Ok(None);
        }
        match validate_api_key(&line) {
            Ok(key) => return Ok(Some(key)),
            Err(message) => writeln!(out, "{message}")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ConversationalFallback;
    use crate::engine::Engine;
    use crate::testing::{RecordingControl, ScriptedChat, ScriptedSpeech};
    use tempfile::TempDir;

    struct Session {
        console: Console<Vec<u8>>,
        control: RecordingControl,
        dir: TempDir,
    }

    impl Session {
        fn output(self) -> String {
            String::from_utf8(self.console.into_output()).unwrap()
        }
    }

    fn console(speech: ScriptedSpeech) -> Session {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path().join("jarvis_config.json"));
        let control = RecordingControl::new();
        let (chat, _recorder) = ScriptedChat::new();
        let engine = Engine::new(
            Box::new(control.clone()),
            ConversationalFallback::new(Box::new(chat)),
        );
        let (handle, _task) = EngineHandle::spawn(engine);
        let console = Console::with_output(
            handle,
            Arc::new(speech),
            BlockingPool::new(2),
            settings,
            Vec::new(),
        );
        Session {
            console,
            control,
            dir,
        }
    }

    #[test]
    fn parses_commands() {
        assert_eq!(ConsoleCommand::parse("  "), ConsoleCommand::Empty);
        assert_eq!(ConsoleCommand::parse("/QUIT"), ConsoleCommand::Quit);
        assert_eq!(ConsoleCommand::parse("/voice"), ConsoleCommand::Voice);
        assert_eq!(ConsoleCommand::parse("/handsfree"), ConsoleCommand::HandsFree);
        assert_eq!(
            ConsoleCommand::parse(" open notepad "),
            ConsoleCommand::Say("open notepad".to_string())
        );
        assert_eq!(
            ConsoleCommand::parse("/dance"),
            ConsoleCommand::Unknown("/dance".to_string())
        );
        assert_eq!(ConsoleCommand::parse("/History JSON"), ConsoleCommand::HistoryJson);
        assert_eq!(ConsoleCommand::parse("/rate 200"), ConsoleCommand::SetRate(200));
        assert_eq!(ConsoleCommand::parse("/volume 0.5"), ConsoleCommand::SetVolume(0.5));
        assert!(matches!(ConsoleCommand::parse("/rate fast"), ConsoleCommand::Usage(_)));
        assert!(matches!(ConsoleCommand::parse("/volume"), ConsoleCommand::Usage(_)));
        assert!(matches!(ConsoleCommand::parse("/volume NaN"), ConsoleCommand::Usage(_)));
    }

    #[tokio::test]
    async fn session_dispatches_lines_and_commands() {
        let speech = ScriptedSpeech::new();
        let mut session = console(speech.clone());
        let input: &[u8] = b"open notepad\n/history\n/clear\n/history\n/quit\nopen paint\n";
        session.console.run(input, false).await.unwrap();
        let control = session.control.clone();
        let output = session.output();

        assert!(output.contains("Jarvis: Good "));
        assert!(output.contains("Jarvis: Opening notepad"));
        assert!(output.contains("Conversation history cleared."));
        assert!(output.contains("No conversation yet."));
        assert_eq!(control.calls(), ["open:notepad"]);
    }

    #[tokio::test]
    async fn history_exports_as_json() {
        let mut session = console(ScriptedSpeech::new());
        let input: &[u8] = b"open notepad\n/history json\n";
        session.console.run(input, false).await.unwrap();
        let output = session.output();

        let start = output.find('[').unwrap();
        let end = output.rfind(']').unwrap();
        let entries: serde_json::Value = serde_json::from_str(&output[start..=end]).unwrap();
        assert_eq!(entries[0]["input_text"], "open notepad");
        assert_eq!(entries[0]["output_text"], "Opening notepad");
        assert!(entries[0]["created_at"].is_string());
    }

    #[tokio::test]
    async fn voice_settings_are_clamped_applied_and_saved() {
        let speech = ScriptedSpeech::new();
        let mut session = console(speech.clone());
        let input: &[u8] = b"/rate 900\n/volume 0.4\n/settings\n";
        session.console.run(input, false).await.unwrap();
        let path = session.dir.path().join("jarvis_config.json");
        let reloaded = Settings::load(&path);
        let output = session.output();

        assert!(output.contains("Voice rate set to 300."));
        assert!(output.contains("Voice volume set to 0.40."));
        assert!(output.contains("Rate: 300 (50-300)"));
        assert_eq!(speech.tuning(), ["rate:300", "volume:0.4"]);
        assert_eq!(reloaded.voice_rate, 300);
        assert_eq!(reloaded.voice_volume, 0.4);
    }

    #[tokio::test]
    async fn bad_setting_arguments_print_usage() {
        let speech = ScriptedSpeech::new();
        let mut session = console(speech.clone());
        let input: &[u8] = b"/rate fast\n";
        session.console.run(input, false).await.unwrap();
        assert!(session.output().contains("Usage: /rate <50-300>"));
        assert!(speech.tuning().is_empty());
    }

    #[tokio::test]
    async fn write_failures_surface_as_errors() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let speech = ScriptedSpeech::new();
        let (chat, _recorder) = ScriptedChat::new();
        let engine = Engine::new(
            Box::new(RecordingControl::new()),
            ConversationalFallback::new(Box::new(chat)),
        );
        let (handle, _task) = EngineHandle::spawn(engine);
        let mut console = Console::with_output(
            handle,
            Arc::new(speech.clone()),
            BlockingPool::new(1),
            Settings::default(),
            Broken,
        );
        let input: &[u8] = b"";
        assert!(console.run(input, false).await.is_err());
        assert!(speech.spoken().is_empty());
    }

    #[tokio::test]
    async fn voice_command_reports_capture_errors() {
        let speech = ScriptedSpeech::new().hears(Err(SpeechError::NotUnderstood));
        let mut session = console(speech);
        let input: &[u8] = b"/voice\n";
        session.console.run(input, false).await.unwrap();
        let control = session.control.clone();
        let output = session.output();
        assert!(output.contains("Jarvis: Could not understand audio"));
        assert!(control.calls().is_empty());
    }

    #[tokio::test]
    async fn hands_free_needs_wake_word_and_stops_on_phrase() {
        let speech = ScriptedSpeech::new()
            .hears(Ok("open calculator".to_string()))
            .hears(Ok("Jarvis, open notepad".to_string()))
            .hears(Err(SpeechError::Timeout))
            .hears(Ok("please stop listening".to_string()));
        let mut session = console(speech.clone());
        let input: &[u8] = b"";
        session.console.run(input, true).await.unwrap();

        assert_eq!(session.control.calls(), ["open:notepad"]);
        assert!(speech.spoken().contains(&"Opening notepad".to_string()));
        assert!(session.output().contains("Stopped listening."));
    }

    #[test]
    fn prompt_retries_short_keys() {
        let input = "short\nAIzaSyA1234567890abcdefghij\n".as_bytes();
        let mut out = Vec::new();
        let key = prompt_for_api_key(input, &mut out).unwrap();
        assert_eq!(key.as_deref(), Some("AIzaSyA1234567890abcdefghij"));
        assert!(String::from_utf8(out).unwrap().contains("too short"));
    }

    #[test]
    fn prompt_skips_on_empty_line() {
        let mut out = Vec::new();
        assert_eq!(prompt_for_api_key("\n".as_bytes(), &mut out).unwrap(), None);
        assert_eq!(prompt_for_api_key("".as_bytes(), &mut out).unwrap(), None);
    }
}
