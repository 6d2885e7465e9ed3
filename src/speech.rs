//! Speech input and output.
//!
//! Output goes through the platform speech command (`say` on macOS,
//! `espeak` elsewhere). Input is compiled in with the `voice` feature.

use std::process::{Child, Command};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{clamp_rate, clamp_volume, Settings};
use crate::error::SpeechError;
use crate::worker::BlockingPool;

/// How long to wait for someone to start talking.
pub const LISTEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest phrase captured in one go.
pub const MAX_PHRASE: Duration = Duration::from_secs(10);

const SPEAK_POLL: Duration = Duration::from_millis(50);

/// Blocking speech collaborator used by the front end.
pub trait SpeechIo: Send + Sync {
    /// Records and transcribes one utterance.
    fn capture_utterance(&self, timeout: Duration, max_phrase: Duration)
        -> Result<String, SpeechError>;

    /// Speaks `text`, blocking until done or stopped.
    fn speak(&self, text: &str) -> Result<(), SpeechError>;

    /// Interrupts speech in progress. No-op when silent.
    fn stop(&self);

    /// Changes the speech rate for later utterances.
    fn set_rate(&self, rate: u32);

    /// Changes the speech volume for later utterances.
    fn set_volume(&self, volume: f32);
}

/// Speaks on the blocking pool without waiting; failures are only logged.
pub fn speak_async(
    speech: Arc<dyn SpeechIo>,
    pool: &BlockingPool,
    text: String,
) -> JoinHandle<Option<()>> {
    pool.submit(move || {
        if let Err(err) = speech.speak(&text) {
            warn!(%err, "speech output failed");
        }
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Rate and volume, adjustable while speech is running.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Tuning {
    rate: u32,
    volume: f32,
}

/// [`SpeechIo`] backed by the system speech command and, with the `voice`
/// feature, the microphone plus Whisper.
pub struct VoiceHandler {
    enabled: bool,
    tuning: Mutex<Tuning>,
    program: String,
    speaking: Mutex<()>,
    current: Mutex<Option<Child>>,
    #[cfg(feature = "voice")]
    transcriber: crate::transcribe::Transcriber,
}

impl VoiceHandler {
    /// Builds a handler honoring the voice settings.
    ///
    /// # Arguments
    /// * `settings` - Source of rate, volume and the enabled flag.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            enabled: settings.voice_enabled,
            tuning: Mutex::new(Tuning {
                rate: clamp_rate(settings.voice_rate),
                volume: clamp_volume(settings.voice_volume),
            }),
            program: default_program().to_string(),
            speaking: Mutex::new(()),
            current: Mutex::new(None),
            #[cfg(feature = "voice")]
            transcriber: crate::transcribe::Transcriber::default(),
        }
    }

    /// Overrides the enabled flag, e.g. from `--no-voice`.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Uses a different speech program.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Builds the speech command for `text` with the current tuning.
    ///
    /// # Details
    /// `say` takes volume as an embedded `[[volm x]]` command; `espeak`
    /// takes an amplitude in `0..=200`.
    fn command(&self, text: &str) -> Command {
        let Tuning { rate, volume } = *lock(&self.tuning);
        let mut command = Command::new(&self.program);
        if self.program == "say" {
            command
                .arg("-r")
                .arg(rate.to_string())
                .arg(format!("[[volm {volume:.2}]] {text}"));
        } else {
            let amplitude = (volume * 200.0).round() as u32;
            command
                .arg("-s")
                .arg(rate.to_string())
                .arg("-a")
                .arg(amplitude.to_string())
                .arg(text);
        }
        command
    }

    /// Polls the running child until it exits or `stop` takes it away.
    fn wait_current(&self) -> Result<(), SpeechError> {
        loop {
            {
                let mut slot = lock(&self.current);
                let Some(child) = slot.as_mut() else {
                    debug!("speech stopped");
                    return Ok(());
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        *slot = None;
                        return if status.success() {
                            Ok(())
                        } else {
                            Err(SpeechError::Engine(format!(
                                "{} exited with {status}",
                                self.program
                            )))
                        };
                    }
                    Ok(None) => {}
                    Err(err) => {
                        *slot = None;
                        return Err(SpeechError::Engine(format!("TTS Error: {err}")));
                    }
                }
            }
            std::thread::sleep(SPEAK_POLL);
        }
    }
}

fn default_program() -> &'static str {
    if cfg!(target_os = "macos") {
        "say"
    } else {
        "espeak"
    }
}

impl SpeechIo for VoiceHandler {
    #[cfg(feature = "voice")]
    fn capture_utterance(
        &self,
        timeout: Duration,
        max_phrase: Duration,
    ) -> Result<String, SpeechError> {
        let recording = crate::audio::record_utterance(timeout, max_phrase)?;
        debug!("recognizing");
        self.transcriber.transcribe(&recording)
    }

    #[cfg(not(feature = "voice"))]
    fn capture_utterance(
        &self,
        _timeout: Duration,
        _max_phrase: Duration,
    ) -> Result<String, SpeechError> {
        Err(SpeechError::Unavailable)
    }

    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        if !self.enabled {
            return Ok(());
        }
        if text.trim().is_empty() {
            return Err(SpeechError::Engine("Cannot speak empty text".to_string()));
        }
        let _turn = lock(&self.speaking);
        let child = self
            .command(text)
            .spawn()
            .map_err(|err| SpeechError::Engine(format!("TTS Error: {err}")))?;
        *lock(&self.current) = Some(child);
        self.wait_current()
    }

    fn stop(&self) {
        if let Some(mut child) = lock(&self.current).take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn set_rate(&self, rate: u32) {
        lock(&self.tuning).rate = clamp_rate(rate);
    }

    fn set_volume(&self, volume: f32) {
        lock(&self.tuning).volume = clamp_volume(volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(program: &str) -> VoiceHandler {
        VoiceHandler::from_settings(&Settings::default()).with_program(program)
    }

    #[test]
    fn disabled_handler_is_silent() {
        let voice = handler("definitely-not-a-speech-program").enabled(false);
        assert!(voice.speak("hello").is_ok());
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(handler("true").speak("   ").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn speak_reports_program_outcome() {
        assert!(handler("true").speak("Hello test").is_ok());
        assert!(handler("false").speak("Hello test").is_err());
    }

    #[test]
    fn missing_program_is_an_error() {
        let err = handler("definitely-not-a-speech-program")
            .speak("hello")
            .unwrap_err();
        assert!(err.to_string().starts_with("TTS Error"));
    }

    #[test]
    fn stop_without_speech_is_a_no_op() {
        handler("true").stop();
    }

    #[test]
    fn espeak_arguments_carry_rate_and_volume() {
        let voice = handler("espeak");
        let command = voice.command("hi there");
        let args: Vec<_> = command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, ["-s", "150", "-a", "180", "hi there"]);
    }

    #[test]
    fn tuning_changes_apply_to_the_next_utterance() {
        let voice = handler("espeak");
        voice.set_rate(400);
        voice.set_volume(0.5);
        let args: Vec<_> = voice
            .command("hi")
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, ["-s", "300", "-a", "100", "hi"]);
    }

    #[cfg(not(feature = "voice"))]
    #[test]
    fn capture_is_unavailable_without_voice_feature() {
        let err = handler("true")
            .capture_utterance(LISTEN_TIMEOUT, MAX_PHRASE)
            .unwrap_err();
        assert!(matches!(err, SpeechError::Unavailable));
    }

    #[tokio::test]
    async fn speak_async_logs_and_finishes() {
        let pool = BlockingPool::new(1);
        let voice: Arc<dyn SpeechIo> = Arc::new(handler("definitely-not-a-speech-program"));
        let done = speak_async(voice, &pool, "hello".to_string()).await.unwrap();
        assert_eq!(done, Some(()));
    }
}
