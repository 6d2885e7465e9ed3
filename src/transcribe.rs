/*
 * @file transcribe.rs
 * @brief Local Whisper transcription for Jarvis voice input
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

//! Local speech recognition with Whisper.
//!
//! The GGML model is fetched on first use and the context is created lazily,
//! so a text-only session never pays for it.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::Recording;
use crate::error::SpeechError;

/// Where the English base model is kept.
pub const MODEL_PATH: &str = "models/ggml-base.en.bin";

const MODEL_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.en.bin";

/// Sample rate Whisper expects.
const WHISPER_RATE: u32 = 16_000;

/// Non-speech markers Whisper emits for silence and noise.
const NOISE_MARKERS: [&str; 6] = [
    "[BLANK_AUDIO]",
    "[SILENCE]",
    "[MUSIC]",
    "[NOISE]",
    "(silence)",
    "(music)",
];

/// Turns recordings into text, loading the model on first use.
pub struct Transcriber {
    model_path: PathBuf,
    context: OnceLock<WhisperContext>,
}

impl Transcriber {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            context: OnceLock::new(),
        }
    }

    /// Transcribes one recording.
    ///
    /// # Errors
    /// [`SpeechError::NotUnderstood`] when nothing intelligible was said,
    /// [`SpeechError::Engine`] when the model cannot be loaded or run.
    pub fn transcribe(&self, recording: &Recording) -> Result<String, SpeechError> {
        let audio = prepare(recording);
        if audio.is_empty() {
            return Err(SpeechError::NotUnderstood);
        }
        let context = self.context()?;
        let mut state = context
            .create_state()
            .map_err(|err| SpeechError::Engine(format!("Whisper state error: {err}")))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some("en"));
        params.set_print_progress(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        state
            .full(params, &audio)
            .map_err(|err| SpeechError::Engine(format!("Whisper transcription error: {err}")))?;

        let segments = state.full_n_segments().unwrap_or(0);
        let mut text = String::new();
        for i in 0..segments {
            if let Ok(segment) = state.full_get_segment_text(i) {
                text.push_str(&segment);
                text.push(' ');
            }
        }
        let cleaned = clean_transcript(&text);
        if cleaned.is_empty() {
            Err(SpeechError::NotUnderstood)
        } else {
            Ok(cleaned)
        }
    }

    fn context(&self) -> Result<&WhisperContext, SpeechError> {
        if let Some(context) = self.context.get() {
            return Ok(context);
        }
        let context = load_context(&self.model_path)?;
        Ok(self.context.get_or_init(|| context))
    }
}

impl Default for Transcriber {
    fn default() -> Self {
        Self::new(MODEL_PATH)
    }
}

fn load_context(path: &Path) -> Result<WhisperContext, SpeechError> {
    if !path.exists() {
        download_model(path)?;
    }
    let path_str = path
        .to_str()
        .ok_or_else(|| SpeechError::Engine("model path is not valid UTF-8".to_string()))?;
    let mut params = WhisperContextParameters::default();
    params.use_gpu(false);
    WhisperContext::new_with_params(path_str, params)
        .map_err(|err| SpeechError::Engine(format!("Failed to initialize Whisper: {err}")))
}

/// Fetches the model with `curl`, following Hugging Face redirects.
fn download_model(path: &Path) -> Result<(), SpeechError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|err| SpeechError::Engine(format!("cannot create {}: {err}", dir.display())))?;
    }
    info!(path = %path.display(), "downloading Whisper model (this may take a few minutes)");
    let output = std::process::Command::new("curl")
        .arg("-L")
        .arg("-o")
        .arg(path)
        .arg(MODEL_URL)
        .output()
        .map_err(|err| SpeechError::Engine(format!("Failed to execute curl: {err}")))?;
    if !output.status.success() {
        warn!(status = %output.status, "model download failed");
        return Err(SpeechError::Engine("Failed to download Whisper model".to_string()));
    }
    info!("Whisper model downloaded");
    Ok(())
}

/// Converts a device recording to 16 kHz mono floats.
pub fn prepare(recording: &Recording) -> Vec<f32> {
    let audio = normalize_samples(&recording.samples);
    let mono = downmix(audio, recording.channels);
    if recording.sample_rate == WHISPER_RATE {
        mono
    } else {
        resample(&mono, recording.sample_rate, WHISPER_RATE)
    }
}

fn normalize_samples(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Averages interleaved channels into one.
fn downmix(audio: Vec<f32>, channels: u16) -> Vec<f32> {
    let channels = usize::from(channels.max(1));
    if channels == 1 {
        return audio;
    }
    audio
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resampler; adequate for speech.
fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }
    let ratio = from_rate as f32 / to_rate as f32;
    let output_len = (input.len() as f32 / ratio) as usize;
    (0..output_len)
        .map(|i| {
            let pos = i as f32 * ratio;
            let idx = pos as usize;
            let frac = pos - idx as f32;
            match (input.get(idx), input.get(idx + 1)) {
                (Some(a), Some(b)) => a + (b - a) * frac,
                (Some(a), None) => *a,
                _ => 0.0,
            }
        })
        .collect()
}

/// Drops non-speech markers and collapses whitespace.
pub fn clean_transcript(raw: &str) -> String {
    let mut text = raw.to_string();
    for marker in NOISE_MARKERS {
        text = text.replace(marker, " ");
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_transcript_drops_markers() {
        assert_eq!(clean_transcript("[BLANK_AUDIO]"), "");
        assert_eq!(
            clean_transcript("  open   notepad [NOISE] "),
            "open notepad"
        );
    }

    #[test]
    fn prepare_downmixes_stereo() {
        let recording = Recording {
            samples: vec![16384, 0, -16384, 0],
            sample_rate: WHISPER_RATE,
            channels: 2,
        };
        let audio = prepare(&recording);
        assert_eq!(audio.len(), 2);
        assert!((audio[0] - 0.25).abs() < 1e-4);
        assert!((audio[1] + 0.25).abs() < 1e-4);
    }

    #[test]
    fn prepare_resamples_to_sixteen_khz() {
        let recording = Recording {
            samples: vec![0; 48_000],
            sample_rate: 48_000,
            channels: 1,
        };
        assert_eq!(prepare(&recording).len(), 16_000);
    }

    #[test]
    fn resample_interpolates_between_samples() {
        let out = resample(&[0.0, 1.0], 2, 4);
        assert_eq!(out.len(), 4);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn empty_recording_is_not_understood() {
        let transcriber = Transcriber::new("does/not/matter.bin");
        let recording = Recording {
            samples: Vec::new(),
            sample_rate: WHISPER_RATE,
            channels: 1,
        };
        assert!(matches!(
            transcriber.transcribe(&recording),
            Err(SpeechError::NotUnderstood)
        ));
    }
}
