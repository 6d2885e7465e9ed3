/*
 * @file audio.rs
 * @brief Microphone capture for Jarvis voice input
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

//! Microphone capture for one spoken utterance.
//!
//! This module records from the default input device using CPAL and cuts the
//! stream into a single phrase: it waits for speech to start, keeps
//! recording while the speaker talks and stops after a short trailing
//! silence or once the phrase limit is reached.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig, StreamError,
    SupportedStreamConfig,
};
use tracing::{debug, warn};

use crate::error::SpeechError;

/// RMS energy that separates speech from room noise.
const SILENCE_RMS_THRESHOLD: f32 = 150.0;

/// Silence that ends a phrase once speech has started.
const TRAILING_SILENCE: Duration = Duration::from_millis(1000);

/// How often the recorder inspects newly captured audio.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Raw capture as delivered by the device.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Interleaved 16-bit PCM samples.
    pub samples: Vec<i16>,
    /// Device sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
}

/// Progress of an [`UtteranceDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// No speech heard yet.
    Waiting,
    /// Speech started; still recording.
    Capturing,
    /// The phrase ended.
    Done,
    /// Nobody spoke before the timeout.
    TimedOut,
}

/// Decides when a phrase starts and ends from a stream of voiced/unvoiced
/// observations.
///
/// Timestamps are measured from the start of listening, which keeps the
/// detector free of clocks and easy to drive from tests.
#[derive(Debug)]
pub struct UtteranceDetector {
    timeout: Duration,
    max_phrase: Duration,
    state: DetectorState,
    started_at: Duration,
    last_voiced: Duration,
}

impl UtteranceDetector {
    pub fn new(timeout: Duration, max_phrase: Duration) -> Self {
        Self {
            timeout,
            max_phrase,
            state: DetectorState::Waiting,
            started_at: Duration::ZERO,
            last_voiced: Duration::ZERO,
        }
    }

    /// Feeds one observation taken at `at`.
    ///
    /// # Returns
    /// The state after the observation. `Done` and `TimedOut` are final.
    pub fn observe(&mut self, at: Duration, voiced: bool) -> DetectorState {
        self.state = match self.state {
            DetectorState::Waiting if voiced => {
                self.started_at = at;
                self.last_voiced = at;
                DetectorState::Capturing
            }
            DetectorState::Waiting if at >= self.timeout => DetectorState::TimedOut,
            DetectorState::Capturing => {
                if voiced {
                    self.last_voiced = at;
                }
                if at.saturating_sub(self.started_at) >= self.max_phrase
                    || at.saturating_sub(self.last_voiced) >= TRAILING_SILENCE
                {
                    DetectorState::Done
                } else {
                    DetectorState::Capturing
                }
            }
            state => state,
        };
        self.state
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }
}

/// Records a single utterance from the default input device.
///
/// # Arguments
/// * `timeout` - How long to wait for speech to start.
/// * `max_phrase` - Upper bound on the length of the phrase itself.
///
/// # Returns
/// The samples from the first voiced chunk to the end of the phrase.
///
/// # Errors
/// [`SpeechError::Timeout`] when nobody speaks in time, or
/// [`SpeechError::Engine`] when the device or stream cannot be opened.
pub fn record_utterance(timeout: Duration, max_phrase: Duration) -> Result<Recording, SpeechError> {
    let device = default_input_device()?;
    let supported = input_config(&device)?;
    let config = supported.config();
    let buffer = shared_samples();
    let stream = build_input_stream(&device, &supported, Arc::clone(&buffer))?;
    stream
        .play()
        .map_err(|err| SpeechError::Engine(format!("failed to start recording: {err}")))?;

    let mut detector = UtteranceDetector::new(timeout, max_phrase);
    let mut captured = Vec::new();
    let mut seen = 0;
    let started = Instant::now();
    debug!("listening");
    loop {
        std::thread::sleep(POLL_INTERVAL);
        let chunk: Vec<i16> = {
            let guard = lock(&buffer);
            let chunk = guard[seen..].to_vec();
            seen = guard.len();
            chunk
        };
        let state = detector.observe(started.elapsed(), contains_speech(&chunk));
        if matches!(state, DetectorState::Capturing | DetectorState::Done) {
            captured.extend_from_slice(&chunk);
        }
        match state {
            DetectorState::Done => break,
            DetectorState::TimedOut => return Err(SpeechError::Timeout),
            _ => {}
        }
    }
    drop(stream);
    debug!(samples = captured.len(), "utterance captured");
    Ok(Recording {
        samples: captured,
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    })
}

/// Root-mean-square energy test used to skip silent chunks.
pub fn contains_speech(samples: &[i16]) -> bool {
    if samples.is_empty() {
        return false;
    }
    let energy = samples
        .iter()
        .map(|sample| (*sample as f32).powi(2))
        .sum::<f32>()
        / samples.len() as f32;
    energy.sqrt() >= SILENCE_RMS_THRESHOLD
}

fn default_input_device() -> Result<Device, SpeechError> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| SpeechError::Engine("No input device".to_string()))
}

/// The device's own configuration; conversion to 16 kHz mono happens
/// before transcription.
fn input_config(device: &Device) -> Result<SupportedStreamConfig, SpeechError> {
    device
        .default_input_config()
        .map_err(|err| SpeechError::Engine(format!("no usable input config: {err}")))
}

fn shared_samples() -> Arc<Mutex<Vec<i16>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn lock(buffer: &Mutex<Vec<i16>>) -> std::sync::MutexGuard<'_, Vec<i16>> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Opens the input stream in the device's native sample format.
///
/// # Details
/// CPAL refuses a callback whose sample type differs from the stream
/// format, so the callback is picked per format and everything is stored
/// as 16-bit PCM.
///
/// # Errors
/// [`SpeechError::Engine`] for an unsupported format or a stream that
/// will not open.
fn build_input_stream(
    device: &Device,
    supported: &SupportedStreamConfig,
    samples: Arc<Mutex<Vec<i16>>>,
) -> Result<Stream, SpeechError> {
    let config = supported.config();
    match supported.sample_format() {
        SampleFormat::F32 => open_stream::<f32>(device, &config, samples),
        SampleFormat::I16 => open_stream::<i16>(device, &config, samples),
        SampleFormat::U16 => open_stream::<u16>(device, &config, samples),
        other => Err(SpeechError::Engine(format!(
            "unsupported input sample format: {other}"
        ))),
    }
}

fn open_stream<T>(
    device: &Device,
    config: &StreamConfig,
    samples: Arc<Mutex<Vec<i16>>>,
) -> Result<Stream, SpeechError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &_| push_samples(&samples, data),
            log_stream_error,
            None,
        )
        .map_err(|err| SpeechError::Engine(format!("failed to open microphone: {err}")))
}

/// Converts frames of any supported format into 16-bit PCM and appends them.
fn push_samples<T>(buffer: &Mutex<Vec<i16>>, data: &[T])
where
    T: Sample,
    i16: FromSample<T>,
{
    let mut guard = lock(buffer);
    guard.extend(data.iter().map(|&sample| i16::from_sample(sample)));
}

fn log_stream_error(error: StreamError) {
    warn!(%error, "audio stream error");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn detector_times_out_without_speech() {
        let mut detector = UtteranceDetector::new(ms(500), ms(5000));
        assert_eq!(detector.observe(ms(100), false), DetectorState::Waiting);
        assert_eq!(detector.observe(ms(500), false), DetectorState::TimedOut);
        assert_eq!(detector.observe(ms(600), true), DetectorState::TimedOut);
    }

    #[test]
    fn detector_ends_phrase_after_trailing_silence() {
        let mut detector = UtteranceDetector::new(ms(500), ms(5000));
        assert_eq!(detector.observe(ms(100), true), DetectorState::Capturing);
        assert_eq!(detector.observe(ms(900), false), DetectorState::Capturing);
        assert_eq!(detector.observe(ms(1000), true), DetectorState::Capturing);
        assert_eq!(detector.observe(ms(2000), false), DetectorState::Done);
        assert_eq!(detector.state(), DetectorState::Done);
    }

    #[test]
    fn detector_caps_phrase_length() {
        let mut detector = UtteranceDetector::new(ms(500), ms(1500));
        detector.observe(ms(200), true);
        assert_eq!(detector.observe(ms(1000), true), DetectorState::Capturing);
        assert_eq!(detector.observe(ms(1700), true), DetectorState::Done);
    }

    #[test]
    fn speech_detection_uses_rms() {
        assert!(!contains_speech(&[]));
        assert!(!contains_speech(&[0, 10, -10, 5]));
        assert!(contains_speech(&[4000, -4000, 3000, -3000]));
    }

    #[test]
    fn push_samples_converts_and_clamps_floats() {
        let samples = shared_samples();
        push_samples(&samples, &[0.0f32, 0.5, -1.0, 2.0]);
        let guard = samples.lock().unwrap();
        assert_eq!(guard.len(), 4);
        assert_eq!(guard[0], 0);
        assert!(guard[1] > 0);
        assert!(guard[2] < 0);
        assert_eq!(guard[3], i16::MAX);
    }

    #[test]
    fn push_samples_accepts_integer_formats() {
        let samples = shared_samples();
        push_samples(&samples, &[-1200i16, 0, 1200]);
        push_samples(&samples, &[0u16, 32768, u16::MAX]);
        let guard = samples.lock().unwrap();
        assert_eq!(guard[..3], [-1200, 0, 1200]);
        assert_eq!(guard[3], i16::MIN);
        assert_eq!(guard[4], 0);
        assert_eq!(guard[5], i16::MAX);
    }
}
