/*
 * @file config.rs
 * @brief Persisted settings for Jarvis
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

//! Persisted key-value settings.
//!
//! Settings are a flat JSON document. Every field has a serde default so a
//! partial or older file still loads, and a missing or broken file falls
//! back to defaults with a warning rather than stopping start-up.

use std::{
    env, fs,
    ops::RangeInclusive,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

/// Default settings file, relative to the working directory.
pub const CONFIG_PATH: &str = "jarvis_config.json";

/// Environment variables that override the stored API key for one session.
const API_KEY_VARS: [&str; 2] = ["JARVIS_API_KEY", "GEMINI_API_KEY"];

/// Speech rate in words per minute used when none is stored.
const DEFAULT_VOICE_RATE: u32 = 150;

/// Speech volume used when none is stored.
const DEFAULT_VOICE_VOLUME: f32 = 0.9;

/// Accepted speech rates in words per minute.
pub const VOICE_RATE_RANGE: RangeInclusive<u32> = 50..=300;

/// Accepted speech volumes.
pub const VOICE_VOLUME_RANGE: RangeInclusive<f32> = 0.0..=1.0;

/// Shortest API key the start-up prompt accepts.
pub const MIN_API_KEY_LEN: usize = 20;

/// Which chat backend the fallback talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini `generateContent`; requires an API key.
    #[default]
    Gemini,
    /// Local Ollama `/api/chat`; no credential.
    Ollama,
}

impl Provider {
    /// Model used when the settings do not name one.
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-pro",
            Provider::Ollama => "llama3.2:3b",
        }
    }
}

/// Strongly typed representation of `jarvis_config.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_true")]
    pub voice_enabled: bool,
    #[serde(default = "default_voice_rate")]
    pub voice_rate: u32,
    #[serde(default = "default_voice_volume")]
    pub voice_volume: f32,
    #[serde(default = "default_wake_word")]
    pub wake_word: String,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Where the document is saved; not serialized.
    #[serde(skip)]
    pub(crate) path: PathBuf,
    /// Key taken from the environment for this session only.
    #[serde(skip)]
    pub(crate) session_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            voice_enabled: true,
            voice_rate: DEFAULT_VOICE_RATE,
            voice_volume: DEFAULT_VOICE_VOLUME,
            wake_word: default_wake_word(),
            provider: Provider::default(),
            model: None,
            endpoint: None,
            path: PathBuf::from(CONFIG_PATH),
            session_api_key: None,
        }
    }
}

impl Settings {
    /// Loads settings from `path`, falling back to defaults when missing or invalid.
    ///
    /// # Details
    /// A missing file is silent; an unreadable or unparsable one is logged.
    /// Either way the returned settings remember `path` for later saves.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(Some(settings)) => {
                info!(path = %path.display(), "settings loaded");
                settings
            }
            Ok(None) => Self::default().at(path),
            Err(err) => {
                warn!(error = %err, "using default settings");
                Self::default().at(path)
            }
        }
    }

    /// Reads and parses the file, distinguishing "absent" from "broken".
    ///
    /// # Errors
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] when the file
    /// exists but cannot be used.
    pub fn try_load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Some(settings.at(path).sanitized()))
    }

    /// Writes the settings back to the file they were loaded from.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save(&self) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(&self.path, json).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Stores a new API key and persists it immediately.
    ///
    /// # Errors
    /// Propagates failures from [`Settings::save`].
    pub fn set_api_key(&mut self, api_key: impl Into<String>) -> Result<(), ConfigError> {
        self.api_key = Some(api_key.into());
        self.save()
    }

    /// Sets the speech rate, clamped to [`VOICE_RATE_RANGE`], and saves.
    ///
    /// # Returns
    /// The rate actually stored.
    ///
    /// # Errors
    /// Propagates failures from [`Settings::save`].
    pub fn set_voice_rate(&mut self, rate: u32) -> Result<u32, ConfigError> {
        self.voice_rate = clamp_rate(rate);
        self.save()?;
        Ok(self.voice_rate)
    }

    /// Sets the speech volume, clamped to [`VOICE_VOLUME_RANGE`], and saves.
    ///
    /// # Returns
    /// The volume actually stored.
    ///
    /// # Errors
    /// Propagates failures from [`Settings::save`].
    pub fn set_voice_volume(&mut self, volume: f32) -> Result<f32, ConfigError> {
        self.voice_volume = clamp_volume(volume);
        self.save()?;
        Ok(self.voice_volume)
    }

    /// Applies the session-only environment override for the API key.
    ///
    /// The override is kept apart from the stored key, so [`Settings::save`]
    /// never writes it to disk.
    pub fn with_env_overrides(mut self) -> Self {
        self.session_api_key = API_KEY_VARS
            .iter()
            .find_map(|var| env::var(var).ok())
            .filter(|key| !key.trim().is_empty());
        self
    }

    /// The API key in effect: the environment override, else the stored key.
    pub fn api_key(&self) -> Option<&str> {
        self.session_api_key
            .as_deref()
            .or(self.api_key.as_deref())
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Model name for the configured provider.
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// File the settings are saved to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn at(mut self, path: &Path) -> Self {
        self.path = path.to_path_buf();
        self
    }

    fn sanitized(mut self) -> Self {
        self.voice_rate = clamp_rate(self.voice_rate);
        self.voice_volume = clamp_volume(self.voice_volume);
        if self.wake_word.trim().is_empty() {
            self.wake_word = default_wake_word();
        }
        self.wake_word = self.wake_word.trim().to_lowercase();
        self
    }
}

/// Checks a key typed at the start-up prompt.
///
/// # Returns
/// * `Ok(key)` - Trimmed key that is long enough to be plausible.
/// * `Err(message)` - Why the key was rejected.
pub fn validate_api_key(input: &str) -> Result<String, &'static str> {
    let key = input.trim();
    if key.is_empty() {
        return Err("Please enter an API key!");
    }
    if key.len() < MIN_API_KEY_LEN {
        return Err("API key seems too short. Please check and try again.");
    }
    Ok(key.to_string())
}

/// Clamps a speech rate into [`VOICE_RATE_RANGE`].
pub fn clamp_rate(rate: u32) -> u32 {
    rate.clamp(*VOICE_RATE_RANGE.start(), *VOICE_RATE_RANGE.end())
}

/// Clamps a speech volume into [`VOICE_VOLUME_RANGE`]; NaN becomes silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return *VOICE_VOLUME_RANGE.start();
    }
    volume.clamp(*VOICE_VOLUME_RANGE.start(), *VOICE_VOLUME_RANGE.end())
}

fn default_true() -> bool {
    true
}

fn default_voice_rate() -> u32 {
    DEFAULT_VOICE_RATE
}

fn default_voice_volume() -> f32 {
    DEFAULT_VOICE_VOLUME
}

fn default_wake_word() -> String {
    "jarvis".to_string()
}
