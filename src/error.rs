/*
 * @file error.rs
 * @brief Error types shared across Jarvis collaborators
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

//! Typed failures raised at the collaborator seams.
//!
//! None of these ever escape [`crate::engine::Engine::process`]; the
//! dispatcher folds them into the response text. They exist so that
//! collaborators and the front end can tell failure kinds apart.

use std::path::PathBuf;

/// Failures reported by a chat-model backend.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The backend needs a credential that was not configured.
    #[error("no API key configured for {provider}")]
    MissingCredential {
        /// Backend that asked for the key.
        provider: &'static str,
    },

    /// The HTTP request could not be sent or its body not read.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The reply parsed but carried no usable text.
    #[error("the model returned an empty reply")]
    EmptyReply,
}

/// Failures reported by speech input and output.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// Nobody started talking before the start-of-speech timeout.
    #[error("Listening timeout")]
    Timeout,

    /// Audio was captured but produced no transcript.
    #[error("Could not understand audio")]
    NotUnderstood,

    /// Microphone capture is not compiled into this build.
    #[error("Voice input is unavailable in this build")]
    Unavailable,

    /// Audio device, recogniser or speech command failure.
    #[error("{0}")]
    Engine(String),
}

/// Failures loading or saving the settings document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The settings file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON for [`crate::config::Settings`].
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The settings could not be written back.
    #[error("failed to write {path}: {source}")]
    Write {
        /// File that was written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings could not be serialized.
    #[error("failed to serialize settings: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// The engine worker has exited and can take no more jobs.
#[derive(Debug, thiserror::Error)]
#[error("the engine worker has stopped")]
pub struct EngineStopped;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speech_errors_read_as_user_messages() {
        assert_eq!(SpeechError::Timeout.to_string(), "Listening timeout");
        assert_eq!(
            SpeechError::NotUnderstood.to_string(),
            "Could not understand audio"
        );
    }

    #[test]
    fn chat_status_error_names_the_code() {
        let err = ChatError::Status {
            status: 429,
            body: "quota".to_string(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("quota"));
    }

    #[test]
    fn config_read_error_names_the_file() {
        let err = ConfigError::Read {
            path: PathBuf::from("jarvis_config.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("jarvis_config.json"));
    }
}
