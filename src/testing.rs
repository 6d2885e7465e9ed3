/*
 * @file testing.rs
 * @brief Recording fakes for Jarvis collaborators
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

//! Recording fakes for the dispatcher's collaborators.
//!
//! Built for unit tests and with the `testing` feature, which `tests/`
//! requires (`cargo test --features testing`). The fakes share their state
//! through an `Arc`, so a clone kept by the test still observes calls after
//! the original has been moved into an [`crate::engine::Engine`].

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;

use crate::ai::ChatSession;
use crate::error::{ChatError, SpeechError};
use crate::speech::SpeechIo;
use crate::system::{ActionOutcome, AppControl};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// [`AppControl`] fake that records every call as `"verb:argument"`.
#[derive(Clone, Default)]
pub struct RecordingControl {
    calls: Arc<Mutex<Vec<String>>>,
    running: Vec<String>,
    latency: Duration,
}

impl RecordingControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names reported by `list_running`.
    pub fn with_running<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.running = names.into_iter().map(Into::into).collect();
        self
    }

    /// Blocks the calling thread this long on every call, like a slow OS query.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Calls made so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: String) {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        lock(&self.calls).push(call);
    }
}

impl AppControl for RecordingControl {
    fn open(&self, name: &str) -> ActionOutcome {
        self.record(format!("open:{name}"));
        ActionOutcome::success(format!("Opening {name}"))
    }

    fn close(&self, name: &str) -> ActionOutcome {
        self.record(format!("close:{name}"));
        ActionOutcome::failure(format!("{name} is not running"))
    }

    fn list_running(&self) -> Vec<String> {
        self.record("list".to_string());
        self.running.clone()
    }

    fn info(&self) -> ActionOutcome {
        self.record("info".to_string());
        ActionOutcome::success("CPU Usage: 1.0%\nMemory Usage: 2.0%\nDisk Usage: 3.0%")
    }

    fn minimize_all(&self) -> ActionOutcome {
        self.record("minimize".to_string());
        ActionOutcome::success("Minimized all windows")
    }

    fn shutdown(&self) -> ActionOutcome {
        self.record("shutdown".to_string());
        ActionOutcome::success("System will shutdown in 30 seconds")
    }

    fn restart(&self) -> ActionOutcome {
        self.record("restart".to_string());
        ActionOutcome::success("System will restart in 30 seconds")
    }

    fn open_url(&self, url: &str) -> ActionOutcome {
        self.record(format!("url:{url}"));
        ActionOutcome::success(format!("Opening https://{url}"))
    }

    fn search_web(&self, query: &str) -> ActionOutcome {
        self.record(format!("search:{query}"));
        ActionOutcome::success(format!("Searching Google for {query}"))
    }
}

#[derive(Default)]
struct ChatLog {
    sent: Vec<String>,
    context_at_send: Vec<usize>,
    resets: usize,
}

/// Observer handle for a [`ScriptedChat`].
#[derive(Clone, Default)]
pub struct ChatRecorder {
    log: Arc<Mutex<ChatLog>>,
}

impl ChatRecorder {
    /// Messages received by `send`, oldest first.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.log).sent.clone()
    }

    /// Number of prior turns the session held at each `send`.
    pub fn context_at_send(&self) -> Vec<usize> {
        lock(&self.log).context_at_send.clone()
    }

    pub fn resets(&self) -> usize {
        lock(&self.log).resets
    }
}

/// [`ChatSession`] fake that replays queued replies.
///
/// With the queue empty it answers `"reply #<n>"`. Successful sends are
/// kept as context until `reset`.
pub struct ScriptedChat {
    recorder: ChatRecorder,
    replies: VecDeque<Result<String, ChatError>>,
    context: Vec<String>,
}

impl ScriptedChat {
    pub fn new() -> (Self, ChatRecorder) {
        let recorder = ChatRecorder::default();
        let chat = Self {
            recorder: recorder.clone(),
            replies: VecDeque::new(),
            context: Vec::new(),
        };
        (chat, recorder)
    }

    /// Queues the result of a future `send`.
    pub fn then(mut self, reply: Result<String, ChatError>) -> Self {
        self.replies.push_back(reply);
        self
    }
}

#[async_trait]
impl ChatSession for ScriptedChat {
    async fn send(&mut self, message: &str) -> Result<String, ChatError> {
        let turn = {
            let mut log = lock(&self.recorder.log);
            log.sent.push(message.to_string());
            log.context_at_send.push(self.context.len());
            log.sent.len()
        };
        let reply = self
            .replies
            .pop_front()
            .unwrap_or_else(|| Ok(format!("reply #{turn}")));
        if reply.is_ok() {
            self.context.push(message.to_string());
        }
        reply
    }

    fn reset(&mut self) {
        self.context.clear();
        lock(&self.recorder.log).resets += 1;
    }

    fn provider(&self) -> &'static str {
        "scripted"
    }
}

/// [`SpeechIo`] fake with queued transcripts and a record of spoken text.
#[derive(Clone, Default)]
pub struct ScriptedSpeech {
    heard: Arc<Mutex<VecDeque<Result<String, SpeechError>>>>,
    spoken: Arc<Mutex<Vec<String>>>,
    tuning: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of a future capture.
    pub fn hears(self, result: Result<String, SpeechError>) -> Self {
        lock(&self.heard).push_back(result);
        self
    }

    pub fn spoken(&self) -> Vec<String> {
        lock(&self.spoken).clone()
    }

    /// Tuning changes as `"rate:<n>"` / `"volume:<x>"`, oldest first.
    pub fn tuning(&self) -> Vec<String> {
        lock(&self.tuning).clone()
    }
}

impl SpeechIo for ScriptedSpeech {
    fn capture_utterance(
        &self,
        _timeout: Duration,
        _max_phrase: Duration,
    ) -> Result<String, SpeechError> {
        lock(&self.heard)
            .pop_front()
            .unwrap_or(Err(SpeechError::Timeout))
    }

    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        lock(&self.spoken).push(text.to_string());
        Ok(())
    }

    fn stop(&self) {}

    fn set_rate(&self, rate: u32) {
        lock(&self.tuning).push(format!("rate:{rate}"));
    }

    fn set_volume(&self, volume: f32) {
        lock(&self.tuning).push(format!("volume:{volume}"));
    }
}
