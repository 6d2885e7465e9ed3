/*
 * @file engine.rs
 * @brief Dispatcher that routes utterances to rules or the fallback
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

//! Dispatcher: routes each utterance to a local rule or the chat fallback
//! and keeps the session history.
//!
//! `process` takes `&mut self`, so one engine can never run two turns at
//! once or observe a half-finished `clear_history`. Callers that share an
//! engine go through [`crate::worker::EngineHandle`], which serializes jobs.
//!
//! Rule actions make blocking OS calls, so matching runs on the blocking
//! thread pool and the async runtime stays responsive.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::ai::ConversationalFallback;
use crate::commands::{self, IntentMatch};
use crate::history::History;
use crate::system::AppControl;
use crate::text;

/// Reply to an utterance that normalizes to nothing.
pub const DIDNT_CATCH: &str = "I didn't catch that. Could you please repeat?";

/// Fixed self-introduction that follows the salutation.
const INTRODUCTION: &str = "I'm Jarvis, your personal assistant. How may I help you today?";

/// Composes the local intent rules and the conversational fallback.
pub struct Engine {
    system: Arc<dyn AppControl>,
    fallback: ConversationalFallback,
    history: History,
}

impl Engine {
    pub fn new(system: Box<dyn AppControl>, fallback: ConversationalFallback) -> Self {
        Self {
            system: Arc::from(system),
            fallback,
            history: History::new(),
        }
    }

    /// Handles one utterance and returns the response text.
    ///
    /// # Details
    /// Whitespace-only input returns [`DIDNT_CATCH`] and leaves no trace.
    /// Anything else opens a history turn, is tried against the local rules
    /// (on lower-cased text) and only if none fires is sent to the fallback
    /// (original casing). The turn is completed before returning.
    ///
    /// Never fails: collaborator and chat failures arrive as response text.
    pub async fn process(&mut self, raw_text: &str) -> String {
        let text = text::normalize(raw_text);
        if text.is_empty() {
            debug!("empty utterance ignored");
            return DIDNT_CATCH.to_string();
        }
        let turn = self.history.open_turn(text.as_str());
        let local = Self::match_locally(Arc::clone(&self.system), text.to_lowercase());
        let response = match local.await {
            Ok(Some(hit)) => {
                info!(rule = ?hit.kind, "handled locally");
                hit.response
            }
            Ok(None) => {
                info!("forwarding to chat fallback");
                self.fallback.respond(&text).await
            }
            Err(err) => {
                warn!(%err, "local rule failed");
                format!("I encountered an error: {err}")
            }
        };
        self.history.complete(turn, response.as_str());
        response
    }

    /// Runs the rule table on the blocking pool.
    ///
    /// # Arguments
    /// * `system` - Collaborator the rule actions call.
    /// * `lowered` - Normalized, lower-cased utterance.
    ///
    /// # Returns
    /// The rule that fired, if any.
    ///
    /// # Errors
    /// The blocking task panicked or was cancelled.
    async fn match_locally(
        system: Arc<dyn AppControl>,
        lowered: String,
    ) -> Result<Option<IntentMatch>, tokio::task::JoinError> {
        tokio::task::spawn_blocking(move || commands::match_intent(&lowered, system.as_ref())).await
    }

    /// Empties the history and starts a fresh chat session.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.fallback.reset();
        info!("conversation history cleared");
    }

    /// Time-of-day salutation followed by the self-introduction.
    pub fn greeting(&self) -> String {
        format!("{}! {INTRODUCTION}", text::greeting())
    }

    pub fn history(&self) -> &History {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::NOT_INITIALIZED;
    use crate::testing::{RecordingControl, ScriptedChat};

    fn engine_with_chat() -> (Engine, RecordingControl, crate::testing::ChatRecorder) {
        let control = RecordingControl::new();
        let (chat, recorder) = ScriptedChat::new();
        let engine = Engine::new(
            Box::new(control.clone()),
            ConversationalFallback::new(Box::new(chat)),
        );
        (engine, control, recorder)
    }

    #[tokio::test]
    async fn blank_input_leaves_no_history() {
        let (mut engine, control, recorder) = engine_with_chat();
        assert_eq!(engine.process("").await, DIDNT_CATCH);
        assert_eq!(engine.process(" \t \n").await, DIDNT_CATCH);
        assert!(engine.history().is_empty());
        assert!(control.calls().is_empty());
        assert!(recorder.sent().is_empty());
    }

    #[tokio::test]
    async fn local_rule_skips_fallback() {
        let (mut engine, control, recorder) = engine_with_chat();
        let reply = engine.process("  Open   Notepad ").await;
        assert_eq!(reply, "Opening notepad");
        assert_eq!(control.calls(), ["open:notepad"]);
        assert!(recorder.sent().is_empty());
        let entry = engine.history().last().unwrap();
        assert_eq!(entry.input_text(), "Open Notepad");
        assert_eq!(entry.output_text(), Some("Opening notepad"));
    }

    #[tokio::test]
    async fn unmatched_text_goes_to_fallback_with_original_case() {
        let (mut engine, control, recorder) = engine_with_chat();
        let reply = engine.process("Who is Tony Stark?").await;
        assert_eq!(reply, "reply #1");
        assert!(control.calls().is_empty());
        assert!(recorder.sent()[0].ends_with("User query: Who is Tony Stark?"));
        assert_eq!(engine.history().len(), 1);
    }

    #[tokio::test]
    async fn close_self_reaches_degraded_fallback() {
        let control = RecordingControl::new();
        let mut engine = Engine::new(
            Box::new(control.clone()),
            ConversationalFallback::uninitialized(),
        );
        assert_eq!(engine.process("close jarvis").await, NOT_INITIALIZED);
        assert!(control.calls().is_empty());
        assert_eq!(
            engine.history().last().unwrap().output_text(),
            Some(NOT_INITIALIZED)
        );
    }

    #[tokio::test]
    async fn clear_resets_history_and_session() {
        let (mut engine, _control, recorder) = engine_with_chat();
        engine.process("first question").await;
        engine.process("second question").await;
        engine.clear_history();
        assert!(engine.history().is_empty());
        engine.process("after clear").await;
        assert_eq!(engine.history().len(), 1);
        assert_eq!(recorder.resets(), 1);
        assert_eq!(recorder.context_at_send(), [0, 1, 0]);
    }

    #[test]
    fn greeting_has_salutation_and_introduction() {
        let (engine, _control, _recorder) = engine_with_chat();
        let greeting = engine.greeting();
        assert!(greeting.starts_with("Good "));
        assert!(greeting.ends_with("How may I help you today?"));
    }
}
