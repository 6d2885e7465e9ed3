/*
 * @file history.rs
 * @brief Session history bookkeeping for the dispatcher
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

//! Append-only log of conversation turns.
//!
//! The dispatcher opens a turn when an utterance arrives and fills in the
//! response before `process` returns. Entries are never removed one by one;
//! only [`History::clear`] empties the log.

use chrono::{DateTime, Local};
use serde::Serialize;

/// One recorded turn. Serializes with an RFC 3339 `created_at` for the
/// console's `/history json` export.
#[derive(Clone, Debug, Serialize)]
pub struct HistoryEntry {
    created_at: DateTime<Local>,
    input_text: String,
    output_text: Option<String>,
}

impl HistoryEntry {
    fn new(input_text: impl Into<String>) -> Self {
        Self {
            created_at: Local::now(),
            input_text: input_text.into(),
            output_text: None,
        }
    }

    /// When the utterance was received.
    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    /// The normalized utterance.
    pub fn input_text(&self) -> &str {
        &self.input_text
    }

    /// The response, once the turn is complete.
    pub fn output_text(&self) -> Option<&str> {
        self.output_text.as_deref()
    }

    /// Whether the response has been recorded.
    pub fn is_complete(&self) -> bool {
        self.output_text.is_some()
    }
}

/// Handle to a turn opened by [`History::open_turn`].
///
/// Not `Clone`: a turn can be completed exactly once.
#[derive(Debug)]
#[must_use = "an opened turn must be completed"]
pub struct TurnId(usize);

/// Insertion-ordered turn log owned by the dispatcher.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn with no response yet.
    pub fn open_turn(&mut self, input_text: impl Into<String>) -> TurnId {
        self.entries.push(HistoryEntry::new(input_text));
        TurnId(self.entries.len() - 1)
    }

    /// Records the response for a turn opened earlier.
    ///
    /// Consumes the handle, so a turn cannot be completed twice.
    pub fn complete(&mut self, turn: TurnId, output_text: impl Into<String>) {
        if let Some(entry) = self.entries.get_mut(turn.0) {
            debug_assert!(entry.output_text.is_none(), "turn completed twice");
            entry.output_text = Some(output_text.into());
        }
    }

    /// All turns, oldest first.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Most recent turn.
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every turn.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
