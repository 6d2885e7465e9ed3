/*
 * @file lib.rs
 * @brief Jarvis library root
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

//! Jarvis - a desktop assistant that answers typed or spoken requests.
//!
//! Each utterance is tried against an ordered table of local intent rules
//! (time, date, launching and closing applications, web search, system
//! status, power actions). When no rule fires the text goes to a chat model
//! with a fixed persona. Every handled utterance lands in the session
//! history.
//!
//! - [`engine::Engine`] is the dispatcher; [`worker::EngineHandle`] runs it
//!   on its own task so requests are handled one at a time.
//! - [`system::AppControl`] and [`ai::ChatSession`] are the seams to the
//!   operating system and the chat backends.
//! - [`console::Console`] is the terminal front end; speech goes through
//!   [`speech::SpeechIo`].
//!
//! # Example
//! ```no_run
//! use jarvis::ai::ConversationalFallback;
//! use jarvis::engine::Engine;
//! use jarvis::system::SystemController;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut engine = Engine::new(
//!         Box::new(SystemController::new()),
//!         ConversationalFallback::uninitialized(),
//!     );
//!     println!("{}", engine.process("what time is it").await);
//! }
//! ```

pub mod ai;
#[cfg(feature = "voice")]
pub mod audio;
pub mod commands;
pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod history;
pub mod speech;
pub mod system;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod text;
#[cfg(feature = "voice")]
pub mod transcribe;
pub mod worker;
