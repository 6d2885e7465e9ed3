/*
 * @file text.rs
 * @brief Text normalization, extraction and formatting helpers
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

//! Text normalization, extraction and formatting helpers.

use std::sync::LazyLock;

use chrono::{DateTime, Local, TimeZone, Timelike};
use regex::Regex;

/// Verb phrase that introduces an application to launch.
static OPEN_VERB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:open|launch|start|run)\s+(.+)").expect("valid regex"));

/// Verb phrase that introduces an application to close.
static CLOSE_VERB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:close|quit|exit|stop)\s+(.+)").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Trims and collapses internal whitespace runs to a single space.
pub fn normalize(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Time-of-day salutation for an hour in `0..24`.
///
/// # Returns
/// "Good morning" before noon, "Good afternoon" before 18:00, otherwise
/// "Good evening".
pub fn greeting_for_hour(hour: u32) -> &'static str {
    match hour {
        0..=11 => "Good morning",
        12..=17 => "Good afternoon",
        _ => "Good evening",
    }
}

/// Salutation for the current local time.
pub fn greeting() -> &'static str {
    greeting_for_hour(Local::now().hour())
}

/// Formats a time as `HH:MM AM|PM`, e.g. `09:05 PM`.
pub fn format_time<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%I:%M %p").to_string()
}

/// Formats a date as `Month DD, YYYY`, e.g. `March 04, 2025`.
pub fn format_date<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%B %d, %Y").to_string()
}

/// Extracts the application named after open/launch/start/run.
///
/// # Details
/// Takes the remainder after the leftmost verb, trimmed. The verb must be a
/// whole word, so "restart computer" names nothing.
///
/// # Returns
/// * `Some(name)` - Non-empty remainder.
/// * `None` - No verb, or nothing after it.
pub fn extract_app_name(text: &str) -> Option<String> {
    capture_remainder(&OPEN_VERB, text)
}

/// Extracts the application named after close/quit/exit/stop.
pub fn extract_close_app_name(text: &str) -> Option<String> {
    capture_remainder(&CLOSE_VERB, text)
}

fn capture_remainder(pattern: &Regex, text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let name = pattern.captures(&lower)?.get(1)?.as_str().trim().to_string();
    (!name.is_empty()).then_some(name)
}

/// Returns the command that follows a leading wake word.
///
/// # Details
/// Case-insensitive; separating commas and spaces after the wake word are
/// dropped. Used by hands-free listening, where only addressed utterances
/// are dispatched.
///
/// # Returns
/// * `Some(command)` - Text after the wake word, non-empty.
/// * `None` - Utterance does not start with the wake word.
pub fn strip_wake_word(text: &str, wake_word: &str) -> Option<String> {
    let text = text.trim();
    let wake = wake_word.trim().to_lowercase();
    if wake.is_empty() {
        return Some(text.to_string()).filter(|t| !t.is_empty());
    }
    let head = text.get(..wake.len())?;
    if !head.eq_ignore_ascii_case(&wake) {
        return None;
    }
    let rest = &text[wake.len()..];
    if rest.starts_with(|c: char| c.is_alphanumeric()) {
        return None;
    }
    let rest = rest.trim_start_matches([',', ' ', '.', '!']);
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("  open \t  notepad \n"), "open notepad");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn greeting_bands() {
        assert_eq!(greeting_for_hour(0), "Good morning");
        assert_eq!(greeting_for_hour(11), "Good morning");
        assert_eq!(greeting_for_hour(12), "Good afternoon");
        assert_eq!(greeting_for_hour(17), "Good afternoon");
        assert_eq!(greeting_for_hour(18), "Good evening");
        assert_eq!(greeting_for_hour(23), "Good evening");
    }

    #[test]
    fn time_and_date_formats() {
        let at = NaiveDate::from_ymd_opt(2025, 3, 4)
            .unwrap()
            .and_hms_opt(21, 5, 0)
            .unwrap()
            .and_utc();
        assert_eq!(format_time(&at), "09:05 PM");
        assert_eq!(format_date(&at), "March 04, 2025");
    }

    #[test]
    fn app_name_extraction() {
        assert_eq!(extract_app_name("open notepad"), Some("notepad".into()));
        assert_eq!(
            extract_app_name("please launch Visual Studio Code"),
            Some("visual studio code".into())
        );
        assert_eq!(extract_app_name("open"), None);
        assert_eq!(extract_app_name("open   "), None);
        assert_eq!(extract_app_name("restart computer"), None);
    }

    #[test]
    fn close_name_extraction() {
        assert_eq!(extract_close_app_name("close chrome"), Some("chrome".into()));
        assert_eq!(extract_close_app_name("quit spotify now"), Some("spotify now".into()));
        assert_eq!(extract_close_app_name("closet"), None);
    }

    #[test]
    fn wake_word_stripping() {
        assert_eq!(
            strip_wake_word("Jarvis, open notepad", "jarvis"),
            Some("open notepad".into())
        );
        assert_eq!(strip_wake_word("jarvis", "jarvis"), None);
        assert_eq!(strip_wake_word("hello there", "jarvis"), None);
        assert_eq!(strip_wake_word("ok", "jarvis"), None);
        assert_eq!(strip_wake_word("jarvisx open notepad", "jarvis"), None);
    }
}
