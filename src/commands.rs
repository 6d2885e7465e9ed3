/*
 * @file commands.rs
 * @brief Ordered local intent rules and matching logic
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

//! Local intent rules and matching.
//!
//! Rules are an ordered table evaluated top to bottom. A rule fires when its
//! keywords match and its action produces a response; the first rule to fire
//! wins and nothing later (including the chat fallback) is consulted. An
//! action that returns `None` (for example, "open" with nothing after it)
//! lets evaluation continue with the next rule.

use std::sync::LazyLock;

use chrono::Local;
use regex::Regex;
use tracing::debug;

use crate::system::AppControl;
use crate::text;

/// Close targets that refer to the assistant itself.
const SELF_NAMES: [&str; 2] = ["jarvis", "yourself"];

static SEARCH_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:search google|google search)\s*(?:for\b)?").expect("valid regex")
});

static WEBSITE_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:open website|go to)\s*").expect("valid regex"));

/// Category of a recognized local command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntentKind {
    Time,
    Date,
    OpenApp,
    CloseApp,
    SearchWeb,
    OpenWebsite,
    SystemInfo,
    MinimizeAll,
    RunningApps,
    Shutdown,
    Restart,
}

/// One predicate/action pair in the rule table.
pub struct IntentRule {
    pub kind: IntentKind,
    /// Human-readable summary used in help output.
    pub description: &'static str,
    /// At least one of these must appear in the utterance.
    any_of: &'static [&'static str],
    /// Every one of these must also appear.
    all_of: &'static [&'static str],
    action: fn(&str, &dyn AppControl) -> Option<String>,
}

impl IntentRule {
    /// Substring test against lower-cased text.
    pub fn matches(&self, text: &str) -> bool {
        self.any_of.iter().any(|keyword| text.contains(keyword))
            && self.all_of.iter().all(|keyword| text.contains(keyword))
    }

    /// Runs the action; `None` means the rule declined to fire.
    fn fire(&self, text: &str, system: &dyn AppControl) -> Option<String> {
        (self.action)(text, system)
    }
}

/// A rule that fired, with the response it produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentMatch {
    pub kind: IntentKind,
    pub response: String,
}

/// Priority-ordered rule table.
static RULES: [IntentRule; 11] = [
    IntentRule {
        kind: IntentKind::Time,
        description: "Tell the current time",
        any_of: &["what time", "current time", "time is it"],
        all_of: &[],
        action: current_time,
    },
    IntentRule {
        kind: IntentKind::Date,
        description: "Tell today's date",
        any_of: &["what date", "today date", "what day"],
        all_of: &[],
        action: current_date,
    },
    IntentRule {
        kind: IntentKind::OpenApp,
        description: "Open an application (open/launch/start/run <app>)",
        any_of: &["open", "launch", "start", "run"],
        all_of: &[],
        action: open_app,
    },
    IntentRule {
        kind: IntentKind::CloseApp,
        description: "Close an application (close/quit/exit/stop <app>)",
        any_of: &["close", "quit", "exit", "stop"],
        all_of: &[],
        action: close_app,
    },
    IntentRule {
        kind: IntentKind::SearchWeb,
        description: "Search Google (search google for <query>)",
        any_of: &["search google", "google search"],
        all_of: &[],
        action: search_web,
    },
    IntentRule {
        kind: IntentKind::OpenWebsite,
        description: "Open a website (go to <site>)",
        any_of: &["open website", "go to"],
        all_of: &[],
        action: open_website,
    },
    IntentRule {
        kind: IntentKind::SystemInfo,
        description: "Report CPU, memory and disk usage",
        any_of: &["system info", "system status"],
        all_of: &[],
        action: system_info,
    },
    IntentRule {
        kind: IntentKind::MinimizeAll,
        description: "Minimize all windows",
        any_of: &["minimize all", "minimize windows"],
        all_of: &[],
        action: minimize_all,
    },
    IntentRule {
        kind: IntentKind::RunningApps,
        description: "Count running applications",
        any_of: &["running apps", "open apps"],
        all_of: &[],
        action: running_apps,
    },
    IntentRule {
        kind: IntentKind::Shutdown,
        description: "Shut down the computer",
        any_of: &["shutdown"],
        all_of: &["computer"],
        action: shutdown,
    },
    IntentRule {
        kind: IntentKind::Restart,
        description: "Restart the computer",
        any_of: &["restart"],
        all_of: &["computer"],
        action: restart,
    },
];

/// The rule table in evaluation order.
pub fn rules() -> &'static [IntentRule] {
    &RULES
}

/// Finds the first rule that fires for `text`.
///
/// # Arguments
/// * `text` - Normalized, lower-cased utterance.
/// * `system` - Collaborator the firing rule acts through.
///
/// # Returns
/// * `Some(IntentMatch)` - The first rule that fired; exactly one
///   collaborator call was made.
/// * `None` - No rule fired; no collaborator was called.
pub fn match_intent(text: &str, system: &dyn AppControl) -> Option<IntentMatch> {
    RULES
        .iter()
        .filter(|rule| rule.matches(text))
        .find_map(|rule| {
            let response = rule.fire(text, system)?;
            debug!(rule = ?rule.kind, "intent rule fired");
            Some(IntentMatch {
                kind: rule.kind,
                response,
            })
        })
}

/// Lists the local commands, one per line, in priority order.
pub fn describe_rules() -> String {
    let mut result = String::from("Local commands:\n");
    for rule in rules() {
        result.push_str(&format!("- {}\n", rule.description));
    }
    result
}

/// Reads the local clock.
///
/// # Returns
/// `"The current time is HH:MM AM"`; never declines.
fn current_time(_: &str, _: &dyn AppControl) -> Option<String> {
    Some(format!(
        "The current time is {}",
        text::format_time(&Local::now())
    ))
}

/// Reads the local calendar.
///
/// # Returns
/// `"Today is March 04, 2025"` style; never declines.
fn current_date(_: &str, _: &dyn AppControl) -> Option<String> {
    Some(format!("Today is {}", text::format_date(&Local::now())))
}

/// Launches the application named after the open verb.
///
/// # Arguments
/// * `input` - Normalized utterance, e.g. `"please open notepad"`.
/// * `system` - Launcher that receives the extracted name.
///
/// # Returns
/// * `Some(message)` - The launcher's message, success or not.
/// * `None` - Nothing follows the verb, so the rule declines.
fn open_app(input: &str, system: &dyn AppControl) -> Option<String> {
    let app = text::extract_app_name(input)?;
    Some(system.open(&app).message)
}

/// Closes the application named after the close verb.
///
/// # Details
/// The assistant never closes itself: `jarvis` and `yourself` decline
/// and the utterance moves on to the next rule.
///
/// # Arguments
/// * `input` - Normalized utterance, e.g. `"close spotify"`.
/// * `system` - Collaborator that terminates the process.
///
/// # Returns
/// * `Some(message)` - The collaborator's message.
/// * `None` - Empty target or a self-name.
fn close_app(input: &str, system: &dyn AppControl) -> Option<String> {
    let app = text::extract_close_app_name(input)?;
    if SELF_NAMES.contains(&app.as_str()) {
        return None;
    }
    Some(system.close(&app).message)
}

/// Searches the web for what remains once the search phrase is removed.
///
/// # Returns
/// * `Some(message)` - The collaborator's message.
/// * `None` - The query is empty.
fn search_web(input: &str, system: &dyn AppControl) -> Option<String> {
    let query = text::normalize(&SEARCH_PHRASE.replace_all(input, " "));
    if query.is_empty() {
        return None;
    }
    Some(system.search_web(&query).message)
}

/// Opens the site named after `go to` / `open website`.
///
/// # Details
/// Scheme handling is left to the collaborator, which adds `https://`
/// when missing.
///
/// # Returns
/// * `Some(message)` - The collaborator's message.
/// * `None` - No site was named.
fn open_website(input: &str, system: &dyn AppControl) -> Option<String> {
    let url = text::normalize(&WEBSITE_PHRASE.replace_all(input, " "));
    if url.is_empty() {
        return None;
    }
    Some(system.open_url(&url).message)
}

/// CPU, memory and disk usage as reported by the collaborator.
fn system_info(_: &str, system: &dyn AppControl) -> Option<String> {
    Some(system.info().message)
}

/// Minimizes every window.
fn minimize_all(_: &str, system: &dyn AppControl) -> Option<String> {
    Some(system.minimize_all().message)
}

/// Schedules a delayed shutdown.
fn shutdown(_: &str, system: &dyn AppControl) -> Option<String> {
    Some(system.shutdown().message)
}

/// Schedules a delayed restart.
fn restart(_: &str, system: &dyn AppControl) -> Option<String> {
    Some(system.restart().message)
}

/// Counts running processes.
///
/// # Returns
/// `"Currently running N applications"`, with N the number of distinct
/// process names.
fn running_apps(_: &str, system: &dyn AppControl) -> Option<String> {
    let count = system.list_running().len();
    Some(format!("Currently running {count} applications"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingControl;

    fn kind_of(text: &str) -> Option<IntentKind> {
        match_intent(text, &RecordingControl::new()).map(|hit| hit.kind)
    }

    #[test]
    fn table_order_is_the_documented_priority() {
        let order: Vec<_> = rules().iter().map(|rule| rule.kind).collect();
        assert_eq!(
            order,
            [
                IntentKind::Time,
                IntentKind::Date,
                IntentKind::OpenApp,
                IntentKind::CloseApp,
                IntentKind::SearchWeb,
                IntentKind::OpenWebsite,
                IntentKind::SystemInfo,
                IntentKind::MinimizeAll,
                IntentKind::RunningApps,
                IntentKind::Shutdown,
                IntentKind::Restart,
            ]
        );
    }

    #[test]
    fn time_and_date_queries() {
        assert_eq!(kind_of("what time is it?"), Some(IntentKind::Time));
        assert_eq!(kind_of("tell me the current time"), Some(IntentKind::Time));
        assert_eq!(kind_of("what day is it"), Some(IntentKind::Date));
    }

    #[test]
    fn open_calls_collaborator_once() {
        let control = RecordingControl::new();
        let hit = match_intent("open notepad", &control).unwrap();
        assert_eq!(hit.kind, IntentKind::OpenApp);
        assert_eq!(hit.response, "Opening notepad");
        assert_eq!(control.calls(), ["open:notepad"]);
    }

    #[test]
    fn open_wins_over_close() {
        let control = RecordingControl::new();
        let hit = match_intent("open notepad and close chrome", &control).unwrap();
        assert_eq!(hit.kind, IntentKind::OpenApp);
        assert_eq!(control.calls(), ["open:notepad and close chrome"]);
    }

    #[test]
    fn bare_verb_does_not_fire() {
        let control = RecordingControl::new();
        assert_eq!(match_intent("open", &control), None);
        assert!(control.calls().is_empty());
    }

    #[test]
    fn close_never_targets_the_assistant() {
        for text in ["close jarvis", "close yourself", "quit yourself"] {
            let control = RecordingControl::new();
            assert_eq!(match_intent(text, &control), None, "{text}");
            assert!(control.calls().is_empty());
        }
    }

    #[test]
    fn close_other_app() {
        let control = RecordingControl::new();
        let hit = match_intent("please close spotify", &control).unwrap();
        assert_eq!(hit.kind, IntentKind::CloseApp);
        assert_eq!(control.calls(), ["close:spotify"]);
    }

    #[test]
    fn search_strips_the_trigger_phrase() {
        let control = RecordingControl::new();
        let hit = match_intent("search google for rust lifetimes", &control).unwrap();
        assert_eq!(hit.kind, IntentKind::SearchWeb);
        assert_eq!(control.calls(), ["search:rust lifetimes"]);
        assert_eq!(match_intent("google search", &RecordingControl::new()), None);
    }

    #[test]
    fn go_to_opens_website() {
        let control = RecordingControl::new();
        let hit = match_intent("go to github.com", &control).unwrap();
        assert_eq!(hit.kind, IntentKind::OpenWebsite);
        assert_eq!(control.calls(), ["url:github.com"]);
    }

    #[test]
    fn system_queries() {
        assert_eq!(kind_of("give me the system status"), Some(IntentKind::SystemInfo));
        assert_eq!(kind_of("minimize all windows"), Some(IntentKind::MinimizeAll));
        assert_eq!(kind_of("how many running apps"), Some(IntentKind::RunningApps));
    }

    #[test]
    fn running_apps_counts_processes() {
        let control = RecordingControl::new().with_running(["a", "b", "c"]);
        let hit = match_intent("list running apps", &control).unwrap();
        assert_eq!(hit.response, "Currently running 3 applications");
    }

    #[test]
    fn power_rules_need_computer() {
        assert_eq!(kind_of("shutdown the computer"), Some(IntentKind::Shutdown));
        assert_eq!(kind_of("restart my computer"), Some(IntentKind::Restart));
        assert_eq!(kind_of("shutdown"), None);
    }

    #[test]
    fn unmatched_text_falls_through() {
        let control = RecordingControl::new();
        assert_eq!(match_intent("tell me a joke", &control), None);
        assert!(control.calls().is_empty());
    }

    #[test]
    fn help_lists_every_rule() {
        let help = describe_rules();
        assert_eq!(help.lines().count(), rules().len() + 1);
    }
}
