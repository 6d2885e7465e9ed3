/*
 * @file system.rs
 * @brief Application launcher and OS control collaborator
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

//! Application launcher and OS control.
//!
//! The dispatcher only sees the [`AppControl`] trait. [`SystemController`]
//! is the real implementation backed by `sysinfo`, the platform URL opener
//! and a handful of platform shell commands.

use std::{
    collections::BTreeSet,
    io,
    path::Path,
    process::{Command, Stdio},
};

use sysinfo::{Disks, Signal, System};
use tracing::{info, warn};

/// Seconds between a shutdown/restart request and the action.
const POWER_DELAY_SECS: u32 = 30;

/// Length the Linux kernel cuts process names (`comm`) to.
const COMM_LEN: usize = 15;

/// Base URL for web searches.
const SEARCH_URL: &str = "https://www.google.com/search?q=";

/// Result of one collaborator call.
///
/// `message` is always human readable and is forwarded verbatim as the
/// assistant's response whether or not `ok` is set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionOutcome {
    pub ok: bool,
    pub message: String,
}

impl ActionOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// OS-control collaborator used by the local intent rules.
pub trait AppControl: Send + Sync {
    fn open(&self, name: &str) -> ActionOutcome;
    fn close(&self, name: &str) -> ActionOutcome;
    fn list_running(&self) -> Vec<String>;
    fn info(&self) -> ActionOutcome;
    fn minimize_all(&self) -> ActionOutcome;
    fn shutdown(&self) -> ActionOutcome;
    fn restart(&self) -> ActionOutcome;
    fn open_url(&self, url: &str) -> ActionOutcome;
    fn search_web(&self, query: &str) -> ActionOutcome;
}

/// Spoken application names and the executable (or bundle) they launch.
#[cfg(target_os = "windows")]
const KNOWN_APPS: &[(&str, &str)] = &[
    ("notepad", "notepad.exe"),
    ("calculator", "calc.exe"),
    ("paint", "mspaint.exe"),
    ("chrome", "chrome.exe"),
    ("firefox", "firefox.exe"),
    ("edge", "msedge.exe"),
    ("explorer", "explorer.exe"),
    ("word", "WINWORD.EXE"),
    ("excel", "EXCEL.EXE"),
    ("powerpoint", "POWERPNT.EXE"),
    ("vscode", "Code.exe"),
    ("vs code", "Code.exe"),
    ("visual studio code", "Code.exe"),
    ("spotify", "Spotify.exe"),
    ("discord", "Discord.exe"),
    ("teams", "Teams.exe"),
    ("outlook", "OUTLOOK.EXE"),
    ("cmd", "cmd.exe"),
    ("command prompt", "cmd.exe"),
    ("powershell", "powershell.exe"),
];

#[cfg(target_os = "macos")]
const KNOWN_APPS: &[(&str, &str)] = &[
    ("notepad", "TextEdit"),
    ("calculator", "Calculator"),
    ("paint", "Preview"),
    ("chrome", "Google Chrome"),
    ("firefox", "Firefox"),
    ("edge", "Microsoft Edge"),
    ("explorer", "Finder"),
    ("finder", "Finder"),
    ("word", "Microsoft Word"),
    ("excel", "Microsoft Excel"),
    ("powerpoint", "Microsoft PowerPoint"),
    ("vscode", "Visual Studio Code"),
    ("vs code", "Visual Studio Code"),
    ("visual studio code", "Visual Studio Code"),
    ("spotify", "Spotify"),
    ("discord", "Discord"),
    ("teams", "Microsoft Teams"),
    ("outlook", "Microsoft Outlook"),
    ("terminal", "Terminal"),
    ("cmd", "Terminal"),
    ("command prompt", "Terminal"),
    ("safari", "Safari"),
];

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const KNOWN_APPS: &[(&str, &str)] = &[
    ("notepad", "gedit"),
    ("calculator", "gnome-calculator"),
    ("paint", "pinta"),
    ("chrome", "google-chrome"),
    ("firefox", "firefox"),
    ("edge", "microsoft-edge"),
    ("explorer", "nautilus"),
    ("files", "nautilus"),
    ("word", "libreoffice"),
    ("excel", "libreoffice"),
    ("powerpoint", "libreoffice"),
    ("vscode", "code"),
    ("vs code", "code"),
    ("visual studio code", "code"),
    ("spotify", "spotify"),
    ("discord", "discord"),
    ("teams", "teams"),
    ("outlook", "thunderbird"),
    ("terminal", "gnome-terminal"),
    ("cmd", "gnome-terminal"),
    ("command prompt", "gnome-terminal"),
];

/// Maps a spoken name to its executable, if it is a known application.
pub fn resolve_alias(name: &str) -> Option<&'static str> {
    let key = name.trim().to_lowercase();
    KNOWN_APPS
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, target)| *target)
}

/// Process name to look for when closing `name`.
///
/// # Details
/// Known names map through the alias table; anything else is used as
/// spoken. On Windows the `.exe` suffix is enforced.
pub fn process_name_for(name: &str) -> String {
    let base = resolve_alias(name)
        .map(str::to_string)
        .unwrap_or_else(|| name.trim().to_string());
    if cfg!(target_os = "windows") && !base.to_lowercase().ends_with(".exe") {
        format!("{base}.exe")
    } else {
        base
    }
}

/// Whether a running process is the one `close` is looking for.
///
/// # Details
/// Compares case-insensitively against the reported name, then the file
/// name of the executable. A name of exactly [`COMM_LEN`] bytes also
/// matches as a prefix, since Linux truncates longer names
/// (`gnome-calculator` runs as `gnome-calculato`).
///
/// # Arguments
/// * `name` - Process name as reported by the OS.
/// * `exe` - Executable path, when the OS lets us read it.
/// * `wanted` - Result of [`process_name_for`].
pub fn process_matches(name: &str, exe: Option<&Path>, wanted: &str) -> bool {
    if name.eq_ignore_ascii_case(wanted) {
        return true;
    }
    let exe_matches = exe
        .and_then(Path::file_name)
        .is_some_and(|file| file.to_string_lossy().eq_ignore_ascii_case(wanted));
    if exe_matches {
        return true;
    }
    name.len() == COMM_LEN
        && wanted
            .get(..COMM_LEN)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(name))
}

/// Prefixes `https://` unless the URL already names an http(s) scheme.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

/// Search URL with each word percent-encoded and words joined by `+`.
pub fn search_url(query: &str) -> String {
    let terms: Vec<_> = query
        .split_whitespace()
        .map(|word| urlencoding::encode(word).into_owned())
        .collect();
    format!("{SEARCH_URL}{}", terms.join("+"))
}

/// Real OS-control collaborator.
#[derive(Debug, Default)]
pub struct SystemController;

impl SystemController {
    pub fn new() -> Self {
        Self
    }

    /// Tries each launch strategy in turn until one spawns.
    fn launch(&self, target: &str) -> io::Result<()> {
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, target.to_string());
        for mut command in launch_commands(target) {
            match spawn_detached(&mut command) {
                Ok(()) => return Ok(()),
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }

    fn snapshot() -> System {
        let mut sys = System::new_all();
        sys.refresh_all();
        sys
    }
}

impl AppControl for SystemController {
    fn open(&self, name: &str) -> ActionOutcome {
        let target = resolve_alias(name).unwrap_or(name);
        info!(app = name, target, "opening application");
        match self.launch(target) {
            Ok(()) => ActionOutcome::success(format!("Opening {name}")),
            Err(err) => {
                warn!(app = name, error = %err, "launch failed");
                ActionOutcome::failure(format!("Could not find application: {name}"))
            }
        }
    }

    fn close(&self, name: &str) -> ActionOutcome {
        let wanted = process_name_for(name);
        info!(app = name, process = %wanted, "closing application");
        let sys = Self::snapshot();
        let mut closed = false;
        for process in sys.processes().values() {
            let name = process.name().to_string_lossy();
            if !process_matches(&name, process.exe(), &wanted) {
                continue;
            }
            let terminated = process
                .kill_with(Signal::Term)
                .unwrap_or_else(|| process.kill());
            closed |= terminated;
        }
        if closed {
            ActionOutcome::success(format!("Closed {name}"))
        } else {
            ActionOutcome::failure(format!("{name} is not running"))
        }
    }

    fn list_running(&self) -> Vec<String> {
        let sys = Self::snapshot();
        sys.processes()
            .values()
            .map(|process| process.name().to_string_lossy().into_owned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn info(&self) -> ActionOutcome {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        let cpu = sys.global_cpu_usage();
        let memory = percent(sys.used_memory(), sys.total_memory());
        let disk = root_disk_usage();
        ActionOutcome::success(format!(
            "CPU Usage: {cpu:.1}%\nMemory Usage: {memory:.1}%\nDisk Usage: {disk:.1}%"
        ))
    }

    fn minimize_all(&self) -> ActionOutcome {
        match run_to_completion(&mut minimize_command()) {
            Ok(()) => ActionOutcome::success("Minimized all windows"),
            Err(err) => ActionOutcome::failure(format!("Error minimizing windows: {err}")),
        }
    }

    fn shutdown(&self) -> ActionOutcome {
        warn!(delay_secs = POWER_DELAY_SECS, "scheduling shutdown");
        match spawn_detached(&mut power_command(false)) {
            Ok(()) => ActionOutcome::success(format!(
                "System will shutdown in {POWER_DELAY_SECS} seconds"
            )),
            Err(err) => ActionOutcome::failure(format!("Error shutting down: {err}")),
        }
    }

    fn restart(&self) -> ActionOutcome {
        warn!(delay_secs = POWER_DELAY_SECS, "scheduling restart");
        match spawn_detached(&mut power_command(true)) {
            Ok(()) => ActionOutcome::success(format!(
                "System will restart in {POWER_DELAY_SECS} seconds"
            )),
            Err(err) => ActionOutcome::failure(format!("Error restarting: {err}")),
        }
    }

    fn open_url(&self, url: &str) -> ActionOutcome {
        let url = normalize_url(url);
        info!(%url, "opening website");
        match open::that_detached(&url) {
            Ok(()) => ActionOutcome::success(format!("Opening {url}")),
            Err(err) => ActionOutcome::failure(format!("Error opening website: {err}")),
        }
    }

    fn search_web(&self, query: &str) -> ActionOutcome {
        let url = search_url(query);
        info!(query, "searching the web");
        match open::that_detached(&url) {
            Ok(()) => ActionOutcome::success(format!("Searching Google for {query}")),
            Err(err) => ActionOutcome::failure(format!("Error searching: {err}")),
        }
    }
}

/// Share of `total` taken by `used`.
///
/// # Returns
/// Percentage in `0.0..=100.0`; `0.0` when `total` is zero.
fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 / total as f64 * 100.0
}

/// Usage of the disk mounted at the filesystem root, or the first disk.
///
/// # Returns
/// Percentage used, or `0.0` when no disk is visible.
fn root_disk_usage() -> f64 {
    let disks = Disks::new_with_refreshed_list();
    let root = disks
        .list()
        .iter()
        .find(|disk| disk.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.list().first());
    root.map(|disk| {
        percent(
            disk.total_space().saturating_sub(disk.available_space()),
            disk.total_space(),
        )
    })
    .unwrap_or(0.0)
}

/// Launch strategies for `target`, most specific first.
///
/// # Details
/// Runs the target directly, then with `.exe`, then through `cmd /C start`.
///
/// # Arguments
/// * `target` - Executable or application name after alias resolution.
///
/// # Returns
/// Commands to try in order; the first that spawns wins.
#[cfg(target_os = "windows")]
fn launch_commands(target: &str) -> Vec<Command> {
    let mut start = Command::new("cmd");
    start.args(["/C", "start", "", target]);
    vec![Command::new(target), Command::new(format!("{target}.exe")), start]
}

/// Launch strategies for `target`, most specific first.
///
/// # Details
/// `open -a` finds bundles by display name; a bare command is the fallback.
///
/// # Arguments
/// * `target` - Executable or application name after alias resolution.
///
/// # Returns
/// Commands to try in order; the first that spawns wins.
#[cfg(target_os = "macos")]
fn launch_commands(target: &str) -> Vec<Command> {
    let mut by_name = Command::new("open");
    by_name.args(["-a", target]);
    vec![by_name, Command::new(target)]
}

/// Launch strategies for `target`, most specific first.
///
/// # Details
/// Tries the name as given, then with spaces turned into dashes.
///
/// # Arguments
/// * `target` - Executable or application name after alias resolution.
///
/// # Returns
/// Commands to try in order; the first that spawns wins.
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn launch_commands(target: &str) -> Vec<Command> {
    vec![Command::new(target), Command::new(target.replace(' ', "-"))]
}

/// Shell.Application `MinimizeAll` through PowerShell.
#[cfg(target_os = "windows")]
fn minimize_command() -> Command {
    let mut command = Command::new("powershell");
    command.args([
        "-NoProfile",
        "-Command",
        "(New-Object -ComObject Shell.Application).MinimizeAll()",
    ]);
    command
}

/// Hides every visible application except Finder.
#[cfg(target_os = "macos")]
fn minimize_command() -> Command {
    let mut command = Command::new("osascript");
    command.args([
        "-e",
        "tell application \"System Events\" to set visible of every process whose visible is true and name is not \"Finder\" to false",
    ]);
    command
}

/// Toggles "show desktop" through `wmctrl`.
///
/// # Details
/// Needs an EWMH window manager and `wmctrl` on `PATH`; otherwise the
/// spawn fails and the caller reports the error.
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn minimize_command() -> Command {
    let mut command = Command::new("wmctrl");
    command.args(["-k", "on"]);
    command
}

/// Delayed shutdown or restart using the timer built into `shutdown`.
///
/// # Arguments
/// * `restart` - Restart instead of powering off.
#[cfg(target_os = "windows")]
fn power_command(restart: bool) -> Command {
    let mut command = Command::new("shutdown");
    let flag = if restart { "/r" } else { "/s" };
    command.arg(flag).arg("/t").arg(POWER_DELAY_SECS.to_string());
    command
}

/// Delayed shutdown or restart via a detached `sh -c "sleep ..."`.
///
/// # Details
/// `shutdown` itself usually needs elevated rights; a failure then shows
/// up only in the system log, after the reply was given.
///
/// # Arguments
/// * `restart` - Restart instead of powering off.
#[cfg(not(target_os = "windows"))]
fn power_command(restart: bool) -> Command {
    let flag = if restart { "-r" } else { "-h" };
    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(format!("sleep {POWER_DELAY_SECS} && shutdown {flag} now"));
    command
}

/// Spawns without waiting and without inheriting the terminal.
///
/// # Errors
/// The program could not be started, e.g. it is not on `PATH`.
fn spawn_detached(command: &mut Command) -> io::Result<()> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

/// Runs to completion and turns a non-zero exit into an error.
///
/// # Errors
/// Spawn failures, or a non-zero exit carrying the trimmed stderr.
fn run_to_completion(command: &mut Command) -> io::Result<()> {
    let output = command.stdin(Stdio::null()).output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(io::Error::other(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}
