//! Watch mode: re-run a command when its watched paths change.
//!
//! The watch set comes from the command's `watch` config; when absent, the
//! declaring invowkfile itself is watched. Glob entries are matched against
//! event paths; events inside the debounce window collapse into one re-run.
//! Ctrl+C leaves the loop and returns the last exit code.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use tracing::debug;

use crate::diag::Diagnostic;
use crate::discovery::CommandInfo;
use crate::error::InvowkError;
use crate::execute::{CancelToken, CommandService, ExecuteRequest};
use crate::output::Output;

/// One watch entry: the directory to register with the OS watcher plus an
/// optional glob filter for events below it.
#[derive(Debug, Clone)]
struct WatchEntry {
    root: PathBuf,
    pattern: Option<glob::Pattern>,
}

/// Split a configured path into the literal prefix to watch and the glob
/// remainder used for filtering.
fn entry_for(base_dir: &Path, raw: &str) -> WatchEntry {
    let has_glob = raw.contains(['*', '?', '[']);
    let absolute = if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        base_dir.join(raw)
    };
    if !has_glob {
        return WatchEntry {
            root: absolute,
            pattern: None,
        };
    }
    // Watch the longest literal ancestor, filter with the full pattern.
    let mut root = PathBuf::new();
    for component in absolute.components() {
        let text = component.as_os_str().to_string_lossy();
        if text.contains(['*', '?', '[']) {
            break;
        }
        root.push(component);
    }
    if root.as_os_str().is_empty() {
        root = base_dir.to_path_buf();
    }
    let pattern = glob::Pattern::new(&absolute.to_string_lossy()).ok();
    WatchEntry { root, pattern }
}

fn entries_for(info: &CommandInfo) -> (Vec<WatchEntry>, Duration) {
    match &info.command.watch {
        Some(spec) => {
            let base = info.model.base_dir();
            let entries = spec.paths.iter().map(|raw| entry_for(base, raw)).collect();
            (entries, spec.debounce_duration())
        }
        None => (
            vec![WatchEntry {
                root: info.file.clone(),
                pattern: None,
            }],
            Duration::from_millis(300),
        ),
    }
}

fn is_relevant(entries: &[WatchEntry], path: &Path) -> bool {
    entries.iter().any(|entry| match &entry.pattern {
        Some(pattern) => pattern.matches_path(path),
        None => path.starts_with(&entry.root),
    })
}

/// Run `request` once, then again on every relevant filesystem change.
pub fn run_with_watch(
    service: &CommandService,
    info: &CommandInfo,
    request: &ExecuteRequest,
    cancel: &CancelToken,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<i32, InvowkError> {
    let (entries, debounce) = entries_for(info);

    let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();
    let mut watcher = notify::recommended_watcher(tx).map_err(|e| InvowkError::Launch {
        command: info.qualified_name.clone(),
        message: format!("failed to create watcher: {e}"),
    })?;
    for entry in &entries {
        if let Err(e) = watcher.watch(&entry.root, RecursiveMode::Recursive) {
            debug!(path = %entry.root.display(), %e, "Watch registration failed");
        }
    }

    let mut last_code = service.execute(request, cancel, diagnostics)?;
    loop {
        // Wait for a relevant event, checking the interrupt between polls.
        let mut triggered = false;
        while !triggered {
            if cancel.is_cancelled() {
                return Ok(last_code);
            }
            match rx.recv_timeout(Duration::from_millis(200)) {
                Ok(Ok(event)) => {
                    if event.paths.iter().any(|p| is_relevant(&entries, p)) {
                        triggered = true;
                    }
                }
                Ok(Err(e)) => debug!(%e, "Watcher error"),
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(last_code),
            }
        }
        // Collapse the burst.
        std::thread::sleep(debounce);
        while rx.try_recv().is_ok() {}

        if cancel.is_cancelled() {
            return Ok(last_code);
        }
        Output::info(format!("Change detected; re-running {}", info.qualified_name));
        match service.execute(request, cancel, diagnostics) {
            Ok(0) => {
                Output::success(format!("{} exited 0", info.qualified_name));
                last_code = 0;
            }
            Ok(code) => last_code = code,
            Err(err) if err.exit_code() == crate::error::EXIT_USER_ERROR => {
                // A broken edit should not kill the loop; report and keep
                // watching.
                Output::error(err.to_string());
                last_code = err.exit_code();
            }
            Err(err) => return Err(err),
        }
    }
}
