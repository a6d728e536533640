//! Clipboard helper for the code-block copy affordance.

use std::io::Write as _;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::{JarvixError, Result};

/// Put `text` on the system clipboard.
///
/// Uses the native clipboard first and falls back to `pbcopy` / `xclip`
/// when no clipboard server is reachable (e.g. over SSH with X forwarding).
pub fn copy_text(text: &str) -> Result<()> {
    let native = arboard::Clipboard::new().and_then(|mut cb| cb.set_text(text.to_string()));
    match native {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("native clipboard failed ({e}), trying helpers");
            copy_with_helper(text).map_err(|helper| {
                JarvixError::Clipboard(format!("{e}; {helper}"))
            })
        }
    }
}

fn copy_with_helper(text: &str) -> std::result::Result<(), String> {
    let helpers: [(&str, &[&str]); 2] = [("pbcopy", &[]), ("xclip", &["-selection", "clipboard"])];
    for (program, args) in helpers {
        if let Some(result) = pipe_to(program, args, text) {
            return result;
        }
    }
    Err("no clipboard helper found".to_string())
}

/// Feed `text` to `program` on stdin. `None` if it could not be started.
fn pipe_to(program: &str, args: &[&str], text: &str) -> Option<std::result::Result<(), String>> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;
    // stdin is dropped at the end of this statement so the helper sees EOF
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(text.as_bytes()),
        None => Ok(()),
    };
    // Always reap the child, even when the write failed
    let status = child.wait();
    Some(match (written, status) {
        (Err(e), _) => Err(format!("writing to {program} failed: {e}")),
        (Ok(()), Ok(status)) if status.success() => Ok(()),
        (Ok(()), Ok(status)) => Err(format!("{program} exited with {status}")),
        (Ok(()), Err(e)) => Err(e.to_string()),
    })
}
