//! Shell-outs to the desktop: browser and clipboard.

use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Cap on text handed to the clipboard.
pub const CLIPBOARD_CAP: usize = 100_000;

const CLIPBOARD_TRUNCATION_MARKER: &str = "\n...[reply truncated for the clipboard]...";

/// Open a URL in the system browser. The command is started, not awaited.
pub fn open_url_in_browser(url: &str) -> EngineResult<()> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &["open"]
    } else {
        &["xdg-open", "gnome-open", "kde-open"]
    };

    for program in candidates {
        if which(program) {
            debug!(program, url, "opening browser");
            std::process::Command::new(program)
                .arg(url)
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .spawn()?;
            return Ok(());
        }
    }
    Err(EngineError::Network(
        "no browser opener found (xdg-open, gnome-open, kde-open)".to_string(),
    ))
}

/// Whether the system has a usable clipboard command.
pub fn clipboard_supported() -> bool {
    clipboard_write_command().is_some()
}

fn clipboard_write_command() -> Option<(&'static str, &'static [&'static str])> {
    if cfg!(target_os = "macos") && which("pbcopy") {
        return Some(("pbcopy", &[]));
    }
    if which("xclip") {
        return Some(("xclip", &["-selection", "clipboard"]));
    }
    if which("xsel") {
        return Some(("xsel", &["--clipboard", "--input"]));
    }
    None
}

fn clipboard_read_command() -> Option<(&'static str, &'static [&'static str])> {
    if cfg!(target_os = "macos") && which("pbpaste") {
        return Some(("pbpaste", &[]));
    }
    if which("xclip") {
        return Some(("xclip", &["-selection", "clipboard", "-o"]));
    }
    if which("xsel") {
        return Some(("xsel", &["--clipboard", "--output"]));
    }
    None
}

/// Copy text to the clipboard, truncating oversized replies with a marker.
pub fn write_clipboard(text: &str) -> EngineResult<()> {
    use std::io::Write;

    let (program, args) = clipboard_write_command()
        .ok_or_else(|| EngineError::Network("clipboard is not supported here".to_string()))?;

    let mut payload = text.trim().to_string();
    if payload.len() > CLIPBOARD_CAP {
        let mut cut = CLIPBOARD_CAP;
        while cut > 0 && !payload.is_char_boundary(cut) {
            cut -= 1;
        }
        payload.truncate(cut);
        payload.push_str(CLIPBOARD_TRUNCATION_MARKER);
    }
    if payload.is_empty() {
        return Ok(());
    }

    let mut child = std::process::Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::piped())
        .spawn()?;
    if let Some(stdin) = child.stdin.as_mut() {
        stdin.write_all(payload.as_bytes())?;
    }
    child.wait()?;
    Ok(())
}

/// Read the clipboard contents.
pub fn read_clipboard() -> EngineResult<String> {
    let (program, args) = clipboard_read_command()
        .ok_or_else(|| EngineError::Network("clipboard is not supported here".to_string()))?;
    let output = std::process::Command::new(program).args(args).output()?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn which(program: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(program).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn which_finds_sh() {
        assert!(which("sh"));
        assert!(!which("definitely-not-a-real-binary-name"));
    }
}
