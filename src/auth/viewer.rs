//! Hand-off of the login-code image to a desktop viewer.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::info;

use crate::{AppError, Result};

/// Displays a login-code image to the operator.
pub trait ImageViewer: Send + Sync {
    /// Open `path` for the operator to scan.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the viewer cannot be launched.
    fn open(&self, path: &Path) -> Result<()>;
}

/// Launches the platform's default image viewer without waiting for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemImageViewer;

impl ImageViewer for SystemImageViewer {
    fn open(&self, path: &Path) -> Result<()> {
        let (program, mut args) = viewer_command();
        args.push(path.to_string_lossy().into_owned());

        Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| AppError::Io(format!("failed to launch {program}: {err}")))?;

        info!(viewer = program, path = %path.display(), "login code opened");
        Ok(())
    }
}

/// Viewer program and leading arguments for the host platform.
fn viewer_command() -> (&'static str, Vec<String>) {
    if cfg!(target_os = "windows") {
        ("cmd", vec!["/C".into(), "start".into(), String::new()])
    } else if cfg!(target_os = "macos") {
        ("open", Vec::new())
    } else if is_deepin() {
        ("deepin-image-viewer", Vec::new())
    } else {
        ("eog", Vec::new())
    }
}

fn is_deepin() -> bool {
    fs::read_to_string("/proc/sys/kernel/osrelease")
        .is_ok_and(|release| release.contains("deepin"))
}
