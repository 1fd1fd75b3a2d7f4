/*!
 * Top-Level Window Listing
 * Window ownership from an EWMH window manager via `wmctrl -lp`
 */

use crate::core::errors::{ProbeError, ProbeResult};
use crate::core::types::Pid;
use std::collections::HashSet;
use std::process::{Command, Stdio};

/// Lists top-level windows through `wmctrl`
#[derive(Debug, Clone)]
pub struct WmctrlWindows {
    program: String,
}

impl WmctrlWindows {
    pub fn new() -> Self {
        Self {
            program: "wmctrl".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// PIDs owning at least one managed top-level window
    pub fn list(&self) -> ProbeResult<HashSet<Pid>> {
        let output = Command::new(&self.program)
            .arg("-lp")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| ProbeError::WindowListFailed(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(ProbeError::WindowListFailed(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        Ok(parse_window_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl Default for WmctrlWindows {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `wmctrl -lp` rows: `<window id> <desktop> <pid> <host> <title...>`
///
/// Desktop `-1` marks sticky panels and docks, which are not application windows.
pub fn parse_window_list(raw: &str) -> HashSet<Pid> {
    raw.lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let _id = cols.next()?;
            let desktop = cols.next()?;
            let pid: Pid = cols.next()?.parse().ok()?;
            (desktop != "-1" && pid > 0).then_some(pid)
        })
        .collect()
}
