/*!
 * Procfs Process Table
 *
 * Reads `/proc/<pid>/stat` and `/proc/<pid>/cmdline` for every numeric entry
 * under a configurable root. Processes that vanish mid-scan are skipped; all
 * reads are size-bounded.
 */

use super::display::WmctrlWindows;
use super::traits::{ProcessProbe, WindowOwners};
use crate::core::errors::{ProbeError, ProbeResult};
use crate::core::limits::{MAX_PROC_READ_SIZE, MAX_PROC_SCAN_ENTRIES};
use crate::core::types::{Pid, ProcessEntry};
use log::{debug, trace};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Where window ownership comes from
#[derive(Debug, Clone)]
pub enum WindowSource {
    Wmctrl(WmctrlWindows),
    /// Treat every process as windowed
    AssumeAll,
}

/// Process probe backed by procfs
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
    windows: WindowSource,
}

impl ProcFs {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Probe rooted somewhere other than `/proc` (used by tests)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            windows: WindowSource::Wmctrl(WmctrlWindows::new()),
        }
    }

    #[must_use]
    pub fn with_windows(mut self, windows: WindowSource) -> Self {
        self.windows = windows;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read a single entry; `None` when the process is gone or unreadable
    pub fn read_entry(&self, pid: Pid) -> Option<ProcessEntry> {
        let dir = self.root.join(pid.to_string());
        let stat = read_bounded(&dir.join("stat")).ok()?;
        let (name, state, ppid) = parse_stat(&stat)?;
        let cmdline = read_bounded(&dir.join("cmdline"))
            .map(|raw| join_cmdline(&raw))
            .unwrap_or_default();

        Some(ProcessEntry {
            pid,
            ppid,
            name,
            cmdline,
            zombie: state == 'Z' || state == 'X',
        })
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for ProcFs {
    fn snapshot(&self) -> ProbeResult<Vec<ProcessEntry>> {
        let dir = std::fs::read_dir(&self.root).map_err(|e| ProbeError::ReadFailed {
            path: self.root.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut entries = Vec::new();
        for (scanned, entry) in dir.enumerate() {
            if scanned >= MAX_PROC_SCAN_ENTRIES {
                return Err(ProbeError::ScanOverflow {
                    max: MAX_PROC_SCAN_ENTRIES,
                });
            }
            let Ok(entry) = entry else { continue };
            let Ok(pid) = entry.file_name().to_string_lossy().parse::<Pid>() else {
                continue;
            };
            match self.read_entry(pid) {
                Some(process) => entries.push(process),
                None => trace!("PID {} vanished during scan", pid),
            }
        }

        debug!("Process table snapshot: {} entries", entries.len());
        Ok(entries)
    }

    fn window_owners(&self) -> ProbeResult<WindowOwners> {
        match &self.windows {
            WindowSource::Wmctrl(lister) => lister.list().map(WindowOwners::Pids),
            WindowSource::AssumeAll => Ok(WindowOwners::All),
        }
    }
}

fn read_bounded(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut buf = Vec::new();
    file.take(MAX_PROC_READ_SIZE).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Parse `pid (comm) state ppid ...`
///
/// The comm may itself contain spaces and parentheses, so it runs up to the
/// last closing parenthesis.
pub fn parse_stat(raw: &[u8]) -> Option<(String, char, Pid)> {
    let text = String::from_utf8_lossy(raw);
    let open = text.find('(')?;
    let close = text.rfind(')')?;
    if close < open {
        return None;
    }
    let comm = &text[open + 1..close];
    let mut rest = text[close + 1..].split_whitespace();
    let state = rest.next()?.chars().next()?;
    let ppid = rest.next()?.parse().ok()?;
    Some((comm.to_string(), state, ppid))
}

/// NUL-separated argv joined with single spaces
pub fn join_cmdline(raw: &[u8]) -> String {
    raw.split(|b| *b == 0)
        .filter(|arg| !arg.is_empty())
        .map(|arg| String::from_utf8_lossy(arg))
        .collect::<Vec<_>>()
        .join(" ")
}
