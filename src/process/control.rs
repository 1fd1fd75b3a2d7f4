/*!
 * Signal-Based Process Control
 * SIGTERM/SIGKILL delivery through nix, with `pkill` as the by-name fallback
 */

use super::procfs::ProcFs;
use super::traits::{ProcessControl, Signalled};
use crate::core::errors::{TerminationError, TerminationResult};
use crate::core::types::Pid;
use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid as NixPid;
use std::process::{Command, Stdio};

/// Process control for the local Linux host
#[derive(Debug, Clone, Default)]
pub struct NixControl {
    procfs: ProcFs,
}

impl NixControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn send(&self, pid: Pid, signal: Signal) -> TerminationResult<Signalled> {
        let target = signal_target(pid).ok_or(TerminationError::InvalidPid(pid))?;
        match kill(target, signal) {
            Ok(()) => {
                debug!("Sent {:?} to PID {}", signal, pid);
                Ok(Signalled::Delivered)
            }
            Err(Errno::ESRCH) => Ok(Signalled::AlreadyExited),
            Err(e) => Err(TerminationError::SignalFailed {
                pid,
                reason: e.to_string(),
            }),
        }
    }
}

/// PID safe to hand to kill(2): above init and a positive `pid_t`
fn signal_target(pid: Pid) -> Option<NixPid> {
    i32::try_from(pid).ok().filter(|raw| *raw > 1).map(NixPid::from_raw)
}

impl ProcessControl for NixControl {
    fn terminate(&self, pid: Pid) -> TerminationResult<Signalled> {
        self.send(pid, Signal::SIGTERM)
    }

    fn force_kill(&self, pid: Pid) -> TerminationResult<Signalled> {
        self.send(pid, Signal::SIGKILL)
    }

    fn kill_by_name(&self, name: &str) -> TerminationResult<()> {
        if name.trim().is_empty() {
            return Err(TerminationError::KillByNameFailed {
                name: name.to_string(),
                reason: "empty process name".to_string(),
            });
        }

        let status = Command::new("pkill")
            .args(["-KILL", "-x", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| TerminationError::KillByNameFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        // pkill exits 1 when nothing matched, which means the name is already gone
        match status.code() {
            Some(0) | Some(1) => Ok(()),
            _ => {
                warn!("pkill -x {} exited with {}", name, status);
                Err(TerminationError::KillByNameFailed {
                    name: name.to_string(),
                    reason: status.to_string(),
                })
            }
        }
    }

    fn is_alive(&self, pid: Pid) -> bool {
        let Some(target) = signal_target(pid) else {
            return false;
        };
        if kill(target, None).is_err() {
            return false;
        }
        // Signal 0 succeeds for zombies too
        self.procfs
            .read_entry(pid)
            .map(|entry| !entry.zombie)
            .unwrap_or(false)
    }
}
