/*!
 * Launch Dispatcher
 *
 * Default dispatcher: spawns native command lines directly and starts web
 * targets in the configured browser with the app-mode flag. Children are
 * spawned through tokio so exited ones are reaped in the background and never
 * linger as zombies in the process table.
 */

use super::traits::LaunchDispatcher;
use crate::core::config::{process_name_of, OrchestratorConfig};
use crate::core::errors::{LaunchError, LaunchResult};
use crate::core::types::{ActiveProcessHandle, LaunchTarget};
use log::info;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Spawns targets as OS processes
///
/// Must be called from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    browser: Option<PathBuf>,
    browser_args: Vec<String>,
    app_mode_marker: String,
}

impl CommandLauncher {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            browser: config.primary_browser().map(Path::to_path_buf),
            browser_args: config.browser_args.clone(),
            app_mode_marker: config.app_mode_marker.clone(),
        }
    }

    /// Program and arguments for a target
    pub fn command_for(&self, target: &LaunchTarget) -> LaunchResult<(String, Vec<String>)> {
        if target.is_web {
            let url = target.raw_command.trim();
            if url.is_empty() {
                return Err(LaunchError::InvalidTarget("empty URL".to_string()));
            }
            let browser = self.browser.as_ref().ok_or(LaunchError::NoBrowser)?;
            let mut args = self.browser_args.clone();
            args.push(format!("{}{}", self.app_mode_marker, url));
            Ok((browser.display().to_string(), args))
        } else {
            let mut parts = split_command(&target.raw_command)?;
            if parts.is_empty() {
                return Err(LaunchError::InvalidTarget("empty command".to_string()));
            }
            let program = parts.remove(0);
            Ok((program, parts))
        }
    }

    fn spawn(&self, program: &str, args: &[String]) -> LaunchResult<ActiveProcessHandle> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| LaunchError::SpawnFailed {
                command: program.to_string(),
                reason: e.to_string(),
            })?;

        let pid = child.id().ok_or_else(|| LaunchError::SpawnFailed {
            command: program.to_string(),
            reason: "process exited before its PID was read".to_string(),
        })?;
        let name = process_name_of(Path::new(program)).unwrap_or_else(|| program.to_string());

        info!("Spawned '{}' (PID {})", program, pid);
        Ok(ActiveProcessHandle::new(pid, name))
    }
}

impl LaunchDispatcher for CommandLauncher {
    fn dispatch(&self, target: &LaunchTarget) -> LaunchResult<Option<ActiveProcessHandle>> {
        let (program, args) = self.command_for(target)?;
        self.spawn(&program, &args).map(Some)
    }
}

/// Split a command line shell-style
///
/// Whitespace separates words; single quotes are literal, double quotes allow
/// backslash escapes, and a backslash outside quotes escapes the next char.
pub fn split_command(raw: &str) -> LaunchResult<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated(raw)),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch) => current.push(ch),
                            None => return Err(unterminated(raw)),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated(raw)),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(ch) = chars.next() {
                    current.push(ch);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn unterminated(raw: &str) -> LaunchError {
    LaunchError::InvalidTarget(format!("unterminated quote in '{}'", raw))
}
