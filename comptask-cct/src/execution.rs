//! Operating-system side of the CCT
//!
//! Handles:
//! - Command files (one program per line, `#` comments)
//! - Staggered application launch on a background task
//! - Liveness check and SIGKILL of the launched pids
//! - Power commands (restart / close) run after the reply has gone out

use comptask_core::Shared;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command as AsyncCommand;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Launches are capped so the pid table stays bounded.
pub const MAX_PIDS: usize = 256;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to read command file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: shell_words::ParseError,
    },
    #[error("empty command")]
    EmptyCommand,
    #[error("unable to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to kill pid {pid}: {source}")]
    Kill {
        pid: u32,
        #[source]
        source: nix::Error,
    },
}

/// One program and its arguments.
pub type CommandLine = Vec<String>;

/// Splits a command file into argument vectors, skipping blank and `#` lines.
pub fn parse_command_lines(content: &str) -> Result<Vec<CommandLine>, ExecError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            shell_words::split(line).map_err(|source| ExecError::Parse { line: index + 1, source })
        })
        .collect()
}

pub fn read_command_file(path: &Path) -> Result<Vec<CommandLine>, ExecError> {
    let content = std::fs::read_to_string(path).map_err(|source| ExecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_command_lines(&content)
}

/// Starts a program detached from our stdio and returns its pid.
pub fn spawn_command(argv: &[String]) -> Result<u32, ExecError> {
    let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;
    let child = AsyncCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;
    // The child is only ever tracked through its pid.
    Ok(child.id().unwrap_or_default())
}

fn is_alive(pid: u32) -> bool {
    pid != 0 && signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Launches application processes and keeps track of their pids.
#[derive(Debug, Clone)]
pub struct AppLauncher {
    pids: Shared<Vec<u32>>,
    exec_delay: Duration,
}

impl AppLauncher {
    pub fn new(pids: Shared<Vec<u32>>, exec_delay: Duration) -> Self {
        Self { pids, exec_delay }
    }

    /// Launches `lines` in order on a background task, `exec_delay` apart.
    /// Resolves to the number of processes started.
    pub fn spawn_launch(&self, lines: Vec<CommandLine>) -> JoinHandle<usize> {
        let launcher = self.clone();
        tokio::spawn(async move { launcher.launch(lines).await })
    }

    pub async fn launch(&self, lines: Vec<CommandLine>) -> usize {
        let mut started = 0;
        for (index, argv) in lines.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.exec_delay).await;
            }
            if self.pids.lock().len() >= MAX_PIDS - 1 {
                warn!("Pid table full, not starting '{}'", argv.join(" "));
                break;
            }
            match spawn_command(argv) {
                Ok(pid) => {
                    info!("Started '{}' with pid {}", argv.join(" "), pid);
                    self.pids.lock().push(pid);
                    started += 1;
                }
                Err(e) => error!("{}", e),
            }
        }
        started
    }

    /// True if any launched process still answers signal 0.
    pub fn any_running(&self) -> bool {
        self.pids.lock().iter().any(|&pid| is_alive(pid))
    }

    /// SIGKILLs every live launched process and forgets all pids.
    /// Returns the number of processes killed, or the first failure.
    pub fn kill_all(&self) -> Result<usize, ExecError> {
        let pids: Vec<u32> = self.pids.lock().drain(..).collect();
        let mut killed = 0;
        let mut first_error = None;
        for pid in pids {
            if !is_alive(pid) {
                debug!("Pid {} already gone", pid);
                continue;
            }
            match signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) => {
                    info!("Killed pid {}", pid);
                    killed += 1;
                }
                Err(source) => {
                    let err = ExecError::Kill { pid, source };
                    error!("{}", err);
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(killed),
        }
    }

    pub fn pid_count(&self) -> usize {
        self.pids.lock().len()
    }
}

/// Starts a restart/close command and reports its outcome in the background.
pub fn run_power_command(command: &str) -> Result<(), ExecError> {
    let argv = shell_words::split(command).map_err(|source| ExecError::Parse { line: 1, source })?;
    let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;
    let mut child = AsyncCommand::new(program)
        .args(args)
        .spawn()
        .map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;
    let command = command.to_string();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => info!("'{}' completed", command),
            Ok(status) => error!("'{}' failed with {}", command, status),
            Err(e) => error!("'{}' could not be awaited: {}", command, e),
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use comptask_core::new_shared;

    #[test]
    fn test_parse_command_lines() {
        let lines = parse_command_lines(
            "# application\n\n/usr/bin/app --mode 'full run'\n   \n  # indented comment\nsleep 5\n",
        )
        .unwrap();
        assert_eq!(
            lines,
            vec![
                vec!["/usr/bin/app".to_string(), "--mode".to_string(), "full run".to_string()],
                vec!["sleep".to_string(), "5".to_string()],
            ]
        );
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = parse_command_lines("ok\n\nbad 'quote\n").unwrap_err();
        assert!(matches!(err, ExecError::Parse { line: 3, .. }));
    }

    #[test]
    fn test_missing_command_file() {
        let err = read_command_file(Path::new("/nonexistent/comptask/start.cfg")).unwrap_err();
        assert!(matches!(err, ExecError::Io { .. }));
    }

    #[tokio::test]
    async fn test_launch_track_and_kill() {
        let launcher = AppLauncher::new(new_shared(Vec::new()), Duration::from_millis(10));
        let lines = parse_command_lines("sleep 30\nsleep 30\n/nonexistent/program\n").unwrap();

        let started = launcher.spawn_launch(lines).await.unwrap();
        assert_eq!(started, 2);
        assert_eq!(launcher.pid_count(), 2);
        assert!(launcher.any_running());

        assert_eq!(launcher.kill_all().unwrap(), 2);
        assert_eq!(launcher.pid_count(), 0);
        assert!(!launcher.any_running());
    }

    #[test]
    fn test_empty_power_command() {
        assert!(matches!(run_power_command("   "), Err(ExecError::EmptyCommand)));
    }
}
