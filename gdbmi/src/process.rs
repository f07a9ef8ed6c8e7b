//! Debugger child-process management.
//!
//! Spawns the debugger with its MI interpreter, hands out the piped
//! streams, and delivers the platform-specific interrupt used to suspend
//! a running inferior.

use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to start debugger process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("debugger process already exited")]
    Exited,
    #[error("failed to interrupt debugger: {0}")]
    Interrupt(String),
}

pub type Result<T> = std::result::Result<T, ProcessError>;

pub struct GdbProcess {
    child: Child,
}

impl GdbProcess {
    /// Start the debugger in MI mode, optionally loading a program and
    /// switching to a working directory first.
    pub fn spawn(
        gdb_path: &Path,
        program: Option<&Path>,
        working_dir: Option<&Path>,
    ) -> Result<Self> {
        log::debug!("starting debugger: {}", gdb_path.display());

        let mut command = Command::new(gdb_path);
        command.arg("-q").arg("--interpreter=mi2");
        if let Some(program) = program {
            command.arg(program);
        }
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }
        let child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        log::debug!("debugger started with pid {:?}", child.id());

        Ok(GdbProcess { child })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    /// Best-effort kill without waiting; used from Drop.
    pub fn start_kill(&mut self) {
        let _ = self.child.start_kill();
    }

    /// Ask the debugger to break a running inferior by delivering the
    /// platform interrupt to the debugger process.
    pub fn interrupt(&self) -> Result<()> {
        match self.id() {
            Some(pid) => self.send_interrupt_signal(pid),
            None => Err(ProcessError::Exited),
        }
    }

    #[cfg(unix)]
    fn send_interrupt_signal(&self, pid: u32) -> Result<()> {
        let result = unsafe { libc::kill(pid as i32, libc::SIGINT) };
        if result != 0 {
            Err(ProcessError::Interrupt(format!(
                "kill(SIGINT) failed for pid {}",
                pid
            )))
        } else {
            log::debug!("sent SIGINT to debugger pid {}", pid);
            Ok(())
        }
    }

    #[cfg(windows)]
    fn send_interrupt_signal(&self, pid: u32) -> Result<()> {
        use winapi::um::wincon::{GenerateConsoleCtrlEvent, CTRL_C_EVENT};

        let result = unsafe { GenerateConsoleCtrlEvent(CTRL_C_EVENT, pid) };
        if result == 0 {
            Err(ProcessError::Interrupt(format!(
                "GenerateConsoleCtrlEvent failed for pid {}",
                pid
            )))
        } else {
            log::debug!("sent CTRL_C_EVENT to debugger pid {}", pid);
            Ok(())
        }
    }

    #[cfg(not(any(unix, windows)))]
    fn send_interrupt_signal(&self, _pid: u32) -> Result<()> {
        Err(ProcessError::Interrupt(
            "interrupt not supported on this platform".into(),
        ))
    }
}
