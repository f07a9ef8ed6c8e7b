//! Events published to the embedding application and the command/response
//! audit log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::state::StopEvent;
use crate::types::{StackFrame, Thread};

/// State changes and output the UI layer consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DebuggerEvent {
    /// The debugger process is up and the setup sequence was sent.
    GdbStarted { pid: Option<u32> },
    /// The debugger process is gone, whether by request or by crash.
    GdbFinished,
    InferiorSuspended(StopEvent),
    InferiorResumed,
    InferiorTerminated { exit_code: Option<i32> },
    /// Fresh stack after a confirmed stop, already filtered per the
    /// frame-display configuration.
    StackFramesUpdated(Vec<StackFrame>),
    ThreadsUpdated {
        threads: Vec<Thread>,
        current: Option<u32>,
    },
    ConsoleOutput(String),
    TargetOutput(String),
    LogOutput(String),
    /// A command failed or timed out and was not flagged silent.
    CommandDiagnostic {
        token: u32,
        command: String,
        message: String,
        timed_out: bool,
        non_critical: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogDirection {
    Command,
    Response,
}

/// Sink for the raw command/response traffic. Everything written to or
/// read from the debugger passes through here once.
pub trait DebuggerLog: Send + Sync {
    fn log(&self, direction: LogDirection, text: &str);
}

/// Discards everything.
pub struct NullLog;

impl DebuggerLog for NullLog {
    fn log(&self, _direction: LogDirection, _text: &str) {}
}

#[derive(Serialize)]
struct LogLine<'a> {
    direction: LogDirection,
    text: &'a str,
}

/// Appends the session traffic to a file as JSON lines.
pub struct FileLog {
    file: Mutex<File>,
}

impl FileLog {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(FileLog {
            file: Mutex::new(file),
        })
    }
}

impl DebuggerLog for FileLog {
    fn log(&self, direction: LogDirection, text: &str) {
        let line = match serde_json::to_string(&LogLine { direction, text }) {
            Ok(line) => line,
            Err(err) => {
                log::warn!("failed to encode session log line: {}", err);
                return;
            }
        };
        if let Ok(mut file) = self.file.lock() {
            if let Err(err) = writeln!(file, "{}", line) {
                log::warn!("failed to write session log: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_log_appends_json_lines() {
        let path = std::env::temp_dir().join(format!(
            "gdbmi-session-log-{}.jsonl",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let log = FileLog::create(&path).unwrap();
        log.log(LogDirection::Command, "1-gdb-set confirm off");
        log.log(LogDirection::Response, "1^done");
        drop(log);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["direction"], "Command");
        assert_eq!(first["text"], "1-gdb-set confirm off");

        std::fs::remove_file(&path).unwrap();
    }
}
