//! Command dispatch and response correlation.
//!
//! Owns the pending-command table. Every command gets a monotonically
//! increasing token, is written as `<token>-<command>` (or wrapped as a
//! console command), and parks a single-shot callback until the matching
//! result record or the timeout arrives, whichever wins the
//! `HashMap::remove`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::commands::escape_argument;
use crate::events::{DebuggerEvent, DebuggerLog, LogDirection};
use crate::types::{ResultClass, ResultRecord};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("debugger error: {0}")]
    Debugger(String),
    #[error("no response within {0:?}")]
    TimedOut(Duration),
    #[error("debugger session is not active")]
    SessionClosed,
    #[error("failed to write to debugger: {0}")]
    Write(#[from] std::io::Error),
}

pub type CommandResult = Result<ResultRecord, CommandError>;

/// Single-shot completion handler for one posted command.
pub type CommandCallback = Box<dyn FnOnce(CommandResult) + Send + 'static>;

/// Per-command behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandFlags {
    /// Wrap the command in `-interpreter-exec console "..."`.
    pub console: bool,
    /// A failure should not abort a broader multi-step operation.
    pub non_critical: bool,
    /// Expected to fail sometimes; suppress user-visible error surfacing.
    pub silent: bool,
}

impl CommandFlags {
    pub fn new() -> Self {
        CommandFlags::default()
    }

    pub fn console(mut self) -> Self {
        self.console = true;
        self
    }

    pub fn non_critical(mut self) -> Self {
        self.non_critical = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

struct PendingCommand {
    command: String,
    flags: CommandFlags,
    callback: Option<CommandCallback>,
}

struct Inner {
    token: AtomicU32,
    pending: Mutex<HashMap<u32, PendingCommand>>,
    writer: AsyncMutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>,
    timeout: Duration,
    log: Arc<dyn DebuggerLog>,
    events: mpsc::UnboundedSender<DebuggerEvent>,
    open: AtomicBool,
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(
        timeout: Duration,
        log: Arc<dyn DebuggerLog>,
        events: mpsc::UnboundedSender<DebuggerEvent>,
    ) -> Self {
        Dispatcher {
            inner: Arc::new(Inner {
                token: AtomicU32::new(1),
                pending: Mutex::new(HashMap::new()),
                writer: AsyncMutex::new(None),
                timeout,
                log,
                events,
                open: AtomicBool::new(false),
            }),
        }
    }

    /// Wire the outbound stream and start accepting commands.
    pub async fn open(&self, writer: Box<dyn AsyncWrite + Send + Unpin>) {
        *self.inner.writer.lock().await = Some(writer);
        self.inner.open.store(true, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().unwrap().len()
    }

    /// Stop accepting commands and fail everything still pending. Called
    /// when the session ends, normally or not.
    pub async fn close(&self) {
        self.inner.open.store(false, Ordering::SeqCst);
        *self.inner.writer.lock().await = None;
        let drained: Vec<PendingCommand> = {
            let mut pending = self.inner.pending.lock().unwrap();
            pending.drain().map(|(_, entry)| entry).collect()
        };
        for entry in drained {
            log::warn!("command `{}` abandoned: session closed", entry.command);
            if let Some(callback) = entry.callback {
                callback(Err(CommandError::SessionClosed));
            }
        }
    }

    /// Assign a token, record the pending entry, write the wire line and
    /// arm the timeout. The callback fires exactly once: with the matched
    /// result, the timeout, or session closure.
    pub async fn post(
        &self,
        command: impl Into<String>,
        flags: CommandFlags,
        callback: Option<CommandCallback>,
    ) -> Result<u32, CommandError> {
        let command = command.into();
        if !self.is_open() {
            return Err(CommandError::SessionClosed);
        }

        let token = self.next_token();
        let wire = if flags.console {
            format!(
                "{}-interpreter-exec console {}",
                token,
                escape_argument(&command)
            )
        } else {
            format!("{}-{}", token, command)
        };

        self.inner.pending.lock().unwrap().insert(
            token,
            PendingCommand {
                command,
                flags,
                callback,
            },
        );

        self.inner.log.log(LogDirection::Command, &wire);
        log::debug!("SEND[{}]: {}", token, wire);

        let write_result = {
            let mut writer = self.inner.writer.lock().await;
            match writer.as_mut() {
                Some(writer) => {
                    let line = format!("{}\n", wire);
                    match writer.write_all(line.as_bytes()).await {
                        Ok(()) => writer.flush().await,
                        Err(err) => Err(err),
                    }
                }
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "debugger input stream is gone",
                )),
            }
        };
        if let Err(err) = write_result {
            self.inner.pending.lock().unwrap().remove(&token);
            return Err(CommandError::Write(err));
        }

        self.arm_timeout(token);
        Ok(token)
    }

    /// Route a result record to its pending command. Returns false for
    /// tokens nothing is waiting on.
    pub fn dispatch(&self, record: ResultRecord) -> bool {
        let token = match record.token {
            Some(token) => token,
            None => return false,
        };
        let entry = match self.inner.pending.lock().unwrap().remove(&token) {
            Some(entry) => entry,
            None => {
                log::warn!("RECV[{}]: no pending command for token", token);
                return false;
            }
        };

        if record.class == ResultClass::Error {
            let message = record
                .error_message()
                .unwrap_or("unknown debugger error")
                .to_string();
            log::error!("RECV[{}]: `{}` failed: {}", token, entry.command, message);
            if !entry.flags.silent {
                let _ = self.inner.events.send(DebuggerEvent::CommandDiagnostic {
                    token,
                    command: entry.command.clone(),
                    message: message.clone(),
                    timed_out: false,
                    non_critical: entry.flags.non_critical,
                });
            }
            if let Some(callback) = entry.callback {
                callback(Err(CommandError::Debugger(message)));
            }
        } else {
            log::debug!("RECV[{}]: {:?}", token, record.class);
            if let Some(callback) = entry.callback {
                callback(Ok(record));
            }
        }
        true
    }

    fn next_token(&self) -> u32 {
        // Tokens increase monotonically; on wrap-around, skip any value
        // that still has a pending entry rather than clobbering it.
        loop {
            let token = self.inner.token.fetch_add(1, Ordering::SeqCst);
            if !self.inner.pending.lock().unwrap().contains_key(&token) {
                return token;
            }
        }
    }

    fn arm_timeout(&self, token: u32) {
        let inner = self.inner.clone();
        let timeout = self.inner.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let entry = inner.pending.lock().unwrap().remove(&token);
            if let Some(entry) = entry {
                // A hung debugger looks exactly like this; keep it loud
                // and distinct from ordinary command failures.
                log::error!(
                    "TIMEOUT[{}]: `{}` got no response within {:?}",
                    token,
                    entry.command,
                    timeout
                );
                if !entry.flags.silent {
                    let _ = inner.events.send(DebuggerEvent::CommandDiagnostic {
                        token,
                        command: entry.command.clone(),
                        message: format!("no response within {:?}", timeout),
                        timed_out: true,
                        non_critical: entry.flags.non_critical,
                    });
                }
                if let Some(callback) = entry.callback {
                    callback(Err(CommandError::TimedOut(timeout)));
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullLog;
    use crate::parser::parse_line;
    use crate::types::MiRecord;
    use std::sync::atomic::AtomicU32 as TestCounter;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};
    use tokio::sync::oneshot;

    async fn wired(
        timeout: Duration,
    ) -> (
        Dispatcher,
        mpsc::UnboundedReceiver<DebuggerEvent>,
        BufReader<DuplexStream>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(timeout, Arc::new(NullLog), events_tx);
        let (near, far) = tokio::io::duplex(4096);
        dispatcher.open(Box::new(near)).await;
        (dispatcher, events_rx, BufReader::new(far))
    }

    async fn next_wire_line(reader: &mut BufReader<DuplexStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    fn result_record(line: &str) -> ResultRecord {
        match parse_line(line).unwrap().unwrap() {
            MiRecord::Result(record) => record,
            other => panic!("expected result record, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn posts_are_token_prefixed_and_monotonic() {
        let (dispatcher, _events, mut reader) = wired(Duration::from_secs(5)).await;
        dispatcher
            .post("gdb-set confirm off", CommandFlags::new(), None)
            .await
            .unwrap();
        dispatcher
            .post("exec-run", CommandFlags::new(), None)
            .await
            .unwrap();
        assert_eq!(next_wire_line(&mut reader).await, "1-gdb-set confirm off");
        assert_eq!(next_wire_line(&mut reader).await, "2-exec-run");
    }

    #[tokio::test]
    async fn console_flag_wraps_the_command() {
        let (dispatcher, _events, mut reader) = wired(Duration::from_secs(5)).await;
        dispatcher
            .post(
                "thread apply all bt full",
                CommandFlags::new().console(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(
            next_wire_line(&mut reader).await,
            "1-interpreter-exec console \"thread apply all bt full\""
        );
    }

    #[tokio::test]
    async fn callback_fires_once_with_matched_result() {
        let (dispatcher, _events, mut reader) = wired(Duration::from_secs(5)).await;
        let (tx, rx) = oneshot::channel();
        let token = dispatcher
            .post(
                "break-insert -f \"m.mo:4\"",
                CommandFlags::new(),
                Some(Box::new(move |outcome| {
                    let _ = tx.send(outcome);
                })),
            )
            .await
            .unwrap();
        let _ = next_wire_line(&mut reader).await;

        assert_eq!(dispatcher.pending_count(), 1);
        assert!(dispatcher.dispatch(result_record(&format!(
            "{}^done,bkpt={{number=\"1\"}}",
            token
        ))));
        assert_eq!(dispatcher.pending_count(), 0);

        let outcome = rx.await.unwrap().unwrap();
        assert_eq!(outcome.token, Some(token));

        // a duplicate response finds nothing to complete
        assert!(!dispatcher.dispatch(result_record(&format!("{}^done", token))));
    }

    #[tokio::test]
    async fn error_results_reach_the_callback_and_the_event_stream() {
        let (dispatcher, mut events, mut reader) = wired(Duration::from_secs(5)).await;
        let (tx, rx) = oneshot::channel();
        let token = dispatcher
            .post(
                "data-evaluate-expression \"nope\"",
                CommandFlags::new().non_critical(),
                Some(Box::new(move |outcome| {
                    let _ = tx.send(outcome);
                })),
            )
            .await
            .unwrap();
        let _ = next_wire_line(&mut reader).await;

        dispatcher.dispatch(result_record(&format!(
            "{}^error,msg=\"No symbol \\\"nope\\\" in current context.\"",
            token
        )));

        match rx.await.unwrap() {
            Err(CommandError::Debugger(msg)) => {
                assert_eq!(msg, "No symbol \"nope\" in current context.")
            }
            other => panic!("expected debugger error, got {:?}", other),
        }
        match events.recv().await.unwrap() {
            DebuggerEvent::CommandDiagnostic {
                timed_out,
                non_critical,
                ..
            } => {
                assert!(!timed_out);
                assert!(non_critical);
            }
            other => panic!("expected diagnostic, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn silent_commands_do_not_surface_errors() {
        let (dispatcher, mut events, mut reader) = wired(Duration::from_secs(5)).await;
        let token = dispatcher
            .post("break-delete 42", CommandFlags::new().silent(), None)
            .await
            .unwrap();
        let _ = next_wire_line(&mut reader).await;

        dispatcher.dispatch(result_record(&format!(
            "{}^error,msg=\"No breakpoint number 42.\"",
            token
        )));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn timeout_fails_the_command_exactly_once() {
        let (dispatcher, mut events, mut reader) = wired(Duration::from_millis(30)).await;
        let fired = Arc::new(TestCounter::new(0));
        let fired_in_cb = fired.clone();
        let token = dispatcher
            .post(
                "data-evaluate-expression \"hang()\"",
                CommandFlags::new(),
                Some(Box::new(move |outcome| {
                    assert!(matches!(outcome, Err(CommandError::TimedOut(_))));
                    fired_in_cb.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .await
            .unwrap();
        let _ = next_wire_line(&mut reader).await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.pending_count(), 0);
        match events.recv().await.unwrap() {
            DebuggerEvent::CommandDiagnostic { timed_out, .. } => assert!(timed_out),
            other => panic!("expected diagnostic, got {:?}", other),
        }

        // the late response finds the table empty
        assert!(!dispatcher.dispatch(result_record(&format!("{}^done", token))));
    }

    #[tokio::test]
    async fn response_beats_timeout() {
        let (dispatcher, mut events, mut reader) = wired(Duration::from_millis(40)).await;
        let fired = Arc::new(TestCounter::new(0));
        let fired_in_cb = fired.clone();
        let token = dispatcher
            .post(
                "stack-list-frames",
                CommandFlags::new(),
                Some(Box::new(move |outcome| {
                    assert!(outcome.is_ok());
                    fired_in_cb.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .await
            .unwrap();
        let _ = next_wire_line(&mut reader).await;

        dispatcher.dispatch(result_record(&format!("{}^done,stack=[]", token)));
        tokio::time::sleep(Duration::from_millis(90)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_fails_pending_and_rejects_new_posts() {
        let (dispatcher, _events, mut reader) = wired(Duration::from_secs(5)).await;
        let (tx, rx) = oneshot::channel();
        dispatcher
            .post(
                "exec-continue",
                CommandFlags::new(),
                Some(Box::new(move |outcome| {
                    let _ = tx.send(outcome);
                })),
            )
            .await
            .unwrap();
        let _ = next_wire_line(&mut reader).await;

        dispatcher.close().await;
        assert!(matches!(
            rx.await.unwrap(),
            Err(CommandError::SessionClosed)
        ));
        assert!(matches!(
            dispatcher
                .post("exec-run", CommandFlags::new(), None)
                .await,
            Err(CommandError::SessionClosed)
        ));
    }
}
