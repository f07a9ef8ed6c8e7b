//! GDB machine-interface debugger adapter.
//!
//! Drives a GDB-compatible debugger over its line-oriented MI protocol:
//! launches or attaches to the debugger process, correlates commands with
//! responses, tracks the inferior's run/suspend state and publishes the
//! events an IDE front-end consumes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;

pub mod commands;
pub mod dispatcher;
pub mod events;
pub mod parser;
pub mod process;
pub mod state;
pub mod types;

pub use dispatcher::{CommandCallback, CommandError, CommandFlags, CommandResult, Dispatcher};
pub use events::{DebuggerEvent, DebuggerLog, FileLog, LogDirection, NullLog};
pub use parser::ParseError;
pub use state::{
    suffix_filter, ExecutionState, InferiorState, StepKind, StopEvent, UserCodePredicate,
};
pub use types::*;

use crate::process::GdbProcess;
use crate::state::StopDisposition;

#[derive(Error, Debug)]
pub enum GdbError {
    #[error(transparent)]
    Process(#[from] process::ProcessError),
    #[error(transparent)]
    Command(#[from] dispatcher::CommandError),
    #[error("debugger session already running")]
    AlreadyRunning,
    #[error("inferior is not running")]
    NotRunning,
    #[error("failed to open session log: {0}")]
    Log(std::io::Error),
    #[error("communication error: {0}")]
    Communication(String),
}

pub type Result<T> = std::result::Result<T, GdbError>;

/// Everything the adapter needs to know about its environment. Passed in
/// explicitly; there is no ambient settings store.
#[derive(Debug, Clone)]
pub struct DebuggerConfig {
    pub gdb_path: PathBuf,
    /// Deadline for each posted command; a silent debugger past this
    /// point counts as a failure.
    pub command_timeout: Duration,
    /// `print elements` limit; 0 lifts the limit.
    pub output_limit: u32,
    /// Show generated C frames in published stacks.
    pub display_c_frames: bool,
    /// Show frames with no recognizable source in published stacks.
    pub display_unknown_frames: bool,
    /// Source suffixes counted as user code by the stepping filter.
    pub user_code_extensions: Vec<String>,
    /// Location for the internal catch breakpoint; `None` disables it.
    pub catch_location: Option<String>,
    /// Session traffic log; `None` disables it.
    pub log_path: Option<PathBuf>,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        DebuggerConfig {
            gdb_path: PathBuf::from("gdb"),
            command_timeout: Duration::from_secs(40),
            output_limit: 0,
            display_c_frames: false,
            display_unknown_frames: false,
            user_code_extensions: vec!["mo".to_string()],
            catch_location: None,
            log_path: None,
        }
    }
}

/// Parameters for starting a fresh inferior under the debugger.
#[derive(Debug, Clone, Default)]
pub struct LaunchRequest {
    pub program: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub arguments: Vec<String>,
}

/// Completion handler for a breakpoint insert: receives the breakpoint
/// with its debugger-assigned id, or the failure.
pub type BreakpointCallback =
    Box<dyn FnOnce(std::result::Result<Breakpoint, CommandError>) + Send + 'static>;

struct Shared {
    dispatcher: Dispatcher,
    exec: Mutex<ExecutionState>,
    events: mpsc::UnboundedSender<DebuggerEvent>,
    log: Arc<dyn DebuggerLog>,
    killed: AtomicBool,
    gdb_running: AtomicBool,
    display_c_frames: bool,
    display_unknown_frames: bool,
}

impl Shared {
    fn send_event(&self, event: DebuggerEvent) {
        let _ = self.events.send(event);
    }

    /// Route one raw line of debugger output.
    async fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.log.log(LogDirection::Response, line);

        match parser::parse_line(line) {
            Ok(None) => {}
            Ok(Some(MiRecord::Result(record))) => self.handle_result(record),
            Ok(Some(MiRecord::Async(record))) => self.handle_async(record).await,
            Ok(Some(MiRecord::Stream(stream))) => self.handle_stream(stream),
            Err(err) => {
                // Never fatal; surface the raw text and move on.
                log::warn!("unparsed debugger output ({}): {}", err, line);
                self.send_event(DebuggerEvent::LogOutput(line.to_string()));
            }
        }
    }

    fn handle_result(&self, record: ResultRecord) {
        if record.class == ResultClass::Running && self.exec.lock().unwrap().on_running() {
            self.send_event(DebuggerEvent::InferiorResumed);
        }
        if record.token.is_some() {
            self.dispatcher.dispatch(record);
        } else {
            log::debug!("untracked result record: {:?}", record.class);
        }
    }

    async fn handle_async(&self, record: AsyncRecord) {
        match (record.kind, record.class) {
            (AsyncKind::Exec, AsyncClass::Running) => {
                if self.exec.lock().unwrap().on_running() {
                    self.send_event(DebuggerEvent::InferiorResumed);
                }
            }
            (AsyncKind::Exec, AsyncClass::Stopped) => {
                let disposition = self.exec.lock().unwrap().on_stopped(&record.results);
                match disposition {
                    StopDisposition::Suspend(stop) => {
                        self.send_event(DebuggerEvent::InferiorSuspended(stop));
                        self.refresh_stack().await;
                        self.refresh_threads().await;
                    }
                    StopDisposition::Resume(kind) => {
                        let command = match kind {
                            StepKind::Next => commands::exec_next(),
                            StepKind::Step => commands::exec_step(),
                        };
                        if let Err(err) = self
                            .dispatcher
                            .post(command, CommandFlags::new().silent(), None)
                            .await
                        {
                            log::error!("failed to reissue step command: {}", err);
                        }
                    }
                    StopDisposition::Terminated { exit_code } => {
                        self.send_event(DebuggerEvent::InferiorTerminated { exit_code });
                        self.shutdown_session().await;
                    }
                    StopDisposition::Ignore => {}
                }
            }
            (AsyncKind::Notify, AsyncClass::ThreadGroupExited) => {
                let exit_code = record
                    .results
                    .find_const("exit-code")
                    .and_then(state::parse_exit_code);
                if self.exec.lock().unwrap().on_terminated() {
                    self.send_event(DebuggerEvent::InferiorTerminated { exit_code });
                    self.shutdown_session().await;
                }
            }
            (AsyncKind::Notify, class) => {
                log::debug!("notify record: {:?}", class);
            }
            _ => {}
        }
    }

    fn handle_stream(&self, stream: StreamRecord) {
        match stream.kind {
            StreamKind::Console => self.send_event(DebuggerEvent::ConsoleOutput(stream.content)),
            StreamKind::Target => self.send_event(DebuggerEvent::TargetOutput(stream.content)),
            StreamKind::Log => self.send_event(DebuggerEvent::LogOutput(stream.content)),
        }
    }

    async fn refresh_stack(&self) {
        let events = self.events.clone();
        let display_c = self.display_c_frames;
        let display_unknown = self.display_unknown_frames;
        let posted = self
            .dispatcher
            .post(
                commands::stack_list_frames(),
                CommandFlags::new().non_critical(),
                Some(Box::new(move |outcome| {
                    if let Ok(record) = outcome {
                        let frames = StackFrame::list_from_mi(&record.results)
                            .into_iter()
                            .filter(|frame| match frame.kind() {
                                FrameKind::Modelica => true,
                                FrameKind::C => display_c,
                                FrameKind::Unknown => display_unknown,
                            })
                            .collect();
                        let _ = events.send(DebuggerEvent::StackFramesUpdated(frames));
                    }
                })),
            )
            .await;
        if let Err(err) = posted {
            log::warn!("failed to request stack frames: {}", err);
        }
    }

    async fn refresh_threads(&self) {
        let events = self.events.clone();
        let posted = self
            .dispatcher
            .post(
                commands::thread_info(),
                CommandFlags::new().non_critical(),
                Some(Box::new(move |outcome| {
                    if let Ok(record) = outcome {
                        let (threads, current) = Thread::list_from_mi(&record.results);
                        let _ = events.send(DebuggerEvent::ThreadsUpdated { threads, current });
                    }
                })),
            )
            .await;
        if let Err(err) = posted {
            log::warn!("failed to request thread list: {}", err);
        }
    }

    /// The inferior is gone; ask the debugger to quit and stop taking
    /// commands. Pending entries fail, later posts are rejected.
    async fn shutdown_session(&self) {
        if !self.killed.swap(true, Ordering::SeqCst) {
            let _ = self
                .dispatcher
                .post(commands::gdb_exit(), CommandFlags::new().silent(), None)
                .await;
        }
        self.dispatcher.close().await;
    }

    /// EOF on the debugger's stdout: the process is gone, by request or
    /// by crash. Fatal for the session, not for the host.
    async fn on_reader_closed(&self) {
        let was_running = self.gdb_running.swap(false, Ordering::SeqCst);
        let inferior_died = self.exec.lock().unwrap().on_terminated();
        self.dispatcher.close().await;
        if inferior_died {
            self.send_event(DebuggerEvent::InferiorTerminated { exit_code: None });
        }
        if was_running {
            if !self.killed.load(Ordering::SeqCst) {
                log::error!("debugger process terminated unexpectedly");
            }
            self.send_event(DebuggerEvent::GdbFinished);
        }
    }
}

/// The adapter: owns the debugger process, the dispatcher and the
/// execution state machine, and publishes [`DebuggerEvent`]s.
pub struct GdbAdapter {
    config: DebuggerConfig,
    shared: Arc<Shared>,
    process: Option<GdbProcess>,
    event_receiver: Option<mpsc::UnboundedReceiver<DebuggerEvent>>,
}

impl GdbAdapter {
    pub fn new(config: DebuggerConfig) -> Result<Self> {
        let log: Arc<dyn DebuggerLog> = match &config.log_path {
            Some(path) => Arc::new(FileLog::create(path).map_err(GdbError::Log)?),
            None => Arc::new(NullLog),
        };
        Ok(Self::with_log(config, log))
    }

    /// Build with an explicit log sink instead of the configured file.
    pub fn with_log(config: DebuggerConfig, log: Arc<dyn DebuggerLog>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(config.command_timeout, log.clone(), events_tx.clone());
        let exec = ExecutionState::with_user_code_filter(suffix_filter(
            config.user_code_extensions.clone(),
        ));
        let shared = Arc::new(Shared {
            dispatcher,
            exec: Mutex::new(exec),
            events: events_tx,
            log,
            killed: AtomicBool::new(false),
            gdb_running: AtomicBool::new(false),
            display_c_frames: config.display_c_frames,
            display_unknown_frames: config.display_unknown_frames,
        });
        GdbAdapter {
            config,
            shared,
            process: None,
            event_receiver: Some(events_rx),
        }
    }

    /// The stream of state changes and output. Can be taken once.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<DebuggerEvent>> {
        self.event_receiver.take()
    }

    pub fn is_gdb_running(&self) -> bool {
        self.shared.gdb_running.load(Ordering::SeqCst)
    }

    pub fn execution_state(&self) -> InferiorState {
        self.shared.exec.lock().unwrap().state()
    }

    pub fn is_inferior_suspended(&self) -> bool {
        self.execution_state() == InferiorState::Suspended
    }

    pub fn is_inferior_running(&self) -> bool {
        self.execution_state() == InferiorState::Running
    }

    pub fn is_inferior_terminated(&self) -> bool {
        self.execution_state() == InferiorState::Terminated
    }

    /// Which step command a stepping stop in filtered code reissues.
    pub fn set_execute_command(&self, kind: StepKind) {
        self.shared.exec.lock().unwrap().set_step_kind(kind);
    }

    pub fn execute_command(&self) -> StepKind {
        self.shared.exec.lock().unwrap().step_kind()
    }

    /// Wire the adapter to a pair of raw streams and start the reader.
    /// `launch`/`attach` call this with the child's pipes; tests and
    /// alternative transports can supply their own.
    pub async fn wire(
        &mut self,
        input: impl AsyncWrite + Send + Unpin + 'static,
        output: impl AsyncRead + Send + Unpin + 'static,
    ) {
        self.shared.killed.store(false, Ordering::SeqCst);
        self.shared.exec.lock().unwrap().reset();
        self.shared.dispatcher.open(Box::new(input)).await;
        self.shared.gdb_running.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(output);
            let mut line = String::new();
            loop {
                line.clear();
                // read_line buffers partial reads until the newline
                // arrives, so the parser only ever sees whole lines.
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => shared.handle_line(&line).await,
                    Err(err) => {
                        log::error!("debugger stdout read error: {}", err);
                        break;
                    }
                }
            }
            shared.on_reader_closed().await;
        });
    }

    /// Start the debugger with a program to run and feed it the setup
    /// sequence. The inferior is not run yet; set breakpoints, then call
    /// [`GdbAdapter::exec_run`].
    pub async fn launch(&mut self, request: LaunchRequest) -> Result<()> {
        if self.is_gdb_running() {
            return Err(GdbError::AlreadyRunning);
        }
        let mut process = GdbProcess::spawn(
            &self.config.gdb_path,
            Some(&request.program),
            request.working_dir.as_deref(),
        )?;
        let pid = process.id();
        let stdin = process
            .take_stdin()
            .ok_or_else(|| GdbError::Communication("failed to get stdin handle".into()))?;
        let stdout = process
            .take_stdout()
            .ok_or_else(|| GdbError::Communication("failed to get stdout handle".into()))?;
        let stderr = process
            .take_stderr()
            .ok_or_else(|| GdbError::Communication("failed to get stderr handle".into()))?;
        self.process = Some(process);

        self.wire(stdin, stdout).await;
        self.spawn_stderr_reader(stderr);
        self.shared.send_event(DebuggerEvent::GdbStarted { pid });

        self.post_setup_commands(&request.arguments).await?;
        self.insert_catch_breakpoint().await?;
        Ok(())
    }

    /// Attach to an already running process instead of launching one.
    pub async fn attach(&mut self, process_id: u32) -> Result<()> {
        if self.is_gdb_running() {
            return Err(GdbError::AlreadyRunning);
        }
        let mut process = GdbProcess::spawn(&self.config.gdb_path, None, None)?;
        let pid = process.id();
        let stdin = process
            .take_stdin()
            .ok_or_else(|| GdbError::Communication("failed to get stdin handle".into()))?;
        let stdout = process
            .take_stdout()
            .ok_or_else(|| GdbError::Communication("failed to get stdout handle".into()))?;
        let stderr = process
            .take_stderr()
            .ok_or_else(|| GdbError::Communication("failed to get stderr handle".into()))?;
        self.process = Some(process);

        self.wire(stdin, stdout).await;
        self.spawn_stderr_reader(stderr);
        self.shared.send_event(DebuggerEvent::GdbStarted { pid });

        self.post_setup_commands(&[]).await?;
        self.shared
            .dispatcher
            .post(commands::attach(process_id), CommandFlags::new(), None)
            .await?;
        self.insert_catch_breakpoint().await?;
        Ok(())
    }

    async fn post_setup_commands(&self, arguments: &[String]) -> Result<()> {
        let flags = CommandFlags::new().non_critical();
        let dispatcher = &self.shared.dispatcher;
        dispatcher
            .post(commands::set_confirm(false), flags, None)
            .await?;
        dispatcher
            .post(commands::set_breakpoint_pending(true), flags, None)
            .await?;
        dispatcher
            .post(commands::set_print_object(true), flags, None)
            .await?;
        dispatcher.post(commands::set_width(0), flags, None).await?;
        dispatcher
            .post(commands::set_height(0), flags, None)
            .await?;
        dispatcher
            .post(
                commands::set_print_elements(self.config.output_limit),
                flags,
                None,
            )
            .await?;
        if !arguments.is_empty() {
            dispatcher
                .post(commands::set_args(arguments), flags, None)
                .await?;
        }
        // The inferior may not link the helper; losing this one is fine.
        dispatcher
            .post(
                commands::change_std_stream_buffer(),
                CommandFlags::new().silent(),
                None,
            )
            .await?;
        Ok(())
    }

    /// Insert the internal catch breakpoint and remember its id. Not part
    /// of the user breakpoint list.
    pub async fn insert_catch_breakpoint(&self) -> Result<()> {
        let location = match &self.config.catch_location {
            Some(location) => location.clone(),
            None => return Ok(()),
        };
        let shared = self.shared.clone();
        self.shared
            .dispatcher
            .post(
                commands::break_insert_location(&location),
                CommandFlags::new().silent(),
                Some(Box::new(move |outcome| {
                    if let Ok(record) = outcome {
                        if let Some(number) = record
                            .results
                            .find_tuple("bkpt")
                            .and_then(|bkpt| bkpt.find_const("number"))
                        {
                            shared
                                .exec
                                .lock()
                                .unwrap()
                                .set_catch_breakpoint(Some(number.to_string()));
                        }
                    }
                })),
            )
            .await?;
        Ok(())
    }

    pub async fn enable_catch_breakpoint(&self) -> Result<()> {
        self.catch_breakpoint_command(commands::break_enable).await
    }

    pub async fn disable_catch_breakpoint(&self) -> Result<()> {
        self.catch_breakpoint_command(commands::break_disable).await
    }

    pub async fn delete_catch_breakpoint(&self) -> Result<()> {
        self.catch_breakpoint_command(commands::break_delete)
            .await?;
        self.shared.exec.lock().unwrap().set_catch_breakpoint(None);
        Ok(())
    }

    async fn catch_breakpoint_command(&self, build: fn(&[String]) -> String) -> Result<()> {
        let id = self
            .shared
            .exec
            .lock()
            .unwrap()
            .catch_breakpoint()
            .map(str::to_string);
        if let Some(id) = id {
            self.shared
                .dispatcher
                .post(build(&[id]), CommandFlags::new().silent(), None)
                .await?;
        }
        Ok(())
    }

    /// Submit a user breakpoint. The callback receives the breakpoint
    /// with its debugger-assigned id once the insert is confirmed.
    pub async fn insert_breakpoint(
        &self,
        breakpoint: &Breakpoint,
        callback: Option<BreakpointCallback>,
    ) -> Result<u32> {
        let command = commands::break_insert(
            &breakpoint.file,
            breakpoint.line,
            !breakpoint.enabled,
            breakpoint.condition.as_deref(),
            breakpoint.ignore_count,
            breakpoint.pending,
        );
        let mut resolved = breakpoint.clone();
        let token = self
            .shared
            .dispatcher
            .post(
                command,
                CommandFlags::new(),
                Some(Box::new(move |outcome| match outcome {
                    Ok(record) => {
                        if let Some(tuple) = record.results.find_tuple("bkpt") {
                            resolved.apply_mi(tuple);
                        }
                        if let Some(callback) = callback {
                            callback(Ok(resolved));
                        }
                    }
                    Err(err) => {
                        if let Some(callback) = callback {
                            callback(Err(err));
                        }
                    }
                })),
            )
            .await?;
        Ok(token)
    }

    pub async fn delete_breakpoints(&self, ids: &[String]) -> Result<u32> {
        Ok(self
            .shared
            .dispatcher
            .post(commands::break_delete(ids), CommandFlags::new(), None)
            .await?)
    }

    pub async fn enable_breakpoints(&self, ids: &[String]) -> Result<u32> {
        Ok(self
            .shared
            .dispatcher
            .post(commands::break_enable(ids), CommandFlags::new(), None)
            .await?)
    }

    pub async fn disable_breakpoints(&self, ids: &[String]) -> Result<u32> {
        Ok(self
            .shared
            .dispatcher
            .post(commands::break_disable(ids), CommandFlags::new(), None)
            .await?)
    }

    pub async fn set_breakpoint_condition(&self, id: &str, condition: &str) -> Result<u32> {
        Ok(self
            .shared
            .dispatcher
            .post(
                commands::break_condition(id, condition),
                CommandFlags::new(),
                None,
            )
            .await?)
    }

    pub async fn set_breakpoint_ignore_count(&self, id: &str, count: u32) -> Result<u32> {
        Ok(self
            .shared
            .dispatcher
            .post(commands::break_after(id, count), CommandFlags::new(), None)
            .await?)
    }

    /// Run the loaded program. The catch breakpoint stays out of the way
    /// until a stepping operation needs it.
    pub async fn exec_run(&self) -> Result<u32> {
        self.shared.exec.lock().unwrap().set_stepping(false);
        self.disable_catch_breakpoint().await?;
        let token = self
            .shared
            .dispatcher
            .post(commands::exec_run(), CommandFlags::new(), None)
            .await?;
        self.optimistic_resume();
        Ok(token)
    }

    pub async fn exec_continue(&self) -> Result<u32> {
        self.shared.exec.lock().unwrap().set_stepping(false);
        self.disable_catch_breakpoint().await?;
        let token = self
            .shared
            .dispatcher
            .post(commands::exec_continue(), CommandFlags::new(), None)
            .await?;
        self.optimistic_resume();
        Ok(token)
    }

    pub async fn exec_next(&self) -> Result<u32> {
        self.step_command(StepKind::Next, commands::exec_next()).await
    }

    pub async fn exec_step(&self) -> Result<u32> {
        self.step_command(StepKind::Step, commands::exec_step()).await
    }

    pub async fn exec_finish(&self) -> Result<u32> {
        {
            let mut exec = self.shared.exec.lock().unwrap();
            exec.set_stepping(true);
        }
        self.enable_catch_breakpoint().await?;
        let token = self
            .shared
            .dispatcher
            .post(commands::exec_finish(), CommandFlags::new(), None)
            .await?;
        self.optimistic_resume();
        Ok(token)
    }

    async fn step_command(&self, kind: StepKind, command: String) -> Result<u32> {
        {
            let mut exec = self.shared.exec.lock().unwrap();
            exec.set_step_kind(kind);
            exec.set_stepping(true);
        }
        self.enable_catch_breakpoint().await?;
        let token = self
            .shared
            .dispatcher
            .post(command, CommandFlags::new(), None)
            .await?;
        self.optimistic_resume();
        Ok(token)
    }

    /// Ask a running inferior to stop. If no stop event shows up within
    /// the command timeout the request itself fails; nothing blocks.
    pub async fn suspend_debugger(&self) -> Result<u32> {
        if !self.is_inferior_running() {
            return Err(GdbError::NotRunning);
        }
        #[cfg(unix)]
        if let Some(process) = &self.process {
            if let Err(err) = process.interrupt() {
                log::warn!("interrupt signal failed: {}", err);
            }
        }
        let token = self
            .shared
            .dispatcher
            .post(
                commands::exec_interrupt(),
                CommandFlags::new().non_critical(),
                None,
            )
            .await?;
        Ok(token)
    }

    /// Post a raw MI command. The callback fires exactly once with the
    /// decoded result, the timeout, or session closure.
    pub async fn post_command(
        &self,
        command: impl Into<String>,
        flags: CommandFlags,
        callback: Option<CommandCallback>,
    ) -> Result<u32> {
        Ok(self.shared.dispatcher.post(command, flags, callback).await?)
    }

    pub async fn evaluate_expression(
        &self,
        expression: &str,
        callback: CommandCallback,
    ) -> Result<u32> {
        self.post_command(
            commands::data_evaluate_expression(expression),
            CommandFlags::new(),
            Some(callback),
        )
        .await
    }

    pub async fn select_frame(&self, level: u32) -> Result<u32> {
        self.post_command(
            commands::stack_select_frame(level),
            CommandFlags::new().non_critical(),
            None,
        )
        .await
    }

    pub async fn select_thread(&self, id: u32) -> Result<u32> {
        self.post_command(
            commands::thread_select(id),
            CommandFlags::new().non_critical(),
            None,
        )
        .await
    }

    pub async fn list_local_variables(&self, callback: CommandCallback) -> Result<u32> {
        self.post_command(
            commands::stack_list_variables(commands::PrintValues::Simple),
            CommandFlags::new(),
            Some(callback),
        )
        .await
    }

    pub async fn create_full_backtrace(&self, callback: CommandCallback) -> Result<u32> {
        self.post_command(
            commands::create_full_backtrace(),
            CommandFlags::new().console(),
            Some(callback),
        )
        .await
    }

    /// End the session: ask the debugger to quit, then make sure the
    /// process is gone. Reentrant calls are guarded by the kill flag.
    pub async fn quit(&mut self) -> Result<()> {
        if !self.is_gdb_running() {
            return Ok(());
        }
        if !self.shared.killed.swap(true, Ordering::SeqCst) {
            let _ = self
                .shared
                .dispatcher
                .post(commands::gdb_exit(), CommandFlags::new().silent(), None)
                .await;
        }
        self.shared.dispatcher.close().await;
        if let Some(mut process) = self.process.take() {
            let _ = process.kill().await;
        }
        Ok(())
    }

    fn optimistic_resume(&self) {
        // The UI greys out the step controls right away; the next stop
        // event is what confirms the actual state.
        if self.shared.exec.lock().unwrap().on_running() {
            self.shared.send_event(DebuggerEvent::InferiorResumed);
        }
    }

    fn spawn_stderr_reader(&self, stderr: tokio::process::ChildStderr) {
        let events = self.shared.events.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            log::debug!("gdb stderr: {}", trimmed);
                            let _ = events.send(DebuggerEvent::LogOutput(trimmed.to_string()));
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }
}

impl Drop for GdbAdapter {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            process.start_kill();
        }
    }
}
