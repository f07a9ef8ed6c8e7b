//! Inferior execution state machine.
//!
//! Consumes the `*stopped`/`*running` records and decides what the
//! adapter should do: surface the stop, silently reissue a step to skip
//! generated code, or end the session. The machine does no I/O itself so
//! the stepping policy is testable without a live debugger.

use serde::{Deserialize, Serialize};

use crate::types::{MiResult, ResultsExt, StackFrame, StopReason};

/// Lifecycle of the debugged process. `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InferiorState {
    NotStarted,
    Running,
    Suspended,
    Terminated,
}

/// Which step command a stepping operation reissues when it lands in
/// generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    Next,
    Step,
}

/// A stop the UI should see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopEvent {
    pub reason: Option<StopReason>,
    pub frame: Option<StackFrame>,
    pub thread_id: Option<u32>,
    pub breakpoint_id: Option<String>,
    pub signal_name: Option<String>,
    pub signal_meaning: Option<String>,
}

/// What the adapter should do with a `*stopped` record.
#[derive(Debug)]
pub enum StopDisposition {
    /// Present the stop: the inferior is suspended at a user frame.
    Suspend(StopEvent),
    /// Stopped inside filtered code during a step; reissue the step
    /// command and keep the inferior logically running.
    Resume(StepKind),
    /// The inferior is gone.
    Terminated { exit_code: Option<i32> },
    /// Nothing to do (stale record after termination).
    Ignore,
}

/// Decides whether a frame belongs to user code. Frames failing the
/// predicate are stepped over silently.
pub type UserCodePredicate = Box<dyn Fn(&StackFrame) -> bool + Send + Sync>;

/// Predicate accepting frames whose source file carries one of the given
/// suffixes.
pub fn suffix_filter(extensions: Vec<String>) -> UserCodePredicate {
    Box::new(move |frame: &StackFrame| {
        frame
            .source_path()
            .and_then(crate::types::file_suffix)
            .map(|suffix| extensions.iter().any(|e| e == suffix))
            .unwrap_or(false)
    })
}

pub struct ExecutionState {
    state: InferiorState,
    step_kind: StepKind,
    stepping: bool,
    catch_breakpoint: Option<String>,
    user_code: UserCodePredicate,
}

impl ExecutionState {
    pub fn new() -> Self {
        ExecutionState {
            state: InferiorState::NotStarted,
            step_kind: StepKind::Next,
            stepping: false,
            catch_breakpoint: None,
            user_code: suffix_filter(vec!["mo".to_string()]),
        }
    }

    pub fn with_user_code_filter(user_code: UserCodePredicate) -> Self {
        ExecutionState {
            user_code,
            ..ExecutionState::new()
        }
    }

    pub fn state(&self) -> InferiorState {
        self.state
    }

    pub fn set_user_code_filter(&mut self, user_code: UserCodePredicate) {
        self.user_code = user_code;
    }

    /// Remember which step command is in flight; the skip policy reissues
    /// this one.
    pub fn set_step_kind(&mut self, kind: StepKind) {
        self.step_kind = kind;
    }

    pub fn step_kind(&self) -> StepKind {
        self.step_kind
    }

    /// Flag a stepping operation (as opposed to a free-running continue).
    pub fn set_stepping(&mut self, stepping: bool) {
        self.stepping = stepping;
    }

    pub fn set_catch_breakpoint(&mut self, id: Option<String>) {
        self.catch_breakpoint = id;
    }

    pub fn catch_breakpoint(&self) -> Option<&str> {
        self.catch_breakpoint.as_deref()
    }

    /// Back to square one for a fresh launch.
    pub fn reset(&mut self) {
        self.state = InferiorState::NotStarted;
        self.stepping = false;
        self.catch_breakpoint = None;
    }

    /// A run/continue/step was issued or confirmed. Returns true if the
    /// state actually changed.
    pub fn on_running(&mut self) -> bool {
        match self.state {
            InferiorState::Terminated | InferiorState::Running => false,
            _ => {
                self.state = InferiorState::Running;
                true
            }
        }
    }

    /// The debugger process died or the inferior is otherwise gone.
    /// Returns true if the state actually changed.
    pub fn on_terminated(&mut self) -> bool {
        if self.state == InferiorState::Terminated {
            false
        } else {
            self.state = InferiorState::Terminated;
            self.stepping = false;
            true
        }
    }

    /// Classify a `*stopped` record.
    pub fn on_stopped(&mut self, results: &[MiResult]) -> StopDisposition {
        if self.state == InferiorState::Terminated {
            return StopDisposition::Ignore;
        }

        let reason = results.find_const("reason").map(StopReason::parse);
        let frame = results.find_tuple("frame").map(StackFrame::from_mi);
        let thread_id = results.find_u32("thread-id");

        if let Some(reason) = &reason {
            if reason.is_exit() {
                self.state = InferiorState::Terminated;
                let exit_code = results
                    .find_const("exit-code")
                    .and_then(|code| parse_exit_code(code));
                return StopDisposition::Terminated { exit_code };
            }
        }

        let breakpoint_id = results.find_const("bkptno").map(str::to_string);

        match reason {
            Some(StopReason::BreakpointHit) => {
                let is_catch = match (&breakpoint_id, &self.catch_breakpoint) {
                    (Some(hit), Some(catch)) => hit == catch,
                    _ => false,
                };
                if is_catch && !self.frame_is_user_code(frame.as_ref()) {
                    // Stepping boundary, not a user stop; step again until
                    // user code comes back into view.
                    self.state = InferiorState::Running;
                    return StopDisposition::Resume(self.step_kind);
                }
            }
            Some(StopReason::EndSteppingRange) | Some(StopReason::FunctionFinished) => {
                if self.stepping && !self.frame_is_user_code(frame.as_ref()) {
                    self.state = InferiorState::Running;
                    return StopDisposition::Resume(self.step_kind);
                }
            }
            _ => {}
        }

        self.state = InferiorState::Suspended;
        self.stepping = false;

        StopDisposition::Suspend(StopEvent {
            reason,
            frame,
            thread_id,
            breakpoint_id,
            signal_name: results.find_const("signal-name").map(str::to_string),
            signal_meaning: results.find_const("signal-meaning").map(str::to_string),
        })
    }

    fn frame_is_user_code(&self, frame: Option<&StackFrame>) -> bool {
        frame.map(|f| (self.user_code)(f)).unwrap_or(false)
    }
}

impl Default for ExecutionState {
    fn default() -> Self {
        ExecutionState::new()
    }
}

pub(crate) fn parse_exit_code(code: &str) -> Option<i32> {
    // GDB reports exit codes in octal with a leading zero.
    if let Some(octal) = code.strip_prefix("0o") {
        return i32::from_str_radix(octal, 8).ok();
    }
    if code.len() > 1 && code.starts_with('0') {
        return i32::from_str_radix(&code[1..], 8).ok();
    }
    code.parse().ok()
}
